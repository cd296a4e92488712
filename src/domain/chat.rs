use serde_json::Value;

use super::{
    chat_list::ChatList,
    field_map::{get_bool, get_i64, get_map, FieldMap},
};

/// Placement of a chat inside one chat list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatPosition {
    pub list: ChatList,
    /// Server-assigned sort key. Zero means the chat is not in the list.
    pub order: i64,
    pub is_pinned: bool,
}

impl ChatPosition {
    pub fn from_fields(map: &FieldMap) -> Option<Self> {
        let list = ChatList::from_fields(get_map(map, "list")?)?;

        Some(Self {
            list,
            order: get_i64(map, "order").unwrap_or(0),
            is_pinned: get_bool(map, "is_pinned").unwrap_or(false),
        })
    }

    pub fn from_values(values: &[Value]) -> Vec<Self> {
        values
            .iter()
            .filter_map(Value::as_object)
            .filter_map(Self::from_fields)
            .collect()
    }

    pub fn is_listed(&self) -> bool {
        self.order != 0
    }
}

/// Replaces positions list by list: any stored position for the same list is
/// removed before the incoming one is added. Zero-order positions only remove.
pub fn replace_positions(current: &mut Vec<ChatPosition>, incoming: Vec<ChatPosition>) {
    for position in incoming {
        current.retain(|existing| existing.list != position.list);
        if position.is_listed() {
            current.push(position);
        }
    }
}

/// Seconds of remaining mute, zero when notifications are on.
pub fn mute_for(chat: &FieldMap) -> i64 {
    get_map(chat, "notification_settings")
        .and_then(|settings| get_i64(settings, "mute_for"))
        .unwrap_or(0)
}
