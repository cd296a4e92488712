use super::{
    chat_list::ChatList,
    store::{EntityId, EntityKind},
};

/// Notification emitted after the store or ordering index changed.
///
/// One applied mutation yields one entity-scoped change; consumers coalesce
/// multiple field changes of the same entity themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Entity {
        kind: EntityKind,
        id: EntityId,
    },
    ChatPosition {
        chat_id: i64,
        lists: Vec<ChatList>,
    },
    MessageAdded {
        chat_id: i64,
        message_id: i64,
    },
    MessageUpdated {
        chat_id: i64,
        message_id: i64,
    },
    MessageReplaced {
        chat_id: i64,
        old_message_id: i64,
        message_id: i64,
    },
    MessagesDeleted {
        chat_id: i64,
        message_ids: Vec<i64>,
    },
    ChatOnlineMemberCount {
        chat_id: i64,
        count: i32,
    },
    ChatFolders,
}

impl Change {
    pub fn chat(chat_id: i64) -> Self {
        Self::Entity {
            kind: EntityKind::Chat,
            id: EntityId::Int(chat_id),
        }
    }

    /// Chat the change is scoped to, if any.
    pub fn chat_id(&self) -> Option<i64> {
        match self {
            Self::Entity {
                kind: EntityKind::Chat,
                id,
            } => id.as_int(),
            Self::ChatPosition { chat_id, .. }
            | Self::MessageAdded { chat_id, .. }
            | Self::MessageUpdated { chat_id, .. }
            | Self::MessageReplaced { chat_id, .. }
            | Self::MessagesDeleted { chat_id, .. }
            | Self::ChatOnlineMemberCount { chat_id, .. } => Some(*chat_id),
            Self::Entity { .. } | Self::ChatFolders => None,
        }
    }
}
