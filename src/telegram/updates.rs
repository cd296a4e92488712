//! Typed view of backend push updates.
//!
//! Payloads are decoded once, at the boundary, into a closed set of variants.
//! Tags the cache does not handle become [`Update::Unknown`] so protocol
//! additions pass through harmlessly.

use serde_json::Value;

use crate::domain::{
    chat::ChatPosition,
    field_map::{get_i32, get_i64, get_list, get_map, get_str, ids_from_values, FieldMap},
};

#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    NewChat {
        chat: FieldMap,
    },
    ChatTitle {
        chat_id: i64,
        title: Value,
    },
    ChatPhoto {
        chat_id: i64,
        photo: Value,
    },
    ChatPermissions {
        chat_id: i64,
        permissions: Value,
    },
    ChatLastMessage {
        chat_id: i64,
        last_message: Value,
        positions: Vec<ChatPosition>,
    },
    ChatPosition {
        chat_id: i64,
        position: ChatPosition,
    },
    ChatReadInbox {
        chat_id: i64,
        last_read_inbox_message_id: Value,
        unread_count: Value,
    },
    ChatReadOutbox {
        chat_id: i64,
        last_read_outbox_message_id: Value,
    },
    ChatActionBar {
        chat_id: i64,
        action_bar: Value,
    },
    ChatDraftMessage {
        chat_id: i64,
        draft_message: Value,
        positions: Vec<ChatPosition>,
    },
    ChatNotificationSettings {
        chat_id: i64,
        notification_settings: Value,
    },
    ChatReplyMarkup {
        chat_id: i64,
        reply_markup_message_id: Value,
    },
    ChatUnreadMentionCount {
        chat_id: i64,
        unread_mention_count: Value,
    },
    ChatIsMarkedAsUnread {
        chat_id: i64,
        is_marked_as_unread: Value,
    },
    ChatOnlineMemberCount {
        chat_id: i64,
        online_member_count: i32,
    },
    User {
        user: FieldMap,
    },
    BasicGroup {
        basic_group: FieldMap,
    },
    Supergroup {
        supergroup: FieldMap,
    },
    UserFullInfo {
        user_id: i64,
        info: FieldMap,
    },
    BasicGroupFullInfo {
        basic_group_id: i64,
        info: FieldMap,
    },
    SupergroupFullInfo {
        supergroup_id: i64,
        info: FieldMap,
    },
    File {
        file: FieldMap,
    },
    Option {
        name: String,
        value: Value,
    },
    ChatFolders {
        folders: Vec<FieldMap>,
    },
    NewMessage {
        message: FieldMap,
    },
    MessageSendSucceeded {
        message: FieldMap,
        old_message_id: i64,
    },
    MessageSendFailed {
        message: FieldMap,
        old_message_id: i64,
        error_code: i32,
        error_message: String,
    },
    MessageContent {
        chat_id: i64,
        message_id: i64,
        new_content: Value,
    },
    MessageEdited {
        chat_id: i64,
        message_id: i64,
        edit_date: Value,
        reply_markup: Value,
    },
    MessageIsPinned {
        chat_id: i64,
        message_id: i64,
        is_pinned: bool,
    },
    MessageInteractionInfo {
        chat_id: i64,
        message_id: i64,
        interaction_info: Value,
    },
    DeleteMessages {
        chat_id: i64,
        message_ids: Vec<i64>,
    },
    /// Known tag whose payload lacked a required field.
    Malformed(String),
    Unknown(String),
}

impl Update {
    pub fn decode(tag: &str, mut payload: FieldMap) -> Self {
        let decoded = match tag {
            "updateNewChat" => take_map(&mut payload, "chat").map(|chat| Self::NewChat { chat }),
            "updateChatTitle" => chat_id(&payload).map(|chat_id| Self::ChatTitle {
                chat_id,
                title: take(&mut payload, "title"),
            }),
            "updateChatPhoto" => chat_id(&payload).map(|chat_id| Self::ChatPhoto {
                chat_id,
                photo: take(&mut payload, "photo"),
            }),
            "updateChatPermissions" => chat_id(&payload).map(|chat_id| Self::ChatPermissions {
                chat_id,
                permissions: take(&mut payload, "permissions"),
            }),
            "updateChatLastMessage" => chat_id(&payload).map(|chat_id| Self::ChatLastMessage {
                chat_id,
                last_message: take(&mut payload, "last_message"),
                positions: positions(&payload),
            }),
            "updateChatPosition" => chat_id(&payload).and_then(|chat_id| {
                let position = get_map(&payload, "position").and_then(ChatPosition::from_fields)?;
                Some(Self::ChatPosition { chat_id, position })
            }),
            "updateChatReadInbox" => chat_id(&payload).map(|chat_id| Self::ChatReadInbox {
                chat_id,
                last_read_inbox_message_id: take(&mut payload, "last_read_inbox_message_id"),
                unread_count: take(&mut payload, "unread_count"),
            }),
            "updateChatReadOutbox" => chat_id(&payload).map(|chat_id| Self::ChatReadOutbox {
                chat_id,
                last_read_outbox_message_id: take(&mut payload, "last_read_outbox_message_id"),
            }),
            "updateChatActionBar" => chat_id(&payload).map(|chat_id| Self::ChatActionBar {
                chat_id,
                action_bar: take(&mut payload, "action_bar"),
            }),
            "updateChatDraftMessage" => chat_id(&payload).map(|chat_id| Self::ChatDraftMessage {
                chat_id,
                draft_message: take(&mut payload, "draft_message"),
                positions: positions(&payload),
            }),
            "updateChatNotificationSettings" => {
                chat_id(&payload).map(|chat_id| Self::ChatNotificationSettings {
                    chat_id,
                    notification_settings: take(&mut payload, "notification_settings"),
                })
            }
            "updateChatReplyMarkup" => chat_id(&payload).map(|chat_id| Self::ChatReplyMarkup {
                chat_id,
                reply_markup_message_id: take(&mut payload, "reply_markup_message_id"),
            }),
            "updateChatUnreadMentionCount" => {
                chat_id(&payload).map(|chat_id| Self::ChatUnreadMentionCount {
                    chat_id,
                    unread_mention_count: take(&mut payload, "unread_mention_count"),
                })
            }
            "updateChatIsMarkedAsUnread" => {
                chat_id(&payload).map(|chat_id| Self::ChatIsMarkedAsUnread {
                    chat_id,
                    is_marked_as_unread: take(&mut payload, "is_marked_as_unread"),
                })
            }
            "updateChatOnlineMemberCount" => {
                chat_id(&payload).map(|chat_id| Self::ChatOnlineMemberCount {
                    chat_id,
                    online_member_count: get_i32(&payload, "online_member_count").unwrap_or(0),
                })
            }
            "updateUser" => take_map(&mut payload, "user").map(|user| Self::User { user }),
            "updateBasicGroup" => take_map(&mut payload, "basic_group")
                .map(|basic_group| Self::BasicGroup { basic_group }),
            "updateSupergroup" => take_map(&mut payload, "supergroup")
                .map(|supergroup| Self::Supergroup { supergroup }),
            "updateUserFullInfo" => get_i64(&payload, "user_id").and_then(|user_id| {
                let info = take_map(&mut payload, "user_full_info")?;
                Some(Self::UserFullInfo { user_id, info })
            }),
            "updateBasicGroupFullInfo" => {
                get_i64(&payload, "basic_group_id").and_then(|basic_group_id| {
                    let info = take_map(&mut payload, "basic_group_full_info")?;
                    Some(Self::BasicGroupFullInfo {
                        basic_group_id,
                        info,
                    })
                })
            }
            "updateSupergroupFullInfo" => {
                get_i64(&payload, "supergroup_id").and_then(|supergroup_id| {
                    let info = take_map(&mut payload, "supergroup_full_info")?;
                    Some(Self::SupergroupFullInfo {
                        supergroup_id,
                        info,
                    })
                })
            }
            "updateFile" => take_map(&mut payload, "file").map(|file| Self::File { file }),
            "updateOption" => get_str(&payload, "name").map(str::to_owned).map(|name| Self::Option {
                name,
                value: option_value(&take(&mut payload, "value")),
            }),
            "updateChatFolders" => Some(Self::ChatFolders {
                folders: get_list(&payload, "chat_folders")
                    .map(|values| values.iter().filter_map(Value::as_object).cloned().collect())
                    .unwrap_or_default(),
            }),
            "updateNewMessage" => {
                take_map(&mut payload, "message").map(|message| Self::NewMessage { message })
            }
            "updateMessageSendSucceeded" => {
                get_i64(&payload, "old_message_id").and_then(|old_message_id| {
                    let message = take_map(&mut payload, "message")?;
                    Some(Self::MessageSendSucceeded {
                        message,
                        old_message_id,
                    })
                })
            }
            "updateMessageSendFailed" => {
                get_i64(&payload, "old_message_id").and_then(|old_message_id| {
                    let (error_code, error_message) = send_error(&payload);
                    let message = take_map(&mut payload, "message")?;
                    Some(Self::MessageSendFailed {
                        message,
                        old_message_id,
                        error_code,
                        error_message,
                    })
                })
            }
            "updateMessageContent" => message_key(&payload).map(|(chat_id, message_id)| {
                Self::MessageContent {
                    chat_id,
                    message_id,
                    new_content: take(&mut payload, "new_content"),
                }
            }),
            "updateMessageEdited" => message_key(&payload).map(|(chat_id, message_id)| {
                Self::MessageEdited {
                    chat_id,
                    message_id,
                    edit_date: take(&mut payload, "edit_date"),
                    reply_markup: take(&mut payload, "reply_markup"),
                }
            }),
            "updateMessageIsPinned" => message_key(&payload).map(|(chat_id, message_id)| {
                Self::MessageIsPinned {
                    chat_id,
                    message_id,
                    is_pinned: payload.get("is_pinned").and_then(Value::as_bool).unwrap_or(false),
                }
            }),
            "updateMessageInteractionInfo" => message_key(&payload).map(|(chat_id, message_id)| {
                Self::MessageInteractionInfo {
                    chat_id,
                    message_id,
                    interaction_info: take(&mut payload, "interaction_info"),
                }
            }),
            "updateDeleteMessages" => chat_id(&payload).map(|chat_id| Self::DeleteMessages {
                chat_id,
                message_ids: get_list(&payload, "message_ids")
                    .map(|values| ids_from_values(values))
                    .unwrap_or_default(),
            }),
            other => return Self::Unknown(other.to_owned()),
        };

        decoded.unwrap_or_else(|| Self::Malformed(tag.to_owned()))
    }
}

fn chat_id(payload: &FieldMap) -> Option<i64> {
    get_i64(payload, "chat_id")
}

fn message_key(payload: &FieldMap) -> Option<(i64, i64)> {
    Some((get_i64(payload, "chat_id")?, get_i64(payload, "message_id")?))
}

/// Removes a field, turning an omitted optional object into an explicit null.
fn take(payload: &mut FieldMap, key: &str) -> Value {
    payload.remove(key).unwrap_or(Value::Null)
}

fn take_map(payload: &mut FieldMap, key: &str) -> Option<FieldMap> {
    match payload.remove(key)? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

fn positions(payload: &FieldMap) -> Vec<ChatPosition> {
    get_list(payload, "positions")
        .map(|values| ChatPosition::from_values(values))
        .unwrap_or_default()
}

/// Unwraps `optionValue*` objects into their plain value.
fn option_value(value: &Value) -> Value {
    value
        .as_object()
        .and_then(|map| map.get("value"))
        .cloned()
        .unwrap_or(Value::Null)
}

/// Newer payloads carry an `error` object, older ones flat `error_code` and
/// `error_message` fields. A top-level `message` is the failed message.
fn send_error(payload: &FieldMap) -> (i32, String) {
    let (source, code_key, message_key) = match get_map(payload, "error") {
        Some(error) => (error, "code", "message"),
        None => (payload, "error_code", "error_message"),
    };

    (
        get_i32(source, code_key).unwrap_or(0),
        get_str(source, message_key).unwrap_or_default().to_owned(),
    )
}
