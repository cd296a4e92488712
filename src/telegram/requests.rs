//! Builders for the backend methods the cache issues.

use serde_json::Value;

use crate::domain::{chat_list::ChatList, field_map::{tagged, FieldMap}};

/// Mute duration treated as "mute forever" (about a year, in seconds).
pub const MUTE_FOREVER_SECONDS: i64 = 366 * 24 * 60 * 60;

/// Cursor of a `getChatHistory` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryCursor {
    pub from_message_id: i64,
    pub offset: i32,
    pub limit: i32,
}

fn with(mut map: FieldMap, key: &str, value: impl Into<Value>) -> FieldMap {
    map.insert(key.to_owned(), value.into());
    map
}

pub fn load_chats(list: ChatList, limit: i32) -> FieldMap {
    let request = with(tagged("loadChats"), "chat_list", Value::Object(list.to_fields()));
    with(request, "limit", limit)
}

pub fn get_chat_history(chat_id: i64, cursor: HistoryCursor) -> FieldMap {
    let request = with(tagged("getChatHistory"), "chat_id", chat_id);
    let request = with(request, "from_message_id", cursor.from_message_id);
    let request = with(request, "offset", cursor.offset);
    let request = with(request, "limit", cursor.limit);
    with(request, "only_local", false)
}

pub fn open_chat(chat_id: i64) -> FieldMap {
    with(tagged("openChat"), "chat_id", chat_id)
}

pub fn close_chat(chat_id: i64) -> FieldMap {
    with(tagged("closeChat"), "chat_id", chat_id)
}

pub fn view_messages(chat_id: i64, message_ids: &[i64]) -> FieldMap {
    let request = with(tagged("viewMessages"), "chat_id", chat_id);
    let request = with(request, "message_thread_id", 0);
    let request = with(request, "message_ids", message_ids.to_vec());
    with(request, "force_read", true)
}

pub fn toggle_chat_is_pinned(list: ChatList, chat_id: i64, is_pinned: bool) -> FieldMap {
    let request = with(tagged("toggleChatIsPinned"), "chat_list", Value::Object(list.to_fields()));
    let request = with(request, "chat_id", chat_id);
    with(request, "is_pinned", is_pinned)
}

pub fn set_chat_mute_for(chat_id: i64, mute_for: i64) -> FieldMap {
    let settings = with(tagged("chatNotificationSettings"), "use_default_mute_for", false);
    let settings = with(settings, "mute_for", mute_for);

    let request = with(tagged("setChatNotificationSettings"), "chat_id", chat_id);
    with(request, "notification_settings", Value::Object(settings))
}

pub fn send_text_message(chat_id: i64, text: &str, reply_to_message_id: i64) -> FieldMap {
    let formatted = with(tagged("formattedText"), "text", text);
    let content = with(tagged("inputMessageText"), "text", Value::Object(formatted));

    let mut request = with(tagged("sendMessage"), "chat_id", chat_id);
    if reply_to_message_id != 0 {
        request = with(request, "reply_to_message_id", reply_to_message_id);
    }
    with(request, "input_message_content", Value::Object(content))
}

pub fn delete_messages(chat_id: i64, message_ids: &[i64], revoke: bool) -> FieldMap {
    let request = with(tagged("deleteMessages"), "chat_id", chat_id);
    let request = with(request, "message_ids", message_ids.to_vec());
    with(request, "revoke", revoke)
}

pub fn download_file(file_id: i32, priority: i32) -> FieldMap {
    let request = with(tagged("downloadFile"), "file_id", file_id);
    let request = with(request, "priority", priority);
    let request = with(request, "offset", 0);
    let request = with(request, "limit", 0);
    with(request, "synchronous", false)
}
