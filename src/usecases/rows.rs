//! Row rendering for list consumers: store snapshots to role-keyed field-maps.

use chrono::{TimeZone, Utc};
use serde_json::Value;

use crate::domain::{
    chat::mute_for,
    chat_list::ChatList,
    field_map::{get_bool, get_i32, get_i64, get_map, get_path, get_str, type_tag, FieldMap},
    store::{EntityKind, EntityStore},
};

pub const CHAT_ROLES: &[&str] = &[
    "id",
    "type",
    "title",
    "photo",
    "lastMessageSender",
    "lastMessageContent",
    "lastMessageDate",
    "isPinned",
    "unreadCount",
    "isMuted",
];

pub const MESSAGE_ROLES: &[&str] = &[
    "id",
    "sender",
    "chatId",
    "sendingState",
    "isOutgoing",
    "isPinned",
    "date",
    "editDate",
    "interactionInfo",
    "content",
    "replyMarkup",
    "isServiceMessage",
    "section",
];

const REGULAR_CONTENT: &[&str] = &[
    "messageText",
    "messageAnimation",
    "messageAudio",
    "messageDocument",
    "messagePhoto",
    "messageSticker",
    "messageVideo",
    "messageVideoNote",
    "messageVoiceNote",
    "messageLocation",
    "messageVenue",
    "messageContact",
    "messageAnimatedEmoji",
    "messageDice",
    "messageGame",
    "messagePoll",
    "messageInvoice",
    "messageCall",
    "messageUnsupported",
];

pub fn chat_row(store: &EntityStore, chat_id: i64, list: ChatList) -> Option<FieldMap> {
    let chat = store.chat(chat_id)?.fields();
    let last_message = get_map(chat, "last_message");

    let mut row = FieldMap::new();
    row.insert("id".to_owned(), Value::from(chat_id.to_string()));
    row.insert(
        "type".to_owned(),
        get_path(chat, &["type", "@type"])
            .and_then(Value::as_str)
            .map(|tag| Value::from(tag.trim_start_matches("chatType").to_ascii_lowercase()))
            .unwrap_or(Value::Null),
    );
    row.insert(
        "title".to_owned(),
        chat.get("title").cloned().unwrap_or(Value::Null),
    );
    row.insert("photo".to_owned(), downloaded_small_photo(store, chat));
    row.insert(
        "lastMessageSender".to_owned(),
        last_message
            .map(|message| Value::from(sender_name(store, message)))
            .unwrap_or(Value::Null),
    );
    row.insert(
        "lastMessageContent".to_owned(),
        last_message
            .and_then(|message| get_map(message, "content"))
            .map(|content| Value::from(content_preview(content)))
            .unwrap_or(Value::Null),
    );
    row.insert(
        "lastMessageDate".to_owned(),
        last_message
            .and_then(|message| get_i64(message, "date"))
            .and_then(format_date)
            .map(Value::from)
            .unwrap_or(Value::Null),
    );
    row.insert(
        "isPinned".to_owned(),
        Value::from(
            store
                .chat_position(chat_id, list)
                .is_some_and(|position| position.is_pinned),
        ),
    );
    row.insert(
        "unreadCount".to_owned(),
        Value::from(get_i32(chat, "unread_count").unwrap_or(0)),
    );
    row.insert("isMuted".to_owned(), Value::from(mute_for(chat) > 0));

    Some(row)
}

pub fn message_row(store: &EntityStore, chat_id: i64, message_id: i64) -> Option<FieldMap> {
    let message = store.message(chat_id, message_id)?.fields();
    let content = get_map(message, "content");

    let mut row = FieldMap::new();
    row.insert("id".to_owned(), Value::from(message_id.to_string()));
    row.insert("sender".to_owned(), Value::from(sender_name(store, message)));
    row.insert("chatId".to_owned(), Value::from(chat_id.to_string()));
    row.insert(
        "sendingState".to_owned(),
        get_path(message, &["sending_state", "@type"])
            .cloned()
            .unwrap_or(Value::Null),
    );
    row.insert(
        "isOutgoing".to_owned(),
        Value::from(get_bool(message, "is_outgoing").unwrap_or(false)),
    );
    row.insert(
        "isPinned".to_owned(),
        Value::from(get_bool(message, "is_pinned").unwrap_or(false)),
    );
    let date = get_i64(message, "date");
    row.insert(
        "date".to_owned(),
        date.and_then(format_date).map(Value::from).unwrap_or(Value::Null),
    );
    row.insert(
        "editDate".to_owned(),
        get_i64(message, "edit_date")
            .filter(|date| *date > 0)
            .and_then(format_date)
            .map(Value::from)
            .unwrap_or(Value::Null),
    );
    for (role, key) in [
        ("interactionInfo", "interaction_info"),
        ("content", "content"),
        ("replyMarkup", "reply_markup"),
    ] {
        row.insert(role.to_owned(), message.get(key).cloned().unwrap_or(Value::Null));
    }
    row.insert(
        "isServiceMessage".to_owned(),
        Value::from(content.is_some_and(is_service_content)),
    );
    row.insert(
        "section".to_owned(),
        date.and_then(format_day).map(Value::from).unwrap_or(Value::Null),
    );

    Some(row)
}

/// File id of a chat's small photo that still has to be downloaded.
pub fn pending_small_photo(store: &EntityStore, chat: &FieldMap) -> Option<i32> {
    let small = small_photo(store, chat)?;
    let completed = get_path(small, &["local", "is_downloading_completed"])
        .and_then(Value::as_bool)
        .unwrap_or(false);

    if completed {
        None
    } else {
        get_i32(small, "id")
    }
}

pub fn content_preview(content: &FieldMap) -> String {
    if let Some(text) = get_path(content, &["text", "text"]).and_then(Value::as_str) {
        return text.to_owned();
    }

    let caption = get_path(content, &["caption", "text"])
        .and_then(Value::as_str)
        .filter(|caption| !caption.is_empty());
    let kind = type_tag(content)
        .unwrap_or_default()
        .trim_start_matches("message");

    match caption {
        Some(caption) => format!("{kind}, {caption}"),
        None => kind.to_owned(),
    }
}

pub fn sender_name(store: &EntityStore, message: &FieldMap) -> String {
    let Some(sender) = get_map(message, "sender_id") else {
        return String::new();
    };

    match type_tag(sender) {
        Some("messageSenderUser") => get_i64(sender, "user_id")
            .and_then(|user_id| store.get(EntityKind::User, user_id))
            .map(|user| {
                let first = get_str(user.fields(), "first_name").unwrap_or_default();
                let last = get_str(user.fields(), "last_name").unwrap_or_default();
                format!("{first} {last}").trim().to_owned()
            })
            .unwrap_or_default(),
        Some("messageSenderChat") => get_i64(sender, "chat_id")
            .and_then(|chat_id| store.chat(chat_id))
            .and_then(|chat| get_str(chat.fields(), "title"))
            .unwrap_or_default()
            .to_owned(),
        _ => String::new(),
    }
}

pub fn format_date(unix_seconds: i64) -> Option<String> {
    format_unix(unix_seconds, "%Y-%m-%d %H:%M")
}

fn format_day(unix_seconds: i64) -> Option<String> {
    format_unix(unix_seconds, "%Y-%m-%d")
}

fn format_unix(unix_seconds: i64, pattern: &str) -> Option<String> {
    match Utc.timestamp_opt(unix_seconds, 0) {
        chrono::LocalResult::Single(datetime) => Some(datetime.format(pattern).to_string()),
        chrono::LocalResult::Ambiguous(datetime, _) => Some(datetime.format(pattern).to_string()),
        chrono::LocalResult::None => None,
    }
}

fn is_service_content(content: &FieldMap) -> bool {
    type_tag(content).is_some_and(|tag| !REGULAR_CONTENT.contains(&tag))
}

/// The chat's small photo file, preferring the stored `updateFile` snapshot
/// over the copy embedded in the chat.
fn small_photo<'a>(store: &'a EntityStore, chat: &'a FieldMap) -> Option<&'a FieldMap> {
    let small = get_path(chat, &["photo", "small"])?.as_object()?;
    match get_i32(small, "id").and_then(|file_id| store.get(EntityKind::File, file_id)) {
        Some(file) => Some(file.fields()),
        None => Some(small),
    }
}

fn downloaded_small_photo(store: &EntityStore, chat: &FieldMap) -> Value {
    let Some(local) = small_photo(store, chat).and_then(|file| get_map(file, "local")) else {
        return Value::Null;
    };

    if get_bool(local, "is_downloading_completed").unwrap_or(false) {
        local.get("path").cloned().unwrap_or(Value::Null)
    } else {
        Value::Null
    }
}
