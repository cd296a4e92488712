use std::{fmt, str::FromStr};

use serde_json::Value;

use super::field_map::{get_i32, tagged, type_tag, FieldMap};

/// Logical list a chat position belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum ChatList {
    #[default]
    Main,
    Archive,
    Filter(i32),
}

impl ChatList {
    /// Decodes a `chatList*` object. Both the folder and the older filter
    /// spelling are accepted.
    pub fn from_fields(map: &FieldMap) -> Option<Self> {
        match type_tag(map)? {
            "chatListMain" => Some(Self::Main),
            "chatListArchive" => Some(Self::Archive),
            "chatListFolder" => get_i32(map, "chat_folder_id").map(Self::Filter),
            "chatListFilter" => get_i32(map, "chat_filter_id").map(Self::Filter),
            _ => None,
        }
    }

    pub fn to_fields(self) -> FieldMap {
        match self {
            Self::Main => tagged("chatListMain"),
            Self::Archive => tagged("chatListArchive"),
            Self::Filter(folder_id) => {
                let mut map = tagged("chatListFolder");
                map.insert("chat_folder_id".to_owned(), Value::from(folder_id));
                map
            }
        }
    }
}

impl fmt::Display for ChatList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Main => f.write_str("main"),
            Self::Archive => f.write_str("archive"),
            Self::Filter(folder_id) => write!(f, "filter:{folder_id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseChatListError(String);

impl fmt::Display for ParseChatListError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown chat list `{}` (expected main, archive or filter:<id>)",
            self.0
        )
    }
}

impl std::error::Error for ParseChatListError {}

impl FromStr for ChatList {
    type Err = ParseChatListError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "main" => Ok(Self::Main),
            "archive" => Ok(Self::Archive),
            other => other
                .strip_prefix("filter:")
                .and_then(|id| id.parse().ok())
                .map(Self::Filter)
                .ok_or_else(|| ParseChatListError(value.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn fields(value: Value) -> FieldMap {
        value.as_object().cloned().expect("object fixture")
    }

    #[test]
    fn decodes_all_list_spellings() {
        assert_eq!(
            ChatList::from_fields(&fields(json!({"@type": "chatListMain"}))),
            Some(ChatList::Main)
        );
        assert_eq!(
            ChatList::from_fields(&fields(json!({"@type": "chatListArchive"}))),
            Some(ChatList::Archive)
        );
        assert_eq!(
            ChatList::from_fields(&fields(json!({"@type": "chatListFolder", "chat_folder_id": 3}))),
            Some(ChatList::Filter(3))
        );
        assert_eq!(
            ChatList::from_fields(&fields(json!({"@type": "chatListFilter", "chat_filter_id": 7}))),
            Some(ChatList::Filter(7))
        );
        assert_eq!(
            ChatList::from_fields(&fields(json!({"@type": "chatListFolder"}))),
            None
        );
    }

    #[test]
    fn encodes_back_to_a_decodable_object() {
        let list = ChatList::Filter(12);

        assert_eq!(ChatList::from_fields(&list.to_fields()), Some(list));
    }

    #[test]
    fn parses_cli_spelling() {
        assert_eq!("main".parse::<ChatList>(), Ok(ChatList::Main));
        assert_eq!("Archive".parse::<ChatList>(), Ok(ChatList::Archive));
        assert_eq!("filter:4".parse::<ChatList>(), Ok(ChatList::Filter(4)));
        assert!("filter:x".parse::<ChatList>().is_err());
        assert_eq!(ChatList::Filter(4).to_string(), "filter:4");
    }
}
