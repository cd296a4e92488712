//! Entity store: the single owner of every snapshot the backend reported.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde_json::Value;

use super::{
    chat::{replace_positions, ChatPosition},
    chat_list::ChatList,
    field_map::{get_i64, merge_fields, FieldMap},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Chat,
    User,
    BasicGroup,
    Supergroup,
    File,
    UserFullInfo,
    BasicGroupFullInfo,
    SupergroupFullInfo,
    Option,
}

impl EntityKind {
    pub fn as_label(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::User => "user",
            Self::BasicGroup => "basic_group",
            Self::Supergroup => "supergroup",
            Self::File => "file",
            Self::UserFullInfo => "user_full_info",
            Self::BasicGroupFullInfo => "basic_group_full_info",
            Self::SupergroupFullInfo => "supergroup_full_info",
            Self::Option => "option",
        }
    }
}

/// Chats, users and groups use int64 ids, files int32, options their name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityId {
    Int(i64),
    Name(String),
}

impl EntityId {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(id) => Some(*id),
            Self::Name(_) => None,
        }
    }
}

impl From<i64> for EntityId {
    fn from(id: i64) -> Self {
        Self::Int(id)
    }
}

impl From<i32> for EntityId {
    fn from(id: i32) -> Self {
        Self::Int(i64::from(id))
    }
}

impl From<&str> for EntityId {
    fn from(name: &str) -> Self {
        Self::Name(name.to_owned())
    }
}

impl From<String> for EntityId {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Upsert {
    /// Complete snapshot: creates the entity on first sight.
    Full(FieldMap),
    /// Named fields only: applied to known entities, ignored otherwise.
    Patch(FieldMap),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    Unchanged,
    Ignored,
}

impl UpsertOutcome {
    pub fn is_change(self) -> bool {
        matches!(self, Self::Created | Self::Updated)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Entity {
    fields: FieldMap,
}

impl Entity {
    pub fn new(fields: FieldMap) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn i64(&self, key: &str) -> Option<i64> {
        get_i64(&self.fields, key)
    }
}

#[derive(Debug, Default)]
pub struct EntityStore {
    tables: HashMap<EntityKind, HashMap<EntityId, Entity>>,
    positions: HashMap<i64, Vec<ChatPosition>>,
    messages: HashMap<i64, BTreeMap<i64, Entity>>,
    chat_folders: Vec<FieldMap>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(
        &mut self,
        kind: EntityKind,
        id: impl Into<EntityId>,
        value: Upsert,
    ) -> UpsertOutcome {
        let id = id.into();
        let table = self.tables.entry(kind).or_default();

        match (table.get_mut(&id), value) {
            (Some(entity), Upsert::Full(fields) | Upsert::Patch(fields)) => {
                if merge_fields(&mut entity.fields, fields) {
                    UpsertOutcome::Updated
                } else {
                    UpsertOutcome::Unchanged
                }
            }
            (None, Upsert::Full(fields)) => {
                table.insert(id, Entity::new(fields));
                UpsertOutcome::Created
            }
            (None, Upsert::Patch(_)) => {
                tracing::trace!(
                    kind = kind.as_label(),
                    id = ?id,
                    "patch for unseen entity ignored"
                );
                UpsertOutcome::Ignored
            }
        }
    }

    pub fn get(&self, kind: EntityKind, id: impl Into<EntityId>) -> Option<&Entity> {
        self.tables.get(&kind)?.get(&id.into())
    }

    pub fn contains(&self, kind: EntityKind, id: impl Into<EntityId>) -> bool {
        self.get(kind, id).is_some()
    }

    pub fn ids(&self, kind: EntityKind) -> BTreeSet<EntityId> {
        self.tables
            .get(&kind)
            .map(|table| table.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn chat(&self, chat_id: i64) -> Option<&Entity> {
        self.get(EntityKind::Chat, chat_id)
    }

    /// Applies positions to a known chat. Returns `false` when the chat has
    /// not been seen yet; its creation event will carry the positions.
    pub fn set_chat_positions(&mut self, chat_id: i64, positions: Vec<ChatPosition>) -> bool {
        if !self.contains(EntityKind::Chat, chat_id) {
            tracing::trace!(chat_id, "positions for unseen chat dropped");
            return false;
        }

        replace_positions(self.positions.entry(chat_id).or_default(), positions);
        true
    }

    pub fn chat_positions(&self, chat_id: i64) -> &[ChatPosition] {
        self.positions
            .get(&chat_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn chat_position(&self, chat_id: i64, list: ChatList) -> Option<&ChatPosition> {
        self.chat_positions(chat_id)
            .iter()
            .find(|position| position.list == list)
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn chat_order(&self, chat_id: i64, list: ChatList) -> i64 {
        self.chat_position(chat_id, list)
            .map(|position| position.order)
            .unwrap_or(0)
    }

    /// Every chat with a non-zero position in `list`.
    pub fn listed_chats(&self, list: ChatList) -> Vec<(i64, ChatPosition)> {
        self.positions
            .iter()
            .filter_map(|(chat_id, positions)| {
                positions
                    .iter()
                    .find(|position| position.list == list && position.is_listed())
                    .map(|position| (*chat_id, *position))
            })
            .collect()
    }

    /// Stores a complete message keyed by its own `chat_id`. Returns the
    /// chat id, message id and whether it was new.
    pub fn insert_message(&mut self, message: FieldMap) -> Option<(i64, i64, bool)> {
        let chat_id = get_i64(&message, "chat_id")?;
        let message_id = get_i64(&message, "id")?;
        let chat_messages = self.messages.entry(chat_id).or_default();

        let created = match chat_messages.get_mut(&message_id) {
            Some(existing) => {
                merge_fields(&mut existing.fields, message);
                false
            }
            None => {
                chat_messages.insert(message_id, Entity::new(message));
                true
            }
        };

        Some((chat_id, message_id, created))
    }

    pub fn patch_message(
        &mut self,
        chat_id: i64,
        message_id: i64,
        patch: FieldMap,
    ) -> UpsertOutcome {
        match self
            .messages
            .get_mut(&chat_id)
            .and_then(|messages| messages.get_mut(&message_id))
        {
            Some(entity) => {
                if merge_fields(&mut entity.fields, patch) {
                    UpsertOutcome::Updated
                } else {
                    UpsertOutcome::Unchanged
                }
            }
            None => UpsertOutcome::Ignored,
        }
    }

    /// Drops a temporary message and stores its final replacement.
    pub fn replace_message(
        &mut self,
        chat_id: i64,
        old_message_id: i64,
        message: FieldMap,
    ) -> Option<i64> {
        if let Some(messages) = self.messages.get_mut(&chat_id) {
            messages.remove(&old_message_id);
        }

        let (stored_chat_id, message_id, _) = self.insert_message(message)?;
        (stored_chat_id == chat_id).then_some(message_id)
    }

    /// Removes the given messages and returns the ids that were present.
    pub fn remove_messages(&mut self, chat_id: i64, message_ids: &[i64]) -> Vec<i64> {
        let Some(messages) = self.messages.get_mut(&chat_id) else {
            return Vec::new();
        };

        message_ids
            .iter()
            .filter(|id| messages.remove(*id).is_some())
            .copied()
            .collect()
    }

    pub fn message(&self, chat_id: i64, message_id: i64) -> Option<&Entity> {
        self.messages.get(&chat_id)?.get(&message_id)
    }

    /// Known messages among `message_ids`, in the given order.
    pub fn messages_in(&self, chat_id: i64, message_ids: &[i64]) -> Vec<&Entity> {
        message_ids
            .iter()
            .filter_map(|message_id| self.message(chat_id, *message_id))
            .collect()
    }

    pub fn message_ids(&self, chat_id: i64) -> Vec<i64> {
        self.messages
            .get(&chat_id)
            .map(|messages| messages.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn set_option(&mut self, name: &str, value: Value) -> UpsertOutcome {
        let mut fields = FieldMap::new();
        fields.insert("name".to_owned(), Value::String(name.to_owned()));
        fields.insert("value".to_owned(), value);
        self.upsert(EntityKind::Option, name, Upsert::Full(fields))
    }

    pub fn option(&self, name: &str) -> Option<&Value> {
        self.get(EntityKind::Option, name)?.get("value")
    }

    pub fn my_id(&self) -> i64 {
        self.get(EntityKind::Option, "my_id")
            .and_then(|entity| entity.i64("value"))
            .unwrap_or(0)
    }

    pub fn set_chat_folders(&mut self, folders: Vec<FieldMap>) {
        self.chat_folders = folders;
    }

    pub fn chat_folders(&self) -> &[FieldMap] {
        &self.chat_folders
    }
}
