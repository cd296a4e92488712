//! Applies decoded updates to the store and ordering index.
//!
//! Updates are applied synchronously, one at a time, in the order they were
//! handed in. Each applied mutation yields one entity-scoped [`Change`];
//! position-bearing updates add a [`Change::ChatPosition`].

use serde_json::Value;

use crate::{
    domain::{
        chat::ChatPosition,
        events::Change,
        field_map::{get_i32, get_i64, FieldMap},
        ordering::OrderingIndex,
        store::{EntityKind, EntityStore, Upsert, UpsertOutcome},
    },
    telegram::updates::Update,
};

const UPDATE_MALFORMED: &str = "ROUTER_UPDATE_MALFORMED";
const MESSAGE_SEND_FAILED: &str = "ROUTER_MESSAGE_SEND_FAILED";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    pub applied: u64,
    pub ignored: u64,
}

#[derive(Debug, Default)]
pub struct EventRouter {
    stats: RouterStats,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> RouterStats {
        self.stats
    }

    pub fn route(
        &mut self,
        store: &mut EntityStore,
        index: &mut OrderingIndex,
        tag: &str,
        payload: FieldMap,
    ) -> Vec<Change> {
        let changes = apply(store, index, Update::decode(tag, payload));

        if changes.is_empty() {
            self.stats.ignored += 1;
        } else {
            self.stats.applied += 1;
            tracing::debug!(tag, changes = changes.len(), "update applied");
        }

        changes
    }
}

fn apply(store: &mut EntityStore, index: &mut OrderingIndex, update: Update) -> Vec<Change> {
    let mut changes = Vec::new();

    match update {
        Update::NewChat { mut chat } => {
            let Some(chat_id) = get_i64(&chat, "id") else {
                tracing::debug!(code = UPDATE_MALFORMED, tag = "updateNewChat", "chat without id");
                return changes;
            };
            let positions = chat
                .remove("positions")
                .as_ref()
                .and_then(Value::as_array)
                .map(|values| ChatPosition::from_values(values))
                .unwrap_or_default();

            if store.upsert(EntityKind::Chat, chat_id, Upsert::Full(chat)).is_change() {
                changes.push(Change::chat(chat_id));
            }
            apply_positions(store, index, chat_id, positions, &mut changes);
        }
        Update::ChatTitle { chat_id, title } => {
            patch_chat(store, chat_id, [("title", title)], &mut changes);
        }
        Update::ChatPhoto { chat_id, photo } => {
            patch_chat(store, chat_id, [("photo", photo)], &mut changes);
        }
        Update::ChatPermissions {
            chat_id,
            permissions,
        } => {
            patch_chat(store, chat_id, [("permissions", permissions)], &mut changes);
        }
        Update::ChatLastMessage {
            chat_id,
            last_message,
            positions,
        } => {
            patch_chat(store, chat_id, [("last_message", last_message)], &mut changes);
            apply_positions(store, index, chat_id, positions, &mut changes);
        }
        Update::ChatPosition { chat_id, position } => {
            apply_positions(store, index, chat_id, vec![position], &mut changes);
        }
        Update::ChatReadInbox {
            chat_id,
            last_read_inbox_message_id,
            unread_count,
        } => {
            patch_chat(
                store,
                chat_id,
                [
                    ("last_read_inbox_message_id", last_read_inbox_message_id),
                    ("unread_count", unread_count),
                ],
                &mut changes,
            );
        }
        Update::ChatReadOutbox {
            chat_id,
            last_read_outbox_message_id,
        } => {
            patch_chat(
                store,
                chat_id,
                [("last_read_outbox_message_id", last_read_outbox_message_id)],
                &mut changes,
            );
        }
        Update::ChatActionBar {
            chat_id,
            action_bar,
        } => {
            patch_chat(store, chat_id, [("action_bar", action_bar)], &mut changes);
        }
        Update::ChatDraftMessage {
            chat_id,
            draft_message,
            positions,
        } => {
            patch_chat(store, chat_id, [("draft_message", draft_message)], &mut changes);
            apply_positions(store, index, chat_id, positions, &mut changes);
        }
        Update::ChatNotificationSettings {
            chat_id,
            notification_settings,
        } => {
            patch_chat(
                store,
                chat_id,
                [("notification_settings", notification_settings)],
                &mut changes,
            );
        }
        Update::ChatReplyMarkup {
            chat_id,
            reply_markup_message_id,
        } => {
            patch_chat(
                store,
                chat_id,
                [("reply_markup_message_id", reply_markup_message_id)],
                &mut changes,
            );
        }
        Update::ChatUnreadMentionCount {
            chat_id,
            unread_mention_count,
        } => {
            patch_chat(
                store,
                chat_id,
                [("unread_mention_count", unread_mention_count)],
                &mut changes,
            );
        }
        Update::ChatIsMarkedAsUnread {
            chat_id,
            is_marked_as_unread,
        } => {
            patch_chat(
                store,
                chat_id,
                [("is_marked_as_unread", is_marked_as_unread)],
                &mut changes,
            );
        }
        Update::ChatOnlineMemberCount {
            chat_id,
            online_member_count,
        } => {
            changes.push(Change::ChatOnlineMemberCount {
                chat_id,
                count: online_member_count,
            });
        }
        Update::User { user } => upsert_snapshot(store, EntityKind::User, user, &mut changes),
        Update::BasicGroup { basic_group } => {
            upsert_snapshot(store, EntityKind::BasicGroup, basic_group, &mut changes);
        }
        Update::Supergroup { supergroup } => {
            upsert_snapshot(store, EntityKind::Supergroup, supergroup, &mut changes);
        }
        Update::UserFullInfo { user_id, info } => {
            upsert_keyed(store, EntityKind::UserFullInfo, user_id, info, &mut changes);
        }
        Update::BasicGroupFullInfo {
            basic_group_id,
            info,
        } => {
            upsert_keyed(
                store,
                EntityKind::BasicGroupFullInfo,
                basic_group_id,
                info,
                &mut changes,
            );
        }
        Update::SupergroupFullInfo {
            supergroup_id,
            info,
        } => {
            upsert_keyed(
                store,
                EntityKind::SupergroupFullInfo,
                supergroup_id,
                info,
                &mut changes,
            );
        }
        Update::File { file } => {
            let Some(file_id) = get_i32(&file, "id") else {
                tracing::debug!(code = UPDATE_MALFORMED, tag = "updateFile", "file without id");
                return changes;
            };
            if store.upsert(EntityKind::File, file_id, Upsert::Full(file)).is_change() {
                changes.push(Change::Entity {
                    kind: EntityKind::File,
                    id: file_id.into(),
                });
            }
        }
        Update::Option { name, value } => {
            if store.set_option(&name, value).is_change() {
                changes.push(Change::Entity {
                    kind: EntityKind::Option,
                    id: name.into(),
                });
            }
        }
        Update::ChatFolders { folders } => {
            store.set_chat_folders(folders);
            changes.push(Change::ChatFolders);
        }
        Update::NewMessage { message } => {
            if let Some((chat_id, message_id, created)) = store.insert_message(message) {
                changes.push(if created {
                    Change::MessageAdded {
                        chat_id,
                        message_id,
                    }
                } else {
                    Change::MessageUpdated {
                        chat_id,
                        message_id,
                    }
                });
            }
        }
        Update::MessageSendSucceeded {
            message,
            old_message_id,
        } => replace_message(store, message, old_message_id, &mut changes),
        Update::MessageSendFailed {
            message,
            old_message_id,
            error_code,
            error_message,
        } => {
            tracing::warn!(
                code = MESSAGE_SEND_FAILED,
                old_message_id,
                error_code,
                error_message = %error_message,
                "message send failed"
            );
            replace_message(store, message, old_message_id, &mut changes);
        }
        Update::MessageContent {
            chat_id,
            message_id,
            new_content,
        } => patch_message(store, chat_id, message_id, [("content", new_content)], &mut changes),
        Update::MessageEdited {
            chat_id,
            message_id,
            edit_date,
            reply_markup,
        } => patch_message(
            store,
            chat_id,
            message_id,
            [("edit_date", edit_date), ("reply_markup", reply_markup)],
            &mut changes,
        ),
        Update::MessageIsPinned {
            chat_id,
            message_id,
            is_pinned,
        } => patch_message(
            store,
            chat_id,
            message_id,
            [("is_pinned", Value::Bool(is_pinned))],
            &mut changes,
        ),
        Update::MessageInteractionInfo {
            chat_id,
            message_id,
            interaction_info,
        } => patch_message(
            store,
            chat_id,
            message_id,
            [("interaction_info", interaction_info)],
            &mut changes,
        ),
        Update::DeleteMessages {
            chat_id,
            message_ids,
        } => {
            let removed = store.remove_messages(chat_id, &message_ids);
            if !removed.is_empty() {
                changes.push(Change::MessagesDeleted {
                    chat_id,
                    message_ids: removed,
                });
            }
        }
        Update::Malformed(tag) => {
            tracing::debug!(code = UPDATE_MALFORMED, tag = %tag, "update dropped");
        }
        Update::Unknown(tag) => {
            tracing::trace!(tag = %tag, "unhandled update dropped");
        }
    }

    changes
}

fn patch_chat<const N: usize>(
    store: &mut EntityStore,
    chat_id: i64,
    fields: [(&str, Value); N],
    changes: &mut Vec<Change>,
) {
    let patch = fields
        .into_iter()
        .map(|(key, value)| (key.to_owned(), value))
        .collect();

    if store
        .upsert(EntityKind::Chat, chat_id, Upsert::Patch(patch))
        .is_change()
    {
        changes.push(Change::chat(chat_id));
    }
}

fn patch_message<const N: usize>(
    store: &mut EntityStore,
    chat_id: i64,
    message_id: i64,
    fields: [(&str, Value); N],
    changes: &mut Vec<Change>,
) {
    let patch = fields
        .into_iter()
        .map(|(key, value)| (key.to_owned(), value))
        .collect();

    if store.patch_message(chat_id, message_id, patch) == UpsertOutcome::Updated {
        changes.push(Change::MessageUpdated {
            chat_id,
            message_id,
        });
    }
}

fn apply_positions(
    store: &mut EntityStore,
    index: &mut OrderingIndex,
    chat_id: i64,
    positions: Vec<ChatPosition>,
    changes: &mut Vec<Change>,
) {
    if positions.is_empty() {
        return;
    }

    let lists: Vec<_> = positions.iter().map(|position| position.list).collect();
    if store.set_chat_positions(chat_id, positions) {
        index.mark_stale(lists.iter().copied());
        changes.push(Change::ChatPosition { chat_id, lists });
    }
}

fn upsert_snapshot(
    store: &mut EntityStore,
    kind: EntityKind,
    snapshot: FieldMap,
    changes: &mut Vec<Change>,
) {
    match get_i64(&snapshot, "id") {
        Some(id) => upsert_keyed(store, kind, id, snapshot, changes),
        None => tracing::debug!(
            code = UPDATE_MALFORMED,
            kind = kind.as_label(),
            "snapshot without id"
        ),
    }
}

fn upsert_keyed(
    store: &mut EntityStore,
    kind: EntityKind,
    id: i64,
    snapshot: FieldMap,
    changes: &mut Vec<Change>,
) {
    if store.upsert(kind, id, Upsert::Full(snapshot)).is_change() {
        changes.push(Change::Entity {
            kind,
            id: id.into(),
        });
    }
}

fn replace_message(
    store: &mut EntityStore,
    message: FieldMap,
    old_message_id: i64,
    changes: &mut Vec<Change>,
) {
    let Some(chat_id) = get_i64(&message, "chat_id") else {
        return;
    };

    if let Some(message_id) = store.replace_message(chat_id, old_message_id, message) {
        changes.push(Change::MessageReplaced {
            chat_id,
            old_message_id,
            message_id,
        });
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        domain::{chat_list::ChatList, store::EntityId},
        test_support::{chat_fixture, fields, main_position, message_fixture},
    };

    struct Fixture {
        store: EntityStore,
        index: OrderingIndex,
        router: EventRouter,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                store: EntityStore::new(),
                index: OrderingIndex::new(),
                router: EventRouter::new(),
            }
        }

        fn route(&mut self, tag: &str, payload: serde_json::Value) -> Vec<Change> {
            self.router
                .route(&mut self.store, &mut self.index, tag, fields(payload))
        }

        fn new_chat(&mut self, chat_id: i64, title: &str) -> Vec<Change> {
            self.route(
                "updateNewChat",
                json!({"@type": "updateNewChat", "chat": chat_fixture(chat_id, title)}),
            )
        }
    }

    #[test]
    fn title_patch_after_creation_wins() {
        let mut fixture = Fixture::new();

        fixture.new_chat(5, "A");
        let changes = fixture.route("updateChatTitle", json!({"chat_id": 5, "title": "B"}));

        assert_eq!(changes, vec![Change::chat(5)]);
        assert_eq!(
            fixture.store.chat(5).and_then(|chat| chat.get("title")),
            Some(&json!("B"))
        );
    }

    #[test]
    fn patch_for_unknown_chat_emits_nothing() {
        let mut fixture = Fixture::new();

        let changes = fixture.route("updateChatTitle", json!({"chat_id": 5, "title": "B"}));

        assert!(changes.is_empty());
        assert!(fixture.store.chat(5).is_none());
        assert_eq!(fixture.router.stats().ignored, 1);
    }

    #[test]
    fn repeated_patch_notifies_once() {
        let mut fixture = Fixture::new();
        fixture.new_chat(5, "A");

        let read = json!({"chat_id": 5, "last_read_inbox_message_id": 9, "unread_count": 2});
        let first = fixture.route("updateChatReadInbox", read.clone());
        let second = fixture.route("updateChatReadInbox", read);

        assert_eq!(first, vec![Change::chat(5)]);
        assert!(second.is_empty());
    }

    #[test]
    fn new_chat_positions_are_split_out_and_indexed() {
        let mut fixture = Fixture::new();
        let mut chat = chat_fixture(5, "A");
        chat.insert("positions".to_owned(), json!([main_position(100, false)]));

        let changes = fixture.route("updateNewChat", json!({"chat": chat}));

        assert_eq!(
            changes,
            vec![
                Change::chat(5),
                Change::ChatPosition {
                    chat_id: 5,
                    lists: vec![ChatList::Main]
                }
            ]
        );
        assert!(fixture.store.chat(5).and_then(|chat| chat.get("positions")).is_none());
        assert_eq!(fixture.store.chat_order(5, ChatList::Main), 100);
        assert!(fixture.index.has_stale());
    }

    #[test]
    fn successive_positions_replace_each_other() {
        let mut fixture = Fixture::new();
        fixture.new_chat(5, "A");

        fixture.route(
            "updateChatPosition",
            json!({"chat_id": 5, "position": main_position(100, false)}),
        );
        let changes = fixture.route(
            "updateChatPosition",
            json!({"chat_id": 5, "position": main_position(200, false)}),
        );

        assert_eq!(
            changes,
            vec![Change::ChatPosition {
                chat_id: 5,
                lists: vec![ChatList::Main]
            }]
        );
        assert_eq!(fixture.store.chat_positions(5).len(), 1);
        assert_eq!(fixture.store.chat_order(5, ChatList::Main), 200);
    }

    #[test]
    fn last_message_update_patches_and_repositions() {
        let mut fixture = Fixture::new();
        fixture.new_chat(5, "A");

        let changes = fixture.route(
            "updateChatLastMessage",
            json!({
                "chat_id": 5,
                "last_message": message_fixture(5, 10),
                "positions": [main_position(300, false)]
            }),
        );

        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0], Change::chat(5));
        assert_eq!(fixture.store.chat_order(5, ChatList::Main), 300);
    }

    #[test]
    fn position_for_unknown_chat_is_dropped() {
        let mut fixture = Fixture::new();

        let changes = fixture.route(
            "updateChatPosition",
            json!({"chat_id": 8, "position": main_position(100, false)}),
        );

        assert!(changes.is_empty());
        assert!(!fixture.index.has_stale());
    }

    #[test]
    fn unknown_tags_are_ignored() {
        let mut fixture = Fixture::new();

        let changes = fixture.route("updateAnimatedEmojiMessageClicked", json!({"chat_id": 1}));

        assert!(changes.is_empty());
    }

    #[test]
    fn user_and_file_snapshots_are_keyed_by_id() {
        let mut fixture = Fixture::new();

        let user = fixture.route(
            "updateUser",
            json!({"user": {"@type": "user", "id": 12, "first_name": "Ann"}}),
        );
        let file = fixture.route(
            "updateFile",
            json!({"file": {"@type": "file", "id": 4, "size": 10}}),
        );

        assert_eq!(
            user,
            vec![Change::Entity {
                kind: EntityKind::User,
                id: EntityId::Int(12)
            }]
        );
        assert_eq!(
            file,
            vec![Change::Entity {
                kind: EntityKind::File,
                id: EntityId::Int(4)
            }]
        );
        assert!(fixture.store.get(EntityKind::File, 4_i32).is_some());
    }

    #[test]
    fn message_lifecycle_emits_scoped_changes() {
        let mut fixture = Fixture::new();

        let added = fixture.route("updateNewMessage", json!({"message": message_fixture(7, 3)}));
        let pinned = fixture.route(
            "updateMessageIsPinned",
            json!({"chat_id": 7, "message_id": 3, "is_pinned": true}),
        );
        let deleted = fixture.route(
            "updateDeleteMessages",
            json!({"chat_id": 7, "message_ids": [3, 4]}),
        );

        assert_eq!(
            added,
            vec![Change::MessageAdded {
                chat_id: 7,
                message_id: 3
            }]
        );
        assert_eq!(
            pinned,
            vec![Change::MessageUpdated {
                chat_id: 7,
                message_id: 3
            }]
        );
        assert_eq!(
            deleted,
            vec![Change::MessagesDeleted {
                chat_id: 7,
                message_ids: vec![3]
            }]
        );
    }

    #[test]
    fn send_succeeded_replaces_temporary_id() {
        let mut fixture = Fixture::new();
        fixture.route("updateNewMessage", json!({"message": message_fixture(7, 1_000_001)}));

        let changes = fixture.route(
            "updateMessageSendSucceeded",
            json!({"old_message_id": 1_000_001, "message": message_fixture(7, 50)}),
        );

        assert_eq!(
            changes,
            vec![Change::MessageReplaced {
                chat_id: 7,
                old_message_id: 1_000_001,
                message_id: 50
            }]
        );
        assert_eq!(fixture.store.message_ids(7), vec![50]);
    }

    #[test]
    fn option_update_sets_my_id() {
        let mut fixture = Fixture::new();

        fixture.route(
            "updateOption",
            json!({"name": "my_id", "value": {"@type": "optionValueInteger", "value": "99"}}),
        );

        assert_eq!(fixture.store.my_id(), 99);
    }
}
