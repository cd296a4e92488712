use serde_json::Value;

use crate::{
    domain::{
        events::Change,
        field_map::{get_bool, get_i32, get_i64, get_path, FieldMap},
        store::EntityStore,
    },
    telegram::{
        client::BackendError,
        requests::{self, HistoryCursor},
    },
};

use super::{
    contracts::{ConsumerId, ModelContext, ModelEvent, Pending},
    pagination::{Direction, PageRequest, PaginationController, PaginationState},
    projection::ListProjection,
    rows::{message_row, MESSAGE_ROLES},
    send_message::{self, DeleteMessagesCommand, SendMessageCommand, SendMessageError},
};

const HISTORY_FAILED: &str = "MESSAGE_LIST_HISTORY_FAILED";

/// Messages of the open chat, ascending by id.
#[derive(Debug)]
pub struct MessageListModel {
    id: ConsumerId,
    chat_id: i64,
    page_size: i32,
    pagination: PaginationController,
    projection: ListProjection,
    online_member_count: i32,
}

impl MessageListModel {
    pub fn new(id: ConsumerId, page_size: i32) -> Self {
        Self {
            id,
            chat_id: 0,
            page_size,
            pagination: PaginationController::new(),
            projection: ListProjection::new(),
            online_member_count: 0,
        }
    }

    pub fn id(&self) -> ConsumerId {
        self.id
    }

    /// `0` while no chat is open.
    pub fn chat_id(&self) -> i64 {
        self.chat_id
    }

    pub fn view<'a>(&'a self, store: &'a EntityStore) -> MessageListView<'a> {
        MessageListView { model: self, store }
    }

    pub fn open_chat(&mut self, ctx: &mut ModelContext<'_>, chat_id: i64) {
        if chat_id == self.chat_id {
            return;
        }

        if self.chat_id != 0 {
            ctx.requests.send(requests::close_chat(self.chat_id));
        }

        tracing::debug!(consumer = %self.id, chat_id, "chat opened");
        self.chat_id = chat_id;
        self.clear(ctx);
        if chat_id == 0 {
            return;
        }

        ctx.requests.send(requests::open_chat(chat_id));
        self.fetch_more(ctx);
    }

    pub fn close_chat(&mut self, ctx: &mut ModelContext<'_>) {
        if self.chat_id == 0 {
            return;
        }

        ctx.requests.send(requests::close_chat(self.chat_id));
        tracing::debug!(consumer = %self.id, chat_id = self.chat_id, "chat closed");
        self.chat_id = 0;
        self.clear(ctx);
    }

    pub fn fetch_more(&mut self, ctx: &mut ModelContext<'_>) -> bool {
        if self.chat_id == 0 {
            return false;
        }
        match self.pagination.fetch_more() {
            Some(page) => {
                self.request_page(ctx, page);
                true
            }
            None => false,
        }
    }

    pub fn load_history(&mut self, ctx: &mut ModelContext<'_>) -> bool {
        if self.chat_id == 0 {
            return false;
        }
        match self.pagination.load_history() {
            Some(page) => {
                self.request_page(ctx, page);
                true
            }
            None => false,
        }
    }

    /// Merges a `getChatHistory` answer. The messages themselves are already
    /// in the store; `result` carries their ids.
    pub fn on_history(
        &mut self,
        ctx: &mut ModelContext<'_>,
        generation: u64,
        direction: Direction,
        result: Result<Vec<i64>, BackendError>,
    ) {
        match result {
            Ok(ids) => {
                let Some(merge) = self.pagination.complete(direction, generation, ids) else {
                    return;
                };
                tracing::debug!(
                    consumer = %self.id,
                    chat_id = self.chat_id,
                    ?direction,
                    inserted = merge.inserted.len(),
                    exhausted = merge.exhausted,
                    "history page merged"
                );
                self.sync_rows(ctx);
                self.view_unread(ctx, &merge.inserted);
            }
            Err(error) => {
                if !self.pagination.fail(direction, generation) {
                    return;
                }
                tracing::warn!(
                    code = HISTORY_FAILED,
                    consumer = %self.id,
                    chat_id = self.chat_id,
                    error_code = error.code,
                    error = %error.message,
                    "history page failed"
                );
                ctx.emit(ModelEvent::Error {
                    consumer: self.id,
                    code: error.code,
                    message: error.message,
                });
            }
        }

        self.emit_loading(ctx);
    }

    pub fn on_change(&mut self, ctx: &mut ModelContext<'_>, change: &Change) {
        if change.chat_id() != Some(self.chat_id) || self.chat_id == 0 {
            return;
        }

        match change {
            Change::MessageAdded { message_id, .. } => self.on_live_message(ctx, *message_id),
            Change::MessageUpdated { message_id, .. } => {
                if let Some(row) = self.projection.updated(*message_id) {
                    ctx.emit_rows(self.id, [row]);
                }
            }
            Change::MessageReplaced {
                old_message_id,
                message_id,
                ..
            } => {
                if self.pagination.replace(*old_message_id, *message_id) {
                    self.sync_rows(ctx);
                }
            }
            Change::MessagesDeleted { message_ids, .. } => {
                let removed = self.pagination.remove(message_ids);
                if removed.is_empty() {
                    return;
                }
                let changes = self.projection.remove_ids(&removed);
                ctx.emit_rows(self.id, changes);
                self.emit_count(ctx);
            }
            Change::ChatOnlineMemberCount { count, .. } => {
                self.online_member_count = *count;
            }
            _ => {}
        }
    }

    pub fn send_message(
        &self,
        ctx: &mut ModelContext<'_>,
        text: &str,
        reply_to_message_id: i64,
    ) -> Result<u64, SendMessageError> {
        send_message::send_message(
            &mut *ctx.requests,
            SendMessageCommand {
                chat_id: self.chat_id,
                text: text.to_owned(),
                reply_to_message_id,
            },
        )
    }

    pub fn delete_messages(
        &self,
        ctx: &mut ModelContext<'_>,
        message_ids: Vec<i64>,
        revoke: bool,
    ) -> Result<u64, SendMessageError> {
        send_message::delete_messages(
            &mut *ctx.requests,
            DeleteMessagesCommand {
                chat_id: self.chat_id,
                message_ids,
                revoke,
            },
        )
    }

    /// A pushed message joins when the list already reaches the chat's
    /// latest message; otherwise newer history is fetchable again.
    fn on_live_message(&mut self, ctx: &mut ModelContext<'_>, message_id: i64) {
        if !self.reaches_latest(ctx.store) {
            self.pagination.rearm(Direction::Newer);
            return;
        }

        if !self.pagination.insert_live(message_id) {
            return;
        }

        if let Some(change) = self.projection.insert_sorted(message_id, |a, b| a.cmp(&b)) {
            ctx.emit_rows(self.id, [change]);
            self.emit_count(ctx);
        }
        self.view_unread(ctx, &[message_id]);
    }

    fn reaches_latest(&self, store: &EntityStore) -> bool {
        let last_message_id = store
            .chat(self.chat_id)
            .and_then(|chat| get_path(chat.fields(), &["last_message", "id"]))
            .and_then(Value::as_i64);

        match last_message_id {
            Some(id) => self.pagination.contains(id),
            None => true,
        }
    }

    fn request_page(&mut self, ctx: &mut ModelContext<'_>, page: PageRequest) {
        let cursor = match (page.direction, page.anchor) {
            (Direction::Newer, Some(newest)) => HistoryCursor {
                from_message_id: newest,
                offset: -self.page_size,
                limit: self.page_size,
            },
            (Direction::Older, Some(oldest)) => HistoryCursor {
                from_message_id: oldest,
                offset: 0,
                limit: self.page_size,
            },
            (_, None) => self.initial_cursor(ctx.store),
        };

        ctx.requests.call(
            requests::get_chat_history(self.chat_id, cursor),
            Pending::ChatHistory {
                consumer: self.id,
                chat_id: self.chat_id,
                generation: page.generation,
                direction: page.direction,
            },
        );
        self.emit_loading(ctx);
    }

    /// First page: centred on the first unread message when there is one,
    /// otherwise the latest messages.
    fn initial_cursor(&self, store: &EntityStore) -> HistoryCursor {
        let chat = store.chat(self.chat_id).map(|chat| chat.fields());
        let unread_count = chat
            .and_then(|chat| get_i32(chat, "unread_count"))
            .unwrap_or(0);
        let last_read = chat
            .and_then(|chat| get_i64(chat, "last_read_inbox_message_id"))
            .unwrap_or(0);

        if unread_count > 0 && last_read != 0 {
            return HistoryCursor {
                from_message_id: last_read,
                offset: -1 - self.page_size,
                limit: 2 * self.page_size,
            };
        }

        HistoryCursor {
            from_message_id: chat
                .and_then(|chat| get_path(chat, &["last_message", "id"]))
                .and_then(Value::as_i64)
                .unwrap_or(0),
            offset: 0,
            limit: self.page_size,
        }
    }

    /// Marks incoming messages past the read marker as viewed.
    fn view_unread(&self, ctx: &mut ModelContext<'_>, message_ids: &[i64]) {
        let last_read = ctx
            .store
            .chat(self.chat_id)
            .and_then(|chat| chat.i64("last_read_inbox_message_id"))
            .unwrap_or(0);

        let unread: Vec<i64> = ctx
            .store
            .messages_in(self.chat_id, message_ids)
            .into_iter()
            .filter(|message| !get_bool(message.fields(), "is_outgoing").unwrap_or(false))
            .filter_map(|message| message.i64("id"))
            .filter(|id| *id > last_read)
            .collect();

        if !unread.is_empty() {
            ctx.requests
                .send(requests::view_messages(self.chat_id, &unread));
        }
    }

    fn sync_rows(&mut self, ctx: &mut ModelContext<'_>) {
        let before = self.projection.row_count();
        let target: Vec<i64> = self.pagination.loaded_ids().iter().copied().collect();
        let changes = self.projection.apply_order(&target);
        ctx.emit_rows(self.id, changes);
        if self.projection.row_count() != before {
            self.emit_count(ctx);
        }
    }

    fn clear(&mut self, ctx: &mut ModelContext<'_>) {
        self.pagination.reset();
        self.online_member_count = 0;
        let change = self.projection.reset(Vec::new());
        ctx.emit_rows(self.id, [change]);
        self.emit_count(ctx);
        self.emit_loading(ctx);
    }

    fn emit_count(&self, ctx: &mut ModelContext<'_>) {
        ctx.emit(ModelEvent::CountChanged {
            consumer: self.id,
            count: self.projection.row_count(),
        });
    }

    fn emit_loading(&self, ctx: &mut ModelContext<'_>) {
        let state = self.pagination.state();
        ctx.emit(ModelEvent::LoadingChanged {
            consumer: self.id,
            loading: state == PaginationState::Loading,
            loading_history: state == PaginationState::LoadingHistory,
        });
    }
}

/// Read-only view of a [`MessageListModel`].
#[derive(Debug, Clone, Copy)]
pub struct MessageListView<'a> {
    model: &'a MessageListModel,
    store: &'a EntityStore,
}

impl MessageListView<'_> {
    pub fn chat_id(&self) -> i64 {
        self.model.chat_id
    }

    pub fn row_count(&self) -> usize {
        self.model.projection.row_count()
    }

    pub fn message_id_at(&self, index: usize) -> Option<i64> {
        self.model.projection.id_at(index)
    }

    pub fn get(&self, index: usize) -> Option<FieldMap> {
        message_row(self.store, self.model.chat_id, self.message_id_at(index)?)
    }

    pub fn role_names(&self) -> &'static [&'static str] {
        MESSAGE_ROLES
    }

    pub fn can_fetch_more(&self) -> bool {
        self.model.chat_id != 0 && self.model.pagination.can_fetch_more()
    }

    pub fn can_load_history(&self) -> bool {
        self.model.chat_id != 0 && self.model.pagination.can_load_history()
    }

    pub fn loading(&self) -> bool {
        self.model.pagination.state() == PaginationState::Loading
    }

    pub fn loading_history(&self) -> bool {
        self.model.pagination.state() == PaginationState::LoadingHistory
    }

    pub fn online_member_count(&self) -> i32 {
        self.model.online_member_count
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        test_support::{chat_fixture, message_fixture, ModelHarness},
        usecases::projection::RowChange,
    };

    const ID: ConsumerId = ConsumerId(2);
    const CHAT: i64 = 7;

    fn harness_with_chat(unread_count: i32, last_read: i64, last_message: i64) -> ModelHarness {
        let mut harness = ModelHarness::new();
        let mut chat = chat_fixture(CHAT, "seven");
        chat.insert("unread_count".to_owned(), json!(unread_count));
        chat.insert("last_read_inbox_message_id".to_owned(), json!(last_read));
        chat.insert(
            "last_message".to_owned(),
            Value::Object(message_fixture(CHAT, last_message)),
        );
        harness.route("updateNewChat", json!({"chat": chat}));
        harness
    }

    fn answer(harness: &mut ModelHarness, model: &mut MessageListModel, ids: &[i64]) {
        let (_, pending) = harness.last_call();
        let Pending::ChatHistory {
            generation,
            direction,
            ..
        } = pending
        else {
            panic!("expected history continuation");
        };
        for id in ids {
            harness.store.insert_message(message_fixture(CHAT, *id));
        }
        model.on_history(&mut harness.ctx(), generation, direction, Ok(ids.to_vec()));
    }

    fn visible(model: &MessageListModel, store: &EntityStore) -> Vec<i64> {
        let view = model.view(store);
        (0..view.row_count())
            .filter_map(|index| view.message_id_at(index))
            .collect()
    }

    fn history_requests(harness: &mut ModelHarness) -> Vec<FieldMap> {
        harness
            .requests
            .drain_outbox()
            .into_iter()
            .map(|(_, request)| request)
            .filter(|request| request.get("@type") == Some(&json!("getChatHistory")))
            .collect()
    }

    #[test]
    fn open_chat_without_unread_starts_at_last_message() {
        let mut harness = harness_with_chat(0, 12, 12);
        let mut model = MessageListModel::new(ID, 50);

        model.open_chat(&mut harness.ctx(), CHAT);

        let outbox = harness.requests.drain_outbox();
        assert_eq!(outbox[0].1.get("@type"), Some(&json!("openChat")));
        assert_eq!(outbox[1].1.get("from_message_id"), Some(&json!(12)));
        assert_eq!(outbox[1].1.get("offset"), Some(&json!(0)));
        assert_eq!(outbox[1].1.get("limit"), Some(&json!(50)));
        assert!(model.view(&harness.store).loading());
    }

    #[test]
    fn open_chat_with_unread_centres_on_read_marker() {
        let mut harness = harness_with_chat(3, 100, 103);
        let mut model = MessageListModel::new(ID, 50);

        model.open_chat(&mut harness.ctx(), CHAT);

        let history = history_requests(&mut harness);
        assert_eq!(history[0].get("from_message_id"), Some(&json!(100)));
        assert_eq!(history[0].get("offset"), Some(&json!(-51)));
        assert_eq!(history[0].get("limit"), Some(&json!(100)));
    }

    #[test]
    fn history_prepends_only_new_rows() {
        let mut harness = harness_with_chat(0, 12, 12);
        let mut model = MessageListModel::new(ID, 50);
        model.open_chat(&mut harness.ctx(), CHAT);
        answer(&mut harness, &mut model, &[10, 11, 12]);
        history_requests(&mut harness);
        harness.events.clear();

        assert!(model.load_history(&mut harness.ctx()));
        let history = history_requests(&mut harness);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].get("from_message_id"), Some(&json!(10)));
        answer(&mut harness, &mut model, &[8, 9, 10]);

        assert_eq!(visible(&model, &harness.store), vec![8, 9, 10, 11, 12]);
        assert!(harness.events.contains(&ModelEvent::Rows {
            consumer: ID,
            change: RowChange::Inserted { first: 0, last: 1 }
        }));
        assert!(!harness.events.iter().any(|event| matches!(
            event,
            ModelEvent::Rows {
                change: RowChange::Inserted { first: 2, .. },
                ..
            }
        )));
    }

    #[test]
    fn empty_newer_page_stops_fetch_more() {
        let mut harness = harness_with_chat(0, 12, 12);
        let mut model = MessageListModel::new(ID, 50);
        model.open_chat(&mut harness.ctx(), CHAT);
        answer(&mut harness, &mut model, &[11, 12]);

        assert!(model.fetch_more(&mut harness.ctx()));
        answer(&mut harness, &mut model, &[]);

        let view = model.view(&harness.store);
        assert!(!view.loading());
        assert!(!view.can_fetch_more());
        assert!(view.can_load_history());
    }

    #[test]
    fn fetch_more_twice_issues_one_request() {
        let mut harness = harness_with_chat(0, 12, 12);
        let mut model = MessageListModel::new(ID, 50);
        model.open_chat(&mut harness.ctx(), CHAT);
        answer(&mut harness, &mut model, &[12]);
        history_requests(&mut harness);

        assert!(model.fetch_more(&mut harness.ctx()));
        assert!(!model.fetch_more(&mut harness.ctx()));

        let history = history_requests(&mut harness);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].get("offset"), Some(&json!(-50)));
    }

    #[test]
    fn live_message_during_history_load_keeps_id_order() {
        let mut harness = harness_with_chat(0, 12, 12);
        let mut model = MessageListModel::new(ID, 50);
        model.open_chat(&mut harness.ctx(), CHAT);
        answer(&mut harness, &mut model, &[10, 11, 12]);
        assert!(model.load_history(&mut harness.ctx()));

        for change in harness.route(
            "updateNewMessage",
            json!({"message": message_fixture(CHAT, 13)}),
        ) {
            model.on_change(&mut harness.ctx(), &change);
        }
        assert!(model.view(&harness.store).loading_history());
        answer(&mut harness, &mut model, &[8, 9, 10]);

        assert_eq!(visible(&model, &harness.store), vec![8, 9, 10, 11, 12, 13]);
        assert_eq!(model.view(&harness.store).row_count(), 6);
    }

    #[test]
    fn live_message_beyond_loaded_range_rearms_fetch_more() {
        let mut harness = harness_with_chat(0, 30, 30);
        let mut model = MessageListModel::new(ID, 50);
        model.open_chat(&mut harness.ctx(), CHAT);
        answer(&mut harness, &mut model, &[10, 11]);
        model.fetch_more(&mut harness.ctx());
        answer(&mut harness, &mut model, &[]);
        assert!(!model.view(&harness.store).can_fetch_more());

        for change in harness.route(
            "updateNewMessage",
            json!({"message": message_fixture(CHAT, 31)}),
        ) {
            model.on_change(&mut harness.ctx(), &change);
        }

        assert_eq!(visible(&model, &harness.store), vec![10, 11]);
        assert!(model.view(&harness.store).can_fetch_more());
    }

    #[test]
    fn incoming_live_message_is_marked_viewed() {
        let mut harness = harness_with_chat(0, 12, 12);
        let mut model = MessageListModel::new(ID, 50);
        model.open_chat(&mut harness.ctx(), CHAT);
        answer(&mut harness, &mut model, &[12]);
        harness.requests.drain_outbox();

        for change in harness.route(
            "updateNewMessage",
            json!({"message": message_fixture(CHAT, 13)}),
        ) {
            model.on_change(&mut harness.ctx(), &change);
        }

        let outbox = harness.requests.drain_outbox();
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].1.get("@type"), Some(&json!("viewMessages")));
        assert_eq!(outbox[0].1.get("message_ids"), Some(&json!([13])));
    }

    #[test]
    fn deletions_remove_row_ranges() {
        let mut harness = harness_with_chat(0, 12, 12);
        let mut model = MessageListModel::new(ID, 50);
        model.open_chat(&mut harness.ctx(), CHAT);
        answer(&mut harness, &mut model, &[9, 10, 11, 12]);
        harness.events.clear();

        for change in harness.route(
            "updateDeleteMessages",
            json!({"chat_id": CHAT, "message_ids": [10, 11]}),
        ) {
            model.on_change(&mut harness.ctx(), &change);
        }

        assert_eq!(visible(&model, &harness.store), vec![9, 12]);
        assert_eq!(
            harness.events,
            vec![
                ModelEvent::Rows {
                    consumer: ID,
                    change: RowChange::Removed { first: 1, last: 2 }
                },
                ModelEvent::CountChanged {
                    consumer: ID,
                    count: 2
                }
            ]
        );
    }

    #[test]
    fn send_succeeded_swaps_row_id() {
        let mut harness = harness_with_chat(0, 12, 12);
        let mut model = MessageListModel::new(ID, 50);
        model.open_chat(&mut harness.ctx(), CHAT);
        answer(&mut harness, &mut model, &[12]);
        let mut pending = message_fixture(CHAT, 1_000_001);
        pending.insert("is_outgoing".to_owned(), json!(true));
        for change in harness.route("updateNewMessage", json!({"message": pending})) {
            model.on_change(&mut harness.ctx(), &change);
        }

        for change in harness.route(
            "updateMessageSendSucceeded",
            json!({"old_message_id": 1_000_001, "message": message_fixture(CHAT, 13)}),
        ) {
            model.on_change(&mut harness.ctx(), &change);
        }

        assert_eq!(visible(&model, &harness.store), vec![12, 13]);
    }

    #[test]
    fn answers_for_previous_chat_are_dropped() {
        let mut harness = harness_with_chat(0, 12, 12);
        let mut model = MessageListModel::new(ID, 50);
        model.open_chat(&mut harness.ctx(), CHAT);
        let (_, stale) = harness.last_call();
        let Pending::ChatHistory { generation, .. } = stale else {
            panic!("expected history continuation");
        };

        model.open_chat(&mut harness.ctx(), 8);
        model.on_history(&mut harness.ctx(), generation, Direction::Newer, Ok(vec![12]));

        assert_eq!(model.view(&harness.store).row_count(), 0);
        assert_eq!(model.chat_id(), 8);
        let outbox = harness.requests.drain_outbox();
        assert!(outbox
            .iter()
            .any(|(_, request)| request == &requests::close_chat(CHAT)));
    }

    #[test]
    fn failed_page_reports_error_and_allows_retry() {
        let mut harness = harness_with_chat(0, 12, 12);
        let mut model = MessageListModel::new(ID, 50);
        model.open_chat(&mut harness.ctx(), CHAT);
        let (_, pending) = harness.last_call();
        let Pending::ChatHistory { generation, .. } = pending else {
            panic!("expected history continuation");
        };

        model.on_history(
            &mut harness.ctx(),
            generation,
            Direction::Newer,
            Err(BackendError {
                code: 404,
                message: "Not Found".to_owned(),
            }),
        );

        assert!(!model.view(&harness.store).loading());
        assert!(model.fetch_more(&mut harness.ctx()));
        assert!(harness.events.iter().any(|event| matches!(
            event,
            ModelEvent::Error { code: 404, .. }
        )));
    }

    #[test]
    fn online_member_count_is_tracked_for_open_chat() {
        let mut harness = harness_with_chat(0, 12, 12);
        let mut model = MessageListModel::new(ID, 50);
        model.open_chat(&mut harness.ctx(), CHAT);

        for change in harness.route(
            "updateChatOnlineMemberCount",
            json!({"chat_id": CHAT, "online_member_count": 4}),
        ) {
            model.on_change(&mut harness.ctx(), &change);
        }

        assert_eq!(model.view(&harness.store).online_member_count(), 4);
    }

    #[test]
    fn rows_render_from_store() {
        let mut harness = harness_with_chat(0, 12, 12);
        let mut model = MessageListModel::new(ID, 50);
        model.open_chat(&mut harness.ctx(), CHAT);
        answer(&mut harness, &mut model, &[12]);

        let row = model.view(&harness.store).get(0).expect("row should render");

        assert_eq!(row.get("id"), Some(&json!("12")));
        assert_eq!(row.get("chatId"), Some(&json!("7")));
        assert!(model.view(&harness.store).get(1).is_none());
    }
}
