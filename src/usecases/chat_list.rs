use std::collections::HashSet;

use crate::{
    domain::{
        chat::mute_for,
        chat_list::ChatList,
        events::Change,
        field_map::{get_path, FieldMap},
        store::{EntityId, EntityKind, EntityStore},
    },
    telegram::{client::BackendError, requests},
};

use super::{
    contracts::{ConsumerId, ModelContext, ModelEvent, Pending},
    pagination::{Direction, PaginationController, PaginationState},
    projection::{ListProjection, RowChange},
    rows::{chat_row, pending_small_photo, CHAT_ROLES},
};

const CHATS_LOADED: &str = "CHAT_LIST_ALL_LOADED";
const LOAD_CHATS_FAILED: &str = "CHAT_LIST_LOAD_FAILED";
const PHOTO_PRIORITY: i32 = 1;

/// Chats of one chat list in ordering-index order.
///
/// `loadChats` answers carry no ids: chats arrive through updates and the
/// answer only tells that a page was delivered. Once the first page is in,
/// the visible set follows the ordering index at every re-sort.
#[derive(Debug)]
pub struct ChatListModel {
    id: ConsumerId,
    list: ChatList,
    page_size: i32,
    pagination: PaginationController,
    projection: ListProjection,
    primed: bool,
    requested_photos: HashSet<i32>,
}

impl ChatListModel {
    pub fn new(id: ConsumerId, list: ChatList, page_size: i32) -> Self {
        Self {
            id,
            list,
            page_size,
            pagination: PaginationController::new(),
            projection: ListProjection::new(),
            primed: false,
            requested_photos: HashSet::new(),
        }
    }

    pub fn id(&self) -> ConsumerId {
        self.id
    }

    pub fn list(&self) -> ChatList {
        self.list
    }

    pub fn view<'a>(&'a self, store: &'a EntityStore) -> ChatListView<'a> {
        ChatListView { model: self, store }
    }

    pub fn fetch_more(&mut self, ctx: &mut ModelContext<'_>) -> bool {
        let Some(page) = self.pagination.fetch_more() else {
            return false;
        };

        ctx.requests.call(
            requests::load_chats(self.list, self.page_size),
            Pending::LoadChats {
                consumer: self.id,
                generation: page.generation,
            },
        );
        self.emit_loading(ctx);
        true
    }

    /// Switches to another chat list: reset, then reload.
    pub fn set_list(&mut self, ctx: &mut ModelContext<'_>, list: ChatList) {
        if list == self.list {
            return;
        }

        tracing::debug!(consumer = %self.id, from = %self.list, to = %list, "chat list switched");
        self.list = list;
        self.primed = false;
        self.pagination.reset();
        let change = self.projection.reset(Vec::new());
        ctx.emit_rows(self.id, [change]);
        ctx.emit(ModelEvent::CountChanged {
            consumer: self.id,
            count: 0,
        });
        self.emit_loading(ctx);
        self.fetch_more(ctx);
    }

    pub fn on_load_chats(
        &mut self,
        ctx: &mut ModelContext<'_>,
        generation: u64,
        result: Result<(), BackendError>,
    ) {
        match result {
            Ok(()) => {
                let target = ctx.index.chats(self.list).to_vec();
                let Some(merge) = self.pagination.complete(
                    Direction::Newer,
                    generation,
                    target.iter().copied(),
                ) else {
                    return;
                };
                // Only a 404 ends chat paging; a re-sort may already hold this page's chats.
                if merge.exhausted {
                    self.pagination.rearm(Direction::Newer);
                }
                tracing::debug!(
                    consumer = %self.id,
                    list = %self.list,
                    inserted = merge.inserted.len(),
                    "chat page merged"
                );
                self.primed = true;
                self.sync_rows(ctx, &target);
            }
            Err(error) if error.is_not_found() => {
                let target = ctx.index.chats(self.list).to_vec();
                if self
                    .pagination
                    .complete(Direction::Newer, generation, target.iter().copied())
                    .is_none()
                {
                    return;
                }
                self.pagination.mark_exhausted(Direction::Newer);
                tracing::info!(
                    code = CHATS_LOADED,
                    consumer = %self.id,
                    list = %self.list,
                    "all chats loaded"
                );
                self.primed = true;
                self.sync_rows(ctx, &target);
            }
            Err(error) => {
                if !self.pagination.fail(Direction::Newer, generation) {
                    return;
                }
                tracing::warn!(
                    code = LOAD_CHATS_FAILED,
                    consumer = %self.id,
                    error_code = error.code,
                    error = %error.message,
                    "chat page failed"
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

    /// Applies the ordering index after the debounced re-sort ran.
    pub fn on_resort(&mut self, ctx: &mut ModelContext<'_>) {
        if !self.primed {
            return;
        }

        let target = ctx.index.chats(self.list).to_vec();
        let listed: HashSet<i64> = target.iter().copied().collect();
        let gone: Vec<i64> = self
            .pagination
            .loaded_ids()
            .iter()
            .copied()
            .filter(|id| !listed.contains(id))
            .collect();
        self.pagination.remove(&gone);
        for id in &target {
            self.pagination.insert_live(*id);
        }

        self.sync_rows(ctx, &target);
    }

    pub fn on_change(&mut self, ctx: &mut ModelContext<'_>, change: &Change) {
        match change {
            Change::Entity {
                kind: EntityKind::Chat,
                id: EntityId::Int(chat_id),
            } => {
                if let Some(row) = self.projection.updated(*chat_id) {
                    ctx.emit_rows(self.id, [row]);
                    self.request_photo(ctx, *chat_id);
                }
            }
            Change::Entity {
                kind: EntityKind::File,
                id: EntityId::Int(file_id),
            } => {
                let rows: Vec<_> = self
                    .projection
                    .rows()
                    .iter()
                    .enumerate()
                    .filter(|(_, chat_id)| small_photo_id(ctx.store, **chat_id) == Some(*file_id))
                    .map(|(index, _)| RowChange::Updated { index })
                    .collect();
                ctx.emit_rows(self.id, rows);
            }
            Change::ChatPosition { chat_id, lists } if lists.contains(&self.list) => {
                if let Some(row) = self.projection.updated(*chat_id) {
                    ctx.emit_rows(self.id, [row]);
                }
            }
            _ => {}
        }
    }

    pub fn toggle_chat_is_pinned(&self, ctx: &mut ModelContext<'_>, chat_id: i64) -> Option<u64> {
        let position = ctx.store.chat_position(chat_id, self.list)?;
        let request = requests::toggle_chat_is_pinned(self.list, chat_id, !position.is_pinned);
        Some(ctx.requests.send(request))
    }

    /// Mutes for [`requests::MUTE_FOREVER_SECONDS`] or unmutes.
    pub fn toggle_chat_notification_settings(
        &self,
        ctx: &mut ModelContext<'_>,
        chat_id: i64,
    ) -> Option<u64> {
        let chat = ctx.store.chat(chat_id)?;
        let next = if mute_for(chat.fields()) > 0 {
            0
        } else {
            requests::MUTE_FOREVER_SECONDS
        };
        Some(ctx.requests.send(requests::set_chat_mute_for(chat_id, next)))
    }

    fn sync_rows(&mut self, ctx: &mut ModelContext<'_>, target: &[i64]) {
        let before = self.projection.row_count();
        let changes = self.projection.apply_order(target);
        if changes.is_empty() {
            return;
        }

        ctx.emit_rows(self.id, changes);
        if self.projection.row_count() != before {
            ctx.emit(ModelEvent::CountChanged {
                consumer: self.id,
                count: self.projection.row_count(),
            });
        }

        for chat_id in target {
            self.request_photo(ctx, *chat_id);
        }
    }

    fn request_photo(&mut self, ctx: &mut ModelContext<'_>, chat_id: i64) {
        let Some(file_id) = ctx
            .store
            .chat(chat_id)
            .and_then(|chat| pending_small_photo(ctx.store, chat.fields()))
        else {
            return;
        };

        if self.requested_photos.insert(file_id) {
            ctx.requests.send(requests::download_file(file_id, PHOTO_PRIORITY));
        }
    }

    fn emit_loading(&self, ctx: &mut ModelContext<'_>) {
        ctx.emit(ModelEvent::LoadingChanged {
            consumer: self.id,
            loading: self.pagination.state() == PaginationState::Loading,
            loading_history: false,
        });
    }
}

fn small_photo_id(store: &EntityStore, chat_id: i64) -> Option<i64> {
    store
        .chat(chat_id)
        .and_then(|chat| get_path(chat.fields(), &["photo", "small", "id"]))
        .and_then(serde_json::Value::as_i64)
}

/// Read-only view of a [`ChatListModel`] over the store it renders from.
#[derive(Debug, Clone, Copy)]
pub struct ChatListView<'a> {
    model: &'a ChatListModel,
    store: &'a EntityStore,
}

impl ChatListView<'_> {
    pub fn list(&self) -> ChatList {
        self.model.list
    }

    pub fn row_count(&self) -> usize {
        self.model.projection.row_count()
    }

    pub fn chat_id_at(&self, index: usize) -> Option<i64> {
        self.model.projection.id_at(index)
    }

    pub fn get(&self, index: usize) -> Option<FieldMap> {
        chat_row(self.store, self.chat_id_at(index)?, self.model.list)
    }

    pub fn role_names(&self) -> &'static [&'static str] {
        CHAT_ROLES
    }

    pub fn can_fetch_more(&self) -> bool {
        self.model.pagination.can_fetch_more()
    }

    pub fn loading(&self) -> bool {
        self.model.pagination.state() == PaginationState::Loading
    }
}
