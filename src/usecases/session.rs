//! Single owner of the cache: store, ordering index, consumers and pending
//! requests. Everything here runs on one logical thread; the event loop
//! feeds it and flushes its outbox.

use std::{
    collections::BTreeMap,
    sync::mpsc,
    time::{Duration, Instant},
};

use serde_json::Value;
use thiserror::Error;

use crate::{
    domain::{
        chat_list::ChatList,
        debounce::SortDebouncer,
        events::Change,
        field_map::{get_i64, get_list, type_tag, FieldMap},
        ordering::OrderingIndex,
        store::EntityStore,
    },
    infra::config::CacheConfig,
    telegram::client::{BackendError, Incoming, RequestRegistry},
};

use super::{
    chat_list::{ChatListModel, ChatListView},
    contracts::{ConsumerId, ModelContext, ModelEvent, Pending},
    message_list::{MessageListModel, MessageListView},
    pagination::{normalized_page_size, DEFAULT_PAGE_SIZE},
    router::EventRouter,
    send_message::SendMessageError,
};

const DEFAULT_CHAT_PAGE_SIZE: i32 = 20;
const RESORT_APPLIED: &str = "SESSION_RESORT_APPLIED";
const ORPHAN_RESPONSE: &str = "SESSION_ORPHAN_RESPONSE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub message_page_size: i32,
    pub chat_page_size: i32,
    pub resort_debounce: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            message_page_size: DEFAULT_PAGE_SIZE,
            chat_page_size: DEFAULT_CHAT_PAGE_SIZE,
            resort_debounce: Duration::from_millis(1_000),
        }
    }
}

impl From<&CacheConfig> for SessionConfig {
    fn from(config: &CacheConfig) -> Self {
        Self {
            message_page_size: normalized_page_size(config.message_page_size, DEFAULT_PAGE_SIZE),
            chat_page_size: normalized_page_size(config.chat_page_size, DEFAULT_CHAT_PAGE_SIZE),
            resort_debounce: Duration::from_millis(config.resort_debounce_ms),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("unknown {0}")]
    UnknownConsumer(ConsumerId),
    #[error("{consumer} is not a {expected}")]
    WrongConsumerKind {
        consumer: ConsumerId,
        expected: &'static str,
    },
    #[error(transparent)]
    Outgoing(#[from] SendMessageError),
}

#[derive(Debug)]
enum Consumer {
    ChatList(ChatListModel),
    MessageList(MessageListModel),
}

impl Consumer {
    fn on_change(&mut self, ctx: &mut ModelContext<'_>, change: &Change) {
        match self {
            Self::ChatList(model) => model.on_change(ctx, change),
            Self::MessageList(model) => model.on_change(ctx, change),
        }
    }
}

#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    store: EntityStore,
    index: OrderingIndex,
    router: EventRouter,
    debouncer: SortDebouncer,
    requests: RequestRegistry<Pending>,
    consumers: BTreeMap<ConsumerId, Consumer>,
    next_consumer_id: u32,
    subscribers: Vec<mpsc::Sender<ModelEvent>>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            store: EntityStore::new(),
            index: OrderingIndex::new(),
            router: EventRouter::new(),
            debouncer: SortDebouncer::new(config.resort_debounce),
            requests: RequestRegistry::new(),
            consumers: BTreeMap::new(),
            next_consumer_id: 1,
            subscribers: Vec::new(),
        }
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn subscribe(&mut self) -> mpsc::Receiver<ModelEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn add_chat_list(&mut self, list: ChatList) -> ConsumerId {
        let id = self.allocate_consumer_id();
        let model = ChatListModel::new(id, list, self.config.chat_page_size);
        self.consumers.insert(id, Consumer::ChatList(model));
        tracing::debug!(consumer = %id, %list, "chat list consumer added");
        id
    }

    pub fn add_message_list(&mut self) -> ConsumerId {
        let id = self.allocate_consumer_id();
        let model = MessageListModel::new(id, self.config.message_page_size);
        self.consumers.insert(id, Consumer::MessageList(model));
        tracing::debug!(consumer = %id, "message list consumer added");
        id
    }

    /// Drops a consumer; an open chat is closed first.
    #[cfg_attr(not(test), allow(dead_code))]
    pub fn remove_consumer(&mut self, id: ConsumerId) -> Result<(), SessionError> {
        let is_message_list = matches!(self.consumers.get(&id), Some(Consumer::MessageList(_)));
        if is_message_list {
            self.with_message_list(id, |model, ctx| model.close_chat(ctx))?;
        }

        self.consumers
            .remove(&id)
            .ok_or(SessionError::UnknownConsumer(id))?;
        if !self.has_chat_list() {
            self.debouncer.cancel();
        }
        Ok(())
    }

    pub fn chat_list(&self, id: ConsumerId) -> Result<ChatListView<'_>, SessionError> {
        match self.consumers.get(&id) {
            Some(Consumer::ChatList(model)) => Ok(model.view(&self.store)),
            Some(Consumer::MessageList(_)) => Err(SessionError::WrongConsumerKind {
                consumer: id,
                expected: "chat list",
            }),
            None => Err(SessionError::UnknownConsumer(id)),
        }
    }

    pub fn message_list(&self, id: ConsumerId) -> Result<MessageListView<'_>, SessionError> {
        match self.consumers.get(&id) {
            Some(Consumer::MessageList(model)) => Ok(model.view(&self.store)),
            Some(Consumer::ChatList(_)) => Err(SessionError::WrongConsumerKind {
                consumer: id,
                expected: "message list",
            }),
            None => Err(SessionError::UnknownConsumer(id)),
        }
    }

    pub fn fetch_more(&mut self, id: ConsumerId) -> Result<bool, SessionError> {
        self.with_consumer(id, |consumer, ctx| match consumer {
            Consumer::ChatList(model) => model.fetch_more(ctx),
            Consumer::MessageList(model) => model.fetch_more(ctx),
        })
    }

    pub fn load_history(&mut self, id: ConsumerId) -> Result<bool, SessionError> {
        self.with_message_list(id, |model, ctx| model.load_history(ctx))
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn set_chat_list(&mut self, id: ConsumerId, list: ChatList) -> Result<(), SessionError> {
        self.with_chat_list(id, |model, ctx| model.set_list(ctx, list))
    }

    pub fn open_chat(&mut self, id: ConsumerId, chat_id: i64) -> Result<(), SessionError> {
        self.with_message_list(id, |model, ctx| model.open_chat(ctx, chat_id))
    }

    pub fn close_chat(&mut self, id: ConsumerId) -> Result<(), SessionError> {
        self.with_message_list(id, |model, ctx| model.close_chat(ctx))
    }

    pub fn toggle_chat_is_pinned(
        &mut self,
        id: ConsumerId,
        chat_id: i64,
    ) -> Result<Option<u64>, SessionError> {
        self.with_chat_list(id, |model, ctx| model.toggle_chat_is_pinned(ctx, chat_id))
    }

    pub fn toggle_chat_notification_settings(
        &mut self,
        id: ConsumerId,
        chat_id: i64,
    ) -> Result<Option<u64>, SessionError> {
        self.with_chat_list(id, |model, ctx| {
            model.toggle_chat_notification_settings(ctx, chat_id)
        })
    }

    pub fn send_message(
        &mut self,
        id: ConsumerId,
        text: &str,
        reply_to_message_id: i64,
    ) -> Result<u64, SessionError> {
        self.with_message_list(id, |model, ctx| {
            model.send_message(ctx, text, reply_to_message_id)
        })?
        .map_err(SessionError::from)
    }

    pub fn delete_messages(
        &mut self,
        id: ConsumerId,
        message_ids: Vec<i64>,
        revoke: bool,
    ) -> Result<u64, SessionError> {
        self.with_message_list(id, |model, ctx| {
            model.delete_messages(ctx, message_ids, revoke)
        })?
        .map_err(SessionError::from)
    }

    /// Applies one item from the backend, in arrival order.
    pub fn handle_incoming(&mut self, incoming: Incoming, now: Instant) {
        if incoming.is_update() {
            self.apply_update(incoming.payload, now);
        } else {
            self.resolve_response(incoming.request_id, incoming.payload);
        }
    }

    /// Runs the debounced re-sort once it is due. Returns whether it ran.
    pub fn poll_timers(&mut self, now: Instant) -> bool {
        if !self.debouncer.fire_if_due(now) {
            return false;
        }

        let changed = self.index.refresh(&self.store);
        tracing::debug!(code = RESORT_APPLIED, lists = ?changed, "chat lists re-sorted");

        let mut events = Vec::new();
        let mut ctx = ModelContext {
            store: &self.store,
            index: &self.index,
            requests: &mut self.requests,
            events: &mut events,
        };
        for consumer in self.consumers.values_mut() {
            if let Consumer::ChatList(model) = consumer {
                model.on_resort(&mut ctx);
            }
        }
        self.publish(events);
        true
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.debouncer.deadline()
    }

    /// No answers outstanding and no re-sort armed.
    pub fn is_idle(&self) -> bool {
        self.requests.pending_count() == 0 && !self.debouncer.is_armed()
    }

    pub fn drain_outbox(&mut self) -> Vec<(u64, FieldMap)> {
        self.requests.drain_outbox()
    }

    fn apply_update(&mut self, payload: FieldMap, now: Instant) {
        let tag = type_tag(&payload).unwrap_or_default().to_owned();
        let changes = self
            .router
            .route(&mut self.store, &mut self.index, &tag, payload);
        if changes.is_empty() {
            return;
        }

        // Without a chat list the index is refreshed lazily on the next page.
        if self.has_chat_list()
            && changes
                .iter()
                .any(|change| matches!(change, Change::ChatPosition { .. }))
        {
            self.debouncer.arm(now);
        }

        let mut events = Vec::new();
        let mut ctx = ModelContext {
            store: &self.store,
            index: &self.index,
            requests: &mut self.requests,
            events: &mut events,
        };
        for change in changes {
            for consumer in self.consumers.values_mut() {
                consumer.on_change(&mut ctx, &change);
            }
            ctx.emit(ModelEvent::EntityChanged(change));
        }
        self.publish(events);
    }

    fn resolve_response(&mut self, request_id: u64, payload: FieldMap) {
        let Some(pending) = self.requests.resolve(request_id) else {
            tracing::trace!(
                request_id,
                tag = type_tag(&payload).unwrap_or_default(),
                "answer to fire-and-forget request"
            );
            return;
        };

        let error = BackendError::from_payload(&payload);
        let outcome = match pending {
            Pending::LoadChats {
                consumer,
                generation,
            } => {
                // Chats delivered with the page are part of it.
                self.index.refresh(&self.store);
                let result = error.map_or(Ok(()), Err);
                self.with_chat_list(consumer, |model, ctx| {
                    model.on_load_chats(ctx, generation, result)
                })
            }
            Pending::ChatHistory {
                consumer,
                chat_id,
                generation,
                direction,
            } => {
                let result = match error {
                    Some(error) => Err(error),
                    None => Ok(self.store_history_page(chat_id, &payload)),
                };
                self.with_message_list(consumer, |model, ctx| {
                    model.on_history(ctx, generation, direction, result)
                })
            }
        };

        if let Err(error) = outcome {
            tracing::debug!(
                code = ORPHAN_RESPONSE,
                request_id,
                %error,
                "answer for a removed consumer dropped"
            );
        }
    }

    /// Stores the messages of a `messages` answer, returning their ids.
    fn store_history_page(&mut self, chat_id: i64, payload: &FieldMap) -> Vec<i64> {
        get_list(payload, "messages")
            .map(|messages| {
                messages
                    .iter()
                    .filter_map(Value::as_object)
                    .filter(|message| get_i64(message, "chat_id") == Some(chat_id))
                    .filter_map(|message| self.store.insert_message(message.clone()))
                    .map(|(_, message_id, _)| message_id)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn with_consumer<R>(
        &mut self,
        id: ConsumerId,
        operation: impl FnOnce(&mut Consumer, &mut ModelContext<'_>) -> R,
    ) -> Result<R, SessionError> {
        let consumer = self
            .consumers
            .get_mut(&id)
            .ok_or(SessionError::UnknownConsumer(id))?;

        let mut events = Vec::new();
        let mut ctx = ModelContext {
            store: &self.store,
            index: &self.index,
            requests: &mut self.requests,
            events: &mut events,
        };
        let result = operation(consumer, &mut ctx);
        self.publish(events);
        Ok(result)
    }

    fn with_chat_list<R>(
        &mut self,
        id: ConsumerId,
        operation: impl FnOnce(&mut ChatListModel, &mut ModelContext<'_>) -> R,
    ) -> Result<R, SessionError> {
        self.with_consumer(id, |consumer, ctx| match consumer {
            Consumer::ChatList(model) => Ok(operation(model, ctx)),
            Consumer::MessageList(_) => Err(SessionError::WrongConsumerKind {
                consumer: id,
                expected: "chat list",
            }),
        })?
    }

    fn with_message_list<R>(
        &mut self,
        id: ConsumerId,
        operation: impl FnOnce(&mut MessageListModel, &mut ModelContext<'_>) -> R,
    ) -> Result<R, SessionError> {
        self.with_consumer(id, |consumer, ctx| match consumer {
            Consumer::MessageList(model) => Ok(operation(model, ctx)),
            Consumer::ChatList(_) => Err(SessionError::WrongConsumerKind {
                consumer: id,
                expected: "message list",
            }),
        })?
    }

    fn publish(&mut self, events: Vec<ModelEvent>) {
        if events.is_empty() {
            return;
        }

        self.subscribers
            .retain(|subscriber| events.iter().all(|event| subscriber.send(event.clone()).is_ok()));
    }

    fn has_chat_list(&self) -> bool {
        self.consumers
            .values()
            .any(|consumer| matches!(consumer, Consumer::ChatList(_)))
    }

    fn allocate_consumer_id(&mut self) -> ConsumerId {
        let id = ConsumerId(self.next_consumer_id);
        self.next_consumer_id += 1;
        id
    }
}
