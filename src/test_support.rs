use serde_json::Value;

use crate::{
    domain::{events::Change, field_map::FieldMap, ordering::OrderingIndex, store::EntityStore},
    telegram::client::RequestRegistry,
    usecases::{
        contracts::{ModelContext, ModelEvent, Pending},
        router::EventRouter,
    },
};

pub fn fields(value: Value) -> FieldMap {
    value
        .as_object()
        .cloned()
        .expect("fixture should be a JSON object")
}

pub fn chat_fixture(chat_id: i64, title: &str) -> FieldMap {
    fields(serde_json::json!({
        "@type": "chat",
        "id": chat_id,
        "title": title,
        "unread_count": 0,
        "last_read_inbox_message_id": 0,
        "positions": []
    }))
}

pub fn message_fixture(chat_id: i64, message_id: i64) -> FieldMap {
    fields(serde_json::json!({
        "@type": "message",
        "id": message_id,
        "chat_id": chat_id,
        "is_outgoing": false,
        "date": 1_700_000_000,
        "content": {
            "@type": "messageText",
            "text": {"@type": "formattedText", "text": format!("m{message_id}")}
        }
    }))
}

pub fn main_position(order: i64, is_pinned: bool) -> Value {
    serde_json::json!({
        "@type": "chatPosition",
        "list": {"@type": "chatListMain"},
        "order": order.to_string(),
        "is_pinned": is_pinned
    })
}

/// Session pieces a list consumer needs, without the session around them.
pub struct ModelHarness {
    pub store: EntityStore,
    pub index: OrderingIndex,
    pub requests: RequestRegistry<Pending>,
    pub events: Vec<ModelEvent>,
    router: EventRouter,
}

impl ModelHarness {
    pub fn new() -> Self {
        Self {
            store: EntityStore::new(),
            index: OrderingIndex::new(),
            requests: RequestRegistry::new(),
            events: Vec::new(),
            router: EventRouter::new(),
        }
    }

    pub fn ctx(&mut self) -> ModelContext<'_> {
        ModelContext {
            store: &self.store,
            index: &self.index,
            requests: &mut self.requests,
            events: &mut self.events,
        }
    }

    pub fn route(&mut self, tag: &str, payload: Value) -> Vec<Change> {
        self.router
            .route(&mut self.store, &mut self.index, tag, fields(payload))
    }

    /// Resolves the most recent call still waiting for an answer.
    pub fn last_call(&mut self) -> (u64, Pending) {
        let request_id = self
            .requests
            .pending_ids()
            .max()
            .expect("a call should be pending");
        let pending = self
            .requests
            .resolve(request_id)
            .expect("pending call should resolve");
        (request_id, pending)
    }
}
