use std::fmt;

use crate::{
    domain::{events::Change, field_map::FieldMap, ordering::OrderingIndex, store::EntityStore},
    telegram::client::RequestRegistry,
};

use super::{pagination::Direction, projection::RowChange};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConsumerId(pub u32);

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "consumer#{}", self.0)
    }
}

/// What the session publishes to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelEvent {
    Rows {
        consumer: ConsumerId,
        change: RowChange,
    },
    LoadingChanged {
        consumer: ConsumerId,
        loading: bool,
        loading_history: bool,
    },
    CountChanged {
        consumer: ConsumerId,
        count: usize,
    },
    Error {
        consumer: ConsumerId,
        code: i32,
        message: String,
    },
    EntityChanged(Change),
}

/// Continuation registered for a request/response call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pending {
    LoadChats {
        consumer: ConsumerId,
        generation: u64,
    },
    ChatHistory {
        consumer: ConsumerId,
        chat_id: i64,
        generation: u64,
        direction: Direction,
    },
}

/// Anything a fire-and-forget request can be queued on.
pub trait RequestSink {
    fn send(&mut self, request: FieldMap) -> u64;
}

impl<P> RequestSink for RequestRegistry<P> {
    fn send(&mut self, request: FieldMap) -> u64 {
        RequestRegistry::send(self, request)
    }
}

/// Borrowed session state handed to a consumer for one operation.
pub struct ModelContext<'a> {
    pub store: &'a EntityStore,
    pub index: &'a OrderingIndex,
    pub requests: &'a mut RequestRegistry<Pending>,
    pub events: &'a mut Vec<ModelEvent>,
}

impl ModelContext<'_> {
    pub fn emit(&mut self, event: ModelEvent) {
        self.events.push(event);
    }

    pub fn emit_rows(
        &mut self,
        consumer: ConsumerId,
        changes: impl IntoIterator<Item = RowChange>,
    ) {
        self.events.extend(
            changes
                .into_iter()
                .map(|change| ModelEvent::Rows { consumer, change }),
        );
    }
}
