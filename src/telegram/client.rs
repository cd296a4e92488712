use std::{collections::HashMap, fmt, time::Duration};

use crate::domain::field_map::{get_i32, get_str, type_tag, FieldMap};

/// Request id the backend uses for unsolicited updates.
pub const UPDATE_REQUEST_ID: u64 = 0;

/// Anything the backend delivers: a push update or the answer to a request.
#[derive(Debug, Clone, PartialEq)]
pub struct Incoming {
    pub request_id: u64,
    pub payload: FieldMap,
}

impl Incoming {
    pub fn update(payload: FieldMap) -> Self {
        Self {
            request_id: UPDATE_REQUEST_ID,
            payload,
        }
    }

    pub fn response(request_id: u64, payload: FieldMap) -> Self {
        Self {
            request_id,
            payload,
        }
    }

    pub fn is_update(&self) -> bool {
        self.request_id == UPDATE_REQUEST_ID
    }

    pub fn tag(&self) -> &str {
        type_tag(&self.payload).unwrap_or_default()
    }
}

/// Transport to the backend process. Implementations must be callable from
/// the receive worker and the dispatch loop at the same time.
pub trait Backend: Send + Sync {
    fn send(&self, request_id: u64, request: FieldMap);

    /// Waits up to `timeout` for the next item; `None` when nothing arrived.
    fn receive(&self, timeout: Duration) -> Option<Incoming>;
}

/// `error` object returned in place of a regular response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendError {
    pub code: i32,
    pub message: String,
}

impl BackendError {
    pub const NOT_FOUND: i32 = 404;

    pub fn from_payload(payload: &FieldMap) -> Option<Self> {
        if type_tag(payload) != Some("error") {
            return None;
        }

        Some(Self {
            code: get_i32(payload, "code").unwrap_or(0),
            message: get_str(payload, "message").unwrap_or_default().to_owned(),
        })
    }

    pub fn is_not_found(&self) -> bool {
        self.code == Self::NOT_FOUND
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "backend error {}: {}", self.code, self.message)
    }
}

impl std::error::Error for BackendError {}

/// Hands out request ids and remembers what to do with each answer.
///
/// Requests are only queued here; the dispatch loop drains the outbox and
/// performs the actual sends.
#[derive(Debug)]
pub struct RequestRegistry<P> {
    next_request_id: u64,
    pending: HashMap<u64, P>,
    outbox: Vec<(u64, FieldMap)>,
}

impl<P> Default for RequestRegistry<P> {
    fn default() -> Self {
        Self {
            next_request_id: UPDATE_REQUEST_ID + 1,
            pending: HashMap::new(),
            outbox: Vec::new(),
        }
    }
}

impl<P> RequestRegistry<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a request whose answer nobody waits for.
    pub fn send(&mut self, request: FieldMap) -> u64 {
        let request_id = self.allocate();
        tracing::debug!(
            request_id,
            method = type_tag(&request).unwrap_or_default(),
            "request queued"
        );
        self.outbox.push((request_id, request));
        request_id
    }

    /// Queues a request and registers the continuation for its answer.
    pub fn call(&mut self, request: FieldMap, continuation: P) -> u64 {
        let request_id = self.send(request);
        self.pending.insert(request_id, continuation);
        request_id
    }

    pub fn resolve(&mut self, request_id: u64) -> Option<P> {
        self.pending.remove(&request_id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn pending_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.pending.keys().copied()
    }

    pub fn drain_outbox(&mut self) -> Vec<(u64, FieldMap)> {
        std::mem::take(&mut self.outbox)
    }

    fn allocate(&mut self) -> u64 {
        let request_id = self.next_request_id;
        self.next_request_id += 1;
        request_id
    }
}
