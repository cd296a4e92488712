use std::{
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use tokio::sync::{mpsc::UnboundedSender, watch};

use super::client::{Backend, Incoming};

const RECEIVER_STARTED: &str = "TELEGRAM_RECEIVER_STARTED";
const RECEIVER_STOPPED: &str = "TELEGRAM_RECEIVER_STOPPED";
const RECEIVER_HANDOFF_FAILED: &str = "TELEGRAM_RECEIVER_HANDOFF_FAILED";
const RECEIVER_SHUTDOWN_FAILED: &str = "TELEGRAM_RECEIVER_SHUTDOWN_FAILED";

/// Dedicated thread that blocks on the backend and hands every item over to
/// the dispatch loop, preserving arrival order.
#[derive(Debug)]
pub struct ReceiverWorker {
    stop_tx: Option<watch::Sender<bool>>,
    worker: Option<JoinHandle<()>>,
}

impl ReceiverWorker {
    pub fn start(
        backend: Arc<dyn Backend>,
        poll_timeout: Duration,
        inbound_tx: UnboundedSender<Incoming>,
    ) -> Result<Self, ReceiverStartError> {
        let (stop_tx, stop_rx) = watch::channel(false);
        let worker = thread::Builder::new()
            .name("tdcache-receiver".to_owned())
            .spawn(move || run_worker(backend, poll_timeout, inbound_tx, stop_rx))
            .map_err(ReceiverStartError::WorkerSpawn)?;

        tracing::info!(
            code = RECEIVER_STARTED,
            poll_timeout_ms = poll_timeout.as_millis() as u64,
            "backend receiver started"
        );

        Ok(Self {
            stop_tx: Some(stop_tx),
            worker: Some(worker),
        })
    }
}

impl Drop for ReceiverWorker {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
        }

        if let Some(worker) = self.worker.take() {
            if let Err(error) = worker.join() {
                tracing::warn!(
                    code = RECEIVER_SHUTDOWN_FAILED,
                    error = ?error,
                    "backend receiver panicked on shutdown"
                );
            }
        }
    }
}

fn run_worker(
    backend: Arc<dyn Backend>,
    poll_timeout: Duration,
    inbound_tx: UnboundedSender<Incoming>,
    stop_rx: watch::Receiver<bool>,
) {
    loop {
        if *stop_rx.borrow() || stop_rx.has_changed().is_err() {
            tracing::info!(code = RECEIVER_STOPPED, "backend receiver stopped");
            return;
        }

        let Some(incoming) = backend.receive(poll_timeout) else {
            continue;
        };

        tracing::trace!(
            request_id = incoming.request_id,
            tag = incoming.tag(),
            "backend item received"
        );

        if inbound_tx.send(incoming).is_err() {
            tracing::warn!(
                code = RECEIVER_HANDOFF_FAILED,
                "dispatch loop is gone; backend receiver exiting"
            );
            return;
        }
    }
}

#[derive(Debug)]
pub enum ReceiverStartError {
    WorkerSpawn(std::io::Error),
}

impl std::fmt::Display for ReceiverStartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WorkerSpawn(source) => write!(f, "receiver worker spawn failed: {source}"),
        }
    }
}

impl std::error::Error for ReceiverStartError {}

#[cfg(test)]
mod tests {
    use std::{collections::VecDeque, sync::Mutex};

    use tokio::sync::mpsc;

    use super::*;
    use crate::domain::field_map::tagged;

    struct ScriptedBackend {
        items: Mutex<VecDeque<Incoming>>,
    }

    impl Backend for ScriptedBackend {
        fn send(&self, _request_id: u64, _request: crate::domain::field_map::FieldMap) {}

        fn receive(&self, timeout: Duration) -> Option<Incoming> {
            let next = self.items.lock().expect("items lock").pop_front();
            if next.is_none() {
                thread::sleep(timeout);
            }
            next
        }
    }

    #[test]
    fn forwards_items_in_arrival_order_and_stops_on_drop() {
        let backend = Arc::new(ScriptedBackend {
            items: Mutex::new(
                ["updateA", "updateB", "updateC"]
                    .into_iter()
                    .map(|tag| Incoming::update(tagged(tag)))
                    .collect(),
            ),
        });
        let (tx, mut rx) = mpsc::unbounded_channel();

        let worker = ReceiverWorker::start(backend, Duration::from_millis(5), tx)
            .expect("worker should start");

        let mut tags = Vec::new();
        while tags.len() < 3 {
            let item = rx.blocking_recv().expect("item should arrive");
            tags.push(item.tag().to_owned());
        }
        drop(worker);

        assert_eq!(tags, vec!["updateA", "updateB", "updateC"]);
    }
}
