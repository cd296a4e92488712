use std::time::{Duration, Instant};

use tokio::{
    sync::{mpsc::UnboundedReceiver, watch},
    time::{sleep, sleep_until},
};

use crate::telegram::client::{Backend, Incoming};

use super::session::Session;

const LOOP_STARTED: &str = "EVENT_LOOP_STARTED";
const LOOP_STOPPED: &str = "EVENT_LOOP_STOPPED";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopOptions {
    /// Return once nothing arrived for this long and the session is idle.
    pub idle_exit: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Stopped,
    Disconnected,
    Idle,
}

/// Drives `session` from the inbound channel and its re-sort timer until a
/// stop is requested, the receiver is gone, or the idle timeout elapses.
///
/// Queued requests are flushed to `backend` after every step.
pub async fn run(
    session: &mut Session,
    backend: &dyn Backend,
    inbound: &mut UnboundedReceiver<Incoming>,
    mut stop: watch::Receiver<bool>,
    options: LoopOptions,
) -> LoopExit {
    tracing::info!(code = LOOP_STARTED, idle_exit = ?options.idle_exit, "event loop started");
    flush(session, backend);

    let exit = loop {
        if *stop.borrow() {
            break LoopExit::Stopped;
        }

        let deadline = session.next_deadline();
        let idle_exit = options.idle_exit;

        tokio::select! {
            biased;

            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break LoopExit::Stopped;
                }
            }
            item = inbound.recv() => match item {
                Some(incoming) => session.handle_incoming(incoming, Instant::now()),
                None => break LoopExit::Disconnected,
            },
            _ = wait_for(deadline) => {
                session.poll_timers(Instant::now());
            }
            _ = wait_idle(idle_exit) => {
                if session.is_idle() {
                    break LoopExit::Idle;
                }
            }
        }

        flush(session, backend);
    };

    tracing::info!(code = LOOP_STOPPED, ?exit, "event loop stopped");
    exit
}

fn flush(session: &mut Session, backend: &dyn Backend) {
    for (request_id, request) in session.drain_outbox() {
        backend.send(request_id, request);
    }
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(tokio::time::Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}

async fn wait_idle(idle_exit: Option<Duration>) {
    match idle_exit {
        Some(timeout) => sleep(timeout).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;
    use crate::{
        domain::{chat_list::ChatList, field_map::FieldMap},
        test_support::{chat_fixture, fields, main_position},
        usecases::session::SessionConfig,
    };

    #[derive(Default)]
    struct RecordingBackend {
        sent: Mutex<Vec<(u64, FieldMap)>>,
    }

    impl Backend for RecordingBackend {
        fn send(&self, request_id: u64, request: FieldMap) {
            self.sent.lock().expect("sent lock").push((request_id, request));
        }

        fn receive(&self, _timeout: Duration) -> Option<Incoming> {
            None
        }
    }

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime should build")
    }

    fn new_chat(chat_id: i64, order: i64) -> Incoming {
        let mut chat = chat_fixture(chat_id, "chat");
        chat.insert("positions".to_owned(), json!([main_position(order, false)]));
        Incoming::update(fields(json!({"@type": "updateNewChat", "chat": chat})))
    }

    #[test]
    fn applies_updates_answers_and_resorts_before_idle_exit() {
        let mut session = Session::new(SessionConfig {
            resort_debounce: Duration::from_millis(20),
            ..SessionConfig::default()
        });
        let list = session.add_chat_list(ChatList::Main);
        session.fetch_more(list).expect("fetch should run");
        let backend = RecordingBackend::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (_stop_tx, stop_rx) = watch::channel(false);

        tx.send(new_chat(1, 100)).expect("channel open");
        tx.send(new_chat(2, 200)).expect("channel open");
        tx.send(Incoming::response(1, fields(json!({"@type": "ok"}))))
            .expect("channel open");

        let exit = runtime().block_on(run(
            &mut session,
            &backend,
            &mut rx,
            stop_rx,
            LoopOptions {
                idle_exit: Some(Duration::from_millis(50)),
            },
        ));

        assert_eq!(exit, LoopExit::Idle);
        let sent = backend.sent.lock().expect("sent lock");
        assert_eq!(sent[0].1.get("@type"), Some(&json!("loadChats")));
        let view = session.chat_list(list).expect("chat list should exist");
        assert_eq!(view.row_count(), 2);
        assert_eq!(view.chat_id_at(0), Some(2));
        assert!(session.next_deadline().is_none());
    }

    #[test]
    fn closed_channel_ends_loop() {
        let mut session = Session::new(SessionConfig::default());
        let backend = RecordingBackend::default();
        let (tx, mut rx) = mpsc::unbounded_channel::<Incoming>();
        let (_stop_tx, stop_rx) = watch::channel(false);
        drop(tx);

        let exit = runtime().block_on(run(
            &mut session,
            &backend,
            &mut rx,
            stop_rx,
            LoopOptions::default(),
        ));

        assert_eq!(exit, LoopExit::Disconnected);
    }

    #[test]
    fn stop_signal_ends_loop() {
        let mut session = Session::new(SessionConfig::default());
        let backend = RecordingBackend::default();
        let (_tx, mut rx) = mpsc::unbounded_channel::<Incoming>();
        let (stop_tx, stop_rx) = watch::channel(false);
        stop_tx.send(true).expect("stop receiver alive");

        let exit = runtime().block_on(run(
            &mut session,
            &backend,
            &mut rx,
            stop_rx,
            LoopOptions::default(),
        ));

        assert_eq!(exit, LoopExit::Stopped);
    }
}
