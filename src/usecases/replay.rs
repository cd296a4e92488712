//! Runs a recorded update log through the real session and event loop, then
//! reads one list consumer back out.

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Result;
use tokio::sync::{
    mpsc::{self, UnboundedReceiver},
    watch,
};

use crate::{
    domain::{chat_list::ChatList, field_map::FieldMap},
    infra::{config::AppConfig, error::AppError, replay::ReplayBackend},
    telegram::{client::Incoming, receiver::ReceiverWorker},
    usecases::{
        event_loop::{self, LoopExit, LoopOptions},
        session::{Session, SessionConfig},
    },
};

const REPLAY_NOT_SETTLED: &str = "REPLAY_NOT_SETTLED";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayRequest {
    pub path: PathBuf,
    pub list: ChatList,
    /// Show this chat's messages instead of the chat list.
    pub chat_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReplayReport {
    Chats {
        list: ChatList,
        roles: &'static [&'static str],
        rows: Vec<FieldMap>,
    },
    Messages {
        chat_id: i64,
        roles: &'static [&'static str],
        rows: Vec<FieldMap>,
    },
}

impl ReplayReport {
    pub fn roles(&self) -> &'static [&'static str] {
        match self {
            Self::Chats { roles, .. } | Self::Messages { roles, .. } => roles,
        }
    }

    pub fn rows(&self) -> &[FieldMap] {
        match self {
            Self::Chats { rows, .. } | Self::Messages { rows, .. } => rows,
        }
    }
}

struct Driver {
    backend: Arc<ReplayBackend>,
    inbound: UnboundedReceiver<Incoming>,
    stop: watch::Receiver<bool>,
    options: LoopOptions,
}

impl Driver {
    async fn settle(&mut self, session: &mut Session) -> LoopExit {
        let exit = event_loop::run(
            session,
            self.backend.as_ref(),
            &mut self.inbound,
            self.stop.clone(),
            self.options,
        )
        .await;

        if exit != LoopExit::Idle {
            tracing::warn!(code = REPLAY_NOT_SETTLED, ?exit, "replay ended before settling");
        }
        exit
    }
}

pub fn run_replay(config: &AppConfig, request: &ReplayRequest) -> Result<ReplayReport> {
    let backend = Arc::new(ReplayBackend::from_path(&request.path)?);
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(AppError::Runtime)?;

    let (inbound_tx, inbound) = mpsc::unbounded_channel();
    let _receiver = ReceiverWorker::start(
        backend.clone(),
        Duration::from_millis(config.cache.receive_timeout_ms),
        inbound_tx,
    )?;
    let (_stop_tx, stop) = watch::channel(false);

    let mut driver = Driver {
        backend,
        inbound,
        stop,
        options: LoopOptions {
            idle_exit: Some(Duration::from_millis(config.replay.idle_exit_ms)),
        },
    };
    let mut session = Session::new(SessionConfig::from(&config.cache));

    runtime.block_on(async {
        driver.settle(&mut session).await;

        match request.chat_id {
            Some(chat_id) => {
                let consumer = session.add_message_list();
                session.open_chat(consumer, chat_id)?;
                let mut exit = driver.settle(&mut session).await;
                while exit == LoopExit::Idle
                    && (session.fetch_more(consumer)? || session.load_history(consumer)?)
                {
                    exit = driver.settle(&mut session).await;
                }

                let view = session.message_list(consumer)?;
                let rows = (0..view.row_count()).filter_map(|index| view.get(index)).collect();
                Ok::<_, anyhow::Error>(ReplayReport::Messages {
                    chat_id,
                    roles: view.role_names(),
                    rows,
                })
            }
            None => {
                let consumer = session.add_chat_list(request.list);
                let mut exit = LoopExit::Idle;
                while exit == LoopExit::Idle && session.fetch_more(consumer)? {
                    exit = driver.settle(&mut session).await;
                }

                let view = session.chat_list(consumer)?;
                let rows = (0..view.row_count()).filter_map(|index| view.get(index)).collect();
                Ok(ReplayReport::Chats {
                    list: request.list,
                    roles: view.role_names(),
                    rows,
                })
            }
        }
    })
}
