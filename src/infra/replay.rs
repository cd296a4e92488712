//! In-memory backend fed from a newline-delimited JSON update log.
//!
//! Every logged update is delivered once, in file order. Requests are answered
//! from what the log contained: `getChatHistory` pages come from the messages
//! seen in `updateNewMessage` and chat `last_message` fields, `loadChats`
//! succeeds once per list and reports 404 afterwards, everything else gets
//! `ok`.

use std::{
    collections::{BTreeMap, HashSet},
    fs,
    path::Path,
    sync::{
        mpsc::{self, Receiver, Sender},
        Mutex, MutexGuard,
    },
    time::Duration,
};

use serde_json::{json, Value};

use crate::{
    domain::{
        chat_list::ChatList,
        field_map::{get_i32, get_i64, get_map, tagged, type_tag, FieldMap},
    },
    infra::error::AppError,
    telegram::client::{Backend, Incoming},
};

const REPLAY_LOADED: &str = "REPLAY_LOG_LOADED";
const REPLAY_REQUEST: &str = "REPLAY_REQUEST_ANSWERED";

#[derive(Debug, Default)]
struct ReplayState {
    messages: BTreeMap<i64, BTreeMap<i64, FieldMap>>,
    loaded_lists: HashSet<ChatList>,
}

#[derive(Debug)]
pub struct ReplayBackend {
    state: Mutex<ReplayState>,
    logged_updates: usize,
    outgoing: Sender<Incoming>,
    incoming: Mutex<Receiver<Incoming>>,
}

impl ReplayBackend {
    pub fn from_path(path: &Path) -> Result<Self, AppError> {
        let raw = fs::read_to_string(path).map_err(|source| AppError::ReplayRead {
            path: path.to_path_buf(),
            source,
        })?;

        let mut updates = Vec::new();
        for (index, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let value: Value =
                serde_json::from_str(line).map_err(|source| AppError::ReplayParse {
                    path: path.to_path_buf(),
                    line: index + 1,
                    source,
                })?;
            match value {
                Value::Object(update) if type_tag(&update).is_some() => updates.push(update),
                _ => return Err(AppError::ReplayEntry { line: index + 1 }),
            }
        }

        let backend = Self::from_updates(updates);
        tracing::info!(
            code = REPLAY_LOADED,
            path = %path.display(),
            updates = backend.logged_updates(),
            "replay log loaded"
        );
        Ok(backend)
    }

    pub fn from_updates(updates: Vec<FieldMap>) -> Self {
        let (outgoing, incoming) = mpsc::channel();
        let mut state = ReplayState::default();
        let logged_updates = updates.len();
        for update in updates {
            for message in carried_messages(&update) {
                remember_message(&mut state.messages, message);
            }
            let _ = outgoing.send(Incoming::update(update));
        }

        Self {
            state: Mutex::new(state),
            logged_updates,
            outgoing,
            incoming: Mutex::new(incoming),
        }
    }

    pub fn logged_updates(&self) -> usize {
        self.logged_updates
    }

    fn lock(&self) -> MutexGuard<'_, ReplayState> {
        // A panic while holding the lock leaves plain data behind.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn answer(state: &mut ReplayState, request: &FieldMap) -> FieldMap {
        match type_tag(request).unwrap_or_default() {
            "getChatHistory" => history_page(&state.messages, request),
            "loadChats" => {
                let list = get_map(request, "chat_list")
                    .and_then(ChatList::from_fields)
                    .unwrap_or_default();
                if state.loaded_lists.insert(list) {
                    tagged("ok")
                } else {
                    not_found()
                }
            }
            _ => tagged("ok"),
        }
    }
}

impl Backend for ReplayBackend {
    fn send(&self, request_id: u64, request: FieldMap) {
        let response = Self::answer(&mut self.lock(), &request);
        tracing::debug!(
            code = REPLAY_REQUEST,
            request_id,
            method = type_tag(&request).unwrap_or_default(),
            answer = type_tag(&response).unwrap_or_default(),
            "replay request answered"
        );
        // The receiving half lives in `self`, so the channel cannot be closed.
        let _ = self.outgoing.send(Incoming::response(request_id, response));
    }

    fn receive(&self, timeout: Duration) -> Option<Incoming> {
        self.incoming
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .recv_timeout(timeout)
            .ok()
    }
}

fn not_found() -> FieldMap {
    let mut error = tagged("error");
    error.insert("code".to_owned(), json!(404));
    error.insert("message".to_owned(), json!("Not Found"));
    error
}

fn carried_messages(update: &FieldMap) -> Vec<&FieldMap> {
    match type_tag(update).unwrap_or_default() {
        "updateNewMessage" => get_map(update, "message").into_iter().collect(),
        "updateChatLastMessage" => get_map(update, "last_message").into_iter().collect(),
        "updateNewChat" => get_map(update, "chat")
            .and_then(|chat| get_map(chat, "last_message"))
            .into_iter()
            .collect(),
        _ => Vec::new(),
    }
}

fn remember_message(messages: &mut BTreeMap<i64, BTreeMap<i64, FieldMap>>, message: &FieldMap) {
    let (Some(chat_id), Some(message_id)) = (get_i64(message, "chat_id"), get_i64(message, "id"))
    else {
        return;
    };

    messages
        .entry(chat_id)
        .or_default()
        .insert(message_id, message.clone());
}

/// Newest-first page around `from_message_id` (0 = latest). A negative
/// `offset` reaches that many messages towards newer ones.
fn history_page(messages: &BTreeMap<i64, BTreeMap<i64, FieldMap>>, request: &FieldMap) -> FieldMap {
    let chat_id = get_i64(request, "chat_id").unwrap_or_default();
    let from = match get_i64(request, "from_message_id").unwrap_or_default() {
        0 => i64::MAX,
        from => from,
    };
    let offset = i64::from(get_i32(request, "offset").unwrap_or_default());
    let limit = i64::from(get_i32(request, "limit").unwrap_or_default().max(0));

    let newest_first: Vec<&FieldMap> = messages
        .get(&chat_id)
        .map(|chat| chat.values().rev().collect())
        .unwrap_or_default();
    let start = newest_first
        .iter()
        .position(|message| get_i64(message, "id").is_some_and(|id| id <= from))
        .unwrap_or(newest_first.len()) as i64;

    let len = newest_first.len() as i64;
    let begin = (start + offset).clamp(0, len);
    let end = (start + offset + limit).clamp(begin, len);
    let page: Vec<Value> = newest_first[begin as usize..end as usize]
        .iter()
        .map(|message| Value::Object((*message).clone()))
        .collect();

    let mut response = tagged("messages");
    response.insert("total_count".to_owned(), json!(page.len()));
    response.insert("messages".to_owned(), Value::Array(page));
    response
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::{
        domain::field_map::get_list,
        telegram::client::BackendError,
        test_support::{chat_fixture, fields, message_fixture},
    };

    fn backend_with_messages(chat_id: i64, ids: &[i64]) -> ReplayBackend {
        ReplayBackend::from_updates(
            ids.iter()
                .map(|id| {
                    let message = message_fixture(chat_id, *id);
                    fields(json!({"@type": "updateNewMessage", "message": message}))
                })
                .collect(),
        )
    }

    fn history(backend: &ReplayBackend, from: i64, offset: i32, limit: i32) -> Vec<i64> {
        let request = fields(json!({
            "@type": "getChatHistory", "chat_id": 7,
            "from_message_id": from, "offset": offset, "limit": limit
        }));
        let answer = ReplayBackend::answer(&mut backend.lock(), &request);
        get_list(&answer, "messages")
            .map(|messages| {
                messages
                    .iter()
                    .filter_map(|message| message.get("id").and_then(Value::as_i64))
                    .collect()
            })
            .unwrap_or_default()
    }

    #[test]
    fn history_pages_follow_cursor_semantics() {
        let backend = backend_with_messages(7, &[1, 2, 3, 4, 5, 6]);

        assert_eq!(history(&backend, 0, 0, 3), vec![6, 5, 4]);
        assert_eq!(history(&backend, 4, 0, 3), vec![4, 3, 2]);
        assert_eq!(history(&backend, 4, -2, 2), vec![6, 5]);
        assert_eq!(history(&backend, 6, -2, 2), Vec::<i64>::new());
        assert_eq!(history(&backend, 1, 0, 3), vec![1]);
    }

    #[test]
    fn load_chats_is_answered_once_per_list() {
        let backend = ReplayBackend::from_updates(Vec::new());
        let request = crate::telegram::requests::load_chats(ChatList::Main, 20);

        backend.send(1, request.clone());
        backend.send(2, request);

        let first = backend.receive(Duration::ZERO).expect("first answer");
        let second = backend.receive(Duration::ZERO).expect("second answer");
        assert_eq!(first.tag(), "ok");
        assert!(
            BackendError::from_payload(&second.payload).is_some_and(|error| error.is_not_found())
        );
    }

    #[test]
    fn log_updates_are_delivered_in_order_then_times_out() {
        let mut chat = chat_fixture(7, "seven");
        chat.insert("last_message".to_owned(), json!(message_fixture(7, 3)));
        let backend = ReplayBackend::from_updates(vec![
            fields(json!({"@type": "updateNewChat", "chat": chat})),
            fields(json!({
                "@type": "updateOption",
                "name": "my_id",
                "value": {"@type": "optionValueInteger", "value": "1"}
            })),
        ]);

        let next_tag = || backend.receive(Duration::ZERO).map(|item| item.tag().to_owned());
        assert_eq!(next_tag(), Some("updateNewChat".to_owned()));
        assert_eq!(next_tag(), Some("updateOption".to_owned()));
        assert_eq!(backend.receive(Duration::from_millis(5)), None);
        assert_eq!(history(&backend, 0, 0, 10), vec![3]);
    }

    #[test]
    fn reads_log_files_and_reports_bad_lines() {
        let mut file = tempfile::NamedTempFile::new().expect("temp log should be creatable");
        writeln!(file, r#"{{"@type": "updateChatTitle", "chat_id": 1, "title": "x"}}"#)
            .expect("temp log should be writable");
        writeln!(file).expect("temp log should be writable");
        writeln!(file, "[1, 2]").expect("temp log should be writable");

        let error = ReplayBackend::from_path(file.path()).expect_err("array line must fail");

        assert!(matches!(error, AppError::ReplayEntry { line: 3 }));
    }
}
