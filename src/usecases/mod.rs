//! Use case layer: routing, pagination, list consumers, the session that
//! owns them and the replay workflow.

pub mod bootstrap;
pub mod chat_list;
pub mod contracts;
pub mod event_loop;
pub mod message_list;
pub mod pagination;
pub mod projection;
pub mod replay;
pub mod rows;
pub mod router;
pub mod send_message;
pub mod session;

/// Returns the usecases module name for smoke checks.
pub fn module_name() -> &'static str {
    "usecases"
}
