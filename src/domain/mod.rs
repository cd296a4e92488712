//! Domain layer: entity snapshots, chat ordering and change notifications.

pub mod chat;
pub mod chat_list;
pub mod debounce;
pub mod events;
pub mod field_map;
pub mod ordering;
pub mod store;

/// Returns the domain module name for smoke checks.
pub fn module_name() -> &'static str {
    "domain"
}
