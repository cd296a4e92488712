//! Telegram backend integration: transport contract, update decoding and
//! request builders.

pub mod client;
pub mod receiver;
pub mod requests;
pub mod updates;

/// Returns the telegram module name for smoke checks.
pub fn module_name() -> &'static str {
    "telegram"
}
