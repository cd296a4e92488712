//! Outgoing message commands: send text, delete messages.
//!
//! Both are fire-and-forget. Their effects come back as regular updates
//! (`updateNewMessage`, `updateMessageSendSucceeded`, `updateDeleteMessages`).

use crate::telegram::requests;

use super::contracts::RequestSink;

/// Command to send a text message to a specific chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendMessageCommand {
    pub chat_id: i64,
    pub text: String,
    /// `0` when the message is not a reply.
    pub reply_to_message_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteMessagesCommand {
    pub chat_id: i64,
    pub message_ids: Vec<i64>,
    /// Delete for every participant, not just locally.
    pub revoke: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendMessageError {
    /// Message text is empty after trimming whitespace.
    EmptyMessage,
    /// No chat is targeted.
    NoChat,
    /// Delete command without message ids.
    NothingToDelete,
}

impl std::fmt::Display for SendMessageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyMessage => f.write_str("message text is empty"),
            Self::NoChat => f.write_str("no chat is open"),
            Self::NothingToDelete => f.write_str("no messages selected for deletion"),
        }
    }
}

impl std::error::Error for SendMessageError {}

/// Queues a `sendMessage` request and returns its request id.
///
/// The text is trimmed before sending.
pub fn send_message(
    sink: &mut dyn RequestSink,
    command: SendMessageCommand,
) -> Result<u64, SendMessageError> {
    if command.chat_id == 0 {
        return Err(SendMessageError::NoChat);
    }

    let text = command.text.trim();
    if text.is_empty() {
        return Err(SendMessageError::EmptyMessage);
    }

    Ok(sink.send(requests::send_text_message(
        command.chat_id,
        text,
        command.reply_to_message_id,
    )))
}

pub fn delete_messages(
    sink: &mut dyn RequestSink,
    command: DeleteMessagesCommand,
) -> Result<u64, SendMessageError> {
    if command.chat_id == 0 {
        return Err(SendMessageError::NoChat);
    }

    if command.message_ids.is_empty() {
        return Err(SendMessageError::NothingToDelete);
    }

    Ok(sink.send(requests::delete_messages(
        command.chat_id,
        &command.message_ids,
        command.revoke,
    )))
}
