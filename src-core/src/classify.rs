use std::fmt;

use crate::directory::{Directory, User};
use crate::message::MailMessage;

/// Why a message was not handed to a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    NotPlainText,
    MissingSender,
    UnknownSender(String),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::NotPlainText => write!(f, "not a text message, discarding"),
            Rejection::MissingSender => write!(f, "message has no sender, discarding"),
            Rejection::UnknownSender(address) => {
                write!(f, "sent by unknown user {}, discarding", address)
            }
        }
    }
}

/// Format check, then sender lookup. Returns the resolved sender when both pass.
pub fn classify(message: &MailMessage, directory: &dyn Directory) -> Result<User, Rejection> {
    if message.is_html() {
        return Err(Rejection::NotPlainText);
    }

    let address = message
        .sender()
        .ok_or(Rejection::MissingSender)?
        .trim()
        .to_lowercase();

    directory
        .find_sender(&address)
        .ok_or(Rejection::UnknownSender(address))
}
