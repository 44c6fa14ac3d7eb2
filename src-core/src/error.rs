use thiserror::Error;

use crate::asset::AssetKind;

/// Failures raised while talking to the mailbox store or handling a message.
#[derive(Debug, Error)]
pub enum MailError {
    #[error("could not connect to {server}: {reason}")]
    Connection { server: String, reason: String },

    #[error("no active mailbox session")]
    NotConnected,

    #[error("{command} failed: {reason}")]
    Command { command: &'static str, reason: String },

    #[error("could not fetch message {uid}: {reason}")]
    Fetch { uid: u32, reason: String },

    #[error("could not parse message: {0}")]
    Parse(#[from] mailparse::MailParseError),

    #[error(transparent)]
    Handler(#[from] HandlerError),
}

impl MailError {
    pub fn command(command: &'static str, reason: impl ToString) -> Self {
        MailError::Command {
            command,
            reason: reason.to_string(),
        }
    }
}

/// Errors raised by a per-keyword message handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("message body does not start with a known keyword")]
    MissingKeyword,

    #[error("sender may not attach mail to {kind} \"{name}\"")]
    PermissionDenied { kind: AssetKind, name: String },

    #[error("asset store error: {0}")]
    Store(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown handler keyword \"{0}\"")]
    UnknownKeyword(String),
}
