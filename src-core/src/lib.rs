//! Core of the CRM mail intake: turns unseen dropbox mail into CRM activity.

pub mod asset;
pub mod classify;
pub mod config;
pub mod content;
pub mod directory;
pub mod error;
pub mod handler;
pub mod log;
pub mod message;
pub mod processor;
pub mod store;

#[cfg(test)]
mod testing;

pub use asset::{Access, Asset, AssetKind, AssetStore, EmailActivity, PermissionGrant};
pub use classify::{classify, Rejection};
pub use config::SessionConfig;
pub use directory::{sender_has_permissions_for, CrmData, Directory, User};
pub use error::{ConfigError, HandlerError, MailError};
pub use handler::{HandlerContext, HandlerRegistry, KeywordHandler, MessageHandler};
pub use log::OperatorLog;
pub use message::MailMessage;
pub use processor::{MailProcessor, Purpose, RunSummary, SetupReport};
pub use store::{Flag, MailStore};
