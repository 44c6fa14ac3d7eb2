use async_trait::async_trait;

use crate::config::SessionConfig;
use crate::error::MailError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    Seen,
    Deleted,
}

impl Flag {
    pub fn as_imap(&self) -> &'static str {
        match self {
            Flag::Seen => "\\Seen",
            Flag::Deleted => "\\Deleted",
        }
    }
}

/// One session against a remote mailbox. All operations are issued one at a
/// time; message operations address the currently selected folder by UID.
#[async_trait]
pub trait MailStore: Send {
    /// Opens the transport and authenticates.
    async fn connect(&mut self, config: &SessionConfig) -> Result<(), MailError>;

    async fn folder_exists(&mut self, folder: &str) -> Result<bool, MailError>;

    async fn create_folder(&mut self, folder: &str) -> Result<(), MailError>;

    async fn select(&mut self, folder: &str) -> Result<(), MailError>;

    /// UIDs of messages without `\Seen`, in ascending order.
    async fn search_unseen(&mut self) -> Result<Vec<u32>, MailError>;

    /// Full RFC 822 source of a message, without setting `\Seen`.
    async fn fetch(&mut self, uid: u32) -> Result<Vec<u8>, MailError>;

    async fn copy(&mut self, uid: u32, folder: &str) -> Result<(), MailError>;

    async fn add_flag(&mut self, uid: u32, flag: Flag) -> Result<(), MailError>;

    /// Permanently removes `\Deleted` messages from the selected folder and
    /// returns how many went.
    async fn expunge(&mut self) -> Result<usize, MailError>;

    /// Logs out, force-closing the transport if logout fails. Never fails.
    async fn disconnect(&mut self);
}
