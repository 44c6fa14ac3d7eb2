//! The mailbox ingestion engine.
//!
//! `setup` makes sure the configured folders exist. `run` scans the scan folder
//! for unseen mail, classifies each message, hands accepted ones to the
//! configured handler and archives them, discards the rest, expunges, and
//! reports counters. Failures are isolated per message; neither entry point
//! returns an error, and the session is always released.

use std::fmt;
use std::sync::Arc;

use crate::classify::classify;
use crate::config::SessionConfig;
use crate::directory::{Directory, User};
use crate::error::MailError;
use crate::handler::{HandlerContext, MessageHandler};
use crate::log::OperatorLog;
use crate::message::MailMessage;
use crate::store::{Flag, MailStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    /// Log in only; folders may not exist yet.
    Setup,
    /// Log in and select the scan folder.
    Run,
}

/// Counters for one run. Every observed UID ends up in exactly one of them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub archived: usize,
    pub discarded: usize,
}

impl RunSummary {
    pub fn processed(&self) -> usize {
        self.archived + self.discarded
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "messages processed: {}, archived: {}, discarded: {}.",
            self.processed(),
            self.archived,
            self.discarded
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetupReport {
    pub existing: Vec<String>,
    pub created: Vec<String>,
}

pub struct MailProcessor<S> {
    store: S,
    config: SessionConfig,
    directory: Arc<dyn Directory>,
    handler: Box<dyn MessageHandler>,
    log: OperatorLog,
    summary: RunSummary,
}

impl<S: MailStore> MailProcessor<S> {
    pub fn new(
        store: S,
        config: SessionConfig,
        directory: Arc<dyn Directory>,
        handler: Box<dyn MessageHandler>,
        log: OperatorLog,
    ) -> Self {
        Self {
            store,
            config,
            directory,
            handler,
            log,
            summary: RunSummary::default(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn summary(&self) -> RunSummary {
        self.summary
    }

    // ── Entry points ────────────────────────────────────────────────────────

    /// Creates any configured folder that is missing. Returns `None` if the
    /// session could not be established or a folder operation failed; the
    /// failure has already been logged.
    pub async fn setup(&mut self) -> Option<SetupReport> {
        let report = match self.connect(Purpose::Setup).await {
            Ok(()) => match self.ensure_folders().await {
                Ok(report) => Some(report),
                Err(e) => {
                    self.log.error(format_args!("setup error {}", e));
                    None
                }
            },
            Err(e) => {
                self.log.error(format_args!("could not login to the IMAP server: {}", e));
                None
            }
        };
        self.disconnect().await;
        report
    }

    /// Processes every unseen message in the scan folder.
    pub async fn run(&mut self) -> RunSummary {
        self.summary = RunSummary::default();

        match self.connect(Purpose::Run).await {
            Ok(()) => {
                self.scan().await;
                self.expunge().await;
            }
            Err(e) => {
                self.log.error(format_args!("could not login to the IMAP server: {}", e));
            }
        }

        let summary = self.summary;
        self.log.info(summary);
        self.disconnect().await;
        summary
    }

    // ── Connection ──────────────────────────────────────────────────────────

    async fn connect(&mut self, purpose: Purpose) -> Result<(), MailError> {
        self.log.info(format_args!("connecting & logging in to {}...", self.config.server));
        self.store.connect(&self.config).await?;
        self.log.info(format_args!("logged in to {}", self.config.server));

        if purpose == Purpose::Run {
            self.store.select(&self.config.scan_folder).await?;
        }
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.store.disconnect().await;
    }

    async fn ensure_folders(&mut self) -> Result<SetupReport, MailError> {
        let folders: Vec<String> = self.config.folders().into_iter().map(str::to_string).collect();
        let mut report = SetupReport::default();

        for folder in folders {
            if self.store.folder_exists(&folder).await? {
                self.log.info(format_args!("folder {} OK", folder));
                report.existing.push(folder);
            } else {
                self.log.info(format_args!("folder {} missing, creating...", folder));
                self.store.create_folder(&folder).await?;
                report.created.push(folder);
            }
        }
        Ok(report)
    }

    // ── Scanning ────────────────────────────────────────────────────────────

    async fn scan(&mut self) {
        let uids = match self.store.search_unseen().await {
            Ok(uids) => uids,
            Err(e) => {
                self.log.error(format_args!("could not search for new messages: {}", e));
                return;
            }
        };

        for uid in uids {
            self.process_uid(uid).await;
        }
    }

    async fn process_uid(&mut self, uid: u32) {
        let message = match self.fetch(uid).await {
            Ok(message) => message,
            Err(e) => {
                self.log
                    .message_error(format_args!("error processing email {}: {}", uid, e), None);
                self.discard(uid).await;
                return;
            }
        };
        self.log.message("fetched new message...", &message);

        let sender = match classify(&message, self.directory.as_ref()) {
            Ok(sender) => sender,
            Err(rejection) => {
                self.log.info(&rejection);
                self.discard(uid).await;
                return;
            }
        };

        if let Err(e) = self.accept(uid, &sender, &message).await {
            self.log
                .message_error(format_args!("error processing email: {}", e), Some(&message));
            self.discard(uid).await;
        }
    }

    async fn fetch(&mut self, uid: u32) -> Result<MailMessage, MailError> {
        let raw = self.store.fetch(uid).await?;
        MailMessage::parse(raw)
    }

    async fn accept(&mut self, uid: u32, sender: &User, message: &MailMessage) -> Result<(), MailError> {
        {
            let ctx = HandlerContext::new(uid, sender, self.directory.as_ref(), &self.log);
            self.handler.process(&ctx, message)?;
        }
        self.archive(uid).await
    }

    // ── Mailbox state ───────────────────────────────────────────────────────

    async fn archive(&mut self, uid: u32) -> Result<(), MailError> {
        if let Some(folder) = self.config.archive_folder() {
            self.store.copy(uid, folder).await?;
        }
        self.store.add_flag(uid, Flag::Seen).await?;
        self.summary.archived += 1;
        Ok(())
    }

    // Always counts the message, even if the store refuses the copy or flag.
    async fn discard(&mut self, uid: u32) {
        if let Some(folder) = self.config.invalid_folder() {
            if let Err(e) = self.store.copy(uid, folder).await {
                self.log
                    .warn(format_args!("could not copy message {} to {}: {}", uid, folder, e));
            }
        }
        if let Err(e) = self.store.add_flag(uid, Flag::Deleted).await {
            self.log.error(format_args!("could not flag message {} deleted: {}", uid, e));
        }
        self.summary.discarded += 1;
    }

    async fn expunge(&mut self) {
        match self.store.expunge().await {
            Ok(removed) => self.log.info(format_args!("expunged {} message(s)", removed)),
            Err(e) => self.log.error(format_args!("expunge failed: {}", e)),
        }
    }
}
