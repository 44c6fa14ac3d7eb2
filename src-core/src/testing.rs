//! In-memory doubles shared by the unit tests.

use std::collections::BTreeMap;
use std::io;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use crate::asset::{Access, Asset, AssetKind, AssetStore, EmailActivity};
use crate::config::SessionConfig;
use crate::directory::{CrmData, Directory, User};
use crate::error::{HandlerError, MailError};
use crate::handler::{HandlerContext, MessageHandler};
use crate::message::MailMessage;
use crate::store::{Flag, MailStore};

pub fn known_user(id: u64, email: &str) -> User {
    User {
        id,
        email: email.to_string(),
        alt_email: None,
        suspended_at: None,
    }
}

pub fn suspended_user(id: u64, email: &str) -> User {
    User {
        suspended_at: Some(Utc::now()),
        ..known_user(id, email)
    }
}

// ── Logs ────────────────────────────────────────────────────────────────────

/// Log output captured on the current thread.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Routes `tracing` output on this thread into a buffer until the guard drops.
pub fn capture_logs() -> (CapturedLogs, tracing::subscriber::DefaultGuard) {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .without_time()
        .finish();
    (logs, tracing::subscriber::set_default(subscriber))
}

// ── CRM ─────────────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct MemoryCrm {
    data: Arc<Mutex<CrmData>>,
}

impl MemoryCrm {
    pub fn with_users(users: Vec<User>) -> Self {
        let crm = Self::default();
        crm.data.lock().unwrap().users = users;
        crm
    }

    pub fn add_asset(&self, kind: AssetKind, name: &str, access: Access, owner: Option<u64>) -> Asset {
        let mut data = self.data.lock().unwrap();
        data.insert_asset(kind, name, 0);
        let asset = data.assets.last_mut().unwrap();
        asset.access = access;
        asset.user_id = owner;
        asset.clone()
    }

    pub fn snapshot(&self) -> CrmData {
        self.data.lock().unwrap().clone()
    }

    pub fn clone_arc(&self) -> Arc<dyn AssetStore> {
        Arc::new(self.clone())
    }
}

impl Directory for MemoryCrm {
    fn find_sender(&self, address: &str) -> Option<User> {
        self.data.lock().unwrap().find_sender(address)
    }

    fn has_grant(&self, user_id: u64, kind: AssetKind, asset_id: u64) -> bool {
        self.data.lock().unwrap().has_grant(user_id, kind, asset_id)
    }
}

impl AssetStore for MemoryCrm {
    fn find(&self, kind: AssetKind, name: &str) -> Result<Option<Asset>, HandlerError> {
        Ok(self.data.lock().unwrap().find_asset(kind, name).cloned())
    }

    fn create(&self, kind: AssetKind, name: &str, owner_id: u64) -> Result<Asset, HandlerError> {
        Ok(self.data.lock().unwrap().insert_asset(kind, name, owner_id))
    }

    fn attach_email(&self, activity: EmailActivity) -> Result<(), HandlerError> {
        self.data.lock().unwrap().activities.push(activity);
        Ok(())
    }
}

// ── Handler ─────────────────────────────────────────────────────────────────

/// Records the UID of every message it is given; fails on subjects containing
/// the configured needle.
#[derive(Default)]
pub struct RecordingHandler {
    calls: Arc<Mutex<Vec<u32>>>,
    fail_on: Option<String>,
}

impl RecordingHandler {
    pub fn failing_on(needle: &str) -> Self {
        Self {
            fail_on: Some(needle.to_string()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Arc<Mutex<Vec<u32>>> {
        Arc::clone(&self.calls)
    }
}

impl MessageHandler for RecordingHandler {
    fn name(&self) -> &str {
        "recording"
    }

    fn process(&self, ctx: &HandlerContext<'_>, message: &MailMessage) -> Result<(), HandlerError> {
        self.calls.lock().unwrap().push(ctx.uid);
        let subject = message.subject.as_deref().unwrap_or("");
        match &self.fail_on {
            Some(needle) if subject.contains(needle.as_str()) => {
                Err(HandlerError::Store(format!("refusing \"{}\"", subject)))
            }
            _ => Ok(()),
        }
    }
}

// ── Mailbox ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub uid: u32,
    pub raw: Vec<u8>,
    pub seen: bool,
    pub deleted: bool,
}

/// Mailbox double that logs every command it receives, IMAP-style.
#[derive(Debug, Default)]
pub struct MemoryStore {
    folders: BTreeMap<String, Vec<StoredMessage>>,
    pub selected: Option<String>,
    pub connected: bool,
    pub fail_connect: bool,
    pub fail_search: bool,
    pub fail_fetch: Vec<u32>,
    pub commands: Vec<String>,
}

impl MemoryStore {
    pub fn with_folders(names: &[&str]) -> Self {
        let mut store = Self::default();
        for name in names {
            store.folders.insert(name.to_string(), Vec::new());
        }
        store
    }

    pub fn deliver(&mut self, folder: &str, raw: &str) {
        self.deliver_raw(folder, raw.as_bytes().to_vec());
    }

    pub fn deliver_raw(&mut self, folder: &str, raw: Vec<u8>) {
        let messages = self.folders.entry(folder.to_string()).or_default();
        let uid = messages.iter().map(|m| m.uid).max().unwrap_or(0) + 1;
        messages.push(StoredMessage {
            uid,
            raw,
            seen: false,
            deleted: false,
        });
    }

    pub fn folder(&self, name: &str) -> &[StoredMessage] {
        self.folders.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn folder_names(&self) -> Vec<String> {
        self.folders.keys().cloned().collect()
    }

    fn selected_mut(&mut self) -> Result<&mut Vec<StoredMessage>, MailError> {
        let name = self.selected.as_ref().ok_or(MailError::NotConnected)?;
        self.folders
            .get_mut(name)
            .ok_or_else(|| MailError::command("SELECT", "mailbox vanished"))
    }

    fn message_mut(&mut self, uid: u32) -> Result<&mut StoredMessage, MailError> {
        self.selected_mut()?
            .iter_mut()
            .find(|m| m.uid == uid)
            .ok_or(MailError::Fetch {
                uid,
                reason: "no such message".to_string(),
            })
    }
}

#[async_trait]
impl MailStore for MemoryStore {
    async fn connect(&mut self, config: &SessionConfig) -> Result<(), MailError> {
        self.commands.push("LOGIN".to_string());
        if self.fail_connect {
            return Err(MailError::Connection {
                server: config.server.clone(),
                reason: "connection refused".to_string(),
            });
        }
        self.connected = true;
        Ok(())
    }

    async fn folder_exists(&mut self, folder: &str) -> Result<bool, MailError> {
        self.commands.push(format!("LIST {}", folder));
        Ok(self.folders.contains_key(folder))
    }

    async fn create_folder(&mut self, folder: &str) -> Result<(), MailError> {
        self.commands.push(format!("CREATE {}", folder));
        self.folders.insert(folder.to_string(), Vec::new());
        Ok(())
    }

    async fn select(&mut self, folder: &str) -> Result<(), MailError> {
        self.commands.push(format!("SELECT {}", folder));
        if !self.folders.contains_key(folder) {
            return Err(MailError::command("SELECT", format!("no mailbox {}", folder)));
        }
        self.selected = Some(folder.to_string());
        Ok(())
    }

    async fn search_unseen(&mut self) -> Result<Vec<u32>, MailError> {
        self.commands.push("SEARCH UNSEEN".to_string());
        if self.fail_search {
            return Err(MailError::command("UID SEARCH", "server busy"));
        }
        Ok(self
            .selected_mut()?
            .iter()
            .filter(|m| !m.seen)
            .map(|m| m.uid)
            .collect())
    }

    async fn fetch(&mut self, uid: u32) -> Result<Vec<u8>, MailError> {
        self.commands.push(format!("FETCH {}", uid));
        if self.fail_fetch.contains(&uid) {
            return Err(MailError::Fetch {
                uid,
                reason: "connection reset".to_string(),
            });
        }
        Ok(self.message_mut(uid)?.raw.clone())
    }

    async fn copy(&mut self, uid: u32, folder: &str) -> Result<(), MailError> {
        self.commands.push(format!("COPY {} {}", uid, folder));
        let raw = self.message_mut(uid)?.raw.clone();
        if !self.folders.contains_key(folder) {
            return Err(MailError::command("UID COPY", format!("[TRYCREATE] no mailbox {}", folder)));
        }
        self.deliver_raw(folder, raw);
        Ok(())
    }

    async fn add_flag(&mut self, uid: u32, flag: Flag) -> Result<(), MailError> {
        self.commands.push(format!("STORE {} +FLAGS ({})", uid, flag.as_imap()));
        let message = self.message_mut(uid)?;
        match flag {
            Flag::Seen => message.seen = true,
            Flag::Deleted => message.deleted = true,
        }
        Ok(())
    }

    async fn expunge(&mut self) -> Result<usize, MailError> {
        self.commands.push("EXPUNGE".to_string());
        let messages = self.selected_mut()?;
        let before = messages.len();
        messages.retain(|m| !m.deleted);
        Ok(before - messages.len())
    }

    async fn disconnect(&mut self) {
        self.commands.push("LOGOUT".to_string());
        self.connected = false;
        self.selected = None;
    }
}
