mod stream;

use std::net::SocketAddr;
use std::time::Duration;

use async_imap::types::Fetch;
use async_native_tls::TlsConnector;
use async_std::net::{TcpStream, ToSocketAddrs};
use async_trait::async_trait;
use crm_mail_core::{Flag, MailError, MailStore, SessionConfig};
use futures::{StreamExt, TryStreamExt};
use tracing::{debug, info, warn};

pub use stream::ImapStream;

pub type ImapSession = async_imap::Session<ImapStream>;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

// ── Connection creation ─────────────────────────────────────────────────────

pub async fn create_imap_session(config: &SessionConfig) -> Result<ImapSession, String> {
    let port = config.effective_port();
    let addr = format!("{}:{}", config.server, port);

    info!("[IMAP] Connecting to {} (tls={})", addr, config.ssl);

    // Try IPv4 first; some servers hang on IPv6
    let mut addrs: Vec<SocketAddr> = addr
        .to_socket_addrs()
        .await
        .map_err(|e| format!("DNS resolve failed for {}: {}", addr, e))?
        .collect();
    addrs.sort_by_key(|a| !a.is_ipv4());

    if addrs.is_empty() {
        return Err(format!("No address found for {}", config.server));
    }

    debug!("[IMAP] DNS resolved to {:?}", addrs);

    let tcp = async_std::io::timeout(CONNECT_TIMEOUT, TcpStream::connect(&addrs[..]))
        .await
        .map_err(|e| format!("TCP connect to {} failed: {}", addr, e))?;

    let stream = if config.ssl {
        info!("[IMAP] TCP connected, starting TLS handshake...");
        let tls = TlsConnector::new()
            .connect(&config.server, tcp)
            .await
            .map_err(|e| format!("TLS handshake with {} failed: {}", config.server, e))?;
        ImapStream::Tls(tls)
    } else {
        ImapStream::Plain(tcp)
    };

    info!("[IMAP] Authenticating as {}...", config.user);

    let client = async_imap::Client::new(stream);
    let session = client
        .login(&config.user, &config.password)
        .await
        .map_err(|(e, _)| format!("Login failed for {}: {}", config.user, e))?;

    info!("[IMAP] Session established for {}", config.user);
    Ok(session)
}

// ── Store ───────────────────────────────────────────────────────────────────

/// `MailStore` over a single live IMAP session.
#[derive(Default)]
pub struct ImapStore {
    session: Option<ImapSession>,
}

impl ImapStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn session(&mut self) -> Result<&mut ImapSession, MailError> {
        self.session.as_mut().ok_or(MailError::NotConnected)
    }
}

#[async_trait]
impl MailStore for ImapStore {
    async fn connect(&mut self, config: &SessionConfig) -> Result<(), MailError> {
        // A stale session from an earlier run is closed first.
        self.disconnect().await;

        let session = create_imap_session(config)
            .await
            .map_err(|reason| MailError::Connection {
                server: config.server.clone(),
                reason,
            })?;
        self.session = Some(session);
        Ok(())
    }

    async fn folder_exists(&mut self, folder: &str) -> Result<bool, MailError> {
        let names: Vec<_> = self
            .session()?
            .list(Some(""), Some(folder))
            .await
            .map_err(|e| MailError::command("LIST", e))?
            .collect::<Vec<_>>()
            .await;

        Ok(names.into_iter().any(|r| r.is_ok()))
    }

    async fn create_folder(&mut self, folder: &str) -> Result<(), MailError> {
        self.session()?
            .create(folder)
            .await
            .map_err(|e| MailError::command("CREATE", e))
    }

    async fn select(&mut self, folder: &str) -> Result<(), MailError> {
        let mailbox = self
            .session()?
            .select(folder)
            .await
            .map_err(|e| MailError::command("SELECT", e))?;
        debug!("[IMAP] Selected {} ({} messages)", folder, mailbox.exists);
        Ok(())
    }

    async fn search_unseen(&mut self) -> Result<Vec<u32>, MailError> {
        let uids = self
            .session()?
            .uid_search("UNSEEN")
            .await
            .map_err(|e| MailError::command("UID SEARCH", e))?;

        let mut result: Vec<u32> = uids.into_iter().collect();
        result.sort_unstable();
        Ok(result)
    }

    async fn fetch(&mut self, uid: u32) -> Result<Vec<u8>, MailError> {
        let fetch_err = |reason: String| MailError::Fetch { uid, reason };

        let fetches: Vec<Fetch> = self
            .session()?
            .uid_fetch(uid.to_string(), "(UID BODY.PEEK[])")
            .await
            .map_err(|e| fetch_err(e.to_string()))?
            .try_collect()
            .await
            .map_err(|e| fetch_err(e.to_string()))?;

        let fetch = fetches
            .iter()
            .find(|f| f.uid == Some(uid))
            .or_else(|| fetches.first())
            .ok_or_else(|| fetch_err("no such message".to_string()))?;

        fetch
            .body()
            .map(<[u8]>::to_vec)
            .ok_or_else(|| fetch_err("no body in FETCH response".to_string()))
    }

    async fn copy(&mut self, uid: u32, folder: &str) -> Result<(), MailError> {
        self.session()?
            .uid_copy(uid.to_string(), folder)
            .await
            .map_err(|e| MailError::command("UID COPY", e))
    }

    async fn add_flag(&mut self, uid: u32, flag: Flag) -> Result<(), MailError> {
        let _: Vec<Fetch> = self
            .session()?
            .uid_store(uid.to_string(), format!("+FLAGS ({})", flag.as_imap()))
            .await
            .map_err(|e| MailError::command("UID STORE", e))?
            .try_collect()
            .await
            .map_err(|e| MailError::command("UID STORE", e))?;
        Ok(())
    }

    async fn expunge(&mut self) -> Result<usize, MailError> {
        let removed: Vec<u32> = self
            .session()?
            .expunge()
            .await
            .map_err(|e| MailError::command("EXPUNGE", e))?
            .try_collect()
            .await
            .map_err(|e| MailError::command("EXPUNGE", e))?;
        Ok(removed.len())
    }

    async fn disconnect(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        match session.logout().await {
            Ok(()) => info!("[IMAP] Logged out"),
            // Dropping the session closes the socket.
            Err(e) => warn!("[IMAP] Logout failed, closing connection: {}", e),
        }
    }
}
