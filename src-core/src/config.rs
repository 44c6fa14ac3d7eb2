use serde::Deserialize;

// ── Session config ──────────────────────────────────────────────────────────

/// Mailbox settings for one processor. Immutable for the duration of a run.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub server: String,
    pub port: Option<u16>,
    #[serde(default = "default_ssl", alias = "useTLS")]
    pub ssl: bool,
    #[serde(alias = "username")]
    pub user: String,
    pub password: String,
    #[serde(rename = "scanFolder", default = "default_scan_folder")]
    pub scan_folder: String,
    #[serde(rename = "moveToFolder", alias = "moveToFolderOnSuccess", default)]
    pub move_to_folder: Option<String>,
    #[serde(
        rename = "moveInvalidToFolder",
        alias = "moveToFolderOnFailure",
        default
    )]
    pub move_invalid_to_folder: Option<String>,
}

fn default_ssl() -> bool {
    true
}

fn default_scan_folder() -> String {
    "INBOX".to_string()
}

impl SessionConfig {
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or(if self.ssl { 993 } else { 143 })
    }

    /// Folder that accepted messages are copied to, if any.
    pub fn archive_folder(&self) -> Option<&str> {
        non_blank(self.move_to_folder.as_deref())
    }

    /// Folder that discarded messages are copied to, if any.
    pub fn invalid_folder(&self) -> Option<&str> {
        non_blank(self.move_invalid_to_folder.as_deref())
    }

    /// Every folder the processor touches: scan folder first, then the
    /// configured destinations.
    pub fn folders(&self) -> Vec<&str> {
        let mut folders = vec![self.scan_folder.as_str()];
        folders.extend(self.archive_folder());
        folders.extend(self.invalid_folder());
        folders
    }
}

fn non_blank(folder: Option<&str>) -> Option<&str> {
    folder.filter(|f| !f.trim().is_empty())
}
