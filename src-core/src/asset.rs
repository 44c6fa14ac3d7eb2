use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, HandlerError};
use crate::message::MailMessage;

// ── Asset kinds ─────────────────────────────────────────────────────────────

/// CRM record types that inbound mail can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Account,
    Campaign,
    Contact,
    Lead,
    Opportunity,
}

impl AssetKind {
    pub const ALL: [AssetKind; 5] = [
        AssetKind::Account,
        AssetKind::Campaign,
        AssetKind::Contact,
        AssetKind::Lead,
        AssetKind::Opportunity,
    ];

    pub fn keyword(&self) -> &'static str {
        match self {
            AssetKind::Account => "account",
            AssetKind::Campaign => "campaign",
            AssetKind::Contact => "contact",
            AssetKind::Lead => "lead",
            AssetKind::Opportunity => "opportunity",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

impl FromStr for AssetKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AssetKind::ALL
            .into_iter()
            .find(|kind| kind.keyword().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConfigError::UnknownKeyword(s.to_string()))
    }
}

// ── Records ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Access {
    Public,
    Private,
    Shared,
}

/// Access-control view of a CRM record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub kind: AssetKind,
    pub id: u64,
    pub name: String,
    pub access: Access,
    #[serde(rename = "userId")]
    pub user_id: Option<u64>,
    #[serde(rename = "assignedTo")]
    pub assigned_to: Option<u64>,
}

/// Explicit share of a `Shared` asset with one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGrant {
    #[serde(rename = "userId")]
    pub user_id: u64,
    #[serde(rename = "assetKind")]
    pub asset_kind: AssetKind,
    #[serde(rename = "assetId")]
    pub asset_id: u64,
}

/// A message recorded against an asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailActivity {
    #[serde(rename = "assetKind")]
    pub asset_kind: AssetKind,
    #[serde(rename = "assetId")]
    pub asset_id: u64,
    #[serde(rename = "userId")]
    pub user_id: u64,
    #[serde(rename = "messageId")]
    pub message_id: Option<String>,
    pub subject: Option<String>,
    pub body: String,
    #[serde(rename = "sentFrom")]
    pub sent_from: String,
    #[serde(rename = "sentTo")]
    pub sent_to: Vec<String>,
    pub cc: Vec<String>,
    #[serde(rename = "receivedAt")]
    pub received_at: DateTime<Utc>,
}

impl EmailActivity {
    pub fn new(asset: &Asset, user_id: u64, message: &MailMessage, body: String) -> Self {
        Self {
            asset_kind: asset.kind,
            asset_id: asset.id,
            user_id,
            message_id: message.message_id.clone(),
            subject: message.subject.clone(),
            body,
            sent_from: message.sender().unwrap_or_default().to_string(),
            sent_to: message.to.clone(),
            cc: message.cc.clone(),
            received_at: message.date.unwrap_or_else(Utc::now),
        }
    }
}

// ── Store ───────────────────────────────────────────────────────────────────

/// Persistence seam for CRM records. Implemented outside the engine.
pub trait AssetStore: Send + Sync {
    /// Looks an asset up by name, case-insensitively.
    fn find(&self, kind: AssetKind, name: &str) -> Result<Option<Asset>, HandlerError>;

    /// Creates a private asset owned by `owner_id`.
    fn create(&self, kind: AssetKind, name: &str, owner_id: u64) -> Result<Asset, HandlerError>;

    fn attach_email(&self, activity: EmailActivity) -> Result<(), HandlerError>;
}
