use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::asset::{Access, Asset, AssetKind, EmailActivity, PermissionGrant};

/// A CRM user as seen by the mail processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub email: String,
    #[serde(rename = "altEmail", default)]
    pub alt_email: Option<String>,
    #[serde(rename = "suspendedAt", default)]
    pub suspended_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn is_suspended(&self) -> bool {
        self.suspended_at.is_some()
    }

    /// Case-insensitive match against the primary or alternate address.
    pub fn has_address(&self, address: &str) -> bool {
        self.email.eq_ignore_ascii_case(address)
            || self
                .alt_email
                .as_deref()
                .is_some_and(|alt| alt.eq_ignore_ascii_case(address))
    }
}

/// Read-only lookups the processor needs from the CRM.
pub trait Directory: Send + Sync {
    /// Active (non-suspended) user owning `address` as primary or alternate
    /// email, compared case-insensitively.
    fn find_sender(&self, address: &str) -> Option<User>;

    fn has_grant(&self, user_id: u64, kind: AssetKind, asset_id: u64) -> bool;
}

/// Whether `sender` may attach mail to `asset`.
pub fn sender_has_permissions_for(
    sender: &User,
    asset: &Asset,
    directory: &dyn Directory,
) -> bool {
    if asset.access == Access::Public {
        return true;
    }
    if asset.user_id == Some(sender.id) || asset.assigned_to == Some(sender.id) {
        return true;
    }
    asset.access == Access::Shared && directory.has_grant(sender.id, asset.kind, asset.id)
}

// ── In-memory snapshot ──────────────────────────────────────────────────────

/// Plain-data view of the CRM tables the mail processor reads and writes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrmData {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub assets: Vec<Asset>,
    #[serde(default)]
    pub permissions: Vec<PermissionGrant>,
    #[serde(default)]
    pub activities: Vec<EmailActivity>,
}

impl CrmData {
    pub fn find_asset(&self, kind: AssetKind, name: &str) -> Option<&Asset> {
        let name = name.trim();
        self.assets
            .iter()
            .find(|a| a.kind == kind && a.name.eq_ignore_ascii_case(name))
    }

    pub fn insert_asset(&mut self, kind: AssetKind, name: &str, owner_id: u64) -> Asset {
        let id = self
            .assets
            .iter()
            .filter(|a| a.kind == kind)
            .map(|a| a.id)
            .max()
            .unwrap_or(0)
            + 1;
        let asset = Asset {
            kind,
            id,
            name: name.trim().to_string(),
            access: Access::Private,
            user_id: Some(owner_id),
            assigned_to: None,
        };
        self.assets.push(asset.clone());
        asset
    }
}

impl Directory for CrmData {
    fn find_sender(&self, address: &str) -> Option<User> {
        let address = address.trim();
        self.users
            .iter()
            .find(|u| !u.is_suspended() && u.has_address(address))
            .cloned()
    }

    fn has_grant(&self, user_id: u64, kind: AssetKind, asset_id: u64) -> bool {
        self.permissions
            .iter()
            .any(|p| p.user_id == user_id && p.asset_kind == kind && p.asset_id == asset_id)
    }
}
