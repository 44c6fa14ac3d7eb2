use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crm_mail_core::{
    Asset, AssetKind, AssetStore, CrmData, Directory, EmailActivity, HandlerError, User,
};
use tracing::{debug, warn};

use crate::config::ConfigError;

/// CRM tables kept in a single JSON file, rewritten after every change.
pub struct CrmFile {
    path: PathBuf,
    data: Mutex<CrmData>,
}

impl CrmFile {
    /// Loads the data file. A missing file starts out empty.
    pub fn open(path: &Path) -> Result<Self, ConfigError> {
        let data = match fs::read_to_string(path) {
            Ok(json) => serde_json::from_str(&json).map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("CRM data file {:?} not found, starting empty", path);
                CrmData::default()
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            data: Mutex::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, CrmData> {
        self.data.lock().unwrap_or_else(|e| e.into_inner())
    }

    // Write to a sibling temp file, then rename over the original.
    fn persist(&self, data: &CrmData) -> Result<(), HandlerError> {
        let json = serde_json::to_string_pretty(data)
            .map_err(|e| HandlerError::Store(format!("serialize CRM data: {}", e)))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| HandlerError::Store(format!("create {:?}: {}", parent, e)))?;
        }

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .map_err(|e| HandlerError::Store(format!("write {:?}: {}", tmp, e)))?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| HandlerError::Store(format!("replace {:?}: {}", self.path, e)))?;

        debug!("Saved CRM data to {:?}", self.path);
        Ok(())
    }
}

impl Directory for CrmFile {
    fn find_sender(&self, address: &str) -> Option<User> {
        self.lock().find_sender(address)
    }

    fn has_grant(&self, user_id: u64, kind: AssetKind, asset_id: u64) -> bool {
        self.lock().has_grant(user_id, kind, asset_id)
    }
}

impl AssetStore for CrmFile {
    fn find(&self, kind: AssetKind, name: &str) -> Result<Option<Asset>, HandlerError> {
        Ok(self.lock().find_asset(kind, name).cloned())
    }

    fn create(&self, kind: AssetKind, name: &str, owner_id: u64) -> Result<Asset, HandlerError> {
        let mut data = self.lock();
        let asset = data.insert_asset(kind, name, owner_id);
        if let Err(e) = self.persist(&data) {
            data.assets.pop();
            return Err(e);
        }
        Ok(asset)
    }

    fn attach_email(&self, activity: EmailActivity) -> Result<(), HandlerError> {
        let mut data = self.lock();
        data.activities.push(activity);
        if let Err(e) = self.persist(&data) {
            data.activities.pop();
            return Err(e);
        }
        Ok(())
    }
}
