//! Per-account credential persistence.
//!
//! One JSON document per account, named `session_<account>.json`, or
//! `session_default.json` when no account is given. Expired documents are
//! kept on disk; only [`CredentialStore::clear`] removes them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

use grapnel_core::{CookieRecord, CredentialBundle, GrapnelConfig};

use crate::error::StoreError;
use crate::persistence::{default_data_dir, load_json_opt, remove_file, save_json};

/// Current document format.
pub const DOCUMENT_VERSION: u32 = 1;

// ============================================================================
// Session Document
// ============================================================================

/// The persisted form of a credential bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDocument {
    /// Format version.
    #[serde(default = "default_version")]
    pub version: u32,
    /// Account the document belongs to.
    #[serde(default)]
    pub account: Option<String>,
    /// Cookie name to value.
    pub cookies: BTreeMap<String, String>,
    /// When the bundle was harvested.
    pub extracted_at: DateTime<Utc>,
    /// When the bundle stops being accepted.
    pub expires_at: DateTime<Utc>,
    /// When the bundle was last renewed.
    #[serde(default)]
    pub last_refreshed_at: Option<DateTime<Utc>>,
    /// Account handle.
    #[serde(default)]
    pub username: Option<String>,
    /// When a live probe last accepted the bundle.
    #[serde(default)]
    pub last_validated_at: Option<DateTime<Utc>>,
    /// Raw cookie records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub records: Option<Vec<CookieRecord>>,
}

fn default_version() -> u32 {
    DOCUMENT_VERSION
}

impl SessionDocument {
    /// Builds a document from a bundle.
    pub fn from_bundle(account: Option<&str>, bundle: &CredentialBundle) -> Self {
        Self {
            version: DOCUMENT_VERSION,
            account: account.map(str::to_string),
            cookies: bundle.cookies.clone(),
            extracted_at: bundle.created_at,
            expires_at: bundle.expires_at,
            last_refreshed_at: bundle.last_refreshed_at,
            username: bundle.username.clone(),
            last_validated_at: None,
            records: bundle.records.clone(),
        }
    }

    /// Rebuilds the bundle.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] if the expiry is not after creation.
    pub fn to_bundle(&self) -> Result<CredentialBundle, StoreError> {
        let mut bundle =
            CredentialBundle::new(self.cookies.clone(), self.extracted_at, self.expires_at)?;
        bundle.last_refreshed_at = self.last_refreshed_at;
        bundle.username.clone_from(&self.username);
        bundle.records.clone_from(&self.records);
        Ok(bundle)
    }

    /// Returns true if the document's expiry has passed.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

// ============================================================================
// Credential Store
// ============================================================================

/// Keeps characters safe in a file name; everything else becomes `_`.
fn sanitize_account(account: &str) -> String {
    account
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect::<String>()
        .trim_matches('.')
        .to_string()
}

/// Durable, expiry-aware storage of credential bundles keyed by account.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    dir: PathBuf,
}

impl CredentialStore {
    /// Creates a store rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Creates a store from configuration, falling back to the data directory.
    pub fn from_config(config: &GrapnelConfig) -> Self {
        Self::new(config.storage_dir.clone().unwrap_or_else(default_data_dir))
    }

    /// Root directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the document for an account.
    pub fn path_for(&self, account: Option<&str>) -> PathBuf {
        let name = account
            .map(sanitize_account)
            .filter(|a| !a.is_empty())
            .map_or_else(|| "session_default.json".to_string(), |a| format!("session_{a}.json"));
        self.dir.join(name)
    }

    /// Persists a bundle, replacing any previous document for the account.
    #[instrument(skip(self, bundle))]
    pub async fn save(&self, account: Option<&str>, bundle: &CredentialBundle) -> Result<(), StoreError> {
        let path = self.path_for(account);
        let document = SessionDocument::from_bundle(account, bundle);
        save_json(&path, &document).await?;

        info!(
            path = %path.display(),
            cookies = document.cookies.len(),
            expires_at = %document.expires_at,
            "Session saved"
        );
        Ok(())
    }

    /// Loads the raw document, if any.
    pub async fn load_document(&self, account: Option<&str>) -> Result<Option<SessionDocument>, StoreError> {
        load_json_opt(&self.path_for(account)).await
    }

    /// Loads the bundle for an account, expired or not.
    pub async fn load(&self, account: Option<&str>) -> Result<Option<CredentialBundle>, StoreError> {
        self.load_document(account)
            .await?
            .map(|doc| doc.to_bundle())
            .transpose()
    }

    /// Loads the bundle only if it has not expired at `now`.
    pub async fn load_unexpired(
        &self,
        account: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<CredentialBundle>, StoreError> {
        let Some(document) = self.load_document(account).await? else {
            return Ok(None);
        };
        if document.is_expired_at(now) {
            debug!(expires_at = %document.expires_at, "Persisted session expired");
            return Ok(None);
        }
        document.to_bundle().map(Some)
    }

    /// Deletes the document. Returns false if there was none.
    pub async fn clear(&self, account: Option<&str>) -> Result<bool, StoreError> {
        let removed = remove_file(&self.path_for(account)).await?;
        if removed {
            info!(account = account.unwrap_or("default"), "Session cleared");
        }
        Ok(removed)
    }

    /// Records a successful live validation. Returns false if there is no document.
    pub async fn mark_validated(&self, account: Option<&str>, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let path = self.path_for(account);
        let Some(mut document) = load_json_opt::<SessionDocument>(&path).await? else {
            return Ok(false);
        };
        document.last_validated_at = Some(at);
        save_json(&path, &document).await?;
        debug!(validated_at = %at, "Validation recorded");
        Ok(true)
    }
}
