// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # Grapnel Store
//!
//! Durable state for Grapnel.
//!
//! This crate provides:
//!
//! - **CredentialStore**: Per-account session documents, expiry-aware
//! - **Config**: `GrapnelConfig` loading with environment overrides
//! - **Persistence**: Atomic, owner-only JSON file helpers
//!
//! ## Usage
//!
//! ```ignore
//! use grapnel_store::{CredentialStore, load_config};
//!
//! let config = load_config()?;
//! let store = CredentialStore::from_config(&config);
//!
//! store.save(config.account.as_deref(), &bundle).await?;
//! let restored = store.load_unexpired(config.account.as_deref(), Utc::now()).await?;
//! ```

pub mod config;
pub mod credentials;
pub mod error;
pub mod persistence;


pub use config::{apply_env_overrides, load_config, load_config_from};
pub use credentials::{CredentialStore, DOCUMENT_VERSION, SessionDocument};
pub use error::StoreError;
pub use persistence::{
    default_config_dir, default_config_path, default_data_dir, ensure_dir, load_json,
    load_json_opt, load_json_or_default, remove_file, save_json,
};
