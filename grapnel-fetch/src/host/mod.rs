//! Host APIs for Grapnel.
//!
//! This module provides abstractions for interacting with external systems:
//!
//! - [`http`] - HTTP transport and `Set-Cookie` parsing
//! - [`browser`] - Headless-browser automation boundary
//! - [`keychain`] - Secret storage (system keychain)

pub mod browser;
pub mod http;
pub mod keychain;

// Re-export key types
pub use browser::{BrowserLauncher, BrowserSession};
pub use http::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, parse_set_cookie};
pub use keychain::{MemorySecretStore, SecretStore, SystemKeychain};
