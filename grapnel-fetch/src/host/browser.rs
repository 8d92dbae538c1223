//! Headless-browser boundary.
//!
//! Automated re-login needs a real browser. No driver is bundled; the
//! embedding application implements [`BrowserSession`] over whatever
//! automation library it ships, and the refresh logic stays testable
//! against a scripted fake.

use async_trait::async_trait;
use std::time::Duration;

use grapnel_core::CookieRecord;

use crate::error::BrowserError;

/// One browser page under automation.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Navigates to a URL and waits for the load to settle.
    async fn goto(&self, url: &str) -> Result<(), BrowserError>;

    /// Types a value into the element matching `selector`.
    async fn fill(&self, selector: &str, value: &str) -> Result<(), BrowserError>;

    /// Clicks the element matching `selector`.
    async fn click(&self, selector: &str) -> Result<(), BrowserError>;

    /// Waits until an element matching `selector` exists.
    async fn wait_for_selector(&self, selector: &str, timeout: Duration)
    -> Result<(), BrowserError>;

    /// Reads every cookie in the page's jar.
    async fn read_cookies(&self) -> Result<Vec<CookieRecord>, BrowserError>;

    /// Visible text of the current page.
    async fn content(&self) -> Result<String, BrowserError>;

    /// URL of the current page.
    async fn current_url(&self) -> Result<String, BrowserError>;

    /// Returns true if an element matching `selector` appears within `timeout`.
    async fn is_present(&self, selector: &str, timeout: Duration) -> bool {
        self.wait_for_selector(selector, timeout).await.is_ok()
    }
}

/// Opens fresh browser sessions.
///
/// A new page is opened per login attempt so a failed attempt leaves no
/// half-filled form behind.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Opens a new page.
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, BrowserError>;
}
