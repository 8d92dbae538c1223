//! Two-factor challenge detection and resolution.
//!
//! Detection reads the page text and URL after credentials are submitted.
//! Resolution produces a code by the challenge's method and hands it to a
//! caller-supplied submit step:
//!
//! - **TOTP**: 6 digits over a 30-second step, HMAC-SHA1 of a base32 secret
//! - **SMS**: polled from a [`SmsCodeSource`], bounded and cancellable
//! - **Backup code**: popped from a single-use pool

use async_trait::async_trait;
use regex::Regex;
use ring::hmac;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, LazyLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, instrument, warn};

use grapnel_core::{TwoFactorChallenge, TwoFactorConfig, TwoFactorMethod};
use grapnel_fetch::RetryPolicy;

use crate::error::TwoFactorError;

/// TOTP time step.
pub const TOTP_STEP_SECS: u64 = 30;

/// TOTP code length.
pub const TOTP_DIGITS: u32 = 6;

/// Pause between resolution attempts.
const RETRY_DELAY: Duration = Duration::from_secs(2);

// ============================================================================
// Detection
// ============================================================================

/// Pattern for two-factor and checkpoint URLs.
static CHALLENGE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)/(two_factor|two-factor|2fa)\b|/challenge/").expect("Invalid regex")
});

/// Pattern for page text asking for a code.
static CHALLENGE_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)two[- ]factor|security code|verification code|login code|confirmation code|enter the \d-digit code",
    )
    .expect("Invalid regex")
});

static TOTP_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)authentication app|authenticator|\btotp\b|code generator")
        .expect("Invalid regex")
});

static SMS_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)text message|\bsms\b|sent to your phone|sent a code to|phone number ending")
        .expect("Invalid regex")
});

static BACKUP_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)backup code|recovery code").expect("Invalid regex"));

/// Pattern for "+1 ***-***-1234" style hints.
static MASKED_PHONE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\+?\d{0,3}[ \-]?[*•]{2,}[*•\d \-]*\d{2,4}").expect("Invalid regex")
});

static ENDING_IN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)ending in\s+(\d{2,4})").expect("Invalid regex"));

fn matches(re: &LazyLock<Regex>, text: &str) -> bool {
    re.is_match(text)
}

fn phone_hint(text: &str) -> Option<String> {
    if let Some(m) = MASKED_PHONE.find(text) {
        return Some(m.as_str().trim().to_string());
    }
    ENDING_IN
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Detects a two-factor challenge, with `fallback` as the method when the
/// page does not name one.
pub fn detect_challenge_with(
    page_text: &str,
    page_url: &str,
    fallback: TwoFactorMethod,
) -> Option<TwoFactorChallenge> {
    if !matches(&CHALLENGE_URL, page_url) && !matches(&CHALLENGE_TEXT, page_text) {
        return None;
    }

    let method = if matches(&TOTP_TEXT, page_text) {
        TwoFactorMethod::Totp
    } else if matches(&SMS_TEXT, page_text) {
        TwoFactorMethod::Sms
    } else {
        fallback
    };

    Some(TwoFactorChallenge {
        method,
        phone_hint: phone_hint(page_text),
        backup_available: matches(&BACKUP_TEXT, page_text),
    })
}

/// Detects a two-factor challenge. Returns `None` for ordinary pages.
pub fn detect_challenge_type(page_text: &str, page_url: &str) -> Option<TwoFactorChallenge> {
    detect_challenge_with(page_text, page_url, TwoFactorMethod::default())
}

// ============================================================================
// TOTP
// ============================================================================

fn decode_base32(secret: &str) -> Result<Vec<u8>, TwoFactorError> {
    let mut out = Vec::with_capacity(secret.len() * 5 / 8);
    let mut buffer: u32 = 0;
    let mut bits = 0;

    for c in secret.chars().filter(|c| !c.is_whitespace() && *c != '=' && *c != '-') {
        let value = match c.to_ascii_uppercase() {
            u @ 'A'..='Z' => u as u32 - 'A' as u32,
            d @ '2'..='7' => d as u32 - '2' as u32 + 26,
            other => {
                return Err(TwoFactorError::InvalidSecret(format!(
                    "unexpected character {other:?}"
                )));
            }
        };
        buffer = (buffer << 5) | value;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push(((buffer >> bits) & 0xff) as u8);
        }
    }

    if out.is_empty() {
        return Err(TwoFactorError::InvalidSecret("empty secret".to_string()));
    }
    Ok(out)
}

/// Derives the TOTP code for `unix_time` from a base32 secret.
pub fn generate_totp(secret: &str, unix_time: u64) -> Result<String, TwoFactorError> {
    let key_bytes = decode_base32(secret)?;
    let key = hmac::Key::new(hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY, &key_bytes);
    let counter = unix_time / TOTP_STEP_SECS;
    let tag = hmac::sign(&key, &counter.to_be_bytes());
    let digest = tag.as_ref();

    // RFC 4226 dynamic truncation.
    let offset = usize::from(digest[digest.len() - 1] & 0x0f);
    let binary = u32::from_be_bytes([
        digest[offset] & 0x7f,
        digest[offset + 1],
        digest[offset + 2],
        digest[offset + 3],
    ]);
    let code = binary % 10u32.pow(TOTP_DIGITS);
    Ok(format!("{code:0width$}", width = TOTP_DIGITS as usize))
}

/// TOTP code for the current time.
pub fn current_totp(secret: &str) -> Result<String, TwoFactorError> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    generate_totp(secret, now)
}

// ============================================================================
// SMS
// ============================================================================

/// Supplies SMS codes delivered outside the process.
#[async_trait]
pub trait SmsCodeSource: Send + Sync {
    /// Returns the code if it has arrived.
    async fn poll_code(&self) -> Option<String>;
}

/// Cancels an in-flight SMS wait.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelHandle {
    /// Creates an uncancelled handle.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Cancels every wait using this handle.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Clears a previous cancellation.
    pub fn reset(&self) {
        self.tx.send_replace(false);
    }

    /// Returns true once cancelled.
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Completes when cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

// ============================================================================
// Resolver
// ============================================================================

/// Result of [`TwoFactorResolver::handle_challenge`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwoFactorOutcome {
    /// Method used.
    pub method: TwoFactorMethod,
    /// Attempts made, at least one.
    pub attempts: u32,
    /// Error of the final attempt, if it failed.
    pub error: Option<TwoFactorError>,
}

impl TwoFactorOutcome {
    /// Returns true if a code was accepted.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Resolves two-factor challenges.
pub struct TwoFactorResolver {
    config: TwoFactorConfig,
    backup_codes: Mutex<VecDeque<String>>,
    sms: Option<Arc<dyn SmsCodeSource>>,
    cancel: CancelHandle,
    retry_delay: Duration,
}

impl TwoFactorResolver {
    /// Creates a resolver. The backup-code pool is copied from `config`.
    pub fn new(config: TwoFactorConfig) -> Self {
        let backup_codes = config
            .backup_codes
            .iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        Self {
            config,
            backup_codes: Mutex::new(backup_codes),
            sms: None,
            cancel: CancelHandle::new(),
            retry_delay: RETRY_DELAY,
        }
    }

    /// Attaches an SMS code source.
    #[must_use]
    pub fn with_sms_source(mut self, source: Arc<dyn SmsCodeSource>) -> Self {
        self.sms = Some(source);
        self
    }

    /// Sets the pause between resolution attempts.
    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Handle that cancels SMS waits.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Detects a challenge, falling back to the preferred method.
    pub fn detect(&self, page_text: &str, page_url: &str) -> Option<TwoFactorChallenge> {
        detect_challenge_with(page_text, page_url, self.config.preferred_method)
    }

    /// Pops the next backup code.
    pub async fn get_backup_code(&self) -> Result<String, TwoFactorError> {
        let code = self
            .backup_codes
            .lock()
            .await
            .pop_front()
            .ok_or(TwoFactorError::NoBackupCodes)?;
        info!(remaining = self.remaining_backup_codes().await, "Backup code consumed");
        Ok(code)
    }

    /// Number of unused backup codes.
    pub async fn remaining_backup_codes(&self) -> usize {
        self.backup_codes.lock().await.len()
    }

    /// Waits for an SMS code, up to the configured bound.
    pub async fn wait_for_sms_code(&self) -> Result<String, TwoFactorError> {
        let source = self.sms.as_ref().ok_or(TwoFactorError::NoCodeSource)?;
        let timeout = self.config.sms_timeout();
        let interval = self.config.sms_poll_interval();

        let poll = async {
            loop {
                if let Some(code) = source.poll_code().await {
                    return code;
                }
                tokio::time::sleep(interval).await;
            }
        };

        tokio::select! {
            () = self.cancel.cancelled() => Err(TwoFactorError::Cancelled),
            code = tokio::time::timeout(timeout, poll) => {
                code.map_err(|_| TwoFactorError::SmsTimeout(timeout))
            }
        }
    }

    /// Produces one code for the method.
    pub async fn code_for(&self, method: TwoFactorMethod) -> Result<String, TwoFactorError> {
        match method {
            TwoFactorMethod::Totp => {
                let secret = self
                    .config
                    .totp_secret
                    .as_deref()
                    .ok_or(TwoFactorError::MissingSecret)?;
                current_totp(secret)
            }
            TwoFactorMethod::Sms => self.wait_for_sms_code().await,
            TwoFactorMethod::BackupCode => self.get_backup_code().await,
        }
    }

    /// Picks the method to use for a challenge.
    ///
    /// A TOTP challenge without a configured secret falls back to backup
    /// codes when the page offers them and the pool is not empty.
    async fn method_for(&self, challenge: &TwoFactorChallenge) -> TwoFactorMethod {
        if challenge.method == TwoFactorMethod::Totp
            && self.config.totp_secret.is_none()
            && challenge.backup_available
            && self.remaining_backup_codes().await > 0
        {
            return TwoFactorMethod::BackupCode;
        }
        challenge.method
    }

    /// Resolves a challenge, passing each produced code to `submit`.
    ///
    /// With `auto_retry`, retryable failures are retried up to `max_retries`
    /// attempts in total.
    #[instrument(skip(self, challenge, submit), fields(method = %challenge.method))]
    pub async fn handle_challenge<F, Fut>(
        &self,
        challenge: &TwoFactorChallenge,
        submit: F,
    ) -> TwoFactorOutcome
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<(), TwoFactorError>>,
    {
        let method = self.method_for(challenge).await;
        let max_attempts = if self.config.auto_retry {
            self.config.max_retries.max(1)
        } else {
            1
        };
        let policy = RetryPolicy::fixed(max_attempts, self.retry_delay);

        let outcome = policy
            .run(
                |attempt| {
                    let submit = &submit;
                    async move {
                        debug!(attempt, method = %method, "Resolving two-factor challenge");
                        let code = self.code_for(method).await?;
                        submit(code).await
                    }
                },
                TwoFactorError::is_retryable,
            )
            .await;

        match &outcome.result {
            Ok(()) => info!(attempts = outcome.attempts, "Two-factor challenge resolved"),
            Err(e) => warn!(attempts = outcome.attempts, error = %e, "Two-factor resolution failed"),
        }

        TwoFactorOutcome {
            method,
            attempts: outcome.attempts,
            error: outcome.result.err(),
        }
    }
}

impl std::fmt::Debug for TwoFactorResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwoFactorResolver")
            .field("config", &self.config)
            .field("has_sms_source", &self.sms.is_some())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
