//! Issue source adapters.
//!
//! An adapter turns provider-specific input (a webhook body or a polled
//! API response) into canonical [`Issue`] records. The [`SourceRegistry`]
//! tracks per-source health: consecutive poll failures past the configured
//! threshold disable a source until an operator re-enables it.

pub mod github;
pub mod monitoring;
pub mod sentry;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;

use crate::errors::AdapterError;
use crate::issue::{Issue, SourceType};

pub use github::GithubSource;
pub use monitoring::MonitoringSource;
pub use sentry::SentrySource;

/// One inbound issue source.
#[async_trait]
pub trait IssueSource: Send + Sync {
    fn source_type(&self) -> SourceType;

    /// Parse a webhook body into zero or more issues. Events that do not
    /// represent a new actionable issue (closes, comments, resolved alerts)
    /// parse to an empty vec, not an error.
    fn parse_webhook(&self, body: &[u8]) -> Result<Vec<Issue>, AdapterError>;

    /// Fetch issues created or updated after `since`.
    async fn poll(&self, since: Option<DateTime<Utc>>) -> Result<Vec<Issue>, AdapterError>;
}

/// Verify an `X-Hub-Signature-256`-style header (`sha256=<hex>`) over the
/// raw request body.
pub fn verify_signature(secret: &str, body: &[u8], header: &str) -> bool {
    let Some(hex_digest) = header.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };
    let mut mac = match Hmac::<Sha256>::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(body);
    // verify_slice is constant-time.
    mac.verify_slice(&expected).is_ok()
}

/// Compute the signature header value for a body, for outbound use and tests.
pub fn sign_body(secret: &str, body: &[u8]) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// Mutable per-source health, owned by the registry.
#[derive(Debug, Clone, Serialize)]
pub struct SourceState {
    pub enabled: bool,
    pub consecutive_errors: u32,
    /// Poll watermark: only items newer than this are fetched. Advanced
    /// only when a poll succeeds, so a failed window is retried in full on
    /// the next cycle.
    pub last_checked: Option<DateTime<Utc>>,
}

impl Default for SourceState {
    fn default() -> Self {
        Self {
            enabled: true,
            consecutive_errors: 0,
            last_checked: None,
        }
    }
}

/// Health snapshot for one source, as reported by `/health`.
#[derive(Debug, Clone, Serialize)]
pub struct SourceHealth {
    pub source: SourceType,
    pub enabled: bool,
    pub consecutive_errors: u32,
    pub last_checked: Option<DateTime<Utc>>,
}

/// Holds the registered sources and their health state.
pub struct SourceRegistry {
    sources: HashMap<SourceType, Arc<dyn IssueSource>>,
    states: Mutex<HashMap<SourceType, SourceState>>,
    failure_threshold: u32,
}

impl SourceRegistry {
    pub fn new(failure_threshold: u32) -> Self {
        Self {
            sources: HashMap::new(),
            states: Mutex::new(HashMap::new()),
            failure_threshold: failure_threshold.max(1),
        }
    }

    pub fn register(&mut self, source: Arc<dyn IssueSource>) {
        let source_type = source.source_type();
        self.sources.insert(source_type, source);
        self.states
            .lock()
            .unwrap()
            .insert(source_type, SourceState::default());
    }

    pub fn get(&self, source_type: SourceType) -> Option<Arc<dyn IssueSource>> {
        self.sources.get(&source_type).cloned()
    }

    pub fn source_types(&self) -> Vec<SourceType> {
        self.sources.keys().copied().collect()
    }

    pub fn is_enabled(&self, source_type: SourceType) -> bool {
        self.states
            .lock()
            .unwrap()
            .get(&source_type)
            .map(|s| s.enabled)
            .unwrap_or(false)
    }

    /// The watermark to poll from.
    pub fn watermark(&self, source_type: SourceType) -> Option<DateTime<Utc>> {
        self.states
            .lock()
            .unwrap()
            .get(&source_type)
            .and_then(|s| s.last_checked)
    }

    /// Record a successful poll that started at `checked_at`: the error
    /// counter resets and the watermark advances to the poll start, so
    /// items created while the poll ran are still fetched next cycle.
    pub fn record_success(&self, source_type: SourceType, checked_at: DateTime<Utc>) {
        if let Some(state) = self.states.lock().unwrap().get_mut(&source_type) {
            state.consecutive_errors = 0;
            state.last_checked = Some(checked_at);
        }
    }

    /// Record a poll failure. Returns true if this failure crossed the
    /// threshold and disabled the source.
    pub fn record_failure(&self, source_type: SourceType) -> bool {
        let mut states = self.states.lock().unwrap();
        let Some(state) = states.get_mut(&source_type) else {
            return false;
        };
        if !state.enabled {
            return false;
        }
        state.consecutive_errors += 1;
        if state.consecutive_errors >= self.failure_threshold {
            state.enabled = false;
            tracing::error!(
                source = %source_type,
                errors = state.consecutive_errors,
                "source disabled after consecutive poll failures"
            );
            return true;
        }
        false
    }

    /// Manual re-enable; also resets the error counter.
    pub fn enable(&self, source_type: SourceType) {
        if let Some(state) = self.states.lock().unwrap().get_mut(&source_type) {
            state.enabled = true;
            state.consecutive_errors = 0;
        }
    }

    pub fn health(&self) -> Vec<SourceHealth> {
        let states = self.states.lock().unwrap();
        let mut health: Vec<SourceHealth> = states
            .iter()
            .map(|(source, state)| SourceHealth {
                source: *source,
                enabled: state.enabled,
                consecutive_errors: state.consecutive_errors,
                last_checked: state.last_checked,
            })
            .collect();
        health.sort_by_key(|h| h.source.as_str());
        health
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_roundtrip() {
        let secret = "shhh";
        let body = br#"{"action":"opened"}"#;
        let header = sign_body(secret, body);
        assert!(header.starts_with("sha256="));
        assert!(verify_signature(secret, body, &header));
    }

    #[test]
    fn test_signature_rejects_tampering() {
        let secret = "shhh";
        let header = sign_body(secret, b"original");
        assert!(!verify_signature(secret, b"tampered", &header));
        assert!(!verify_signature("wrong-secret", b"original", &header));
    }

    #[test]
    fn test_signature_rejects_malformed_header() {
        assert!(!verify_signature("s", b"x", "md5=abcd"));
        assert!(!verify_signature("s", b"x", "sha256=not-hex"));
        assert!(!verify_signature("s", b"x", ""));
    }

    #[test]
    fn test_registry_disables_at_threshold() {
        let mut registry = SourceRegistry::new(3);
        registry.register(Arc::new(MonitoringSource::new()));

        assert!(!registry.record_failure(SourceType::Monitoring));
        assert!(!registry.record_failure(SourceType::Monitoring));
        assert!(registry.record_failure(SourceType::Monitoring));
        assert!(!registry.is_enabled(SourceType::Monitoring));
        // Further failures on a disabled source do not re-fire the alert.
        assert!(!registry.record_failure(SourceType::Monitoring));
    }

    #[test]
    fn test_registry_success_resets_counter() {
        let mut registry = SourceRegistry::new(3);
        registry.register(Arc::new(MonitoringSource::new()));

        registry.record_failure(SourceType::Monitoring);
        registry.record_failure(SourceType::Monitoring);
        registry.record_success(SourceType::Monitoring, Utc::now());
        assert!(!registry.record_failure(SourceType::Monitoring));
        assert!(registry.is_enabled(SourceType::Monitoring));
    }

    #[test]
    fn test_registry_manual_enable_resets_state() {
        let mut registry = SourceRegistry::new(1);
        registry.register(Arc::new(MonitoringSource::new()));

        assert!(registry.record_failure(SourceType::Monitoring));
        registry.enable(SourceType::Monitoring);
        assert!(registry.is_enabled(SourceType::Monitoring));
        let health = registry.health();
        assert_eq!(health[0].consecutive_errors, 0);
    }

    #[test]
    fn test_watermark_advances_on_success() {
        let registry = {
            let mut r = SourceRegistry::new(5);
            r.register(Arc::new(MonitoringSource::new()));
            r
        };
        assert!(registry.watermark(SourceType::Monitoring).is_none());
        let checked = Utc::now();
        registry.record_success(SourceType::Monitoring, checked);
        assert_eq!(registry.watermark(SourceType::Monitoring), Some(checked));
    }

    #[test]
    fn test_failed_poll_keeps_watermark() {
        let registry = {
            let mut r = SourceRegistry::new(5);
            r.register(Arc::new(MonitoringSource::new()));
            r
        };
        let checked = Utc::now();
        registry.record_success(SourceType::Monitoring, checked);
        registry.record_failure(SourceType::Monitoring);
        assert_eq!(
            registry.watermark(SourceType::Monitoring),
            Some(checked),
            "a failed poll must not skip its window"
        );
    }
}
