use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::allowlist::IpAllowlist;

pub const DEFAULT_REPLAY_WINDOW_SECS: u64 = 300;
pub const DEFAULT_NOTIFY_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_EVENTS_API_URL: &str =
    "https://business-api.tiktok.com/open_api/v1.3/event/track/";

#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "camelCase")]
/// The environment in which the application is running
/// Defaults to [`Environment::Development`]
pub enum Environment {
    Development,
    Production,
}

impl Default for Environment {
    fn default() -> Self {
        Self::Development
    }
}

/// How an inbound postback proves its authenticity.
///
/// Exactly one mode is active; the server fails closed when the secret
/// for the selected mode is not configured.
#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// HMAC-SHA256 over the canonical signing string, supplied as `sig`.
    Signature,
    /// Plain shared secret supplied as `password`, compared in constant time.
    SharedSecret,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("signature auth mode requires HMAC_SECRET to be set")]
    MissingHmacSecret,
    #[error("shared_secret auth mode requires POSTBACK_PASSWORD to be set")]
    MissingPassword,
    #[error("REPLAY_WINDOW_SECS must be greater than zero")]
    ZeroReplayWindow,
    #[error("PIXEL_CODE and ACCESS_TOKEN must be set together")]
    PartialEventsApiCredentials,
}

/// Application configuration, deserialized from environment variables
/// (see the server crate) and validated once at startup.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub env: Environment,
    /// The active authentication mode for `/postback`.
    pub auth_mode: AuthMode,
    /// Secret for [`AuthMode::Signature`].
    #[serde(default)]
    pub hmac_secret: Option<String>,
    /// Secret for [`AuthMode::SharedSecret`].
    #[serde(default)]
    pub postback_password: Option<String>,
    /// Optional source IP allowlist for `/postback`.
    /// Not configured (or configured empty) means no IP filtering.
    #[serde(default)]
    pub allowed_ips: Option<IpAllowlist>,
    /// Whether the `ts`/`nonce` replay guard is enforced.
    /// When disabled, idempotency relies solely on the conversions
    /// uniqueness constraint.
    #[serde(default = "default_replay_protection")]
    pub replay_protection: bool,
    /// Maximum allowed `|now - ts|` in seconds.
    #[serde(default = "default_replay_window_secs")]
    pub replay_window_secs: u64,
    /// The ad platform Events API endpoint notifications are sent to.
    #[serde(default = "default_events_api_url")]
    pub events_api_url: Url,
    #[serde(default)]
    pub pixel_code: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    /// Marks forwarded events as test traffic on the ad platform.
    #[serde(default)]
    pub test_event_code: Option<String>,
    #[serde(default = "default_event_type")]
    pub event_type: String,
    #[serde(default = "default_notify_timeout_secs")]
    pub notify_timeout_secs: u64,
}

impl Config {
    /// Checks the configuration invariants that must hold before the
    /// server starts taking requests. A misconfigured auth mode fails
    /// here instead of on the first postback.
    pub fn validate(&self) -> Result<(), Error> {
        match self.auth_mode {
            AuthMode::Signature if none_or_empty(&self.hmac_secret) => {
                return Err(Error::MissingHmacSecret)
            }
            AuthMode::SharedSecret if none_or_empty(&self.postback_password) => {
                return Err(Error::MissingPassword)
            }
            _ => {}
        }

        if self.replay_protection && self.replay_window_secs == 0 {
            return Err(Error::ZeroReplayWindow);
        }

        if self.pixel_code.is_some() != self.access_token.is_some() {
            return Err(Error::PartialEventsApiCredentials);
        }

        Ok(())
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_secs(self.notify_timeout_secs)
    }
}

fn none_or_empty(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, str::is_empty)
}

fn default_replay_protection() -> bool {
    true
}

fn default_replay_window_secs() -> u64 {
    DEFAULT_REPLAY_WINDOW_SECS
}

fn default_events_api_url() -> Url {
    DEFAULT_EVENTS_API_URL
        .parse()
        .expect("Default Events API url should be valid")
}

fn default_event_type() -> String {
    "CompletePayment".to_string()
}

fn default_notify_timeout_secs() -> u64 {
    DEFAULT_NOTIFY_TIMEOUT_SECS
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn signature_config() -> Config {
        serde_json::from_value(serde_json::json!({
            "auth_mode": "signature",
            "hmac_secret": "dark-matter",
        }))
        .expect("Should deserialize")
    }

    #[test]
    fn deserializes_with_defaults() {
        let config = signature_config();

        assert_eq!(Environment::Development, config.env);
        assert_eq!(AuthMode::Signature, config.auth_mode);
        assert!(config.replay_protection);
        assert_eq!(DEFAULT_REPLAY_WINDOW_SECS, config.replay_window_secs);
        assert_eq!(DEFAULT_EVENTS_API_URL, config.events_api_url.as_str());
        assert_eq!("CompletePayment", config.event_type);
        assert_eq!(Ok(()), config.validate());
    }

    #[test]
    fn validation_fails_closed_without_a_secret_for_the_active_mode() {
        let mut config = signature_config();
        config.hmac_secret = None;
        assert_eq!(Err(Error::MissingHmacSecret), config.validate());

        config.hmac_secret = Some("".to_string());
        assert_eq!(Err(Error::MissingHmacSecret), config.validate());

        config.auth_mode = AuthMode::SharedSecret;
        assert_eq!(Err(Error::MissingPassword), config.validate());

        config.postback_password = Some("hunter2".to_string());
        assert_eq!(Ok(()), config.validate());
    }

    #[test]
    fn validation_rejects_partial_events_api_credentials() {
        let mut config = signature_config();
        config.pixel_code = Some("PIXEL123".to_string());
        assert_eq!(
            Err(Error::PartialEventsApiCredentials),
            config.validate()
        );

        config.access_token = Some("token".to_string());
        assert_eq!(Ok(()), config.validate());
    }

    #[test]
    fn validation_rejects_zero_replay_window() {
        let mut config = signature_config();
        config.replay_window_secs = 0;
        assert_eq!(Err(Error::ZeroReplayWindow), config.validate());

        // a disabled guard does not care about the window
        config.replay_protection = false;
        assert_eq!(Ok(()), config.validate());
    }
}
