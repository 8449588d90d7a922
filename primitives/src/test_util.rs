//! Testing fixtures, available with the `test-util` feature.

use chrono::Utc;

use crate::{
    config::{AuthMode, Config, Environment},
    conversion::{ClickContext, ConversionRecord, ConversionStatus},
};

pub const HMAC_SECRET: &str = "dark-matter";
pub const POSTBACK_PASSWORD: &str = "hunter2";

fn base_config(auth_mode: AuthMode) -> Config {
    Config {
        env: Environment::Development,
        auth_mode,
        hmac_secret: None,
        postback_password: None,
        allowed_ips: None,
        replay_protection: true,
        replay_window_secs: 300,
        events_api_url: crate::config::DEFAULT_EVENTS_API_URL
            .parse()
            .expect("Default Events API url should be valid"),
        pixel_code: None,
        access_token: None,
        test_event_code: None,
        event_type: "CompletePayment".to_string(),
        notify_timeout_secs: 10,
    }
}

/// Signature-mode [`Config`] with [`HMAC_SECRET`] and no Events API
/// credentials, so notifications are skipped.
pub fn signature_config() -> Config {
    Config {
        hmac_secret: Some(HMAC_SECRET.to_string()),
        ..base_config(AuthMode::Signature)
    }
}

/// Shared-secret-mode [`Config`] with [`POSTBACK_PASSWORD`].
pub fn shared_secret_config() -> Config {
    Config {
        postback_password: Some(POSTBACK_PASSWORD.to_string()),
        ..base_config(AuthMode::SharedSecret)
    }
}

pub fn sample_conversion(tracking_id: &str) -> ConversionRecord {
    ConversionRecord {
        tracking_id: tracking_id.to_string(),
        offer_id: Some("TEST123".to_string()),
        payout: Some(1.5),
        status: ConversionStatus::Completed,
        source_ip: Some("203.0.113.7".to_string()),
        user_agent: Some("test-agent".to_string()),
        nonce: Some("nonce-1".to_string()),
        ts: Some(Utc::now().timestamp()),
        notification_sent: None,
        notification_sent_at: None,
        notification_response: None,
        created: Utc::now(),
    }
}

pub fn sample_click(tracking_id: &str) -> ClickContext {
    ClickContext {
        tracking_id: tracking_id.to_string(),
        ttclid: Some("ttclid-xyz".to_string()),
        ip: Some("198.51.100.4".to_string()),
        user_agent: Some("click-agent".to_string()),
        landing_url: Some("https://example.com/landing".to_string()),
        referrer: Some("https://referrer.example".to_string()),
        created: Utc::now(),
    }
}
