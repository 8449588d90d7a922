//! Wire types for the postback REST API.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::conversion::{ConversionRecord, MAX_FIELD_LENGTH, MAX_PAYOUT_LENGTH};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("tracking_id missing")]
    MissingTrackingId,
    #[error("{field} exceeds {max} characters")]
    FieldTooLong { field: &'static str, max: usize },
}

/// The typed, validated postback parameter record.
///
/// Built from the merged query-string/body bag of strings before any
/// business logic runs. All values are trimmed; empty values are
/// treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostbackParams {
    pub tracking_id: String,
    pub offer_id: Option<String>,
    /// Raw payout string - parsed leniently only at recording time.
    pub payout: Option<String>,
    pub ts: Option<String>,
    pub nonce: Option<String>,
    pub sig: Option<String>,
    pub password: Option<String>,
}

impl PostbackParams {
    pub fn from_map(map: &HashMap<String, String>) -> Result<Self, ValidationError> {
        let field = |name: &str| {
            map.get(name)
                .map(|value| value.trim())
                .filter(|value| !value.is_empty())
                .map(ToString::to_string)
        };

        let tracking_id = field("tracking_id").ok_or(ValidationError::MissingTrackingId)?;
        check_length("tracking_id", &tracking_id, MAX_FIELD_LENGTH)?;

        let offer_id = field("offer_id");
        if let Some(offer_id) = &offer_id {
            check_length("offer_id", offer_id, MAX_FIELD_LENGTH)?;
        }

        let payout = field("payout");
        if let Some(payout) = &payout {
            check_length("payout", payout, MAX_PAYOUT_LENGTH)?;
        }

        // bounded even when the replay guard is off - `nonce` and `ts`
        // are copied onto the conversion row either way
        let ts = field("ts");
        if let Some(ts) = &ts {
            check_length("ts", ts, MAX_FIELD_LENGTH)?;
        }

        let nonce = field("nonce");
        if let Some(nonce) = &nonce {
            check_length("nonce", nonce, MAX_FIELD_LENGTH)?;
        }

        Ok(Self {
            tracking_id,
            offer_id,
            payout,
            ts,
            nonce,
            sig: field("sig"),
            password: field("password"),
        })
    }
}

fn check_length(
    field: &'static str,
    value: &str,
    max: usize,
) -> Result<(), ValidationError> {
    if value.len() > max {
        Err(ValidationError::FieldTooLong { field, max })
    } else {
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

/// Audit summary of the notification attempt, surfaced in the
/// postback response for observability.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationStatus {
    pub delivered: bool,
    pub skipped: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct PostbackResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deduped: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replay: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification: Option<NotificationStatus>,
}

impl PostbackResponse {
    pub fn recorded(notification: NotificationStatus) -> Self {
        Self {
            success: true,
            deduped: Some(false),
            replay: None,
            notification: Some(notification),
        }
    }

    pub fn deduped() -> Self {
        Self {
            success: true,
            deduped: Some(true),
            replay: None,
            notification: None,
        }
    }

    pub fn replay() -> Self {
        Self {
            success: true,
            deduped: None,
            replay: Some(true),
            notification: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClickRequest {
    pub tracking_id: String,
    #[serde(default)]
    pub ttclid: Option<String>,
    #[serde(default)]
    pub landing_url: Option<String>,
    #[serde(default)]
    pub referrer: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClickResponse {
    pub success: bool,
    pub deduped: bool,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct StatusResponse {
    pub completed: bool,
    pub latest: Option<ConversionRecord>,
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn map(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn builds_params_from_a_merged_bag() {
        let params = PostbackParams::from_map(&map(&[
            ("tracking_id", " 67 "),
            ("offer_id", "TEST123"),
            ("payout", "1.5"),
            ("ts", "1700000000"),
            ("nonce", "abc"),
            ("sig", "deadbeef"),
            ("unknown", "dropped"),
        ]))
        .expect("Should validate");

        assert_eq!(
            PostbackParams {
                tracking_id: "67".to_string(),
                offer_id: Some("TEST123".to_string()),
                payout: Some("1.5".to_string()),
                ts: Some("1700000000".to_string()),
                nonce: Some("abc".to_string()),
                sig: Some("deadbeef".to_string()),
                password: None,
            },
            params
        );
    }

    #[test]
    fn requires_tracking_id() {
        assert_eq!(
            Err(ValidationError::MissingTrackingId),
            PostbackParams::from_map(&map(&[("offer_id", "TEST123")]))
        );
        // whitespace-only is treated as absent
        assert_eq!(
            Err(ValidationError::MissingTrackingId),
            PostbackParams::from_map(&map(&[("tracking_id", "   ")]))
        );
    }

    #[test]
    fn enforces_length_bounds() {
        let too_long = "x".repeat(MAX_FIELD_LENGTH + 1);

        assert_eq!(
            Err(ValidationError::FieldTooLong {
                field: "tracking_id",
                max: MAX_FIELD_LENGTH
            }),
            PostbackParams::from_map(&map(&[("tracking_id", &too_long)]))
        );
        assert_eq!(
            Err(ValidationError::FieldTooLong {
                field: "payout",
                max: MAX_PAYOUT_LENGTH
            }),
            PostbackParams::from_map(&map(&[
                ("tracking_id", "67"),
                ("payout", &"9".repeat(MAX_PAYOUT_LENGTH + 1))
            ]))
        );
        assert_eq!(
            Err(ValidationError::FieldTooLong {
                field: "nonce",
                max: MAX_FIELD_LENGTH
            }),
            PostbackParams::from_map(&map(&[
                ("tracking_id", "67"),
                ("nonce", &"n".repeat(MAX_FIELD_LENGTH + 1))
            ]))
        );
        assert_eq!(
            Err(ValidationError::FieldTooLong {
                field: "ts",
                max: MAX_FIELD_LENGTH
            }),
            PostbackParams::from_map(&map(&[
                ("tracking_id", "67"),
                ("ts", &"1".repeat(MAX_FIELD_LENGTH + 1))
            ]))
        );
    }

    #[test]
    fn response_serialization_skips_absent_fields() {
        let replay = serde_json::to_value(PostbackResponse::replay()).expect("serializes");

        assert_eq!(
            serde_json::json!({ "success": true, "replay": true }),
            replay
        );
    }
}
