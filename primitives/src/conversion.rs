use chrono::{DateTime, Utc};
use parse_display::{Display, FromStr};
use serde::{Deserialize, Serialize};

/// Upper bound for `tracking_id`, `offer_id` and `nonce` values.
pub const MAX_FIELD_LENGTH: usize = 128;
/// Upper bound for the raw `payout` string.
pub const MAX_PAYOUT_LENGTH: usize = 32;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, FromStr,
)]
#[serde(rename_all = "snake_case")]
#[display(style = "snake_case")]
#[cfg_attr(
    feature = "postgres",
    derive(postgres_types::ToSql, postgres_types::FromSql),
    postgres(name = "conversionstatus")
)]
pub enum ConversionStatus {
    #[cfg_attr(feature = "postgres", postgres(name = "received"))]
    Received,
    /// Terminal, billable conversion.
    #[cfg_attr(feature = "postgres", postgres(name = "completed"))]
    Completed,
}

/// A recorded conversion.
///
/// At most one record exists per `tracking_id` - the uniqueness
/// constraint in the ledger is the system's idempotency backstop.
/// Records are never deleted; the `notification_*` audit fields are
/// the only mutation after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionRecord {
    pub tracking_id: String,
    pub offer_id: Option<String>,
    pub payout: Option<f64>,
    pub status: ConversionStatus,
    pub source_ip: Option<String>,
    pub user_agent: Option<String>,
    pub nonce: Option<String>,
    pub ts: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_sent: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_sent_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_response: Option<String>,
    pub created: DateTime<Utc>,
}

/// Replay guard state: a nonce that has been accepted once.
///
/// `tracking_id` and `ts` are attached for audit only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonceRecord {
    pub nonce: String,
    pub tracking_id: Option<String>,
    pub ts: Option<i64>,
    pub created: DateTime<Utc>,
}

/// Click-time context captured by the click-capture endpoint,
/// keyed by `tracking_id`. Read to enrich the forwarded event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickContext {
    pub tracking_id: String,
    pub ttclid: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub landing_url: Option<String>,
    pub referrer: Option<String>,
    pub created: DateTime<Utc>,
}

/// Lenient payout parsing: the payout comes from an untrusted query
/// parameter and a malformed amount must not prevent recording that a
/// conversion occurred. Anything non-numeric, negative, non-finite or
/// oversized is coerced to absent.
pub fn parse_payout(input: &str) -> Option<f64> {
    let trimmed = input.trim();
    if trimmed.is_empty() || trimmed.len() > MAX_PAYOUT_LENGTH {
        return None;
    }

    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => Some(value),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn payout_parsing_is_lenient() {
        assert_eq!(Some(1.5), parse_payout("1.5"));
        assert_eq!(Some(0.0), parse_payout("0"));
        assert_eq!(Some(2.0), parse_payout(" 2 "));

        assert_eq!(None, parse_payout("abc"));
        assert_eq!(None, parse_payout(""));
        assert_eq!(None, parse_payout("-1.5"));
        assert_eq!(None, parse_payout("NaN"));
        assert_eq!(None, parse_payout("inf"));
        assert_eq!(None, parse_payout(&"9".repeat(MAX_PAYOUT_LENGTH + 1)));
    }

    #[test]
    fn status_round_trips_through_display() {
        assert_eq!("completed", ConversionStatus::Completed.to_string());
        assert_eq!(
            Ok(ConversionStatus::Received),
            "received".parse::<ConversionStatus>().map_err(|_| ())
        );
    }
}
