//! Postgres `Row` conversions for the domain records.
//!
//! Available with the `postgres` feature.

use tokio_postgres::Row;

use crate::conversion::{ClickContext, ConversionRecord};

impl From<&Row> for ConversionRecord {
    fn from(row: &Row) -> Self {
        Self {
            tracking_id: row.get("tracking_id"),
            offer_id: row.get("offer_id"),
            payout: row.get("payout"),
            status: row.get("status"),
            source_ip: row.get("source_ip"),
            user_agent: row.get("user_agent"),
            nonce: row.get("nonce"),
            ts: row.get("ts"),
            notification_sent: row.get("notification_sent"),
            notification_sent_at: row.get("notification_sent_at"),
            notification_response: row.get("notification_response"),
            created: row.get("created"),
        }
    }
}

impl From<&Row> for ClickContext {
    fn from(row: &Row) -> Self {
        Self {
            tracking_id: row.get("tracking_id"),
            ttclid: row.get("ttclid"),
            ip: row.get("ip"),
            user_agent: row.get("user_agent"),
            landing_url: row.get("landing_url"),
            referrer: row.get("referrer"),
            created: row.get("created"),
        }
    }
}
