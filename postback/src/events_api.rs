//! Best-effort forwarding of recorded conversions to the ad platform
//! Events API.
//!
//! Delivery never gates the postback response: the conversion is
//! already in the ledger and the outcome here is only attached as an
//! audit trail. Without credentials the client stays inert and every
//! dispatch reports `Skipped`.

use chrono::{SecondsFormat, TimeZone, Utc};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use url::Url;

use primitives::postback::NotificationStatus;
use primitives::{ClickContext, Config, ConversionRecord};

use crate::Session;

/// Stored notification responses are truncated to this many bytes.
pub const RESPONSE_AUDIT_LIMIT: usize = 500;

#[derive(Debug, Clone)]
struct Credentials {
    pixel_code: String,
    access_token: String,
}

#[derive(Clone)]
pub struct EventsApi {
    client: Client,
    url: Url,
    credentials: Option<Credentials>,
    event_type: String,
    test_event_code: Option<String>,
}

/// The event payload sent to the Events API.
#[derive(Debug, Serialize, PartialEq)]
pub struct TrackEvent {
    pub event_source: &'static str,
    pub event_source_id: String,
    pub event_type: String,
    /// ISO-8601, derived from the postback `ts` or the recording time.
    pub event_time: String,
    /// The `tracking_id`, doubling as the platform-side dedup key.
    pub event_id: String,
    pub properties: EventProperties,
    pub context: EventContext,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_event_code: Option<String>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct EventProperties {
    /// The payout as a JSON number, the unit the platform bills in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    pub currency: &'static str,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct EventContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ad: Option<AdContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<PageContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct AdContext {
    pub callback: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct PageContext {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
}

/// Outcome of a single dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// No credentials configured; nothing was sent.
    Skipped,
    Delivered {
        status: StatusCode,
        body: String,
    },
    Failed {
        status: Option<StatusCode>,
        error: String,
    },
}

impl NotifyOutcome {
    pub fn delivered(&self) -> bool {
        matches!(self, NotifyOutcome::Delivered { .. })
    }

    pub fn to_status(&self) -> NotificationStatus {
        match self {
            NotifyOutcome::Skipped => NotificationStatus {
                delivered: false,
                skipped: true,
                status_code: None,
            },
            NotifyOutcome::Delivered { status, .. } => NotificationStatus {
                delivered: true,
                skipped: false,
                status_code: Some(status.as_u16()),
            },
            NotifyOutcome::Failed { status, .. } => NotificationStatus {
                delivered: false,
                skipped: false,
                status_code: status.map(|status| status.as_u16()),
            },
        }
    }

    /// Body or error for the ledger audit column, bounded in size.
    pub fn audit_response(&self) -> String {
        let response = match self {
            NotifyOutcome::Skipped => "skipped: events api not configured",
            NotifyOutcome::Delivered { body, .. } => body,
            NotifyOutcome::Failed { error, .. } => error,
        };

        truncate_response(response)
    }
}

fn truncate_response(response: &str) -> String {
    if response.len() <= RESPONSE_AUDIT_LIMIT {
        return response.to_string();
    }

    let mut end = RESPONSE_AUDIT_LIMIT;
    while !response.is_char_boundary(end) {
        end -= 1;
    }

    response[..end].to_string()
}

impl EventsApi {
    /// Credentials are all-or-nothing, enforced by [`Config::validate`].
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config.notify_timeout()).build()?;

        let credentials = match (&config.pixel_code, &config.access_token) {
            (Some(pixel_code), Some(access_token)) => Some(Credentials {
                pixel_code: pixel_code.clone(),
                access_token: access_token.clone(),
            }),
            _ => None,
        };

        Ok(Self {
            client,
            url: config.events_api_url.clone(),
            credentials,
            event_type: config.event_type.clone(),
            test_event_code: config.test_event_code.clone(),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.credentials.is_some()
    }

    /// Builds the event from the ledger record, preferring click-time
    /// context over the postback session for attribution signals.
    pub fn build_event(
        &self,
        record: &ConversionRecord,
        click: Option<&ClickContext>,
        session: &Session,
    ) -> Option<TrackEvent> {
        let credentials = self.credentials.as_ref()?;

        let event_time = record
            .ts
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
            .unwrap_or(record.created)
            .to_rfc3339_opts(SecondsFormat::Secs, true);

        let ip = click
            .and_then(|click| click.ip.clone())
            .or_else(|| session.ip.clone());
        let user_agent = click
            .and_then(|click| click.user_agent.clone())
            .or_else(|| session.user_agent.clone());
        let ad = click
            .and_then(|click| click.ttclid.clone())
            .map(|callback| AdContext { callback });
        let page = click
            .and_then(|click| click.landing_url.clone())
            .map(|url| PageContext {
                url,
                referrer: click.and_then(|click| click.referrer.clone()),
            });

        Some(TrackEvent {
            event_source: "WEB",
            event_source_id: credentials.pixel_code.clone(),
            event_type: self.event_type.clone(),
            event_time,
            event_id: record.tracking_id.clone(),
            properties: EventProperties {
                value: record.payout,
                currency: "USD",
            },
            context: EventContext {
                ad,
                page,
                ip,
                user_agent,
            },
            test_event_code: self.test_event_code.clone(),
        })
    }

    /// Dispatches the event. Infallible by design: any failure is
    /// folded into the returned outcome.
    pub async fn notify(
        &self,
        record: &ConversionRecord,
        click: Option<&ClickContext>,
        session: &Session,
    ) -> NotifyOutcome {
        let event = match self.build_event(record, click, session) {
            Some(event) => event,
            None => return NotifyOutcome::Skipped,
        };
        let access_token = self
            .credentials
            .as_ref()
            .map(|credentials| credentials.access_token.clone())
            .unwrap_or_default();

        let sent = self
            .client
            .post(self.url.clone())
            .header("Access-Token", access_token)
            .json(&event)
            .send()
            .await;

        match sent {
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();

                if status.is_success() {
                    NotifyOutcome::Delivered { status, body }
                } else {
                    NotifyOutcome::Failed {
                        status: Some(status),
                        error: body,
                    }
                }
            }
            Err(error) => NotifyOutcome::Failed {
                status: error.status(),
                error: error.to_string(),
            },
        }
    }
}
