//! `GET|POST /postback` - the conversion postback endpoint.
//!
//! Pipeline order is fixed: parameter validation, source IP allowlist,
//! authentication, replay guard, ledger record, platform notification.
//! Authentication failures are logged with their cause but answered
//! with an undifferentiated 403.

use chrono::Utc;
use hyper::{Body, Request, Response};

use primitives::conversion::{parse_payout, ConversionStatus};
use primitives::postback::{PostbackParams, PostbackResponse};
use primitives::{ConversionRecord, NonceRecord};
use slog::{error, warn};

use crate::auth::{self, AuthError};
use crate::replay::{self, ReplayError};
use crate::request::merged_params;
use crate::response::success_response;
use crate::storage::Storage;
use crate::{Application, ResponseError, Session};

pub async fn postback<S: Storage>(
    req: Request<Body>,
    app: &Application<S>,
) -> Result<Response<Body>, ResponseError> {
    let session = req
        .extensions()
        .get::<Session>()
        .cloned()
        .unwrap_or_default();

    let merged = merged_params(req).await?;
    let params = PostbackParams::from_map(&merged)
        .map_err(|error| ResponseError::BadRequest(error.to_string()))?;

    check_allowlist(app, &session)?;
    authenticate(app, &params)?;

    if app.config.replay_protection {
        if let Some(response) = replay_guard(app, &params).await? {
            return Ok(response);
        }
    }

    let conversion = ConversionRecord {
        tracking_id: params.tracking_id.clone(),
        offer_id: params.offer_id.clone(),
        payout: params.payout.as_deref().and_then(parse_payout),
        status: ConversionStatus::Completed,
        source_ip: session.ip.clone(),
        user_agent: session.user_agent.clone(),
        nonce: params.nonce.clone(),
        ts: params.ts.as_deref().and_then(|ts| ts.parse().ok()),
        notification_sent: None,
        notification_sent_at: None,
        notification_response: None,
        created: Utc::now(),
    };

    let outcome = app
        .storage
        .record_conversion(&conversion)
        .await
        .map_err(|error| {
            error!(&app.logger, "Recording conversion failed"; "module" => "postback", "error" => ?error);
            ResponseError::ServerError
        })?;

    if !outcome.created {
        let response = PostbackResponse::deduped();
        return Ok(success_response(serde_json::to_string(&response)?));
    }

    let notification = notify_platform(app, &outcome.record, &session).await;

    let response = PostbackResponse::recorded(notification);
    Ok(success_response(serde_json::to_string(&response)?))
}

fn check_allowlist<S: Storage>(
    app: &Application<S>,
    session: &Session,
) -> Result<(), ResponseError> {
    let allowlist = match &app.config.allowed_ips {
        Some(allowlist) if !allowlist.is_empty() => allowlist,
        _ => return Ok(()),
    };

    let allowed = session
        .ip
        .as_deref()
        .and_then(|ip| ip.parse().ok())
        .map(|ip| allowlist.allows(ip))
        .unwrap_or(false);

    if allowed {
        Ok(())
    } else {
        warn!(&app.logger, "Postback from a non-allowlisted source"; "module" => "postback", "ip" => ?session.ip);
        Err(ResponseError::Forbidden("Forbidden".to_string()))
    }
}

/// Runs the configured authentication mode. The response body never
/// tells a probing sender which check failed.
fn authenticate<S: Storage>(
    app: &Application<S>,
    params: &PostbackParams,
) -> Result<(), ResponseError> {
    match auth::verify(&app.config, params) {
        Ok(()) => Ok(()),
        Err(AuthError::Misconfigured) => {
            error!(&app.logger, "Authentication secret is not configured"; "module" => "postback");
            Err(ResponseError::ServerError)
        }
        Err(error) => {
            warn!(&app.logger, "Rejected postback"; "module" => "postback", "reason" => %error, "tracking_id" => %params.tracking_id);
            Err(ResponseError::Forbidden("Forbidden".to_string()))
        }
    }
}

/// Timestamp window and single-use nonce checks.
///
/// A detected replay is answered `Some(200 {success, replay})` - the
/// original postback already succeeded, so the sender must not retry.
async fn replay_guard<S: Storage>(
    app: &Application<S>,
    params: &PostbackParams,
) -> Result<Option<Response<Body>>, ResponseError> {
    let map_replay_error = |error: ReplayError| match error {
        ReplayError::Expired => ResponseError::Forbidden("Forbidden".to_string()),
        other => ResponseError::BadRequest(other.to_string()),
    };

    let ts = replay::check_window(
        params.ts.as_deref(),
        app.config.replay_window_secs,
        Utc::now().timestamp(),
    )
    .map_err(map_replay_error)?;
    let nonce = replay::validate_nonce(params.nonce.as_deref()).map_err(map_replay_error)?;

    let record = NonceRecord {
        nonce: nonce.to_string(),
        tracking_id: Some(params.tracking_id.clone()),
        ts: Some(ts),
        created: Utc::now(),
    };
    let fresh = app.storage.insert_nonce(&record).await.map_err(|error| {
        error!(&app.logger, "Nonce insert failed"; "module" => "postback", "error" => ?error);
        ResponseError::ServerError
    })?;

    if fresh {
        Ok(None)
    } else {
        warn!(&app.logger, "Replayed postback"; "module" => "postback", "nonce" => nonce, "tracking_id" => %params.tracking_id);
        let response = PostbackResponse::replay();
        Ok(Some(success_response(serde_json::to_string(&response)?)))
    }
}

/// Best-effort notification plus ledger audit trail. Failures are
/// logged and reported in the response, never escalated.
async fn notify_platform<S: Storage>(
    app: &Application<S>,
    record: &ConversionRecord,
    session: &Session,
) -> primitives::postback::NotificationStatus {
    let click = match app.storage.click_context(&record.tracking_id).await {
        Ok(click) => click,
        Err(error) => {
            warn!(&app.logger, "Click context lookup failed"; "module" => "postback", "error" => ?error);
            None
        }
    };

    let outcome = app.events_api.notify(record, click.as_ref(), session).await;
    if !outcome.delivered() {
        warn!(&app.logger, "Notification not delivered"; "module" => "postback", "outcome" => ?outcome.to_status(), "tracking_id" => %record.tracking_id);
    }

    let attach = app
        .storage
        .attach_notification(
            &record.tracking_id,
            outcome.delivered(),
            &outcome.audit_response(),
        )
        .await;
    if let Err(error) = attach {
        error!(&app.logger, "Attaching notification audit failed"; "module" => "postback", "error" => ?error);
    }

    outcome.to_status()
}
