//! `POST /click` - click-time context capture.
//!
//! Called by the landing page before the offer redirect. The stored
//! context later enriches the forwarded conversion event; losing it
//! only degrades attribution, so the endpoint stays minimal.

use chrono::Utc;
use hyper::{body::to_bytes, Body, Request, Response};

use primitives::conversion::MAX_FIELD_LENGTH;
use primitives::postback::{ClickRequest, ClickResponse};
use primitives::ClickContext;
use slog::error;

use crate::response::success_response;
use crate::storage::Storage;
use crate::{Application, ResponseError, Session};

pub async fn capture_click<S: Storage>(
    req: Request<Body>,
    app: &Application<S>,
) -> Result<Response<Body>, ResponseError> {
    let session = req
        .extensions()
        .get::<Session>()
        .cloned()
        .unwrap_or_default();

    let body = to_bytes(req.into_body()).await?;
    let request: ClickRequest = serde_json::from_slice(&body)
        .map_err(|_| ResponseError::BadRequest("Bad request body".to_string()))?;

    let tracking_id = request.tracking_id.trim();
    if tracking_id.is_empty() || tracking_id.len() > MAX_FIELD_LENGTH {
        return Err(ResponseError::BadRequest("tracking_id missing".to_string()));
    }

    let click = ClickContext {
        tracking_id: tracking_id.to_string(),
        ttclid: request.ttclid.filter(|value| !value.is_empty()),
        ip: session.ip,
        user_agent: session.user_agent,
        landing_url: request.landing_url.filter(|value| !value.is_empty()),
        referrer: request
            .referrer
            .filter(|value| !value.is_empty())
            .or(session.referrer),
        created: Utc::now(),
    };

    let inserted = app.storage.insert_click(&click).await.map_err(|error| {
        error!(&app.logger, "Click insert failed"; "module" => "click", "error" => ?error);
        ResponseError::ServerError
    })?;

    let response = ClickResponse {
        success: true,
        deduped: !inserted,
    };
    Ok(success_response(serde_json::to_string(&response)?))
}
