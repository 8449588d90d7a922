//! `GET /status` - read-only conversion lookup for smoke checks.

use std::collections::HashMap;

use hyper::{Body, Request, Response};

use primitives::conversion::ConversionStatus;
use primitives::postback::StatusResponse;
use slog::error;

use crate::response::success_response;
use crate::storage::Storage;
use crate::{Application, ResponseError};

pub async fn conversion_status<S: Storage>(
    req: Request<Body>,
    app: &Application<S>,
) -> Result<Response<Body>, ResponseError> {
    let query: HashMap<String, String> = req
        .uri()
        .query()
        .and_then(|query| serde_urlencoded::from_str(query).ok())
        .unwrap_or_default();
    let tracking_id = query
        .get("tracking_id")
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ResponseError::BadRequest("tracking_id missing".to_string()))?;

    let latest = app
        .storage
        .conversion(tracking_id)
        .await
        .map_err(|error| {
            error!(&app.logger, "Status lookup failed"; "module" => "status", "error" => ?error);
            ResponseError::ServerError
        })?;

    let response = StatusResponse {
        completed: latest
            .as_ref()
            .map(|record| record.status == ConversionStatus::Completed)
            .unwrap_or(false),
        latest,
    };

    Ok(success_response(serde_json::to_string(&response)?))
}
