//! Request parameter extraction.
//!
//! Postbacks arrive as GET query strings, JSON bodies, form bodies or
//! any mix of those, depending on the sending network. All sources are
//! merged into a single string map with body values taking precedence
//! over the query string.

use std::collections::HashMap;

use hyper::body::HttpBody;
use hyper::header::{CONTENT_LENGTH, CONTENT_TYPE};
use hyper::{Body, Request};
use serde_json::Value;

use crate::ResponseError;

const MAX_BODY_BYTES: usize = 64 * 1024;

/// Merges query string and body parameters into one map.
///
/// Scalar JSON values are stringified the way the query string would
/// carry them; nested JSON values are ignored. An unparseable body is
/// skipped rather than rejected, since many networks send junk bodies
/// alongside a fully-formed query string.
pub async fn merged_params(
    req: Request<Body>,
) -> Result<HashMap<String, String>, ResponseError> {
    let mut params: HashMap<String, String> = req
        .uri()
        .query()
        .and_then(|query| serde_urlencoded::from_str(query).ok())
        .unwrap_or_default();

    let is_json = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.starts_with("application/json"))
        .unwrap_or(false);

    let body = bounded_body(req).await?;

    if !body.is_empty() {
        if is_json {
            if let Ok(Value::Object(object)) = serde_json::from_slice(&body) {
                for (key, value) in object {
                    if let Some(value) = stringify_scalar(&value) {
                        params.insert(key, value);
                    }
                }
            }
        } else if let Ok(form) =
            serde_urlencoded::from_bytes::<HashMap<String, String>>(&body)
        {
            params.extend(form);
        }
    }

    Ok(params)
}

/// Reads the body up to [`MAX_BODY_BYTES`], rejecting oversized
/// requests before buffering them whole. A `Content-Length` above the
/// limit is rejected without reading at all.
async fn bounded_body(req: Request<Body>) -> Result<Vec<u8>, ResponseError> {
    let too_large = || ResponseError::BadRequest("Request body too large".to_string());

    let declared = req
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok());
    if declared.map_or(false, |length| length > MAX_BODY_BYTES) {
        return Err(too_large());
    }

    let mut body = req.into_body();
    let mut buffered = Vec::new();
    while let Some(chunk) = body.data().await {
        let chunk = chunk?;
        if buffered.len() + chunk.len() > MAX_BODY_BYTES {
            return Err(too_large());
        }
        buffered.extend_from_slice(&chunk);
    }

    Ok(buffered)
}

fn stringify_scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).expect("valid request")
    }

    fn post(uri: &str, content_type: &str, body: &str) -> Request<Body> {
        Request::post(uri)
            .header(CONTENT_TYPE, content_type)
            .body(Body::from(body.to_string()))
            .expect("valid request")
    }

    #[tokio::test]
    async fn parses_query_string_parameters() {
        let params = merged_params(get("/postback?tracking_id=67&payout=1.5"))
            .await
            .expect("should parse");

        assert_eq!(Some(&"67".to_string()), params.get("tracking_id"));
        assert_eq!(Some(&"1.5".to_string()), params.get("payout"));
    }

    #[tokio::test]
    async fn json_body_values_override_the_query_string() {
        let req = post(
            "/postback?tracking_id=67&payout=1.5",
            "application/json",
            r#"{"payout": 2.5, "nonce": "n-1", "extra": {"nested": true}}"#,
        );
        let params = merged_params(req).await.expect("should parse");

        assert_eq!(Some(&"2.5".to_string()), params.get("payout"));
        assert_eq!(Some(&"67".to_string()), params.get("tracking_id"));
        assert_eq!(Some(&"n-1".to_string()), params.get("nonce"));
        // nested values are not stringified
        assert_eq!(None, params.get("extra"));
    }

    #[tokio::test]
    async fn parses_form_encoded_bodies() {
        let req = post(
            "/postback",
            "application/x-www-form-urlencoded",
            "tracking_id=67&offer_id=TEST123",
        );
        let params = merged_params(req).await.expect("should parse");

        assert_eq!(Some(&"67".to_string()), params.get("tracking_id"));
        assert_eq!(Some(&"TEST123".to_string()), params.get("offer_id"));
    }

    #[tokio::test]
    async fn oversized_bodies_are_rejected() {
        let too_large =
            Err(ResponseError::BadRequest("Request body too large".to_string()));

        let req = Request::post("/postback")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(vec![b'a'; MAX_BODY_BYTES + 1]))
            .expect("valid request");
        assert_eq!(too_large, merged_params(req).await);

        // a declared oversized length is rejected before any read
        let req = Request::post("/postback")
            .header(CONTENT_LENGTH, MAX_BODY_BYTES + 1)
            .body(Body::empty())
            .expect("valid request");
        assert_eq!(too_large, merged_params(req).await);
    }

    #[tokio::test]
    async fn ignores_an_unparseable_json_body() {
        let req = post("/postback?tracking_id=67", "application/json", "{not json");
        let params = merged_params(req).await.expect("should parse");

        assert_eq!(Some(&"67".to_string()), params.get("tracking_id"));
        assert_eq!(1, params.len());
    }
}
