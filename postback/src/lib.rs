#![deny(clippy::all)]
#![deny(rust_2018_idioms)]

use hyper::{Body, Method, Request, Response};
use primitives::Config;
use slog::Logger;

use crate::events_api::EventsApi;
use crate::response::map_response_error;
use crate::storage::Storage;

pub mod application;
pub mod auth;
pub mod db;
pub mod events_api;
pub mod replay;
pub mod request;
pub mod response;
pub mod routes {
    pub mod click;
    pub mod postback;
    pub mod status;
}
pub mod storage;

#[cfg(any(test, feature = "test-util"))]
pub mod test_util;

pub use response::ResponseError;

/// The postback application with all its components.
///
/// All coordination between concurrent requests is pushed down to the
/// storage uniqueness constraints - the application itself holds no
/// mutable state.
#[derive(Clone)]
pub struct Application<S: Storage> {
    pub config: Config,
    pub logger: Logger,
    pub storage: S,
    pub events_api: EventsApi,
}

impl<S: Storage> Application<S> {
    pub fn new(config: Config, logger: Logger, storage: S, events_api: EventsApi) -> Self {
        Self {
            config,
            logger,
            storage,
            events_api,
        }
    }

    pub async fn handle_routing(&self, mut req: Request<Body>) -> Response<Body> {
        let session = Session::from_request(&req);
        req.extensions_mut().insert(session);

        let response = match (req.uri().path(), req.method()) {
            ("/postback", &Method::GET) | ("/postback", &Method::POST) => {
                routes::postback::postback(req, self).await
            }
            ("/postback", _) => Err(ResponseError::MethodNotAllowed),
            ("/click", &Method::POST) => routes::click::capture_click(req, self).await,
            ("/click", _) => Err(ResponseError::MethodNotAllowed),
            ("/status", &Method::GET) => routes::status::conversion_status(req, self).await,
            ("/status", _) => Err(ResponseError::MethodNotAllowed),
            _ => Err(ResponseError::NotFound),
        };

        response.unwrap_or_else(map_response_error)
    }
}

/// Best-effort request provenance, captured before any handler runs.
/// Non-authoritative - headers are client-controlled unless the
/// platform in front of the server sets them.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
}

impl Session {
    fn from_request(req: &Request<Body>) -> Self {
        let header = |name: &str| {
            req.headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
                .filter(|value| !value.is_empty())
                .map(ToString::to_string)
        };

        Self {
            ip: get_request_ip(req),
            user_agent: header("user-agent"),
            referrer: header("referer"),
        }
    }
}

/// Resolves the client IP, preferring the platform-supplied
/// `true-client-ip` header and falling back to the first hop of
/// `x-forwarded-for`.
fn get_request_ip<B>(req: &Request<B>) -> Option<String> {
    // an empty header value falls through to the next source
    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|hv| hv.to_str().ok())
            .filter(|value| !value.trim().is_empty())
    };

    header("true-client-ip")
        .or_else(|| header("x-forwarded-for"))
        .and_then(|value| {
            value
                .split(',')
                .next()
                .map(str::trim)
                .filter(|ip| !ip.is_empty())
                .map(ToString::to_string)
        })
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn request_with_header(name: &str, value: &str) -> Request<Body> {
        Request::builder()
            .uri("/postback")
            .header(name, value)
            .body(Body::empty())
            .expect("Should build request")
    }

    #[test]
    fn request_ip_prefers_true_client_ip() {
        let req = Request::builder()
            .uri("/postback")
            .header("true-client-ip", "203.0.113.7")
            .header("x-forwarded-for", "10.0.0.1")
            .body(Body::empty())
            .expect("Should build request");

        assert_eq!(Some("203.0.113.7".to_string()), get_request_ip(&req));
    }

    #[test]
    fn request_ip_takes_first_forwarded_hop() {
        let req = request_with_header("x-forwarded-for", "192.168.0.1, 120.0.0.1, 10.0.0.10");

        assert_eq!(Some("192.168.0.1".to_string()), get_request_ip(&req));
    }

    #[test]
    fn request_ip_filters_empty_headers() {
        let req = request_with_header("x-forwarded-for", "");

        assert_eq!(None, get_request_ip(&req));
    }

    #[test]
    fn empty_true_client_ip_falls_back_to_forwarded_for() {
        let req = Request::builder()
            .uri("/postback")
            .header("true-client-ip", "")
            .header("x-forwarded-for", "192.168.0.1, 10.0.0.10")
            .body(Body::empty())
            .expect("Should build request");

        assert_eq!(Some("192.168.0.1".to_string()), get_request_ip(&req));
    }
}
