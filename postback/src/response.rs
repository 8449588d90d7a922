use hyper::{Body, Response, StatusCode};
use primitives::postback::ErrorResponse;

#[derive(Debug, PartialEq, Eq)]
pub enum ResponseError {
    NotFound,
    MethodNotAllowed,
    BadRequest(String),
    Forbidden(String),
    /// Generic 500. Internal details stay in the logs, never in the body.
    ServerError,
}

impl<T> From<T> for ResponseError
where
    T: std::error::Error + 'static,
{
    fn from(_error: T) -> Self {
        ResponseError::ServerError
    }
}

impl From<ResponseError> for Response<Body> {
    fn from(response_error: ResponseError) -> Self {
        map_response_error(response_error)
    }
}

pub fn map_response_error(error: ResponseError) -> Response<Body> {
    match error {
        ResponseError::NotFound => error_response("Not found".to_string(), StatusCode::NOT_FOUND),
        ResponseError::MethodNotAllowed => error_response(
            "Method not allowed".to_string(),
            StatusCode::METHOD_NOT_ALLOWED,
        ),
        ResponseError::BadRequest(e) => error_response(e, StatusCode::BAD_REQUEST),
        ResponseError::Forbidden(e) => error_response(e, StatusCode::FORBIDDEN),
        ResponseError::ServerError => {
            error_response("Server error".to_string(), StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

pub fn error_response(error: String, status_code: StatusCode) -> Response<Body> {
    let error_response = ErrorResponse {
        success: false,
        error,
    };

    let body = Body::from(serde_json::to_string(&error_response).expect("serialize err response"));

    let mut response = Response::new(body);
    response
        .headers_mut()
        .insert("Content-type", "application/json".parse().unwrap());

    *response.status_mut() = status_code;

    response
}

pub fn success_response(response_body: String) -> Response<Body> {
    let body = Body::from(response_body);

    let mut response = Response::new(body);
    response
        .headers_mut()
        .insert("Content-type", "application/json".parse().unwrap());

    let status = response.status_mut();
    *status = StatusCode::OK;

    response
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn maps_errors_to_status_codes_and_json_bodies() {
        let cases = [
            (ResponseError::NotFound, StatusCode::NOT_FOUND),
            (
                ResponseError::MethodNotAllowed,
                StatusCode::METHOD_NOT_ALLOWED,
            ),
            (
                ResponseError::BadRequest("tracking_id missing".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                ResponseError::Forbidden("Forbidden".to_string()),
                StatusCode::FORBIDDEN,
            ),
            (ResponseError::ServerError, StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (error, expected_status) in cases {
            let response = map_response_error(error);
            assert_eq!(expected_status, response.status());
            assert_eq!(
                "application/json",
                response.headers()["Content-type"].to_str().unwrap()
            );
        }
    }
}
