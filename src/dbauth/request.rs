//! Transport-neutral request and response for the auth handler.

use axum::{
    body::Body,
    http::{HeaderMap, HeaderValue, Method, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use serde_json::{Map, Value};
use std::collections::HashMap;

use super::error::DbAuthError;

#[derive(Clone, Debug)]
pub struct AuthRequest {
    pub method: Method,
    pub headers: HeaderMap,
    pub query: HashMap<String, String>,
    pub body: Bytes,
}

impl AuthRequest {
    /// Parse the JSON body into an object. An empty body is an empty object.
    pub(crate) fn json_body(&self) -> Result<Map<String, Value>, DbAuthError> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Map::new());
        }
        match serde_json::from_slice::<Value>(&self.body) {
            Ok(Value::Object(map)) => Ok(map),
            _ => Err(DbAuthError::InvalidBody),
        }
    }
}

#[derive(Debug)]
pub struct AuthResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl AuthResponse {
    pub(crate) fn json(status: StatusCode, value: &Value) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Self {
            status,
            headers,
            body: Bytes::from(value.to_string()),
        }
    }

    pub(crate) fn text(status: StatusCode, body: String) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        Self {
            status,
            headers,
            body: Bytes::from(body),
        }
    }

    pub(crate) fn empty(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub(crate) fn error(err: &DbAuthError) -> Self {
        match err {
            DbAuthError::WrongVerb => Self::empty(err.status()),
            _ => Self::json(err.status(), &serde_json::json!({ "error": err.to_string() })),
        }
    }

    /// Body parsed as JSON, if it is JSON.
    #[must_use]
    pub fn json_value(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }
}

impl IntoResponse for AuthResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(body: &'static str) -> AuthRequest {
        AuthRequest {
            method: Method::POST,
            headers: HeaderMap::new(),
            query: HashMap::new(),
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    #[test]
    fn empty_body_is_empty_object() {
        assert!(request("").json_body().is_ok_and(|map| map.is_empty()));
        assert!(request("  \n").json_body().is_ok_and(|map| map.is_empty()));
    }

    #[test]
    fn non_object_body_is_rejected() {
        assert!(matches!(
            request("[1,2]").json_body(),
            Err(DbAuthError::InvalidBody)
        ));
        assert!(matches!(
            request("{not json").json_body(),
            Err(DbAuthError::InvalidBody)
        ));
    }

    #[test]
    fn error_response_is_json() {
        let response = AuthResponse::error(&DbAuthError::UsernameRequired(
            "Username is required".to_string(),
        ));
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(
            response.json_value(),
            Some(serde_json::json!({ "error": "Username is required" }))
        );
    }

    #[test]
    fn wrong_verb_has_no_body() {
        let response = AuthResponse::error(&DbAuthError::WrongVerb);
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert!(response.body.is_empty());
    }
}
