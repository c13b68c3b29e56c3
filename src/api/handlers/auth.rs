//! The `/auth` entry point.
//!
//! Both verbs hand the raw request to [`DbAuthHandler::invoke`] and return its
//! response as is; all routing by `method` happens inside the handler.

use axum::{
    extract::{Extension, Query},
    http::{HeaderMap, Method},
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{collections::HashMap, sync::Arc};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::dbauth::{AuthRequest, AuthResponse, DbAuthHandler};

/// Request body of `POST /auth`. Which fields are read depends on `method`.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AuthPayload {
    /// `login`, `logout`, `signup`, `forgotPassword`, `validateResetToken`, `resetPassword`.
    pub method: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub reset_token: Option<String>,
    #[schema(value_type = Object)]
    pub user_attributes: Option<Map<String, Value>>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AuthIdResponse {
    pub id: Uuid,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AuthErrorResponse {
    pub error: String,
}

#[derive(IntoParams, Deserialize, Debug)]
#[into_params(parameter_in = Query)]
pub struct AuthQuery {
    /// `getToken`, `webAuthnRegOptions` or `webAuthnAuthOptions`.
    pub method: String,
}

#[utoipa::path(
    post,
    path = "/auth",
    request_body = AuthPayload,
    responses(
        (status = 200, description = "Action completed; login and reset set the session cookie", body = AuthIdResponse),
        (status = 201, description = "Signup completed", body = AuthIdResponse),
        (status = 400, description = "Rejected with a client-facing message", body = AuthErrorResponse),
        (status = 404, description = "Method not served on POST"),
        (status = 500, description = "Internal error", body = AuthErrorResponse),
    ),
    tag = "auth"
)]
pub async fn auth_post(
    method: Method,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    handler: Extension<Arc<DbAuthHandler>>,
    body: Bytes,
) -> AuthResponse {
    handler
        .invoke(AuthRequest {
            method,
            headers,
            query,
            body,
        })
        .await
}

#[utoipa::path(
    get,
    path = "/auth",
    params(AuthQuery),
    responses(
        (status = 200, description = "Current user id as text, empty without a session", body = String, content_type = "text/plain"),
        (status = 400, description = "Unknown or disabled method", body = AuthErrorResponse),
        (status = 404, description = "Method not served on GET"),
    ),
    tag = "auth"
)]
pub async fn auth_get(
    method: Method,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    handler: Extension<Arc<DbAuthHandler>>,
) -> AuthResponse {
    handler
        .invoke(AuthRequest {
            method,
            headers,
            query,
            body: Bytes::new(),
        })
        .await
}
