//! Method dispatch and the individual auth flows.

use anyhow::Context;
use axum::http::{Method, StatusCode, header::SET_COOKIE};
use serde_json::{Map, Value, json};
use std::{
    str::FromStr,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};
use tracing::{Span, debug, error, field, info, instrument, warn};

use super::{
    cookie::{clear_session_cookie, extract_session_token, session_cookie},
    crypto::{
        generate_reset_token, generate_salt, generate_session_token, hash_password, hash_token,
        normalize_username, verify_password,
    },
    error::{DbAuthError, UsernameTaken, render},
    options::DbAuthOptions,
    request::{AuthRequest, AuthResponse},
    store::{AuthHooks, SignupInput, SignupResult, UserStore},
};
use crate::models::User;

type FlowResult = Result<AuthResponse, DbAuthError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthMethod {
    Login,
    Logout,
    Signup,
    ForgotPassword,
    ResetPassword,
    ValidateResetToken,
    GetToken,
    WebAuthnRegOptions,
    WebAuthnRegister,
    WebAuthnAuthOptions,
    WebAuthnAuthenticate,
}

impl AuthMethod {
    /// The HTTP verb each method must arrive with.
    #[must_use]
    pub fn verb(self) -> Method {
        match self {
            Self::GetToken | Self::WebAuthnRegOptions | Self::WebAuthnAuthOptions => Method::GET,
            _ => Method::POST,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Logout => "logout",
            Self::Signup => "signup",
            Self::ForgotPassword => "forgotPassword",
            Self::ResetPassword => "resetPassword",
            Self::ValidateResetToken => "validateResetToken",
            Self::GetToken => "getToken",
            Self::WebAuthnRegOptions => "webAuthnRegOptions",
            Self::WebAuthnRegister => "webAuthnRegister",
            Self::WebAuthnAuthOptions => "webAuthnAuthOptions",
            Self::WebAuthnAuthenticate => "webAuthnAuthenticate",
        }
    }
}

impl FromStr for AuthMethod {
    type Err = DbAuthError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let method = match name {
            "login" => Self::Login,
            "logout" => Self::Logout,
            "signup" => Self::Signup,
            "forgotPassword" => Self::ForgotPassword,
            "resetPassword" => Self::ResetPassword,
            "validateResetToken" => Self::ValidateResetToken,
            "getToken" => Self::GetToken,
            "webAuthnRegOptions" => Self::WebAuthnRegOptions,
            "webAuthnRegister" => Self::WebAuthnRegister,
            "webAuthnAuthOptions" => Self::WebAuthnAuthOptions,
            "webAuthnAuthenticate" => Self::WebAuthnAuthenticate,
            other => return Err(DbAuthError::UnknownMethod(other.to_string())),
        };
        Ok(method)
    }
}

/// The configured auth handler. One instance serves every request.
pub struct DbAuthHandler {
    options: DbAuthOptions,
    store: Arc<dyn UserStore>,
    hooks: Arc<dyn AuthHooks>,
}

impl DbAuthHandler {
    /// # Errors
    /// Returns an error if the options fail validation.
    pub fn new(
        options: DbAuthOptions,
        store: Arc<dyn UserStore>,
        hooks: Arc<dyn AuthHooks>,
    ) -> anyhow::Result<Self> {
        options.validate().context("invalid auth options")?;
        if options.webauthn.enabled {
            warn!(
                rp_id = %options.webauthn.domain,
                "WebAuthn is enabled but ceremonies are not available; webAuthn* methods will fail"
            );
        }
        Ok(Self {
            options,
            store,
            hooks,
        })
    }

    #[must_use]
    pub fn options(&self) -> &DbAuthOptions {
        &self.options
    }

    /// Handle one request. Errors are rendered into the response, never returned.
    #[instrument(skip_all, fields(auth.method = field::Empty))]
    pub async fn invoke(&self, request: AuthRequest) -> AuthResponse {
        match self.dispatch(&request).await {
            Ok(response) => response,
            Err(err) => {
                match &err {
                    DbAuthError::Internal(cause) => error!("auth request failed: {cause:#}"),
                    DbAuthError::Hook(cause) => warn!("auth callback failed: {cause:#}"),
                    other => debug!("auth request rejected: {other}"),
                }
                AuthResponse::error(&err)
            }
        }
    }

    async fn dispatch(&self, request: &AuthRequest) -> FlowResult {
        let body = if request.method == Method::POST {
            request.json_body()?
        } else {
            Map::new()
        };

        let name = body
            .get("method")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| request.query.get("method").cloned())
            .ok_or(DbAuthError::MissingMethod)?;
        let method = AuthMethod::from_str(&name)?;
        Span::current().record("auth.method", method.as_str());

        if method.verb() != request.method {
            return Err(DbAuthError::WrongVerb);
        }

        match method {
            AuthMethod::Login => self.login(&body).await,
            AuthMethod::Logout => self.logout(request).await,
            AuthMethod::Signup => self.signup(&body).await,
            AuthMethod::ForgotPassword => self.forgot_password(&body).await,
            AuthMethod::ResetPassword => self.reset_password(&body).await,
            AuthMethod::ValidateResetToken => self.validate_reset_token(&body).await,
            AuthMethod::GetToken => self.get_token(request).await,
            AuthMethod::WebAuthnRegOptions
            | AuthMethod::WebAuthnRegister
            | AuthMethod::WebAuthnAuthOptions
            | AuthMethod::WebAuthnAuthenticate => Err(self.webauthn_error()),
        }
    }

    async fn login(&self, body: &Map<String, Value>) -> FlowResult {
        if !self.options.login.enabled {
            return Err(flow_disabled("Login"));
        }
        let errors = &self.options.login.errors;
        let (Some(username), Some(password)) =
            (string_field(body, "username"), string_field(body, "password"))
        else {
            return Err(DbAuthError::UsernameOrPasswordMissing(
                errors.username_or_password_missing.clone(),
            ));
        };
        let username = normalize_username(&username);

        let user = self
            .store
            .find_user_by_username(&username)
            .await?
            .ok_or_else(|| {
                DbAuthError::UsernameNotFound(render(
                    &errors.username_not_found,
                    &[("username", &username)],
                ))
            })?;

        if !verify_password(&password, &user.salt, &user.hashed_password) {
            return Err(DbAuthError::IncorrectPassword(render(
                &errors.incorrect_password,
                &[("username", &username)],
            )));
        }

        let user = self.hooks.login(user).await.map_err(DbAuthError::Hook)?;
        info!(user_id = %user.id, "login succeeded");
        self.login_response(&user, StatusCode::OK).await
    }

    async fn logout(&self, request: &AuthRequest) -> FlowResult {
        if let Some(token) = extract_session_token(&request.headers, &self.options.cookie.name)
            && let Err(err) = self.store.delete_session(&hash_token(&token)).await
        {
            error!("Failed to delete session: {err:#}");
        }

        // Always clear the cookie, even if the session record was missing.
        let mut response = AuthResponse::empty(StatusCode::OK);
        let cookie = clear_session_cookie(&self.options.cookie)
            .context("failed to build session cookie")?;
        response.headers.insert(SET_COOKIE, cookie);
        Ok(response)
    }

    async fn signup(&self, body: &Map<String, Value>) -> FlowResult {
        if !self.options.signup.enabled {
            return Err(flow_disabled("Signup"));
        }
        let errors = &self.options.signup.errors;
        let missing = |name: &str| {
            DbAuthError::FieldMissing(render(&errors.field_missing, &[("field", name)]))
        };
        let username = string_field(body, "username").ok_or_else(|| missing("username"))?;
        let password = string_field(body, "password").ok_or_else(|| missing("password"))?;

        if !self.hooks.validate_password(&password) {
            return Err(DbAuthError::PasswordInvalid(errors.password_invalid.clone()));
        }

        let username = normalize_username(&username);
        if self.store.find_user_by_username(&username).await?.is_some() {
            return Err(DbAuthError::UsernameTaken(render(
                &errors.username_taken,
                &[("username", &username)],
            )));
        }

        let salt = generate_salt()?;
        let hashed_password = hash_password(&password, &salt)?;
        let user_attributes = body
            .get("userAttributes")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let result = self
            .hooks
            .signup(SignupInput {
                username: username.clone(),
                hashed_password,
                salt,
                user_attributes,
            })
            .await
            .map_err(|err| {
                if err.downcast_ref::<UsernameTaken>().is_some() {
                    DbAuthError::UsernameTaken(render(
                        &errors.username_taken,
                        &[("username", &username)],
                    ))
                } else {
                    DbAuthError::Hook(err)
                }
            })?;

        match result {
            SignupResult::User(user) => {
                info!(user_id = %user.id, "signup succeeded");
                self.login_response(&user, StatusCode::CREATED).await
            }
            SignupResult::Message(message) => Ok(AuthResponse::json(
                StatusCode::CREATED,
                &json!({ "message": message }),
            )),
        }
    }

    async fn forgot_password(&self, body: &Map<String, Value>) -> FlowResult {
        if !self.options.forgot_password.enabled {
            return Err(flow_disabled("Forgot password"));
        }
        let errors = &self.options.forgot_password.errors;
        let username = string_field(body, "username")
            .ok_or_else(|| DbAuthError::UsernameRequired(errors.username_required.clone()))?;
        let username = normalize_username(&username);

        let mut user = self
            .store
            .find_user_by_username(&username)
            .await?
            .ok_or_else(|| {
                DbAuthError::UsernameNotFound(render(
                    &errors.username_not_found,
                    &[("username", &username)],
                ))
            })?;

        let token = generate_reset_token()?;
        let token_hash = hash_token(&token);
        let expires_at = now_unix().saturating_add(seconds(self.options.forgot_password.expires));
        self.store
            .set_reset_token(user.id, Some((token_hash.clone(), expires_at)))
            .await?;
        user.reset_token = Some(token_hash);
        user.reset_token_expires_at = Some(expires_at);

        let user = self
            .hooks
            .forgot_password(user, &token)
            .await
            .map_err(DbAuthError::Hook)?;
        Ok(AuthResponse::json(StatusCode::OK, &json!(user.public())))
    }

    async fn validate_reset_token(&self, body: &Map<String, Value>) -> FlowResult {
        if !self.options.reset_password.enabled {
            return Err(flow_disabled("Reset password"));
        }
        let user = self.user_for_reset_token(body).await?;
        Ok(AuthResponse::json(StatusCode::OK, &json!(user.public())))
    }

    async fn reset_password(&self, body: &Map<String, Value>) -> FlowResult {
        if !self.options.reset_password.enabled {
            return Err(flow_disabled("Reset password"));
        }
        let mut user = self.user_for_reset_token(body).await?;

        let password = string_field(body, "password").ok_or_else(|| {
            DbAuthError::FieldMissing(render(
                &self.options.signup.errors.field_missing,
                &[("field", "password")],
            ))
        })?;
        if !self.hooks.validate_password(&password) {
            return Err(DbAuthError::PasswordInvalid(
                self.options.signup.errors.password_invalid.clone(),
            ));
        }
        if !self.options.reset_password.allow_reuse
            && verify_password(&password, &user.salt, &user.hashed_password)
        {
            return Err(DbAuthError::ReusedPassword(
                self.options.reset_password.errors.reused_password.clone(),
            ));
        }

        let salt = generate_salt()?;
        let hashed_password = hash_password(&password, &salt)?;
        self.store
            .update_password(user.id, &hashed_password, &salt)
            .await?;
        user.hashed_password = hashed_password;
        user.salt = salt;
        user.reset_token = None;
        user.reset_token_expires_at = None;

        let login = self
            .hooks
            .reset_password(&user)
            .await
            .map_err(DbAuthError::Hook)?;
        if login {
            self.login_response(&user, StatusCode::OK).await
        } else {
            Ok(AuthResponse::json(StatusCode::OK, &json!(user.public())))
        }
    }

    async fn get_token(&self, request: &AuthRequest) -> FlowResult {
        let Some(token) = extract_session_token(&request.headers, &self.options.cookie.name) else {
            return Ok(AuthResponse::text(StatusCode::OK, String::new()));
        };
        let user_id = self.store.lookup_session(&hash_token(&token)).await?;
        Ok(AuthResponse::text(
            StatusCode::OK,
            user_id.map(|id| id.to_string()).unwrap_or_default(),
        ))
    }

    /// Resolve the `resetToken` field, clearing it if it has expired.
    async fn user_for_reset_token(&self, body: &Map<String, Value>) -> Result<User, DbAuthError> {
        let errors = &self.options.reset_password.errors;
        let token = string_field(body, "resetToken")
            .ok_or_else(|| DbAuthError::ResetTokenRequired(errors.reset_token_required.clone()))?;

        let user = self
            .store
            .find_user_by_reset_token(&hash_token(&token))
            .await?
            .ok_or_else(|| DbAuthError::ResetTokenInvalid(errors.reset_token_invalid.clone()))?;

        let now = now_unix();
        if user.reset_token_expires_at.is_none_or(|expires| expires <= now) {
            self.store.set_reset_token(user.id, None).await?;
            return Err(DbAuthError::ResetTokenExpired(
                errors.reset_token_expired.clone(),
            ));
        }
        Ok(user)
    }

    async fn login_response(&self, user: &User, status: StatusCode) -> FlowResult {
        let token = generate_session_token()?;
        self.store
            .insert_session(user.id, &hash_token(&token), seconds(self.options.login.expires))
            .await?;

        let cookie = session_cookie(&self.options.cookie, &token, self.options.login.expires)
            .context("failed to build session cookie")?;
        let mut response = AuthResponse::json(status, &json!({ "id": user.id }));
        response.headers.insert(SET_COOKIE, cookie);
        Ok(response)
    }

    fn webauthn_error(&self) -> DbAuthError {
        if self.options.webauthn.enabled {
            DbAuthError::WebAuthnUnavailable
        } else {
            DbAuthError::WebAuthnNotEnabled
        }
    }
}

fn flow_disabled(flow: &str) -> DbAuthError {
    DbAuthError::FlowNotEnabled(format!("{flow} flow is not enabled"))
}

/// A non-blank string field from the request body.
fn string_field(body: &Map<String, Value>, name: &str) -> Option<String> {
    body.get(name)
        .and_then(Value::as_str)
        .filter(|value| !value.trim().is_empty())
        .map(str::to_string)
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX))
}

fn seconds(duration: std::time::Duration) -> i64 {
    i64::try_from(duration.as_secs()).unwrap_or(i64::MAX)
}
