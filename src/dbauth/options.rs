//! Handler configuration: field mapping, cookie attributes and per-flow options.

use anyhow::{Result, anyhow};
use regex::Regex;
use std::time::Duration;

/// Column names of the user table, keyed by the role each column plays.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthFields {
    pub id: String,
    pub username: String,
    pub hashed_password: String,
    pub salt: String,
    pub reset_token: String,
    pub reset_token_expires_at: String,
    pub challenge: String,
}

impl AuthFields {
    /// Every mapped column must be a plain SQL identifier since it ends up in queries.
    ///
    /// # Errors
    /// Returns an error naming the first invalid column.
    pub fn validate(&self) -> Result<()> {
        let re = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$")?;
        for (role, column) in self.columns() {
            if !re.is_match(column) {
                return Err(anyhow!("invalid column name for {role}: {column:?}"));
            }
        }
        Ok(())
    }

    fn columns(&self) -> [(&'static str, &str); 7] {
        [
            ("id", &self.id),
            ("username", &self.username),
            ("hashed_password", &self.hashed_password),
            ("salt", &self.salt),
            ("reset_token", &self.reset_token),
            ("reset_token_expires_at", &self.reset_token_expires_at),
            ("challenge", &self.challenge),
        ]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "Strict",
            Self::Lax => "Lax",
            Self::None => "None",
        }
    }
}

#[derive(Clone, Debug)]
pub struct CookieOptions {
    pub name: String,
    pub http_only: bool,
    pub path: String,
    pub same_site: SameSite,
    pub secure: bool,
}

#[derive(Clone, Debug)]
pub struct ForgotPasswordErrors {
    pub username_not_found: String,
    pub username_required: String,
}

#[derive(Clone, Debug)]
pub struct ForgotPasswordOptions {
    pub enabled: bool,
    /// Lifetime of a reset token.
    pub expires: Duration,
    pub errors: ForgotPasswordErrors,
}

#[derive(Clone, Debug)]
pub struct LoginErrors {
    pub username_or_password_missing: String,
    pub username_not_found: String,
    pub incorrect_password: String,
}

#[derive(Clone, Debug)]
pub struct LoginOptions {
    pub enabled: bool,
    /// Lifetime of the session cookie and the server-side session.
    pub expires: Duration,
    pub errors: LoginErrors,
}

#[derive(Clone, Debug)]
pub struct ResetPasswordErrors {
    pub reset_token_expired: String,
    pub reset_token_invalid: String,
    pub reset_token_required: String,
    pub reused_password: String,
}

#[derive(Clone, Debug)]
pub struct ResetPasswordOptions {
    pub enabled: bool,
    pub allow_reuse: bool,
    pub errors: ResetPasswordErrors,
}

#[derive(Clone, Debug)]
pub struct SignupErrors {
    pub field_missing: String,
    pub username_taken: String,
    pub password_invalid: String,
}

#[derive(Clone, Debug)]
pub struct SignupOptions {
    pub enabled: bool,
    pub errors: SignupErrors,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WebAuthnDeviceType {
    Platform,
    Any,
}

#[derive(Clone, Debug)]
pub struct WebAuthnCredentialFields {
    pub id: String,
    pub user_id: String,
    pub public_key: String,
    pub transports: String,
    pub counter: String,
}

#[derive(Clone, Debug)]
pub struct WebAuthnOptions {
    pub enabled: bool,
    /// How long a WebAuthn login lasts before re-authentication is required.
    pub expires: Duration,
    pub name: String,
    pub domain: String,
    pub origin: String,
    pub device_type: WebAuthnDeviceType,
    pub timeout: Duration,
    pub credential_fields: WebAuthnCredentialFields,
}

#[derive(Clone, Debug)]
pub struct DbAuthOptions {
    pub auth_fields: AuthFields,
    pub cookie: CookieOptions,
    pub forgot_password: ForgotPasswordOptions,
    pub login: LoginOptions,
    pub reset_password: ResetPasswordOptions,
    pub signup: SignupOptions,
    pub webauthn: WebAuthnOptions,
}

impl DbAuthOptions {
    /// # Errors
    /// Returns an error if the field mapping or cookie name is unusable.
    pub fn validate(&self) -> Result<()> {
        self.auth_fields.validate()?;
        let cookie_name = Regex::new(r"^[A-Za-z0-9_\-.]+$")?;
        if !cookie_name.is_match(&self.cookie.name) {
            return Err(anyhow!("invalid cookie name: {:?}", self.cookie.name));
        }
        if self.login.expires.is_zero() {
            return Err(anyhow!("login expiry must be greater than zero"));
        }
        if self.forgot_password.expires.is_zero() {
            return Err(anyhow!("reset token expiry must be greater than zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> AuthFields {
        AuthFields {
            id: "id".to_string(),
            username: "email".to_string(),
            hashed_password: "hashed_password".to_string(),
            salt: "salt".to_string(),
            reset_token: "reset_token".to_string(),
            reset_token_expires_at: "reset_token_expires_at".to_string(),
            challenge: "webauthn_challenge".to_string(),
        }
    }

    #[test]
    fn auth_fields_accept_identifiers() {
        assert!(fields().validate().is_ok());
    }

    #[test]
    fn auth_fields_reject_injection() {
        let mut mapping = fields();
        mapping.username = "email; DROP TABLE users".to_string();
        let err = mapping.validate().err().map(|e| e.to_string());
        assert!(err.is_some_and(|msg| msg.contains("username")));

        let mut mapping = fields();
        mapping.salt = "1salt".to_string();
        assert!(mapping.validate().is_err());
    }

    #[test]
    fn same_site_strings() {
        assert_eq!(SameSite::Strict.as_str(), "Strict");
        assert_eq!(SameSite::Lax.as_str(), "Lax");
        assert_eq!(SameSite::None.as_str(), "None");
    }
}
