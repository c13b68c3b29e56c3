//! Errors surfaced by the auth handler.
//!
//! Most variants carry a message that was rendered from the configured error
//! strings, so the `Display` output is exactly what the client sees.

use axum::http::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbAuthError {
    #[error("{0}")]
    UsernameOrPasswordMissing(String),
    #[error("{0}")]
    UsernameNotFound(String),
    #[error("{0}")]
    UsernameRequired(String),
    #[error("{0}")]
    IncorrectPassword(String),
    #[error("{0}")]
    FieldMissing(String),
    #[error("{0}")]
    UsernameTaken(String),
    #[error("{0}")]
    PasswordInvalid(String),
    #[error("{0}")]
    ResetTokenRequired(String),
    #[error("{0}")]
    ResetTokenInvalid(String),
    #[error("{0}")]
    ResetTokenExpired(String),
    #[error("{0}")]
    ReusedPassword(String),
    #[error("{0}")]
    FlowNotEnabled(String),
    #[error("WebAuthn is not enabled")]
    WebAuthnNotEnabled,
    #[error("WebAuthn ceremonies are not available on this server")]
    WebAuthnUnavailable,
    #[error("Unknown auth method '{0}'")]
    UnknownMethod(String),
    #[error("Missing auth method")]
    MissingMethod,
    #[error("Invalid request body")]
    InvalidBody,
    #[error("Not found")]
    WrongVerb,
    /// A callback failed; its message is shown to the client.
    #[error("{0}")]
    Hook(anyhow::Error),
    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

/// Returned by stores when a user insert hits the unique username constraint.
///
/// The handler reports it with the configured `username_taken` message, which
/// covers signups that race past the up-front uniqueness check.
#[derive(Debug, Error)]
#[error("username {0} is already taken")]
pub struct UsernameTaken(pub String);

impl DbAuthError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::WrongVerb => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

/// Replace `${name}` placeholders in a configured error string.
#[must_use]
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (name, value)| {
        acc.replace(&format!("${{{name}}}"), value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn render_substitutes_every_placeholder() {
        assert_eq!(
            render(
                "Incorrect password for ${username}",
                &[("username", "a@b.co")]
            ),
            "Incorrect password for a@b.co"
        );
        assert_eq!(
            render("${field} is required", &[("field", "password")]),
            "password is required"
        );
        assert_eq!(render("no placeholders", &[("field", "x")]), "no placeholders");
    }

    #[test]
    fn status_codes() {
        assert_eq!(
            DbAuthError::UsernameRequired("x".to_string()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(DbAuthError::WrongVerb.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            DbAuthError::Internal(anyhow!("db down")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            DbAuthError::Hook(anyhow!("mail failed")).to_string(),
            "mail failed"
        );
        assert_eq!(
            DbAuthError::Internal(anyhow!("db down")).to_string(),
            "Internal server error"
        );
    }
}
