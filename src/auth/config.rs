use anyhow::{Result, anyhow};
use std::{fmt, str::FromStr, time::Duration};
use url::Url;

use crate::dbauth::{
    AuthFields, CookieOptions, DbAuthOptions, ForgotPasswordErrors, ForgotPasswordOptions,
    LoginErrors, LoginOptions, ResetPasswordErrors, ResetPasswordOptions, SameSite, SignupErrors,
    SignupOptions, WebAuthnCredentialFields, WebAuthnDeviceType, WebAuthnOptions,
};

/// Ten years; logins effectively never expire.
pub const LOGIN_EXPIRES: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 10);
pub const RESET_TOKEN_EXPIRES: Duration = Duration::from_secs(60 * 60 * 24);
pub const WEBAUTHN_EXPIRES: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 10);
pub const WEBAUTHN_TIMEOUT: Duration = Duration::from_secs(60);

pub const DEFAULT_COOKIE_NAME: &str = "session_8911";
pub const DEFAULT_DEV_BASE_URL: &str = "http://localhost:8910";
pub const DEFAULT_TRIAL_DAYS: u32 = 14;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }

    #[must_use]
    pub fn is_production(self) -> bool {
        self == Self::Production
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(anyhow!("unknown environment: {other}")),
        }
    }
}

/// Trial plan id per environment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlanIds {
    pub development: String,
    pub production: String,
}

impl PlanIds {
    #[must_use]
    pub fn for_environment(&self, environment: Environment) -> &str {
        match environment {
            Environment::Development => &self.development,
            Environment::Production => &self.production,
        }
    }
}

impl Default for PlanIds {
    fn default() -> Self {
        Self {
            development: "plan_trial_development".to_string(),
            production: "plan_trial_production".to_string(),
        }
    }
}

/// Application-level auth settings.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    environment: Environment,
    base_url: Url,
    cookie_name: String,
    plan_ids: PlanIds,
    trial_days: u32,
    webauthn_enabled: bool,
    webauthn_name: String,
}

impl AuthConfig {
    #[must_use]
    pub fn new(environment: Environment, base_url: Url) -> Self {
        Self {
            environment,
            base_url,
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            plan_ids: PlanIds::default(),
            trial_days: DEFAULT_TRIAL_DAYS,
            webauthn_enabled: false,
            webauthn_name: env!("CARGO_PKG_NAME").to_string(),
        }
    }

    /// Development config pointing at the local web app.
    ///
    /// # Errors
    /// Never in practice; the default URL is a constant.
    pub fn development() -> Result<Self> {
        Ok(Self::new(
            Environment::Development,
            Url::parse(DEFAULT_DEV_BASE_URL)?,
        ))
    }

    #[must_use]
    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    #[must_use]
    pub fn with_plan_ids(mut self, plan_ids: PlanIds) -> Self {
        self.plan_ids = plan_ids;
        self
    }

    #[must_use]
    pub fn with_trial_days(mut self, days: u32) -> Self {
        self.trial_days = days;
        self
    }

    #[must_use]
    pub fn with_webauthn(mut self, enabled: bool, name: impl Into<String>) -> Self {
        self.webauthn_enabled = enabled;
        self.webauthn_name = name.into();
        self
    }

    #[must_use]
    pub fn environment(&self) -> Environment {
        self.environment
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Trial plan id for the running environment.
    #[must_use]
    pub fn plan_id(&self) -> &str {
        self.plan_ids.for_environment(self.environment)
    }

    #[must_use]
    pub fn trial_days(&self) -> u32 {
        self.trial_days
    }

    /// Origin of the web app, e.g. `https://app.example.com`.
    #[must_use]
    pub fn origin(&self) -> String {
        self.base_url.origin().ascii_serialization()
    }

    /// Link embedded in the password reset email.
    #[must_use]
    pub fn reset_password_url(&self, reset_token: &str) -> Url {
        let mut url = self.base_url.clone();
        url.set_path("/reset-password");
        url.set_query(None);
        url.query_pairs_mut().append_pair("resetToken", reset_token);
        url
    }
}

/// Handler options for this application.
#[must_use]
pub fn auth_options(config: &AuthConfig) -> DbAuthOptions {
    DbAuthOptions {
        auth_fields: AuthFields {
            id: "id".to_string(),
            username: "email".to_string(),
            hashed_password: "hashed_password".to_string(),
            salt: "salt".to_string(),
            reset_token: "reset_token".to_string(),
            reset_token_expires_at: "reset_token_expires_at".to_string(),
            challenge: "webauthn_challenge".to_string(),
        },
        cookie: CookieOptions {
            name: config.cookie_name().to_string(),
            http_only: true,
            path: "/".to_string(),
            same_site: SameSite::Strict,
            secure: config.environment().is_production(),
        },
        forgot_password: ForgotPasswordOptions {
            enabled: true,
            expires: RESET_TOKEN_EXPIRES,
            errors: ForgotPasswordErrors {
                username_not_found: "Username not found".to_string(),
                username_required: "Username is required".to_string(),
            },
        },
        login: LoginOptions {
            enabled: true,
            expires: LOGIN_EXPIRES,
            errors: LoginErrors {
                username_or_password_missing: "Both username and password are required"
                    .to_string(),
                username_not_found: "Username ${username} not found".to_string(),
                incorrect_password: "Incorrect password for ${username}".to_string(),
            },
        },
        reset_password: ResetPasswordOptions {
            enabled: true,
            allow_reuse: true,
            errors: ResetPasswordErrors {
                reset_token_expired: "resetToken is expired".to_string(),
                reset_token_invalid: "resetToken is invalid".to_string(),
                reset_token_required: "resetToken is required".to_string(),
                reused_password: "Must choose a new password".to_string(),
            },
        },
        signup: SignupOptions {
            enabled: true,
            errors: SignupErrors {
                field_missing: "${field} is required".to_string(),
                username_taken: "Username `${username}` already in use".to_string(),
                password_invalid: "Password does not meet the requirements".to_string(),
            },
        },
        webauthn: WebAuthnOptions {
            enabled: config.webauthn_enabled,
            expires: WEBAUTHN_EXPIRES,
            name: config.webauthn_name.clone(),
            domain: config
                .base_url()
                .host_str()
                .unwrap_or("localhost")
                .to_string(),
            origin: config.origin(),
            device_type: WebAuthnDeviceType::Platform,
            timeout: WEBAUTHN_TIMEOUT,
            credential_fields: WebAuthnCredentialFields {
                id: "id".to_string(),
                user_id: "user_id".to_string(),
                public_key: "public_key".to_string(),
                transports: "transports".to_string(),
                counter: "counter".to_string(),
            },
        },
    }
}
