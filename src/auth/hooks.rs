use anyhow::{Context, Result};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{RngCore, rngs::OsRng};
use serde_json::{Value, json};
use std::{future::Future, sync::Arc};
use tracing::{Instrument, error, info, info_span};
use uuid::Uuid;

use super::config::AuthConfig;
use crate::{
    BoxFuture,
    dbauth::{AuthHooks, SignupInput, SignupResult},
    models::{Account, NewUser, Role, User},
    services::{
        Analytics, AnalyticsEvent, EmailRequest, EmailTemplate, Mailer, NewSubscription,
        Subscriptions,
    },
};

/// Account and user creation used by signup.
pub trait AccountStore: Send + Sync {
    fn create_account<'a>(&'a self, api_key: &'a str) -> BoxFuture<'a, Account>;

    /// Remove an account whose owner could not be created.
    fn delete_account(&self, id: Uuid) -> BoxFuture<'_, ()>;

    fn create_user(&self, user: NewUser) -> BoxFuture<'_, User>;
}

/// New account API key: `key_` followed by 32 random bytes, base64url.
///
/// # Errors
/// Returns an error if the OS random source fails.
pub fn new_api_key() -> Result<String> {
    let mut buf = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut buf)
        .context("failed to generate API key")?;
    Ok(format!("key_{}", URL_SAFE_NO_PAD.encode(buf)))
}

/// Callbacks wired into the auth handler.
#[derive(Clone)]
pub struct AppHooks {
    config: Arc<AuthConfig>,
    accounts: Arc<dyn AccountStore>,
    mailer: Arc<dyn Mailer>,
    subscriptions: Arc<dyn Subscriptions>,
    analytics: Arc<dyn Analytics>,
}

impl AppHooks {
    #[must_use]
    pub fn new(
        config: Arc<AuthConfig>,
        accounts: Arc<dyn AccountStore>,
        mailer: Arc<dyn Mailer>,
        subscriptions: Arc<dyn Subscriptions>,
        analytics: Arc<dyn Analytics>,
    ) -> Self {
        Self {
            config,
            accounts,
            mailer,
            subscriptions,
            analytics,
        }
    }

    /// Welcome email, trial subscription and analytics event for a new user.
    /// None of them is awaited; failures are only logged.
    fn spawn_signup_effects(&self, user: &User) {
        let name = user.name.clone().unwrap_or_default();
        let plan_id = self.config.plan_id().to_string();

        let mailer = Arc::clone(&self.mailer);
        let welcome = EmailRequest {
            to: user.email.clone(),
            template: EmailTemplate::Welcome,
            payload: json!({ "name": name, "url": self.config.base_url().as_str() }),
        };
        spawn_effect(
            info_span!("signup.welcome_email", user_id = %user.id),
            async move { mailer.send_email(welcome).await },
        );

        let subscriptions = Arc::clone(&self.subscriptions);
        let subscription = NewSubscription {
            account_id: user.account_id,
            plan_id: plan_id.clone(),
            trial_days: self.config.trial_days(),
        };
        spawn_effect(
            info_span!("signup.subscription", account_id = %user.account_id),
            async move {
                let id = subscriptions.create_subscription(subscription).await?;
                info!(subscription_id = %id, "trial subscription created");
                Ok(())
            },
        );

        let analytics = Arc::clone(&self.analytics);
        let event = AnalyticsEvent::new(user.email.clone(), "signup")
            .property("email", user.email.clone())
            .property("name", Value::String(name))
            .property("plan", plan_id)
            .group("account", user.account_id.to_string());
        spawn_effect(
            info_span!("signup.analytics", user_id = %user.id),
            async move { analytics.capture(event).await },
        );
    }
}

fn spawn_effect<F>(span: tracing::Span, effect: F)
where
    F: Future<Output = Result<()>> + Send + 'static,
{
    tokio::spawn(
        async move {
            if let Err(err) = effect.await {
                error!("signup side effect failed: {err:#}");
            }
        }
        .instrument(span),
    );
}

impl AuthHooks for AppHooks {
    fn forgot_password<'a>(&'a self, user: User, reset_token: &'a str) -> BoxFuture<'a, User> {
        Box::pin(async move {
            let url = self.config.reset_password_url(reset_token);
            self.mailer
                .send_email(EmailRequest {
                    to: user.email.clone(),
                    template: EmailTemplate::Reset,
                    payload: json!({
                        "name": user.name.clone().unwrap_or_default(),
                        "url": url.as_str(),
                    }),
                })
                .await
                .context("failed to send password reset email")?;
            Ok(user)
        })
    }

    fn login(&self, user: User) -> BoxFuture<'_, User> {
        Box::pin(async move { Ok(user) })
    }

    fn reset_password<'a>(&'a self, _user: &'a User) -> BoxFuture<'a, bool> {
        Box::pin(async { Ok(true) })
    }

    fn signup(&self, input: SignupInput) -> BoxFuture<'_, SignupResult> {
        Box::pin(async move {
            let api_key = new_api_key()?;
            let account = self.accounts.create_account(&api_key).await?;

            let name = input
                .user_attributes
                .get("name")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string);
            let role = input
                .user_attributes
                .get("role")
                .and_then(Value::as_str)
                .and_then(|role| role.parse::<Role>().ok())
                .unwrap_or_default();

            let created = self
                .accounts
                .create_user(NewUser {
                    email: input.username,
                    hashed_password: input.hashed_password,
                    salt: input.salt,
                    name,
                    account_id: account.id,
                    role,
                })
                .await;
            let user = match created {
                Ok(user) => user,
                Err(err) => {
                    if let Err(cleanup) = self.accounts.delete_account(account.id).await {
                        error!(account_id = %account.id, "failed to remove orphaned account: {cleanup:#}");
                    }
                    return Err(err);
                }
            };
            info!(user_id = %user.id, account_id = %account.id, "account created");

            self.spawn_signup_effects(&user);
            Ok(SignupResult::User(user))
        })
    }

    fn validate_password(&self, _password: &str) -> bool {
        true
    }
}
