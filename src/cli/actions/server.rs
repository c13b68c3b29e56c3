use crate::{
    api,
    auth::{AuthConfig, Environment, PlanIds},
    services::{
        Analytics, EmailSender, EmailWorkerConfig, HttpAnalytics, LogAnalytics, LogEmailSender,
        ResendEmailSender, analytics,
    },
};
use anyhow::Result;
use secrecy::SecretString;
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub apply_schema: bool,
    pub environment: Environment,
    pub base_url: Url,
    pub cookie_name: String,
    pub plan_ids: PlanIds,
    pub trial_days: u32,
    pub webauthn_enabled: bool,
    pub webauthn_name: String,
    pub email_api_key: Option<SecretString>,
    pub email_from: String,
    pub email_outbox_poll_seconds: u64,
    pub email_outbox_batch_size: usize,
    pub email_outbox_max_attempts: u32,
    pub email_outbox_backoff_base_seconds: u64,
    pub email_outbox_backoff_max_seconds: u64,
    pub analytics_host: String,
    pub analytics_api_key: Option<SecretString>,
}

/// Execute the server action.
/// # Errors
/// Returns an error if an outbound client cannot be built or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let auth_config = AuthConfig::new(args.environment, args.base_url)
        .with_cookie_name(args.cookie_name)
        .with_plan_ids(args.plan_ids)
        .with_trial_days(args.trial_days)
        .with_webauthn(args.webauthn_enabled, args.webauthn_name);

    info!(
        environment = %auth_config.environment(),
        base_url = %auth_config.base_url(),
        plan_id = auth_config.plan_id(),
        "auth configured"
    );

    let email_sender: Arc<dyn EmailSender> = match args.email_api_key {
        Some(api_key) => Arc::new(ResendEmailSender::new(api_key, args.email_from)?),
        None => {
            warn!("no email API key configured; emails will only be logged");
            Arc::new(LogEmailSender)
        }
    };

    let analytics_client: Arc<dyn Analytics> = match args.analytics_api_key {
        Some(api_key) => Arc::new(HttpAnalytics::new(&args.analytics_host, api_key)?),
        None => Arc::new(LogAnalytics),
    };

    let email_config = EmailWorkerConfig::new()
        .with_poll_interval_seconds(args.email_outbox_poll_seconds)
        .with_batch_size(args.email_outbox_batch_size)
        .with_max_attempts(args.email_outbox_max_attempts)
        .with_backoff_base_seconds(args.email_outbox_backoff_base_seconds)
        .with_backoff_max_seconds(args.email_outbox_backoff_max_seconds);

    api::new(api::ServerArgs {
        port: args.port,
        dsn: args.dsn,
        apply_schema: args.apply_schema,
        auth_config,
        email_sender,
        email_config,
        analytics: analytics::init(analytics_client),
    })
    .await
}
