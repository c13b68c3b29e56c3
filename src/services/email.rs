//! Templated email: enqueueing, rendering and delivery.
//!
//! Auth callbacks never talk to an email provider directly. `OutboxMailer`
//! writes a row into `email_outbox`; a background worker claims due rows
//! with `FOR UPDATE SKIP LOCKED`, marks them `sending` under a lease and
//! commits before rendering the template and handing it to an `EmailSender`.
//! Failed deliveries are retried with exponential backoff and jitter until
//! `max_attempts`, then the row is marked `failed`.
//!
//! `LogEmailSender` is the local-development sender. `ResendEmailSender`
//! delivers through the Resend HTTP API when an API key is configured.

use anyhow::{Context, Result, anyhow};
use rand::Rng;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;
use sqlx::{PgPool, Row};
use std::{fmt, sync::Arc, time::Duration};
use tokio::time::sleep;
use tracing::{Instrument, debug, error, info, info_span};
use uuid::Uuid;

use crate::{APP_USER_AGENT, BoxFuture};

const RESEND_API_URL: &str = "https://api.resend.com/emails";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmailTemplate {
    Welcome,
    Reset,
}

impl EmailTemplate {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Welcome => "welcome",
            Self::Reset => "reset",
        }
    }

    fn parse(name: &str) -> Option<Self> {
        match name {
            "welcome" => Some(Self::Welcome),
            "reset" => Some(Self::Reset),
            _ => None,
        }
    }
}

impl fmt::Display for EmailTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request to send one templated email.
#[derive(Clone, Debug, PartialEq)]
pub struct EmailRequest {
    pub to: String,
    pub template: EmailTemplate,
    /// Template variables, e.g. `name` and `url`.
    pub payload: Value,
}

/// Send a templated email.
pub trait Mailer: Send + Sync {
    fn send_email(&self, request: EmailRequest) -> BoxFuture<'_, ()>;
}

/// Mailer that enqueues into the `email_outbox` table.
#[derive(Clone, Debug)]
pub struct OutboxMailer {
    pool: PgPool,
}

impl OutboxMailer {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl Mailer for OutboxMailer {
    fn send_email(&self, request: EmailRequest) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let payload_text =
                serde_json::to_string(&request.payload).context("failed to serialize payload")?;
            let query = r"
                INSERT INTO email_outbox (to_email, template, payload_json)
                VALUES ($1, $2, $3::jsonb)
            ";
            let span = info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "INSERT",
                db.statement = query
            );
            sqlx::query(query)
                .bind(&request.to)
                .bind(request.template.as_str())
                .bind(payload_text)
                .execute(&self.pool)
                .instrument(span)
                .await
                .context("failed to insert email outbox row")?;
            Ok(())
        })
    }
}

/// An outbox row ready for delivery.
#[derive(Clone, Debug)]
pub struct EmailMessage {
    pub to_email: String,
    pub template: String,
    pub payload_json: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub text: String,
}

/// Render the subject and plain-text body of an outbox message.
///
/// # Errors
/// Returns an error for unknown templates or payloads that are not JSON objects.
pub fn render_email(message: &EmailMessage) -> Result<RenderedEmail> {
    let template = EmailTemplate::parse(&message.template)
        .ok_or_else(|| anyhow!("unknown email template: {}", message.template))?;
    let payload: Value =
        serde_json::from_str(&message.payload_json).context("invalid email payload")?;
    let var = |name: &str| payload.get(name).and_then(Value::as_str).unwrap_or_default();

    let rendered = match template {
        EmailTemplate::Welcome => {
            let name = var("name");
            let greeting = if name.is_empty() {
                "Hi,".to_string()
            } else {
                format!("Hi {name},")
            };
            RenderedEmail {
                subject: "Welcome aboard".to_string(),
                text: format!(
                    "{greeting}\n\nThanks for signing up. Your trial has started and your account is ready at {}.\n",
                    var("url")
                ),
            }
        }
        EmailTemplate::Reset => RenderedEmail {
            subject: "Reset your password".to_string(),
            text: format!(
                "We received a request to reset the password for {}.\n\nChoose a new password here:\n{}\n\nIf you did not ask for this, you can ignore this email.\n",
                message.to_email,
                var("url")
            ),
        },
    };
    Ok(rendered)
}

/// Delivery abstraction used by the outbox worker.
pub trait EmailSender: Send + Sync {
    /// Deliver a message or return an error to schedule a retry.
    fn send<'a>(&'a self, message: &'a EmailMessage) -> BoxFuture<'a, ()>;
}

/// Local dev sender that logs the rendered email instead of sending it.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

impl EmailSender for LogEmailSender {
    fn send<'a>(&'a self, message: &'a EmailMessage) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let rendered = render_email(message)?;
            info!(
                to_email = %message.to_email,
                template = %message.template,
                subject = %rendered.subject,
                body = %rendered.text,
                "email send stub"
            );
            Ok(())
        })
    }
}

#[derive(Serialize)]
struct ResendPayload<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    text: &'a str,
}

pub struct ResendEmailSender {
    client: Client,
    api_key: SecretString,
    from: String,
}

impl ResendEmailSender {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(api_key: SecretString, from: String) -> Result<Self> {
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build email client")?;
        Ok(Self {
            client,
            api_key,
            from,
        })
    }
}

impl EmailSender for ResendEmailSender {
    fn send<'a>(&'a self, message: &'a EmailMessage) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let rendered = render_email(message)?;
            let payload = ResendPayload {
                from: &self.from,
                to: [&message.to_email],
                subject: &rendered.subject,
                text: &rendered.text,
            };
            let response = self
                .client
                .post(RESEND_API_URL)
                .bearer_auth(self.api_key.expose_secret())
                .json(&payload)
                .send()
                .await
                .context("email request failed")?;
            let status = response.status();
            if status.is_success() {
                debug!(to_email = %message.to_email, "email delivered");
                Ok(())
            } else {
                let body = response.text().await.unwrap_or_default();
                Err(anyhow!("email provider returned {status}: {body}"))
            }
        })
    }
}

#[derive(Clone, Copy, Debug)]
pub struct EmailWorkerConfig {
    poll_interval: Duration,
    batch_size: usize,
    max_attempts: u32,
    backoff_base: Duration,
    backoff_max: Duration,
}

impl EmailWorkerConfig {
    /// 5s poll interval, 10 messages per batch, 5 attempts, 5s..5m backoff.
    #[must_use]
    pub fn new() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            batch_size: 10,
            max_attempts: 5,
            backoff_base: Duration::from_secs(5),
            backoff_max: Duration::from_secs(300),
        }
    }

    #[must_use]
    pub fn with_poll_interval_seconds(mut self, seconds: u64) -> Self {
        self.poll_interval = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn with_backoff_base_seconds(mut self, seconds: u64) -> Self {
        self.backoff_base = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_backoff_max_seconds(mut self, seconds: u64) -> Self {
        self.backoff_max = Duration::from_secs(seconds);
        self
    }

    /// Replace zero values with the smallest usable ones.
    #[must_use]
    pub fn normalize(self) -> Self {
        let one_second = Duration::from_secs(1);
        let backoff_base = if self.backoff_base.is_zero() {
            one_second
        } else {
            self.backoff_base
        };
        Self {
            poll_interval: if self.poll_interval.is_zero() {
                one_second
            } else {
                self.poll_interval
            },
            batch_size: self.batch_size.max(1),
            max_attempts: self.max_attempts.max(1),
            backoff_base,
            backoff_max: self.backoff_max.max(backoff_base),
        }
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for EmailWorkerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// How long a claimed row stays invisible to other workers. A row whose
/// worker died mid-batch is picked up again once its lease runs out.
const CLAIM_LEASE: Duration = Duration::from_secs(600);

/// Spawn the background task that drains the outbox.
pub fn spawn_outbox_worker(
    pool: PgPool,
    sender: Arc<dyn EmailSender>,
    config: EmailWorkerConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let config = config.normalize();
        let outbox = PgOutbox { pool };
        loop {
            if let Err(err) = process_outbox_batch(&outbox, sender.as_ref(), &config).await {
                error!("email outbox batch failed: {err:#}");
            }
            sleep(config.poll_interval()).await;
        }
    })
}

/// A row claimed for delivery.
#[derive(Clone, Debug)]
struct ClaimedEmail {
    id: Uuid,
    attempts: u32,
    message: EmailMessage,
}

/// Claiming and bookkeeping of outbox rows. Every call commits on its own.
trait OutboxStore: Send + Sync {
    fn claim_batch(&self, limit: usize, lease: Duration) -> BoxFuture<'_, Vec<ClaimedEmail>>;

    fn record<'a>(&'a self, id: Uuid, status: &'a OutboxStatus) -> BoxFuture<'a, ()>;
}

struct PgOutbox {
    pool: PgPool,
}

impl OutboxStore for PgOutbox {
    fn claim_batch(&self, limit: usize, lease: Duration) -> BoxFuture<'_, Vec<ClaimedEmail>> {
        Box::pin(async move {
            let query = r"
                UPDATE email_outbox
                SET status = 'sending',
                    next_attempt_at = NOW() + ($2 * INTERVAL '1 millisecond')
                WHERE id IN (
                    SELECT id
                    FROM email_outbox
                    WHERE status IN ('pending', 'sending')
                      AND next_attempt_at <= NOW()
                    ORDER BY next_attempt_at ASC, created_at ASC
                    LIMIT $1
                    FOR UPDATE SKIP LOCKED
                )
                RETURNING id, to_email, template, payload_json::text AS payload_json, attempts
            ";
            let span = info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "UPDATE",
                db.statement = query
            );
            let rows = sqlx::query(query)
                .bind(i64::try_from(limit).unwrap_or(1))
                .bind(i64::try_from(lease.as_millis()).unwrap_or(i64::MAX))
                .fetch_all(&self.pool)
                .instrument(span)
                .await
                .context("failed to claim email outbox batch")?;

            Ok(rows
                .into_iter()
                .map(|row| {
                    let attempts: i32 = row.get("attempts");
                    ClaimedEmail {
                        id: row.get("id"),
                        attempts: u32::try_from(attempts).unwrap_or(0),
                        message: EmailMessage {
                            to_email: row.get("to_email"),
                            template: row.get("template"),
                            payload_json: row.get("payload_json"),
                        },
                    }
                })
                .collect())
        })
    }

    fn record<'a>(&'a self, id: Uuid, status: &'a OutboxStatus) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let (query, attempts, error, delay_ms) = match status {
                OutboxStatus::Sent { attempts } => (
                    r"
                        UPDATE email_outbox
                        SET status = 'sent', attempts = $2, last_error = $3,
                            sent_at = NOW(), next_attempt_at = NOW() + ($4 * INTERVAL '1 millisecond')
                        WHERE id = $1
                    ",
                    *attempts,
                    None,
                    0,
                ),
                OutboxStatus::Retry {
                    attempts,
                    error,
                    delay,
                } => (
                    r"
                        UPDATE email_outbox
                        SET status = 'pending', attempts = $2, last_error = $3,
                            next_attempt_at = NOW() + ($4 * INTERVAL '1 millisecond')
                        WHERE id = $1
                    ",
                    *attempts,
                    Some(error.as_str()),
                    i64::try_from(delay.as_millis()).unwrap_or(i64::MAX),
                ),
                OutboxStatus::Failed { attempts, error } => (
                    r"
                        UPDATE email_outbox
                        SET status = 'failed', attempts = $2, last_error = $3,
                            next_attempt_at = NOW() + ($4 * INTERVAL '1 millisecond')
                        WHERE id = $1
                    ",
                    *attempts,
                    Some(error.as_str()),
                    0,
                ),
            };

            let span = info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "UPDATE",
                db.statement = query
            );
            sqlx::query(query)
                .bind(id)
                .bind(i32::try_from(attempts).unwrap_or(i32::MAX))
                .bind(error)
                .bind(delay_ms)
                .execute(&self.pool)
                .instrument(span)
                .await
                .context("failed to update email outbox row")?;
            Ok(())
        })
    }
}

/// Claim one batch, deliver it and record each outcome as soon as it is known.
///
/// Delivery happens after the claim is committed, so no row lock or
/// connection is held across a provider call. A failed status write is
/// logged and does not affect the other rows of the batch.
async fn process_outbox_batch(
    outbox: &dyn OutboxStore,
    sender: &dyn EmailSender,
    config: &EmailWorkerConfig,
) -> Result<usize> {
    let batch = outbox.claim_batch(config.batch_size(), CLAIM_LEASE).await?;
    let claimed = batch.len();

    for email in batch {
        let result = sender.send(&email.message).await;
        let next = next_status(
            email.attempts,
            result.as_ref().err().map(ToString::to_string),
            config,
        );
        if let Err(err) = outbox.record(email.id, &next).await {
            error!(outbox_id = %email.id, "failed to record email outbox status: {err:#}");
        }
    }

    Ok(claimed)
}

/// Row state after one delivery attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
enum OutboxStatus {
    Sent { attempts: u32 },
    Retry { attempts: u32, error: String, delay: Duration },
    Failed { attempts: u32, error: String },
}

fn next_status(attempts: u32, error: Option<String>, config: &EmailWorkerConfig) -> OutboxStatus {
    let attempts = attempts.saturating_add(1);
    match error {
        None => OutboxStatus::Sent { attempts },
        Some(error) if attempts >= config.max_attempts() => {
            OutboxStatus::Failed { attempts, error }
        }
        Some(error) => OutboxStatus::Retry {
            attempts,
            error,
            delay: backoff_delay(attempts, config.backoff_base, config.backoff_max),
        },
    }
}

fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let shift = attempt.saturating_sub(1).min(31);
    let delay = base.checked_mul(1u32 << shift).unwrap_or(max).min(max);
    jitter_delay(delay)
}

/// Pick a delay in `[delay/2, delay]`.
fn jitter_delay(delay: Duration) -> Duration {
    let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
    if delay_ms < 2 {
        return delay;
    }
    let half = delay_ms / 2;
    Duration::from_millis(half + rand::thread_rng().gen_range(0..=half))
}
