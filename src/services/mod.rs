//! Outbound collaborators used by the auth hooks.

pub mod analytics;
pub mod email;
pub mod subscriptions;

pub use analytics::{Analytics, AnalyticsEvent, HttpAnalytics, LogAnalytics};
pub use email::{
    EmailMessage, EmailRequest, EmailSender, EmailTemplate, EmailWorkerConfig, LogEmailSender,
    Mailer, OutboxMailer, ResendEmailSender, render_email, spawn_outbox_worker,
};
pub use subscriptions::{NewSubscription, Subscriptions};
