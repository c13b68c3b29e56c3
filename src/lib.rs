//! # dbauth (database-backed authentication service)
//!
//! `dbauth` serves sign-up, login, logout and password reset from a single
//! `/auth` endpoint backed by Postgres.
//!
//! ## Flows
//!
//! The [`dbauth`] module is the generic handler: it dispatches on the request's
//! `method`, checks credentials and reset tokens, and issues an opaque session
//! cookie (`HttpOnly`, `Path=/`, `SameSite=Strict`, `Secure` in production).
//!
//! ## Application hooks
//!
//! The [`auth`] module configures that handler for this application: column
//! mapping, cookie attributes, client-visible error strings, and the callbacks.
//! A signup creates an account with its own API key and an `owner` user, then
//! sends a welcome email, starts a trial subscription and records an analytics
//! event without making the client wait for any of them.
//!
//! ## Outbound services
//!
//! Email goes through a Postgres outbox drained by a background worker.
//! Analytics events go to an HTTP capture endpoint through a process-wide
//! client. Both fall back to log-only implementations when not configured.

pub mod api;
pub mod auth;
pub mod cli;
pub mod dbauth;
pub mod models;
pub mod services;
pub mod storage;

use std::{future::Future, pin::Pin};

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

/// Boxed future returned by the object-safe storage and service traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send + 'a>>;
