//! Map parsed CLI arguments to an [`Action`].

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{ARG_APPLY_SCHEMA, ARG_DSN, ARG_PORT, analytics, auth, email, webauthn};
use anyhow::{Context, Result, anyhow};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8911);
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .cloned()
        .context("missing required argument: --dsn")?;

    let auth_opts = auth::Options::parse(matches)?;
    let email_opts = email::Options::parse(matches)?;
    // The log-only sender would write live reset links to the logs.
    if auth_opts.environment.is_production() && email_opts.api_key.is_none() {
        return Err(anyhow!(
            "missing required argument: --{} (required in production)",
            email::ARG_EMAIL_API_KEY
        ));
    }
    let analytics_opts = analytics::Options::parse(matches);
    let webauthn_opts = webauthn::Options::parse(matches);

    Ok(Action::Server(Args {
        port,
        dsn,
        apply_schema: matches.get_flag(ARG_APPLY_SCHEMA),
        environment: auth_opts.environment,
        base_url: auth_opts.base_url,
        cookie_name: auth_opts.cookie_name,
        plan_ids: auth_opts.plan_ids,
        trial_days: auth_opts.trial_days,
        webauthn_enabled: webauthn_opts.enabled,
        webauthn_name: webauthn_opts.name,
        email_api_key: email_opts.api_key,
        email_from: email_opts.from,
        email_outbox_poll_seconds: email_opts.poll_seconds,
        email_outbox_batch_size: email_opts.batch_size,
        email_outbox_max_attempts: email_opts.max_attempts,
        email_outbox_backoff_base_seconds: email_opts.backoff_base_seconds,
        email_outbox_backoff_max_seconds: email_opts.backoff_max_seconds,
        analytics_host: analytics_opts.host,
        analytics_api_key: analytics_opts.api_key,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Environment;

    const DSN: &str = "postgres://user@localhost:5432/dbauth";

    #[test]
    fn builds_server_action() {
        temp_env::with_vars(
            [
                ("DBAUTH_DSN", Some(DSN)),
                ("DBAUTH_PORT", None),
                ("DBAUTH_ENVIRONMENT", None),
                ("DBAUTH_BASE_URL", None),
                ("DBAUTH_EMAIL_API_KEY", None),
                ("DBAUTH_ANALYTICS_API_KEY", None),
            ],
            || {
                let matches = crate::cli::commands::new().get_matches_from(vec!["dbauth"]);
                let action = handler(&matches);
                assert!(action.is_ok());
                if let Ok(Action::Server(args)) = action {
                    assert_eq!(args.port, 8911);
                    assert_eq!(args.dsn, DSN);
                    assert_eq!(args.environment, Environment::Development);
                    assert_eq!(args.base_url.as_str(), "http://localhost:8910/");
                    assert!(args.analytics_api_key.is_none());
                    assert!(!args.webauthn_enabled);
                }
            },
        );
    }

    #[test]
    fn production_without_email_api_key_fails() {
        temp_env::with_vars(
            [
                ("DBAUTH_DSN", Some(DSN)),
                ("DBAUTH_ENVIRONMENT", Some("production")),
                ("DBAUTH_BASE_URL", Some("https://app.example.com")),
                ("DBAUTH_EMAIL_API_KEY", None),
            ],
            || {
                let matches = crate::cli::commands::new().get_matches_from(vec!["dbauth"]);
                let result = handler(&matches);
                assert!(result.is_err());
                if let Err(err) = result {
                    assert!(
                        err.to_string()
                            .contains("missing required argument: --email-api-key")
                    );
                }
            },
        );
    }

    #[test]
    fn production_with_email_api_key_builds() {
        temp_env::with_vars(
            [
                ("DBAUTH_DSN", Some(DSN)),
                ("DBAUTH_ENVIRONMENT", Some("production")),
                ("DBAUTH_BASE_URL", Some("https://app.example.com")),
                ("DBAUTH_EMAIL_API_KEY", Some("re_test")),
            ],
            || {
                let matches = crate::cli::commands::new().get_matches_from(vec!["dbauth"]);
                let action = handler(&matches);
                assert!(action.is_ok());
                if let Ok(Action::Server(args)) = action {
                    assert_eq!(args.environment, Environment::Production);
                    assert!(args.email_api_key.is_some());
                }
            },
        );
    }

    #[test]
    fn production_without_base_url_fails() {
        temp_env::with_vars(
            [
                ("DBAUTH_DSN", Some(DSN)),
                ("DBAUTH_ENVIRONMENT", Some("production")),
                ("DBAUTH_BASE_URL", None),
            ],
            || {
                let matches = crate::cli::commands::new().get_matches_from(vec!["dbauth"]);
                let result = handler(&matches);
                assert!(result.is_err());
                if let Err(err) = result {
                    assert!(err.to_string().contains("missing required argument: --base-url"));
                }
            },
        );
    }
}
