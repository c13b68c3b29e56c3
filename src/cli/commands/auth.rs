use anyhow::{Context, Result, anyhow};
use clap::{Arg, ArgMatches, Command};
use url::Url;

use crate::auth::{DEFAULT_COOKIE_NAME, DEFAULT_DEV_BASE_URL, Environment, PlanIds};

pub const ARG_ENVIRONMENT: &str = "environment";
pub const ARG_BASE_URL: &str = "base-url";
pub const ARG_COOKIE_NAME: &str = "cookie-name";
pub const ARG_PLAN_ID_DEVELOPMENT: &str = "plan-id-development";
pub const ARG_PLAN_ID_PRODUCTION: &str = "plan-id-production";
pub const ARG_TRIAL_DAYS: &str = "trial-days";

#[derive(Debug)]
pub struct Options {
    pub environment: Environment,
    pub base_url: Url,
    pub cookie_name: String,
    pub plan_ids: PlanIds,
    pub trial_days: u32,
}

impl Options {
    /// # Errors
    /// Returns an error if the environment or base URL is invalid, or if the
    /// base URL is missing in production.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let environment = matches
            .get_one::<String>(ARG_ENVIRONMENT)
            .map_or(Ok(Environment::Development), |value| value.parse())?;

        let base_url = match matches.get_one::<String>(ARG_BASE_URL) {
            Some(url) => Url::parse(url).with_context(|| format!("invalid --{ARG_BASE_URL}: {url}"))?,
            None if environment.is_production() => {
                return Err(anyhow!(
                    "missing required argument: --{ARG_BASE_URL} (required in production)"
                ));
            }
            None => Url::parse(DEFAULT_DEV_BASE_URL)?,
        };

        let defaults = PlanIds::default();
        let plan_ids = PlanIds {
            development: matches
                .get_one::<String>(ARG_PLAN_ID_DEVELOPMENT)
                .cloned()
                .unwrap_or(defaults.development),
            production: matches
                .get_one::<String>(ARG_PLAN_ID_PRODUCTION)
                .cloned()
                .unwrap_or(defaults.production),
        };

        Ok(Self {
            environment,
            base_url,
            cookie_name: matches
                .get_one::<String>(ARG_COOKIE_NAME)
                .cloned()
                .unwrap_or_else(|| DEFAULT_COOKIE_NAME.to_string()),
            plan_ids,
            trial_days: matches.get_one::<u32>(ARG_TRIAL_DAYS).copied().unwrap_or(14),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ENVIRONMENT)
                .long("environment")
                .help("Deployment environment; production marks the session cookie Secure")
                .env("DBAUTH_ENVIRONMENT")
                .default_value("development")
                .value_parser(["development", "production"]),
        )
        .arg(
            Arg::new(ARG_BASE_URL)
                .long("base-url")
                .help("Web app base URL used in emails and for CORS")
                .long_help(
                    "Web app base URL used in reset links and welcome emails, and as the only allowed CORS origin. Defaults to http://localhost:8910 in development.",
                )
                .env("DBAUTH_BASE_URL"),
        )
        .arg(
            Arg::new(ARG_COOKIE_NAME)
                .long("cookie-name")
                .help("Session cookie name")
                .env("DBAUTH_COOKIE_NAME")
                .default_value(DEFAULT_COOKIE_NAME),
        )
        .arg(
            Arg::new(ARG_PLAN_ID_DEVELOPMENT)
                .long("plan-id-development")
                .help("Trial plan id used in development")
                .env("DBAUTH_PLAN_ID_DEVELOPMENT")
                .default_value("plan_trial_development"),
        )
        .arg(
            Arg::new(ARG_PLAN_ID_PRODUCTION)
                .long("plan-id-production")
                .help("Trial plan id used in production")
                .env("DBAUTH_PLAN_ID_PRODUCTION")
                .default_value("plan_trial_production"),
        )
        .arg(
            Arg::new(ARG_TRIAL_DAYS)
                .long("trial-days")
                .help("Length of the trial started at signup")
                .env("DBAUTH_TRIAL_DAYS")
                .default_value("14")
                .value_parser(clap::value_parser!(u32)),
        )
}
