use anyhow::Result;
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_EMAIL_API_KEY: &str = "email-api-key";
pub const ARG_EMAIL_FROM: &str = "email-from";

/// Outbox worker and delivery settings.
#[derive(Debug)]
pub struct Options {
    pub api_key: Option<SecretString>,
    pub from: String,
    pub poll_seconds: u64,
    pub batch_size: usize,
    pub max_attempts: u32,
    pub backoff_base_seconds: u64,
    pub backoff_max_seconds: u64,
}

impl Options {
    /// # Errors
    /// Never fails for matches built by [`with_args`]; kept fallible like the other groups.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        Ok(Self {
            api_key: matches
                .get_one::<String>(ARG_EMAIL_API_KEY)
                .map(|key| SecretString::from(key.clone())),
            from: matches
                .get_one::<String>(ARG_EMAIL_FROM)
                .cloned()
                .unwrap_or_default(),
            poll_seconds: matches
                .get_one::<u64>("email-outbox-poll-seconds")
                .copied()
                .unwrap_or(5),
            batch_size: matches
                .get_one::<usize>("email-outbox-batch-size")
                .copied()
                .unwrap_or(10),
            max_attempts: matches
                .get_one::<u32>("email-outbox-max-attempts")
                .copied()
                .unwrap_or(5),
            backoff_base_seconds: matches
                .get_one::<u64>("email-outbox-backoff-base-seconds")
                .copied()
                .unwrap_or(5),
            backoff_max_seconds: matches
                .get_one::<u64>("email-outbox-backoff-max-seconds")
                .copied()
                .unwrap_or(300),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = command
        .arg(
            Arg::new(ARG_EMAIL_API_KEY)
                .long("email-api-key")
                .help("Resend API key; emails are only logged when unset")
                .env("DBAUTH_EMAIL_API_KEY")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_EMAIL_FROM)
                .long("email-from")
                .help("Sender address for outgoing email")
                .env("DBAUTH_EMAIL_FROM")
                .default_value("no-reply@dbauth.dev"),
        );
    with_outbox_args(command)
}

fn with_outbox_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("email-outbox-poll-seconds")
                .long("email-outbox-poll-seconds")
                .help("Email outbox poll interval in seconds")
                .env("DBAUTH_EMAIL_OUTBOX_POLL_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("email-outbox-batch-size")
                .long("email-outbox-batch-size")
                .help("Email outbox batch size per poll")
                .env("DBAUTH_EMAIL_OUTBOX_BATCH_SIZE")
                .default_value("10")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("email-outbox-max-attempts")
                .long("email-outbox-max-attempts")
                .help("Max attempts before marking an email as failed")
                .env("DBAUTH_EMAIL_OUTBOX_MAX_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("email-outbox-backoff-base-seconds")
                .long("email-outbox-backoff-base-seconds")
                .help("Base delay for email outbox retry backoff")
                .env("DBAUTH_EMAIL_OUTBOX_BACKOFF_BASE_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("email-outbox-backoff-max-seconds")
                .long("email-outbox-backoff-max-seconds")
                .help("Max delay for email outbox retry backoff")
                .env("DBAUTH_EMAIL_OUTBOX_BACKOFF_MAX_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn defaults_without_api_key() {
        temp_env::with_vars(
            [
                ("DBAUTH_EMAIL_API_KEY", None::<&str>),
                ("DBAUTH_EMAIL_OUTBOX_BATCH_SIZE", None),
            ],
            || {
                let matches = with_args(Command::new("dbauth")).get_matches_from(["dbauth"]);
                let options = Options::parse(&matches);
                assert!(options.is_ok());
                if let Ok(options) = options {
                    assert!(options.api_key.is_none());
                    assert_eq!(options.from, "no-reply@dbauth.dev");
                    assert_eq!(options.batch_size, 10);
                    assert_eq!(options.backoff_max_seconds, 300);
                }
            },
        );
    }

    #[test]
    fn api_key_from_env() {
        temp_env::with_var("DBAUTH_EMAIL_API_KEY", Some("re_123"), || {
            let matches = with_args(Command::new("dbauth")).get_matches_from(["dbauth"]);
            let key = Options::parse(&matches).ok().and_then(|options| options.api_key);
            assert_eq!(key.as_ref().map(ExposeSecret::expose_secret), Some("re_123"));
        });
    }
}
