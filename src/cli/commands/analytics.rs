use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_ANALYTICS_HOST: &str = "analytics-host";
pub const ARG_ANALYTICS_API_KEY: &str = "analytics-api-key";

#[derive(Debug)]
pub struct Options {
    pub host: String,
    pub api_key: Option<SecretString>,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        Self {
            host: matches
                .get_one::<String>(ARG_ANALYTICS_HOST)
                .cloned()
                .unwrap_or_default(),
            api_key: matches
                .get_one::<String>(ARG_ANALYTICS_API_KEY)
                .map(|key| SecretString::from(key.clone())),
        }
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ANALYTICS_HOST)
                .long("analytics-host")
                .help("Analytics capture host")
                .env("DBAUTH_ANALYTICS_HOST")
                .default_value("https://us.i.posthog.com"),
        )
        .arg(
            Arg::new(ARG_ANALYTICS_API_KEY)
                .long("analytics-api-key")
                .help("Analytics project key; events are only logged when unset")
                .env("DBAUTH_ANALYTICS_API_KEY")
                .hide_env_values(true),
        )
}
