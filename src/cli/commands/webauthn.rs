use clap::{Arg, ArgAction, ArgMatches, Command};

pub const ARG_WEBAUTHN_ENABLED: &str = "webauthn-enabled";
pub const ARG_WEBAUTHN_NAME: &str = "webauthn-name";

#[derive(Debug)]
pub struct Options {
    pub enabled: bool,
    pub name: String,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        Self {
            enabled: matches.get_flag(ARG_WEBAUTHN_ENABLED),
            name: matches
                .get_one::<String>(ARG_WEBAUTHN_NAME)
                .cloned()
                .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string()),
        }
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_WEBAUTHN_ENABLED)
                .long("webauthn-enabled")
                .help("Accept webAuthn* auth methods (ceremonies are not implemented)")
                .env("DBAUTH_WEBAUTHN_ENABLED")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(ARG_WEBAUTHN_NAME)
                .long("webauthn-name")
                .help("Relying party name shown by authenticators")
                .env("DBAUTH_WEBAUTHN_NAME")
                .default_value(env!("CARGO_PKG_NAME")),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_by_default() {
        temp_env::with_var("DBAUTH_WEBAUTHN_ENABLED", None::<&str>, || {
            let matches = with_args(Command::new("dbauth")).get_matches_from(["dbauth"]);
            let options = Options::parse(&matches);
            assert!(!options.enabled);
            assert_eq!(options.name, "dbauth");
        });
    }

    #[test]
    fn enabled_by_flag() {
        temp_env::with_var("DBAUTH_WEBAUTHN_ENABLED", None::<&str>, || {
            let matches = with_args(Command::new("dbauth"))
                .get_matches_from(["dbauth", "--webauthn-enabled"]);
            assert!(Options::parse(&matches).enabled);
        });
    }
}
