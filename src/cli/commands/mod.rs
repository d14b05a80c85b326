pub mod auth;
pub mod logging;
pub mod upstream;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ColorChoice, Command,
};

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("hearts")
        .about("Greeting card studio API")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("HEARTS_PORT")
                .value_parser(clap::value_parser!(u16)),
        );

    let command = auth::with_args(command);
    let command = upstream::with_args(command);
    logging::with_args(command)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Minimal argv with every required collaborator setting.
    pub(crate) fn required_args() -> Vec<String> {
        [
            "hearts",
            "--backend-url",
            "https://project.backend.test",
            "--backend-anon-key",
            "anon",
            "--backend-service-key",
            "service",
            "--payments-secret-key",
            "sk_test",
            "--payments-webhook-secret",
            "whsec_test",
            "--email-api-key",
            "re_test",
            "--renderer-api-key",
            "bb_test",
            "--address-api-key",
            "lob_test",
            "--content-api-key",
            "sk-test",
            "--fulfillment-url",
            "https://print.test",
            "--fulfillment-api-key",
            "pk_test",
        ]
        .iter()
        .map(ToString::to_string)
        .collect()
    }

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "hearts");
        assert_eq!(
            command.get_about().map(ToString::to_string),
            Some("Greeting card studio API".to_string())
        );
        assert_eq!(
            command.get_version().map(ToString::to_string),
            Some(env!("CARGO_PKG_VERSION").to_string())
        );
    }

    #[test]
    fn test_defaults() {
        temp_env::with_vars(
            [
                ("HEARTS_PORT", None::<&str>),
                ("HEARTS_VERIFICATION_CODE_TTL_SECONDS", None),
                ("HEARTS_STORE_CLEANUP_SECONDS", None),
                ("HEARTS_UPSTREAM_TIMEOUT_SECONDS", None),
                ("HEARTS_PAYMENTS_URL", None),
            ],
            || {
                let matches = new().get_matches_from(required_args());
                assert_eq!(matches.get_one::<u16>("port").copied(), Some(8080));
                assert_eq!(
                    matches
                        .get_one::<u64>(auth::ARG_VERIFICATION_CODE_TTL_SECONDS)
                        .copied(),
                    Some(600)
                );
                assert_eq!(
                    matches
                        .get_one::<u64>(auth::ARG_STORE_CLEANUP_SECONDS)
                        .copied(),
                    Some(60)
                );
                assert_eq!(
                    matches
                        .get_one::<u64>(upstream::ARG_UPSTREAM_TIMEOUT_SECONDS)
                        .copied(),
                    Some(15)
                );
                assert_eq!(
                    matches
                        .get_one::<String>(upstream::ARG_PAYMENTS_URL)
                        .cloned(),
                    Some("https://api.stripe.com".to_string())
                );
            },
        );
    }

    #[test]
    fn test_check_env() {
        temp_env::with_vars(
            [
                ("HEARTS_PORT", Some("443")),
                ("HEARTS_BACKEND_URL", Some("https://env.backend.test")),
                ("HEARTS_VERIFICATION_CODE_TTL_SECONDS", Some("120")),
                ("HEARTS_LOG_LEVEL", Some("info")),
            ],
            || {
                let matches = new().get_matches_from(vec!["hearts"]);
                assert_eq!(matches.get_one::<u16>("port").copied(), Some(443));
                assert_eq!(
                    matches.get_one::<String>(upstream::ARG_BACKEND_URL).cloned(),
                    Some("https://env.backend.test".to_string())
                );
                assert_eq!(
                    matches
                        .get_one::<u64>(auth::ARG_VERIFICATION_CODE_TTL_SECONDS)
                        .copied(),
                    Some(120)
                );
                assert_eq!(
                    matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(),
                    Some(2)
                );
            },
        );
    }

    #[test]
    fn test_check_log_level_env() {
        let levels = ["error", "warn", "info", "debug", "trace"];
        for (index, &level) in levels.iter().enumerate() {
            temp_env::with_vars([("HEARTS_LOG_LEVEL", Some(level))], || {
                let matches = new().get_matches_from(vec!["hearts"]);
                assert_eq!(
                    matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(),
                    u8::try_from(index).ok()
                );
            });
        }
    }

    #[test]
    fn test_check_log_level_verbosity() {
        for index in 0..5 {
            temp_env::with_vars([("HEARTS_LOG_LEVEL", None::<String>)], || {
                let mut args = required_args();
                if index > 0 {
                    args.push(format!("-{}", "v".repeat(index)));
                }

                let matches = new().get_matches_from(args);
                assert_eq!(
                    matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(),
                    u8::try_from(index).ok()
                );
            });
        }
    }

    #[test]
    fn test_zero_ttl_is_rejected() {
        let mut args = required_args();
        args.extend(["--verification-code-ttl-seconds".to_string(), "0".to_string()]);
        let result = new().try_get_matches_from(args);
        assert_eq!(
            result.map_err(|e| e.kind()).err(),
            Some(clap::error::ErrorKind::ValueValidation)
        );
    }

    #[test]
    fn test_ttl_upper_bound() {
        let accepted = |ttl: &str| {
            let mut args = required_args();
            args.extend(["--verification-code-ttl-seconds".to_string(), ttl.to_string()]);
            new().try_get_matches_from(args).is_ok()
        };
        assert!(accepted("86400"));
        assert!(!accepted("86401"));
        assert!(!accepted("18446744073709551615"));
    }

    #[test]
    fn test_secrets_hide_env_values() {
        let command = new();
        let hidden = command
            .get_arguments()
            .filter(|arg| arg.is_hide_env_values_set())
            .count();
        assert_eq!(hidden, 9);
    }

    #[test]
    fn test_validator_log_level() {
        let command = Command::new("t").arg(
            Arg::new("level")
                .long("level")
                .value_parser(logging::validator_log_level()),
        );
        let matches = command
            .clone()
            .try_get_matches_from(["t", "--level", "DEBUG"])
            .map(|m| m.get_one::<u8>("level").copied());
        assert_eq!(matches.ok().flatten(), Some(3));

        let matches = command
            .clone()
            .try_get_matches_from(["t", "--level", "5"])
            .map(|m| m.get_one::<u8>("level").copied());
        assert_eq!(matches.ok().flatten(), Some(5));

        assert!(command
            .try_get_matches_from(["t", "--level", "loud"])
            .is_err());
    }
}
