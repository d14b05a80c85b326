use clap::{Arg, ArgMatches, Command};

pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";
pub const ARG_VERIFICATION_CODE_TTL_SECONDS: &str = "verification-code-ttl-seconds";
pub const ARG_STORE_CLEANUP_SECONDS: &str = "store-cleanup-seconds";

/// Codes live at most one day.
pub const MAX_VERIFICATION_CODE_TTL_SECONDS: u64 = 86_400;

#[derive(Debug, Clone)]
pub struct Options {
    pub frontend_base_url: String,
    pub verification_code_ttl_seconds: u64,
    pub store_cleanup_seconds: u64,
}

impl Options {
    /// Parse auth flow arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the frontend URL is empty.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let frontend_base_url = match matches.get_one::<String>(ARG_FRONTEND_BASE_URL) {
            Some(value) if !value.trim().is_empty() => value.trim_end_matches('/').to_string(),
            _ => anyhow::bail!("missing required argument: --{ARG_FRONTEND_BASE_URL}"),
        };

        Ok(Self {
            frontend_base_url,
            verification_code_ttl_seconds: matches
                .get_one::<u64>(ARG_VERIFICATION_CODE_TTL_SECONDS)
                .copied()
                .unwrap_or(600),
            store_cleanup_seconds: matches
                .get_one::<u64>(ARG_STORE_CLEANUP_SECONDS)
                .copied()
                .unwrap_or(60),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Frontend base URL, used for CORS and OAuth redirects")
                .env("HEARTS_FRONTEND_BASE_URL")
                .default_value("http://localhost:3000"),
        )
        .arg(
            Arg::new(ARG_VERIFICATION_CODE_TTL_SECONDS)
                .long(ARG_VERIFICATION_CODE_TTL_SECONDS)
                .help("Lifetime of emailed verification codes in seconds")
                .env("HEARTS_VERIFICATION_CODE_TTL_SECONDS")
                .default_value("600")
                .value_parser(
                    clap::value_parser!(u64).range(1..=MAX_VERIFICATION_CODE_TTL_SECONDS),
                ),
        )
        .arg(
            Arg::new(ARG_STORE_CLEANUP_SECONDS)
                .long(ARG_STORE_CLEANUP_SECONDS)
                .help("Interval between expired-entry sweeps of the in-memory stores")
                .env("HEARTS_STORE_CLEANUP_SECONDS")
                .default_value("60")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}
