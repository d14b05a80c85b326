//! Map validated CLI arguments to the action to run.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{auth, upstream};
use anyhow::Result;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or empty.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);

    let auth_opts = auth::Options::parse(matches)?;
    let upstream_opts = upstream::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        frontend_base_url: auth_opts.frontend_base_url,
        verification_code_ttl_seconds: auth_opts.verification_code_ttl_seconds,
        store_cleanup_seconds: auth_opts.store_cleanup_seconds,
        upstream: upstream_opts,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands::{self, tests::required_args};
    use secrecy::ExposeSecret;

    #[test]
    fn builds_server_action() {
        temp_env::with_vars(
            [
                ("HEARTS_PORT", None::<&str>),
                ("HEARTS_FRONTEND_BASE_URL", None),
            ],
            || {
                let mut args = required_args();
                args.extend([
                    "--frontend-base-url".to_string(),
                    "https://hearts.cards/".to_string(),
                ]);
                let matches = commands::new().get_matches_from(args);
                let result = handler(&matches);
                assert!(result.is_ok());
                if let Ok(Action::Server(args)) = result {
                    assert_eq!(args.port, 8080);
                    assert_eq!(args.frontend_base_url, "https://hearts.cards");
                    assert_eq!(args.upstream.backend.url, "https://project.backend.test");
                    assert_eq!(
                        args.upstream.payments_webhook_secret.expose_secret(),
                        "whsec_test"
                    );
                    assert_eq!(args.upstream.content_text_model, "gpt-4o-mini");
                }
            },
        );
    }

    #[test]
    fn missing_backend_url_fails() {
        temp_env::with_vars([("HEARTS_BACKEND_URL", None::<&str>)], || {
            let args: Vec<String> = required_args()
                .into_iter()
                .filter(|arg| arg != "--backend-url" && arg != "https://project.backend.test")
                .collect();
            let matches = commands::new().get_matches_from(args);
            let result = handler(&matches);
            assert!(result.is_err());
            if let Err(err) = result {
                assert!(err
                    .to_string()
                    .contains("missing required argument: --backend-url"));
            }
        });
    }

    #[test]
    fn empty_secret_from_env_fails() {
        temp_env::with_vars([("HEARTS_PAYMENTS_WEBHOOK_SECRET", Some(""))], || {
            let args: Vec<String> = required_args()
                .into_iter()
                .filter(|arg| arg != "--payments-webhook-secret" && arg != "whsec_test")
                .collect();
            let matches = commands::new().get_matches_from(args);
            let result = handler(&matches);
            assert!(result.is_err());
        });
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let matches = commands::new().get_matches_from(required_args());
        let rendered = format!("{:?}", handler(&matches).ok());
        assert!(!rendered.contains("whsec_test"));
        assert!(!rendered.contains("sk_test"));
        assert!(rendered.contains("***"));
    }
}
