use crate::api::handlers::auth::AuthConfig;
use crate::cli::actions::Action;
use anyhow::{anyhow, Result};
use secrecy::SecretString;

pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let dsn = matches
        .get_one("dsn")
        .map(|s: &String| s.to_string())
        .ok_or_else(|| anyhow!("missing required argument: --dsn"))?;

    // The signing secret is mandatory; refusing to start beats serving
    // unverifiable tokens.
    let signing_secret = matches
        .get_one("signing-secret")
        .map(|s: &String| s.to_string())
        .filter(|s| !s.trim().is_empty())
        .map(SecretString::from)
        .ok_or_else(|| anyhow!("missing or empty signing secret: LECTERN_SIGNING_SECRET"))?;

    let public_url = matches
        .get_one("public-url")
        .map_or_else(|| "http://localhost:8080".to_string(), |s: &String| s.to_string());

    let mut config = AuthConfig::new(public_url);

    if let Some(seconds) = matches.get_one::<i64>("access-token-ttl") {
        config = config.with_access_token_ttl_seconds(*seconds);
    }
    if let Some(seconds) = matches.get_one::<i64>("refresh-token-ttl") {
        config = config.with_refresh_token_ttl_seconds(*seconds);
    }
    if let Some(capacity) = matches.get_one::<u32>("rate-limit-capacity") {
        config = config.with_rate_limit_capacity(*capacity);
    }
    if let Some(seconds) = matches.get_one::<u64>("rate-limit-window") {
        config = config.with_rate_limit_window_seconds(*seconds);
    }
    if let Some(cost) = matches.get_one::<u32>("hash-cost") {
        config = config.with_hash_cost(*cost);
    }

    Ok(Action::Server {
        port: matches.get_one::<u16>("port").copied().unwrap_or(8080),
        dsn,
        signing_secret,
        config,
    })
}

#[cfg(test)]
mod tests {
    use super::handler;
    use crate::cli::{actions::Action, commands};
    use anyhow::Result;
    use secrecy::ExposeSecret;

    #[test]
    fn handler_builds_server_action() -> Result<()> {
        let matches = commands::new().get_matches_from(vec![
            "lectern",
            "--dsn",
            "postgres://localhost/lectern",
            "--signing-secret",
            "secret",
            "--port",
            "9999",
            "--access-token-ttl",
            "300",
            "--rate-limit-capacity",
            "5",
        ]);

        let Action::Server {
            port,
            dsn,
            signing_secret,
            config,
        } = handler(&matches)?;

        assert_eq!(port, 9999);
        assert_eq!(dsn, "postgres://localhost/lectern");
        assert_eq!(signing_secret.expose_secret(), "secret");
        assert_eq!(config.access_token_ttl_seconds(), 300);
        assert_eq!(config.rate_limit_capacity(), 5);
        Ok(())
    }

    #[test]
    fn handler_rejects_empty_signing_secret() {
        let matches = commands::new().get_matches_from(vec![
            "lectern",
            "--dsn",
            "postgres://localhost/lectern",
            "--signing-secret",
            "  ",
        ]);

        assert!(handler(&matches).is_err());
    }
}
