use anyhow::{anyhow, bail, Context, Result};
use std::collections::HashMap;
use std::time::Duration;
use tracing::info;

use crate::github::{AuthorAssociation, DEFAULT_API_URL};
use crate::signature::ensure_secret_configured;

const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Clone)]
pub struct Config {
    pub github_token: String,
    pub webhook_secret: String,
    pub port: u16,
    pub ignored_associations: Vec<AuthorAssociation>,
    pub github_api_url: String,
    pub github_timeout: Duration,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("ignored_associations", &self.ignored_associations)
            .field("github_api_url", &self.github_api_url)
            .field("github_timeout", &self.github_timeout)
            .finish_non_exhaustive()
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(std::env::vars().collect())
    }

    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

        let github_token = get("GITHUB_PAT")
            .ok_or_else(|| anyhow!("Missing environment variable: `GITHUB_PAT`"))?
            .to_string();

        let webhook_secret = get("WEBHOOK_SECRET")
            .ok_or_else(|| anyhow!("Missing or invalid environment variable: `WEBHOOK_SECRET`"))?
            .to_string();
        ensure_secret_configured(&webhook_secret)?;

        let port = get("PORT")
            .ok_or_else(|| anyhow!("Missing or invalid environment variable: `PORT`"))?
            .parse::<u16>()
            .context("Missing or invalid environment variable: `PORT`")?;

        let ignored_associations = match get("IGNORED_AUTHOR_ASSOCIATIONS") {
            Some(raw) => parse_ignored_associations(raw)?,
            None => Vec::new(),
        };

        let github_api_url = get("GITHUB_API_URL")
            .unwrap_or(DEFAULT_API_URL)
            .to_string();

        let github_timeout = match get("GITHUB_TIMEOUT_SECS") {
            Some(raw) => {
                let secs: u64 = raw
                    .parse()
                    .with_context(|| format!("Invalid GITHUB_TIMEOUT_SECS '{}'", raw))?;
                if secs == 0 {
                    bail!("GITHUB_TIMEOUT_SECS must be greater than zero");
                }
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        let config = Self {
            github_token,
            webhook_secret,
            port,
            ignored_associations,
            github_api_url,
            github_timeout,
        };
        info!(
            port = config.port,
            ignored = ?config.ignored_associations,
            "Configuration loaded"
        );
        Ok(config)
    }
}

/// Splits on commas or semicolons; entries are trimmed and upper-cased.
pub fn parse_ignored_associations(raw: &str) -> Result<Vec<AuthorAssociation>> {
    let mut out = Vec::new();
    for entry in raw.split([',', ';']).map(str::trim).filter(|e| !e.is_empty()) {
        let assoc: AuthorAssociation = entry
            .parse()
            .context("Invalid IGNORED_AUTHOR_ASSOCIATIONS")?;
        if !out.contains(&assoc) {
            out.push(assoc);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([
            ("GITHUB_PAT".to_string(), "ghp_test".to_string()),
            ("WEBHOOK_SECRET".to_string(), "s3cret".to_string()),
            ("PORT".to_string(), "3000".to_string()),
        ])
    }

    #[test]
    fn loads_minimal_config_with_defaults() {
        let config = Config::from_vars(base_vars()).unwrap();
        assert_eq!(config.port, 3000);
        assert!(config.ignored_associations.is_empty());
        assert_eq!(config.github_api_url, DEFAULT_API_URL);
        assert_eq!(config.github_timeout, Duration::from_secs(10));
    }

    #[test]
    fn rejects_missing_or_invalid_values() {
        for key in ["GITHUB_PAT", "WEBHOOK_SECRET", "PORT"] {
            let mut vars = base_vars();
            vars.remove(key);
            assert!(Config::from_vars(vars).is_err(), "{} should be required", key);
        }

        let mut vars = base_vars();
        vars.insert("PORT".to_string(), "eighty".to_string());
        assert!(Config::from_vars(vars).is_err());

        let mut vars = base_vars();
        vars.insert(
            "WEBHOOK_SECRET".to_string(),
            "$(openssl rand -hex 20)".to_string(),
        );
        assert!(Config::from_vars(vars).is_err());

        let mut vars = base_vars();
        vars.insert("GITHUB_TIMEOUT_SECS".to_string(), "0".to_string());
        assert!(Config::from_vars(vars).is_err());
    }

    #[test]
    fn parses_ignored_associations_with_either_separator() {
        let parsed = parse_ignored_associations("owner, member;collaborator;;").unwrap();
        assert_eq!(
            parsed,
            vec![
                AuthorAssociation::Owner,
                AuthorAssociation::Member,
                AuthorAssociation::Collaborator
            ]
        );
        assert_eq!(
            parse_ignored_associations("MEMBER,member").unwrap(),
            vec![AuthorAssociation::Member]
        );
        assert!(parse_ignored_associations("owner,nobody").is_err());
    }

    #[test]
    fn debug_output_hides_secrets() {
        let config = Config::from_vars(base_vars()).unwrap();
        let printed = format!("{:?}", config);
        assert!(!printed.contains("ghp_test"));
        assert!(!printed.contains("s3cret"));
    }
}
