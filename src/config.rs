use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::reddit::Credentials;

const DEFAULT_ENV_PREFIX: &str = "REDDIT_VIEWER";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub reddit: RedditConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RedditConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            user_agent: default_user_agent(),
        }
    }
}

impl RedditConfig {
    /// Credential loading failure is fatal at startup: a read-only client
    /// cannot be built without a client id and user agent.
    pub fn credentials(&self) -> Result<Credentials> {
        anyhow::ensure!(
            !self.client_id.trim().is_empty(),
            "config: reddit.client_id is required (set it in {} or via {}_REDDIT__CLIENT_ID)",
            friendly_default_path(),
            DEFAULT_ENV_PREFIX,
        );
        anyhow::ensure!(
            !self.user_agent.trim().is_empty(),
            "config: reddit.user_agent is required"
        );
        Ok(Credentials {
            client_id: self.client_id.trim().to_string(),
            client_secret: self.client_secret.trim().to_string(),
            user_agent: self.user_agent.trim().to_string(),
        })
    }
}

fn default_user_agent() -> String {
    format!("reddit-viewer/{} (terminal client)", crate::VERSION)
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub credentials_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        if path.exists() {
            cfg = merge_config(cfg, read_config_file(path)?);
        }
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            cfg = merge_config(cfg, read_config_file(&default_path)?);
        }
    }

    if let Some(path) = options.credentials_file.as_ref() {
        if path.exists() {
            cfg.reddit = merge_reddit(cfg.reddit, read_credentials_file(path)?);
        }
    } else if let Some(default_path) = default_credentials_path() {
        if default_path.exists() {
            cfg.reddit = merge_reddit(cfg.reddit, read_credentials_file(&default_path)?);
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    cfg = merge_config(cfg, load_env(prefix));

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

/// Plain credentials file: three lines holding the client id, client secret,
/// and user agent, in that order.
fn read_credentials_file(path: &Path) -> Result<RedditConfig> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read credentials file at {}", path.display()))?;
    let mut lines = data.lines().map(str::trim);
    let client_id = lines.next().unwrap_or_default().to_string();
    let client_secret = lines.next().unwrap_or_default().to_string();
    let user_agent = lines.next().unwrap_or_default().to_string();
    anyhow::ensure!(
        !client_id.is_empty(),
        "credentials file {} is missing the client id on line 1",
        path.display()
    );
    Ok(RedditConfig {
        client_id,
        client_secret,
        user_agent,
    })
}

fn merge_config(mut base: Config, other: Config) -> Config {
    base.reddit = merge_reddit(base.reddit, other.reddit);
    base
}

fn merge_reddit(mut base: RedditConfig, other: RedditConfig) -> RedditConfig {
    if !other.client_id.is_empty() {
        base.client_id = other.client_id;
    }
    if !other.client_secret.is_empty() {
        base.client_secret = other.client_secret;
    }
    if !other.user_agent.is_empty() && other.user_agent != default_user_agent() {
        base.user_agent = other.user_agent;
    }
    base
}

fn load_env(prefix: &str) -> Config {
    let upper_prefix = format!("{}_", prefix.to_uppercase());
    let mut cfg = Config::default();

    for (key, value) in env::vars() {
        let Some(stripped) = key.strip_prefix(&upper_prefix) else {
            continue;
        };
        match stripped.to_ascii_lowercase().replace("__", ".").as_str() {
            "reddit.client_id" => cfg.reddit.client_id = value,
            "reddit.client_secret" => cfg.reddit.client_secret = value,
            "reddit.user_agent" => cfg.reddit.user_agent = value,
            _ => {}
        }
    }

    cfg
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("reddit-viewer").join("config.yaml"))
}

fn default_credentials_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("reddit-viewer").join("credentials.txt"))
}

fn friendly_default_path() -> String {
    default_config_path()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "~/.config/reddit-viewer/config.yaml".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_defaults_without_files() {
        let dir = tempdir().unwrap();
        let cfg = load(LoadOptions {
            config_file: Some(dir.path().join("missing.yaml")),
            credentials_file: Some(dir.path().join("missing.txt")),
            env_prefix: Some("REDDIT_VIEWER_TEST_NONE".into()),
        })
        .unwrap();
        assert!(cfg.reddit.client_id.is_empty());
        assert!(cfg.reddit.user_agent.starts_with("reddit-viewer/"));
    }

    #[test]
    fn yaml_config_provides_credentials() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "reddit:\n  client_id: abc\n  client_secret: def\n  user_agent: tester/1.0\n",
        )
        .unwrap();
        let cfg = load(LoadOptions {
            config_file: Some(path),
            credentials_file: Some(dir.path().join("missing.txt")),
            env_prefix: Some("REDDIT_VIEWER_TEST_YAML".into()),
        })
        .unwrap();
        assert_eq!(cfg.reddit.client_id, "abc");
        assert_eq!(cfg.reddit.client_secret, "def");
        assert_eq!(cfg.reddit.user_agent, "tester/1.0");
        let creds = cfg.reddit.credentials().unwrap();
        assert_eq!(creds.client_id, "abc");
    }

    #[test]
    fn three_line_credentials_file_parses() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("credentials.txt");
        fs::write(&path, "id-line\nsecret-line\nagent-line\n").unwrap();
        let cfg = load(LoadOptions {
            config_file: Some(dir.path().join("missing.yaml")),
            credentials_file: Some(path),
            env_prefix: Some("REDDIT_VIEWER_TEST_TXT".into()),
        })
        .unwrap();
        assert_eq!(cfg.reddit.client_id, "id-line");
        assert_eq!(cfg.reddit.client_secret, "secret-line");
        assert_eq!(cfg.reddit.user_agent, "agent-line");
    }

    #[test]
    fn credentials_file_requires_client_id() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("credentials.txt");
        fs::write(&path, "\n\n\n").unwrap();
        let result = load(LoadOptions {
            config_file: Some(dir.path().join("missing.yaml")),
            credentials_file: Some(path),
            env_prefix: Some("REDDIT_VIEWER_TEST_EMPTY".into()),
        });
        assert!(result.is_err());
    }

    #[test]
    fn env_overrides_file_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "reddit:\n  client_id: from-file\n").unwrap();
        env::set_var("REDDIT_VIEWER_TEST_ENV_REDDIT__CLIENT_ID", "from-env");
        let cfg = load(LoadOptions {
            config_file: Some(path),
            credentials_file: Some(dir.path().join("missing.txt")),
            env_prefix: Some("REDDIT_VIEWER_TEST_ENV".into()),
        })
        .unwrap();
        env::remove_var("REDDIT_VIEWER_TEST_ENV_REDDIT__CLIENT_ID");
        assert_eq!(cfg.reddit.client_id, "from-env");
    }

    #[test]
    fn missing_client_id_is_fatal() {
        let cfg = Config::default();
        assert!(cfg.reddit.credentials().is_err());
    }
}
