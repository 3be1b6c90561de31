use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Duration,
};

use authrpc::Error;
use serde::{Deserialize, Serialize};

use crate::sessions::MAX_TTL;

/// The file read from the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "auth-demo.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub bindings: BindingsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: "127.0.0.1:9944".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub cookie_name: String,
    pub session_ttl_secs: u64,
    pub secret: String,
    /// username -> password
    pub users: BTreeMap<String, String>,
}

impl AuthConfig {
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        AuthConfig {
            cookie_name: "qubit-auth".to_owned(),
            session_ttl_secs: 3600,
            secret: "the cake is a lie".to_owned(),
            users: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindingsConfig {
    pub dir: PathBuf,
    pub write_on_start: bool,
}

impl Default for BindingsConfig {
    fn default() -> Self {
        BindingsConfig {
            dir: PathBuf::from("./bindings"),
            write_on_start: true,
        }
    }
}

impl Config {
    pub fn parse(text: &str) -> authrpc::Result<Config> {
        let cf: Config = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        cf.validate()?;
        Ok(cf)
    }

    fn validate(&self) -> authrpc::Result<()> {
        if self.auth.cookie_name.is_empty()
            || self.auth.cookie_name.contains(['=', ';', ' '])
        {
            return Err(Error::Config(format!(
                "invalid cookie name {:?}",
                self.auth.cookie_name
            )));
        }
        if self.auth.session_ttl_secs == 0 || self.auth.session_ttl() > MAX_TTL {
            return Err(Error::Config(format!(
                "session_ttl_secs must be between 1 and {}",
                MAX_TTL.as_secs()
            )));
        }
        Ok(())
    }
}

/// Load the configuration. An explicit path must exist; without one, the
/// default file is used if present and built-in defaults otherwise.
pub fn load(path: Option<&Path>) -> authrpc::Result<Config> {
    let (path, required) = match path {
        Some(p) => (p.to_owned(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    };
    match std::fs::read_to_string(&path) {
        Ok(text) => {
            log::debug!("loading config from {}", path.display());
            Config::parse(&text)
                .map_err(|e| Error::Config(format!("failed to parse {}: {e}", path.display())))
        }
        Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => {
            log::debug!("no {DEFAULT_CONFIG_FILE}, using defaults");
            Ok(Config::default())
        }
        Err(e) => Err(Error::Config(format!("failed to load {}: {e}", path.display()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn empty_file_gives_defaults() {
        assert_eq!(Config::parse("").unwrap(), Config::default());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cf = Config::parse(
            r#"
            [server]
            bind = "0.0.0.0:8080"

            [auth]
            session_ttl_secs = 60
            [auth.users]
            alice = "hunter2"
            "#,
        )
        .unwrap();
        assert_eq!(cf.server.bind, "0.0.0.0:8080");
        assert_eq!(cf.auth.cookie_name, "qubit-auth");
        assert_eq!(cf.auth.session_ttl(), Duration::from_secs(60));
        assert_eq!(cf.auth.users.get("alice").map(String::as_str), Some("hunter2"));
        assert_eq!(cf.bindings, BindingsConfig::default());
    }

    #[rstest]
    #[case::empty_cookie_name("[auth]\ncookie_name = \"\"", "invalid cookie name")]
    #[case::cookie_name_with_equals("[auth]\ncookie_name = \"a=b\"", "invalid cookie name")]
    #[case::cookie_name_with_space("[auth]\ncookie_name = \"a b\"", "invalid cookie name")]
    #[case::zero_ttl("[auth]\nsession_ttl_secs = 0", "session_ttl_secs")]
    #[case::ttl_past_a_year("[auth]\nsession_ttl_secs = 31536001", "session_ttl_secs")]
    #[case::ttl_overflowing_instant("[auth]\nsession_ttl_secs = 9223372036854775807", "session_ttl_secs")]
    #[case::wrong_type("[server]\nbind = 9944", "invalid type")]
    fn rejects_invalid_config(#[case] text: &str, #[case] expected: &str) {
        let err = Config::parse(text).unwrap_err();
        assert!(err.to_string().contains(expected), "{err}");
    }

    #[test]
    fn ttl_of_exactly_a_year_is_allowed() {
        let cf = Config::parse("[auth]\nsession_ttl_secs = 31536000").unwrap();
        assert_eq!(cf.auth.session_ttl(), MAX_TTL);
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(Some(&dir.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn loads_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demo.toml");
        std::fs::write(&path, "[bindings]\nwrite_on_start = false\n").unwrap();
        let cf = load(Some(&path)).unwrap();
        assert!(!cf.bindings.write_on_start);
    }
}
