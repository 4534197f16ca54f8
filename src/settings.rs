use miette::{IntoDiagnostic, Result};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    pub server: Server,
    pub policy: Policy,
    /// Accounts served by the built-in credential provider
    #[serde(default)]
    pub users: Vec<UserEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub host: String,
    pub port: u16,
    /// Base for `Location` headers, e.g. https://api.example.com
    pub public_base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    /// A `.kdl` file or a directory of `.kdl` files
    pub path: PathBuf,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct UserEntry {
    pub username: String,
    /// argon2 PHC string, see `warden hash-password`
    pub password_hash: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl std::fmt::Debug for UserEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserEntry")
            .field("username", &self.username)
            .field("roles", &self.roles)
            .finish_non_exhaustive()
    }
}

impl Default for Server {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            public_base_url: None,
        }
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            path: PathBuf::from("policies"),
        }
    }
}

impl Settings {
    pub fn load(path: &str) -> Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("server.host", Server::default().host)
            .into_diagnostic()?
            .set_default("server.port", Server::default().port)
            .into_diagnostic()?
            .set_default(
                "policy.path",
                Policy::default().path.to_string_lossy().to_string(),
            )
            .into_diagnostic()?;

        // Optional file
        if Path::new(path).exists() {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Environment overrides: WARDEN__SERVER__PORT=9090, etc.
        builder = builder.add_source(config::Environment::with_prefix("WARDEN").separator("__"));

        let cfg = builder.build().into_diagnostic()?;
        let mut s: Settings = cfg.try_deserialize().into_diagnostic()?;

        if s.policy.path.is_relative() {
            s.policy.path = std::env::current_dir()
                .into_diagnostic()?
                .join(&s.policy.path);
        }

        Ok(s)
    }

    /// Base URL used to build canonical resource addresses.
    pub fn public_base_url(&self) -> String {
        if let Some(base) = &self.server.public_base_url {
            base.trim_end_matches('/').to_string()
        } else {
            format!("http://{}:{}", self.server.host, self.server.port)
        }
    }

    /// True when `Location` headers would fall back to a wildcard bind
    /// address such as `0.0.0.0` that clients cannot reach.
    pub fn has_unroutable_base_url(&self) -> bool {
        self.server.public_base_url.is_none()
            && self
                .server
                .host
                .parse::<IpAddr>()
                .map(|ip| ip.is_unspecified())
                .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    // Settings::load reads process-wide environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_settings_load_defaults() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("nonexistent.toml");

        let settings = Settings::load(config_path.to_str().unwrap())
            .expect("Failed to load settings");

        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.port, 8080);
        assert!(settings.policy.path.ends_with("policies"));
        assert!(settings.users.is_empty());
    }

    #[test]
    fn test_settings_load_from_file() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("test_config.toml");

        let config_content = r#"
[server]
host = "127.0.0.1"
port = 9090
public_base_url = "https://api.example.com/"

[policy]
path = "/etc/warden/policies"

[[users]]
username = "user"
password_hash = "$argon2id$v=19$m=8,t=1,p=1$c2FsdHNhbHQ$aGFzaA"
roles = ["USER"]

[[users]]
username = "admin"
password_hash = "$argon2id$v=19$m=8,t=1,p=1$c2FsdHNhbHQ$aGFzaA"
roles = ["USER", "ADMIN"]
"#;
        fs::write(&config_path, config_content).expect("Failed to write config");

        let settings = Settings::load(config_path.to_str().unwrap())
            .expect("Failed to load settings");

        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 9090);
        assert_eq!(settings.policy.path, PathBuf::from("/etc/warden/policies"));
        assert_eq!(settings.users.len(), 2);
        assert_eq!(settings.users[1].roles, vec!["USER", "ADMIN"]);
        assert_eq!(settings.public_base_url(), "https://api.example.com");
    }

    #[test]
    fn test_settings_env_override() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("test_config.toml");

        fs::write(
            &config_path,
            r#"
[server]
host = "127.0.0.1"
port = 8080
"#,
        )
        .expect("Failed to write config");

        env::set_var("WARDEN__SERVER__PORT", "9999");

        let settings = Settings::load(config_path.to_str().unwrap())
            .expect("Failed to load settings");

        assert_eq!(settings.server.port, 9999);

        env::remove_var("WARDEN__SERVER__PORT");
    }

    #[test]
    fn test_public_base_url_fallback() {
        let mut settings = Settings::default();
        settings.server.host = "localhost".to_string();
        settings.server.port = 3000;

        assert_eq!(settings.public_base_url(), "http://localhost:3000");
    }

    #[test]
    fn test_wildcard_bind_host_is_flagged() {
        let mut settings = Settings::default();
        assert!(settings.has_unroutable_base_url());

        settings.server.host = "::".to_string();
        assert!(settings.has_unroutable_base_url());

        settings.server.host = "127.0.0.1".to_string();
        assert!(!settings.has_unroutable_base_url());

        settings.server.host = "0.0.0.0".to_string();
        settings.server.public_base_url = Some("https://api.example.com".to_string());
        assert!(!settings.has_unroutable_base_url());
    }

    #[test]
    fn test_user_entry_debug_hides_hash() {
        let entry = UserEntry {
            username: "admin".into(),
            password_hash: "$argon2id$secret".into(),
            roles: vec!["ADMIN".into()],
        };
        assert!(!format!("{entry:?}").contains("argon2"));
    }
}
