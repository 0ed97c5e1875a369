use anyhow::Result;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs;

fn harden_secret_file_permissions(path: &str) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ServerConfig {
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".into(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://./data/duet.db?mode=rwc".into(),
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    #[serde(default = "default_jwt_expiry")]
    pub jwt_expiry_seconds: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: generate_random_hex(64),
            jwt_expiry_seconds: default_jwt_expiry(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct GatewayConfig {
    /// Seconds an unauthenticated socket may stay open.
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: u64,
    /// Worker id baked into generated message ids; give every process
    /// behind a shared database its own value.
    #[serde(default)]
    pub worker_id: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            handshake_timeout_secs: default_handshake_timeout(),
            worker_id: 0,
        }
    }
}

fn default_max_connections() -> u32 {
    5
}

fn default_jwt_expiry() -> u64 {
    86_400
}

fn default_handshake_timeout() -> u64 {
    30
}

/// Render the default config as a commented TOML file so a fresh
/// install documents itself.
fn generate_config_template(config: &Config) -> String {
    format!(
        r#"# duet server configuration
# Every value here can be overridden with a DUET_* environment variable.

[server]
# Address and port to listen on (DUET_BIND_ADDRESS)
bind_address = "{bind_address}"

[database]
# SQLite database location (DUET_DATABASE_URL)
url = "{database_url}"
# Connection pool size (DUET_DATABASE_MAX_CONNECTIONS)
max_connections = {max_connections}

[auth]
# Secret used to sign session tokens; generated at first start.
# Keep this private (DUET_JWT_SECRET).
jwt_secret = "{jwt_secret}"
# Token lifetime in seconds (DUET_JWT_EXPIRY_SECONDS)
jwt_expiry_seconds = {jwt_expiry_seconds}

[gateway]
# Seconds an unauthenticated socket may stay open (DUET_HANDSHAKE_TIMEOUT_SECS)
handshake_timeout_secs = {handshake_timeout_secs}
# Unique id per process sharing one database (DUET_WORKER_ID)
worker_id = {worker_id}
"#,
        bind_address = config.server.bind_address,
        database_url = config.database.url,
        max_connections = config.database.max_connections,
        jwt_secret = config.auth.jwt_secret,
        jwt_expiry_seconds = config.auth.jwt_expiry_seconds,
        handshake_timeout_secs = config.gateway.handshake_timeout_secs,
        worker_id = config.gateway.worker_id,
    )
}

/// Generate a cryptographically random hex string of the given length.
fn generate_random_hex(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| {
            let idx = rng.gen_range(0..16u8);
            char::from(if idx < 10 {
                b'0' + idx
            } else {
                b'a' + idx - 10
            })
        })
        .collect()
}

impl Config {
    /// Load the TOML config, writing a fresh default file (with a newly
    /// generated JWT secret) when none exists, then apply environment
    /// variable overrides.
    pub fn load(path: &str) -> Result<Self> {
        let mut config = if std::path::Path::new(path).exists() {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            tracing::info!("Config file not found at '{}', generating defaults...", path);
            let config = Config::default();

            if let Some(parent) = std::path::Path::new(path).parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, generate_config_template(&config))?;
            tracing::info!("Generated default config at '{}'", path);
            config
        };
        // The file holds the JWT secret; keep it out of other users' reach.
        let _ = harden_secret_file_permissions(path);

        if let Ok(value) = std::env::var("DUET_BIND_ADDRESS") {
            config.server.bind_address = value;
        }
        if let Ok(value) = std::env::var("DUET_DATABASE_URL") {
            config.database.url = value;
        }
        if let Ok(value) = std::env::var("DUET_DATABASE_MAX_CONNECTIONS") {
            if let Ok(parsed) = value.parse::<u32>() {
                config.database.max_connections = parsed;
            }
        }
        if let Ok(value) = std::env::var("DUET_JWT_SECRET") {
            config.auth.jwt_secret = value;
        }
        if let Ok(value) = std::env::var("DUET_JWT_EXPIRY_SECONDS") {
            if let Ok(parsed) = value.parse::<u64>() {
                config.auth.jwt_expiry_seconds = parsed;
            }
        }
        if let Ok(value) = std::env::var("DUET_HANDSHAKE_TIMEOUT_SECS") {
            if let Ok(parsed) = value.parse::<u64>() {
                config.gateway.handshake_timeout_secs = parsed;
            }
        }
        if let Ok(value) = std::env::var("DUET_WORKER_ID") {
            if let Ok(parsed) = value.parse::<u16>() {
                config.gateway.worker_id = parsed;
            }
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_writes_defaults_with_a_secret() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("duet.toml");
        let path_str = path.to_string_lossy().into_owned();

        let config = Config::load(&path_str).expect("load");
        assert!(path.exists());
        assert_eq!(config.auth.jwt_secret.len(), 64);
        assert_eq!(config.server.bind_address, "0.0.0.0:8080");

        // A second load reads the same generated secret back.
        let reloaded = Config::load(&path_str).expect("reload");
        assert_eq!(reloaded.auth.jwt_secret, config.auth.jwt_secret);
    }

    #[test]
    fn existing_file_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("duet.toml");
        fs::write(
            &path,
            r#"
[server]
bind_address = "127.0.0.1:9000"

[database]
url = "sqlite::memory:"

[auth]
jwt_secret = "fixed-secret"

[gateway]
handshake_timeout_secs = 5
worker_id = 3
"#,
        )
        .expect("write");

        let config = Config::load(&path.to_string_lossy()).expect("load");
        assert_eq!(config.server.bind_address, "127.0.0.1:9000");
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.auth.jwt_secret, "fixed-secret");
        assert_eq!(config.gateway.handshake_timeout_secs, 5);
        assert_eq!(config.gateway.worker_id, 3);
    }
}
