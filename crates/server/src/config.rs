//! Server configuration from environment variables.

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    /// TCP listen port (`FSX_TCP_PORT`).
    pub tcp_port: u16,
    /// Staging base directory (`FSX_STORAGE_PATH`).
    pub storage_path: PathBuf,
    /// SQLite database file (`FSX_DB_PATH`).
    pub db_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tcp_port: 9000,
            storage_path: PathBuf::from("./storage/transfers"),
            db_path: PathBuf::from("./fsx.db"),
        }
    }
}

impl Config {
    /// Reads the configuration from the environment, falling back to the
    /// defaults (with a warning) on unset or unparsable values.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(port) = std::env::var("FSX_TCP_PORT") {
            match port.parse::<u16>() {
                Ok(p) => config.tcp_port = p,
                Err(_) => {
                    tracing::warn!(value = %port, "invalid FSX_TCP_PORT, using default");
                }
            }
        }

        if let Ok(path) = std::env::var("FSX_STORAGE_PATH") {
            if !path.is_empty() {
                config.storage_path = PathBuf::from(path);
            }
        }

        if let Ok(path) = std::env::var("FSX_DB_PATH") {
            if !path.is_empty() {
                config.db_path = PathBuf::from(path);
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.tcp_port, 9000);
        assert_eq!(config.storage_path, PathBuf::from("./storage/transfers"));
        assert_eq!(config.db_path, PathBuf::from("./fsx.db"));
    }
}
