//! Server configuration: a JSON file named on the command line, with
//! `DIALOG_KEY`/`DIALOG_DB_PATH` environment variables overriding the
//! signing key and store path for deployments that keep secrets out of the
//! config file on disk.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct DialogConfig {
    /// Token-signing secret (HS256).
    pub key: String,
    /// Path to the sqlite store file.
    pub db_path: String,
    /// Script source file paths, concatenated in order.
    pub source: Vec<String>,
    #[serde(default = "default_session_ttl_seconds")]
    pub session_ttl_seconds: u64,
    /// Whether the store file is deleted and recreated at startup.
    #[serde(default = "default_fresh_db")]
    pub fresh_db: bool,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

fn default_session_ttl_seconds() -> u64 {
    300
}

fn default_fresh_db() -> bool {
    true
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

impl DialogConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::args()
            .nth(1)
            .ok_or_else(|| anyhow::anyhow!("usage: dialog-server <config.json>"))?;
        let text = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("reading config file {path}: {e}"))?;
        let mut config: DialogConfig = serde_json::from_str(&text)
            .map_err(|e| anyhow::anyhow!("parsing config file {path}: {e}"))?;
        if let Ok(key) = std::env::var("DIALOG_KEY") {
            config.key = key;
        }
        if let Ok(db_path) = std::env::var("DIALOG_DB_PATH") {
            config.db_path = db_path;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_in_when_absent() {
        let json = r#"{"key":"secret","db_path":"dialog.db","source":["main.txt"]}"#;
        let config: DialogConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.session_ttl_seconds, 300);
        assert!(config.fresh_db);
        assert_eq!(config.listen_addr, "0.0.0.0:8080");
    }
}
