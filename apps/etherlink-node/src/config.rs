//! Node settings.
//!
//! A small TOML file, found via `$ETHERLINK_CONFIG` or the per-user
//! config directory (`$XDG_CONFIG_HOME`/`%APPDATA%`). Every field has a
//! default, so an empty or absent file is a valid configuration.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Display name announced to peers (hostname by default).
    #[serde(default = "default_name")]
    pub name: String,

    /// Where received files land. Falls back to the engine default
    /// (`<user-downloads>/EtherLink`) when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloads_dir: Option<PathBuf>,

    /// UDP presence port.
    #[serde(default = "default_discovery_port")]
    pub discovery_port: u16,

    /// TCP transfer port.
    #[serde(default = "default_transfer_port")]
    pub transfer_port: u16,
}

fn default_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "EtherLink Device".into())
}

fn default_discovery_port() -> u16 {
    9000
}

fn default_transfer_port() -> u16 {
    9001
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            downloads_dir: None,
            discovery_port: default_discovery_port(),
            transfer_port: default_transfer_port(),
        }
    }
}

impl NodeConfig {
    /// Reads the configuration file.
    ///
    /// A missing file is not an error: the defaults apply and are written
    /// back (best effort) so the user has something to edit. Anything
    /// else, a present-but-broken file included, aborts startup rather
    /// than silently running with surprise settings.
    pub fn load() -> anyhow::Result<Self> {
        let path = config_path();
        match std::fs::read_to_string(&path) {
            Ok(raw) => toml::from_str(&raw)
                .with_context(|| format!("invalid config at {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                if let Err(e) = config.write_to(&path) {
                    tracing::warn!(path = %path.display(), "could not seed default config: {e}");
                }
                Ok(config)
            }
            Err(e) => {
                Err(e).with_context(|| format!("could not read config at {}", path.display()))
            }
        }
    }

    /// Serializes the configuration to `path`, creating parent directories.
    fn write_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Where the configuration file lives.
///
/// `$ETHERLINK_CONFIG` wins outright; otherwise `node.toml` under the
/// platform's per-user config directory, with the temp dir as a last
/// resort for stripped-down environments.
fn config_path() -> PathBuf {
    if let Some(explicit) = std::env::var_os("ETHERLINK_CONFIG") {
        return PathBuf::from(explicit);
    }

    let base = if cfg!(windows) {
        std::env::var_os("APPDATA").map(PathBuf::from)
    } else {
        std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
    };

    base.unwrap_or_else(std::env::temp_dir)
        .join("etherlink")
        .join("node.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = NodeConfig::default();
        assert!(!config.name.is_empty());
        assert!(config.downloads_dir.is_none());
        assert_eq!(config.discovery_port, 9000);
        assert_eq!(config.transfer_port, 9001);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = NodeConfig {
            name: "TestNode".into(),
            downloads_dir: Some("/srv/incoming".into()),
            discovery_port: 19000,
            transfer_port: 19001,
        };

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: NodeConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(parsed.name, "TestNode");
        assert_eq!(
            parsed.downloads_dir.as_deref().unwrap().to_str(),
            Some("/srv/incoming")
        );
        assert_eq!(parsed.discovery_port, 19000);
        assert_eq!(parsed.transfer_port, 19001);
    }

    #[test]
    fn empty_file_is_all_defaults() {
        let config: NodeConfig = toml::from_str("").unwrap();
        assert_eq!(config.discovery_port, 9000);
        assert_eq!(config.transfer_port, 9001);
        assert!(config.downloads_dir.is_none());
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let config: NodeConfig = toml::from_str(r#"name = "MyNode""#).unwrap();
        assert_eq!(config.name, "MyNode");
        assert_eq!(config.discovery_port, 9000);
        assert_eq!(config.transfer_port, 9001);
    }

    #[test]
    fn broken_file_is_an_error() {
        assert!(toml::from_str::<NodeConfig>("transfer_port = \"not a port\"").is_err());
    }

    #[test]
    fn write_to_creates_parents_and_roundtrips() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("node.toml");

        let config = NodeConfig {
            name: "SaveTest".into(),
            ..NodeConfig::default()
        };
        config.write_to(&path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let loaded: NodeConfig = toml::from_str(&raw).unwrap();
        assert_eq!(loaded.name, "SaveTest");
    }

    #[test]
    fn config_path_points_at_node_toml() {
        let path = config_path();
        assert!(path.ends_with("node.toml") || path.to_string_lossy().contains("node.toml"));
    }
}
