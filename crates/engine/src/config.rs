use std::path::PathBuf;

use etherlink_protocol::{DEFAULT_DISCOVERY_PORT, DEFAULT_TRANSFER_PORT};

/// Engine settings.
///
/// Port 0 binds an OS-assigned port, which is how tests run several
/// engines on one host.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Display name announced to peers (hostname by default).
    pub name: String,
    /// UDP presence port.
    pub discovery_port: u16,
    /// TCP transfer port.
    pub transfer_port: u16,
    /// Where received files land.
    pub downloads_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| "EtherLink Device".into()),
            discovery_port: DEFAULT_DISCOVERY_PORT,
            transfer_port: DEFAULT_TRANSFER_PORT,
            downloads_dir: default_downloads_dir(),
        }
    }
}

/// `<user-downloads>/EtherLink`, resolved per platform.
fn default_downloads_dir() -> PathBuf {
    #[cfg(unix)]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home).join("Downloads").join("EtherLink")
    }

    #[cfg(windows)]
    {
        let profile =
            std::env::var("USERPROFILE").unwrap_or_else(|_| "C:\\Users\\Default".into());
        PathBuf::from(profile).join("Downloads").join("EtherLink")
    }

    #[cfg(not(any(unix, windows)))]
    {
        PathBuf::from("/tmp").join("EtherLink")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_well_known_ports() {
        let config = EngineConfig::default();
        assert_eq!(config.discovery_port, 9000);
        assert_eq!(config.transfer_port, 9001);
        assert!(!config.name.is_empty());
    }

    #[test]
    fn default_downloads_dir_ends_with_etherlink() {
        let config = EngineConfig::default();
        assert!(config.downloads_dir.ends_with("EtherLink"));
    }
}
