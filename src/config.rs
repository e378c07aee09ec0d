use crate::model::ProtocolDescription;
use crate::notify::NOTIFICATION_CHANNEL_SIZE;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_MAILBOX_CAPACITY: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub database: PathBuf,
    /// Schema file; the bundled schema is used when absent
    pub schema: Option<PathBuf>,
    pub sessions_dir: PathBuf,
    pub mailbox_capacity: usize,
    pub notification_capacity: usize,
    /// Protocols registered at startup
    pub protocols: Vec<ProtocolDescription>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        let base = default_data_dir();
        Self {
            database: base.join("registry.db"),
            schema: None,
            sessions_dir: base.join("sessions"),
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            notification_capacity: NOTIFICATION_CHANNEL_SIZE,
            protocols: Vec::new(),
        }
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("mccdb.toml")
}

pub fn default_data_dir() -> PathBuf {
    PathBuf::from(".mccdb")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<RegistryConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: RegistryConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &RegistryConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

pub fn ensure_db_dir(db_path: &Path) -> std::io::Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::{EntityName, Protocol};

    #[test]
    fn test_missing_file_means_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(&dir.path().join("absent.toml"))).unwrap().is_none());
    }

    #[test]
    fn test_load_with_protocols() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mccdb.toml");
        std::fs::write(
            &path,
            r#"
database = "/var/lib/mccdb/registry.db"
sessions_dir = "/var/lib/mccdb/sessions"

[[protocols]]
name = "9b2a54c6-2f0e-4b8a-8f43-0d3b8d1f6a10"
info = "mavlink"
shareable = true
required_properties = ["sysid"]
"#,
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap().unwrap();
        assert_eq!(config.database, PathBuf::from("/var/lib/mccdb/registry.db"));
        assert_eq!(config.mailbox_capacity, DEFAULT_MAILBOX_CAPACITY);
        assert!(config.schema.is_none());
        assert_eq!(config.protocols.len(), 1);
        let mavlink = &config.protocols[0];
        assert_eq!(mavlink.name, Protocol::parse("9b2a54c6-2f0e-4b8a-8f43-0d3b8d1f6a10").unwrap());
        assert!(mavlink.shareable);
        assert_eq!(mavlink.timeout, std::time::Duration::from_millis(1000));
    }

    #[test]
    fn test_write_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mccdb.toml");
        write_config(&path, &RegistryConfig::default(), false).unwrap();
        assert!(write_config(&path, &RegistryConfig::default(), false).is_err());
        write_config(&path, &RegistryConfig::default(), true).unwrap();
        assert!(load_config(Some(&path)).unwrap().is_some());
    }

    #[test]
    fn test_ensure_db_dir_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("nested").join("registry.db");
        ensure_db_dir(&db).unwrap();
        assert!(db.parent().unwrap().is_dir());
    }
}
