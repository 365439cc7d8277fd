//! TOML configuration file loading
//!
//! Supports `~/.config/omni/beacon-transients/config.toml` as a persistent
//! config source. All fields are optional; the file is a partial overlay on
//! top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct TransientsConfigFile {
    /// Node identity and reconciliation cadence
    #[serde(default)]
    pub node: NodeFileConfig,

    /// Discovery polling policy
    #[serde(default)]
    pub discovery: DiscoveryFileConfig,

    /// Call timeouts
    #[serde(default)]
    pub call: CallFileConfig,

    /// Provider listener
    #[serde(default)]
    pub server: ServerFileConfig,
}

#[derive(Debug, Default, Deserialize)]
pub struct NodeFileConfig {
    /// Identity advertised for hosted services
    pub name: Option<String>,

    /// Minimum delay between reconciliation passes, in milliseconds
    pub update_interval_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DiscoveryFileConfig {
    pub poll_interval_ms: Option<u64>,

    /// 0 polls exactly once
    pub timeout_ms: Option<u64>,

    pub minimum_providers: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CallFileConfig {
    pub send_timeout_ms: Option<u64>,
    pub recv_timeout_ms: Option<u64>,
    pub max_frame_bytes: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// Listen address for hosted services (e.g. "0.0.0.0:0")
    pub bind: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `TransientsConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> TransientsConfigFile {
    let Some(path) = config_file_path() else {
        return TransientsConfigFile::default();
    };

    if !path.exists() {
        return TransientsConfigFile::default();
    }

    load_config_file_from(&path)
}

/// Load a TOML config file from an explicit path, falling back to defaults
pub fn load_config_file_from(path: &Path) -> TransientsConfigFile {
    match parse_config_file(path) {
        Ok(config) => {
            tracing::info!(path = %path.display(), "loaded config file");
            config
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to load config file, using defaults"
            );
            TransientsConfigFile::default()
        }
    }
}

/// Read and parse a TOML config file
///
/// # Errors
///
/// Returns [`Error::Io`](crate::Error::Io) if the file can't be read and
/// [`Error::Toml`](crate::Error::Toml) if it isn't valid
pub fn parse_config_file(path: &Path) -> crate::Result<TransientsConfigFile> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Return the config file path: `~/.config/omni/beacon-transients/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| {
        d.config_dir()
            .join("omni")
            .join("beacon-transients")
            .join("config.toml")
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn partial_file_leaves_rest_unset() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[discovery]\ntimeout_ms = 1500\n\n[call]\nrecv_timeout_ms = 250"
        )
        .unwrap();

        let fc = load_config_file_from(file.path());
        assert_eq!(fc.discovery.timeout_ms, Some(1500));
        assert_eq!(fc.call.recv_timeout_ms, Some(250));
        assert!(fc.call.send_timeout_ms.is_none());
        assert!(fc.node.name.is_none());
    }

    #[test]
    fn broken_file_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[node\nname = ").unwrap();

        let fc = load_config_file_from(file.path());
        assert!(fc.node.name.is_none());
    }

    #[test]
    fn broken_file_is_a_toml_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[call]\nsend_timeout_ms = \"soon\"").unwrap();

        assert!(matches!(
            parse_config_file(file.path()),
            Err(crate::Error::Toml(_))
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();

        assert!(matches!(
            parse_config_file(&dir.path().join("absent.toml")),
            Err(crate::Error::Io(_))
        ));
    }

    #[test]
    fn path_ends_with_crate_dir() {
        if let Some(path) = config_file_path() {
            assert!(path.ends_with("omni/beacon-transients/config.toml"));
        }
    }
}
