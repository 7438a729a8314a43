//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use ts_glpi::GlpiSettings;

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,
    /// GLPI connection settings.
    #[serde(default)]
    pub glpi: GlpiSettings,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("glpi", &self.glpi)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("timesolve.db"),
            glpi: GlpiSettings::default(),
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    ///
    /// Later sources win: defaults, `~/.config/ts/config.toml`, the given
    /// file, then `TS_*` environment variables (`TS_GLPI__URL` sets `glpi.url`).
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed("TS_").split("__"));

        figment.extract()
    }

    /// Path of the lock file guarding writes to the database.
    pub fn lock_path(&self) -> PathBuf {
        let mut name = self
            .database_path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(".lock");
        self.database_path.with_file_name(name)
    }
}

/// Returns the platform-specific config directory for ts.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("ts"))
}

/// Returns the platform-specific data directory for ts.
///
/// On Linux: `~/.local/share/ts`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("ts"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_dirs_data_path_ends_with_ts() {
        let path = dirs_data_path().unwrap();
        assert_eq!(path.file_name().unwrap(), "ts");
    }

    #[test]
    fn test_default_config_uses_data_dir_for_db() {
        let config = Config::default();
        let data_dir = dirs_data_path().unwrap();
        assert_eq!(config.database_path, data_dir.join("timesolve.db"));
        assert_eq!(config.glpi.page_size, 1000);
        assert_eq!(config.glpi.timeout_secs, 60);
    }

    #[test]
    fn test_config_file_sets_nested_glpi_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
database_path = "/tmp/ts-test.db"

[glpi]
url = "https://glpi.example.org/apirest.php"
user_token = "secret-token"
page_size = 50
"#
        )
        .unwrap();
        file.flush().unwrap();

        let config = Config::load_from(Some(file.path())).unwrap();
        assert_eq!(config.database_path, PathBuf::from("/tmp/ts-test.db"));
        assert_eq!(config.glpi.url, "https://glpi.example.org/apirest.php");
        assert_eq!(config.glpi.user_token.as_deref(), Some("secret-token"));
        assert_eq!(config.glpi.page_size, 50);
        assert_eq!(config.glpi.timeout_secs, 60);
    }

    #[test]
    fn test_debug_redacts_glpi_secrets() {
        let mut config = Config::default();
        config.glpi.user_token = Some("secret-token".to_string());
        config.glpi.password = Some("hunter2".to_string());
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret-token"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_lock_path_sits_next_to_database() {
        let config = Config {
            database_path: PathBuf::from("/data/ts/timesolve.db"),
            glpi: GlpiSettings::default(),
        };
        assert_eq!(
            config.lock_path(),
            PathBuf::from("/data/ts/timesolve.db.lock")
        );
    }
}
