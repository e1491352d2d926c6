//! Notmuch configuration resolution and parsing.
//!
//! The configuration file is a glib keyfile: a `[database]` section whose
//! `path` key names the mail index directory, and an optional `[new]`
//! section whose `tags` key lists the tags applied to new mail. Resolution
//! is one-shot and fail-fast: an explicit `NOTMUCH_CONFIG` wins, otherwise
//! the file lives under `$HOME`, and neither being set is fatal.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use ini::Ini;
use thiserror::Error;
use tracing::{debug, info};

/// Environment variable naming an explicit configuration file.
pub const CONFIG_PATH_ENV_VAR: &str = "NOTMUCH_CONFIG";

/// File name of the per-user configuration, relative to `$HOME`.
pub const DEFAULT_CONFIG_FILE: &str = ".notmuch-config";

/// Errors raised while resolving or parsing the configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// No source identifies a configuration file.
    #[error("neither NOTMUCH_CONFIG nor HOME is set")]
    Location,

    /// The configuration file is missing or malformed.
    #[error("failed to parse `{}`: {source}", path.display())]
    Parse {
        /// Path of the offending file.
        path: PathBuf,
        /// Underlying read or parse error.
        source: ini::Error,
    },

    /// A required key is absent from the document.
    #[error("missing {section}.{key} in `{}`", path.display())]
    MissingField {
        /// Path of the file that was parsed.
        path: PathBuf,
        /// Section the key was expected in.
        section: &'static str,
        /// The absent key.
        key: &'static str,
    },
}

/// Immutable configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Location of the mail index on disk.
    pub database_path: PathBuf,

    /// Tags applied to new mail. The harness never uses these; they are
    /// parsed best-effort for parity with the tool under test.
    pub new_mail_tags: Vec<String>,
}

impl Config {
    /// Resolve the configuration file from the environment and load it.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Location` when neither `NOTMUCH_CONFIG` nor
    /// `HOME` is set, and the `load` errors otherwise.
    pub fn resolve() -> Result<Self, ConfigError> {
        let path = config_file_path(
            std::env::var_os(CONFIG_PATH_ENV_VAR),
            std::env::var_os("HOME"),
        )?;
        info!(path = %path.display(), "parsing configuration");
        Self::load(&path)
    }

    /// Load and parse a configuration file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` if the file cannot be read or parsed,
    /// and `ConfigError::MissingField` if `database.path` is absent. An
    /// absent or empty `new.tags` list is not an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let document = Ini::load_from_file(path).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let database_path = document
            .section(Some("database"))
            .and_then(|section| section.get("path"))
            .map(PathBuf::from)
            .ok_or_else(|| ConfigError::MissingField {
                path: path.to_path_buf(),
                section: "database",
                key: "path",
            })?;

        let new_mail_tags = document
            .section(Some("new"))
            .and_then(|section| section.get("tags"))
            .map(parse_tag_list)
            .unwrap_or_default();

        debug!(
            database_path = %database_path.display(),
            tags = new_mail_tags.len(),
            "configuration loaded"
        );
        Ok(Self {
            database_path,
            new_mail_tags,
        })
    }
}

/// Resolve the configuration file location from the two possible sources.
///
/// An explicit `NOTMUCH_CONFIG` value wins; otherwise the default file
/// under the home directory is used. Empty values count as unset.
///
/// # Errors
///
/// Returns `ConfigError::Location` when neither source is available.
pub fn config_file_path(
    explicit: Option<OsString>,
    home: Option<OsString>,
) -> Result<PathBuf, ConfigError> {
    if let Some(path) = explicit.filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    if let Some(home) = home.filter(|h| !h.is_empty()) {
        return Ok(PathBuf::from(home).join(DEFAULT_CONFIG_FILE));
    }
    Err(ConfigError::Location)
}

/// Split a glib-style string list: `;`-separated, trailing separator
/// tolerated.
fn parse_tag_list(raw: &str) -> Vec<String> {
    raw.split(';')
        .filter(|tag| !tag.is_empty())
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_config(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notmuch-config");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn loads_database_path_and_tags() {
        let (_dir, path) = write_config(
            "[database]\npath=/tmp/mail\n\n[new]\ntags=unread;inbox;\n",
        );
        let config = Config::load(&path).unwrap();
        assert_eq!(config.database_path, PathBuf::from("/tmp/mail"));
        assert_eq!(config.new_mail_tags, vec!["unread", "inbox"]);
    }

    #[test]
    fn tags_are_optional() {
        let (_dir, path) = write_config("[database]\npath=/tmp/mail\n");
        let config = Config::load(&path).unwrap();
        assert!(config.new_mail_tags.is_empty());
    }

    #[test]
    fn missing_database_path_is_an_error() {
        let (_dir, path) = write_config("[new]\ntags=unread\n");
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingField {
                section: "database",
                key: "path",
                ..
            }
        ));
    }

    #[test]
    fn missing_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(&dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn explicit_config_path_wins() {
        let path = config_file_path(
            Some(OsString::from("/etc/notmuch-config")),
            Some(OsString::from("/home/user")),
        )
        .unwrap();
        assert_eq!(path, PathBuf::from("/etc/notmuch-config"));
    }

    #[test]
    fn falls_back_to_home() {
        let path = config_file_path(None, Some(OsString::from("/home/user"))).unwrap();
        assert_eq!(path, PathBuf::from("/home/user/.notmuch-config"));
    }

    #[test]
    fn empty_values_count_as_unset() {
        let path = config_file_path(
            Some(OsString::new()),
            Some(OsString::from("/home/user")),
        )
        .unwrap();
        assert_eq!(path, PathBuf::from("/home/user/.notmuch-config"));

        let err = config_file_path(Some(OsString::new()), Some(OsString::new())).unwrap_err();
        assert!(matches!(err, ConfigError::Location));
    }
}
