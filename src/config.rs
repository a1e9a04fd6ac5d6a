//! Configuration of the downloader.
//!
//! There are two layers:
//! * the application identity (name, version, language and the derived
//!   `User-Agent`), fixed at build time
//! * user settings from a small TOML file:
//!
//! ```toml
//! arl = "..."
//! default_format = "MP3_320"
//! ```
//!
//! A missing file is the same as an empty one.

use std::{fs, io, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    arl::Arl,
    error::{Error, Result},
    protocol::media::Format,
};

/// Largest accepted configuration file in bytes.
///
/// The file only holds a handful of short values.
const MAX_FILE_SIZE: u64 = 1024;

/// Settings as stored in the configuration file.
#[derive(Clone, Debug, Default, Hash, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arl: Option<Arl>,

    #[serde(default)]
    pub default_format: Format,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Config {
    pub app_name: String,
    pub app_version: String,
    pub app_lang: String,

    pub user_agent: String,

    /// Client ID sent along with gateway requests.
    pub client_id: usize,

    pub arl: Option<Arl>,
    pub default_format: Format,
}

impl Config {
    /// Creates a configuration from user settings.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` if no valid `User-Agent` can be built from
    /// the application identity and the operating system.
    pub fn new(settings: Settings) -> Result<Self> {
        let app_name = env!("CARGO_PKG_NAME").to_owned();
        let app_version = env!("CARGO_PKG_VERSION").to_owned();
        let app_lang = "en".to_owned();

        // Additional `User-Agent` string checks on top of `reqwest::HeaderValue`.
        let illegal_chars = |chr| chr == '/' || chr == ';';
        if app_name.is_empty()
            || app_name.contains(illegal_chars)
            || app_version.is_empty()
            || app_version.contains(illegal_chars)
            || app_lang.chars().count() != 2
            || app_lang.contains(illegal_chars)
        {
            return Err(Error::internal(format!(
                "application name, version and/or language invalid (\"{app_name}\"; \"{app_version}\"; \"{app_lang}\")"
            )));
        }

        let os_name = match std::env::consts::OS {
            "macos" => "osx",
            other => other,
        };
        let os_version = sysinfo::System::os_version().unwrap_or_else(|| String::from("0"));
        if os_name.is_empty()
            || os_name.contains(illegal_chars)
            || os_version.is_empty()
            || os_version.contains(illegal_chars)
        {
            return Err(Error::internal(format!(
                "os name and/or version invalid (\"{os_name}\"; \"{os_version}\")"
            )));
        }

        // Set `User-Agent` to be served like Deezer on desktop.
        let user_agent =
            format!("{app_name}/{app_version} (Rust; {os_name}/{os_version}; Desktop; {app_lang})");
        trace!("user agent: {user_agent}");

        let client_id = fastrand::usize(100_000_000..1_000_000_000);
        trace!("client id: {client_id}");

        Ok(Self {
            app_name,
            app_version,
            app_lang,

            user_agent,
            client_id,

            arl: settings.arl,
            default_format: settings.default_format,
        })
    }

    /// Loads the configuration from `path`.
    ///
    /// # Errors
    ///
    /// * `OutOfRange` if the file is larger than 1 KiB
    /// * `InvalidArgument` if the file is not valid TOML or has unknown or
    ///   invalid settings
    /// * the mapped I/O error kind if the file cannot be read
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(Settings::load(path)?)
    }

    /// Saves the user settings to `path`, replacing the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings cannot be serialized or the file
    /// cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        self.settings().save(path)
    }

    /// User settings of this configuration.
    #[must_use]
    pub fn settings(&self) -> Settings {
        Settings {
            arl: self.arl.clone(),
            default_format: self.default_format,
        }
    }
}

impl Settings {
    /// Loads settings from `path`, or the defaults if it does not exist.
    ///
    /// # Errors
    ///
    /// See [`Config::load`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        // Prevent out-of-memory condition: the file should be small.
        let file_size = match fs::metadata(path) {
            Ok(attributes) => attributes.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("{} not found, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        if file_size > MAX_FILE_SIZE {
            return Err(Error::out_of_range(format!(
                "{} is too large ({file_size} bytes)",
                path.display()
            )));
        }

        let contents = fs::read_to_string(path)?;
        let settings = toml::from_str(&contents)?;
        debug!("loaded {}: {settings:?}", path.display());

        Ok(settings)
    }

    /// Saves settings to `path`, replacing the file.
    ///
    /// # Errors
    ///
    /// See [`Config::save`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let contents = toml::to_string(self)?;
        fs::write(path, contents)?;
        debug!("saved {}", path.display());

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn arl() -> Arl {
        "a1b2c3".repeat(32).parse().unwrap()
    }

    #[test]
    fn user_agent() {
        let config = Config::new(Settings::default()).unwrap();
        assert!(config
            .user_agent
            .starts_with(&format!("{}/{} (Rust; ", config.app_name, config.app_version)));
        assert!(config.user_agent.ends_with("; Desktop; en)"));
        assert!((100_000_000..1_000_000_000).contains(&config.client_id));
    }

    #[test]
    fn missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path().join("config.toml")).unwrap();

        assert_eq!(config.arl, None);
        assert_eq!(config.default_format, Format::MP3_320);
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::new(Settings::default()).unwrap();
        config.arl = Some(arl());
        config.default_format = Format::FLAC;
        config.save(&path).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("default_format = \"FLAC\""));

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.arl, Some(arl()));
        assert_eq!(loaded.default_format, Format::FLAC);
    }

    #[test]
    fn oversized_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        io::Write::write_all(&mut file, &[b'#'; 2048]).unwrap();

        let err = Config::load(file.path()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::OutOfRange);
    }

    #[test]
    fn invalid_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        fs::write(&path, "arl = \"short\"\n").unwrap();
        assert!(Config::load(&path).is_err());

        fs::write(&path, "default_format = \"OGG\"\n").unwrap();
        assert_eq!(
            Config::load(&path).unwrap_err().kind,
            ErrorKind::InvalidArgument
        );

        fs::write(&path, "not toml at all").unwrap();
        assert_eq!(
            Config::load(&path).unwrap_err().kind,
            ErrorKind::InvalidArgument
        );
    }
}
