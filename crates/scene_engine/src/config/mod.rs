//! Configuration files
//!
//! Settings structs implement [`Config`] to be read from and written to TOML
//! or RON. The format follows the file extension, and every loaded value is
//! validated before it is handed back.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Serialization formats a configuration file may use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// `.toml`
    Toml,
    /// `.ron`
    Ron,
}

impl ConfigFormat {
    /// Format implied by a file extension, if any
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "toml" => Some(Self::Toml),
            "ron" => Some(Self::Ron),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Toml => f.write_str("TOML"),
            Self::Ron => f.write_str("RON"),
        }
    }
}

/// Settings that can be loaded from a file
pub trait Config: Serialize + DeserializeOwned + Default {
    /// Reject values that parsed but cannot be used
    fn validate(&self) -> Result<(), ConfigError>;

    /// Read, parse and validate a `.toml` or `.ron` file
    fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path)
            .ok_or_else(|| ConfigError::UnsupportedFormat(path.to_path_buf()))?;
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&contents, format)?;
        log::debug!("Loaded {format} configuration from {}", path.display());
        Ok(config)
    }

    /// Parse and validate text in the given format
    fn parse(contents: &str, format: ConfigFormat) -> Result<Self, ConfigError> {
        let config: Self = match format {
            ConfigFormat::Toml => toml::from_str(contents).map_err(|e| ConfigError::Parse {
                format,
                message: e.to_string(),
            })?,
            ConfigFormat::Ron => ron::from_str(contents).map_err(|e| ConfigError::Parse {
                format,
                message: e.to_string(),
            })?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Write to a `.toml` or `.ron` file, pretty-printed
    fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path)
            .ok_or_else(|| ConfigError::UnsupportedFormat(path.to_path_buf()))?;
        let contents = match format {
            ConfigFormat::Toml => toml::to_string_pretty(self).map_err(|e| e.to_string()),
            ConfigFormat::Ron => ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| e.to_string()),
        }
        .map_err(|message| ConfigError::Serialize { format, message })?;
        std::fs::write(path, contents).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse and validate TOML text
    fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Self::parse(contents, ConfigFormat::Toml)
    }

    /// Parse and validate RON text
    fn from_ron_str(contents: &str) -> Result<Self, ConfigError> {
        Self::parse(contents, ConfigFormat::Ron)
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The file could not be read or written
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// File that failed
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// The text is not valid for its format
    #[error("{format} parse error: {message}")]
    Parse {
        /// Format the text was read as
        format: ConfigFormat,
        /// Parser message
        message: String,
    },

    /// The value could not be written in the requested format
    #[error("{format} serialization error: {message}")]
    Serialize {
        /// Target format
        format: ConfigFormat,
        /// Serializer message
        message: String,
    },

    /// Extension is neither `.toml` nor `.ron`
    #[error("Unsupported configuration file: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    /// Values parsed but failed validation
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
