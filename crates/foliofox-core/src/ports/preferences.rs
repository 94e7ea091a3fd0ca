//! User preference store port.
//!
//! The preference store resolves a user's download folder, its naming
//! pattern and the user's quality profile. A durable implementation is an
//! external collaborator; `StaticPreferences` serves tests and
//! single-user wiring.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::download::{BookFormat, DownloadError};

/// Default naming pattern used when a folder has none configured.
pub const DEFAULT_NAMING_PATTERN: &str = "{author}/{title}.{ext}";

/// A user's download folder configuration.
#[derive(Clone, Debug)]
pub struct DownloadFolder {
    /// Base directory for finished files.
    pub path: PathBuf,
    /// Naming pattern with `{author}`, `{title}`, `{ext}` placeholders.
    pub naming_pattern: String,
    /// Whether completed files are moved into the pattern layout.
    pub auto_organize: bool,
}

impl DownloadFolder {
    /// Create a folder with the default pattern and organize enabled.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            naming_pattern: DEFAULT_NAMING_PATTERN.to_string(),
            auto_organize: true,
        }
    }
}

/// Quality constraints resolved from a user's profile.
#[derive(Clone, Debug, Default)]
pub struct QualityProfile {
    /// Results below this score are filtered out of searches.
    pub min_quality_score: u8,
    /// Preferred formats, most preferred first.
    pub preferred_formats: Vec<BookFormat>,
}

/// Port for resolving user preferences.
#[async_trait]
pub trait PreferencesPort: Send + Sync {
    /// The user's download folder. Errors with `PathResolution` when the
    /// user has no usable folder; the download is then not created.
    async fn download_folder(&self, user_id: i64) -> Result<DownloadFolder, DownloadError>;

    /// The user's quality profile.
    async fn quality_profile(&self, user_id: i64) -> Result<QualityProfile, DownloadError>;
}

/// Fixed preferences for every user.
pub struct StaticPreferences {
    folder: DownloadFolder,
    profile: QualityProfile,
}

impl StaticPreferences {
    /// Serve the given folder to every user.
    #[must_use]
    pub fn new(folder: DownloadFolder) -> Self {
        Self {
            folder,
            profile: QualityProfile::default(),
        }
    }

    /// Use the platform download directory, falling back to the current
    /// directory.
    #[must_use]
    pub fn platform_default() -> Self {
        let base = dirs::download_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::new(DownloadFolder::new(base.join("foliofox")))
    }
}

#[async_trait]
impl PreferencesPort for StaticPreferences {
    async fn download_folder(&self, _user_id: i64) -> Result<DownloadFolder, DownloadError> {
        Ok(self.folder.clone())
    }

    async fn quality_profile(&self, _user_id: i64) -> Result<QualityProfile, DownloadError> {
        Ok(self.profile.clone())
    }
}
