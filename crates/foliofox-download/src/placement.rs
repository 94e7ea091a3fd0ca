//! Destination path planning for downloads.
//!
//! The resolver turns a user's folder preferences and an admitted request
//! into the destination path, and computes the organized path a completed
//! file is filed under when the folder has auto-organize enabled.

use std::path::PathBuf;
use std::sync::Arc;

use foliofox_core::download::{DownloadError, DownloadRequest, QueueItem};
use foliofox_core::ports::{DownloadFolder, PreferencesPort};

/// Resolves destination paths from user preferences.
pub struct PlacementResolver {
    prefs: Arc<dyn PreferencesPort>,
}

impl PlacementResolver {
    /// Create a resolver over the preference store.
    pub fn new(prefs: Arc<dyn PreferencesPort>) -> Self {
        Self { prefs }
    }

    /// Resolve the download destination for an admitted request.
    ///
    /// Files land flat in the user's download folder as
    /// `Author - Title.ext`; the organize step files them into the naming
    /// pattern afterwards.
    pub async fn resolve(
        &self,
        user_id: i64,
        request: &DownloadRequest,
    ) -> Result<PathBuf, DownloadError> {
        let folder = self.prefs.download_folder(user_id).await?;
        let stem = if request.author.trim().is_empty() {
            sanitize_component(&request.title)
        } else {
            sanitize_component(&format!("{} - {}", request.author, request.title))
        };
        Ok(folder
            .path
            .join(format!("{stem}.{}", request.file_format.as_str())))
    }

    /// The user's folder configuration, used by the post-completion
    /// organize step.
    pub async fn folder(&self, user_id: i64) -> Result<DownloadFolder, DownloadError> {
        self.prefs.download_folder(user_id).await
    }
}

/// Render a folder's naming pattern for a completed item.
///
/// Supported placeholders: `{author}`, `{title}`, `{ext}`. Slashes in the
/// pattern create subdirectories; slashes inside a rendered field do not.
#[must_use]
pub fn organized_path(folder: &DownloadFolder, item: &QueueItem) -> PathBuf {
    let mut path = folder.path.clone();
    for part in folder.naming_pattern.split('/') {
        let rendered = part
            .replace("{author}", &sanitize_component(&item.author))
            .replace("{title}", &sanitize_component(&item.title))
            .replace("{ext}", item.file_format.as_str());
        if !rendered.is_empty() {
            path.push(rendered);
        }
    }
    path
}

/// Move a completed file into the organized layout.
///
/// Runs after the terminal transition and must never block a worker;
/// callers spawn it. Failures are reported for logging but do not affect
/// the completed download.
pub async fn organize(folder: &DownloadFolder, item: &QueueItem) -> Result<PathBuf, DownloadError> {
    let target = organized_path(folder, item);
    if target == item.destination_path {
        return Ok(target);
    }
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| DownloadError::from_io_error(&e))?;
    }
    tokio::fs::rename(&item.destination_path, &target)
        .await
        .map_err(|e| DownloadError::from_io_error(&e))?;
    Ok(target)
}

/// Make a string safe as a single path component.
fn sanitize_component(s: &str) -> String {
    let cleaned: String = s
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim_matches(|c: char| c == '.' || c.is_whitespace());
    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use foliofox_core::download::BookFormat;
    use foliofox_core::indexer::IndexerId;
    use foliofox_core::ports::StaticPreferences;

    fn request(title: &str, author: &str) -> DownloadRequest {
        DownloadRequest::new(
            IndexerId(1),
            title,
            author,
            "https://indexer.example/dl/1.epub",
            BookFormat::Epub,
        )
    }

    #[test]
    fn sanitize_replaces_hostile_characters() {
        assert_eq!(sanitize_component("a/b\\c:d"), "a_b_c_d");
        assert_eq!(sanitize_component("What? A *Book*"), "What_ A _Book_");
        assert_eq!(sanitize_component("  .hidden.  "), "hidden");
        assert_eq!(sanitize_component("???"), "___");
        assert_eq!(sanitize_component(" . "), "untitled");
    }

    #[tokio::test]
    async fn resolve_builds_flat_path() {
        let prefs = Arc::new(StaticPreferences::new(
            foliofox_core::ports::DownloadFolder::new(PathBuf::from("/books")),
        ));
        let resolver = PlacementResolver::new(prefs);

        let path = resolver
            .resolve(1, &request("The Dispossessed", "Le Guin"))
            .await
            .unwrap();
        assert_eq!(
            path,
            PathBuf::from("/books/Le Guin - The Dispossessed.epub")
        );
    }

    #[tokio::test]
    async fn resolve_without_author_uses_title_only() {
        let prefs = Arc::new(StaticPreferences::new(
            foliofox_core::ports::DownloadFolder::new(PathBuf::from("/books")),
        ));
        let resolver = PlacementResolver::new(prefs);

        let path = resolver.resolve(1, &request("Anonymous Work", "")).await.unwrap();
        assert_eq!(path, PathBuf::from("/books/Anonymous Work.epub"));
    }

    #[test]
    fn organized_path_renders_pattern_subdirectories() {
        let folder = DownloadFolder::new(PathBuf::from("/books"));
        let item = QueueItem::from_request(
            &request("The Dispossessed", "Le Guin"),
            1,
            PathBuf::from("/books/Le Guin - The Dispossessed.epub"),
        );

        let path = organized_path(&folder, &item);
        assert_eq!(path, PathBuf::from("/books/Le Guin/The Dispossessed.epub"));
    }

    #[test]
    fn organized_path_keeps_field_slashes_out_of_directories() {
        let folder = DownloadFolder::new(PathBuf::from("/books"));
        let item = QueueItem::from_request(
            &request("Either/Or", "Kierkegaard"),
            1,
            PathBuf::from("/books/x.epub"),
        );

        let path = organized_path(&folder, &item);
        assert_eq!(path, PathBuf::from("/books/Kierkegaard/Either_Or.epub"));
    }

    #[tokio::test]
    async fn organize_moves_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let folder = DownloadFolder::new(dir.path().to_path_buf());

        let dest = dir.path().join("Le Guin - The Dispossessed.epub");
        tokio::fs::write(&dest, b"content").await.unwrap();

        let item = QueueItem::from_request(&request("The Dispossessed", "Le Guin"), 1, dest.clone());

        let target = organize(&folder, &item).await.unwrap();
        assert!(!dest.exists());
        assert_eq!(tokio::fs::read(&target).await.unwrap(), b"content");
        assert!(target.ends_with("Le Guin/The Dispossessed.epub"));
    }
}
