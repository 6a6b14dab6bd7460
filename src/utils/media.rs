//! Media library helpers
//!
//! File classification by extension and safe path resolution under the
//! library roots.

use crate::utils::error::{PlayerError, Result};
use std::path::{Component, Path, PathBuf};

/// Video container extensions accepted into the playlist
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "avi", "mkv", "mov", "wmv", "flv", "ts", "webm", "m4v", "mpg",
];

/// Image extensions accepted as idle images
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "webp", "gif"];

fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| allowed.iter().any(|a| a.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

/// Whether the file name looks like a playable video
pub fn is_video(path: &Path) -> bool {
    has_extension(path, VIDEO_EXTENSIONS)
}

/// Whether the file name looks like an idle image
pub fn is_image(path: &Path) -> bool {
    has_extension(path, IMAGE_EXTENSIONS)
}

/// Resolve a client-supplied relative path under `root`.
///
/// Backslashes are treated as separators and leading/trailing separators
/// are ignored. Any `..`, root or prefix component is rejected so the
/// result can never escape `root`.
pub fn resolve_under(root: &Path, relative: &str) -> Result<PathBuf> {
    let normalized = relative.replace('\\', "/");
    let trimmed = normalized.trim_matches('/');

    let mut resolved = root.to_path_buf();
    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            _ => {
                return Err(PlayerError::InvalidInput(format!(
                    "Path escapes library root: {}",
                    relative
                )))
            }
        }
    }

    Ok(resolved)
}

/// Image files directly inside `dir`, sorted by name.
/// A missing directory yields an empty list.
pub fn list_images(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file() && is_image(&e.path()))
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .collect();
    names.sort();
    names
}

/// Video files directly inside `dir`, sorted by name
pub fn list_videos(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_video(p))
        .collect();
    paths.sort();
    Ok(paths)
}

/// Display name for a media file (its file name)
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(is_video(Path::new("clip.MP4")));
        assert!(is_video(Path::new("a/b/show.webm")));
        assert!(!is_video(Path::new("poster.png")));
        assert!(!is_video(Path::new("noext")));
        assert!(is_image(Path::new("bg.JPEG")));
        assert!(!is_image(Path::new("clip.mkv")));
    }

    #[test]
    fn test_resolve_under() {
        let root = Path::new("/srv/videos");
        assert_eq!(
            resolve_under(root, "/promo\\2024/").unwrap(),
            PathBuf::from("/srv/videos/promo/2024")
        );
        assert_eq!(resolve_under(root, "").unwrap(), PathBuf::from("/srv/videos"));
        assert!(resolve_under(root, "../etc").is_err());
        assert!(resolve_under(root, "promo/../../etc").is_err());
    }

    #[test]
    fn test_listing() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.png", "a.jpg", "c.mp4", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("sub.png")).unwrap();

        assert_eq!(list_images(dir.path()), vec!["a.jpg", "b.png"]);
        assert_eq!(list_videos(dir.path()).unwrap(), vec![dir.path().join("c.mp4")]);
        assert!(list_images(&dir.path().join("missing")).is_empty());
    }
}
