//! Centralized path definitions for config and sidecar files.
//!
//! This module is the single source of truth for leaf filenames and
//! path-building functions. No other module should hard-code these strings.

use std::path::{Path, PathBuf};

// ── Application identity ─────────────────────────────────────────

pub const APP_ID: &str = "com.lr-ai-settings.app";

// ── Leaf filenames ───────────────────────────────────────────────

pub const CONFIG_FILE: &str = "config.json";
pub const SIDECAR_EXTENSION: &str = "xmp";
pub const SUGGESTED_XMP_FILE: &str = "suggested_settings.xmp";

// ── Config-dir functions ─────────────────────────────────────────

/// Per-user config directory, following the platform convention:
/// `<config_dir>/com.lr-ai-settings.app`.
pub fn app_config_dir() -> PathBuf {
    let base = if cfg!(target_os = "windows") {
        std::env::var("APPDATA")
            .map_or_else(|_| PathBuf::from("C:\\Users\\Default\\AppData\\Roaming"), PathBuf::from)
    } else if cfg!(target_os = "macos") {
        home_dir().join("Library/Application Support")
    } else {
        std::env::var("XDG_CONFIG_HOME")
            .map_or_else(|_| home_dir().join(".config"), PathBuf::from)
    };
    base.join(APP_ID)
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_or_else(|_| PathBuf::from("."), PathBuf::from)
}

pub fn config_path(app_config_dir: &Path) -> PathBuf {
    app_config_dir.join(CONFIG_FILE)
}

/// `config.json` in the working directory, checked after the per-user file.
pub fn local_config_path() -> PathBuf {
    PathBuf::from(CONFIG_FILE)
}

// ── Sidecar functions ────────────────────────────────────────────

/// Lightroom's sidecar naming: `IMG_0001.CR3` → `IMG_0001.xmp`.
pub fn sidecar_path(image: &Path) -> PathBuf {
    image.with_extension(SIDECAR_EXTENSION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sidecar_replaces_extension() {
        assert_eq!(
            sidecar_path(Path::new("/photos/IMG_0001.CR3")),
            PathBuf::from("/photos/IMG_0001.xmp")
        );
        assert_eq!(sidecar_path(Path::new("shot")), PathBuf::from("shot.xmp"));
    }

    #[test]
    fn config_dir_ends_with_app_id() {
        assert!(app_config_dir().ends_with(APP_ID));
        assert!(config_path(Path::new("/cfg")).ends_with(CONFIG_FILE));
    }
}
