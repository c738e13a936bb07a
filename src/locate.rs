use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::browser::{BrowserKind, BrowserProfile};

pub const GECKO_STORE_FILE_NAME: &str = "places.sqlite";

/// Conventional per-user Chrome `History` path for the host platform.
pub fn default_webkit_history_path() -> Option<PathBuf> {
    if cfg!(windows) {
        dirs::data_local_dir().map(|d| {
            d.join("Google")
                .join("Chrome")
                .join("User Data")
                .join("Default")
                .join("History")
        })
    } else if cfg!(target_os = "macos") {
        dirs::data_dir().map(|d| d.join("Google").join("Chrome").join("Default").join("History"))
    } else {
        dirs::config_dir().map(|d| d.join("google-chrome").join("Default").join("History"))
    }
}

/// Conventional per-user Firefox profiles root for the host platform.
pub fn default_gecko_profiles_root() -> Option<PathBuf> {
    if cfg!(windows) {
        dirs::data_dir().map(|d| d.join("Mozilla").join("Firefox").join("Profiles"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir().map(|d| d.join("Firefox").join("Profiles"))
    } else {
        dirs::home_dir().map(|d| d.join(".mozilla").join("firefox"))
    }
}

pub fn locate_webkit_profile(history_path: &Path) -> Option<BrowserProfile> {
    history_path.is_file().then(|| BrowserProfile {
        kind: BrowserKind::WebKit,
        store_path: history_path.to_path_buf(),
    })
}

/// Lazily walk `root` for files named exactly `file_name`.
///
/// A missing root yields an empty sequence. Unreadable subdirectories are
/// skipped.
pub fn locate_gecko_profiles<'a>(
    root: &Path,
    file_name: &'a str,
) -> impl Iterator<Item = BrowserProfile> + 'a {
    WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(move |entry| entry.file_type().is_file() && entry.file_name() == file_name)
        .map(|entry| BrowserProfile {
            kind: BrowserKind::Gecko,
            store_path: entry.into_path(),
        })
}
