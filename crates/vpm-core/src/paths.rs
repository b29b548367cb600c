//! Well-known locations of the VPM home and of project files.

use std::path::{Path, PathBuf};

/// Returns the VPM data directory, or None if the platform data directory cannot be resolved.
pub fn try_vpm_home() -> Option<PathBuf> {
    if let Ok(val) = std::env::var("VPM_HOME") {
        return Some(PathBuf::from(val));
    }
    dirs::data_local_dir().map(|d| d.join("VRChatCreatorCompanion"))
}

/// Global settings: <vpm home>/settings.json
pub fn settings_path(home: &Path) -> PathBuf {
    home.join("settings.json")
}

/// Repository cache directory: <vpm home>/Repos
pub fn repos_dir(home: &Path) -> PathBuf {
    home.join("Repos")
}

/// Project manifest, relative to the project root.
pub const MANIFEST_PATH: &str = "Packages/vpm-manifest.json";

/// Editor version file, relative to the project root.
pub const PROJECT_VERSION_PATH: &str = "ProjectSettings/ProjectVersion.txt";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_paths() {
        let home = Path::new("/data/vpm");
        assert_eq!(settings_path(home), Path::new("/data/vpm/settings.json"));
        assert_eq!(repos_dir(home), Path::new("/data/vpm/Repos"));
    }
}
