use std::collections::BTreeMap;
use std::path::Path;

use vpm_schema::{VpmDependency, VpmLockedDependency, VpmManifestFile};

use crate::io::json::{JsonFileError, read_json_file, write_json_file};

/// `Packages/vpm-manifest.json`, tracked for changes.
#[derive(Debug, Default)]
pub struct VpmManifest {
    file: VpmManifestFile,
    changed: bool,
}

impl VpmManifest {
    /// A missing manifest reads as empty.
    ///
    /// # Errors
    ///
    /// Fails when the file exists but cannot be read or parsed.
    pub async fn load(path: &Path) -> Result<Self, JsonFileError> {
        Ok(Self {
            file: read_json_file(path).await?.unwrap_or_default(),
            changed: false,
        })
    }

    /// Root dependencies, by package name.
    pub fn dependencies(&self) -> &BTreeMap<String, VpmDependency> {
        &self.file.dependencies
    }

    /// Locked packages, by name.
    pub fn locked(&self) -> &BTreeMap<String, VpmLockedDependency> {
        &self.file.locked
    }

    /// Whether there are unsaved edits.
    pub fn is_changed(&self) -> bool {
        self.changed
    }

    /// Records or replaces a root dependency.
    pub fn add_dependency(&mut self, name: &str, dependency: VpmDependency) {
        self.file.dependencies.insert(name.to_string(), dependency);
        self.changed = true;
    }

    /// Locks `name` at the given version, replacing any previous lock.
    pub fn add_locked(&mut self, name: &str, dependency: VpmLockedDependency) {
        self.file.locked.insert(name.to_string(), dependency);
        self.changed = true;
    }

    /// Drops `names` from both root and locked dependencies.
    pub fn remove_packages<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) {
        for name in names {
            self.file.locked.remove(name);
            self.file.dependencies.remove(name);
        }
        self.changed = true;
    }

    /// Writes the manifest if it changed.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be written.
    pub async fn save_to(&mut self, path: &Path) -> Result<(), JsonFileError> {
        if !self.changed {
            return Ok(());
        }
        write_json_file(path, &self.file).await?;
        self.changed = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use vpm_schema::Version;

    #[tokio::test]
    async fn test_missing_manifest_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vpm-manifest.json");
        let mut manifest = VpmManifest::load(&path).await.unwrap();
        assert!(manifest.dependencies().is_empty());
        assert!(manifest.locked().is_empty());

        manifest.save_to(&path).await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_edits_are_saved_with_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vpm-manifest.json");
        write_json_file(
            &path,
            &json!({
                "dependencies": { "old": { "version": "1.0.0" } },
                "locked": { "old": { "version": "1.0.0" } },
                "comment": "kept",
            }),
        )
        .await
        .unwrap();

        let mut manifest = VpmManifest::load(&path).await.unwrap();
        let version = Version::new(2, 1, 0);
        manifest.add_dependency("new", VpmDependency::new(&version));
        manifest.add_dependency("new", VpmDependency::new(&version));
        manifest.add_locked("new", VpmLockedDependency::new(version, BTreeMap::new()));
        manifest.remove_packages(["old"]);
        assert!(manifest.is_changed());
        manifest.save_to(&path).await.unwrap();
        assert!(!manifest.is_changed());

        let saved: Value = read_json_file(&path).await.unwrap().unwrap();
        assert_eq!(
            saved,
            json!({
                "dependencies": { "new": { "version": "2.1.0" } },
                "locked": { "new": { "version": "2.1.0", "dependencies": {} } },
                "comment": "kept",
            })
        );
    }
}
