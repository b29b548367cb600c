//! A Unity project's package state.

mod add_package;
mod legacy_assets;
mod manifest;

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::fs;
use tracing::warn;
use vpm_schema::{PackageJson, PlatformVersion, Version, VersionRange};

pub use add_package::AddPackageRequest;
pub use manifest::VpmManifest;

use crate::environment::PackageInfo;
use crate::io::json::{JsonFileError, read_json_file};
use crate::paths::{MANIFEST_PATH, PROJECT_VERSION_PATH};
use crate::resolution::ResolveError;

/// Failure loading or saving a project.
#[derive(Error, Debug)]
pub enum ProjectError {
    /// The manifest could not be read or written.
    #[error(transparent)]
    Json(#[from] JsonFileError),

    /// A project folder could not be listed.
    #[error("IO error on {}: {source}", path.display())]
    Io {
        /// Folder being read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Why packages could not be added to a project.
#[derive(Error, Debug)]
pub enum AddPackageErr {
    /// Resolution could not satisfy some dependency.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// A new version falls outside a range a locked package requires.
    #[error("{conflict} would break the version range required by locked package {dependency_name}")]
    ConflictWithDependencies {
        /// Package being added.
        conflict: String,
        /// Locked package whose requirement breaks.
        dependency_name: String,
    },

    /// The package already sits in `Packages/` without a manifest entry.
    #[error("{package_name} is already installed as an unlocked package")]
    AlreadyInstalledAsUnlocked {
        /// Package being added.
        package_name: String,
    },

    /// A new version falls outside a range an unlocked package requires.
    #[error("{conflict} would break the version range required by unlocked package {dependency_name}")]
    ConflictWithUnlocked {
        /// Package being added.
        conflict: String,
        /// Unlocked package whose requirement breaks.
        dependency_name: String,
    },

    /// The installer failed.
    #[error("installing {package}: {source}")]
    Install {
        /// Package that failed to install.
        package: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// What adding one package to a project involves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddPackageStatus {
    /// A root dependency already covers the requested version.
    AlreadyAdded,
    /// Locked at the requested version or newer: only the root dependency is missing.
    JustAddToDependency,
    /// Needs resolution and installation.
    InstallToLocked,
}

/// Puts a resolved package's files into `Packages/`.
#[async_trait]
pub trait PackageInstaller: Send + Sync {
    /// Installs `package` into `packages_dir/<name>`.
    ///
    /// # Errors
    ///
    /// Any I/O failure while fetching or extracting the package.
    async fn install_package(&self, package: PackageInfo<'_>, packages_dir: &Path) -> std::io::Result<()>;
}

/// A Unity project: its manifest, its `Packages/` folder and its editor version.
#[derive(Debug)]
pub struct UnityProject {
    project_dir: PathBuf,
    manifest: VpmManifest,
    unity_version: Option<PlatformVersion>,
    /// Folders in `Packages/` not managed by the manifest, by folder name.
    unlocked_packages: Vec<(String, Option<PackageJson>)>,
    installed_packages: BTreeMap<String, PackageJson>,
}

impl UnityProject {
    /// Reads the manifest, the `Packages/` folder and the editor version.
    ///
    /// # Errors
    ///
    /// Fails when the manifest is malformed or `Packages/` cannot be listed.
    pub async fn load(project_dir: &Path) -> Result<Self, ProjectError> {
        let manifest = VpmManifest::load(&project_dir.join(MANIFEST_PATH)).await?;

        let mut installed_packages = BTreeMap::new();
        let mut unlocked_packages = Vec::new();
        for (dir_name, package) in read_packages_dir(&project_dir.join("Packages")).await? {
            match package {
                Some(json) if json.name() == dir_name && manifest.locked().contains_key(&dir_name) => {
                    installed_packages.insert(dir_name, json);
                }
                package => unlocked_packages.push((dir_name, package)),
            }
        }

        let unity_version = read_unity_version(&project_dir.join(PROJECT_VERSION_PATH)).await?;

        Ok(Self {
            project_dir: project_dir.to_path_buf(),
            manifest,
            unity_version,
            unlocked_packages,
            installed_packages,
        })
    }

    /// Project root.
    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// The project's manifest, with any unsaved edits.
    pub fn manifest(&self) -> &VpmManifest {
        &self.manifest
    }

    /// Editor version from `ProjectSettings/ProjectVersion.txt`, if readable.
    pub fn unity_version(&self) -> Option<&PlatformVersion> {
        self.unity_version.as_ref()
    }

    /// Folders in `Packages/` the manifest does not lock, with their descriptor if readable.
    pub fn unlocked_packages(&self) -> &[(String, Option<PackageJson>)] {
        &self.unlocked_packages
    }

    /// Locked packages present on disk, by name.
    pub fn installed_packages(&self) -> &BTreeMap<String, PackageJson> {
        &self.installed_packages
    }

    /// Descriptor of the locked package `name`, if installed.
    pub fn get_installed_package(&self, name: &str) -> Option<&PackageJson> {
        self.installed_packages.get(name)
    }

    /// Classifies a request to add `name` at `version`.
    pub fn add_package_status(&self, name: &str, version: &Version) -> AddPackageStatus {
        if let Some(dependency) = self.manifest.dependencies().get(name) {
            let covered = match dependency.version.as_single_version() {
                Some(minimum) => minimum >= *version,
                None => dependency.version.as_range().matches(version),
            };
            if covered {
                return AddPackageStatus::AlreadyAdded;
            }
        }

        match self.manifest.locked().get(name) {
            Some(locked) if locked.version >= *version => AddPackageStatus::JustAddToDependency,
            _ => AddPackageStatus::InstallToLocked,
        }
    }

    /// Dependency ranges declared by every locked package and every readable
    /// unlocked package.
    pub fn all_dependencies(&self) -> impl Iterator<Item = (&str, &BTreeMap<String, VersionRange>)> {
        let locked = self
            .manifest
            .locked()
            .iter()
            .map(|(name, locked)| (name.as_str(), &locked.dependencies));
        let unlocked = self
            .unlocked_packages
            .iter()
            .filter_map(|(_, json)| json.as_ref())
            .map(|json| (json.name(), json.vpm_dependencies()));
        locked.chain(unlocked)
    }

    /// Writes the manifest if it changed.
    ///
    /// # Errors
    ///
    /// Fails when the manifest cannot be written.
    pub async fn save(&mut self) -> Result<(), ProjectError> {
        self.manifest.save_to(&self.project_dir.join(MANIFEST_PATH)).await?;
        Ok(())
    }
}

async fn read_packages_dir(packages: &Path) -> Result<Vec<(String, Option<PackageJson>)>, ProjectError> {
    let io_err = |source| ProjectError::Io {
        path: packages.to_path_buf(),
        source,
    };

    let mut entries = match fs::read_dir(packages).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_err(e)),
    };

    let mut found = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
        if !entry.file_type().await.map_err(io_err)?.is_dir() {
            continue;
        }
        let dir_name = entry.file_name().to_string_lossy().into_owned();
        let package = match read_json_file::<PackageJson>(&entry.path().join("package.json")).await {
            Ok(package) => package,
            Err(e) => {
                warn!("unreadable package in {dir_name}: {e}");
                None
            }
        };
        found.push((dir_name, package));
    }
    found.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(found)
}

/// The `m_EditorVersion` of `ProjectSettings/ProjectVersion.txt`, if readable.
async fn read_unity_version(path: &Path) -> Result<Option<PlatformVersion>, ProjectError> {
    let text = match fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ProjectError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let Some(value) = text
        .lines()
        .find_map(|line| line.strip_prefix("m_EditorVersion:"))
        .map(str::trim)
    else {
        return Ok(None);
    };

    match PlatformVersion::parse(value) {
        Ok(version) => Ok(Some(version)),
        Err(e) => {
            warn!("ignoring editor version {value:?}: {e}");
            Ok(None)
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::io::json::write_json_file;
    use serde_json::{Value, json};

    /// Writes a project with one locked package, one unlocked package and
    /// a 2022.3 editor.
    pub(crate) async fn write_project(root: &Path, manifest: Value) {
        write_json_file(&root.join(MANIFEST_PATH), &manifest).await.unwrap();
        write_json_file(
            &root.join("Packages/com.example.installed/package.json"),
            &json!({ "name": "com.example.installed", "version": "1.0.0" }),
        )
        .await
        .unwrap();
        write_json_file(
            &root.join("Packages/com.example.unlocked/package.json"),
            &json!({
                "name": "com.example.unlocked",
                "version": "0.1.0",
                "vpmDependencies": { "com.example.shared": "^1.0.0" },
            }),
        )
        .await
        .unwrap();
        fs::create_dir_all(root.join("ProjectSettings")).await.unwrap();
        fs::write(
            root.join(PROJECT_VERSION_PATH),
            "m_EditorVersion: 2022.3.22f1\nm_EditorVersionWithRevision: 2022.3.22f1 (887be4894c44)\n",
        )
        .await
        .unwrap();
    }

    pub(crate) fn base_manifest() -> Value {
        json!({
            "dependencies": {
                "com.example.installed": { "version": "1.0.0" },
            },
            "locked": {
                "com.example.installed": {
                    "version": "1.0.0",
                    "dependencies": { "com.example.shared": "^1.0.0" },
                },
                "com.example.shared": { "version": "1.2.0" },
            },
        })
    }

    #[tokio::test]
    async fn test_load_classifies_packages() {
        let project = tempfile::tempdir().unwrap();
        write_project(project.path(), base_manifest()).await;
        fs::create_dir_all(project.path().join("Packages/com.example.nojson")).await.unwrap();
        fs::write(project.path().join("Packages/manifest.json"), "{}").await.unwrap();

        let loaded = UnityProject::load(project.path()).await.unwrap();
        assert_eq!(loaded.unity_version().map(ToString::to_string).as_deref(), Some("2022.3.22f1"));
        assert!(loaded.get_installed_package("com.example.installed").is_some());

        let unlocked: Vec<_> = loaded
            .unlocked_packages()
            .iter()
            .map(|(dir, json)| (dir.as_str(), json.is_some()))
            .collect();
        assert_eq!(unlocked, [("com.example.nojson", false), ("com.example.unlocked", true)]);

        let dependents: Vec<_> = loaded
            .all_dependencies()
            .filter(|(_, deps)| deps.contains_key("com.example.shared"))
            .map(|(name, _)| name)
            .collect();
        assert_eq!(dependents, ["com.example.installed", "com.example.unlocked"]);
    }

    #[tokio::test]
    async fn test_empty_directory_is_a_project() {
        let project = tempfile::tempdir().unwrap();
        let loaded = UnityProject::load(project.path()).await.unwrap();
        assert!(loaded.unity_version().is_none());
        assert!(loaded.manifest().locked().is_empty());
        assert!(loaded.unlocked_packages().is_empty());
    }

    #[tokio::test]
    async fn test_add_package_status() {
        let project = tempfile::tempdir().unwrap();
        let mut manifest = base_manifest();
        manifest["dependencies"]["com.example.ranged"] = json!({ "version": "^2.0.0" });
        write_project(project.path(), manifest).await;
        let loaded = UnityProject::load(project.path()).await.unwrap();

        let status = |name: &str, version: &str| {
            loaded.add_package_status(name, &Version::parse(version).unwrap())
        };
        assert_eq!(status("com.example.installed", "0.9.0"), AddPackageStatus::AlreadyAdded);
        assert_eq!(status("com.example.installed", "1.0.0"), AddPackageStatus::AlreadyAdded);
        assert_eq!(status("com.example.installed", "1.1.0"), AddPackageStatus::InstallToLocked);
        assert_eq!(status("com.example.ranged", "2.3.0"), AddPackageStatus::AlreadyAdded);
        assert_eq!(status("com.example.shared", "1.1.0"), AddPackageStatus::JustAddToDependency);
        assert_eq!(status("com.example.shared", "1.2.0"), AddPackageStatus::JustAddToDependency);
        assert_eq!(status("com.example.shared", "1.3.0"), AddPackageStatus::InstallToLocked);
        assert_eq!(status("com.example.new", "1.0.0"), AddPackageStatus::InstallToLocked);
    }
}
