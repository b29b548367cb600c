use std::collections::{BTreeMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use futures::future::{join_all, try_join_all};
use tokio::fs;
use tracing::{debug, error, info};
use vpm_schema::{VpmDependency, VpmLockedDependency};

use super::legacy_assets::collect_legacy_assets;
use super::{AddPackageErr, PackageInstaller, UnityProject};
use crate::environment::{PackageCollection, PackageInfo};
use crate::resolution::{RequirementSource, collect_adding_packages};

/// Everything adding a set of packages will change, computed up front so a
/// caller can show it before committing.
#[derive(Debug)]
pub struct AddPackageRequest<'env> {
    dependencies: Vec<(String, VpmDependency)>,
    locked: Vec<PackageInfo<'env>>,
    legacy_files: Vec<PathBuf>,
    legacy_folders: Vec<PathBuf>,
    legacy_packages: Vec<String>,
    conflicts: BTreeMap<String, Vec<RequirementSource>>,
}

impl<'env> AddPackageRequest<'env> {
    /// Root dependencies to record.
    pub fn dependencies(&self) -> &[(String, VpmDependency)] {
        &self.dependencies
    }

    /// Packages to install and lock.
    pub fn locked(&self) -> &[PackageInfo<'env>] {
        &self.locked
    }

    /// Project-relative legacy files to delete.
    pub fn legacy_files(&self) -> &[PathBuf] {
        &self.legacy_files
    }

    /// Project-relative legacy folders to delete.
    pub fn legacy_folders(&self) -> &[PathBuf] {
        &self.legacy_folders
    }

    /// Locked packages superseded by the new ones.
    pub fn legacy_packages(&self) -> &[String] {
        &self.legacy_packages
    }

    /// Packages whose resolved version falls outside a range some other
    /// package requires, with every requirement on them.
    pub fn conflicts(&self) -> &BTreeMap<String, Vec<RequirementSource>> {
        &self.conflicts
    }
}

impl UnityProject {
    /// Plans adding `packages`.
    ///
    /// Requests a root dependency already rules out are dropped. Requests
    /// locked at the same or a newer version only become root dependencies
    /// (with `to_dependencies`); the rest are resolved.
    ///
    /// # Errors
    ///
    /// Fails only if resolution cannot find some dependency.
    pub async fn add_package_request<'env>(
        &self,
        env: &'env impl PackageCollection,
        mut packages: Vec<PackageInfo<'env>>,
        to_dependencies: bool,
        allow_prerelease: bool,
    ) -> Result<AddPackageRequest<'env>, AddPackageErr> {
        packages.retain(|package| {
            self.manifest
                .dependencies()
                .get(package.name())
                .is_none_or(|dependency| dependency.version.matches(package.version()))
        });

        let mut dependencies = Vec::new();
        let mut adding_packages = Vec::new();
        for request in packages {
            if to_dependencies {
                dependencies.push((request.name().to_string(), VpmDependency::new(request.version())));
            }
            let update = self
                .manifest
                .locked()
                .get(request.name())
                .is_none_or(|locked| locked.version < *request.version());
            if update {
                adding_packages.push(request);
            }
        }

        if adding_packages.is_empty() {
            debug!("every requested package is already locked");
            return Ok(AddPackageRequest {
                dependencies,
                locked: Vec::new(),
                legacy_files: Vec::new(),
                legacy_folders: Vec::new(),
                legacy_packages: Vec::new(),
                conflicts: BTreeMap::new(),
            });
        }

        let result = collect_adding_packages(
            self.manifest.dependencies(),
            self.manifest.locked(),
            self.unity_version.as_ref(),
            env,
            adding_packages,
            allow_prerelease,
        )?;

        let legacy_packages = result
            .found_legacy_packages
            .into_iter()
            .filter(|name| self.manifest.locked().contains_key(name))
            .collect();

        let legacy_assets = collect_legacy_assets(&self.project_dir, &result.new_packages).await;

        Ok(AddPackageRequest {
            dependencies,
            locked: result.new_packages,
            legacy_files: legacy_assets.files,
            legacy_folders: legacy_assets.folders,
            legacy_packages,
            conflicts: result.conflicts,
        })
    }

    /// Verifies that installing `packages` breaks nothing already in the project.
    ///
    /// A locked package that is itself being replaced is not checked against.
    ///
    /// # Errors
    ///
    /// The first conflict found with a locked or unlocked package.
    pub fn check_adding_packages(&self, packages: &[PackageInfo<'_>]) -> Result<(), AddPackageErr> {
        for package in packages {
            let unlocked = self.unlocked_packages.iter().any(|(dir_name, json)| {
                dir_name == package.name() || json.as_ref().is_some_and(|json| json.name() == package.name())
            });
            if unlocked {
                return Err(AddPackageErr::AlreadyInstalledAsUnlocked {
                    package_name: package.name().to_string(),
                });
            }
        }

        let replacing: HashSet<&str> = packages.iter().map(PackageInfo::name).collect();
        for (locked_name, locked) in self.manifest.locked() {
            if replacing.contains(locked_name.as_str()) {
                continue;
            }
            for package in packages {
                if let Some(range) = locked.dependencies.get(package.name()) {
                    if !range.match_pre(package.version(), true) {
                        return Err(AddPackageErr::ConflictWithDependencies {
                            conflict: package.name().to_string(),
                            dependency_name: locked_name.clone(),
                        });
                    }
                }
            }
        }

        for json in self.unlocked_packages.iter().filter_map(|(_, json)| json.as_ref()) {
            for package in packages {
                if let Some(range) = json.vpm_dependencies().get(package.name()) {
                    if !range.match_pre(package.version(), true) {
                        return Err(AddPackageErr::ConflictWithUnlocked {
                            conflict: package.name().to_string(),
                            dependency_name: json.name().to_string(),
                        });
                    }
                }
            }
        }

        Ok(())
    }

    /// Applies a planned request: installs the packages, records their
    /// dependencies and locks, then removes what they supersede.
    ///
    /// The conflict check runs before anything changes. The manifest is only
    /// touched once every install succeeded. Failing to remove a legacy asset
    /// is logged, not returned. The manifest is not saved.
    ///
    /// # Errors
    ///
    /// Any error from [`UnityProject::check_adding_packages`], or
    /// [`AddPackageErr::Install`] for the first package that failed to install.
    pub async fn do_add_package_request(
        &mut self,
        request: &AddPackageRequest<'_>,
        installer: &dyn PackageInstaller,
    ) -> Result<(), AddPackageErr> {
        self.check_adding_packages(request.locked())?;

        let packages_dir = self.project_dir.join("Packages");
        try_join_all(request.locked().iter().map(|package| {
            let packages_dir = &packages_dir;
            async move {
                installer
                    .install_package(*package, packages_dir)
                    .await
                    .map_err(|source| AddPackageErr::Install {
                        package: package.name().to_string(),
                        source,
                    })
            }
        }))
        .await?;

        for (name, dependency) in request.dependencies() {
            self.manifest.add_dependency(name, dependency.clone());
        }
        for package in request.locked() {
            let locked = VpmLockedDependency::new(package.version().clone(), package.vpm_dependencies().clone());
            self.manifest.add_locked(package.name(), locked);
        }
        self.manifest
            .remove_packages(request.legacy_packages().iter().map(String::as_str));

        let files = request
            .legacy_files()
            .iter()
            .map(|path| remove_legacy_file(self.project_dir.join(path)));
        let folders = request
            .legacy_folders()
            .iter()
            .map(|path| remove_legacy_folder(self.project_dir.join(path)));
        join_all(files).await;
        join_all(folders).await;
        join_all(
            request
                .legacy_packages()
                .iter()
                .map(|name| remove_legacy_package(packages_dir.join(name))),
        )
        .await;

        Ok(())
    }
}

async fn remove_meta_file(asset: &Path) {
    let mut meta = asset.as_os_str().to_owned();
    meta.push(".meta");
    if let Err(e) = fs::remove_file(&meta).await {
        if e.kind() != ErrorKind::NotFound {
            error!(path = %asset.display(), "removing legacy asset meta: {e}");
        }
    }
}

async fn remove_legacy_file(path: PathBuf) {
    match fs::remove_file(&path).await {
        Ok(()) => info!(path = %path.display(), "removed legacy file"),
        Err(e) => error!(path = %path.display(), "removing legacy file: {e}"),
    }
    remove_meta_file(&path).await;
}

async fn remove_legacy_folder(path: PathBuf) {
    match fs::remove_dir_all(&path).await {
        Ok(()) => info!(path = %path.display(), "removed legacy folder"),
        Err(e) => error!(path = %path.display(), "removing legacy folder: {e}"),
    }
    remove_meta_file(&path).await;
}

async fn remove_legacy_package(path: PathBuf) {
    match fs::remove_dir_all(&path).await {
        Ok(()) => info!(path = %path.display(), "removed legacy package"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => error!(path = %path.display(), "removing legacy package: {e}"),
    }
}
