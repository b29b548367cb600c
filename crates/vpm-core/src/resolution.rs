//! Dependency resolution.
//!
//! Resolution is a worklist fixed point. Every package name the run touches
//! gets a [`DependencyInfo`] recording who requires it (and with which
//! range), which version is currently chosen, and which resolved packages
//! declare it as a legacy package. Candidates are committed one at a time
//! from a LIFO queue; committing one may enqueue replacements for its
//! dependencies, at most one pending candidate per name.
//!
//! Only a dependency that cannot be found at all is fatal. Unsatisfied
//! ranges are reported as conflicts alongside the resolved set.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use thiserror::Error;
use tracing::debug;
use vpm_schema::{PlatformVersion, Version, VersionRange, VpmDependency, VpmLockedDependency};

use crate::environment::{PackageCollection, PackageInfo, VersionSelector};

/// Who placed a requirement on a package.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RequirementSource {
    /// The project's own `dependencies`.
    Root,
    /// Another package, by name.
    Package(String),
}

impl fmt::Display for RequirementSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => f.write_str("(project)"),
            Self::Package(name) => f.write_str(name),
        }
    }
}

/// Why resolution failed.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// No known version of `dependency` satisfies `range`.
    #[error("dependency not found: {dependency}@{range} (required by {required_by})")]
    DependencyNotFound {
        /// Missing package.
        dependency: String,
        /// Package that declared the requirement.
        required_by: String,
        /// Required range.
        range: VersionRange,
    },
}

/// Outcome of a successful resolution.
#[derive(Debug)]
pub struct PackageResolutionResult<'env> {
    /// Resolved packages to install, by name.
    pub new_packages: Vec<PackageInfo<'env>>,
    /// Package name to the sources whose range its resolved version fails.
    pub conflicts: BTreeMap<String, Vec<RequirementSource>>,
    /// Names superseded by a resolved or locked package.
    pub found_legacy_packages: Vec<String>,
}

/// Pending candidates, one per name. The most recently added is processed first.
#[derive(Debug, Default)]
struct PackageQueue<'env> {
    pending: Vec<PackageInfo<'env>>,
}

impl<'env> PackageQueue<'env> {
    fn new(packages: Vec<PackageInfo<'env>>) -> Self {
        Self { pending: packages }
    }

    fn next_package(&mut self) -> Option<PackageInfo<'env>> {
        self.pending.pop()
    }

    fn find_pending_package(&self, name: &str) -> Option<&PackageInfo<'env>> {
        self.pending.iter().find(|pending| pending.name() == name)
    }

    /// Replaces any pending candidate of the same name.
    fn add_pending_package(&mut self, package: PackageInfo<'env>) {
        self.pending.retain(|pending| pending.name() != package.name());
        self.pending.push(package);
    }
}

#[derive(Debug, Default)]
struct DependencyInfo<'env> {
    using: Option<PackageInfo<'env>>,
    current: Option<Version>,
    requirements: BTreeMap<RequirementSource, VersionRange>,
    dependencies: BTreeSet<String>,
    /// Packages that declare this one as legacy.
    modern_packages: BTreeSet<String>,
    legacy_packages: &'env [String],
    allow_pre: bool,
    touched: bool,
}

impl<'env> DependencyInfo<'env> {
    fn new_root(range: VersionRange, allow_pre: bool) -> Self {
        Self {
            requirements: BTreeMap::from([(RequirementSource::Root, range)]),
            allow_pre,
            ..Self::default()
        }
    }

    fn add_range(&mut self, source: &str, range: VersionRange) {
        self.requirements
            .insert(RequirementSource::Package(source.to_string()), range);
        self.touched = true;
    }

    fn remove_range(&mut self, source: &str) {
        self.requirements
            .remove(&RequirementSource::Package(source.to_string()));
        self.touched = true;
    }

    fn add_modern_package(&mut self, modern: &str) {
        self.modern_packages.insert(modern.to_string());
        self.touched = true;
    }

    fn remove_modern_package(&mut self, modern: &str) {
        self.modern_packages.remove(modern);
        self.touched = true;
    }

    fn is_legacy(&self) -> bool {
        !self.modern_packages.is_empty()
    }

    fn set_using_info(&mut self, version: &Version, dependencies: BTreeSet<String>) {
        self.allow_pre |= version.is_pre();
        self.current = Some(version.clone());
        self.dependencies = dependencies;
    }
}

struct ResolutionContext<'env> {
    allow_prerelease: bool,
    pending_queue: PackageQueue<'env>,
    dependencies: BTreeMap<String, DependencyInfo<'env>>,
}

impl<'env> ResolutionContext<'env> {
    fn new(allow_prerelease: bool, packages: Vec<PackageInfo<'env>>) -> Self {
        let mut dependencies = BTreeMap::<String, DependencyInfo<'env>>::new();
        // explicitly requested packages may be prereleases
        for package in &packages {
            dependencies.entry(package.name().to_string()).or_default().allow_pre = true;
        }
        Self {
            allow_prerelease,
            pending_queue: PackageQueue::new(packages),
            dependencies,
        }
    }

    fn entry(&mut self, name: &str) -> &mut DependencyInfo<'env> {
        self.dependencies.entry(name.to_string()).or_default()
    }

    fn allow_prerelease_for(&self, name: &str) -> bool {
        self.allow_prerelease || self.dependencies.get(name).is_some_and(|info| info.allow_pre)
    }

    fn add_root_dependency(&mut self, name: &str, range: VersionRange, allow_pre: bool) {
        self.dependencies
            .insert(name.to_string(), DependencyInfo::new_root(range, allow_pre));
    }

    fn add_locked_dependency(
        &mut self,
        name: &str,
        locked: &VpmLockedDependency,
        env: &'env impl PackageCollection,
    ) {
        let info = self.entry(name);
        info.set_using_info(&locked.version, locked.dependencies.keys().cloned().collect());

        if let Some(package) = env.find_package_by_name(name, VersionSelector::Specific(&locked.version)) {
            info.legacy_packages = package.legacy_packages();
            for legacy in package.legacy_packages() {
                self.entry(legacy).modern_packages.insert(name.to_string());
            }
        }

        for (dependency, range) in &locked.dependencies {
            self.entry(dependency)
                .requirements
                .insert(RequirementSource::Package(name.to_string()), range.clone());
        }
    }

    /// Commits `package` as the chosen version of its name.
    ///
    /// Returns false, changing nothing, when the name is superseded.
    fn add_package(&mut self, package: PackageInfo<'env>) -> bool {
        let name = package.name();
        let vpm_dependencies = package.vpm_dependencies();
        let legacy_packages = package.legacy_packages();

        let entry = self.entry(name);
        if entry.is_legacy() {
            return false;
        }

        entry.touched = true;
        entry.current = Some(package.version().clone());
        entry.using = Some(package);
        let old_dependencies =
            std::mem::replace(&mut entry.dependencies, vpm_dependencies.keys().cloned().collect());
        let old_legacy_packages = std::mem::replace(&mut entry.legacy_packages, legacy_packages);

        for dependency in &old_dependencies {
            if let Some(info) = self.dependencies.get_mut(dependency) {
                info.remove_range(name);
            }
        }
        for (dependency, range) in vpm_dependencies {
            self.entry(dependency).add_range(name, range.clone());
        }

        for legacy in old_legacy_packages {
            if let Some(info) = self.dependencies.get_mut(legacy) {
                info.remove_modern_package(name);
            }
        }
        for legacy in legacy_packages {
            self.entry(legacy).add_modern_package(name);
        }

        true
    }

    /// Whether `name` needs a (new) candidate to satisfy `range`.
    fn should_add_package(&self, name: &str, range: &VersionRange) -> bool {
        let Some(entry) = self.dependencies.get(name) else {
            return true;
        };
        if entry.is_legacy() {
            return false;
        }

        let allow_prerelease = entry.allow_pre || self.allow_prerelease;
        match self.pending_queue.find_pending_package(name) {
            Some(pending) => !range.match_pre(pending.version(), allow_prerelease),
            None => !entry
                .current
                .as_ref()
                .is_some_and(|current| range.match_pre(current, allow_prerelease)),
        }
    }

    fn build_result(self) -> PackageResolutionResult<'env> {
        let mut conflicts = BTreeMap::<String, Vec<RequirementSource>>::new();
        for (name, info) in &self.dependencies {
            if info.is_legacy() || !info.touched {
                continue;
            }
            let Some(current) = &info.current else {
                continue;
            };
            let allow_prerelease = info.allow_pre || self.allow_prerelease;
            for (source, range) in &info.requirements {
                if !range.match_pre(current, allow_prerelease) {
                    conflicts.entry(name.clone()).or_default().push(source.clone());
                }
            }
        }

        let found_legacy_packages = self
            .dependencies
            .iter()
            .filter(|(_, info)| info.is_legacy())
            .map(|(name, _)| name.clone())
            .collect();

        let new_packages = self
            .dependencies
            .values()
            .filter(|info| !info.is_legacy())
            .filter_map(|info| info.using)
            .collect();

        PackageResolutionResult {
            new_packages,
            conflicts,
            found_legacy_packages,
        }
    }
}

/// Resolves `packages` against the project's current root and locked dependencies.
///
/// Candidates for dependencies are looked up compatible with `unity_version`
/// first, then with any editor version.
///
/// # Errors
///
/// Returns [`ResolveError::DependencyNotFound`] if some dependency has no
/// candidate at all.
pub fn collect_adding_packages<'env>(
    dependencies: &BTreeMap<String, VpmDependency>,
    locked_dependencies: &BTreeMap<String, VpmLockedDependency>,
    unity_version: Option<&PlatformVersion>,
    env: &'env impl PackageCollection,
    packages: Vec<PackageInfo<'env>>,
    allow_prerelease: bool,
) -> Result<PackageResolutionResult<'env>, ResolveError> {
    let mut context = ResolutionContext::new(allow_prerelease, packages);

    for (name, dependency) in dependencies {
        let (range, allow_pre) = match dependency.version.as_single_version() {
            Some(mut min_version) => {
                let mut allow_pre = min_version.is_pre();
                if let Some(locked) = locked_dependencies.get(name) {
                    allow_pre |= locked.version.is_pre();
                    // never ask for more than what is installed
                    if locked.version < min_version {
                        min_version = locked.version.clone();
                    }
                }
                (VersionRange::same_or_later(&min_version), allow_pre)
            }
            None => {
                let range = dependency.version.as_range();
                let allow_pre = range.contains_pre();
                (range, allow_pre)
            }
        };
        context.add_root_dependency(name, range, allow_pre);
    }

    for (name, locked) in locked_dependencies {
        context.add_locked_dependency(name, locked, env);
    }

    while let Some(package) = context.pending_queue.next_package() {
        let name = package.name();
        debug!("processing package {name} version {}", package.version());

        if !context.add_package(package) {
            debug!("{name} is superseded by a legacy declaration, skipped");
            continue;
        }

        for (dependency, range) in package.vpm_dependencies() {
            if !context.should_add_package(dependency, range) {
                continue;
            }

            let include_prerelease = context.allow_prerelease_for(dependency);
            let selector = |platform| VersionSelector::RangeFor {
                platform,
                range,
                include_prerelease,
            };
            let found = env
                .find_package_by_name(dependency, selector(unity_version))
                .or_else(|| env.find_package_by_name(dependency, selector(None)))
                .ok_or_else(|| ResolveError::DependencyNotFound {
                    dependency: dependency.clone(),
                    required_by: name.to_string(),
                    range: range.clone(),
                })?;

            debug!("{name}: queueing {dependency} version {}", found.version());
            context.pending_queue.add_pending_package(found);
        }
    }

    Ok(context.build_result())
}
