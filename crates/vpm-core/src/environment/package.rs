//! Lookup surface shared by the environment and the resolver.

use std::collections::BTreeMap;
use std::path::Path;

use vpm_schema::{LocalCachedRepository, PackageJson, PlatformVersion, Version, VersionRange};

/// Where a candidate package comes from.
#[derive(Debug, Clone, Copy)]
pub enum PackageSource<'a> {
    /// Listed by a (cached) repository; installed by downloading `url`.
    Remote(&'a LocalCachedRepository),
    /// A folder on disk, from the user package folders.
    Local(&'a Path),
}

/// One candidate version of a package, borrowed from wherever it was found.
#[derive(Debug, Clone, Copy)]
pub struct PackageInfo<'a> {
    json: &'a PackageJson,
    source: PackageSource<'a>,
}

impl<'a> PackageInfo<'a> {
    /// A candidate listed by `repo`.
    pub fn remote(json: &'a PackageJson, repo: &'a LocalCachedRepository) -> Self {
        Self {
            json,
            source: PackageSource::Remote(repo),
        }
    }

    /// A candidate read from the package folder at `path`.
    pub fn local(json: &'a PackageJson, path: &'a Path) -> Self {
        Self {
            json,
            source: PackageSource::Local(path),
        }
    }

    /// The full descriptor.
    pub fn package_json(&self) -> &'a PackageJson {
        self.json
    }

    /// Where the candidate was found.
    pub fn source(&self) -> PackageSource<'a> {
        self.source
    }

    /// Whether the candidate comes from a repository.
    pub fn is_remote(&self) -> bool {
        matches!(self.source, PackageSource::Remote(_))
    }

    /// Package name.
    pub fn name(&self) -> &'a str {
        self.json.name()
    }

    /// Package version.
    pub fn version(&self) -> &'a Version {
        self.json.version()
    }

    /// Declared dependency ranges.
    pub fn vpm_dependencies(&self) -> &'a BTreeMap<String, VersionRange> {
        self.json.vpm_dependencies()
    }

    /// Names this package supersedes.
    pub fn legacy_packages(&self) -> &'a [String] {
        self.json.legacy_packages()
    }
}

/// Which versions of a package a lookup accepts.
#[derive(Debug, Clone, Copy)]
pub enum VersionSelector<'a> {
    /// Any release version.
    Latest,
    /// Any version at all.
    LatestIncludingPrerelease,
    /// Exactly this version.
    Specific(&'a Version),
    /// Versions matching the range, prereleases suppressed.
    Range(&'a VersionRange),
    /// Versions matching the range that also run on `platform` (when given).
    RangeFor {
        /// Project editor version, if known.
        platform: Option<&'a PlatformVersion>,
        /// Required range.
        range: &'a VersionRange,
        /// Whether prerelease versions may match.
        include_prerelease: bool,
    },
}

impl VersionSelector<'_> {
    /// Whether `package` is acceptable.
    pub fn satisfies(&self, package: &PackageJson) -> bool {
        match *self {
            Self::Latest => !package.version().is_pre(),
            Self::LatestIncludingPrerelease => true,
            Self::Specific(version) => package.version() == version,
            Self::Range(range) => range.matches(package.version()),
            Self::RangeFor {
                platform,
                range,
                include_prerelease,
            } => {
                platform.is_none_or(|platform| package.is_compatible_with(platform))
                    && range.match_pre(package.version(), include_prerelease)
            }
        }
    }
}

/// Anything the resolver can ask for package candidates.
pub trait PackageCollection {
    /// Every known candidate named `package`, in no particular order.
    fn find_packages(&self, package: &str) -> Vec<PackageInfo<'_>>;

    /// The highest candidate version accepted by `selector`.
    fn find_package_by_name(
        &self,
        package: &str,
        selector: VersionSelector<'_>,
    ) -> Option<PackageInfo<'_>> {
        self.find_packages(package)
            .into_iter()
            .filter(|candidate| selector.satisfies(candidate.package_json()))
            .max_by(|a, b| a.version().cmp(b.version()))
    }
}
