//! Project manifest records (`Packages/vpm-manifest.json`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::range::{DependencyRange, VersionRange};
use crate::version::Version;

/// A root dependency request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VpmDependency {
    /// Pinned minimum or full range.
    pub version: DependencyRange,
}

impl VpmDependency {
    /// Pins `version` as the minimum.
    pub fn new(version: &Version) -> Self {
        Self {
            version: DependencyRange::version(version),
        }
    }
}

/// An installed package and the dependency ranges it declared when locked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VpmLockedDependency {
    /// The installed version.
    pub version: Version,
    /// Ranges the package declared when it was locked.
    #[serde(default)]
    pub dependencies: BTreeMap<String, VersionRange>,
}

impl VpmLockedDependency {
    /// A lock entry for `version` with its declared dependency ranges.
    pub fn new(version: Version, dependencies: BTreeMap<String, VersionRange>) -> Self {
        Self {
            version,
            dependencies,
        }
    }
}

/// The manifest file as stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VpmManifestFile {
    /// Root dependencies requested by the project.
    #[serde(default)]
    pub dependencies: BTreeMap<String, VpmDependency>,
    /// Every installed package, by name.
    #[serde(default)]
    pub locked: BTreeMap<String, VpmLockedDependency>,
    /// Keys not modelled above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
