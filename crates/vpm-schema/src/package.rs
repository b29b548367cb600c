//! Package descriptors (`package.json`) as published by repositories.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::platform::{PartialPlatformVersion, PlatformVersion};
use crate::range::VersionRange;
use crate::version::Version;

/// One published version of one package.
///
/// Keys this crate does not model are kept in `extra` so a descriptor can be
/// written back without loss.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageJson {
    name: String,
    version: Version,
    #[serde(default)]
    url: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    vpm_dependencies: BTreeMap<String, VersionRange>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    legacy_folders: BTreeMap<String, Option<String>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    legacy_files: BTreeMap<String, Option<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    legacy_packages: Vec<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_platform"
    )]
    unity: Option<PartialPlatformVersion>,
    #[serde(rename = "zipSHA256", default, skip_serializing_if = "Option::is_none")]
    zip_sha256: Option<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// An unreadable `unity` value means "no requirement", not a broken package.
fn lenient_platform<'de, D>(deserializer: D) -> Result<Option<PartialPlatformVersion>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(Value::as_str)
        .and_then(|text| PartialPlatformVersion::parse(text).ok()))
}

impl PackageJson {
    /// Package identifier such as `com.vrchat.base`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Published version.
    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Download URL of the package archive. Empty for local packages.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Dependency ranges by package name.
    pub fn vpm_dependencies(&self) -> &BTreeMap<String, VersionRange> {
        &self.vpm_dependencies
    }

    /// Project-relative folders this package replaces, with their optional GUID.
    pub fn legacy_folders(&self) -> &BTreeMap<String, Option<String>> {
        &self.legacy_folders
    }

    /// Project-relative files this package replaces, with their optional GUID.
    pub fn legacy_files(&self) -> &BTreeMap<String, Option<String>> {
        &self.legacy_files
    }

    /// Names of packages this one supersedes.
    pub fn legacy_packages(&self) -> &[String] {
        &self.legacy_packages
    }

    /// Minimum editor `major.minor`, if declared.
    pub fn unity(&self) -> Option<&PartialPlatformVersion> {
        self.unity.as_ref()
    }

    /// SHA-256 of the package archive, if published.
    pub fn zip_sha256(&self) -> Option<&str> {
        self.zip_sha256.as_deref()
    }

    /// Keys not modelled by this type.
    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }

    /// Packages without a `unity` requirement run everywhere.
    pub fn is_compatible_with(&self, platform: &PlatformVersion) -> bool {
        self.unity
            .as_ref()
            .is_none_or(|unity| unity.is_compatible_with(platform))
    }
}

/// All known versions of one package inside a repository, keyed by version text.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageVersions {
    /// Descriptors by version text.
    #[serde(default)]
    pub versions: BTreeMap<String, PackageJson>,
}
