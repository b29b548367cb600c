//! Shared data model for VPM package resolution.
//!
//! Everything in this crate is pure data: version parsing and ordering,
//! range matching, and the typed JSON records that make up repository
//! caches, package descriptors, project manifests and global settings.
//! No I/O happens here; see `vpm-core` for behaviour.

pub mod manifest;
pub mod package;
pub mod platform;
pub mod range;
pub mod repository;
pub mod settings;
pub mod version;

// Re-exports
pub use manifest::{VpmDependency, VpmLockedDependency, VpmManifestFile};
pub use package::{PackageJson, PackageVersions};
pub use platform::{PartialPlatformVersion, PlatformVersion, PlatformVersionParseError, ReleaseChannel};
pub use range::{DependencyRange, RangeParseError, VersionRange};
pub use repository::{CreationInfo, Description, LocalCachedRepository, Repository, VrcGetMeta};
pub use settings::{SettingsFile, UserRepoSetting};
pub use version::{PrereleaseComponent, Version, VersionParseError};

/// Strips a leading UTF-8 byte order mark, which some editors write into JSON files.
pub fn strip_bom(text: &str) -> &str {
    text.strip_prefix('\u{feff}').unwrap_or(text)
}

/// Byte-slice variant of [`strip_bom`].
pub fn strip_bom_bytes(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes)
}
