//! Package resolution for VPM projects.
//!
//! [`Environment`] aggregates repository caches and user packages,
//! [`UnityProject`] holds a project's manifest and installed packages, and
//! [`resolution`] computes what adding packages to a project involves.

pub mod environment;
pub mod io;
pub mod paths;
pub mod project;
pub mod resolution;

pub use environment::{
    Environment, EnvironmentError, PackageCollection, PackageInfo, PackageSource, VersionSelector,
};
pub use paths::*;
pub use project::{
    AddPackageErr, AddPackageRequest, AddPackageStatus, PackageInstaller, UnityProject,
};
pub use resolution::{PackageResolutionResult, RequirementSource, ResolveError};

/// User Agent string for repository requests
pub const USER_AGENT: &str = concat!("vpm-core/", env!("CARGO_PKG_VERSION"));
