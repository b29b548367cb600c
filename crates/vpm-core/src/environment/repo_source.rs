use std::path::{Path, PathBuf};

use vpm_schema::UserRepoSetting;

/// A well-known repository every environment knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredefinedRepo {
    /// Cache file name under `Repos/`.
    pub file_name: &'static str,
    /// Listing URL.
    pub url: &'static str,
    /// Display name.
    pub name: &'static str,
}

impl PredefinedRepo {
    /// The official `VRChat` packages.
    pub const OFFICIAL: Self = Self {
        file_name: "vrc-official.json",
        url: "https://packages.vrchat.com/official?download",
        name: "Official",
    };

    /// Curated community packages for `VRChat`.
    pub const CURATED: Self = Self {
        file_name: "vrc-curated.json",
        url: "https://packages.vrchat.com/curated?download",
        name: "Curated",
    };

    /// Every predefined repository, in load order.
    pub const ALL: [Self; 2] = [Self::OFFICIAL, Self::CURATED];
}

/// Where a cached repository comes from.
#[derive(Debug, Clone)]
pub enum RepoSource {
    /// A well-known repository and its cache file.
    PreDefined(PredefinedRepo, PathBuf),
    /// Registered in `settings.json`.
    UserRepo(UserRepoSetting),
    /// A cache file found in `Repos/` that nothing else accounts for.
    Undefined(PathBuf),
    /// Downloaded during this run and held in memory until saved.
    Pending(PathBuf),
}

impl RepoSource {
    /// The cache file this source reads.
    pub fn file_path(&self) -> &Path {
        match self {
            Self::PreDefined(_, path) | Self::Undefined(path) | Self::Pending(path) => path,
            Self::UserRepo(setting) => &setting.local_path,
        }
    }
}
