//! Repository documents: the remote listing and its local cache file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::package::{PackageJson, PackageVersions};

/// A repository listing as served by its remote URL.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Repository {
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Stable identifier, usually reverse-domain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Where the listing is served from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Package versions by package name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub packages: BTreeMap<String, PackageVersions>,
    /// Keys not modelled above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Repository {
    /// Remote listings are not required to state their own URL.
    pub fn set_url_if_none(&mut self, url: impl FnOnce() -> String) {
        if self.url.is_none() {
            self.url = Some(url());
        }
    }
}

/// How a cache file came to exist.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreationInfo {
    /// Path of the cache file itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
    /// URL the listing was first downloaded from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Name given when the repository was added.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Display information kept next to the cached listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Description {
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Repository kind, always `JsonRepo` here.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// Bookkeeping for conditional refetch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VrcGetMeta {
    /// `ETag` of the last successful download.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

/// The on-disk cache of one repository (`Repos/<name>.json`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocalCachedRepository {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    repo: Option<Repository>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    cache: BTreeMap<String, PackageVersions>,
    #[serde(rename = "CreationInfo", default, skip_serializing_if = "Option::is_none")]
    creation_info: Option<CreationInfo>,
    #[serde(rename = "Description", default, skip_serializing_if = "Option::is_none")]
    description: Option<Description>,
    #[serde(rename = "vrc-get", default, skip_serializing_if = "Option::is_none")]
    vrc_get: Option<VrcGetMeta>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    headers: BTreeMap<String, String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl LocalCachedRepository {
    /// An empty cache that remembers where it lives and where it came from.
    pub fn new(path: &Path, name: Option<String>, url: Option<String>) -> Self {
        Self {
            repo: None,
            cache: BTreeMap::new(),
            creation_info: Some(CreationInfo {
                local_path: Some(path.to_path_buf()),
                url,
                name: name.clone(),
            }),
            description: Some(Description {
                name,
                kind: Some("JsonRepo".to_string()),
            }),
            vrc_get: None,
            headers: BTreeMap::new(),
            extra: Map::new(),
        }
    }

    /// Replaces the cached listing; the package table moves into `cache`.
    pub fn set_repo(&mut self, mut repo: Repository) {
        self.cache = std::mem::take(&mut repo.packages);
        self.repo = Some(repo);
    }

    /// The cached listing without its package table.
    pub fn repo(&self) -> Option<&Repository> {
        self.repo.as_ref()
    }

    /// How this cache file was created.
    pub fn creation_info(&self) -> Option<&CreationInfo> {
        self.creation_info.as_ref()
    }

    /// Display information.
    pub fn description(&self) -> Option<&Description> {
        self.description.as_ref()
    }

    /// The listing's `id`.
    pub fn id(&self) -> Option<&str> {
        self.repo.as_ref()?.id.as_deref()
    }

    /// The listing's own URL, else the URL the cache was created from.
    pub fn url(&self) -> Option<&str> {
        self.repo
            .as_ref()
            .and_then(|repo| repo.url.as_deref())
            .or_else(|| self.creation_info.as_ref()?.url.as_deref())
    }

    /// The listing's name, else the stored description or creation name.
    pub fn name(&self) -> Option<&str> {
        self.repo
            .as_ref()
            .and_then(|repo| repo.name.as_deref())
            .or_else(|| self.description.as_ref()?.name.as_deref())
            .or_else(|| self.creation_info.as_ref()?.name.as_deref())
    }

    /// `ETag` to send as `If-None-Match`.
    pub fn etag(&self) -> Option<&str> {
        self.vrc_get.as_ref()?.etag.as_deref()
    }

    /// Stores the `ETag` of a fresh download; `None` clears it.
    pub fn set_etag(&mut self, etag: Option<String>) {
        match etag {
            Some(etag) => self.vrc_get.get_or_insert_with(VrcGetMeta::default).etag = Some(etag),
            None => {
                if let Some(meta) = &mut self.vrc_get {
                    meta.etag = None;
                }
            }
        }
    }

    /// Extra request headers sent when refreshing this repository.
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Replaces the refresh headers.
    pub fn set_headers(&mut self, headers: BTreeMap<String, String>) {
        self.headers = headers;
    }

    /// Cached package table.
    pub fn packages(&self) -> &BTreeMap<String, PackageVersions> {
        &self.cache
    }

    /// Every cached version of `package`.
    pub fn versions_of(&self, package: &str) -> impl Iterator<Item = &PackageJson> {
        self.cache
            .get(package)
            .into_iter()
            .flat_map(|versions| versions.versions.values())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn remote() -> Repository {
        serde_json::from_value(json!({
            "name": "Example",
            "id": "com.example.repo",
            "author": "someone",
            "packages": {
                "com.example.a": {
                    "versions": {
                        "1.0.0": { "name": "com.example.a", "version": "1.0.0" },
                        "1.1.0": { "name": "com.example.a", "version": "1.1.0" },
                    }
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_set_repo_moves_packages_into_cache() {
        let mut cache = LocalCachedRepository::new(
            Path::new("/tmp/repo.json"),
            Some("Example".into()),
            Some("https://example.com/index.json".into()),
        );
        cache.set_repo(remote());

        assert_eq!(cache.versions_of("com.example.a").count(), 2);
        assert_eq!(cache.versions_of("missing").count(), 0);
        assert!(cache.repo().unwrap().packages.is_empty());
        assert_eq!(cache.id(), Some("com.example.repo"));
        // listing has no url: falls back to creation info
        assert_eq!(cache.url(), Some("https://example.com/index.json"));
        assert_eq!(cache.name(), Some("Example"));

        let written = serde_json::to_value(&cache).unwrap();
        assert_eq!(written["repo"]["author"], "someone");
        assert!(written["repo"].get("packages").is_none());
        assert_eq!(written["Description"]["type"], "JsonRepo");
        assert_eq!(written["CreationInfo"]["localPath"], "/tmp/repo.json");
        assert!(written.get("vrc-get").is_none());
        assert!(written.get("headers").is_none());
    }

    #[test]
    fn test_etag_bookkeeping() {
        let mut cache = LocalCachedRepository::default();
        assert_eq!(cache.etag(), None);
        cache.set_etag(Some("\"abc\"".into()));
        assert_eq!(cache.etag(), Some("\"abc\""));
        assert_eq!(serde_json::to_value(&cache).unwrap()["vrc-get"]["etag"], "\"abc\"");
        cache.set_etag(None);
        assert_eq!(cache.etag(), None);
    }

    #[test]
    fn test_reads_cache_file_layout() {
        let cache: LocalCachedRepository = serde_json::from_value(json!({
            "repo": { "url": "https://example.com/vpm.json", "name": "From Repo" },
            "cache": {
                "com.example.b": { "versions": { "2.0.0": { "name": "com.example.b", "version": "2.0.0" } } }
            },
            "CreationInfo": { "url": "https://old.example.com/vpm.json" },
            "vrc-get": { "etag": "W/\"1\"" },
        }))
        .unwrap();
        assert_eq!(cache.url(), Some("https://example.com/vpm.json"));
        assert_eq!(cache.name(), Some("From Repo"));
        assert_eq!(cache.etag(), Some("W/\"1\""));
        assert_eq!(cache.versions_of("com.example.b").count(), 1);
    }

    #[test]
    fn test_unknown_keys_survive_refresh() {
        let mut cache: LocalCachedRepository = serde_json::from_value(json!({
            "repo": { "url": "https://example.com/vpm.json" },
            "vrc-get": { "etag": "\"1\"" },
            "lastChecked": "2024-01-01",
            "vrc-tool": { "pinned": true },
        }))
        .unwrap();

        cache.set_repo(remote());
        cache.set_etag(Some("\"2\"".into()));

        let written = serde_json::to_value(&cache).unwrap();
        assert_eq!(written["lastChecked"], "2024-01-01");
        assert_eq!(written["vrc-tool"]["pinned"], true);
        assert_eq!(written["vrc-get"]["etag"], "\"2\"");
        assert_eq!(written["repo"]["id"], "com.example.repo");
    }
}
