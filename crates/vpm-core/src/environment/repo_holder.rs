use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use futures::future::join_all;
use reqwest::Client;
use tracing::{error, warn};
use vpm_schema::LocalCachedRepository;

use super::EnvironmentError;
use super::repo_source::RepoSource;
use crate::io::json::{JsonFileError, read_json_file};
use crate::io::remote::{download_remote_repository, update_from_remote, write_repo};

/// Every repository cache loaded in this run, keyed by cache file path.
#[derive(Debug, Default)]
pub(crate) struct RepoHolder {
    cached_repos: BTreeMap<PathBuf, LocalCachedRepository>,
}

impl RepoHolder {
    /// Loads every source not already held, concurrently.
    ///
    /// A source that fails to load is logged and left out; the others are
    /// unaffected.
    pub(crate) async fn load_repos(&mut self, http: Option<&Client>, sources: &[RepoSource]) {
        let missing: Vec<&RepoSource> = sources
            .iter()
            .filter(|source| !self.cached_repos.contains_key(source.file_path()))
            .collect();
        let loading = missing.into_iter().map(|source| async move {
            (source.file_path(), Self::load_repo_from_source(http, source).await)
        });

        for (path, loaded) in join_all(loading).await {
            match loaded {
                Ok(repo) => {
                    self.cached_repos.insert(path.to_path_buf(), repo);
                }
                Err(e) => {
                    warn!(path = %path.display(), "skipping repository: {e}");
                }
            }
        }
    }

    async fn load_repo_from_source(
        http: Option<&Client>,
        source: &RepoSource,
    ) -> Result<LocalCachedRepository, EnvironmentError> {
        match source {
            RepoSource::PreDefined(info, path) => {
                Self::load_remote_repo(http, path, info.url, Some(info.name), &BTreeMap::new()).await
            }
            RepoSource::UserRepo(setting) => match &setting.url {
                Some(url) => {
                    Self::load_remote_repo(
                        http,
                        &setting.local_path,
                        url,
                        setting.name.as_deref(),
                        &setting.headers,
                    )
                    .await
                }
                None => Self::load_local_repo(http, &setting.local_path).await,
            },
            RepoSource::Undefined(path) => Self::load_local_repo(http, path).await,
            // only ever present once added to the holder
            RepoSource::Pending(path) => Err(EnvironmentError::RepositoryNotFound(path.clone())),
        }
    }

    /// Loads the cache at `path`, downloading it first if it does not exist.
    async fn load_remote_repo(
        http: Option<&Client>,
        path: &Path,
        url: &str,
        name: Option<&str>,
        headers: &BTreeMap<String, String>,
    ) -> Result<LocalCachedRepository, EnvironmentError> {
        if let Some(repo) = Self::load_repo(http, path).await? {
            return Ok(repo);
        }

        let client = http.ok_or_else(|| EnvironmentError::Offline(url.to_string()))?;
        let (remote, etag) = download_remote_repository(client, url, headers, None)
            .await
            .map_err(|source| EnvironmentError::Fetch {
                url: url.to_string(),
                source,
            })?
            .ok_or_else(|| EnvironmentError::UnexpectedNotModified(url.to_string()))?;

        let mut repo = LocalCachedRepository::new(path, name.map(str::to_owned), Some(url.to_string()));
        repo.set_repo(remote);
        repo.set_headers(headers.clone());
        repo.set_etag(etag);

        if let Err(e) = write_repo(path, &repo).await {
            error!(path = %path.display(), "writing local repository: {e}");
        }
        Ok(repo)
    }

    async fn load_local_repo(
        http: Option<&Client>,
        path: &Path,
    ) -> Result<LocalCachedRepository, EnvironmentError> {
        Self::load_repo(http, path)
            .await?
            .ok_or_else(|| EnvironmentError::RepositoryNotFound(path.to_path_buf()))
    }

    /// Reads a cache file and refreshes it when online.
    ///
    /// A file that cannot be parsed is treated like a missing one.
    async fn load_repo(
        http: Option<&Client>,
        path: &Path,
    ) -> Result<Option<LocalCachedRepository>, EnvironmentError> {
        let mut repo: LocalCachedRepository = match read_json_file(path).await {
            Ok(Some(repo)) => repo,
            Ok(None) => return Ok(None),
            Err(e @ JsonFileError::Parse { .. }) => {
                warn!("ignoring broken repository cache: {e}");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(http) = http {
            update_from_remote(http, path, &mut repo).await;
        }
        Ok(Some(repo))
    }

    pub(crate) fn get_repos(&self) -> impl Iterator<Item = &LocalCachedRepository> {
        self.cached_repos.values()
    }

    pub(crate) fn get_repo_with_path(&self) -> impl Iterator<Item = (&PathBuf, &LocalCachedRepository)> {
        self.cached_repos.iter()
    }

    pub(crate) fn get_repo(&self, path: &Path) -> Option<&LocalCachedRepository> {
        self.cached_repos.get(path)
    }

    pub(crate) fn remove_repo(&mut self, path: &Path) -> Option<LocalCachedRepository> {
        self.cached_repos.remove(path)
    }

    pub(crate) fn add_repository(&mut self, path: PathBuf, repo: LocalCachedRepository) {
        self.cached_repos.insert(path, repo);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::repo_source::PredefinedRepo;
    use crate::test_support::init_tracing;
    use serde_json::json;
    use vpm_schema::UserRepoSetting;

    fn listing(package: &str) -> serde_json::Value {
        json!({
            "packages": {
                package: { "versions": { "1.0.0": { "name": package, "version": "1.0.0" } } }
            }
        })
    }

    async fn write_cache(path: &Path, package: &str, url: Option<&str>) {
        let mut repo = LocalCachedRepository::new(path, None, url.map(str::to_owned));
        repo.set_repo(serde_json::from_value(listing(package)).unwrap());
        write_repo(path, &repo).await.unwrap();
    }

    #[tokio::test]
    async fn test_offline_loads_existing_caches() {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let official = dir.path().join("vrc-official.json");
        let local = dir.path().join("local.json");
        write_cache(&official, "com.vrchat.base", Some("https://unused.invalid/")).await;
        write_cache(&local, "com.example.local", None).await;

        let sources = [
            RepoSource::PreDefined(PredefinedRepo::OFFICIAL, official.clone()),
            RepoSource::UserRepo(UserRepoSetting::new(local.clone(), None, None)),
            // missing, and cannot be downloaded offline
            RepoSource::PreDefined(PredefinedRepo::CURATED, dir.path().join("vrc-curated.json")),
            RepoSource::Pending(dir.path().join("pending.json")),
        ];

        let mut holder = RepoHolder::default();
        holder.load_repos(None, &sources).await;

        assert_eq!(holder.get_repos().count(), 2);
        assert_eq!(holder.get_repo(&official).unwrap().versions_of("com.vrchat.base").count(), 1);
        assert_eq!(holder.get_repo(&local).unwrap().versions_of("com.example.local").count(), 1);
    }

    #[tokio::test]
    async fn test_broken_local_cache_is_skipped() {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let broken = dir.path().join("broken.json");
        tokio::fs::write(&broken, "{ not json").await.unwrap();

        let mut holder = RepoHolder::default();
        holder.load_repos(None, &[RepoSource::Undefined(broken)]).await;
        assert_eq!(holder.get_repos().count(), 0);
    }

    #[tokio::test]
    async fn test_missing_remote_cache_is_downloaded_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user.json");
        let mut server = mockito::Server::new_async().await;
        let url = format!("{}/vpm.json", server.url());
        let mock = server
            .mock("GET", "/vpm.json")
            .match_header("authorization", "Bearer t")
            .with_status(200)
            .with_header("etag", "\"1\"")
            .with_body(listing("com.example.remote").to_string())
            .expect(1)
            .create_async()
            .await;

        let mut setting = UserRepoSetting::new(path.clone(), Some("Remote".into()), Some(url.clone()));
        setting.headers.insert("authorization".into(), "Bearer t".into());
        let sources = [RepoSource::UserRepo(setting)];

        let client = Client::new();
        let mut holder = RepoHolder::default();
        holder.load_repos(Some(&client), &sources).await;
        // already held: not loaded again
        holder.load_repos(Some(&client), &sources).await;
        mock.assert_async().await;

        let repo = holder.get_repo(&path).unwrap();
        assert_eq!(repo.etag(), Some("\"1\""));
        assert_eq!(repo.name(), Some("Remote"));
        assert_eq!(repo.headers().get("authorization").map(String::as_str), Some("Bearer t"));

        let on_disk: LocalCachedRepository = read_json_file(&path).await.unwrap().unwrap();
        assert_eq!(on_disk.url(), Some(url.as_str()));
        assert_eq!(on_disk.versions_of("com.example.remote").count(), 1);
    }

    #[tokio::test]
    async fn test_pending_repository_is_never_refreshed() {
        let mut server = mockito::Server::new_async().await;
        let url = format!("{}/vpm.json", server.url());
        let mock = server.mock("GET", "/vpm.json").expect(0).create_async().await;

        let path = PathBuf::from("/nonexistent/pending.json");
        let mut repo = LocalCachedRepository::new(&path, None, Some(url));
        repo.set_repo(serde_json::from_value(listing("com.example.pending")).unwrap());

        let mut holder = RepoHolder::default();
        holder.add_repository(path.clone(), repo);
        holder.load_repos(Some(&Client::new()), &[RepoSource::Pending(path.clone())]).await;

        mock.assert_async().await;
        assert!(holder.get_repo(&path).is_some());
        assert!(holder.remove_repo(&path).is_some());
        assert!(holder.get_repo(&path).is_none());
    }
}
