//! The global VPM environment: settings, repository caches and user packages.
//!
//! An [`Environment`] aggregates every configured repository into a single
//! package lookup ([`PackageCollection`]). Repositories are loaded once per
//! run with [`Environment::load_package_infos`]; after that the snapshot is
//! stable until the environment is reloaded.

mod package;
mod repo_holder;
mod repo_source;
mod settings;

use std::collections::{BTreeMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use reqwest::Client;
use thiserror::Error;
use tokio::fs;
use tracing::{info, warn};
use vpm_schema::{LocalCachedRepository, PackageJson, UserRepoSetting};

pub use package::{PackageCollection, PackageInfo, PackageSource, VersionSelector};
pub use repo_source::{PredefinedRepo, RepoSource};

use crate::io::json::{JsonFileError, read_json_file};
use crate::io::remote::{FetchError, download_remote_repository, write_repo};
use crate::paths::{repos_dir, settings_path, try_vpm_home};
use repo_holder::RepoHolder;
use settings::Settings;

/// Failure loading or changing the environment.
#[derive(Error, Debug)]
pub enum EnvironmentError {
    /// Neither `VPM_HOME` nor a platform data directory is available.
    #[error("cannot determine the VPM data directory")]
    NoHome,

    /// A settings or cache file could not be read or written.
    #[error(transparent)]
    Json(#[from] JsonFileError),

    /// A directory or file operation failed.
    #[error("IO error on {}: {source}", path.display())]
    Io {
        /// Path involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A repository listing could not be downloaded.
    #[error("fetching {url}: {source}")]
    Fetch {
        /// Listing URL.
        url: String,
        /// Underlying error.
        #[source]
        source: FetchError,
    },

    /// A download was needed but the environment has no HTTP client.
    #[error("offline mode: cannot download {0}")]
    Offline(String),

    /// The URL, id or path is already registered.
    #[error("repository already added: {0}")]
    AlreadyAdded(String),

    /// No cache exists at this path and none could be created.
    #[error("repository not found: {}", .0.display())]
    RepositoryNotFound(PathBuf),

    /// A `304` answered a request that carried no `ETag`.
    #[error("server answered 'not modified' to an unconditional request for {0}")]
    UnexpectedNotModified(String),
}

/// Settings, repository caches and user packages of one VPM home.
#[derive(Debug)]
pub struct Environment {
    /// `None` means offline: nothing is downloaded or refreshed.
    http: Option<Client>,
    global_dir: PathBuf,
    settings: Settings,
    repo_cache: RepoHolder,
    user_packages: Vec<(PathBuf, PackageJson)>,
    pending_repositories: Vec<PathBuf>,
}

impl Environment {
    /// Loads the environment from the default VPM data directory.
    ///
    /// # Errors
    ///
    /// [`EnvironmentError::NoHome`] when no directory can be determined,
    /// otherwise as [`Environment::load`].
    pub async fn load_default(http: Option<Client>) -> Result<Self, EnvironmentError> {
        let global_dir = try_vpm_home().ok_or(EnvironmentError::NoHome)?;
        Self::load(http, global_dir).await
    }

    /// Loads settings from `global_dir`. Repositories are not loaded yet.
    ///
    /// # Errors
    ///
    /// Fails when `settings.json` exists but cannot be read or parsed.
    pub async fn load(http: Option<Client>, global_dir: PathBuf) -> Result<Self, EnvironmentError> {
        let settings = Settings::load(&settings_path(&global_dir)).await?;
        Ok(Self {
            http,
            global_dir,
            settings,
            repo_cache: RepoHolder::default(),
            user_packages: Vec::new(),
            pending_repositories: Vec::new(),
        })
    }

    /// Loads every repository source and user package folder.
    ///
    /// With `update`, caches with a remote URL are refreshed and missing
    /// remote caches are downloaded. Sources already loaded are kept as-is.
    ///
    /// # Errors
    ///
    /// Fails only when `Repos/` cannot be listed; a source that fails to
    /// load is logged and skipped.
    pub async fn load_package_infos(&mut self, update: bool) -> Result<(), EnvironmentError> {
        let http = if update { self.http.clone() } else { None };
        let sources = self.get_repo_sources().await?;
        self.repo_cache.load_repos(http.as_ref(), &sources).await;
        self.update_user_repo_id();
        self.load_user_package_infos().await;
        self.remove_id_duplication();
        Ok(())
    }

    fn update_user_repo_id(&mut self) {
        let ids: Vec<(usize, Option<String>)> = self
            .settings
            .user_repos()
            .iter()
            .enumerate()
            .filter_map(|(index, repo)| {
                let loaded = self.repo_cache.get_repo(&repo.local_path)?;
                let id = loaded.id().or(loaded.url()).or(repo.url.as_deref());
                Some((index, id.map(str::to_owned)))
            })
            .collect();

        for (index, id) in ids {
            self.settings.set_user_repo_id(index, id);
        }
    }

    async fn load_user_package_infos(&mut self) {
        self.user_packages.clear();
        for folder in self.settings.user_package_folders().to_vec() {
            match read_json_file::<PackageJson>(&folder.join("package.json")).await {
                Ok(Some(package)) => self.user_packages.push((folder, package)),
                Ok(None) => {}
                Err(e) => warn!("skipping user package: {e}"),
            }
        }
    }

    /// Keeps the first user repository for each id.
    fn remove_id_duplication(&mut self) {
        let mut used_ids = HashSet::new();
        let removed = self.settings.retain_user_repos(|repo| match &repo.id {
            Some(id) => used_ids.insert(id.clone()),
            None => true,
        });
        for repo in removed {
            info!(path = %repo.local_path.display(), "dropping repository with duplicated id");
            self.repo_cache.remove_repo(&repo.local_path);
        }
    }

    /// The VPM home.
    pub fn global_dir(&self) -> &Path {
        &self.global_dir
    }

    /// Where repository caches live.
    pub fn repos_dir(&self) -> PathBuf {
        repos_dir(&self.global_dir)
    }

    /// Predefined, user, pending and undiscovered (stray `Repos/*.json`) sources.
    ///
    /// # Errors
    ///
    /// Fails when `Repos/` exists but cannot be listed.
    pub async fn get_repo_sources(&self) -> Result<Vec<RepoSource>, EnvironmentError> {
        let repos_dir = self.repos_dir();

        let mut sources: Vec<RepoSource> = PredefinedRepo::ALL
            .into_iter()
            .map(|info| RepoSource::PreDefined(info, repos_dir.join(info.file_name)))
            .chain(self.settings.user_repos().iter().cloned().map(RepoSource::UserRepo))
            .chain(self.pending_repositories.iter().cloned().map(RepoSource::Pending))
            .collect();

        let known: HashSet<PathBuf> = sources.iter().map(|s| s.file_path().to_path_buf()).collect();
        let mut undefined = Vec::new();

        let mut entries = match fs::read_dir(&repos_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(sources),
            Err(source) => {
                return Err(EnvironmentError::Io {
                    path: repos_dir,
                    source,
                });
            }
        };
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(source) => {
                    return Err(EnvironmentError::Io {
                        path: repos_dir,
                        source,
                    });
                }
            };
            let path = entry.path();
            let is_json = path.extension().is_some_and(|ext| ext == "json");
            if is_json && !known.contains(&path) {
                undefined.push(path);
            }
        }
        undefined.sort();
        sources.extend(undefined.into_iter().map(RepoSource::Undefined));

        Ok(sources)
    }

    /// Every loaded repository cache.
    pub fn get_repos(&self) -> impl Iterator<Item = &LocalCachedRepository> {
        self.repo_cache.get_repos()
    }

    /// Every loaded repository cache with its file path.
    pub fn get_repo_with_path(&self) -> impl Iterator<Item = (&PathBuf, &LocalCachedRepository)> {
        self.repo_cache.get_repo_with_path()
    }

    /// The latest release of every known package accepted by `filter`, newest first.
    pub fn find_whole_all_packages(&self, filter: impl Fn(&PackageJson) -> bool) -> Vec<&PackageJson> {
        let mut list: Vec<&PackageJson> = self
            .get_repos()
            .flat_map(|repo| repo.packages().values())
            .filter_map(|versions| {
                versions
                    .versions
                    .values()
                    .filter(|json| !json.version().is_pre())
                    .max_by(|a, b| a.version().cmp(b.version()))
            })
            .chain(
                self.user_packages
                    .iter()
                    .map(|(_, json)| json)
                    .filter(|json| !json.version().is_pre()),
            )
            .filter(|json| filter(*json))
            .collect();

        list.sort_by(|a, b| b.version().cmp(a.version()).then_with(|| a.name().cmp(b.name())));
        let mut seen = HashSet::new();
        list.retain(|json| seen.insert((json.name(), json.version())));
        list
    }

    /// Repositories registered in `settings.json`.
    pub fn user_repos(&self) -> &[UserRepoSetting] {
        self.settings.user_repos()
    }

    /// Local package folders registered in `settings.json`.
    pub fn user_package_folders(&self) -> &[PathBuf] {
        self.settings.user_package_folders()
    }

    /// Downloads a repository and registers it as a user repository.
    ///
    /// # Errors
    ///
    /// [`EnvironmentError::AlreadyAdded`] when the URL or listing id is
    /// already registered, [`EnvironmentError::Offline`] without a client,
    /// and download or write failures.
    pub async fn add_remote_repo(
        &mut self,
        url: &str,
        name: Option<&str>,
        headers: BTreeMap<String, String>,
    ) -> Result<(), EnvironmentError> {
        if self.user_repos().iter().any(|repo| repo.url.as_deref() == Some(url)) {
            return Err(EnvironmentError::AlreadyAdded(url.to_string()));
        }

        let (local_path, repo) = self.download_new_repo(url, name, headers).await?;
        if let Some(id) = repo.id() {
            if self.user_repos().iter().any(|r| r.id.as_deref() == Some(id)) {
                return Err(EnvironmentError::AlreadyAdded(id.to_string()));
            }
        }

        write_repo(&local_path, &repo).await?;
        self.settings.add_user_repo(user_repo_setting(&local_path, &repo, name));
        self.repo_cache.add_repository(local_path, repo);
        Ok(())
    }

    /// Registers a repository cache file that has no remote URL.
    ///
    /// # Errors
    ///
    /// [`EnvironmentError::AlreadyAdded`] when `path` is already registered.
    pub fn add_local_repo(&mut self, path: &Path, name: Option<&str>) -> Result<(), EnvironmentError> {
        if self.user_repos().iter().any(|repo| repo.local_path == path) {
            return Err(EnvironmentError::AlreadyAdded(path.display().to_string()));
        }
        self.settings
            .add_user_repo(UserRepoSetting::new(path.to_path_buf(), name.map(str::to_owned), None));
        Ok(())
    }

    /// Unregisters every user repository matching `condition` and deletes its cache file.
    ///
    /// Returns whether anything was removed.
    ///
    /// # Errors
    ///
    /// Fails when a cache file exists but cannot be deleted.
    pub async fn remove_repo(
        &mut self,
        condition: impl Fn(&UserRepoSetting) -> bool,
    ) -> Result<bool, EnvironmentError> {
        let removed = self.settings.retain_user_repos(|repo| !condition(repo));
        for repo in &removed {
            self.repo_cache.remove_repo(&repo.local_path);
            match fs::remove_file(&repo.local_path).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(EnvironmentError::Io {
                        path: repo.local_path.clone(),
                        source,
                    });
                }
            }
        }
        Ok(!removed.is_empty())
    }

    /// Downloads a repository and makes its packages visible in this run only.
    ///
    /// A URL that is already a user repository is accepted as-is. Nothing is
    /// written until [`Environment::save_pending_repositories`].
    ///
    /// # Errors
    ///
    /// [`EnvironmentError::Offline`] without a client, and download failures.
    pub async fn add_pending_repository(
        &mut self,
        url: &str,
        name: Option<&str>,
        headers: BTreeMap<String, String>,
    ) -> Result<(), EnvironmentError> {
        if self.user_repos().iter().any(|repo| repo.url.as_deref() == Some(url)) {
            return Ok(());
        }
        let (local_path, repo) = self.download_new_repo(url, name, headers).await?;
        self.repo_cache.add_repository(local_path.clone(), repo);
        self.pending_repositories.push(local_path);
        Ok(())
    }

    /// Pending repositories as `(cache path, url)`.
    pub fn pending_repositories(&self) -> impl Iterator<Item = (&Path, Option<&str>)> {
        self.pending_repositories.iter().map(|path| {
            let url = self.repo_cache.get_repo(path).and_then(LocalCachedRepository::url);
            (path.as_path(), url)
        })
    }

    /// Writes every pending repository and registers it as a user repository.
    ///
    /// # Errors
    ///
    /// Fails when a cache file cannot be written; repositories saved before
    /// the failure stay registered.
    pub async fn save_pending_repositories(&mut self) -> Result<(), EnvironmentError> {
        while let Some(path) = self.pending_repositories.first().cloned() {
            let repo = self
                .repo_cache
                .get_repo(&path)
                .ok_or_else(|| EnvironmentError::RepositoryNotFound(path.clone()))?;
            write_repo(&path, repo).await?;
            let setting = user_repo_setting(&path, repo, None);
            self.settings.add_user_repo(setting);
            self.pending_repositories.remove(0);
        }
        Ok(())
    }

    async fn download_new_repo(
        &self,
        url: &str,
        name: Option<&str>,
        headers: BTreeMap<String, String>,
    ) -> Result<(PathBuf, LocalCachedRepository), EnvironmentError> {
        let http = self
            .http
            .as_ref()
            .ok_or_else(|| EnvironmentError::Offline(url.to_string()))?;

        let (remote, etag) = download_remote_repository(http, url, &headers, None)
            .await
            .map_err(|source| EnvironmentError::Fetch {
                url: url.to_string(),
                source,
            })?
            .ok_or_else(|| EnvironmentError::UnexpectedNotModified(url.to_string()))?;

        let local_path = self.repos_dir().join(format!("{:032x}.json", rand::random::<u128>()));
        let name = name.map(str::to_owned).or_else(|| remote.name.clone());

        let mut repo = LocalCachedRepository::new(&local_path, name, Some(url.to_string()));
        repo.set_repo(remote);
        repo.set_headers(headers);
        repo.set_etag(etag);
        Ok((local_path, repo))
    }

    /// Writes `settings.json` if it changed.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be written.
    pub async fn save(&mut self) -> Result<(), EnvironmentError> {
        self.settings.save(&settings_path(&self.global_dir)).await?;
        Ok(())
    }
}

/// `name` overrides whatever name the listing carries.
fn user_repo_setting(path: &Path, repo: &LocalCachedRepository, name: Option<&str>) -> UserRepoSetting {
    let mut setting = UserRepoSetting::new(
        path.to_path_buf(),
        name.or(repo.name()).map(str::to_owned),
        repo.url().map(str::to_owned),
    );
    if let Some(id) = repo.id() {
        setting.id = Some(id.to_string());
    }
    setting.headers = repo.headers().clone();
    setting
}

impl PackageCollection for Environment {
    fn find_packages(&self, package: &str) -> Vec<PackageInfo<'_>> {
        let remote = self
            .get_repos()
            .flat_map(|repo| repo.versions_of(package).map(move |json| PackageInfo::remote(json, repo)));
        let local = self
            .user_packages
            .iter()
            .filter(|(_, json)| json.name() == package)
            .map(|(path, json)| PackageInfo::local(json, path));
        remote.chain(local).collect()
    }
}
