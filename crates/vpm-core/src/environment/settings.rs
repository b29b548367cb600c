//! The global `settings.json`, tracked for changes.

use std::path::{Path, PathBuf};

use vpm_schema::{SettingsFile, UserRepoSetting};

use crate::io::json::{JsonFileError, read_json_file, write_json_file};

#[derive(Debug, Default)]
pub(crate) struct Settings {
    file: SettingsFile,
    changed: bool,
}

impl Settings {
    /// A missing file reads as empty settings.
    pub(crate) async fn load(path: &Path) -> Result<Self, JsonFileError> {
        let file = read_json_file(path).await?.unwrap_or_default();
        Ok(Self {
            file,
            changed: false,
        })
    }

    /// Writes the file if anything changed since it was loaded or last saved.
    pub(crate) async fn save(&mut self, path: &Path) -> Result<(), JsonFileError> {
        if !self.is_changed() {
            return Ok(());
        }
        write_json_file(path, &self.file).await?;
        self.changed = false;
        Ok(())
    }

    pub(crate) fn is_changed(&self) -> bool {
        self.changed
    }

    pub(crate) fn user_repos(&self) -> &[UserRepoSetting] {
        &self.file.user_repos
    }

    pub(crate) fn user_package_folders(&self) -> &[PathBuf] {
        &self.file.user_package_folders
    }

    pub(crate) fn add_user_repo(&mut self, repo: UserRepoSetting) {
        self.file.user_repos.push(repo);
        self.changed = true;
    }

    /// Sets the id of the user repository at `index`; returns whether it changed.
    pub(crate) fn set_user_repo_id(&mut self, index: usize, id: Option<String>) -> bool {
        let Some(repo) = self.file.user_repos.get_mut(index) else {
            return false;
        };
        if repo.id == id {
            return false;
        }
        repo.id = id;
        self.changed = true;
        true
    }

    /// Drops every user repository `keep` rejects and returns them in order.
    pub(crate) fn retain_user_repos(
        &mut self,
        mut keep: impl FnMut(&UserRepoSetting) -> bool,
    ) -> Vec<UserRepoSetting> {
        let (kept, removed): (Vec<_>, Vec<_>) = std::mem::take(&mut self.file.user_repos)
            .into_iter()
            .partition(|repo| keep(repo));
        self.file.user_repos = kept;
        if !removed.is_empty() {
            self.changed = true;
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo(name: &str, url: &str) -> UserRepoSetting {
        UserRepoSetting::new(
            PathBuf::from(format!("/vpm/Repos/{name}.json")),
            Some(name.to_string()),
            Some(url.to_string()),
        )
    }

    #[tokio::test]
    async fn test_missing_file_is_empty_and_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let mut settings = Settings::load(&path).await.unwrap();
        assert!(settings.user_repos().is_empty());
        assert!(!settings.is_changed());

        settings.save(&path).await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_save_only_after_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let mut settings = Settings::default();
        settings.add_user_repo(repo("a", "https://a.example/vpm.json"));
        settings.save(&path).await.unwrap();
        assert!(!settings.is_changed());

        let loaded = Settings::load(&path).await.unwrap();
        assert_eq!(loaded.user_repos(), settings.user_repos());
    }

    #[tokio::test]
    async fn test_unchanged_file_is_not_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let original = r#"{"userRepos":[],"userPackageFolders":[],"pathToUnityExe":"C:/Unity.exe"}"#;
        tokio::fs::write(&path, original).await.unwrap();

        let mut settings = Settings::load(&path).await.unwrap();
        settings.retain_user_repos(|_| true);
        assert!(!settings.is_changed());
        settings.save(&path).await.unwrap();
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), original);

        settings.add_user_repo(repo("a", "https://a.example/vpm.json"));
        settings.save(&path).await.unwrap();
        let rewritten = tokio::fs::read_to_string(&path).await.unwrap();
        assert_ne!(rewritten, original);
        assert!(rewritten.contains("pathToUnityExe"));
    }

    #[test]
    fn test_retain_and_id_updates() {
        let mut settings = Settings::default();
        settings.add_user_repo(repo("a", "https://a.example/vpm.json"));
        settings.add_user_repo(repo("b", "https://b.example/vpm.json"));
        settings.changed = false;

        assert!(!settings.set_user_repo_id(0, Some("https://a.example/vpm.json".into())));
        assert!(!settings.is_changed());
        assert!(settings.set_user_repo_id(0, Some("com.example.a".into())));
        assert!(settings.is_changed());

        let removed = settings.retain_user_repos(|r| r.name.as_deref() != Some("b"));
        assert_eq!(removed.len(), 1);
        assert_eq!(settings.user_repos().len(), 1);
        assert_eq!(settings.user_repos()[0].id.as_deref(), Some("com.example.a"));
    }
}
