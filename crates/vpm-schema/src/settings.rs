//! Global `settings.json` records.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A repository registered by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRepoSetting {
    /// Cache file under `Repos/`.
    pub local_path: PathBuf,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Remote listing; `None` for a local-only repository.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Listing id, falling back to the URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Extra request headers for refreshes.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

impl UserRepoSetting {
    /// A setting whose id starts out as its URL.
    pub fn new(local_path: PathBuf, name: Option<String>, url: Option<String>) -> Self {
        Self {
            local_path,
            name,
            id: url.clone(),
            url,
            headers: BTreeMap::new(),
        }
    }
}

/// The whole settings file. Unknown keys are carried through unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsFile {
    /// Repositories added by the user.
    #[serde(default)]
    pub user_repos: Vec<UserRepoSetting>,
    /// Folders each holding one local package.
    #[serde(default)]
    pub user_package_folders: Vec<PathBuf>,
    /// Keys not modelled above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_round_trip_keeps_unknown_keys() {
        let settings: SettingsFile = serde_json::from_value(json!({
            "userRepos": [
                { "localPath": "/vpm/Repos/a.json", "url": "https://a.example/vpm.json", "name": "A" },
                { "localPath": "/vpm/Repos/local.json", "url": null, "name": null },
            ],
            "userPackageFolders": ["/packages/mine"],
            "projects": ["/projects/one"],
        }))
        .unwrap();

        assert_eq!(settings.user_repos.len(), 2);
        assert_eq!(settings.user_repos[1].url, None);
        assert_eq!(settings.user_package_folders, [PathBuf::from("/packages/mine")]);

        let written = serde_json::to_value(&settings).unwrap();
        assert_eq!(written["projects"][0], "/projects/one");
        assert_eq!(written["userRepos"][0]["localPath"], "/vpm/Repos/a.json");
    }

    #[test]
    fn test_empty_settings() {
        let settings: SettingsFile = serde_json::from_str("{}").unwrap();
        assert!(settings.user_repos.is_empty());
        assert!(settings.user_package_folders.is_empty());
    }
}
