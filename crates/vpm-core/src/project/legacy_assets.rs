//! Locating the files and folders that newly installed packages replace.
//!
//! A package lists legacy assets as `path -> guid`. The path is tried first;
//! when nothing of the right kind exists there, the GUID is looked up among
//! the `.meta` files under `Assets/`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};

use futures::future::join_all;
use tokio::fs;
use tracing::{error, warn};
use walkdir::WalkDir;

use crate::environment::PackageInfo;

/// Legacy assets found in a project, relative to the project directory.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct LegacyAssets {
    pub(crate) files: Vec<PathBuf>,
    pub(crate) folders: Vec<PathBuf>,
}

enum Located {
    NotFound,
    File(PathBuf),
    Folder(PathBuf),
    Guid { guid: String, is_file: bool },
}

pub(crate) async fn collect_legacy_assets(project_dir: &Path, packages: &[PackageInfo<'_>]) -> LegacyAssets {
    let folders = packages
        .iter()
        .flat_map(|package| package.package_json().legacy_folders())
        .map(|(path, guid)| (path, guid, false));
    let files = packages
        .iter()
        .flat_map(|package| package.package_json().legacy_files())
        .map(|(path, guid)| (path, guid, true));

    let located = join_all(
        folders
            .chain(files)
            .map(|(path, guid, is_file)| locate(project_dir, path, guid.as_deref(), is_file)),
    )
    .await;

    let mut found_files = BTreeSet::new();
    let mut found_folders = BTreeSet::new();
    let mut find_guids = BTreeMap::new();
    for located in located {
        match located {
            Located::NotFound => {}
            Located::File(path) => {
                found_files.insert(path);
            }
            Located::Folder(path) => {
                found_folders.insert(path);
            }
            Located::Guid { guid, is_file } => {
                find_guids.insert(guid, is_file);
            }
        }
    }

    if !find_guids.is_empty() {
        for (path, is_file) in find_by_guids(project_dir, find_guids).await {
            if is_file {
                found_files.insert(path);
            } else {
                found_folders.insert(path);
            }
        }
    }

    LegacyAssets {
        files: found_files.into_iter().collect(),
        folders: found_folders.into_iter().collect(),
    }
}

/// Rejects anything that could point outside the project.
fn relative_asset_path(path: &str) -> Option<PathBuf> {
    let path = PathBuf::from(path.replace('\\', "/"));
    let inside = path
        .components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
    (inside && path.components().any(|c| matches!(c, Component::Normal(_)))).then_some(path)
}

fn is_guid(guid: &str) -> bool {
    guid.len() == 32 && guid.bytes().all(|b| b.is_ascii_hexdigit())
}

async fn locate(project_dir: &Path, path: &str, guid: Option<&str>, is_file: bool) -> Located {
    let Some(relative) = relative_asset_path(path) else {
        warn!("ignoring legacy asset outside the project: {path}");
        return Located::NotFound;
    };

    if let Ok(metadata) = fs::metadata(project_dir.join(&relative)).await {
        if is_file && metadata.is_file() {
            return Located::File(relative);
        }
        if !is_file && metadata.is_dir() {
            return Located::Folder(relative);
        }
    }

    match guid {
        Some(guid) if is_guid(guid) => Located::Guid {
            guid: guid.to_ascii_lowercase(),
            is_file,
        },
        _ => Located::NotFound,
    }
}

/// Scans `Assets/**/*.meta` for the wanted asset GUID values.
///
/// Returns the project-relative path of each asset whose kind matches.
async fn find_by_guids(project_dir: &Path, guids: BTreeMap<String, bool>) -> Vec<(PathBuf, bool)> {
    let project_dir = project_dir.to_path_buf();
    let scan = tokio::task::spawn_blocking(move || {
        let mut found = Vec::new();
        let entries = WalkDir::new(project_dir.join("Assets"))
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "meta"));

        for entry in entries {
            let Ok(meta) = std::fs::read_to_string(entry.path()) else {
                continue;
            };
            let Some(guid) = meta_guid(&meta) else {
                continue;
            };
            let Some(&is_file) = guids.get(&guid) else {
                continue;
            };

            let asset = entry.path().with_extension("");
            let is_file_actual = asset.is_file();
            if is_file_actual != is_file || (!is_file && !asset.is_dir()) {
                continue;
            }
            if let Ok(relative) = asset.strip_prefix(&project_dir) {
                found.push((relative.to_path_buf(), is_file));
            }
        }
        found
    });

    match scan.await {
        Ok(found) => found,
        Err(e) => {
            error!("scanning asset metadata: {e}");
            Vec::new()
        }
    }
}

fn meta_guid(meta: &str) -> Option<String> {
    meta.lines()
        .find_map(|line| line.trim().strip_prefix("guid:"))
        .map(|guid| guid.trim().to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use vpm_schema::{LocalCachedRepository, PackageJson};

    const GUID: &str = "0123456789abcdef0123456789abcdef";

    async fn touch(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        fs::write(path, content).await.unwrap();
    }

    #[test]
    fn test_relative_asset_path() {
        assert_eq!(
            relative_asset_path("Assets\\Old\\Tool.cs"),
            Some(PathBuf::from("Assets/Old/Tool.cs"))
        );
        assert_eq!(relative_asset_path("/etc/passwd"), None);
        assert_eq!(relative_asset_path("Assets/../../outside"), None);
    }

    #[test]
    fn test_meta_guid() {
        let meta = format!("fileFormatVersion: 2\nguid: {}\nfolderAsset: yes\n", GUID.to_uppercase());
        assert_eq!(meta_guid(&meta).as_deref(), Some(GUID));
        assert!(is_guid(GUID));
        assert!(!is_guid("not-a-guid"));
    }

    #[tokio::test]
    async fn test_collect_by_path_and_guid() {
        let project = tempfile::tempdir().unwrap();
        let root = project.path();
        touch(&root.join("Assets/Old/Tool.cs"), "").await;
        // moved by the user; only its meta file still knows the guid
        touch(&root.join("Assets/Moved/Thing"), "").await;
        touch(&root.join("Assets/Moved/Thing.meta"), &format!("guid: {GUID}\n")).await;
        fs::create_dir_all(root.join("Assets/OldFolder")).await.unwrap();

        let package: PackageJson = serde_json::from_value(json!({
            "name": "com.example.new",
            "version": "1.0.0",
            "legacyFiles": {
                "Assets/Old/Tool.cs": null,
                "Assets/Thing": GUID,
                "Assets/Gone.cs": "ffffffffffffffffffffffffffffffff",
                "../escape.cs": null,
            },
            "legacyFolders": {
                "Assets\\OldFolder": null,
                "Assets/Old/Tool.cs": null,
            },
        }))
        .unwrap();
        let repo = LocalCachedRepository::default();
        let packages = [PackageInfo::remote(&package, &repo)];

        let found = collect_legacy_assets(root, &packages).await;
        assert_eq!(
            found,
            LegacyAssets {
                files: vec![PathBuf::from("Assets/Moved/Thing"), PathBuf::from("Assets/Old/Tool.cs")],
                folders: vec![PathBuf::from("Assets/OldFolder")],
            }
        );
    }
}
