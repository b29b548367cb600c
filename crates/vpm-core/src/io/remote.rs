//! Conditional download of repository listings.
//!
//! A cached repository remembers the `ETag` of the listing it was built
//! from. Refreshing sends it back as `If-None-Match`; a `304` means the
//! cache is current and nothing is touched, on disk or in memory.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use reqwest::Client;
use reqwest::StatusCode;
use reqwest::header::{ETAG, IF_NONE_MATCH, USER_AGENT};
use thiserror::Error;
use tracing::{debug, error, info};
use vpm_schema::{LocalCachedRepository, Repository, strip_bom_bytes};

use crate::io::json::{JsonFileError, write_json_file};

/// Upper bound for a single repository request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Failure downloading a repository listing.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Transport failure or a non-success status.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The body was not a repository listing.
    #[error("invalid repository listing from {url}: {source}")]
    Parse {
        /// Requested URL.
        url: String,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
}

/// Fetches the listing at `url`.
///
/// Returns `Ok(None)` only when `etag` was given and the server answered
/// `304 Not Modified`. Otherwise returns the listing (with `url` filled in
/// if the listing omits it) and the response's `ETag`, if any.
///
/// # Errors
///
/// [`FetchError::Http`] on transport errors or an error status,
/// [`FetchError::Parse`] when the body is not a listing.
pub async fn download_remote_repository(
    client: &Client,
    url: &str,
    headers: &BTreeMap<String, String>,
    etag: Option<&str>,
) -> Result<Option<(Repository, Option<String>)>, FetchError> {
    let mut request = client
        .get(url)
        .header(USER_AGENT, crate::USER_AGENT)
        .timeout(REQUEST_TIMEOUT);
    for (name, value) in headers {
        request = request.header(name.as_str(), value.as_str());
    }
    if let Some(etag) = etag {
        request = request.header(IF_NONE_MATCH, etag);
    }

    let response = request.send().await?;
    if etag.is_some() && response.status() == StatusCode::NOT_MODIFIED {
        return Ok(None);
    }
    let response = response.error_for_status()?;

    let new_etag = response
        .headers()
        .get(ETAG)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);

    let body = response.bytes().await?;
    let mut repo: Repository =
        serde_json::from_slice(strip_bom_bytes(&body)).map_err(|source| FetchError::Parse {
            url: url.to_string(),
            source,
        })?;
    repo.set_url_if_none(|| url.to_string());

    Ok(Some((repo, new_etag)))
}

/// Refreshes `repo` from its remote URL and rewrites its cache file.
///
/// Failures are logged and leave both the in-memory repository and the
/// file at `path` as they were.
pub async fn update_from_remote(client: &Client, path: &Path, repo: &mut LocalCachedRepository) {
    let Some(url) = repo.url().map(str::to_owned) else {
        return;
    };

    match download_remote_repository(client, &url, repo.headers(), repo.etag()).await {
        Ok(None) => {
            debug!(%url, "cache matched, repository not modified");
        }
        Ok(Some((remote, etag))) => {
            info!(%url, "downloaded repository");
            repo.set_repo(remote);
            repo.set_etag(etag);
            if let Err(e) = write_repo(path, repo).await {
                error!(path = %path.display(), "writing local repository: {e}");
            }
        }
        Err(e) => {
            error!(%url, "fetching remote repository: {e}");
        }
    }
}

/// Writes a repository cache file.
///
/// # Errors
///
/// Fails when the file cannot be written.
pub async fn write_repo(path: &Path, repo: &LocalCachedRepository) -> Result<(), JsonFileError> {
    write_json_file(path, repo).await
}
