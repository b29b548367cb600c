//! IO modules - side effects (network, filesystem)

pub mod json;
pub mod remote;

pub use json::{JsonFileError, read_json_file, write_json_file};
pub use remote::{FetchError, REQUEST_TIMEOUT, download_remote_repository, update_from_remote, write_repo};
