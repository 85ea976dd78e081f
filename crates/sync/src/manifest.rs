//! Parser manifest loading.
//!
//! The manifest is a plain-text file with one language per line. A `#`
//! starts a comment, either on its own line or trailing an entry.

use std::fs;
use std::path::Path;

use crate::ConfigError;

/// Loads the ordered list of languages from the manifest file.
///
/// Order is preserved as written; duplicates are not rejected since a
/// repeated build is idempotent.
///
/// # Errors
///
/// Returns [`ConfigError::ManifestRead`] if the file cannot be read and
/// [`ConfigError::ManifestEmpty`] if no languages remain after comment
/// stripping.
pub fn load_manifest(path: &Path) -> Result<Vec<String>, ConfigError> {
	let text = fs::read_to_string(path).map_err(|source| ConfigError::ManifestRead {
		path: path.to_path_buf(),
		source,
	})?;

	let languages: Vec<String> = text
		.lines()
		.map(|line| line.split_once('#').map_or(line, |(entry, _)| entry).trim())
		.filter(|entry| !entry.is_empty())
		.map(str::to_owned)
		.collect();

	if languages.is_empty() {
		return Err(ConfigError::ManifestEmpty(path.to_path_buf()));
	}
	Ok(languages)
}
