//! Artifact installation, revision records, and pruning.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::SyncConfig;

/// Moves a built scratch artifact into the parser directory under its
/// final `<lang><suffix>` name.
///
/// The bytes are copied to a `.tmp` sibling first and renamed over any
/// previous artifact, so an interrupted install never leaves a torn
/// library behind.
pub fn install_artifact(config: &SyncConfig, lang: &str, built: &Path) -> io::Result<PathBuf> {
	fs::create_dir_all(&config.parser_dir)?;
	let dest = config.artifact_path(lang);
	let staging = config
		.parser_dir
		.join(format!("{lang}{}.tmp", config.platform.library_suffix()));

	fs::copy(built, &staging)?;
	fs::rename(&staging, &dest)?;
	fs::remove_file(built)?;

	info!(lang = %lang, dest = %dest.display(), "Installed parser");
	Ok(dest)
}

/// Records the pinned revision for a language, or clears a stale record
/// when no revision is pinned.
pub fn write_revision(config: &SyncConfig, lang: &str, revision: Option<&str>) -> io::Result<()> {
	let path = config.revision_path(lang);
	match revision {
		Some(revision) => {
			fs::create_dir_all(&config.info_dir)?;
			fs::write(&path, format!("{revision}\n"))?;
			info!(lang = %lang, revision = %revision, "Recorded revision");
		}
		None => {
			if path.exists() {
				fs::remove_file(&path)?;
			}
		}
	}
	Ok(())
}

/// File stems in `dir` whose names end with `suffix`.
fn collect_stems(dir: &Path, suffix: &str) -> io::Result<BTreeSet<String>> {
	let mut stems = BTreeSet::new();
	if !dir.is_dir() {
		return Ok(stems);
	}
	for entry in fs::read_dir(dir)? {
		let name = entry?.file_name();
		let name = name.to_string_lossy();
		if let Some(stem) = name.strip_suffix(suffix)
			&& !stem.is_empty()
		{
			stems.insert(stem.to_string());
		}
	}
	Ok(stems)
}

/// Removes artifacts and revision records for languages that are no
/// longer in the manifest. Returns the pruned language names.
pub fn prune_extraneous(config: &SyncConfig, manifest: &[String]) -> io::Result<Vec<String>> {
	let keep: BTreeSet<&str> = manifest.iter().map(String::as_str).collect();
	let suffix = config.platform.library_suffix();
	let installed = collect_stems(&config.parser_dir, suffix)?;
	let revisions = collect_stems(&config.info_dir, ".revision")?;

	let mut removed = Vec::new();
	for lang in installed.union(&revisions) {
		if keep.contains(lang.as_str()) {
			continue;
		}
		let artifact = config.artifact_path(lang);
		if artifact.exists() {
			info!(path = %artifact.display(), "Removing extraneous parser");
			fs::remove_file(&artifact)?;
		}
		let revision = config.revision_path(lang);
		if revision.exists() {
			info!(path = %revision.display(), "Removing extraneous revision");
			fs::remove_file(&revision)?;
		}
		removed.push(lang.clone());
	}
	Ok(removed)
}
