//! Whole-run orchestration: stage, build, install, prune, verify.
//!
//! Languages are processed one at a time in manifest order. A staging
//! or build failure aborts the run; verification findings are always
//! collected in full before the run reports them.

use std::path::Path;

use tracing::info;

use crate::compile::{compile_parser, make_clean};
use crate::install::{install_artifact, prune_extraneous, write_revision};
use crate::manifest::load_manifest;
use crate::metadata::{MetadataStore, ParserMetadata};
use crate::stage::stage_sources;
use crate::verify::verify_installation;
use crate::{ConfigError, Result, SyncConfig, SyncError};

/// Options for one sync run.
#[derive(Debug, Clone)]
pub struct RunOptions {
	/// Verify installed parsers without building anything.
	pub check_only: bool,
	/// Remove parsers that left the manifest.
	pub prune: bool,
}

impl Default for RunOptions {
	fn default() -> Self {
		Self {
			check_only: false,
			prune: true,
		}
	}
}

/// Runs the pipeline end to end.
///
/// In check mode only the verifier runs; otherwise every manifest
/// language is staged, compiled, and installed, extraneous parsers are
/// pruned, and the final state is verified.
pub fn run(config: &SyncConfig, manifest_path: &Path, options: &RunOptions) -> Result<()> {
	let languages = load_manifest(manifest_path)?;
	info!(
		manifest = %manifest_path.display(),
		count = languages.len(),
		"Loaded parser manifest"
	);
	let metadata = MetadataStore::load(&config.metadata_path())?;

	if options.check_only {
		return finish(verify_installation(config, &languages, &metadata));
	}

	// Resolve every language's metadata up front so a missing entry
	// fails the run before any build work starts.
	let mut jobs = Vec::with_capacity(languages.len());
	for lang in &languages {
		let meta = metadata
			.get(lang)
			.ok_or_else(|| ConfigError::MissingLanguage(lang.clone()))?;
		jobs.push((lang, meta));
	}

	let total = jobs.len();
	for (index, (lang, meta)) in jobs.into_iter().enumerate() {
		info!(lang = %lang, step = index + 1, total, "Syncing parser");
		sync_language(config, lang, meta)?;
	}

	if options.prune {
		prune_extraneous(config, &languages)?;
	}

	let report = verify_installation(config, &languages, &metadata);
	if report.is_ok() {
		info!("Parser build complete");
	}
	finish(report)
}

fn finish(report: crate::VerifyReport) -> Result<()> {
	if report.is_ok() {
		Ok(())
	} else {
		Err(SyncError::Verification(report))
	}
}

/// One language's pass through the pipeline: stage, compile, install,
/// record the revision.
fn sync_language(config: &SyncConfig, lang: &str, meta: &ParserMetadata) -> Result<()> {
	let staged = stage_sources(&config.vendor_root, lang, meta)?;
	let compiled = compile_parser(config, lang, meta, staged.base_dir())?;
	install_artifact(config, lang, &compiled.artifact)?;
	write_revision(config, lang, meta.pinned_revision())?;
	if compiled.used_makefile {
		make_clean(staged.base_dir());
	}
	Ok(())
}
