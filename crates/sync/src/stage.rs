//! Source staging for parser builds.
//!
//! Vendored sources come in two shapes: a pre-extracted directory under
//! `vendor_root/<lang>`, or a `.tar.bz2` snapshot next to it. Either way
//! staging ends with a base directory that holds every source file the
//! metadata declares, ready for the compiler driver.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, info};

use crate::metadata::ParserMetadata;

/// Errors raised while staging a language's sources.
#[derive(Debug, Error)]
pub enum StageError {
	#[error("vendored sources for {lang} not found under {vendor_root} (no directory or {lang}.tar.bz2)")]
	SourcesMissing { lang: String, vendor_root: PathBuf },
	#[error("failed to read archive {path}: {source}")]
	ArchiveRead {
		path: PathBuf,
		source: io::Error,
	},
	#[error("archive member {member} for {lang} escapes the extraction root")]
	PathTraversal { lang: String, member: String },
	#[error("archive for {lang} does not contain a unique root directory")]
	AmbiguousRoot { lang: String },
	#[error("expected directory for {lang} at {dir} is missing")]
	MissingLocation { lang: String, dir: PathBuf },
	#[error("sources for {lang} are missing declared files: {}", .missing.join(" "))]
	MissingFiles { lang: String, missing: Vec<String> },
	#[error(transparent)]
	Io(#[from] io::Error),
}

/// Where a language's vendored sources live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceShape {
	/// Sources are already unpacked under `vendor_root/<lang>`.
	Vendored(PathBuf),
	/// Sources are packed in `vendor_root/<lang>.tar.bz2`.
	Archived(PathBuf),
}

impl SourceShape {
	/// Picks the shape for a language. A vendored directory wins over an
	/// archive when both exist.
	pub fn detect(vendor_root: &Path, lang: &str) -> Result<Self, StageError> {
		let dir = vendor_root.join(lang);
		if dir.is_dir() {
			return Ok(SourceShape::Vendored(dir));
		}
		let archive = vendor_root.join(format!("{lang}.tar.bz2"));
		if archive.is_file() {
			return Ok(SourceShape::Archived(archive));
		}
		Err(StageError::SourcesMissing {
			lang: lang.to_string(),
			vendor_root: vendor_root.to_path_buf(),
		})
	}
}

/// A staged source tree ready for compilation.
///
/// Archived sources are unpacked into a scratch directory owned by this
/// value, so the extraction is removed again when it is dropped, on
/// success and failure paths alike.
#[derive(Debug)]
pub struct StagedSources {
	base_dir: PathBuf,
	_scratch: Option<TempDir>,
}

impl StagedSources {
	/// Directory the metadata's file paths are relative to.
	pub fn base_dir(&self) -> &Path {
		&self.base_dir
	}
}

/// Stages a language's sources and validates the declared file list.
///
/// # Errors
///
/// Each failure mode is distinct: missing sources, unreadable or
/// traversal-attempting archives, ambiguous archive roots, a missing
/// `location` sub-path, or declared files absent from the resolved base.
pub fn stage_sources(
	vendor_root: &Path,
	lang: &str,
	meta: &ParserMetadata,
) -> Result<StagedSources, StageError> {
	let (root, scratch) = match SourceShape::detect(vendor_root, lang)? {
		SourceShape::Vendored(dir) => {
			debug!(lang = %lang, dir = %dir.display(), "Using pre-extracted vendor sources");
			(dir, None)
		}
		SourceShape::Archived(archive) => {
			let scratch = TempDir::new()?;
			extract_archive(&archive, scratch.path(), lang)?;
			let root = locate_archive_root(scratch.path(), lang)?;
			(root, Some(scratch))
		}
	};

	let base_dir = match meta.location.as_deref().filter(|location| !location.is_empty()) {
		Some(location) => root.join(location),
		None => root,
	};
	if !base_dir.is_dir() {
		return Err(StageError::MissingLocation {
			lang: lang.to_string(),
			dir: base_dir,
		});
	}

	let missing: Vec<String> = meta
		.files
		.iter()
		.filter(|file| !base_dir.join(file).is_file())
		.cloned()
		.collect();
	if !missing.is_empty() {
		return Err(StageError::MissingFiles {
			lang: lang.to_string(),
			missing,
		});
	}

	Ok(StagedSources {
		base_dir,
		_scratch: scratch,
	})
}

/// Unpacks the snapshot, refusing any member that would land outside
/// `dest`.
fn extract_archive(archive: &Path, dest: &Path, lang: &str) -> Result<(), StageError> {
	info!(lang = %lang, archive = %archive.display(), "Extracting parser snapshot");
	let read_err = |source: io::Error| StageError::ArchiveRead {
		path: archive.to_path_buf(),
		source,
	};

	let file = fs::File::open(archive).map_err(read_err)?;
	let mut tar = tar::Archive::new(bzip2::read::BzDecoder::new(file));
	for entry in tar.entries().map_err(read_err)? {
		let mut entry = entry.map_err(read_err)?;
		let member = entry.path().map_err(read_err)?.into_owned();
		if !is_safe_member(&member) {
			return Err(StageError::PathTraversal {
				lang: lang.to_string(),
				member: member.display().to_string(),
			});
		}
		entry.unpack_in(dest).map_err(read_err)?;
	}
	Ok(())
}

/// True if the member path stays inside the extraction root.
fn is_safe_member(path: &Path) -> bool {
	let mut depth = 0usize;
	for component in path.components() {
		match component {
			Component::Normal(_) => depth += 1,
			Component::CurDir => {}
			Component::ParentDir => {
				if depth == 0 {
					return false;
				}
				depth -= 1;
			}
			Component::RootDir | Component::Prefix(_) => return false,
		}
	}
	true
}

/// Finds the snapshot's root directory: `<lang>` when present, else the
/// single top-level directory. Anything else means the vendoring step
/// changed its archive layout and should be re-run.
fn locate_archive_root(extract_root: &Path, lang: &str) -> Result<PathBuf, StageError> {
	let named = extract_root.join(lang);
	if named.is_dir() {
		return Ok(named);
	}

	let mut dirs = Vec::new();
	for entry in fs::read_dir(extract_root)? {
		let entry = entry?;
		if entry.file_type()?.is_dir() {
			dirs.push(entry.path());
		}
	}
	match dirs.as_slice() {
		[only] => Ok(only.clone()),
		_ => Err(StageError::AmbiguousRoot {
			lang: lang.to_string(),
		}),
	}
}

#[cfg(test)]
mod tests {
	use std::io::Write;

	use super::*;

	fn meta(files: &[&str], location: Option<&str>) -> ParserMetadata {
		ParserMetadata {
			location: location.map(str::to_owned),
			files: files.iter().map(|f| f.to_string()).collect(),
			revision: None,
			use_makefile: None,
			cxx_standard: None,
		}
	}

	fn write_file(path: &Path, contents: &str) {
		fs::create_dir_all(path.parent().unwrap()).unwrap();
		fs::write(path, contents).unwrap();
	}

	/// Packs `entries` (relative path, contents) under a `root_dir` into a
	/// bzip2 tarball at `archive`.
	fn pack_archive(archive: &Path, root_dir: &str, entries: &[(&str, &str)]) {
		let file = fs::File::create(archive).unwrap();
		let encoder = bzip2::write::BzEncoder::new(file, bzip2::Compression::default());
		let mut builder = tar::Builder::new(encoder);
		for (rel, contents) in entries {
			let mut header = tar::Header::new_gnu();
			header.set_size(contents.len() as u64);
			header.set_mode(0o644);
			header.set_cksum();
			builder
				.append_data(&mut header, format!("{root_dir}/{rel}"), contents.as_bytes())
				.unwrap();
		}
		builder.into_inner().unwrap().finish().unwrap().flush().unwrap();
	}

	#[test]
	fn stages_pre_extracted_sources() {
		let vendor = tempfile::tempdir().unwrap();
		write_file(&vendor.path().join("python/src/parser.c"), "int x;");
		write_file(&vendor.path().join("python/src/scanner.c"), "int y;");

		let staged = stage_sources(
			vendor.path(),
			"python",
			&meta(&["src/parser.c", "src/scanner.c"], None),
		)
		.unwrap();
		assert_eq!(staged.base_dir(), vendor.path().join("python"));
	}

	#[test]
	fn applies_location_sub_path() {
		let vendor = tempfile::tempdir().unwrap();
		write_file(&vendor.path().join("typescript/tsx/src/parser.c"), "int x;");

		let staged = stage_sources(
			vendor.path(),
			"typescript",
			&meta(&["src/parser.c"], Some("tsx")),
		)
		.unwrap();
		assert_eq!(staged.base_dir(), vendor.path().join("typescript/tsx"));

		let missing = stage_sources(
			vendor.path(),
			"typescript",
			&meta(&["src/parser.c"], Some("nope")),
		);
		assert!(matches!(missing, Err(StageError::MissingLocation { .. })));
	}

	#[test]
	fn missing_declared_file_is_a_hard_failure() {
		let vendor = tempfile::tempdir().unwrap();
		write_file(&vendor.path().join("json/src/parser.c"), "int x;");

		let result = stage_sources(
			vendor.path(),
			"json",
			&meta(&["src/parser.c", "src/scanner.c"], None),
		);
		match result {
			Err(StageError::MissingFiles { missing, .. }) => {
				assert_eq!(missing, ["src/scanner.c"]);
			}
			other => panic!("expected MissingFiles, got {other:?}"),
		}
	}

	#[test]
	fn absent_sources_are_reported() {
		let vendor = tempfile::tempdir().unwrap();
		let result = stage_sources(vendor.path(), "ghost", &meta(&["src/parser.c"], None));
		assert!(matches!(result, Err(StageError::SourcesMissing { .. })));
	}

	#[test]
	fn stages_archive_with_matching_root() {
		let vendor = tempfile::tempdir().unwrap();
		pack_archive(
			&vendor.path().join("lua.tar.bz2"),
			"lua",
			&[("src/parser.c", "int x;")],
		);

		let staged = stage_sources(vendor.path(), "lua", &meta(&["src/parser.c"], None)).unwrap();
		assert!(staged.base_dir().join("src/parser.c").is_file());
	}

	#[test]
	fn stages_archive_with_single_foreign_root() {
		let vendor = tempfile::tempdir().unwrap();
		pack_archive(
			&vendor.path().join("lua.tar.bz2"),
			"tree-sitter-lua-1234",
			&[("src/parser.c", "int x;")],
		);

		let staged = stage_sources(vendor.path(), "lua", &meta(&["src/parser.c"], None)).unwrap();
		assert!(staged.base_dir().ends_with("tree-sitter-lua-1234"));
	}

	#[test]
	fn multiple_foreign_roots_are_ambiguous() {
		let vendor = tempfile::tempdir().unwrap();
		let file = fs::File::create(vendor.path().join("lua.tar.bz2")).unwrap();
		let encoder = bzip2::write::BzEncoder::new(file, bzip2::Compression::default());
		let mut builder = tar::Builder::new(encoder);
		for root_dir in ["first", "second"] {
			let mut header = tar::Header::new_gnu();
			header.set_size(6);
			header.set_mode(0o644);
			header.set_cksum();
			builder
				.append_data(&mut header, format!("{root_dir}/src/parser.c"), &b"int x;"[..])
				.unwrap();
		}
		builder.into_inner().unwrap().finish().unwrap().flush().unwrap();

		let result = stage_sources(vendor.path(), "lua", &meta(&["src/parser.c"], None));
		assert!(matches!(result, Err(StageError::AmbiguousRoot { .. })));
	}

	#[test]
	fn traversal_member_aborts_extraction() {
		let vendor = tempfile::tempdir().unwrap();
		let file = fs::File::create(vendor.path().join("evil.tar.bz2")).unwrap();
		let encoder = bzip2::write::BzEncoder::new(file, bzip2::Compression::default());
		let mut builder = tar::Builder::new(encoder);
		// Write the member name into the header directly; set_path would
		// reject it before it ever reached the extraction guard.
		let mut header = tar::Header::new_gnu();
		let name = b"../../etc/passwd";
		header.as_gnu_mut().unwrap().name[..name.len()].copy_from_slice(name);
		header.set_size(5);
		header.set_mode(0o644);
		header.set_cksum();
		builder.append(&header, &b"oops\n"[..]).unwrap();
		builder.into_inner().unwrap().finish().unwrap().flush().unwrap();

		let result = stage_sources(vendor.path(), "evil", &meta(&["src/parser.c"], None));
		assert!(matches!(result, Err(StageError::PathTraversal { .. })));
	}

	#[test]
	fn member_path_guard() {
		assert!(is_safe_member(Path::new("lua/src/parser.c")));
		assert!(is_safe_member(Path::new("./lua/parser.c")));
		assert!(is_safe_member(Path::new("a/../b")));
		assert!(!is_safe_member(Path::new("../evil")));
		assert!(!is_safe_member(Path::new("a/../../evil")));
		assert!(!is_safe_member(Path::new("/etc/passwd")));
	}

	#[test]
	fn vendored_directory_wins_over_archive() {
		let vendor = tempfile::tempdir().unwrap();
		write_file(&vendor.path().join("lua/src/parser.c"), "int x;");
		pack_archive(
			&vendor.path().join("lua.tar.bz2"),
			"lua",
			&[("src/parser.c", "int y;")],
		);
		let shape = SourceShape::detect(vendor.path(), "lua").unwrap();
		assert_eq!(shape, SourceShape::Vendored(vendor.path().join("lua")));
	}
}
