//! Typed access to the vendored parser metadata document.
//!
//! `metadata.json` is written by the vendoring step and maps each
//! language to the record needed to stage and compile its parser. The
//! whole document is decoded up front so malformed entries surface with
//! a field-level error before any build work starts.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::ConfigError;

/// Per-language build metadata recorded by the vendoring step.
///
/// The vendoring step records extra bookkeeping keys (`url`, `branch`,
/// npm flags); those are accepted and ignored here.
#[derive(Debug, Clone, Deserialize)]
pub struct ParserMetadata {
	/// Sub-path inside the source tree holding the parser project.
	#[serde(default)]
	pub location: Option<String>,
	/// Source files, relative to the resolved base directory.
	pub files: Vec<String>,
	/// Upstream revision the vendored snapshot is expected to match.
	#[serde(default)]
	pub revision: Option<String>,
	/// Build through the project Makefile instead of a direct compile.
	#[serde(default)]
	pub use_makefile: Option<bool>,
	/// C++ standard override for grammars with external scanners.
	#[serde(default)]
	pub cxx_standard: Option<String>,
}

impl ParserMetadata {
	/// The pinned revision, if one is recorded and non-empty.
	pub fn pinned_revision(&self) -> Option<&str> {
		self.revision.as_deref().map(str::trim).filter(|revision| !revision.is_empty())
	}

	/// True if any listed source file is C++.
	pub fn has_cpp_sources(&self) -> bool {
		self.files.iter().any(|file| {
			Path::new(file)
				.extension()
				.is_some_and(|ext| ext == "cc" || ext == "cpp" || ext == "cxx")
		})
	}

	/// True if the metadata asks for a Makefile build.
	pub fn wants_makefile(&self) -> bool {
		self.use_makefile.unwrap_or(false)
	}
}

/// The decoded metadata document, keyed by language.
#[derive(Debug, Default)]
pub struct MetadataStore {
	entries: BTreeMap<String, ParserMetadata>,
}

impl MetadataStore {
	/// Loads and decodes the metadata document at `path`.
	///
	/// # Errors
	///
	/// Returns [`ConfigError::MetadataMissing`] when the file does not
	/// exist (the vendoring step has not run), and
	/// [`ConfigError::MetadataDecode`] when any entry fails typed
	/// decoding.
	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		if !path.is_file() {
			return Err(ConfigError::MetadataMissing(path.to_path_buf()));
		}
		let text = fs::read_to_string(path).map_err(|source| ConfigError::MetadataRead {
			path: path.to_path_buf(),
			source,
		})?;
		let entries = serde_json::from_str(&text).map_err(|source| ConfigError::MetadataDecode {
			path: path.to_path_buf(),
			source,
		})?;
		Ok(Self { entries })
	}

	/// Metadata for a language, or `None` if the document has no entry.
	pub fn get(&self, lang: &str) -> Option<&ParserMetadata> {
		self.entries.get(lang)
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}
