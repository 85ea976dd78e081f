//! Build and install vendored Tree-sitter parsers.
//!
//! The pipeline reconciles the Neovim-visible parser directory with a
//! plain-text manifest of languages: for each listed language it stages
//! the vendored sources (a pre-extracted directory or a `.tar.bz2`
//! snapshot), compiles them into a shared library, installs the result
//! next to a recorded revision pin, prunes parsers that left the
//! manifest, and verifies the final state.

pub mod compile;
pub mod install;
pub mod manifest;
pub mod metadata;
pub mod pipeline;
pub mod stage;
pub mod verify;

use std::path::{Path, PathBuf};

use thiserror::Error;

pub use compile::{BuildError, CompiledParser, compile_parser};
pub use manifest::load_manifest;
pub use metadata::{MetadataStore, ParserMetadata};
pub use stage::{SourceShape, StageError, StagedSources, stage_sources};
pub use verify::{Finding, VerifyReport, verify_installation};

/// Errors raised before any per-language work begins.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("failed to read manifest at {path}: {source}")]
	ManifestRead {
		path: PathBuf,
		source: std::io::Error,
	},
	#[error("manifest {0} does not list any Tree-sitter parsers")]
	ManifestEmpty(PathBuf),
	#[error("Tree-sitter metadata not found at {0}; run the vendoring step first")]
	MetadataMissing(PathBuf),
	#[error("failed to read metadata at {path}: {source}")]
	MetadataRead {
		path: PathBuf,
		source: std::io::Error,
	},
	#[error("failed to decode metadata at {path}: {source}")]
	MetadataDecode {
		path: PathBuf,
		source: serde_json::Error,
	},
	#[error("metadata for parser {0} not found; refresh the vendor snapshot first")]
	MissingLanguage(String),
}

/// Errors from any stage of a sync run.
#[derive(Debug, Error)]
pub enum SyncError {
	#[error(transparent)]
	Config(#[from] ConfigError),
	#[error(transparent)]
	Stage(#[from] StageError),
	#[error(transparent)]
	Build(#[from] BuildError),
	#[error("{0}")]
	Verification(VerifyReport),
	#[error(transparent)]
	Io(#[from] std::io::Error),
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Host platform family, as far as shared-library conventions go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
	/// macOS and friends: `.dylib`, linked as a loadable bundle.
	Apple,
	/// Windows: `.dll`, no `-fPIC`.
	Windows,
	/// Everything else: `.so`.
	Unix,
}

impl Platform {
	/// Platform of the running host.
	pub fn host() -> Self {
		if cfg!(any(target_os = "macos", target_os = "ios")) {
			Platform::Apple
		} else if cfg!(windows) {
			Platform::Windows
		} else {
			Platform::Unix
		}
	}

	/// Shared-library suffix, dot included.
	pub fn library_suffix(self) -> &'static str {
		match self {
			Platform::Apple => ".dylib",
			Platform::Windows => ".dll",
			Platform::Unix => ".so",
		}
	}
}

/// Everything a sync run needs to know about its surroundings.
///
/// All paths, the compiler, and the platform travel together here so no
/// component reads the environment or the working directory on its own.
#[derive(Debug, Clone)]
pub struct SyncConfig {
	/// Directory holding per-language source directories or archives.
	pub vendor_root: PathBuf,
	/// Include directory with the vendored Tree-sitter runtime headers.
	pub runtime_include: PathBuf,
	/// Directory the editor loads parsers from.
	pub parser_dir: PathBuf,
	/// Directory holding `<lang>.revision` records.
	pub info_dir: PathBuf,
	/// Host C/C++ compiler for direct compiles.
	pub compiler: String,
	pub platform: Platform,
}

impl SyncConfig {
	/// Standard layout under a dotfiles repository root.
	pub fn for_root(root: &Path, platform: Platform, compiler: String) -> Self {
		let vendor_root = root.join("vendor").join("tree-sitter");
		let plugin_dir = root.join("vendor").join("plugins").join("nvim-treesitter");
		Self {
			runtime_include: vendor_root.clone(),
			vendor_root,
			parser_dir: plugin_dir.join("parser"),
			info_dir: plugin_dir.join("parser-info"),
			compiler,
			platform,
		}
	}

	/// Path of the metadata document written by the vendoring step.
	pub fn metadata_path(&self) -> PathBuf {
		self.vendor_root.join("metadata.json")
	}

	/// Installed artifact path for a language.
	pub fn artifact_path(&self, lang: &str) -> PathBuf {
		self.parser_dir.join(format!("{lang}{}", self.platform.library_suffix()))
	}

	/// Revision record path for a language.
	pub fn revision_path(&self, lang: &str) -> PathBuf {
		self.info_dir.join(format!("{lang}.revision"))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn library_suffix_per_platform() {
		assert_eq!(Platform::Unix.library_suffix(), ".so");
		assert_eq!(Platform::Apple.library_suffix(), ".dylib");
		assert_eq!(Platform::Windows.library_suffix(), ".dll");
	}

	#[test]
	fn config_layout_under_root() {
		let config = SyncConfig::for_root(Path::new("/repo"), Platform::Unix, "cc".into());
		assert_eq!(config.metadata_path(), Path::new("/repo/vendor/tree-sitter/metadata.json"));
		assert_eq!(
			config.artifact_path("python"),
			Path::new("/repo/vendor/plugins/nvim-treesitter/parser/python.so")
		);
		assert_eq!(
			config.revision_path("python"),
			Path::new("/repo/vendor/plugins/nvim-treesitter/parser-info/python.revision")
		);
	}
}
