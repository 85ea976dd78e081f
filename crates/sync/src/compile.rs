//! Compiler driving: direct host-compiler invocation or a project
//! Makefile.
//!
//! Either way the output lands at `parser<suffix>` inside the staged
//! base directory; the installer owns the copy into the final path, so
//! an interrupted build can never leave a torn library where the editor
//! loads parsers from.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use thiserror::Error;
use tracing::{debug, info};

use crate::metadata::ParserMetadata;
use crate::{Platform, SyncConfig};

/// Errors raised while building one language's parser.
#[derive(Debug, Error)]
pub enum BuildError {
	#[error("required build tool '{0}' not found")]
	ToolchainMissing(String),
	#[error("{tool} failed for {lang}: {stderr}")]
	CommandFailed {
		lang: String,
		tool: String,
		stderr: String,
	},
	#[error("build completed for {lang} but expected artifact {artifact} was not produced")]
	ArtifactMissing { lang: String, artifact: PathBuf },
	#[error(transparent)]
	Io(#[from] io::Error),
}

/// A successfully built scratch artifact.
#[derive(Debug)]
pub struct CompiledParser {
	/// `parser<suffix>` inside the staged base directory.
	pub artifact: PathBuf,
	/// Whether the Makefile path was taken (a `clean` should follow the
	/// install).
	pub used_makefile: bool,
}

/// Compiles one language's parser inside its staged base directory.
///
/// A project Makefile is used when the metadata asks for it or one is
/// present at the base directory; otherwise the configured compiler is
/// invoked directly. Any stale scratch artifact is removed first so a
/// failed build cannot hand the installer an old library.
pub fn compile_parser(
	config: &SyncConfig,
	lang: &str,
	meta: &ParserMetadata,
	base_dir: &Path,
) -> Result<CompiledParser, BuildError> {
	let output_name = format!("parser{}", config.platform.library_suffix());
	let artifact = base_dir.join(&output_name);
	if artifact.exists() {
		fs::remove_file(&artifact)?;
	}

	let used_makefile = meta.wants_makefile() || base_dir.join("Makefile").is_file();
	info!(lang = %lang, base = %base_dir.display(), makefile = used_makefile, "Building parser");

	if used_makefile {
		compile_with_make(lang, base_dir)?;
	} else {
		let mut cmd = Command::new(&config.compiler);
		cmd.args(compiler_args(config, meta, base_dir, &artifact)).current_dir(base_dir);
		run_build_tool(cmd, lang, &config.compiler)?;
	}

	if !artifact.is_file() {
		return Err(BuildError::ArtifactMissing {
			lang: lang.to_string(),
			artifact,
		});
	}
	Ok(CompiledParser {
		artifact,
		used_makefile,
	})
}

/// Argument list for a direct compile.
///
/// Mirrors the flag model the vendored snapshots were built against:
/// size-optimized, C11 or C++14 (metadata may override the C++
/// standard), a loadable bundle on Apple targets and a shared object
/// elsewhere, position-independent code everywhere but Windows.
fn compiler_args(
	config: &SyncConfig,
	meta: &ParserMetadata,
	base_dir: &Path,
	output: &Path,
) -> Vec<OsString> {
	let mut args: Vec<OsString> = vec![
		"-o".into(),
		output.into(),
		"-I".into(),
		base_dir.join("src").into(),
		"-I".into(),
		config.runtime_include.clone().into(),
	];
	args.extend(meta.files.iter().map(OsString::from));
	args.push("-Os".into());

	if meta.has_cpp_sources() {
		let standard = meta.cxx_standard.as_deref().unwrap_or("c++14");
		args.push(format!("-std={standard}").into());
		args.push("-lstdc++".into());
	} else {
		args.push("-std=c11".into());
	}

	args.push(
		match config.platform {
			Platform::Apple => "-bundle",
			Platform::Windows | Platform::Unix => "-shared",
		}
		.into(),
	);
	if config.platform != Platform::Windows {
		args.push("-fPIC".into());
	}
	args
}

/// Runs the discovered make tool in the staged base directory.
fn compile_with_make(lang: &str, base_dir: &Path) -> Result<(), BuildError> {
	let make = find_make().ok_or_else(|| BuildError::ToolchainMissing("make".to_string()))?;
	let mut cmd = Command::new(&make);
	cmd.current_dir(base_dir);
	set_treesitter_env(&mut cmd);
	run_build_tool(cmd, lang, "make")
}

/// Best-effort `make clean` after the artifact has been installed.
/// Failures are swallowed; a dirty scratch tree is not worth failing a
/// finished build over.
pub fn make_clean(base_dir: &Path) {
	let Some(make) = find_make() else { return };
	let mut cmd = Command::new(make);
	cmd.arg("clean")
		.current_dir(base_dir)
		.stdout(Stdio::null())
		.stderr(Stdio::null());
	set_treesitter_env(&mut cmd);
	if let Err(error) = cmd.status() {
		debug!(base = %base_dir.display(), error = %error, "make clean failed");
	}
}

fn find_make() -> Option<PathBuf> {
	which::which("gmake").or_else(|_| which::which("make")).ok()
}

/// Grammar Makefiles key off `TS` to pick Tree-sitter build mode; honor
/// an operator-provided value.
fn set_treesitter_env(cmd: &mut Command) {
	if std::env::var_os("TS").is_none() {
		cmd.env("TS", "true");
	}
}

fn run_build_tool(mut cmd: Command, lang: &str, tool: &str) -> Result<(), BuildError> {
	log_command(&cmd);
	let output = cmd.output().map_err(|error| {
		if error.kind() == io::ErrorKind::NotFound {
			BuildError::ToolchainMissing(tool.to_string())
		} else {
			BuildError::Io(error)
		}
	})?;

	if output.status.success() {
		Ok(())
	} else {
		Err(BuildError::CommandFailed {
			lang: lang.to_string(),
			tool: tool.to_string(),
			stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
		})
	}
}

/// Echoes the command line before running it, as the build traces always
/// have.
fn log_command(cmd: &Command) {
	let rendered: Vec<String> = std::iter::once(cmd.get_program())
		.chain(cmd.get_args())
		.map(|arg| arg.to_string_lossy().into_owned())
		.collect();
	let rendered = rendered.join(" ");
	match cmd.get_current_dir() {
		Some(cwd) => info!(cwd = %cwd.display(), "$ {rendered}"),
		None => info!("$ {rendered}"),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn test_config(platform: Platform) -> SyncConfig {
		SyncConfig::for_root(Path::new("/repo"), platform, "cc".into())
	}

	fn meta(files: &[&str], cxx_standard: Option<&str>) -> ParserMetadata {
		ParserMetadata {
			location: None,
			files: files.iter().map(|f| f.to_string()).collect(),
			revision: None,
			use_makefile: None,
			cxx_standard: cxx_standard.map(str::to_owned),
		}
	}

	fn args_for(platform: Platform, files: &[&str], cxx_standard: Option<&str>) -> Vec<String> {
		compiler_args(
			&test_config(platform),
			&meta(files, cxx_standard),
			Path::new("/stage/python"),
			Path::new("/stage/python/parser.so"),
		)
		.into_iter()
		.map(|arg| arg.to_string_lossy().into_owned())
		.collect()
	}

	#[test]
	fn c_sources_on_unix() {
		let args = args_for(Platform::Unix, &["src/parser.c"], None);
		assert!(args.contains(&"-std=c11".to_string()));
		assert!(args.contains(&"-shared".to_string()));
		assert!(args.contains(&"-fPIC".to_string()));
		assert!(args.contains(&"-Os".to_string()));
		assert!(args.contains(&"/stage/python/src".to_string()));
		assert!(!args.contains(&"-lstdc++".to_string()));
		assert!(!args.contains(&"-bundle".to_string()));
	}

	#[test]
	fn cpp_sources_pull_in_the_cpp_standard_and_runtime() {
		let args = args_for(Platform::Unix, &["src/parser.c", "src/scanner.cc"], None);
		assert!(args.contains(&"-std=c++14".to_string()));
		assert!(args.contains(&"-lstdc++".to_string()));
		assert!(!args.contains(&"-std=c11".to_string()));
	}

	#[test]
	fn metadata_overrides_the_cpp_standard() {
		let args = args_for(
			Platform::Unix,
			&["src/parser.c", "src/scanner.cxx"],
			Some("c++17"),
		);
		assert!(args.contains(&"-std=c++17".to_string()));
		assert!(!args.contains(&"-std=c++14".to_string()));
	}

	#[test]
	fn apple_links_a_bundle() {
		let args = args_for(Platform::Apple, &["src/parser.c"], None);
		assert!(args.contains(&"-bundle".to_string()));
		assert!(args.contains(&"-fPIC".to_string()));
		assert!(!args.contains(&"-shared".to_string()));
	}

	#[test]
	fn windows_omits_pic() {
		let args = args_for(Platform::Windows, &["src/parser.c"], None);
		assert!(args.contains(&"-shared".to_string()));
		assert!(!args.contains(&"-fPIC".to_string()));
	}

	#[test]
	fn source_files_come_in_metadata_order() {
		let args = args_for(Platform::Unix, &["src/parser.c", "src/scanner.c"], None);
		let parser = args.iter().position(|a| a == "src/parser.c").unwrap();
		let scanner = args.iter().position(|a| a == "src/scanner.c").unwrap();
		assert!(parser < scanner);
	}

	#[test]
	fn missing_compiler_is_a_toolchain_error() {
		let stage = tempfile::tempdir().unwrap();
		fs::create_dir_all(stage.path().join("src")).unwrap();
		fs::write(stage.path().join("src/parser.c"), "int x;").unwrap();

		let mut config = test_config(Platform::Unix);
		config.compiler = "treesitter-sync-no-such-compiler".to_string();
		let result = compile_parser(&config, "python", &meta(&["src/parser.c"], None), stage.path());
		match result {
			Err(BuildError::ToolchainMissing(tool)) => {
				assert_eq!(tool, "treesitter-sync-no-such-compiler");
			}
			other => panic!("expected ToolchainMissing, got {other:?}"),
		}
		assert!(!stage.path().join("parser.so").exists());
	}

	#[cfg(unix)]
	#[test]
	fn silent_compiler_success_without_artifact_is_reported() {
		let stage = tempfile::tempdir().unwrap();
		fs::create_dir_all(stage.path().join("src")).unwrap();
		fs::write(stage.path().join("src/parser.c"), "int x;").unwrap();

		// `true` exits zero and writes nothing.
		let mut config = test_config(Platform::host());
		config.compiler = "true".to_string();
		let result = compile_parser(&config, "python", &meta(&["src/parser.c"], None), stage.path());
		assert!(matches!(result, Err(BuildError::ArtifactMissing { .. })));
	}
}
