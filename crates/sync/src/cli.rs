use std::path::PathBuf;

use clap::Parser;

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "treesitter-sync")]
#[command(about = "Build Tree-sitter parsers from vendored sources")]
#[command(version)]
pub struct Cli {
	/// Override the parser manifest path
	#[arg(long)]
	pub manifest: Option<PathBuf>,

	/// Repository root (default: git toplevel of the working directory)
	#[arg(long)]
	pub root: Option<PathBuf>,

	/// Verify installed parsers without building them
	#[arg(long)]
	pub check: bool,

	/// Remove parsers that are not listed in the manifest (default)
	#[arg(long, overrides_with = "no_prune")]
	pub prune: bool,

	/// Skip pruning of extraneous parsers
	#[arg(long, overrides_with = "prune")]
	pub no_prune: bool,
}

impl Cli {
	/// Pruning is on unless `--no-prune` won the flag fight.
	pub fn prune_enabled(&self) -> bool {
		!self.no_prune
	}
}
