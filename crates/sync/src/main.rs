mod cli;

use std::path::PathBuf;
use std::process::Command;

use anyhow::{Context, bail};
use clap::Parser;
use cli::Cli;
use tracing_subscriber::EnvFilter;
use treesitter_sync::pipeline::{RunOptions, run};
use treesitter_sync::{Platform, SyncConfig};

fn main() -> anyhow::Result<()> {
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
		.with_target(false)
		.init();

	let cli = Cli::parse();
	let root = match cli.root.clone() {
		Some(root) => root,
		None => repo_root()?,
	};

	let compiler = std::env::var("CC").unwrap_or_else(|_| "cc".to_string());
	let config = SyncConfig::for_root(&root, Platform::host(), compiler);
	let manifest = cli
		.manifest
		.clone()
		.unwrap_or_else(|| root.join("scripts").join("treesitter-parsers.txt"));
	let options = RunOptions {
		check_only: cli.check,
		prune: cli.prune_enabled(),
	};

	if let Err(error) = run(&config, &manifest, &options) {
		eprintln!("error: {error}");
		std::process::exit(1);
	}
	Ok(())
}

/// Repository root via git, matching how every other dotfiles script
/// finds its footing.
fn repo_root() -> anyhow::Result<PathBuf> {
	let output = Command::new("git")
		.args(["rev-parse", "--show-toplevel"])
		.output()
		.context("failed to run git")?;
	if !output.status.success() {
		bail!("failed to determine git repository root (pass --root outside a checkout)");
	}
	Ok(PathBuf::from(String::from_utf8_lossy(&output.stdout).trim_end()))
}
