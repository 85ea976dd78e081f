//! Post-build verification of installed parsers.
//!
//! The verifier is read-only and collects every finding across the
//! whole manifest before reporting, so one run surfaces the complete
//! list of problems. `--check` mode runs it standalone.

use std::fmt;
use std::fs;

use crate::metadata::MetadataStore;
use crate::SyncConfig;

/// A single verification finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finding {
	/// Expected artifact is not installed.
	MissingParser(String),
	/// Recorded revision does not match the metadata pin (or the record
	/// is absent).
	RevisionMismatch {
		lang: String,
		expected: String,
		found: Option<String>,
	},
}

/// Collected findings for one verification pass.
#[derive(Debug, Default)]
pub struct VerifyReport {
	pub findings: Vec<Finding>,
}

impl VerifyReport {
	pub fn is_ok(&self) -> bool {
		self.findings.is_empty()
	}

	fn missing(&self) -> Vec<&str> {
		self.findings
			.iter()
			.filter_map(|finding| match finding {
				Finding::MissingParser(lang) => Some(lang.as_str()),
				Finding::RevisionMismatch { .. } => None,
			})
			.collect()
	}

	fn mismatched(&self) -> Vec<&str> {
		self.findings
			.iter()
			.filter_map(|finding| match finding {
				Finding::RevisionMismatch { lang, .. } => Some(lang.as_str()),
				Finding::MissingParser(_) => None,
			})
			.collect()
	}
}

impl fmt::Display for VerifyReport {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let missing = self.missing();
		let mismatched = self.mismatched();
		let mut first = true;
		if !missing.is_empty() {
			write!(f, "missing Tree-sitter parsers: {}", missing.join(" "))?;
			first = false;
		}
		if !mismatched.is_empty() {
			if !first {
				writeln!(f)?;
			}
			write!(f, "revision metadata mismatch: {}", mismatched.join(" "))?;
		}
		Ok(())
	}
}

/// Checks every manifest language against the install directories.
///
/// An artifact must exist for each language; when metadata pins a
/// non-empty revision, the record must exist and its trimmed contents
/// must equal the pin.
pub fn verify_installation(
	config: &SyncConfig,
	manifest: &[String],
	metadata: &MetadataStore,
) -> VerifyReport {
	let mut report = VerifyReport::default();
	for lang in manifest {
		if !config.artifact_path(lang).is_file() {
			report.findings.push(Finding::MissingParser(lang.clone()));
			continue;
		}

		let Some(expected) = metadata.get(lang).and_then(|meta| meta.pinned_revision()) else {
			continue;
		};
		let found = fs::read_to_string(config.revision_path(lang))
			.ok()
			.map(|recorded| recorded.trim().to_string());
		if found.as_deref() != Some(expected) {
			report.findings.push(Finding::RevisionMismatch {
				lang: lang.clone(),
				expected: expected.to_string(),
				found,
			});
		}
	}
	report
}
