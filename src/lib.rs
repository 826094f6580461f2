//! kubesec: security risk analysis for Kubernetes resources.
//!
//! Scores workload manifests against a fixed catalogue of hardening rules
//! and checks them against the Pod Security Standards.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::path::Path;
//! use kubesec::{scan, ScanOptions};
//!
//! let options = ScanOptions::default();
//! let reports = scan(Path::new("./deployment.yaml"), &options).unwrap();
//! for report in &reports {
//!     println!("{}: {}", report.object, report.score);
//! }
//! ```

pub mod config;
pub mod error;
pub mod intoto;
pub mod manifest;
pub mod output;
pub mod pss;
pub mod rules;
pub mod schema;
pub mod server;

use std::path::Path;

use config::Config;
use error::Result;
use manifest::Manifest;
use output::OutputFormat;
use pss::{Evaluator, PssOutcome};
use rules::{Report, Ruleset};
use schema::SchemaConfig;

/// Options for a scan invocation.
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    pub schema: SchemaConfig,
    /// Record absolute file paths in reports.
    pub absolute_path: bool,
}

impl From<&Config> for ScanOptions {
    fn from(config: &Config) -> Self {
        Self {
            schema: config.schema.clone(),
            absolute_path: config.scan.absolute_path,
        }
    }
}

/// Read a manifest from disk (or stdin for `-`) and score every document.
pub fn scan(path: &Path, options: &ScanOptions) -> Result<Vec<Report>> {
    let manifest = Manifest::read(path, options.absolute_path)?;
    scan_manifest(&manifest, options)
}

/// Score every document of an already-read manifest.
pub fn scan_manifest(manifest: &Manifest, options: &ScanOptions) -> Result<Vec<Report>> {
    let ruleset = Ruleset::new(options.schema.clone());
    let reports = ruleset.run(&manifest.name, &manifest.bytes)?;
    tracing::debug!(file = %manifest.name, reports = reports.len(), "scan complete");
    Ok(reports)
}

/// Check a manifest's workloads against a Pod Security Standards profile.
pub fn pss_scan(
    path: &Path,
    profile: &str,
    version: &str,
    absolute_path: bool,
) -> Result<PssOutcome> {
    let manifest = Manifest::read(path, absolute_path)?;
    Evaluator::new().run(&manifest.name, &manifest.bytes, profile, version)
}

/// Whether any report should fail the run: invalid, or scored zero or less.
pub fn has_failures(reports: &[Report]) -> bool {
    reports.iter().any(|r| !r.passed())
}

/// Render scan reports in the specified format.
pub fn render_report(reports: &[Report], format: OutputFormat) -> Result<String> {
    output::render(reports, format)
}
