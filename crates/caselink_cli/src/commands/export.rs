//! Export command implementation.

use caselink_engine::{AccessScope, ExportOptions, Exporter, DEFAULT_CHUNK_SIZE};
use caselink_store::ExportType;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Arguments for the export command.
pub struct ExportArgs {
    /// Data file to load.
    pub data: PathBuf,
    /// Export type name.
    pub export_type: String,
    /// Outbreak restriction; empty means all.
    pub outbreaks: Vec<String>,
    /// Optional artifact passphrase.
    pub passphrase: Option<String>,
    /// Optional destination path.
    pub out: Option<PathBuf>,
    /// Optional batch size override.
    pub chunk_size: Option<usize>,
    /// Include soft-deleted records.
    pub include_deleted: bool,
    /// Emit empty collections.
    pub include_empty: bool,
    /// Apply peer redaction.
    pub redact: bool,
}

fn parse_export_type(name: &str) -> Result<ExportType, String> {
    match name.to_ascii_lowercase().as_str() {
        "mobile" => Ok(ExportType::Mobile),
        "system" => Ok(ExportType::System),
        "outbreak" => Ok(ExportType::Outbreak),
        "full" => Ok(ExportType::Full),
        other => Err(format!(
            "unknown export type {other:?} (expected mobile, system, outbreak or full)"
        )),
    }
}

/// Runs the export command.
pub fn run(args: &ExportArgs) -> Result<(), Box<dyn std::error::Error>> {
    let export_type = parse_export_type(&args.export_type)?;
    let store = super::load_store(&args.data)?;

    // Requested outbreak ids go through the exporter so they are checked
    // against the operator's scope, not assumed.
    let scope = AccessScope::full(export_type);
    let options = ExportOptions {
        outbreaks: args.outbreaks.clone(),
        passphrase: args.passphrase.clone(),
        dest: args.out.clone(),
        include_deleted: args.include_deleted,
        include_empty: args.include_empty,
        redact_for_peer: args.redact,
        chunk_size: args.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE),
        ..ExportOptions::default()
    };

    info!(
        export_type = %args.export_type,
        outbreaks = args.outbreaks.len(),
        "starting export"
    );
    let exporter = Exporter::new(Arc::new(store));
    let output = exporter.export(&scope, &options)?;
    info!(
        archive = %output.archive.display(),
        records = output.record_count,
        "export finished"
    );

    println!("Snapshot: {}", output.archive.display());
    println!(
        "  {} records in {} batches",
        output.record_count, output.batch_count
    );
    for warning in &output.warnings {
        println!("  warning: {warning}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_type_parsing() {
        assert_eq!(parse_export_type("Mobile").unwrap(), ExportType::Mobile);
        assert_eq!(parse_export_type("FULL").unwrap(), ExportType::Full);
        assert!(parse_export_type("everything").is_err());
    }
}
