//! Import command implementation.

use caselink_engine::{ImportOptions, Importer, OutbreakScope};
use caselink_store::MemoryStore;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// What an import run did, for output rendering.
#[derive(Debug, Serialize)]
struct ImportReport {
    created: usize,
    updated: usize,
    removed: usize,
    untouched: usize,
    skipped: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    failures: Vec<String>,
}

/// Runs the import command.
pub fn run(
    archive: &Path,
    data: Option<&Path>,
    passphrase: Option<String>,
    outbreaks: Vec<String>,
    save: Option<PathBuf>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = match data {
        Some(path) => super::load_store(path)?,
        None => MemoryStore::new(),
    };
    let store = Arc::new(store);

    let mut options = ImportOptions::default().with_scope(OutbreakScope::from_ids(outbreaks));
    if let Some(passphrase) = passphrase {
        options = options.with_passphrase(passphrase);
    }

    info!(archive = %archive.display(), "starting import");
    let importer = Importer::new(Arc::clone(&store) as Arc<dyn caselink_store::DocumentStore>);
    let output = importer.import(archive, &options)?;
    info!(
        created = output.stats.created,
        updated = output.stats.updated,
        skipped = output.stats.skipped,
        "import finished"
    );

    let report = ImportReport {
        created: output.stats.created,
        updated: output.stats.updated,
        removed: output.stats.removed,
        untouched: output.stats.untouched,
        skipped: output.stats.skipped,
        failures: output.failures,
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => {
            println!("Applied {}", archive.display());
            println!(
                "  created {}  updated {}  removed {}  untouched {}  skipped {}",
                report.created, report.updated, report.removed, report.untouched, report.skipped
            );
            for failure in &report.failures {
                println!("  failure: {failure}");
            }
        }
    }

    if let Some(path) = save {
        super::save_store(&store, &path)?;
        println!("Saved merged data to {}", path.display());
    }
    Ok(())
}
