use std::path::{Path, PathBuf};

use chrono::Local;
use trilan_core::export::{
    export_backup, import_backup, parse_backup, render_backup_json, suggested_backup_file_name,
};

use crate::commands::common::Workspace;
use crate::error::CliError;

/// Write a backup to `output_path`, or to stdout when omitted.
///
/// A directory gets a dated file name inside it.
pub fn run_export(workspace: &Workspace, output_path: Option<&Path>) -> Result<(), CliError> {
    let backup = export_backup(workspace.store())?;
    let rendered = render_backup_json(&backup)?;

    if let Some(path) = output_path {
        let path = backup_target(path);
        std::fs::write(&path, rendered)?;
        println!("{}", path.display());
    } else {
        println!("{rendered}");
    }

    Ok(())
}

fn backup_target(path: &Path) -> PathBuf {
    if path.is_dir() {
        path.join(suggested_backup_file_name(Local::now().date_naive()))
    } else {
        path.to_path_buf()
    }
}

/// Replace every collection with the backup at `path`. Nothing changes if it is invalid.
pub fn run_import(workspace: &Workspace, path: &Path) -> Result<(), CliError> {
    let payload = std::fs::read_to_string(path)?;
    let backup = parse_backup(&payload)?;
    let counts = (
        backup.categories.len(),
        backup.dictionary.len(),
        backup.phrases.len(),
    );
    import_backup(workspace.store(), backup)?;

    println!(
        "Imported {} categories, {} dictionary entries, {} phrases",
        counts.0, counts.1, counts.2
    );
    Ok(())
}
