use trilan_core::RecordId;

use crate::cli::EntryKind;
use crate::commands::common::Workspace;
use crate::error::CliError;

pub fn run_delete(workspace: &Workspace, kind: EntryKind, id: i64) -> Result<(), CliError> {
    let id = RecordId::new(id);
    if !workspace.store().delete(kind.collection(), id)? {
        return Err(CliError::EntryNotFound {
            collection: kind.collection(),
            id,
        });
    }

    println!("{id}");
    Ok(())
}
