use trilan_core::{NewEntry, RecordId};

use crate::cli::{EntryFields, EntryKind};
use crate::commands::common::{ensure_category_kind, fields_to_patch, Workspace};
use crate::error::CliError;

/// Add an entry and print its id.
pub fn run_add(
    workspace: &Workspace,
    kind: EntryKind,
    fields: &EntryFields,
    category: Option<i64>,
) -> Result<RecordId, CliError> {
    let patch = fields_to_patch(fields);
    let category_id = category.map(RecordId::new);
    if let Some(id) = category_id {
        ensure_category_kind(workspace.store(), id, kind)?;
    }

    let draft = NewEntry {
        traditional: patch.traditional.unwrap_or_default(),
        simplified: patch.simplified.unwrap_or_default(),
        english: patch.english.unwrap_or_default(),
        korean: patch.korean.unwrap_or_default(),
        ..NewEntry::default()
    }
    .with_category(category_id)
    .with_author(workspace.author_handle());
    if draft.is_blank() {
        return Err(CliError::EmptyEntry);
    }

    let document = workspace.store().add(kind.collection(), &draft)?;
    println!("{}", document.id());
    Ok(document.id())
}
