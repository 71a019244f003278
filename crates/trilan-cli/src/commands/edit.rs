use trilan_core::models::EntryPatch;
use trilan_core::{GlossaryEntry, LocalStore, RecordId};

use crate::cli::{EntryFields, EntryKind};
use crate::commands::common::{
    capture_editor_input_with_initial, ensure_category_kind, fields_to_patch, find_entry,
    normalize_content, parse_entry_form, render_entry_form, Workspace,
};
use crate::error::CliError;

/// Category change requested on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryChange {
    Keep,
    Move(RecordId),
    Clear,
}

impl CategoryChange {
    pub fn from_args(category: Option<i64>, uncategorize: bool) -> Self {
        match (category, uncategorize) {
            (Some(id), _) => Self::Move(RecordId::new(id)),
            (None, true) => Self::Clear,
            (None, false) => Self::Keep,
        }
    }
}

pub fn run_edit(
    workspace: &Workspace,
    kind: EntryKind,
    id: i64,
    fields: &EntryFields,
    category: CategoryChange,
) -> Result<(), CliError> {
    let id = RecordId::new(id);
    let entry = find_entry(workspace.store(), kind, id)?;

    let mut patch = fields_to_patch(fields);
    match category {
        CategoryChange::Keep => {}
        CategoryChange::Move(category_id) => {
            ensure_category_kind(workspace.store(), category_id, kind)?;
            patch.category_id = Some(Some(category_id));
        }
        CategoryChange::Clear => patch.category_id = Some(None),
    }

    if patch.is_empty() {
        let form = render_entry_form(&entry);
        let Some(edited) = capture_editor_input_with_initial(&form)? else {
            return Err(CliError::EmptyEditedContent);
        };
        if normalize_content(&form).as_deref() == Some(edited.as_str()) {
            println!("{id}");
            return Ok(());
        }
        patch = parse_entry_form(&edited);
    }

    apply_edit(workspace.store(), kind, &entry, &patch)?;
    println!("{id}");
    Ok(())
}

/// Merge `patch` into `entry`, refusing edits that would blank all four languages.
pub fn apply_edit(
    store: &LocalStore,
    kind: EntryKind,
    entry: &GlossaryEntry,
    patch: &EntryPatch,
) -> Result<(), CliError> {
    let merged = [
        (&patch.traditional, &entry.traditional),
        (&patch.simplified, &entry.simplified),
        (&patch.english, &entry.english),
        (&patch.korean, &entry.korean),
    ];
    if merged
        .iter()
        .all(|(new, old)| new.as_ref().unwrap_or(old).trim().is_empty())
    {
        return Err(CliError::EmptyEditedContent);
    }

    if store.update(kind.collection(), entry.id, patch)? {
        Ok(())
    } else {
        Err(CliError::EntryNotFound {
            collection: kind.collection(),
            id: entry.id,
        })
    }
}
