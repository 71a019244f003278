use trilan_core::RecordId;

use crate::cli::EntryKind;
use crate::commands::common::{
    entry_to_list_item, format_entry_lines, list_entries, EntryListItem, Workspace,
};
use crate::error::CliError;

pub fn run_list(
    workspace: &Workspace,
    kind: EntryKind,
    category: Option<i64>,
    as_json: bool,
) -> Result<(), CliError> {
    let entries = list_entries(workspace.store(), kind, category.map(RecordId::new))?;
    let categories = workspace.store().categories()?;

    if as_json {
        let json_items = entries
            .iter()
            .map(|entry| entry_to_list_item(entry, &categories))
            .collect::<Vec<EntryListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else {
        for line in format_entry_lines(&entries, &categories) {
            println!("{line}");
        }
    }

    Ok(())
}
