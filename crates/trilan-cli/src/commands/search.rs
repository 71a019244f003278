use serde::Serialize;
use trilan_core::{Document, GlossaryEntry, LocalStore};

use crate::cli::EntryKind;
use crate::commands::common::{
    entry_to_list_item, format_entry_lines, normalize_search_query, EntryListItem, Workspace,
};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct LookupItem {
    pub dictionary: Vec<EntryListItem>,
    pub phrases: Vec<EntryListItem>,
}

pub fn run_search(
    workspace: &Workspace,
    kind: EntryKind,
    query: &str,
    as_json: bool,
) -> Result<(), CliError> {
    let entries = search_entries(workspace.store(), kind, query)?;
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

/// Search dictionary and phrases at once, the way the translator view does.
pub fn run_lookup(workspace: &Workspace, query: &str, as_json: bool) -> Result<(), CliError> {
    let normalized_query = normalize_search_query(query)?;
    let lookup = workspace.store().lookup(&normalized_query)?;
    let categories = workspace.store().categories()?;
    let dictionary = decode_entries(&lookup.dictionary)?;
    let phrases = decode_entries(&lookup.phrases)?;

    if as_json {
        let item = LookupItem {
            dictionary: dictionary
                .iter()
                .map(|entry| entry_to_list_item(entry, &categories))
                .collect(),
            phrases: phrases
                .iter()
                .map(|entry| entry_to_list_item(entry, &categories))
                .collect(),
        };
        println!("{}", serde_json::to_string_pretty(&item)?);
        return Ok(());
    }

    if lookup.is_empty() {
        println!("No matches for '{normalized_query}'.");
        return Ok(());
    }

    for (title, entries) in [("Dictionary", &dictionary), ("Phrases", &phrases)] {
        if entries.is_empty() {
            continue;
        }
        println!("{title} ({})", entries.len());
        for line in format_entry_lines(entries, &categories) {
            println!("  {line}");
        }
    }
    Ok(())
}

pub fn search_entries(
    store: &LocalStore,
    kind: EntryKind,
    query: &str,
) -> Result<Vec<GlossaryEntry>, CliError> {
    let normalized_query = normalize_search_query(query)?;
    decode_entries(&store.search(kind.collection(), &normalized_query)?)
}

fn decode_entries(documents: &[Document]) -> Result<Vec<GlossaryEntry>, CliError> {
    documents
        .iter()
        .map(|document| document.to_record().map_err(CliError::from))
        .collect()
}
