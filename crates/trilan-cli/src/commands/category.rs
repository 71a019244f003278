use trilan_core::models::{categories_of_kind, CategoryPatch};
use trilan_core::{Category, Collection, NewCategory, RecordId};

use crate::cli::{CategoryCommands, EntryKind};
use crate::commands::common::{
    category_to_list_item, find_category, format_category_lines, normalize_category_name,
    CategoryListItem, Workspace,
};
use crate::error::CliError;

pub fn run_category(workspace: &Workspace, command: CategoryCommands) -> Result<(), CliError> {
    match command {
        CategoryCommands::Add { name, kind } => {
            let id = add_category(workspace, &name, kind)?;
            println!("{id}");
        }
        CategoryCommands::List { kind, json } => list_categories(workspace, kind, json)?,
        CategoryCommands::Rename { id, name } => {
            let id = RecordId::new(id);
            rename_category(workspace, id, &name)?;
            println!("{id}");
        }
        CategoryCommands::Delete { id } => {
            let id = RecordId::new(id);
            delete_category(workspace, id)?;
            println!("{id}");
        }
    }
    Ok(())
}

pub fn add_category(
    workspace: &Workspace,
    name_parts: &[String],
    kind: EntryKind,
) -> Result<RecordId, CliError> {
    let name = normalize_category_name(name_parts)?;
    let document = workspace
        .store()
        .add(Collection::Categories, &NewCategory::new(name, kind.category_kind()))?;
    Ok(document.id())
}

fn list_categories(
    workspace: &Workspace,
    kind: Option<EntryKind>,
    as_json: bool,
) -> Result<(), CliError> {
    let categories = workspace.store().categories()?;
    let selected: Vec<Category> = match kind {
        Some(kind) => categories_of_kind(&categories, kind.category_kind())
            .into_iter()
            .cloned()
            .collect(),
        None => categories,
    };

    if as_json {
        let json_items = selected
            .iter()
            .map(category_to_list_item)
            .collect::<Vec<CategoryListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else {
        for line in format_category_lines(&selected) {
            println!("{line}");
        }
    }
    Ok(())
}

pub fn rename_category(
    workspace: &Workspace,
    id: RecordId,
    name_parts: &[String],
) -> Result<(), CliError> {
    let name = normalize_category_name(name_parts)?;
    let updated = workspace
        .store()
        .update(Collection::Categories, id, &CategoryPatch::rename(name))?;
    if updated {
        Ok(())
    } else {
        Err(CliError::CategoryNotFound(id))
    }
}

/// Remove a category. Entries keep their `categoryId` and show as uncategorized.
pub fn delete_category(workspace: &Workspace, id: RecordId) -> Result<(), CliError> {
    find_category(workspace.store(), id)?;
    workspace.store().delete(Collection::Categories, id)?;
    Ok(())
}
