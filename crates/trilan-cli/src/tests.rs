use std::path::PathBuf;

use pretty_assertions::assert_eq;
use tempfile::TempDir;
use trilan_core::models::EntryPatch;
use trilan_core::{Collection, RecordId, SyncError};

use crate::cli::{CompletionShell, EntryFields, EntryKind, SyncCommands};
use crate::commands::add::run_add;
use crate::commands::category::{add_category, delete_category, rename_category};
use crate::commands::common::{
    category_to_list_item, default_editor, entry_headline, fields_to_patch, find_category,
    find_entry, format_entry_lines, format_relative_time, list_entries, normalize_category_name,
    normalize_content, normalize_search_query, parse_entry_form, render_entry_form, Workspace,
};
use crate::commands::completions::run_completions;
use crate::commands::config::{merge_profile, missing_fields, ProfileUpdate};
use crate::commands::delete::run_delete;
use crate::commands::edit::{apply_edit, run_edit, CategoryChange};
use crate::commands::export::{run_export, run_import};
use crate::commands::search::search_entries;
use crate::commands::sync::{format_stats, run_sync, sync_status_item};
use crate::config_profiles::CliProfile;
use crate::error::CliError;

fn workspace() -> (TempDir, Workspace) {
    let dir = tempfile::tempdir().unwrap();
    let workspace = Workspace::local(&db_path(&dir)).unwrap();
    (dir, workspace)
}

fn db_path(dir: &TempDir) -> PathBuf {
    dir.path().join("data").join("trilan.db")
}

fn fields(traditional: &str, simplified: &str, english: &str, korean: &str) -> EntryFields {
    let text = |value: &str| (!value.is_empty()).then(|| value.to_string());
    EntryFields {
        traditional: text(traditional),
        simplified: text(simplified),
        english: text(english),
        korean: text(korean),
    }
}

fn add_word(workspace: &Workspace, english: &str, category: Option<RecordId>) -> RecordId {
    run_add(
        workspace,
        EntryKind::Dictionary,
        &fields("", "", english, ""),
        category.map(RecordId::get),
    )
    .unwrap()
}

#[test]
fn normalize_content_trims_and_rejects_empty() {
    assert_eq!(normalize_content("  hello  "), Some("hello".to_string()));
    assert_eq!(normalize_content(" \n\t "), None);
}

#[test]
fn normalize_search_query_rejects_empty() {
    assert!(matches!(
        normalize_search_query(" \n\t "),
        Err(CliError::EmptySearchQuery)
    ));
    assert_eq!(normalize_search_query("  茶  ").unwrap(), "茶");
}

#[test]
fn normalize_category_name_joins_words() {
    assert_eq!(
        normalize_category_name(&["Food".to_string(), "and".to_string(), "drink".to_string()])
            .unwrap(),
        "Food and drink"
    );
    assert!(matches!(
        normalize_category_name(&[" ".to_string()]),
        Err(CliError::EmptyCategoryName)
    ));
}

#[test]
fn default_editor_is_defined() {
    assert!(!default_editor().is_empty());
}

#[test]
fn format_relative_time_units() {
    let now = 10_000_000;
    assert_eq!(format_relative_time(now - 30_000, now), "just now");
    assert_eq!(format_relative_time(now - 120_000, now), "2m ago");
    assert_eq!(format_relative_time(now - 2 * 60 * 60_000, now), "2h ago");
}

#[test]
fn entry_headline_skips_blank_languages_and_truncates() {
    let (_dir, workspace) = workspace();
    let id = run_add(
        &workspace,
        EntryKind::Phrase,
        &fields("早安", "", "good   morning", "좋은 아침"),
        None,
    )
    .unwrap();
    let entry = find_entry(workspace.store(), EntryKind::Phrase, id).unwrap();

    assert_eq!(entry_headline(&entry, 80), "早安 / good morning / 좋은 아침");
    assert_eq!(entry_headline(&entry, 10), "早安 / go...");
}

#[test]
fn entry_form_round_trips_and_ignores_noise() {
    let (_dir, workspace) = workspace();
    let id = run_add(
        &workspace,
        EntryKind::Dictionary,
        &fields("茶", "茶", "tea", "차"),
        None,
    )
    .unwrap();
    let entry = find_entry(workspace.store(), EntryKind::Dictionary, id).unwrap();

    let form = render_entry_form(&entry);
    assert_eq!(form, "traditional: 茶\nsimplified: 茶\nenglish: tea\nkorean: 차\n");

    let patch = parse_entry_form("English:  black tea \nnot a field\nnotes: ignored\n");
    assert_eq!(
        patch,
        EntryPatch {
            english: Some("black tea".to_string()),
            ..EntryPatch::default()
        }
    );
}

#[test]
fn fields_to_patch_trims_given_values_only() {
    let patch = fields_to_patch(&fields(" 書 ", "", "book ", ""));
    assert_eq!(patch.traditional.as_deref(), Some("書"));
    assert_eq!(patch.english.as_deref(), Some("book"));
    assert_eq!(patch.simplified, None);
    assert_eq!(patch.category_id, None);
}

#[test]
fn category_change_from_args() {
    assert_eq!(
        CategoryChange::from_args(Some(4), false),
        CategoryChange::Move(RecordId::new(4))
    );
    assert_eq!(CategoryChange::from_args(None, true), CategoryChange::Clear);
    assert_eq!(CategoryChange::from_args(None, false), CategoryChange::Keep);
}

#[test]
fn run_add_stores_entry_with_category() {
    let (_dir, workspace) = workspace();
    let food = add_category(&workspace, &["Food".to_string()], EntryKind::Dictionary).unwrap();

    let id = run_add(
        &workspace,
        EntryKind::Dictionary,
        &fields("蘋果", "苹果", " apple ", "사과"),
        Some(food.get()),
    )
    .unwrap();

    let entry = find_entry(workspace.store(), EntryKind::Dictionary, id).unwrap();
    assert_eq!(entry.english, "apple");
    assert_eq!(entry.simplified, "苹果");
    assert_eq!(entry.category_id, Some(food));
    assert_eq!(entry.author_handle, None);
    assert!(workspace.store().entries(Collection::Phrases).unwrap().is_empty());
}

#[test]
fn run_add_rejects_blank_entries() {
    let (_dir, workspace) = workspace();
    let error = run_add(
        &workspace,
        EntryKind::Phrase,
        &fields("  ", "", "", ""),
        None,
    )
    .unwrap_err();
    assert!(matches!(error, CliError::EmptyEntry));
    assert_eq!(workspace.store().stats().unwrap().phrases, 0);
}

#[test]
fn run_add_checks_category_kind() {
    let (_dir, workspace) = workspace();
    let travel = add_category(&workspace, &["Travel".to_string()], EntryKind::Phrase).unwrap();

    let mismatch = run_add(
        &workspace,
        EntryKind::Dictionary,
        &fields("", "", "train", ""),
        Some(travel.get()),
    )
    .unwrap_err();
    assert!(matches!(
        mismatch,
        CliError::CategoryKindMismatch {
            expected: Collection::Dictionary,
            actual: Some(Collection::Phrases),
            ..
        }
    ));

    let missing = run_add(
        &workspace,
        EntryKind::Dictionary,
        &fields("", "", "train", ""),
        Some(999),
    )
    .unwrap_err();
    assert!(matches!(missing, CliError::CategoryNotFound(id) if id == RecordId::new(999)));
}

#[test]
fn list_entries_filters_by_category() {
    let (_dir, workspace) = workspace();
    let food = add_category(&workspace, &["Food".to_string()], EntryKind::Dictionary).unwrap();
    add_word(&workspace, "rice", Some(food));
    add_word(&workspace, "walk", None);
    add_word(&workspace, "noodles", Some(food));

    let all = list_entries(workspace.store(), EntryKind::Dictionary, None).unwrap();
    assert_eq!(all.len(), 3);

    let food_only = list_entries(workspace.store(), EntryKind::Dictionary, Some(food)).unwrap();
    let words: Vec<&str> = food_only.iter().map(|entry| entry.english.as_str()).collect();
    assert_eq!(words, vec!["rice", "noodles"]);
}

#[test]
fn search_entries_matches_any_language_case_insensitively() {
    let (_dir, workspace) = workspace();
    run_add(
        &workspace,
        EntryKind::Phrase,
        &fields("謝謝", "谢谢", "Thank you", "감사합니다"),
        None,
    )
    .unwrap();
    run_add(
        &workspace,
        EntryKind::Phrase,
        &fields("再見", "再见", "Goodbye", "안녕히 가세요"),
        None,
    )
    .unwrap();

    let by_english = search_entries(workspace.store(), EntryKind::Phrase, "THANK").unwrap();
    assert_eq!(by_english.len(), 1);
    assert_eq!(by_english[0].traditional, "謝謝");

    let by_korean = search_entries(workspace.store(), EntryKind::Phrase, "안녕").unwrap();
    assert_eq!(by_korean[0].english, "Goodbye");

    assert!(search_entries(workspace.store(), EntryKind::Dictionary, "thank")
        .unwrap()
        .is_empty());
    assert!(matches!(
        search_entries(workspace.store(), EntryKind::Phrase, "   "),
        Err(CliError::EmptySearchQuery)
    ));
}

#[test]
fn run_edit_updates_fields_and_clears_category() {
    let (_dir, workspace) = workspace();
    let food = add_category(&workspace, &["Food".to_string()], EntryKind::Dictionary).unwrap();
    let id = add_word(&workspace, "tea", Some(food));

    run_edit(
        &workspace,
        EntryKind::Dictionary,
        id.get(),
        &fields("", "", "green tea", "녹차"),
        CategoryChange::Clear,
    )
    .unwrap();

    let entry = find_entry(workspace.store(), EntryKind::Dictionary, id).unwrap();
    assert_eq!(entry.english, "green tea");
    assert_eq!(entry.korean, "녹차");
    assert_eq!(entry.category_id, None);
    assert!(entry.updated_at.is_some());
}

#[test]
fn apply_edit_refuses_to_blank_every_language() {
    let (_dir, workspace) = workspace();
    let id = add_word(&workspace, "tea", None);
    let entry = find_entry(workspace.store(), EntryKind::Dictionary, id).unwrap();

    let error = apply_edit(
        workspace.store(),
        EntryKind::Dictionary,
        &entry,
        &EntryPatch {
            english: Some(String::new()),
            ..EntryPatch::default()
        },
    )
    .unwrap_err();
    assert!(matches!(error, CliError::EmptyEditedContent));
    assert_eq!(
        find_entry(workspace.store(), EntryKind::Dictionary, id)
            .unwrap()
            .english,
        "tea"
    );
}

#[test]
fn run_edit_reports_missing_entry() {
    let (_dir, workspace) = workspace();
    let error = run_edit(
        &workspace,
        EntryKind::Phrase,
        42,
        &fields("", "", "hello", ""),
        CategoryChange::Keep,
    )
    .unwrap_err();
    assert!(matches!(
        error,
        CliError::EntryNotFound {
            collection: Collection::Phrases,
            ..
        }
    ));
}

#[test]
fn run_delete_removes_only_the_given_entry() {
    let (_dir, workspace) = workspace();
    let keep = add_word(&workspace, "keep me", None);
    let remove = add_word(&workspace, "delete me", None);

    run_delete(&workspace, EntryKind::Dictionary, remove.get()).unwrap();

    let remaining = list_entries(workspace.store(), EntryKind::Dictionary, None).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, keep);

    let error = run_delete(&workspace, EntryKind::Dictionary, remove.get()).unwrap_err();
    assert!(matches!(error, CliError::EntryNotFound { .. }));
}

#[test]
fn deleted_category_leaves_entries_uncategorized() {
    let (_dir, workspace) = workspace();
    let food = add_category(&workspace, &["Food".to_string()], EntryKind::Dictionary).unwrap();
    add_word(&workspace, "rice", Some(food));

    rename_category(&workspace, food, &["Meals".to_string()]).unwrap();
    assert_eq!(find_category(workspace.store(), food).unwrap().name, "Meals");

    delete_category(&workspace, food).unwrap();
    assert!(matches!(
        delete_category(&workspace, food),
        Err(CliError::CategoryNotFound(_))
    ));

    let entries = list_entries(workspace.store(), EntryKind::Dictionary, None).unwrap();
    assert_eq!(entries[0].category_id, Some(food));
    let lines = format_entry_lines(&entries, &workspace.store().categories().unwrap());
    assert!(lines[0].contains("uncategorized"));
}

#[test]
fn export_to_directory_then_import_restores_everything() {
    let (dir, source) = workspace();
    let food = add_category(&source, &["Food".to_string()], EntryKind::Dictionary).unwrap();
    add_word(&source, "rice", Some(food));
    run_add(
        &source,
        EntryKind::Phrase,
        &fields("你好", "你好", "hello", "안녕하세요"),
        None,
    )
    .unwrap();

    let backups = dir.path().join("backups");
    std::fs::create_dir_all(&backups).unwrap();
    run_export(&source, Some(&backups)).unwrap();

    let files: Vec<PathBuf> = std::fs::read_dir(&backups)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    assert_eq!(files.len(), 1);
    let name = files[0].file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("trilan-translator-backup-"));
    assert!(name.ends_with(".json"));

    let target_dir = tempfile::tempdir().unwrap();
    let target = Workspace::local(&db_path(&target_dir)).unwrap();
    add_word(&target, "overwritten", None);
    run_import(&target, &files[0]).unwrap();

    assert_eq!(
        target.store().stats().unwrap(),
        source.store().stats().unwrap()
    );
    for collection in Collection::ALL {
        assert_eq!(
            target.store().get(collection).unwrap(),
            source.store().get(collection).unwrap()
        );
    }
}

#[test]
fn sparse_backup_lists_and_rejects_untyped_category() {
    let (dir, workspace) = workspace();
    let path = dir.path().join("sparse.json");
    std::fs::write(
        &path,
        r#"{"categories": [{"id": 1}], "dictionary": [{"id": 2, "english": "rice"}], "phrases": []}"#,
    )
    .unwrap();
    run_import(&workspace, &path).unwrap();

    let entries = list_entries(workspace.store(), EntryKind::Dictionary, None).unwrap();
    assert_eq!(entries.len(), 1);
    let categories = workspace.store().categories().unwrap();
    let lines = format_entry_lines(&entries, &categories);
    assert!(lines[0].contains("rice"));
    assert!(lines[0].trim_end().ends_with('-'));

    let item = category_to_list_item(&categories[0]);
    assert_eq!(item.kind, "unknown");
    assert_eq!(item.created_at, None);

    let mismatch = run_add(
        &workspace,
        EntryKind::Dictionary,
        &fields("", "", "tea", ""),
        Some(1),
    )
    .unwrap_err();
    assert!(matches!(
        mismatch,
        CliError::CategoryKindMismatch { actual: None, .. }
    ));
}

#[test]
fn invalid_import_changes_nothing() {
    let (dir, workspace) = workspace();
    add_word(&workspace, "tea", None);

    let path = dir.path().join("broken.json");
    std::fs::write(&path, r#"{"categories": [], "dictionary": []}"#).unwrap();

    let error = run_import(&workspace, &path).unwrap_err();
    assert!(matches!(
        error,
        CliError::Core(trilan_core::Error::Validation(_))
    ));
    assert_eq!(workspace.store().stats().unwrap().dictionary, 1);
}

#[test]
fn run_completions_writes_bash_script_file() {
    let dir = tempfile::tempdir().unwrap();
    let output_path = dir.path().join("trilan.bash");

    run_completions(CompletionShell::Bash, Some(&output_path)).unwrap();

    let script = std::fs::read_to_string(&output_path).unwrap();
    assert!(script.contains("_trilan()"));
    assert!(script.contains("complete -F _trilan"));
}

#[test]
fn merge_profile_prefers_explicit_then_web_config_then_env() {
    let mut profile = CliProfile {
        api_key: Some("old-key".to_string()),
        ..CliProfile::default()
    };
    let web = trilan_core::config::CloudConfig::new("web-key", "web-project");

    merge_profile(
        &mut profile,
        ProfileUpdate {
            project_id: Some(" explicit-project ".to_string()),
            firestore_url: Some("http://127.0.0.1:8080/v1".to_string()),
            ..ProfileUpdate::default()
        },
        Some(&web),
        Some("env-key".to_string()),
        None,
    );

    assert_eq!(profile.api_key.as_deref(), Some("web-key"));
    assert_eq!(profile.project_id.as_deref(), Some("explicit-project"));
    assert_eq!(
        profile.firestore_url.as_deref(),
        Some("http://127.0.0.1:8080/v1")
    );
    assert!(missing_fields(&profile).is_empty());
}

#[test]
fn merge_profile_keeps_existing_values_without_input() {
    let mut profile = CliProfile {
        project_id: Some("kept".to_string()),
        ..CliProfile::default()
    };
    merge_profile(&mut profile, ProfileUpdate::default(), None, None, None);

    assert_eq!(profile.project_id.as_deref(), Some("kept"));
    assert_eq!(missing_fields(&profile), vec!["api_key"]);
}

#[test]
fn local_workspace_reports_local_only_status() {
    let (_dir, workspace) = workspace();
    add_word(&workspace, "tea", None);

    let status = sync_status_item(&workspace).unwrap();
    assert_eq!(status.status, "Local only");
    assert_eq!(status.profile, None);
    assert_eq!(
        format_stats(status.stats),
        "categories=0 dictionary=1 phrases=0"
    );
}

#[tokio::test]
async fn manual_sync_requires_cloud_configuration() {
    let (_dir, workspace) = workspace();

    let error = run_sync(&workspace, SyncCommands::Push).await.unwrap_err();
    assert!(matches!(error, CliError::SyncNotConfigured));

    let error = run_sync(&workspace, SyncCommands::Watch).await.unwrap_err();
    assert!(matches!(error, CliError::SyncNotConfigured));
}

#[test]
fn sync_errors_keep_their_message() {
    let error = CliError::from(SyncError::Unauthenticated);
    assert_eq!(error.to_string(), "Sign in to use cloud sync.");
}
