use std::env;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::Serialize;
use trilan_core::config::CloudConfig;
use trilan_core::mirror::FirestoreMirror;
use trilan_core::models::{category_label, kind_label, EntryPatch};
use trilan_core::{
    Category, GlossaryEntry, LocalStore, Reconciliation, RecordId, SyncCoordinator,
    SyncOptions,
};

use crate::auth::{CliIdentityProvider, SessionStore};
use crate::cli::{EntryFields, EntryKind};
use crate::config_profiles::CliProfilesConfig;
use crate::error::CliError;

/// Coordinator wired to the hosted identity service and document store
pub type CliSync = SyncCoordinator<FirestoreMirror, CliIdentityProvider>;

/// Labels of the editable fields, in the order the edit form shows them
const FORM_FIELDS: [&str; 4] = ["traditional", "simplified", "english", "korean"];

#[derive(Debug, Serialize)]
pub struct EntryListItem {
    pub id: i64,
    pub traditional: String,
    pub simplified: String,
    pub english: String,
    pub korean: String,
    pub category_id: Option<i64>,
    pub category: String,
    pub author: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub relative_time: String,
}

#[derive(Debug, Serialize)]
pub struct CategoryListItem {
    pub id: i64,
    pub name: String,
    pub kind: String,
    pub created_at: Option<String>,
}

/// Local store plus, when a cloud profile is configured, its sync coordinator
pub struct Workspace {
    store: Arc<LocalStore>,
    cloud: Option<CloudLink>,
}

struct CloudLink {
    profile: String,
    sync: CliSync,
}

impl Workspace {
    /// Local-only workspace; writes are never pushed.
    pub fn local(db_path: &Path) -> Result<Self, CliError> {
        Ok(Self {
            store: open_store(db_path)?,
            cloud: None,
        })
    }

    /// Open the store and resume the profile's stored session, if any.
    ///
    /// A session that cannot be resumed is logged and the workspace stays local.
    pub async fn open(
        db_path: &Path,
        profile: Option<&str>,
        options: SyncOptions,
    ) -> Result<Self, CliError> {
        let store = open_store(db_path)?;
        let Some((profile_name, config)) = resolve_cloud_config(profile)? else {
            return Ok(Self { store, cloud: None });
        };

        let sync = build_coordinator(&profile_name, &config, Arc::clone(&store), options)?;
        match sync.restore_session(Reconciliation::None).await {
            Ok(Some(identity)) => {
                tracing::debug!("Resumed session for profile '{}' ({})", profile_name, identity.uid);
            }
            Ok(None) => tracing::debug!("Profile '{}' is not signed in", profile_name),
            Err(error) => {
                tracing::warn!(
                    "Could not resume session for profile '{}': {}",
                    profile_name,
                    error
                );
            }
        }

        Ok(Self {
            store,
            cloud: Some(CloudLink {
                profile: profile_name,
                sync,
            }),
        })
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn sync(&self) -> Option<&CliSync> {
        self.cloud.as_ref().map(|cloud| &cloud.sync)
    }

    pub fn profile_name(&self) -> Option<&str> {
        self.cloud.as_ref().map(|cloud| cloud.profile.as_str())
    }

    pub fn require_sync(&self) -> Result<&CliSync, CliError> {
        self.sync().ok_or(CliError::SyncNotConfigured)
    }

    /// Handle stamped on new entries while signed in.
    pub fn author_handle(&self) -> Option<String> {
        self.sync().and_then(CliSync::current_handle)
    }

    /// Wait for automatic pushes started by this command to finish.
    pub async fn finish(&self) {
        if let Some(sync) = self.sync() {
            sync.flush().await;
        }
    }
}

/// Resolve the cloud config of the selected profile. `Ok(None)` is local-only mode.
pub fn resolve_cloud_config(
    profile: Option<&str>,
) -> Result<Option<(String, CloudConfig)>, CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile);
    Ok(config
        .cloud_config(&profile_name)?
        .map(|cloud| (profile_name, cloud)))
}

pub fn build_coordinator(
    profile_name: &str,
    config: &CloudConfig,
    store: Arc<LocalStore>,
    options: SyncOptions,
) -> Result<CliSync, CliError> {
    let identity = CliIdentityProvider::new(config, SessionStore::new(profile_name))?;
    let mirror = FirestoreMirror::new(config)?;
    Ok(SyncCoordinator::new(store, mirror, identity, options))
}

pub fn open_store(path: &Path) -> Result<Arc<LocalStore>, CliError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(Arc::new(LocalStore::open(path)?))
}

/// Entries of `kind`, optionally restricted to one category.
pub fn list_entries(
    store: &LocalStore,
    kind: EntryKind,
    category: Option<RecordId>,
) -> Result<Vec<GlossaryEntry>, CliError> {
    let entries = store.entries(kind.collection())?;
    Ok(match category {
        Some(id) => entries
            .into_iter()
            .filter(|entry| entry.category_id == Some(id))
            .collect(),
        None => entries,
    })
}

pub fn find_entry(
    store: &LocalStore,
    kind: EntryKind,
    id: RecordId,
) -> Result<GlossaryEntry, CliError> {
    store
        .entries(kind.collection())?
        .into_iter()
        .find(|entry| entry.id == id)
        .ok_or(CliError::EntryNotFound {
            collection: kind.collection(),
            id,
        })
}

pub fn find_category(store: &LocalStore, id: RecordId) -> Result<Category, CliError> {
    store
        .categories()?
        .into_iter()
        .find(|category| category.id == id)
        .ok_or(CliError::CategoryNotFound(id))
}

/// Check that category `id` exists and groups entries of `kind`.
pub fn ensure_category_kind(
    store: &LocalStore,
    id: RecordId,
    kind: EntryKind,
) -> Result<(), CliError> {
    let category = find_category(store, id)?;
    if category.kind == Some(kind.category_kind()) {
        Ok(())
    } else {
        Err(CliError::CategoryKindMismatch {
            id,
            expected: kind.collection(),
            actual: category.kind.map(|kind| kind.entry_collection()),
        })
    }
}

pub fn format_entry_lines(entries: &[GlossaryEntry], categories: &[Category]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    entries
        .iter()
        .map(|entry| {
            let headline = entry_headline(entry, 48);
            let category = category_label(categories, entry.category_id);
            let relative_time = relative_time_label(entry, now_ms);
            let id = entry.id.get();
            format!("{id:<14}  {headline:<48}  {category:<14}  {relative_time}")
        })
        .collect()
}

pub fn entry_to_list_item(entry: &GlossaryEntry, categories: &[Category]) -> EntryListItem {
    let now_ms = Utc::now().timestamp_millis();
    EntryListItem {
        id: entry.id.get(),
        traditional: entry.traditional.clone(),
        simplified: entry.simplified.clone(),
        english: entry.english.clone(),
        korean: entry.korean.clone(),
        category_id: entry.category_id.map(RecordId::get),
        category: category_label(categories, entry.category_id).to_string(),
        author: entry.author_handle.clone(),
        created_at: entry.created_at.map(trilan_core::util::iso_timestamp),
        updated_at: entry.updated_at.map(trilan_core::util::iso_timestamp),
        relative_time: relative_time_label(entry, now_ms),
    }
}

pub fn format_category_lines(categories: &[Category]) -> Vec<String> {
    categories
        .iter()
        .map(|category| {
            format!(
                "{:<14}  {:<10}  {}",
                category.id.get(),
                kind_label(category.kind),
                category.name
            )
        })
        .collect()
}

pub fn category_to_list_item(category: &Category) -> CategoryListItem {
    CategoryListItem {
        id: category.id.get(),
        name: category.name.clone(),
        kind: kind_label(category.kind).to_string(),
        created_at: category.created_at.map(trilan_core::util::iso_timestamp),
    }
}

/// The non-empty language fields joined with " / ", truncated to `max_chars`.
pub fn entry_headline(entry: &GlossaryEntry, max_chars: usize) -> String {
    let joined = [
        &entry.traditional,
        &entry.simplified,
        &entry.english,
        &entry.korean,
    ]
    .iter()
    .map(|value| value.split_whitespace().collect::<Vec<_>>().join(" "))
    .filter(|value| !value.is_empty())
    .collect::<Vec<_>>()
    .join(" / ");

    if joined.chars().count() <= max_chars {
        joined
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = joined.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

/// Age of the entry's last change, or "-" for records without timestamps.
fn relative_time_label(entry: &GlossaryEntry, now_ms: i64) -> String {
    entry.last_touched().map_or_else(
        || "-".to_string(),
        |at| format_relative_time(at.timestamp_millis(), now_ms),
    )
}

pub fn format_timestamp(timestamp_secs: i64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp_secs, 0).map_or_else(
        || timestamp_secs.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

pub fn normalize_content(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn normalize_search_query(query: &str) -> Result<String, CliError> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptySearchQuery)
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn normalize_category_name(parts: &[String]) -> Result<String, CliError> {
    normalize_content(&parts.join(" ")).ok_or(CliError::EmptyCategoryName)
}

/// Patch carrying the fields given on the command line, trimmed.
pub fn fields_to_patch(fields: &EntryFields) -> EntryPatch {
    let trimmed = |value: &Option<String>| value.as_deref().map(|text| text.trim().to_string());
    EntryPatch {
        traditional: trimmed(&fields.traditional),
        simplified: trimmed(&fields.simplified),
        english: trimmed(&fields.english),
        korean: trimmed(&fields.korean),
        category_id: None,
    }
}

/// Editable text form of an entry, one `field: value` line per language.
pub fn render_entry_form(entry: &GlossaryEntry) -> String {
    let values = [
        &entry.traditional,
        &entry.simplified,
        &entry.english,
        &entry.korean,
    ];
    let mut form = String::new();
    for (label, value) in FORM_FIELDS.iter().zip(values) {
        form.push_str(label);
        form.push_str(": ");
        form.push_str(value);
        form.push('\n');
    }
    form
}

/// Read back a form produced by [`render_entry_form`].
///
/// Unknown labels and lines without a colon are ignored; a field missing
/// from the form is left unchanged.
pub fn parse_entry_form(form: &str) -> EntryPatch {
    let mut patch = EntryPatch::default();
    for line in form.lines() {
        let Some((label, value)) = line.split_once(':') else {
            continue;
        };
        let value = Some(value.trim().to_string());
        match label.trim().to_ascii_lowercase().as_str() {
            "traditional" => patch.traditional = value,
            "simplified" => patch.simplified = value,
            "english" => patch.english = value,
            "korean" => patch.korean = value,
            _ => {}
        }
    }
    patch
}

pub fn capture_editor_input_with_initial(
    initial_content: &str,
) -> Result<Option<String>, CliError> {
    let editor = preferred_editor();
    let temp_file = create_temp_entry_file_path();
    std::fs::write(&temp_file, initial_content)?;

    let launch_result = launch_editor(&editor, &temp_file);
    let edited = std::fs::read_to_string(&temp_file)?;
    let _ = std::fs::remove_file(&temp_file);

    launch_result?;
    Ok(normalize_content(&edited))
}

pub fn launch_editor(editor: &str, file_path: &Path) -> Result<(), CliError> {
    match Command::new(editor).arg(file_path).status() {
        Ok(status) => {
            if status.success() {
                Ok(())
            } else {
                Err(CliError::EditorFailed(format!(
                    "`{editor}` exited with status {status}"
                )))
            }
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            let mut parts = editor.split_whitespace();
            let Some(program) = parts.next() else {
                return Err(CliError::EditorFailed("empty EDITOR command".into()));
            };

            let mut command = Command::new(program);
            command.args(parts).arg(file_path);

            let status = command.status()?;
            if status.success() {
                Ok(())
            } else {
                Err(CliError::EditorFailed(format!(
                    "`{editor}` exited with status {status}"
                )))
            }
        }
        Err(err) => Err(CliError::Io(err)),
    }
}

pub fn preferred_editor() -> String {
    env::var("VISUAL")
        .or_else(|_| env::var("EDITOR"))
        .unwrap_or_else(|_| default_editor().to_string())
}

pub const fn default_editor() -> &'static str {
    if cfg!(windows) {
        "notepad"
    } else {
        "vi"
    }
}

pub fn create_temp_entry_file_path() -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_nanos());
    env::temp_dir().join(format!("trilan-entry-{}-{now}.txt", std::process::id()))
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("TRILAN_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(env::temp_dir)
        .join("trilan")
        .join("trilan.db")
}

