//! Data models for Trilan

mod category;
mod entry;
mod lenient;
mod record;

pub use category::{
    categories_of_kind, category_label, kind_label, Category, CategoryKind, CategoryPatch,
    NewCategory, UNCATEGORIZED,
};
pub use entry::{EntryPatch, GlossaryEntry, NewEntry};
pub use record::{find_duplicate_id, Collection, Document, RecordId};
