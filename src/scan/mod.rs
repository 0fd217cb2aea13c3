//! Document scanning: roster lookups, file collection, and match aggregation.

mod collect;
mod document;
mod matcher;
mod roster;
pub mod schema;

pub use collect::{collect_pdf_paths, collect_supported_paths, SUPPORTED_EXTENSIONS};
pub use document::{derive_activity_title, ScannableDocument};
pub use matcher::{find_occurrences, scan_document_for_matches, MatchRow};
pub use roster::{StudentDirectory, VariantEntry};
