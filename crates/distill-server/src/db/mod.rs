// crates/distill-server/src/db/mod.rs
// Per-session database: pool, schema, typed CRUD

pub mod entries;
pub mod links;
pub mod pool;
pub mod schema;
pub mod state;
pub mod types;

pub use entries::{
    annotate_entry_sync, fts_orphans_sync, get_counts_sync, get_entry_sync, get_failed_sync,
    get_historical_sync, get_pending_sync, get_recent_entries_sync, get_summary_sync,
    insert_entry_sync, insert_summary_sync, mark_annotating_sync, mark_failed_sync,
    set_status_sync,
};
pub use links::{get_links_sync, insert_link_sync};
pub use pool::DatabasePool;
pub use state::{
    get_prompt_index_sync, get_prompt_sync, get_state_sync, set_prompt_index_sync,
    set_state_sync, store_prompt_sync,
};
pub use types::{
    AnnotationStatus, AnnotationUpdate, CallSummary, Entry, EntryCounts, EntryLink, EntryType,
    HistoricalEntry, LinkType,
};
