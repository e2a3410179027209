// crates/distill-server/src/hooks/session_start.rs
// SessionStart hook handler - opens (and thereby creates) the session DB

use anyhow::Result;

use crate::config::DistillPaths;
use crate::db::DatabasePool;
use crate::hooks::{HookTimer, input_str, read_hook_input, write_empty_output};
use crate::utils::truncate_at_boundary;

/// Run SessionStart hook
///
/// Databases persist across sessions of the same id, so on resume this
/// reopens the existing file and the earlier turns stay retrievable.
pub async fn run() -> Result<()> {
    let _timer = HookTimer::start("SessionStart");
    let input = read_hook_input()?;
    let session_id = input_str(&input, "session_id");

    eprintln!(
        "[distill] SessionStart hook triggered (session: {})",
        truncate_at_boundary(&session_id, 8)
    );

    if !session_id.is_empty() {
        let paths = DistillPaths::resolve();
        // Opening runs the idempotent schema setup; nothing else to do.
        let _pool = DatabasePool::open(&paths.session_db_path(&session_id)).await?;
    }

    write_empty_output();
    Ok(())
}
