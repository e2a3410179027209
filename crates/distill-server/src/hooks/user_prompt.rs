// crates/distill-server/src/hooks/user_prompt.rs
// UserPromptSubmit hook handler - the retrieval critical path
//
// Bumps the turn counter, persists the raw prompt, and injects the
// distilled context from earlier turns as additionalContext.

use anyhow::Result;

use crate::config::{DistillConfig, DistillPaths};
use crate::db::{self, DatabasePool};
use crate::hooks::{
    HookTimer, distill_enabled, input_str, read_hook_input, write_empty_output, write_hook_output,
};
use crate::retrieval;
use crate::utils::truncate_at_boundary;

/// Run UserPromptSubmit hook
pub async fn run() -> Result<()> {
    let _timer = HookTimer::start("UserPromptSubmit");
    let input = read_hook_input()?;

    let paths = DistillPaths::resolve();
    let config = DistillConfig::load(&paths);
    if !distill_enabled(&input, &config) {
        write_empty_output();
        return Ok(());
    }

    let session_id = input_str(&input, "session_id");
    let prompt = input_str(&input, "prompt");
    if session_id.is_empty() {
        write_empty_output();
        return Ok(());
    }

    eprintln!(
        "[distill] UserPromptSubmit hook triggered (session: {}, prompt length: {})",
        truncate_at_boundary(&session_id, 8),
        prompt.len()
    );

    let pool = DatabasePool::open(&paths.session_db_path(&session_id)).await?;
    let token_budget = config.token_budget;

    // Turn bookkeeping and retrieval share one connection: the index
    // must be bumped before retrieval so `prompt_index < current` holds.
    let context = pool
        .interact(move |conn| {
            let index = db::get_prompt_index_sync(conn)? + 1;
            db::set_prompt_index_sync(conn, index)?;
            db::store_prompt_sync(conn, index, &prompt)?;

            if index <= 1 {
                // First turn: there is nothing to remember yet.
                return Ok(None);
            }
            retrieval::build_context_sync(conn, &prompt, index, token_budget)
        })
        .await?;

    match context {
        Some(context) => {
            eprintln!("[distill] injecting {} chars of session context", context.len());
            write_hook_output(&serde_json::json!({
                "hookSpecificOutput": {
                    "hookEventName": "UserPromptSubmit",
                    "additionalContext": context
                }
            }));
        }
        None => write_empty_output(),
    }

    Ok(())
}
