// crates/distill-server/src/hooks/stop.rs
// Stop hook handler - drains the buffer into entries and annotates them
//
// Self mode finishes everything synchronously. Haiku mode leaves the
// new entries pending and hands them to a detached `annotate` child so
// the LLM call never blocks the host.

use anyhow::{Context, Result};
use std::process::{Command, Stdio};

use crate::annotate::self_annotate;
use crate::buffer;
use crate::config::{AnnotatorMode, DistillConfig, DistillPaths};
use crate::db::{self, DatabasePool};
use crate::grouper;
use crate::hooks::{HookTimer, distill_enabled, input_str, read_hook_input, write_empty_output};
use crate::utils::truncate_at_boundary;

/// Run Stop hook
pub async fn run() -> Result<()> {
    let _timer = HookTimer::start("Stop");
    let input = read_hook_input()?;

    let paths = DistillPaths::resolve();
    let config = DistillConfig::load(&paths);
    if !distill_enabled(&input, &config) {
        write_empty_output();
        return Ok(());
    }

    let session_id = input_str(&input, "session_id");
    if session_id.is_empty() {
        write_empty_output();
        return Ok(());
    }

    let calls = buffer::drain(&paths.buffer_path(&session_id))?;
    if calls.is_empty() {
        write_empty_output();
        return Ok(());
    }

    eprintln!(
        "[distill] Stop hook triggered (session: {}, {} buffered calls)",
        truncate_at_boundary(&session_id, 8),
        calls.len()
    );

    let pool = DatabasePool::open(&paths.session_db_path(&session_id)).await?;
    let annotator = config.annotator;

    let (prompt_index, inserted) = pool
        .interact(move |conn| {
            let prompt_index = db::get_prompt_index_sync(conn)?;
            let ids = grouper::flush_turn_sync(conn, prompt_index, &calls)?;
            let inserted = ids.len();

            if annotator == AnnotatorMode::SelfRules {
                let user_prompt = db::get_prompt_sync(conn, prompt_index)?.unwrap_or_default();
                self_annotate::annotate_turn_sync(conn, prompt_index, &user_prompt)?;
            }

            Ok((prompt_index, inserted))
        })
        .await?;

    eprintln!("[distill] recorded {inserted} entries for prompt {prompt_index}");

    if config.annotator == AnnotatorMode::Haiku {
        spawn_detached_annotator(&session_id, prompt_index)?;
    }

    write_empty_output();
    Ok(())
}

/// Spawn `distill annotate <session> <prompt_index>` fully detached:
/// null stdio, no wait. The child inherits the environment, so
/// DISTILL_HOME and API keys carry over.
fn spawn_detached_annotator(session_id: &str, prompt_index: i64) -> Result<()> {
    let exe = std::env::current_exe().context("cannot locate own executable")?;
    let child = Command::new(exe)
        .arg("annotate")
        .arg(session_id)
        .arg(prompt_index.to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .context("failed to spawn detached annotator")?;
    // Dropping the handle without wait() is the detach: the process
    // outlives this hook and is reaped by the OS.
    drop(child);
    eprintln!("[distill] spawned detached annotator for prompt {prompt_index}");
    Ok(())
}
