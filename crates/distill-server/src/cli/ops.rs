// crates/distill-server/src/cli/ops.rs
// Operator command implementations (not on the hook path)

use anyhow::{Context, Result, bail};

use distill::annotate::llm;
use distill::config::{DistillConfig, DistillPaths};
use distill::db::{self, DatabasePool};
use distill::retrieval;
use distill::utils::truncate;

/// `distill sessions` - list session databases with entry counts.
pub async fn run_sessions(paths: &DistillPaths) -> Result<()> {
    let sessions_dir = paths.sessions_dir();
    let entries = match std::fs::read_dir(&sessions_dir) {
        Ok(e) => e,
        Err(_) => {
            println!("No sessions found under {}", sessions_dir.display());
            return Ok(());
        }
    };

    let mut names: Vec<String> = entries
        .flatten()
        .filter_map(|e| {
            let path = e.path();
            if path.extension().and_then(|x| x.to_str()) == Some("db") {
                path.file_stem()
                    .and_then(|s| s.to_str())
                    .map(String::from)
            } else {
                None
            }
        })
        .collect();
    names.sort();

    if names.is_empty() {
        println!("No sessions found under {}", sessions_dir.display());
        return Ok(());
    }

    for name in names {
        let pool = DatabasePool::open(&paths.session_db_path(&name)).await?;
        let (counts, prompt_index) = pool
            .interact(|conn| {
                Ok((
                    db::get_counts_sync(conn)?,
                    db::get_prompt_index_sync(conn)?,
                ))
            })
            .await?;
        println!(
            "{name}  prompts: {prompt_index}  entries: {} ({} annotated, {} failed)",
            counts.total, counts.annotated, counts.failed
        );
    }
    Ok(())
}

/// `distill status <id>` - prompt index plus per-status counts.
pub async fn run_status(paths: &DistillPaths, session_id: &str) -> Result<()> {
    let pool = open_existing(paths, session_id).await?;
    let (counts, prompt_index) = pool
        .interact(|conn| {
            Ok((
                db::get_counts_sync(conn)?,
                db::get_prompt_index_sync(conn)?,
            ))
        })
        .await?;

    println!("session:     {session_id}");
    println!("prompts:     {prompt_index}");
    println!("entries:     {}", counts.total);
    println!("  pending:    {}", counts.pending);
    println!("  annotating: {}", counts.annotating);
    println!("  annotated:  {}", counts.annotated);
    println!("  failed:     {}", counts.failed);
    println!("  summaries:  {}", counts.summaries);
    Ok(())
}

/// `distill inspect <id>` - recent entries and links.
pub async fn run_inspect(paths: &DistillPaths, session_id: &str, limit: usize) -> Result<()> {
    let pool = open_existing(paths, session_id).await?;
    let (entries, links) = pool
        .interact(move |conn| {
            Ok((
                db::get_recent_entries_sync(conn, limit)?,
                db::get_links_sync(conn, limit)?,
            ))
        })
        .await?;

    for entry in entries.iter().rev() {
        let description = entry.description.as_deref().unwrap_or("(unannotated)");
        println!(
            "#{} [p{}] {} {} ({}) {} \u{2014} {}",
            entry.id,
            entry.prompt_index,
            entry.annotation_status,
            entry.entry_type,
            entry.semantic_group,
            entry.file_path.as_deref().unwrap_or("-"),
            truncate(description, 100),
        );
    }

    if !links.is_empty() {
        println!("\nlinks:");
        for link in links {
            println!("  #{} -{}-> #{}", link.source_id, link.link_type, link.target_id);
        }
    }
    Ok(())
}

/// `distill search <id> <query>` - run the retrieval query path.
pub async fn run_search(paths: &DistillPaths, session_id: &str, query: &str) -> Result<()> {
    let pool = open_existing(paths, session_id).await?;
    let query = query.to_string();
    let hits = pool
        .interact(move |conn| {
            let Some(match_query) = retrieval::build_match_query(&query) else {
                return Ok(Vec::new());
            };
            // i64::MAX: the operator wants the whole session, not a turn prefix
            retrieval::search_entries_sync(conn, &match_query, i64::MAX, 50).map_err(Into::into)
        })
        .await?;

    if hits.is_empty() {
        println!("No matches.");
        return Ok(());
    }
    for hit in hits {
        println!(
            "#{} [p{}] {} ({}) \u{2014} {}",
            hit.id,
            hit.prompt_index,
            hit.file_path.as_deref().unwrap_or(&hit.entry_type),
            hit.semantic_group,
            hit.description.as_deref().unwrap_or(""),
        );
    }
    Ok(())
}

/// `distill annotate <id> <prompt_index>` - the detached LLM pass.
/// Exits 0 even on provider failure; the failure is recorded in entry
/// statuses, not in the exit code.
pub async fn run_annotate(paths: &DistillPaths, session_id: &str, prompt_index: i64) -> Result<()> {
    let config = DistillConfig::load(paths);
    let pool = open_existing(paths, session_id).await?;
    llm::run(&pool, &config, prompt_index).await;
    Ok(())
}

/// Open a session database, refusing to create one as a side effect of
/// an operator typo.
async fn open_existing(paths: &DistillPaths, session_id: &str) -> Result<DatabasePool> {
    let db_path = paths.session_db_path(session_id);
    if !db_path.exists() {
        bail!("no session database at {}", db_path.display());
    }
    DatabasePool::open(&db_path)
        .await
        .with_context(|| format!("failed to open {}", db_path.display()))
}
