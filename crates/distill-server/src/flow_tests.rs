// crates/distill-server/src/flow_tests.rs
// Turn-lifecycle tests spanning buffer, grouper, annotation, and retrieval

use serde_json::json;

use crate::annotate::self_annotate;
use crate::buffer;
use crate::db::{self, AnnotationStatus, AnnotationUpdate, DatabasePool, EntryType};
use crate::grouper;
use crate::retrieval;

fn buffered(tool: &str, input: serde_json::Value) -> buffer::BufferedCall {
    buffer::BufferedCall {
        tool_name: tool.to_string(),
        tool_input: input,
        ts: 0,
    }
}

/// Simulate the on-prompt bookkeeping for one turn.
async fn submit_prompt(pool: &DatabasePool, text: &str) -> i64 {
    let text = text.to_string();
    pool.interact(move |conn| {
        let index = db::get_prompt_index_sync(conn)? + 1;
        db::set_prompt_index_sync(conn, index)?;
        db::store_prompt_sync(conn, index, &text)?;
        Ok(index)
    })
    .await
    .unwrap()
}

/// Simulate the on-stop pipeline in self mode.
async fn stop_turn(pool: &DatabasePool, calls: Vec<buffer::BufferedCall>) {
    pool.interact(move |conn| {
        let index = db::get_prompt_index_sync(conn)?;
        grouper::flush_turn_sync(conn, index, &calls)?;
        let prompt = db::get_prompt_sync(conn, index)?.unwrap_or_default();
        self_annotate::annotate_turn_sync(conn, index, &prompt)?;
        Ok(())
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn single_edit_session_produces_entry_and_summary() {
    let pool = DatabasePool::open_in_memory().await.unwrap();
    let tmp = tempfile::tempdir().unwrap();
    let buffer_path = tmp.path().join("s1.jsonl");

    let index = submit_prompt(&pool, "fix the login bug").await;
    assert_eq!(index, 1);

    // Tool calls arrive through the buffer, exactly as on-tool writes them
    buffer::append_call(&buffer_path, "Read", &json!({"file_path": "src/login.ts"})).unwrap();
    buffer::append_call(
        &buffer_path,
        "Edit",
        &json!({"file_path": "src/login.ts", "old_string": "a", "new_string": "b"}),
    )
    .unwrap();
    let calls = buffer::drain(&buffer_path).unwrap();
    assert_eq!(calls.len(), 2);

    stop_turn(&pool, calls).await;

    let (entries, summary, orphans) = pool
        .interact(|conn| {
            Ok((
                db::get_recent_entries_sync(conn, 10)?,
                db::get_summary_sync(conn, 1)?,
                db::fts_orphans_sync(conn)?,
            ))
        })
        .await
        .unwrap();

    // Exactly one activity entry plus one summary
    assert_eq!(entries.len(), 2);
    let entry = entries
        .iter()
        .find(|e| e.entry_type == EntryType::FileChange)
        .expect("file_change entry");
    assert_eq!(entry.file_path.as_deref(), Some("src/login.ts"));
    assert_eq!(entry.annotation_status, AnnotationStatus::Annotated);
    let description = entry.description.as_deref().unwrap();
    assert!(
        description.starts_with("Modified") && description.ends_with("login.ts (1 edit)"),
        "unexpected description: {description}"
    );
    assert_eq!(entry.semantic_group, "src");
    assert_eq!(summary.as_deref(), Some("Modified src/login.ts (1 edit)"));
    assert_eq!(orphans, (0, 0));
}

#[tokio::test]
async fn status_closure_after_self_mode_stop() {
    let pool = DatabasePool::open_in_memory().await.unwrap();
    submit_prompt(&pool, "poke around").await;
    stop_turn(
        &pool,
        vec![
            buffered("Read", json!({"file_path": "a.rs"})),
            buffered("Grep", json!({"pattern": "fn main"})),
            buffered("Bash", json!({"command": "cargo tree"})),
        ],
    )
    .await;

    let counts = pool
        .interact(|conn| db::get_counts_sync(conn).map_err(Into::into))
        .await
        .unwrap();
    assert_eq!(counts.pending, 0);
    assert_eq!(counts.annotating, 0);
    assert_eq!(counts.annotated, counts.total);
}

#[tokio::test]
async fn prompt_index_is_strictly_monotonic() {
    let pool = DatabasePool::open_in_memory().await.unwrap();
    let mut last = 0;
    for turn in ["one", "two", "three", "four"] {
        let index = submit_prompt(&pool, turn).await;
        assert!(index > last);
        last = index;
    }
    assert_eq!(last, 4);
}

#[tokio::test]
async fn second_turn_retrieves_first_turn_work() {
    let pool = DatabasePool::open_in_memory().await.unwrap();

    submit_prompt(&pool, "refactor the auth module").await;
    stop_turn(
        &pool,
        vec![buffered(
            "Edit",
            json!({"file_path": "src/auth.ts", "old_string": "x", "new_string": "y"}),
        )],
    )
    .await;

    let index = submit_prompt(&pool, "now fix auth.ts again please").await;
    assert_eq!(index, 2);

    let context = pool
        .interact(move |conn| {
            retrieval::build_context_sync(conn, "now fix auth.ts again please", index, 4000)
        })
        .await
        .unwrap()
        .expect("context should be produced");

    // Continuity block from turn 1's summary
    assert!(context.contains("<last_activity>Modified src/auth.ts (1 edit)</last_activity>"));
    // Lexical recall of the edit entry
    assert!(context.contains("[Prompt 1]: src/auth.ts (src)"));
    assert!(context.starts_with("<distilled_session_context>"));
}

#[tokio::test]
async fn continuity_survives_lexical_miss() {
    let pool = DatabasePool::open_in_memory().await.unwrap();
    submit_prompt(&pool, "work on things").await;
    pool.interact(|conn| {
        db::insert_summary_sync(conn, 1, "Refactored auth", "auth")?;
        Ok(())
    })
    .await
    .unwrap();

    let index = submit_prompt(&pool, "what about zzz-nothing-matches?").await;
    let context = pool
        .interact(move |conn| {
            retrieval::build_context_sync(conn, "what about zzz-nothing-matches?", index, 4000)
        })
        .await
        .unwrap()
        .unwrap();
    assert!(context.contains("<last_activity>Refactored auth</last_activity>"));
    assert!(!context.contains("<relevant_context>"));
}

#[tokio::test]
async fn first_turn_gets_no_context() {
    let pool = DatabasePool::open_in_memory().await.unwrap();
    let index = submit_prompt(&pool, "hello there").await;
    assert_eq!(index, 1);
    // on-prompt returns {} for index <= 1 without consulting retrieval;
    // even if it did, an empty session must produce nothing.
    let context = pool
        .interact(move |conn| retrieval::build_context_sync(conn, "hello there", index, 4000))
        .await
        .unwrap();
    assert!(context.is_none());
}

#[tokio::test]
async fn failed_entries_recover_through_reannotation() {
    let pool = DatabasePool::open_in_memory().await.unwrap();

    // Turn 1 in haiku mode: entries inserted, then the provider "fails"
    submit_prompt(&pool, "fix the login bug").await;
    let id = pool
        .interact(|conn| {
            let id = grouper::flush_turn_sync(
                conn,
                1,
                &[buffered(
                    "Edit",
                    json!({"file_path": "src/login.ts", "old_string": "a", "new_string": "b"}),
                )],
            )?[0];
            let failed = db::mark_failed_sync(conn, 1)?;
            assert_eq!(failed, 1);
            Ok(id)
        })
        .await
        .unwrap();

    // Not retrievable while failed
    let miss = pool
        .interact(|conn| retrieval::build_context_sync(conn, "login", 2, 4000))
        .await
        .unwrap();
    assert!(miss.is_none());

    // Turn 2's batch picks it up via the retry channel and succeeds
    let retries = pool
        .interact(|conn| db::get_failed_sync(conn, 10).map_err(Into::into))
        .await
        .unwrap();
    assert_eq!(retries.len(), 1);
    assert_eq!(retries[0].id, id);

    pool.interact(move |conn| {
        db::annotate_entry_sync(
            conn,
            id,
            &AnnotationUpdate {
                description: "Fixed the login redirect".into(),
                tags: "login,auth".into(),
                semantic_group: "auth".into(),
                related_files: vec!["src/login.ts".into()],
                confidence: 0.9,
                low_relevance: false,
            },
        )
    })
    .await
    .unwrap();

    let context = pool
        .interact(|conn| retrieval::build_context_sync(conn, "login", 2, 4000))
        .await
        .unwrap()
        .unwrap();
    assert!(context.contains("Fixed the login redirect"));
}

#[tokio::test]
async fn retrieval_never_returns_unsafe_entries() {
    let pool = DatabasePool::open_in_memory().await.unwrap();

    pool.interact(|conn| {
        // Annotated but low relevance
        let a = db::insert_entry_sync(conn, 1, Some("noise.ts"), EntryType::Research, &[])?;
        db::annotate_entry_sync(
            conn,
            a,
            &AnnotationUpdate {
                description: "login noise".into(),
                tags: "login".into(),
                semantic_group: "n".into(),
                related_files: vec![],
                confidence: 0.2,
                low_relevance: true,
            },
        )?;
        // Pending
        db::insert_entry_sync(conn, 1, Some("login_pending.ts"), EntryType::Research, &[])?;
        // Future turn
        let c = db::insert_entry_sync(conn, 9, Some("login_future.ts"), EntryType::Research, &[])?;
        db::annotate_entry_sync(
            conn,
            c,
            &AnnotationUpdate {
                description: "login future".into(),
                tags: "login".into(),
                semantic_group: "f".into(),
                related_files: vec![],
                confidence: 0.9,
                low_relevance: false,
            },
        )?;
        Ok(())
    })
    .await
    .unwrap();

    let hits = pool
        .interact(|conn| retrieval::search_entries_sync(conn, "\"login\"", 2, 50).map_err(Into::into))
        .await
        .unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn fts_bijection_holds_across_lifecycle() {
    let pool = DatabasePool::open_in_memory().await.unwrap();

    submit_prompt(&pool, "first pass").await;
    stop_turn(
        &pool,
        vec![
            buffered("Read", json!({"file_path": "src/a.rs"})),
            buffered("Edit", json!({"file_path": "src/b.rs", "old_string": "1", "new_string": "2"})),
            buffered("Bash", json!({"command": "cargo fmt"})),
        ],
    )
    .await;

    // Re-annotate one entry (as the LLM pass would)
    pool.interact(|conn| {
        let entry = db::get_recent_entries_sync(conn, 10)?
            .into_iter()
            .find(|e| e.entry_type == EntryType::FileChange)
            .unwrap();
        db::annotate_entry_sync(
            conn,
            entry.id,
            &AnnotationUpdate {
                description: "Bumped the constant".into(),
                tags: "b,rs".into(),
                semantic_group: "src".into(),
                related_files: vec![],
                confidence: 0.8,
                low_relevance: false,
            },
        )
    })
    .await
    .unwrap();

    let (orphans, entry_count, fts_count) = pool
        .interact(|conn| {
            let orphans = db::fts_orphans_sync(conn)?;
            let entries: i64 =
                conn.query_row("SELECT COUNT(*) FROM entries", [], |r| r.get(0))?;
            let fts: i64 = conn.query_row("SELECT COUNT(*) FROM entries_fts", [], |r| r.get(0))?;
            Ok((orphans, entries, fts))
        })
        .await
        .unwrap();
    assert_eq!(orphans, (0, 0));
    assert_eq!(entry_count, fts_count);
}
