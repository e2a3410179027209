// crates/distill-server/src/annotate/llm.rs
// LLM annotation pass: best-effort, detached from the hook path
//
// Runs in its own process (`distill annotate <session> <prompt_index>`)
// after on-stop. Failures never propagate; entries that did not make it
// are marked failed and ride along in the next turn's batch.

use anyhow::{Context, Result};

use crate::config::DistillConfig;
use crate::db::{self, AnnotationUpdate, DatabasePool, Entry, HistoricalEntry, LinkType};
use crate::llm::AnnotationClient;

use super::prompt::{self, AnnotationResponse};

/// Failed entries carried into one batch as retries.
const RETRY_LIMIT: usize = 10;
/// Annotated entries offered to the model as historical context.
const HISTORY_LIMIT: usize = 30;

/// Run the annotation pass for one turn. Never returns an error to the
/// caller's control flow beyond logging; the process exits 0 either way.
pub async fn run(pool: &DatabasePool, config: &DistillConfig, prompt_index: i64) {
    match annotate_pass(pool, config, prompt_index).await {
        Ok(0) => {}
        Ok(n) => eprintln!("[distill] annotated {n} entries for prompt {prompt_index}"),
        Err(e) => {
            eprintln!("[distill] annotation failed for prompt {prompt_index}: {e:#}");
            let _ = pool
                .interact_with_retry(move |conn| {
                    db::mark_failed_sync(conn, prompt_index).map_err(Into::into)
                })
                .await;
        }
    }
}

/// The 11-step pass; any error bubbles to `run`'s catch-all.
async fn annotate_pass(
    pool: &DatabasePool,
    config: &DistillConfig,
    prompt_index: i64,
) -> Result<usize> {
    // 1-3: collect the batch, mark it annotating, pull context.
    let (current, retries, historical, user_prompt) = pool
        .interact_with_retry(move |conn| {
            // Statuses make these disjoint: current is pending/annotating,
            // retries are failed.
            let current = db::get_pending_sync(conn, prompt_index)?;
            let retries: Vec<Entry> = db::get_failed_sync(conn, RETRY_LIMIT)?;
            if current.is_empty() && retries.is_empty() {
                return Ok((current, retries, Vec::new(), String::new()));
            }

            let ids: Vec<i64> = current.iter().chain(retries.iter()).map(|e| e.id).collect();
            db::mark_annotating_sync(conn, &ids)?;

            let historical: Vec<HistoricalEntry> =
                db::get_historical_sync(conn, prompt_index, HISTORY_LIMIT)?;
            let user_prompt = db::get_prompt_sync(conn, prompt_index)?.unwrap_or_default();
            Ok((current, retries, historical, user_prompt))
        })
        .await?;

    if current.is_empty() && retries.is_empty() {
        return Ok(0);
    }
    let batch_ids: Vec<i64> = current.iter().chain(retries.iter()).map(|e| e.id).collect();

    // 4-6: build the message, call the provider, parse the response.
    let message = prompt::build_user_message(&user_prompt, &current, &historical, &retries)?;
    let client = AnnotationClient::from_config(config)?;
    let raw = client
        .annotate(prompt::SYSTEM_PROMPT, &message)
        .await
        .context("provider call failed")?;
    let response = prompt::parse_response(&raw)?;

    // 7-10: apply annotations, links, and the turn summary; anything in
    // the batch that came back unannotated is marked failed.
    apply_response(pool, prompt_index, batch_ids, response).await
}

async fn apply_response(
    pool: &DatabasePool,
    prompt_index: i64,
    batch_ids: Vec<i64>,
    response: AnnotationResponse,
) -> Result<usize> {
    pool.interact_with_retry(move |conn| {
        let mut applied: Vec<i64> = Vec::new();

        for annotation in &response.annotations {
            if !batch_ids.contains(&annotation.id) {
                // Hallucinated id; nothing to update.
                continue;
            }
            let update = AnnotationUpdate {
                description: annotation.description.clone(),
                tags: annotation
                    .tags
                    .iter()
                    .map(|t| t.trim().to_lowercase())
                    .filter(|t| !t.is_empty())
                    .collect::<Vec<_>>()
                    .join(","),
                semantic_group: annotation.semantic_group.trim().to_lowercase(),
                related_files: annotation.related_files.clone(),
                confidence: annotation.confidence.clamp(0.0, 1.0),
                low_relevance: annotation.low_relevance,
            };
            db::annotate_entry_sync(conn, annotation.id, &update)?;
            applied.push(annotation.id);
        }

        for link in &response.links {
            let Some(link_type) = LinkType::from_str(&link.link_type) else {
                continue;
            };
            // Foreign keys reject links to unknown entries; skip those.
            let _ = db::insert_link_sync(conn, link.source_id, link.target_id, link_type);
        }

        if let Some(summary) = &response.prompt_summary {
            let tags = summary
                .tags
                .iter()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join(",");
            db::insert_summary_sync(conn, prompt_index, &summary.description, &tags)?;
        }

        // Partial result: whatever the model skipped goes to failed.
        for id in &batch_ids {
            if !applied.contains(id) {
                db::set_status_sync(conn, *id, db::AnnotationStatus::Failed)?;
            }
        }

        Ok(applied.len())
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::types::{AnnotationStatus, CallSummary, EntryType};
    use crate::annotate::prompt::parse_response;

    async fn pool_with_turn() -> (DatabasePool, i64, i64) {
        let pool = DatabasePool::open_in_memory().await.unwrap();
        let (a, b) = pool
            .interact(|conn| {
                db::store_prompt_sync(conn, 1, "fix the login bug")?;
                let a = db::insert_entry_sync(
                    conn,
                    1,
                    Some("src/login.ts"),
                    EntryType::FileChange,
                    &[CallSummary {
                        key: Some("src/login.ts".into()),
                        ..CallSummary::new("Edit")
                    }],
                )?;
                let b = db::insert_entry_sync(
                    conn,
                    1,
                    Some("ls"),
                    EntryType::Command,
                    &[CallSummary {
                        key: Some("ls".into()),
                        ..CallSummary::new("Bash")
                    }],
                )?;
                Ok((a, b))
            })
            .await
            .unwrap();
        (pool, a, b)
    }

    #[tokio::test]
    async fn apply_full_response_annotates_links_and_summarizes() {
        let (pool, a, b) = pool_with_turn().await;
        let raw = format!(
            r#"{{
                "annotations": [
                    {{"id": {a}, "description": "Fixed login redirect", "tags": ["Login", "auth"],
                      "semantic_group": "Auth-Fix", "related_files": ["src/login.ts"],
                      "confidence": 0.9, "low_relevance": false}},
                    {{"id": {b}, "description": "Listed the workspace", "tags": [],
                      "semantic_group": "shell", "confidence": 0.4, "low_relevance": true}}
                ],
                "links": [{{"source_id": {b}, "target_id": {a}, "link_type": "related"}}],
                "prompt_summary": {{"description": "Fixed the login bug", "tags": ["login"]}}
            }}"#
        );
        let response = parse_response(&raw).unwrap();
        let applied = apply_response(&pool, 1, vec![a, b], response).await.unwrap();
        assert_eq!(applied, 2);

        let (entry_a, entry_b, summary, links) = pool
            .interact(move |conn| {
                Ok((
                    db::get_entry_sync(conn, a)?.unwrap(),
                    db::get_entry_sync(conn, b)?.unwrap(),
                    db::get_summary_sync(conn, 1)?,
                    db::get_links_sync(conn, 10)?,
                ))
            })
            .await
            .unwrap();

        assert_eq!(entry_a.annotation_status, AnnotationStatus::Annotated);
        assert_eq!(entry_a.description.as_deref(), Some("Fixed login redirect"));
        // Tags and groups are normalized to lowercase
        assert_eq!(entry_a.tags, "login,auth");
        assert_eq!(entry_a.semantic_group, "auth-fix");
        assert!(entry_b.low_relevance);
        assert_eq!(summary.as_deref(), Some("Fixed the login bug"));
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].link_type, LinkType::Related);
    }

    #[tokio::test]
    async fn partial_response_fails_the_missing_ids() {
        let (pool, a, b) = pool_with_turn().await;
        let raw = format!(
            r#"{{"annotations": [{{"id": {a}, "description": "only one came back"}}]}}"#
        );
        let response = parse_response(&raw).unwrap();
        apply_response(&pool, 1, vec![a, b], response).await.unwrap();

        let (status_a, status_b) = pool
            .interact(move |conn| {
                Ok((
                    db::get_entry_sync(conn, a)?.unwrap().annotation_status,
                    db::get_entry_sync(conn, b)?.unwrap().annotation_status,
                ))
            })
            .await
            .unwrap();
        assert_eq!(status_a, AnnotationStatus::Annotated);
        assert_eq!(status_b, AnnotationStatus::Failed);
    }

    #[tokio::test]
    async fn hallucinated_ids_are_ignored() {
        let (pool, a, b) = pool_with_turn().await;
        let raw = format!(
            r#"{{"annotations": [
                {{"id": {a}, "description": "real"}},
                {{"id": 9999, "description": "made up"}}
            ]}}"#
        );
        let response = parse_response(&raw).unwrap();
        let applied = apply_response(&pool, 1, vec![a, b], response).await.unwrap();
        assert_eq!(applied, 1);
    }

    #[tokio::test]
    async fn invalid_link_types_are_skipped() {
        let (pool, a, b) = pool_with_turn().await;
        let raw = format!(
            r#"{{
                "annotations": [
                    {{"id": {a}, "description": "x"}},
                    {{"id": {b}, "description": "y"}}
                ],
                "links": [{{"source_id": {a}, "target_id": {b}, "link_type": "causes"}}]
            }}"#
        );
        let response = parse_response(&raw).unwrap();
        apply_response(&pool, 1, vec![a, b], response).await.unwrap();
        let links = pool
            .interact(|conn| db::get_links_sync(conn, 10).map_err(Into::into))
            .await
            .unwrap();
        assert!(links.is_empty());
    }

    #[tokio::test]
    async fn provider_failure_marks_batch_failed() {
        // Config points nowhere; from_config succeeds (key present) but
        // the HTTP call fails, so run()'s catch-all must fail the batch.
        let (pool, a, b) = pool_with_turn().await;
        let config = DistillConfig {
            annotator: crate::config::AnnotatorMode::Haiku,
            api_key: Some("test-key".into()),
            api_base_url: Some("http://127.0.0.1:1".into()),
            ..DistillConfig::default()
        };
        run(&pool, &config, 1).await;

        let (status_a, status_b) = pool
            .interact(move |conn| {
                Ok((
                    db::get_entry_sync(conn, a)?.unwrap().annotation_status,
                    db::get_entry_sync(conn, b)?.unwrap().annotation_status,
                ))
            })
            .await
            .unwrap();
        assert_eq!(status_a, AnnotationStatus::Failed);
        assert_eq!(status_b, AnnotationStatus::Failed);

        // Next batch picks them up through the retry channel
        let retries = pool
            .interact(|conn| db::get_failed_sync(conn, 10).map_err(Into::into))
            .await
            .unwrap();
        assert_eq!(retries.len(), 2);
    }
}
