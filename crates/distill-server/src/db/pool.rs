// crates/distill-server/src/db/pool.rs
// Async connection pool over the per-session SQLite database
//
// # Async Database Access Pattern
//
// Use `pool.interact()` for all database access:
// ```ignore
// let result = pool.interact(move |conn| {
//     some_sync_function(conn, arg1, arg2)
// }).await?;
// ```
//
// The closure runs on a blocking thread, so hook handlers never block
// the async runtime on SQLite. If type inference needs help, annotate
// the closure's return: `Ok::<_, rusqlite::Error>(result)`.

use anyhow::{Context, Result};
use deadpool_sqlite::{Config, Hook, Pool, Runtime};
use rusqlite::Connection;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Pool wrapper with per-connection pragma setup and migrations on open.
pub struct DatabasePool {
    pool: Pool,
    path: Option<PathBuf>,
    /// URI for in-memory databases (shared cache across pool connections)
    memory_uri: Option<String>,
}

impl DatabasePool {
    /// Open a pooled database at the given path.
    ///
    /// Ensures the parent directory exists (0700 on unix), wires the
    /// per-connection pragma hook, and runs schema migrations before
    /// returning.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
            #[cfg(unix)]
            {
                let mut perms = std::fs::metadata(parent)?.permissions();
                perms.set_mode(0o700);
                std::fs::set_permissions(parent, perms)?;
            }
        }

        let path_str = path.to_string_lossy().to_string();
        let pool = build_pool(&path_str)?;

        let db_pool = Self {
            pool,
            path: Some(path.to_path_buf()),
            memory_uri: None,
        };
        db_pool.run_migrations().await?;

        // The file exists once migrations ran; lock it down to the
        // owner, it holds raw prompts and tool inputs.
        #[cfg(unix)]
        if let Ok(metadata) = std::fs::metadata(path) {
            let mut perms = metadata.permissions();
            perms.set_mode(0o600);
            if let Err(e) = std::fs::set_permissions(path, perms) {
                tracing::warn!("Failed to set database file permissions to 0600: {}", e);
            }
        }

        Ok(db_pool)
    }

    /// Open a pooled in-memory database.
    ///
    /// Uses a shared-cache URI so every pool connection sees the same
    /// database; without it each connection would get its own empty one.
    pub async fn open_in_memory() -> Result<Self> {
        let unique_id = uuid::Uuid::new_v4();
        let uri = format!("file:memdb_{unique_id}?mode=memory&cache=shared");
        let pool = build_pool(&uri)?;

        let db_pool = Self {
            pool,
            path: None,
            memory_uri: Some(uri),
        };
        db_pool.run_migrations().await?;
        Ok(db_pool)
    }

    /// Get the memory URI (for sharing state in tests)
    pub fn memory_uri(&self) -> Option<&str> {
        self.memory_uri.as_deref()
    }

    /// Get the database file path (None for in-memory).
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run a closure with a connection from the pool.
    pub async fn interact<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get connection from pool")?;

        conn.interact(move |conn| f(conn))
            .await
            .map_err(|e| anyhow::anyhow!("interact failed: {e}"))?
    }

    /// Run a closure that returns a rusqlite::Result.
    pub async fn interact_raw<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<R> + Send + 'static,
        R: Send + 'static,
    {
        self.interact(move |conn| f(conn).map_err(Into::into)).await
    }

    /// Run a closure with retry on SQLITE_BUSY.
    ///
    /// Exponential backoff (100ms, 500ms, 2000ms) over 3 attempts. The
    /// detached annotator uses this for its writes, which can contend
    /// with the next turn's hook processes.
    pub async fn interact_with_retry<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R> + Send + Clone + 'static,
        R: Send + 'static,
    {
        let delays = [
            std::time::Duration::from_millis(100),
            std::time::Duration::from_millis(500),
            std::time::Duration::from_millis(2000),
        ];

        for delay in &delays {
            let f_clone = f.clone();
            match self.interact(f_clone).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    let err_str = e.to_string();
                    if err_str.contains("database is locked") || err_str.contains("SQLITE_BUSY") {
                        tracing::warn!("SQLITE_BUSY, retrying in {:?}", delay);
                        tokio::time::sleep(*delay).await;
                    } else {
                        return Err(e);
                    }
                }
            }
        }

        // Final attempt (no retry after this)
        self.interact(f).await
    }

    async fn run_migrations(&self) -> Result<()> {
        self.interact(|conn| {
            super::schema::run_all_migrations(conn)?;
            Ok(())
        })
        .await
    }
}

fn build_pool(path_or_uri: &str) -> Result<Pool> {
    let cfg = Config::new(path_or_uri);
    cfg.builder(Runtime::Tokio1)
        .context("Failed to create pool builder")?
        .post_create(Hook::async_fn(|conn, _metrics| {
            Box::pin(async move {
                conn.interact(|conn| setup_connection(conn))
                    .await
                    .map_err(|e| {
                        deadpool_sqlite::HookError::Message(format!("interact failed: {e}").into())
                    })?
                    .map_err(|e| {
                        deadpool_sqlite::HookError::Message(
                            format!("connection setup failed: {e}").into(),
                        )
                    })
            })
        }))
        .build()
        .context("Failed to build connection pool")
}

/// Configure a connection after it's created.
///
/// WAL lets the retriever read while the detached annotator writes;
/// NORMAL synchronous trades fsync durability for hook-path latency;
/// busy_timeout gives writers a 5s retry window under contention;
/// the journal size cap keeps the WAL sidecar from growing unbounded
/// across many short-lived hook processes.
/// WAL is a no-op on in-memory databases, which is fine.
fn setup_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL; \
         PRAGMA foreign_keys=ON; \
         PRAGMA busy_timeout=5000; \
         PRAGMA synchronous=NORMAL; \
         PRAGMA journal_size_limit=32768;",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pool_in_memory_shares_state() {
        let pool = DatabasePool::open_in_memory()
            .await
            .expect("Failed to open in-memory pool");

        let id = pool
            .interact(|conn| {
                conn.execute(
                    "INSERT INTO entries (prompt_index, entry_type, created_at) VALUES (1, 'command', 0)",
                    [],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .expect("Failed to insert");
        assert!(id > 0);

        // Verify from another connection in the pool (tests shared cache)
        let entry_type: String = pool
            .interact(move |conn| {
                conn.query_row(
                    "SELECT entry_type FROM entries WHERE id = ?",
                    [id],
                    |row| row.get(0),
                )
                .map_err(Into::into)
            })
            .await
            .expect("Failed to query");
        assert_eq!(entry_type, "command");
    }

    #[tokio::test]
    async fn pool_opens_file_database() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("sessions").join("s1.db");
        let pool = DatabasePool::open(&db_path).await.expect("open failed");
        assert_eq!(pool.path(), Some(db_path.as_path()));
        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn concurrent_access() {
        let pool = std::sync::Arc::new(
            DatabasePool::open_in_memory()
                .await
                .expect("Failed to open pool"),
        );

        let mut handles = Vec::new();
        for i in 0..10 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move {
                pool.interact(move |conn| {
                    conn.execute(
                        "INSERT INTO entries (prompt_index, entry_type, created_at) VALUES (?, 'research', 0)",
                        [i],
                    )?;
                    Ok(())
                })
                .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().expect("Insert failed");
        }

        let count: i64 = pool
            .interact(|conn| {
                conn.query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))
                    .map_err(Into::into)
            })
            .await
            .expect("Count failed");
        assert_eq!(count, 10);
    }

    #[tokio::test]
    async fn interact_with_retry_fails_fast_on_sql_error() {
        let pool = DatabasePool::open_in_memory().await.unwrap();
        let result = pool
            .interact_with_retry(|conn| {
                conn.execute("INSERT INTO nonexistent_table VALUES (1)", [])?;
                Ok(())
            })
            .await;
        assert!(result.is_err());
    }
}
