// crates/distill-server/src/db/links.rs
// Directed typed edges between entries

use rusqlite::{Connection, params};

use crate::utils::now_millis;

use super::types::{EntryLink, LinkType};

/// Insert a link; the (source, target, type) triple is unique, so
/// repeated annotation passes cannot duplicate edges.
pub fn insert_link_sync(
    conn: &Connection,
    source_id: i64,
    target_id: i64,
    link_type: LinkType,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO entry_links (source_id, target_id, link_type, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![source_id, target_id, link_type.as_str(), now_millis()],
    )?;
    Ok(())
}

/// Most recent links, for `inspect`.
pub fn get_links_sync(conn: &Connection, limit: usize) -> rusqlite::Result<Vec<EntryLink>> {
    let mut stmt = conn.prepare(
        "SELECT source_id, target_id, link_type FROM entry_links
         ORDER BY id DESC
         LIMIT ?1",
    )?;
    let rows = stmt.query_map(params![limit as i64], |row| {
        let link_type: String = row.get(2)?;
        Ok(EntryLink {
            source_id: row.get(0)?,
            target_id: row.get(1)?,
            link_type: LinkType::from_str(&link_type).unwrap_or(LinkType::Related),
        })
    })?;
    rows.collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::entries::insert_entry_sync;
    use crate::db::schema::run_all_migrations;
    use crate::db::types::EntryType;

    fn conn_with_entries() -> (Connection, i64, i64) {
        let conn = Connection::open_in_memory().unwrap();
        run_all_migrations(&conn).unwrap();
        let a = insert_entry_sync(&conn, 1, Some("a.rs"), EntryType::Research, &[]).unwrap();
        let b = insert_entry_sync(&conn, 2, Some("b.rs"), EntryType::FileChange, &[]).unwrap();
        (conn, a, b)
    }

    #[test]
    fn link_round_trips() {
        let (conn, a, b) = conn_with_entries();
        insert_link_sync(&conn, b, a, LinkType::Extends).unwrap();
        let links = get_links_sync(&conn, 10).unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].source_id, b);
        assert_eq!(links[0].target_id, a);
        assert_eq!(links[0].link_type, LinkType::Extends);
    }

    #[test]
    fn duplicate_triple_is_ignored() {
        let (conn, a, b) = conn_with_entries();
        insert_link_sync(&conn, b, a, LinkType::Related).unwrap();
        insert_link_sync(&conn, b, a, LinkType::Related).unwrap();
        assert_eq!(get_links_sync(&conn, 10).unwrap().len(), 1);
        // A different type between the same pair is a new edge
        insert_link_sync(&conn, b, a, LinkType::DependsOn).unwrap();
        assert_eq!(get_links_sync(&conn, 10).unwrap().len(), 2);
    }
}
