//! SQLite schema initialization for the word index.
//!
//! One `word_list` table carries every word with its precomputed head nodes
//! and flag bitmask; eight single-column tables back the node sets. The
//! tables are created first, then the migration registry upgrades older
//! shapes, and only then are the column indexes created, since a legacy
//! table may still lack the indexed columns at that point.

use rusqlite::Connection;

use crate::db::migrations::run_migrations;
use crate::db::ranking::{NativeRanking, RankingFunctionProvider};
use crate::error::Result;
use crate::types::NodeCategory;

// ---------------------------------------------------------------------------
// DDL constants
// ---------------------------------------------------------------------------

pub const WORD_TABLE: &str = "word_list";

const CREATE_WORD_LIST: &str = "\
CREATE TABLE IF NOT EXISTS word_list (
  seq INTEGER PRIMARY KEY AUTOINCREMENT,
  word VARCHAR(256) NOT NULL,
  head_node_forward CHAR(2) NOT NULL DEFAULT '',
  head_node_reverse CHAR(2) NOT NULL DEFAULT '',
  head_node_two_char CHAR(2) NOT NULL DEFAULT '',
  choseong VARCHAR(256) NOT NULL DEFAULT '',
  flags INTEGER NOT NULL DEFAULT 0,
  word_type TEXT,
  theme INTEGER NOT NULL DEFAULT 0
)";

// Indexes ----------------------------------------------------------------

const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_word_list_word ON word_list(word)",
    "CREATE INDEX IF NOT EXISTS idx_word_list_forward ON word_list(head_node_forward)",
    "CREATE INDEX IF NOT EXISTS idx_word_list_reverse ON word_list(head_node_reverse)",
    "CREATE INDEX IF NOT EXISTS idx_word_list_two_char ON word_list(head_node_two_char)",
];

fn create_node_table_sql(category: NodeCategory) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (node CHAR(2) NOT NULL);\n\
         CREATE INDEX IF NOT EXISTS idx_{table}_node ON {table}(node);",
        table = category.table_name()
    )
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Create the eight node tables if they do not exist.
pub fn create_node_tables(conn: &Connection) -> Result<()> {
    for category in NodeCategory::ALL {
        conn.execute_batch(&create_node_table_sql(category))?;
    }
    Ok(())
}

/// Apply pragmas, tables, migrations, indexes and ranking routines to an
/// already-open connection.
pub fn apply_schema(conn: &Connection) -> Result<()> {
    // -- Pragmas ----------------------------------------------------------
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;

    // -- Core tables ------------------------------------------------------
    conn.execute_batch(CREATE_WORD_LIST)?;
    create_node_tables(conn)?;

    // -- Shape upgrades ---------------------------------------------------
    let report = run_migrations(conn);
    if !report.applied.is_empty() {
        tracing::info!(applied = ?report.applied, "database migrated");
    }

    // -- Indexes ----------------------------------------------------------
    for ddl in CREATE_INDEXES {
        conn.execute_batch(ddl)?;
    }

    // -- Ranking routines -------------------------------------------------
    NativeRanking.install(conn)?;

    Ok(())
}

/// Open (or create) the SQLite database at `db_path` and apply the full
/// schema.
///
/// The returned connection has WAL mode and synchronous NORMAL configured,
/// every pending migration applied, and the `WordPriority` /
/// `MissionWordPriority` functions registered.
///
/// # Errors
///
/// Returns an error if the database cannot be opened or any DDL statement
/// fails. Individual migration failures are logged and skipped.
pub fn initialize_database(db_path: &str) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    apply_schema(&conn)?;
    Ok(conn)
}

/// Whether `table` has a column named `column`.
pub fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM pragma_table_info(?1) WHERE name = ?2",
        rusqlite::params![table, column],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Whether a table named `table` exists.
pub fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = ?1",
        rusqlite::params![table],
        |row| row.get(0),
    )?;
    Ok(exists)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Connection {
        initialize_database(":memory:").expect("schema creation should succeed on :memory:")
    }

    fn object_exists(conn: &Connection, obj_type: &str, obj_name: &str) -> bool {
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = ?1 AND name = ?2",
                rusqlite::params![obj_type, obj_name],
                |row| row.get(0),
            )
            .unwrap();
        count > 0
    }

    #[test]
    fn word_table_exists_with_expected_columns() {
        let conn = setup();
        assert!(object_exists(&conn, "table", WORD_TABLE));
        for col in [
            "seq",
            "word",
            "head_node_forward",
            "head_node_reverse",
            "head_node_two_char",
            "choseong",
            "flags",
            "word_type",
            "theme",
        ] {
            assert!(
                column_exists(&conn, WORD_TABLE, col).unwrap(),
                "word_list should have column '{col}'"
            );
        }
    }

    #[test]
    fn all_node_tables_exist() {
        let conn = setup();
        for category in NodeCategory::ALL {
            assert!(
                object_exists(&conn, "table", category.table_name()),
                "table '{}' should exist",
                category.table_name()
            );
        }
    }

    #[test]
    fn indexes_exist() {
        let conn = setup();
        for idx in [
            "idx_word_list_word",
            "idx_word_list_forward",
            "idx_word_list_reverse",
            "idx_word_list_two_char",
            "idx_end_node_forward_node",
        ] {
            assert!(object_exists(&conn, "index", idx), "index '{idx}' should exist");
        }
    }

    #[test]
    fn ranking_functions_are_registered() {
        let conn = setup();
        let score: i64 = conn
            .query_row("SELECT WordPriority(1, 1, 2, 3, 2, 1)", [], |row| row.get(0))
            .unwrap();
        assert!(score > 0);
    }

    #[test]
    fn word_column_allows_duplicates_for_legacy_data() {
        // Uniqueness is enforced by the store and repaired by the
        // deduplication job, not by a constraint.
        let conn = setup();
        for _ in 0..2 {
            conn.execute("INSERT INTO word_list (word) VALUES ('하늘')", [])
                .unwrap();
        }
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM word_list", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn defaults_apply_to_minimal_insert() {
        let conn = setup();
        conn.execute("INSERT INTO word_list (word) VALUES ('가방')", [])
            .unwrap();
        let (flags, theme, kind): (i64, i64, Option<String>) = conn
            .query_row(
                "SELECT flags, theme, word_type FROM word_list WHERE word = '가방'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!(flags, 0);
        assert_eq!(theme, 0);
        assert!(kind.is_none());
    }

    #[test]
    fn schema_is_idempotent() {
        let conn = setup();
        apply_schema(&conn).unwrap();
        assert!(table_exists(&conn, WORD_TABLE).unwrap());
    }

    #[test]
    fn probes_report_missing_objects() {
        let conn = setup();
        assert!(!table_exists(&conn, "nope").unwrap());
        assert!(!column_exists(&conn, WORD_TABLE, "nope").unwrap());
    }

    #[test]
    fn seq_autoincrements() {
        let conn = setup();
        conn.execute("INSERT INTO word_list (word) VALUES ('가')", []).unwrap();
        conn.execute("INSERT INTO word_list (word) VALUES ('나')", []).unwrap();
        let ids: Vec<i64> = conn
            .prepare("SELECT seq FROM word_list ORDER BY seq")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();
        assert_eq!(ids.len(), 2);
        assert!(ids[1] > ids[0]);
    }
}
