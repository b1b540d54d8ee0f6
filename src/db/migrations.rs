//! Ordered, self-detecting schema upgrades.
//!
//! There is no schema version column. Each [`Migration`] probes the shape of
//! the database to decide whether it applies, so running the registry
//! against an up-to-date database is a no-op. Migrations run in date order,
//! each inside its own transaction. A failing probe or body is logged and
//! skipped; it never aborts the connection open.
//!
//! Earlier layouts handled here:
//! - node lists stored as `endword_list`, `attackword_list`, … with a
//!   `word_index` column;
//! - a word table with only `head_node_forward`;
//! - a separate `is_end_word` column instead of the `END_WORD` flag bit;
//! - no `choseong`, `word_type` or `theme` columns.

use chrono::NaiveDate;
use rusqlite::{params, Connection};

use crate::db::schema::{column_exists, table_exists, WORD_TABLE};
use crate::error::Result;
use crate::graph::node::{choseong, head_nodes};
use crate::types::{NodeAxis, NodeCategory, WordFlags};

/// One schema upgrade.
#[derive(Clone, Copy)]
pub struct Migration {
    pub name: &'static str,
    /// Declared date, `YYYY-MM-DD`; the registry's sort key.
    pub date: &'static str,
    pub applies_if: fn(&Connection) -> Result<bool>,
    pub apply: fn(&Connection) -> Result<()>,
}

impl std::fmt::Debug for Migration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migration")
            .field("name", &self.name)
            .field("date", &self.date)
            .finish_non_exhaustive()
    }
}

impl Migration {
    pub fn parsed_date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(self.date, "%Y-%m-%d").ok()
    }
}

/// What happened during one registry run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub applied: Vec<&'static str>,
    pub failed: Vec<&'static str>,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

const LEGACY_NODE_TABLES: &[(&str, NodeCategory)] = &[
    ("endword_list", NodeCategory::end(NodeAxis::Forward)),
    ("attackword_list", NodeCategory::attack(NodeAxis::Forward)),
    ("reverse_endword_list", NodeCategory::end(NodeAxis::Reverse)),
    ("reverse_attackword_list", NodeCategory::attack(NodeAxis::Reverse)),
    ("kkutu_endword_list", NodeCategory::end(NodeAxis::TwoChar)),
    ("kkutu_attackword_list", NodeCategory::attack(NodeAxis::TwoChar)),
];

/// All migrations, sorted by declared date. Entries with an unparsable
/// date are dropped with a warning.
pub fn registry() -> Vec<Migration> {
    let mut all = vec![
        Migration {
            name: "add_metadata_columns",
            date: "2023-05-07",
            applies_if: metadata_columns_missing,
            apply: add_metadata_columns,
        },
        Migration {
            name: "add_reverse_and_two_char_index",
            date: "2021-03-14",
            applies_if: index_columns_missing,
            apply: add_index_columns,
        },
        Migration {
            name: "rename_legacy_node_tables",
            date: "2020-11-01",
            applies_if: legacy_node_tables_present,
            apply: rename_legacy_node_tables,
        },
        Migration {
            name: "add_choseong",
            date: "2022-01-20",
            applies_if: choseong_missing,
            apply: add_choseong,
        },
        Migration {
            name: "legacy_end_word_column",
            date: "2021-08-02",
            applies_if: legacy_end_word_column_present,
            apply: fold_legacy_end_word_column,
        },
    ];
    all.retain(|m| {
        let ok = m.parsed_date().is_some();
        if !ok {
            tracing::warn!(migration = m.name, date = m.date, "unparsable migration date; skipping");
        }
        ok
    });
    all.sort_by_key(|m| m.parsed_date());
    all
}

/// Apply every pending migration from [`registry`], then VACUUM if any ran.
pub fn run_migrations(conn: &Connection) -> MigrationReport {
    run_registry(conn, &registry())
}

/// Apply `migrations` in the given order.
pub fn run_registry(conn: &Connection, migrations: &[Migration]) -> MigrationReport {
    let mut report = MigrationReport::default();

    for migration in migrations {
        let applies = match (migration.applies_if)(conn) {
            Ok(applies) => applies,
            Err(e) => {
                tracing::warn!(migration = migration.name, "precondition check failed: {e}; skipping");
                continue;
            }
        };
        if !applies {
            continue;
        }

        match apply_in_transaction(conn, migration) {
            Ok(()) => {
                tracing::info!(migration = migration.name, date = migration.date, "applied migration");
                report.applied.push(migration.name);
            }
            Err(e) => {
                tracing::error!(migration = migration.name, "migration failed: {e}");
                report.failed.push(migration.name);
            }
        }
    }

    if !report.applied.is_empty() {
        if let Err(e) = conn.execute_batch("VACUUM") {
            tracing::warn!("vacuum after migrations failed: {e}");
        }
    }
    report
}

fn apply_in_transaction(conn: &Connection, migration: &Migration) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    (migration.apply)(&tx)?;
    tx.commit()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// 2020-11-01 rename_legacy_node_tables
// ---------------------------------------------------------------------------

fn legacy_node_tables_present(conn: &Connection) -> Result<bool> {
    for (legacy, _) in LEGACY_NODE_TABLES {
        if table_exists(conn, legacy)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn rename_legacy_node_tables(conn: &Connection) -> Result<()> {
    for (legacy, category) in LEGACY_NODE_TABLES {
        if !table_exists(conn, legacy)? {
            continue;
        }
        let table = category.table_name();
        conn.execute_batch(&format!(
            "INSERT INTO {table} (node) \
             SELECT DISTINCT word_index FROM {legacy} \
             WHERE word_index NOT IN (SELECT node FROM {table});\n\
             DROP TABLE {legacy};"
        ))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// 2021-03-14 add_reverse_and_two_char_index
// ---------------------------------------------------------------------------

fn index_columns_missing(conn: &Connection) -> Result<bool> {
    Ok(!column_exists(conn, WORD_TABLE, "head_node_reverse")?
        || !column_exists(conn, WORD_TABLE, "head_node_two_char")?)
}

fn add_index_columns(conn: &Connection) -> Result<()> {
    for column in ["head_node_reverse", "head_node_two_char"] {
        if !column_exists(conn, WORD_TABLE, column)? {
            conn.execute_batch(&format!(
                "ALTER TABLE {WORD_TABLE} ADD COLUMN {column} CHAR(2) NOT NULL DEFAULT ''"
            ))?;
        }
    }

    let rows = all_words(conn)?;
    let mut update = conn.prepare_cached(
        "UPDATE word_list SET head_node_reverse = ?1, head_node_two_char = ?2 WHERE seq = ?3",
    )?;
    for (seq, word) in rows {
        // Empty words are left for the word-table check to delete.
        let Ok(nodes) = head_nodes(&word) else {
            continue;
        };
        update.execute(params![nodes.reverse, nodes.two_char, seq])?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// 2021-08-02 legacy_end_word_column
// ---------------------------------------------------------------------------

fn legacy_end_word_column_present(conn: &Connection) -> Result<bool> {
    column_exists(conn, WORD_TABLE, "is_end_word")
}

fn fold_legacy_end_word_column(conn: &Connection) -> Result<()> {
    conn.execute(
        "UPDATE word_list SET flags = flags | ?1 WHERE is_end_word != 0",
        params![WordFlags::END_WORD.bits()],
    )?;
    conn.execute_batch("ALTER TABLE word_list DROP COLUMN is_end_word")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// 2022-01-20 add_choseong
// ---------------------------------------------------------------------------

fn choseong_missing(conn: &Connection) -> Result<bool> {
    Ok(!column_exists(conn, WORD_TABLE, "choseong")?)
}

fn add_choseong(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "ALTER TABLE word_list ADD COLUMN choseong VARCHAR(256) NOT NULL DEFAULT ''",
    )?;
    let rows = all_words(conn)?;
    let mut update = conn.prepare_cached("UPDATE word_list SET choseong = ?1 WHERE seq = ?2")?;
    for (seq, word) in rows {
        update.execute(params![choseong(&word), seq])?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// 2023-05-07 add_metadata_columns
// ---------------------------------------------------------------------------

fn metadata_columns_missing(conn: &Connection) -> Result<bool> {
    Ok(!column_exists(conn, WORD_TABLE, "word_type")? || !column_exists(conn, WORD_TABLE, "theme")?)
}

fn add_metadata_columns(conn: &Connection) -> Result<()> {
    if !column_exists(conn, WORD_TABLE, "word_type")? {
        conn.execute_batch("ALTER TABLE word_list ADD COLUMN word_type TEXT")?;
    }
    if !column_exists(conn, WORD_TABLE, "theme")? {
        conn.execute_batch("ALTER TABLE word_list ADD COLUMN theme INTEGER NOT NULL DEFAULT 0")?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn all_words(conn: &Connection) -> Result<Vec<(i64, String)>> {
    let mut stmt = conn.prepare("SELECT seq, word FROM word_list")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Into::into)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::{apply_schema, create_node_tables};
    use pretty_assertions::assert_eq;

    /// The oldest word table layout this registry upgrades.
    const LEGACY_WORD_LIST: &str = "\
CREATE TABLE word_list (
  seq INTEGER PRIMARY KEY AUTOINCREMENT,
  word VARCHAR(256) NOT NULL,
  head_node_forward CHAR(2) NOT NULL DEFAULT '',
  flags INTEGER NOT NULL DEFAULT 0,
  is_end_word INTEGER NOT NULL DEFAULT 0
)";

    fn legacy_connection() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(LEGACY_WORD_LIST).unwrap();
        conn.execute(
            "INSERT INTO word_list (word, head_node_forward, is_end_word) VALUES ('사과나무', '사', 1)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO word_list (word, head_node_forward) VALUES ('가방', '가')",
            [],
        )
        .unwrap();
        conn
    }

    #[test]
    fn registry_is_sorted_by_date() {
        let dates: Vec<NaiveDate> = registry().iter().filter_map(|m| m.parsed_date()).collect();
        let mut sorted = dates.clone();
        sorted.sort();
        assert_eq!(dates, sorted);
        assert_eq!(registry().first().unwrap().name, "rename_legacy_node_tables");
        assert_eq!(registry().len(), 5);
    }

    #[test]
    fn fresh_database_needs_no_migration() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();
        let report = run_migrations(&conn);
        assert!(report.applied.is_empty());
        assert!(report.failed.is_empty());
    }

    #[test]
    fn legacy_word_table_is_upgraded() {
        let conn = legacy_connection();
        create_node_tables(&conn).unwrap();
        let report = run_migrations(&conn);
        assert_eq!(
            report.applied,
            vec![
                "add_reverse_and_two_char_index",
                "legacy_end_word_column",
                "add_choseong",
                "add_metadata_columns",
            ]
        );

        let (reverse, two_char, cho, flags): (String, String, String, u32) = conn
            .query_row(
                "SELECT head_node_reverse, head_node_two_char, choseong, flags \
                 FROM word_list WHERE word = '사과나무'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .unwrap();
        assert_eq!(reverse, "무");
        assert_eq!(two_char, "사과");
        assert_eq!(cho, "ㅅㄱㄴㅁ");
        assert!(WordFlags::from_bits_truncate(flags).contains(WordFlags::END_WORD));
        assert!(!column_exists(&conn, WORD_TABLE, "is_end_word").unwrap());
    }

    #[test]
    fn second_run_is_a_no_op() {
        let conn = legacy_connection();
        create_node_tables(&conn).unwrap();
        run_migrations(&conn);
        let again = run_migrations(&conn);
        assert!(again.applied.is_empty());
    }

    #[test]
    fn legacy_node_tables_are_folded_in() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE endword_list (word_index CHAR(2) NOT NULL);
             INSERT INTO endword_list VALUES ('늄'), ('늄'), ('릇');",
        )
        .unwrap();
        apply_schema(&conn).unwrap();

        assert!(!table_exists(&conn, "endword_list").unwrap());
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM end_node_forward", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn failing_precondition_is_skipped() {
        fn broken_probe(_: &Connection) -> Result<bool> {
            Err(crate::error::Error::Connection("probe exploded".into()))
        }
        fn never(_: &Connection) -> Result<()> {
            panic!("must not run");
        }
        let conn = Connection::open_in_memory().unwrap();
        let report = run_registry(
            &conn,
            &[Migration {
                name: "broken",
                date: "2024-01-01",
                applies_if: broken_probe,
                apply: never,
            }],
        );
        assert!(report.applied.is_empty());
        assert!(report.failed.is_empty());
    }

    #[test]
    fn failing_body_rolls_back_and_continues() {
        fn always(_: &Connection) -> Result<bool> {
            Ok(true)
        }
        fn half_then_fail(conn: &Connection) -> Result<()> {
            conn.execute_batch("CREATE TABLE half (x INTEGER)")?;
            conn.execute_batch("THIS IS NOT SQL")?;
            Ok(())
        }
        fn create_ok(conn: &Connection) -> Result<()> {
            conn.execute_batch("CREATE TABLE ok_table (x INTEGER)")?;
            Ok(())
        }
        let conn = Connection::open_in_memory().unwrap();
        let report = run_registry(
            &conn,
            &[
                Migration { name: "bad", date: "2024-01-01", applies_if: always, apply: half_then_fail },
                Migration { name: "good", date: "2024-01-02", applies_if: always, apply: create_ok },
            ],
        );
        assert_eq!(report.failed, vec!["bad"]);
        assert_eq!(report.applied, vec!["good"]);
        assert!(!table_exists(&conn, "half").unwrap());
        assert!(table_exists(&conn, "ok_table").unwrap());
    }
}
