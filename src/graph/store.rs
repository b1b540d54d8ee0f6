//! SQLite CRUD layer for the word index.
//!
//! [`WordStore`] owns the connection, the cached node sets, the compiled
//! flag matchers, and the ranking backend. Every statement goes through
//! [`Connection::prepare_cached`], so the first call compiles it and later
//! calls reuse it from the connection's LRU cache.

use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};

use crate::db::ranking::{NativeRanking, RankingFunctionProvider};
use crate::db::schema::initialize_database;
use crate::error::{Error, Result};
use crate::graph::flags::{tail_node, WordFlagsCalculator, DEFAULT_MATCH_BUDGET};
use crate::graph::node::{choseong, head_nodes, middle_node};
use crate::graph::node_set::NodeSetStore;
use crate::graph::query::{CandidateRow, PreparedQuery};
use crate::types::{NodeCategory, WordEntry, WordFlags, MAX_WORD_LENGTH};

// ---------------------------------------------------------------------------
// StoreStats
// ---------------------------------------------------------------------------

/// Row counts of the word table and every node set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    pub words: usize,
    pub node_sets: Vec<(NodeCategory, usize)>,
}

// ---------------------------------------------------------------------------
// SQL constants
// ---------------------------------------------------------------------------

const INSERT_WORD_SQL: &str = "\
INSERT INTO word_list (word, head_node_forward, head_node_reverse, head_node_two_char, choseong, flags)
SELECT ?1, ?2, ?3, ?4, ?5, ?6
WHERE NOT EXISTS (SELECT 1 FROM word_list WHERE word = ?1)";

const SELECT_WORD_SQL: &str = "\
SELECT seq, word, head_node_forward, head_node_reverse, head_node_two_char, choseong, flags, word_type, theme
FROM word_list WHERE word = ?1 ORDER BY seq LIMIT 1";

// Over-selects on purpose: recomputing an unaffected word is a no-op.
const SELECT_WORDS_CONTAINING_SQL: &str = "\
SELECT seq, word, flags FROM word_list WHERE instr(word, ?1) > 0";

/// End/Attack bits a caller may request on insert, in node-set order.
const AXIS_FLAGS: [WordFlags; 10] = [
    WordFlags::END_WORD,
    WordFlags::ATTACK_WORD,
    WordFlags::REVERSE_END_WORD,
    WordFlags::REVERSE_ATTACK_WORD,
    WordFlags::MIDDLE_END_WORD,
    WordFlags::MIDDLE_ATTACK_WORD,
    WordFlags::TWO_CHAR_END_WORD,
    WordFlags::TWO_CHAR_ATTACK_WORD,
    WordFlags::THREE_CHAR_END_WORD,
    WordFlags::THREE_CHAR_ATTACK_WORD,
];

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// A storable word: 1..=256 characters, no whitespace or control characters.
pub fn validate_word(word: &str) -> Result<()> {
    let len = word.chars().count();
    if len == 0 {
        return Err(Error::invalid("word must not be empty"));
    }
    if len > MAX_WORD_LENGTH {
        return Err(Error::invalid(format!(
            "word is {len} characters, the limit is {MAX_WORD_LENGTH}"
        )));
    }
    if word.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(Error::invalid(format!(
            "word {word:?} contains whitespace or control characters"
        )));
    }
    Ok(())
}

/// Node a requested axis flag contributes for `word`.
fn requested_node(word: &str, flag: WordFlags, category: NodeCategory) -> Result<String> {
    if flag == WordFlags::MIDDLE_END_WORD || flag == WordFlags::MIDDLE_ATTACK_WORD {
        middle_node(word)
    } else {
        tail_node(word, category.axis)
    }
}

// ---------------------------------------------------------------------------
// WordStore
// ---------------------------------------------------------------------------

/// Typed access to the word table and node sets.
pub struct WordStore {
    conn: Mutex<Connection>,
    nodes: NodeSetStore,
    calculator: WordFlagsCalculator,
    ranking: Box<dyn RankingFunctionProvider>,
}

impl std::fmt::Debug for WordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WordStore")
            .field("nodes", &self.nodes)
            .field("ranking", &self.ranking.name())
            .finish_non_exhaustive()
    }
}

impl WordStore {
    /// Open (or create) the database at `db_path`, apply the schema, and
    /// load every node set.
    pub fn open(
        db_path: &str,
        calculator: WordFlagsCalculator,
        ranking: Box<dyn RankingFunctionProvider>,
    ) -> Result<Self> {
        let conn = initialize_database(db_path)
            .map_err(|e| Error::Connection(format!("{db_path}: {e}")))?;
        Self::from_connection(conn, calculator, ranking)
    }

    /// In-memory store with the default budget and native ranking.
    pub fn open_in_memory() -> Result<Self> {
        Self::open(
            ":memory:",
            WordFlagsCalculator::new(DEFAULT_MATCH_BUDGET)?,
            Box::new(NativeRanking),
        )
    }

    /// Wrap a connection that already has the schema applied.
    pub fn from_connection(
        conn: Connection,
        calculator: WordFlagsCalculator,
        ranking: Box<dyn RankingFunctionProvider>,
    ) -> Result<Self> {
        ranking.install(&conn)?;
        let nodes = NodeSetStore::new();
        let loaded = nodes.load_all(&conn)?;
        tracing::info!(nodes = loaded, ranking = ranking.name(), "word store ready");
        Ok(Self {
            conn: Mutex::new(conn),
            nodes,
            calculator,
            ranking,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run `f` with exclusive access to the connection.
    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.lock();
        f(&conn)
    }

    pub fn nodes(&self) -> &NodeSetStore {
        &self.nodes
    }

    pub fn calculator(&self) -> &WordFlagsCalculator {
        &self.calculator
    }

    pub fn ranking(&self) -> &dyn RankingFunctionProvider {
        self.ranking.as_ref()
    }

    /// Reload every node set from storage.
    pub fn reload_nodes(&self) -> Result<usize> {
        let conn = self.lock();
        self.nodes.load_all(&conn)
    }

    /// Run a prepared candidate query.
    pub fn execute(&self, query: &PreparedQuery) -> Result<Vec<CandidateRow>> {
        let conn = self.lock();
        query.execute(&conn)
    }

    // -------------------------------------------------------------------
    // Node mutations
    // -------------------------------------------------------------------

    /// Add `node` to `category` and refresh the flags of the words it affects.
    pub fn add_node(&self, category: NodeCategory, node: &str) -> Result<bool> {
        let conn = self.lock();
        let inserted = self.nodes.add(&conn, category, node)?;
        if inserted {
            let refreshed = self.refresh_words_containing(&conn, node)?;
            tracing::info!(%category, node, refreshed, "node added");
        }
        Ok(inserted)
    }

    /// Remove `node` from `category` and refresh the flags of the words it
    /// affected.
    pub fn remove_node(&self, category: NodeCategory, node: &str) -> Result<usize> {
        let conn = self.lock();
        let removed = self.nodes.remove(&conn, category, node)?;
        if removed > 0 {
            let refreshed = self.refresh_words_containing(&conn, node)?;
            tracing::info!(%category, node, refreshed, "node removed");
        }
        Ok(removed)
    }

    fn refresh_words_containing(&self, conn: &Connection, node: &str) -> Result<usize> {
        let rows: Vec<(i64, String, u32)> = {
            let mut stmt = conn.prepare_cached(SELECT_WORDS_CONTAINING_SQL)?;
            let rows = stmt.query_map(params![node], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?;
            rows.collect::<std::result::Result<Vec<_>, _>>()?
        };

        let tx = conn.unchecked_transaction()?;
        let mut changed = 0;
        {
            let mut update = tx.prepare_cached("UPDATE word_list SET flags = ?1 WHERE seq = ?2")?;
            for (seq, word, stored) in rows {
                let stored = WordFlags::from_bits_truncate(stored);
                let Ok(flags) = self.calculator.recompute(&word, stored, &self.nodes) else {
                    continue;
                };
                if flags != stored {
                    update.execute(params![flags.bits(), seq])?;
                    changed += 1;
                }
            }
        }
        tx.commit()?;
        Ok(changed)
    }

    // -------------------------------------------------------------------
    // Word mutations
    // -------------------------------------------------------------------

    /// Insert `word` with its derived flags.
    ///
    /// Requested End/Attack axis bits first add the word's node on that
    /// axis to the matching set; curated bits are stored as given. Returns
    /// `false` if the word already exists.
    pub fn add_word(&self, word: &str, requested: WordFlags) -> Result<bool> {
        validate_word(word)?;
        let conn = self.lock();
        self.add_word_locked(&conn, word, requested)
    }

    /// Insert many words. Returns how many were new.
    pub fn add_words<'a>(
        &self,
        words: impl IntoIterator<Item = (&'a str, WordFlags)>,
    ) -> Result<usize> {
        let conn = self.lock();
        let mut added = 0;
        for (word, requested) in words {
            validate_word(word)?;
            if self.add_word_locked(&conn, word, requested)? {
                added += 1;
            }
        }
        Ok(added)
    }

    fn add_word_locked(&self, conn: &Connection, word: &str, requested: WordFlags) -> Result<bool> {
        for flag in AXIS_FLAGS {
            if !requested.contains(flag) {
                continue;
            }
            let Some(category) = NodeCategory::from_word_flag(flag) else {
                continue;
            };
            let node = requested_node(word, flag, category)?;
            if node.is_empty() {
                tracing::debug!(word, %flag, "no node on the requested axis");
                continue;
            }
            if self.nodes.add(conn, category, &node)? {
                self.refresh_words_containing(conn, &node)?;
            }
        }

        let flags = self.calculator.compute(word, &self.nodes)? | (requested & WordFlags::CURATED);
        let heads = head_nodes(word)?;
        let inserted = conn.prepare_cached(INSERT_WORD_SQL)?.execute(params![
            word,
            heads.forward,
            heads.reverse,
            heads.two_char,
            choseong(word),
            flags.bits(),
        ])? > 0;
        if inserted {
            tracing::debug!(word, %flags, "added word");
        }
        Ok(inserted)
    }

    /// Delete every row for `word`. Returns the row count.
    pub fn delete_word(&self, word: &str) -> Result<usize> {
        let conn = self.lock();
        let removed = conn
            .prepare_cached("DELETE FROM word_list WHERE word = ?1")?
            .execute(params![word])?;
        if removed > 0 {
            tracing::debug!(word, removed, "deleted word");
        }
        Ok(removed)
    }

    /// Replace the curated bits of `word` and recompute the rest. Returns
    /// `false` when the word is unknown.
    pub fn reclassify_word(&self, word: &str, curated: WordFlags) -> Result<bool> {
        let conn = self.lock();
        let flags = self.calculator.compute(word, &self.nodes)? | (curated & WordFlags::CURATED);
        let updated = conn
            .prepare_cached("UPDATE word_list SET flags = ?1 WHERE word = ?2")?
            .execute(params![flags.bits(), word])?;
        Ok(updated > 0)
    }

    // -------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------

    pub fn get_word(&self, word: &str) -> Result<Option<WordEntry>> {
        let conn = self.lock();
        let mut stmt = conn.prepare_cached(SELECT_WORD_SQL)?;
        let entry = stmt
            .query_row(params![word], |row| {
                Ok(WordEntry {
                    seq: row.get(0)?,
                    word: row.get(1)?,
                    head_node_forward: row.get(2)?,
                    head_node_reverse: row.get(3)?,
                    head_node_two_char: row.get(4)?,
                    choseong: row.get(5)?,
                    flags: WordFlags::from_bits_truncate(row.get(6)?),
                    word_type: row.get(7)?,
                    theme: row.get(8)?,
                })
            })
            .optional()?;
        Ok(entry)
    }

    pub fn word_count(&self) -> Result<usize> {
        let conn = self.lock();
        let count: i64 = conn
            .prepare_cached("SELECT count(*) FROM word_list")?
            .query_row([], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        Ok(StoreStats {
            words: self.word_count()?,
            node_sets: NodeCategory::ALL
                .into_iter()
                .map(|c| (c, self.nodes.len(c)))
                .collect(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
