//! Consistency jobs: repair drift between words and their derived data.
//!
//! The pipeline runs a fixed sequence of jobs. Each job commits on its own
//! and reports how many rows it touched. A failing job is logged and counts
//! as zero; the rest of the pipeline still runs.

use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use rusqlite::{params, Connection};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::engine::EngineEvent;
use crate::error::Result;
use crate::graph::node::{choseong, head_nodes};
use crate::graph::store::{validate_word, WordStore};
use crate::types::{NodeAxis, NodeCategory, WordFlags};

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    /// Corrects data; counts toward the fix total.
    Fix,
    Maintenance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobReport {
    pub name: &'static str,
    pub kind: JobKind,
    pub affected: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CheckSummary {
    pub jobs: Vec<JobReport>,
    pub elapsed_ms: u64,
}

impl CheckSummary {
    /// Rows corrected or removed by the fix jobs.
    pub fn fix_count(&self) -> usize {
        self.jobs
            .iter()
            .filter(|j| j.kind == JobKind::Fix)
            .map(|j| j.affected)
            .sum()
    }

    pub fn failed(&self) -> impl Iterator<Item = &JobReport> {
        self.jobs.iter().filter(|j| j.error.is_some())
    }

    pub fn job(&self, name: &str) -> Option<&JobReport> {
        self.jobs.iter().find(|j| j.name == name)
    }
}

/// Event payload sent when a check finishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckDone {
    pub summary: CheckSummary,
    pub fix_count: usize,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

fn run_job(name: &'static str, kind: JobKind, job: impl FnOnce() -> Result<usize>) -> JobReport {
    let started = Instant::now();
    match job() {
        Ok(affected) => {
            let elapsed_ms = started.elapsed().as_millis() as u64;
            tracing::info!(job = name, affected, elapsed_ms, "job done");
            JobReport {
                name,
                kind,
                affected,
                error: None,
            }
        }
        Err(e) => {
            tracing::error!(job = name, "job failed: {e}");
            JobReport {
                name,
                kind,
                affected: 0,
                error: Some(e.to_string()),
            }
        }
    }
}

/// Run every job in order on the calling thread.
pub fn run_consistency_check(store: &WordStore) -> CheckSummary {
    let started = Instant::now();
    let mut jobs = Vec::new();

    jobs.push(run_job("deduplicate words", JobKind::Fix, || {
        store.with_conn(deduplicate_words)
    }));
    jobs.push(run_job("reload node sets", JobKind::Maintenance, || store.reload_nodes()));
    jobs.push(run_job("remove invalid end nodes", JobKind::Fix, || {
        remove_invalid_end_nodes(store)
    }));
    jobs.push(run_job("reload node sets", JobKind::Maintenance, || store.reload_nodes()));
    match check_words(store) {
        Ok(reports) => jobs.extend(reports),
        Err(e) => {
            tracing::error!(job = "check words", "job failed: {e}");
            jobs.push(JobReport {
                name: "check words",
                kind: JobKind::Fix,
                affected: 0,
                error: Some(e.to_string()),
            });
        }
    }
    jobs.push(run_job("vacuum", JobKind::Maintenance, || {
        store.with_conn(|conn| {
            conn.execute_batch("VACUUM")?;
            Ok(0)
        })
    }));

    let summary = CheckSummary {
        jobs,
        elapsed_ms: started.elapsed().as_millis() as u64,
    };
    tracing::info!(
        fixes = summary.fix_count(),
        failed = summary.failed().count(),
        elapsed_ms = summary.elapsed_ms,
        "consistency check finished"
    );
    summary
}

/// Run the pipeline on a blocking worker and broadcast [`CheckDone`].
pub fn spawn_consistency_check(
    store: Arc<WordStore>,
    events: broadcast::Sender<EngineEvent>,
) -> JoinHandle<CheckSummary> {
    tokio::spawn(async move {
        let worker = tokio::task::spawn_blocking(move || run_consistency_check(&store));
        let summary = match worker.await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::error!("consistency worker failed: {e}");
                CheckSummary::default()
            }
        };
        let fix_count = summary.fix_count();
        let _ = events.send(EngineEvent::CheckDone(CheckDone {
            summary: summary.clone(),
            fix_count,
        }));
        summary
    })
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

fn deduplicate_words(conn: &Connection) -> Result<usize> {
    let removed = conn.execute(
        "DELETE FROM word_list WHERE seq NOT IN (SELECT MIN(seq) FROM word_list GROUP BY word)",
        [],
    )?;
    Ok(removed)
}

/// Probe for a word that starts with `node` on `axis`.
fn extension_probe(axis: NodeAxis) -> String {
    match axis {
        NodeAxis::Forward => {
            "SELECT EXISTS (SELECT 1 FROM word_list WHERE head_node_forward = ?1)".to_string()
        }
        NodeAxis::Reverse => {
            "SELECT EXISTS (SELECT 1 FROM word_list WHERE head_node_reverse = ?1)".to_string()
        }
        NodeAxis::TwoChar => {
            "SELECT EXISTS (SELECT 1 FROM word_list WHERE head_node_two_char = ?1)".to_string()
        }
        NodeAxis::ThreeChar => format!(
            "SELECT EXISTS (SELECT 1 FROM word_list WHERE head_node_forward = ?1 AND (flags & {}) != 0)",
            WordFlags::IS_THREE_CHAR_WORD.bits()
        ),
    }
}

/// An end node stops being one as soon as any word extends from it.
fn remove_invalid_end_nodes(store: &WordStore) -> Result<usize> {
    store.with_conn(|conn| {
        let mut removed = 0;
        for axis in NodeAxis::ALL {
            let category = NodeCategory::end(axis);
            let probe = extension_probe(axis);
            for node in store.nodes().snapshot(category) {
                let extends: bool = conn
                    .prepare_cached(&probe)?
                    .query_row(params![node], |row| row.get(0))?;
                if extends {
                    tracing::debug!(%category, node = %node, "end node has successors");
                    removed += store.nodes().remove(conn, category, &node)?;
                }
            }
        }
        Ok(removed)
    })
}

struct StoredWord {
    seq: i64,
    word: String,
    forward: String,
    reverse: String,
    two_char: String,
    choseong: String,
    flags: WordFlags,
}

/// Corrections for one row; empty fields are already correct.
#[derive(Default)]
struct WordFix {
    delete: bool,
    forward: Option<String>,
    reverse: Option<String>,
    two_char: Option<String>,
    choseong: Option<String>,
    flags: Option<WordFlags>,
}

impl WordFix {
    fn is_empty(&self) -> bool {
        !self.delete
            && self.forward.is_none()
            && self.reverse.is_none()
            && self.two_char.is_none()
            && self.choseong.is_none()
            && self.flags.is_none()
    }
}

fn differs(stored: &str, expected: String) -> Option<String> {
    (stored != expected).then_some(expected)
}

fn expected_fix(store: &WordStore, row: &StoredWord) -> WordFix {
    if validate_word(&row.word).is_err() {
        return WordFix {
            delete: true,
            ..WordFix::default()
        };
    }
    let (Ok(heads), Ok(flags)) = (
        head_nodes(&row.word),
        store.calculator().recompute(&row.word, row.flags, store.nodes()),
    ) else {
        return WordFix {
            delete: true,
            ..WordFix::default()
        };
    };
    WordFix {
        delete: false,
        forward: differs(&row.forward, heads.forward),
        reverse: differs(&row.reverse, heads.reverse),
        two_char: differs(&row.two_char, heads.two_char),
        choseong: differs(&row.choseong, choseong(&row.word)),
        flags: (row.flags != flags).then_some(flags),
    }
}

fn load_words(conn: &Connection) -> Result<Vec<StoredWord>> {
    let mut stmt = conn.prepare(
        "SELECT seq, word, head_node_forward, head_node_reverse, head_node_two_char, choseong, flags \
         FROM word_list",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(StoredWord {
            seq: row.get(0)?,
            word: row.get(1)?,
            forward: row.get(2)?,
            reverse: row.get(3)?,
            two_char: row.get(4)?,
            choseong: row.get(5)?,
            flags: WordFlags::from_bits_truncate(row.get(6)?),
        })
    })?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Into::into)
}

/// Per-word check. Expected values are computed in parallel, corrections
/// applied in one transaction. Reports one entry per sub-check.
fn check_words(store: &WordStore) -> Result<Vec<JobReport>> {
    let started = Instant::now();
    let rows = store.with_conn(load_words)?;

    let fixes: Vec<(i64, WordFix)> = rows
        .par_iter()
        .map(|row| (row.seq, expected_fix(store, row)))
        .filter(|(_, fix)| !fix.is_empty())
        .collect();

    let mut invalid = 0;
    let mut forward = 0;
    let mut reverse = 0;
    let mut two_char = 0;
    let mut cho = 0;
    let mut flags = 0;

    store.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;
        {
            let mut delete = tx.prepare_cached("DELETE FROM word_list WHERE seq = ?1")?;
            let mut set_forward =
                tx.prepare_cached("UPDATE word_list SET head_node_forward = ?1 WHERE seq = ?2")?;
            let mut set_reverse =
                tx.prepare_cached("UPDATE word_list SET head_node_reverse = ?1 WHERE seq = ?2")?;
            let mut set_two_char =
                tx.prepare_cached("UPDATE word_list SET head_node_two_char = ?1 WHERE seq = ?2")?;
            let mut set_choseong =
                tx.prepare_cached("UPDATE word_list SET choseong = ?1 WHERE seq = ?2")?;
            let mut set_flags = tx.prepare_cached("UPDATE word_list SET flags = ?1 WHERE seq = ?2")?;

            for (seq, fix) in &fixes {
                if fix.delete {
                    invalid += delete.execute(params![seq])?;
                    continue;
                }
                if let Some(value) = &fix.forward {
                    forward += set_forward.execute(params![value, seq])?;
                }
                if let Some(value) = &fix.reverse {
                    reverse += set_reverse.execute(params![value, seq])?;
                }
                if let Some(value) = &fix.two_char {
                    two_char += set_two_char.execute(params![value, seq])?;
                }
                if let Some(value) = &fix.choseong {
                    cho += set_choseong.execute(params![value, seq])?;
                }
                if let Some(value) = fix.flags {
                    flags += set_flags.execute(params![value.bits(), seq])?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    })?;

    tracing::info!(
        checked = rows.len(),
        corrected = fixes.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "word check done"
    );

    let report = |name, affected| JobReport {
        name,
        kind: JobKind::Fix,
        affected,
        error: None,
    };
    Ok(vec![
        report("remove invalid words", invalid),
        report("fix forward nodes", forward),
        report("fix reverse nodes", reverse),
        report("fix two-char nodes", two_char),
        report("fix choseong", cho),
        report("fix flags", flags),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn setup() -> WordStore {
        WordStore::open_in_memory().unwrap()
    }

    fn raw_insert(store: &WordStore, word: &str, forward: &str, flags: WordFlags) {
        store
            .with_conn(|conn| {
                conn.execute(
                    "INSERT INTO word_list (word, head_node_forward, flags) VALUES (?1, ?2, ?3)",
                    params![word, forward, flags.bits()],
                )?;
                Ok(())
            })
            .unwrap();
    }

    fn affected(summary: &CheckSummary, name: &str) -> usize {
        summary.job(name).map(|j| j.affected).unwrap_or(0)
    }

    #[test]
    fn clean_store_needs_no_fixes() {
        let store = setup();
        store.add_words([("가방", WordFlags::NONE), ("사과나무", WordFlags::NONE)]).unwrap();
        let summary = run_consistency_check(&store);
        assert_eq!(summary.fix_count(), 0);
        assert_eq!(summary.failed().count(), 0);
    }

    #[test]
    fn duplicates_keep_lowest_seq() {
        let store = setup();
        store.add_word("가방", WordFlags::NONE).unwrap();
        raw_insert(&store, "가방", "가", WordFlags::NONE);
        let summary = run_consistency_check(&store);
        assert_eq!(affected(&summary, "deduplicate words"), 1);
        assert_eq!(store.word_count().unwrap(), 1);
        assert_eq!(store.get_word("가방").unwrap().unwrap().seq, 1);
    }

    #[test]
    fn end_node_with_successor_is_removed() {
        let store = setup();
        let end = NodeCategory::end(NodeAxis::Forward);
        store.add_node(end, "늄").unwrap();
        store.add_word("알루미늄", WordFlags::NONE).unwrap();
        store.add_word("늄늄", WordFlags::NONE).unwrap();

        let summary = run_consistency_check(&store);
        assert_eq!(affected(&summary, "remove invalid end nodes"), 1);
        assert!(!store.nodes().contains(end, "늄"));
        // Flags are recomputed against the reloaded sets.
        let entry = store.get_word("알루미늄").unwrap().unwrap();
        assert!(!entry.flags.contains(WordFlags::END_WORD));
        assert!(affected(&summary, "fix flags") >= 1);
    }

    #[test]
    fn three_char_end_node_only_counts_three_char_words() {
        let store = setup();
        let end = NodeCategory::end(NodeAxis::ThreeChar);
        store.add_node(end, "따").unwrap();
        store.add_word("따라가다", WordFlags::NONE).unwrap();
        run_consistency_check(&store);
        assert!(store.nodes().contains(end, "따"));

        store.add_word("따오기", WordFlags::NONE).unwrap();
        run_consistency_check(&store);
        assert!(!store.nodes().contains(end, "따"));
    }

    #[test]
    fn drifted_columns_are_fixed() {
        let store = setup();
        raw_insert(&store, "사과나무", "x", WordFlags::LOAN_WORD | WordFlags::END_WORD);
        let summary = run_consistency_check(&store);

        let entry = store.get_word("사과나무").unwrap().unwrap();
        assert_eq!(entry.head_node_forward, "사");
        assert_eq!(entry.head_node_reverse, "무");
        assert_eq!(entry.head_node_two_char, "사과");
        assert_eq!(entry.choseong, "ㅅㄱㄴㅁ");
        assert!(entry.flags.contains(WordFlags::LOAN_WORD | WordFlags::KOREAN));
        assert!(!entry.flags.contains(WordFlags::END_WORD));

        assert_eq!(affected(&summary, "fix forward nodes"), 1);
        assert_eq!(affected(&summary, "fix reverse nodes"), 1);
        assert_eq!(affected(&summary, "fix two-char nodes"), 1);
        assert_eq!(affected(&summary, "fix choseong"), 1);
        assert_eq!(affected(&summary, "fix flags"), 1);
    }

    #[test]
    fn invalid_words_are_deleted() {
        let store = setup();
        raw_insert(&store, "", "", WordFlags::NONE);
        raw_insert(&store, "가 방", "가", WordFlags::NONE);
        let summary = run_consistency_check(&store);
        assert_eq!(affected(&summary, "remove invalid words"), 2);
        assert_eq!(store.word_count().unwrap(), 0);
    }

    #[test]
    fn failing_job_does_not_stop_the_pipeline() {
        let store = setup();
        raw_insert(&store, "가방", "x", WordFlags::NONE);
        store
            .with_conn(|conn| Ok(conn.execute_batch("DROP TABLE end_node_reverse")?))
            .unwrap();

        let summary = run_consistency_check(&store);
        assert!(summary.failed().count() >= 1);
        assert_eq!(affected(&summary, "fix forward nodes"), 1);
        assert!(summary.job("vacuum").is_some());
    }

    #[tokio::test]
    async fn spawned_check_broadcasts_done() {
        let store = Arc::new(setup());
        raw_insert(&store, "가방", "x", WordFlags::NONE);
        let (tx, mut rx) = broadcast::channel(4);
        let summary = spawn_consistency_check(store, tx).await.unwrap();
        assert!(summary.fix_count() >= 1);
        match rx.recv().await.unwrap() {
            EngineEvent::CheckDone(done) => assert_eq!(done.fix_count, summary.fix_count()),
            other => panic!("unexpected event {other:?}"),
        }
    }
}
