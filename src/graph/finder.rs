//! Path finder: one ranked candidate search per turn.
//!
//! A search runs in this order: free-form modes get random strings, a
//! proven dead-end tail short-circuits to [`PathFindResultType::EndWord`]
//! without touching storage, and everything else runs the ranked query on a
//! blocking worker, classifies the rows, and filters them through the
//! caller's [`ExclusionSets`].

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use rand::Rng;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::db::ranking::mission_char_count;
use crate::engine::EngineEvent;
use crate::graph::node::is_hangul_syllable;
use crate::graph::query::{build_mode_query, CandidateRow};
use crate::graph::store::WordStore;
use crate::types::{
    GameMode, PathFindResultType, PathFlags, PathObject, PathUpdated, WordCategories,
    WordCondition, WordPreference,
};

/// Default number of strings generated for a free-form round.
pub const DEFAULT_RANDOM_WORD_COUNT: usize = 10;

const HANGUL_FIRST: u32 = 0xAC00;
const HANGUL_LAST: u32 = 0xD7A3;

// ---------------------------------------------------------------------------
// Exclusions
// ---------------------------------------------------------------------------

/// Words the current game rules out. Read-only from the finder's side.
pub trait ExclusionSets: Send + Sync {
    /// Already played this game.
    fn is_used(&self, word: &str) -> bool;
    /// Rejected by the game server at some point.
    fn is_unsupported(&self, word: &str) -> bool;
}

/// Exclusion sets kept in memory.
#[derive(Debug, Default)]
pub struct InMemoryExclusions {
    used: RwLock<HashSet<String>>,
    unsupported: RwLock<HashSet<String>>,
}

impl InMemoryExclusions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_used(&self, word: impl Into<String>) {
        self.used
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(word.into());
    }

    pub fn mark_unsupported(&self, word: impl Into<String>) {
        self.unsupported
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(word.into());
    }

    /// Forget the used words, e.g. when a new game starts.
    pub fn clear_used(&self) {
        self.used.write().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl ExclusionSets for InMemoryExclusions {
    fn is_used(&self, word: &str) -> bool {
        self.used
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(word)
    }

    fn is_unsupported(&self, word: &str) -> bool {
        self.unsupported
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(word)
    }
}

// ---------------------------------------------------------------------------
// Finder
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinderState {
    Idle,
    Finding,
}

/// Decrements the in-flight counter when a search task ends.
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Cheap to clone; clones share the store, exclusions, and event channel.
#[derive(Clone)]
pub struct PathFinder {
    store: Arc<WordStore>,
    exclusions: Arc<dyn ExclusionSets>,
    events: broadcast::Sender<EngineEvent>,
    random_word_count: usize,
    in_flight: Arc<AtomicUsize>,
}

impl std::fmt::Debug for PathFinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathFinder")
            .field("state", &self.state())
            .field("random_word_count", &self.random_word_count)
            .finish_non_exhaustive()
    }
}

impl PathFinder {
    pub fn new(
        store: Arc<WordStore>,
        exclusions: Arc<dyn ExclusionSets>,
        events: broadcast::Sender<EngineEvent>,
    ) -> Self {
        Self {
            store,
            exclusions,
            events,
            random_word_count: DEFAULT_RANDOM_WORD_COUNT,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_random_word_count(mut self, count: usize) -> Self {
        self.random_word_count = count;
        self
    }

    pub fn state(&self) -> FinderState {
        if self.in_flight.load(Ordering::SeqCst) > 0 {
            FinderState::Finding
        } else {
            FinderState::Idle
        }
    }

    /// Search on a blocking worker and broadcast the outcome.
    ///
    /// Must be called from within a Tokio runtime. The returned handle
    /// resolves to the same [`PathUpdated`] that is broadcast.
    pub fn find_path(
        &self,
        mode: GameMode,
        condition: WordCondition,
        preference: WordPreference,
        flags: PathFlags,
    ) -> JoinHandle<PathUpdated> {
        let guard = InFlight::enter(&self.in_flight);
        let finder = self.clone();
        tokio::spawn(async move {
            let _guard = guard;
            let worker = finder.clone();
            let fallback = condition.clone();
            let update = match tokio::task::spawn_blocking(move || {
                worker.search(mode, &condition, &preference, flags)
            })
            .await
            {
                Ok(update) => update,
                Err(e) => {
                    tracing::error!(%mode, "path search worker failed: {e}");
                    PathUpdated::error(mode, fallback)
                }
            };
            // No subscribers is fine; the join value still carries the result.
            let _ = finder.events.send(EngineEvent::PathUpdated(update.clone()));
            update
        })
    }

    /// Run one search on the calling thread.
    pub fn search(
        &self,
        mode: GameMode,
        condition: &WordCondition,
        preference: &WordPreference,
        flags: PathFlags,
    ) -> PathUpdated {
        let started = Instant::now();
        let elapsed = || started.elapsed().as_millis() as u64;

        if mode.is_free_form() {
            let words = random_words(condition, self.random_word_count);
            return outcome(
                mode,
                condition.clone(),
                PathFindResultType::Found,
                words.clone(),
                words,
                elapsed(),
            );
        }

        if self.is_dead_end(mode, condition) {
            tracing::debug!(%mode, node = %condition.node, "tail is a dead end");
            return outcome(
                mode,
                condition.clone(),
                PathFindResultType::EndWord,
                Vec::new(),
                Vec::new(),
                elapsed(),
            );
        }

        // Query errors carry the SQL text in their message.
        let rows = build_mode_query(mode, condition, preference, flags, self.store.ranking())
            .and_then(|query| self.store.execute(&query));
        let rows = match rows {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!(%mode, node = %condition.node, "path search failed: {e}");
                return outcome(
                    mode,
                    condition.clone(),
                    PathFindResultType::Error,
                    Vec::new(),
                    Vec::new(),
                    elapsed(),
                );
            }
        };

        let found: Vec<PathObject> = rows
            .into_iter()
            .map(|row| classify(mode, condition.mission_char, row))
            .collect();
        let reuse = flags.contains(PathFlags::REUSE_WORDS);
        let filtered: Vec<PathObject> = found
            .iter()
            .filter(|o| !self.exclusions.is_unsupported(&o.content))
            .filter(|o| reuse || !self.exclusions.is_used(&o.content))
            .cloned()
            .collect();

        let result = if filtered.is_empty() {
            PathFindResultType::NotFound
        } else {
            PathFindResultType::Found
        };
        let update = outcome(mode, condition.clone(), result, found, filtered, elapsed());
        tracing::debug!(
            %mode,
            node = %condition.node,
            found = update.found.len(),
            filtered = update.filtered.len(),
            elapsed_ms = update.elapsed_ms,
            "path search done"
        );
        update
    }

    /// The node (and its substitute, if any) is in the mode's End set.
    fn is_dead_end(&self, mode: GameMode, condition: &WordCondition) -> bool {
        let Some(category) = mode.end_category() else {
            return false;
        };
        let nodes = self.store.nodes();
        nodes.contains(category, &condition.node)
            && condition
                .sub_node
                .as_deref()
                .map_or(true, |sub| nodes.contains(category, sub))
    }
}

fn outcome(
    mode: GameMode,
    condition: WordCondition,
    result: PathFindResultType,
    found: Vec<PathObject>,
    filtered: Vec<PathObject>,
    elapsed_ms: u64,
) -> PathUpdated {
    PathUpdated {
        mode,
        condition,
        result,
        found,
        filtered,
        elapsed_ms,
    }
}

/// Categories of one row relative to the mode's axis. End wins over Attack.
fn classify(mode: GameMode, mission: Option<char>, row: CandidateRow) -> PathObject {
    let (end, attack) = mode.axis_flags();
    let mut categories = WordCategories::NONE;
    if !end.is_empty() && row.flags.intersects(end) {
        categories.insert(WordCategories::END);
    } else if !attack.is_empty() && row.flags.intersects(attack) {
        categories.insert(WordCategories::ATTACK);
    }
    let count = mission.map_or(0, |m| mission_char_count(&row.word, m));
    if count > 0 {
        categories.insert(WordCategories::MISSION);
    }
    PathObject {
        content: row.word,
        categories,
        mission_char_count: count,
    }
}

/// Random answers for free-form rounds, each starting with the node.
fn random_words(condition: &WordCondition, count: usize) -> Vec<PathObject> {
    let prefix: Vec<char> = condition.node.chars().collect();
    let length = condition.word_length.max(prefix.len()).max(1);
    let latin = prefix
        .first()
        .is_some_and(|c| c.is_ascii_alphabetic() && !is_hangul_syllable(*c));

    let mut rng = rand::rng();
    (0..count)
        .map(|_| {
            let mut word: String = prefix.iter().collect();
            for _ in prefix.len()..length {
                let ch = if latin {
                    char::from(rng.random_range(b'a'..=b'z'))
                } else {
                    char::from_u32(rng.random_range(HANGUL_FIRST..=HANGUL_LAST)).unwrap_or('가')
                };
                word.push(ch);
            }
            PathObject {
                content: word,
                categories: WordCategories::NONE,
                mission_char_count: 0,
            }
        })
        .collect()
}
