//! The engine facade: one store, one finder, one event channel.
//!
//! Searches and consistency checks run in the background and report on the
//! broadcast channel returned by [`Engine::subscribe`]; word and node edits
//! are synchronous.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::{resolve_database_path, EngineConfig};
use crate::db::ranking::provider_for;
use crate::error::{Error, Result};
use crate::graph::consistency::{spawn_consistency_check, CheckDone, CheckSummary};
use crate::graph::finder::{ExclusionSets, FinderState, PathFinder};
use crate::graph::flags::WordFlagsCalculator;
use crate::graph::store::WordStore;
use crate::observability::SearchMetrics;
use crate::types::{GameMode, NodeCategory, PathFlags, PathUpdated, WordCondition, WordFlags, WordPreference};

const EVENT_CAPACITY: usize = 64;

/// Everything the engine reports asynchronously.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    PathUpdated(PathUpdated),
    CheckDone(CheckDone),
    /// The database could not be opened or migrated.
    ConnectionError(String),
}

pub struct Engine {
    store: Arc<WordStore>,
    finder: PathFinder,
    events: broadcast::Sender<EngineEvent>,
    metrics: Arc<SearchMetrics>,
    config: EngineConfig,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("store", &self.store)
            .field("finder", &self.finder)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Open the database named by `config` with a fresh event channel.
    pub fn open(config: EngineConfig, exclusions: Arc<dyn ExclusionSets>) -> Result<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self::open_with_events(config, exclusions, events)
    }

    /// Open using an existing channel. A failure to open is also sent as
    /// [`EngineEvent::ConnectionError`].
    pub fn open_with_events(
        config: EngineConfig,
        exclusions: Arc<dyn ExclusionSets>,
        events: broadcast::Sender<EngineEvent>,
    ) -> Result<Self> {
        match Self::open_store(&config) {
            Ok(store) => {
                let store = Arc::new(store);
                let finder = PathFinder::new(store.clone(), exclusions, events.clone())
                    .with_random_word_count(config.search.random_word_count);
                Ok(Self {
                    store,
                    finder,
                    events,
                    metrics: Arc::new(SearchMetrics::new()),
                    config,
                })
            }
            Err(e) => {
                tracing::error!("cannot open word database: {e}");
                let _ = events.send(EngineEvent::ConnectionError(e.to_string()));
                Err(match e {
                    Error::Connection(_) => e,
                    other => Error::Connection(other.to_string()),
                })
            }
        }
    }

    fn open_store(config: &EngineConfig) -> Result<WordStore> {
        let path = resolve_database_path(config)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let ranking = provider_for(&config.ranking)
            .ok_or_else(|| Error::Config(format!("unknown ranking backend `{}`", config.ranking)))?;
        let calculator = WordFlagsCalculator::new(config.search.matcher_budget())?;
        WordStore::open(&path.to_string_lossy(), calculator, ranking)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn store(&self) -> &Arc<WordStore> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn metrics(&self) -> &SearchMetrics {
        &self.metrics
    }

    pub fn state(&self) -> FinderState {
        self.finder.state()
    }

    // -------------------------------------------------------------------
    // Searches
    // -------------------------------------------------------------------

    /// Start a search. The outcome is broadcast as
    /// [`EngineEvent::PathUpdated`] and returned through the handle.
    pub fn find_path(
        &self,
        mode: GameMode,
        condition: WordCondition,
        preference: WordPreference,
        flags: PathFlags,
    ) -> JoinHandle<PathUpdated> {
        let fallback = condition.clone();
        let search = self.finder.find_path(mode, condition, preference, flags);
        let metrics = self.metrics.clone();
        tokio::spawn(async move {
            let update = match search.await {
                Ok(update) => update,
                Err(e) => {
                    tracing::error!(%mode, "search task failed: {e}");
                    PathUpdated::error(mode, fallback)
                }
            };
            metrics.record(&update);
            update
        })
    }

    /// [`Engine::find_path`] with the configured preference and switches.
    pub fn find_path_with_defaults(
        &self,
        mode: GameMode,
        condition: WordCondition,
    ) -> JoinHandle<PathUpdated> {
        let search = &self.config.search;
        self.find_path(mode, condition, search.preference.clone(), search.path_flags())
    }

    /// Start the consistency pipeline. Completion is broadcast as
    /// [`EngineEvent::CheckDone`]. Callers must not overlap runs.
    pub fn run_consistency_check(&self) -> JoinHandle<CheckSummary> {
        spawn_consistency_check(self.store.clone(), self.events.clone())
    }

    // -------------------------------------------------------------------
    // Edits
    // -------------------------------------------------------------------

    pub fn add_word(&self, word: &str, flags: WordFlags) -> Result<bool> {
        self.store.add_word(word, flags)
    }

    pub fn delete_word(&self, word: &str) -> Result<usize> {
        self.store.delete_word(word)
    }

    pub fn reclassify_word(&self, word: &str, curated: WordFlags) -> Result<bool> {
        self.store.reclassify_word(word, curated)
    }

    pub fn add_node(&self, category: NodeCategory, node: &str) -> Result<bool> {
        self.store.add_node(category, node)
    }

    pub fn remove_node(&self, category: NodeCategory, node: &str) -> Result<usize> {
        self.store.remove_node(category, node)
    }
}
