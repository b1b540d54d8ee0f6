//! End-to-end tests for the wordchain engine.
//!
//! These tests build real SQLite stores (in memory or in temp directories),
//! populate words and node sets through the public API, and verify search,
//! ranking and consistency behavior.

use std::path::PathBuf;
use std::sync::Arc;

use pretty_assertions::assert_eq as pa_eq;
use tokio::sync::broadcast;

use wordchain::config::EngineConfig;
use wordchain::db::ranking::{InlineSqlRanking, NativeRanking, RankingFunctionProvider};
use wordchain::graph::consistency::run_consistency_check;
use wordchain::graph::finder::{InMemoryExclusions, PathFinder};
use wordchain::graph::flags::{WordFlagsCalculator, DEFAULT_MATCH_BUDGET};
use wordchain::graph::store::WordStore;
use wordchain::types::{
    GameMode, NodeAxis, NodeCategory, PathFindResultType, PathFlags, PathObject, PathUpdated,
    WordCategories, WordCondition, WordFlags, WordPreference,
};
use wordchain::{Engine, EngineEvent};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn store_with(ranking: Box<dyn RankingFunctionProvider>) -> Arc<WordStore> {
    let calculator = WordFlagsCalculator::new(DEFAULT_MATCH_BUDGET).unwrap();
    Arc::new(WordStore::open(":memory:", calculator, ranking).unwrap())
}

fn finder_for(store: &Arc<WordStore>) -> (PathFinder, Arc<InMemoryExclusions>) {
    let exclusions = Arc::new(InMemoryExclusions::new());
    let (tx, _rx) = broadcast::channel(16);
    (PathFinder::new(store.clone(), exclusions.clone(), tx), exclusions)
}

fn contents(objects: &[PathObject]) -> Vec<&str> {
    objects.iter().map(|o| o.content.as_str()).collect()
}

fn search(finder: &PathFinder, mode: GameMode, condition: WordCondition) -> PathUpdated {
    finder.search(mode, &condition, &WordPreference::default(), PathFlags::default())
}

/// A small dictionary with End and Attack nodes on the forward axis.
fn populate(store: &WordStore) {
    store
        .add_node(NodeCategory::end(NodeAxis::Forward), "늄")
        .unwrap();
    store
        .add_node(NodeCategory::attack(NodeAxis::Forward), "릇")
        .unwrap();
    store
        .add_words(
            [
                "가방", "가위", "가나다라", "가그릇", "가리늄", "방울", "사과", "바사삭",
                "사랑", "사다리", "역사", "낙엽", "늄가", "그릇",
            ]
            .into_iter()
            .map(|w| (w, WordFlags::NONE)),
        )
        .unwrap();
}

// ===========================================================================
// 1. Scenario coverage
// ===========================================================================

#[test]
fn single_word_is_found_through_its_head() {
    let store = store_with(Box::new(NativeRanking));
    store.add_word("가방", WordFlags::NONE).unwrap();
    let (finder, _) = finder_for(&store);

    let update = search(&finder, GameMode::Forward, WordCondition::new("가"));
    pa_eq!(update.result, PathFindResultType::Found);
    pa_eq!(contents(&update.found), vec!["가방"]);
    pa_eq!(contents(&update.filtered), vec!["가방"]);
}

#[test]
fn proven_dead_end_issues_no_query() {
    let store = store_with(Box::new(NativeRanking));
    store
        .add_node(NodeCategory::end(NodeAxis::Forward), "가")
        .unwrap();
    // Without the word table any query would fail with an Error result.
    store
        .with_conn(|conn| {
            conn.execute_batch("DROP TABLE word_list")?;
            Ok(())
        })
        .unwrap();
    let (finder, _) = finder_for(&store);

    let update = search(&finder, GameMode::Forward, WordCondition::new("가"));
    pa_eq!(update.result, PathFindResultType::EndWord);
    assert!(update.found.is_empty());
}

#[test]
fn dead_end_is_bypassed_by_a_live_substitute() {
    let store = store_with(Box::new(NativeRanking));
    store
        .add_node(NodeCategory::end(NodeAxis::Forward), "력")
        .unwrap();
    store.add_word("역사", WordFlags::NONE).unwrap();
    let (finder, _) = finder_for(&store);

    let update = search(
        &finder,
        GameMode::Forward,
        WordCondition::new("력").with_sub("역"),
    );
    pa_eq!(update.result, PathFindResultType::Found);
    pa_eq!(contents(&update.found), vec!["역사"]);
}

#[test]
fn mission_tier_dominates_occurrence_count() {
    let store = store_with(Box::new(NativeRanking));
    store
        .add_node(NodeCategory::attack(NodeAxis::Forward), "삭")
        .unwrap();
    store.add_word("사과", WordFlags::NONE).unwrap();
    store.add_word("사사삭", WordFlags::NONE).unwrap();
    let (finder, _) = finder_for(&store);

    let preference = WordPreference(vec![
        WordCategories::MISSION,
        WordCategories::ATTACK | WordCategories::MISSION,
        WordCategories::ATTACK,
        WordCategories::END | WordCategories::MISSION,
        WordCategories::END,
        WordCategories::NONE,
    ]);
    let update = finder.search(
        GameMode::All,
        &WordCondition::new("").with_mission('사'),
        &preference,
        PathFlags::default(),
    );
    pa_eq!(update.result, PathFindResultType::Found);
    // The higher tier wins even though the second word has more mission characters.
    pa_eq!(contents(&update.found), vec!["사과", "사사삭"]);
    pa_eq!(update.found[0].mission_char_count, 1);
    pa_eq!(update.found[0].categories, WordCategories::MISSION);
    pa_eq!(
        update.found[1].categories,
        WordCategories::ATTACK | WordCategories::MISSION
    );
    pa_eq!(update.found[1].mission_char_count, 2);
}

#[test]
fn duplicate_rows_collapse_to_one() {
    let store = store_with(Box::new(NativeRanking));
    store
        .with_conn(|conn| {
            for _ in 0..2 {
                conn.execute(
                    "INSERT INTO word_list (word, head_node_forward, head_node_reverse) \
                     VALUES ('하늘', '하', '늘')",
                    [],
                )?;
            }
            Ok(())
        })
        .unwrap();
    pa_eq!(store.word_count().unwrap(), 2);

    let summary = run_consistency_check(&store);
    pa_eq!(summary.job("deduplicate words").map(|j| j.affected), Some(1));
    pa_eq!(store.word_count().unwrap(), 1);
    assert!(summary.failed().next().is_none());
}

// ===========================================================================
// 2. Edits flow through to searches
// ===========================================================================

#[test]
fn added_word_is_immediately_searchable() {
    let store = store_with(Box::new(NativeRanking));
    let (finder, _) = finder_for(&store);
    pa_eq!(
        search(&finder, GameMode::Forward, WordCondition::new("나")).result,
        PathFindResultType::NotFound
    );

    assert!(store.add_word("나무", WordFlags::NONE).unwrap());
    let update = search(&finder, GameMode::Forward, WordCondition::new("나"));
    pa_eq!(contents(&update.found), vec!["나무"]);

    pa_eq!(store.delete_word("나무").unwrap(), 1);
    let update = search(&finder, GameMode::Forward, WordCondition::new("나"));
    pa_eq!(update.result, PathFindResultType::NotFound);
}

#[test]
fn node_change_reclassifies_existing_words() {
    let store = store_with(Box::new(NativeRanking));
    store.add_word("가방", WordFlags::NONE).unwrap();
    let (finder, _) = finder_for(&store);

    let before = search(&finder, GameMode::Forward, WordCondition::new("가"));
    pa_eq!(before.found[0].categories, WordCategories::NONE);

    store
        .add_node(NodeCategory::end(NodeAxis::Forward), "방")
        .unwrap();
    let after = search(&finder, GameMode::Forward, WordCondition::new("가"));
    pa_eq!(after.found[0].categories, WordCategories::END);

    store
        .remove_node(NodeCategory::end(NodeAxis::Forward), "방")
        .unwrap();
    let reverted = search(&finder, GameMode::Forward, WordCondition::new("가"));
    pa_eq!(reverted.found[0].categories, WordCategories::NONE);
}

#[test]
fn used_and_unsupported_words_are_filtered_but_still_found() {
    let store = store_with(Box::new(NativeRanking));
    populate(&store);
    let (finder, exclusions) = finder_for(&store);
    exclusions.mark_used("가방");
    exclusions.mark_unsupported("가위");

    let update = search(&finder, GameMode::Forward, WordCondition::new("가"));
    assert!(contents(&update.found).contains(&"가방"));
    assert!(!contents(&update.filtered).contains(&"가방"));
    assert!(!contents(&update.filtered).contains(&"가위"));

    let reuse = finder.search(
        GameMode::Forward,
        &WordCondition::new("가"),
        &WordPreference::default(),
        PathFlags::default() | PathFlags::REUSE_WORDS,
    );
    assert!(contents(&reuse.filtered).contains(&"가방"));
    assert!(!contents(&reuse.filtered).contains(&"가위"));
}

#[test]
fn end_words_rank_first_by_default() {
    let store = store_with(Box::new(NativeRanking));
    populate(&store);
    let (finder, _) = finder_for(&store);

    let update = search(&finder, GameMode::Forward, WordCondition::new("가"));
    pa_eq!(update.found[0].content, "가리늄");
    pa_eq!(update.found[1].content, "가그릇");
}

#[test]
fn free_modes_return_random_words() {
    let store = store_with(Box::new(NativeRanking));
    let (finder, _) = finder_for(&store);
    let update = search(&finder, GameMode::Typing, WordCondition::new("").with_length(3));
    pa_eq!(update.result, PathFindResultType::Found);
    assert!(!update.found.is_empty());
}

// ===========================================================================
// 3. Ranking backends agree
// ===========================================================================

#[test]
fn native_and_inline_ranking_agree() {
    let native = store_with(Box::new(NativeRanking));
    let inline = store_with(Box::new(InlineSqlRanking));
    populate(&native);
    populate(&inline);
    let (native_finder, _) = finder_for(&native);
    let (inline_finder, _) = finder_for(&inline);

    let cases = [
        (GameMode::Forward, WordCondition::new("가")),
        (GameMode::Forward, WordCondition::new("사").with_mission('사')),
        (GameMode::Reverse, WordCondition::new("사")),
        (GameMode::TwoChar, WordCondition::new("가나")),
        (GameMode::Middle, WordCondition::new("그")),
        (GameMode::ThreeChar, WordCondition::new("가")),
        (GameMode::All, WordCondition::new("").with_mission('가')),
    ];
    for (mode, condition) in cases {
        let a = search(&native_finder, mode, condition.clone());
        let b = search(&inline_finder, mode, condition.clone());
        pa_eq!(a.result, b.result, "{mode} {condition:?}");
        pa_eq!(a.found, b.found, "{mode} {condition:?}");
    }
}

// ===========================================================================
// 4. Engine lifecycle
// ===========================================================================

#[tokio::test]
async fn engine_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = EngineConfig::default();
    config.database.path = Some(dir.path().join("nested").join("words.db"));

    {
        let engine = Engine::open(config.clone(), Arc::new(InMemoryExclusions::new())).unwrap();
        engine.add_word("가방", WordFlags::NONE).unwrap();
        engine
            .add_node(NodeCategory::end(NodeAxis::Forward), "방")
            .unwrap();
    }

    let engine = Engine::open(config, Arc::new(InMemoryExclusions::new())).unwrap();
    let mut rx = engine.subscribe();
    let update = engine
        .find_path_with_defaults(GameMode::Forward, WordCondition::new("가"))
        .await
        .unwrap();
    pa_eq!(update.found[0].categories, WordCategories::END);

    match rx.recv().await.unwrap() {
        EngineEvent::PathUpdated(event) => pa_eq!(event.found, update.found),
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn engine_reports_unknown_ranking_backend() {
    let mut config = EngineConfig::default();
    config.database.path = Some(PathBuf::from(":memory:"));
    config.ranking = "nonexistent".into();
    let (tx, mut rx) = broadcast::channel(4);
    let result = Engine::open_with_events(config, Arc::new(InMemoryExclusions::new()), tx);
    assert!(result.is_err());
    assert!(matches!(rx.recv().await.unwrap(), EngineEvent::ConnectionError(_)));
}
