//! Mode-specific ranked candidate queries.
//!
//! A query selects every word whose head column equals the requested node
//! (or its initial-sound-law substitute), applies the per-turn flag
//! exclusions, and orders by the ranking expression plus word length. The
//! ranking expression itself comes from a [`RankingFunctionProvider`], so
//! the same builder serves both the native and the pure-SQL backends.

use rusqlite::types::Value;
use rusqlite::{Connection, ToSql};

use crate::db::ranking::{MissionTierWeights, RankingContext, RankingFunctionProvider, TierWeights};
use crate::error::{Error, Result};
use crate::types::{GameMode, PathFlags, WordCondition, WordFlags, WordPreference};

/// Row cap of every candidate query.
pub const MAX_RESULTS: usize = 128;

/// SQL text plus its named parameters, ready to run.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedQuery {
    pub sql: String,
    pub params: Vec<(&'static str, Value)>,
}

/// One candidate row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateRow {
    pub word: String,
    pub flags: WordFlags,
}

/// Build the candidate query for `mode` with explicit End/Attack flags.
///
/// # Errors
///
/// [`Error::InvalidArgument`] for free-form modes, which have no query, and
/// for an empty node in a mode with a tail filter.
#[allow(clippy::too_many_arguments)]
pub fn build_query(
    mode: GameMode,
    condition: &WordCondition,
    end_flag: WordFlags,
    attack_flag: WordFlags,
    preference: &WordPreference,
    path_flags: PathFlags,
    provider: &dyn RankingFunctionProvider,
) -> Result<PreparedQuery> {
    if mode.is_free_form() {
        return Err(Error::invalid(format!("mode `{mode}` has no candidate query")));
    }

    let mut clauses: Vec<String> = Vec::new();
    let mut params: Vec<(&'static str, Value)> = Vec::new();

    // -- Tail filter --------------------------------------------------------
    if let Some(column) = mode.index_column() {
        if condition.node.is_empty() {
            return Err(Error::invalid(format!("mode `{mode}` needs a non-empty node")));
        }
        params.push((":node", Value::Text(condition.node.clone())));
        match condition.sub_node.as_deref().filter(|s| !s.is_empty()) {
            Some(sub) => {
                clauses.push(format!("({column} = :node OR {column} = :sub)"));
                params.push((":sub", Value::Text(sub.to_string())));
            }
            None => clauses.push(format!("{column} = :node")),
        }
    }

    // -- Flag exclusions ----------------------------------------------------
    if !path_flags.contains(PathFlags::USE_END_WORD) {
        clauses.push(format!("(flags & {}) = 0", end_flag.bits()));
    }
    if !path_flags.contains(PathFlags::USE_ATTACK_WORD) {
        clauses.push(format!("(flags & {}) = 0", attack_flag.bits()));
    }
    if mode == GameMode::ThreeChar {
        let bit = WordFlags::IS_THREE_CHAR_WORD.bits();
        clauses.push(format!("(flags & {bit}) != 0"));
    }

    // -- Ranking ------------------------------------------------------------
    let with_mission = condition.mission_char.is_some();
    if let Some(mission) = condition.mission_char {
        params.push((":mission", Value::Text(mission.to_string())));
    }
    let ctx = RankingContext {
        end_flag: i64::from(end_flag.bits()),
        attack_flag: i64::from(attack_flag.bits()),
        weights: TierWeights::from_preference(preference),
        mission_weights: MissionTierWeights::from_preference(preference),
        with_mission,
    };
    let rank = provider.priority_expr(&ctx);

    let mut sql = String::from("SELECT word, flags FROM word_list");
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(&format!(
        " ORDER BY ({rank}) + LENGTH(word) DESC, seq ASC LIMIT {MAX_RESULTS}"
    ));

    Ok(PreparedQuery { sql, params })
}

/// [`build_query`] with the End/Attack flags of the mode's own axis.
pub fn build_mode_query(
    mode: GameMode,
    condition: &WordCondition,
    preference: &WordPreference,
    path_flags: PathFlags,
    provider: &dyn RankingFunctionProvider,
) -> Result<PreparedQuery> {
    let (end_flag, attack_flag) = mode.axis_flags();
    build_query(mode, condition, end_flag, attack_flag, preference, path_flags, provider)
}

impl PreparedQuery {
    /// Run against `conn`. Failures carry the SQL text.
    pub fn execute(&self, conn: &Connection) -> Result<Vec<CandidateRow>> {
        self.run(conn).map_err(|source| Error::Query {
            sql: self.sql.clone(),
            source,
        })
    }

    fn run(&self, conn: &Connection) -> rusqlite::Result<Vec<CandidateRow>> {
        let bound: Vec<(&str, &dyn ToSql)> = self
            .params
            .iter()
            .map(|(name, value)| (*name, value as &dyn ToSql))
            .collect();
        let mut stmt = conn.prepare_cached(&self.sql)?;
        let rows = stmt.query_map(bound.as_slice(), |row| {
            Ok(CandidateRow {
                word: row.get(0)?,
                flags: WordFlags::from_bits_truncate(row.get(1)?),
            })
        })?;
        rows.collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ranking::{InlineSqlRanking, NativeRanking};
    use crate::db::schema::initialize_database;
    use crate::graph::node::{choseong, head_nodes};
    use pretty_assertions::assert_eq;

    fn setup() -> Connection {
        initialize_database(":memory:").expect("schema init should succeed")
    }

    fn insert(conn: &Connection, word: &str, flags: WordFlags) {
        let nodes = head_nodes(word).unwrap();
        conn.execute(
            "INSERT INTO word_list (word, head_node_forward, head_node_reverse, \
             head_node_two_char, choseong, flags) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                word,
                nodes.forward,
                nodes.reverse,
                nodes.two_char,
                choseong(word),
                flags.bits()
            ],
        )
        .unwrap();
    }

    fn words(rows: Vec<CandidateRow>) -> Vec<String> {
        rows.into_iter().map(|r| r.word).collect()
    }

    #[test]
    fn free_modes_have_no_query() {
        for mode in [GameMode::Free, GameMode::Typing] {
            let err = build_mode_query(
                mode,
                &WordCondition::new("가"),
                &WordPreference::default(),
                PathFlags::default(),
                &NativeRanking,
            )
            .unwrap_err();
            assert!(matches!(err, Error::InvalidArgument(_)));
        }
    }

    #[test]
    fn empty_node_is_rejected_for_indexed_modes() {
        let err = build_mode_query(
            GameMode::Forward,
            &WordCondition::new(""),
            &WordPreference::default(),
            PathFlags::default(),
            &NativeRanking,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn sql_shape_for_forward_with_substitute() {
        let query = build_mode_query(
            GameMode::Forward,
            &WordCondition::new("료").with_sub("요"),
            &WordPreference::default(),
            PathFlags::USE_ATTACK_WORD,
            &NativeRanking,
        )
        .unwrap();
        assert!(query
            .sql
            .contains("(head_node_forward = :node OR head_node_forward = :sub)"));
        assert!(query.sql.contains("(flags & 1) = 0"));
        assert!(!query.sql.contains("(flags & 2) = 0"));
        assert!(query.sql.ends_with("LIMIT 128"));
        assert_eq!(query.params.len(), 2);
    }

    #[test]
    fn all_mode_has_no_tail_filter() {
        let query = build_mode_query(
            GameMode::All,
            &WordCondition::default(),
            &WordPreference::default(),
            PathFlags::default(),
            &NativeRanking,
        )
        .unwrap();
        assert!(!query.sql.contains("WHERE"));
        assert!(query.params.is_empty());
    }

    #[test]
    fn forward_query_matches_node_or_substitute() {
        let conn = setup();
        insert(&conn, "요리", WordFlags::NONE);
        insert(&conn, "료칸", WordFlags::NONE);
        insert(&conn, "가방", WordFlags::NONE);

        let query = build_mode_query(
            GameMode::Forward,
            &WordCondition::new("료").with_sub("요"),
            &WordPreference::default(),
            PathFlags::default(),
            &NativeRanking,
        )
        .unwrap();
        let mut found = words(query.execute(&conn).unwrap());
        found.sort();
        assert_eq!(found, vec!["료칸", "요리"]);
    }

    #[test]
    fn end_words_rank_first_then_length() {
        let conn = setup();
        insert(&conn, "가나다라마", WordFlags::NONE);
        insert(&conn, "가방", WordFlags::END_WORD);
        insert(&conn, "가위", WordFlags::ATTACK_WORD);

        for provider in [&NativeRanking as &dyn RankingFunctionProvider, &InlineSqlRanking] {
            let query = build_mode_query(
                GameMode::Forward,
                &WordCondition::new("가"),
                &WordPreference::default(),
                PathFlags::default(),
                provider,
            )
            .unwrap();
            assert_eq!(
                words(query.execute(&conn).unwrap()),
                vec!["가방", "가위", "가나다라마"],
                "provider {}",
                provider.name()
            );
        }
    }

    #[test]
    fn excluded_flags_are_filtered() {
        let conn = setup();
        insert(&conn, "가방", WordFlags::END_WORD);
        insert(&conn, "가위", WordFlags::ATTACK_WORD);
        insert(&conn, "가지", WordFlags::NONE);

        let query = build_mode_query(
            GameMode::Forward,
            &WordCondition::new("가"),
            &WordPreference::default(),
            PathFlags::NONE,
            &NativeRanking,
        )
        .unwrap();
        assert_eq!(words(query.execute(&conn).unwrap()), vec!["가지"]);
    }

    #[test]
    fn three_char_mode_requires_three_char_words() {
        let conn = setup();
        insert(&conn, "쿵쿵따", WordFlags::IS_THREE_CHAR_WORD);
        insert(&conn, "쿵쿵", WordFlags::IS_TWO_CHAR_WORD);

        let query = build_mode_query(
            GameMode::ThreeChar,
            &WordCondition::new("쿵"),
            &WordPreference::default(),
            PathFlags::default(),
            &NativeRanking,
        )
        .unwrap();
        assert_eq!(words(query.execute(&conn).unwrap()), vec!["쿵쿵따"]);
    }

    #[test]
    fn mission_occurrence_breaks_ties_within_tier() {
        let conn = setup();
        insert(&conn, "사과", WordFlags::NONE);
        insert(&conn, "사사", WordFlags::NONE);
        insert(&conn, "사람", WordFlags::NONE);

        for provider in [&NativeRanking as &dyn RankingFunctionProvider, &InlineSqlRanking] {
            let query = build_mode_query(
                GameMode::Forward,
                &WordCondition::new("사").with_mission('사'),
                &WordPreference::default(),
                PathFlags::default(),
                provider,
            )
            .unwrap();
            let found = words(query.execute(&conn).unwrap());
            // Every candidate carries the mission character; the doubled one wins.
            assert_eq!(found[0], "사사", "provider {}", provider.name());
            assert_eq!(found.len(), 3);
        }
    }

    #[test]
    fn execution_failure_carries_sql() {
        let conn = Connection::open_in_memory().unwrap();
        let query = build_mode_query(
            GameMode::Forward,
            &WordCondition::new("가"),
            &WordPreference::default(),
            PathFlags::default(),
            &InlineSqlRanking,
        )
        .unwrap();
        match query.execute(&conn) {
            Err(Error::Query { sql, .. }) => assert_eq!(sql, query.sql),
            other => panic!("expected a query error, got {other:?}"),
        }
    }

    #[test]
    fn row_cap_is_applied() {
        let conn = setup();
        for i in 0..(MAX_RESULTS + 10) {
            insert(&conn, &format!("가{i}"), WordFlags::NONE);
        }
        let query = build_mode_query(
            GameMode::Forward,
            &WordCondition::new("가"),
            &WordPreference::default(),
            PathFlags::default(),
            &NativeRanking,
        )
        .unwrap();
        assert_eq!(query.execute(&conn).unwrap().len(), MAX_RESULTS);
    }
}
