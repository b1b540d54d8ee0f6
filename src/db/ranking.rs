//! Candidate ranking.
//!
//! A candidate's score is `tier_weight * TIER_SCALE`, plus
//! `occurrence * OCCURRENCE_WEIGHT` when a mission character is active.
//! The query adds `LENGTH(word)` on top. `TIER_SCALE` is larger than the
//! biggest possible occurrence bonus plus word length, so no tie-break can
//! lift a candidate into the next tier.
//!
//! The contract is written once in Rust ([`word_priority`],
//! [`mission_word_priority`]). Each [`RankingFunctionProvider`] renders it
//! for the database: [`NativeRanking`] registers the Rust functions as
//! SQLite scalar functions, [`InlineSqlRanking`] spells the same arithmetic
//! out as a `CASE` expression. Both must agree bit for bit.

use rusqlite::functions::{Context, FunctionFlags};
use rusqlite::Connection;

use crate::error::Result;
use crate::types::{WordCategories, WordPreference, MAX_WORD_LENGTH};

/// Multiplier separating tiers.
pub const TIER_SCALE: i64 = 1 << 17;

/// Same-tier bonus per occurrence of the mission character.
pub const OCCURRENCE_WEIGHT: i64 = 256;

const _: () = assert!(
    TIER_SCALE > OCCURRENCE_WEIGHT * MAX_WORD_LENGTH as i64 + MAX_WORD_LENGTH as i64
);

// ---------------------------------------------------------------------------
// Weights
// ---------------------------------------------------------------------------

/// Tier weights when no mission character is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierWeights {
    pub end: i64,
    pub attack: i64,
    pub normal: i64,
}

impl TierWeights {
    pub fn from_preference(pref: &WordPreference) -> Self {
        let w = |c| pref.weight(c, false) as i64;
        Self {
            end: w(WordCategories::END),
            attack: w(WordCategories::ATTACK),
            normal: w(WordCategories::NONE),
        }
    }
}

/// Tier weights when a mission character is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissionTierWeights {
    pub end_mission: i64,
    pub end: i64,
    pub attack_mission: i64,
    pub attack: i64,
    pub mission: i64,
    pub normal: i64,
}

impl MissionTierWeights {
    pub fn from_preference(pref: &WordPreference) -> Self {
        let w = |c| pref.weight(c, true) as i64;
        Self {
            end_mission: w(WordCategories::END | WordCategories::MISSION),
            end: w(WordCategories::END),
            attack_mission: w(WordCategories::ATTACK | WordCategories::MISSION),
            attack: w(WordCategories::ATTACK),
            mission: w(WordCategories::MISSION),
            normal: w(WordCategories::NONE),
        }
    }
}

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

/// Occurrences of `mission` in `word`, ASCII case-insensitive.
///
/// Matches SQLite's built-in `LOWER`, which only folds ASCII.
pub fn mission_char_count(word: &str, mission: char) -> usize {
    let needle = mission.to_ascii_lowercase();
    word.chars()
        .filter(|c| c.to_ascii_lowercase() == needle)
        .count()
}

/// Score of a candidate without a mission character.
pub fn word_priority(flags: i64, end_flag: i64, attack_flag: i64, weights: &TierWeights) -> i64 {
    let tier = if flags & end_flag != 0 {
        weights.end
    } else if flags & attack_flag != 0 {
        weights.attack
    } else {
        weights.normal
    };
    tier * TIER_SCALE
}

/// Score of a candidate with a mission character.
pub fn mission_word_priority(
    word: &str,
    flags: i64,
    mission: char,
    end_flag: i64,
    attack_flag: i64,
    weights: &MissionTierWeights,
) -> i64 {
    let occurrence = mission_char_count(word, mission) as i64;
    let has_mission = occurrence > 0;
    let tier = if flags & end_flag != 0 {
        if has_mission {
            weights.end_mission
        } else {
            weights.end
        }
    } else if flags & attack_flag != 0 {
        if has_mission {
            weights.attack_mission
        } else {
            weights.attack
        }
    } else if has_mission {
        weights.mission
    } else {
        weights.normal
    };
    tier * TIER_SCALE + occurrence * OCCURRENCE_WEIGHT
}

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

/// Inputs the ranking expression is rendered from.
#[derive(Debug, Clone, Copy)]
pub struct RankingContext {
    pub end_flag: i64,
    pub attack_flag: i64,
    pub weights: TierWeights,
    pub mission_weights: MissionTierWeights,
    /// Whether the query binds a `:mission` parameter.
    pub with_mission: bool,
}

/// Renders the ranking contract as a SQL expression for one backend.
///
/// The expression may reference the `word` and `flags` columns and, when
/// `with_mission` is set, the `:mission` parameter.
pub trait RankingFunctionProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Register whatever the expression depends on. Called at connection open.
    fn install(&self, conn: &Connection) -> Result<()>;

    fn priority_expr(&self, ctx: &RankingContext) -> String;
}

/// Rust scalar functions `WordPriority` and `MissionWordPriority`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeRanking;

fn mission_arg(ctx: &Context<'_>, idx: usize) -> rusqlite::Result<Option<char>> {
    let text: String = ctx.get(idx)?;
    Ok(text.chars().next())
}

impl RankingFunctionProvider for NativeRanking {
    fn name(&self) -> &'static str {
        "native"
    }

    fn install(&self, conn: &Connection) -> Result<()> {
        let flags = FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC;

        // WordPriority(flags, end_flag, attack_flag, w_end, w_attack, w_normal)
        conn.create_scalar_function("WordPriority", 6, flags, |ctx| {
            let weights = TierWeights {
                end: ctx.get(3)?,
                attack: ctx.get(4)?,
                normal: ctx.get(5)?,
            };
            Ok(word_priority(ctx.get(0)?, ctx.get(1)?, ctx.get(2)?, &weights))
        })?;

        // MissionWordPriority(word, flags, mission, end_flag, attack_flag,
        //   w_end_mission, w_end, w_attack_mission, w_attack, w_mission, w_normal)
        conn.create_scalar_function("MissionWordPriority", 11, flags, |ctx| {
            let word: String = ctx.get(0)?;
            let weights = MissionTierWeights {
                end_mission: ctx.get(5)?,
                end: ctx.get(6)?,
                attack_mission: ctx.get(7)?,
                attack: ctx.get(8)?,
                mission: ctx.get(9)?,
                normal: ctx.get(10)?,
            };
            let Some(mission) = mission_arg(ctx, 2)? else {
                let plain = TierWeights {
                    end: weights.end,
                    attack: weights.attack,
                    normal: weights.normal,
                };
                return Ok(word_priority(ctx.get(1)?, ctx.get(3)?, ctx.get(4)?, &plain));
            };
            Ok(mission_word_priority(
                &word,
                ctx.get(1)?,
                mission,
                ctx.get(3)?,
                ctx.get(4)?,
                &weights,
            ))
        })?;
        Ok(())
    }

    fn priority_expr(&self, ctx: &RankingContext) -> String {
        if ctx.with_mission {
            let w = ctx.mission_weights;
            format!(
                "MissionWordPriority(word, flags, :mission, {}, {}, {}, {}, {}, {}, {}, {})",
                ctx.end_flag,
                ctx.attack_flag,
                w.end_mission,
                w.end,
                w.attack_mission,
                w.attack,
                w.mission,
                w.normal
            )
        } else {
            let w = ctx.weights;
            format!(
                "WordPriority(flags, {}, {}, {}, {}, {})",
                ctx.end_flag, ctx.attack_flag, w.end, w.attack, w.normal
            )
        }
    }
}

/// The contract written as a plain SQL expression; needs no registration.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineSqlRanking;

impl RankingFunctionProvider for InlineSqlRanking {
    fn name(&self) -> &'static str {
        "inline"
    }

    fn install(&self, _conn: &Connection) -> Result<()> {
        Ok(())
    }

    fn priority_expr(&self, ctx: &RankingContext) -> String {
        let end = format!("(flags & {}) != 0", ctx.end_flag);
        let attack = format!("(flags & {}) != 0", ctx.attack_flag);
        if ctx.with_mission {
            let w = ctx.mission_weights;
            // A single-character needle makes this an exact character count.
            let occ = "(LENGTH(word) - LENGTH(REPLACE(LOWER(word), LOWER(:mission), '')))";
            format!(
                "((CASE WHEN {end} THEN (CASE WHEN {occ} > 0 THEN {} ELSE {} END) \
                 WHEN {attack} THEN (CASE WHEN {occ} > 0 THEN {} ELSE {} END) \
                 ELSE (CASE WHEN {occ} > 0 THEN {} ELSE {} END) END) * {TIER_SCALE} \
                 + {occ} * {OCCURRENCE_WEIGHT})",
                w.end_mission, w.end, w.attack_mission, w.attack, w.mission, w.normal
            )
        } else {
            let w = ctx.weights;
            format!(
                "((CASE WHEN {end} THEN {} WHEN {attack} THEN {} ELSE {} END) * {TIER_SCALE})",
                w.end, w.attack, w.normal
            )
        }
    }
}

/// Provider for a configured backend name.
pub fn provider_for(name: &str) -> Option<Box<dyn RankingFunctionProvider>> {
    match name.trim().to_lowercase().as_str() {
        "native" => Some(Box::new(NativeRanking)),
        "inline" | "sql" => Some(Box::new(InlineSqlRanking)),
        _ => None,
    }
}
