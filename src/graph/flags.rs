//! Word flag computation.
//!
//! Derives the structural bits of a word: length class, script, and
//! membership of its tail nodes in each node set. Curated bits are never
//! touched here; [`WordFlagsCalculator::recompute`] carries them over from
//! the stored value.

use std::time::{Duration, Instant};

use regex::{Regex, RegexBuilder};

use crate::error::{Error, Result};
use crate::graph::node::{forward_tail, middle_node, reverse_tail, two_char_tail};
use crate::graph::node_set::NodeSetStore;
use crate::types::{NodeAxis, NodeCategory, WordFlags};

/// Default budget for each language-detection match.
pub const DEFAULT_MATCH_BUDGET: Duration = Duration::from_millis(200);

const KOREAN_PATTERN: &str = "[가-힣]";
const ENGLISH_PATTERN: &str = "[A-Za-z]";

/// Compiled matchers plus the per-match time budget.
///
/// Construct once and share; matching is `&self` and thread-safe.
#[derive(Debug, Clone)]
pub struct WordFlagsCalculator {
    korean: Regex,
    english: Regex,
    budget: Duration,
}

fn compile(pattern: &str) -> Result<Regex> {
    Ok(RegexBuilder::new(pattern).size_limit(1 << 16).build()?)
}

impl WordFlagsCalculator {
    pub fn new(budget: Duration) -> Result<Self> {
        Ok(Self {
            korean: compile(KOREAN_PATTERN)?,
            english: compile(ENGLISH_PATTERN)?,
            budget,
        })
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Run `re` against `word`, treating an overrun of the budget as a miss.
    fn guarded_match(&self, re: &Regex, word: &str) -> bool {
        let started = Instant::now();
        let matched = re.is_match(word);
        let elapsed = started.elapsed();
        if elapsed > self.budget {
            let err = Error::MatcherTimeout {
                pattern: re.as_str().to_string(),
                elapsed_ms: elapsed.as_millis() as u64,
            };
            tracing::warn!(word, "{err}; leaving flag unset");
            return false;
        }
        matched
    }

    /// Compute the derived flags of `word` against the current node sets.
    pub fn compute(&self, word: &str, nodes: &NodeSetStore) -> Result<WordFlags> {
        let len = word.chars().count();
        if len == 0 {
            return Err(Error::invalid("cannot compute flags of an empty word"));
        }

        let mut flags = WordFlags::NONE;
        flags.set(WordFlags::IS_TWO_CHAR_WORD, len == 2);
        flags.set(WordFlags::IS_THREE_CHAR_WORD, len == 3);
        flags.set(WordFlags::KOREAN, self.guarded_match(&self.korean, word));
        flags.set(WordFlags::ENGLISH, self.guarded_match(&self.english, word));

        let forward = NodeAxis::Forward;
        let tail = forward_tail(word)?;
        flags.set(WordFlags::END_WORD, nodes.contains(NodeCategory::end(forward), &tail));
        flags.set(WordFlags::ATTACK_WORD, nodes.contains(NodeCategory::attack(forward), &tail));

        let reverse = NodeAxis::Reverse;
        let rtail = reverse_tail(word)?;
        flags.set(WordFlags::REVERSE_END_WORD, nodes.contains(NodeCategory::end(reverse), &rtail));
        flags.set(
            WordFlags::REVERSE_ATTACK_WORD,
            nodes.contains(NodeCategory::attack(reverse), &rtail),
        );

        // The middle axis shares the forward sets.
        let middle = middle_node(word)?;
        flags.set(WordFlags::MIDDLE_END_WORD, nodes.contains(NodeCategory::end(forward), &middle));
        flags.set(
            WordFlags::MIDDLE_ATTACK_WORD,
            nodes.contains(NodeCategory::attack(forward), &middle),
        );

        let two = NodeAxis::TwoChar;
        let ttail = two_char_tail(word)?;
        flags.set(WordFlags::TWO_CHAR_END_WORD, nodes.contains(NodeCategory::end(two), &ttail));
        flags.set(
            WordFlags::TWO_CHAR_ATTACK_WORD,
            nodes.contains(NodeCategory::attack(two), &ttail),
        );

        if len == 3 {
            let three = NodeAxis::ThreeChar;
            flags.set(
                WordFlags::THREE_CHAR_END_WORD,
                nodes.contains(NodeCategory::end(three), &tail),
            );
            flags.set(
                WordFlags::THREE_CHAR_ATTACK_WORD,
                nodes.contains(NodeCategory::attack(three), &tail),
            );
        }

        Ok(flags)
    }

    /// Recompute the derived bits and keep the curated bits of `existing`.
    pub fn recompute(
        &self,
        word: &str,
        existing: WordFlags,
        nodes: &NodeSetStore,
    ) -> Result<WordFlags> {
        Ok(self.compute(word, nodes)? | (existing & WordFlags::CURATED))
    }
}

/// Tail node of `word` on `axis`, the key its End/Attack membership is
/// tested with. Empty when the word has no tail on that axis.
pub fn tail_node(word: &str, axis: NodeAxis) -> Result<String> {
    match axis {
        NodeAxis::Forward => forward_tail(word),
        NodeAxis::Reverse => reverse_tail(word),
        NodeAxis::TwoChar => two_char_tail(word),
        NodeAxis::ThreeChar => {
            if word.chars().count() == 3 {
                forward_tail(word)
            } else {
                Ok(String::new())
            }
        }
    }
}
