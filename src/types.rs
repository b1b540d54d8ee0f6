//! Core domain types for the wordchain engine.
//!
//! Everything persisted (flag bits, node table names, mode names) has a
//! stable representation here so that databases stay interchangeable between
//! releases.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign, Not};

use serde::{Deserialize, Serialize};

/// Longest word the table accepts, in characters.
pub const MAX_WORD_LENGTH: usize = 256;

// ---------------------------------------------------------------------------
// WordFlags
// ---------------------------------------------------------------------------

/// Bitmask of a word's membership across every classification axis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WordFlags(u32);

impl WordFlags {
    pub const NONE: Self = Self(0);
    pub const END_WORD: Self = Self(1 << 0);
    pub const ATTACK_WORD: Self = Self(1 << 1);
    pub const REVERSE_END_WORD: Self = Self(1 << 2);
    pub const REVERSE_ATTACK_WORD: Self = Self(1 << 3);
    pub const MIDDLE_END_WORD: Self = Self(1 << 4);
    pub const MIDDLE_ATTACK_WORD: Self = Self(1 << 5);
    pub const TWO_CHAR_END_WORD: Self = Self(1 << 6);
    pub const TWO_CHAR_ATTACK_WORD: Self = Self(1 << 7);
    pub const THREE_CHAR_END_WORD: Self = Self(1 << 8);
    pub const THREE_CHAR_ATTACK_WORD: Self = Self(1 << 9);
    pub const IS_TWO_CHAR_WORD: Self = Self(1 << 10);
    pub const IS_THREE_CHAR_WORD: Self = Self(1 << 11);
    pub const KOREAN: Self = Self(1 << 12);
    pub const ENGLISH: Self = Self(1 << 13);
    pub const LOAN_WORD: Self = Self(1 << 14);
    pub const DIALECT: Self = Self(1 << 15);
    pub const DEAD_LANGUAGE: Self = Self(1 << 16);
    pub const FORMAL: Self = Self(1 << 17);

    /// Hand-maintained bits; never derived from the word itself.
    pub const CURATED: Self =
        Self(Self::LOAN_WORD.0 | Self::DIALECT.0 | Self::DEAD_LANGUAGE.0 | Self::FORMAL.0);

    /// Every End-axis bit.
    pub const ALL_END: Self = Self(
        Self::END_WORD.0
            | Self::REVERSE_END_WORD.0
            | Self::MIDDLE_END_WORD.0
            | Self::TWO_CHAR_END_WORD.0
            | Self::THREE_CHAR_END_WORD.0,
    );

    /// Every Attack-axis bit.
    pub const ALL_ATTACK: Self = Self(
        Self::ATTACK_WORD.0
            | Self::REVERSE_ATTACK_WORD.0
            | Self::MIDDLE_ATTACK_WORD.0
            | Self::TWO_CHAR_ATTACK_WORD.0
            | Self::THREE_CHAR_ATTACK_WORD.0,
    );

    const ALL_BITS: u32 = (1 << 18) - 1;

    const NAMES: &'static [(Self, &'static str)] = &[
        (Self::END_WORD, "end"),
        (Self::ATTACK_WORD, "attack"),
        (Self::REVERSE_END_WORD, "reverse-end"),
        (Self::REVERSE_ATTACK_WORD, "reverse-attack"),
        (Self::MIDDLE_END_WORD, "middle-end"),
        (Self::MIDDLE_ATTACK_WORD, "middle-attack"),
        (Self::TWO_CHAR_END_WORD, "two-char-end"),
        (Self::TWO_CHAR_ATTACK_WORD, "two-char-attack"),
        (Self::THREE_CHAR_END_WORD, "three-char-end"),
        (Self::THREE_CHAR_ATTACK_WORD, "three-char-attack"),
        (Self::IS_TWO_CHAR_WORD, "two-char-word"),
        (Self::IS_THREE_CHAR_WORD, "three-char-word"),
        (Self::KOREAN, "korean"),
        (Self::ENGLISH, "english"),
        (Self::LOAN_WORD, "loan"),
        (Self::DIALECT, "dialect"),
        (Self::DEAD_LANGUAGE, "dead-language"),
        (Self::FORMAL, "formal"),
    ];

    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Build from raw bits, dropping anything outside the known range.
    pub const fn from_bits_truncate(bits: u32) -> Self {
        Self(bits & Self::ALL_BITS)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    pub fn set(&mut self, other: Self, value: bool) {
        if value {
            self.insert(other);
        } else {
            self.remove(other);
        }
    }

    /// Parse a single flag name as printed by [`fmt::Display`].
    pub fn from_name(name: &str) -> Option<Self> {
        let needle = name.trim().to_lowercase().replace('_', "-");
        Self::NAMES
            .iter()
            .find(|(_, n)| *n == needle)
            .map(|(flag, _)| *flag)
    }
}

impl BitOr for WordFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for WordFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for WordFlags {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl Not for WordFlags {
    type Output = Self;
    fn not(self) -> Self {
        Self(!self.0 & Self::ALL_BITS)
    }
}

impl fmt::Display for WordFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        f.write_str(&names.join("|"))
    }
}

// ---------------------------------------------------------------------------
// Node categories
// ---------------------------------------------------------------------------

/// Whether a node set marks dead ends or high-branching tails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    End,
    Attack,
}

/// The chaining axis a node set indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeAxis {
    Forward,
    Reverse,
    TwoChar,
    ThreeChar,
}

impl NodeAxis {
    pub const ALL: [NodeAxis; 4] = [Self::Forward, Self::Reverse, Self::TwoChar, Self::ThreeChar];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Reverse => "reverse",
            Self::TwoChar => "two-char",
            Self::ThreeChar => "three-char",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "forward" => Some(Self::Forward),
            "reverse" => Some(Self::Reverse),
            "two-char" | "twochar" | "kkutu" => Some(Self::TwoChar),
            "three-char" | "threechar" => Some(Self::ThreeChar),
            _ => None,
        }
    }
}

/// One of the eight node sets: End/Attack × axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeCategory {
    pub role: NodeRole,
    pub axis: NodeAxis,
}

impl NodeCategory {
    pub const ALL: [NodeCategory; 8] = [
        Self::new(NodeRole::End, NodeAxis::Forward),
        Self::new(NodeRole::Attack, NodeAxis::Forward),
        Self::new(NodeRole::End, NodeAxis::Reverse),
        Self::new(NodeRole::Attack, NodeAxis::Reverse),
        Self::new(NodeRole::End, NodeAxis::TwoChar),
        Self::new(NodeRole::Attack, NodeAxis::TwoChar),
        Self::new(NodeRole::End, NodeAxis::ThreeChar),
        Self::new(NodeRole::Attack, NodeAxis::ThreeChar),
    ];

    pub const fn new(role: NodeRole, axis: NodeAxis) -> Self {
        Self { role, axis }
    }

    pub const fn end(axis: NodeAxis) -> Self {
        Self::new(NodeRole::End, axis)
    }

    pub const fn attack(axis: NodeAxis) -> Self {
        Self::new(NodeRole::Attack, axis)
    }

    /// Dense index in `0..8`, matching the order of [`NodeCategory::ALL`].
    pub fn index(&self) -> usize {
        let axis = match self.axis {
            NodeAxis::Forward => 0,
            NodeAxis::Reverse => 1,
            NodeAxis::TwoChar => 2,
            NodeAxis::ThreeChar => 3,
        };
        let role = match self.role {
            NodeRole::End => 0,
            NodeRole::Attack => 1,
        };
        axis * 2 + role
    }

    /// Backing table name.
    pub fn table_name(&self) -> &'static str {
        match (self.role, self.axis) {
            (NodeRole::End, NodeAxis::Forward) => "end_node_forward",
            (NodeRole::Attack, NodeAxis::Forward) => "attack_node_forward",
            (NodeRole::End, NodeAxis::Reverse) => "end_node_reverse",
            (NodeRole::Attack, NodeAxis::Reverse) => "attack_node_reverse",
            (NodeRole::End, NodeAxis::TwoChar) => "end_node_two_char",
            (NodeRole::Attack, NodeAxis::TwoChar) => "attack_node_two_char",
            (NodeRole::End, NodeAxis::ThreeChar) => "end_node_three_char",
            (NodeRole::Attack, NodeAxis::ThreeChar) => "attack_node_three_char",
        }
    }

    /// The word flag that marks membership of a word's tail in this set.
    pub fn word_flag(&self) -> WordFlags {
        match (self.role, self.axis) {
            (NodeRole::End, NodeAxis::Forward) => WordFlags::END_WORD,
            (NodeRole::Attack, NodeAxis::Forward) => WordFlags::ATTACK_WORD,
            (NodeRole::End, NodeAxis::Reverse) => WordFlags::REVERSE_END_WORD,
            (NodeRole::Attack, NodeAxis::Reverse) => WordFlags::REVERSE_ATTACK_WORD,
            (NodeRole::End, NodeAxis::TwoChar) => WordFlags::TWO_CHAR_END_WORD,
            (NodeRole::Attack, NodeAxis::TwoChar) => WordFlags::TWO_CHAR_ATTACK_WORD,
            (NodeRole::End, NodeAxis::ThreeChar) => WordFlags::THREE_CHAR_END_WORD,
            (NodeRole::Attack, NodeAxis::ThreeChar) => WordFlags::THREE_CHAR_ATTACK_WORD,
        }
    }

    /// Map an End/Attack axis flag back to its node set. The middle axis has
    /// no sets of its own and maps to the forward sets.
    pub fn from_word_flag(flag: WordFlags) -> Option<Self> {
        if flag == WordFlags::MIDDLE_END_WORD {
            return Some(Self::end(NodeAxis::Forward));
        }
        if flag == WordFlags::MIDDLE_ATTACK_WORD {
            return Some(Self::attack(NodeAxis::Forward));
        }
        Self::ALL.into_iter().find(|c| c.word_flag() == flag)
    }
}

impl fmt::Display for NodeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let role = match self.role {
            NodeRole::End => "end",
            NodeRole::Attack => "attack",
        };
        write!(f, "{}/{}", role, self.axis.as_str())
    }
}

// ---------------------------------------------------------------------------
// GameMode
// ---------------------------------------------------------------------------

/// The rule set of the current round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GameMode {
    /// Next word starts with the last character (끝말잇기).
    Forward,
    /// Next word ends with the first character (앞말잇기).
    Reverse,
    /// Next word starts with the middle character (가운뎃말잇기).
    Middle,
    /// Two-character chaining for words of four or more characters (끄투).
    TwoChar,
    /// Forward chaining restricted to three-character words (쿵쿵따).
    ThreeChar,
    /// Any word, no tail constraint.
    All,
    /// Free-form round; answers are arbitrary strings.
    Free,
    /// Typing race; answers are arbitrary strings.
    Typing,
}

impl GameMode {
    pub fn is_free_form(&self) -> bool {
        matches!(self, Self::Free | Self::Typing)
    }

    /// Column whose value must equal the requested node, or `None` when the
    /// mode has no tail filter.
    pub fn index_column(&self) -> Option<&'static str> {
        match self {
            Self::Forward | Self::Middle | Self::ThreeChar => Some("head_node_forward"),
            Self::Reverse => Some("head_node_reverse"),
            Self::TwoChar => Some("head_node_two_char"),
            Self::All | Self::Free | Self::Typing => None,
        }
    }

    /// The (end, attack) word flags relevant to this mode's axis.
    pub fn axis_flags(&self) -> (WordFlags, WordFlags) {
        match self {
            Self::Forward | Self::All => (WordFlags::END_WORD, WordFlags::ATTACK_WORD),
            Self::Reverse => (WordFlags::REVERSE_END_WORD, WordFlags::REVERSE_ATTACK_WORD),
            Self::Middle => (WordFlags::MIDDLE_END_WORD, WordFlags::MIDDLE_ATTACK_WORD),
            Self::TwoChar => (WordFlags::TWO_CHAR_END_WORD, WordFlags::TWO_CHAR_ATTACK_WORD),
            Self::ThreeChar => (
                WordFlags::THREE_CHAR_END_WORD,
                WordFlags::THREE_CHAR_ATTACK_WORD,
            ),
            Self::Free | Self::Typing => (WordFlags::NONE, WordFlags::NONE),
        }
    }

    /// End node set consulted for the dead-end short-circuit.
    pub fn end_category(&self) -> Option<NodeCategory> {
        match self {
            Self::Forward | Self::Middle => Some(NodeCategory::end(NodeAxis::Forward)),
            Self::Reverse => Some(NodeCategory::end(NodeAxis::Reverse)),
            Self::TwoChar => Some(NodeCategory::end(NodeAxis::TwoChar)),
            Self::ThreeChar => Some(NodeCategory::end(NodeAxis::ThreeChar)),
            Self::All | Self::Free | Self::Typing => None,
        }
    }

    /// Axis whose tail nodes a word added in this mode contributes.
    pub fn axis(&self) -> Option<NodeAxis> {
        self.end_category().map(|c| c.axis)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Reverse => "reverse",
            Self::Middle => "middle",
            Self::TwoChar => "two-char",
            Self::ThreeChar => "three-char",
            Self::All => "all",
            Self::Free => "free",
            Self::Typing => "typing",
        }
    }

    /// Parse from a loose string (case-insensitive, underscores accepted).
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "forward" | "last-and-first" => Some(Self::Forward),
            "reverse" | "first-and-last" => Some(Self::Reverse),
            "middle" | "middle-and-first" => Some(Self::Middle),
            "two-char" | "twochar" | "kkutu" => Some(Self::TwoChar),
            "three-char" | "threechar" => Some(Self::ThreeChar),
            "all" => Some(Self::All),
            "free" => Some(Self::Free),
            "typing" => Some(Self::Typing),
            _ => None,
        }
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// PathFlags
// ---------------------------------------------------------------------------

/// Per-turn switches for a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PathFlags(u8);

impl PathFlags {
    pub const NONE: Self = Self(0);
    /// End-words may be returned.
    pub const USE_END_WORD: Self = Self(1 << 0);
    /// Attack-words may be returned.
    pub const USE_ATTACK_WORD: Self = Self(1 << 1);
    /// Already-used words are kept in the filtered list.
    pub const REUSE_WORDS: Self = Self(1 << 2);

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn bits(self) -> u8 {
        self.0
    }
}

impl Default for PathFlags {
    fn default() -> Self {
        Self::USE_END_WORD | Self::USE_ATTACK_WORD
    }
}

impl BitOr for PathFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

// ---------------------------------------------------------------------------
// WordCategories / WordPreference
// ---------------------------------------------------------------------------

/// Category combination of a candidate relative to one request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WordCategories(u8);

impl WordCategories {
    pub const NONE: Self = Self(0);
    pub const END: Self = Self(1 << 0);
    pub const ATTACK: Self = Self(1 << 1);
    pub const MISSION: Self = Self(1 << 2);

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub const fn has_mission(self) -> bool {
        self.0 & Self::MISSION.0 != 0
    }
}

impl BitOr for WordCategories {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for WordCategories {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.contains(Self::END) {
            parts.push("end");
        }
        if self.contains(Self::ATTACK) {
            parts.push("attack");
        }
        if self.contains(Self::MISSION) {
            parts.push("mission");
        }
        if parts.is_empty() {
            f.write_str("normal")
        } else {
            f.write_str(&parts.join("+"))
        }
    }
}

impl TryFrom<String> for WordCategories {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let mut out = Self::NONE;
        for part in value.split('+') {
            match part.trim().to_lowercase().as_str() {
                "end" => out.insert(Self::END),
                "attack" => out.insert(Self::ATTACK),
                "mission" => out.insert(Self::MISSION),
                "normal" | "none" => {}
                other => return Err(format!("unknown word category `{other}`")),
            }
        }
        Ok(out)
    }
}

impl From<WordCategories> for String {
    fn from(value: WordCategories) -> Self {
        value.to_string()
    }
}

/// Ordered list of category combinations, most preferred first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WordPreference(pub Vec<WordCategories>);

impl Default for WordPreference {
    fn default() -> Self {
        Self(vec![
            WordCategories::END | WordCategories::MISSION,
            WordCategories::END,
            WordCategories::ATTACK | WordCategories::MISSION,
            WordCategories::ATTACK,
            WordCategories::MISSION,
            WordCategories::NONE,
        ])
    }
}

impl WordPreference {
    /// Tier weight of `category`: its distance from the end of the list,
    /// counting only the combinations that apply to this request. Mission
    /// combinations are ignored when no mission character is active.
    /// Absent combinations weigh 0.
    pub fn weight(&self, category: WordCategories, with_mission: bool) -> u32 {
        let applicable: Vec<WordCategories> = self
            .0
            .iter()
            .copied()
            .filter(|c| with_mission || !c.has_mission())
            .filter(|c| !(c.contains(WordCategories::END) && c.contains(WordCategories::ATTACK)))
            .collect();
        applicable
            .iter()
            .position(|c| *c == category)
            .map(|i| (applicable.len() - i) as u32)
            .unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Search inputs and outputs
// ---------------------------------------------------------------------------

/// The tail constraint of one turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordCondition {
    /// Node the next word must be indexed under.
    pub node: String,
    /// Initial-sound-law alternative accepted in place of `node`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_node: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mission_char: Option<char>,
    /// Requested answer length in free-form modes.
    #[serde(default)]
    pub word_length: usize,
}

impl WordCondition {
    pub fn new(node: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            ..Self::default()
        }
    }

    pub fn with_sub(mut self, sub: impl Into<String>) -> Self {
        self.sub_node = Some(sub.into());
        self
    }

    pub fn with_mission(mut self, mission: char) -> Self {
        self.mission_char = Some(mission);
        self
    }

    pub fn with_length(mut self, len: usize) -> Self {
        self.word_length = len;
        self
    }
}

/// A ranked candidate, classified against the current request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathObject {
    pub content: String,
    pub categories: WordCategories,
    pub mission_char_count: usize,
}

/// Outcome of one search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PathFindResultType {
    Found,
    /// Candidates may exist but none survived filtering, or none matched.
    NotFound,
    /// The tail is a proven dead end; no query was issued.
    EndWord,
    Error,
}

/// Result event of one search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathUpdated {
    pub mode: GameMode,
    pub condition: WordCondition,
    pub result: PathFindResultType,
    pub found: Vec<PathObject>,
    pub filtered: Vec<PathObject>,
    pub elapsed_ms: u64,
}

impl PathUpdated {
    /// An empty result of kind [`PathFindResultType::Error`].
    pub fn error(mode: GameMode, condition: WordCondition) -> Self {
        Self {
            mode,
            condition,
            result: PathFindResultType::Error,
            found: Vec::new(),
            filtered: Vec::new(),
            elapsed_ms: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// WordEntry
// ---------------------------------------------------------------------------

/// One row of the word table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordEntry {
    pub seq: i64,
    pub word: String,
    pub head_node_forward: String,
    pub head_node_reverse: String,
    pub head_node_two_char: String,
    pub choseong: String,
    pub flags: WordFlags,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word_type: Option<String>,
    #[serde(default)]
    pub theme: i64,
}
