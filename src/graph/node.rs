//! Node derivation rules.
//!
//! A node is the 1–2 character key a word is indexed under for one chaining
//! axis. No adjacency is stored anywhere: two words are connected when the
//! tail node of one equals the head node of the other, so a
//! `WHERE head_column = ?` lookup is the whole graph walk.
//!
//! All functions operate on Unicode scalar values and fail with
//! [`Error::InvalidArgument`] on empty input.

use crate::error::{Error, Result};
use crate::types::{GameMode, WordCondition};

fn chars_of(word: &str) -> Result<Vec<char>> {
    let chars: Vec<char> = word.chars().collect();
    if chars.is_empty() {
        return Err(Error::invalid("cannot derive a node from an empty word"));
    }
    Ok(chars)
}

fn collect(chars: &[char]) -> String {
    chars.iter().collect()
}

// ---------------------------------------------------------------------------
// Forward / reverse
// ---------------------------------------------------------------------------

/// First character.
pub fn forward_head(word: &str) -> Result<String> {
    let chars = chars_of(word)?;
    Ok(chars[0].to_string())
}

/// Last character.
pub fn forward_tail(word: &str) -> Result<String> {
    let chars = chars_of(word)?;
    Ok(chars[chars.len() - 1].to_string())
}

/// Reverse chaining reads words back to front: the head is the last character.
pub fn reverse_head(word: &str) -> Result<String> {
    forward_tail(word)
}

pub fn reverse_tail(word: &str) -> Result<String> {
    forward_head(word)
}

// ---------------------------------------------------------------------------
// Middle
// ---------------------------------------------------------------------------

/// Character at `(len-1)/2` for odd lengths above 2, empty otherwise.
pub fn middle_node(word: &str) -> Result<String> {
    let chars = chars_of(word)?;
    let len = chars.len();
    if len > 2 && len % 2 == 1 {
        Ok(chars[(len - 1) / 2].to_string())
    } else {
        Ok(String::new())
    }
}

// ---------------------------------------------------------------------------
// Two-char
// ---------------------------------------------------------------------------

/// First two characters for words of four or more, the first character for
/// three-character words, empty (unindexable) below that.
pub fn two_char_head(word: &str) -> Result<String> {
    let chars = chars_of(word)?;
    Ok(match chars.len() {
        0..=2 => String::new(),
        3 => collect(&chars[..1]),
        _ => collect(&chars[..2]),
    })
}

pub fn two_char_tail(word: &str) -> Result<String> {
    let chars = chars_of(word)?;
    let len = chars.len();
    Ok(match len {
        0..=2 => String::new(),
        3 => collect(&chars[len - 1..]),
        _ => collect(&chars[len - 2..]),
    })
}

/// The three precomputed head columns of a word row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadNodes {
    pub forward: String,
    pub reverse: String,
    pub two_char: String,
}

pub fn head_nodes(word: &str) -> Result<HeadNodes> {
    Ok(HeadNodes {
        forward: forward_head(word)?,
        reverse: reverse_head(word)?,
        two_char: two_char_head(word)?,
    })
}

// ---------------------------------------------------------------------------
// Hangul
// ---------------------------------------------------------------------------

const SYLLABLE_BASE: u32 = 0xAC00;
const SYLLABLE_LAST: u32 = 0xD7A3;
const MEDIAL_COUNT: u32 = 21;
const FINAL_COUNT: u32 = 28;

const CHOSEONG: [char; 19] = [
    'ㄱ', 'ㄲ', 'ㄴ', 'ㄷ', 'ㄸ', 'ㄹ', 'ㅁ', 'ㅂ', 'ㅃ', 'ㅅ', 'ㅆ', 'ㅇ', 'ㅈ', 'ㅉ', 'ㅊ', 'ㅋ', 'ㅌ',
    'ㅍ', 'ㅎ',
];

// Initial consonant indices.
const INITIAL_N: u32 = 2;
const INITIAL_R: u32 = 5;
const INITIAL_NG: u32 = 11;

// Medial vowel indices.
const V_A: u32 = 0;
const V_AE: u32 = 1;
const V_YA: u32 = 2;
const V_YEO: u32 = 6;
const V_YE: u32 = 7;
const V_O: u32 = 8;
const V_OE: u32 = 11;
const V_YO: u32 = 12;
const V_U: u32 = 13;
const V_YU: u32 = 17;
const V_EU: u32 = 18;
const V_I: u32 = 20;

/// Split a precomposed Hangul syllable into (initial, medial, final) indices.
fn decompose(ch: char) -> Option<(u32, u32, u32)> {
    let code = ch as u32;
    if !(SYLLABLE_BASE..=SYLLABLE_LAST).contains(&code) {
        return None;
    }
    let offset = code - SYLLABLE_BASE;
    let initial = offset / (MEDIAL_COUNT * FINAL_COUNT);
    let medial = (offset % (MEDIAL_COUNT * FINAL_COUNT)) / FINAL_COUNT;
    let last = offset % FINAL_COUNT;
    Some((initial, medial, last))
}

fn compose(initial: u32, medial: u32, last: u32) -> Option<char> {
    char::from_u32(SYLLABLE_BASE + (initial * MEDIAL_COUNT + medial) * FINAL_COUNT + last)
}

pub fn is_hangul_syllable(ch: char) -> bool {
    decompose(ch).is_some()
}

/// Alternate leading syllable allowed by the initial sound law (두음법칙),
/// e.g. `력` → `역`, `락` → `낙`, `녀` → `여`.
pub fn initial_law_substitute(ch: char) -> Option<char> {
    let (initial, medial, last) = decompose(ch)?;
    let replaced = match (initial, medial) {
        (INITIAL_R, V_YA | V_YEO | V_YE | V_YO | V_YU | V_I) => INITIAL_NG,
        (INITIAL_R, V_A | V_AE | V_O | V_OE | V_U | V_EU) => INITIAL_N,
        (INITIAL_N, V_YEO | V_YO | V_YU | V_I) => INITIAL_NG,
        _ => return None,
    };
    compose(replaced, medial, last)
}

/// Leading-consonant projection: every Hangul syllable becomes its initial
/// jamo; anything else is kept.
pub fn choseong(word: &str) -> String {
    word.chars()
        .map(|ch| match decompose(ch) {
            Some((initial, _, _)) => CHOSEONG[initial as usize],
            None => ch,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Turn conditions
// ---------------------------------------------------------------------------

impl WordCondition {
    /// Derive the tail constraint a reply to `previous` must satisfy.
    ///
    /// Middle mode falls back to the forward tail for even-length words.
    /// The initial-sound-law substitute only applies to modes whose replies
    /// start with the constrained node.
    pub fn from_previous_word(
        mode: GameMode,
        previous: &str,
        mission_char: Option<char>,
    ) -> Result<Self> {
        let node = match mode {
            GameMode::Reverse => reverse_tail(previous)?,
            GameMode::Middle => {
                let middle = middle_node(previous)?;
                if middle.is_empty() {
                    forward_tail(previous)?
                } else {
                    middle
                }
            }
            GameMode::TwoChar => {
                let tail = two_char_tail(previous)?;
                if tail.is_empty() {
                    forward_tail(previous)?
                } else {
                    tail
                }
            }
            _ => forward_tail(previous)?,
        };

        let sub_node = if mode == GameMode::Reverse {
            None
        } else {
            // For a two-character node only the leading syllable changes.
            let mut chars = node.chars();
            chars.next().and_then(initial_law_substitute).map(|first| {
                let mut sub = first.to_string();
                sub.extend(chars);
                sub
            })
        };

        Ok(Self {
            node,
            sub_node,
            mission_char,
            word_length: 0,
        })
    }
}
