//! Compiled pattern representation.
//!
//! A [`Node`] tree is what the matcher executes. References to bindings
//! are resolved at compile time: non-alias bindings become [`Node::Capture`]
//! and aliases become [`Node::Call`], both sharing the binding's body.

use std::sync::Arc;

/// Code point used for a byte that does not start a valid UTF-8 sequence.
/// Outside the Unicode range so no class or range matches it.
pub const INVALID_UNIT: u32 = 0x8000_0000;

/// Decode the character at `pos`: its code point and width in bytes.
/// Invalid UTF-8 yields a one-byte [`INVALID_UNIT`].
pub fn decode_at(input: &[u8], pos: usize) -> Option<(u32, usize)> {
    let b0 = *input.get(pos)?;
    if b0 < 0x80 {
        return Some((b0 as u32, 1));
    }
    let width = match b0 {
        0xC2..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF4 => 4,
        _ => return Some((INVALID_UNIT | b0 as u32, 1)),
    };
    let end = (pos + width).min(input.len());
    match std::str::from_utf8(&input[pos..end]) {
        Ok(s) => s
            .chars()
            .next()
            .map(|c| (c as u32, width))
            .or(Some((INVALID_UNIT | b0 as u32, 1))),
        Err(_) => Some((INVALID_UNIT | b0 as u32, 1)),
    }
}

/// The code point immediately before `pos`, if any.
pub fn decode_before(input: &[u8], pos: usize) -> Option<u32> {
    if pos == 0 || pos > input.len() {
        return None;
    }
    let floor = pos.saturating_sub(4);
    let mut start = pos - 1;
    while start > floor && input[start] & 0xC0 == 0x80 {
        start -= 1;
    }
    match decode_at(input, start) {
        Some((cp, width)) if start + width == pos => Some(cp),
        _ => Some(INVALID_UNIT | input[pos - 1] as u32),
    }
}

/// POSIX-style named classes, ASCII only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamedClass {
    Alpha,
    Digit,
    Alnum,
    Space,
    Upper,
    Lower,
    Punct,
    XDigit,
    Cntrl,
    Graph,
    Print,
    Word,
}

impl NamedClass {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "alpha" => NamedClass::Alpha,
            "digit" => NamedClass::Digit,
            "alnum" => NamedClass::Alnum,
            "space" => NamedClass::Space,
            "upper" => NamedClass::Upper,
            "lower" => NamedClass::Lower,
            "punct" => NamedClass::Punct,
            "xdigit" => NamedClass::XDigit,
            "cntrl" => NamedClass::Cntrl,
            "graph" => NamedClass::Graph,
            "print" => NamedClass::Print,
            "word" => NamedClass::Word,
            _ => return None,
        })
    }

    pub fn contains(self, cp: u32) -> bool {
        let Ok(b) = u8::try_from(cp) else {
            return false;
        };
        if !b.is_ascii() {
            return false;
        }
        match self {
            NamedClass::Alpha => b.is_ascii_alphabetic(),
            NamedClass::Digit => b.is_ascii_digit(),
            NamedClass::Alnum => b.is_ascii_alphanumeric(),
            NamedClass::Space => b.is_ascii_whitespace() || b == 0x0B,
            NamedClass::Upper => b.is_ascii_uppercase(),
            NamedClass::Lower => b.is_ascii_lowercase(),
            NamedClass::Punct => b.is_ascii_punctuation(),
            NamedClass::XDigit => b.is_ascii_hexdigit(),
            NamedClass::Cntrl => b.is_ascii_control(),
            NamedClass::Graph => b.is_ascii_graphic(),
            NamedClass::Print => b.is_ascii_graphic() || b == b' ',
            NamedClass::Word => b.is_ascii_alphanumeric() || b == b'_',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassItem {
    Named(NamedClass),
    Range(u32, u32),
    Char(u32),
    Set(CharSet),
}

/// A bracket expression: `[:digit:]`, `[a-f]`, `[^xyz]`, `[[:alpha:][_]]`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CharSet {
    pub items: Vec<ClassItem>,
    pub negated: bool,
}

impl CharSet {
    pub fn contains(&self, cp: u32) -> bool {
        if cp & INVALID_UNIT != 0 {
            return self.negated;
        }
        let hit = self.items.iter().any(|item| match item {
            ClassItem::Named(class) => class.contains(cp),
            ClassItem::Range(lo, hi) => (*lo..=*hi).contains(&cp),
            ClassItem::Char(c) => *c == cp,
            ClassItem::Set(set) => set.contains(cp),
        });
        hit != self.negated
    }

    fn weight(&self) -> usize {
        std::mem::size_of::<ClassItem>() * self.items.len()
            + self
                .items
                .iter()
                .map(|item| match item {
                    ClassItem::Set(set) => set.weight(),
                    _ => 0,
                })
                .sum::<usize>()
    }
}

#[derive(Debug, Clone)]
pub enum Node {
    Literal(Box<[u8]>),
    Set(CharSet),
    /// One UTF-8 character, or one byte of invalid input.
    Any,
    Start,
    End,
    /// The `~` token boundary.
    Boundary,
    /// Abort the match, keeping what was captured so far.
    Halt,
    Seq(Vec<Node>),
    Choice(Vec<Node>),
    Repeat {
        node: Box<Node>,
        min: u32,
        max: Option<u32>,
        /// Require a token boundary between repetitions (cooked group).
        boundary: bool,
    },
    Not(Box<Node>),
    Look(Box<Node>),
    Capture {
        name: Arc<str>,
        node: Arc<Node>,
    },
    /// Inlined alias body.
    Call(Arc<Node>),
}

impl Node {
    /// Whether the node can succeed without consuming input.
    pub fn nullable(&self) -> bool {
        match self {
            Node::Literal(bytes) => bytes.is_empty(),
            Node::Set(_) | Node::Any => false,
            Node::Start | Node::End | Node::Boundary | Node::Halt => true,
            Node::Seq(items) => items.iter().all(Node::nullable),
            Node::Choice(alts) => alts.iter().any(Node::nullable),
            Node::Repeat { node, min, .. } => *min == 0 || node.nullable(),
            Node::Not(_) | Node::Look(_) => true,
            Node::Capture { node, .. } | Node::Call(node) => node.nullable(),
        }
    }

    /// Approximate bytes held by this tree, for heap accounting.
    /// Shared binding bodies are counted where they are defined.
    pub fn weight(&self) -> usize {
        let own = std::mem::size_of::<Node>();
        own + match self {
            Node::Literal(bytes) => bytes.len(),
            Node::Set(set) => set.weight(),
            Node::Seq(items) | Node::Choice(items) => items.iter().map(Node::weight).sum(),
            Node::Repeat { node, .. } | Node::Not(node) | Node::Look(node) => node.weight(),
            Node::Capture { name, .. } => name.len(),
            _ => 0,
        }
    }
}
