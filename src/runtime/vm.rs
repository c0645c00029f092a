//! Backtracking matcher over compiled [`Node`] trees.

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::ir::{decode_at, decode_before, NamedClass, Node};

/// One node of the capture tree. Positions are 0-based byte offsets,
/// `end` exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    pub name: Arc<str>,
    pub start: usize,
    pub end: usize,
    pub subs: Vec<Capture>,
}

impl Capture {
    pub fn text<'i>(&self, input: &'i [u8]) -> &'i [u8] {
        &input[self.start.min(input.len())..self.end.min(input.len())]
    }
}

/// A capture entered during a traced match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEvent {
    pub depth: usize,
    pub name: Arc<str>,
    pub start: usize,
    /// End position on success, `None` when the capture failed.
    pub end: Option<usize>,
}

#[derive(Debug)]
pub struct MatchOutcome {
    pub capture: Option<Capture>,
    /// End position of the overall match.
    pub end: Option<usize>,
    pub abend: bool,
    pub elapsed: Duration,
    pub trace: Vec<TraceEvent>,
}

enum Event {
    Open { name: Arc<str>, start: usize },
    Close { end: usize },
}

/// Raised by `halt`; carries the position where the match stopped.
struct Halted(usize);

type Step = std::result::Result<Option<usize>, Halted>;

struct Matcher<'i> {
    input: &'i [u8],
    events: Vec<Event>,
    trace: Option<Vec<TraceEvent>>,
    depth: usize,
}

impl<'i> Matcher<'i> {
    fn rewind(&mut self, mark: usize) {
        self.events.truncate(mark);
    }

    fn boundary(&self, pos: usize) -> Option<usize> {
        let input = self.input;
        let mut end = pos;
        while let Some((cp, width)) = decode_at(input, end) {
            if !NamedClass::Space.contains(cp) {
                break;
            }
            end += width;
        }
        if end > pos || pos == 0 || pos >= input.len() {
            return Some(end);
        }
        let before = decode_before(input, pos)?;
        let (after, _) = decode_at(input, pos)?;
        let word_before = NamedClass::Word.contains(before);
        let word_after = NamedClass::Word.contains(after);
        if word_before != word_after
            || NamedClass::Punct.contains(before)
            || NamedClass::Punct.contains(after)
        {
            Some(pos)
        } else {
            None
        }
    }

    fn run(&mut self, node: &Node, pos: usize) -> Step {
        let input = self.input;
        match node {
            Node::Literal(bytes) => Ok(input[pos..]
                .starts_with(bytes)
                .then(|| pos + bytes.len())),
            Node::Set(set) => Ok(decode_at(input, pos)
                .filter(|(cp, _)| set.contains(*cp))
                .map(|(_, width)| pos + width)),
            Node::Any => Ok(decode_at(input, pos).map(|(_, width)| pos + width)),
            Node::Start => Ok((pos == 0).then_some(pos)),
            Node::End => Ok((pos == input.len()).then_some(pos)),
            Node::Boundary => Ok(self.boundary(pos)),
            Node::Halt => Err(Halted(pos)),
            Node::Seq(items) => {
                let mark = self.events.len();
                let mut cur = pos;
                for item in items {
                    match self.run(item, cur)? {
                        Some(next) => cur = next,
                        None => {
                            self.rewind(mark);
                            return Ok(None);
                        }
                    }
                }
                Ok(Some(cur))
            }
            Node::Choice(alternatives) => {
                let mark = self.events.len();
                for alt in alternatives {
                    if let Some(end) = self.run(alt, pos)? {
                        return Ok(Some(end));
                    }
                    self.rewind(mark);
                }
                Ok(None)
            }
            Node::Repeat {
                node,
                min,
                max,
                boundary,
            } => {
                let start_mark = self.events.len();
                let mut count = 0u32;
                let mut cur = pos;
                loop {
                    if max.is_some_and(|m| count >= m) {
                        break;
                    }
                    let mark = self.events.len();
                    let mut at = cur;
                    if *boundary && count > 0 {
                        match self.boundary(at) {
                            Some(next) => at = next,
                            None => break,
                        }
                    }
                    match self.run(node, at)? {
                        Some(next) => {
                            let progressed = next != cur;
                            cur = next;
                            count += 1;
                            if !progressed && count >= *min {
                                break;
                            }
                        }
                        None => {
                            self.rewind(mark);
                            break;
                        }
                    }
                }
                if count >= *min {
                    Ok(Some(cur))
                } else {
                    self.rewind(start_mark);
                    Ok(None)
                }
            }
            Node::Not(inner) => {
                let mark = self.events.len();
                let result = self.run(inner, pos)?;
                self.rewind(mark);
                Ok(match result {
                    Some(_) => None,
                    None => Some(pos),
                })
            }
            Node::Look(inner) => {
                let mark = self.events.len();
                let result = self.run(inner, pos)?;
                self.rewind(mark);
                Ok(result.map(|_| pos))
            }
            Node::Capture { name, node } => {
                let mark = self.events.len();
                self.events.push(Event::Open {
                    name: Arc::clone(name),
                    start: pos,
                });
                let slot = self.trace.as_mut().map(|trace| {
                    trace.push(TraceEvent {
                        depth: self.depth,
                        name: Arc::clone(name),
                        start: pos,
                        end: None,
                    });
                    trace.len() - 1
                });
                self.depth += 1;
                let result = self.run(node, pos);
                self.depth -= 1;
                match result {
                    Ok(Some(end)) => {
                        self.events.push(Event::Close { end });
                        if let (Some(trace), Some(slot)) = (self.trace.as_mut(), slot) {
                            trace[slot].end = Some(end);
                        }
                        Ok(Some(end))
                    }
                    Ok(None) => {
                        self.rewind(mark);
                        Ok(None)
                    }
                    Err(halted) => {
                        if let (Some(trace), Some(slot)) = (self.trace.as_mut(), slot) {
                            trace[slot].end = Some(halted.0);
                        }
                        Err(halted)
                    }
                }
            }
            Node::Call(body) => self.run(body, pos),
        }
    }

    /// Fold the flat event list into a tree. Captures left open by `halt`
    /// are closed at `halt_pos`.
    fn build_tree(events: Vec<Event>, halt_pos: usize) -> Option<Capture> {
        let mut stack: Vec<Capture> = Vec::new();
        let mut root = None;
        let close = |stack: &mut Vec<Capture>, root: &mut Option<Capture>, end: usize| {
            if let Some(mut done) = stack.pop() {
                done.end = end;
                match stack.last_mut() {
                    Some(parent) => parent.subs.push(done),
                    None => *root = Some(done),
                }
            }
        };
        for event in events {
            match event {
                Event::Open { name, start } => stack.push(Capture {
                    name,
                    start,
                    end: start,
                    subs: Vec::new(),
                }),
                Event::Close { end } => close(&mut stack, &mut root, end),
            }
        }
        while !stack.is_empty() {
            close(&mut stack, &mut root, halt_pos);
        }
        root
    }
}

/// Match `node` against `input` beginning at byte offset `start`.
pub fn execute(node: &Node, input: &[u8], start: usize, trace: bool) -> MatchOutcome {
    let began = Instant::now();
    let mut matcher = Matcher {
        input,
        events: Vec::new(),
        trace: trace.then(Vec::new),
        depth: 0,
    };
    let start = start.min(input.len());
    let (end, abend, halt_pos) = match matcher.run(node, start) {
        Ok(end) => (end, false, 0),
        Err(Halted(pos)) => (Some(pos), true, pos),
    };
    let capture = match end {
        Some(_) => Matcher::build_tree(std::mem::take(&mut matcher.events), halt_pos),
        None => None,
    };
    MatchOutcome {
        capture,
        end,
        abend,
        elapsed: began.elapsed(),
        trace: matcher.trace.unwrap_or_default(),
    }
}
