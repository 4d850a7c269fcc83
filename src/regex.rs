use tracing::trace;

use crate::parser::{self, ParseError};

/// One compiled syntactic unit of a pattern.
#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    StartAnchor,
    EndAnchor,
    Digit,
    Word,
    Wildcard,
    Lit(char),
    CharClass { items: Vec<ClassItem>, negated: bool },
    OneOrMore(Box<Pattern>),
    ZeroOrMore(Box<Pattern>),
    ZeroOrOne(Box<Pattern>),
    Group { branches: Vec<Vec<Pattern>>, index: usize },
    Backreference(usize),
}

/// A single member or inclusive range inside `[...]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClassItem {
    Char(char),
    Range(char, char),
}

impl ClassItem {
    fn admits(self, ch: char) -> bool {
        match self {
            ClassItem::Char(c) => c == ch,
            ClassItem::Range(lo, hi) => lo <= ch && ch <= hi,
        }
    }
}

/// A compiled pattern, ready to test lines against.
#[derive(Debug, Clone)]
pub struct Regex {
    pub(crate) program: Vec<Pattern>,
    pub(crate) groups: usize,
}

impl Regex {
    pub fn new(pattern: &str) -> Result<Self, ParseError> {
        parser::parse_regex(pattern)
    }

    /// Does the pattern match some substring of `line`?
    pub fn is_match(&self, line: &str) -> bool {
        let input: Vec<char> = line.chars().collect();
        let last_start = if matches!(self.program.first(), Some(Pattern::StartAnchor)) {
            0
        } else {
            input.len()
        };
        for start in 0..=last_start {
            let mut matcher = Matcher::new(&input, self.groups);
            if matcher.match_from(&self.program, start) {
                trace!(start, "match");
                return true;
            }
        }
        false
    }
}

/// The continuation a partial match hands its tail to. It receives the
/// matcher (captures included) and the input position reached so far, and
/// reports whether the remainder of the whole pattern succeeded from there.
type Accept<'t, 'a> = dyn FnMut(&mut Matcher<'t>, usize) -> bool + 'a;

/// One match attempt against one line. Owns the capture table; every
/// backtracking choice point snapshots and restores it so bindings made on
/// an abandoned branch never leak into its siblings.
struct Matcher<'t> {
    input: &'t [char],
    captures: Vec<Option<String>>,
}

impl<'t> Matcher<'t> {
    fn new(input: &'t [char], groups: usize) -> Self {
        Matcher {
            input,
            // groups are 1-indexed
            captures: vec![None; groups + 1],
        }
    }

    fn match_from(&mut self, program: &[Pattern], start: usize) -> bool {
        let mut matched = |_: &mut Self, _: usize| true;
        self.match_seq(program, start, &mut matched)
    }

    /// Matches `patterns` left to right starting at `idx`, feeding every end
    /// position the sequence can reach into `accept`, in greedy order, until
    /// one is accepted.
    fn match_seq(&mut self, patterns: &[Pattern], idx: usize, accept: &mut Accept<'t, '_>) -> bool {
        let Some((head, rest)) = patterns.split_first() else {
            return accept(self, idx);
        };
        match head {
            Pattern::OneOrMore(inner) => self.match_repeat(inner, rest, idx, true, accept),
            Pattern::ZeroOrMore(inner) => self.match_repeat(inner, rest, idx, false, accept),
            Pattern::ZeroOrOne(inner) => {
                let snapshot = self.captures.clone();
                let mut keep = |m: &mut Self, end: usize| m.match_seq(rest, end, accept);
                if self.match_seq(std::slice::from_ref(inner), idx, &mut keep) {
                    return true;
                }
                self.captures = snapshot;
                self.match_seq(rest, idx, accept)
            }
            Pattern::Group { branches, index } => {
                let entry = self.captures.clone();
                for branch in branches {
                    let mut close = |m: &mut Self, end: usize| {
                        m.captures[*index] = Some(m.input[idx..end].iter().collect());
                        m.match_seq(rest, end, accept)
                    };
                    if self.match_seq(branch, idx, &mut close) {
                        return true;
                    }
                    self.captures = entry.clone();
                }
                false
            }
            Pattern::Backreference(group) => match self.match_backreference(idx, *group) {
                Some(end) => self.match_seq(rest, end, accept),
                None => false,
            },
            Pattern::StartAnchor => idx == 0 && self.match_seq(rest, idx, accept),
            Pattern::EndAnchor => idx == self.input.len() && self.match_seq(rest, idx, accept),
            single => match self.match_single(single, idx) {
                Some(end) => self.match_seq(rest, end, accept),
                None => false,
            },
        }
    }

    /// Greedy repetition: prefer one more iteration of `inner` over handing
    /// control to `rest`. A zero-width iteration still counts towards the
    /// one-iteration minimum but is never repeated, since it cannot make
    /// progress.
    fn match_repeat(
        &mut self,
        inner: &Pattern,
        rest: &[Pattern],
        idx: usize,
        required: bool,
        accept: &mut Accept<'t, '_>,
    ) -> bool {
        let entry = self.captures.clone();
        let mut again = |m: &mut Self, end: usize| {
            if end == idx {
                return m.match_seq(rest, end, accept);
            }
            m.match_repeat(inner, rest, end, false, accept)
        };
        if self.match_seq(std::slice::from_ref(inner), idx, &mut again) {
            return true;
        }
        self.captures = entry;
        if required {
            false
        } else {
            self.match_seq(rest, idx, accept)
        }
    }

    fn match_single(&self, pattern: &Pattern, idx: usize) -> Option<usize> {
        let ch = *self.input.get(idx)?;
        let hit = match pattern {
            Pattern::Lit(c) => *c == ch,
            Pattern::Wildcard => true,
            Pattern::Digit => ch.is_ascii_digit(),
            Pattern::Word => ch.is_ascii_alphanumeric() || ch == '_',
            Pattern::CharClass { items, negated } => {
                items.iter().any(|item| item.admits(ch)) != *negated
            }
            _ => false,
        };
        hit.then_some(idx + 1)
    }

    fn match_backreference(&self, idx: usize, group: usize) -> Option<usize> {
        let captured = self.captures.get(group)?.as_ref()?;
        let mut end = idx;
        for ch in captured.chars() {
            if self.input.get(end) != Some(&ch) {
                return None;
            }
            end += 1;
        }
        Some(end)
    }
}
