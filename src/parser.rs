use nom::{
    branch::alt,
    character::complete::{anychar, char, none_of, one_of},
    combinator::{eof, map, opt, value},
    multi::{many0, many1, separated_list1},
    sequence::{terminated, tuple},
    IResult,
};
use std::cell::RefCell;
use thiserror::Error;

use crate::regex::{ClassItem, Pattern, Regex};

/// Why a pattern failed to compile.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unmatched ')'")]
    UnmatchedParen,
    #[error("missing closing ')'")]
    UnclosedGroup,
    #[error("missing closing ']'")]
    UnclosedClass,
    #[error("empty character class")]
    EmptyClass,
    #[error("trailing backslash")]
    DanglingEscape,
    #[error("'{0}' has nothing to repeat")]
    DanglingQuantifier(char),
    #[error("'{0}' cannot be applied to an anchor")]
    QuantifiedAnchor(char),
    #[error("back-reference \\{0} to a group that does not exist")]
    InvalidBackreference(usize),
    #[error("unparsable pattern near '{0}'")]
    Unexpected(String),
}

/// Hands out group indices in order of opening parenthesis.
struct GroupContext {
    counter: RefCell<usize>,
}

impl GroupContext {
    fn new() -> Self {
        GroupContext {
            counter: RefCell::new(0),
        }
    }

    fn open(&self) -> usize {
        let mut counter = self.counter.borrow_mut();
        *counter += 1;
        *counter
    }

    fn total(&self) -> usize {
        *self.counter.borrow()
    }
}

/// Compile `pattern` into a [`Regex`], or name what is wrong with it.
pub fn parse_regex(pattern: &str) -> Result<Regex, ParseError> {
    let ctx = GroupContext::new();
    // `^` anchors only when it opens the whole pattern.
    let (body, anchored) = match pattern.strip_prefix('^') {
        Some(rest) => (rest, true),
        None => (pattern, false),
    };
    match sequence(body, &ctx, false) {
        Ok(("", mut program)) => {
            if anchored {
                program.insert(0, Pattern::StartAnchor);
            }
            let groups = ctx.total();
            check_backreferences(&program, groups)?;
            Ok(Regex { program, groups })
        }
        Ok((rest, _)) => Err(describe_malformation(pattern)
            .unwrap_or_else(|| ParseError::Unexpected(rest.chars().take(8).collect()))),
        Err(_) => Err(describe_malformation(pattern)
            .unwrap_or_else(|| ParseError::Unexpected(pattern.chars().take(8).collect()))),
    }
}

fn sequence<'a>(input: &'a str, ctx: &GroupContext, in_group: bool) -> IResult<&'a str, Vec<Pattern>> {
    many0(|i| quantified(i, ctx, in_group))(input)
}

fn quantified<'a>(input: &'a str, ctx: &GroupContext, in_group: bool) -> IResult<&'a str, Pattern> {
    let (input, base) = atom(input, ctx, in_group)?;
    let (input, quantifier) = opt(one_of("?+*"))(input)?;
    let pattern = match quantifier {
        Some('?') => Pattern::ZeroOrOne(Box::new(base)),
        Some('+') => Pattern::OneOrMore(Box::new(base)),
        Some('*') => Pattern::ZeroOrMore(Box::new(base)),
        _ => base,
    };
    Ok((input, pattern))
}

fn atom<'a>(input: &'a str, ctx: &GroupContext, in_group: bool) -> IResult<&'a str, Pattern> {
    alt((
        end_anchor,
        value(Pattern::Wildcard, char('.')),
        escape,
        char_class,
        |i| group(i, ctx),
        |i| literal(i, in_group),
    ))(input)
}

// `$` anchors only when it closes the whole pattern.
fn end_anchor(input: &str) -> IResult<&str, Pattern> {
    value(Pattern::EndAnchor, terminated(char('$'), eof))(input)
}

fn escape(input: &str) -> IResult<&str, Pattern> {
    let (input, _) = char('\\')(input)?;
    let (input, escaped) = anychar(input)?;
    let pattern = match escaped {
        'd' => Pattern::Digit,
        'w' => Pattern::Word,
        '1'..='9' => Pattern::Backreference(escaped as usize - '0' as usize),
        other => Pattern::Lit(other),
    };
    Ok((input, pattern))
}

fn char_class(input: &str) -> IResult<&str, Pattern> {
    let (input, _) = char('[')(input)?;
    let (input, negated) = opt(char('^'))(input)?;
    let (input, items) = many1(class_item)(input)?;
    let (input, _) = char(']')(input)?;
    Ok((
        input,
        Pattern::CharClass {
            items,
            negated: negated.is_some(),
        },
    ))
}

fn class_item(input: &str) -> IResult<&str, ClassItem> {
    alt((
        map(
            tuple((none_of("]"), char('-'), none_of("]"))),
            |(lo, _, hi)| ClassItem::Range(lo, hi),
        ),
        map(none_of("]"), ClassItem::Char),
    ))(input)
}

fn group<'a>(input: &'a str, ctx: &GroupContext) -> IResult<&'a str, Pattern> {
    let (input, _) = char('(')(input)?;
    let index = ctx.open();
    let (input, branches) = separated_list1(char('|'), |i| sequence(i, ctx, true))(input)?;
    let (input, _) = char(')')(input)?;
    Ok((input, Pattern::Group { branches, index }))
}

fn literal(input: &str, in_group: bool) -> IResult<&str, Pattern> {
    // `|` separates branches inside a group; at top level it is a plain
    // character.
    let reserved = if in_group { ".?+*()[\\|" } else { ".?+*()[\\" };
    map(none_of(reserved), Pattern::Lit)(input)
}

fn check_backreferences(patterns: &[Pattern], groups: usize) -> Result<(), ParseError> {
    for pattern in patterns {
        match pattern {
            Pattern::Backreference(index) if *index > groups => {
                return Err(ParseError::InvalidBackreference(*index));
            }
            Pattern::OneOrMore(inner) | Pattern::ZeroOrMore(inner) | Pattern::ZeroOrOne(inner) => {
                check_backreferences(std::slice::from_ref(inner), groups)?;
            }
            Pattern::Group { branches, .. } => {
                for branch in branches {
                    check_backreferences(branch, groups)?;
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Names the first structural problem in a pattern the grammar refused.
fn describe_malformation(pattern: &str) -> Option<ParseError> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut depth = 0usize;
    // whether a quantifier may attach to whatever just ended
    let mut repeatable = false;
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\\' => {
                if i + 1 >= chars.len() {
                    return Some(ParseError::DanglingEscape);
                }
                i += 2;
                repeatable = true;
            }
            '[' => {
                let mut j = i + 1;
                if chars.get(j) == Some(&'^') {
                    j += 1;
                }
                let body = j;
                while j < chars.len() && chars[j] != ']' {
                    j += 1;
                }
                if j >= chars.len() {
                    return Some(ParseError::UnclosedClass);
                }
                if j == body {
                    return Some(ParseError::EmptyClass);
                }
                i = j + 1;
                repeatable = true;
            }
            '(' => {
                depth += 1;
                i += 1;
                repeatable = false;
            }
            ')' => {
                if depth == 0 {
                    return Some(ParseError::UnmatchedParen);
                }
                depth -= 1;
                i += 1;
                repeatable = true;
            }
            q @ ('?' | '+' | '*') => {
                if !repeatable {
                    return Some(if i == 1 && chars[0] == '^' {
                        ParseError::QuantifiedAnchor(q)
                    } else {
                        ParseError::DanglingQuantifier(q)
                    });
                }
                i += 1;
                repeatable = false;
            }
            '^' => {
                // an anchor when it opens the pattern, a literal elsewhere
                repeatable = i > 0;
                i += 1;
            }
            '|' => {
                // a branch separator inside a group, a literal at top level
                repeatable = depth == 0;
                i += 1;
            }
            _ => {
                i += 1;
                repeatable = true;
            }
        }
    }
    (depth > 0).then_some(ParseError::UnclosedGroup)
}
