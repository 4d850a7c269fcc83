pub mod parser;
pub mod regex;

pub use parser::{parse_regex, ParseError};
pub use regex::Regex;

/// Matches `pattern` against one line, reporting malformed patterns as
/// errors rather than as a silent non-match.
pub fn match_pattern(pattern: &str, line: &str) -> Result<bool, ParseError> {
    Ok(Regex::new(pattern)?.is_match(line))
}
