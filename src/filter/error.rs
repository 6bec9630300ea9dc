use thiserror::Error;

/// A syntax error in a filter query.
///
/// Carries the character offset of the failure, the 1-based line and column
/// computed from it, the set of token descriptions that would have been
/// accepted at that point (deduplicated and sorted), and the character
/// actually found (`None` at end of input).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "filter syntax error at line {line}, column {column}: expected {}, found {}",
    format_expected(.expected),
    format_found(.found)
)]
pub struct ParseError {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
    pub expected: Vec<String>,
    pub found: Option<char>,
}

/// A grammatically valid filter whose regex argument does not compile.
///
/// Raised while building the predicate, never while parsing, so callers can
/// tell grammar mistakes apart from bad patterns.
#[derive(Debug, Clone, Error)]
#[error("invalid filter pattern {pattern:?}: {source}")]
pub struct PatternError {
    pub pattern: String,
    #[source]
    pub source: regex::Error,
}

/// Any failure turning query text into a predicate.
#[derive(Debug, Clone, Error)]
pub enum FilterError {
    #[error(transparent)]
    Syntax(#[from] ParseError),
    #[error(transparent)]
    Pattern(#[from] PatternError),
}

fn format_expected(expected: &[String]) -> String {
    match expected {
        [] => "nothing".to_string(),
        [only] => only.clone(),
        [rest @ .., last] => format!("{} or {}", rest.join(", "), last),
    }
}

fn format_found(found: &Option<char>) -> String {
    match found {
        Some(c) => format!("{c:?}"),
        None => "end of input".to_string(),
    }
}
