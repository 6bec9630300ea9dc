/// A parsed filter expression.
///
/// Nodes are immutable once built; the same tree may be compiled any number
/// of times. `Group` is semantically transparent and only exists so a
/// parenthesized sub-expression keeps its parentheses in the compiled
/// predicate's description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterAst {
    /// Matches every flow. Also what an all-whitespace query parses to.
    True,
    /// Matches no flow.
    False,
    Or(Box<FilterAst>, Box<FilterAst>),
    And(Box<FilterAst>, Box<FilterAst>),
    Not(Box<FilterAst>),
    Group(Box<FilterAst>),
    Leaf(LeafKind),
}

/// The fixed set of leaf filters the query language offers.
///
/// Pattern arguments are kept as raw strings here; they are compiled into
/// case-insensitive regexes when the tree is turned into a predicate, so an
/// invalid pattern surfaces as a [`PatternError`](super::PatternError)
/// rather than a syntax error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeafKind {
    /// `~a` — response content type is a web asset (script, style, image).
    Asset,
    /// `~e` — the flow carries an error.
    HasError,
    /// `~q` — a request exists but no response arrived yet.
    NoResponse,
    /// `~s` — a response exists.
    HasResponse,
    /// `~c CODE` — response status code equals the given value.
    ResponseCode(u32),
    /// `~d PATTERN` — request host matches.
    Domain(String),
    /// `~h PATTERN` — any request or response header matches.
    Header(String),
    /// `~hq PATTERN` — any request header matches.
    RequestHeader(String),
    /// `~hs PATTERN` — any response header matches.
    ResponseHeader(String),
    /// `~m PATTERN` — request method matches.
    Method(String),
    /// `~t PATTERN` — request or response content type matches.
    ContentType(String),
    /// `~tq PATTERN` — request content type matches.
    RequestContentType(String),
    /// `~ts PATTERN` — response content type matches.
    ResponseContentType(String),
    /// `~u PATTERN` (or a bare word) — request URL matches.
    Url(String),
}
