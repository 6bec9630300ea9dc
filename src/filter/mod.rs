//! Filter query parsing and compilation
//!
//! This module implements the boolean query language used to narrow the flow
//! list down. A query is compiled into a [`Predicate`] that the live view
//! evaluates against every flow.
//!
//! # Syntax
//!
//! ```text
//! a | b                Either filter may match
//! a & b                Both filters must match
//! a b                  Same as a & b
//! !a                   Negation (!!a is allowed)
//! (a | b) c            Parentheses group and reset precedence
//! true / false         Boolean literals
//! ```
//!
//! `&` binds tighter than `|`, and `!` tighter than both. An empty query
//! matches everything.
//!
//! # Filters
//!
//! ```text
//! ~a                   Response is a web asset (script, stylesheet, image)
//! ~e                   Flow has an error
//! ~q                   Request sent, no response yet
//! ~s                   Response received
//! ~c 404               Response status code
//! ~d example.com       Request host (regex)
//! ~h cookie            Any request or response header (regex on "name value")
//! ~hq cookie           Request header only
//! ~hs set-cookie       Response header only
//! ~m POST              Request method (regex)
//! ~t json              Request or response content type (regex)
//! ~tq json             Request content type only
//! ~ts json             Response content type only
//! ~u /api/             Request URL (regex)
//! /api/                A bare word is shorthand for ~u
//! ```
//!
//! Pattern arguments are case-insensitive regexes, written either as bare
//! words or as `"..."`/`'...'` strings with backslash escapes. All regexes
//! are validated when the query is compiled, so a bad pattern is reported
//! as a [`PatternError`] instead of a filter that never matches.
//!
//! # Examples
//!
//! ```text
//! ~m GET ~d example\.com       GET requests to example.com
//! ~c 404 | ~c 500              Flows that answered 404 or 500
//! !~a ~s                       Responses that are not assets
//! ```

pub mod ast;
pub mod error;
pub mod matcher;
pub mod parser;

pub use ast::{FilterAst, LeafKind};
pub use error::{FilterError, ParseError, PatternError};
pub use matcher::{Predicate, compile};
pub use parser::parse_ast;

/// Parses and compiles a filter query in one step.
///
/// Grammar mistakes come back as [`FilterError::Syntax`], bad regex
/// patterns as [`FilterError::Pattern`]; callers that want to keep a
/// previous predicate on failure can simply ignore the error.
pub fn parse(text: &str) -> Result<Predicate, FilterError> {
    let ast = parse_ast(text)?;
    Ok(compile(&ast)?)
}
