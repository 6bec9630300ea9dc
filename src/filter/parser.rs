use super::ast::{FilterAst, LeafKind};
use super::error::ParseError;

/// Parses filter query text into a syntax tree.
///
/// Parsing is all-or-nothing: trailing unconsumed input is an error, and an
/// all-whitespace query yields [`FilterAst::True`].
pub fn parse_ast(text: &str) -> Result<FilterAst, ParseError> {
    Parser::new(text).parse()
}

/// Marker for a failed alternative. The real error is assembled once, at the
/// top, from the farthest failure the parser recorded.
struct Backtrack;

type PResult<T> = Result<T, Backtrack>;

/// Hand-written recursive-descent parser.
///
/// Precedence, loosest binding first: `|`, then `&` (or plain whitespace
/// between two expressions), then `!`, then parentheses. `|`, `&` and `!`
/// are all right-recursive. Alternatives backtrack on failure while the
/// parser keeps the farthest failure position and every token description
/// tried there, which is what ends up in the reported [`ParseError`].
struct Parser {
    chars: Vec<char>,
    pos: usize,
    fail_pos: usize,
    expected: Vec<&'static str>,
}

impl Parser {
    fn new(text: &str) -> Self {
        Parser {
            chars: text.chars().collect(),
            pos: 0,
            fail_pos: 0,
            expected: Vec::new(),
        }
    }

    fn parse(mut self) -> Result<FilterAst, ParseError> {
        self.skip_ws();
        if self.at_end() {
            return Ok(FilterAst::True);
        }
        match self.or_expr() {
            Ok(expr) => {
                self.skip_ws();
                if self.at_end() {
                    Ok(expr)
                } else {
                    self.record("end of input");
                    Err(self.error())
                }
            }
            Err(Backtrack) => Err(self.error()),
        }
    }

    // ---- grammar rules -------------------------------------------------

    fn or_expr(&mut self) -> PResult<FilterAst> {
        let first = self.and_expr()?;
        let save = self.pos;
        self.skip_ws();
        if self.eat('|') {
            self.skip_ws();
            if let Ok(second) = self.or_expr() {
                return Ok(FilterAst::Or(Box::new(first), Box::new(second)));
            }
        } else {
            self.record("'|'");
        }
        self.pos = save;
        Ok(first)
    }

    fn and_expr(&mut self) -> PResult<FilterAst> {
        let first = self.not_expr()?;
        let save = self.pos;
        self.skip_ws();
        if self.eat('&') {
            self.skip_ws();
            if let Ok(second) = self.and_expr() {
                return Ok(FilterAst::And(Box::new(first), Box::new(second)));
            }
            self.pos = save;
        } else {
            self.record("'&'");
            self.pos = save;
            // bare whitespace between two expressions is an implicit And
            if self.skip_ws() > 0 {
                if let Ok(second) = self.and_expr() {
                    return Ok(FilterAst::And(Box::new(first), Box::new(second)));
                }
                self.pos = save;
            }
        }
        Ok(first)
    }

    fn not_expr(&mut self) -> PResult<FilterAst> {
        if self.eat('!') {
            self.skip_ws();
            let expr = self.not_expr()?;
            Ok(FilterAst::Not(Box::new(expr)))
        } else {
            self.record("'!'");
            self.binding_expr()
        }
    }

    fn binding_expr(&mut self) -> PResult<FilterAst> {
        if self.eat('(') {
            self.skip_ws();
            let expr = self.or_expr()?;
            self.skip_ws();
            if self.eat(')') {
                Ok(FilterAst::Group(Box::new(expr)))
            } else {
                self.fail("')'")
            }
        } else {
            self.record("'('");
            self.expr()
        }
    }

    fn expr(&mut self) -> PResult<FilterAst> {
        // boolean literals match by prefix, like every other token: "truex"
        // consumes "true" and leaves the rest for the caller to reject
        if self.eat_str("true") {
            return Ok(FilterAst::True);
        }
        if self.eat_str("false") {
            return Ok(FilterAst::False);
        }

        if self.eat_str("~a") {
            return Ok(FilterAst::Leaf(LeafKind::Asset));
        }
        if self.eat_str("~e") {
            return Ok(FilterAst::Leaf(LeafKind::HasError));
        }
        if self.eat_str("~q") {
            return Ok(FilterAst::Leaf(LeafKind::NoResponse));
        }
        if self.eat_str("~s") {
            return Ok(FilterAst::Leaf(LeafKind::HasResponse));
        }

        if self.eat_str("~c") {
            self.skip_ws();
            let code = self.integer()?;
            return Ok(FilterAst::Leaf(LeafKind::ResponseCode(code)));
        }
        if self.eat_str("~d") {
            self.skip_ws();
            let pattern = self.string()?;
            return Ok(FilterAst::Leaf(LeafKind::Domain(pattern)));
        }
        // longer header/content-type tags before their one-letter prefixes
        if self.eat_str("~hq") {
            self.skip_ws();
            let pattern = self.string()?;
            return Ok(FilterAst::Leaf(LeafKind::RequestHeader(pattern)));
        }
        if self.eat_str("~hs") {
            self.skip_ws();
            let pattern = self.string()?;
            return Ok(FilterAst::Leaf(LeafKind::ResponseHeader(pattern)));
        }
        if self.eat_str("~h") {
            self.skip_ws();
            let pattern = self.string()?;
            return Ok(FilterAst::Leaf(LeafKind::Header(pattern)));
        }
        if self.eat_str("~m") {
            self.skip_ws();
            let pattern = self.string()?;
            return Ok(FilterAst::Leaf(LeafKind::Method(pattern)));
        }
        if self.eat_str("~tq") {
            self.skip_ws();
            let pattern = self.string()?;
            return Ok(FilterAst::Leaf(LeafKind::RequestContentType(pattern)));
        }
        if self.eat_str("~ts") {
            self.skip_ws();
            let pattern = self.string()?;
            return Ok(FilterAst::Leaf(LeafKind::ResponseContentType(pattern)));
        }
        if self.eat_str("~t") {
            self.skip_ws();
            let pattern = self.string()?;
            return Ok(FilterAst::Leaf(LeafKind::ContentType(pattern)));
        }
        if self.eat_str("~u") {
            self.skip_ws();
            let pattern = self.string()?;
            return Ok(FilterAst::Leaf(LeafKind::Url(pattern)));
        }

        // a bare or quoted string with no tag is shorthand for a URL filter
        self.record("filter expression");
        let pattern = self.string()?;
        Ok(FilterAst::Leaf(LeafKind::Url(pattern)))
    }

    // ---- literals ------------------------------------------------------

    fn integer(&mut self) -> PResult<u32> {
        let save = self.pos;
        // a stray quote around the number is tolerated and stripped
        if matches!(self.peek(), Some('\'' | '"')) {
            self.pos += 1;
        }
        let start = self.pos;
        while matches!(self.peek(), Some('0'..='9')) {
            self.pos += 1;
        }
        if self.pos == start {
            self.pos = save;
            return self.fail("integer");
        }
        let digits: String = self.chars[start..self.pos].iter().collect();
        let Ok(value) = digits.parse::<u32>() else {
            self.pos = start;
            return self.fail("integer");
        };
        if matches!(self.peek(), Some('\'' | '"')) {
            self.pos += 1;
        }
        Ok(value)
    }

    fn string(&mut self) -> PResult<String> {
        if self.eat('"') {
            return self.quoted('"');
        }
        if self.eat('\'') {
            return self.quoted('\'');
        }
        // unquoted: a run of characters up to whitespace or a control char
        let start = self.pos;
        while let Some(c) = self.peek() {
            if is_ws(c) || is_control(c) {
                break;
            }
            self.pos += 1;
        }
        if self.pos == start {
            return self.fail("string");
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn quoted(&mut self, quote: char) -> PResult<String> {
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return self.fail("closing quote"),
                Some(c) if c == quote => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some('\\') => {
                    self.pos += 1;
                    match self.peek() {
                        Some(c @ ('"' | '\'' | '\\')) => {
                            out.push(c);
                            self.pos += 1;
                        }
                        Some('n') => {
                            out.push('\n');
                            self.pos += 1;
                        }
                        Some('r') => {
                            out.push('\r');
                            self.pos += 1;
                        }
                        Some('t') => {
                            out.push('\t');
                            self.pos += 1;
                        }
                        _ => return self.fail("escape sequence"),
                    }
                }
                Some(c) => {
                    out.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    // ---- machinery -----------------------------------------------------

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_str(&mut self, s: &str) -> bool {
        let end = self.pos + s.chars().count();
        if end <= self.chars.len() && self.chars[self.pos..end].iter().copied().eq(s.chars()) {
            self.pos = end;
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) -> usize {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if is_ws(c)) {
            self.pos += 1;
        }
        self.pos - start
    }

    /// Records that `desc` would have been accepted at the current position.
    /// Only the farthest failure position is kept; reaching a new farthest
    /// position discards earlier expectations.
    fn record(&mut self, desc: &'static str) {
        if self.pos > self.fail_pos {
            self.fail_pos = self.pos;
            self.expected.clear();
        }
        if self.pos == self.fail_pos && !self.expected.contains(&desc) {
            self.expected.push(desc);
        }
    }

    fn fail<T>(&mut self, desc: &'static str) -> PResult<T> {
        self.record(desc);
        Err(Backtrack)
    }

    fn error(&self) -> ParseError {
        let offset = self.fail_pos;
        let mut line = 1;
        let mut column = 1;
        for &c in &self.chars[..offset] {
            if c == '\n' {
                line += 1;
                column = 1;
            } else {
                column += 1;
            }
        }
        let mut expected: Vec<String> = self.expected.iter().map(|s| s.to_string()).collect();
        expected.sort();
        expected.dedup();
        ParseError {
            offset,
            line,
            column,
            expected,
            found: self.chars.get(offset).copied(),
        }
    }
}

fn is_ws(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

fn is_control(c: char) -> bool {
    matches!(c, '|' | '&' | '!' | '(' | ')' | '~' | '"')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(kind: LeafKind) -> Box<FilterAst> {
        Box::new(FilterAst::Leaf(kind))
    }

    #[test]
    fn test_empty_input_matches_everything() {
        assert_eq!(parse_ast("").unwrap(), FilterAst::True);
        assert_eq!(parse_ast(" \t\r\n ").unwrap(), FilterAst::True);
    }

    #[test]
    fn test_boolean_literals() {
        assert_eq!(parse_ast("true").unwrap(), FilterAst::True);
        assert_eq!(parse_ast("false").unwrap(), FilterAst::False);
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let ast = parse_ast("~a | ~e & ~s").unwrap();
        assert_eq!(
            ast,
            FilterAst::Or(
                leaf(LeafKind::Asset),
                Box::new(FilterAst::And(
                    leaf(LeafKind::HasError),
                    leaf(LeafKind::HasResponse)
                ))
            )
        );
    }

    #[test]
    fn test_whitespace_is_an_implicit_and() {
        let explicit = parse_ast("~m GET & ~d example\\.com").unwrap();
        let implicit = parse_ast("~m GET ~d example\\.com").unwrap();
        assert_eq!(explicit, implicit);
    }

    #[test]
    fn test_not_is_right_recursive() {
        let ast = parse_ast("!!~e").unwrap();
        assert_eq!(
            ast,
            FilterAst::Not(Box::new(FilterAst::Not(leaf(LeafKind::HasError))))
        );
    }

    #[test]
    fn test_parentheses_group_and_reset_precedence() {
        let ast = parse_ast("(~a | ~e) & ~s").unwrap();
        assert_eq!(
            ast,
            FilterAst::And(
                Box::new(FilterAst::Group(Box::new(FilterAst::Or(
                    leaf(LeafKind::Asset),
                    leaf(LeafKind::HasError)
                )))),
                leaf(LeafKind::HasResponse)
            )
        );
    }

    #[test]
    fn test_bare_word_is_a_url_filter() {
        assert_eq!(
            parse_ast("example.com/path").unwrap(),
            FilterAst::Leaf(LeafKind::Url("example.com/path".to_string()))
        );
    }

    #[test]
    fn test_longest_tag_wins() {
        assert_eq!(
            parse_ast("~hq cookie").unwrap(),
            FilterAst::Leaf(LeafKind::RequestHeader("cookie".to_string()))
        );
        assert_eq!(
            parse_ast("~h cookie").unwrap(),
            FilterAst::Leaf(LeafKind::Header("cookie".to_string()))
        );
        assert_eq!(
            parse_ast("~ts json").unwrap(),
            FilterAst::Leaf(LeafKind::ResponseContentType("json".to_string()))
        );
    }

    #[test]
    fn test_argument_whitespace_is_optional() {
        assert_eq!(
            parse_ast("~c404").unwrap(),
            FilterAst::Leaf(LeafKind::ResponseCode(404))
        );
        assert_eq!(
            parse_ast("~d\"example\"").unwrap(),
            FilterAst::Leaf(LeafKind::Domain("example".to_string()))
        );
    }

    #[test]
    fn test_integer_tolerates_surrounding_quotes() {
        assert_eq!(
            parse_ast("~c \"404\"").unwrap(),
            FilterAst::Leaf(LeafKind::ResponseCode(404))
        );
        assert_eq!(
            parse_ast("~c '302'").unwrap(),
            FilterAst::Leaf(LeafKind::ResponseCode(302))
        );
    }

    #[test]
    fn test_quoted_strings_unescape() {
        assert_eq!(
            parse_ast(r#"~u "a\"b\\c\nd""#).unwrap(),
            FilterAst::Leaf(LeafKind::Url("a\"b\\c\nd".to_string()))
        );
        assert_eq!(
            parse_ast(r"~u 'it\'s'").unwrap(),
            FilterAst::Leaf(LeafKind::Url("it's".to_string()))
        );
    }

    #[test]
    fn test_single_quotes_may_hold_double_quotes() {
        assert_eq!(
            parse_ast(r#"~u 'say "hi"'"#).unwrap(),
            FilterAst::Leaf(LeafKind::Url("say \"hi\"".to_string()))
        );
    }

    #[test]
    fn test_missing_argument_reports_end_of_input() {
        let err = parse_ast("~d").unwrap_err();
        assert_eq!(err.offset, 2);
        assert_eq!(err.found, None);
        assert!(err.expected.contains(&"string".to_string()));
    }

    #[test]
    fn test_trailing_garbage_is_rejected() {
        let err = parse_ast("truex").unwrap_err();
        assert_eq!(err.offset, 4);
        assert_eq!(err.found, Some('x'));
        assert!(err.expected.contains(&"end of input".to_string()));
    }

    #[test]
    fn test_unclosed_group_reports_missing_paren() {
        let err = parse_ast("(~a").unwrap_err();
        assert_eq!(err.found, None);
        assert!(err.expected.contains(&"')'".to_string()));
    }

    #[test]
    fn test_unterminated_string_reports_missing_quote() {
        let err = parse_ast("~u \"abc").unwrap_err();
        assert_eq!(err.found, None);
        assert!(err.expected.contains(&"closing quote".to_string()));
    }

    #[test]
    fn test_bad_escape_is_rejected() {
        let err = parse_ast(r#"~u "a\x""#).unwrap_err();
        assert_eq!(err.found, Some('x'));
        assert!(err.expected.contains(&"escape sequence".to_string()));
    }

    #[test]
    fn test_error_location_spans_lines() {
        let err = parse_ast("~a &\n  ~d").unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.column, 5);
        assert_eq!(err.offset, 9);
    }

    #[test]
    fn test_expected_set_is_sorted_and_unique() {
        let err = parse_ast("~a & )").unwrap_err();
        let mut sorted = err.expected.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(err.expected, sorted);
    }

    #[test]
    fn test_or_is_right_associative() {
        let ast = parse_ast("~a | ~e | ~s").unwrap();
        assert_eq!(
            ast,
            FilterAst::Or(
                leaf(LeafKind::Asset),
                Box::new(FilterAst::Or(
                    leaf(LeafKind::HasError),
                    leaf(LeafKind::HasResponse)
                ))
            )
        );
    }
}
