use flowlens::filter::{self, FilterError};
use flowlens::flow::{Flow, Request};

fn get_flow(id: &str, host: &str) -> Flow {
    let mut flow = Flow::new(id);
    flow.request = Some(Request {
        scheme: "http".to_string(),
        host: host.to_string(),
        port: 80,
        path: "/".to_string(),
        method: "GET".to_string(),
        http_version: None,
        headers: Vec::new(),
        content_length: None,
        timestamp_start: None,
        timestamp_end: None,
    });
    flow
}

#[test]
fn test_empty_query_matches_everything() {
    let pred = filter::parse("").expect("empty query is valid");
    assert_eq!(pred.description(), "true");
    assert!(pred.matches(&get_flow("f", "example.com")));
    assert!(pred.matches(&Flow::new("bare")));

    let pred = filter::parse("   \n\t ").expect("whitespace-only query is valid");
    assert!(pred.matches(&Flow::new("bare")));
}

#[test]
fn test_double_negation_matches_everything() {
    let pred = filter::parse("!!true").expect("valid query");
    assert!(pred.matches(&get_flow("f", "example.com")));
    assert!(pred.matches(&Flow::new("bare")));

    let pred = filter::parse("!false").expect("valid query");
    assert!(pred.matches(&Flow::new("bare")));
}

#[test]
fn test_missing_argument_is_a_syntax_error_at_end_of_input() {
    let err = filter::parse("~d").expect_err("missing argument must fail");
    let FilterError::Syntax(err) = err else {
        panic!("expected a syntax error, got {err:?}");
    };
    assert_eq!(err.offset, 2);
    assert_eq!(err.line, 1);
    assert_eq!(err.column, 3);
    assert_eq!(err.found, None, "failure must point at end of input");
    assert!(!err.expected.is_empty());
}

#[test]
fn test_bad_pattern_is_not_a_syntax_error() {
    let err = filter::parse("~d [").expect_err("unclosed class must fail");
    let FilterError::Pattern(err) = err else {
        panic!("expected a pattern error, got {err:?}");
    };
    assert_eq!(err.pattern, "[");
}

#[test]
fn test_trailing_input_is_rejected_at_first_unconsumed_offset() {
    let err = filter::parse("~a )").expect_err("stray paren must fail");
    let FilterError::Syntax(err) = err else {
        panic!("expected a syntax error, got {err:?}");
    };
    assert_eq!(err.offset, 3);
    assert_eq!(err.found, Some(')'));
}

#[test]
fn test_error_location_is_one_based_line_and_column() {
    let err = filter::parse("~a\n| ~d").expect_err("missing argument must fail");
    let FilterError::Syntax(err) = err else {
        panic!("expected a syntax error, got {err:?}");
    };
    assert_eq!(err.line, 2);
    assert_eq!(err.column, 5);
}

#[test]
fn test_expected_tokens_are_sorted_and_deduplicated() {
    let err = filter::parse("&").expect_err("dangling operator must fail");
    let FilterError::Syntax(err) = err else {
        panic!("expected a syntax error, got {err:?}");
    };
    let mut sorted = err.expected.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(err.expected, sorted);
}

#[test]
fn test_failed_parse_leaves_previous_predicate_usable() {
    let good = filter::parse("~d example").expect("valid query");
    assert!(filter::parse("~d (").is_err());
    // the earlier predicate is unaffected by the failed parse
    assert!(good.matches(&get_flow("f", "example.com")));
}

#[test]
fn test_quoted_arguments_accept_spaces_and_escapes() {
    let pred = filter::parse(r#"~u "example\.com/a b""#).expect("valid query");
    let mut flow = get_flow("f", "example.com");
    if let Some(request) = flow.request.as_mut() {
        request.path = "/a b".to_string();
    }
    assert!(pred.matches(&flow));
}

#[test]
fn test_bare_word_stops_at_control_characters() {
    // "example.com)" never parses as one bare word: ')' terminates it and
    // then trips the end-of-input check
    let err = filter::parse("example.com)").expect_err("stray paren must fail");
    let FilterError::Syntax(err) = err else {
        panic!("expected a syntax error, got {err:?}");
    };
    assert_eq!(err.found, Some(')'));
}
