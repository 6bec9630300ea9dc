use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::{Regex, RegexBuilder};

use super::ast::{FilterAst, LeafKind};
use super::error::PatternError;
use crate::flow::Flow;

static ASSET_TYPES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        "text/javascript",
        "application/x-javascript",
        "application/javascript",
        "text/css",
        "image/.*",
        "application/x-shockwave-flash",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid asset content type regex"))
    .collect()
});

/// A compiled filter: a boolean test over a flow plus a human-readable
/// description of what it matches.
///
/// Predicates are pure and never mutate the flow, so one predicate may be
/// evaluated from any number of places at once. Cloning is cheap (the
/// evaluator is shared).
#[derive(Clone)]
pub struct Predicate {
    description: String,
    eval: Arc<dyn Fn(&Flow) -> bool + Send + Sync>,
}

impl Predicate {
    fn new(
        description: impl Into<String>,
        eval: impl Fn(&Flow) -> bool + Send + Sync + 'static,
    ) -> Self {
        Predicate {
            description: description.into(),
            eval: Arc::new(eval),
        }
    }

    /// Matches every flow.
    pub fn everything() -> Self {
        Predicate::new("true", |_| true)
    }

    /// Matches no flow.
    pub fn nothing() -> Self {
        Predicate::new("false", |_| false)
    }

    pub fn matches(&self, flow: &Flow) -> bool {
        (self.eval)(flow)
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Both predicates must match. The right side is not evaluated when the
    /// left already failed, so cheap tests should go first.
    pub fn and(self, other: Predicate) -> Predicate {
        let description = format!("{} and {}", self.description, other.description);
        let (a, b) = (self.eval, other.eval);
        Predicate {
            description,
            eval: Arc::new(move |flow| a(flow) && b(flow)),
        }
    }

    /// Either predicate may match; short-circuits on the first hit.
    pub fn or(self, other: Predicate) -> Predicate {
        let description = format!("{} or {}", self.description, other.description);
        let (a, b) = (self.eval, other.eval);
        Predicate {
            description,
            eval: Arc::new(move |flow| a(flow) || b(flow)),
        }
    }

    pub fn negate(self) -> Predicate {
        let description = format!("not {}", self.description);
        let a = self.eval;
        Predicate {
            description,
            eval: Arc::new(move |flow| !a(flow)),
        }
    }

    /// Identity on behavior; wraps the description in parentheses.
    pub fn grouped(self) -> Predicate {
        Predicate {
            description: format!("({})", self.description),
            eval: self.eval,
        }
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Predicate")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Compiles a syntax tree into an executable predicate.
///
/// Every regex argument is built here, eagerly, so a bad pattern fails at
/// compile time instead of silently matching nothing on first evaluation.
/// Compiling the same tree twice yields predicates with identical behavior
/// and identical descriptions.
pub fn compile(ast: &FilterAst) -> Result<Predicate, PatternError> {
    match ast {
        FilterAst::True => Ok(Predicate::everything()),
        FilterAst::False => Ok(Predicate::nothing()),
        FilterAst::Or(left, right) => Ok(compile(left)?.or(compile(right)?)),
        FilterAst::And(left, right) => Ok(compile(left)?.and(compile(right)?)),
        FilterAst::Not(expr) => Ok(compile(expr)?.negate()),
        FilterAst::Group(expr) => Ok(compile(expr)?.grouped()),
        FilterAst::Leaf(kind) => leaf(kind),
    }
}

fn leaf(kind: &LeafKind) -> Result<Predicate, PatternError> {
    Ok(match kind {
        LeafKind::Asset => is_asset(),
        LeafKind::HasError => has_error(),
        LeafKind::NoResponse => no_response(),
        LeafKind::HasResponse => has_response(),
        LeafKind::ResponseCode(code) => response_code(*code),
        LeafKind::Domain(pattern) => domain(pattern)?,
        LeafKind::Header(pattern) => header(pattern)?,
        LeafKind::RequestHeader(pattern) => request_header(pattern)?,
        LeafKind::ResponseHeader(pattern) => response_header(pattern)?,
        LeafKind::Method(pattern) => method(pattern)?,
        LeafKind::ContentType(pattern) => content_type(pattern)?,
        LeafKind::RequestContentType(pattern) => request_content_type(pattern)?,
        LeafKind::ResponseContentType(pattern) => response_content_type(pattern)?,
        LeafKind::Url(pattern) => url(pattern)?,
    })
}

fn case_insensitive(pattern: &str) -> Result<Regex, PatternError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|source| PatternError {
            pattern: pattern.to_string(),
            source,
        })
}

/// `~a` — the response carries script, stylesheet, image or flash content.
pub fn is_asset() -> Predicate {
    Predicate::new("is asset", |flow: &Flow| {
        flow.response.as_ref().is_some_and(|resp| {
            resp.content_type()
                .is_some_and(|ct| ASSET_TYPES.iter().any(|re| re.is_match(ct)))
        })
    })
}

/// `~e` — the flow failed with an error.
pub fn has_error() -> Predicate {
    Predicate::new("has error", |flow: &Flow| flow.error.is_some())
}

/// `~q` — a request was sent but no response arrived. A flow with neither
/// request nor response does not count.
pub fn no_response() -> Predicate {
    Predicate::new("has no response", |flow: &Flow| {
        flow.request.is_some() && flow.response.is_none()
    })
}

/// `~s` — a response arrived.
pub fn has_response() -> Predicate {
    Predicate::new("has response", |flow: &Flow| flow.response.is_some())
}

/// `~c` — the response status code equals `code`.
pub fn response_code(code: u32) -> Predicate {
    Predicate::new(format!("resp. code is {code}"), move |flow: &Flow| {
        flow.response
            .as_ref()
            .is_some_and(|resp| u32::from(resp.status_code) == code)
    })
}

/// `~d` — the request host matches `pattern` (case-insensitive).
pub fn domain(pattern: &str) -> Result<Predicate, PatternError> {
    let re = case_insensitive(pattern)?;
    Ok(Predicate::new(
        format!("domain matches {pattern}"),
        move |flow: &Flow| flow.request.as_ref().is_some_and(|req| re.is_match(&req.host)),
    ))
}

/// `~h` — any request or response header matches `pattern`.
pub fn header(pattern: &str) -> Result<Predicate, PatternError> {
    let re = case_insensitive(pattern)?;
    Ok(Predicate::new(
        format!("header matches {pattern}"),
        move |flow: &Flow| {
            flow.request.as_ref().is_some_and(|req| req.match_header(&re))
                || flow
                    .response
                    .as_ref()
                    .is_some_and(|resp| resp.match_header(&re))
        },
    ))
}

/// `~hq` — any request header matches `pattern`.
pub fn request_header(pattern: &str) -> Result<Predicate, PatternError> {
    let re = case_insensitive(pattern)?;
    Ok(Predicate::new(
        format!("req. header matches {pattern}"),
        move |flow: &Flow| flow.request.as_ref().is_some_and(|req| req.match_header(&re)),
    ))
}

/// `~hs` — any response header matches `pattern`.
pub fn response_header(pattern: &str) -> Result<Predicate, PatternError> {
    let re = case_insensitive(pattern)?;
    Ok(Predicate::new(
        format!("resp. header matches {pattern}"),
        move |flow: &Flow| {
            flow.response
                .as_ref()
                .is_some_and(|resp| resp.match_header(&re))
        },
    ))
}

/// `~m` — the request method matches `pattern`.
pub fn method(pattern: &str) -> Result<Predicate, PatternError> {
    let re = case_insensitive(pattern)?;
    Ok(Predicate::new(
        format!("method matches {pattern}"),
        move |flow: &Flow| {
            flow.request
                .as_ref()
                .is_some_and(|req| re.is_match(&req.method))
        },
    ))
}

/// `~t` — the request or response content type matches `pattern`.
pub fn content_type(pattern: &str) -> Result<Predicate, PatternError> {
    let re = case_insensitive(pattern)?;
    Ok(Predicate::new(
        format!("content type matches {pattern}"),
        move |flow: &Flow| {
            let req = flow
                .request
                .as_ref()
                .and_then(|req| req.content_type())
                .is_some_and(|ct| re.is_match(ct));
            req || flow
                .response
                .as_ref()
                .and_then(|resp| resp.content_type())
                .is_some_and(|ct| re.is_match(ct))
        },
    ))
}

/// `~tq` — the request content type matches `pattern`.
pub fn request_content_type(pattern: &str) -> Result<Predicate, PatternError> {
    let re = case_insensitive(pattern)?;
    Ok(Predicate::new(
        format!("req. content type matches {pattern}"),
        move |flow: &Flow| {
            flow.request
                .as_ref()
                .and_then(|req| req.content_type())
                .is_some_and(|ct| re.is_match(ct))
        },
    ))
}

/// `~ts` — the response content type matches `pattern`.
pub fn response_content_type(pattern: &str) -> Result<Predicate, PatternError> {
    let re = case_insensitive(pattern)?;
    Ok(Predicate::new(
        format!("resp. content type matches {pattern}"),
        move |flow: &Flow| {
            flow.response
                .as_ref()
                .and_then(|resp| resp.content_type())
                .is_some_and(|ct| re.is_match(ct))
        },
    ))
}

/// `~u` — the request's display URL matches `pattern`.
pub fn url(pattern: &str) -> Result<Predicate, PatternError> {
    let re = case_insensitive(pattern)?;
    Ok(Predicate::new(
        format!("url matches {pattern}"),
        move |flow: &Flow| {
            flow.request
                .as_ref()
                .is_some_and(|req| re.is_match(&req.pretty_url()))
        },
    ))
}
