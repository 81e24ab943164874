//! Network mocking
//!
//! Every request the page issues is offered to a [`MockTable`]. Rules are
//! checked in declaration order and the first match answers the request with
//! its canned response; requests that match nothing go to the real network.

use std::sync::atomic::{AtomicUsize, Ordering};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, HarnessResult};

/// URL matching pattern
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum UrlPattern {
    /// `*` and `**` match any run of characters (slashes included), `?` one character
    Glob(String),
    /// Regular expression searched anywhere in the URL
    Regex(String),
}

impl UrlPattern {
    fn compile(&self) -> HarnessResult<Regex> {
        let source = match self {
            UrlPattern::Glob(glob) => glob_to_regex(glob),
            UrlPattern::Regex(re) => re.clone(),
        };
        Regex::new(&source).map_err(|e| HarnessError::MockPattern {
            pattern: self.as_str().to_string(),
            reason: e.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        match self {
            UrlPattern::Glob(s) | UrlPattern::Regex(s) => s,
        }
    }
}

fn glob_to_regex(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() + 8);
    out.push('^');
    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                while chars.peek() == Some(&'*') {
                    chars.next();
                }
                out.push_str(".*");
            }
            '?' => out.push('.'),
            other => out.push_str(&regex::escape(other.encode_utf8(&mut [0u8; 4]))),
        }
    }
    out.push('$');
    out
}

/// Canned response returned for a matching request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockResponse {
    pub status: u16,
    pub content_type: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl MockResponse {
    pub fn new(status: u16, content_type: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            content_type: content_type.into(),
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// `200 application/json` with the serialized value as body
    pub fn json(value: &serde_json::Value) -> HarnessResult<Self> {
        Ok(Self::new(200, "application/json", serde_json::to_vec(value)?))
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

#[derive(Debug, Clone)]
pub struct MockRule {
    pattern: UrlPattern,
    matcher: Regex,
    response: MockResponse,
}

impl MockRule {
    pub fn new(pattern: UrlPattern, response: MockResponse) -> HarnessResult<Self> {
        let matcher = pattern.compile()?;
        Ok(Self {
            pattern,
            matcher,
            response,
        })
    }

    pub fn glob(pattern: &str, response: MockResponse) -> HarnessResult<Self> {
        Self::new(UrlPattern::Glob(pattern.to_string()), response)
    }

    /// Glob rule answering with `200 application/json`
    pub fn json(pattern: &str, value: &serde_json::Value) -> HarnessResult<Self> {
        Self::glob(pattern, MockResponse::json(value)?)
    }

    pub fn matches(&self, url: &str) -> bool {
        self.matcher.is_match(url)
    }

    pub fn pattern(&self) -> &UrlPattern {
        &self.pattern
    }

    pub fn response(&self) -> &MockResponse {
        &self.response
    }
}

/// What to do with an intercepted request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision<'a> {
    Fulfill(&'a MockResponse),
    Continue,
}

/// Per-rule interception count, reported in run results
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockHit {
    pub pattern: String,
    pub hits: usize,
}

/// Ordered, immutable set of mock rules for one session
#[derive(Debug, Default)]
pub struct MockTable {
    rules: Vec<MockRule>,
    hits: Vec<AtomicUsize>,
}

impl MockTable {
    pub fn new(rules: Vec<MockRule>) -> Self {
        let hits = rules.iter().map(|_| AtomicUsize::new(0)).collect();
        Self { rules, hits }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// First matching rule wins
    pub fn route(&self, url: &str) -> RouteDecision<'_> {
        match self.rules.iter().position(|rule| rule.matches(url)) {
            Some(index) => {
                self.hits[index].fetch_add(1, Ordering::Relaxed);
                RouteDecision::Fulfill(&self.rules[index].response)
            }
            None => RouteDecision::Continue,
        }
    }

    pub fn hits(&self) -> Vec<MockHit> {
        self.rules
            .iter()
            .zip(&self.hits)
            .map(|(rule, hits)| MockHit {
                pattern: rule.pattern.as_str().to_string(),
                hits: hits.load(Ordering::Relaxed),
            })
            .collect()
    }
}
