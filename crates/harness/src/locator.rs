//! Declarative element locators
//!
//! A [`Locator`] is not a live handle. It describes which element a step
//! targets and is resolved against the DOM each time a step runs, so the
//! same locator can be retried while the application renders.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How an element is identified
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LocatorKind {
    /// ARIA role with an optional accessible name
    Role {
        role: String,
        name: Option<String>,
        exact: bool,
    },
    /// Form control by its label text
    Label { text: String, exact: bool },
    /// Raw CSS (or Playwright pseudo-class) selector
    Css { selector: String },
    /// `data-testid` attribute
    TestId { id: String },
    /// Element by its rendered text
    Text { text: String, exact: bool },
}

/// Which of several matches to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "at", content = "n", rename_all = "snake_case")]
pub enum Ordinal {
    First,
    Last,
    Nth(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator {
    #[serde(flatten)]
    pub kind: LocatorKind,

    /// Unset means the first match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ordinal: Option<Ordinal>,

    /// Resolve inside this element instead of the whole page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<Box<Locator>>,
}

impl Locator {
    fn from_kind(kind: LocatorKind) -> Self {
        Self {
            kind,
            ordinal: None,
            parent: None,
        }
    }

    pub fn role(role: impl Into<String>) -> Self {
        Self::from_kind(LocatorKind::Role {
            role: role.into(),
            name: None,
            exact: false,
        })
    }

    /// Shorthand for `role(role).name(name)`
    pub fn role_named(role: impl Into<String>, name: impl Into<String>) -> Self {
        Self::role(role).name(name)
    }

    pub fn label(text: impl Into<String>) -> Self {
        Self::from_kind(LocatorKind::Label {
            text: text.into(),
            exact: false,
        })
    }

    pub fn css(selector: impl Into<String>) -> Self {
        Self::from_kind(LocatorKind::Css {
            selector: selector.into(),
        })
    }

    pub fn test_id(id: impl Into<String>) -> Self {
        Self::from_kind(LocatorKind::TestId { id: id.into() })
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::from_kind(LocatorKind::Text {
            text: text.into(),
            exact: false,
        })
    }

    /// Set the accessible name. Only meaningful for role locators.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        if let LocatorKind::Role { name: slot, .. } = &mut self.kind {
            *slot = Some(name.into());
        }
        self
    }

    /// Require an exact (case-sensitive, whole-string) text match
    pub fn exact(mut self) -> Self {
        match &mut self.kind {
            LocatorKind::Role { exact, .. }
            | LocatorKind::Label { exact, .. }
            | LocatorKind::Text { exact, .. } => *exact = true,
            LocatorKind::Css { .. } | LocatorKind::TestId { .. } => {}
        }
        self
    }

    pub fn first(mut self) -> Self {
        self.ordinal = Some(Ordinal::First);
        self
    }

    pub fn last(mut self) -> Self {
        self.ordinal = Some(Ordinal::Last);
        self
    }

    /// Zero-based match index
    pub fn nth(mut self, index: usize) -> Self {
        self.ordinal = Some(Ordinal::Nth(index));
        self
    }

    /// Scope this locator to descendants of `parent`
    pub fn within(mut self, parent: Locator) -> Self {
        self.parent = Some(Box::new(parent));
        self
    }

    /// Locate `child` inside this element
    pub fn locate(&self, child: Locator) -> Locator {
        child.within(self.clone())
    }

    /// The same locator with its own ordinal dropped (the parent chain is kept)
    pub fn unordered(&self) -> Locator {
        Locator {
            ordinal: None,
            ..self.clone()
        }
    }

    /// Index into the list of matches, or `None` when there are no matches
    pub fn pick(&self, matches: usize) -> Option<usize> {
        match self.ordinal.unwrap_or(Ordinal::First) {
            _ if matches == 0 => None,
            Ordinal::First => Some(0),
            Ordinal::Last => Some(matches - 1),
            Ordinal::Nth(n) if n < matches => Some(n),
            Ordinal::Nth(_) => None,
        }
    }
}

impl fmt::Display for LocatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let exact_suffix = |exact: bool| if exact { " (exact)" } else { "" };
        match self {
            LocatorKind::Role { role, name: Some(name), exact } => {
                write!(f, "role={}[name=\"{}\"]{}", role, name, exact_suffix(*exact))
            }
            LocatorKind::Role { role, name: None, .. } => write!(f, "role={}", role),
            LocatorKind::Label { text, exact } => {
                write!(f, "label=\"{}\"{}", text, exact_suffix(*exact))
            }
            LocatorKind::Css { selector } => write!(f, "css={}", selector),
            LocatorKind::TestId { id } => write!(f, "test-id={}", id),
            LocatorKind::Text { text, exact } => {
                write!(f, "text=\"{}\"{}", text, exact_suffix(*exact))
            }
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(parent) = &self.parent {
            write!(f, "{} >> ", parent)?;
        }
        write!(f, "{}", self.kind)?;
        match self.ordinal {
            None => Ok(()),
            Some(Ordinal::First) => write!(f, " >> first"),
            Some(Ordinal::Last) => write!(f, " >> last"),
            Some(Ordinal::Nth(n)) => write!(f, " >> nth={}", n),
        }
    }
}
