//! Style and state token lists
//!
//! Token order is significant (later styles override earlier ones), so a
//! changed list is written back whole rather than patched token by token.

use smallvec::SmallVec;
use trellis_core::AttrValue;

/// Ordered, duplicate-free list of tokens
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenList(SmallVec<[String; 4]>);

/// Difference between two token lists
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl TokenDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

impl TokenList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an attribute value: a space-separated string or a list
    ///
    /// Anything else, including null, yields an empty list.
    pub fn parse(value: &AttrValue) -> Self {
        let mut list = TokenList::new();
        match value {
            AttrValue::Str(s) => s.split_whitespace().for_each(|t| list.push(t)),
            AttrValue::List(items) => items.iter().for_each(|t| list.push(t)),
            _ => {}
        }
        list
    }

    /// Append a token unless already present
    pub fn push(&mut self, token: &str) {
        if !token.is_empty() && !self.contains(token) {
            self.0.push(token.to_string());
        }
    }

    pub fn contains(&self, token: &str) -> bool {
        self.0.iter().any(|t| t == token)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Tokens added and removed going from `self` to `next`
    pub fn diff(&self, next: &TokenList) -> TokenDiff {
        TokenDiff {
            added: next
                .iter()
                .filter(|t| !self.contains(t))
                .map(str::to_string)
                .collect(),
            removed: self
                .iter()
                .filter(|t| !next.contains(t))
                .map(str::to_string)
                .collect(),
        }
    }

    pub fn to_value(&self) -> AttrValue {
        AttrValue::List(self.0.iter().cloned().collect())
    }
}
