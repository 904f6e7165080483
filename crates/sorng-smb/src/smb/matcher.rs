//! Name matching for search.
//!
//! A query without `*` or `?` is a case-insensitive substring test. With
//! wildcards, `*` matches any run of characters and `?` exactly one; the
//! pattern is implicitly padded so it may match anywhere in the name.

use regex::{Regex, RegexBuilder};

/// Compiled form of a search query, built once per search.
#[derive(Debug, Clone)]
pub enum NameMatcher {
    Substring(String),
    Pattern(Regex),
}

impl NameMatcher {
    pub fn new(query: &str) -> Self {
        if !has_wildcards(query) {
            return Self::Substring(query.to_lowercase());
        }
        match RegexBuilder::new(&wildcard_to_regex(query))
            .case_insensitive(true)
            .dot_matches_new_line(true)
            .build()
        {
            Ok(re) => Self::Pattern(re),
            // Literals are escaped; search as plain text if it ever fails.
            Err(e) => {
                log::warn!("SMB search: cannot compile pattern '{}': {}", query, e);
                Self::Substring(query.to_lowercase())
            }
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            Self::Substring(needle) => name.to_lowercase().contains(needle.as_str()),
            Self::Pattern(re) => re.is_match(name),
        }
    }
}

pub fn has_wildcards(query: &str) -> bool {
    query.contains(['*', '?'])
}

fn wildcard_to_regex(query: &str) -> String {
    let mut out = String::with_capacity(query.len() * 2);
    let mut literal = String::new();
    for ch in query.chars() {
        match ch {
            '*' | '?' => {
                out.push_str(&regex::escape(&literal));
                literal.clear();
                out.push_str(if ch == '*' { ".*" } else { "." });
            }
            c => literal.push(c),
        }
    }
    out.push_str(&regex::escape(&literal));
    out
}

/// One-shot convenience over `NameMatcher`.
pub fn wildcard_match(name: &str, query: &str) -> bool {
    NameMatcher::new(query).matches(name)
}
