//!
//! Reference tokens for query expressions.
//!
//! A query expression may mention another query with a token of the form
//! `@<refId>`, where the id is a single ASCII uppercase letter (`@A` .. `@Z`).
//! This crate is the shared leaf used by:
//! - the registry (listing what a query depends on),
//! - the interpolator (scanning and rewriting expressions),
//! - downstream caches (fingerprinting resolved text).
//!
//! Key features:
//! - `RefId`: a validated reference id.
//! - `scan` / `find_first`: left-to-right token matching.
//! - `extract_references`: the distinct ids an expression mentions.
//! - `expr_fingerprint`: stable hash of expression text (dedupe / caching).

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

/// Sigil that opens a reference token.
pub const TOKEN_SIGIL: char = '@';

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@([A-Z])").expect("valid token pattern"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("invalid reference id {0:?}: expected a single uppercase letter A-Z")]
    InvalidRefId(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
/// A reference id that can appear inside a token.
///
/// Only `A`..`Z` are referenceable, which caps a panel at 26 referenceable queries.
pub struct RefId(char);

impl RefId {
    pub fn parse(s: &str) -> Result<Self, TokenError> {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_ascii_uppercase() => Ok(Self(c)),
            _ => Err(TokenError::InvalidRefId(s.to_string())),
        }
    }

    pub fn as_char(&self) -> char { self.0 }

    /// The token text that references this id, e.g. `@A`.
    pub fn token(&self) -> String { format!("{}{}", TOKEN_SIGIL, self.0) }
}

impl fmt::Display for RefId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl TryFrom<String> for RefId {
    type Error = TokenError;
    fn try_from(s: String) -> Result<Self, Self::Error> { Self::parse(&s) }
}

impl From<RefId> for String {
    fn from(id: RefId) -> Self { id.0.to_string() }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// One token occurrence. `start..end` is a byte range into the scanned string.
pub struct TokenMatch {
    pub ref_id: RefId,
    pub start: usize,
    pub end: usize,
}

impl TokenMatch {
    pub fn as_str<'a>(&self, expr: &'a str) -> &'a str { &expr[self.start..self.end] }
}

fn to_match(caps: regex::Captures<'_>) -> Option<TokenMatch> {
    let whole = caps.get(0)?;
    let id = caps.get(1)?.as_str().chars().next()?;
    Some(TokenMatch { ref_id: RefId(id), start: whole.start(), end: whole.end() })
}

/// First token in `expr`, scanning left to right.
pub fn find_first(expr: &str) -> Option<TokenMatch> {
    TOKEN_RE.captures(expr).and_then(to_match)
}

/// All non-overlapping tokens in `expr`, in textual order.
pub fn scan(expr: &str) -> Vec<TokenMatch> {
    TOKEN_RE.captures_iter(expr).filter_map(to_match).collect()
}

pub fn has_tokens(expr: &str) -> bool {
    TOKEN_RE.is_match(expr)
}

/// Number of times the token for `ref_id` occurs in `expr`.
///
/// Counts the literal token text, so ids that are not referenceable never match.
pub fn count_references(expr: &str, ref_id: &str) -> usize {
    match RefId::parse(ref_id) {
        Ok(id) => expr.matches(id.token().as_str()).count(),
        Err(_) => 0,
    }
}

/// Distinct reference ids mentioned by an expression, in id order.
///
/// Powers "where is this used?" listings in the query editor.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct References {
    pub ids: BTreeSet<RefId>,
}

impl References {
    pub fn contains(&self, ref_id: &str) -> bool {
        RefId::parse(ref_id).map(|id| self.ids.contains(&id)).unwrap_or(false)
    }
    pub fn is_empty(&self) -> bool { self.ids.is_empty() }
    pub fn len(&self) -> usize { self.ids.len() }
}

pub fn extract_references(expr: &str) -> References {
    References { ids: scan(expr).into_iter().map(|m| m.ref_id).collect() }
}

/// Lowercase hex SHA-256 of the expression text.
pub fn expr_fingerprint(expr: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(expr.as_bytes());
    hex::encode(hasher.finalize())
}
