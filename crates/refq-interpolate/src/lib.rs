//!
//! Query reference interpolation.
//!
//! Responsibilities:
//! - Resolve `@<refId>` tokens in a target query against the other queries of a `QuerySource`.
//! - Record where each substitution landed (`Interpolation`) for editor highlighting.
//! - Reject circular references instead of substituting forever.
//!
//! Assumptions:
//! - The source is not mutated while a call reads it.
//! - Expressions are opaque text; no query-language syntax is checked here.

use refq_registry::{QueryRecord, QuerySource, RegistryError};
use refq_token::{extract_references, find_first, has_tokens, scan, RefId, TokenMatch};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::Range;
use thiserror::Error;
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// One substitution: the referenced text was inserted at `position`, spanning `length`.
///
/// Both are counted in chars. `position` is relative to the expression as it
/// was immediately before this substitution, so it already accounts for
/// substitutions made earlier in the same pass.
pub struct Interpolation {
    pub position: usize,
    pub length: usize,
}

impl Interpolation {
    pub fn range(&self) -> Range<usize> { self.position..self.position + self.length }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
/// A target query with every resolvable reference substituted.
///
/// Derived per call; never written back into the source.
pub struct InterpolatedQuery {
    pub ref_id: String,
    pub expr: String,
    pub interpolations: Vec<Interpolation>,
}

impl InterpolatedQuery {
    /// Stable hash of the resolved text, for caches keyed by what actually runs.
    pub fn fingerprint(&self) -> String { refq_token::expr_fingerprint(&self.expr) }

    pub fn into_record(self) -> QueryRecord { QueryRecord::new(self.ref_id, self.expr) }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InterpolateError {
    #[error("query not found: {ref_id}")]
    NotFound { ref_id: String },
    #[error("circular reference in query {ref_id}: cannot resolve {}", .unresolved.join(", "))]
    CircularReference { ref_id: String, unresolved: Vec<String> },
}

impl From<RegistryError> for InterpolateError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::NotFound(ref_id) => InterpolateError::NotFound { ref_id },
        }
    }
}

/// Resolve `ref_id` against `source`.
///
/// For repeated calls over the same snapshot, construct an `Interpolator`.
pub fn interpolate(source: &dyn QuerySource, ref_id: &str) -> Result<InterpolatedQuery, InterpolateError> {
    Interpolator::new(source).interpolate(ref_id)
}

/// Resolves query references over a borrowed snapshot of named queries.
pub struct Interpolator<'a> {
    source: &'a dyn QuerySource,
}

impl<'a> Interpolator<'a> {
    pub fn new(source: &'a dyn QuerySource) -> Self { Self { source } }

    /// Resolve one query to completion.
    ///
    /// Fails with `NotFound` if `ref_id` is not in the source, and with
    /// `CircularReference` if a token naming a known query survives resolution.
    pub fn interpolate(&self, ref_id: &str) -> Result<InterpolatedQuery, InterpolateError> {
        let target = self.source.require_query(ref_id)?;
        let mut index = ReferenceIndex::build(self.source, target);
        let mut expr = target.expr.clone();
        let mut interpolations = Vec::new();
        let mut pass = 0usize;

        debug!(ref_id, candidates = index.len(), "interpolating query");

        while let Some(first) = find_first(&expr) {
            pass += 1;
            let before = interpolations.len();
            let rewritten = index.rewrite(&expr, &mut interpolations);
            debug!(
                ref_id,
                pass,
                first = %first.ref_id,
                substitutions = interpolations.len() - before,
                "interpolation pass"
            );
            if rewritten == expr {
                break;
            }
            expr = rewritten;
        }

        let unresolved = self.unresolved(&expr);
        if !unresolved.is_empty() {
            warn!(ref_id, unresolved = ?unresolved, "circular query reference");
            return Err(InterpolateError::CircularReference { ref_id: target.ref_id.clone(), unresolved });
        }

        Ok(InterpolatedQuery { ref_id: target.ref_id.clone(), expr, interpolations })
    }

    /// Resolve every query in listing order. One failure does not stop the rest.
    pub fn interpolate_all(&self) -> Vec<(String, Result<InterpolatedQuery, InterpolateError>)> {
        self.source
            .list_queries()
            .into_iter()
            .map(|q| (q.ref_id.clone(), self.interpolate(&q.ref_id)))
            .collect()
    }

    /// Ids of known queries still referenced by `expr`, in id order.
    ///
    /// Tokens naming ids absent from the source are plain text, not cycles.
    fn unresolved(&self, expr: &str) -> Vec<String> {
        if !has_tokens(expr) {
            return Vec::new();
        }
        extract_references(expr)
            .ids
            .into_iter()
            .map(|id| id.to_string())
            .filter(|id| self.source.get_query(id).is_some())
            .collect()
    }
}

/// A query that may still be substituted during the current call.
struct Candidate<'a> {
    expr: &'a str,
    length: usize,
    remaining: usize,
}

/// Call-scoped lookup of substitutable queries with their remaining allowance.
///
/// Allowances start at the number of times each query is referenced by the
/// target's original text. A query whose allowance is spent is dropped the next
/// time it matches, after that final substitution.
struct ReferenceIndex<'a> {
    candidates: HashMap<RefId, Candidate<'a>>,
}

impl<'a> ReferenceIndex<'a> {
    fn build(source: &'a dyn QuerySource, target: &QueryRecord) -> Self {
        let mut candidates = HashMap::new();
        for q in source.list_queries() {
            if q.ref_id == target.ref_id {
                continue;
            }
            // Ids outside the token grammar can never be matched.
            let Ok(id) = RefId::parse(&q.ref_id) else { continue };
            let remaining = refq_token::count_references(&target.expr, &q.ref_id);
            candidates.insert(id, Candidate { expr: q.expr.as_str(), length: q.expr.chars().count(), remaining });
        }
        Self { candidates }
    }

    fn len(&self) -> usize { self.candidates.len() }

    /// Decide one match: the text to splice in, or `None` to keep the token.
    fn decide(&mut self, id: RefId) -> Option<(&'a str, usize)> {
        let c = self.candidates.get_mut(&id)?;
        let exhausted = c.remaining == 0;
        c.remaining = c.remaining.saturating_sub(1);
        let replacement = (c.expr, c.length);
        if exhausted {
            trace!(ref_id = %id, "reference allowance spent");
            self.candidates.remove(&id);
        }
        Some(replacement)
    }

    /// One full pass: every token in `expr` is decided left to right, then the
    /// string is rebuilt in one step.
    ///
    /// Each recorded position is the char offset in the text rewritten so far,
    /// so earlier substitutions in the same pass shift later ones.
    fn rewrite(&mut self, expr: &str, interpolations: &mut Vec<Interpolation>) -> String {
        let mut plan: Vec<(TokenMatch, Option<(&'a str, usize)>)> = Vec::new();
        for m in scan(expr) {
            let decision = self.decide(m.ref_id);
            plan.push((m, decision));
        }

        let mut out = String::with_capacity(expr.len());
        let mut last = 0usize;
        let mut out_chars = 0usize;
        for (m, decision) in plan {
            let gap = &expr[last..m.start];
            out.push_str(gap);
            out_chars += gap.chars().count();
            match decision {
                Some((text, length)) => {
                    trace!(ref_id = %m.ref_id, position = out_chars, length, "substitute reference");
                    interpolations.push(Interpolation { position: out_chars, length });
                    out.push_str(text);
                    out_chars += length;
                }
                None => {
                    let token = m.as_str(expr);
                    out.push_str(token);
                    out_chars += token.chars().count();
                }
            }
            last = m.end;
        }
        out.push_str(&expr[last..]);
        out
    }
}
