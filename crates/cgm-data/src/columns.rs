//! Header resolution for heterogeneous CGM exports.
//!
//! Each canonical column is resolved by an ordered list of rules; the first
//! rule that matches any eligible header wins. Headers are never renamed or
//! reordered: resolution yields source column indices.

use tracing::{debug, warn};

/// Canonical name of the timestamp column.
pub const CANONICAL_TIME_COLUMN: &str = "DisplayDtTm";

/// Canonical name of the glucose value column.
pub const CANONICAL_VALUE_COLUMN: &str = "Glucose Value";

/// Header predicate used by a [`ColumnRule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderMatch {
    /// Exact, case-sensitive equality.
    Exact(&'static str),
    /// Lowercased header contains any of the given lowercase substrings.
    ContainsAny(&'static [&'static str]),
}

impl HeaderMatch {
    pub fn matches(&self, header: &str) -> bool {
        match self {
            HeaderMatch::Exact(name) => header == *name,
            HeaderMatch::ContainsAny(needles) => {
                let lower = header.to_lowercase();
                needles.iter().any(|n| lower.contains(n))
            }
        }
    }
}

/// One `(predicate, canonical-name)` pair.
#[derive(Debug, Clone, Copy)]
pub struct ColumnRule {
    pub matcher: HeaderMatch,
    pub canonical: &'static str,
}

/// Timestamp rules, highest priority first.
pub const TIME_RULES: &[ColumnRule] = &[
    ColumnRule {
        matcher: HeaderMatch::Exact(CANONICAL_TIME_COLUMN),
        canonical: CANONICAL_TIME_COLUMN,
    },
    ColumnRule {
        matcher: HeaderMatch::ContainsAny(&["date", "time"]),
        canonical: CANONICAL_TIME_COLUMN,
    },
];

/// Glucose value rules, highest priority first.
pub const VALUE_RULES: &[ColumnRule] = &[
    ColumnRule {
        matcher: HeaderMatch::Exact(CANONICAL_VALUE_COLUMN),
        canonical: CANONICAL_VALUE_COLUMN,
    },
    ColumnRule {
        matcher: HeaderMatch::ContainsAny(&["glucose", "bg"]),
        canonical: CANONICAL_VALUE_COLUMN,
    },
];

/// Source column indices resolved for the canonical columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColumnMapping {
    pub timestamp: Option<usize>,
    pub value: Option<usize>,
}

impl ColumnMapping {
    /// `true` when both canonical columns were found.
    pub fn is_complete(&self) -> bool {
        self.timestamp.is_some() && self.value.is_some()
    }
}

/// Evaluate `rules` in order against headers not in `claimed`.
///
/// Within a rule, the leftmost matching header wins.
pub fn resolve_column<S: AsRef<str>>(
    headers: &[S],
    rules: &[ColumnRule],
    claimed: &[usize],
) -> Option<usize> {
    rules.iter().find_map(|rule| {
        let (idx, header) = headers
            .iter()
            .enumerate()
            .filter(|(idx, _)| !claimed.contains(idx))
            .find(|(_, h)| rule.matcher.matches(h.as_ref()))?;
        let header: &str = header.as_ref();
        debug!(
            canonical = rule.canonical,
            header,
            rule = ?rule.matcher,
            "column rule matched"
        );
        Some(idx)
    })
}

/// Resolve both canonical columns.
///
/// The timestamp column is resolved first; the header it claims is not
/// eligible for the value rules.
pub fn resolve_columns<S: AsRef<str>>(headers: &[S]) -> ColumnMapping {
    let timestamp = resolve_column(headers, TIME_RULES, &[]);
    let claimed: Vec<usize> = timestamp.into_iter().collect();
    let value = resolve_column(headers, VALUE_RULES, &claimed);

    let mapping = ColumnMapping { timestamp, value };
    let name = |idx: Option<usize>| idx.map(|i| headers[i].as_ref().to_string());
    debug!(
        time_column = ?name(mapping.timestamp),
        value_column = ?name(mapping.value),
        "resolved CSV columns"
    );
    if mapping.timestamp.is_none() {
        warn!("no timestamp column found; every row will be dropped");
    }
    if mapping.value.is_none() {
        warn!("no glucose column found; every row will be dropped");
    }
    mapping
}

// ── Tests ─────────────────────────────────────────────────────────────────────
