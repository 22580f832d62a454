//! Data-source lookup helpers.
//!
//! Data sources read existing resources either by identifier or by a
//! filter (name, address, tag). Filter lookups must resolve to exactly
//! one result; a `latest` flag may opt in to picking the most recently
//! modified match instead of failing. List-style sources get a synthetic
//! identifier hashed from the filter so repeated reads stay stable.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::api::billing::InvoiceFilter;
use crate::diff::content_hash;

/// Errors from data-source resolution.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum LookupError {
    /// The filter matched nothing.
    #[error("no {kind} found matching {filter:?}")]
    NotFound {
        /// Resource kind looked up.
        kind: &'static str,
        /// Filter that was applied.
        filter: String,
    },
    /// The filter matched more than one result and no tie-break was
    /// requested.
    #[error(
        "{count} {kind} results match {filter:?}; narrow the filter or set `latest` where available"
    )]
    Ambiguous {
        /// Resource kind looked up.
        kind: &'static str,
        /// Filter that was applied.
        filter: String,
        /// Number of matches.
        count: usize,
    },
}

/// How multiple matches are resolved.
pub enum TieBreak<F> {
    /// More than one match is an error.
    Exact,
    /// Pick the most recently modified match.
    Latest(F),
}

/// Resolves a filter lookup to exactly one result.
///
/// # Errors
///
/// Returns [`LookupError::NotFound`] on zero matches and
/// [`LookupError::Ambiguous`] on several without a tie-break.
pub fn resolve_lookup<T, F>(
    matches: Vec<T>,
    tie_break: &TieBreak<F>,
    kind: &'static str,
    filter: &str,
) -> Result<T, LookupError>
where
    F: Fn(&T) -> Option<DateTime<Utc>>,
{
    let count = matches.len();
    let mut matches = matches;
    match count {
        0 => Err(LookupError::NotFound {
            kind,
            filter: filter.to_owned(),
        }),
        1 => Ok(matches.remove(0)),
        _ => match tie_break {
            TieBreak::Exact => Err(LookupError::Ambiguous {
                kind,
                filter: filter.to_owned(),
                count,
            }),
            TieBreak::Latest(modified_at) => {
                let (index, _) = matches
                    .iter()
                    .enumerate()
                    .max_by_key(|(_, item)| modified_at(item))
                    .ok_or(LookupError::NotFound {
                        kind,
                        filter: filter.to_owned(),
                    })?;
                Ok(matches.remove(index))
            }
        },
    }
}

/// A tie-break value usable where no `latest` flag exists.
#[must_use]
pub const fn exact_only<T>() -> TieBreak<fn(&T) -> Option<DateTime<Utc>>> {
    TieBreak::Exact
}

/// Synthetic identifier for a list-style data source: lowercase-hex
/// SHA-256 of the filter parameters joined with `-`.
#[must_use]
pub fn filter_id<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    content_hash(parts)
}

/// Identifier for the billing-invoices data source.
#[must_use]
pub fn billing_invoices_id(filter: &InvoiceFilter) -> String {
    filter_id([
        filter.started_after.as_str(),
        filter.started_before.as_str(),
        filter.invoice_type.as_str(),
        filter.organization_id.as_str(),
    ])
}

#[cfg(test)]
mod tests;
