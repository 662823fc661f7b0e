//! Search orchestration: list, filter, order.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use crate::query::SearchRequest;
use crate::searcher::Searcher;
use crate::SearchError;

/// Run `request` against `searcher`'s source.
///
/// Nothing partial is ever returned: a bad field name or a source failure ends the query.
pub fn search<S>(searcher: &S, request: &SearchRequest) -> Result<Vec<Arc<S::Object>>, SearchError>
where
    S: Searcher + ?Sized,
{
    let started = Instant::now();
    let out = run(searcher, request);
    let elapsed = started.elapsed();
    metrics::histogram!("search_eval_ms", elapsed.as_secs_f64() * 1_000.0);
    match &out {
        Ok(items) => {
            metrics::histogram!("search_results", items.len() as f64);
            debug!(kind = %searcher.kind(), ns = %request.namespace, order_by = %request.order_by, reverse = request.reverse, hits = items.len(), took_ms = %elapsed.as_millis(), "search ok");
        }
        Err(e) => {
            metrics::counter!("search_errors_total", 1);
            warn!(kind = %searcher.kind(), ns = %request.namespace, error = %e, "search failed");
        }
    }
    out
}

fn run<S>(searcher: &S, request: &SearchRequest) -> Result<Vec<Arc<S::Object>>, SearchError>
where
    S: Searcher + ?Sized,
{
    let conditions = &request.conditions;
    searcher.validate(conditions)?;

    let items = searcher.source().list(&request.namespace)?;
    metrics::histogram!("search_candidates", items.len() as f64);

    let mut result = if conditions.is_empty() {
        items
    } else {
        let mut kept = Vec::with_capacity(items.len());
        for item in items {
            if searcher.matches(&conditions.matches, &item)? && searcher.fuzzy(&conditions.fuzzy, &item)? {
                kept.push(item);
            }
        }
        kept
    };

    sort_by_less(&mut result, request.reverse, |a, b| searcher.compare(a, b, &request.order_by));
    Ok(result)
}

/// Sort by a strict less-than relation.
///
/// `reverse` swaps the operands handed to `less`; the result is never negated, so
/// order-equivalent pairs stay equivalent in both directions.
pub fn sort_by_less<T, F>(items: &mut [T], reverse: bool, less: F)
where
    F: Fn(&T, &T) -> bool,
{
    items.sort_by(|a, b| {
        let (x, y) = if reverse { (b, a) } else { (a, b) };
        if less(x, y) {
            Ordering::Less
        } else if less(y, x) {
            Ordering::Greater
        } else {
            Ordering::Equal
        }
    });
}
