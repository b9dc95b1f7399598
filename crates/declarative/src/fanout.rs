//! Bounded fan-out with joined errors

use rayon::prelude::*;

use crate::context::Session;
use crate::error::{Error, Result};

/// Run `task` for every item on a pool of `session.jobs()` threads.
///
/// Blocks until every task finished. Results keep the order of `items`.
/// If any task fails, all failures are returned together as one error; there
/// is no partial success. Tasks that have not started when the session is
/// cancelled fail with [`Error::Cancelled`].
pub fn join_all<I, T, F>(session: &Session<'_>, items: &[I], task: F) -> Result<Vec<T>>
where
    I: Sync,
    T: Send,
    F: Fn(&I) -> Result<T> + Sync,
{
    if items.is_empty() {
        return Ok(Vec::new());
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(session.jobs().min(items.len()))
        .build()?;

    let cancel = session.cancel_token();
    let results: Vec<Result<T>> = pool.install(|| {
        items
            .par_iter()
            .map(|item| {
                cancel.check()?;
                task(item)
            })
            .collect()
    });

    let mut values = Vec::with_capacity(results.len());
    let mut errors = Vec::new();
    for result in results {
        match result {
            Ok(value) => values.push(value),
            Err(e) => errors.push(e),
        }
    }

    match Error::join(errors) {
        Some(error) => Err(error),
        None => Ok(values),
    }
}
