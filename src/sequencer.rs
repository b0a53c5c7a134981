//! Strictly sequential execution of async operations.
//!
//! Bulk generation must not fan out against a rate-sensitive TTS service, and each line's
//! request depends on its position in the script. `run_sequential` awaits each operation
//! to completion before starting the next one and never short-circuits on failure.

use std::future::Future;

/// Result of one item in a sequential run.
#[derive(Debug)]
pub struct ItemOutcome<T, R, E> {
    pub item: T,
    pub result: Result<R, E>,
}

/// Run `op` over `items` one at a time, in order, collecting every result.
///
/// Operation `n + 1` is not created until operation `n` has resolved.
pub async fn run_sequential<T, R, E, F, Fut>(
    items: impl IntoIterator<Item = T>,
    mut op: F,
) -> Vec<ItemOutcome<T, R, E>>
where
    T: Clone,
    F: FnMut(T) -> Fut,
    Fut: Future<Output = Result<R, E>>,
{
    let mut outcomes = Vec::new();
    for item in items {
        let result = op(item.clone()).await;
        outcomes.push(ItemOutcome { item, result });
    }
    outcomes
}
