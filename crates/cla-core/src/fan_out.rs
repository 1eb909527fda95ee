//! Bounded concurrent fan-out with per-item results.

use crate::error::{SignError, SignResult};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tracing::warn;

/// Results of a fan-out, in input order.
#[derive(Debug)]
pub struct FanOutReport<T> {
    pub results: Vec<SignResult<T>>,
    /// Index of the first failure to arrive, if any.
    pub first_error: Option<usize>,
}

impl<T> FanOutReport<T> {
    pub fn failures(&self) -> usize {
        self.results.iter().filter(|r| r.is_err()).count()
    }

    /// Collapses to all values, or the first failure that arrived.
    pub fn into_result(self) -> SignResult<Vec<T>> {
        match self.first_error {
            Some(index) => {
                let mut results = self.results;
                match results.swap_remove(index) {
                    Err(err) => Err(err),
                    Ok(_) => Err(SignError::collaborator("fan-out", "lost failure result")),
                }
            }
            None => self.results.into_iter().collect(),
        }
    }
}

/// Runs `f` over `items` with at most `width` in flight.
///
/// Every item gets a result; failures are logged as they arrive.
pub async fn run_bounded<I, T, F, Fut>(items: Vec<I>, width: usize, f: F) -> FanOutReport<T>
where
    I: Send + 'static,
    T: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = SignResult<T>> + Send + 'static,
{
    let total = items.len();
    let semaphore = Arc::new(Semaphore::new(width.max(1)));
    let f = Arc::new(f);
    let (tx, mut rx) = mpsc::channel::<(usize, SignResult<T>)>(total.max(1));

    for (index, item) in items.into_iter().enumerate() {
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                let _ = tx
                    .send((
                        index,
                        Err(SignError::collaborator("fan-out", "worker pool closed")),
                    ))
                    .await;
                continue;
            }
        };
        let tx = tx.clone();
        let f = f.clone();
        tokio::spawn(async move {
            let result = f(item).await;
            drop(permit);
            let _ = tx.send((index, result)).await;
        });
    }
    drop(tx);

    let mut slots: Vec<Option<SignResult<T>>> = (0..total).map(|_| None).collect();
    let mut first_error = None;
    while let Some((index, result)) = rx.recv().await {
        if let Err(err) = &result {
            warn!(index, error = %err, "fan-out item failed");
            first_error.get_or_insert(index);
        }
        slots[index] = Some(result);
    }

    let results = slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.unwrap_or_else(|| {
                warn!(index, "fan-out worker ended without a result");
                Err(SignError::collaborator("fan-out", "worker ended without a result"))
            })
        })
        .collect::<Vec<_>>();

    let first_error =
        first_error.or_else(|| results.iter().position(|result| result.is_err()));

    FanOutReport {
        results,
        first_error,
    }
}
