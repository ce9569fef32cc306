//! Bounded concurrent mapping for per-item enrichment calls.
//!
//! One task per item is spawned eagerly; a semaphore caps how many transforms
//! run at once. Results are collected by awaiting the join handles in input
//! order, so completion order never leaks into output order.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use metrics::counter;
use tokio::sync::Semaphore;

/// Apply `f` to every item with at most `limit` transforms in flight.
///
/// The transform is infallible at this level; callers catch their own errors
/// and map them to fallback values inside `f`.
pub async fn map_bounded<T, U, F, Fut>(items: Vec<T>, limit: usize, f: F) -> Vec<U>
where
    T: Send + 'static,
    U: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = U> + Send + 'static,
{
    if items.is_empty() {
        return Vec::new();
    }

    let total = items.len();
    let sem = Arc::new(Semaphore::new(limit.max(1)));
    let f = Arc::new(f);
    let done = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::with_capacity(total);
    for item in items {
        let sem = Arc::clone(&sem);
        let f = Arc::clone(&f);
        let done = Arc::clone(&done);
        handles.push(tokio::spawn(async move {
            let _permit = sem.acquire_owned().await.expect("semaphore closed");
            let out = f(item).await;
            counter!("pipeline_tasks_completed_total").increment(1);
            let completed = done.fetch_add(1, Ordering::Relaxed) + 1;
            if completed % 5 == 0 || completed == total {
                tracing::debug!(completed, total, "enrichment progress");
            }
            out
        }));
    }

    let mut out = Vec::with_capacity(total);
    for h in handles {
        out.push(h.await.expect("enrichment task panicked"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn preserves_input_order_when_later_items_finish_first() {
        let items: Vec<usize> = (0..6).collect();
        let out = map_bounded(items, 8, |i| async move {
            // Earlier items sleep longer, so completion order is reversed.
            tokio::time::sleep(Duration::from_millis((6 - i as u64) * 10)).await;
            i * 2
        })
        .await;
        assert_eq!(out, vec![0, 2, 4, 6, 8, 10]);
    }

    #[tokio::test]
    async fn never_exceeds_the_concurrency_cap() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let (fl, mx) = (Arc::clone(&in_flight), Arc::clone(&max_seen));

        let items: Vec<u32> = (0..10).collect();
        let out = map_bounded(items, 3, move |i| {
            let fl = Arc::clone(&fl);
            let mx = Arc::clone(&mx);
            async move {
                let cur = fl.fetch_add(1, Ordering::SeqCst) + 1;
                mx.fetch_max(cur, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                fl.fetch_sub(1, Ordering::SeqCst);
                i
            }
        })
        .await;

        assert_eq!(out.len(), 10);
        assert!(max_seen.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn limit_one_serializes() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let (fl, mx) = (Arc::clone(&in_flight), Arc::clone(&max_seen));

        map_bounded((0..5).collect::<Vec<_>>(), 1, move |i| {
            let fl = Arc::clone(&fl);
            let mx = Arc::clone(&mx);
            async move {
                let cur = fl.fetch_add(1, Ordering::SeqCst) + 1;
                mx.fetch_max(cur, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                fl.fetch_sub(1, Ordering::SeqCst);
                i
            }
        })
        .await;

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_input_yields_empty_output() {
        let out = map_bounded(Vec::<u8>::new(), 4, |i| async move { i }).await;
        assert!(out.is_empty());
    }
}
