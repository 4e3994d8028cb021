use futures::future::join_all;
use std::{future::Future, sync::Mutex};

/// The default number of workers of a fan-out.
pub const DEFAULT_MAX_CONCURRENCY: usize = 50;

///
/// The outcome of a fan-out. Results are stored in completion order,
/// failures are stored separately and never abort the other items.
///
#[derive(Debug)]
pub struct ProcessedItems<T, E> {
    pub results: Vec<T>,
    pub errors: Vec<E>,
}

impl<T, E> Default for ProcessedItems<T, E> {
    fn default() -> Self {
        Self {
            results: Vec::new(),
            errors: Vec::new(),
        }
    }
}

///
/// Runs `process` on every item with at most `max_concurrency` items in flight.
///
/// `min(items, max_concurrency)` workers pull the next item from a shared cursor
/// until the items run out.
///
pub async fn process_items<I, T, E, F, Fut>(items: Vec<I>, max_concurrency: usize, process: F) -> ProcessedItems<T, E>
where
    F: Fn(I) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let number_of_workers = items.len().min(max_concurrency.max(1));
    let cursor = Mutex::new(items.into_iter());
    let processed = Mutex::new(ProcessedItems::default());

    join_all((0..number_of_workers).map(|_| worker(&cursor, &processed, &process))).await;

    processed.into_inner().expect("Should have released the processed items")
}

async fn worker<I, T, E, F, Fut>(
    cursor: &Mutex<std::vec::IntoIter<I>>,
    processed: &Mutex<ProcessedItems<T, E>>,
    process: &F,
) where
    F: Fn(I) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    loop {
        let item = cursor.lock().expect("Should have locked the item cursor").next();
        let item = match item {
            Some(item) => item,
            None => return,
        };

        let outcome = process(item).await;

        let mut processed = processed.lock().expect("Should have locked the processed items");
        match outcome {
            Ok(result) => processed.results.push(result),
            Err(error) => processed.errors.push(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_failures_are_isolated() {
        for &count in [1usize, 7, 50, 120].iter() {
            let items = (0..count).collect::<Vec<_>>();

            let processed = process_items(items, DEFAULT_MAX_CONCURRENCY, |item| async move {
                tokio::task::yield_now().await;
                if item % 3 == 0 {
                    Err(format!("item {} failed", item))
                } else {
                    Ok(item * 2)
                }
            })
            .await;

            let failures = (0..count).filter(|item| item % 3 == 0).count();
            assert_eq!(count - failures, processed.results.len());
            assert_eq!(failures, processed.errors.len());
        }
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let active = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);

        let processed = process_items((0..20).collect(), 4, |item: usize| {
            let (active, peak) = (&active, &peak);
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::task::yield_now().await;
                active.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, ()>(item)
            }
        })
        .await;

        assert_eq!(20, processed.results.len());
        assert_eq!(4, peak.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_results_follow_completion_order() {
        let processed = process_items(vec![3u64, 1, 2], 3, |delay| async move {
            for _ in 0..delay {
                tokio::task::yield_now().await;
            }
            Ok::<_, ()>(delay)
        })
        .await;

        assert_eq!(vec![1, 2, 3], processed.results);
    }

    #[tokio::test]
    async fn test_no_items() {
        let processed = process_items(Vec::<u8>::new(), DEFAULT_MAX_CONCURRENCY, |item| async move { Ok::<_, ()>(item) }).await;
        assert!(processed.results.is_empty());
        assert!(processed.errors.is_empty());
    }
}
