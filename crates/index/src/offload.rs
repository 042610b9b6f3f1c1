use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Bounded pool for blocking store calls.
///
/// Each call takes a permit and runs on tokio's blocking threads, so at most
/// `size` store calls are outstanding and the async workers never block.
#[derive(Debug, Clone)]
pub struct BlockingPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl BlockingPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .context("Blocking pool closed")?;

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            f()
        })
        .await
        .context("Blocking task join error")?
    }
}

impl Default for BlockingPool {
    fn default() -> Self {
        Self::new(8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_runs_closure_and_returns_value() {
        let pool = BlockingPool::new(2);
        let value = pool.run(|| Ok(21 * 2)).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_errors_propagate() {
        let pool = BlockingPool::default();
        let result: Result<()> = pool.run(|| anyhow::bail!("connection refused")).await;
        assert!(result.unwrap_err().to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_bounds_outstanding_calls() {
        let pool = BlockingPool::new(2);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = pool.clone();
            let in_flight = in_flight.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                pool.run(move || {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(10));
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
                .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert!(max_seen.load(Ordering::SeqCst) <= 2);
    }
}
