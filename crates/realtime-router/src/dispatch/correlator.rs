//! Request correlation

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Id and start time of one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestStamp {
    pub id: u64,
    pub started_at: Instant,
}

impl RequestStamp {
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn elapsed_ms(&self) -> u128 {
        self.elapsed().as_millis()
    }
}

/// Issues strictly increasing request ids, shared by every connection
#[derive(Debug, Default)]
pub struct RequestCorrelator {
    last: AtomicU64,
}

impl RequestCorrelator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp a new request. The first id is 1.
    pub fn next(&self) -> RequestStamp {
        RequestStamp {
            id: self.last.fetch_add(1, Ordering::SeqCst) + 1,
            started_at: Instant::now(),
        }
    }

    /// Last id handed out, 0 before the first request
    pub fn last_id(&self) -> u64 {
        self.last.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_ids_ascend() {
        let correlator = RequestCorrelator::new();
        assert_eq!(correlator.last_id(), 0);
        assert_eq!(correlator.next().id, 1);
        assert_eq!(correlator.next().id, 2);
        assert_eq!(correlator.last_id(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_ids_are_distinct() {
        let correlator = Arc::new(RequestCorrelator::new());

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let correlator = correlator.clone();
                tokio::spawn(async move {
                    let ids: Vec<u64> = (0..100).map(|_| correlator.next().id).collect();
                    ids
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for task in tasks {
            let ids = task.await.unwrap();
            assert!(ids.windows(2).all(|w| w[0] < w[1]));
            for id in ids {
                assert!(seen.insert(id));
            }
        }
        assert_eq!(seen.len(), 1600);
        assert_eq!(correlator.last_id(), 1600);
    }
}
