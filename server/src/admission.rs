use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use tokio::sync::OwnedSemaphorePermit;
use tokio::sync::Semaphore;

/// Limits how many requests compile at once. Requests over the limit wait
/// for a permit; accepting connections is never blocked by this.
#[derive(Debug)]
pub struct Admission {
    limiter: Option<Arc<Semaphore>>,
    compiling: Arc<AtomicUsize>,
}

/// Held for the duration of one compilation.
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: Option<OwnedSemaphorePermit>,
    compiling: Arc<AtomicUsize>,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.compiling.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Admission {
    /// `None` admits every request immediately. Limits above the semaphore's
    /// capacity are clamped to it.
    pub fn new(max_parallel_compilations: Option<usize>) -> Self {
        Self {
            limiter: max_parallel_compilations
                .map(|max| Arc::new(Semaphore::new(max.min(Semaphore::MAX_PERMITS)))),
            compiling: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub async fn admit(&self) -> AdmissionPermit {
        let permit = match &self.limiter {
            // The semaphore is never closed, so acquiring cannot fail.
            Some(limiter) => limiter.clone().acquire_owned().await.ok(),
            None => None,
        };
        self.compiling.fetch_add(1, Ordering::SeqCst);
        AdmissionPermit {
            _permit: permit,
            compiling: self.compiling.clone(),
        }
    }

    /// Requests currently holding a permit.
    pub fn compiling(&self) -> usize {
        self.compiling.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_limit_makes_excess_requests_wait() {
        let admission = Arc::new(Admission::new(Some(1)));
        let first = admission.admit().await;
        assert_eq!(admission.compiling(), 1);

        let waiting = {
            let admission = admission.clone();
            tokio::spawn(async move {
                let _permit = admission.admit().await;
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiting.is_finished());
        assert_eq!(admission.compiling(), 1);

        drop(first);
        tokio::time::timeout(Duration::from_secs(5), waiting)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(admission.compiling(), 0);
    }

    #[tokio::test]
    async fn test_unlimited_admission_counts_requests() {
        let admission = Admission::new(None);
        let a = admission.admit().await;
        let b = admission.admit().await;
        assert_eq!(admission.compiling(), 2);
        drop((a, b));
        assert_eq!(admission.compiling(), 0);
    }

    #[tokio::test]
    async fn test_oversized_limit_is_clamped() {
        let admission = Admission::new(Some(usize::MAX));
        let _permit = admission.admit().await;
        assert_eq!(admission.compiling(), 1);
    }
}
