//! Bounded pool of isolated display slots.
//!
//! The pool is the only shared mutable resource in the engine: a fixed set
//! of display slots handed out under an atomic acquire/release discipline.
//! No two runs can ever observe the same slot as free simultaneously, and a
//! dropped lease returns its slot before the next waiter is admitted.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;

use crate::backend::DisplaySlot;
use crate::error::VerifyError;

pub struct DisplayPool {
    free: Arc<Mutex<VecDeque<DisplaySlot>>>,
    semaphore: Arc<Semaphore>,
    size: usize,
}

impl DisplayPool {
    pub fn new(size: usize, display_base: u32) -> Self {
        let slots = (0..size).map(|i| DisplaySlot::new(i, display_base)).collect();
        Self {
            free: Arc::new(Mutex::new(slots)),
            semaphore: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Wait for a free slot. Admission is FIFO; waiting longer than
    /// `admission_timeout` fails with `AdmissionTimeout` instead of queueing
    /// indefinitely.
    pub async fn acquire(&self, admission_timeout: Duration) -> Result<SlotLease, VerifyError> {
        let permit = match timeout(admission_timeout, self.semaphore.clone().acquire_owned()).await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                return Err(VerifyError::BackendUnavailable("slot pool closed".to_string()))
            }
            Err(_) => return Err(VerifyError::AdmissionTimeout),
        };

        let slot = self.free.lock().unwrap().pop_front();
        match slot {
            Some(slot) => {
                tracing::debug!(slot = %slot.display, "display slot acquired");
                Ok(SlotLease {
                    slot,
                    free: self.free.clone(),
                    _permit: permit,
                })
            }
            // Permit count equals slot count; reaching this means the pool
            // invariant was broken.
            None => Err(VerifyError::BackendUnavailable(
                "slot accounting out of sync".to_string(),
            )),
        }
    }
}

/// An exclusive lease on one display slot. Dropping the lease returns the
/// slot and wakes the next queued waiter, including on panic and
/// cancellation paths.
#[derive(Debug)]
pub struct SlotLease {
    slot: DisplaySlot,
    free: Arc<Mutex<VecDeque<DisplaySlot>>>,
    _permit: OwnedSemaphorePermit,
}

impl SlotLease {
    pub fn slot(&self) -> &DisplaySlot {
        &self.slot
    }
}

impl Drop for SlotLease {
    fn drop(&mut self) {
        // The slot goes back before the permit is released (fields drop
        // after this body), so a waiter admitted by the freed permit always
        // finds a slot.
        self.free.lock().unwrap().push_back(self.slot.clone());
        tracing::debug!(slot = %self.slot.display, "display slot released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pool_never_hands_out_more_than_size() {
        let pool = DisplayPool::new(2, 99);
        let a = pool.acquire(Duration::from_millis(50)).await.unwrap();
        let b = pool.acquire(Duration::from_millis(50)).await.unwrap();
        assert_eq!(pool.available(), 0);
        assert_ne!(a.slot().display, b.slot().display);

        let err = pool.acquire(Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(err, VerifyError::AdmissionTimeout));
    }

    #[tokio::test]
    async fn released_slot_is_immediately_reusable() {
        let pool = DisplayPool::new(1, 99);
        let lease = pool.acquire(Duration::from_millis(50)).await.unwrap();
        let display = lease.slot().display.clone();
        drop(lease);

        let lease = pool.acquire(Duration::from_millis(50)).await.unwrap();
        assert_eq!(lease.slot().display, display);
    }

    #[tokio::test]
    async fn waiters_are_admitted_fifo() {
        let pool = Arc::new(DisplayPool::new(1, 99));
        let first = pool.acquire(Duration::from_secs(1)).await.unwrap();

        let (order_tx, mut order_rx) = tokio::sync::mpsc::unbounded_channel::<u32>();
        let mut waiters = Vec::new();
        for i in 0..3u32 {
            let pool = pool.clone();
            let order_tx = order_tx.clone();
            waiters.push(tokio::spawn(async move {
                let lease = pool.acquire(Duration::from_secs(5)).await.unwrap();
                order_tx.send(i).unwrap();
                drop(lease);
            }));
            // Give each waiter time to join the queue in submission order.
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        drop(first);
        for waiter in waiters {
            waiter.await.unwrap();
        }
        let mut admitted = Vec::new();
        while let Ok(i) = order_rx.try_recv() {
            admitted.push(i);
        }
        assert_eq!(admitted, [0, 1, 2]);
    }

    #[tokio::test]
    async fn lease_survives_holder_panic() {
        let pool = Arc::new(DisplayPool::new(1, 99));
        let held = pool.clone();
        let task = tokio::spawn(async move {
            let _lease = held.acquire(Duration::from_millis(50)).await.unwrap();
            panic!("holder died");
        });
        assert!(task.await.is_err());
        assert!(pool.acquire(Duration::from_millis(100)).await.is_ok());
    }
}
