//! Global in-flight cap for run execution.
//!
//! The cap comes from the settings singleton and may change between poll
//! cycles, so acquisition takes the cap as an argument instead of baking
//! it in. The returned `FlightGuard` releases the slot when dropped, even
//! if the run task panics.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Shared counter of currently executing runs.
#[derive(Clone, Default)]
pub struct InFlight {
    count: Arc<AtomicUsize>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempt to take a slot under `cap`.
    ///
    /// Returns `None` when `cap` runs are already executing; the caller
    /// leaves the run `Scheduled` for a later cycle.
    pub fn try_acquire(&self, cap: usize) -> Option<FlightGuard> {
        self.count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                if n < cap {
                    Some(n + 1)
                } else {
                    None
                }
            })
            .ok()
            .map(|_| FlightGuard {
                count: self.count.clone(),
            })
    }

    /// Number of runs currently holding a slot.
    pub fn current(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

/// RAII slot holder; releases the in-flight slot on drop.
pub struct FlightGuard {
    count: Arc<AtomicUsize>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cap_enforced() {
        let in_flight = InFlight::new();

        let g1 = in_flight.try_acquire(2);
        let g2 = in_flight.try_acquire(2);
        assert!(g1.is_some());
        assert!(g2.is_some());
        assert_eq!(in_flight.current(), 2);

        // At the cap: no third slot.
        assert!(in_flight.try_acquire(2).is_none());

        drop(g1);
        assert_eq!(in_flight.current(), 1);
        assert!(in_flight.try_acquire(2).is_some());
    }

    #[test]
    fn test_cap_change_applies_to_new_acquisitions() {
        let in_flight = InFlight::new();
        let _g1 = in_flight.try_acquire(1).unwrap();

        // A raised cap admits more without disturbing held slots.
        assert!(in_flight.try_acquire(1).is_none());
        assert!(in_flight.try_acquire(2).is_some());
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let in_flight = InFlight::new();
        {
            let _g = in_flight.try_acquire(1).unwrap();
            assert_eq!(in_flight.current(), 1);
        }
        assert_eq!(in_flight.current(), 0);
    }

    #[test]
    fn test_thread_safety() {
        use std::sync::Mutex;
        use std::thread;

        let in_flight = InFlight::new();
        // Guards are parked here so slots stay held until all threads race.
        let held = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let in_flight = in_flight.clone();
                let held = held.clone();
                thread::spawn(move || {
                    if let Some(guard) = in_flight.try_acquire(4) {
                        held.lock().unwrap().push(guard);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(held.lock().unwrap().len() <= 4);
        assert_eq!(in_flight.current(), held.lock().unwrap().len());
    }
}
