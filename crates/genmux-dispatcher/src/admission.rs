use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Result of offering work to the admission controller.
#[derive(Debug, PartialEq, Eq)]
pub enum Admission<T> {
    /// A slot was taken; the caller must start the work now
    Start(T),
    /// No slot was free; the work waits at this 1-based queue position
    Queued { position: usize },
}

/// Global concurrency ceiling with a FIFO wait queue.
///
/// The counter and the queue are updated under one lock, so a slot freed by
/// [`release`](Self::release) is handed to the oldest waiter before any new
/// submission can take it.
#[derive(Debug)]
pub struct AdmissionController<T> {
    max_active: usize,
    state: Mutex<State<T>>,
}

#[derive(Debug)]
struct State<T> {
    active: usize,
    queue: VecDeque<T>,
}

impl<T> AdmissionController<T> {
    pub fn new(max_active: usize) -> Self {
        Self {
            max_active: max_active.max(1),
            state: Mutex::new(State {
                active: 0,
                queue: VecDeque::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn admit(&self, item: T) -> Admission<T> {
        let mut state = self.lock();
        if state.active < self.max_active && state.queue.is_empty() {
            state.active += 1;
            Admission::Start(item)
        } else {
            state.queue.push_back(item);
            Admission::Queued {
                position: state.queue.len(),
            }
        }
    }

    /// Frees one slot and returns the oldest queued item if it may start.
    ///
    /// The returned item already holds the freed slot.
    pub fn release(&self) -> Option<T> {
        let mut state = self.lock();
        state.active = state.active.saturating_sub(1);
        if state.active < self.max_active {
            if let Some(next) = state.queue.pop_front() {
                state.active += 1;
                return Some(next);
            }
        }
        None
    }

    /// Removes every queued item without starting it.
    pub fn drain_queue(&self) -> Vec<T> {
        self.lock().queue.drain(..).collect()
    }

    pub fn active(&self) -> usize {
        self.lock().active
    }

    pub fn queue_len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn max_active(&self) -> usize {
        self.max_active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admits_up_to_ceiling() {
        let controller = AdmissionController::new(2);
        assert_eq!(controller.admit(1), Admission::Start(1));
        assert_eq!(controller.admit(2), Admission::Start(2));
        assert_eq!(controller.admit(3), Admission::Queued { position: 1 });
        assert_eq!(controller.admit(4), Admission::Queued { position: 2 });
        assert_eq!(controller.active(), 2);
        assert_eq!(controller.queue_len(), 2);
    }

    #[test]
    fn test_release_hands_slot_to_oldest_waiter() {
        let controller = AdmissionController::new(1);
        assert_eq!(controller.admit("a"), Admission::Start("a"));
        controller.admit("b");
        controller.admit("c");

        assert_eq!(controller.release(), Some("b"));
        assert_eq!(controller.active(), 1);
        assert_eq!(controller.release(), Some("c"));
        assert_eq!(controller.release(), None);
        assert_eq!(controller.active(), 0);
    }

    #[test]
    fn test_active_never_exceeds_ceiling() {
        let controller = AdmissionController::new(3);
        let mut running = Vec::new();
        for i in 0..20 {
            if let Admission::Start(item) = controller.admit(i) {
                running.push(item);
            }
            assert!(controller.active() <= 3);
            if i % 2 == 0 && !running.is_empty() {
                running.remove(0);
                if let Some(next) = controller.release() {
                    running.push(next);
                }
            }
            assert!(controller.active() <= 3);
            assert_eq!(controller.active(), running.len());
        }
    }

    #[test]
    fn test_release_without_active_is_floored() {
        let controller: AdmissionController<u8> = AdmissionController::new(1);
        assert_eq!(controller.release(), None);
        assert_eq!(controller.active(), 0);
    }

    #[test]
    fn test_drain_queue() {
        let controller = AdmissionController::new(1);
        controller.admit(1);
        controller.admit(2);
        controller.admit(3);
        assert_eq!(controller.drain_queue(), vec![2, 3]);
        assert_eq!(controller.queue_len(), 0);
        assert_eq!(controller.active(), 1);
    }
}
