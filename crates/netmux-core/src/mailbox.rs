//! One-slot rendezvous mailbox
//!
//! The hand-off between whoever dispatches a socket (poller or acceptor
//! path) and a single worker thread. Exactly one value crosses per
//! notification: the producer blocks while the slot is occupied, the
//! consumer blocks while it is empty.
//!
//! Invariant: occupied goes false -> true only in `put` (with a notify),
//! true -> false only in `take`. A worker can therefore never lose an
//! assigned value nor observe two at once.

use std::sync::{Condvar, Mutex};

/// A one-slot synchronized hand-off.
pub struct Mailbox<T> {
    slot: Mutex<Slot<T>>,
    cond: Condvar,
}

struct Slot<T> {
    value: Option<T>,
    closed: bool,
}

impl<T> Mailbox<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                value: None,
                closed: false,
            }),
            cond: Condvar::new(),
        }
    }

    /// Deposit a value, blocking while the previous one has not been taken.
    ///
    /// Returns `Err(value)` if the mailbox has been closed; the caller
    /// keeps ownership and decides what to do with the work.
    pub fn put(&self, value: T) -> Result<(), T> {
        let mut slot = lock(&self.slot);
        loop {
            if slot.closed {
                return Err(value);
            }
            if slot.value.is_none() {
                slot.value = Some(value);
                self.cond.notify_all();
                return Ok(());
            }
            slot = wait(&self.cond, slot);
        }
    }

    /// Take the next value, blocking until one is deposited.
    ///
    /// Returns `None` once the mailbox is closed and drained; a worker
    /// treats that as its shutdown signal.
    pub fn take(&self) -> Option<T> {
        let mut slot = lock(&self.slot);
        loop {
            if let Some(value) = slot.value.take() {
                self.cond.notify_all();
                return Some(value);
            }
            if slot.closed {
                return None;
            }
            slot = wait(&self.cond, slot);
        }
    }

    /// Close the mailbox and wake every waiter.
    ///
    /// Blocked producers get their value back; the consumer drains any
    /// deposited value and then sees `None`.
    pub fn close(&self) {
        let mut slot = lock(&self.slot);
        slot.closed = true;
        self.cond.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.slot).closed
    }
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

// A poisoned mailbox mutex means a worker panicked mid-handoff; the slot
// state itself is still a valid Option + flag, so recover and continue.
fn lock<'a, T>(m: &'a Mutex<Slot<T>>) -> std::sync::MutexGuard<'a, Slot<T>> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

fn wait<'a, T>(
    cv: &Condvar,
    guard: std::sync::MutexGuard<'a, Slot<T>>,
) -> std::sync::MutexGuard<'a, Slot<T>> {
    cv.wait(guard).unwrap_or_else(|p| p.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_put_take() {
        let mb = Mailbox::new();
        mb.put(7).unwrap();
        assert_eq!(mb.take(), Some(7));
    }

    #[test]
    fn test_producer_blocks_until_taken() {
        let mb = Arc::new(Mailbox::new());
        mb.put(1).unwrap();

        let mb2 = Arc::clone(&mb);
        let producer = thread::spawn(move || {
            // Blocks: slot still holds 1
            mb2.put(2).unwrap();
        });

        thread::sleep(Duration::from_millis(50));
        assert!(!producer.is_finished());

        assert_eq!(mb.take(), Some(1));
        producer.join().unwrap();
        assert_eq!(mb.take(), Some(2));
    }

    #[test]
    fn test_consumer_blocks_until_put() {
        let mb = Arc::new(Mailbox::new());
        let mb2 = Arc::clone(&mb);

        let consumer = thread::spawn(move || mb2.take());

        thread::sleep(Duration::from_millis(50));
        assert!(!consumer.is_finished());

        mb.put("work").unwrap();
        assert_eq!(consumer.join().unwrap(), Some("work"));
    }

    #[test]
    fn test_close_wakes_consumer() {
        let mb = Arc::new(Mailbox::<u32>::new());
        let mb2 = Arc::clone(&mb);

        let consumer = thread::spawn(move || mb2.take());
        thread::sleep(Duration::from_millis(50));

        mb.close();
        assert_eq!(consumer.join().unwrap(), None);
    }

    #[test]
    fn test_close_rejects_put_and_returns_value() {
        let mb = Mailbox::new();
        mb.close();
        assert_eq!(mb.put(9), Err(9));
        assert!(mb.is_closed());
    }

    #[test]
    fn test_close_drains_pending_value() {
        let mb = Mailbox::new();
        mb.put(3).unwrap();
        mb.close();
        // Deposited before close: still delivered, then None
        assert_eq!(mb.take(), Some(3));
        assert_eq!(mb.take(), None);
    }

    #[test]
    fn test_serialized_handoffs() {
        let mb = Arc::new(Mailbox::new());
        let mb2 = Arc::clone(&mb);

        let consumer = thread::spawn(move || {
            let mut seen = Vec::new();
            while let Some(v) = mb2.take() {
                seen.push(v);
            }
            seen
        });

        for i in 0..100 {
            mb.put(i).unwrap();
        }
        mb.close();

        let seen = consumer.join().unwrap();
        assert_eq!(seen, (0..100).collect::<Vec<_>>());
    }
}
