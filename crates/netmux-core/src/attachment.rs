//! Per-connection shared state
//!
//! One `Attachment` is created when a connection is registered with the
//! poller and lives as long as the connection. The poller thread stamps
//! `last_access` and flips `armed`-adjacent flags; workers and parked
//! handler threads touch `wake_up` and the parker. All fields are atomics
//! or a condvar pair, so no lock ordering exists between the attachment
//! and the poller's own structures.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, OnceLock};
use std::time::{Duration, Instant};

/// Milliseconds since the process-wide clock epoch.
///
/// Monotonic; used for idle-timeout accounting. Cheap enough to call on
/// every readiness event.
pub fn now_millis() -> u64 {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    EPOCH.get_or_init(Instant::now).elapsed().as_millis() as u64
}

/// Per-connection state shared between the poller, workers and any
/// handler thread parked on the connection.
pub struct Attachment {
    /// Last readiness or registration stamp, in [`now_millis`] time.
    /// Racy updates are benign; the value only ever moves forward.
    last_access: AtomicU64,

    /// Comet (long-poll) registration: readiness is delivered through
    /// `Handler::event` instead of `Handler::process`.
    comet: AtomicBool,

    /// A thread is parked on this connection waiting for readiness;
    /// the poller unparks instead of dispatching.
    wake_up: AtomicBool,

    /// The connection is currently being accessed by a processor.
    current_access: AtomicBool,

    /// One-shot readiness signal for comet parking.
    signal: Mutex<bool>,
    cond: Condvar,
}

impl Attachment {
    pub fn new() -> Self {
        Self {
            last_access: AtomicU64::new(now_millis()),
            comet: AtomicBool::new(false),
            wake_up: AtomicBool::new(false),
            current_access: AtomicBool::new(false),
            signal: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    /// Stamp the connection as touched now.
    #[inline]
    pub fn access(&self) {
        self.last_access.store(now_millis(), Ordering::Relaxed);
    }

    #[inline]
    pub fn last_access(&self) -> u64 {
        self.last_access.load(Ordering::Relaxed)
    }

    /// How long the connection has been idle relative to `now` (ms).
    #[inline]
    pub fn idle_millis(&self, now: u64) -> u64 {
        now.saturating_sub(self.last_access())
    }

    #[inline]
    pub fn comet(&self) -> bool {
        self.comet.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set_comet(&self, comet: bool) {
        self.comet.store(comet, Ordering::Relaxed);
    }

    #[inline]
    pub fn wake_up(&self) -> bool {
        self.wake_up.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set_wake_up(&self, wake_up: bool) {
        self.wake_up.store(wake_up, Ordering::Release);
    }

    #[inline]
    pub fn current_access(&self) -> bool {
        self.current_access.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set_current_access(&self, access: bool) {
        self.current_access.store(access, Ordering::Relaxed);
    }

    /// Park the calling thread until [`unpark`](Self::unpark) is called.
    ///
    /// The signal is one-shot: an `unpark` that happens before `park`
    /// makes the next `park` return immediately, so the
    /// set-wake-up / re-arm / park sequence has no lost-wakeup window.
    ///
    /// Returns `true` if woken by a signal, `false` on timeout. Callers
    /// re-check their own predicate either way.
    pub fn park(&self, timeout: Option<Duration>) -> bool {
        let mut signaled = lock(&self.signal);
        let deadline = timeout.map(|t| Instant::now() + t);
        while !*signaled {
            match deadline {
                Some(d) => {
                    let now = Instant::now();
                    if now >= d {
                        return false;
                    }
                    let (guard, _) = self
                        .cond
                        .wait_timeout(signaled, d - now)
                        .unwrap_or_else(|p| p.into_inner());
                    signaled = guard;
                }
                None => {
                    signaled = self
                        .cond
                        .wait(signaled)
                        .unwrap_or_else(|p| p.into_inner());
                }
            }
        }
        *signaled = false;
        true
    }

    /// Release every thread parked on this connection.
    pub fn unpark(&self) {
        let mut signaled = lock(&self.signal);
        *signaled = true;
        self.cond.notify_all();
    }
}

impl Default for Attachment {
    fn default() -> Self {
        Self::new()
    }
}

fn lock(m: &Mutex<bool>) -> std::sync::MutexGuard<'_, bool> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_access_stamps_forward() {
        let att = Attachment::new();
        let first = att.last_access();
        thread::sleep(Duration::from_millis(5));
        att.access();
        assert!(att.last_access() >= first);
        assert!(att.idle_millis(now_millis()) < 1000);
    }

    #[test]
    fn test_flags() {
        let att = Attachment::new();
        assert!(!att.comet());
        assert!(!att.wake_up());
        assert!(!att.current_access());

        att.set_comet(true);
        att.set_wake_up(true);
        att.set_current_access(true);
        assert!(att.comet());
        assert!(att.wake_up());
        assert!(att.current_access());
    }

    #[test]
    fn test_park_unpark() {
        let att = Arc::new(Attachment::new());
        let att2 = Arc::clone(&att);

        let parked = thread::spawn(move || att2.park(Some(Duration::from_secs(5))));
        thread::sleep(Duration::from_millis(50));
        att.unpark();
        assert!(parked.join().unwrap());
    }

    #[test]
    fn test_unpark_before_park_is_not_lost() {
        let att = Attachment::new();
        att.unpark();
        // Signal latched: park returns immediately
        assert!(att.park(Some(Duration::from_millis(10))));
        // And it was consumed
        assert!(!att.park(Some(Duration::from_millis(10))));
    }

    #[test]
    fn test_park_timeout() {
        let att = Attachment::new();
        let start = Instant::now();
        assert!(!att.park(Some(Duration::from_millis(50))));
        assert!(start.elapsed() >= Duration::from_millis(40));
    }
}
