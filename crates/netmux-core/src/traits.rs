//! External executor seam
//!
//! When an embedder supplies its own thread pool, the endpoint submits
//! one-shot dispatch tasks to it and bypasses the internal worker pool
//! entirely. The handler contract is unchanged either way.

use crate::error::TaskRejected;

/// A submit-one-task capability with no return value.
///
/// Implementations must be safe to call from the poller thread and from
/// acceptor threads concurrently. `execute` should hand the task to
/// another thread and return quickly; a saturated or shut-down executor
/// returns `Err(TaskRejected)` and the endpoint closes the socket the
/// task was carrying.
pub trait Executor: Send + Sync {
    fn execute(&self, task: Box<dyn FnOnce() + Send>) -> Result<(), TaskRejected>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Inline {
        ran: AtomicUsize,
    }

    impl Executor for Inline {
        fn execute(&self, task: Box<dyn FnOnce() + Send>) -> Result<(), TaskRejected> {
            self.ran.fetch_add(1, Ordering::Relaxed);
            task();
            Ok(())
        }
    }

    #[test]
    fn test_object_safe() {
        let ex: Arc<dyn Executor> = Arc::new(Inline {
            ran: AtomicUsize::new(0),
        });
        ex.execute(Box::new(|| {})).unwrap();
    }
}
