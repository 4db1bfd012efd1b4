use parking_lot::{Condvar, Mutex};

use crate::error::{CaskError, Result};

/// Counting semaphore bounding in-flight pipeline tasks.
///
/// Callers take a [`Permit`] before submitting work; the permit returns
/// its slot on drop, including when the task bails out early.
pub(crate) struct Semaphore {
    state: Mutex<SemaphoreState>,
    freed: Condvar,
}

struct SemaphoreState {
    available: usize,
    capacity: usize,
    poisoned: bool,
}

impl Semaphore {
    /// A capacity of zero is raised to one.
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(SemaphoreState {
                available: capacity,
                capacity,
                poisoned: false,
            }),
            freed: Condvar::new(),
        }
    }

    /// Block until a slot is free. Fails once the semaphore is poisoned.
    pub(crate) fn acquire(&self) -> Result<Permit<'_>> {
        let mut st = self.state.lock();
        loop {
            if st.poisoned {
                return Err(CaskError::Aborted("concurrency gate poisoned".into()));
            }
            if st.available > 0 {
                st.available -= 1;
                return Ok(Permit { semaphore: self });
            }
            self.freed.wait(&mut st);
        }
    }

    fn release(&self) {
        let mut st = self.state.lock();
        st.available = (st.available + 1).min(st.capacity);
        self.freed.notify_one();
    }

    /// Fail every current and future `acquire`.
    pub(crate) fn poison(&self) {
        let mut st = self.state.lock();
        st.poisoned = true;
        self.freed.notify_all();
    }

    #[cfg(test)]
    pub(crate) fn available(&self) -> usize {
        self.state.lock().available
    }
}

pub(crate) struct Permit<'a> {
    semaphore: &'a Semaphore,
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        self.semaphore.release();
    }
}
