use std::{
    mem::take,
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
};

/// A cancellation/notification primitive shared between the thread that owns
/// a long-running operation and every thread waiting on it to finish.
///
/// Cloning a [`Context`] shares the same underlying mutex/condvar pair, so
/// `cancel_all` wakes every clone's waiters.
#[derive(Debug, Clone, Default)]
pub struct Context<T>(Arc<(Mutex<T>, Condvar)>);

impl<T> Context<T>
where
    T: Default,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the cancellation signal and notifies every waiter.
    pub fn cancel_all(&self, val: T) -> Result<(), PoisonError<MutexGuard<'_, T>>> {
        let (lck, cvar) = &*self.0;
        let mut lck = lck.lock()?;
        *lck = val;
        cvar.notify_all();
        Ok(())
    }

    /// Blocks until notified, returning the value that was set and resetting
    /// the internal state to `T::default()`.
    pub fn wait_condvar(&self) -> Result<T, PoisonError<MutexGuard<'_, T>>> {
        let (lck, cvar) = &*self.0;
        let mut lck = lck.lock()?;
        lck = cvar.wait(lck)?;
        let current = take(&mut *lck);
        Ok(current)
    }

}

impl Context<bool> {
    /// True once `cancel_all` has set the guarded flag.
    pub fn is_cancelled(&self) -> bool {
        let (lck, _) = &*self.0;
        *lck.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks the calling thread indefinitely until `cancel_all(true)` is
    /// observed. Unlike `wait_condvar`, tolerates spurious wakeups.
    pub fn block_until_cancelled(&self) {
        let (lck, cvar) = &*self.0;
        let guard = lck.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = cvar
            .wait_while(guard, |cancelled| !*cancelled)
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Blocks the calling thread until `cancel_all(true)` is observed, or
    /// `timeout` elapses first. Returns `true` if cancellation was observed.
    pub fn wait_timeout(&self, timeout: std::time::Duration) -> bool {
        let (lck, cvar) = &*self.0;
        let guard = lck.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, result) = cvar
            .wait_timeout_while(guard, timeout, |cancelled| !*cancelled)
            .unwrap_or_else(PoisonError::into_inner);
        !result.timed_out() && *guard
    }
}
