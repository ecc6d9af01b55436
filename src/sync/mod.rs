pub mod bakery_mutex;
pub mod lamports_bakery;

pub use bakery_mutex::{BakeryMutex, BakeryMutexGuard};
pub use lamports_bakery::{BakeryLock, BakeryN};

/// Mutex bound to a single participant.
///
/// The requirements for that are
/// 1. Mutual Exclusion - spinlocks on shared variables in the mutex to guarantee only one enters the critical section.
/// 2. No Starvation - assuming OS threads eventually run, participant N can never prevent participant M (N!=M)
/// from returning out of `acquire()`.
pub trait Mutex {
    fn acquire(&self) -> MutexGuard<'_, Self>
    where
        Self: Sized;
    // Only the guard should call this. A manual call while the guard lives makes the guard's drop
    // release a free slot, which the bakery's debug_assert! reports in debug builds.
    fn release(&self);
}

pub struct MutexGuard<'a, M: Mutex> {
    pub(crate) mutex: &'a M,
}

impl<M: Mutex> Drop for MutexGuard<'_, M> {
    fn drop(&mut self) {
        self.mutex.release()
    }
}
