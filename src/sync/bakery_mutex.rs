use std::{
    cell::UnsafeCell,
    ops::{Deref, DerefMut},
};

use super::BakeryLock;

/// Data guarded by a bakery, the shape of `std::sync::Mutex` with participant ids.
pub struct BakeryMutex<T> {
    bakery: BakeryLock,
    value: UnsafeCell<T>,
}
// UnsafeCell makes this !Sync, the bakery hands out &mut T to one participant at a time
unsafe impl<T> Sync for BakeryMutex<T> where T: Send {}

impl<T> BakeryMutex<T> {
    pub fn new(capacity: usize, value: T) -> anyhow::Result<Self> {
        Ok(Self {
            bakery: BakeryLock::new(capacity)?,
            value: UnsafeCell::new(value),
        })
    }

    pub fn capacity(&self) -> usize {
        self.bakery.capacity()
    }

    /// Spins until participant `id` has exclusive access to the value.
    ///
    /// # Safety
    ///
    /// `id` must be in `[0, capacity)` and used by one thread at a time, which must not already
    /// hold a guard for it. Two live guards for the same id alias the value.
    pub unsafe fn lock(&self, id: usize) -> BakeryMutexGuard<'_, T> {
        self.bakery.acquire(id);
        BakeryMutexGuard { mutex: self, id }
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.value.get_mut()
    }

    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

pub struct BakeryMutexGuard<'a, T> {
    mutex: &'a BakeryMutex<T>,
    id: usize,
}

impl<T> BakeryMutexGuard<'_, T> {
    pub fn id(&self) -> usize {
        self.id
    }
}

impl<T> Deref for BakeryMutexGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: the guard exists only while its participant holds the bakery
        unsafe { &*self.mutex.value.get() }
    }
}

impl<T> DerefMut for BakeryMutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard exists only while its participant holds the bakery
        unsafe { &mut *self.mutex.value.get() }
    }
}

impl<T> Drop for BakeryMutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.bakery.release(self.id)
    }
}

#[cfg(test)]
mod tests {
    use crate::sync::bakery_mutex::BakeryMutex;
    use std::time::Duration;

    #[test]
    fn rejects_zero_capacity() {
        assert!(BakeryMutex::new(0, ()).is_err());
        assert_eq!(BakeryMutex::new(3, ()).unwrap().capacity(), 3);
    }

    #[test]
    fn counter() {
        const N_THREADS: usize = 6;
        const WORK: u64 = 20_000;
        let mu = BakeryMutex::new(N_THREADS, 0u64).unwrap();
        std::thread::scope(|s| {
            for n in 0..N_THREADS {
                let mu = &mu;
                s.spawn(move || {
                    for _ in 0..WORK {
                        // SAFETY: each thread owns its own id
                        let mut guard = unsafe { mu.lock(n) };
                        assert_eq!(guard.id(), n);
                        *guard += 1;
                    }
                });
            }
        });
        assert_eq!(mu.into_inner(), N_THREADS as u64 * WORK);
    }

    #[test]
    fn guard_drop_releases() {
        let mu = BakeryMutex::new(2, Vec::new()).unwrap();
        std::thread::scope(|s| {
            // SAFETY: id 0 stays on this thread
            let mut guard = unsafe { mu.lock(0) };
            guard.push(0);

            let th = s.spawn(|| {
                // SAFETY: id 1 is only used here
                let mut guard = unsafe { mu.lock(1) };
                guard.push(1);
            });
            std::thread::sleep(Duration::from_millis(100));
            assert!(!th.is_finished());

            drop(guard);
            th.join().unwrap();
        });
        let mut mu = mu;
        mu.get_mut().push(2);
        assert_eq!(mu.into_inner(), vec![0, 1, 2]);
    }
}
