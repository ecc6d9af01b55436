use std::sync::{
    atomic::{fence, AtomicBool, AtomicU64, Ordering},
    Arc,
};

use super::{Mutex, MutexGuard};

/// Lamport's bakery lock for a fixed set of participants.
///
/// Each participant `i` in `[0, capacity)` owns slot `i` of both arrays and is the only writer of it;
/// everyone else only reads. No read-modify-write instruction is used.
pub struct BakeryLock {
    choosing: Box<[AtomicBool]>,
    number: Box<[AtomicU64]>,
}

impl BakeryLock {
    const FREE: u64 = 0;
    const DEFAULT_CAPACITY: usize = 10;
    const SPIN_LIMIT: u32 = 64;

    pub fn new(capacity: usize) -> anyhow::Result<Self> {
        anyhow::ensure!(
            capacity > 0,
            "Expect a bakery for at least 1 participant, got capacity={capacity}"
        );
        Ok(Self::with_slots(capacity))
    }

    fn with_slots(capacity: usize) -> Self {
        Self {
            choosing: (0..capacity).map(|_| AtomicBool::new(false)).collect(),
            number: (0..capacity)
                .map(|_| AtomicU64::new(BakeryLock::FREE))
                .collect(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.number.len()
    }

    /// Current ticket of participant `i`, 0 when it neither waits for nor holds the lock.
    pub fn ticket(&self, i: usize) -> u64 {
        self.number[i].load(Ordering::Acquire)
    }

    /// Spins until participant `i` holds the lock.
    ///
    /// `i` must be in `[0, capacity)`, owned by the calling thread and not currently holding the lock.
    pub fn acquire(&self, i: usize) {
        debug_assert!(
            i < self.capacity(),
            "Expect 0-based participant {i} < capacity={}",
            self.capacity()
        );
        debug_assert!(
            self.number[i].load(Ordering::Relaxed) == BakeryLock::FREE,
            "Participant {i} acquired twice without releasing"
        );
        let ticket = self.take_ticket(i);
        self.wait_turn(i, ticket);
    }

    /// Releases the lock held by participant `i`. Never blocks.
    pub fn release(&self, i: usize) {
        debug_assert!(
            self.number[i].load(Ordering::Relaxed) != BakeryLock::FREE,
            "Participant {i} released without holding the lock"
        );
        // Orders the critical section before the slot reads as free
        self.number[i].store(BakeryLock::FREE, Ordering::Release);
    }

    fn take_ticket(&self, i: usize) -> u64 {
        self.choosing[i].store(true, Ordering::Relaxed);
        // Without the two SC fences a store buffer lets two participants each read the other's
        // stale 0 ticket and both enter. This one covers `choosing` store -> `number` loads.
        fence(Ordering::SeqCst);

        // Racy on purpose, only needs to be large enough. Equal tickets are broken by id.
        let max_seen = self
            .number
            .iter()
            .map(|n| n.load(Ordering::Relaxed))
            .max()
            .unwrap_or(BakeryLock::FREE);
        let ticket = max_seen + 1;
        self.number[i].store(ticket, Ordering::Relaxed);

        // Covers `number` store -> other participants' `choosing` loads
        fence(Ordering::SeqCst);
        self.choosing[i].store(false, Ordering::Release);
        ticket
    }

    fn wait_turn(&self, i: usize, ticket: u64) {
        for (j, (choosing, number)) in self.choosing.iter().zip(self.number.iter()).enumerate() {
            if j == i {
                continue;
            }

            // Never compare against a ticket j has not finished publishing
            let mut spins = 0;
            while choosing.load(Ordering::Acquire) {
                relax(&mut spins);
            }

            // Wait while j is in the bakery ahead of us: smaller ticket, or same ticket and smaller id
            let mut spins = 0;
            loop {
                let other = number.load(Ordering::Acquire);
                if other == BakeryLock::FREE || (ticket, i) < (other, j) {
                    break;
                }
                relax(&mut spins);
            }
        }
    }
}

impl Default for BakeryLock {
    fn default() -> Self {
        Self::with_slots(BakeryLock::DEFAULT_CAPACITY)
    }
}

// Busy waits on the CPU first, then yields so a descheduled holder can run. Stays runnable either way.
fn relax(spins: &mut u32) {
    if *spins < BakeryLock::SPIN_LIMIT {
        *spins += 1;
        std::hint::spin_loop()
    } else {
        std::thread::yield_now()
    }
}

/// Participant `n`'s handle on a shared bakery.
pub struct BakeryN {
    n: usize,
    bakery: Arc<BakeryLock>,
}

impl BakeryN {
    pub fn new(n: usize, bakery: &Arc<BakeryLock>) -> Self {
        assert!(
            n < bakery.capacity(),
            "Expect 0-based participant {n} < capacity={}",
            bakery.capacity()
        );
        Self {
            n,
            bakery: bakery.clone(),
        }
    }

    pub fn id(&self) -> usize {
        self.n
    }
}

impl Mutex for BakeryN {
    fn acquire(&self) -> MutexGuard<'_, Self> {
        self.bakery.acquire(self.n);
        MutexGuard { mutex: self }
    }
    fn release(&self) {
        self.bakery.release(self.n)
    }
}
