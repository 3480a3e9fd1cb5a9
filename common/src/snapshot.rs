//! Double buffered hand off between one producer and any number of readers
//!
//! The producer fills the back slot without holding any lock, then swaps the
//! front/back designation inside a short critical section. Readers copy the
//! whole front slot inside that same critical section, so a read always
//! returns a value written by exactly one `publish` call.

use std::{
    cell::UnsafeCell,
    fmt::{self, Debug},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
};

use tracing::instrument;

struct Slots<T> {
    slots: [UnsafeCell<T>; 2],
    /// Index of the slot readers may copy from
    front: Mutex<usize>,
    generation: AtomicU64,
}

// SAFETY: The slot at `front` is only accessed while `front` is locked. The other
// slot is only written by the unique `Publisher`, which is the only place `front`
// is changed.
unsafe impl<T: Send> Sync for Slots<T> {}

impl<T> Slots<T> {
    fn lock_front(&self) -> MutexGuard<'_, usize> {
        // Nothing panics while the guard is held, but a poisoned index is still valid
        self.front.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Creates a publisher/reader pair with both slots holding `initial`
pub fn channel<T: Clone + Send>(initial: T) -> (Publisher<T>, SharedSnapshot<T>) {
    let slots = Arc::new(Slots {
        slots: [UnsafeCell::new(initial.clone()), UnsafeCell::new(initial)],
        front: Mutex::new(0),
        generation: AtomicU64::new(0),
    });

    let publisher = Publisher {
        shared: slots.clone(),
        back: 1,
    };
    let snapshot = SharedSnapshot { shared: slots };

    (publisher, snapshot)
}

/// The single writer role, there is exactly one per snapshot pair
pub struct Publisher<T> {
    shared: Arc<Slots<T>>,
    back: usize,
}

impl<T: Clone + Send> Publisher<T> {
    /// Makes `value` visible to every reader
    #[instrument(level = "trace", skip_all)]
    pub fn publish(&mut self, value: &T) {
        // SAFETY: `self.back` is never the front slot. Readers only touch the front slot and
        // `front` only changes below, while this `&mut self` borrow is held.
        let value = value.clone();
        unsafe {
            *self.shared.slots[self.back].get() = value;
        }

        let mut front = self.shared.lock_front();
        *front = self.back;
        self.shared.generation.fetch_add(1, Ordering::Release);
        drop(front);

        self.back = 1 - self.back;
    }

    /// A reader for the values published by this publisher
    pub fn snapshot(&self) -> SharedSnapshot<T> {
        SharedSnapshot {
            shared: self.shared.clone(),
        }
    }
}

/// Read handle, cheap to clone and hand to any number of threads
pub struct SharedSnapshot<T> {
    shared: Arc<Slots<T>>,
}

impl<T: Clone + Send> SharedSnapshot<T> {
    /// Copies out the most recently published value
    pub fn read(&self) -> T {
        let front = self.shared.lock_front();

        // SAFETY: The front slot is never written while `front` is locked
        unsafe { (*self.shared.slots[*front].get()).clone() }
    }

    /// Number of completed publishes, zero if only the initial value is visible
    pub fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::Acquire)
    }
}

impl<T> Clone for SharedSnapshot<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> Debug for SharedSnapshot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedSnapshot")
            .field("generation", &self.shared.generation.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<T> Debug for Publisher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("back", &self.back)
            .finish_non_exhaustive()
    }
}
