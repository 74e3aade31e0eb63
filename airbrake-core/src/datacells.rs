use core::cell::Cell;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use portable_atomic::{AtomicBool, Ordering};

/// A thread-safe single-slot snapshot container.
///
/// One task owns the cell and writes it; any number of tasks read it. Both
/// sides work on copies, so no reference into shared storage ever escapes
/// the lock.
pub struct DataCell<T: Copy> {
    storage: Mutex<CriticalSectionRawMutex, Cell<T>>,
}

impl<T: Copy> DataCell<T> {
    /// Create a new cell with an initial value.
    pub const fn new(init: T) -> Self {
        Self {
            storage: Mutex::new(Cell::new(init)),
        }
    }

    /// Publish a new snapshot (the "write").
    pub fn update(&self, data: T) {
        self.storage.lock(|cell| {
            cell.set(data);
        });
    }

    /// Copy out the latest snapshot (the "read").
    pub fn read(&self) -> T {
        self.storage.lock(|cell| cell.get())
    }
}

/// Edge-triggered soft-reset request.
///
/// The requesting side performs a single-word store; the owning task
/// consumes the edge at the top of its next tick. Requests made while one
/// is already pending coalesce into a single reset.
pub struct ResetFlag {
    requested: AtomicBool,
}

impl ResetFlag {
    pub const fn new() -> Self {
        Self {
            requested: AtomicBool::new(false),
        }
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::Release);
    }

    /// Consume a pending request, if any.
    pub fn take(&self) -> bool {
        self.requested.swap(false, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datacell_init() {
        let cell = DataCell::new(42);
        assert_eq!(cell.read(), 42);
    }

    #[test]
    fn test_datacell_update() {
        let cell = DataCell::new(0);
        cell.update(100);
        assert_eq!(cell.read(), 100);
    }

    #[test]
    fn test_datacell_copies_out() {
        #[derive(Copy, Clone, PartialEq, Debug, Default)]
        struct MyData {
            a: i32,
            b: f32,
        }
        let cell = DataCell::new(MyData::default());
        let mut snap = cell.read();
        snap.a = 7;
        // Mutating the copy must not leak back into the cell.
        assert_eq!(cell.read(), MyData { a: 0, b: 0.0 });
    }

    #[test]
    fn test_reset_flag_edge() {
        let flag = ResetFlag::new();
        assert!(!flag.take());
        flag.request();
        flag.request();
        assert!(flag.take());
        // Coalesced: a second take sees no edge.
        assert!(!flag.take());
    }
}
