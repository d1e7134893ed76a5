//! Sharing the core between interrupt handlers and thread code

use core::cell::RefCell;
use critical_section::Mutex;

/// A value that's shared with an interrupt handler
///
/// Typically holds the [`Core`](crate::usbcore::Core) and the class drivers,
/// so that the USB interrupt handler can `poll()` while thread code reads and
/// writes class data. Access is serialized by a critical section.
///
/// Don't run synchronous transfers from within `with_mut`; they block the
/// interrupt that would otherwise poll the core.
pub struct Shared<T> {
    inner: Mutex<RefCell<T>>,
}

impl<T> Shared<T> {
    pub const fn new(value: T) -> Self {
        Shared {
            inner: Mutex::new(RefCell::new(value)),
        }
    }

    /// Interrupt-safe, immutable access to the value
    pub fn with<R>(&self, func: impl FnOnce(&T) -> R) -> R {
        critical_section::with(|cs| {
            let value = self.inner.borrow(cs);
            let value = value.borrow();
            func(&*value)
        })
    }

    /// Interrupt-safe, mutable access to the value
    ///
    /// # Panics
    ///
    /// Panics if called while already inside `with` or `with_mut` for the
    /// same value.
    pub fn with_mut<R>(&self, func: impl FnOnce(&mut T) -> R) -> R {
        critical_section::with(|cs| {
            let value = self.inner.borrow(cs);
            let mut value = value.borrow_mut();
            func(&mut *value)
        })
    }

    pub fn into_inner(self) -> T {
        self.inner.into_inner().into_inner()
    }
}
