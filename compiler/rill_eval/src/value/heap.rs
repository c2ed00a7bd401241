//! Heap allocation wrapper for runtime values.

use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

/// A single-threaded heap handle.
///
/// Wraps `Rc<T>` and enforces that all heap values go through `Value`
/// factory methods (the constructor is crate-private). The runtime is
/// single-threaded by design, so `Rc` is used instead of `Arc`.
pub struct Heap<T: ?Sized>(Rc<T>);

impl<T> Heap<T> {
    #[inline]
    pub(crate) fn new(value: T) -> Self {
        Heap(Rc::new(value))
    }
}

impl<T: ?Sized> Heap<T> {
    /// Identity comparison: do both handles point at the same allocation?
    #[inline]
    pub fn same(a: &Heap<T>, b: &Heap<T>) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }

    /// Stable address of the allocation, for identity hashing.
    #[inline]
    pub fn addr(this: &Heap<T>) -> usize {
        Rc::as_ptr(&this.0) as *const () as usize
    }
}

impl<T: ?Sized> Clone for Heap<T> {
    #[inline]
    fn clone(&self) -> Self {
        Heap(Rc::clone(&self.0))
    }
}

impl<T: ?Sized> Deref for Heap<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Heap<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
