use std::mem;
use std::ptr::{self, NonNull};

/// Remembers how to release an item while forgetting the item's type.
///
/// Every collection in this crate holds one `Teardown` per stored region (the item of an
/// [`OpaqueArray`][crate::OpaqueArray] or [`OpaqueList`][crate::OpaqueList], the key and the
/// value of an [`OpaqueHashTable`][crate::OpaqueHashTable]) and runs it exactly once for every
/// item it releases: on removal, on clearing and when the collection itself is dropped.
/// The memory of the item is reclaimed right after the hook returns, without any further
/// cleanup, so the hook is responsible for everything the item owns.
///
/// Collections configured via `layout_of::<T>()` default to [`Teardown::drop_in_place`] for
/// `T`, which gives ordinary Rust drop semantics. Collections configured from a raw
/// [`Layout`][std::alloc::Layout] default to [`Teardown::none`].
///
/// # Examples
///
/// ```
/// use opaque_collections::{OpaqueArray, Teardown};
///
/// fn zero_out(buffer: &mut [u8; 16]) {
///     buffer.fill(0);
/// }
///
/// let mut array = OpaqueArray::builder()
///     .layout_of::<[u8; 16]>()
///     .teardown(Teardown::from_fn(zero_out))
///     .build()
///     .unwrap();
///
/// // SAFETY: The array was built for [u8; 16].
/// unsafe { array.push_back([0xAA_u8; 16]) }.unwrap();
///
/// // Runs `zero_out` on the item before its memory is reclaimed.
/// array.pop_back().unwrap();
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct Teardown {
    hook: Option<fn(NonNull<()>)>,
}

impl Teardown {
    /// A teardown that does nothing. Suitable for plain data that owns no resources.
    #[must_use]
    #[inline]
    pub const fn none() -> Self {
        Self { hook: None }
    }

    /// A teardown that drops the item in place as a `T`.
    ///
    /// For types without drop glue this is the same as [`Teardown::none()`].
    #[must_use]
    #[inline]
    pub fn drop_in_place<T>() -> Self {
        if !mem::needs_drop::<T>() {
            return Self::none();
        }

        Self::erase(drop_fn::<T>)
    }

    /// A teardown that calls `hook` with a mutable reference to the item.
    ///
    /// The item is not dropped after `hook` returns; its memory is simply reclaimed. If `T` owns
    /// resources, `hook` must release them (for example by calling
    /// [`std::ptr::drop_in_place`] itself or by taking the resources out with [`mem::take`]).
    #[must_use]
    #[inline]
    pub fn from_fn<T>(hook: fn(&mut T)) -> Self {
        // SAFETY: For sized T, `&mut T` and `NonNull<T>` are ABI-compatible thin pointers and
        // the hook is only ever invoked with pointers to live, exclusively owned items.
        let hook = unsafe { mem::transmute::<fn(&mut T), fn(NonNull<T>)>(hook) };

        Self::erase(hook)
    }

    /// Whether running this teardown is a no-op.
    #[must_use]
    #[inline]
    pub fn is_none(&self) -> bool {
        self.hook.is_none()
    }

    fn erase<T>(hook: fn(NonNull<T>)) -> Self {
        // Erase the type of the pointer in the function arguments.
        // SAFETY: We are just changing the target of the pointer arg, everything is ABI-equal.
        let hook = unsafe { mem::transmute::<fn(NonNull<T>), fn(NonNull<()>)>(hook) };

        Self { hook: Some(hook) }
    }

    /// Runs the teardown against the item at `target`.
    ///
    /// # Safety
    ///
    /// The caller must ensure that:
    ///
    /// 1. `target` points to a live item of the type this teardown was created for.
    /// 2. The item is not used afterwards, other than to reclaim its memory.
    #[inline]
    pub(crate) unsafe fn run(self, target: NonNull<()>) {
        if let Some(hook) = self.hook {
            hook(target);
        }
    }
}

fn drop_fn<T>(ptr: NonNull<T>) {
    // SAFETY: Teardown::run() forwards its safety requirements here.
    unsafe {
        ptr::drop_in_place(ptr.as_ptr());
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::cell::Cell;
    use std::mem::ManuallyDrop;
    use std::rc::Rc;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Teardown: Send, Sync, Copy, std::fmt::Debug);

    /// Test helper that counts how many times it has been dropped.
    struct DropCounter {
        drops: Rc<Cell<usize>>,
    }

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.drops.set(self.drops.get().wrapping_add(1));
        }
    }

    #[test]
    fn none_is_noop() {
        let teardown = Teardown::none();
        assert!(teardown.is_none());

        let mut value = 42_u64;

        // SAFETY: The target is a live u64 that we do not use afterwards.
        unsafe { teardown.run(NonNull::from(&mut value).cast()) };
        assert_eq!(value, 42);
    }

    #[test]
    fn drop_in_place_without_drop_glue_is_none() {
        assert!(Teardown::drop_in_place::<u64>().is_none());
        assert!(Teardown::drop_in_place::<[u8; 20]>().is_none());
        assert!(!Teardown::drop_in_place::<String>().is_none());
    }

    #[test]
    fn drop_in_place_drops_target() {
        let drops = Rc::new(Cell::new(0));
        let mut value = ManuallyDrop::new(DropCounter {
            drops: Rc::clone(&drops),
        });

        let teardown = Teardown::drop_in_place::<DropCounter>();
        assert_eq!(drops.get(), 0);

        // SAFETY: The target is a live DropCounter, protected from its own drop by ManuallyDrop.
        unsafe { teardown.run(NonNull::from(&mut *value).cast()) };
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn from_fn_receives_item() {
        fn double(value: &mut u32) {
            *value = value.wrapping_mul(2);
        }

        let teardown = Teardown::from_fn(double);
        assert!(!teardown.is_none());

        let mut value = 21_u32;

        // SAFETY: The target is a live u32.
        unsafe { teardown.run(NonNull::from(&mut value).cast()) };
        assert_eq!(value, 42);
    }

    #[test]
    fn teardown_is_copyable() {
        let teardown = Teardown::drop_in_place::<DropCounter>();
        let copy = teardown;

        let drops = Rc::new(Cell::new(0));
        let mut first = ManuallyDrop::new(DropCounter {
            drops: Rc::clone(&drops),
        });
        let mut second = ManuallyDrop::new(DropCounter {
            drops: Rc::clone(&drops),
        });

        // SAFETY: Both targets are live DropCounters, each torn down exactly once.
        unsafe {
            teardown.run(NonNull::from(&mut *first).cast());
        }
        // SAFETY: See above.
        unsafe {
            copy.run(NonNull::from(&mut *second).cast());
        }

        assert_eq!(drops.get(), 2);
    }
}
