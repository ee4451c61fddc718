use std::alloc::Layout;
use std::iter::FusedIterator;
use std::mem::MaybeUninit;
use std::num::NonZero;
use std::ptr::{self, NonNull};
use std::slice;

use new_zealand::nz;
use tracing::{debug, trace};

use crate::memory::{self, array_layout};
use crate::{DropPolicy, Error, OpaqueArrayBuilder, Result, Teardown};

/// A type-erased growable array of items sharing one memory layout.
///
/// `OpaqueArray` keeps its items packed in a single contiguous buffer, the same way a [`Vec`]
/// does, but it does not know the type of the items. The layout is fixed when the array is
/// built and every typed operation is `unsafe`, with the caller guaranteeing that the type used
/// matches the layout (debug builds verify this).
///
/// Appending is amortized O(1): when the buffer is full, its capacity is doubled. The buffer
/// never shrinks. Removing an item runs the array's [`Teardown`] on it exactly once.
///
/// # Examples
///
/// ```
/// use opaque_collections::OpaqueArray;
///
/// let mut array = OpaqueArray::builder().layout_of::<u64>().build().unwrap();
///
/// for i in 0..5_u64 {
///     // SAFETY: The array was built for u64.
///     unsafe { array.push_back(i * i) }.unwrap();
/// }
///
/// array.remove_at(2).unwrap();
///
/// // SAFETY: The array was built for u64.
/// assert_eq!(unsafe { array.as_slice::<u64>() }, &[0, 1, 9, 16]);
/// ```
///
/// Working purely with layouts and pointers:
///
/// ```
/// use std::alloc::Layout;
///
/// use opaque_collections::OpaqueArray;
///
/// let mut array = OpaqueArray::builder()
///     .layout(Layout::new::<[u8; 4]>())
///     .build()
///     .unwrap();
///
/// // SAFETY: [u8; 4] matches the layout and the closure initializes the whole item.
/// unsafe {
///     array.push_back_with::<[u8; 4]>(|slot| {
///         slot.write(*b"abcd");
///     })
/// }
/// .unwrap();
///
/// let item = array.item_ptr(0).unwrap();
///
/// // SAFETY: The pointer refers to an initialized [u8; 4].
/// assert_eq!(unsafe { item.cast::<[u8; 4]>().read() }, *b"abcd");
/// ```
///
/// # Thread safety
///
/// The array is neither [`Send`] nor [`Sync`]: it holds items of unknown type.
#[derive(Debug)]
pub struct OpaqueArray {
    /// Start of the buffer. Items `[0, length)` are initialized, `[length, capacity)` are not.
    items: NonNull<u8>,

    /// Layout the buffer was allocated with. Kept so that we can free it without redoing
    /// (fallible) layout arithmetic in `drop()`.
    buffer_layout: Layout,

    capacity: usize,
    length: usize,

    item_layout: Layout,

    /// Distance in bytes between the start of two neighboring items.
    stride: usize,

    teardown: Teardown,
    drop_policy: DropPolicy,
}

impl OpaqueArray {
    /// The capacity of a newly built array unless the builder specifies one.
    pub const DEFAULT_INITIAL_CAPACITY: NonZero<usize> = nz!(15);

    /// Creates a builder for configuring and constructing an [`OpaqueArray`].
    ///
    /// # Examples
    ///
    /// ```
    /// use opaque_collections::OpaqueArray;
    ///
    /// let array = OpaqueArray::builder().layout_of::<u32>().build().unwrap();
    ///
    /// assert!(array.is_empty());
    /// assert_eq!(array.capacity(), OpaqueArray::DEFAULT_INITIAL_CAPACITY.get());
    /// ```
    #[inline]
    pub fn builder() -> OpaqueArrayBuilder {
        OpaqueArrayBuilder::new()
    }

    pub(crate) fn new_inner(
        item_layout: Layout,
        initial_capacity: NonZero<usize>,
        teardown: Teardown,
        drop_policy: DropPolicy,
    ) -> Result<Self> {
        let buffer_layout = array_layout(item_layout, initial_capacity.get())?;
        let items = memory::allocate(buffer_layout)?;

        debug!(
            item_size = item_layout.size(),
            item_align = item_layout.align(),
            capacity = initial_capacity.get(),
            "created OpaqueArray"
        );

        Ok(Self {
            items,
            buffer_layout,
            capacity: initial_capacity.get(),
            length: 0,
            item_layout,
            stride: item_layout.pad_to_align().size(),
            teardown,
            drop_policy,
        })
    }

    /// The memory layout of the items in the array.
    #[must_use]
    #[inline]
    pub fn item_layout(&self) -> Layout {
        self.item_layout
    }

    /// The number of items in the array.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.length
    }

    /// Whether the array has no items.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// The number of items the array can hold without growing its buffer.
    #[must_use]
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Ensures that the array can hold at least `additional` more items without growing.
    ///
    /// If the buffer has to grow, it grows to at least double its current capacity.
    ///
    /// # Errors
    ///
    /// Returns an error if the new buffer cannot be allocated. The array is left unchanged.
    #[cfg_attr(test, mutants::skip)] // Can be mutated to infinitely growing memory use.
    pub fn reserve(&mut self, additional: usize) -> Result<()> {
        let required = self
            .length
            .checked_add(additional)
            .ok_or(Error::CapacityOverflow)?;

        if required <= self.capacity {
            return Ok(());
        }

        let new_capacity =
            next_capacity(self.capacity).map_or(required, |doubled| doubled.max(required));

        self.grow_to(new_capacity)
    }

    fn grow_to(&mut self, new_capacity: usize) -> Result<()> {
        let new_layout = array_layout(self.item_layout, new_capacity)?;

        // SAFETY: The buffer was allocated with `buffer_layout`, which has the same alignment
        // as `new_layout` because both are derived from the item layout.
        self.items = unsafe { memory::reallocate(self.items, self.buffer_layout, new_layout) }?;

        trace!(
            old_capacity = self.capacity,
            new_capacity,
            "grew OpaqueArray"
        );

        self.buffer_layout = new_layout;
        self.capacity = new_capacity;

        Ok(())
    }

    /// Pointer to the slot at `index`, which may be one past the last initialized item.
    fn slot(&self, index: usize) -> NonNull<u8> {
        debug_assert!(index <= self.capacity);

        // Cannot overflow because the offset is inside a buffer whose layout was valid.
        let offset = index.wrapping_mul(self.stride);

        // SAFETY: The offset stays within (or one past the end of) our buffer.
        unsafe { self.items.add(offset) }
    }

    /// Appends an item to the end of the array and returns a pointer to it.
    ///
    /// The pointer remains valid until the array grows or the item is removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the array is full and its buffer cannot be grown. The array is
    /// left unchanged and `value` is dropped.
    ///
    /// # Safety
    ///
    /// The caller must ensure that the layout of `T` matches the item layout of the array
    /// and that `T` is the type the array's teardown expects.
    #[inline]
    pub unsafe fn push_back<T>(&mut self, value: T) -> Result<NonNull<T>> {
        // SAFETY: Forwarding safety requirements to the caller. The closure fully
        // initializes the slot.
        unsafe {
            self.push_back_with(|slot: &mut MaybeUninit<T>| {
                slot.write(value);
            })
        }
    }

    /// Appends an item to the end of the array, initializing it in place.
    ///
    /// This avoids constructing the item on the stack and then moving it into the array,
    /// which matters for large items.
    ///
    /// # Errors
    ///
    /// Returns an error if the array is full and its buffer cannot be grown. The array is
    /// left unchanged and `init` is not called.
    ///
    /// # Safety
    ///
    /// The caller must ensure that:
    ///
    /// 1. The layout of `T` matches the item layout of the array.
    /// 2. `init` fully initializes the item before returning.
    /// 3. `T` is the type the array's teardown expects. An array built with `layout_of::<U>()`
    ///    and no explicit teardown drops its items as `U`, so `T` must be `U`.
    pub unsafe fn push_back_with<T>(
        &mut self,
        init: impl FnOnce(&mut MaybeUninit<T>),
    ) -> Result<NonNull<T>> {
        debug_assert_eq!(
            Layout::new::<T>(),
            self.item_layout,
            "T layout does not match array's item layout"
        );

        // Shares the growth path with `reserve()`, which leaves the array unchanged on failure.
        self.reserve(1)?;

        let mut slot = self.slot(self.length).cast::<MaybeUninit<T>>();

        // SAFETY: The slot is inside our buffer, suitably aligned for T (caller guarantees the
        // layout matches) and not aliased by anything else.
        init(unsafe { slot.as_mut() });

        // Only counted once initialized, so a panicking `init` leaves no half-initialized item.
        // Cannot overflow because the buffer already has room for this item.
        self.length = self.length.wrapping_add(1);

        Ok(slot.cast::<T>())
    }

    /// Removes the last item, running the teardown on it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Empty`] if the array has no items.
    pub fn pop_back(&mut self) -> Result<()> {
        if self.length == 0 {
            return Err(Error::Empty);
        }

        self.length = self.length.wrapping_sub(1);

        // SAFETY: The slot held the last initialized item, which is no longer counted as live
        // and therefore will not be torn down again.
        unsafe {
            self.teardown.run(self.slot(self.length).cast());
        }

        Ok(())
    }

    /// Removes the first item, running the teardown on it and shifting the rest left by one.
    ///
    /// This is O(n) in the number of items.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Empty`] if the array has no items.
    pub fn pop_front(&mut self) -> Result<()> {
        if self.length == 0 {
            return Err(Error::Empty);
        }

        self.remove_at(0)
    }

    /// Moves the last item out of the array and returns it. The teardown is not run.
    ///
    /// Returns `None` if the array is empty.
    ///
    /// # Safety
    ///
    /// The caller must ensure that the items of the array are of type `T`.
    #[must_use]
    pub unsafe fn take_back<T>(&mut self) -> Option<T> {
        debug_assert_eq!(
            Layout::new::<T>(),
            self.item_layout,
            "T layout does not match array's item layout"
        );

        if self.length == 0 {
            return None;
        }

        self.length = self.length.wrapping_sub(1);

        // SAFETY: The slot held the last initialized item, which the caller guarantees to be
        // a T. It is no longer counted as live, so ownership moves to the caller.
        Some(unsafe { self.slot(self.length).cast::<T>().read() })
    }

    /// Removes the item at `index`, running the teardown on it and shifting all later items
    /// left by one.
    ///
    /// This is O(n) in the number of items after `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfBounds`] if `index >= len()`.
    pub fn remove_at(&mut self, index: usize) -> Result<()> {
        if index >= self.length {
            return Err(Error::IndexOutOfBounds {
                index,
                length: self.length,
            });
        }

        let original_length = self.length;

        // Items after `index` are hidden while the teardown runs. If it panics they leak
        // instead of being torn down twice.
        self.length = index;

        let removed = self.slot(index);

        // SAFETY: The slot holds an initialized item that is no longer counted as live.
        unsafe {
            self.teardown.run(removed.cast());
        }

        // Cannot underflow because index < original_length.
        let trailing = original_length.wrapping_sub(index).wrapping_sub(1);

        // SAFETY: Both ranges are inside our buffer. They may overlap, which `copy` allows.
        // The byte count cannot overflow because it covers items that already fit in the buffer.
        unsafe {
            ptr::copy(
                self.slot(index.wrapping_add(1)).as_ptr(),
                removed.as_ptr(),
                trailing.wrapping_mul(self.stride),
            );
        }

        self.length = original_length.wrapping_sub(1);

        Ok(())
    }

    /// Removes all items, running the teardown on each of them in index order.
    ///
    /// The capacity of the array is not changed.
    pub fn clear(&mut self) {
        let removed = self.length;

        if removed == 0 {
            return;
        }

        // If a teardown panics, the items not yet torn down leak instead of being torn down twice.
        self.length = 0;

        for index in 0..removed {
            // SAFETY: Every slot below the old length holds an initialized item that is no
            // longer counted as live.
            unsafe {
                self.teardown.run(self.slot(index).cast());
            }
        }

        trace!(removed, "cleared OpaqueArray");
    }

    /// Pointer to the item at `index`, or `None` if the index is out of bounds.
    #[must_use]
    #[inline]
    pub fn item_ptr(&self, index: usize) -> Option<NonNull<()>> {
        (index < self.length).then(|| self.slot(index).cast())
    }

    /// Shared reference to the item at `index`, or `None` if the index is out of bounds.
    ///
    /// # Safety
    ///
    /// The caller must ensure that the items of the array are of type `T`.
    #[must_use]
    #[inline]
    pub unsafe fn get<T>(&self, index: usize) -> Option<&T> {
        debug_assert_eq!(Layout::new::<T>(), self.item_layout);

        // SAFETY: The pointer refers to an initialized item, which the caller guarantees to be
        // a T. The reference borrows the array, so the item cannot be removed while it lives.
        self.item_ptr(index).map(|ptr| unsafe { ptr.cast::<T>().as_ref() })
    }

    /// Exclusive reference to the item at `index`, or `None` if the index is out of bounds.
    ///
    /// # Safety
    ///
    /// The caller must ensure that the items of the array are of type `T`.
    #[must_use]
    #[inline]
    pub unsafe fn get_mut<T>(&mut self, index: usize) -> Option<&mut T> {
        debug_assert_eq!(Layout::new::<T>(), self.item_layout);

        // SAFETY: As in `get()`, plus the exclusive borrow of the array guarantees that no
        // other reference to the item exists.
        self.item_ptr(index)
            .map(|ptr| unsafe { ptr.cast::<T>().as_mut() })
    }

    /// Shared reference to the first item, or `None` if the array is empty.
    ///
    /// # Safety
    ///
    /// The caller must ensure that the items of the array are of type `T`.
    #[must_use]
    #[inline]
    pub unsafe fn front<T>(&self) -> Option<&T> {
        // SAFETY: Forwarding safety requirements to the caller.
        unsafe { self.get(0) }
    }

    /// Shared reference to the last item, or `None` if the array is empty.
    ///
    /// # Safety
    ///
    /// The caller must ensure that the items of the array are of type `T`.
    #[must_use]
    #[inline]
    pub unsafe fn back<T>(&self) -> Option<&T> {
        let index = self.length.checked_sub(1)?;

        // SAFETY: Forwarding safety requirements to the caller.
        unsafe { self.get(index) }
    }

    /// The items of the array as a slice.
    ///
    /// # Safety
    ///
    /// The caller must ensure that the items of the array are of type `T`.
    #[must_use]
    pub unsafe fn as_slice<T>(&self) -> &[T] {
        debug_assert_eq!(Layout::new::<T>(), self.item_layout);

        // SAFETY: The first `length` items are initialized and, because the caller guarantees
        // the type, spaced exactly `size_of::<T>()` apart. The slice borrows the array.
        unsafe { slice::from_raw_parts(self.items.cast::<T>().as_ptr(), self.length) }
    }

    /// The items of the array as a mutable slice.
    ///
    /// # Safety
    ///
    /// The caller must ensure that the items of the array are of type `T`.
    #[must_use]
    pub unsafe fn as_mut_slice<T>(&mut self) -> &mut [T] {
        debug_assert_eq!(Layout::new::<T>(), self.item_layout);

        // SAFETY: As in `as_slice()`, plus the slice exclusively borrows the array.
        unsafe { slice::from_raw_parts_mut(self.items.cast::<T>().as_ptr(), self.length) }
    }

    /// Iterates over pointers to the items of the array, in index order.
    ///
    /// The iterator is double-ended, so `.rev()` walks the array from back to front.
    ///
    /// # Examples
    ///
    /// ```
    /// use opaque_collections::OpaqueArray;
    ///
    /// let mut array = OpaqueArray::builder().layout_of::<u16>().build().unwrap();
    ///
    /// for value in [3_u16, 5, 7] {
    ///     // SAFETY: The array was built for u16.
    ///     unsafe { array.push_back(value) }.unwrap();
    /// }
    ///
    /// let reversed: Vec<u16> = array
    ///     .item_ptrs()
    ///     .rev()
    ///     // SAFETY: Every item is an initialized u16.
    ///     .map(|ptr| unsafe { ptr.cast::<u16>().read() })
    ///     .collect();
    ///
    /// assert_eq!(reversed, [7, 5, 3]);
    /// ```
    #[inline]
    pub fn item_ptrs(&self) -> ItemPtrs<'_> {
        ItemPtrs {
            array: self,
            front: 0,
            back: self.length,
        }
    }
}

impl Drop for OpaqueArray {
    fn drop(&mut self) {
        let remaining = self.length;

        self.clear();

        // SAFETY: The buffer was allocated with `buffer_layout` and is not used after this.
        unsafe {
            memory::deallocate(self.items, self.buffer_layout);
        }

        self.drop_policy.enforce("OpaqueArray", remaining);
    }
}

/// The capacity to grow to when an array with `current` capacity is full.
fn next_capacity(current: usize) -> Result<usize> {
    if current == 0 {
        return Ok(1);
    }

    current.checked_mul(2).ok_or(Error::CapacityOverflow)
}

/// Iterator over pointers to the items of an [`OpaqueArray`].
///
/// Created by [`OpaqueArray::item_ptrs()`].
#[derive(Debug)]
pub struct ItemPtrs<'a> {
    array: &'a OpaqueArray,

    /// Index of the next item yielded from the front.
    front: usize,

    /// One past the index of the next item yielded from the back.
    back: usize,
}

impl Iterator for ItemPtrs<'_> {
    type Item = NonNull<()>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.front == self.back {
            return None;
        }

        let item = self.array.slot(self.front).cast();

        // Cannot overflow because front < back <= length.
        self.front = self.front.wrapping_add(1);

        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        // Cannot underflow because front <= back.
        let remaining = self.back.wrapping_sub(self.front);
        (remaining, Some(remaining))
    }
}

impl DoubleEndedIterator for ItemPtrs<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.front == self.back {
            return None;
        }

        // Cannot underflow because back > front >= 0.
        self.back = self.back.wrapping_sub(1);

        Some(self.array.slot(self.back).cast())
    }
}

impl ExactSizeIterator for ItemPtrs<'_> {}

impl FusedIterator for ItemPtrs<'_> {}
