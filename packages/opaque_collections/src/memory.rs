use std::alloc::{self, Layout};
use std::ptr::NonNull;

use crate::{Error, Result};

/// Layout calculation for a node made of a fixed header followed by one or more trailer regions,
/// all living in the same allocation.
///
/// Regions are appended in order, each at the first offset that satisfies its alignment.
/// [`finish()`](Self::finish) pads the result to its alignment so the node can be allocated
/// and deallocated with it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct NodeLayout {
    layout: Layout,
}

impl NodeLayout {
    /// Starts a node layout with a header of type `H`.
    #[must_use]
    pub(crate) fn header<H>() -> Self {
        Self {
            layout: Layout::new::<H>(),
        }
    }

    /// Appends a trailer region and returns its byte offset from the start of the node.
    pub(crate) fn append(&mut self, region: Layout) -> Result<usize> {
        let Ok((combined, offset)) = self.layout.extend(region) else {
            return Err(Error::CapacityOverflow);
        };

        self.layout = combined;
        Ok(offset)
    }

    /// Returns the final layout of the node, padded to its own alignment.
    #[must_use]
    pub(crate) fn finish(self) -> Layout {
        self.layout.pad_to_align()
    }
}

/// Layout of a contiguous buffer holding `count` items of `item_layout`, with each item padded
/// to the alignment of the item layout.
pub(crate) fn array_layout(item_layout: Layout, count: usize) -> Result<Layout> {
    let stride = item_layout.pad_to_align();

    let size = stride
        .size()
        .checked_mul(count)
        .ok_or(Error::CapacityOverflow)?;

    Layout::from_size_align(size, stride.align()).map_err(|_layout_error| Error::CapacityOverflow)
}

/// Allocates a block of memory with the given layout.
///
/// # Panics
///
/// Panics if the layout is zero-sized.
pub(crate) fn allocate(layout: Layout) -> Result<NonNull<u8>> {
    assert!(
        layout.size() > 0,
        "zero-sized allocations are never requested by the collections"
    );

    // SAFETY: The layout has a non-zero size, as asserted above.
    let ptr = unsafe { alloc::alloc(layout) };

    NonNull::new(ptr).ok_or(Error::AllocationFailed { layout })
}

/// Resizes a block previously obtained from [`allocate()`] or [`reallocate()`].
///
/// On failure, the original block is left untouched and remains owned by the caller.
///
/// # Safety
///
/// The caller must ensure that `ptr` was allocated with `old_layout` and has not been freed,
/// and that `new_layout` has the same alignment as `old_layout` and a non-zero size.
pub(crate) unsafe fn reallocate(
    ptr: NonNull<u8>,
    old_layout: Layout,
    new_layout: Layout,
) -> Result<NonNull<u8>> {
    debug_assert_eq!(old_layout.align(), new_layout.align());
    debug_assert!(new_layout.size() > 0);

    // SAFETY: Forwarding guarantees from the caller. The new size does not overflow isize
    // when rounded up to the alignment because it comes from a valid `Layout`.
    let new_ptr = unsafe { alloc::realloc(ptr.as_ptr(), old_layout, new_layout.size()) };

    NonNull::new(new_ptr).ok_or(Error::AllocationFailed { layout: new_layout })
}

/// Frees a block previously obtained from [`allocate()`] or [`reallocate()`].
///
/// # Safety
///
/// The caller must ensure that `ptr` was allocated with `layout` and has not been freed.
pub(crate) unsafe fn deallocate(ptr: NonNull<u8>, layout: Layout) {
    // SAFETY: Forwarding guarantees from the caller.
    unsafe {
        alloc::dealloc(ptr.as_ptr(), layout);
    }
}
