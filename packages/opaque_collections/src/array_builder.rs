use std::alloc::Layout;
use std::cell::Cell;
use std::marker::PhantomData;
use std::num::NonZero;

use crate::{DropPolicy, ItemSpec, OpaqueArray, Result, Teardown};

/// Builder for creating an instance of [`OpaqueArray`].
///
/// The item layout is mandatory and is set with either `.layout()` or `.layout_of::<T>()`.
/// All other settings are optional.
///
/// # Examples
///
/// ```
/// use opaque_collections::OpaqueArray;
///
/// let array = OpaqueArray::builder()
///     .layout_of::<u64>()
///     .initial_capacity(64)
///     .build()
///     .unwrap();
///
/// assert_eq!(array.capacity(), 64);
/// ```
///
/// # Thread safety
///
/// The builder is thread-mobile ([`Send`]) but not thread-safe ([`Sync`]).
#[derive(Debug)]
#[must_use]
pub struct OpaqueArrayBuilder {
    item: ItemSpec,
    initial_capacity: Option<NonZero<usize>>,
    drop_policy: DropPolicy,

    // Prevents Sync while allowing Send - builders are thread-mobile but not thread-safe
    _not_sync: PhantomData<Cell<()>>,
}

impl OpaqueArrayBuilder {
    #[inline]
    pub(crate) fn new() -> Self {
        Self {
            item: ItemSpec::default(),
            initial_capacity: None,
            drop_policy: DropPolicy::default(),
            _not_sync: PhantomData,
        }
    }

    /// Sets the memory layout of the items stored in the array.
    ///
    /// Unless a teardown is set explicitly, items are released without any cleanup.
    #[inline]
    pub fn layout(mut self, layout: Layout) -> Self {
        self.item.set_layout(layout);
        self
    }

    /// Sets the memory layout of the items stored in the array based on a type.
    ///
    /// Unless a teardown is set explicitly, items are dropped as `T` when released.
    #[inline]
    pub fn layout_of<T>(mut self) -> Self {
        self.item.set_layout_of::<T>();
        self
    }

    /// Sets the number of items the array can hold before it first needs to grow.
    ///
    /// Zero selects the default initial capacity.
    #[inline]
    pub fn initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = NonZero::new(capacity);
        self
    }

    /// Sets the [teardown][Teardown] run on every item the array releases.
    #[inline]
    pub fn teardown(mut self, teardown: Teardown) -> Self {
        self.item.set_teardown(teardown);
        self
    }

    /// Sets the [drop policy][DropPolicy] of the array.
    #[inline]
    pub fn drop_policy(mut self, policy: DropPolicy) -> Self {
        self.drop_policy = policy;
        self
    }

    /// Builds the array, allocating its initial buffer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`][crate::Error::InvalidConfiguration] if no layout
    /// was set or the layout is zero-sized, and an allocation error if the initial buffer
    /// cannot be allocated.
    pub fn build(self) -> Result<OpaqueArray> {
        let (item_layout, teardown) = self.item.resolve("item")?;

        OpaqueArray::new_inner(
            item_layout,
            self.initial_capacity
                .unwrap_or(OpaqueArray::DEFAULT_INITIAL_CAPACITY),
            teardown,
            self.drop_policy,
        )
    }
}
