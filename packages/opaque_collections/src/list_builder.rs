use std::alloc::Layout;
use std::cell::Cell;
use std::marker::PhantomData;

use crate::{DropPolicy, ItemSpec, OpaqueList, Result, Teardown};

/// Builder for creating an instance of [`OpaqueList`].
///
/// The item layout is mandatory and is set with either `.layout()` or `.layout_of::<T>()`.
///
/// # Examples
///
/// ```
/// use std::alloc::Layout;
///
/// use opaque_collections::{OpaqueList, Teardown};
///
/// let list = OpaqueList::builder()
///     .layout(Layout::new::<[u32; 8]>())
///     .teardown(Teardown::none())
///     .build()
///     .unwrap();
///
/// assert_eq!(list.item_layout(), Layout::new::<[u32; 8]>());
/// ```
///
/// # Thread safety
///
/// The builder is thread-mobile ([`Send`]) but not thread-safe ([`Sync`]).
#[derive(Debug)]
#[must_use]
pub struct OpaqueListBuilder {
    item: ItemSpec,
    drop_policy: DropPolicy,

    // Prevents Sync while allowing Send - builders are thread-mobile but not thread-safe
    _not_sync: PhantomData<Cell<()>>,
}

impl OpaqueListBuilder {
    #[inline]
    pub(crate) fn new() -> Self {
        Self {
            item: ItemSpec::default(),
            drop_policy: DropPolicy::default(),
            _not_sync: PhantomData,
        }
    }

    /// Sets the memory layout of the items stored in the list.
    ///
    /// Unless a teardown is set explicitly, items are released without any cleanup.
    #[inline]
    pub fn layout(mut self, layout: Layout) -> Self {
        self.item.set_layout(layout);
        self
    }

    /// Sets the memory layout of the items stored in the list based on a type.
    ///
    /// Unless a teardown is set explicitly, items are dropped as `T` when released.
    #[inline]
    pub fn layout_of<T>(mut self) -> Self {
        self.item.set_layout_of::<T>();
        self
    }

    /// Sets the [teardown][Teardown] run on every item the list releases.
    #[inline]
    pub fn teardown(mut self, teardown: Teardown) -> Self {
        self.item.set_teardown(teardown);
        self
    }

    /// Sets the [drop policy][DropPolicy] of the list.
    #[inline]
    pub fn drop_policy(mut self, policy: DropPolicy) -> Self {
        self.drop_policy = policy;
        self
    }

    /// Builds the list. No memory is allocated until the first item is pushed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`][crate::Error::InvalidConfiguration] if no layout
    /// was set or the layout is zero-sized.
    pub fn build(self) -> Result<OpaqueList> {
        let (item_layout, teardown) = self.item.resolve("item")?;

        OpaqueList::new_inner(item_layout, teardown, self.drop_policy)
    }
}
