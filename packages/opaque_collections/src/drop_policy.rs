use std::thread;

/// Determines what a collection does with its remaining items when the collection is dropped.
///
/// By default, a collection runs the teardown hook on every remaining item and frees it.
///
/// # Examples
///
/// ```
/// use opaque_collections::{DropPolicy, OpaqueList};
///
/// // The drop policy is fixed when the list is built.
/// let list = OpaqueList::builder()
///     .layout_of::<u32>()
///     .drop_policy(DropPolicy::MustNotDropItems)
///     .build()
///     .unwrap();
///
/// assert!(list.is_empty());
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum DropPolicy {
    /// Remaining items are torn down and freed together with the collection. This is the default.
    #[default]
    MayDropItems,

    /// The collection panics if it still holds items when it is dropped.
    ///
    /// Useful when items own resources that must be released through an explicit path
    /// (for example, handed back to some external owner) before the collection goes away.
    /// The items are still torn down and freed before the panic is raised.
    MustNotDropItems,
}

impl DropPolicy {
    /// Panics if this policy forbids dropping a collection that still held `remaining` items.
    ///
    /// Does nothing while the thread is already panicking, so the original panic is not
    /// obscured by a second one.
    pub(crate) fn enforce(self, collection: &str, remaining: usize) {
        if thread::panicking() || remaining == 0 {
            return;
        }

        assert!(
            !matches!(self, Self::MustNotDropItems),
            "dropped a non-empty {collection} with {remaining} items - this is forbidden by DropPolicy::MustNotDropItems"
        );
    }
}
