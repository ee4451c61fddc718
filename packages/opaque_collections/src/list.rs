use std::alloc::Layout;
use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};

use scopeguard::ScopeGuard;
use tracing::{debug, trace};

use crate::memory::{self, NodeLayout};
use crate::{DropPolicy, Error, OpaqueListBuilder, Result, Teardown};

/// Global counter for generating unique list IDs.
static LIST_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generates a unique list ID.
fn generate_list_id() -> u64 {
    LIST_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Header at the start of every node allocation. The item follows it in the same allocation,
/// at `OpaqueList::item_offset`.
#[derive(Clone, Copy, Debug)]
struct NodeLinks {
    previous: Option<NonNull<NodeLinks>>,
    next: Option<NonNull<NodeLinks>>,
}

/// Which neighbor of a removed node [`OpaqueList::remove_node()`] returns.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[expect(
    clippy::exhaustive_enums,
    reason = "a doubly linked list has exactly two directions"
)]
pub enum Direction {
    /// Toward the back of the list: the node that followed the removed one.
    Forward,

    /// Toward the front of the list: the node that preceded the removed one.
    Backward,
}

/// A handle to a node of an [`OpaqueList`].
///
/// The handle is a plain copyable pointer with the ID of the owning list attached. It stays
/// valid until the node is removed from the list; using it afterwards is undefined behavior,
/// which is why the operations accepting handles are `unsafe`. Passing a handle to a list
/// other than the one that created it panics.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ListNode {
    list_id: u64,
    links: NonNull<NodeLinks>,
    item: NonNull<()>,
}

impl ListNode {
    /// Pointer to the item embedded in the node.
    ///
    /// The pointer remains valid until the node is removed from the list.
    #[must_use]
    #[inline]
    pub fn item_ptr(&self) -> NonNull<()> {
        self.item
    }
}

/// A type-erased doubly linked list that embeds each item in its node.
///
/// Every node is a single allocation holding the links to its neighbors followed by the item,
/// so pushing costs one allocation and items never move once pushed. The layout of the items
/// is fixed when the list is built; typed operations are `unsafe`, with the caller guaranteeing
/// that the type used matches the layout (debug builds verify this).
///
/// Pushing returns a [`ListNode`] handle that can later be passed to
/// [`remove_node()`](Self::remove_node) to remove the node in O(1). Removing a node always runs
/// the list's [`Teardown`] on its item and frees the node; removed nodes are never reused.
///
/// # Examples
///
/// ```
/// use opaque_collections::OpaqueList;
///
/// let mut list = OpaqueList::builder().layout_of::<u32>().build().unwrap();
///
/// // SAFETY: The list was built for u32.
/// unsafe {
///     for i in 0..7_u32 {
///         list.push_back(i * i).unwrap();
///     }
///
///     // Remove all the odd squares.
///     list.remove_all_where(|item| item.cast::<u32>().read() % 2 == 1);
///
///     let even: Vec<u32> = list.iter::<u32>().copied().collect();
///     assert_eq!(even, [0, 4, 16, 36]);
/// }
/// ```
///
/// # Thread safety
///
/// The list is neither [`Send`] nor [`Sync`]: it holds items of unknown type.
#[derive(Debug)]
pub struct OpaqueList {
    /// Uniquely identifies the list, so that handles from other lists can be rejected.
    list_id: u64,

    head: Option<NonNull<NodeLinks>>,
    tail: Option<NonNull<NodeLinks>>,
    length: usize,

    item_layout: Layout,

    /// Layout of a whole node: the links followed by the item, padded to alignment.
    node_layout: Layout,

    /// Offset of the item from the start of the node.
    item_offset: usize,

    teardown: Teardown,
    drop_policy: DropPolicy,
}

impl OpaqueList {
    /// Creates a builder for configuring and constructing an [`OpaqueList`].
    #[inline]
    pub fn builder() -> OpaqueListBuilder {
        OpaqueListBuilder::new()
    }

    pub(crate) fn new_inner(
        item_layout: Layout,
        teardown: Teardown,
        drop_policy: DropPolicy,
    ) -> Result<Self> {
        let mut node = NodeLayout::header::<NodeLinks>();
        let item_offset = node.append(item_layout)?;
        let node_layout = node.finish();

        let list_id = generate_list_id();

        debug!(
            list_id,
            item_size = item_layout.size(),
            item_align = item_layout.align(),
            node_size = node_layout.size(),
            "created OpaqueList"
        );

        Ok(Self {
            list_id,
            head: None,
            tail: None,
            length: 0,
            item_layout,
            node_layout,
            item_offset,
            teardown,
            drop_policy,
        })
    }

    /// The memory layout of the items in the list.
    #[must_use]
    #[inline]
    pub fn item_layout(&self) -> Layout {
        self.item_layout
    }

    /// The number of nodes in the list.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.length
    }

    /// Whether the list has no nodes.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Appends an item at the back of the list.
    ///
    /// # Errors
    ///
    /// Returns an error if the node cannot be allocated. The list is left unchanged and
    /// `value` is dropped.
    ///
    /// # Safety
    ///
    /// The caller must ensure that the layout of `T` matches the item layout of the list
    /// and that `T` is the type the list's teardown expects.
    #[inline]
    pub unsafe fn push_back<T>(&mut self, value: T) -> Result<ListNode> {
        // SAFETY: Forwarding safety requirements to the caller. The closure fully
        // initializes the item.
        unsafe {
            self.push_back_with(|slot: &mut MaybeUninit<T>| {
                slot.write(value);
            })
        }
    }

    /// Prepends an item at the front of the list.
    ///
    /// # Errors
    ///
    /// Returns an error if the node cannot be allocated. The list is left unchanged and
    /// `value` is dropped.
    ///
    /// # Safety
    ///
    /// The caller must ensure that the layout of `T` matches the item layout of the list
    /// and that `T` is the type the list's teardown expects.
    #[inline]
    pub unsafe fn push_front<T>(&mut self, value: T) -> Result<ListNode> {
        // SAFETY: Forwarding safety requirements to the caller. The closure fully
        // initializes the item.
        unsafe {
            self.push_front_with(|slot: &mut MaybeUninit<T>| {
                slot.write(value);
            })
        }
    }

    /// Appends an item at the back of the list, initializing it in place inside the new node.
    ///
    /// If `init` panics, the node is freed and the list is left unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if the node cannot be allocated. The list is left unchanged and
    /// `init` is not called.
    ///
    /// # Safety
    ///
    /// The caller must ensure that:
    ///
    /// 1. The layout of `T` matches the item layout of the list.
    /// 2. `init` fully initializes the item before returning.
    /// 3. `T` is the type the list's teardown expects. A list built with `layout_of::<U>()`
    ///    and no explicit teardown drops its items as `U`, so `T` must be `U`.
    pub unsafe fn push_back_with<T>(
        &mut self,
        init: impl FnOnce(&mut MaybeUninit<T>),
    ) -> Result<ListNode> {
        // SAFETY: Forwarding safety requirements to the caller.
        let links = unsafe { self.allocate_node(init) }?;

        // SAFETY: The node was just allocated and initialized. Nothing else refers to it and
        // `tail`, if present, is a live node of this list.
        unsafe {
            (*links.as_ptr()).previous = self.tail;

            match self.tail {
                Some(tail) => (*tail.as_ptr()).next = Some(links),
                None => self.head = Some(links),
            }
        }

        self.tail = Some(links);

        // Cannot overflow because that would mean the list is greater than virtual memory.
        self.length = self.length.wrapping_add(1);

        Ok(self.handle(links))
    }

    /// Prepends an item at the front of the list, initializing it in place inside the new node.
    ///
    /// If `init` panics, the node is freed and the list is left unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if the node cannot be allocated. The list is left unchanged and
    /// `init` is not called.
    ///
    /// # Safety
    ///
    /// The caller must ensure that:
    ///
    /// 1. The layout of `T` matches the item layout of the list.
    /// 2. `init` fully initializes the item before returning.
    /// 3. `T` is the type the list's teardown expects. A list built with `layout_of::<U>()`
    ///    and no explicit teardown drops its items as `U`, so `T` must be `U`.
    pub unsafe fn push_front_with<T>(
        &mut self,
        init: impl FnOnce(&mut MaybeUninit<T>),
    ) -> Result<ListNode> {
        // SAFETY: Forwarding safety requirements to the caller.
        let links = unsafe { self.allocate_node(init) }?;

        // SAFETY: The node was just allocated and initialized. Nothing else refers to it and
        // `head`, if present, is a live node of this list.
        unsafe {
            (*links.as_ptr()).next = self.head;

            match self.head {
                Some(head) => (*head.as_ptr()).previous = Some(links),
                None => self.tail = Some(links),
            }
        }

        self.head = Some(links);

        // Cannot overflow because that would mean the list is greater than virtual memory.
        self.length = self.length.wrapping_add(1);

        Ok(self.handle(links))
    }

    /// Allocates an unlinked node and initializes its item.
    ///
    /// # Safety
    ///
    /// Same as for [`push_back_with()`](Self::push_back_with).
    unsafe fn allocate_node<T>(
        &self,
        init: impl FnOnce(&mut MaybeUninit<T>),
    ) -> Result<NonNull<NodeLinks>> {
        debug_assert_eq!(
            Layout::new::<T>(),
            self.item_layout,
            "T layout does not match list's item layout"
        );

        let node_layout = self.node_layout;
        let links = memory::allocate(node_layout)?.cast::<NodeLinks>();

        // SAFETY: The allocation starts with room for the links and is suitably aligned.
        unsafe {
            links.write(NodeLinks {
                previous: None,
                next: None,
            });
        }

        // If `init` panics, the node is freed before the panic leaves this function.
        let guard = scopeguard::guard(links, move |links| {
            // SAFETY: The node was allocated above with `node_layout` and is not linked anywhere.
            unsafe {
                memory::deallocate(links.cast(), node_layout);
            }
        });

        let mut item = self.item_of(links).cast::<MaybeUninit<T>>();

        // SAFETY: The item region is inside the node, aligned for T (the caller guarantees the
        // layout matches) and not aliased by anything else.
        init(unsafe { item.as_mut() });

        Ok(ScopeGuard::into_inner(guard))
    }

    fn item_of(&self, links: NonNull<NodeLinks>) -> NonNull<()> {
        // SAFETY: The item region lies inside the node allocation at `item_offset`.
        unsafe { links.cast::<u8>().add(self.item_offset).cast() }
    }

    fn handle(&self, links: NonNull<NodeLinks>) -> ListNode {
        ListNode {
            list_id: self.list_id,
            links,
            item: self.item_of(links),
        }
    }

    fn assert_owns(&self, node: ListNode) {
        assert_eq!(
            node.list_id, self.list_id,
            "attempted to use a node handle with a list that did not create it - this is never correct"
        );
    }

    /// Detaches a live node from its neighbors, keeping `head`, `tail` and `length` consistent.
    /// Returns the links the node had before it was detached.
    ///
    /// # Safety
    ///
    /// The caller must ensure that `links` is a live node of this list.
    unsafe fn unlink(&mut self, links: NonNull<NodeLinks>) -> NodeLinks {
        // SAFETY: The caller guarantees the node is live.
        let old = unsafe { *links.as_ptr() };

        // SAFETY: The neighbors of a live node are live nodes of the same list.
        unsafe {
            match old.previous {
                Some(previous) => (*previous.as_ptr()).next = old.next,
                None => self.head = old.next,
            }

            match old.next {
                Some(next) => (*next.as_ptr()).previous = old.previous,
                None => self.tail = old.previous,
            }
        }

        // Cannot underflow because the node was counted.
        self.length = self.length.wrapping_sub(1);

        old
    }

    /// Runs the teardown on the item of an unlinked node and frees the node.
    ///
    /// # Safety
    ///
    /// The caller must ensure that `links` is a node of this list that has been unlinked and
    /// whose item is still initialized.
    unsafe fn release(&self, links: NonNull<NodeLinks>) {
        let node_layout = self.node_layout;

        // The node is freed even if the teardown panics.
        let free_node = scopeguard::guard(links, move |links| {
            // SAFETY: The node was allocated with `node_layout` and is no longer linked.
            unsafe {
                memory::deallocate(links.cast(), node_layout);
            }
        });

        // SAFETY: The item is initialized and, being unlinked, will never be torn down again.
        unsafe {
            self.teardown.run(self.item_of(links));
        }

        drop(free_node);
    }

    /// Removes a node from the list, running the teardown on its item.
    ///
    /// Returns the neighbor of the removed node in the given direction, which is where a
    /// traversal that removes nodes as it goes should continue from. Returns `None` if the
    /// removed node had no neighbor in that direction.
    ///
    /// # Examples
    ///
    /// ```
    /// use opaque_collections::{Direction, OpaqueList};
    ///
    /// let mut list = OpaqueList::builder().layout_of::<char>().build().unwrap();
    ///
    /// // SAFETY: The list was built for char and every handle used is live.
    /// unsafe {
    ///     list.push_back('a').unwrap();
    ///     let b = list.push_back('b').unwrap();
    ///     list.push_back('c').unwrap();
    ///
    ///     let next = list.remove_node(b, Direction::Forward).unwrap();
    ///     assert_eq!(*list.item::<char>(next), 'c');
    ///
    ///     let previous = list.remove_node(next, Direction::Backward).unwrap();
    ///     assert_eq!(*list.item::<char>(previous), 'a');
    /// }
    ///
    /// assert_eq!(list.len(), 1);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if the handle was created by a different list.
    ///
    /// # Safety
    ///
    /// The caller must ensure that the node has not already been removed.
    pub unsafe fn remove_node(&mut self, node: ListNode, direction: Direction) -> Option<ListNode> {
        self.assert_owns(node);

        // SAFETY: The caller guarantees the node is live and we verified it is ours.
        let old = unsafe { self.unlink(node.links) };

        // SAFETY: The node was just unlinked and its item is initialized.
        unsafe {
            self.release(node.links);
        }

        let continuation = match direction {
            Direction::Forward => old.next,
            Direction::Backward => old.previous,
        };

        continuation.map(|links| self.handle(links))
    }

    /// Removes the first node, running the teardown on its item.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Empty`] if the list has no nodes.
    pub fn pop_front(&mut self) -> Result<()> {
        let head = self.front().ok_or(Error::Empty)?;

        // SAFETY: The head of the list is live.
        unsafe {
            self.remove_node(head, Direction::Forward);
        }

        Ok(())
    }

    /// Removes the last node, running the teardown on its item.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Empty`] if the list has no nodes.
    pub fn pop_back(&mut self) -> Result<()> {
        let tail = self.back().ok_or(Error::Empty)?;

        // SAFETY: The tail of the list is live.
        unsafe {
            self.remove_node(tail, Direction::Backward);
        }

        Ok(())
    }

    /// Removes the first node and moves its item out to the caller. The teardown is not run.
    ///
    /// Returns `None` if the list is empty.
    ///
    /// # Safety
    ///
    /// The caller must ensure that the items of the list are of type `T`.
    #[must_use]
    pub unsafe fn take_front<T>(&mut self) -> Option<T> {
        let head = self.head?;

        // SAFETY: The head of the list is live. The caller guarantees the item type.
        Some(unsafe { self.take(head) })
    }

    /// Removes the last node and moves its item out to the caller. The teardown is not run.
    ///
    /// Returns `None` if the list is empty.
    ///
    /// # Safety
    ///
    /// The caller must ensure that the items of the list are of type `T`.
    #[must_use]
    pub unsafe fn take_back<T>(&mut self) -> Option<T> {
        let tail = self.tail?;

        // SAFETY: The tail of the list is live. The caller guarantees the item type.
        Some(unsafe { self.take(tail) })
    }

    /// # Safety
    ///
    /// The caller must ensure that `links` is a live node of this list holding a `T`.
    unsafe fn take<T>(&mut self, links: NonNull<NodeLinks>) -> T {
        debug_assert_eq!(
            Layout::new::<T>(),
            self.item_layout,
            "T layout does not match list's item layout"
        );

        // SAFETY: Forwarding guarantees from the caller.
        unsafe {
            self.unlink(links);
        }

        // SAFETY: The item is initialized and the caller guarantees it is a T. The node is no
        // longer linked, so ownership of the item moves to the caller.
        let value = unsafe { self.item_of(links).cast::<T>().read() };

        // SAFETY: The node was allocated with `node_layout` and is no longer linked.
        unsafe {
            memory::deallocate(links.cast(), self.node_layout);
        }

        value
    }

    /// Removes every node whose item satisfies `predicate`, in front-to-back order, running
    /// the teardown on each removed item. Returns the number of removed nodes.
    ///
    /// The predicate receives a pointer to each item, which is valid for reads for the
    /// duration of the call.
    pub fn remove_all_where(&mut self, mut predicate: impl FnMut(NonNull<()>) -> bool) -> usize {
        let mut removed: usize = 0;
        let mut cursor = self.front();

        while let Some(node) = cursor {
            cursor = if predicate(node.item_ptr()) {
                // Cannot overflow because we only count nodes that existed.
                removed = removed.wrapping_add(1);

                // SAFETY: The cursor always points to a live node of this list.
                unsafe { self.remove_node(node, Direction::Forward) }
            } else {
                // SAFETY: The cursor always points to a live node of this list.
                unsafe { self.next(node) }
            };
        }

        removed
    }

    /// Removes every node whose item equals `value`, running the teardown on each removed
    /// item. Returns the number of removed nodes.
    ///
    /// # Safety
    ///
    /// The caller must ensure that the items of the list are of type `T`.
    pub unsafe fn remove_all_matching<T: PartialEq>(&mut self, value: &T) -> usize {
        debug_assert_eq!(
            Layout::new::<T>(),
            self.item_layout,
            "T layout does not match list's item layout"
        );

        // SAFETY: The predicate receives pointers to initialized items, which the caller
        // guarantees to be of type T.
        self.remove_all_where(|item| unsafe { item.cast::<T>().as_ref() } == value)
    }

    /// Removes every node, front to back, running the teardown on each item.
    pub fn clear(&mut self) {
        let removed = self.length;

        while let Some(head) = self.head {
            // SAFETY: The head of the list is live.
            unsafe {
                self.unlink(head);
            }

            // SAFETY: The node was just unlinked and its item is initialized.
            unsafe {
                self.release(head);
            }
        }

        if removed > 0 {
            trace!(list_id = self.list_id, removed, "cleared OpaqueList");
        }
    }

    /// Handle to the first node, or `None` if the list is empty.
    #[must_use]
    #[inline]
    pub fn front(&self) -> Option<ListNode> {
        self.head.map(|links| self.handle(links))
    }

    /// Handle to the last node, or `None` if the list is empty.
    #[must_use]
    #[inline]
    pub fn back(&self) -> Option<ListNode> {
        self.tail.map(|links| self.handle(links))
    }

    /// Handle to the node after `node`, or `None` if `node` is the last one.
    ///
    /// # Panics
    ///
    /// Panics if the handle was created by a different list.
    ///
    /// # Safety
    ///
    /// The caller must ensure that the node has not been removed.
    #[must_use]
    pub unsafe fn next(&self, node: ListNode) -> Option<ListNode> {
        self.assert_owns(node);

        // SAFETY: The caller guarantees the node is live.
        let next = unsafe { node.links.as_ref() }.next;

        next.map(|links| self.handle(links))
    }

    /// Handle to the node before `node`, or `None` if `node` is the first one.
    ///
    /// # Panics
    ///
    /// Panics if the handle was created by a different list.
    ///
    /// # Safety
    ///
    /// The caller must ensure that the node has not been removed.
    #[must_use]
    pub unsafe fn previous(&self, node: ListNode) -> Option<ListNode> {
        self.assert_owns(node);

        // SAFETY: The caller guarantees the node is live.
        let previous = unsafe { node.links.as_ref() }.previous;

        previous.map(|links| self.handle(links))
    }

    /// Shared reference to the item of `node`.
    ///
    /// # Panics
    ///
    /// Panics if the handle was created by a different list.
    ///
    /// # Safety
    ///
    /// The caller must ensure that the node has not been removed and that its item is a `T`.
    #[must_use]
    pub unsafe fn item<T>(&self, node: ListNode) -> &T {
        self.assert_owns(node);
        debug_assert_eq!(Layout::new::<T>(), self.item_layout);

        // SAFETY: Forwarding guarantees from the caller. The reference borrows the list, so
        // the node cannot be removed while it lives.
        unsafe { node.item.cast::<T>().as_ref() }
    }

    /// Exclusive reference to the item of `node`.
    ///
    /// # Panics
    ///
    /// Panics if the handle was created by a different list.
    ///
    /// # Safety
    ///
    /// The caller must ensure that the node has not been removed and that its item is a `T`.
    #[must_use]
    pub unsafe fn item_mut<T>(&mut self, node: ListNode) -> &mut T {
        self.assert_owns(node);
        debug_assert_eq!(Layout::new::<T>(), self.item_layout);

        // SAFETY: As in `item()`, plus the exclusive borrow of the list guarantees that no
        // other reference to the item exists.
        unsafe { node.item.cast::<T>().as_mut() }
    }

    /// Iterates over handles to the nodes of the list, front to back.
    ///
    /// The iterator is double-ended, so `.rev()` walks the list from back to front.
    #[inline]
    pub fn nodes(&self) -> Nodes<'_> {
        Nodes {
            list: self,
            front: self.head,
            back: self.tail,
            remaining: self.length,
        }
    }

    /// Iterates over the items of the list, front to back.
    ///
    /// # Safety
    ///
    /// The caller must ensure that the items of the list are of type `T`.
    #[inline]
    pub unsafe fn iter<T>(&self) -> Iter<'_, T> {
        debug_assert_eq!(Layout::new::<T>(), self.item_layout);

        Iter {
            nodes: self.nodes(),
            _item: PhantomData,
        }
    }

    /// Walks the list in both directions and verifies that the links agree with each other
    /// and with the recorded length.
    #[cfg(test)]
    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    pub(crate) fn integrity_check(&self) {
        let mut count: usize = 0;
        let mut previous: Option<NonNull<NodeLinks>> = None;
        let mut cursor = self.head;

        while let Some(links) = cursor {
            // SAFETY: Every node reachable from the head is live.
            let node = unsafe { links.as_ref() };

            assert_eq!(node.previous, previous, "previous link mismatch");

            previous = Some(links);
            cursor = node.next;
            count = count.wrapping_add(1);
        }

        assert_eq!(self.tail, previous, "tail is not the last reachable node");
        assert_eq!(count, self.length, "length does not match reachable nodes");
        assert_eq!(self.head.is_none(), self.tail.is_none());
    }
}

impl Drop for OpaqueList {
    fn drop(&mut self) {
        let remaining = self.length;

        self.clear();

        self.drop_policy.enforce("OpaqueList", remaining);
    }
}

/// Iterator over handles to the nodes of an [`OpaqueList`].
///
/// Created by [`OpaqueList::nodes()`].
#[derive(Debug)]
pub struct Nodes<'a> {
    list: &'a OpaqueList,
    front: Option<NonNull<NodeLinks>>,
    back: Option<NonNull<NodeLinks>>,

    /// Guards against the two ends crossing over each other.
    remaining: usize,
}

impl Iterator for Nodes<'_> {
    type Item = ListNode;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let links = self.front?;

        // SAFETY: The list is borrowed, so every node between the two ends is live.
        self.front = unsafe { links.as_ref() }.next;
        self.remaining = self.remaining.wrapping_sub(1);

        Some(self.list.handle(links))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl DoubleEndedIterator for Nodes<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let links = self.back?;

        // SAFETY: The list is borrowed, so every node between the two ends is live.
        self.back = unsafe { links.as_ref() }.previous;
        self.remaining = self.remaining.wrapping_sub(1);

        Some(self.list.handle(links))
    }
}

impl ExactSizeIterator for Nodes<'_> {}

impl FusedIterator for Nodes<'_> {}

/// Iterator over the items of an [`OpaqueList`].
///
/// Created by [`OpaqueList::iter()`].
#[derive(Debug)]
pub struct Iter<'a, T> {
    nodes: Nodes<'a>,
    _item: PhantomData<&'a T>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.nodes.next()?;

        // SAFETY: The creator of the iterator guaranteed that the items are of type T and the
        // list stays borrowed for 'a.
        Some(unsafe { node.item.cast::<T>().as_ref() })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.nodes.size_hint()
    }
}

impl<T> DoubleEndedIterator for Iter<'_, T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        let node = self.nodes.next_back()?;

        // SAFETY: See `next()`.
        Some(unsafe { node.item.cast::<T>().as_ref() })
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}

impl<T> FusedIterator for Iter<'_, T> {}
