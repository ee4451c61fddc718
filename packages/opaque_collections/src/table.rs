use std::alloc::Layout;
use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::num::NonZero;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicU64, Ordering};

use new_zealand::nz;
use tracing::{debug, trace};

use crate::hash::{ErasedCompareFn, ErasedHashFn};
use crate::memory::{self, NodeLayout};
use crate::{DropPolicy, Error, OpaqueHashTableBuilder, Result, Teardown};

/// Global counter for generating unique table IDs.
static TABLE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generates a unique table ID.
fn generate_table_id() -> u64 {
    TABLE_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Header at the start of every entry allocation. The key and the value follow it in the same
/// allocation, at `OpaqueHashTable::key_offset` and `OpaqueHashTable::value_offset`.
#[derive(Clone, Copy, Debug)]
struct ChainLink {
    next: Option<NonNull<ChainLink>>,
}

type Bucket = Option<NonNull<ChainLink>>;

/// Everything the builder resolves before a table can be created.
#[derive(Debug)]
pub(crate) struct TableSettings {
    pub(crate) bucket_count: NonZero<usize>,
    pub(crate) key_layout: Layout,
    pub(crate) key_teardown: Teardown,
    pub(crate) value_layout: Layout,
    pub(crate) value_teardown: Teardown,
    pub(crate) hash_fn: ErasedHashFn,
    pub(crate) compare_fn: ErasedCompareFn,
    pub(crate) drop_policy: DropPolicy,
}

/// Where a key is, or would be, in the table.
#[derive(Clone, Copy, Debug)]
struct Location {
    bucket: usize,

    /// The entry before `found` in the bucket chain, or `None` if `found` is the chain head.
    previous: Option<NonNull<ChainLink>>,

    /// The entry holding an equal key, if there is one.
    found: Option<NonNull<ChainLink>>,
}

/// A type-erased hash table with a fixed number of buckets, resolving collisions by chaining.
///
/// Every entry is a single allocation holding the link to the next entry in its bucket chain,
/// followed by the key, followed by the value. The key and value layouts are fixed when the
/// table is built, as are the hash function, the compare function and the bucket count; the
/// table never rehashes.
///
/// Entries can be inserted in two ways:
///
/// * [`insert()`](Self::insert) moves a typed key and value into the table.
/// * [`create_entry()`](Self::create_entry) hands out an unlinked entry whose key and value are
///   initialized in place through raw pointers and then linked with
///   [`set_entry()`](Self::set_entry).
///
/// Replacing the value of an existing key runs the key and value teardowns on the old key and
/// value. Removing an entry runs both teardowns before the entry is freed.
///
/// # Examples
///
/// ```
/// use opaque_collections::OpaqueHashTable;
///
/// let mut table = OpaqueHashTable::builder()
///     .key_traits_of::<&'static str>()
///     .value_layout_of::<&'static str>()
///     .build()
///     .unwrap();
///
/// // SAFETY: Both keys and values are &'static str, matching the configuration.
/// unsafe {
///     table.insert("abc", "def").unwrap();
///     table.insert("ock", "dlcma").unwrap();
///     table.insert("d3q", "lcke").unwrap();
///
///     assert_eq!(table.get::<&str, &str>(&"abc"), Some(&"def"));
///
///     table.remove(&"ock").unwrap();
///     assert!(table.search(&"ock").is_none());
/// }
///
/// assert_eq!(table.len(), 2);
/// ```
///
/// # Thread safety
///
/// The table is neither [`Send`] nor [`Sync`]: it holds keys and values of unknown type.
#[derive(Debug)]
pub struct OpaqueHashTable {
    /// Uniquely identifies the table, so that entries created by other tables can be rejected.
    table_id: u64,

    /// Heads of the bucket chains. Allocated once, never resized.
    buckets: Vec<Bucket>,
    bucket_count: NonZero<usize>,

    length: usize,

    key_layout: Layout,
    value_layout: Layout,

    /// Layout of a whole entry: the link, the key and the value, padded to alignment.
    entry_layout: Layout,
    key_offset: usize,
    value_offset: usize,

    key_teardown: Teardown,
    value_teardown: Teardown,

    hash_fn: ErasedHashFn,
    compare_fn: ErasedCompareFn,

    drop_policy: DropPolicy,
}

impl OpaqueHashTable {
    /// The number of buckets of a newly built table unless the builder specifies one.
    pub const DEFAULT_BUCKET_COUNT: NonZero<usize> = nz!(256);

    /// Creates a builder for configuring and constructing an [`OpaqueHashTable`].
    #[inline]
    pub fn builder() -> OpaqueHashTableBuilder {
        OpaqueHashTableBuilder::new()
    }

    pub(crate) fn new_inner(settings: TableSettings) -> Result<Self> {
        let mut entry = NodeLayout::header::<ChainLink>();
        let key_offset = entry.append(settings.key_layout)?;
        let value_offset = entry.append(settings.value_layout)?;
        let entry_layout = entry.finish();

        let count = settings.bucket_count.get();

        let buckets_layout =
            Layout::array::<Bucket>(count).map_err(|_layout_error| Error::CapacityOverflow)?;

        let mut buckets = Vec::new();
        buckets
            .try_reserve_exact(count)
            .map_err(|_reserve_error| Error::AllocationFailed {
                layout: buckets_layout,
            })?;
        buckets.resize(count, None);

        let table_id = generate_table_id();

        debug!(
            table_id,
            bucket_count = count,
            key_size = settings.key_layout.size(),
            value_size = settings.value_layout.size(),
            entry_size = entry_layout.size(),
            "created OpaqueHashTable"
        );

        Ok(Self {
            table_id,
            buckets,
            bucket_count: settings.bucket_count,
            length: 0,
            key_layout: settings.key_layout,
            value_layout: settings.value_layout,
            entry_layout,
            key_offset,
            value_offset,
            key_teardown: settings.key_teardown,
            value_teardown: settings.value_teardown,
            hash_fn: settings.hash_fn,
            compare_fn: settings.compare_fn,
            drop_policy: settings.drop_policy,
        })
    }

    /// The memory layout of the keys.
    #[must_use]
    #[inline]
    pub fn key_layout(&self) -> Layout {
        self.key_layout
    }

    /// The memory layout of the values.
    #[must_use]
    #[inline]
    pub fn value_layout(&self) -> Layout {
        self.value_layout
    }

    /// The number of buckets, fixed when the table was built.
    #[must_use]
    #[inline]
    pub fn bucket_count(&self) -> usize {
        self.bucket_count.get()
    }

    /// The number of entries in the table.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.length
    }

    /// Whether the table has no entries.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    fn key_of(&self, entry: NonNull<ChainLink>) -> NonNull<()> {
        // SAFETY: The key region lies inside the entry allocation at `key_offset`.
        unsafe { entry.cast::<u8>().add(self.key_offset).cast() }
    }

    fn value_of(&self, entry: NonNull<ChainLink>) -> NonNull<()> {
        // SAFETY: The value region lies inside the entry allocation at `value_offset`.
        unsafe { entry.cast::<u8>().add(self.value_offset).cast() }
    }

    fn bucket_head(&self, bucket: usize) -> Bucket {
        #[expect(
            clippy::indexing_slicing,
            reason = "bucket indexes are always reduced modulo the bucket count"
        )]
        let head = self.buckets[bucket];

        head
    }

    fn set_bucket_head(&mut self, bucket: usize, head: Bucket) {
        #[expect(
            clippy::indexing_slicing,
            reason = "bucket indexes are always reduced modulo the bucket count"
        )]
        let slot = &mut self.buckets[bucket];

        *slot = head;
    }

    /// Finds the bucket of `key` and the entry holding an equal key, if any.
    ///
    /// # Safety
    ///
    /// The caller must ensure that `key` points to an initialized key of the table's key type.
    unsafe fn locate(&self, key: NonNull<()>) -> Location {
        let bucket = (self.hash_fn)(key) % self.bucket_count;

        let mut previous = None;
        let mut cursor = self.bucket_head(bucket);

        while let Some(entry) = cursor {
            if (self.compare_fn)(self.key_of(entry), key) {
                return Location {
                    bucket,
                    previous,
                    found: Some(entry),
                };
            }

            previous = Some(entry);

            // SAFETY: Every entry reachable from a bucket head is live.
            cursor = unsafe { entry.as_ref() }.next;
        }

        Location {
            bucket,
            previous,
            found: None,
        }
    }

    /// Links `entry` into its bucket chain right after `previous` (or at the head).
    ///
    /// # Safety
    ///
    /// The caller must ensure that `entry` is an unlinked entry of this table and that
    /// `previous`, if present, is a live entry in `bucket`.
    unsafe fn link_after(
        &mut self,
        bucket: usize,
        previous: Option<NonNull<ChainLink>>,
        entry: NonNull<ChainLink>,
    ) {
        // SAFETY: Forwarding guarantees from the caller.
        unsafe {
            match previous {
                Some(previous) => {
                    (*entry.as_ptr()).next = (*previous.as_ptr()).next;
                    (*previous.as_ptr()).next = Some(entry);
                }
                None => {
                    (*entry.as_ptr()).next = self.bucket_head(bucket);
                    self.set_bucket_head(bucket, Some(entry));
                }
            }
        }

        // Cannot overflow because that would mean the table is greater than virtual memory.
        self.length = self.length.wrapping_add(1);
    }

    /// Unlinks `entry`, which follows `previous` (or is the head) in its bucket chain.
    ///
    /// # Safety
    ///
    /// The caller must ensure that `entry` is a live entry in `bucket` and that `previous`
    /// is the entry directly before it, or `None` if `entry` is the head.
    unsafe fn unlink(
        &mut self,
        bucket: usize,
        previous: Option<NonNull<ChainLink>>,
        entry: NonNull<ChainLink>,
    ) {
        // SAFETY: Forwarding guarantees from the caller.
        let next = unsafe { entry.as_ref() }.next;

        match previous {
            // SAFETY: Forwarding guarantees from the caller.
            Some(previous) => unsafe { (*previous.as_ptr()).next = next },
            None => self.set_bucket_head(bucket, next),
        }

        // SAFETY: The entry is no longer reachable, so nothing else observes its link.
        unsafe {
            (*entry.as_ptr()).next = None;
        }

        // Cannot underflow because the entry was counted.
        self.length = self.length.wrapping_sub(1);
    }

    /// Runs the key and value teardowns on an unlinked entry and frees it.
    ///
    /// # Safety
    ///
    /// The caller must ensure that `entry` is an unlinked entry of this table whose key and
    /// value are initialized.
    unsafe fn release(&self, entry: NonNull<ChainLink>) {
        let entry_layout = self.entry_layout;

        // The entry is freed even if a teardown panics.
        let free_entry = scopeguard::guard(entry, move |entry| {
            // SAFETY: The entry was allocated with `entry_layout` and is no longer linked.
            unsafe {
                memory::deallocate(entry.cast(), entry_layout);
            }
        });

        // SAFETY: The key is initialized and, the entry being unlinked, never torn down again.
        unsafe {
            self.key_teardown.run(self.key_of(entry));
        }

        // SAFETY: As above, for the value.
        unsafe {
            self.value_teardown.run(self.value_of(entry));
        }

        drop(free_entry);
    }

    /// Allocates an unlinked entry whose key and value are to be initialized by the caller
    /// through [`DetachedEntry::key_ptr()`] and [`DetachedEntry::value_ptr()`] before the entry
    /// is passed to [`set_entry()`](Self::set_entry).
    ///
    /// Dropping the entry instead frees it without running any teardown.
    ///
    /// # Examples
    ///
    /// ```
    /// use opaque_collections::OpaqueHashTable;
    ///
    /// let mut table = OpaqueHashTable::builder()
    ///     .key_traits_of::<u32>()
    ///     .value_layout_of::<[u8; 64]>()
    ///     .build()
    ///     .unwrap();
    ///
    /// let entry = table.create_entry().unwrap();
    ///
    /// // SAFETY: The pointers are valid for writes of the configured key and value types.
    /// unsafe {
    ///     entry.key_ptr().cast::<u32>().write(7);
    ///     entry.value_ptr().cast::<[u8; 64]>().write([0xFF; 64]);
    /// }
    ///
    /// // SAFETY: The key and value were fully initialized above.
    /// let inserted = unsafe { table.set_entry(entry) };
    /// assert!(inserted);
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be allocated.
    pub fn create_entry(&self) -> Result<DetachedEntry> {
        let entry = memory::allocate(self.entry_layout)?.cast::<ChainLink>();

        // SAFETY: The allocation starts with room for the link and is suitably aligned.
        unsafe {
            entry.write(ChainLink { next: None });
        }

        Ok(DetachedEntry {
            table_id: self.table_id,
            entry,
            entry_layout: self.entry_layout,
            key: self.key_of(entry),
            value: self.value_of(entry),
        })
    }

    /// Links an entry created by [`create_entry()`](Self::create_entry) into the table.
    ///
    /// If the table has no entry with an equal key, the entry is linked at the head of its
    /// bucket chain and `true` is returned. Otherwise the existing key and value are torn down,
    /// replaced with the key and value of `entry` and `false` is returned. Either way, the
    /// table takes ownership of the key and value.
    ///
    /// # Panics
    ///
    /// Panics if the entry was created by a different table.
    ///
    /// # Safety
    ///
    /// The caller must ensure that both the key and the value of the entry have been fully
    /// initialized with values of the types the table was configured for.
    pub unsafe fn set_entry(&mut self, entry: DetachedEntry) -> bool {
        assert_eq!(
            entry.table_id, self.table_id,
            "attempted to set an entry created by a different table - this is never correct"
        );

        // SAFETY: The caller guarantees the key is initialized and of the key type.
        let location = unsafe { self.locate(entry.key) };

        // From here on the table owns the allocation.
        let entry = ManuallyDrop::new(entry);

        match location.found {
            None => {
                // SAFETY: The entry is unlinked and came from this table. Linking at the head
                // is the same as linking after no entry.
                unsafe {
                    self.link_after(location.bucket, None, entry.entry);
                }

                true
            }
            Some(existing) => {
                // SAFETY: `existing` is live in the located bucket, right after `previous`.
                // The caller guarantees the new key and value are initialized.
                unsafe {
                    self.replace(location, existing, entry.entry);
                }

                false
            }
        }
    }

    /// Tears down the key and value of `existing`, moves the key and value of `shell` over
    /// them and frees `shell`.
    ///
    /// # Safety
    ///
    /// The caller must ensure that `existing` is the live entry found at `location` and that
    /// `shell` is an unlinked entry of this table with an initialized key and value.
    unsafe fn replace(
        &mut self,
        location: Location,
        existing: NonNull<ChainLink>,
        shell: NonNull<ChainLink>,
    ) {
        // Unlinked while its old key and value are torn down. If a teardown panics, the entry
        // leaks instead of being torn down a second time later.
        // SAFETY: Forwarding guarantees from the caller.
        unsafe {
            self.unlink(location.bucket, location.previous, existing);
        }

        let entry_layout = self.entry_layout;

        let free_shell = scopeguard::guard(shell, move |shell| {
            // SAFETY: The shell was allocated with `entry_layout` and is not linked anywhere.
            unsafe {
                memory::deallocate(shell.cast(), entry_layout);
            }
        });

        // SAFETY: The old key and value are initialized and no longer reachable.
        unsafe {
            self.key_teardown.run(self.key_of(existing));
        }

        // SAFETY: See above.
        unsafe {
            self.value_teardown.run(self.value_of(existing));
        }

        // SAFETY: Both regions are inside distinct allocations and have the key layout.
        unsafe {
            ptr::copy_nonoverlapping(
                self.key_of(shell).cast::<u8>().as_ptr(),
                self.key_of(existing).cast::<u8>().as_ptr(),
                self.key_layout.size(),
            );
        }

        // SAFETY: Both regions are inside distinct allocations and have the value layout.
        unsafe {
            ptr::copy_nonoverlapping(
                self.value_of(shell).cast::<u8>().as_ptr(),
                self.value_of(existing).cast::<u8>().as_ptr(),
                self.value_layout.size(),
            );
        }

        // The key and value now live in `existing`; the shell is freed without teardown.
        drop(free_shell);

        // SAFETY: `existing` is unlinked and `previous` is still directly before its old spot.
        unsafe {
            self.link_after(location.bucket, location.previous, existing);
        }

        trace!(
            table_id = self.table_id,
            bucket = location.bucket,
            "replaced existing key in OpaqueHashTable"
        );
    }

    /// Moves a key and a value into the table.
    ///
    /// Returns `true` if the key was not in the table before. If it was, the old key and value
    /// are torn down and replaced, and `false` is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be allocated. The table is left unchanged and
    /// `key` and `value` are dropped.
    ///
    /// # Safety
    ///
    /// The caller must ensure that `K` and `V` are the key and value types the table was
    /// configured for.
    pub unsafe fn insert<K, V>(&mut self, key: K, value: V) -> Result<bool> {
        debug_assert_eq!(
            Layout::new::<K>(),
            self.key_layout,
            "K layout does not match table's key layout"
        );
        debug_assert_eq!(
            Layout::new::<V>(),
            self.value_layout,
            "V layout does not match table's value layout"
        );

        let entry = self.create_entry()?;

        // SAFETY: The pointers are valid for writes of K and V, which the caller guarantees to
        // be the configured types.
        unsafe {
            entry.key_ptr().cast::<K>().write(key);
        }

        // SAFETY: See above.
        unsafe {
            entry.value_ptr().cast::<V>().write(value);
        }

        // SAFETY: The key and value were just initialized.
        Ok(unsafe { self.set_entry(entry) })
    }

    /// Looks up the entry with a key equal to `key`.
    ///
    /// # Safety
    ///
    /// The caller must ensure that `K` is the key type the table was configured for.
    #[must_use]
    pub unsafe fn search<K>(&self, key: &K) -> Option<TableEntry<'_>> {
        debug_assert_eq!(
            Layout::new::<K>(),
            self.key_layout,
            "K layout does not match table's key layout"
        );

        // SAFETY: The caller guarantees that K is the key type.
        let location = unsafe { self.locate(NonNull::from(key).cast()) };

        location.found.map(|entry| self.entry_handle(entry))
    }

    /// Shared reference to the value stored under `key`, if any.
    ///
    /// # Safety
    ///
    /// The caller must ensure that `K` and `V` are the key and value types the table was
    /// configured for.
    #[must_use]
    pub unsafe fn get<K, V>(&self, key: &K) -> Option<&V> {
        // SAFETY: Forwarding guarantees from the caller.
        unsafe { self.search(key).map(|entry| entry.value::<V>()) }
    }

    /// Exclusive reference to the value stored under `key`, if any.
    ///
    /// # Safety
    ///
    /// The caller must ensure that `K` and `V` are the key and value types the table was
    /// configured for.
    #[must_use]
    pub unsafe fn get_mut<K, V>(&mut self, key: &K) -> Option<&mut V> {
        debug_assert_eq!(
            Layout::new::<V>(),
            self.value_layout,
            "V layout does not match table's value layout"
        );

        // SAFETY: The caller guarantees that K is the key type.
        let location = unsafe { self.locate(NonNull::from(key).cast()) };

        // SAFETY: The value is initialized and the caller guarantees it is a V. The exclusive
        // borrow of the table guarantees that no other reference to it exists.
        location
            .found
            .map(|entry| unsafe { self.value_of(entry).cast::<V>().as_mut() })
    }

    /// Whether the table has an entry with a key equal to `key`.
    ///
    /// # Safety
    ///
    /// The caller must ensure that `K` is the key type the table was configured for.
    #[must_use]
    pub unsafe fn contains_key<K>(&self, key: &K) -> bool {
        // SAFETY: Forwarding guarantees from the caller.
        unsafe { self.search(key) }.is_some()
    }

    /// Removes the entry with a key equal to `key`, running the key and value teardowns.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyNotFound`] if the table has no such entry.
    ///
    /// # Safety
    ///
    /// The caller must ensure that `K` is the key type the table was configured for.
    pub unsafe fn remove<K>(&mut self, key: &K) -> Result<()> {
        debug_assert_eq!(
            Layout::new::<K>(),
            self.key_layout,
            "K layout does not match table's key layout"
        );

        // SAFETY: The caller guarantees that K is the key type.
        let location = unsafe { self.locate(NonNull::from(key).cast()) };

        let entry = location.found.ok_or(Error::KeyNotFound)?;

        // SAFETY: The entry is live in the located bucket, right after `previous`.
        unsafe {
            self.unlink(location.bucket, location.previous, entry);
        }

        // SAFETY: The entry was just unlinked and its key and value are initialized.
        unsafe {
            self.release(entry);
        }

        Ok(())
    }

    /// Removes every entry, running the key and value teardowns on each.
    ///
    /// The buckets are kept.
    pub fn clear(&mut self) {
        let removed = self.length;

        for bucket in 0..self.bucket_count.get() {
            while let Some(head) = self.bucket_head(bucket) {
                // SAFETY: The head is live and has no predecessor.
                unsafe {
                    self.unlink(bucket, None, head);
                }

                // SAFETY: The entry was just unlinked and its key and value are initialized.
                unsafe {
                    self.release(head);
                }
            }
        }

        if removed > 0 {
            trace!(table_id = self.table_id, removed, "cleared OpaqueHashTable");
        }
    }

    /// Iterates over the entries of the table in bucket order.
    ///
    /// Within a bucket, the most recently linked key comes first. The order is otherwise
    /// unspecified but stable for a given sequence of operations.
    #[inline]
    pub fn entries(&self) -> Entries<'_> {
        Entries {
            table: self,
            next_bucket: 0,
            cursor: None,
            remaining: self.length,
        }
    }

    fn entry_handle(&self, entry: NonNull<ChainLink>) -> TableEntry<'_> {
        TableEntry {
            key: self.key_of(entry),
            value: self.value_of(entry),
            _table: PhantomData,
        }
    }

    /// Verifies that every entry is in the bucket its key hashes to and that the recorded
    /// length matches the number of reachable entries.
    #[cfg(test)]
    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    pub(crate) fn integrity_check(&self) {
        let mut count: usize = 0;

        for bucket in 0..self.bucket_count.get() {
            let mut cursor = self.bucket_head(bucket);

            while let Some(entry) = cursor {
                let hash = (self.hash_fn)(self.key_of(entry));
                assert_eq!(hash % self.bucket_count, bucket, "entry in wrong bucket");

                count = count.wrapping_add(1);

                // SAFETY: Every entry reachable from a bucket head is live.
                cursor = unsafe { entry.as_ref() }.next;
            }
        }

        assert_eq!(count, self.length, "length does not match reachable entries");
    }
}

impl Drop for OpaqueHashTable {
    fn drop(&mut self) {
        let remaining = self.length;

        self.clear();

        self.drop_policy.enforce("OpaqueHashTable", remaining);
    }
}

/// An entry allocated by [`OpaqueHashTable::create_entry()`] that is not yet part of the table.
///
/// Its key and value are uninitialized until the caller writes them through
/// [`key_ptr()`](Self::key_ptr) and [`value_ptr()`](Self::value_ptr). Dropping the entry frees
/// its memory without running any teardown, so anything written into it is leaked.
#[derive(Debug)]
pub struct DetachedEntry {
    table_id: u64,
    entry: NonNull<ChainLink>,
    entry_layout: Layout,
    key: NonNull<()>,
    value: NonNull<()>,
}

impl DetachedEntry {
    /// Pointer to the key region, valid for writes of the table's key layout.
    #[must_use]
    #[inline]
    pub fn key_ptr(&self) -> NonNull<()> {
        self.key
    }

    /// Pointer to the value region, valid for writes of the table's value layout.
    #[must_use]
    #[inline]
    pub fn value_ptr(&self) -> NonNull<()> {
        self.value
    }
}

impl Drop for DetachedEntry {
    fn drop(&mut self) {
        // SAFETY: The entry was allocated with `entry_layout` and, since it is being dropped
        // instead of being passed to `set_entry()`, was never linked into a table.
        unsafe {
            memory::deallocate(self.entry.cast(), self.entry_layout);
        }
    }
}

/// A shared view of an entry in an [`OpaqueHashTable`].
///
/// Returned by [`OpaqueHashTable::search()`] and yielded by [`OpaqueHashTable::entries()`].
/// Borrows the table, so the entry cannot be removed while the view exists.
#[derive(Clone, Copy, Debug)]
pub struct TableEntry<'a> {
    key: NonNull<()>,
    value: NonNull<()>,
    _table: PhantomData<&'a OpaqueHashTable>,
}

impl<'a> TableEntry<'a> {
    /// Pointer to the key of the entry.
    #[must_use]
    #[inline]
    pub fn key_ptr(&self) -> NonNull<()> {
        self.key
    }

    /// Pointer to the value of the entry.
    #[must_use]
    #[inline]
    pub fn value_ptr(&self) -> NonNull<()> {
        self.value
    }

    /// Shared reference to the key of the entry.
    ///
    /// # Safety
    ///
    /// The caller must ensure that `K` is the key type the table was configured for.
    #[must_use]
    #[inline]
    pub unsafe fn key<K>(&self) -> &'a K {
        // SAFETY: The key is initialized, the caller guarantees its type and the table stays
        // borrowed for 'a.
        unsafe { self.key.cast::<K>().as_ref() }
    }

    /// Shared reference to the value of the entry.
    ///
    /// # Safety
    ///
    /// The caller must ensure that `V` is the value type the table was configured for.
    #[must_use]
    #[inline]
    pub unsafe fn value<V>(&self) -> &'a V {
        // SAFETY: The value is initialized, the caller guarantees its type and the table stays
        // borrowed for 'a.
        unsafe { self.value.cast::<V>().as_ref() }
    }
}

/// Iterator over the entries of an [`OpaqueHashTable`], in bucket order.
///
/// Created by [`OpaqueHashTable::entries()`].
#[derive(Debug)]
pub struct Entries<'a> {
    table: &'a OpaqueHashTable,

    /// The bucket to continue with once the current chain is exhausted.
    next_bucket: usize,

    /// The next entry in the current chain.
    cursor: Option<NonNull<ChainLink>>,

    remaining: usize,
}

impl<'a> Iterator for Entries<'a> {
    type Item = TableEntry<'a>;

    #[cfg_attr(test, mutants::skip)] // Can be mutated to an infinite loop.
    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        while self.cursor.is_none() {
            // There are entries left, so we cannot run out of buckets before finding them.
            self.cursor = self.table.bucket_head(self.next_bucket);
            self.next_bucket = self.next_bucket.wrapping_add(1);
        }

        let entry = self.cursor?;

        // SAFETY: The table is borrowed, so every reachable entry is live.
        self.cursor = unsafe { entry.as_ref() }.next;
        self.remaining = self.remaining.wrapping_sub(1);

        Some(self.table.entry_handle(entry))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Entries<'_> {}

impl FusedIterator for Entries<'_> {}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    #![allow(
        clippy::indexing_slicing,
        clippy::arithmetic_side_effects,
        reason = "tests focus on succinct code and do not need to tick all the boxes"
    )]

    use std::collections::HashSet;
    use std::rc::Rc;

    use static_assertions::assert_not_impl_any;

    use super::*;
    use crate::polynomial_hash;

    assert_not_impl_any!(OpaqueHashTable: Send, Sync);
    assert_not_impl_any!(DetachedEntry: Send, Sync);
    assert_not_impl_any!(TableEntry<'static>: Send, Sync);

    fn hash_str(key: &&'static str) -> usize {
        polynomial_hash(key.as_bytes())
    }

    fn eq_str(a: &&'static str, b: &&'static str) -> bool {
        a == b
    }

    fn str_table(bucket_count: usize) -> OpaqueHashTable {
        OpaqueHashTable::builder()
            .key_layout_of::<&'static str>()
            .hash_fn(hash_str)
            .compare_fn(eq_str)
            .value_layout_of::<&'static str>()
            .bucket_count(bucket_count)
            .build()
            .unwrap()
    }

    fn constant_hash(_key: &u32) -> usize {
        7
    }

    /// Every key lands in the same bucket, so chain manipulation gets exercised.
    fn colliding_table() -> OpaqueHashTable {
        OpaqueHashTable::builder()
            .key_layout_of::<u32>()
            .hash_fn(constant_hash)
            .compare_fn(crate::hash::eq_of::<u32>)
            .value_layout_of::<u32>()
            .bucket_count(4)
            .build()
            .unwrap()
    }

    #[test]
    fn insert_search_remove_strings() {
        let mut table = str_table(256);

        // SAFETY: Keys and values are &'static str, as configured.
        unsafe {
            assert!(table.insert("abc", "def").unwrap());
            assert!(table.insert("ock", "dlcma").unwrap());
            assert!(table.insert("d3q", "lcke").unwrap());

            let found = table.search(&"abc").unwrap();
            assert_eq!(*found.value::<&str>(), "def");
            assert_eq!(*found.key::<&str>(), "abc");

            table.remove(&"ock").unwrap();
            assert!(table.search(&"ock").is_none());
        }

        assert_eq!(table.len(), 2);
        table.integrity_check();
    }

    #[test]
    fn inserting_same_key_twice_counts_once() {
        let mut table = str_table(16);

        // SAFETY: Keys and values are &'static str, as configured.
        unsafe {
            assert!(table.insert("key", "first").unwrap());
            assert!(!table.insert("key", "second").unwrap());

            assert_eq!(table.get::<&str, &str>(&"key"), Some(&"second"));
        }

        assert_eq!(table.len(), 1);
        table.integrity_check();
    }

    #[test]
    fn remove_absent_key_fails() {
        let mut table = str_table(16);

        // SAFETY: Keys and values are &'static str, as configured.
        unsafe {
            assert!(matches!(table.remove(&"nope"), Err(Error::KeyNotFound)));

            table.insert("yes", "1").unwrap();
            assert!(matches!(table.remove(&"nope"), Err(Error::KeyNotFound)));
        }

        assert_eq!(table.len(), 1);
    }

    #[test]
    fn chain_removal_from_head_middle_and_tail() {
        for victim in 0..3_u32 {
            let mut table = colliding_table();

            // SAFETY: Keys and values are u32, as configured.
            unsafe {
                for key in 0..3_u32 {
                    table.insert(key, key * 10).unwrap();
                }

                table.remove(&victim).unwrap();

                for key in 0..3_u32 {
                    let expected = (key != victim).then_some(key * 10);
                    assert_eq!(table.get::<u32, u32>(&key).copied(), expected);
                }
            }

            assert_eq!(table.len(), 2);
            table.integrity_check();
        }
    }

    #[test]
    fn only_entry_in_chain_can_be_removed() {
        let mut table = colliding_table();

        // SAFETY: Keys and values are u32, as configured.
        unsafe {
            table.insert(1_u32, 1_u32).unwrap();
            table.remove(&1_u32).unwrap();

            assert!(!table.contains_key(&1_u32));
        }

        assert!(table.is_empty());
        assert_eq!(table.entries().count(), 0);
        table.integrity_check();
    }

    #[test]
    fn replacing_in_a_chain_keeps_position_and_count() {
        let mut table = colliding_table();

        // SAFETY: Keys and values are u32, as configured.
        unsafe {
            for key in 0..4_u32 {
                table.insert(key, key).unwrap();
            }

            let before: Vec<u32> = table.entries().map(|entry| *entry.key::<u32>()).collect();

            assert!(!table.insert(2_u32, 200_u32).unwrap());

            let after: Vec<u32> = table.entries().map(|entry| *entry.key::<u32>()).collect();
            assert_eq!(before, after);

            assert_eq!(table.get::<u32, u32>(&2), Some(&200));
        }

        assert_eq!(table.len(), 4);
        table.integrity_check();
    }

    #[test]
    fn large_hashes_are_reduced_to_bucket_range() {
        fn huge_hash(key: &u32) -> usize {
            usize::MAX - usize::try_from(*key).unwrap()
        }

        let mut table = OpaqueHashTable::builder()
            .key_layout_of::<u32>()
            .hash_fn(huge_hash)
            .compare_fn(crate::hash::eq_of::<u32>)
            .value_layout_of::<u32>()
            .bucket_count(3)
            .build()
            .unwrap();

        // SAFETY: Keys and values are u32, as configured.
        unsafe {
            for key in 0..10_u32 {
                table.insert(key, key).unwrap();
            }

            assert_eq!(table.get::<u32, u32>(&9), Some(&9));
        }

        assert_eq!(table.len(), 10);
        table.integrity_check();
    }

    #[test]
    fn get_mut_modifies_value() {
        let mut table = colliding_table();

        // SAFETY: Keys and values are u32, as configured.
        unsafe {
            table.insert(5_u32, 50_u32).unwrap();

            *table.get_mut::<u32, u32>(&5).unwrap() += 1;
            assert!(table.get_mut::<u32, u32>(&6).is_none());

            assert_eq!(table.get::<u32, u32>(&5), Some(&51));
        }
    }

    #[test]
    fn set_entry_initialized_in_place() {
        let mut table = OpaqueHashTable::builder()
            .key_traits_of::<u64>()
            .value_layout(Layout::new::<[u32; 4]>())
            .build()
            .unwrap();

        let entry = table.create_entry().unwrap();

        // SAFETY: The pointers are valid for writes of the configured layouts.
        unsafe {
            entry.key_ptr().cast::<u64>().write(99);
            entry.value_ptr().cast::<[u32; 4]>().write([1, 2, 3, 4]);
        }

        let value_ptr = entry.value_ptr();

        // SAFETY: Key and value were initialized above.
        assert!(unsafe { table.set_entry(entry) });

        // SAFETY: Keys are u64, as configured.
        let found = unsafe { table.search(&99_u64) }.unwrap();

        // A new key is linked without moving it.
        assert_eq!(found.value_ptr(), value_ptr);

        // SAFETY: Values are [u32; 4], as configured.
        assert_eq!(unsafe { found.value::<[u32; 4]>() }, &[1, 2, 3, 4]);
    }

    #[test]
    fn unused_detached_entry_is_freed_without_teardown() {
        let tracker = Rc::new(());

        let table = OpaqueHashTable::builder()
            .key_traits_of::<u8>()
            .value_layout_of::<Rc<()>>()
            .build()
            .unwrap();

        let entry = table.create_entry().unwrap();

        let value = entry.value_ptr().cast::<Rc<()>>();

        // SAFETY: The value pointer is valid for writes of Rc<()>.
        unsafe {
            value.write(Rc::clone(&tracker));
        }

        // SAFETY: We initialized the value above. Reading it out leaves the shell holding a
        // bitwise copy, which dropping the shell must not touch.
        let recovered = unsafe { value.read() };

        drop(entry);
        assert_eq!(Rc::strong_count(&tracker), 2);

        drop(recovered);
        assert_eq!(Rc::strong_count(&tracker), 1);
    }

    #[test]
    #[should_panic]
    fn foreign_entry_panics() {
        let first = str_table(8);
        let mut second = str_table(8);

        let entry = first.create_entry().unwrap();

        // SAFETY: Initialized key and value; the entry belongs to another table, which must panic.
        unsafe {
            entry.key_ptr().cast::<&str>().write("k");
            entry.value_ptr().cast::<&str>().write("v");
            second.set_entry(entry);
        }
    }

    #[test]
    fn teardowns_run_on_replace_remove_clear_and_drop() {
        fn hash_id(key: &(u8, Rc<()>)) -> usize {
            usize::from(key.0)
        }

        fn eq_id(a: &(u8, Rc<()>), b: &(u8, Rc<()>)) -> bool {
            a.0 == b.0
        }

        let keys = Rc::new(());
        let values = Rc::new(());

        let key_of = |id: u8| (id, Rc::clone(&keys));

        let mut table = OpaqueHashTable::builder()
            .key_layout_of::<(u8, Rc<()>)>()
            .hash_fn(hash_id)
            .compare_fn(eq_id)
            .value_layout_of::<Rc<()>>()
            .bucket_count(2)
            .build()
            .unwrap();

        // SAFETY: Keys are (u8, Rc<()>) and values are Rc<()>, as configured.
        unsafe {
            for id in 0..4 {
                table.insert(key_of(id), Rc::clone(&values)).unwrap();
            }
            assert_eq!(Rc::strong_count(&keys), 5);
            assert_eq!(Rc::strong_count(&values), 5);

            // Replacement tears down the old key and value and keeps the new ones.
            table.insert(key_of(1), Rc::clone(&values)).unwrap();
            assert_eq!(Rc::strong_count(&keys), 5);
            assert_eq!(Rc::strong_count(&values), 5);

            table.remove(&key_of(2)).unwrap();
            assert_eq!(Rc::strong_count(&keys), 4);
            assert_eq!(Rc::strong_count(&values), 4);
        }

        table.clear();
        assert_eq!(Rc::strong_count(&keys), 1);
        assert_eq!(Rc::strong_count(&values), 1);
        assert!(table.is_empty());

        // SAFETY: As above.
        unsafe {
            table.insert(key_of(9), Rc::clone(&values)).unwrap();
        }
        drop(table);

        assert_eq!(Rc::strong_count(&keys), 1);
        assert_eq!(Rc::strong_count(&values), 1);
    }

    #[test]
    fn entries_visits_every_entry_once() {
        let mut table = OpaqueHashTable::builder()
            .key_traits_of::<u32>()
            .value_layout_of::<u32>()
            .bucket_count(8)
            .build()
            .unwrap();

        // SAFETY: Keys and values are u32, as configured.
        unsafe {
            for key in 0..50_u32 {
                table.insert(key, key + 1000).unwrap();
            }
        }

        let iter = table.entries();
        assert_eq!(iter.len(), 50);

        let seen: HashSet<(u32, u32)> = iter
            // SAFETY: Keys and values are u32, as configured.
            .map(|entry| unsafe { (*entry.key::<u32>(), *entry.value::<u32>()) })
            .collect();

        assert_eq!(seen.len(), 50);
        assert!(seen.iter().all(|&(key, value)| value == key + 1000));

        table.integrity_check();
    }

    #[test]
    #[should_panic]
    fn drop_with_items_panics_if_policy_must_not_drop() {
        let mut table = OpaqueHashTable::builder()
            .key_traits_of::<u32>()
            .value_layout_of::<u32>()
            .drop_policy(DropPolicy::MustNotDropItems)
            .build()
            .unwrap();

        // SAFETY: Keys and values are u32, as configured.
        unsafe { table.insert(1_u32, 1_u32) }.unwrap();

        drop(table);
    }

    #[test]
    fn drop_empty_does_not_panic_if_policy_must_not_drop() {
        let mut table = OpaqueHashTable::builder()
            .key_traits_of::<u32>()
            .value_layout_of::<u32>()
            .drop_policy(DropPolicy::MustNotDropItems)
            .build()
            .unwrap();

        // SAFETY: Keys and values are u32, as configured.
        unsafe {
            table.insert(1_u32, 1_u32).unwrap();
            table.remove(&1_u32).unwrap();
        }

        drop(table);
    }
}
