use std::alloc::Layout;
use std::cell::Cell;
use std::hash::Hash;
use std::marker::PhantomData;
use std::num::NonZero;

use crate::hash::{self, ErasedCompareFn, ErasedHashFn};
use crate::{DropPolicy, Error, ItemSpec, OpaqueHashTable, Result, TableSettings, Teardown};

/// Builder for creating an instance of [`OpaqueHashTable`].
///
/// The key layout, the value layout, the hash function and the compare function are all
/// mandatory. For key types that implement [`Hash`] and [`Eq`],
/// [`key_traits_of()`](Self::key_traits_of) sets the key layout and both functions at once.
///
/// # Examples
///
/// With a key type that implements `Hash + Eq`:
///
/// ```
/// use opaque_collections::OpaqueHashTable;
///
/// let table = OpaqueHashTable::builder()
///     .key_traits_of::<u64>()
///     .value_layout_of::<String>()
///     .bucket_count(64)
///     .build()
///     .unwrap();
///
/// assert_eq!(table.bucket_count(), 64);
/// ```
///
/// With custom hashing and comparison:
///
/// ```
/// use opaque_collections::{OpaqueHashTable, polynomial_hash};
///
/// // Keys that compare equal must hash equal, so the hash ignores case too.
/// fn hash_name(name: &&'static str) -> usize {
///     polynomial_hash(name.to_ascii_lowercase().as_bytes())
/// }
///
/// fn same_name(a: &&'static str, b: &&'static str) -> bool {
///     a.eq_ignore_ascii_case(b)
/// }
///
/// let mut table = OpaqueHashTable::builder()
///     .key_layout_of::<&'static str>()
///     .hash_fn(hash_name)
///     .compare_fn(same_name)
///     .value_layout_of::<u32>()
///     .build()
///     .unwrap();
///
/// // SAFETY: The key and value types match the table configuration.
/// unsafe {
///     table.insert("alice", 1_u32).unwrap();
///     table.insert("ALICE", 2_u32).unwrap();
///
///     assert_eq!(table.len(), 1);
///     assert_eq!(table.get::<&str, u32>(&"Alice"), Some(&2));
/// }
/// ```
///
/// # Thread safety
///
/// The builder is thread-mobile ([`Send`]) but not thread-safe ([`Sync`]).
#[derive(Debug)]
#[must_use]
pub struct OpaqueHashTableBuilder {
    key: ItemSpec,
    value: ItemSpec,
    bucket_count: Option<NonZero<usize>>,

    /// The hash function together with the layout of the key type it was written for.
    hash_fn: Option<(ErasedHashFn, Layout)>,

    /// The compare function together with the layout of the key type it was written for.
    compare_fn: Option<(ErasedCompareFn, Layout)>,

    drop_policy: DropPolicy,

    // Prevents Sync while allowing Send - builders are thread-mobile but not thread-safe
    _not_sync: PhantomData<Cell<()>>,
}

impl OpaqueHashTableBuilder {
    #[inline]
    pub(crate) fn new() -> Self {
        Self {
            key: ItemSpec::default(),
            value: ItemSpec::default(),
            bucket_count: None,
            hash_fn: None,
            compare_fn: None,
            drop_policy: DropPolicy::default(),
            _not_sync: PhantomData,
        }
    }

    /// Sets the number of buckets. The bucket count never changes after the table is built.
    ///
    /// Zero selects the default bucket count.
    #[inline]
    pub fn bucket_count(mut self, count: usize) -> Self {
        self.bucket_count = NonZero::new(count);
        self
    }

    /// Sets the memory layout of the keys.
    ///
    /// Unless a key teardown is set explicitly, keys are released without any cleanup.
    #[inline]
    pub fn key_layout(mut self, layout: Layout) -> Self {
        self.key.set_layout(layout);
        self
    }

    /// Sets the memory layout of the keys based on a type.
    ///
    /// Unless a key teardown is set explicitly, keys are dropped as `K` when released.
    #[inline]
    pub fn key_layout_of<K>(mut self) -> Self {
        self.key.set_layout_of::<K>();
        self
    }

    /// Sets the [teardown][Teardown] run on every key the table releases.
    #[inline]
    pub fn key_teardown(mut self, teardown: Teardown) -> Self {
        self.key.set_teardown(teardown);
        self
    }

    /// Sets the memory layout of the values.
    ///
    /// Unless a value teardown is set explicitly, values are released without any cleanup.
    #[inline]
    pub fn value_layout(mut self, layout: Layout) -> Self {
        self.value.set_layout(layout);
        self
    }

    /// Sets the memory layout of the values based on a type.
    ///
    /// Unless a value teardown is set explicitly, values are dropped as `V` when released.
    #[inline]
    pub fn value_layout_of<V>(mut self) -> Self {
        self.value.set_layout_of::<V>();
        self
    }

    /// Sets the [teardown][Teardown] run on every value the table releases.
    #[inline]
    pub fn value_teardown(mut self, teardown: Teardown) -> Self {
        self.value.set_teardown(teardown);
        self
    }

    /// Sets the function that hashes keys.
    ///
    /// The result may be any `usize`; the table reduces it to a bucket index. Keys that the
    /// compare function considers equal must hash to the same value.
    ///
    /// The layout of `K` must match the key layout, which is verified by `build()`.
    #[inline]
    pub fn hash_fn<K>(mut self, hash_fn: fn(&K) -> usize) -> Self {
        self.hash_fn = Some((hash::erase_hash_fn(hash_fn), Layout::new::<K>()));
        self
    }

    /// Sets the function that decides whether two keys are equal.
    ///
    /// The layout of `K` must match the key layout, which is verified by `build()`.
    #[inline]
    pub fn compare_fn<K>(mut self, compare_fn: fn(&K, &K) -> bool) -> Self {
        self.compare_fn = Some((hash::erase_compare_fn(compare_fn), Layout::new::<K>()));
        self
    }

    /// Configures the table for keys of type `K` using the [`Hash`] and [`Eq`] implementations
    /// of `K`.
    ///
    /// This sets the key layout (with a drop-based key teardown) together with a hash function
    /// and a compare function. Hashing uses a fixed seed, so bucket placement is reproducible.
    #[inline]
    pub fn key_traits_of<K: Hash + Eq>(self) -> Self {
        self.key_layout_of::<K>()
            .hash_fn(hash::hash_of::<K>)
            .compare_fn(hash::eq_of::<K>)
    }

    /// Sets the [drop policy][DropPolicy] of the table.
    #[inline]
    pub fn drop_policy(mut self, policy: DropPolicy) -> Self {
        self.drop_policy = policy;
        self
    }

    /// Builds the table, allocating its buckets.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if a layout, the hash function or the compare
    /// function is missing, if a layout is zero-sized or if the key type of a function does
    /// not match the key layout. Returns an allocation error if the buckets cannot be allocated.
    pub fn build(self) -> Result<OpaqueHashTable> {
        let (key_layout, key_teardown) = self.key.resolve("key")?;
        let (value_layout, value_teardown) = self.value.resolve("value")?;

        let hash_fn = key_function(self.hash_fn, "hash", key_layout)?;
        let compare_fn = key_function(self.compare_fn, "compare", key_layout)?;

        OpaqueHashTable::new_inner(TableSettings {
            bucket_count: self
                .bucket_count
                .unwrap_or(OpaqueHashTable::DEFAULT_BUCKET_COUNT),
            key_layout,
            key_teardown,
            value_layout,
            value_teardown,
            hash_fn,
            compare_fn,
            drop_policy: self.drop_policy,
        })
    }
}

/// Checks that a key function was set and was written for keys of the configured layout.
fn key_function<F>(function: Option<(F, Layout)>, name: &str, key_layout: Layout) -> Result<F> {
    let Some((function, function_key_layout)) = function else {
        return Err(Error::InvalidConfiguration {
            problem: format!("{name} function must be set before building"),
        });
    };

    if function_key_layout != key_layout {
        return Err(Error::InvalidConfiguration {
            problem: format!(
                "{name} function expects keys of size {} and alignment {} but the key layout has size {} and alignment {}",
                function_key_layout.size(),
                function_key_layout.align(),
                key_layout.size(),
                key_layout.align()
            ),
        });
    }

    Ok(function)
}
