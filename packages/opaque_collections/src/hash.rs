//! Hashing support for [`OpaqueHashTable`][crate::OpaqueHashTable].

use std::hash::{BuildHasher, Hash};
use std::mem;
use std::ptr::NonNull;

use foldhash::fast::FixedState;

/// Type-erased key hash function, as stored by the hash table.
pub(crate) type ErasedHashFn = fn(NonNull<()>) -> usize;

/// Type-erased key equality function, as stored by the hash table.
pub(crate) type ErasedCompareFn = fn(NonNull<()>, NonNull<()>) -> bool;

/// Seed for the default hash function. Fixed, so that bucket placement is reproducible
/// between runs, which keeps bucket-order iteration stable for a given insertion sequence.
const DEFAULT_HASH_SEED: u64 = 0x9E37_79B9_7F4A_7C15;

/// Polynomial rolling hash over a byte sequence: `hash = hash * 31 + byte` for every byte,
/// with wrapping arithmetic.
///
/// This is the classic string hash found in many C textbooks. It is cheap and adequate for
/// short textual keys; the hash table reduces the result to its bucket count.
///
/// # Examples
///
/// ```
/// use opaque_collections::polynomial_hash;
///
/// assert_eq!(polynomial_hash(b""), 0);
/// assert_eq!(polynomial_hash(b"a"), 97);
/// assert_eq!(polynomial_hash(b"ab"), 97 * 31 + 98);
/// ```
#[must_use]
#[inline]
pub fn polynomial_hash(bytes: &[u8]) -> usize {
    bytes.iter().fold(0_usize, |hash, &byte| {
        hash.wrapping_mul(31).wrapping_add(usize::from(byte))
    })
}

pub(crate) fn erase_hash_fn<K>(hash_fn: fn(&K) -> usize) -> ErasedHashFn {
    // SAFETY: For sized K, `&K` and `NonNull<()>` are ABI-compatible thin pointers. The table
    // only calls the erased function with pointers to live keys of type K.
    unsafe { mem::transmute::<fn(&K) -> usize, ErasedHashFn>(hash_fn) }
}

pub(crate) fn erase_compare_fn<K>(compare_fn: fn(&K, &K) -> bool) -> ErasedCompareFn {
    // SAFETY: For sized K, `&K` and `NonNull<()>` are ABI-compatible thin pointers. The table
    // only calls the erased function with pointers to live keys of type K.
    unsafe { mem::transmute::<fn(&K, &K) -> bool, ErasedCompareFn>(compare_fn) }
}

/// Default hash function for keys that implement [`Hash`].
pub(crate) fn hash_of<K: Hash>(key: &K) -> usize {
    #[expect(
        clippy::cast_possible_truncation,
        reason = "bucket selection only needs the low bits of the hash"
    )]
    let hash = FixedState::with_seed(DEFAULT_HASH_SEED).hash_one(key) as usize;

    hash
}

/// Default compare function for keys that implement [`Eq`].
pub(crate) fn eq_of<K: Eq>(left: &K, right: &K) -> bool {
    left == right
}
