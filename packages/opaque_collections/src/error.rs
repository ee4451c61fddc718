use std::alloc::Layout;

use thiserror::Error;

/// Errors that can occur when creating or operating on an opaque collection.
///
/// A failed operation never leaves a collection in a partially modified state: whatever the
/// collection contained before the call is still there, unchanged.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The memory allocator could not provide a block of the requested layout.
    #[error("failed to allocate {} bytes with alignment {}", layout.size(), layout.align())]
    AllocationFailed {
        /// The layout of the allocation that was refused.
        layout: Layout,
    },

    /// The requested capacity does not fit in the address space.
    #[error("requested capacity exceeds the size of virtual memory")]
    CapacityOverflow,

    /// The collection could not be built because its configuration is incomplete or invalid.
    #[error("invalid collection configuration: {problem}")]
    InvalidConfiguration {
        /// A human-readable description of the problem.
        problem: String,
    },

    /// An index-based operation referred to a position past the end of the collection.
    #[error("index {index} is out of bounds for a collection of length {length}")]
    IndexOutOfBounds {
        /// The index that was requested.
        index: usize,

        /// The length of the collection at the time of the request.
        length: usize,
    },

    /// An operation that removes an item was called on an empty collection.
    #[error("the collection is empty")]
    Empty,

    /// The key passed to a removal operation is not present in the hash table.
    #[error("the key is not present in the hash table")]
    KeyNotFound,
}

/// A specialized `Result` type for opaque collection operations, returning the crate's
/// [`Error`] type as the error value.
pub type Result<T> = std::result::Result<T, Error>;
