#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Type-erased collections that embed their items in collection-owned memory.
//!
//! This crate provides three independent containers. Each one is configured once with the
//! [`std::alloc::Layout`] of the items it stores and never learns their type:
//!
//! - [`OpaqueArray`]: a contiguous growable array with amortized O(1) append.
//! - [`OpaqueList`]: a doubly linked list where each node embeds its item, so pushing costs a
//!   single allocation and any node can be removed in O(1) through its [`ListNode`] handle.
//! - [`OpaqueHashTable`]: a chained hash table with a fixed bucket count, where each entry
//!   embeds its key and value after the chain link.
//!
//! # Key Features
//!
//! - **Layout-based type erasure**: containers store any type matching their layout, which is
//!   verified in debug builds whenever a typed method is called
//! - **In-place initialization**: the `*_with` methods and [`OpaqueHashTable::create_entry()`]
//!   hand out container-owned memory to initialize, avoiding a copy of large items
//! - **Teardown hooks**: every item released by a container goes through its [`Teardown`]
//!   exactly once; `layout_of::<T>()` picks ordinary drop semantics automatically
//! - **Checked errors**: failed operations return an [`Error`] and leave the container unchanged
//! - **Drop policies**: [`DropPolicy`] can forbid dropping a container that still holds items
//!
//! # Safety model
//!
//! The containers own all memory of their items, so the configuration and the untyped
//! operations are safe. Operations that read or write items as a concrete type are `unsafe`,
//! with the caller guaranteeing that the type matches what the container was configured for.
//! Handles into a list carry the ID of the list that created them and are rejected by any
//! other list.
//!
//! # Examples
//!
//! ```
//! use opaque_collections::{Direction, OpaqueList};
//!
//! let mut list = OpaqueList::builder().layout_of::<String>().build().unwrap();
//!
//! // SAFETY: The list was built for String and every handle used is live.
//! unsafe {
//!     list.push_back("keep".to_string()).unwrap();
//!     let doomed = list.push_back("drop".to_string()).unwrap();
//!     list.push_back("keep too".to_string()).unwrap();
//!
//!     // The removed String is dropped by the list.
//!     let next = list.remove_node(doomed, Direction::Forward).unwrap();
//!     assert_eq!(list.item::<String>(next), "keep too");
//!
//!     let items: Vec<&String> = list.iter::<String>().collect();
//!     assert_eq!(items, ["keep", "keep too"]);
//! }
//! ```
//!
//! Errors are reported instead of panicking:
//!
//! ```
//! use opaque_collections::{Error, OpaqueArray};
//!
//! let mut array = OpaqueArray::builder().layout_of::<u8>().build().unwrap();
//!
//! assert!(matches!(array.pop_back(), Err(Error::Empty)));
//! assert!(matches!(
//!     array.remove_at(3),
//!     Err(Error::IndexOutOfBounds { index: 3, length: 0 })
//! ));
//! ```

mod array;
mod array_builder;
mod drop_policy;
mod error;
mod hash;
mod item_spec;
mod list;
mod list_builder;
mod memory;
mod table;
mod table_builder;
mod teardown;

pub use array::{ItemPtrs, OpaqueArray};
pub use array_builder::OpaqueArrayBuilder;
pub use drop_policy::DropPolicy;
pub use error::{Error, Result};
pub use hash::polynomial_hash;
pub(crate) use item_spec::ItemSpec;
pub use list::{Direction, Iter, ListNode, Nodes, OpaqueList};
pub use list_builder::OpaqueListBuilder;
pub(crate) use table::TableSettings;
pub use table::{DetachedEntry, Entries, OpaqueHashTable, TableEntry};
pub use table_builder::OpaqueHashTableBuilder;
pub use teardown::Teardown;
