#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

/// Error type shared by every fallible table operation.
pub mod error;

pub mod fnv;

/// The open-addressing table and its iterator.
pub mod hash_table;

#[cfg(feature = "capi")]
pub mod capi;

pub use error::TableError;
pub use hash_table::HashTable;
pub use hash_table::INITIAL_CAPACITY;
pub use hash_table::Iter;
