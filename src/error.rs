use core::alloc::Layout;

use thiserror::Error;

/// Errors reported by fallible [`HashTable`](crate::HashTable) operations.
///
/// A failed operation leaves the table exactly as it was before the call.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableError {
    /// An argument was absent or unusable. Only the C interface can produce
    /// this, since the Rust API cannot express a null table, key, or value.
    #[error("invalid argument: {what}")]
    InvalidArgument {
        /// Which argument was rejected.
        what: &'static str,
    },

    /// Storage for the slot array or for a key copy could not be obtained.
    #[error("allocation of {} bytes failed", .layout.size())]
    AllocationFailure {
        /// The layout of the allocation that failed.
        layout: Layout,
    },

    /// The requested capacity does not fit in the address space.
    #[error("hash table capacity overflow")]
    CapacityOverflow,
}

impl TableError {
    pub(crate) fn invalid_argument(what: &'static str) -> Self {
        Self::InvalidArgument { what }
    }

    pub(crate) fn alloc_failure<T>(count: usize) -> Self {
        match Layout::array::<T>(count) {
            Ok(layout) => Self::AllocationFailure { layout },
            Err(_) => Self::CapacityOverflow,
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::string::ToString;

    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            TableError::invalid_argument("key").to_string(),
            "invalid argument: key"
        );
        assert_eq!(
            TableError::alloc_failure::<u64>(4).to_string(),
            "allocation of 32 bytes failed"
        );
        assert_eq!(
            TableError::CapacityOverflow.to_string(),
            "hash table capacity overflow"
        );
    }

    #[test]
    fn unrepresentable_layout_is_overflow() {
        assert_eq!(
            TableError::alloc_failure::<u64>(usize::MAX),
            TableError::CapacityOverflow
        );
    }
}
