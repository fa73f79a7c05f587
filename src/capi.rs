//! C-compatible bindings.
//!
//! These functions expose a [`HashTable`] through raw pointers, keeping the
//! null-tolerant contract C callers expect: a null table, key, or value is
//! rejected instead of dereferenced, and destroying a null table does
//! nothing.
//!
//! Keys are NUL-terminated UTF-8 strings and are copied on insertion. Values
//! are opaque `void *` pointers that the table never dereferences or frees.
//!
//! ```c
//! ht *table = ht_create();
//! ht_set(table, "key", value);
//! void *found = ht_get(table, "key");
//!
//! hti it = ht_iterator(table);
//! while (ht_next(&it)) {
//!     printf("%s: %p\n", it.key, it.value);
//! }
//! ht_destroy(table);
//! ```
#![allow(non_camel_case_types)]

use alloc::boxed::Box;
use core::ffi::CStr;
use core::ffi::c_char;
use core::ffi::c_void;
use core::ptr::NonNull;

use log::warn;

use crate::error::TableError;
use crate::hash_table::HashTable;

/// Opaque table handle returned by [`ht_create`].
pub struct ht {
    table: HashTable<NonNull<c_void>>,
}

/// Cursor over a table, created by [`ht_iterator`] and advanced by
/// [`ht_next`].
///
/// `key` and `value` hold the entry most recently reached. The remaining
/// fields are private to the implementation.
#[repr(C)]
pub struct hti {
    /// Key of the current entry, owned by the table.
    pub key: *const c_char,
    /// Value of the current entry.
    pub value: *mut c_void,

    _table: *mut ht,
    _index: usize,
}

/// Converts a C key into a `&str`, rejecting null and non-UTF-8 input.
///
/// # Safety
///
/// `key` must be null or point to a NUL-terminated string that stays valid
/// for `'a`.
unsafe fn key_str<'a>(key: *const c_char) -> Result<&'a str, TableError> {
    if key.is_null() {
        return Err(TableError::invalid_argument("key"));
    }
    // SAFETY: `key` is non-null and the caller guarantees NUL termination.
    let key = unsafe { CStr::from_ptr(key) };
    key.to_str()
        .map_err(|_| TableError::invalid_argument("key is not valid UTF-8"))
}

/// Allocates a new, empty table. Returns null if allocation fails.
#[unsafe(no_mangle)]
pub extern "C" fn ht_create() -> *mut ht {
    match HashTable::new() {
        Ok(table) => Box::into_raw(Box::new(ht { table })),
        Err(err) => {
            warn!("ht_create failed: {err}");
            core::ptr::null_mut()
        }
    }
}

/// Frees a table, including every key it copied. Values are left untouched.
/// Does nothing if `table` is null.
///
/// # Safety
///
/// `table` must be null or a pointer returned by [`ht_create`] that has not
/// already been destroyed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ht_destroy(table: *mut ht) {
    if table.is_null() {
        return;
    }
    // SAFETY: the caller guarantees `table` came from `ht_create` and is
    // destroyed exactly once.
    drop(unsafe { Box::from_raw(table) });
}

/// Returns the value stored for `key`, or null if it is absent or either
/// argument is null.
///
/// # Safety
///
/// `table` must be null or a live table from [`ht_create`]. `key` must be
/// null or a NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ht_get(table: *mut ht, key: *const c_char) -> *mut c_void {
    // SAFETY: upheld by the caller.
    let Some(table) = (unsafe { table.as_ref() }) else {
        return core::ptr::null_mut();
    };
    // SAFETY: upheld by the caller.
    let Ok(key) = (unsafe { key_str(key) }) else {
        return core::ptr::null_mut();
    };

    table
        .table
        .get(key)
        .map_or(core::ptr::null_mut(), NonNull::as_ptr)
}

/// # Safety
///
/// Same requirements as [`ht_set`].
unsafe fn try_set(
    table: *mut ht,
    key: *const c_char,
    value: *mut c_void,
) -> Result<*const c_char, TableError> {
    // SAFETY: upheld by the caller.
    let table = unsafe { table.as_mut() }.ok_or(TableError::invalid_argument("table"))?;
    // SAFETY: upheld by the caller.
    let key = unsafe { key_str(key) }?;
    let value = NonNull::new(value).ok_or(TableError::invalid_argument("value"))?;

    let owned = table.table.set(key, value)?;
    // Owned keys are stored with a trailing NUL.
    Ok(owned.as_ptr().cast())
}

/// Stores `value` for `key`, copying the key on first insertion.
///
/// Returns the table's own NUL-terminated copy of the key, or null if any
/// argument is null, the key is not UTF-8, or memory could not be
/// allocated. The returned pointer stays valid until the table is
/// destroyed.
///
/// Calling this while an [`hti`] cursor over the same table is in use leaves
/// that cursor in an unspecified position.
///
/// # Safety
///
/// `table` must be null or a live table from [`ht_create`]. `key` must be
/// null or a NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ht_set(
    table: *mut ht,
    key: *const c_char,
    value: *mut c_void,
) -> *const c_char {
    // SAFETY: upheld by the caller.
    match unsafe { try_set(table, key, value) } {
        Ok(owned) => owned,
        Err(err) => {
            warn!("ht_set failed: {err}");
            core::ptr::null()
        }
    }
}

/// Returns the number of keys in the table, or 0 if `table` is null.
///
/// # Safety
///
/// `table` must be null or a live table from [`ht_create`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ht_length(table: *mut ht) -> usize {
    // SAFETY: upheld by the caller.
    unsafe { table.as_ref() }.map_or(0, |table| table.table.len())
}

/// Returns a cursor positioned before the first entry of `table`.
#[unsafe(no_mangle)]
pub extern "C" fn ht_iterator(table: *mut ht) -> hti {
    hti {
        key: core::ptr::null(),
        value: core::ptr::null_mut(),
        _table: table,
        _index: 0,
    }
}

/// Advances `it` to the next entry and returns `true`, or clears `key` and
/// `value` and returns `false` once every slot has been visited.
///
/// # Safety
///
/// `it` must be null or point to a cursor from [`ht_iterator`] whose table
/// is null or still live.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ht_next(it: *mut hti) -> bool {
    // SAFETY: upheld by the caller.
    let Some(it) = (unsafe { it.as_mut() }) else {
        return false;
    };
    // SAFETY: upheld by the caller.
    let Some(table) = (unsafe { it._table.as_ref() }) else {
        return false;
    };

    match table.table.next_occupied(it._index) {
        Some((index, key, value)) => {
            it._index = index + 1;
            it.key = key.as_ptr().cast();
            it.value = value.as_ptr();
            true
        }
        None => {
            it._index = it._index.max(table.table.capacity());
            it.key = core::ptr::null();
            it.value = core::ptr::null_mut();
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::ffi::CString;
    use alloc::format;
    use alloc::string::String;
    use alloc::vec;
    use alloc::vec::Vec;

    use super::*;

    fn value_ptr<T>(value: &mut T) -> *mut c_void {
        (value as *mut T).cast()
    }

    #[test]
    fn round_trip() {
        let (mut one, mut two) = (1i32, 2i32);
        let a = CString::new("a").unwrap();
        let b = CString::new("b").unwrap();

        unsafe {
            let table = ht_create();
            assert!(!table.is_null());

            let owned = ht_set(table, a.as_ptr(), value_ptr(&mut one));
            assert!(!owned.is_null());
            assert_ne!(owned, a.as_ptr());
            assert_eq!(CStr::from_ptr(owned), a.as_c_str());

            ht_set(table, b.as_ptr(), value_ptr(&mut two));
            assert_eq!(ht_get(table, a.as_ptr()), value_ptr(&mut one));
            assert_eq!(ht_get(table, b.as_ptr()), value_ptr(&mut two));
            assert_eq!(ht_length(table), 2);

            let missing = CString::new("missing").unwrap();
            assert!(ht_get(table, missing.as_ptr()).is_null());

            ht_destroy(table);
        }

        assert_eq!((one, two), (1, 2));
    }

    #[test]
    fn null_arguments_are_rejected() {
        let mut value = 1u8;
        let key = CString::new("key").unwrap();

        unsafe {
            let table = ht_create();

            assert!(ht_set(core::ptr::null_mut(), key.as_ptr(), value_ptr(&mut value)).is_null());
            assert!(ht_set(table, core::ptr::null(), value_ptr(&mut value)).is_null());
            assert!(ht_set(table, key.as_ptr(), core::ptr::null_mut()).is_null());
            assert_eq!(ht_length(table), 0);

            assert!(ht_get(core::ptr::null_mut(), key.as_ptr()).is_null());
            assert!(ht_get(table, core::ptr::null()).is_null());
            assert_eq!(ht_length(core::ptr::null_mut()), 0);

            ht_destroy(table);
            ht_destroy(core::ptr::null_mut());
        }
    }

    #[test]
    fn non_utf8_key_is_rejected() {
        let mut value = 1u8;
        let key = CString::new(vec![0xffu8, 0xfe]).unwrap();

        unsafe {
            let table = ht_create();
            assert!(ht_set(table, key.as_ptr(), value_ptr(&mut value)).is_null());
            assert_eq!(ht_length(table), 0);
            ht_destroy(table);
        }
    }

    #[test]
    fn try_set_reports_which_argument() {
        let mut value = 1u8;
        let key = CString::new("key").unwrap();

        unsafe {
            let table = ht_create();
            assert_eq!(
                try_set(table, key.as_ptr(), core::ptr::null_mut()),
                Err(TableError::invalid_argument("value"))
            );
            assert_eq!(
                try_set(core::ptr::null_mut(), key.as_ptr(), value_ptr(&mut value)),
                Err(TableError::invalid_argument("table"))
            );
            ht_destroy(table);
        }
    }

    #[test]
    fn iterate_empty() {
        unsafe {
            let table = ht_create();
            let mut it = ht_iterator(table);
            assert!(!ht_next(&mut it));
            assert!(it.key.is_null());
            assert!(it.value.is_null());
            ht_destroy(table);

            let mut detached = ht_iterator(core::ptr::null_mut());
            assert!(!ht_next(&mut detached));
            assert!(!ht_next(core::ptr::null_mut()));
        }
    }

    #[test]
    fn iterate_to_exhaustion() {
        let mut values = [10u32, 20, 30];
        let keys: Vec<CString> = ["a", "b", "c"]
            .iter()
            .map(|k| CString::new(*k).unwrap())
            .collect();

        unsafe {
            let table = ht_create();
            for (key, value) in keys.iter().zip(values.iter_mut()) {
                ht_set(table, key.as_ptr(), value_ptr(value));
            }

            let mut it = ht_iterator(table);
            let mut seen: Vec<(String, u32)> = Vec::new();
            while ht_next(&mut it) {
                let key = CStr::from_ptr(it.key).to_str().unwrap();
                seen.push((key.into(), *it.value.cast::<u32>()));
            }
            seen.sort();
            assert_eq!(
                seen,
                [("a".into(), 10), ("b".into(), 20), ("c".into(), 30)]
            );

            assert!(!ht_next(&mut it));
            assert!(!ht_next(&mut it));
            assert!(it.key.is_null());

            ht_destroy(table);
        }
    }

    #[test]
    fn growth_through_c_interface() {
        let mut values: Vec<usize> = (0..100).collect();
        let keys: Vec<CString> = (0..100)
            .map(|i| CString::new(format!("key{i}")).unwrap())
            .collect();

        unsafe {
            let table = ht_create();
            for (key, value) in keys.iter().zip(values.iter_mut()) {
                assert!(!ht_set(table, key.as_ptr(), value_ptr(value)).is_null());
            }
            assert_eq!(ht_length(table), 100);

            for (i, key) in keys.iter().enumerate() {
                assert_eq!(*ht_get(table, key.as_ptr()).cast::<usize>(), i);
            }
            ht_destroy(table);
        }
    }
}
