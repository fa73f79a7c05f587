use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::Debug;
use core::iter::FusedIterator;

use log::debug;
use log::trace;
use log::warn;

use crate::error::TableError;
use crate::fnv::hash_key;

/// Number of slots in a freshly created table.
pub const INITIAL_CAPACITY: usize = 16;

/// Largest population a table of `capacity` slots may hold before the next
/// insertion grows it. Keeps the load factor at or below one half.
#[inline(always)]
const fn max_load(capacity: usize) -> usize {
    capacity / 2
}

cfg_if::cfg_if! {
    if #[cfg(all(target_arch = "x86_64", target_feature = "sse2"))] {
        #[inline(always)]
        #[allow(unused_unsafe)]
        fn prefetch<T>(ptr: *const T) {
            // SAFETY: prefetching is a hint; it never dereferences `ptr` and
            // cannot fault, even for addresses outside the allocation.
            unsafe {
                use core::arch::x86_64::*;
                _mm_prefetch(ptr as *const i8, _MM_HINT_T0);
            }
        }
    } else {
        #[inline(always)]
        fn prefetch<T>(_ptr: *const T) {}
    }
}

/// A key copy owned by the table.
///
/// The bytes are stored with a trailing NUL so a borrowed key can be handed
/// across the C interface without another copy. [`OwnedKey::as_str`] never
/// includes the terminator.
struct OwnedKey(Box<str>);

impl OwnedKey {
    fn try_new(key: &str) -> Result<Self, TableError> {
        let len = key.len().checked_add(1).ok_or(TableError::CapacityOverflow)?;

        let mut buf = String::new();
        if buf.try_reserve_exact(len).is_err() {
            let err = TableError::alloc_failure::<u8>(len);
            warn!("failed to copy a {}-byte key: {err}", key.len());
            return Err(err);
        }
        buf.push_str(key);
        buf.push('\0');

        Ok(Self(buf.into_boxed_str()))
    }

    #[inline(always)]
    fn as_str(&self) -> &str {
        &self.0[..self.0.len() - 1]
    }
}

struct Slot<V> {
    key: OwnedKey,
    value: V,
}

type Slots<V> = Vec<Option<Slot<V>>>;

fn alloc_slots<V>(capacity: usize) -> Result<Slots<V>, TableError> {
    debug_assert!(capacity.is_power_of_two());

    let mut slots = Vec::new();
    if slots.try_reserve_exact(capacity).is_err() {
        let err = TableError::alloc_failure::<Option<Slot<V>>>(capacity);
        warn!("failed to allocate {capacity} hash table slots: {err}");
        return Err(err);
    }
    slots.resize_with(capacity, || None);

    Ok(slots)
}

/// Outcome of walking a probe sequence.
enum Probe {
    /// The key lives at this index.
    Found(usize),
    /// The key is absent; this is the first empty slot on its sequence.
    Vacant(usize),
}

/// Walks the linear probe sequence of `key` starting at its home slot.
///
/// The load factor bound guarantees at least one empty slot, so the walk
/// always terminates.
#[inline]
fn probe<V>(slots: &[Option<Slot<V>>], key: &str, hash: u64) -> Probe {
    let mask = slots.len() - 1;
    let mut index = hash as usize & mask;
    prefetch(slots.as_ptr().wrapping_add(index));

    loop {
        match &slots[index] {
            None => return Probe::Vacant(index),
            Some(slot) if slot.key.as_str() == key => return Probe::Found(index),
            Some(_) => index = (index + 1) & mask,
        }
    }
}

/// Finds the first empty slot on the probe sequence starting at `hash`'s
/// home slot. Only used while rehashing, where keys are known to be unique.
#[inline]
fn vacant_index<V>(slots: &[Option<Slot<V>>], hash: u64) -> usize {
    let mask = slots.len() - 1;
    let mut index = hash as usize & mask;
    while slots[index].is_some() {
        index = (index + 1) & mask;
    }
    index
}

/// A string-keyed hash table using open addressing and linear probing.
///
/// Keys are copied into storage owned by the table on first insertion and
/// released when the table is dropped. Values are opaque handles supplied by
/// the caller: the table stores them bit-for-bit and hands copies back, but
/// never dereferences or releases them. The `V: Copy` bound encodes this
/// contract, since `Copy` types cannot have destructors. Typical value types
/// are `&'a T` or [`NonNull<T>`](core::ptr::NonNull), neither of which can
/// be null.
///
/// The slot count is always a power of two, starting at
/// [`INITIAL_CAPACITY`]. Before any insertion that would find the table at
/// least half full, the slot array is doubled and every entry rehashed.
///
/// # Examples
///
/// ```rust
/// use fnv_table::HashTable;
///
/// let (one, two) = (1, 2);
/// let mut table = HashTable::new()?;
///
/// table.set("a", &one)?;
/// table.set("b", &two)?;
///
/// assert_eq!(table.get("a"), Some(&1));
/// assert_eq!(table.get("b"), Some(&2));
/// assert_eq!(table.get("c"), None);
/// assert_eq!(table.len(), 2);
/// # Ok::<(), fnv_table::TableError>(())
/// ```
pub struct HashTable<V> {
    slots: Slots<V>,
    populated: usize,
}

impl<V> Debug for HashTable<V>
where
    V: Copy + Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<V> HashTable<V>
where
    V: Copy,
{
    /// Creates an empty table with [`INITIAL_CAPACITY`] slots.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::AllocationFailure`] if the slot array cannot be
    /// allocated.
    pub fn new() -> Result<Self, TableError> {
        let slots = alloc_slots(INITIAL_CAPACITY)?;
        trace!("created hash table with {INITIAL_CAPACITY} slots");

        Ok(Self {
            slots,
            populated: 0,
        })
    }

    /// Creates an empty table that can hold `capacity` keys without growing.
    ///
    /// The slot count is the smallest power of two that is at least
    /// [`INITIAL_CAPACITY`] and at least twice `capacity`.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::CapacityOverflow`] if that slot count is not
    /// representable and [`TableError::AllocationFailure`] if it cannot be
    /// allocated.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use fnv_table::HashTable;
    ///
    /// let table: HashTable<&u32> = HashTable::with_capacity(100)?;
    /// assert_eq!(table.capacity(), 256);
    /// # Ok::<(), fnv_table::TableError>(())
    /// ```
    pub fn with_capacity(capacity: usize) -> Result<Self, TableError> {
        let slot_count = slots_for(capacity)?;
        let slots = alloc_slots(slot_count)?;
        trace!("created hash table with {slot_count} slots");

        Ok(Self {
            slots,
            populated: 0,
        })
    }

    /// Returns the number of distinct keys in the table.
    #[inline]
    pub fn len(&self) -> usize {
        self.populated
    }

    /// Returns `true` if the table holds no keys.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.populated == 0
    }

    /// Returns the current number of slots. Always a power of two.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Returns the value stored for `key`, or `None` if the key is absent.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use fnv_table::HashTable;
    ///
    /// let value = 7;
    /// let mut table = HashTable::new()?;
    /// assert_eq!(table.get("seven"), None);
    ///
    /// table.set("seven", &value)?;
    /// assert_eq!(table.get("seven"), Some(&7));
    /// # Ok::<(), fnv_table::TableError>(())
    /// ```
    pub fn get(&self, key: &str) -> Option<V> {
        match probe(&self.slots, key, hash_key(key.as_bytes())) {
            Probe::Found(index) => self.slots[index].as_ref().map(|slot| slot.value),
            Probe::Vacant(_) => None,
        }
    }

    /// Returns `true` if `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Inserts `value` for `key`, or replaces the value of an existing key.
    ///
    /// A new key is copied into storage owned by the table; replacing the
    /// value of an existing key reuses the copy already held. On success the
    /// table's own copy of the key is returned.
    ///
    /// If the table is at least half full the slot array is doubled before
    /// the insertion is attempted.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::CapacityOverflow`] or
    /// [`TableError::AllocationFailure`] if growing the table or copying the
    /// key fails. The table is unchanged in either case.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use fnv_table::HashTable;
    ///
    /// let (first, second) = (1, 2);
    /// let mut table = HashTable::new()?;
    ///
    /// assert_eq!(table.set("x", &first)?, "x");
    /// table.set("x", &second)?;
    ///
    /// assert_eq!(table.get("x"), Some(&2));
    /// assert_eq!(table.len(), 1);
    /// # Ok::<(), fnv_table::TableError>(())
    /// ```
    pub fn set(&mut self, key: &str, value: V) -> Result<&str, TableError> {
        if self.populated >= max_load(self.capacity()) {
            self.grow()?;
        }
        let capacity = self.capacity();

        let index = match probe(&self.slots, key, hash_key(key.as_bytes())) {
            Probe::Found(index) | Probe::Vacant(index) => index,
        };

        let entry = &mut self.slots[index];
        let slot = match entry {
            Some(slot) => {
                slot.value = value;
                slot
            }
            None => {
                let key = OwnedKey::try_new(key)?;
                self.populated += 1;
                debug_assert!(self.populated <= max_load(capacity));
                entry.insert(Slot { key, value })
            }
        };

        Ok(slot.key.as_str())
    }

    /// Ensures `additional` more keys can be inserted without growing.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::CapacityOverflow`] if the required slot count is
    /// not representable and [`TableError::AllocationFailure`] if it cannot
    /// be allocated. The table is unchanged on error.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use fnv_table::HashTable;
    ///
    /// let mut table: HashTable<&u8> = HashTable::new()?;
    /// table.try_reserve(50)?;
    /// assert!(table.capacity() >= 100);
    ///
    /// assert!(table.try_reserve(usize::MAX).is_err());
    /// # Ok::<(), fnv_table::TableError>(())
    /// ```
    pub fn try_reserve(&mut self, additional: usize) -> Result<(), TableError> {
        let required = self
            .populated
            .checked_add(additional)
            .ok_or(TableError::CapacityOverflow)?;
        let slot_count = slots_for(required)?;
        if slot_count > self.capacity() {
            self.rehash(slot_count)?;
        }
        Ok(())
    }

    /// Ensures `additional` more keys can be inserted without growing.
    ///
    /// # Panics
    ///
    /// Panics if the required slot count overflows, and aborts through
    /// [`handle_alloc_error`](alloc::alloc::handle_alloc_error) if the slot
    /// array cannot be allocated. Use [`try_reserve`](Self::try_reserve) to
    /// handle these cases.
    pub fn reserve(&mut self, additional: usize) {
        match self.try_reserve(additional) {
            Ok(()) => {}
            Err(TableError::AllocationFailure { layout }) => {
                alloc::alloc::handle_alloc_error(layout)
            }
            Err(err) => panic!("{err}"),
        }
    }

    /// Returns an iterator over all `(key, value)` pairs in slot order.
    ///
    /// The order depends on the hashes of the keys and the current capacity;
    /// it is not insertion order.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use fnv_table::HashTable;
    ///
    /// let values = [1, 2, 3];
    /// let mut table = HashTable::new()?;
    /// for (key, value) in ["a", "b", "c"].into_iter().zip(&values) {
    ///     table.set(key, value)?;
    /// }
    ///
    /// let mut pairs: Vec<(&str, i32)> = table.iter().map(|(k, v)| (k, *v)).collect();
    /// pairs.sort();
    /// assert_eq!(pairs, [("a", 1), ("b", 2), ("c", 3)]);
    /// # Ok::<(), fnv_table::TableError>(())
    /// ```
    pub fn iter(&self) -> Iter<'_, V> {
        Iter {
            table: self,
            index: 0,
            yielded: 0,
            current: None,
        }
    }

    /// Returns the first occupied slot at or after `start`, with its index.
    pub(crate) fn next_occupied(&self, start: usize) -> Option<(usize, &str, V)> {
        self.slots
            .get(start..)?
            .iter()
            .enumerate()
            .find_map(|(offset, slot)| {
                slot.as_ref()
                    .map(|slot| (start + offset, slot.key.as_str(), slot.value))
            })
    }

    #[cold]
    fn grow(&mut self) -> Result<(), TableError> {
        let capacity = self.capacity();
        let Some(new_capacity) = capacity.checked_mul(2) else {
            warn!("cannot grow hash table beyond {capacity} slots");
            return Err(TableError::CapacityOverflow);
        };

        self.rehash(new_capacity)
    }

    /// Moves every entry into a fresh slot array of `new_capacity` slots.
    ///
    /// Key copies are moved, not duplicated, and the population is unchanged.
    /// If the new array cannot be allocated the table is left untouched.
    fn rehash(&mut self, new_capacity: usize) -> Result<(), TableError> {
        debug_assert!(new_capacity > self.capacity());

        let mut new_slots = alloc_slots::<V>(new_capacity)?;
        let old_slots = core::mem::replace(&mut self.slots, Slots::new());
        let old_capacity = old_slots.len();

        for slot in old_slots.into_iter().flatten() {
            let index = vacant_index(&new_slots, hash_key(slot.key.as_str().as_bytes()));
            new_slots[index] = Some(slot);
        }

        self.slots = new_slots;
        debug!(
            "grew hash table from {old_capacity} to {new_capacity} slots ({} keys)",
            self.populated
        );

        Ok(())
    }

    /// Counts keys by their distance from their home slot.
    ///
    /// Test-only: compiled only with `cfg(test)`.
    #[cfg(test)]
    pub(crate) fn probe_histogram(&self) -> Vec<usize> {
        let mask = self.capacity() - 1;
        let mut hist = alloc::vec![0usize; self.capacity()];

        for (index, slot) in self.slots.iter().enumerate() {
            if let Some(slot) = slot {
                let home = hash_key(slot.key.as_str().as_bytes()) as usize & mask;
                hist[index.wrapping_sub(home) & mask] += 1;
            }
        }

        while hist.len() > 1 && hist.last() == Some(&0) {
            hist.pop();
        }
        hist
    }
}

/// Slot count needed to hold `keys` keys under the load factor bound.
fn slots_for(keys: usize) -> Result<usize, TableError> {
    keys.checked_mul(2)
        .and_then(|slots| slots.max(INITIAL_CAPACITY).checked_next_power_of_two())
        .ok_or(TableError::CapacityOverflow)
}

impl<'a, V> IntoIterator for &'a HashTable<V>
where
    V: Copy,
{
    type Item = (&'a str, V);
    type IntoIter = Iter<'a, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// A cursor over the entries of a [`HashTable`].
///
/// Created by [`HashTable::iter`]. The cursor walks slot indices in
/// increasing order, skipping empty slots. Once the end of the slot array is
/// reached it stays exhausted.
///
/// The cursor borrows the table, so the table cannot be modified while the
/// cursor is alive.
///
/// # Examples
///
/// ```rust
/// use fnv_table::HashTable;
///
/// let value = 1;
/// let mut table = HashTable::new()?;
/// table.set("only", &value)?;
///
/// let mut iter = table.iter();
/// assert_eq!(iter.key(), None);
///
/// assert_eq!(iter.next(), Some(("only", &1)));
/// assert_eq!(iter.key(), Some("only"));
/// assert_eq!(iter.value(), Some(&1));
///
/// assert_eq!(iter.next(), None);
/// assert_eq!(iter.key(), None);
/// # Ok::<(), fnv_table::TableError>(())
/// ```
pub struct Iter<'a, V> {
    table: &'a HashTable<V>,
    index: usize,
    yielded: usize,
    current: Option<(&'a str, V)>,
}

impl<'a, V> Iter<'a, V>
where
    V: Copy,
{
    /// Key of the entry most recently yielded, or `None` before the first
    /// entry and after exhaustion.
    pub fn key(&self) -> Option<&'a str> {
        self.current.map(|(key, _)| key)
    }

    /// Value of the entry most recently yielded, or `None` before the first
    /// entry and after exhaustion.
    pub fn value(&self) -> Option<V> {
        self.current.map(|(_, value)| value)
    }
}

impl<'a, V> Iterator for Iter<'a, V>
where
    V: Copy,
{
    type Item = (&'a str, V);

    fn next(&mut self) -> Option<Self::Item> {
        self.current = match self.table.next_occupied(self.index) {
            Some((index, key, value)) => {
                self.index = index + 1;
                self.yielded += 1;
                Some((key, value))
            }
            None => {
                self.index = self.table.capacity();
                None
            }
        };
        self.current
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.table.len() - self.yielded;
        (remaining, Some(remaining))
    }
}

impl<V> ExactSizeIterator for Iter<'_, V> where V: Copy {}

impl<V> FusedIterator for Iter<'_, V> where V: Copy {}
