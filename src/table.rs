use crate::objects::object::Object;
use crate::objects::object_string::ObjectString;
use crate::util::grow_capacity;
use crate::value::{is_nil, make_bool_value, make_nil_value, Value};

// Grow once count (live entries plus tombstones) passes 3/4 of capacity.
const MAX_LOAD_NUMERATOR: usize = 3;
const MAX_LOAD_DENOMINATOR: usize = 4;

#[derive(Clone, Copy)]
struct Entry {
    key: *mut ObjectString,
    value: Value,
}

impl Entry {
    fn empty() -> Entry {
        Entry {
            key: std::ptr::null_mut(),
            value: make_nil_value(),
        }
    }

    // A tombstone is a vacated slot that probes must walk through:
    // null key, true value. A genuinely empty slot holds nil.
    fn is_tombstone(&self) -> bool {
        self.key.is_null() && !is_nil(&self.value)
    }
}

/// Open-addressed, linear-probing map from interned strings to values. Keys
/// compare by pointer identity and probe with the string's precomputed hash;
/// `find_string` is the single content-comparing probe the interner uses
/// before an `ObjectString` exists.
pub struct Table {
    count: usize,
    entries: Vec<Entry>,
}

impl Table {
    pub fn new() -> Self {
        Table {
            count: 0,
            entries: Vec::new(),
        }
    }

    /// Live entries, tombstones excluded.
    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|entry| !entry.key.is_null()).count()
    }

    /// Capacity footprint of the bucket array, for GC byte accounting.
    pub fn entry_bytes(&self) -> usize {
        self.entries.capacity() * std::mem::size_of::<Entry>()
    }

    pub fn get(&self, key: *mut ObjectString) -> Option<Value> {
        if self.count == 0 {
            return None;
        }

        let index = Self::find_entry(&self.entries, key);
        let entry = &self.entries[index];
        if entry.key.is_null() {
            None
        } else {
            Some(entry.value)
        }
    }

    /// Returns true when the key was not present before.
    pub fn set(&mut self, key: *mut ObjectString, value: Value) -> bool {
        if (self.count + 1) * MAX_LOAD_DENOMINATOR > self.entries.len() * MAX_LOAD_NUMERATOR {
            let capacity = grow_capacity!(self.entries.len());
            self.adjust_capacity(capacity);
        }

        let index = Self::find_entry(&self.entries, key);
        let entry = &mut self.entries[index];
        let is_new_key = entry.key.is_null();
        // Reusing a tombstone does not grow count; its slot is already counted.
        if is_new_key && !entry.is_tombstone() {
            self.count += 1;
        }

        entry.key = key;
        entry.value = value;
        is_new_key
    }

    pub fn delete(&mut self, key: *mut ObjectString) -> bool {
        if self.count == 0 {
            return false;
        }

        let index = Self::find_entry(&self.entries, key);
        let entry = &mut self.entries[index];
        if entry.key.is_null() {
            return false;
        }

        entry.key = std::ptr::null_mut();
        entry.value = make_bool_value(true);
        true
    }

    /// Content-comparing probe used while interning, before the string has an
    /// object identity. Compares hash, then length, then bytes.
    pub fn find_string(&self, content: &str, hash: u32) -> Option<*mut ObjectString> {
        if self.count == 0 {
            return None;
        }

        let capacity = self.entries.len();
        let mut index = hash as usize & (capacity - 1);
        loop {
            let entry = &self.entries[index];
            if entry.key.is_null() {
                if !entry.is_tombstone() {
                    return None;
                }
            } else {
                let key = unsafe { &*entry.key };
                if key.hash == hash && key.content == content {
                    return Some(entry.key);
                }
            }

            index = (index + 1) & (capacity - 1);
        }
    }

    /// Shallow-copy every live entry into `dst`.
    #[allow(dead_code)]
    pub fn add_all(&self, dst: &mut Table) {
        for entry in &self.entries {
            if !entry.key.is_null() {
                dst.set(entry.key, entry.value);
            }
        }
    }

    /// Drop entries whose key object did not survive marking. Run on the
    /// intern set between trace and sweep so freed strings never linger as
    /// dangling keys.
    pub fn remove_white<F>(&mut self, is_marked: F)
    where
        F: Fn(*mut Object) -> bool,
    {
        let dead: Vec<*mut ObjectString> = self
            .entries
            .iter()
            .filter(|entry| !entry.key.is_null() && !is_marked(entry.key as *mut Object))
            .map(|entry| entry.key)
            .collect();
        for key in dead {
            self.delete(key);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (*mut ObjectString, &Value)> {
        self.entries
            .iter()
            .filter(|entry| !entry.key.is_null())
            .map(|entry| (entry.key, &entry.value))
    }

    fn find_entry(entries: &[Entry], key: *mut ObjectString) -> usize {
        let capacity = entries.len();
        let hash = unsafe { (*key).hash };
        let mut index = hash as usize & (capacity - 1);
        let mut tombstone: Option<usize> = None;
        loop {
            let entry = &entries[index];
            if entry.key.is_null() {
                if !entry.is_tombstone() {
                    return tombstone.unwrap_or(index);
                }
                if tombstone.is_none() {
                    tombstone = Some(index);
                }
            } else if entry.key == key {
                return index;
            }

            index = (index + 1) & (capacity - 1);
        }
    }

    fn adjust_capacity(&mut self, capacity: usize) {
        let old = std::mem::replace(&mut self.entries, vec![Entry::empty(); capacity]);
        // Tombstones are discarded on rebuild, so count is recomputed.
        self.count = 0;
        for entry in old {
            if entry.key.is_null() {
                continue;
            }
            let index = Self::find_entry(&self.entries, entry.key);
            self.entries[index] = entry;
            self.count += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::object_manager::ObjectManager;
    use crate::objects::object_string::hash_string;
    use crate::value::{as_number, make_number_value};

    fn alloc(manager: &mut ObjectManager, content: &str) -> *mut ObjectString {
        manager.alloc_string(content, hash_string(content)).0
    }

    #[test]
    fn test_set_get_roundtrip() {
        let mut manager = ObjectManager::new();
        let mut table = Table::new();
        let key = alloc(&mut manager, "answer");

        assert!(table.get(key).is_none());
        assert!(table.set(key, make_number_value(42.0)));
        let value = table.get(key).expect("key should be present");
        assert_eq!(as_number(&value), 42.0);

        // Overwriting is not a new key.
        assert!(!table.set(key, make_number_value(7.0)));
        assert_eq!(as_number(&table.get(key).unwrap()), 7.0);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_delete_leaves_tombstone_probes_continue() {
        let mut manager = ObjectManager::new();
        let mut table = Table::new();
        let keys: Vec<_> = (0..12)
            .map(|i| alloc(&mut manager, &format!("key{}", i)))
            .collect();
        for (i, &key) in keys.iter().enumerate() {
            table.set(key, make_number_value(i as f64));
        }

        assert!(table.delete(keys[3]));
        assert!(!table.delete(keys[3]));
        assert!(table.get(keys[3]).is_none());

        // Every other key must still be reachable through the tombstone.
        for (i, &key) in keys.iter().enumerate() {
            if i == 3 {
                continue;
            }
            assert_eq!(as_number(&table.get(key).unwrap()), i as f64);
        }
        assert_eq!(table.len(), 11);
    }

    #[test]
    fn test_growth_preserves_entries() {
        let mut manager = ObjectManager::new();
        let mut table = Table::new();
        let keys: Vec<_> = (0..64)
            .map(|i| alloc(&mut manager, &format!("entry-{}", i)))
            .collect();
        for (i, &key) in keys.iter().enumerate() {
            table.set(key, make_number_value(i as f64));
        }
        for (i, &key) in keys.iter().enumerate() {
            assert_eq!(as_number(&table.get(key).unwrap()), i as f64);
        }
        assert_eq!(table.len(), 64);
    }

    #[test]
    fn test_find_string_compares_content() {
        let mut manager = ObjectManager::new();
        let mut table = Table::new();
        let key = alloc(&mut manager, "interned");
        table.set(key, make_nil_value());

        let found = table.find_string("interned", hash_string("interned"));
        assert_eq!(found, Some(key));
        assert!(table.find_string("missing", hash_string("missing")).is_none());
    }

    #[test]
    fn test_remove_white_prunes_unmarked_keys() {
        let mut manager = ObjectManager::new();
        let mut table = Table::new();
        let marked = alloc(&mut manager, "marked");
        let unmarked = alloc(&mut manager, "unmarked");
        table.set(marked, make_nil_value());
        table.set(unmarked, make_nil_value());

        table.remove_white(|object| object == marked as *mut Object);
        assert!(table.get(marked).is_some());
        assert!(table.get(unmarked).is_none());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_add_all_copies_live_entries() {
        let mut manager = ObjectManager::new();
        let mut src = Table::new();
        let mut dst = Table::new();
        let a = alloc(&mut manager, "a");
        let b = alloc(&mut manager, "b");
        src.set(a, make_number_value(1.0));
        src.set(b, make_number_value(2.0));
        src.delete(b);

        src.add_all(&mut dst);
        assert_eq!(dst.len(), 1);
        assert_eq!(as_number(&dst.get(a).unwrap()), 1.0);
    }
}
