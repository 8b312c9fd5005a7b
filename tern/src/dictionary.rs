//! Open-addressing string-keyed hash table.
//!
//! Entries live in two parallel vectors (`keys`, `values`) in insertion
//! order; the probe `table` maps hash slots to entry indices. Slot value `0`
//! means empty, any other value is `entry index + 1`.
//!
//! The probe sequence is `i = (i * 5 + perturb + 1) & mask` with `perturb`
//! shifted right by 5 before each step, which visits every slot of a
//! power-of-two table. The table doubles whenever an insertion would take
//! the load factor to 2/3; the entry vectors double independently when full.
//! There is no deletion.

use crate::value::Value;

const MIN_TABLE: usize = 8;
const MIN_ENTRIES: usize = 4;
const PERTURB_SHIFT: u32 = 5;

const FNV_INIT: u64 = 14695981039346656037;
const FNV_PRIME: u64 = 1099511628211;

/// FNV-1a over the key's bytes.
#[inline]
pub fn hash_key(key: &str) -> u64 {
    let mut hash = FNV_INIT;
    for &byte in key.as_bytes() {
        hash = (hash ^ byte as u64).wrapping_mul(FNV_PRIME);
    }
    hash
}

#[derive(Debug, Clone)]
pub struct Dictionary {
    keys: Vec<String>,
    values: Vec<Value>,
    table: Vec<u32>,
}

impl Default for Dictionary {
    fn default() -> Self {
        Self::new()
    }
}

enum Probe {
    Found(usize),
    Vacant(usize),
}

impl Dictionary {
    pub fn new() -> Self {
        Self {
            keys: Vec::new(),
            values: Vec::new(),
            table: vec![0; MIN_TABLE],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Number of probe slots.
    #[inline]
    pub fn table_len(&self) -> usize {
        self.table.len()
    }

    fn probe(&self, key: &str) -> Probe {
        let mask = self.table.len() - 1;
        let mut perturb = hash_key(key) as usize;
        let mut i = perturb & mask;
        loop {
            match self.table[i] {
                0 => return Probe::Vacant(i),
                slot => {
                    let entry = slot as usize - 1;
                    if self.keys[entry] == key {
                        return Probe::Found(entry);
                    }
                }
            }
            perturb >>= PERTURB_SHIFT;
            i = (i.wrapping_mul(5).wrapping_add(perturb).wrapping_add(1)) & mask;
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        match self.probe(key) {
            Probe::Found(entry) => Some(self.values[entry]),
            Probe::Vacant(_) => None,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        matches!(self.probe(key), Probe::Found(_))
    }

    /// Insert or overwrite; returns the previous value for `key`.
    pub fn insert(&mut self, key: &str, value: Value) -> Option<Value> {
        if let Probe::Found(entry) = self.probe(key) {
            return Some(std::mem::replace(&mut self.values[entry], value));
        }

        if (self.len() + 1) * 3 >= self.table.len() * 2 {
            self.grow_table();
        }
        let Probe::Vacant(slot) = self.probe(key) else {
            unreachable!("key appeared during growth");
        };

        if self.keys.len() == self.keys.capacity() {
            let extra = self.keys.capacity().max(MIN_ENTRIES);
            self.keys.reserve_exact(extra);
            self.values.reserve_exact(extra);
        }
        self.keys.push(key.to_owned());
        self.values.push(value);
        self.table[slot] = self.keys.len() as u32;
        None
    }

    fn grow_table(&mut self) {
        let new_len = self.table.len() * 2;
        self.table = vec![0; new_len];
        for entry in 0..self.keys.len() {
            let Probe::Vacant(slot) = self.probe(&self.keys[entry]) else {
                unreachable!("duplicate key in dictionary");
            };
            self.table[slot] = entry as u32 + 1;
        }
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Value)> + '_ {
        self.keys
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.keys.iter().map(String::as_str)
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut Value> + '_ {
        self.values.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Space;

    fn v(i: usize) -> Value {
        Value::new(Space::Arena0, i)
    }

    #[test]
    fn fnv1a_reference_values() {
        assert_eq!(hash_key(""), 0xcbf29ce484222325);
        assert_eq!(hash_key("a"), 0xaf63dc4c8601ec8c);
    }

    #[test]
    fn insert_get_overwrite() {
        let mut d = Dictionary::new();
        assert_eq!(d.insert("x", v(1)), None);
        assert_eq!(d.insert("y", v(2)), None);
        assert_eq!(d.insert("x", v(3)), Some(v(1)));
        assert_eq!(d.get("x"), Some(v(3)));
        assert_eq!(d.get("y"), Some(v(2)));
        assert_eq!(d.get("z"), None);
        assert_eq!(d.len(), 2);
    }

    #[test]
    fn table_doubles_before_two_thirds() {
        let mut d = Dictionary::new();
        assert_eq!(d.table_len(), 8);
        for i in 0..5 {
            d.insert(&format!("k{i}"), v(i));
        }
        // 5/8 is still below 2/3, a sixth entry is not
        assert_eq!(d.table_len(), 8);
        d.insert("k5", v(5));
        assert_eq!(d.table_len(), 16);
        for i in 6..100 {
            d.insert(&format!("k{i}"), v(i));
            assert!(d.len() * 3 < d.table_len() * 2);
        }
        for i in 0..100 {
            assert_eq!(d.get(&format!("k{i}")), Some(v(i)));
        }
    }

    #[test]
    fn iteration_follows_insertion_order() {
        let mut d = Dictionary::new();
        for name in ["c", "a", "b"] {
            d.insert(name, v(0));
        }
        d.insert("a", v(7));
        let keys: Vec<_> = d.keys().collect();
        assert_eq!(keys, ["c", "a", "b"]);
        assert_eq!(d.iter().nth(1), Some(("a", v(7))));
    }

    #[test]
    fn values_mut_rewrites_in_place() {
        let mut d = Dictionary::new();
        d.insert("a", v(1));
        for value in d.values_mut() {
            *value = v(9);
        }
        assert_eq!(d.get("a"), Some(v(9)));
    }
}
