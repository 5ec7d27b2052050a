//! Generation-checked slots for the statements of one connection.
//!
//! A [`Key`] only ever resolves to the value it was issued for: removing a
//! value bumps the slot's generation, so keys held by closed statements (or
//! statements of a closed connection) resolve to nothing instead of to
//! whatever reuses the slot.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct Key {
    index: usize,
    generation: u64,
}

#[derive(Debug)]
enum Entry<T> {
    Occupied { generation: u64, value: T },
    Vacant { generation: u64 },
}

#[derive(Debug)]
pub(crate) struct Arena<T> {
    entries: Vec<Entry<T>>,
    free: Vec<usize>,
    len: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }
}

impl<T> Arena<T> {
    pub(crate) fn insert(&mut self, value: T) -> Key {
        self.len += 1;

        if let Some(index) = self.free.pop() {
            let generation = match self.entries[index] {
                Entry::Vacant { generation } => generation,
                Entry::Occupied { generation, .. } => generation + 1,
            };

            self.entries[index] = Entry::Occupied { generation, value };
            return Key { index, generation };
        }

        let index = self.entries.len();
        self.entries.push(Entry::Occupied {
            generation: 0,
            value,
        });

        Key {
            index,
            generation: 0,
        }
    }

    pub(crate) fn get(&self, key: Key) -> Option<&T> {
        match self.entries.get(key.index)? {
            Entry::Occupied { generation, value } if *generation == key.generation => Some(value),
            _ => None,
        }
    }

    pub(crate) fn get_mut(&mut self, key: Key) -> Option<&mut T> {
        match self.entries.get_mut(key.index)? {
            Entry::Occupied { generation, value } if *generation == key.generation => Some(value),
            _ => None,
        }
    }

    pub(crate) fn remove(&mut self, key: Key) -> Option<T> {
        let entry = self.entries.get_mut(key.index)?;

        if !matches!(entry, Entry::Occupied { generation, .. } if *generation == key.generation) {
            return None;
        }

        let vacant = Entry::Vacant {
            generation: key.generation + 1,
        };

        match std::mem::replace(entry, vacant) {
            Entry::Occupied { value, .. } => {
                self.free.push(key.index);
                self.len -= 1;
                Some(value)
            }
            Entry::Vacant { .. } => None,
        }
    }

    /// Remove every value, oldest slot first. Outstanding keys go stale.
    pub(crate) fn drain(&mut self) -> Vec<T> {
        let mut values = Vec::with_capacity(self.len);

        for (index, entry) in self.entries.iter_mut().enumerate() {
            let next = match entry {
                Entry::Occupied { generation, .. } => *generation + 1,
                Entry::Vacant { .. } => continue,
            };

            if let Entry::Occupied { value, .. } =
                std::mem::replace(entry, Entry::Vacant { generation: next })
            {
                values.push(value);
                self.free.push(index);
            }
        }

        self.len = 0;
        values
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_never_resolves_stale_keys() {
        let mut arena = Arena::default();

        let a = arena.insert("a");
        assert_eq!(arena.remove(a), Some("a"));
        assert_eq!(arena.remove(a), None);

        let b = arena.insert("b");
        assert_eq!(arena.get(a), None);
        assert_eq!(arena.get(b), Some(&"b"));
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn it_drains_everything() {
        let mut arena = Arena::default();
        let a = arena.insert(1);
        let b = arena.insert(2);

        assert_eq!(arena.drain(), vec![1, 2]);
        assert_eq!(arena.len(), 0);
        assert!(arena.get_mut(a).is_none());
        assert!(arena.get(b).is_none());

        let c = arena.insert(3);
        assert_ne!(c, a);
        assert_ne!(c, b);
    }
}
