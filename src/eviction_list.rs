//! An [EvictionList] holds the keys of cache entries which nobody references anymore, most recently released first.
//!
//! This is implemented as a vec-backed doubly linked list plus an auxiliary hash-based index from key to slot, so
//! insertion at the head, removal of an arbitrary key, moving a key to the head and popping the oldest key are all
//! O(1).
//!
//! Slots that are not linked into the list sit on an intrusive free list and are handed out again on the next insert.
//! That free list is the node pool: once the list has grown to its working size, eviction pressure doesn't allocate.
//! The arena only shrinks back to its initial capacity on [EvictionList::clear].
//! Links are slot indices rather than pointers, and a vacant slot can't be mistaken for a linked node because every
//! access goes through [Slot::as_linked].
use std::collections::HashMap;
use std::hash::Hash;

use ahash::RandomState;

struct LinkedNode<K> {
    key: K,
    prev: Option<usize>,
    next: Option<usize>,
}

struct VacantNode {
    next_vacant: Option<usize>,
}

enum Slot<K> {
    /// This slot is on the free list, possibly with a pointer at the next vacant slot.
    Vacant(VacantNode),
    /// This slot is in the list, and doubly linked to its neighbours.
    Linked(LinkedNode<K>),
}

impl<K> Slot<K> {
    fn as_linked(&self) -> &LinkedNode<K> {
        match self {
            Self::Linked(ref x) => x,
            _ => panic!("Slot should be linked"),
        }
    }

    fn as_linked_mut(&mut self) -> &mut LinkedNode<K> {
        match self {
            Self::Linked(ref mut x) => x,
            _ => panic!("Slot should be linked"),
        }
    }

    fn as_vacant(&self) -> &VacantNode {
        match self {
            Self::Vacant(ref x) => x,
            _ => panic!("Slot should be vacant"),
        }
    }
}

pub struct EvictionList<K: Hash + Eq + Copy> {
    slots: Vec<Slot<K>>,
    /// Points at the slot of the key.
    index: HashMap<K, usize, RandomState>,
    /// Most recently made eligible.
    head: Option<usize>,
    /// Oldest, and the next to be evicted.
    tail: Option<usize>,
    vacant_head: Option<usize>,
    initial_capacity: usize,
}

impl<K: Hash + Eq + Copy> EvictionList<K> {
    /// Build an empty list with `capacity` nodes allocated up front.
    pub fn new(capacity: usize) -> EvictionList<K> {
        let slots = (0..capacity)
            .map(|i| {
                Slot::Vacant(VacantNode {
                    next_vacant: if i + 1 < capacity { Some(i + 1) } else { None },
                })
            })
            .collect::<Vec<_>>();

        EvictionList {
            slots,
            index: Default::default(),
            head: None,
            tail: None,
            vacant_head: if capacity > 0 { Some(0) } else { None },
            initial_capacity: capacity,
        }
    }

    /// Entirely unlink a linked slot from the list, leaving it linked to nothing.
    fn unlink(&mut self, index: usize) {
        let (prev, next) = {
            let node = self.slots[index].as_linked();
            (node.prev, node.next)
        };

        match prev {
            Some(p) => self.slots[p].as_linked_mut().next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slots[n].as_linked_mut().prev = prev,
            None => self.tail = prev,
        }

        let node = self.slots[index].as_linked_mut();
        node.prev = None;
        node.next = None;
    }

    /// Link an unlinked slot in as the new head.
    fn link_at_head(&mut self, index: usize) {
        let old_head = self.head;
        {
            let node = self.slots[index].as_linked_mut();
            node.prev = None;
            node.next = old_head;
        }

        match old_head {
            Some(h) => self.slots[h].as_linked_mut().prev = Some(index),
            // First entry, so it's the tail as well.
            None => self.tail = Some(index),
        }
        self.head = Some(index);
    }

    fn make_most_recent(&mut self, index: usize) {
        if self.head == Some(index) {
            return;
        }
        self.unlink(index);
        self.link_at_head(index);
    }

    /// Find a vacant slot, or grow the arena by one if the free list is exhausted.
    fn take_vacant(&mut self) -> usize {
        if let Some(v) = self.vacant_head {
            self.vacant_head = self.slots[v].as_vacant().next_vacant;
            return v;
        }

        self.slots
            .push(Slot::Vacant(VacantNode { next_vacant: None }));
        self.slots.len() - 1
    }

    /// Unlink a slot and put it back on the free list, returning the key it held.
    fn become_vacant(&mut self, index: usize) -> K {
        self.unlink(index);
        let mut old = Slot::Vacant(VacantNode {
            next_vacant: self.vacant_head,
        });
        std::mem::swap(&mut old, &mut self.slots[index]);
        self.vacant_head = Some(index);
        match old {
            Slot::Linked(LinkedNode { key, .. }) => {
                self.index.remove(&key);
                key
            }
            _ => panic!("Should have been linked"),
        }
    }

    /// Put a key at the head of the list.
    ///
    /// If the key is already tracked it is moved to the head instead.  Returns `true` if the key was new.
    pub fn insert_at_head(&mut self, key: K) -> bool {
        if let Some(&ind) = self.index.get(&key) {
            self.make_most_recent(ind);
            return false;
        }

        let ind = self.take_vacant();
        self.slots[ind] = Slot::Linked(LinkedNode {
            key,
            prev: None,
            next: None,
        });
        self.link_at_head(ind);
        self.index.insert(key, ind);
        true
    }

    /// Pop the key which has been in the list the longest.
    pub fn remove_oldest(&mut self) -> Option<K> {
        let tail = self.tail?;
        Some(self.become_vacant(tail))
    }

    pub fn peek_oldest(&self) -> Option<&K> {
        self.tail.map(|t| &self.slots[t].as_linked().key)
    }

    /// Remove a key from anywhere in the list.  Returns `false` if it wasn't there.
    pub fn remove(&mut self, key: &K) -> bool {
        let ind = match self.index.get(key) {
            Some(&i) => i,
            None => return false,
        };
        self.become_vacant(ind);
        true
    }

    /// Move a key to the head, marking it as the most recently eligible.
    pub fn touch(&mut self, key: &K) -> bool {
        let ind = match self.index.get(key) {
            Some(&i) => i,
            None => return false,
        };
        self.make_most_recent(ind);
        true
    }

    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Number of node slots allocated, linked or not.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Unlink every key, and release any nodes allocated past the initial capacity.
    pub fn clear(&mut self) {
        *self = EvictionList::new(self.initial_capacity);
    }

    /// Iterator visiting keys from most recently to least recently eligible.
    pub fn iter(&self) -> impl Iterator<Item = &K> {
        let mut ind = self.head;
        std::iter::from_fn(move || {
            let next = ind?;
            let ret = self.slots[next].as_linked();
            ind = ret.next;
            Some(&ret.key)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use lru::LruCache;
    use proptest::prelude::*;

    #[derive(Copy, Clone, Debug, Ord, Eq, PartialOrd, PartialEq)]
    enum ListCommand {
        Insert(u64),
        Touch(u64),
        Remove(u64),
        RemoveOldest,
    }

    fn list_command_strat(keys: std::ops::Range<u64>) -> prop::strategy::BoxedStrategy<ListCommand> {
        proptest::prop_oneof![
            keys.clone().prop_map(ListCommand::Insert),
            keys.clone().prop_map(ListCommand::Touch),
            keys.prop_map(ListCommand::Remove),
            Just(ListCommand::RemoveOldest),
        ]
        .boxed()
    }

    // An unbounded [LruCache] with unit values orders its keys exactly the way the eviction list should: put and get
    // both promote, and the least recently used key pops first.
    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 500,
            max_shrink_iters: 100000,
            ..Default::default()
        })]
        #[test]
        fn test_against_lru_cache(
            capacity in 0..64usize,
            commands in prop::collection::vec(list_command_strat(0..100), 0..2000)
        ) {
            let mut known_good = LruCache::<u64, ()>::unbounded();
            let mut ours = EvictionList::<u64>::new(capacity);

            for c in commands {
                use ListCommand::*;

                match c {
                    Insert(k) => prop_assert_eq!(known_good.put(k, ()).is_none(), ours.insert_at_head(k)),
                    Touch(k) => prop_assert_eq!(known_good.get(&k).is_some(), ours.touch(&k)),
                    Remove(k) => prop_assert_eq!(known_good.pop(&k).is_some(), ours.remove(&k)),
                    RemoveOldest => prop_assert_eq!(known_good.pop_lru().map(|x| x.0), ours.remove_oldest()),
                }

                let good_state = known_good.iter().map(|(k, _)| *k).collect::<Vec<_>>();
                let our_state = ours.iter().copied().collect::<Vec<_>>();
                prop_assert_eq!(&good_state, &our_state);
                prop_assert_eq!(good_state.len(), ours.len());
                prop_assert_eq!(good_state.last(), ours.peek_oldest());
            }
        }
    }

    #[test]
    fn test_oldest_first() {
        let mut list = EvictionList::<u32>::new(4);
        for k in 1..=4 {
            assert!(list.insert_at_head(k));
        }
        assert_eq!(list.iter().copied().collect::<Vec<_>>(), vec![4, 3, 2, 1]);

        // Reinserting repositions instead of duplicating.
        assert!(!list.insert_at_head(1));
        assert!(list.touch(&2));
        assert_eq!(list.len(), 4);
        assert_eq!(list.iter().copied().collect::<Vec<_>>(), vec![2, 1, 4, 3]);

        assert_eq!(list.remove_oldest(), Some(3));
        assert!(list.remove(&1));
        assert!(!list.remove(&1));
        assert!(!list.touch(&1));
        assert_eq!(list.iter().copied().collect::<Vec<_>>(), vec![2, 4]);
    }

    // Nodes come back off the free list, so the arena doesn't grow past its high water mark.
    #[test]
    fn test_nodes_are_reused() {
        let mut list = EvictionList::<u32>::new(2);
        assert_eq!(list.capacity(), 2);

        for round in 0..100 {
            list.insert_at_head(round);
            list.insert_at_head(round + 1000);
            list.insert_at_head(round + 2000);
            assert_eq!(list.remove_oldest(), Some(round));
            assert_eq!(list.remove_oldest(), Some(round + 1000));
            assert_eq!(list.remove_oldest(), Some(round + 2000));
            assert!(list.is_empty());
            assert_eq!(list.peek_oldest(), None);
        }
        assert_eq!(list.capacity(), 3);
    }

    #[test]
    fn test_clear_shrinks_to_initial_capacity() {
        let mut list = EvictionList::<u32>::new(2);
        for k in 0..10 {
            list.insert_at_head(k);
        }
        assert_eq!(list.capacity(), 10);

        list.clear();
        assert!(list.is_empty());
        assert!(!list.contains(&3));
        assert_eq!(list.capacity(), 2);

        // Still usable, and growing again past the initial nodes.
        for k in 0..3 {
            assert!(list.insert_at_head(k));
        }
        assert_eq!(list.iter().copied().collect::<Vec<_>>(), vec![2, 1, 0]);
        assert_eq!(list.capacity(), 3);
    }
}
