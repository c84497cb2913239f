//! A fixed-capacity free list of reusable bookkeeping objects.
//!
//! The pool is used for the small records the cache churns through under load: loaded-bundle handles and pending
//! async requests.  Objects are never reset by the pool itself; callers clear whatever they put in before recycling.

/// Reusable-object pool with an optional upper bound on how many idle objects it keeps.
#[derive(Debug)]
pub struct ObjectPool<T> {
    free: Vec<T>,
    /// Upper bound on idle objects; 0 means unbounded.
    max_count: usize,
    /// Objects handed out and not yet recycled.  Only for diagnostics.
    outstanding: usize,
}

impl<T: Default> ObjectPool<T> {
    /// Build a pool holding `max_count` fresh objects.  A `max_count` of 0 starts empty and never discards.
    pub fn new(max_count: usize) -> ObjectPool<T> {
        let mut free = Vec::with_capacity(max_count);
        free.resize_with(max_count, T::default);
        ObjectPool {
            free,
            max_count,
            outstanding: 0,
        }
    }

    /// Take an object out of the pool.
    ///
    /// If the pool is empty, a new object is built when `create_if_empty` is set; otherwise this returns `None`.
    pub fn spawn(&mut self, create_if_empty: bool) -> Option<T> {
        let obj = match self.free.pop() {
            Some(x) => x,
            None if create_if_empty => T::default(),
            None => return None,
        };
        self.outstanding += 1;
        Some(obj)
    }

    /// Give an object back.  Returns `false` and drops it if the pool is already full.
    pub fn recycle(&mut self, obj: T) -> bool {
        if self.max_count > 0 && self.free.len() >= self.max_count {
            return false;
        }
        self.free.push(obj);
        self.outstanding = self.outstanding.saturating_sub(1);
        true
    }

    /// Number of idle objects ready to be spawned.
    pub fn available(&self) -> usize {
        self.free.len()
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    pub fn max_count(&self) -> usize {
        self.max_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded_pool() {
        let mut pool = ObjectPool::<Vec<u8>>::new(2);
        assert_eq!(pool.available(), 2);

        let spawned = (0..3)
            .map(|_| pool.spawn(true).expect("Should always spawn"))
            .collect::<Vec<_>>();
        assert_eq!(pool.outstanding(), 3);
        assert_eq!(pool.available(), 0);

        let kept = spawned
            .into_iter()
            .map(|x| pool.recycle(x))
            .collect::<Vec<_>>();
        assert_eq!(kept, vec![true, true, false]);
        assert_eq!(pool.available(), 2);
        assert_eq!(pool.outstanding(), 1);
    }

    #[test]
    fn test_empty_pool_without_create() {
        let mut pool = ObjectPool::<String>::new(1);
        assert!(pool.spawn(false).is_some());
        assert!(pool.spawn(false).is_none());
        assert_eq!(pool.outstanding(), 1);
    }

    // A zero bound starts empty and keeps everything handed back.
    #[test]
    fn test_unbounded_pool() {
        let mut pool = ObjectPool::<u32>::new(0);
        assert_eq!(pool.available(), 0);
        assert!(pool.spawn(false).is_none());

        for i in 0..10 {
            let x = pool.spawn(true).unwrap();
            assert!(pool.recycle(x + i));
        }
        for i in 0..10 {
            assert!(pool.recycle(i));
        }
        assert_eq!(pool.available(), 11);
    }
}
