//! Queued asynchronous acquisitions.
//!
//! The cache never suspends, so "asynchronous" here means deferred: a caller registers a request, and whatever loop
//! drives the application later pumps [crate::ResourceCache::process_pending], which performs one acquisition per
//! request and hands the result to the request's callback.  Requests can't be cancelled; a callback which no longer
//! wants the resource returns the handle, and the cache releases it before moving on to the next request.
use std::any::Any;
use std::collections::VecDeque;

use crate::*;

/// Identifies a request passed to [crate::ResourceCache::request_async].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct RequestId(u64);

/// Opaque values passed through to the completion callback untouched.
#[derive(Default)]
pub struct CompletionParams {
    pub param1: Option<Box<dyn Any>>,
    pub param2: Option<Box<dyn Any>>,
    pub param3: Option<Box<dyn Any>>,
}

impl std::fmt::Debug for CompletionParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionParams")
            .field("param1", &self.param1.is_some())
            .field("param2", &self.param2.is_some())
            .field("param3", &self.param3.is_some())
            .finish()
    }
}

/// Called once with the requested path, the result of acquiring it, and the request's params.
///
/// Return the handle to have the cache release it, or `None` to keep it.
pub type CompletionCallback<O, E> = Box<
    dyn FnOnce(&str, Result<ResourceHandle<O>, CacheError<E>>, CompletionParams) -> Option<ResourceHandle<O>>,
>;

pub(crate) struct PendingRequest<O, E> {
    pub(crate) id: Option<RequestId>,
    pub(crate) path: String,
    pub(crate) callback: Option<CompletionCallback<O, E>>,
    pub(crate) params: CompletionParams,
}

impl<O, E> Default for PendingRequest<O, E> {
    fn default() -> Self {
        PendingRequest {
            id: None,
            path: String::new(),
            callback: None,
            params: Default::default(),
        }
    }
}

impl<O, E> PendingRequest<O, E> {
    fn reset(&mut self) {
        self.id = None;
        self.path.clear();
        self.callback = None;
        self.params = Default::default();
    }
}

/// FIFO of requests, with the request records themselves pooled.
pub(crate) struct PendingQueue<O, E> {
    queue: VecDeque<PendingRequest<O, E>>,
    pool: ObjectPool<PendingRequest<O, E>>,
    next_id: u64,
}

impl<O, E> PendingQueue<O, E> {
    pub(crate) fn new(pool_size: usize) -> PendingQueue<O, E> {
        PendingQueue {
            queue: VecDeque::new(),
            pool: ObjectPool::new(pool_size),
            next_id: 0,
        }
    }

    pub(crate) fn push(
        &mut self,
        path: &str,
        callback: CompletionCallback<O, E>,
        params: CompletionParams,
    ) -> RequestId {
        let id = RequestId(self.next_id);
        self.next_id += 1;

        let mut request = self.pool.spawn(true).unwrap_or_default();
        request.id = Some(id);
        request.path.push_str(path);
        request.callback = Some(callback);
        request.params = params;
        self.queue.push_back(request);
        id
    }

    pub(crate) fn pop(&mut self) -> Option<PendingRequest<O, E>> {
        self.queue.pop_front()
    }

    /// Hand a completed request's record back to the pool.
    pub(crate) fn finish(&mut self, mut request: PendingRequest<O, E>) {
        request.reset();
        self.pool.recycle(request);
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }

    pub(crate) fn contains(&self, id: RequestId) -> bool {
        self.queue.iter().any(|r| r.id == Some(id))
    }

    #[cfg(test)]
    pub(crate) fn pooled_records(&self) -> usize {
        self.pool.available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_and_recycling() {
        let mut queue = PendingQueue::<String, std::io::Error>::new(1);
        let a = queue.push("a", Box::new(|_: &str, _, _| None), Default::default());
        let b = queue.push("b", Box::new(|_: &str, _, _| None), Default::default());
        assert_ne!(a, b);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pooled_records(), 0);
        assert!(queue.contains(b));

        let first = queue.pop().unwrap();
        assert_eq!(first.path, "a");
        assert_eq!(first.id, Some(a));
        queue.finish(first);
        assert_eq!(queue.pooled_records(), 1);
        assert!(!queue.contains(a));

        // The pool is full, so the second record is simply dropped.
        let second = queue.pop().unwrap();
        assert_eq!(second.path, "b");
        queue.finish(second);
        assert_eq!(queue.pooled_records(), 1);
        assert!(queue.pop().is_none());
    }
}
