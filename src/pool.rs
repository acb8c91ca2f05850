//! Object pool with an enforced reset contract.
//!
//! Every request needs a [`Context`](crate::Context): a request view with
//! three maps, a response with a header map, and an error slot. Allocating
//! those per request is wasted work when the previous request's maps are
//! sitting there with their capacity intact, so contexts are recycled.
//!
//! Recycling is only safe if nothing from the previous request survives.
//! The pool owns that guarantee: [`Poolable::reset`] runs inside the pool
//! when a [`Pooled`] guard drops, not at the caller's discretion, and the
//! guard's lifetime makes touching a released object a compile error.
//!
//! ```text
//! pool.acquire()  ──►  Pooled<Context>  ──►  chain runs, response written
//!                                                   │
//!        free list  ◄──  reset()  ◄──  guard dropped ┘
//! ```

use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, PoisonError};

/// A type that can be returned to a [`Pool`].
///
/// `reset` must leave the value indistinguishable from `T::default()` as far
/// as any reader can tell: clear map and buffer contents, not just the
/// handles to them. Keeping allocated capacity is the point.
pub trait Poolable: Default + Send {
    fn reset(&mut self);
}

/// A bounded, thread-safe free list of `T`.
///
/// At most `max_idle` objects are kept; anything released beyond that is
/// dropped. The pool holds no per-request state, only idle objects.
pub struct Pool<T: Poolable> {
    free: Mutex<Vec<Box<T>>>,
    max_idle: usize,
}

impl<T: Poolable> Pool<T> {
    pub fn new(max_idle: usize) -> Self {
        Self { free: Mutex::new(Vec::new()), max_idle }
    }

    /// Takes an idle object, or allocates a fresh one when the list is empty.
    ///
    /// Either way the value reads as `T::default()`.
    pub fn acquire(&self) -> Pooled<'_, T> {
        let recycled = self.free.lock().unwrap_or_else(PoisonError::into_inner).pop();
        Pooled {
            pool: self,
            value: Some(recycled.unwrap_or_default()),
        }
    }

    /// Number of idle objects waiting to be reused.
    pub fn idle(&self) -> usize {
        self.free.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn release(&self, mut value: Box<T>) {
        value.reset();
        let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
        if free.len() < self.max_idle {
            free.push(value);
        }
    }
}

impl<T: Poolable> Default for Pool<T> {
    fn default() -> Self { Self::new(1024) }
}

/// Exclusive handle to a pooled object. Dropping it releases the object.
pub struct Pooled<'p, T: Poolable> {
    pool: &'p Pool<T>,
    // `None` only between `take` in `drop` and the end of `drop`.
    value: Option<Box<T>>,
}

impl<T: Poolable> Deref for Pooled<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.value.as_deref().unwrap_or_else(|| unreachable!("pooled value taken before drop"))
    }
}

impl<T: Poolable> DerefMut for Pooled<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.value.as_deref_mut().unwrap_or_else(|| unreachable!("pooled value taken before drop"))
    }
}

impl<T: Poolable> Drop for Pooled<'_, T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            self.pool.release(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use super::*;

    #[derive(Default)]
    struct Scratch {
        code: u16,
        payload: Vec<u8>,
        headers: HashMap<String, String>,
    }

    impl Poolable for Scratch {
        fn reset(&mut self) {
            self.code = 0;
            self.payload.clear();
            self.headers.clear();
        }
    }

    #[test]
    fn released_objects_come_back_clean() {
        let pool = Pool::<Scratch>::new(4);

        let first_addr = {
            let mut s = pool.acquire();
            s.code = 201;
            s.payload.extend_from_slice(b"secret");
            s.headers.insert("x-user".into(), "alice".into());
            &*s as *const Scratch as usize
        };
        assert_eq!(pool.idle(), 1);

        let s = pool.acquire();
        assert_eq!(&*s as *const Scratch as usize, first_addr, "object was not reused");
        assert_eq!(s.code, 0);
        assert!(s.payload.is_empty());
        assert!(s.headers.is_empty());
        assert!(s.headers.capacity() > 0, "capacity should survive the reset");
    }

    #[test]
    fn idle_list_is_bounded() {
        let pool = Pool::<Scratch>::new(2);
        let held: Vec<_> = (0..5).map(|_| pool.acquire()).collect();
        assert_eq!(pool.idle(), 0);
        drop(held);
        assert_eq!(pool.idle(), 2);
    }

    #[test]
    fn concurrent_acquire_release() {
        let pool = Arc::new(Pool::<Scratch>::new(64));
        let workers: Vec<_> = (0..8)
            .map(|i| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || {
                    for n in 0..1_000u16 {
                        let mut s = pool.acquire();
                        assert_eq!(s.code, 0);
                        assert!(s.headers.is_empty());
                        s.code = n;
                        s.headers.insert(format!("w{i}"), n.to_string());
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }
        assert!(pool.idle() <= 8);
    }
}
