//! Same-thread promise

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use st_protocol::RemoteError;

use super::{guarded, require, surface, Outcome, Promise, Role};
use crate::error::PromiseError;

type Callback<T> = Box<dyn FnOnce(&Outcome<T>)>;

struct Inner<T> {
    outcome: Option<Outcome<T>>,
    callbacks: Vec<Callback<T>>,
}

/// Promise whose owner and peer live on one thread.
///
/// Callbacks run synchronously inside `resolve`/`throw`. Waiting on a pending
/// local promise cannot succeed, so it fails right away.
pub struct LocalPromise<T> {
    role: Role,
    inner: Rc<RefCell<Inner<T>>>,
}

impl<T> LocalPromise<T> {
    /// Create a pending promise, returning the owner handle
    pub fn new() -> Self {
        Self {
            role: Role::Owner,
            inner: Rc::new(RefCell::new(Inner {
                outcome: None,
                callbacks: Vec::new(),
            })),
        }
    }

    /// A peer handle settling this promise
    pub fn peer(&self) -> Self {
        Self {
            role: Role::Peer,
            inner: Rc::clone(&self.inner),
        }
    }

    fn settle(&self, outcome: Outcome<T>) -> Result<(), PromiseError> {
        require(self.role, Role::Peer, "settle")?;

        let callbacks = {
            let mut inner = self.inner.borrow_mut();
            if inner.outcome.is_some() {
                return Err(PromiseError::AlreadySettled);
            }
            inner.outcome = Some(outcome);
            std::mem::take(&mut inner.callbacks)
        };

        let inner = self.inner.borrow();
        if let Some(outcome) = inner.outcome.as_ref() {
            for callback in callbacks {
                guarded(|| callback(outcome));
            }
        }
        Ok(())
    }
}

impl<T> Default for LocalPromise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + 'static> Promise<T> for LocalPromise<T> {
    fn role(&self) -> Role {
        self.role
    }

    fn resolve(&self, value: T) -> Result<(), PromiseError> {
        self.settle(Ok(value))
    }

    fn throw(&self, error: RemoteError) -> Result<(), PromiseError> {
        self.settle(Err(error))
    }

    fn wait(&self, timeout: Option<Duration>) -> Result<T, PromiseError> {
        require(self.role, Role::Owner, "wait")?;
        match self.inner.borrow().outcome.as_ref() {
            Some(outcome) => surface(outcome),
            None => match timeout {
                Some(timeout) => Err(PromiseError::Timeout(timeout)),
                None => Err(PromiseError::WouldBlock),
            },
        }
    }

    fn fulfilled(&self) -> bool {
        self.inner.borrow().outcome.is_some()
    }

    fn has_failed(&self) -> Option<bool> {
        self.inner.borrow().outcome.as_ref().map(Result::is_err)
    }

    fn then<F>(&self, callback: F) -> Result<(), PromiseError>
    where
        F: FnOnce(&Outcome<T>) + Send + 'static,
    {
        require(self.role, Role::Owner, "then")?;

        let mut inner = self.inner.borrow_mut();
        if inner.outcome.is_none() {
            inner.callbacks.push(Box::new(callback));
            return Ok(());
        }
        drop(inner);

        let inner = self.inner.borrow();
        if let Some(outcome) = inner.outcome.as_ref() {
            guarded(|| callback(outcome));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_owner_cannot_resolve() {
        let promise = LocalPromise::<i64>::new();
        assert!(matches!(
            promise.resolve(1),
            Err(PromiseError::WrongRole { role: Role::Owner, .. })
        ));
        assert!(!promise.fulfilled());
    }

    #[test]
    fn test_peer_cannot_wait() {
        let promise = LocalPromise::<i64>::new();
        let peer = promise.peer();
        peer.resolve(5).unwrap();
        assert!(matches!(peer.wait(None), Err(PromiseError::WrongRole { .. })));
        assert_eq!(promise.wait(None).unwrap(), 5);
    }

    #[test]
    fn test_single_assignment() {
        let promise = LocalPromise::<i64>::new();
        let peer = promise.peer();
        peer.resolve(1).unwrap();
        assert!(matches!(peer.resolve(2), Err(PromiseError::AlreadySettled)));
        assert!(matches!(
            peer.throw(RemoteError::execution("late")),
            Err(PromiseError::AlreadySettled)
        ));
        assert_eq!(promise.wait(None).unwrap(), 1);
        assert_eq!(promise.has_failed(), Some(false));
    }

    #[test]
    fn test_callbacks_run_on_settle() {
        let promise = LocalPromise::<i64>::new();
        let seen = Arc::new(AtomicI64::new(0));

        let sink = Arc::clone(&seen);
        promise
            .then(move |outcome| {
                sink.store(*outcome.as_ref().unwrap(), Ordering::SeqCst);
            })
            .unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 0);

        promise.peer().resolve(9).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 9);

        // Attached after settlement: runs immediately
        let sink = Arc::clone(&seen);
        promise.then(move |_| sink.store(-1, Ordering::SeqCst)).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), -1);
    }

    #[test]
    fn test_pending_wait_does_not_block() {
        let promise = LocalPromise::<i64>::new();
        assert!(matches!(promise.wait(None), Err(PromiseError::WouldBlock)));
        assert!(matches!(
            promise.wait(Some(Duration::from_millis(1))),
            Err(PromiseError::Timeout(_))
        ));
        assert_eq!(promise.try_wait(Some(Duration::from_millis(1))).unwrap(), None);
        assert_eq!(promise.has_failed(), None);
    }

    #[test]
    fn test_panicking_callback_is_contained() {
        let promise = LocalPromise::<i64>::new();
        promise.then(|_| panic!("boom")).unwrap();
        promise.peer().throw(RemoteError::execution("failed")).unwrap();

        match promise.wait(None) {
            Err(PromiseError::Rejected(err)) => assert_eq!(err.message, "failed"),
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }
}
