//! Cross-thread promise

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Condvar, Mutex};
use std::task::{Context, Poll, Waker};
use std::thread;
use std::time::{Duration, Instant};

use st_protocol::RemoteError;

use super::{guarded, require, surface, Outcome, Promise, Role};
use crate::error::PromiseError;
use crate::sync::lock;

type Callback<T> = Box<dyn FnOnce(&Outcome<T>) + Send>;

struct Inner<T> {
    outcome: Option<Outcome<T>>,
    callbacks: Vec<Callback<T>>,
    helper_running: bool,
    wakers: Vec<Waker>,
}

struct Shared<T> {
    inner: Mutex<Inner<T>>,
    settled: Condvar,
}

/// Promise settled by another thread.
///
/// The owner blocks on a condition variable in [`wait`](Promise::wait) or
/// awaits it as a [`Future`]. The first `then` starts one helper thread that
/// waits for settlement and runs every callback in attachment order.
pub struct ThreadPromise<T> {
    role: Role,
    shared: Arc<Shared<T>>,
}

impl<T> ThreadPromise<T> {
    /// Create a pending promise, returning the owner handle
    pub fn new() -> Self {
        Self {
            role: Role::Owner,
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    outcome: None,
                    callbacks: Vec::new(),
                    helper_running: false,
                    wakers: Vec::new(),
                }),
                settled: Condvar::new(),
            }),
        }
    }

    /// An owner handle that has already failed with `error`
    pub fn failed(error: RemoteError) -> Self {
        let promise = Self::new();
        lock(&promise.shared.inner).outcome = Some(Err(error));
        promise
    }

    /// A peer handle settling this promise
    pub fn peer(&self) -> Self {
        Self {
            role: Role::Peer,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Whether both handles refer to the same promise
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    fn settle(&self, outcome: Outcome<T>) -> Result<(), PromiseError> {
        require(self.role, Role::Peer, "settle")?;

        let wakers = {
            let mut inner = lock(&self.shared.inner);
            if inner.outcome.is_some() {
                return Err(PromiseError::AlreadySettled);
            }
            inner.outcome = Some(outcome);
            std::mem::take(&mut inner.wakers)
        };

        self.shared.settled.notify_all();
        for waker in wakers {
            waker.wake();
        }
        Ok(())
    }
}

impl<T: Clone + Send + 'static> ThreadPromise<T> {
    fn start_helper(&self) -> Result<(), PromiseError> {
        let shared = Arc::clone(&self.shared);
        thread::Builder::new()
            .name("promise-then".into())
            .spawn(move || run_helper(&shared))
            .map(|_| ())
            .map_err(PromiseError::Spawn)
    }
}

impl<T> Clone for ThreadPromise<T> {
    fn clone(&self) -> Self {
        Self {
            role: self.role,
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Default for ThreadPromise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for ThreadPromise<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = lock(&self.shared.inner);
        f.debug_struct("ThreadPromise")
            .field("role", &self.role)
            .field("settled", &inner.outcome.is_some())
            .finish()
    }
}

/// Wait for settlement, then drain callbacks until none are left
fn run_helper<T: Clone>(shared: &Shared<T>) {
    let mut inner = lock(&shared.inner);
    while inner.outcome.is_none() {
        inner = shared
            .settled
            .wait(inner)
            .unwrap_or_else(std::sync::PoisonError::into_inner);
    }

    loop {
        let callbacks = std::mem::take(&mut inner.callbacks);
        if callbacks.is_empty() {
            inner.helper_running = false;
            return;
        }

        let Some(outcome) = inner.outcome.clone() else {
            inner.helper_running = false;
            return;
        };
        drop(inner);
        for callback in callbacks {
            guarded(|| callback(&outcome));
        }
        inner = lock(&shared.inner);
    }
}

impl<T: Clone + Send + 'static> Promise<T> for ThreadPromise<T> {
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

        let deadline = timeout.map(|t| Instant::now() + t);
        let mut inner = lock(&self.shared.inner);
        loop {
            if let Some(outcome) = inner.outcome.as_ref() {
                return surface(outcome);
            }

            inner = match deadline {
                None => self
                    .shared
                    .settled
                    .wait(inner)
                    .unwrap_or_else(std::sync::PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(PromiseError::Timeout(timeout.unwrap_or_default()));
                    }
                    self.shared
                        .settled
                        .wait_timeout(inner, deadline - now)
                        .unwrap_or_else(std::sync::PoisonError::into_inner)
                        .0
                }
            };
        }
    }

    fn fulfilled(&self) -> bool {
        lock(&self.shared.inner).outcome.is_some()
    }

    fn has_failed(&self) -> Option<bool> {
        lock(&self.shared.inner).outcome.as_ref().map(Result::is_err)
    }

    fn then<F>(&self, callback: F) -> Result<(), PromiseError>
    where
        F: FnOnce(&Outcome<T>) + Send + 'static,
    {
        require(self.role, Role::Owner, "then")?;

        let mut inner = lock(&self.shared.inner);
        inner.callbacks.push(Box::new(callback));
        if inner.helper_running {
            return Ok(());
        }
        inner.helper_running = true;
        drop(inner);

        if let Err(e) = self.start_helper() {
            lock(&self.shared.inner).helper_running = false;
            return Err(e);
        }
        Ok(())
    }
}

impl<T: Clone> Future for ThreadPromise<T> {
    type Output = Result<T, PromiseError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Err(e) = require(self.role, Role::Owner, "await") {
            return Poll::Ready(Err(e));
        }

        let mut inner = lock(&self.shared.inner);
        if let Some(outcome) = inner.outcome.as_ref() {
            return Poll::Ready(surface(outcome));
        }
        if !inner.wakers.iter().any(|w| w.will_wake(cx.waker())) {
            inner.wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    #[test]
    fn test_resolve_from_other_thread() {
        let promise = ThreadPromise::<i64>::new();
        let peer = promise.peer();

        let handle = thread::spawn(move || peer.resolve(80));
        assert_eq!(promise.wait(Some(Duration::from_secs(5))).unwrap(), 80);
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn test_owner_resolve_rejected_peer_succeeds_once() {
        let promise = ThreadPromise::<i64>::new();
        assert!(matches!(promise.resolve(1), Err(PromiseError::WrongRole { .. })));

        let peer = promise.peer();
        let first = thread::spawn(move || {
            let a = peer.resolve(2);
            let b = peer.resolve(3);
            (a.is_ok(), matches!(b, Err(PromiseError::AlreadySettled)))
        })
        .join()
        .unwrap();

        assert_eq!(first, (true, true));
        assert_eq!(promise.wait(None).unwrap(), 2);
    }

    #[test]
    fn test_wait_timeout() {
        let promise = ThreadPromise::<i64>::new();
        let started = Instant::now();
        assert!(matches!(
            promise.wait(Some(Duration::from_millis(20))),
            Err(PromiseError::Timeout(_))
        ));
        assert!(started.elapsed() >= Duration::from_millis(20));
        assert_eq!(promise.try_wait(Some(Duration::from_millis(1))).unwrap(), None);
    }

    #[test]
    fn test_failed_pseudo_future() {
        let promise = ThreadPromise::<i64>::failed(RemoteError::transport("write failed"));
        assert!(promise.fulfilled());
        assert_eq!(promise.has_failed(), Some(true));
        match promise.wait(None) {
            Err(PromiseError::Rejected(err)) => assert_eq!(err.message, "write failed"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_then_runs_in_order_on_helper() {
        let promise = ThreadPromise::<i64>::new();
        let (tx, rx) = mpsc::channel();

        for tag in 0..3 {
            let tx = tx.clone();
            promise
                .then(move |outcome| {
                    tx.send((tag, outcome.clone().unwrap())).unwrap();
                })
                .unwrap();
        }

        promise.peer().resolve(7).unwrap();
        let got: Vec<_> = (0..3)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        assert_eq!(got, vec![(0, 7), (1, 7), (2, 7)]);
    }

    #[test]
    fn test_then_after_settlement_still_runs() {
        let promise = ThreadPromise::<i64>::new();
        promise.peer().resolve(1).unwrap();

        let (tx, rx) = mpsc::channel();
        promise.then(move |_| tx.send(()).unwrap()).unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn test_panicking_callback_does_not_stop_others() {
        let promise = ThreadPromise::<i64>::new();
        let count = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel();

        promise.then(|_| panic!("boom")).unwrap();
        let seen = Arc::clone(&count);
        promise
            .then(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
                tx.send(()).unwrap();
            })
            .unwrap();

        promise.peer().resolve(0).unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_peer_cannot_attach_callbacks() {
        let promise = ThreadPromise::<i64>::new();
        assert!(matches!(
            promise.peer().then(|_| {}),
            Err(PromiseError::WrongRole { role: Role::Peer, .. })
        ));
    }

    #[tokio::test]
    async fn test_await_resolves() {
        let promise = ThreadPromise::<String>::new();
        let peer = promise.peer();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            peer.resolve("done".to_string()).unwrap();
        });

        assert_eq!(promise.await.unwrap(), "done");
    }
}
