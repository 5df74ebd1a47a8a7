//! Cross-process promise

use std::fs::File;
use std::io::{Read, Write};
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use serde::de::DeserializeOwned;
use serde::Serialize;
use st_protocol::{MessageCodec, RemoteError};
use tokio_util::codec::{Decoder, Encoder};

use super::{guarded, require, surface, Outcome, Promise, Role};
use crate::error::{PromiseError, TransportError};
use crate::sync::lock;
use crate::sys;

/// Poll interval of the owner's read end
const POLL_INTERVAL: Duration = Duration::from_micros(50);

type Callback<T> = Box<dyn FnOnce(&Outcome<T>) + Send>;

/// The write end of a [`ProcessPromise`] on its way to a child process.
///
/// While the token lives the descriptor is inheritable, so spawn the child,
/// pass it [`raw`](Self::raw) and drop the token. Dropping closes the
/// parent's copy; from then on the child holds the only write end and its
/// exit without settling fails the owner.
#[derive(Debug)]
pub struct ProcessPromiseToken {
    file: File,
    raw: u64,
}

impl ProcessPromiseToken {
    /// Descriptor (or handle) value as seen by the child
    pub fn raw(&self) -> u64 {
        self.raw
    }

    /// Release the write end without closing it, for a hand-off arranged
    /// by the caller
    pub fn into_raw(self) -> u64 {
        sys::into_raw(self.file)
    }
}

struct OwnerSide<T> {
    file: File,
    buf: BytesMut,
    outcome: Option<Outcome<T>>,
    callbacks: Vec<Callback<T>>,
    helper_running: bool,
}

impl<T: DeserializeOwned> OwnerSide<T> {
    /// Drain the read end; returns whether the promise has settled
    fn poll(&mut self) -> bool {
        if self.outcome.is_some() {
            return true;
        }

        let outcome = match self.pull() {
            Ok(Some(outcome)) => outcome,
            Ok(None) => return false,
            Err(e) => Err(RemoteError::from(&e)),
        };
        self.outcome = Some(outcome);
        true
    }

    fn pull(&mut self) -> Result<Option<Outcome<T>>, TransportError> {
        let mut codec = MessageCodec::<Outcome<T>>::new();
        loop {
            if let Some(outcome) = codec.decode(&mut self.buf)? {
                return Ok(Some(outcome));
            }

            let available = match sys::file_available(&self.file)? {
                Some(0) => return Ok(None),
                Some(n) => n,
                None => return Err(TransportError::BrokenPipe),
            };
            let start = self.buf.len();
            self.buf.resize(start + available, 0);
            let n = self.file.read(&mut self.buf[start..])?;
            self.buf.truncate(start + n);
            if n == 0 {
                return Err(TransportError::BrokenPipe);
            }
        }
    }
}

/// Promise settled by another process.
///
/// The two sides are linked by an anonymous pipe. Settling writes one frame
/// holding the outcome and closes the write end; the owner polls the read
/// end. Hand the peer side to a child with [`peer_token`](Self::peer_token)
/// and rebuild it there with [`adopt`](Self::adopt).
pub struct ProcessPromise<T> {
    role: Role,
    owner: Option<Arc<Mutex<OwnerSide<T>>>>,
    writer: Arc<Mutex<Option<File>>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ProcessPromise<T> {
    /// Create a pending promise, returning the owner handle
    pub fn new() -> Result<Self, PromiseError> {
        let (read, write) = sys::anonymous_pipe().map_err(TransportError::from)?;
        Ok(Self {
            role: Role::Owner,
            owner: Some(Arc::new(Mutex::new(OwnerSide {
                file: read,
                buf: BytesMut::new(),
                outcome: None,
                callbacks: Vec::new(),
                helper_running: false,
            }))),
            writer: Arc::new(Mutex::new(Some(write))),
            _marker: PhantomData,
        })
    }

    /// An in-process peer handle settling this promise
    pub fn peer(&self) -> Self {
        Self {
            role: Role::Peer,
            owner: None,
            writer: Arc::clone(&self.writer),
            _marker: PhantomData,
        }
    }

    /// Move the write end into a token for a child process.
    ///
    /// In-process peers lose the ability to settle; a second call fails with
    /// [`PromiseError::AlreadySettled`].
    pub fn peer_token(&self) -> Result<ProcessPromiseToken, PromiseError> {
        require(self.role, Role::Owner, "peer_token")?;
        let mut writer = lock(&self.writer);
        let file = writer.take().ok_or(PromiseError::AlreadySettled)?;
        match sys::make_inheritable(&file) {
            Ok(raw) => Ok(ProcessPromiseToken { file, raw }),
            Err(e) => {
                *writer = Some(file);
                Err(TransportError::from(e).into())
            }
        }
    }

    /// Rebuild the peer side from a [`ProcessPromiseToken::raw`] value
    /// received from the owner.
    ///
    /// # Safety
    ///
    /// `raw` must name a write end inherited by this process (or released
    /// with [`ProcessPromiseToken::into_raw`]) and not already adopted.
    pub unsafe fn adopt(raw: u64) -> Self {
        Self {
            role: Role::Peer,
            owner: None,
            writer: Arc::new(Mutex::new(Some(sys::file_from_raw(raw)))),
            _marker: PhantomData,
        }
    }

    fn owner_side(&self, operation: &'static str) -> Result<&Arc<Mutex<OwnerSide<T>>>, PromiseError> {
        require(self.role, Role::Owner, operation)?;
        self.owner.as_ref().ok_or(PromiseError::WrongRole {
            operation,
            role: self.role,
        })
    }
}

impl<T: Serialize> ProcessPromise<T> {
    fn settle(&self, outcome: Outcome<T>) -> Result<(), PromiseError> {
        require(self.role, Role::Peer, "settle")?;

        let mut file = lock(&self.writer)
            .take()
            .ok_or(PromiseError::AlreadySettled)?;
        let mut frame = BytesMut::new();
        MessageCodec::<Outcome<T>>::new()
            .encode(&outcome, &mut frame)
            .map_err(TransportError::from)?;
        file.write_all(&frame).map_err(TransportError::from)?;
        file.flush().map_err(TransportError::from)?;
        Ok(())
    }
}

fn run_helper<T: DeserializeOwned + Clone>(side: &Mutex<OwnerSide<T>>) {
    loop {
        let mut state = lock(side);
        if !state.poll() {
            drop(state);
            thread::sleep(POLL_INTERVAL);
            continue;
        }

        let callbacks = std::mem::take(&mut state.callbacks);
        let outcome = state.outcome.clone();
        match (callbacks.is_empty(), outcome) {
            (false, Some(outcome)) => {
                drop(state);
                for callback in callbacks {
                    guarded(|| callback(&outcome));
                }
            }
            _ => {
                state.helper_running = false;
                return;
            }
        }
    }
}

impl<T> Promise<T> for ProcessPromise<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + 'static,
{
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
        let side = self.owner_side("wait")?;
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            {
                let mut state = lock(side);
                if state.poll() {
                    if let Some(outcome) = state.outcome.as_ref() {
                        return surface(outcome);
                    }
                }
            }

            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return Err(PromiseError::Timeout(timeout.unwrap_or_default()));
                }
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    fn fulfilled(&self) -> bool {
        match self.owner.as_ref() {
            Some(side) => lock(side).poll(),
            None => lock(&self.writer).is_none(),
        }
    }

    fn has_failed(&self) -> Option<bool> {
        let side = self.owner.as_ref()?;
        let mut state = lock(side);
        state.poll();
        state.outcome.as_ref().map(Result::is_err)
    }

    fn then<F>(&self, callback: F) -> Result<(), PromiseError>
    where
        F: FnOnce(&Outcome<T>) + Send + 'static,
    {
        let side = self.owner_side("then")?;

        let mut state = lock(side);
        state.callbacks.push(Box::new(callback));
        if state.helper_running {
            return Ok(());
        }
        state.helper_running = true;
        drop(state);

        let shared = Arc::clone(side);
        let spawned = thread::Builder::new()
            .name("process-promise-then".into())
            .spawn(move || run_helper(&shared));
        if let Err(e) = spawned {
            lock(side).helper_running = false;
            return Err(PromiseError::Spawn(e));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_peer_resolves_owner_reads() {
        let promise = ProcessPromise::<String>::new().unwrap();
        let peer = promise.peer();

        thread::spawn(move || peer.resolve("from peer".to_string()).unwrap());
        assert_eq!(
            promise.wait(Some(Duration::from_secs(5))).unwrap(),
            "from peer"
        );
        assert!(promise.fulfilled());
        assert_eq!(promise.has_failed(), Some(false));
    }

    #[test]
    fn test_roles_enforced() {
        let promise = ProcessPromise::<i64>::new().unwrap();
        assert!(matches!(promise.resolve(1), Err(PromiseError::WrongRole { .. })));
        assert!(matches!(
            promise.peer().wait(None),
            Err(PromiseError::WrongRole { role: Role::Peer, .. })
        ));
    }

    #[test]
    fn test_second_settlement_rejected() {
        let promise = ProcessPromise::<i64>::new().unwrap();
        let peer = promise.peer();
        peer.throw(RemoteError::execution("first")).unwrap();
        assert!(matches!(peer.resolve(2), Err(PromiseError::AlreadySettled)));
        assert!(peer.fulfilled());

        match promise.wait(Some(Duration::from_secs(5))) {
            Err(PromiseError::Rejected(err)) => assert_eq!(err.message, "first"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_adopted_token_settles() {
        let promise = ProcessPromise::<i64>::new().unwrap();
        let token = promise.peer_token().unwrap();
        // SAFETY: the descriptor was released by the token and is adopted once
        let peer = unsafe { ProcessPromise::<i64>::adopt(token.into_raw()) };
        peer.resolve(254).unwrap();
        assert_eq!(promise.wait(Some(Duration::from_secs(5))).unwrap(), 254);
    }

    #[test]
    fn test_dropped_token_fails_owner() {
        let promise = ProcessPromise::<i64>::new().unwrap();
        drop(promise.peer_token().unwrap());

        match promise.wait(Some(Duration::from_secs(5))) {
            Err(PromiseError::Rejected(err)) => {
                assert_eq!(err.kind, st_protocol::RemoteErrorKind::ConnectionAborted)
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_peer_token_moves_write_end() {
        let promise = ProcessPromise::<i64>::new().unwrap();
        let peer = promise.peer();
        let _token = promise.peer_token().unwrap();

        assert!(matches!(
            promise.peer_token(),
            Err(PromiseError::AlreadySettled)
        ));
        assert!(matches!(peer.resolve(1), Err(PromiseError::AlreadySettled)));
    }

    #[test]
    fn test_pending_times_out() {
        let promise = ProcessPromise::<i64>::new().unwrap();
        assert_eq!(promise.try_wait(Some(Duration::from_millis(5))).unwrap(), None);
        assert_eq!(promise.has_failed(), None);
    }

    #[test]
    fn test_then_on_helper_thread() {
        let promise = ProcessPromise::<i64>::new().unwrap();
        let (tx, rx) = mpsc::channel();
        promise
            .then(move |outcome| tx.send(outcome.clone()).unwrap())
            .unwrap();

        promise.peer().resolve(3).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), Ok(3));
    }
}
