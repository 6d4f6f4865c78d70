use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use secret_client_crypto::DhKeyPair;
use tokio::{select, sync::watch};
use tokio_util::sync::CancellationToken;

use super::{Algorithm, Session};
use crate::{
    error::{Error, Result},
    operation,
    transport::{MethodCall, Transport, SERVICE_INTERFACE, SESSION_INTERFACE},
    wire::{WireValue, NO_OBJECT},
};

/// Outcome of a negotiation as seen by the callers waiting on it. `None` until it completes.
type Outcome = Option<Result<Arc<Session>>>;

enum SessionState {
    Idle,
    Pending(watch::Receiver<Outcome>),
    Ready(Arc<Session>),
}

enum Next {
    Ready(Arc<Session>),
    Wait(watch::Receiver<Outcome>),
    Negotiate(watch::Sender<Outcome>),
}

/// Negotiates the transfer session with the service and caches it.
///
/// At most one negotiation runs at a time. Callers that ask for a session while one is in
/// flight wait for that negotiation and receive its result, success or failure.
pub struct SessionManager<T: Transport> {
    transport: Arc<T>,
    service_path: String,
    algorithms: Vec<Algorithm>,
    state: Mutex<SessionState>,
}

impl<T: Transport> SessionManager<T> {
    /// Create a manager that tries `algorithms` in order when negotiating.
    pub fn new(
        transport: Arc<T>,
        service_path: impl Into<String>,
        algorithms: Vec<Algorithm>,
    ) -> Self {
        Self {
            transport,
            service_path: service_path.into(),
            algorithms,
            state: Mutex::new(SessionState::Idle),
        }
    }

    /// Return the cached session, or negotiate one.
    ///
    /// If the caller that started a negotiation is cancelled, the negotiation is abandoned and
    /// every waiter fails with [`Error::Cancelled`]. A waiter that is cancelled itself stops
    /// waiting without affecting the others.
    pub async fn ensure_session(&self, cancellation: &CancellationToken) -> Result<Arc<Session>> {
        if cancellation.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let next = {
            let mut state = self.lock();
            match &*state {
                SessionState::Ready(session) => Next::Ready(session.clone()),
                SessionState::Pending(receiver) => Next::Wait(receiver.clone()),
                SessionState::Idle => {
                    let (sender, receiver) = watch::channel(None);
                    *state = SessionState::Pending(receiver);
                    Next::Negotiate(sender)
                }
            }
        };

        match next {
            Next::Ready(session) => Ok(session),
            Next::Wait(receiver) => {
                log::debug!("Waiting for the session negotiation already in progress");
                wait_for_outcome(receiver, cancellation).await
            }
            Next::Negotiate(sender) => {
                let pending = PendingNegotiation {
                    state: &self.state,
                    sender: Some(sender),
                };
                let outcome = self.negotiate(cancellation).await;
                pending.complete(outcome.clone());
                outcome
            }
        }
    }

    /// The cached session, if one has been negotiated.
    pub fn current(&self) -> Option<Arc<Session>> {
        match &*self.lock() {
            SessionState::Ready(session) => Some(session.clone()),
            _ => None,
        }
    }

    /// Forget the cached session if it is still the one at `path`.
    ///
    /// Returns whether anything was forgotten.
    pub fn invalidate(&self, path: &str) -> bool {
        let mut state = self.lock();
        match &*state {
            SessionState::Ready(session) if session.path() == path => {
                log::warn!("Session {path} is no longer valid, a new one will be negotiated");
                *state = SessionState::Idle;
                true
            }
            _ => false,
        }
    }

    /// Close the cached session on the service and forget it.
    pub async fn close(&self, cancellation: &CancellationToken) -> Result<()> {
        let session = {
            let mut state = self.lock();
            match std::mem::replace(&mut *state, SessionState::Idle) {
                SessionState::Ready(session) => session,
                other => {
                    *state = other;
                    return Ok(());
                }
            }
        };

        log::debug!("Closing session {}", session.path());
        let call = MethodCall::new(session.path(), SESSION_INTERFACE, "Close", Vec::new());
        operation::call(self.transport.as_ref(), call, cancellation).await?;
        Ok(())
    }

    async fn negotiate(&self, cancellation: &CancellationToken) -> Result<Arc<Session>> {
        let mut last_error = None;

        for algorithm in &self.algorithms {
            log::debug!("Opening session with algorithm {algorithm}");
            match self.open_session(*algorithm, cancellation).await {
                Ok(session) => {
                    log::debug!("Opened session {} using {algorithm}", session.path());
                    return Ok(Arc::new(session));
                }
                Err(Error::Transport(e)) if e.is_not_supported() => {
                    log::warn!("The secret service does not support {algorithm}");
                    last_error = Some(Error::Transport(e));
                }
                Err(e) => {
                    log::debug!("Opening session with {algorithm} failed: {e}");
                    return Err(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| Error::Protocol("No session algorithms are configured".to_string())))
    }

    async fn open_session(
        &self,
        algorithm: Algorithm,
        cancellation: &CancellationToken,
    ) -> Result<Session> {
        let key_pair = match algorithm {
            Algorithm::Plain => None,
            Algorithm::DhIetf1024Sha256Aes128CbcPkcs7 => Some(DhKeyPair::generate()),
        };
        let input = match &key_pair {
            Some(key_pair) => WireValue::variant(key_pair.public_key().to_vec()),
            None => WireValue::variant(""),
        };

        let call = MethodCall::new(
            self.service_path.as_str(),
            SERVICE_INTERFACE,
            "OpenSession",
            vec![WireValue::from(algorithm.name()), input],
        );
        let reply = operation::call(self.transport.as_ref(), call, cancellation).await?;

        let [output, path] = reply.as_slice() else {
            return Err(Error::invalid_reply("OpenSession"));
        };
        let path = path
            .as_object_path()
            .or_else(|| path.as_str())
            .filter(|path| !path.is_empty() && *path != NO_OBJECT)
            .ok_or_else(|| {
                Error::Protocol("The secret service did not return a session path".to_string())
            })?;

        match key_pair {
            None => Ok(Session::plain(path)),
            Some(key_pair) => {
                let peer_public = output.as_bytes().ok_or_else(|| {
                    Error::Protocol(
                        "The secret service returned an invalid public key".to_string(),
                    )
                })?;
                let key = key_pair.derive_session_key(peer_public).map_err(|e| {
                    Error::Protocol(format!("Failed to derive the session key: {e}"))
                })?;
                Ok(Session::with_key(path, key))
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Publishes the result of a negotiation. Dropping it unpublished, e.g. when the negotiating
/// future is dropped, returns the manager to idle and wakes the waiters with a closed channel.
struct PendingNegotiation<'a> {
    state: &'a Mutex<SessionState>,
    sender: Option<watch::Sender<Outcome>>,
}

impl PendingNegotiation<'_> {
    fn complete(mut self, outcome: Result<Arc<Session>>) {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            *state = match &outcome {
                Ok(session) => SessionState::Ready(session.clone()),
                Err(_) => SessionState::Idle,
            };
        }
        if let Some(sender) = self.sender.take() {
            sender.send_replace(Some(outcome));
        }
    }
}

impl Drop for PendingNegotiation<'_> {
    fn drop(&mut self) {
        if self.sender.is_some() {
            log::debug!("Session negotiation was abandoned");
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            *state = SessionState::Idle;
        }
    }
}

async fn wait_for_outcome(
    mut receiver: watch::Receiver<Outcome>,
    cancellation: &CancellationToken,
) -> Result<Arc<Session>> {
    loop {
        let outcome = receiver.borrow_and_update().clone();
        if let Some(outcome) = outcome {
            return outcome;
        }

        select! {
            biased;
            _ = cancellation.cancelled() => return Err(Error::Cancelled),
            changed = receiver.changed() => {
                if changed.is_err() {
                    let outcome = receiver.borrow().clone();
                    return outcome.unwrap_or(Err(Error::Cancelled));
                }
            }
        }
    }
}
