//! Plumbing shared by every remote operation: cancellable calls, callback-style start/finish
//! and blocking execution.

use std::{future::Future, marker::PhantomData};

use tokio::{runtime::Handle, select};
use tokio_util::sync::CancellationToken;

use crate::{
    error::{Error, Result},
    transport::{MethodCall, Transport},
    wire::WireValue,
};

/// Identifies which operation produced an [`AsyncResult`].
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    EnsureSession,
    DeletePath,
    GetSecret,
    SetSecret,
    SetLabel,
    SetAttributes,
}

/// The outcome of an operation started with one of the `*_start` methods.
///
/// Pass it to the matching `*_finish` method on the same object to get the value or error.
#[derive(Debug)]
pub struct AsyncResult<T> {
    source: String,
    kind: OperationKind,
    outcome: Result<T>,
}

impl<T> AsyncResult<T> {
    pub(crate) fn new(source: impl Into<String>, kind: OperationKind, outcome: Result<T>) -> Self {
        Self {
            source: source.into(),
            kind,
            outcome,
        }
    }

    /// Object path of the object the operation was started on.
    pub fn source(&self) -> &str {
        &self.source
    }

    #[allow(missing_docs)]
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Whether this result was produced by `kind` on `source`.
    pub fn is_valid(&self, source: &str, kind: OperationKind) -> bool {
        self.source == source && self.kind == kind
    }

    /// Unwrap the outcome after checking that it belongs to `kind` on `source`.
    pub(crate) fn propagate(self, source: &str, kind: OperationKind) -> Result<T> {
        if !self.is_valid(source, kind) {
            log::error!(
                "Result of {:?} on {} passed to the finish call for {kind:?} on {source}",
                self.kind,
                self.source
            );
            return Err(Error::MismatchedResult {
                expected_source: source.to_owned(),
                expected_kind: kind,
                actual_source: self.source,
                actual_kind: self.kind,
            });
        }
        self.outcome
    }
}

/// Issue `call` unless `cancellation` has fired, and stop waiting for the reply once it does.
pub(crate) async fn call<T: Transport + ?Sized>(
    transport: &T,
    call: MethodCall,
    cancellation: &CancellationToken,
) -> Result<Vec<WireValue>> {
    if cancellation.is_cancelled() {
        return Err(Error::Cancelled);
    }

    log::debug!(
        "Calling {}.{} on {}",
        call.interface,
        call.method,
        call.object_path
    );

    select! {
        biased;
        _ = cancellation.cancelled() => Err(Error::Cancelled),
        reply = transport.call(call, cancellation) => Ok(reply?),
    }
}

/// Run `future` on the current runtime and hand its result to `callback`.
///
/// The callback runs exactly once. Without a runtime it runs immediately with
/// [`Error::Runtime`], and if the runtime shuts down before the future completes it runs with
/// [`Error::Runtime`] when the task is dropped.
pub(crate) fn start<T, F, C>(source: String, kind: OperationKind, future: F, callback: C)
where
    T: Send + 'static,
    F: Future<Output = Result<T>> + Send + 'static,
    C: FnOnce(AsyncResult<T>) + Send + 'static,
{
    let completion = Completion::new(source, kind, callback);

    match Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                let outcome = future.await;
                completion.complete(outcome);
            });
        }
        Err(e) => {
            log::debug!("Cannot start {kind:?}: {e}");
            completion.complete(Err(Error::Runtime(format!(
                "Starting an operation requires a tokio runtime: {e}"
            ))));
        }
    }
}

/// Delivers an operation's outcome to its callback. Dropped without completing, it reports that
/// the runtime went away.
struct Completion<T, C: FnOnce(AsyncResult<T>)> {
    pending: Option<(String, OperationKind, C)>,
    _outcome: PhantomData<fn(T)>,
}

impl<T, C: FnOnce(AsyncResult<T>)> Completion<T, C> {
    fn new(source: String, kind: OperationKind, callback: C) -> Self {
        Self {
            pending: Some((source, kind, callback)),
            _outcome: PhantomData,
        }
    }

    fn complete(mut self, outcome: Result<T>) {
        if let Some((source, kind, callback)) = self.pending.take() {
            callback(AsyncResult::new(source, kind, outcome));
        }
    }
}

impl<T, C: FnOnce(AsyncResult<T>)> Drop for Completion<T, C> {
    fn drop(&mut self) {
        if let Some((source, kind, callback)) = self.pending.take() {
            log::debug!("{kind:?} on {source} was dropped before completing");
            callback(AsyncResult::new(
                source,
                kind,
                Err(Error::Runtime(
                    "The runtime shut down before the operation completed".to_string(),
                )),
            ));
        }
    }
}

/// Drive `future` to completion on a private current-thread runtime.
///
/// When the calling thread already has a runtime context, such as a `spawn_blocking` thread,
/// the private runtime runs on a scoped thread while the caller waits.
/// Calling this from an async task blocks that task's worker until the future completes.
pub(crate) fn block_on<T, F>(future: F) -> Result<T>
where
    T: Send,
    F: Future<Output = Result<T>> + Send,
{
    if Handle::try_current().is_err() {
        return run_to_completion(future);
    }

    log::debug!("Blocking call made with a runtime entered, running it on a separate thread");
    std::thread::scope(|scope| {
        scope
            .spawn(|| run_to_completion(future))
            .join()
            .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
    })
}

fn run_to_completion<T, F>(future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(|e| Error::Runtime(e.to_string()))?;
    runtime.block_on(future)
}
