use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::{
    error::{Error, Result},
    item::ItemProxy,
    operation::{self, AsyncResult, OperationKind},
    session::{Session, SessionManager},
    settings::ServiceSettings,
    transport::{MethodCall, Transport, ITEM_INTERFACE},
    wire::{WireValue, NO_OBJECT},
};

/// Handle to the secret service.
///
/// The service owns the transfer session shared by every [`ItemProxy`] created from it. Clones
/// share the same session.
pub struct Service<T: Transport> {
    inner: Arc<ServiceInner<T>>,
}

impl<T: Transport> Clone for Service<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

pub(crate) struct ServiceInner<T: Transport> {
    pub(crate) transport: Arc<T>,
    settings: ServiceSettings,
    sessions: SessionManager<T>,
}

impl<T: Transport> Service<T> {
    /// Create a service handle on top of `transport`. No call is made until a session or item
    /// operation needs one.
    pub fn new(transport: Arc<T>, settings: Option<ServiceSettings>) -> Self {
        let settings = settings.unwrap_or_default();
        let sessions = SessionManager::new(
            transport.clone(),
            settings.service_path.clone(),
            settings.algorithms.clone(),
        );

        Self {
            inner: Arc::new(ServiceInner {
                transport,
                settings,
                sessions,
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<ServiceInner<T>>) -> Self {
        Self { inner }
    }

    #[allow(missing_docs)]
    pub fn settings(&self) -> &ServiceSettings {
        &self.inner.settings
    }

    /// Object path of the service.
    pub fn path(&self) -> &str {
        &self.inner.settings.service_path
    }

    /// A proxy for the item at `path`.
    pub fn item(&self, path: impl Into<String>) -> ItemProxy<T> {
        ItemProxy::new(self, path)
    }

    pub(crate) fn inner(&self) -> &Arc<ServiceInner<T>> {
        &self.inner
    }

    /// Path of the cached session, if one has been negotiated.
    pub fn session_path(&self) -> Option<String> {
        self.inner
            .sessions
            .current()
            .map(|session| session.path().to_owned())
    }

    /// Make sure a transfer session is open and return its path.
    ///
    /// Concurrent callers share a single negotiation.
    pub async fn ensure_session(&self, cancellation: Option<CancellationToken>) -> Result<String> {
        let cancellation = cancellation.unwrap_or_default();
        let session = self.inner.session(&cancellation).await?;
        Ok(session.path().to_owned())
    }

    /// Start [`Service::ensure_session`] and hand the result to `callback`.
    ///
    /// Returns the token the operation runs under. If the runtime shuts down before the operation
    /// completes, `callback` receives [`Error::Runtime`].
    pub fn ensure_session_start<C>(
        &self,
        cancellation: Option<CancellationToken>,
        callback: C,
    ) -> CancellationToken
    where
        C: FnOnce(AsyncResult<String>) + Send + 'static,
    {
        let cancellation = cancellation.unwrap_or_default();
        let service = self.clone();
        let token = cancellation.clone();

        operation::start(
            self.path().to_owned(),
            OperationKind::EnsureSession,
            async move { service.ensure_session(Some(token)).await },
            callback,
        );
        cancellation
    }

    #[allow(missing_docs)]
    pub fn ensure_session_finish(&self, result: AsyncResult<String>) -> Result<String> {
        result.propagate(self.path(), OperationKind::EnsureSession)
    }

    /// Blocking [`Service::ensure_session`]. Safe to call from `spawn_blocking`, not from async
    /// tasks.
    pub fn ensure_session_sync(&self, cancellation: Option<CancellationToken>) -> Result<String> {
        operation::block_on(self.ensure_session(cancellation))
    }

    /// Delete the item at `path`.
    ///
    /// Fails with [`Error::PromptRequired`] if the service asks for confirmation first.
    pub async fn delete_path(
        &self,
        path: &str,
        cancellation: Option<CancellationToken>,
    ) -> Result<()> {
        let cancellation = cancellation.unwrap_or_default();
        self.inner.delete_path(path, &cancellation).await
    }

    /// Start [`Service::delete_path`] and hand the result to `callback`.
    pub fn delete_path_start<C>(
        &self,
        path: impl Into<String>,
        cancellation: Option<CancellationToken>,
        callback: C,
    ) -> CancellationToken
    where
        C: FnOnce(AsyncResult<()>) + Send + 'static,
    {
        let cancellation = cancellation.unwrap_or_default();
        let inner = self.inner.clone();
        let token = cancellation.clone();
        let path = path.into();

        operation::start(
            self.path().to_owned(),
            OperationKind::DeletePath,
            async move { inner.delete_path(&path, &token).await },
            callback,
        );
        cancellation
    }

    #[allow(missing_docs)]
    pub fn delete_path_finish(&self, result: AsyncResult<()>) -> Result<()> {
        result.propagate(self.path(), OperationKind::DeletePath)
    }

    #[allow(missing_docs)]
    pub fn delete_path_sync(
        &self,
        path: &str,
        cancellation: Option<CancellationToken>,
    ) -> Result<()> {
        operation::block_on(self.delete_path(path, cancellation))
    }

    /// Close the cached session on the service. The next operation that needs a session
    /// negotiates a new one.
    pub async fn close_session(&self, cancellation: Option<CancellationToken>) -> Result<()> {
        let cancellation = cancellation.unwrap_or_default();
        self.inner.sessions.close(&cancellation).await
    }
}

impl<T: Transport> ServiceInner<T> {
    pub(crate) async fn session(&self, cancellation: &CancellationToken) -> Result<Arc<Session>> {
        self.sessions.ensure_session(cancellation).await
    }

    /// Issue a call that depends on `session`. A `NoSession` error from the service drops the
    /// cached session before it is returned to the caller.
    pub(crate) async fn call_with_session(
        &self,
        session: &Session,
        call: MethodCall,
        cancellation: &CancellationToken,
    ) -> Result<Vec<WireValue>> {
        match operation::call(self.transport.as_ref(), call, cancellation).await {
            Err(Error::Transport(e)) if e.is_no_session() => {
                self.sessions.invalidate(session.path());
                Err(Error::Transport(e))
            }
            other => other,
        }
    }

    async fn delete_path(&self, path: &str, cancellation: &CancellationToken) -> Result<()> {
        log::debug!("Deleting {path}");
        let call = MethodCall::new(path, ITEM_INTERFACE, "Delete", Vec::new());
        let reply = operation::call(self.transport.as_ref(), call, cancellation).await?;

        let [prompt] = reply.as_slice() else {
            return Err(Error::invalid_reply("Delete"));
        };
        match prompt.as_object_path() {
            Some(NO_OBJECT) => Ok(()),
            Some(prompt) => Err(Error::PromptRequired(prompt.to_owned())),
            None => Err(Error::invalid_reply("Delete")),
        }
    }
}
