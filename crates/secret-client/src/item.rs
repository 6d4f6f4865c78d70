use std::sync::{Arc, Weak};

use tokio_util::sync::CancellationToken;

use crate::{
    codec::{attributes_from_wire, attributes_to_wire, decode_secret, encode_secret, Attributes},
    error::{Error, Result},
    operation::{self, AsyncResult, OperationKind},
    service::{Service, ServiceInner},
    transport::{MethodCall, Transport, ITEM_INTERFACE, PROPERTIES_INTERFACE},
    value::SecretValue,
    wire::WireValue,
};

/// Proxy for a single secret item.
///
/// An item keeps only a weak reference to the [`Service`] it was created from. Operations that
/// need a session fail with [`Error::ServiceReleased`] once every handle to the service has
/// been dropped.
pub struct ItemProxy<T: Transport> {
    transport: Arc<T>,
    service: Weak<ServiceInner<T>>,
    path: String,
}

impl<T: Transport> Clone for ItemProxy<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            service: self.service.clone(),
            path: self.path.clone(),
        }
    }
}

impl<T: Transport> std::fmt::Debug for ItemProxy<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemProxy")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> ItemProxy<T> {
    /// Create a proxy for the item at `path`, belonging to `service`.
    pub fn new(service: &Service<T>, path: impl Into<String>) -> Self {
        let inner = service.inner();
        Self {
            transport: inner.transport.clone(),
            service: Arc::downgrade(inner),
            path: path.into(),
        }
    }

    /// Object path of the item.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The service this item belongs to.
    pub fn service(&self) -> Result<Service<T>> {
        self.service_inner().map(Service::from_inner)
    }

    fn service_inner(&self) -> Result<Arc<ServiceInner<T>>> {
        self.service.upgrade().ok_or(Error::ServiceReleased)
    }

    // Secret

    /// Retrieve the secret, negotiating a session first if needed.
    pub async fn get_secret(&self, cancellation: Option<CancellationToken>) -> Result<SecretValue> {
        let cancellation = cancellation.unwrap_or_default();
        self.read_secret(&cancellation).await
    }

    /// Start [`ItemProxy::get_secret`] and hand the result to `callback`.
    ///
    /// Returns the token the operation runs under. If the runtime shuts down before the operation
    /// completes, `callback` receives [`Error::Runtime`].
    pub fn get_secret_start<C>(
        &self,
        cancellation: Option<CancellationToken>,
        callback: C,
    ) -> CancellationToken
    where
        C: FnOnce(AsyncResult<SecretValue>) + Send + 'static,
    {
        let cancellation = cancellation.unwrap_or_default();
        let item = self.clone();
        let token = cancellation.clone();

        operation::start(
            self.path.clone(),
            OperationKind::GetSecret,
            async move { item.read_secret(&token).await },
            callback,
        );
        cancellation
    }

    #[allow(missing_docs)]
    pub fn get_secret_finish(&self, result: AsyncResult<SecretValue>) -> Result<SecretValue> {
        result.propagate(&self.path, OperationKind::GetSecret)
    }

    /// Blocking [`ItemProxy::get_secret`]. Safe to call from `spawn_blocking`, not from async tasks.
    pub fn get_secret_sync(&self, cancellation: Option<CancellationToken>) -> Result<SecretValue> {
        operation::block_on(self.get_secret(cancellation))
    }

    /// Replace the secret, negotiating a session first if needed.
    pub async fn set_secret(
        &self,
        value: &SecretValue,
        cancellation: Option<CancellationToken>,
    ) -> Result<()> {
        let cancellation = cancellation.unwrap_or_default();
        self.write_secret(value, &cancellation).await
    }

    #[allow(missing_docs)]
    pub fn set_secret_start<C>(
        &self,
        value: SecretValue,
        cancellation: Option<CancellationToken>,
        callback: C,
    ) -> CancellationToken
    where
        C: FnOnce(AsyncResult<()>) + Send + 'static,
    {
        let cancellation = cancellation.unwrap_or_default();
        let item = self.clone();
        let token = cancellation.clone();

        operation::start(
            self.path.clone(),
            OperationKind::SetSecret,
            async move { item.write_secret(&value, &token).await },
            callback,
        );
        cancellation
    }

    #[allow(missing_docs)]
    pub fn set_secret_finish(&self, result: AsyncResult<()>) -> Result<()> {
        result.propagate(&self.path, OperationKind::SetSecret)
    }

    #[allow(missing_docs)]
    pub fn set_secret_sync(
        &self,
        value: &SecretValue,
        cancellation: Option<CancellationToken>,
    ) -> Result<()> {
        operation::block_on(self.set_secret(value, cancellation))
    }

    async fn read_secret(&self, cancellation: &CancellationToken) -> Result<SecretValue> {
        let service = self.service_inner()?;
        let session = service.session(cancellation).await?;

        let call = MethodCall::new(
            self.path.as_str(),
            ITEM_INTERFACE,
            "GetSecret",
            vec![WireValue::object_path(session.path())],
        );
        let reply = service.call_with_session(&session, call, cancellation).await?;

        let [secret] = reply.as_slice() else {
            return Err(Error::invalid_secret());
        };
        decode_secret(secret, &session).ok_or_else(Error::invalid_secret)
    }

    async fn write_secret(
        &self,
        value: &SecretValue,
        cancellation: &CancellationToken,
    ) -> Result<()> {
        let service = self.service_inner()?;
        let session = service.session(cancellation).await?;

        let call = MethodCall::new(
            self.path.as_str(),
            ITEM_INTERFACE,
            "SetSecret",
            vec![
                WireValue::object_path(session.path()),
                encode_secret(value, &session)?,
            ],
        );
        service.call_with_session(&session, call, cancellation).await?;
        Ok(())
    }

    // Deletion

    /// Delete the item through the service it belongs to.
    pub async fn delete(&self, cancellation: Option<CancellationToken>) -> Result<()> {
        let cancellation = cancellation.unwrap_or_default();
        self.remove(&cancellation).await
    }

    #[allow(missing_docs)]
    pub fn delete_start<C>(
        &self,
        cancellation: Option<CancellationToken>,
        callback: C,
    ) -> CancellationToken
    where
        C: FnOnce(AsyncResult<()>) + Send + 'static,
    {
        let cancellation = cancellation.unwrap_or_default();
        let item = self.clone();
        let token = cancellation.clone();

        operation::start(
            self.path.clone(),
            OperationKind::DeletePath,
            async move { item.remove(&token).await },
            callback,
        );
        cancellation
    }

    #[allow(missing_docs)]
    pub fn delete_finish(&self, result: AsyncResult<()>) -> Result<()> {
        result.propagate(&self.path, OperationKind::DeletePath)
    }

    #[allow(missing_docs)]
    pub fn delete_sync(&self, cancellation: Option<CancellationToken>) -> Result<()> {
        operation::block_on(self.delete(cancellation))
    }

    async fn remove(&self, cancellation: &CancellationToken) -> Result<()> {
        let service = self.service()?;
        service
            .delete_path(&self.path, Some(cancellation.clone()))
            .await
    }

    // Properties

    /// Lookup attributes, from the property cache.
    pub fn get_attributes(&self) -> Result<Attributes> {
        attributes_from_wire(&self.cached_property("Attributes")?)
    }

    #[allow(missing_docs)]
    pub async fn set_attributes(
        &self,
        attributes: &Attributes,
        cancellation: Option<CancellationToken>,
    ) -> Result<()> {
        let cancellation = cancellation.unwrap_or_default();
        self.set_property("Attributes", attributes_to_wire(attributes), &cancellation)
            .await
    }

    #[allow(missing_docs)]
    pub fn set_attributes_start<C>(
        &self,
        attributes: &Attributes,
        cancellation: Option<CancellationToken>,
        callback: C,
    ) -> CancellationToken
    where
        C: FnOnce(AsyncResult<()>) + Send + 'static,
    {
        self.set_property_start(
            OperationKind::SetAttributes,
            "Attributes",
            attributes_to_wire(attributes),
            cancellation,
            callback,
        )
    }

    #[allow(missing_docs)]
    pub fn set_attributes_finish(&self, result: AsyncResult<()>) -> Result<()> {
        result.propagate(&self.path, OperationKind::SetAttributes)
    }

    #[allow(missing_docs)]
    pub fn set_attributes_sync(
        &self,
        attributes: &Attributes,
        cancellation: Option<CancellationToken>,
    ) -> Result<()> {
        operation::block_on(self.set_attributes(attributes, cancellation))
    }

    /// Display label, from the property cache.
    pub fn get_label(&self) -> Result<String> {
        let value = self.cached_property("Label")?;
        value
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| invalid_property("Label"))
    }

    #[allow(missing_docs)]
    pub async fn set_label(
        &self,
        label: &str,
        cancellation: Option<CancellationToken>,
    ) -> Result<()> {
        let cancellation = cancellation.unwrap_or_default();
        self.set_property("Label", WireValue::from(label), &cancellation)
            .await
    }

    #[allow(missing_docs)]
    pub fn set_label_start<C>(
        &self,
        label: &str,
        cancellation: Option<CancellationToken>,
        callback: C,
    ) -> CancellationToken
    where
        C: FnOnce(AsyncResult<()>) + Send + 'static,
    {
        self.set_property_start(
            OperationKind::SetLabel,
            "Label",
            WireValue::from(label),
            cancellation,
            callback,
        )
    }

    #[allow(missing_docs)]
    pub fn set_label_finish(&self, result: AsyncResult<()>) -> Result<()> {
        result.propagate(&self.path, OperationKind::SetLabel)
    }

    #[allow(missing_docs)]
    pub fn set_label_sync(
        &self,
        label: &str,
        cancellation: Option<CancellationToken>,
    ) -> Result<()> {
        operation::block_on(self.set_label(label, cancellation))
    }

    /// Whether the item is locked, from the property cache.
    pub fn get_locked(&self) -> Result<bool> {
        self.cached_property("Locked")?
            .as_bool()
            .ok_or_else(|| invalid_property("Locked"))
    }

    /// Creation time in seconds since the Unix epoch, from the property cache.
    pub fn get_created(&self) -> Result<u64> {
        self.cached_property("Created")?
            .as_u64()
            .ok_or_else(|| invalid_property("Created"))
    }

    /// Modification time in seconds since the Unix epoch, from the property cache.
    pub fn get_modified(&self) -> Result<u64> {
        self.cached_property("Modified")?
            .as_u64()
            .ok_or_else(|| invalid_property("Modified"))
    }

    fn cached_property(&self, name: &str) -> Result<WireValue> {
        self.transport
            .cached_property(&self.path, ITEM_INTERFACE, name)
            .ok_or_else(|| {
                Error::Protocol(format!("The {name} property of {} is not available", self.path))
            })
    }

    async fn set_property(
        &self,
        name: &str,
        value: WireValue,
        cancellation: &CancellationToken,
    ) -> Result<()> {
        let call = MethodCall::new(
            self.path.as_str(),
            PROPERTIES_INTERFACE,
            "Set",
            vec![
                WireValue::from(ITEM_INTERFACE),
                WireValue::from(name),
                WireValue::variant(value),
            ],
        );
        operation::call(self.transport.as_ref(), call, cancellation).await?;
        Ok(())
    }

    fn set_property_start<C>(
        &self,
        kind: OperationKind,
        name: &'static str,
        value: WireValue,
        cancellation: Option<CancellationToken>,
        callback: C,
    ) -> CancellationToken
    where
        C: FnOnce(AsyncResult<()>) + Send + 'static,
    {
        let cancellation = cancellation.unwrap_or_default();
        let item = self.clone();
        let token = cancellation.clone();

        operation::start(
            self.path.clone(),
            kind,
            async move { item.set_property(name, value, &token).await },
            callback,
        );
        cancellation
    }
}

fn invalid_property(name: &str) -> Error {
    Error::Protocol(format!("Received invalid {name} property from the secret storage"))
}
