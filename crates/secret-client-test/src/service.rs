use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use secret_client::{
    transport::{
        ITEM_INTERFACE, NOT_SUPPORTED_ERROR, NO_SESSION_ERROR, PROPERTIES_INTERFACE,
        SERVICE_INTERFACE, SESSION_INTERFACE,
    },
    Algorithm, MethodCall, Transport, TransportError, WireValue,
};
use secret_client_crypto::{DhKeyPair, SessionKey};
use tokio::{select, sync::watch};
use tokio_util::sync::CancellationToken;

/// Prefix of the session paths handed out by [`MockSecretService`].
pub const SESSION_PREFIX: &str = "/org/freedesktop/secrets/session/";

const INVALID_ARGS_ERROR: &str = "org.freedesktop.DBus.Error.InvalidArgs";
const UNKNOWN_METHOD_ERROR: &str = "org.freedesktop.DBus.Error.UnknownMethod";
const UNKNOWN_OBJECT_ERROR: &str = "org.freedesktop.Secret.Error.NoSuchObject";
const IS_LOCKED_ERROR: &str = "org.freedesktop.Secret.Error.IsLocked";
const CANCELLED_ERROR: &str = "org.freedesktop.DBus.Error.NoReply";

type Reply = Result<Vec<WireValue>, TransportError>;

/// An item stored by [`MockSecretService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockItem {
    #[allow(missing_docs)]
    pub label: String,
    #[allow(missing_docs)]
    pub attributes: HashMap<String, String>,
    #[allow(missing_docs)]
    pub secret: Vec<u8>,
    #[allow(missing_docs)]
    pub content_type: String,
    /// Locked items refuse `GetSecret` and `SetSecret`.
    pub locked: bool,
    #[allow(missing_docs)]
    pub created: u64,
    /// Bumped on every write.
    pub modified: u64,
    /// When set, `Delete` returns this prompt path instead of deleting the item.
    pub delete_prompt: Option<String>,
}

impl MockItem {
    /// An unlocked item holding a `text/plain` secret.
    pub fn new(label: &str, secret: &str) -> Self {
        Self {
            label: label.to_owned(),
            attributes: HashMap::new(),
            secret: secret.as_bytes().to_vec(),
            content_type: "text/plain".to_owned(),
            locked: false,
            created: 1_700_000_000,
            modified: 1_700_000_000,
            delete_prompt: None,
        }
    }

    #[allow(missing_docs)]
    pub fn with_attribute(mut self, key: &str, value: &str) -> Self {
        self.attributes.insert(key.to_owned(), value.to_owned());
        self
    }
}

#[derive(Default)]
struct MockState {
    items: HashMap<String, MockItem>,
    sessions: HashMap<String, Option<SessionKey>>,
    next_session: u32,
    calls: Vec<MethodCall>,
    algorithms: Vec<String>,
    responses: HashMap<String, Reply>,
    hidden_properties: HashSet<(String, String)>,
}

/// An in-memory Secret Service.
///
/// Clones share the same state, so a test can keep one handle for inspection and give another
/// to the client.
#[derive(Clone)]
pub struct MockSecretService {
    state: Arc<Mutex<MockState>>,
    negotiation_held: Arc<watch::Sender<bool>>,
    call_count: Arc<watch::Sender<usize>>,
}

impl Default for MockSecretService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSecretService {
    /// A service with no items that supports both session algorithms.
    pub fn new() -> Self {
        let state = MockState {
            algorithms: vec![
                Algorithm::DhIetf1024Sha256Aes128CbcPkcs7.name().to_owned(),
                Algorithm::Plain.name().to_owned(),
            ],
            ..MockState::default()
        };

        MockSecretService {
            state: Arc::new(Mutex::new(state)),
            negotiation_held: Arc::new(watch::channel(false).0),
            call_count: Arc::new(watch::channel(0).0),
        }
    }

    /// Only accept the given session algorithms; others are answered with `NotSupported`.
    pub fn with_algorithms(self, algorithms: &[Algorithm]) -> Self {
        self.lock().algorithms = algorithms.iter().map(|a| a.name().to_owned()).collect();
        self
    }

    #[allow(missing_docs)]
    pub fn add_item(&self, path: &str, item: MockItem) {
        self.lock().items.insert(path.to_owned(), item);
    }

    /// Current state of the item at `path`, or `None` if it does not exist.
    pub fn item(&self, path: &str) -> Option<MockItem> {
        self.lock().items.get(path).cloned()
    }

    /// Answer every call to `method` with `response` instead of handling it.
    pub fn respond_to(&self, method: &str, response: Reply) {
        self.lock().responses.insert(method.to_owned(), response);
    }

    /// Make the property `name` of the item at `path` absent from the property cache.
    pub fn hide_property(&self, path: &str, name: &str) {
        self.lock()
            .hidden_properties
            .insert((path.to_owned(), name.to_owned()));
    }

    /// Forget every open session, as if the service had restarted.
    pub fn expire_sessions(&self) {
        self.lock().sessions.clear();
    }

    /// Number of sessions currently open.
    pub fn session_count(&self) -> usize {
        self.lock().sessions.len()
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<MethodCall> {
        self.lock().calls.clone()
    }

    /// The calls received so far to `method`.
    pub fn calls_to(&self, method: &str) -> Vec<MethodCall> {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.method == method)
            .cloned()
            .collect()
    }

    /// Keep `OpenSession` calls waiting until [`MockSecretService::release_negotiation`].
    pub fn hold_negotiation(&self) {
        self.negotiation_held.send_replace(true);
    }

    #[allow(missing_docs)]
    pub fn release_negotiation(&self) {
        self.negotiation_held.send_replace(false);
    }

    /// Wait until at least `count` calls to `method` have been received.
    pub async fn wait_for_calls(&self, method: &str, count: usize) {
        let mut receiver = self.call_count.subscribe();
        let _ = receiver
            .wait_for(|_| self.calls_to(method).len() >= count)
            .await;
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: &MethodCall) -> Option<Reply> {
        let response = {
            let mut state = self.lock();
            state.calls.push(call.clone());
            state.responses.get(&call.method).cloned()
        };
        self.call_count.send_modify(|count| *count += 1);
        response
    }

    async fn negotiation_released(&self) {
        let mut receiver = self.negotiation_held.subscribe();
        let _ = receiver.wait_for(|held| !*held).await;
    }

    fn handle(&self, call: &MethodCall) -> Reply {
        match (call.interface.as_str(), call.method.as_str()) {
            (SERVICE_INTERFACE, "OpenSession") => self.open_session(&call.args),
            (SESSION_INTERFACE, "Close") => {
                self.lock().sessions.remove(&call.object_path);
                Ok(Vec::new())
            }
            (ITEM_INTERFACE, "GetSecret") => self.get_secret(&call.object_path, &call.args),
            (ITEM_INTERFACE, "SetSecret") => self.set_secret(&call.object_path, &call.args),
            (ITEM_INTERFACE, "Delete") => self.delete(&call.object_path),
            (PROPERTIES_INTERFACE, "Set") => self.set_property(&call.object_path, &call.args),
            (interface, method) => Err(TransportError::new(
                UNKNOWN_METHOD_ERROR,
                format!("No method {method} on interface {interface}"),
            )),
        }
    }

    fn open_session(&self, args: &[WireValue]) -> Reply {
        let [algorithm, input] = args else {
            return Err(invalid_args("OpenSession"));
        };
        let algorithm = algorithm.as_str().ok_or_else(|| invalid_args("OpenSession"))?;

        let mut state = self.lock();
        if !state.algorithms.iter().any(|a| a == algorithm) {
            return Err(TransportError::new(
                NOT_SUPPORTED_ERROR,
                format!("Algorithm {algorithm} is not supported"),
            ));
        }

        let (output, key) = if algorithm == Algorithm::Plain.name() {
            (WireValue::variant(""), None)
        } else {
            let client_public = input.as_bytes().ok_or_else(|| invalid_args("OpenSession"))?;
            let server = DhKeyPair::generate();
            let key = server
                .derive_session_key(client_public)
                .map_err(|e| TransportError::new(INVALID_ARGS_ERROR, e.to_string()))?;
            (WireValue::variant(server.public_key().to_vec()), Some(key))
        };

        state.next_session += 1;
        let path = format!("{SESSION_PREFIX}{}", state.next_session);
        state.sessions.insert(path.clone(), key);
        log::debug!("Mock service opened session {path} using {algorithm}");

        Ok(vec![output, WireValue::object_path(path)])
    }

    fn get_secret(&self, item_path: &str, args: &[WireValue]) -> Reply {
        let [session] = args else {
            return Err(invalid_args("GetSecret"));
        };
        let session = session.as_object_path().ok_or_else(|| invalid_args("GetSecret"))?;

        let state = self.lock();
        let key = session_key(&state, session)?;
        let item = unlocked_item(&state, item_path)?;

        let (parameters, value) = match key {
            Some(key) => {
                let payload = key
                    .encrypt(&item.secret)
                    .map_err(|e| TransportError::new(INVALID_ARGS_ERROR, e.to_string()))?;
                (payload.iv, payload.ciphertext)
            }
            None => (Vec::new(), item.secret.clone()),
        };

        Ok(vec![WireValue::Struct(vec![
            WireValue::Bytes(parameters),
            WireValue::Bytes(value),
            WireValue::from(item.content_type.as_str()),
        ])])
    }

    fn set_secret(&self, item_path: &str, args: &[WireValue]) -> Reply {
        let [session, secret] = args else {
            return Err(invalid_args("SetSecret"));
        };
        let session = session.as_object_path().ok_or_else(|| invalid_args("SetSecret"))?;
        let Some([parameters, value, content_type]) = secret.as_struct() else {
            return Err(invalid_args("SetSecret"));
        };
        let (Some(parameters), Some(value), Some(content_type)) =
            (parameters.as_bytes(), value.as_bytes(), content_type.as_str())
        else {
            return Err(invalid_args("SetSecret"));
        };

        let mut state = self.lock();
        let secret = match session_key(&state, session)? {
            Some(key) => key
                .decrypt(parameters, value)
                .map_err(|e| TransportError::new(INVALID_ARGS_ERROR, e.to_string()))?
                .to_vec(),
            None => value.to_vec(),
        };
        unlocked_item(&state, item_path)?;

        let item = state
            .items
            .get_mut(item_path)
            .ok_or_else(|| unknown_object(item_path))?;
        item.secret = secret;
        item.content_type = content_type.to_owned();
        item.modified += 1;
        Ok(Vec::new())
    }

    fn delete(&self, item_path: &str) -> Reply {
        let mut state = self.lock();
        let item = state
            .items
            .get(item_path)
            .ok_or_else(|| unknown_object(item_path))?;

        if let Some(prompt) = &item.delete_prompt {
            return Ok(vec![WireValue::object_path(prompt.as_str())]);
        }
        state.items.remove(item_path);
        Ok(vec![WireValue::object_path("/")])
    }

    fn set_property(&self, item_path: &str, args: &[WireValue]) -> Reply {
        let [interface, name, value] = args else {
            return Err(invalid_args("Set"));
        };
        if interface.as_str() != Some(ITEM_INTERFACE) {
            return Err(invalid_args("Set"));
        }
        let WireValue::Variant(value) = value else {
            return Err(invalid_args("Set"));
        };

        let mut state = self.lock();
        let item = state
            .items
            .get_mut(item_path)
            .ok_or_else(|| unknown_object(item_path))?;

        match name.as_str() {
            Some("Label") => {
                item.label = value.as_str().ok_or_else(|| invalid_args("Set"))?.to_owned();
            }
            Some("Attributes") => {
                let entries = value.as_dict().ok_or_else(|| invalid_args("Set"))?;
                item.attributes = entries
                    .iter()
                    .map(|(k, v)| {
                        let v = v.as_str().ok_or_else(|| invalid_args("Set"))?;
                        Ok::<_, TransportError>((k.clone(), v.to_owned()))
                    })
                    .collect::<Result<_, _>>()?;
            }
            _ => return Err(invalid_args("Set")),
        }
        item.modified += 1;
        Ok(Vec::new())
    }
}

#[async_trait::async_trait]
impl Transport for MockSecretService {
    async fn call(
        &self,
        call: MethodCall,
        cancellation: &CancellationToken,
    ) -> Result<Vec<WireValue>, TransportError> {
        let response = self.record(&call);

        if call.method == "OpenSession" {
            select! {
                _ = cancellation.cancelled() => {
                    return Err(TransportError::new(CANCELLED_ERROR, "The call was cancelled"));
                }
                _ = self.negotiation_released() => {}
            }
        }

        match response {
            Some(response) => response,
            None => self.handle(&call),
        }
    }

    fn cached_property(
        &self,
        object_path: &str,
        interface: &str,
        name: &str,
    ) -> Option<WireValue> {
        let state = self.lock();
        if interface != ITEM_INTERFACE
            || state
                .hidden_properties
                .contains(&(object_path.to_owned(), name.to_owned()))
        {
            return None;
        }

        let item = state.items.get(object_path)?;
        let value = match name {
            "Label" => WireValue::from(item.label.as_str()),
            "Attributes" => WireValue::Dict(
                item.attributes
                    .iter()
                    .map(|(k, v)| (k.clone(), WireValue::from(v.as_str())))
                    .collect(),
            ),
            "Locked" => WireValue::Bool(item.locked),
            "Created" => WireValue::U64(item.created),
            "Modified" => WireValue::U64(item.modified),
            _ => return None,
        };
        Some(WireValue::variant(value))
    }
}

fn session_key<'a>(
    state: &'a MockState,
    session: &str,
) -> Result<Option<&'a SessionKey>, TransportError> {
    state
        .sessions
        .get(session)
        .map(Option::as_ref)
        .ok_or_else(|| TransportError::new(NO_SESSION_ERROR, format!("No session {session}")))
}

fn unlocked_item<'a>(state: &'a MockState, path: &str) -> Result<&'a MockItem, TransportError> {
    let item = state.items.get(path).ok_or_else(|| unknown_object(path))?;
    if item.locked {
        return Err(TransportError::new(IS_LOCKED_ERROR, format!("{path} is locked")));
    }
    Ok(item)
}

fn unknown_object(path: &str) -> TransportError {
    TransportError::new(UNKNOWN_OBJECT_ERROR, format!("No such object {path}"))
}

fn invalid_args(method: &str) -> TransportError {
    TransportError::new(INVALID_ARGS_ERROR, format!("Invalid arguments to {method}"))
}
