#![allow(missing_docs)]

use std::sync::Arc;

use secret_client::{
    transport::{ITEM_INTERFACE, NO_SESSION_ERROR},
    Algorithm, CancellationToken, Error, ItemProxy, SecretValue, Service, ServiceSettings,
    WireValue,
};
use secret_client_test::{MockItem, MockSecretService};

const ITEM_PATH: &str = "/org/freedesktop/secrets/collection/login/1";

fn setup() -> (MockSecretService, Service<MockSecretService>, ItemProxy<MockSecretService>) {
    let mock = MockSecretService::new();
    mock.add_item(ITEM_PATH, MockItem::new("Mail", "s3cret"));
    let service = Service::new(Arc::new(mock.clone()), None);
    let item = service.item(ITEM_PATH);
    (mock, service, item)
}

fn setup_plain() -> (MockSecretService, Service<MockSecretService>, ItemProxy<MockSecretService>) {
    let mock = MockSecretService::new();
    mock.add_item(ITEM_PATH, MockItem::new("Mail", "s3cret"));
    let settings = ServiceSettings {
        algorithms: vec![Algorithm::Plain],
        ..ServiceSettings::default()
    };
    let service = Service::new(Arc::new(mock.clone()), Some(settings));
    let item = service.item(ITEM_PATH);
    (mock, service, item)
}

fn methods(mock: &MockSecretService) -> Vec<String> {
    mock.calls().into_iter().map(|call| call.method).collect()
}

#[tokio::test]
async fn get_secret_negotiates_then_reads() {
    let (mock, service, item) = setup();

    let secret = item.get_secret(None).await.expect("secret");

    assert_eq!(secret.get(), b"s3cret");
    assert_eq!(secret.content_type(), "text/plain");
    assert_eq!(secret.get_text(), Some("s3cret"));

    assert_eq!(methods(&mock), vec!["OpenSession", "GetSecret"]);
    let get = &mock.calls_to("GetSecret")[0];
    assert_eq!(get.object_path, ITEM_PATH);
    assert_eq!(get.interface, ITEM_INTERFACE);
    let session = service.session_path().expect("session is cached");
    assert_eq!(get.args, vec![WireValue::object_path(session)]);
}

#[tokio::test]
async fn get_secret_over_plain_session() {
    let (_mock, _service, item) = setup_plain();

    let secret = item.get_secret(None).await.expect("secret");

    assert_eq!(secret, SecretValue::new_text("s3cret"));
}

#[tokio::test]
async fn get_secret_keeps_content_type() {
    let (mock, _service, item) = setup();
    let mut binary = MockItem::new("Key", "");
    binary.secret = vec![0, 159, 146, 150];
    binary.content_type = "application/octet-stream".to_string();
    mock.add_item(ITEM_PATH, binary);

    let secret = item.get_secret(None).await.expect("secret");

    assert_eq!(secret.get(), &[0, 159, 146, 150]);
    assert_eq!(secret.content_type(), "application/octet-stream");
    assert_eq!(secret.get_text(), None);
}

#[tokio::test]
async fn items_share_the_service_session() {
    let (mock, service, item) = setup();
    mock.add_item("/org/freedesktop/secrets/collection/login/2", MockItem::new("Web", "pw"));
    let other = service.item("/org/freedesktop/secrets/collection/login/2");

    item.get_secret(None).await.expect("first secret");
    let secret = other.get_secret(None).await.expect("second secret");

    assert_eq!(secret.get(), b"pw");
    assert_eq!(mock.calls_to("OpenSession").len(), 1);
}

#[tokio::test]
async fn malformed_secret_is_a_protocol_error() {
    let (mock, _service, item) = setup_plain();
    let invalid = Err(Error::Protocol(
        "Received invalid secret from the secret storage".to_string(),
    ));

    mock.respond_to(
        "GetSecret",
        Ok(vec![WireValue::Struct(vec![
            WireValue::Bytes(Vec::new()),
            WireValue::Bytes(b"x".to_vec()),
        ])]),
    );
    assert_eq!(item.get_secret(None).await, invalid);

    mock.respond_to(
        "GetSecret",
        Ok(vec![WireValue::Struct(vec![
            WireValue::Bytes(Vec::new()),
            WireValue::Bytes(b"x".to_vec()),
            WireValue::U32(1),
        ])]),
    );
    assert_eq!(item.get_secret(None).await, invalid);

    mock.respond_to("GetSecret", Ok(Vec::new()));
    assert_eq!(item.get_secret(None).await, invalid);
}

#[tokio::test]
async fn cancelled_before_start_issues_no_calls() {
    let (mock, _service, item) = setup();
    let token = CancellationToken::new();
    token.cancel();

    let result = item.get_secret(Some(token)).await;

    assert_eq!(result, Err(Error::Cancelled));
    assert!(mock.calls().is_empty());
}

#[tokio::test]
async fn cancelled_during_negotiation_never_reads() {
    let (mock, _service, item) = setup();
    mock.hold_negotiation();
    let (tx, rx) = tokio::sync::oneshot::channel();

    let token = item.get_secret_start(None, move |result| {
        let _ = tx.send(result);
    });
    mock.wait_for_calls("OpenSession", 1).await;
    token.cancel();

    let result = rx.await.expect("callback should run");
    assert_eq!(item.get_secret_finish(result), Err(Error::Cancelled));
    assert!(mock.calls_to("GetSecret").is_empty());
}

#[tokio::test]
async fn caller_token_is_used_for_the_whole_operation() {
    let (mock, _service, item) = setup();
    mock.hold_negotiation();
    let token = CancellationToken::new();
    let (tx, rx) = tokio::sync::oneshot::channel();

    let returned = item.get_secret_start(Some(token.clone()), move |result| {
        let _ = tx.send(result);
    });
    mock.wait_for_calls("OpenSession", 1).await;
    returned.cancel();

    assert!(token.is_cancelled());
    let result = rx.await.expect("callback should run");
    assert_eq!(item.get_secret_finish(result), Err(Error::Cancelled));
}

#[tokio::test]
async fn transport_errors_pass_through() {
    let (mock, _service, item) = setup();
    let mut locked = MockItem::new("Mail", "s3cret");
    locked.locked = true;
    mock.add_item(ITEM_PATH, locked);

    let err = item.get_secret(None).await.unwrap_err();

    match err {
        Error::Transport(e) => assert_eq!(e.name, "org.freedesktop.Secret.Error.IsLocked"),
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn expired_session_is_renegotiated_on_the_next_call() {
    let (mock, service, item) = setup();
    item.get_secret(None).await.expect("secret");
    let first = service.session_path().expect("session");

    mock.expire_sessions();
    let err = item.get_secret(None).await.unwrap_err();
    match err {
        Error::Transport(e) => assert_eq!(e.name, NO_SESSION_ERROR),
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(service.session_path(), None);
    assert_eq!(mock.calls_to("GetSecret").len(), 2);

    item.get_secret(None).await.expect("secret after renegotiation");
    assert_ne!(service.session_path(), Some(first));
    assert_eq!(mock.calls_to("OpenSession").len(), 2);
}

#[tokio::test]
async fn get_secret_start_and_finish() {
    let (_mock, _service, item) = setup();
    let (tx, rx) = tokio::sync::oneshot::channel();

    item.get_secret_start(None, move |result| {
        let _ = tx.send(result);
    });

    let result = rx.await.expect("callback should run");
    assert_eq!(result.source(), ITEM_PATH);
    let secret = item.get_secret_finish(result).expect("secret");
    assert_eq!(secret.get(), b"s3cret");
}

#[tokio::test]
async fn finish_rejects_results_from_other_items() {
    let (mock, service, item) = setup();
    mock.add_item("/org/freedesktop/secrets/collection/login/2", MockItem::new("Web", "pw"));
    let other = service.item("/org/freedesktop/secrets/collection/login/2");
    let (tx, rx) = tokio::sync::oneshot::channel();

    other.get_secret_start(None, move |result| {
        let _ = tx.send(result);
    });
    let result = rx.await.expect("callback should run");

    assert!(matches!(
        item.get_secret_finish(result),
        Err(Error::MismatchedResult { .. })
    ));
}

#[tokio::test]
async fn finish_rejects_results_from_other_operations() {
    let (_mock, _service, item) = setup();
    let (tx, rx) = tokio::sync::oneshot::channel();

    item.set_secret_start(SecretValue::new_text("new"), None, move |result| {
        let _ = tx.send(result);
    });
    let result = rx.await.expect("callback should run");

    assert!(matches!(
        item.set_label_finish(result),
        Err(Error::MismatchedResult { .. })
    ));
}

#[tokio::test]
async fn set_secret_encrypts_for_the_service() {
    let (mock, _service, item) = setup();
    let value = SecretValue::new(vec![1, 2, 3], "application/octet-stream");

    item.set_secret(&value, None).await.expect("set secret");

    let stored = mock.item(ITEM_PATH).expect("item exists");
    assert_eq!(stored.secret, vec![1, 2, 3]);
    assert_eq!(stored.content_type, "application/octet-stream");

    let call = &mock.calls_to("SetSecret")[0];
    let sent = call.args[1].as_struct().expect("secret struct");
    assert_eq!(sent[0].as_bytes().map(<[u8]>::len), Some(16));
    assert_ne!(sent[1].as_bytes(), Some(&[1u8, 2, 3][..]));

    assert_eq!(item.get_secret(None).await, Ok(value));
}

#[tokio::test]
async fn set_secret_over_plain_session() {
    let (mock, _service, item) = setup_plain();

    item.set_secret(&SecretValue::new_text("changed"), None)
        .await
        .expect("set secret");

    assert_eq!(mock.item(ITEM_PATH).expect("item exists").secret, b"changed");
    assert_eq!(mock.calls_to("OpenSession").len(), 1);
}

#[tokio::test]
async fn set_secret_start_and_finish() {
    let (mock, _service, item) = setup();
    let (tx, rx) = tokio::sync::oneshot::channel();

    item.set_secret_start(SecretValue::new_text("async"), None, move |result| {
        let _ = tx.send(result);
    });

    let result = rx.await.expect("callback should run");
    item.set_secret_finish(result).expect("set secret");
    assert_eq!(mock.item(ITEM_PATH).expect("item exists").secret, b"async");
}

#[tokio::test]
async fn released_service_is_reported() {
    let (mock, service, item) = setup();
    drop(service);

    assert_eq!(item.get_secret(None).await, Err(Error::ServiceReleased));
    assert!(matches!(item.service(), Err(Error::ServiceReleased)));
    assert!(mock.calls().is_empty());
}

#[tokio::test]
async fn item_keeps_a_path_and_a_service() {
    let (_mock, service, item) = setup();

    assert_eq!(item.path(), ITEM_PATH);
    let owner = item.service().expect("service is alive");
    assert_eq!(owner.path(), service.path());
}

#[test]
fn sync_calls_block_until_done() {
    let (mock, _service, item) = setup();

    let secret = item.get_secret_sync(None).expect("secret");
    assert_eq!(secret.get(), b"s3cret");

    item.set_secret_sync(&SecretValue::new_text("blocking"), None)
        .expect("set secret");
    assert_eq!(mock.item(ITEM_PATH).expect("item exists").secret, b"blocking");
}

#[tokio::test(flavor = "multi_thread")]
async fn sync_calls_work_from_blocking_threads() {
    let (mock, service, item) = setup();

    let secret = tokio::task::spawn_blocking(move || item.get_secret_sync(None))
        .await
        .expect("task should not panic")
        .expect("secret");

    assert_eq!(secret.get(), b"s3cret");
    assert_eq!(methods(&mock), vec!["OpenSession", "GetSecret"]);
    assert!(service.session_path().is_some());
}

#[test]
fn sync_calls_work_with_an_entered_runtime() {
    let (_mock, _service, item) = setup();
    let runtime = tokio::runtime::Runtime::new().expect("runtime");
    let _guard = runtime.enter();

    let secret = item.get_secret_sync(None).expect("secret");

    assert_eq!(secret.get(), b"s3cret");
}
