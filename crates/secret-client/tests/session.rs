#![allow(missing_docs)]

use std::sync::Arc;

use secret_client::{
    transport::NOT_SUPPORTED_ERROR, Algorithm, CancellationToken, Error, Service,
    ServiceSettings, TransportError, WireValue,
};
use secret_client_test::{MockItem, MockSecretService, SESSION_PREFIX};

const ITEM_PATH: &str = "/org/freedesktop/secrets/collection/login/1";

fn service(mock: &MockSecretService) -> Service<MockSecretService> {
    Service::new(Arc::new(mock.clone()), None)
}

fn plain_service(mock: &MockSecretService) -> Service<MockSecretService> {
    let settings = ServiceSettings {
        algorithms: vec![Algorithm::Plain],
        ..ServiceSettings::default()
    };
    Service::new(Arc::new(mock.clone()), Some(settings))
}

#[tokio::test]
async fn concurrent_callers_share_one_negotiation() {
    let mock = MockSecretService::new();
    mock.hold_negotiation();
    let service = service(&mock);

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let service = service.clone();
            tokio::spawn(async move { service.ensure_session(None).await })
        })
        .collect();

    mock.wait_for_calls("OpenSession", 1).await;
    mock.release_negotiation();

    let mut paths = Vec::new();
    for task in tasks {
        paths.push(
            task.await
                .expect("task should not panic")
                .expect("negotiation should succeed"),
        );
    }

    assert_eq!(mock.calls_to("OpenSession").len(), 1);
    assert!(paths.iter().all(|path| path == &paths[0]));
    assert!(paths[0].starts_with(SESSION_PREFIX));
}

#[tokio::test]
async fn cached_session_is_reused() {
    let mock = MockSecretService::new();
    let service = service(&mock);
    assert_eq!(service.session_path(), None);

    let first = service.ensure_session(None).await.expect("first session");
    let second = service.ensure_session(None).await.expect("cached session");

    assert_eq!(first, second);
    assert_eq!(service.session_path(), Some(first));
    assert_eq!(mock.calls_to("OpenSession").len(), 1);
}

#[tokio::test]
async fn encrypted_algorithm_is_preferred() {
    let mock = MockSecretService::new();
    let service = service(&mock);

    service.ensure_session(None).await.expect("session");

    let calls = mock.calls_to("OpenSession");
    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls[0].args[0],
        WireValue::from("dh-ietf1024-sha256-aes128-cbc-pkcs7")
    );
    assert_eq!(calls[0].args[1].as_bytes().map(<[u8]>::len), Some(128));
    assert_eq!(calls[0].object_path, "/org/freedesktop/secrets");
}

#[tokio::test]
async fn falls_back_to_plain_when_encryption_is_not_supported() {
    let mock = MockSecretService::new().with_algorithms(&[Algorithm::Plain]);
    let service = service(&mock);

    service.ensure_session(None).await.expect("plain session");

    let algorithms: Vec<_> = mock
        .calls_to("OpenSession")
        .into_iter()
        .map(|call| call.args[0].clone())
        .collect();
    assert_eq!(
        algorithms,
        vec![
            WireValue::from("dh-ietf1024-sha256-aes128-cbc-pkcs7"),
            WireValue::from("plain"),
        ]
    );
}

#[tokio::test]
async fn fails_when_no_algorithm_is_supported() {
    let mock = MockSecretService::new().with_algorithms(&[]);
    let service = service(&mock);

    let err = service.ensure_session(None).await.unwrap_err();

    match err {
        Error::Transport(e) => assert_eq!(e.name, NOT_SUPPORTED_ERROR),
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(service.session_path(), None);
}

#[tokio::test]
async fn empty_session_path_is_a_protocol_error() {
    let mock = MockSecretService::new();
    mock.respond_to(
        "OpenSession",
        Ok(vec![WireValue::variant(""), WireValue::object_path("")]),
    );
    let service = plain_service(&mock);

    let err = service.ensure_session(None).await.unwrap_err();
    assert!(matches!(err, Error::Protocol(_)));

    mock.respond_to(
        "OpenSession",
        Ok(vec![WireValue::variant(""), WireValue::object_path("/")]),
    );
    let err = service.ensure_session(None).await.unwrap_err();
    assert!(matches!(err, Error::Protocol(_)));

    // A failed negotiation is not cached.
    assert_eq!(mock.calls_to("OpenSession").len(), 2);
    assert_eq!(service.session_path(), None);
}

#[tokio::test]
async fn missing_reply_values_are_a_protocol_error() {
    let mock = MockSecretService::new();
    mock.respond_to("OpenSession", Ok(vec![WireValue::variant("")]));
    let service = plain_service(&mock);

    let err = service.ensure_session(None).await.unwrap_err();
    assert!(matches!(err, Error::Protocol(_)));
}

#[tokio::test]
async fn invalid_server_public_key_is_a_protocol_error() {
    let mock = MockSecretService::new();
    mock.respond_to(
        "OpenSession",
        Ok(vec![
            WireValue::variant("not a key"),
            WireValue::object_path("/org/freedesktop/secrets/session/9"),
        ]),
    );
    let service = service(&mock);

    let err = service.ensure_session(None).await.unwrap_err();
    assert!(matches!(err, Error::Protocol(_)));

    mock.respond_to(
        "OpenSession",
        Ok(vec![
            WireValue::variant(vec![1u8]),
            WireValue::object_path("/org/freedesktop/secrets/session/9"),
        ]),
    );
    let err = service.ensure_session(None).await.unwrap_err();
    assert!(matches!(err, Error::Protocol(_)));
}

#[tokio::test]
async fn failed_negotiation_is_shared_by_every_waiter() {
    let mock = MockSecretService::new();
    mock.add_item(ITEM_PATH, MockItem::new("Mail", "s3cret"));
    let denied = TransportError::new("org.freedesktop.DBus.Error.AccessDenied", "Denied");
    mock.respond_to("OpenSession", Err(denied.clone()));
    mock.hold_negotiation();
    let service = service(&mock);

    let readers: Vec<_> = (0..3)
        .map(|_| {
            let item = service.item(ITEM_PATH);
            tokio::spawn(async move { item.get_secret(None).await })
        })
        .collect();

    mock.wait_for_calls("OpenSession", 1).await;
    tokio::task::yield_now().await;
    mock.release_negotiation();

    for reader in readers {
        assert_eq!(
            reader.await.expect("task should not panic"),
            Err(Error::Transport(denied.clone()))
        );
    }
    assert_eq!(mock.calls_to("OpenSession").len(), 1);
    assert!(mock.calls_to("GetSecret").is_empty());
    assert_eq!(service.session_path(), None);
}

#[tokio::test]
async fn cancelling_the_negotiating_caller_fails_every_waiter() {
    let mock = MockSecretService::new();
    mock.hold_negotiation();
    let service = service(&mock);
    let token = CancellationToken::new();

    let initiator = {
        let service = service.clone();
        let token = token.clone();
        tokio::spawn(async move { service.ensure_session(Some(token)).await })
    };
    mock.wait_for_calls("OpenSession", 1).await;

    let waiter = service.ensure_session(None);
    let cancel = async {
        tokio::task::yield_now().await;
        token.cancel();
    };
    let (waiter_result, ()) = tokio::join!(waiter, cancel);

    assert_eq!(waiter_result, Err(Error::Cancelled));
    assert_eq!(
        initiator.await.expect("task should not panic"),
        Err(Error::Cancelled)
    );
    assert_eq!(service.session_path(), None);

    // The next caller negotiates again.
    mock.release_negotiation();
    service.ensure_session(None).await.expect("new negotiation");
    assert_eq!(mock.calls_to("OpenSession").len(), 2);
}

#[tokio::test]
async fn cancelling_a_waiter_leaves_the_negotiation_running() {
    let mock = MockSecretService::new();
    mock.hold_negotiation();
    let service = service(&mock);

    let initiator = {
        let service = service.clone();
        tokio::spawn(async move { service.ensure_session(None).await })
    };
    mock.wait_for_calls("OpenSession", 1).await;

    let token = CancellationToken::new();
    let waiter = service.ensure_session(Some(token.clone()));
    let cancel = async {
        tokio::task::yield_now().await;
        token.cancel();
    };
    let (waiter_result, ()) = tokio::join!(waiter, cancel);
    assert_eq!(waiter_result, Err(Error::Cancelled));

    mock.release_negotiation();
    let path = initiator
        .await
        .expect("task should not panic")
        .expect("negotiation should succeed");
    assert_eq!(service.session_path(), Some(path));
}

#[tokio::test]
async fn already_cancelled_token_makes_no_call() {
    let mock = MockSecretService::new();
    let service = service(&mock);
    let token = CancellationToken::new();
    token.cancel();

    let result = service.ensure_session(Some(token)).await;

    assert_eq!(result, Err(Error::Cancelled));
    assert!(mock.calls().is_empty());
}

#[tokio::test]
async fn close_session_forgets_the_session() {
    let mock = MockSecretService::new();
    let service = service(&mock);
    let first = service.ensure_session(None).await.expect("session");
    assert_eq!(mock.session_count(), 1);

    service.close_session(None).await.expect("close");

    assert_eq!(service.session_path(), None);
    assert_eq!(mock.session_count(), 0);
    let close = mock.calls_to("Close");
    assert_eq!(close.len(), 1);
    assert_eq!(close[0].object_path, first);

    let second = service.ensure_session(None).await.expect("new session");
    assert_ne!(first, second);
}

#[tokio::test]
async fn close_without_session_is_a_no_op() {
    let mock = MockSecretService::new();
    let service = service(&mock);

    service.close_session(None).await.expect("close");

    assert!(mock.calls().is_empty());
}

#[tokio::test]
async fn ensure_session_start_reports_through_callback() {
    let mock = MockSecretService::new();
    let service = service(&mock);
    let (tx, rx) = tokio::sync::oneshot::channel();

    service.ensure_session_start(None, move |result| {
        let _ = tx.send(result);
    });

    let result = rx.await.expect("callback should run");
    assert_eq!(result.source(), "/org/freedesktop/secrets");
    let path = service.ensure_session_finish(result).expect("session");
    assert_eq!(service.session_path(), Some(path));
}

#[tokio::test]
async fn ensure_session_start_returns_cancellable_token() {
    let mock = MockSecretService::new();
    mock.hold_negotiation();
    let service = service(&mock);
    let (tx, rx) = tokio::sync::oneshot::channel();

    let token = service.ensure_session_start(None, move |result| {
        let _ = tx.send(result);
    });
    mock.wait_for_calls("OpenSession", 1).await;
    token.cancel();

    let result = rx.await.expect("callback should run");
    assert_eq!(service.ensure_session_finish(result), Err(Error::Cancelled));
}

#[test]
fn ensure_session_sync_blocks_until_ready() {
    let mock = MockSecretService::new();
    let service = service(&mock);

    let path = service.ensure_session_sync(None).expect("session");

    assert_eq!(service.session_path(), Some(path));
}

#[tokio::test(flavor = "multi_thread")]
async fn ensure_session_sync_from_a_blocking_thread() {
    let mock = MockSecretService::new();
    let service = service(&mock);

    let blocking = service.clone();
    let path = tokio::task::spawn_blocking(move || blocking.ensure_session_sync(None))
        .await
        .expect("task should not panic")
        .expect("session");

    assert_eq!(service.session_path(), Some(path));
    assert_eq!(mock.calls_to("OpenSession").len(), 1);
}
