//! End-to-end tests against an in-process WebSocket server.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use assert_matches::assert_matches;
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use wsbridge_client::{
    ClientError, InboundMessage, MessageConsumer, ReplayTrigger, SubscriptionError,
    SubscriptionOutcome, SubscriptionResult, SubscriptionTask, TaskContext,
};
use wsbridge_core::{
    ConnectionStatus, EndpointDescriptor, Headers, HttpMethod, HttpSubscription, LinkRef,
    OAuthGrant, Subscription,
};

use common::{Mode, TestServer, client, eventually, fast_config};

const WAIT: Duration = Duration::from_secs(5);

fn protocol() -> LinkRef {
    LinkRef::protocol("proto")
}

fn messages(bodies: &[&str]) -> Vec<Subscription> {
    bodies.iter().map(|b| Subscription::message(*b)).collect()
}

// ── Connect and replay ──────────────────────────────────────────────

#[tokio::test]
async fn message_subscription_sent_once_after_settle_delay() {
    let server = TestServer::start(Mode::Normal).await;
    let c = client(EndpointDescriptor::new(server.uri()), fast_config());
    c.register_connected_task(
        protocol(),
        SubscriptionTask::new(c.executor().clone(), messages(&["hello"])),
    );

    c.connect();
    assert!(eventually(WAIT, || c.status() == ConnectionStatus::Connected).await);
    assert!(eventually(WAIT, || server.received().len() == 1).await);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(server.received(), vec!["hello"]);

    let report = c.last_replay().unwrap();
    assert_eq!(report.trigger, ReplayTrigger::Connected);
    assert_eq!(report.failures(), 0);
    c.disconnect();
}

#[tokio::test]
async fn replay_follows_declaration_and_registration_order() {
    let server = TestServer::start(Mode::Normal).await;
    let c = client(EndpointDescriptor::new(server.uri()), fast_config());
    let executor = c.executor().clone();
    c.register_connected_task(
        protocol(),
        SubscriptionTask::new(executor.clone(), messages(&["a", "b"])),
    );
    c.register_connected_task(
        LinkRef::attribute("proto", "asset1", "temp"),
        SubscriptionTask::new(executor, messages(&["c"])),
    );
    c.register_connected_task(
        LinkRef::attribute("proto", "asset1", "custom"),
        |ctx: TaskContext| async move {
            let _ = ctx.client().send_message("d");
        },
    );

    c.connect();
    assert!(eventually(WAIT, || server.received().len() == 4).await);
    assert_eq!(server.received(), vec!["a", "b", "c", "d"]);
    c.disconnect();
}

#[tokio::test]
async fn replay_runs_again_after_reconnect() {
    let server = TestServer::start(Mode::Normal).await;
    let c = client(EndpointDescriptor::new(server.uri()), fast_config());
    c.register_connected_task(
        protocol(),
        SubscriptionTask::new(c.executor().clone(), messages(&["hello"])),
    );

    c.connect();
    assert!(eventually(WAIT, || server.received().len() == 1).await);
    c.disconnect();
    assert_eq!(c.status(), ConnectionStatus::Disconnected);

    c.connect();
    assert!(eventually(WAIT, || server.received().len() == 2).await);
    assert_eq!(server.accepted(), 2);
    c.disconnect();
}

#[tokio::test]
async fn disconnect_cancels_scheduled_replay() {
    let server = TestServer::start(Mode::Normal).await;
    let mut config = fast_config();
    config.settle_delay = Duration::from_millis(400);
    let c = client(EndpointDescriptor::new(server.uri()), config);
    c.register_connected_task(
        protocol(),
        SubscriptionTask::new(c.executor().clone(), messages(&["hello"])),
    );

    c.connect();
    assert!(eventually(WAIT, || c.status() == ConnectionStatus::Connected).await);
    c.disconnect();

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(server.received().is_empty());
    assert!(c.last_replay().is_none());
}

#[tokio::test]
async fn duplicate_connect_makes_one_attempt() {
    let server = TestServer::start(Mode::Normal).await;
    let c = client(EndpointDescriptor::new(server.uri()), fast_config());

    c.connect();
    c.connect();
    assert!(eventually(WAIT, || c.status() == ConnectionStatus::Connected).await);
    c.connect();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.accepted(), 1);
    c.disconnect();
}

// ── Late registration ───────────────────────────────────────────────

#[tokio::test]
async fn late_attribute_tasks_run_once_without_protocol_replay() {
    let server = TestServer::start(Mode::Normal).await;
    let http = MockServer::start().await;
    for p in ["/a", "/b"] {
        Mock::given(method("GET"))
            .and(path(p))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&http)
            .await;
    }

    let c = client(EndpointDescriptor::new(server.uri()), fast_config());
    c.register_connected_task(
        protocol(),
        SubscriptionTask::new(c.executor().clone(), messages(&["hello"])),
    );
    c.connect();
    assert!(eventually(WAIT, || c.last_replay().is_some()).await);

    for (attr, p) in [("temp", "/a"), ("hum", "/b")] {
        let sub = Subscription::http(format!("{}{p}", http.uri()));
        c.register_connected_task(
            LinkRef::attribute("proto", "asset1", attr),
            SubscriptionTask::new(c.executor().clone(), vec![sub]),
        );
    }

    assert!(
        eventually(WAIT, || {
            c.last_replay()
                .is_some_and(|r| r.trigger == ReplayTrigger::LateRegistration)
        })
        .await
    );
    tokio::time::sleep(Duration::from_millis(300)).await;
    http.verify().await;
    assert_eq!(server.received(), vec!["hello"]);
    c.disconnect();
}

#[tokio::test]
async fn unregistered_late_task_never_runs() {
    let server = TestServer::start(Mode::Normal).await;
    let mut config = fast_config();
    config.late_registration_delay = Duration::from_millis(300);
    let c = client(EndpointDescriptor::new(server.uri()), config);
    c.connect();
    assert!(eventually(WAIT, || c.last_replay().is_some()).await);

    let link = LinkRef::attribute("proto", "asset1", "temp");
    c.register_connected_task(
        link.clone(),
        SubscriptionTask::new(c.executor().clone(), messages(&["late"])),
    );
    assert!(c.unregister_connected_task(&link));

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(server.received().is_empty());
    c.disconnect();
}

#[tokio::test]
async fn task_registered_before_replay_snapshot_runs_once() {
    let server = TestServer::start(Mode::Normal).await;
    let mut config = fast_config();
    config.settle_delay = Duration::from_millis(300);
    let c = client(EndpointDescriptor::new(server.uri()), config);

    c.connect();
    assert!(eventually(WAIT, || c.status() == ConnectionStatus::Connected).await);

    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    c.register_connected_task(
        LinkRef::attribute("proto", "asset1", "temp"),
        move |_ctx: TaskContext| {
            let counter = Arc::clone(&counter);
            async move {
                let _ = counter.fetch_add(1, Ordering::SeqCst);
            }
        },
    );

    assert!(eventually(WAIT, || c.last_replay().is_some()).await);
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(c.last_replay().unwrap().trigger, ReplayTrigger::Connected);
    c.disconnect();
}

// ── Cancellation ────────────────────────────────────────────────────

#[tokio::test]
async fn in_flight_results_dropped_after_release() {
    let server = TestServer::start(Mode::Normal).await;
    let http = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .expect(1)
        .mount(&http)
        .await;

    let c = client(EndpointDescriptor::new(server.uri()), fast_config());
    let sub = Subscription::http(format!("{}/slow", http.uri()));
    c.register_connected_task(
        protocol(),
        SubscriptionTask::new(c.executor().clone(), vec![sub]),
    );

    c.connect();
    assert!(eventually(WAIT, || c.status() == ConnectionStatus::Connected).await);
    // Settle delay has passed and the call is waiting on the delayed response.
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(http.received_requests().await.unwrap().len(), 1);

    c.release();
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(c.is_released());
    assert_eq!(c.status(), ConnectionStatus::Disconnected);
    assert!(c.last_replay().is_none());
    http.verify().await;
}

#[tokio::test]
async fn disconnect_mid_task_cancels_remaining_subscriptions() {
    let server = TestServer::start(Mode::Normal).await;
    let http = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(400)))
        .mount(&http)
        .await;

    let c = client(EndpointDescriptor::new(server.uri()), fast_config());
    let subscriptions = vec![
        Subscription::http(format!("{}/slow", http.uri())),
        Subscription::message("after"),
        Subscription::message("later"),
    ];
    let results: Arc<parking_lot::Mutex<Option<Vec<SubscriptionResult>>>> =
        Arc::new(parking_lot::Mutex::new(None));
    let sink = Arc::clone(&results);
    c.register_connected_task(protocol(), move |ctx: TaskContext| {
        let sink = Arc::clone(&sink);
        let subscriptions = subscriptions.clone();
        async move {
            let outcome = ctx
                .client()
                .executor()
                .execute_all(&ctx, &subscriptions)
                .await;
            *sink.lock() = Some(outcome);
        }
    });

    c.connect();
    assert!(eventually(WAIT, || c.status() == ConnectionStatus::Connected).await);
    tokio::time::sleep(Duration::from_millis(250)).await;
    c.disconnect();

    assert!(eventually(WAIT, || results.lock().is_some()).await);
    let results = results.lock().take().unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0], Ok(SubscriptionOutcome::Completed { status: 200 }));
    assert_eq!(results[1], Err(SubscriptionError::Cancelled));
    assert_eq!(results[2], Err(SubscriptionError::Cancelled));
    assert!(server.received().is_empty());
    assert!(c.last_replay().is_none());
}

// ── Authentication ──────────────────────────────────────────────────

#[tokio::test]
async fn oauth_token_replaces_static_authorization() {
    let server = TestServer::start(Mode::Normal).await;
    let http = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=client_credentials"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "abc123",
            "token_type": "Bearer",
        })))
        .expect(1)
        .mount(&http)
        .await;
    Mock::given(method("PUT"))
        .and(path("/subscribe"))
        .and(header("authorization", "Bearer abc123"))
        .and(header("x-site", "north"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&http)
        .await;

    let endpoint = EndpointDescriptor::new(server.uri())
        .with_headers(
            Headers::new()
                .with("Authorization", "Static nope")
                .with("X-Site", "north"),
        )
        .with_oauth(OAuthGrant {
            token_endpoint: format!("{}/token", http.uri()),
            client_id: "client".into(),
            client_secret: "secret".into(),
            scope: None,
        });
    let c = client(endpoint, fast_config());
    let sub = HttpSubscription::new(format!("{}/subscribe", http.uri())).with_method(HttpMethod::Put);
    c.register_connected_task(
        protocol(),
        SubscriptionTask::new(c.executor().clone(), vec![sub.into()]),
    );

    c.connect();
    assert!(eventually(WAIT, || c.last_replay().is_some()).await);

    assert_eq!(server.authorization(), vec![vec!["Bearer abc123".to_owned()]]);
    assert_eq!(c.last_replay().unwrap().failures(), 0);
    http.verify().await;
    c.disconnect();
}

#[tokio::test]
async fn basic_credential_sent_on_handshake() {
    let server = TestServer::start(Mode::Normal).await;
    let endpoint = EndpointDescriptor::new(server.uri()).with_basic("user", "pass");
    let c = client(endpoint, fast_config());

    c.connect();
    assert!(eventually(WAIT, || c.status() == ConnectionStatus::Connected).await);
    assert_eq!(server.authorization(), vec![vec!["Basic dXNlcjpwYXNz".to_owned()]]);
    c.disconnect();
}

#[tokio::test]
async fn token_failure_fails_attempt_before_transport() {
    let server = TestServer::start(Mode::Normal).await;
    let http = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "  " })))
        .mount(&http)
        .await;

    let endpoint = EndpointDescriptor::new(server.uri()).with_oauth(OAuthGrant {
        token_endpoint: format!("{}/token", http.uri()),
        client_id: "client".into(),
        client_secret: "secret".into(),
        scope: Some("read".into()),
    });
    let c = client(endpoint, fast_config());

    c.connect();
    assert!(eventually(WAIT, || c.status() == ConnectionStatus::Error).await);
    assert_matches!(c.last_error(), Some(ClientError::Authentication(_)));
    assert_eq!(server.accepted(), 0);
}

// ── Handshake classification ────────────────────────────────────────

#[tokio::test]
async fn client_error_rejection_is_permanent() {
    let server = TestServer::start(Mode::Reject(401)).await;
    let c = client(EndpointDescriptor::new(server.uri()), fast_config());

    c.connect();
    assert!(eventually(WAIT, || c.status() == ConnectionStatus::Error).await);
    let err = c.last_error().unwrap();
    assert!(err.is_permanent(), "{err}");
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn server_error_rejection_is_transient() {
    let server = TestServer::start(Mode::Reject(503)).await;
    let c = client(EndpointDescriptor::new(server.uri()), fast_config());

    c.connect();
    assert!(eventually(WAIT, || c.status() == ConnectionStatus::Error).await);
    assert!(c.last_error().unwrap().is_retryable());
}

#[tokio::test]
async fn refused_connection_is_transient() {
    let addr = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let c = client(EndpointDescriptor::new(format!("ws://{addr}/")), fast_config());

    c.connect();
    assert!(eventually(WAIT, || c.status() == ConnectionStatus::Error).await);
    assert_matches!(
        c.last_error(),
        Some(ClientError::Transport { permanent: false, .. })
    );
}

// ── Keepalive ───────────────────────────────────────────────────────

#[tokio::test]
async fn missing_pong_moves_to_error() {
    let server = TestServer::start(Mode::Silent).await;
    let c = client(EndpointDescriptor::new(server.uri()), fast_config());

    c.connect();
    assert!(eventually(WAIT, || c.status() == ConnectionStatus::Connected).await);
    assert!(eventually(WAIT, || c.status() == ConnectionStatus::Error).await);
    assert_matches!(c.last_error(), Some(ClientError::KeepaliveTimeout(_)));
    assert!(c.last_error().unwrap().is_retryable());
}

#[tokio::test]
async fn answered_pings_keep_connection_up() {
    let server = TestServer::start(Mode::Normal).await;
    let c = client(EndpointDescriptor::new(server.uri()), fast_config());

    c.connect();
    assert!(eventually(WAIT, || c.status() == ConnectionStatus::Connected).await);
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(c.status(), ConnectionStatus::Connected);
    c.disconnect();
}

#[tokio::test]
async fn disabled_ping_never_times_out() {
    let server = TestServer::start(Mode::Silent).await;
    let c = client(
        EndpointDescriptor::new(server.uri()).with_ping(false),
        fast_config(),
    );

    c.connect();
    assert!(eventually(WAIT, || c.status() == ConnectionStatus::Connected).await);
    tokio::time::sleep(Duration::from_millis(800)).await;
    assert_eq!(c.status(), ConnectionStatus::Connected);
    c.disconnect();
}

#[tokio::test]
async fn disconnect_cancels_pending_pong_timer() {
    let server = TestServer::start(Mode::Silent).await;
    let mut config = fast_config();
    config.idle_timeout = Duration::from_millis(300);
    config.pong_timeout = Duration::from_millis(300);
    let c = client(EndpointDescriptor::new(server.uri()), config);

    c.connect();
    assert!(eventually(WAIT, || c.status() == ConnectionStatus::Connected).await);
    // Ping is outstanding, pong deadline not reached.
    tokio::time::sleep(Duration::from_millis(350)).await;
    c.disconnect();
    assert_eq!(c.status(), ConnectionStatus::Disconnected);

    c.connect();
    assert!(eventually(WAIT, || c.status() == ConnectionStatus::Connected).await);
    // Past the first session's pong deadline, before the new one's.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(c.status(), ConnectionStatus::Connected);
    assert!(c.last_error().is_none());
    c.disconnect();
}

// ── Inbound routing ─────────────────────────────────────────────────

#[tokio::test]
async fn inbound_text_fans_out_to_every_consumer() {
    let server = TestServer::start(Mode::Normal).await;
    let c = client(EndpointDescriptor::new(server.uri()), fast_config());

    let hits = Arc::new(AtomicUsize::new(0));
    for attr in ["temp", "hum"] {
        let counter = Arc::clone(&hits);
        let consumer: MessageConsumer = Arc::new(move |m: &InboundMessage| {
            if m.as_text() == Some("reading") {
                let _ = counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        c.on_message(LinkRef::attribute("proto", "asset1", attr), consumer);
    }

    c.connect();
    assert!(eventually(WAIT, || c.status() == ConnectionStatus::Connected).await);
    server.push("reading");
    assert!(eventually(WAIT, || hits.load(Ordering::SeqCst) == 2).await);

    assert_eq!(c.remove_consumers(&LinkRef::attribute("proto", "asset1", "hum")), 1);
    server.push("reading");
    assert!(eventually(WAIT, || hits.load(Ordering::SeqCst) == 3).await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 3);
    c.disconnect();
}

#[tokio::test]
async fn status_observers_see_full_lifecycle() {
    let server = TestServer::start(Mode::Normal).await;
    let c = client(EndpointDescriptor::new(server.uri()), fast_config());
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    c.on_status_change(move |s| sink.lock().push(s));

    c.connect();
    assert!(eventually(WAIT, || c.status() == ConnectionStatus::Connected).await);
    c.disconnect();

    assert_eq!(
        *seen.lock(),
        vec![
            ConnectionStatus::Connecting,
            ConnectionStatus::Handshaking,
            ConnectionStatus::Connected,
            ConnectionStatus::Disconnecting,
            ConnectionStatus::Disconnected,
        ]
    );
}
