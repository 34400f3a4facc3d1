use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};

use crate::event::{
    EventBus, EventBusConfig, EventSystemError, RequestOptions, ResponseEnvelope, response_topic,
};

#[tokio::test]
async fn test_emit_and_wait_resolves_with_response_data() {
    let bus = EventBus::new();
    bus.on_request("math.double", |event| async move {
        match event.payload["n"].as_i64() {
            Some(n) => Ok(json!(n * 2)),
            None => Err("missing n".to_string()),
        }
    })
    .unwrap();

    let result = bus
        .emit_and_wait("math.double", json!({ "n": 21 }), RequestOptions::new())
        .await
        .unwrap();

    assert_eq!(result, json!(42));
    assert_eq!(bus.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_requests_are_correlated_out_of_order() {
    let bus = EventBus::new();
    // The first request is answered last
    bus.on_request("echo.delayed", |event| async move {
        let delay = event.payload["delay_ms"].as_u64().unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Ok(event.payload["tag"].clone())
    })
    .unwrap();

    let slow = bus.emit_and_wait(
        "echo.delayed",
        json!({ "tag": "slow", "delay_ms": 50 }),
        RequestOptions::new(),
    );
    let fast = bus.emit_and_wait(
        "echo.delayed",
        json!({ "tag": "fast", "delay_ms": 5 }),
        RequestOptions::new(),
    );
    let (slow, fast) = tokio::join!(slow, fast);

    assert_eq!(slow.unwrap(), json!("slow"));
    assert_eq!(fast.unwrap(), json!("fast"));
    assert_eq!(bus.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_without_responder_cleans_up() {
    let bus = EventBus::new();

    let err = bus
        .emit_and_wait("nobody.listens", json!(null), RequestOptions::new().timeout_ms(100))
        .await
        .unwrap_err();

    match err {
        EventSystemError::RequestTimeout { topic, timeout_ms, attempts, .. } => {
            assert_eq!(topic, "nobody.listens");
            assert_eq!(timeout_ms, 100);
            assert_eq!(attempts, 1);
        }
        other => panic!("expected timeout, got {:?}", other),
    }
    assert_eq!(bus.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_retries_reemit_until_budget_is_spent() {
    let bus = EventBus::new();
    let emits = Arc::new(AtomicU32::new(0));
    let ids = Arc::new(Mutex::new(Vec::new()));

    let e = Arc::clone(&emits);
    let i = Arc::clone(&ids);
    bus.on_sync("flaky.service", move |event| {
        e.fetch_add(1, Ordering::SeqCst);
        i.lock().unwrap().push(event.correlation_id.clone());
        Ok(())
    })
    .unwrap();

    let err = bus
        .emit_and_wait(
            "flaky.service",
            json!(null),
            RequestOptions::new().timeout_ms(50).retries(2),
        )
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert!(matches!(err, EventSystemError::RequestTimeout { attempts: 3, .. }));
    assert_eq!(emits.load(Ordering::SeqCst), 3);
    assert_eq!(bus.pending_count(), 0);

    // Every attempt carries its own correlation id
    let ids = ids.lock().unwrap();
    assert!(ids.iter().all(Option::is_some));
    assert_ne!(ids[0], ids[1]);
    assert_ne!(ids[1], ids[2]);
}

#[tokio::test(start_paused = true)]
async fn test_retry_succeeds_on_later_attempt() {
    let bus = EventBus::with_config(EventBusConfig {
        request_timeout_ms: 50,
        request_retries: 3,
        ..EventBusConfig::default()
    });
    let attempts = Arc::new(AtomicU32::new(0));

    // Ignore the first request, answer the second
    let a = Arc::clone(&attempts);
    let responder = bus.clone();
    bus.on_sync("warming.up", move |event| {
        if a.fetch_add(1, Ordering::SeqCst) >= 1 {
            if let Some(id) = &event.correlation_id {
                responder.respond(id, Ok(json!("ready")));
            }
        }
        Ok(())
    })
    .unwrap();

    let result = bus
        .emit_and_wait("warming.up", json!(null), RequestOptions::new())
        .await
        .unwrap();

    assert_eq!(result, json!("ready"));
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_responder_error_is_not_retried() {
    let bus = EventBus::new();
    let calls = Arc::new(AtomicU32::new(0));

    let c = Arc::clone(&calls);
    bus.on_request("db.get", move |_| {
        c.fetch_add(1, Ordering::SeqCst);
        async { Err::<Value, String>("record not found".to_string()) }
    })
    .unwrap();

    let err = bus
        .emit_and_wait("db.get", json!({ "key": "x" }), RequestOptions::new().retries(5))
        .await
        .unwrap_err();

    match &err {
        EventSystemError::ResponderError { topic, message, .. } => {
            assert_eq!(topic, "db.get");
            assert_eq!(message, "record not found");
        }
        other => panic!("expected responder error, got {:?}", other),
    }
    assert!(!err.is_timeout());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_late_response_is_ignored() {
    let bus = EventBus::new();
    let seen = Arc::new(Mutex::new(None));

    let s = Arc::clone(&seen);
    bus.on_sync("slowpoke", move |event| {
        *s.lock().unwrap() = event.correlation_id.clone();
        Ok(())
    })
    .unwrap();

    let err = bus
        .emit_and_wait("slowpoke", json!(null), RequestOptions::new().timeout_ms(20))
        .await
        .unwrap_err();
    assert!(err.is_timeout());

    let id = seen.lock().unwrap().clone().unwrap();
    assert_eq!(bus.respond(&id, Ok(json!("too late"))), 0);
    assert_eq!(bus.pending_count(), 0);
}

#[tokio::test]
async fn test_clear_pending_rejects_waiters() {
    let bus = EventBus::new();

    let waiter = {
        let bus = bus.clone();
        tokio::spawn(async move {
            bus.emit_and_wait("never.answered", json!(null), RequestOptions::new())
                .await
        })
    };
    while bus.pending_count() == 0 {
        tokio::task::yield_now().await;
    }

    let info = bus.pending_requests();
    assert_eq!(info.len(), 1);
    assert_eq!(info[0].topic, "never.answered");

    assert_eq!(bus.clear_pending(), 1);
    let err = waiter.await.unwrap().unwrap_err();
    assert!(matches!(err, EventSystemError::RequestCleared { .. }));
    assert_eq!(bus.pending_count(), 0);
}

#[tokio::test]
async fn test_duplicate_correlation_id_is_rejected() {
    let bus = EventBus::new();

    let first = {
        let bus = bus.clone();
        tokio::spawn(async move {
            bus.emit_and_wait(
                "fixed.id",
                json!(null),
                RequestOptions::new().correlation_id("req-1"),
            )
            .await
        })
    };
    while bus.pending_count() == 0 {
        tokio::task::yield_now().await;
    }

    let err = bus
        .emit_and_wait("fixed.id", json!(null), RequestOptions::new().correlation_id("req-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, EventSystemError::CorrelationIdInUse { .. }));

    // The first request is still answerable by its caller-supplied id
    bus.respond("req-1", Ok(json!(1)));
    assert_eq!(first.await.unwrap().unwrap(), json!(1));
}

#[tokio::test]
async fn test_typed_request() {
    #[derive(serde::Serialize)]
    struct Lookup {
        key: String,
    }
    #[derive(serde::Deserialize, Debug, PartialEq)]
    struct Record {
        key: String,
        value: u32,
    }

    let bus = EventBus::new();
    bus.on_request("store.lookup", |event| async move {
        Ok(json!({ "key": event.payload["key"], "value": 9 }))
    })
    .unwrap();

    let record: Record = bus
        .request("store.lookup", &Lookup { key: "k".to_string() }, RequestOptions::new())
        .await
        .unwrap();
    assert_eq!(record, Record { key: "k".to_string(), value: 9 });
}

#[test]
fn test_response_envelope_parsing() {
    assert_eq!(
        ResponseEnvelope::from_payload(&json!({ "data": 5 })),
        ResponseEnvelope::ok(json!(5))
    );
    assert_eq!(
        ResponseEnvelope::from_payload(&json!({ "error": "bad" })),
        ResponseEnvelope::err("bad")
    );
    // Bare payloads are data
    assert_eq!(
        ResponseEnvelope::from_payload(&json!([1, 2])),
        ResponseEnvelope::ok(json!([1, 2]))
    );
    // Structured errors keep their JSON text
    let structured = ResponseEnvelope::from_payload(&json!({ "error": { "code": 404 } }));
    assert_eq!(structured.error.as_deref(), Some(r#"{"code":404}"#));

    assert_eq!(response_topic("abc"), "response.abc");
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_request_releases_its_correlation_id() {
    let bus = EventBus::new();
    let options = || RequestOptions::new().timeout_ms(1_000).correlation_id("cid-1");

    // The caller gives up long before the request's own timeout
    let abandoned = tokio::time::timeout(
        Duration::from_millis(10),
        bus.emit_and_wait("nobody.home", json!({}), options()),
    )
    .await;
    assert!(abandoned.is_err());
    assert_eq!(bus.pending_count(), 0);

    let responder = bus.clone();
    bus.on_sync("nobody.home", move |event| {
        if let Some(id) = &event.correlation_id {
            responder.respond(id, Ok(json!("here")));
        }
        Ok(())
    })
    .unwrap();

    let answer = bus
        .emit_and_wait("nobody.home", json!({}), options())
        .await
        .unwrap();
    assert_eq!(answer, json!("here"));
    assert_eq!(bus.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_unbounded_retry_budget_does_not_overflow() {
    let bus = EventBus::new();
    let calls = Arc::new(AtomicU32::new(0));
    let c = Arc::clone(&calls);
    bus.on_request("flaky.service", move |_event| {
        let call = c.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
            if call < 3 {
                // Never answer the first two attempts
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            Ok::<_, String>(json!(call))
        }
    })
    .unwrap();

    let result = bus
        .emit_and_wait(
            "flaky.service",
            json!({}),
            RequestOptions::new().timeout_ms(50).retries(u32::MAX),
        )
        .await
        .unwrap();

    assert_eq!(result, json!(3));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}
