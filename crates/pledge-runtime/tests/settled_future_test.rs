//! Tests for awaiting runtime promises from async Rust.

use pledge_runtime::{Runtime, UnhandledRejectionPolicy};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_await_manual_promise() {
    let runtime = Arc::new(Runtime::new());
    let handle = runtime.wrapper(|_| Ok(())).unwrap();
    let promise = runtime.promise(handle).unwrap();

    let remote = runtime.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        remote.resolve(handle, json!("ready")).unwrap();
    });

    assert_eq!(promise.settled().await, Ok(json!("ready")));
}

#[tokio::test]
async fn test_await_chain_after_drain() {
    let runtime = Runtime::new();
    let source = runtime
        .create(|resolve, _| {
            resolve(json!(3));
            Ok(())
        })
        .unwrap();
    let squared = runtime
        .then(source, |v| {
            let n = v.as_i64().unwrap_or(0);
            Ok(json!(n * n))
        })
        .unwrap();

    runtime.run_until_idle().unwrap();
    let result = runtime.promise(squared).unwrap().settled().await;
    assert_eq!(result, Ok(json!(9)));
}

#[tokio::test]
async fn test_await_rejection() {
    let runtime = Runtime::new();
    let handle = runtime.create(|_, _| Err(json!("bad input"))).unwrap();
    let result = runtime.promise(handle).unwrap().settled().await;
    assert_eq!(result, Err(json!("bad input")));

    // Awaiting is not a rejection handler
    assert!(runtime.run_until_idle().unwrap_err().is_unhandled_rejection());
}

#[test]
#[should_panic(expected = "Unhandled promise rejection")]
fn test_panic_policy_escalates() {
    let runtime = Runtime::builder()
        .unhandled_rejection(UnhandledRejectionPolicy::Panic)
        .build();
    runtime.create(|_, _| Err(json!("fatal"))).unwrap();
    let _ = runtime.run_until_idle();
}
