//! Concurrency tests for the session store.

use std::sync::Arc;
use std::time::Duration;
use switchboard_session::{SessionMessage, SessionStore};

#[tokio::test]
async fn concurrent_appends_to_one_session_lose_nothing() {
    let store = Arc::new(SessionStore::new());
    let tasks = 16;
    let appends_per_task = 25;

    let mut handles = Vec::new();
    for t in 0..tasks {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            for i in 0..appends_per_task {
                let msg = SessionMessage::new("user", serde_json::json!(format!("t{t}-m{i}")));
                store.append("shared", msg).await;
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let messages = store.read("shared").await;
    assert_eq!(messages.len(), tasks * appends_per_task);

    // Every append landed exactly once.
    let mut seen: Vec<String> = messages
        .iter()
        .map(|m| m.content.as_str().unwrap().to_string())
        .collect();
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), tasks * appends_per_task);
}

#[tokio::test]
async fn concurrent_appends_to_distinct_sessions_stay_separate() {
    let store = Arc::new(SessionStore::new());

    let mut handles = Vec::new();
    for s in 0..8 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            let id = format!("session-{s}");
            for i in 0..20 {
                store
                    .append(&id, SessionMessage::new("user", serde_json::json!(i)))
                    .await;
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    for s in 0..8 {
        assert_eq!(store.read(&format!("session-{s}")).await.len(), 20);
    }
}

#[tokio::test]
async fn sweep_races_appenders_without_corruption() {
    let store = Arc::new(SessionStore::with_ttl(Duration::from_millis(5)));

    let appender = {
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            for i in 0..100 {
                store
                    .append("busy", SessionMessage::new("user", serde_json::json!(i)))
                    .await;
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
    };

    let sweeper = {
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            for _ in 0..20 {
                store.sweep().await;
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
    };

    appender.await.unwrap();
    sweeper.await.unwrap();

    // The session may have been evicted and recreated any number of
    // times; whatever survives must be in append order, never torn.
    let messages = store.read("busy").await;
    for window in messages.windows(2) {
        let a = window[0].content.as_i64().unwrap();
        let b = window[1].content.as_i64().unwrap();
        assert!(a < b, "history out of order: {a} before {b}");
    }
}
