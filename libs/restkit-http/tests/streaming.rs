#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Streamed responses: server-sent events, NDJSON and concatenated JSON
//! delivered through per-call callbacks.

use httpmock::prelude::*;
use parking_lot::Mutex;
use restkit_http::{Client, HttpError, Payload, TextStreamEvent, options};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

fn client(server: &MockServer) -> Client {
    Client::builder().endpoint(server.base_url()).build().unwrap()
}

fn post(accept: &str) -> Payload {
    Payload::json(
        http::Method::POST,
        &serde_json::json!({"stream": true}),
        accept,
    )
    .unwrap()
}

#[derive(Debug, Deserialize, PartialEq)]
struct Delta {
    n: u32,
}

#[tokio::test]
async fn test_event_stream_concatenates_data() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(Method::POST)
            .path("/chat")
            .header("accept", "text/event-stream");
        then.status(200)
            .header("content-type", "text/event-stream")
            .body(
                "id: 1\nevent: delta\ndata: Hel\ndata: lo\n\n\
                 : keep-alive\n\n\
                 event: delta\ndata: , world\nretry: 1500\n\n\
                 data: [DONE]\n\n",
            );
    });

    let events: Arc<Mutex<Vec<TextStreamEvent>>> = Arc::default();
    let sink = Arc::clone(&events);
    client(&server)
        .call(
            post("text/event-stream"),
            None,
            vec![
                options::path(["chat"]),
                options::on_event(move |event| {
                    if event.data == "[DONE]" {
                        return Err(HttpError::EndOfStream);
                    }
                    sink.lock().push(event);
                    Ok(())
                }),
            ],
        )
        .await
        .unwrap();
    mock.assert();

    let events = events.lock();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].id, "1");
    assert_eq!(events[0].event, "delta");
    assert_eq!(events[0].data, "Hello");
    assert_eq!(events[1].retry, Some(Duration::from_millis(1500)));
    let text: String = events.iter().map(|e| e.data.as_str()).collect();
    assert_eq!(text, "Hello, world");
}

#[tokio::test]
async fn test_event_stream_without_callback_is_rejected() {
    let server = MockServer::start();
    let _m = server.mock(|when, then| {
        when.method(Method::POST).path("/chat");
        then.status(200)
            .header("content-type", "text/event-stream")
            .body("data: x\n\n");
    });

    let mut out = restkit_http::Json::<serde_json::Value>::new();
    let err = client(&server)
        .call(
            post("text/event-stream"),
            Some(&mut out),
            vec![options::path(["chat"])],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, HttpError::BadRequest(_)), "{err:?}");
}

#[tokio::test]
async fn test_ndjson_stops_at_end_of_stream() {
    let server = MockServer::start();
    let _m = server.mock(|when, then| {
        when.method(Method::POST).path("/pull");
        then.status(200)
            .header("content-type", "application/x-ndjson")
            .body("{\"n\":1}\n{\"n\":2}\n{\"n\":3}\n{\"n\":4}\n");
    });

    let seen: Arc<Mutex<Vec<u32>>> = Arc::default();
    let sink = Arc::clone(&seen);
    client(&server)
        .call(
            post("application/x-ndjson"),
            None,
            vec![
                options::path(["pull"]),
                options::on_json(move |delta: Delta| {
                    sink.lock().push(delta.n);
                    if delta.n == 2 {
                        return Err(HttpError::EndOfStream);
                    }
                    Ok(())
                }),
            ],
        )
        .await
        .unwrap();
    assert_eq!(*seen.lock(), vec![1, 2]);
}

#[tokio::test]
async fn test_json_response_read_as_value_stream() {
    let server = MockServer::start();
    let _m = server.mock(|when, then| {
        when.method(Method::GET).path("/status");
        then.status(200)
            .header("content-type", "application/json")
            .body("{\"n\":10}{\"n\":20}\n  {\"n\":30}");
    });

    let seen: Arc<Mutex<Vec<u32>>> = Arc::default();
    let sink = Arc::clone(&seen);
    client(&server)
        .call(
            Payload::empty(http::Method::GET, "application/json"),
            None,
            vec![
                options::path(["status"]),
                options::on_json(move |delta: Delta| {
                    sink.lock().push(delta.n);
                    Ok(())
                }),
            ],
        )
        .await
        .unwrap();
    assert_eq!(*seen.lock(), vec![10, 20, 30]);
}

#[tokio::test]
async fn test_json_callback_and_target_both_receive_value() {
    let server = MockServer::start();
    let _m = server.mock(|when, then| {
        when.method(Method::GET).path("/status");
        then.status(200)
            .header("content-type", "application/json")
            .body("{\"n\":7}");
    });

    let seen: Arc<Mutex<Vec<u32>>> = Arc::default();
    let sink = Arc::clone(&seen);
    let mut out = restkit_http::Json::<Delta>::new();
    client(&server)
        .call(
            Payload::empty(http::Method::GET, "application/json"),
            Some(&mut out),
            vec![
                options::path(["status"]),
                options::on_json(move |delta: Delta| {
                    sink.lock().push(delta.n);
                    Ok(())
                }),
            ],
        )
        .await
        .unwrap();
    assert_eq!(*seen.lock(), vec![7]);
    assert_eq!(out.into_inner(), Some(Delta { n: 7 }));
}

#[tokio::test]
async fn test_callback_error_aborts_stream() {
    let server = MockServer::start();
    let _m = server.mock(|when, then| {
        when.method(Method::POST).path("/pull");
        then.status(200)
            .header("content-type", "application/x-ndjson")
            .body("{\"n\":1}\n{\"n\":\"two\"}\n");
    });

    let err = client(&server)
        .call(
            post("application/x-ndjson"),
            None,
            vec![
                options::path(["pull"]),
                options::on_json(|_: Delta| Ok(())),
            ],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, HttpError::Json(_)), "{err:?}");
}
