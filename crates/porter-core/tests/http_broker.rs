//! Integration tests for the HTTP broker client.
//!
//! Each test starts a fake broker on a random port with Axum and drives the
//! real client against it.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;

use porter_core::impls::{HttpBroker, InMemoryResultSink};
use porter_core::ports::{Broker, BrokerError, TaskRegistration};
use porter_core::{
    Argument, Config, NormalizedValue, RetryPolicy, Server, Signature, Tasks, TypeTag,
    WorkerExit,
};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct FakeBroker {
    jobs: Mutex<VecDeque<Value>>,
    requests: Mutex<Vec<(&'static str, Value)>>,
    polls: Mutex<Vec<(String, String)>>,
    fail_register: bool,
    garbage_polls: bool,
}

impl FakeBroker {
    fn record(&self, endpoint: &'static str, body: Value) {
        self.requests.lock().unwrap().push((endpoint, body));
    }

    fn bodies(&self, endpoint: &str) -> Vec<Value> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(e, _)| *e == endpoint)
            .map(|(_, body)| body.clone())
            .collect()
    }
}

type Shared = State<Arc<FakeBroker>>;

fn routes(state: Arc<FakeBroker>) -> Router {
    Router::new()
        .route(
            "/api/v1/goqueue/",
            post(|State(s): Shared, Json(body): Json<Value>| async move {
                s.record("publish", body);
                StatusCode::OK
            }),
        )
        .route(
            "/api/v1/goqueue/queue",
            post(|State(s): Shared, Json(body): Json<Value>| async move {
                s.record("declare", body);
                StatusCode::OK
            }),
        )
        .route(
            "/api/v1/goqueue/task/register",
            post(|State(s): Shared, Json(body): Json<Value>| async move {
                s.record("register", body);
                if s.fail_register {
                    StatusCode::INTERNAL_SERVER_ERROR
                } else {
                    StatusCode::OK
                }
            }),
        )
        .route(
            "/api/v1/goqueue/subscribe",
            post(|State(s): Shared, Json(body): Json<Value>| async move {
                s.record("subscribe", body);
                StatusCode::OK
            }),
        )
        .route(
            "/api/v1/goqueue/task/acknowledge",
            post(|State(s): Shared, Json(body): Json<Value>| async move {
                s.record("ack", body);
                StatusCode::OK
            }),
        )
        .route(
            "/api/v1/goqueue/queue/{qname}",
            get(
                |State(s): Shared,
                 Path(qname): Path<String>,
                 Query(query): Query<HashMap<String, String>>| async move {
                    let sname = query.get("sname").cloned().unwrap_or_default();
                    s.polls.lock().unwrap().push((qname, sname));
                    if s.garbage_polls {
                        return (StatusCode::OK, "not json").into_response();
                    }
                    let next = s.jobs.lock().unwrap().pop_front();
                    match next {
                        Some(job) => Json(job).into_response(),
                        None => StatusCode::SERVICE_UNAVAILABLE.into_response(),
                    }
                },
            ),
        )
        .with_state(state)
}

/// Start the fake broker on a random port, return its base URI.
async fn start_broker(state: Arc<FakeBroker>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let app = routes(state);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    format!("http://127.0.0.1:{port}")
}

fn config_for(uri: &str) -> Config {
    let port = uri.rsplit(':').next().unwrap().parse().unwrap();
    Config::new("127.0.0.1", port, Duration::from_secs(2))
        .with_queue("math")
        .with_poll_retry(RetryPolicy::fixed(Duration::from_millis(10), 500))
}

#[tokio::test]
async fn worker_consumes_job_over_http() {
    timeout(TEST_TIMEOUT, async {
        let fake = Arc::new(FakeBroker::default());
        fake.jobs.lock().unwrap().push_back(json!({
            "id": 1,
            "job_name": "add",
            "args": [{"value": 2.0, "type": "int"}, {"value": 3.0, "type": "int"}]
        }));
        let uri = start_broker(fake.clone()).await;

        let sink = Arc::new(InMemoryResultSink::new());
        let server = Server::new(config_for(&uri))
            .unwrap()
            .with_result_sink(sink.clone(), Duration::from_secs(60));
        server
            .register_tasks(Tasks::new().add("add", |a: i64, b: i64| a + b))
            .await
            .unwrap();

        let acked = {
            let fake = fake.clone();
            async move {
                while fake.bodies("ack").is_empty() {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        };
        let exits = server.new_worker("adder", 1).fetch(acked).await.unwrap();
        assert_eq!(exits, vec![WorkerExit::Shutdown]);

        assert_eq!(
            fake.bodies("register"),
            vec![json!({"task_names": ["add"], "qname": "math"})]
        );
        let subs = fake.bodies("subscribe");
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0]["name"], "adder");
        assert_eq!(subs[0]["qname"], "math");
        assert_eq!(
            fake.bodies("ack"),
            vec![json!({"ack": true, "qname": "math", "subscriber": "adder"})]
        );
        assert_eq!(
            fake.polls.lock().unwrap()[0],
            ("math".to_string(), "adder".to_string())
        );

        let record = sink.get("add_1").await.unwrap();
        assert_eq!(record.result, vec![NormalizedValue::Int(5)]);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn publish_and_declare_send_wire_bodies() {
    timeout(TEST_TIMEOUT, async {
        let fake = Arc::new(FakeBroker::default());
        let uri = start_broker(fake.clone()).await;
        let mut server = Server::new(config_for(&uri).with_queue("")).unwrap();

        server.declare_queue("math", 50, true).await.unwrap();
        server
            .publish(
                &Signature::new("add")
                    .arg(Argument::new(1, TypeTag::Int))
                    .arg(Argument::new("x", TypeTag::String)),
            )
            .await
            .unwrap();

        assert_eq!(
            fake.bodies("declare"),
            vec![json!({"name": "math", "cap": 50, "durable": true})]
        );
        assert_eq!(
            fake.bodies("publish"),
            vec![json!({
                "task": "add",
                "args": [{"value": 1, "type": "int"}, {"value": "x", "type": "string"}],
                "qname": "math"
            })]
        );
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn non_success_status_is_an_error() {
    timeout(TEST_TIMEOUT, async {
        let fake = Arc::new(FakeBroker {
            fail_register: true,
            ..FakeBroker::default()
        });
        let uri = start_broker(fake).await;
        let broker = HttpBroker::new(&uri, Duration::from_secs(2));

        let err = broker
            .register_tasks(&TaskRegistration {
                task_names: vec!["add".into()],
                qname: "math".into(),
            })
            .await
            .unwrap_err();

        assert_eq!(
            err,
            BrokerError::Status {
                endpoint: "/task/register".to_string(),
                status: 500,
            }
        );
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn malformed_poll_body_is_a_decode_error() {
    timeout(TEST_TIMEOUT, async {
        let fake = Arc::new(FakeBroker {
            garbage_polls: true,
            ..FakeBroker::default()
        });
        let uri = start_broker(fake).await;
        let broker = HttpBroker::new(&uri, Duration::from_secs(2));

        let err = broker.poll("math", "adder").await.unwrap_err();
        assert!(matches!(err, BrokerError::Decode(_)));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn worker_gives_up_on_a_broken_broker() {
    timeout(TEST_TIMEOUT, async {
        let fake = Arc::new(FakeBroker {
            garbage_polls: true,
            ..FakeBroker::default()
        });
        let uri = start_broker(fake.clone()).await;
        let config =
            config_for(&uri).with_poll_retry(RetryPolicy::fixed(Duration::from_millis(5), 3));
        let server = Server::new(config).unwrap();

        let exits = server
            .new_worker("adder", 2)
            .fetch(std::future::pending())
            .await
            .unwrap();

        assert_eq!(exits.len(), 2);
        assert!(
            exits
                .iter()
                .all(|e| matches!(e, WorkerExit::BrokerUnavailable { attempts: 3, .. }))
        );
        assert!(fake.bodies("ack").is_empty());
    })
    .await
    .expect("test timed out");
}
