//! Envelope dispatch and authorization tests over the full router.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use rookery_contracts::{msgs, Envelope, Reply};
use rookery_core::{generate_secret, Colony, Conditions, Executor, FunctionSpec, Process};
use rookery_engine::{Controller, ControllerConfig};
use rookery_server::{router, ApiKeyIdentity, AppState, Validator};
use rookery_storage::InMemoryRepository;
use tower::ServiceExt;

struct TestServer {
    app: Router,
    server_secret: String,
    colony_secret: String,
    colony_id: String,
    executor_secret: String,
    executor_id: String,
}

async fn test_server() -> TestServer {
    let repo = Arc::new(InMemoryRepository::new());
    let (server_secret, server_owner_id) = generate_secret();
    let (colony_secret, colony_id) = generate_secret();
    let (executor_secret, executor_id) = generate_secret();

    let controller = Arc::new(Controller::new(
        repo.clone(),
        ControllerConfig::new()
            .with_sweeper_period(Duration::from_secs(3600))
            .with_generator_period(Duration::from_secs(3600))
            .with_cron_period(Duration::from_secs(3600)),
    ));
    let state = AppState {
        controller,
        validator: Arc::new(Validator::new(repo, server_owner_id)),
        recovery: Arc::new(ApiKeyIdentity),
    };
    TestServer {
        app: router(state),
        server_secret,
        colony_secret,
        colony_id,
        executor_secret,
        executor_id,
    }
}

impl TestServer {
    async fn call(&self, envelope: &Envelope) -> (StatusCode, Reply) {
        let request = Request::post("/api")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(envelope).unwrap()))
            .unwrap();
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let reply: Reply = serde_json::from_slice(&bytes).unwrap();
        (status, reply)
    }

    async fn bootstrap_colony(&self) {
        let msg = msgs::AddColonyMsg {
            colony: Colony::new(&self.colony_id, "testcolony"),
        };
        let envelope = Envelope::pack(msgs::ADD_COLONY, &msg, &self.server_secret).unwrap();
        let (status, _) = self.call(&envelope).await;
        assert_eq!(status, StatusCode::OK);
    }

    async fn bootstrap_executor(&self) {
        let msg = msgs::AddExecutorMsg {
            executor: Executor::new(&self.executor_id, "cli", "worker-1", &self.colony_id),
        };
        let envelope = Envelope::pack(msgs::ADD_EXECUTOR, &msg, &self.executor_secret).unwrap();
        let (status, _) = self.call(&envelope).await;
        assert_eq!(status, StatusCode::OK);

        let msg = msgs::ApproveExecutorMsg {
            colony_id: self.colony_id.clone(),
            executor_id: self.executor_id.clone(),
        };
        let envelope = Envelope::pack(msgs::APPROVE_EXECUTOR, &msg, &self.colony_secret).unwrap();
        let (status, _) = self.call(&envelope).await;
        assert_eq!(status, StatusCode::OK);
    }

    fn spec(&self) -> FunctionSpec {
        FunctionSpec::new(
            "echo",
            Conditions {
                colony_id: self.colony_id.clone(),
                executor_type: "cli".to_string(),
                ..Default::default()
            },
        )
    }
}

#[tokio::test]
async fn test_add_colony_requires_server_owner() {
    let server = test_server().await;
    let msg = msgs::AddColonyMsg {
        colony: Colony::new(&server.colony_id, "testcolony"),
    };
    let envelope = Envelope::pack(msgs::ADD_COLONY, &msg, "not-the-server-owner").unwrap();
    let (status, reply) = server.call(&envelope).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(reply.error);
}

#[tokio::test]
async fn test_unknown_payload_type_is_bad_request() {
    let server = test_server().await;
    let envelope =
        Envelope::pack("definitelynotanop", &msgs::GetColoniesMsg {}, &server.server_secret)
            .unwrap();
    let (status, reply) = server.call(&envelope).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(reply.error);
}

#[tokio::test]
async fn test_submit_assign_close_round_trip() {
    let server = test_server().await;
    server.bootstrap_colony().await;
    server.bootstrap_executor().await;

    let submit = msgs::SubmitFunctionSpecMsg { spec: server.spec() };
    let envelope =
        Envelope::pack(msgs::SUBMIT_FUNC_SPEC, &submit, &server.executor_secret).unwrap();
    let (status, reply) = server.call(&envelope).await;
    assert_eq!(status, StatusCode::OK);
    let submitted: Process = reply.decode().unwrap();

    let assign = msgs::AssignProcessMsg {
        colony_id: server.colony_id.clone(),
        timeout: 0,
    };
    let envelope = Envelope::pack(msgs::ASSIGN_PROCESS, &assign, &server.executor_secret).unwrap();
    let (status, reply) = server.call(&envelope).await;
    assert_eq!(status, StatusCode::OK);
    let assigned: Process = reply.decode().unwrap();
    assert_eq!(assigned.id, submitted.id);
    assert_eq!(assigned.assigned_executor_id, server.executor_id);

    let close = msgs::CloseSuccessfulMsg {
        colony_id: server.colony_id.clone(),
        process_id: assigned.id.clone(),
        output: vec![serde_json::json!("done")],
    };
    let envelope = Envelope::pack(msgs::CLOSE_SUCCESSFUL, &close, &server.executor_secret).unwrap();
    let (status, reply) = server.call(&envelope).await;
    assert_eq!(status, StatusCode::OK);
    let closed: Process = reply.decode().unwrap();
    assert_eq!(closed.output, vec![serde_json::json!("done")]);
}

#[tokio::test]
async fn test_assign_empty_queue_is_not_found() {
    let server = test_server().await;
    server.bootstrap_colony().await;
    server.bootstrap_executor().await;

    let assign = msgs::AssignProcessMsg {
        colony_id: server.colony_id.clone(),
        timeout: 0,
    };
    let envelope = Envelope::pack(msgs::ASSIGN_PROCESS, &assign, &server.executor_secret).unwrap();
    let (status, reply) = server.call(&envelope).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(reply.error);
}

#[tokio::test]
async fn test_submit_requires_approved_executor() {
    let server = test_server().await;
    server.bootstrap_colony().await;
    // Executor registered but never approved.
    let msg = msgs::AddExecutorMsg {
        executor: Executor::new(&server.executor_id, "cli", "worker-1", &server.colony_id),
    };
    let envelope = Envelope::pack(msgs::ADD_EXECUTOR, &msg, &server.executor_secret).unwrap();
    server.call(&envelope).await;

    let submit = msgs::SubmitFunctionSpecMsg { spec: server.spec() };
    let envelope =
        Envelope::pack(msgs::SUBMIT_FUNC_SPEC, &submit, &server.executor_secret).unwrap();
    let (status, reply) = server.call(&envelope).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(reply.error);
}

#[tokio::test]
async fn test_close_by_other_executor_is_forbidden() {
    let server = test_server().await;
    server.bootstrap_colony().await;
    server.bootstrap_executor().await;

    let submit = msgs::SubmitFunctionSpecMsg { spec: server.spec() };
    let envelope =
        Envelope::pack(msgs::SUBMIT_FUNC_SPEC, &submit, &server.executor_secret).unwrap();
    server.call(&envelope).await;
    let assign = msgs::AssignProcessMsg {
        colony_id: server.colony_id.clone(),
        timeout: 0,
    };
    let envelope = Envelope::pack(msgs::ASSIGN_PROCESS, &assign, &server.executor_secret).unwrap();
    let (_, reply) = server.call(&envelope).await;
    let assigned: Process = reply.decode().unwrap();

    // A second approved executor tries to close someone else's process.
    let (other_secret, other_id) = generate_secret();
    let msg = msgs::AddExecutorMsg {
        executor: Executor::new(&other_id, "cli", "worker-2", &server.colony_id),
    };
    let envelope = Envelope::pack(msgs::ADD_EXECUTOR, &msg, &other_secret).unwrap();
    server.call(&envelope).await;
    let msg = msgs::ApproveExecutorMsg {
        colony_id: server.colony_id.clone(),
        executor_id: other_id.clone(),
    };
    let envelope = Envelope::pack(msgs::APPROVE_EXECUTOR, &msg, &server.colony_secret).unwrap();
    server.call(&envelope).await;

    let close = msgs::CloseSuccessfulMsg {
        colony_id: server.colony_id.clone(),
        process_id: assigned.id.clone(),
        output: vec![],
    };
    let envelope = Envelope::pack(msgs::CLOSE_SUCCESSFUL, &close, &other_secret).unwrap();
    let (status, reply) = server.call(&envelope).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(reply.error);
}

#[tokio::test]
async fn test_colony_statistics() {
    let server = test_server().await;
    server.bootstrap_colony().await;
    server.bootstrap_executor().await;

    let submit = msgs::SubmitFunctionSpecMsg { spec: server.spec() };
    let envelope =
        Envelope::pack(msgs::SUBMIT_FUNC_SPEC, &submit, &server.executor_secret).unwrap();
    server.call(&envelope).await;

    let msg = msgs::ColonyStatisticsMsg {
        colony_id: server.colony_id.clone(),
    };
    let envelope = Envelope::pack(msgs::COLONY_STATISTICS, &msg, &server.colony_secret).unwrap();
    let (status, reply) = server.call(&envelope).await;
    assert_eq!(status, StatusCode::OK);
    let stats: rookery_core::ColonyStatistics = reply.decode().unwrap();
    assert_eq!(stats.executors, 1);
    assert_eq!(stats.waiting_processes, 1);
}

#[tokio::test]
async fn test_malformed_json_body_rejected() {
    let server = test_server().await;
    let request = Request::post("/api")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = server.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_health_endpoint() {
    let server = test_server().await;
    let request = Request::get("/health").body(Body::empty()).unwrap();
    let response = server.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
