//! End-to-end session tests against an in-memory runtime

use super::*;
use crate::affinity::AdjustmentBuilder;
use crate::health::components;
use crate::plugin::Driver;
use crate::proto::{Container, PodSandbox};
use prost::Message;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::watch;

const PIPE: usize = 256 * 1024;

fn test_stub(health: HealthRegistry) -> Stub {
    let metrics = PluginMetrics::new();
    let logger = StructuredLogger::new("fluxbind-test");
    let driver = Driver::new(AdjustmentBuilder::default(), metrics.clone(), logger.clone());

    Stub::new(
        StubConfig {
            registration_timeout: Duration::from_secs(5),
            ..StubConfig::default()
        },
        Arc::new(driver),
        health,
        metrics,
        logger,
    )
}

/// The runtime end of a multiplexed connection.
struct FakeRuntime {
    io: DuplexStream,
}

impl FakeRuntime {
    async fn send(&mut self, conn_id: u32, frame: Frame) {
        let data = frame.encode().unwrap();
        self.io.write_all(&conn_id.to_be_bytes()).await.unwrap();
        self.io
            .write_all(&(data.len() as u32).to_be_bytes())
            .await
            .unwrap();
        self.io.write_all(&data).await.unwrap();
    }

    async fn recv(&mut self) -> (u32, Frame) {
        let mut header = [0u8; 8];
        self.io.read_exact(&mut header).await.unwrap();
        let conn_id = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
        let length = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;

        let mut payload = vec![0u8; length];
        self.io.read_exact(&mut payload).await.unwrap();
        let frame = read_frame(&mut payload.as_slice()).await.unwrap().unwrap();
        (conn_id, frame)
    }

    /// Answer the plugin's RegisterPlugin call and return its request.
    async fn accept_registration(&mut self, status: i32) -> RegisterPluginRequest {
        let (conn_id, frame) = self.recv().await;
        assert_eq!(conn_id, RUNTIME_SERVICE_CONN);
        assert_eq!(frame.message_type, MESSAGE_TYPE_REQUEST);
        assert_eq!(frame.stream_id, 1);

        let request = Request::decode(frame.payload.as_slice()).unwrap();
        assert_eq!(request.service, RUNTIME_SERVICE);
        assert_eq!(request.method, "RegisterPlugin");

        let response = if status == code::OK {
            ttrpc::ok_response(&Empty {})
        } else {
            ttrpc::error_response(status, "plugin rejected")
        };
        self.send(
            RUNTIME_SERVICE_CONN,
            Frame {
                stream_id: frame.stream_id,
                message_type: MESSAGE_TYPE_RESPONSE,
                flags: 0,
                payload: response.encode_to_vec(),
            },
        )
        .await;

        RegisterPluginRequest::decode(request.payload.as_slice()).unwrap()
    }

    /// Call a plugin-service method and wait for its response.
    async fn call<M: Message>(&mut self, stream_id: u32, method: &str, message: &M) -> Response {
        self.call_raw(stream_id, method, message.encode_to_vec()).await
    }

    async fn call_raw(&mut self, stream_id: u32, method: &str, payload: Vec<u8>) -> Response {
        let request = Request {
            service: PLUGIN_SERVICE.to_string(),
            method: method.to_string(),
            payload,
            timeout_nano: 0,
            metadata: Vec::new(),
        };
        self.send(
            PLUGIN_SERVICE_CONN,
            Frame {
                stream_id,
                message_type: MESSAGE_TYPE_REQUEST,
                flags: 0,
                payload: request.encode_to_vec(),
            },
        )
        .await;

        let (conn_id, frame) = self.recv().await;
        assert_eq!(conn_id, PLUGIN_SERVICE_CONN);
        assert_eq!(frame.message_type, MESSAGE_TYPE_RESPONSE);
        assert_eq!(frame.stream_id, stream_id);
        Response::decode(frame.payload.as_slice()).unwrap()
    }
}

fn status_code(response: &Response) -> i32 {
    response.status.as_ref().map(|s| s.code).unwrap_or(code::OK)
}

async fn wait_registered(health: &HealthRegistry) {
    for _ in 0..100 {
        if health.is_registered().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("plugin never marked registered");
}

#[tokio::test]
async fn test_session_applies_cpuset_hint() {
    let (plugin_side, runtime_side) = tokio::io::duplex(PIPE);
    let health = HealthRegistry::new();
    let stub = test_stub(health.clone());
    let session = tokio::spawn(async move { stub.run(plugin_side, "duplex").await });

    let mut runtime = FakeRuntime { io: runtime_side };
    let registration = runtime.accept_registration(code::OK).await;
    assert_eq!(registration.plugin_name, "fluxbind");
    assert_eq!(registration.plugin_idx, "01");
    wait_registered(&health).await;
    assert!(health.readiness().await.ready);

    let response = runtime
        .call(
            1,
            "Configure",
            &ConfigureRequest {
                runtime_name: "containerd".to_string(),
                runtime_version: "2.0.0".to_string(),
                ..Default::default()
            },
        )
        .await;
    assert_eq!(status_code(&response), code::OK);
    let configured = ConfigureResponse::decode(response.payload.as_slice()).unwrap();
    assert_eq!(configured.events, Event::CreateContainer.mask());

    let request = CreateContainerRequest {
        pod: Some(PodSandbox {
            name: "lammps-0".to_string(),
            ..Default::default()
        }),
        container: Some(Container {
            name: "lammps".to_string(),
            env: vec![
                "PATH=/usr/bin".to_string(),
                "FLUXBIND_CPUSET=0x30".to_string(),
                "FLUXBIND_CPUSET_REVERSED=yes".to_string(),
            ],
            ..Default::default()
        }),
    };
    let response = runtime.call(3, "CreateContainer", &request).await;
    assert_eq!(status_code(&response), code::OK);

    let created = CreateContainerResponse::decode(response.payload.as_slice()).unwrap();
    let cpus = created
        .adjust
        .and_then(|a| a.linux)
        .and_then(|l| l.resources)
        .and_then(|r| r.cpu)
        .map(|c| c.cpus);
    assert_eq!(cpus.as_deref(), Some("4-5"));
    assert!(created.update.is_empty());

    let response = runtime.call(5, "Shutdown", &Empty {}).await;
    assert_eq!(status_code(&response), code::OK);

    session.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_session_fails_open_without_hint() {
    let (plugin_side, runtime_side) = tokio::io::duplex(PIPE);
    let stub = test_stub(HealthRegistry::new());
    let session = tokio::spawn(async move { stub.run(plugin_side, "duplex").await });

    let mut runtime = FakeRuntime { io: runtime_side };
    runtime.accept_registration(code::OK).await;

    let request = CreateContainerRequest {
        pod: None,
        container: Some(Container {
            env: vec!["FLUXBIND_CPUSET=not-hex".to_string()],
            ..Default::default()
        }),
    };
    let response = runtime.call(1, "CreateContainer", &request).await;
    assert_eq!(status_code(&response), code::OK);

    let created = CreateContainerResponse::decode(response.payload.as_slice()).unwrap();
    assert_eq!(
        created.adjust.unwrap_or_default(),
        crate::proto::ContainerAdjustment::default()
    );

    drop(runtime);
    session.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_unknown_method_is_unimplemented() {
    let (plugin_side, runtime_side) = tokio::io::duplex(PIPE);
    let stub = test_stub(HealthRegistry::new());
    let session = tokio::spawn(async move { stub.run(plugin_side, "duplex").await });

    let mut runtime = FakeRuntime { io: runtime_side };
    runtime.accept_registration(code::OK).await;

    let response = runtime.call(1, "Frobnicate", &Empty {}).await;
    assert_eq!(status_code(&response), code::UNIMPLEMENTED);

    // Truncated varint inside the pod field.
    let garbage = vec![0x0a, 0x04, 0xff, 0xff, 0xff, 0xff];
    let response = runtime.call_raw(3, "CreateContainer", garbage).await;
    assert_eq!(status_code(&response), code::INVALID_ARGUMENT);

    let response = runtime
        .call(
            5,
            "StateChange",
            &StateChangeEvent {
                event: Event::StartContainer as i32,
                ..Default::default()
            },
        )
        .await;
    assert_eq!(status_code(&response), code::OK);

    drop(runtime);
    session.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_lifecycle_hooks_return_empty_replies() {
    let (plugin_side, runtime_side) = tokio::io::duplex(PIPE);
    let stub = test_stub(HealthRegistry::new());
    let session = tokio::spawn(async move { stub.run(plugin_side, "duplex").await });

    let mut runtime = FakeRuntime { io: runtime_side };
    runtime.accept_registration(code::OK).await;

    let pinned = Container {
        name: "lammps".to_string(),
        env: vec!["FLUXBIND_CPUSET=0x3".to_string()],
        ..Default::default()
    };

    let response = runtime
        .call(
            1,
            "Synchronize",
            &SynchronizeRequest {
                pods: vec![PodSandbox {
                    name: "lammps-0".to_string(),
                    ..Default::default()
                }],
                containers: vec![pinned.clone()],
                more: true,
            },
        )
        .await;
    assert_eq!(status_code(&response), code::OK);
    let synced = SynchronizeResponse::decode(response.payload.as_slice()).unwrap();
    assert!(synced.update.is_empty());
    assert!(!synced.more);

    let response = runtime
        .call(
            3,
            "UpdateContainer",
            &UpdateContainerRequest {
                pod: None,
                container: Some(pinned.clone()),
                linux_resources: None,
            },
        )
        .await;
    assert_eq!(status_code(&response), code::OK);
    let updated = UpdateContainerResponse::decode(response.payload.as_slice()).unwrap();
    assert!(updated.update.is_empty());
    assert!(updated.evict.is_empty());

    let response = runtime
        .call(
            5,
            "StopContainer",
            &StopContainerRequest {
                pod: None,
                container: Some(pinned),
            },
        )
        .await;
    assert_eq!(status_code(&response), code::OK);
    let stopped = StopContainerResponse::decode(response.payload.as_slice()).unwrap();
    assert!(stopped.update.is_empty());

    drop(runtime);
    session.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_rejected_registration_ends_session() {
    let (plugin_side, runtime_side) = tokio::io::duplex(PIPE);
    let health = HealthRegistry::new();
    let stub = test_stub(health.clone());
    let session = tokio::spawn(async move { stub.run(plugin_side, "duplex").await });

    let mut runtime = FakeRuntime { io: runtime_side };
    runtime.accept_registration(code::INTERNAL).await;

    let err = session.await.unwrap().unwrap_err();
    match err {
        StubError::Status {
            method,
            code: status,
            ..
        } => {
            assert_eq!(method, format!("{RUNTIME_SERVICE}/RegisterPlugin"));
            assert_eq!(status, code::INTERNAL);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!health.is_registered().await);
}

#[tokio::test]
async fn test_closed_socket_before_registration_is_an_error() {
    let (plugin_side, runtime_side) = tokio::io::duplex(PIPE);
    drop(runtime_side);

    let stub = test_stub(HealthRegistry::new());
    assert!(stub.run(plugin_side, "duplex").await.is_err());
}

struct RefusingConnector {
    attempts: Arc<AtomicUsize>,
}

#[async_trait]
impl Connector for RefusingConnector {
    type Stream = DuplexStream;

    async fn connect(&self) -> std::io::Result<DuplexStream> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(std::io::ErrorKind::ConnectionRefused.into())
    }

    fn describe(&self) -> String {
        "refusing".to_string()
    }
}

#[tokio::test]
async fn test_supervisor_retries_until_shutdown() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let health = HealthRegistry::new();
    let metrics = PluginMetrics::new();
    let reconnects_before = metrics.reconnects();

    let supervisor = Supervisor::new(
        RefusingConnector {
            attempts: attempts.clone(),
        },
        test_stub(health.clone()),
        Duration::from_millis(5),
    );
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(async move { supervisor.run(shutdown_rx).await });

    for _ in 0..200 {
        if attempts.load(Ordering::SeqCst) >= 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(attempts.load(Ordering::SeqCst) >= 3);

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();

    assert!(metrics.reconnects() >= reconnects_before + 2);
    let health = health.health().await;
    assert!(!health.registered);
    assert_eq!(
        health.components[components::NRI_STUB].status,
        crate::health::ComponentStatus::Degraded
    );
}

/// Hands out one pre-made stream, then refuses.
struct OnceConnector {
    stream: Mutex<Option<DuplexStream>>,
}

#[async_trait]
impl Connector for OnceConnector {
    type Stream = DuplexStream;

    async fn connect(&self) -> std::io::Result<DuplexStream> {
        let stream = self.stream.lock().unwrap().take();
        stream.ok_or_else(|| std::io::ErrorKind::ConnectionRefused.into())
    }

    fn describe(&self) -> String {
        "once".to_string()
    }
}

#[tokio::test]
async fn test_supervisor_shutdown_interrupts_session() {
    let (plugin_side, mut runtime_side) = tokio::io::duplex(PIPE);
    let supervisor = Supervisor::new(
        OnceConnector {
            stream: Mutex::new(Some(plugin_side)),
        },
        test_stub(HealthRegistry::new()),
        Duration::from_secs(60),
    );
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(async move { supervisor.run(shutdown_rx).await });

    // The registration request arrives but is never answered.
    let mut header = [0u8; 8];
    runtime_side.read_exact(&mut header).await.unwrap();

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();
}
