//! Fake Alpaca servers for integration tests.

#![allow(dead_code)]

use alpaca_net::{ServerEndpoint, ServiceType};
use axum::extract::{Form, Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, UdpSocket};

/// How the fake device endpoint answers.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Success with this `Value`
    Value(Value),
    /// Non-zero `ErrorNumber`
    Error(i32, String),
    /// Wait, then succeed with this `Value`
    Delayed(Duration, Value),
    /// Success, but every envelope key is lower-case
    LowerCaseKeys(Value),
}

/// One request as the server saw it.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: &'static str,
    pub device_type: String,
    pub device_number: u32,
    pub operation: String,
    pub query: HashMap<String, String>,
    pub form: HashMap<String, String>,
}

impl Recorded {
    /// A parameter from wherever the method puts it.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.query
            .get(name)
            .or_else(|| self.form.get(name))
            .map(String::as_str)
    }

    pub fn client_transaction_id(&self) -> u32 {
        self.param("ClientTransactionID")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }
}

#[derive(Clone)]
struct DeviceState {
    behavior: Behavior,
    recorded: Arc<Mutex<Vec<Recorded>>>,
    server_transactions: Arc<AtomicU32>,
}

/// A fake Alpaca device server on an ephemeral loopback port.
pub struct FakeDeviceServer {
    pub endpoint: ServerEndpoint,
    recorded: Arc<Mutex<Vec<Recorded>>>,
}

impl FakeDeviceServer {
    pub async fn start(behavior: Behavior) -> Self {
        let recorded = Arc::new(Mutex::new(Vec::new()));
        let state = DeviceState {
            behavior,
            recorded: recorded.clone(),
            server_transactions: Arc::new(AtomicU32::new(0)),
        };

        let router = Router::new()
            .route(
                "/api/v1/{device_type}/{device_number}/{operation}",
                get(handle_get).put(handle_put),
            )
            .with_state(state);

        let endpoint = serve(router).await;
        Self { endpoint, recorded }
    }

    pub fn recorded(&self) -> Vec<Recorded> {
        self.recorded.lock().clone()
    }
}

async fn handle_get(
    State(state): State<DeviceState>,
    Path((device_type, device_number, operation)): Path<(String, u32, String)>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    let request = Recorded {
        method: "GET",
        device_type,
        device_number,
        operation,
        query,
        form: HashMap::new(),
    };
    respond(state, request).await
}

async fn handle_put(
    State(state): State<DeviceState>,
    Path((device_type, device_number, operation)): Path<(String, u32, String)>,
    Query(query): Query<HashMap<String, String>>,
    Form(form): Form<HashMap<String, String>>,
) -> Json<Value> {
    let request = Recorded {
        method: "PUT",
        device_type,
        device_number,
        operation,
        query,
        form,
    };
    respond(state, request).await
}

async fn respond(state: DeviceState, request: Recorded) -> Json<Value> {
    let client_transaction_id = request.client_transaction_id();
    state.recorded.lock().push(request);
    let server_transaction_id = state.server_transactions.fetch_add(1, Ordering::SeqCst) + 1;

    let body = match state.behavior {
        Behavior::Value(value) => envelope(client_transaction_id, server_transaction_id, 0, "", value),
        Behavior::Error(number, message) => {
            envelope(client_transaction_id, server_transaction_id, number, &message, Value::Null)
        }
        Behavior::Delayed(delay, value) => {
            tokio::time::sleep(delay).await;
            envelope(client_transaction_id, server_transaction_id, 0, "", value)
        }
        Behavior::LowerCaseKeys(value) => json!({
            "clienttransactionid": client_transaction_id,
            "servertransactionid": server_transaction_id,
            "errornumber": 0,
            "errormessage": "",
            "value": value,
        }),
    };
    Json(body)
}

pub fn envelope(
    client_transaction_id: u32,
    server_transaction_id: u32,
    error_number: i32,
    error_message: &str,
    value: Value,
) -> Value {
    json!({
        "ClientTransactionID": client_transaction_id,
        "ServerTransactionID": server_transaction_id,
        "ErrorNumber": error_number,
        "ErrorMessage": error_message,
        "Value": value,
    })
}

/// A fake management API listing `devices`; with `hang` set, every
/// management call stalls for a minute instead.
pub async fn start_management_server(server_name: &str, devices: Value, hang: bool) -> ServerEndpoint {
    let description = json!({
        "ServerName": server_name,
        "Manufacturer": "Test Optics",
        "ManufacturerVersion": "0.1",
        "Location": "Test bench",
    });

    let stall = move |value: Value| async move {
        if hang {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
        Json(envelope(0, 0, 0, "", value))
    };

    let router = Router::new()
        .route(
            "/management/v1/description",
            get(move || stall(description.clone())),
        )
        .route(
            "/management/v1/configureddevices",
            get(move || stall(devices.clone())),
        )
        .route(
            "/management/apiversions",
            get(move || stall(json!([1]))),
        );

    serve(router).await
}

/// Serves `router` on an ephemeral loopback port.
pub async fn serve(router: Router) -> ServerEndpoint {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    ServerEndpoint::new("127.0.0.1", port, ServiceType::Http)
}

/// Answers every discovery probe on `bind` with each reply in turn.
pub async fn start_udp_responder(bind: &str, replies: Vec<Vec<u8>>) -> SocketAddr {
    let socket = UdpSocket::bind(bind).await.unwrap();
    let local = socket.local_addr().unwrap();
    tokio::spawn(async move {
        let mut buf = [0u8; 128];
        while let Ok((len, from)) = socket.recv_from(&mut buf).await {
            if !alpaca_wire::is_probe(&buf[..len]) {
                continue;
            }
            for reply in &replies {
                let _ = socket.send_to(reply, from).await;
            }
        }
    });
    local
}

/// A probe reply advertising `port`.
pub fn probe_reply(port: u16) -> Vec<u8> {
    alpaca_wire::encode_probe_response(port).to_vec()
}
