//! The transaction dispatcher.
//!
//! Every device and management operation reaches the network through
//! [`TransactionDispatcher`]. It numbers the call, encodes it, applies the
//! tier timeout, performs the HTTP exchange, decodes the envelope and
//! classifies a non-zero `ErrorNumber`. It never retries.

use crate::call::DeviceCall;
use crate::metrics::CallMetrics;
use alpaca_core::classify::codes;
use alpaca_core::{
    ClientConfig, ClientIdentity, CommunicationError, ConfigError, DeviceError, ErrorClassifier,
    HttpMethod, ProtocolError, Result, SequenceCounter, ServerEndpoint, TimeoutTier, TimeoutTiers,
};
use alpaca_wire::{
    decode_response, encode_request, FromTypedValue, KeyCasing, Transaction, TypedValue,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Issues Alpaca transactions.
///
/// Cheap to clone; clones share the HTTP connection pool, the client-id
/// counter and the metrics.
#[derive(Debug, Clone)]
pub struct TransactionDispatcher {
    http: reqwest::Client,
    tiers: TimeoutTiers,
    casing: KeyCasing,
    credentials: Option<(String, Option<String>)>,
    classifier: Arc<ErrorClassifier>,
    client_ids: Arc<SequenceCounter>,
    metrics: CallMetrics,
}

impl TransactionDispatcher {
    /// Creates a dispatcher with its own client-id counter.
    pub fn new(config: &ClientConfig) -> std::result::Result<Self, ConfigError> {
        Self::with_counter(config, Arc::new(SequenceCounter::new()))
    }

    /// Creates a dispatcher drawing client ids from a shared counter.
    pub fn with_counter(
        config: &ClientConfig,
        client_ids: Arc<SequenceCounter>,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let tiers = config.timeout_tiers()?;

        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .connect_timeout(tiers.get(TimeoutTier::Establish))
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ConfigError::invalid_value("client", e.to_string()))?;

        let credentials = config
            .user_name
            .clone()
            .map(|user| (user, config.password.clone()));

        Ok(Self {
            http,
            tiers,
            casing: KeyCasing::from_strict(config.strict_casing),
            credentials,
            classifier: Arc::new(ErrorClassifier::default()),
            client_ids,
            metrics: CallMetrics::new(),
        })
    }

    /// Replaces the error classification table.
    pub fn with_classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }

    /// Allocates the next client identity.
    pub fn new_client_identity(&self) -> ClientIdentity {
        ClientIdentity::allocate(&self.client_ids)
    }

    /// An identity with a caller-chosen client id.
    pub fn identity_with_id(&self, client_id: u32) -> ClientIdentity {
        ClientIdentity::with_id(client_id)
    }

    pub fn tiers(&self) -> &TimeoutTiers {
        &self.tiers
    }

    pub fn casing(&self) -> KeyCasing {
        self.casing
    }

    pub fn metrics(&self) -> &CallMetrics {
        &self.metrics
    }

    /// Dispatches a call and returns the decoded value.
    pub async fn call(
        &self,
        identity: &ClientIdentity,
        endpoint: &ServerEndpoint,
        call: &DeviceCall,
    ) -> Result<TypedValue> {
        self.execute(identity, endpoint, call, None).await
    }

    /// Like [`call`](Self::call), aborting the HTTP exchange when `cancel`
    /// fires.
    pub async fn call_with_cancel(
        &self,
        identity: &ClientIdentity,
        endpoint: &ServerEndpoint,
        call: &DeviceCall,
        cancel: &CancellationToken,
    ) -> Result<TypedValue> {
        self.execute(identity, endpoint, call, Some(cancel)).await
    }

    /// Dispatches a call and converts the value to `T`.
    ///
    /// The call's shape is overridden with `T::SHAPE`.
    pub async fn call_typed<T: FromTypedValue>(
        &self,
        identity: &ClientIdentity,
        endpoint: &ServerEndpoint,
        call: DeviceCall,
    ) -> Result<T> {
        let call = call.shape(T::SHAPE);
        let value = self.execute(identity, endpoint, &call, None).await?;
        Ok(T::from_typed(value)?)
    }

    async fn execute(
        &self,
        identity: &ClientIdentity,
        endpoint: &ServerEndpoint,
        call: &DeviceCall,
        cancel: Option<&CancellationToken>,
    ) -> Result<TypedValue> {
        validate_endpoint(endpoint)?;

        let mut tx = Transaction {
            client_id: identity.client_id(),
            client_transaction_id: identity.next_transaction_id(),
            server_transaction_id: None,
            method: call.method,
            endpoint: endpoint.clone(),
            path: call.path.clone(),
            parameters: call.parameters.clone(),
            timeout_tier: call.tier,
        };
        let timeout = self.tiers.get(call.tier);
        let label = format!("{} {}", call.method, call.path);

        self.metrics.record_call();
        let started = Instant::now();

        let result = {
            let exchange = async {
                match tokio::time::timeout(
                    timeout,
                    self.round_trip(&mut tx, call),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(CommunicationError::timeout(
                        label.clone(),
                        timeout.as_millis() as u64,
                    )
                    .into()),
                }
            };

            match cancel {
                Some(token) => {
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => Err(CommunicationError::cancelled(label.clone()).into()),
                        result = exchange => result,
                    }
                }
                None => exchange.await,
            }
        };

        self.metrics.record_outcome(&result);
        self.log_round_trip(&tx, started.elapsed(), &result);
        result
    }

    async fn round_trip(
        &self,
        tx: &mut Transaction,
        call: &DeviceCall,
    ) -> Result<TypedValue> {
        let request = encode_request(tx);
        let tier = tx.timeout_tier;
        let budget = |connect: bool| timeout_budget(&self.tiers, tier, connect);
        let operation = format!("{} {}", tx.method, tx.path);

        let mut builder = match request.method {
            HttpMethod::Get => self.http.get(&request.url).query(&request.query),
            HttpMethod::Put => self.http.put(&request.url).form(&request.form),
        };
        if let Some((user, password)) = &self.credentials {
            builder = builder.basic_auth(user, password.as_deref());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| communication_error(e, &request.url, &operation, budget))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| communication_error(e, &request.url, &operation, budget))?;
        self.metrics.record_bytes_received(body.len() as u64);

        if !status.is_success() {
            let message = format!(
                "HTTP {}: {}",
                status.as_u16(),
                String::from_utf8_lossy(&body).trim()
            );
            return Err(self.protocol_error(codes::UNSPECIFIED_ERROR, message));
        }

        let decoded = decode_response(&body, call.shape, self.casing)?;
        if !tx.record_response(&decoded) {
            warn!(
                operation = %operation,
                sent = tx.client_transaction_id,
                echoed = ?decoded.client_transaction_id,
                "Server echoed a different ClientTransactionID"
            );
        }

        decoded.into_result().map_err(|envelope| {
            self.protocol_error(envelope.error_number, envelope.error_message)
        })
    }

    fn protocol_error(&self, error_number: i32, message: String) -> DeviceError {
        ProtocolError {
            kind: self.classifier.kind_of(error_number),
            error_number,
            message,
        }
        .into()
    }

    fn log_round_trip(
        &self,
        tx: &Transaction,
        elapsed: Duration,
        result: &Result<TypedValue>,
    ) {
        let parameters = tx
            .parameters
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        let elapsed_ms = elapsed.as_millis() as u64;

        match result {
            Ok(_) => debug!(
                operation = %tx.url(),
                method = %tx.method,
                parameters = %parameters,
                elapsed_ms,
                client_id = tx.client_id,
                client_transaction_id = tx.client_transaction_id,
                server_transaction_id = ?tx.server_transaction_id,
                outcome = "ok",
                "Alpaca call completed"
            ),
            Err(DeviceError::Protocol(e)) => info!(
                operation = %tx.url(),
                method = %tx.method,
                parameters = %parameters,
                elapsed_ms,
                client_id = tx.client_id,
                client_transaction_id = tx.client_transaction_id,
                server_transaction_id = ?tx.server_transaction_id,
                outcome = "protocol_error",
                error = %e,
                "Alpaca call rejected by server"
            ),
            Err(e) => warn!(
                operation = %tx.url(),
                method = %tx.method,
                parameters = %parameters,
                elapsed_ms,
                client_id = tx.client_id,
                client_transaction_id = tx.client_transaction_id,
                server_transaction_id = ?tx.server_transaction_id,
                outcome = "failed",
                error = %e,
                "Alpaca call failed"
            ),
        }
    }
}

fn validate_endpoint(endpoint: &ServerEndpoint) -> Result<()> {
    if endpoint.host.trim().is_empty() {
        return Err(ConfigError::invalid_value("endpoint.host", "host cannot be empty").into());
    }
    if endpoint.port == 0 {
        return Err(ConfigError::invalid_value("endpoint.port", "port cannot be 0").into());
    }
    Ok(())
}

/// The limit a reqwest timeout ran into: the establish tier while
/// connecting, the call's own tier afterwards.
fn timeout_budget(tiers: &TimeoutTiers, tier: TimeoutTier, connect: bool) -> Duration {
    if connect {
        tiers.get(TimeoutTier::Establish)
    } else {
        tiers.get(tier)
    }
}

fn communication_error(
    err: reqwest::Error,
    url: &str,
    operation: &str,
    budget: impl Fn(bool) -> Duration,
) -> DeviceError {
    let err = if err.is_timeout() {
        let timeout = budget(err.is_connect());
        CommunicationError::timeout(operation, timeout.as_millis() as u64)
    } else if err.is_connect() {
        CommunicationError::connection_failed(url, err.to_string())
    } else {
        CommunicationError::Transport {
            url: url.to_string(),
            reason: err.to_string(),
        }
    };
    err.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alpaca_core::{DeviceType, ProtocolErrorKind, ServiceType};
    use alpaca_wire::ValueShape;
    use axum::extract::{Form, Query};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, put};
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::collections::HashMap;

    async fn serve(router: Router) -> ServerEndpoint {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        ServerEndpoint::new("127.0.0.1", port, ServiceType::Http)
    }

    fn envelope(params: &HashMap<String, String>, value: Value) -> Json<Value> {
        let tx: u32 = params
            .get("ClientTransactionID")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        Json(json!({
            "Value": value,
            "ClientTransactionID": tx,
            "ServerTransactionID": 500 + tx,
            "ErrorNumber": 0,
            "ErrorMessage": ""
        }))
    }

    fn dispatcher(config: ClientConfig) -> TransactionDispatcher {
        TransactionDispatcher::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_get_sends_ids_in_query() {
        let router = Router::new().route(
            "/api/v1/switch/0/getswitchname",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                let echoed = format!(
                    "{}:{}:{}",
                    params["Id"], params["ClientID"], params["ClientTransactionID"]
                );
                envelope(&params, json!(echoed))
            }),
        );
        let endpoint = serve(router).await;
        let dispatcher = dispatcher(ClientConfig::default());
        let identity = dispatcher.identity_with_id(77);

        let call = DeviceCall::get(DeviceType::Switch, 0, "getswitchname").indexed(4);
        let name: String = dispatcher
            .call_typed(&identity, &endpoint, call.clone())
            .await
            .unwrap();
        assert_eq!(name, "4:77:1");

        let name: String = dispatcher.call_typed(&identity, &endpoint, call).await.unwrap();
        assert_eq!(name, "4:77:2");
    }

    #[tokio::test]
    async fn test_put_sends_form_body() {
        let router = Router::new().route(
            "/api/v1/dome/0/slewtoazimuth",
            put(
                |Query(query): Query<HashMap<String, String>>,
                 Form(form): Form<HashMap<String, String>>| async move {
                    assert!(query.is_empty());
                    assert_eq!(form["Azimuth"], "183.5");
                    assert!(form.contains_key("ClientID"));
                    envelope(&form, Value::Null)
                },
            ),
        );
        let endpoint = serve(router).await;
        let dispatcher = dispatcher(ClientConfig::default());
        let identity = dispatcher.new_client_identity();

        let call = DeviceCall::put(DeviceType::Dome, 0, "SlewToAzimuth").param("Azimuth", 183.5);
        let value = dispatcher.call(&identity, &endpoint, &call).await.unwrap();
        assert_eq!(value, TypedValue::None);
        assert_eq!(dispatcher.metrics().successes(), 1);
    }

    #[tokio::test]
    async fn test_reserved_error_is_classified() {
        let router = Router::new().route(
            "/api/v1/telescope/0/slewtotarget",
            put(|| async {
                Json(json!({"ErrorNumber": 0x408, "ErrorMessage": "Telescope is parked"}))
            }),
        );
        let endpoint = serve(router).await;
        let dispatcher = dispatcher(ClientConfig::default());
        let identity = dispatcher.new_client_identity();

        let err = dispatcher
            .call(
                &identity,
                &endpoint,
                &DeviceCall::put(DeviceType::Telescope, 0, "slewtotarget"),
            )
            .await
            .unwrap_err();
        assert_eq!(err.protocol_kind(), Some(ProtocolErrorKind::InvalidWhileParked));
        assert_eq!(dispatcher.metrics().protocol_errors(), 1);
    }

    #[tokio::test]
    async fn test_http_error_status_becomes_driver_error() {
        let router = Router::new().route(
            "/api/v1/camera/0/imagearray",
            get(|| async { (StatusCode::BAD_REQUEST, "Camera 0 is not configured") }),
        );
        let endpoint = serve(router).await;
        let dispatcher = dispatcher(ClientConfig::default());
        let identity = dispatcher.new_client_identity();

        let err = dispatcher
            .call(
                &identity,
                &endpoint,
                &DeviceCall::get(DeviceType::Camera, 0, "imagearray"),
            )
            .await
            .unwrap_err();
        match err {
            DeviceError::Protocol(e) => {
                assert_eq!(e.kind, ProtocolErrorKind::DriverError);
                assert_eq!(e.error_number, codes::UNSPECIFIED_ERROR);
                assert_eq!(e.message, "HTTP 400: Camera 0 is not configured");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connection_refused_is_communication_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let dispatcher = dispatcher(ClientConfig::default());
        let identity = dispatcher.new_client_identity();
        let endpoint = ServerEndpoint::new("127.0.0.1", port, ServiceType::Http);

        let err = dispatcher
            .call(&identity, &endpoint, &DeviceCall::get(DeviceType::Focuser, 0, "position"))
            .await
            .unwrap_err();
        assert!(matches!(err, DeviceError::Communication(_)), "got {:?}", err);
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_tier_timeout_applies() {
        let router = Router::new().route(
            "/api/v1/camera/0/imageready",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(3)).await;
                Json(json!({"Value": true, "ErrorNumber": 0}))
            }),
        );
        let endpoint = serve(router).await;
        let dispatcher = dispatcher(ClientConfig {
            standard_timeout_ms: 200,
            ..Default::default()
        });
        let identity = dispatcher.new_client_identity();

        let started = Instant::now();
        let err = dispatcher
            .call(
                &identity,
                &endpoint,
                &DeviceCall::get(DeviceType::Camera, 0, "imageready").shape(ValueShape::Bool),
            )
            .await
            .unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(matches!(
            err,
            DeviceError::Communication(CommunicationError::Timeout { timeout_ms: 200, .. })
        ));
    }

    #[tokio::test]
    async fn test_cancel_aborts_call() {
        let router = Router::new().route(
            "/api/v1/dome/0/slewtoazimuth",
            put(|| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Json(json!({"ErrorNumber": 0}))
            }),
        );
        let endpoint = serve(router).await;
        let dispatcher = dispatcher(ClientConfig::default());
        let identity = dispatcher.new_client_identity();
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let err = dispatcher
            .call_with_cancel(
                &identity,
                &endpoint,
                &DeviceCall::put(DeviceType::Dome, 0, "slewtoazimuth").tier(TimeoutTier::Long),
                &cancel,
            )
            .await
            .unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(matches!(
            err,
            DeviceError::Communication(CommunicationError::Cancelled { .. })
        ));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_basic_auth_header() {
        let router = Router::new().route(
            "/api/v1/safetymonitor/0/issafe",
            get(|headers: HeaderMap| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                Json(json!({"Value": auth, "ErrorNumber": 0}))
            }),
        );
        let endpoint = serve(router).await;
        let dispatcher = dispatcher(ClientConfig {
            user_name: Some("observer".to_string()),
            password: Some("clear-skies".to_string()),
            ..Default::default()
        });
        let identity = dispatcher.new_client_identity();

        let auth: String = dispatcher
            .call_typed(
                &identity,
                &endpoint,
                DeviceCall::get(DeviceType::SafetyMonitor, 0, "issafe"),
            )
            .await
            .unwrap();
        // base64("observer:clear-skies")
        assert_eq!(auth, "Basic b2JzZXJ2ZXI6Y2xlYXItc2tpZXM=");
    }

    #[tokio::test]
    async fn test_invalid_endpoint_is_configuration_error() {
        let dispatcher = dispatcher(ClientConfig::default());
        let identity = dispatcher.new_client_identity();
        let endpoint = ServerEndpoint::new("127.0.0.1", 0, ServiceType::Http);

        let err = dispatcher
            .call(&identity, &endpoint, &DeviceCall::get(DeviceType::Dome, 0, "azimuth"))
            .await
            .unwrap_err();
        assert!(matches!(err, DeviceError::Configuration(_)));
        assert_eq!(identity.transactions_issued(), 0);
    }

    #[test]
    fn test_connect_timeout_reports_establish_tier() {
        let tiers = TimeoutTiers::new(
            Duration::from_millis(3000),
            Duration::from_millis(200),
            Duration::from_millis(9000),
        )
        .unwrap();

        for tier in [TimeoutTier::Standard, TimeoutTier::Long] {
            assert_eq!(timeout_budget(&tiers, tier, true), Duration::from_millis(3000));
        }
        assert_eq!(
            timeout_budget(&tiers, TimeoutTier::Standard, false),
            Duration::from_millis(200)
        );
        assert_eq!(
            timeout_budget(&tiers, TimeoutTier::Long, false),
            Duration::from_millis(9000)
        );
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ClientConfig {
            long_timeout_ms: 0,
            ..Default::default()
        };
        assert!(TransactionDispatcher::new(&config).is_err());
    }

    #[test]
    fn test_identities_come_from_injected_counter() {
        let counter = Arc::new(SequenceCounter::starting_at(100));
        let a = TransactionDispatcher::with_counter(&ClientConfig::default(), counter.clone()).unwrap();
        let b = TransactionDispatcher::with_counter(&ClientConfig::default(), counter).unwrap();
        assert_eq!(a.new_client_identity().client_id(), 100);
        assert_eq!(b.new_client_identity().client_id(), 101);
    }
}
