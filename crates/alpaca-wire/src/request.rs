//! Request encoding.
//!
//! A [`Transaction`] is everything the dispatcher knows about one outbound
//! call. [`encode_request`] turns it into an [`HttpRequest`]: the absolute URL
//! plus the key/value pairs that go into the query string (`GET`) or the
//! form-encoded body (`PUT`). Percent-encoding is left to the HTTP client.

use crate::response::DecodedResponse;
use alpaca_core::types::{API_PATH, API_VERSION, MANAGEMENT_PATH};
use alpaca_core::{DeviceType, HttpMethod, ServerEndpoint, TimeoutTier};
use std::fmt;

/// Parameter name carrying the client id.
pub const CLIENT_ID: &str = "ClientID";

/// Parameter name carrying the client transaction id.
pub const CLIENT_TRANSACTION_ID: &str = "ClientTransactionID";

/// Where on the server an operation lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiPath {
    /// `/api/v1/{device_type}/{device_number}/{operation}`
    Device {
        device_type: DeviceType,
        device_number: u32,
        operation: String,
    },
    /// `/management/v1/{operation}`
    Management { operation: String },
    /// `/management/apiversions`
    ApiVersions,
}

impl ApiPath {
    /// A device operation; the operation name is lower-cased.
    pub fn device(device_type: DeviceType, device_number: u32, operation: impl Into<String>) -> Self {
        ApiPath::Device {
            device_type,
            device_number,
            operation: operation.into().to_ascii_lowercase(),
        }
    }

    /// A versioned management operation.
    pub fn management(operation: impl Into<String>) -> Self {
        ApiPath::Management {
            operation: operation.into(),
        }
    }

    /// Absolute path, starting with `/`.
    pub fn path(&self) -> String {
        match self {
            ApiPath::Device {
                device_type,
                device_number,
                operation,
            } => format!(
                "/{}/v{}/{}/{}/{}",
                API_PATH,
                API_VERSION,
                device_type.url_segment(),
                device_number,
                operation
            ),
            ApiPath::Management { operation } => {
                format!("/{}/v{}/{}", MANAGEMENT_PATH, API_VERSION, operation)
            }
            ApiPath::ApiVersions => format!("/{}/apiversions", MANAGEMENT_PATH),
        }
    }

    /// Short name used in logs and error messages.
    pub fn operation(&self) -> &str {
        match self {
            ApiPath::Device { operation, .. } => operation,
            ApiPath::Management { operation } => operation,
            ApiPath::ApiVersions => "apiversions",
        }
    }
}

impl fmt::Display for ApiPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// One outbound call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub client_id: u32,
    pub client_transaction_id: u32,
    /// Filled in from the response, when the server sends one
    pub server_transaction_id: Option<u32>,
    pub method: HttpMethod,
    pub endpoint: ServerEndpoint,
    pub path: ApiPath,
    /// Operation parameters in caller order
    pub parameters: Vec<(String, String)>,
    pub timeout_tier: TimeoutTier,
}

impl Transaction {
    /// Absolute URL of the operation.
    pub fn url(&self) -> String {
        format!("{}{}", self.endpoint.base_url(), self.path.path())
    }

    /// Takes the server's transaction id from its reply.
    ///
    /// Returns false when the reply echoes a different client transaction
    /// id than the one sent.
    pub fn record_response(&mut self, response: &DecodedResponse) -> bool {
        self.server_transaction_id = response.server_transaction_id;
        response
            .client_transaction_id
            .map_or(true, |echoed| echoed == self.client_transaction_id)
    }
}

/// A request ready to hand to an HTTP client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    /// Query string pairs (GET)
    pub query: Vec<(String, String)>,
    /// Form body pairs (PUT)
    pub form: Vec<(String, String)>,
}

/// Encodes a transaction.
///
/// `GET` carries the operation parameters followed by `ClientID` and
/// `ClientTransactionID` in the query string; `PUT` carries the same pairs
/// in a form-encoded body and has no query string.
pub fn encode_request(tx: &Transaction) -> HttpRequest {
    let mut pairs = Vec::with_capacity(tx.parameters.len() + 2);
    pairs.extend(tx.parameters.iter().cloned());
    pairs.push((CLIENT_ID.to_string(), tx.client_id.to_string()));
    pairs.push((
        CLIENT_TRANSACTION_ID.to_string(),
        tx.client_transaction_id.to_string(),
    ));

    let (query, form) = match tx.method {
        HttpMethod::Get => (pairs, Vec::new()),
        HttpMethod::Put => (Vec::new(), pairs),
    };

    HttpRequest {
        method: tx.method,
        url: tx.url(),
        query,
        form,
    }
}
