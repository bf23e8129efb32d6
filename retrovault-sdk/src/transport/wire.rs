//! JSON-RPC 2.0 envelope types shared by the client and the node.
//!
//! The ledger interface is a dynamically typed wire protocol; these types
//! only shape the envelope. Account bytes travel base64 inside `result`
//! values and are decoded by the byte-exact layout codecs, never by serde.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Method names understood by a node.
pub mod method {
    /// Read one account: params `[address_base58]`.
    pub const GET_ACCOUNT_INFO: &str = "getAccountInfo";
    /// Read up to [`super::MAX_MULTIPLE_ACCOUNTS`] accounts: params `[[address, …]]`.
    pub const GET_MULTIPLE_ACCOUNTS: &str = "getMultipleAccounts";
    /// Submit a signed operation envelope: params `[envelope_base64]`.
    pub const SEND_OPERATION: &str = "sendOperation";
    /// Current slot: no params.
    pub const GET_SLOT: &str = "getSlot";
    /// Balance of an account: params `[address_base58]`.
    pub const GET_BALANCE: &str = "getBalance";
    /// Faucet credit: params `[address_base58, amount]`.
    pub const REQUEST_AIRDROP: &str = "requestAirdrop";
    /// Liveness probe: no params.
    pub const GET_HEALTH: &str = "getHealth";
}

/// Most accounts a single `getMultipleAccounts` call may read.
pub const MAX_MULTIPLE_ACCOUNTS: usize = 100;

/// JSON-RPC error code a node uses for program rejections.
pub const ERROR_PROGRAM: i64 = -32002;
/// JSON-RPC error code for a signer who cannot pay the operation fee.
pub const ERROR_INSUFFICIENT_FUNDS: i64 = -32003;
/// JSON-RPC error code for rate-limit exhaustion.
pub const ERROR_RATE_LIMITED: i64 = -32005;
/// JSON-RPC error code for malformed params.
pub const ERROR_INVALID_PARAMS: i64 = -32602;
/// JSON-RPC error code for an unknown method.
pub const ERROR_METHOD_NOT_FOUND: i64 = -32601;

/// A JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Request id echoed back in the response.
    pub id: u64,
    /// Method name, one of [`method`].
    pub method: String,
    /// Positional params.
    #[serde(default)]
    pub params: Value,
}

impl RpcRequest {
    /// Build a request.
    #[must_use]
    pub fn new(id: u64, method: &str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.to_string(),
            params,
        }
    }
}

/// A JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Echo of the request id.
    pub id: u64,
    /// Present on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Present on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorObject>,
}

impl RpcResponse {
    /// A success response.
    #[must_use]
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// A failure response.
    #[must_use]
    pub fn failure(id: u64, code: i64, message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(RpcErrorObject {
                code,
                message: message.into(),
                data,
            }),
        }
    }
}

/// The error member of a failed response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcErrorObject {
    /// JSON-RPC error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Structured context: `custom_code`, `logs`, `retry_after_seconds`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcErrorObject {
    /// The program's stable error code, when this is a program rejection.
    #[must_use]
    pub fn custom_code(&self) -> Option<u32> {
        self.data
            .as_ref()?
            .get("custom_code")?
            .as_u64()
            .map(|c| c as u32)
    }

    /// Program log lines attached by the node.
    #[must_use]
    pub fn logs(&self) -> Vec<String> {
        self.data
            .as_ref()
            .and_then(|d| d.get("logs"))
            .and_then(Value::as_array)
            .map(|lines| {
                lines
                    .iter()
                    .filter_map(|l| l.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// One account in a read response; `data` is base64.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountInfo {
    /// Base64 of the account bytes.
    pub data: String,
    /// Slot the read was served at.
    pub slot: u64,
}
