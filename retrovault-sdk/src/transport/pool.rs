//! Round-robin endpoint pool with failover and rate-limit obedience.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use retrovault_common::{Address, OperationEnvelope};
use serde_json::{json, Value};

use crate::errors::{ConflictError, Error, TransportError};

use super::rate_limit::{parse_retry_after, RateLimiter};
use super::wire::{
    self, AccountInfo, RpcRequest, RpcResponse, ERROR_INSUFFICIENT_FUNDS, ERROR_INVALID_PARAMS,
    ERROR_METHOD_NOT_FOUND, ERROR_PROGRAM, ERROR_RATE_LIMITED, MAX_MULTIPLE_ACCOUNTS,
};
use super::Endpoint;

/// Pause between attempts after a rate-limit event.
const RATE_LIMIT_PAUSE: Duration = Duration::from_secs(1);

/// An account as read over RPC.
#[derive(Debug, Clone)]
pub struct Account {
    /// The raw account bytes.
    pub data: Vec<u8>,
    /// Slot the read was served at.
    pub slot: u64,
}

enum CallFailure {
    /// Transient: try the next endpoint.
    Transport(String),
    /// The endpoint told us to slow down.
    RateLimited { retry_after: Option<Duration> },
    /// Definite answer; retrying elsewhere cannot change it.
    Fatal(Box<Error>),
}

/// Connection pool over one primary endpoint plus fallbacks.
///
/// Each attempt picks the next endpoint round-robin; up to `2 × endpoints`
/// attempts are made per call. Public endpoints go through the shared
/// [`RateLimiter`]; rate-limit signals advance its `retry_after_until` and
/// pause the pool for a second before the next attempt.
#[derive(Debug, Clone)]
pub struct RpcPool {
    http: reqwest::Client,
    endpoints: Arc<Vec<Endpoint>>,
    cursor: Arc<AtomicUsize>,
    next_id: Arc<AtomicU64>,
    limiter: Arc<RateLimiter>,
}

impl RpcPool {
    /// Build a pool over `endpoints` sharing `limiter`.
    ///
    /// `endpoints` must be non-empty; the first entry is the primary.
    pub fn new(endpoints: Vec<Endpoint>, limiter: Arc<RateLimiter>) -> Result<Self, Error> {
        if endpoints.is_empty() {
            return Err(Error::Input {
                message: "endpoint pool cannot be empty".to_string(),
            });
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(TransportError::Http)?;
        Ok(Self {
            http,
            endpoints: Arc::new(endpoints),
            cursor: Arc::new(AtomicUsize::new(0)),
            next_id: Arc::new(AtomicU64::new(1)),
            limiter,
        })
    }

    /// The endpoints in rotation order.
    #[must_use]
    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    /// Issue one JSON-RPC call with failover and rate-limit handling.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, Error> {
        let attempts = self.endpoints.len() * 2;
        let mut last_failure = String::from("no attempt made");
        let mut still_rate_limited = None;

        for _ in 0..attempts {
            let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.endpoints.len();
            let endpoint = &self.endpoints[index];

            if endpoint.is_public() {
                self.limiter.acquire().await;
            }

            match self.call_endpoint(endpoint, method, &params).await {
                Ok(value) => return Ok(value),
                Err(CallFailure::Fatal(error)) => return Err(*error),
                Err(CallFailure::RateLimited { retry_after }) => {
                    let delay = retry_after.unwrap_or(Duration::from_secs(1));
                    tracing::warn!(%endpoint, ?delay, "rate limited, backing off");
                    self.limiter.push_back(delay).await;
                    last_failure = format!("{endpoint}: rate limited");
                    still_rate_limited = Some(delay);
                    tokio::time::sleep(RATE_LIMIT_PAUSE).await;
                }
                Err(CallFailure::Transport(message)) => {
                    tracing::debug!(%endpoint, message, "endpoint failed, rotating");
                    last_failure = format!("{endpoint}: {message}");
                    still_rate_limited = None;
                }
            }
        }

        // Exhausting the budget on back-off signals is its own failure kind.
        if let Some(retry_after) = still_rate_limited {
            return Err(Error::RateLimited { retry_after });
        }
        Err(Error::Transport(TransportError::AllEndpointsFailed {
            attempts,
            last: last_failure,
        }))
    }

    async fn call_endpoint(
        &self,
        endpoint: &Endpoint,
        method: &str,
        params: &Value,
    ) -> Result<Value, CallFailure> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest::new(id, method, params.clone());

        let response = self
            .http
            .post(endpoint.url().clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| CallFailure::Transport(e.to_string()))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            return Err(CallFailure::RateLimited {
                retry_after: parse_retry_after(Some(&headers), &body),
            });
        }

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| CallFailure::Transport(format!("invalid rpc response: {e}")))?;

        if let Some(error) = body.error {
            if error.code == ERROR_RATE_LIMITED {
                let retry_after = error
                    .data
                    .as_ref()
                    .and_then(|d| d.get("retry_after_seconds"))
                    .and_then(Value::as_u64)
                    .map(Duration::from_secs);
                return Err(CallFailure::RateLimited { retry_after });
            }
            return Err(classify_rpc_error(error.code, error.message, error.data));
        }

        body.result.ok_or_else(|| {
            CallFailure::Transport("rpc response had neither result nor error".to_string())
        })
    }

    // === Typed methods ===

    /// Read one account; `None` if it does not exist.
    pub async fn get_account(&self, address: &Address) -> Result<Option<Account>, Error> {
        let result = self
            .call(wire::method::GET_ACCOUNT_INFO, json!([address.to_string()]))
            .await?;
        parse_account_value(result.get("value"))
    }

    /// Read up to [`MAX_MULTIPLE_ACCOUNTS`] accounts in one call.
    pub async fn get_multiple_accounts(
        &self,
        addresses: &[Address],
    ) -> Result<Vec<Option<Account>>, Error> {
        if addresses.len() > MAX_MULTIPLE_ACCOUNTS {
            return Err(Error::Input {
                message: format!(
                    "getMultipleAccounts is capped at {MAX_MULTIPLE_ACCOUNTS} addresses"
                ),
            });
        }
        let list: Vec<String> = addresses.iter().map(ToString::to_string).collect();
        let result = self
            .call(wire::method::GET_MULTIPLE_ACCOUNTS, json!([list]))
            .await?;
        let values = result
            .get("value")
            .and_then(Value::as_array)
            .ok_or_else(|| invalid("getMultipleAccounts value missing"))?;
        values
            .iter()
            .map(|v| parse_account_value(Some(v)))
            .collect()
    }

    /// Submit a signed operation; returns the transaction id.
    pub async fn send_operation(&self, envelope: &OperationEnvelope) -> Result<String, Error> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(envelope.to_bytes());
        let result = self
            .call(wire::method::SEND_OPERATION, json!([encoded]))
            .await?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| invalid("sendOperation did not return a transaction id"))
    }

    /// The node's current slot.
    pub async fn get_slot(&self) -> Result<u64, Error> {
        let result = self.call(wire::method::GET_SLOT, json!([])).await?;
        result.as_u64().ok_or_else(|| invalid("getSlot not a u64"))
    }

    /// Balance of `address` in base units.
    pub async fn get_balance(&self, address: &Address) -> Result<u64, Error> {
        let result = self
            .call(wire::method::GET_BALANCE, json!([address.to_string()]))
            .await?;
        result
            .as_u64()
            .ok_or_else(|| invalid("getBalance not a u64"))
    }

    /// Ask the faucet to credit `address` with `amount` base units.
    pub async fn request_airdrop(&self, address: &Address, amount: u64) -> Result<String, Error> {
        let result = self
            .call(
                wire::method::REQUEST_AIRDROP,
                json!([address.to_string(), amount]),
            )
            .await?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| invalid("requestAirdrop did not return a transaction id"))
    }
}

fn invalid(message: &str) -> Error {
    Error::Transport(TransportError::InvalidResponse {
        message: message.to_string(),
    })
}

fn parse_account_value(value: Option<&Value>) -> Result<Option<Account>, Error> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v) => {
            let info: AccountInfo = serde_json::from_value(v.clone())
                .map_err(|e| invalid(&format!("malformed account info: {e}")))?;
            let data = base64::engine::general_purpose::STANDARD
                .decode(&info.data)
                .map_err(|e| invalid(&format!("account data is not base64: {e}")))?;
            Ok(Some(Account {
                data,
                slot: info.slot,
            }))
        }
    }
}

/// Map a definite JSON-RPC error to the caller-facing taxonomy.
fn classify_rpc_error(code: i64, message: String, data: Option<Value>) -> CallFailure {
    match code {
        ERROR_PROGRAM => {
            let custom_code = data
                .as_ref()
                .and_then(|d| d.get("custom_code"))
                .and_then(Value::as_u64)
                .map(|c| c as u32);
            let logs = data
                .as_ref()
                .and_then(|d| d.get("logs"))
                .and_then(Value::as_array)
                .map(|lines| {
                    lines
                        .iter()
                        .filter_map(|l| l.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default();
            CallFailure::Fatal(Box::new(Error::Conflict(ConflictError::Program {
                message,
                code: custom_code,
                logs,
            })))
        }
        ERROR_INVALID_PARAMS | ERROR_METHOD_NOT_FOUND => {
            CallFailure::Fatal(Box::new(Error::Input { message }))
        }
        ERROR_INSUFFICIENT_FUNDS => CallFailure::Fatal(Box::new(Error::Input {
            message: format!("insufficient funds: {message}"),
        })),
        // Anything else (internal errors and the like) may be node-local.
        _ => CallFailure::Transport(format!("rpc error {code}: {message}")),
    }
}
