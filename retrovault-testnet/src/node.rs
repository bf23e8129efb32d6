//! The in-process ledger node.
//!
//! One axum route, `POST /`, speaking the JSON-RPC surface of a deployed
//! node over an in-memory account map. Operations run against a staged
//! overlay and commit atomically; the slot counter advances once per
//! applied operation or airdrop.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use retrovault::transport::wire::{
    method, AccountInfo, RpcRequest, RpcResponse, ERROR_INSUFFICIENT_FUNDS, ERROR_INVALID_PARAMS,
    ERROR_METHOD_NOT_FOUND, ERROR_PROGRAM, MAX_MULTIPLE_ACCOUNTS,
};
use retrovault_common::{Address, OperationEnvelope};
use retrovault_program::{apply, AccountStore, MemoryStore, Overlay};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use url::Url;

/// Flat fee debited from the signer per applied operation.
pub const OPERATION_FEE: u64 = 5_000;

#[derive(Default)]
struct LedgerState {
    store: MemoryStore,
    balances: HashMap<Address, u64>,
    slot: u64,
}

/// The node itself; [`LedgerNode::spawn`] serves it on an ephemeral port.
#[derive(Clone, Default)]
pub struct LedgerNode {
    state: Arc<Mutex<LedgerState>>,
}

/// A running node: its URL and the serving task, aborted on drop.
pub struct NodeHandle {
    url: Url,
    node: LedgerNode,
    task: JoinHandle<()>,
}

impl NodeHandle {
    /// The node's RPC URL.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The node behind this handle, for direct state inspection in tests.
    #[must_use]
    pub fn node(&self) -> &LedgerNode {
        &self.node
    }
}

impl Drop for NodeHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl LedgerNode {
    /// A fresh node with an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve this node on `127.0.0.1` at an OS-assigned port.
    pub async fn spawn(self) -> anyhow::Result<NodeHandle> {
        self.spawn_at("127.0.0.1:0".parse()?).await
    }

    /// Serve this node at `addr`.
    pub async fn spawn_at(self, addr: SocketAddr) -> anyhow::Result<NodeHandle> {
        let listener = TcpListener::bind(addr).await?;
        let local = listener.local_addr()?;
        let url = Url::parse(&format!("http://{local}"))?;

        let app = Router::new()
            .route("/", post(handle_rpc))
            .route("/health", get(|| async { "ok" }))
            .with_state(self.clone());

        let task = tokio::spawn(async move {
            if let Err(error) = axum::serve(listener, app).await {
                tracing::error!(%error, "ledger node stopped");
            }
        });

        tracing::info!(%url, "ledger node listening");
        Ok(NodeHandle {
            url,
            node: self,
            task,
        })
    }

    /// Credit `address` out of thin air. The faucet behind `requestAirdrop`.
    pub fn credit(&self, address: &Address, amount: u64) {
        let mut state = self.state.lock().expect("ledger lock");
        *state.balances.entry(*address).or_default() += amount;
        state.slot += 1;
    }

    /// Current balance of `address`.
    #[must_use]
    pub fn balance(&self, address: &Address) -> u64 {
        let state = self.state.lock().expect("ledger lock");
        state.balances.get(address).copied().unwrap_or(0)
    }

    /// Read raw account bytes, for direct assertions in tests.
    #[must_use]
    pub fn account(&self, address: &Address) -> Option<Vec<u8>> {
        self.state.lock().expect("ledger lock").store.get(address)
    }

    /// Overwrite raw account bytes. Test-only corruption hook.
    pub fn set_account(&self, address: Address, data: Vec<u8>) {
        self.state.lock().expect("ledger lock").store.put(address, data);
    }

    fn dispatch(&self, request: &RpcRequest) -> RpcResponse {
        let id = request.id;
        match request.method.as_str() {
            method::GET_ACCOUNT_INFO => self.get_account_info(id, &request.params),
            method::GET_MULTIPLE_ACCOUNTS => self.get_multiple_accounts(id, &request.params),
            method::SEND_OPERATION => self.send_operation(id, &request.params),
            method::GET_SLOT => {
                let slot = self.state.lock().expect("ledger lock").slot;
                RpcResponse::success(id, json!(slot))
            }
            method::GET_BALANCE => self.get_balance(id, &request.params),
            method::REQUEST_AIRDROP => self.request_airdrop(id, &request.params),
            method::GET_HEALTH => RpcResponse::success(id, json!("ok")),
            other => RpcResponse::failure(
                id,
                ERROR_METHOD_NOT_FOUND,
                format!("unknown method {other}"),
                None,
            ),
        }
    }

    fn get_account_info(&self, id: u64, params: &Value) -> RpcResponse {
        let Some(address) = param_address(params, 0) else {
            return invalid_params(id, "params: [address_base58]");
        };
        let state = self.state.lock().expect("ledger lock");
        RpcResponse::success(
            id,
            json!({ "value": account_value(&state, &address) }),
        )
    }

    fn get_multiple_accounts(&self, id: u64, params: &Value) -> RpcResponse {
        let Some(list) = params.get(0).and_then(Value::as_array) else {
            return invalid_params(id, "params: [[address_base58, …]]");
        };
        if list.len() > MAX_MULTIPLE_ACCOUNTS {
            return invalid_params(
                id,
                &format!("at most {MAX_MULTIPLE_ACCOUNTS} addresses per call"),
            );
        }
        let mut addresses = Vec::with_capacity(list.len());
        for value in list {
            match value.as_str().and_then(|s| s.parse::<Address>().ok()) {
                Some(address) => addresses.push(address),
                None => return invalid_params(id, "addresses must be base58 strings"),
            }
        }

        let state = self.state.lock().expect("ledger lock");
        let values: Vec<Value> = addresses
            .iter()
            .map(|address| account_value(&state, address))
            .collect();
        RpcResponse::success(id, json!({ "value": values }))
    }

    fn get_balance(&self, id: u64, params: &Value) -> RpcResponse {
        let Some(address) = param_address(params, 0) else {
            return invalid_params(id, "params: [address_base58]");
        };
        RpcResponse::success(id, json!(self.balance(&address)))
    }

    fn request_airdrop(&self, id: u64, params: &Value) -> RpcResponse {
        let Some(address) = param_address(params, 0) else {
            return invalid_params(id, "params: [address_base58, amount]");
        };
        let Some(amount) = params.get(1).and_then(Value::as_u64) else {
            return invalid_params(id, "params: [address_base58, amount]");
        };
        self.credit(&address, amount);
        let receipt: [u8; 32] =
            Sha256::digest(format!("airdrop:{address}:{amount}")).into();
        RpcResponse::success(id, json!(bs58::encode(receipt).into_string()))
    }

    fn send_operation(&self, id: u64, params: &Value) -> RpcResponse {
        let Some(encoded) = params.get(0).and_then(Value::as_str) else {
            return invalid_params(id, "params: [envelope_base64]");
        };
        let Ok(bytes) = base64::engine::general_purpose::STANDARD.decode(encoded) else {
            return invalid_params(id, "envelope is not base64");
        };
        let envelope = match OperationEnvelope::from_bytes(&bytes) {
            Ok(envelope) => envelope,
            Err(error) => return invalid_params(id, &format!("bad envelope: {error}")),
        };
        let operation = match envelope.open() {
            Ok(operation) => operation,
            Err(error) => return invalid_params(id, &format!("bad envelope: {error}")),
        };

        let signer_account = Address::from_bytes(envelope.signer.to_bytes());
        let mut state = self.state.lock().expect("ledger lock");

        let balance = state.balances.get(&signer_account).copied().unwrap_or(0);
        if balance < OPERATION_FEE {
            return RpcResponse::failure(
                id,
                ERROR_INSUFFICIENT_FUNDS,
                format!("signer balance {balance} cannot pay the {OPERATION_FEE} fee"),
                None,
            );
        }

        let slot = state.slot;
        let mut overlay = Overlay::new(&state.store);
        match apply(&mut overlay, slot, &envelope.signer, &operation) {
            Ok(()) => {
                let writes = overlay.into_writes();
                for (address, data) in writes {
                    state.store.put(address, data);
                }
                state.slot += 1;
                *state.balances.entry(signer_account).or_default() -= OPERATION_FEE;
                tracing::debug!(op = operation.name(), slot, "operation applied");
                RpcResponse::success(id, json!(envelope.transaction_id()))
            }
            Err(error) => {
                tracing::debug!(op = operation.name(), %error, "operation rejected");
                RpcResponse::failure(
                    id,
                    ERROR_PROGRAM,
                    error.to_string(),
                    Some(json!({
                        "custom_code": error.code(),
                        "logs": [format!("Program log: {error}")],
                    })),
                )
            }
        }
    }
}

fn account_value(state: &LedgerState, address: &Address) -> Value {
    match state.store.get(address) {
        Some(data) => serde_json::to_value(AccountInfo {
            data: base64::engine::general_purpose::STANDARD.encode(data),
            slot: state.slot,
        })
        .expect("AccountInfo to json"),
        None => Value::Null,
    }
}

fn param_address(params: &Value, index: usize) -> Option<Address> {
    params
        .get(index)
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
}

fn invalid_params(id: u64, message: &str) -> RpcResponse {
    RpcResponse::failure(id, ERROR_INVALID_PARAMS, message, None)
}

async fn handle_rpc(
    State(node): State<LedgerNode>,
    Json(request): Json<RpcRequest>,
) -> Json<RpcResponse> {
    if request.jsonrpc != "2.0" {
        return Json(invalid_params(request.id, "jsonrpc must be \"2.0\""));
    }
    Json(node.dispatch(&request))
}

#[cfg(test)]
mod tests {
    use retrovault_common::{Keypair, Operation};

    use super::*;

    fn signed(keypair: &Keypair, operation: &Operation) -> String {
        base64::engine::general_purpose::STANDARD
            .encode(OperationEnvelope::sign(keypair, operation).to_bytes())
    }

    #[test]
    fn fee_and_slot_accounting() {
        let node = LedgerNode::new();
        let keypair = Keypair::from_secret(&[1; 32]);
        let signer = Address::from_bytes(keypair.public_key().to_bytes());

        // Unfunded signer is refused.
        let request = RpcRequest::new(
            1,
            method::SEND_OPERATION,
            json!([signed(&keypair, &Operation::InitializeCatalog)]),
        );
        let response = node.dispatch(&request);
        assert_eq!(response.error.unwrap().code, ERROR_INSUFFICIENT_FUNDS);

        node.credit(&signer, OPERATION_FEE * 2);
        let response = node.dispatch(&request);
        assert!(response.error.is_none());
        assert_eq!(node.balance(&signer), OPERATION_FEE);

        // Program rejection carries the stable code, and charges nothing.
        let response = node.dispatch(&RpcRequest::new(
            2,
            method::SEND_OPERATION,
            json!([signed(&keypair, &Operation::InitializeCatalog)]),
        ));
        let error = response.error.unwrap();
        assert_eq!(error.code, ERROR_PROGRAM);
        assert_eq!(error.custom_code(), Some(6000));
        assert_eq!(node.balance(&signer), OPERATION_FEE);
    }

    #[test]
    fn tampered_envelope_is_invalid_params() {
        let node = LedgerNode::new();
        let keypair = Keypair::from_secret(&[2; 32]);
        let mut envelope = OperationEnvelope::sign(&keypair, &Operation::InitializeCatalog);
        envelope.payload.push(0);
        let encoded = base64::engine::general_purpose::STANDARD.encode(envelope.to_bytes());

        let response = node.dispatch(&RpcRequest::new(
            1,
            method::SEND_OPERATION,
            json!([encoded]),
        ));
        assert_eq!(response.error.unwrap().code, ERROR_INVALID_PARAMS);
    }
}
