//! A scripted in-memory wallet for exercising the client without a node.

use crate::{
    contract::{
        event_topic,
        selector,
    },
    constants::{
        LOTTERY_CONTRACT_ADDRESS,
        abi,
    },
    transport::{
        TransportError,
        WalletTransport,
    },
};
use alloy_primitives::{
    Address,
    B256,
};
use serde_json::{
    Value,
    json,
};
use std::{
    collections::{
        HashMap,
        VecDeque,
    },
    sync::{
        Arc,
        Mutex,
        atomic::{
            AtomicBool,
            Ordering,
        },
    },
};
use tokio::sync::Notify;

/// Method not found.
const UNSCRIPTED: i64 = -32601;

#[derive(Default)]
struct Script {
    defaults: HashMap<String, Result<Value, TransportError>>,
    queued: HashMap<String, VecDeque<Result<Value, TransportError>>>,
    requests: Vec<(String, Value)>,
}

/// Answers requests from per-method scripts and records every request it sees.
///
/// `eth_call` requests are scripted per function selector through
/// [`FakeWallet::respond_call`]. Queued one-shot answers take priority over the
/// standing answer for the same key.
#[derive(Clone, Default)]
pub struct FakeWallet {
    script: Arc<Mutex<Script>>,
}

impl FakeWallet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, method: &str, value: Value) {
        self.set_default(method.to_string(), Ok(value));
    }

    pub fn fail(&self, method: &str, error: TransportError) {
        self.set_default(method.to_string(), Err(error));
    }

    pub fn respond_once(&self, method: &str, result: Result<Value, TransportError>) {
        self.push_once(method.to_string(), result);
    }

    pub fn respond_call(&self, signature: &str, value: Value) {
        self.set_default(call_key(signature), Ok(value));
    }

    pub fn fail_call(&self, signature: &str, error: TransportError) {
        self.set_default(call_key(signature), Err(error));
    }

    pub fn respond_call_once(&self, signature: &str, result: Result<Value, TransportError>) {
        self.push_once(call_key(signature), result);
    }

    /// Number of requests made for `method`.
    pub fn calls(&self, method: &str) -> usize {
        self.requests_for(method).len()
    }

    /// Number of `eth_call` requests made for the function `signature`.
    pub fn calls_to(&self, signature: &str) -> usize {
        let key = call_key(signature);
        let script = self.lock();
        script
            .requests
            .iter()
            .filter(|(method, params)| method == "eth_call" && request_key(method, params) == key)
            .count()
    }

    pub fn requests_for(&self, method: &str) -> Vec<Value> {
        self.lock()
            .requests
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, params)| params.clone())
            .collect()
    }

    pub fn total_requests(&self) -> usize {
        self.lock().requests.len()
    }

    fn set_default(&self, key: String, result: Result<Value, TransportError>) {
        self.lock().defaults.insert(key, result);
    }

    fn push_once(&self, key: String, result: Result<Value, TransportError>) {
        self.lock().queued.entry(key).or_default().push_back(result);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl WalletTransport for FakeWallet {
    async fn request(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        let key = request_key(method, &params);
        let mut script = self.lock();
        script.requests.push((method.to_string(), params));
        if let Some(answer) = script.queued.get_mut(&key).and_then(VecDeque::pop_front) {
            return answer;
        }
        script
            .defaults
            .get(&key)
            .cloned()
            .unwrap_or_else(|| Err(TransportError::rpc(UNSCRIPTED, format!("{key} not scripted"))))
    }
}

/// Wraps a [`FakeWallet`] and holds every request for one method until
/// [`GatedWallet::open`] is called, so tests can look at the client while the
/// wallet is "showing a prompt".
#[derive(Clone)]
pub struct GatedWallet {
    inner: FakeWallet,
    method: &'static str,
    gate: Arc<Notify>,
    held: Arc<AtomicBool>,
}

impl GatedWallet {
    pub fn new(inner: FakeWallet, method: &'static str) -> Self {
        Self {
            inner,
            method,
            gate: Arc::new(Notify::new()),
            held: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Resolves once a request for the gated method is being held.
    pub async fn held(&self) {
        while !self.held.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
    }

    /// Releases one held request.
    pub fn open(&self) {
        self.gate.notify_one();
    }
}

impl WalletTransport for GatedWallet {
    async fn request(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        if method == self.method {
            self.held.store(true, Ordering::SeqCst);
            self.gate.notified().await;
            self.held.store(false, Ordering::SeqCst);
        }
        self.inner.request(method, params).await
    }
}

fn call_key(signature: &str) -> String {
    format!("eth_call:0x{}", hex::encode(selector(signature)))
}

fn request_key(method: &str, params: &Value) -> String {
    if method != "eth_call" {
        return method.to_string();
    }
    let data = params[0]["data"].as_str().unwrap_or_default();
    format!("eth_call:{}", data.get(..10).unwrap_or(data))
}

pub const ALICE: Address = Address::repeat_byte(0xa1);

pub fn uint_word(value: u64) -> Value {
    json!(format!("0x{value:064x}"))
}

pub fn address_word(address: Address) -> Value {
    json!(format!("0x{:0>64}", hex::encode(address)))
}

pub fn tx_hash(byte: u8) -> B256 {
    B256::repeat_byte(byte)
}

pub fn receipt(success: bool) -> Value {
    json!({
        "status": if success { "0x1" } else { "0x0" },
        "blockNumber": "0x10",
    })
}

pub fn entrant_log(player: Address, block_number: u64) -> Value {
    json!({
        "address": LOTTERY_CONTRACT_ADDRESS.to_string(),
        "topics": [
            event_topic(abi::LOTTERY_ENTER_EVENT).to_string(),
            format!("0x{:0>64}", hex::encode(player)),
        ],
        "data": "0x",
        "blockNumber": format!("{block_number:#x}"),
        "transactionHash": tx_hash(0xee).to_string(),
    })
}

/// Script for a healthy wallet on the supported chain with `ALICE` authorized.
pub fn healthy_wallet() -> FakeWallet {
    let wallet = FakeWallet::new();
    wallet.respond("eth_chainId", json!(crate::constants::SUPPORTED_CHAIN_ID_HEX));
    wallet.respond("eth_accounts", json!([ALICE.to_string()]));
    wallet.respond("eth_getBalance", json!("0x2386f26fc10000"));
    wallet.respond_call(abi::GET_NUMBER_OF_PLAYERS, uint_word(1));
    wallet.respond_call(abi::GET_RECENT_WINNER, address_word(Address::ZERO));
    wallet.respond("eth_blockNumber", json!("0x10"));
    wallet.respond("eth_getLogs", json!([]));
    wallet.respond("eth_sendTransaction", json!(tx_hash(0x42).to_string()));
    wallet.respond("eth_getTransactionReceipt", receipt(true));
    wallet
}
