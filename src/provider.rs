//! Chain client provider: the single connection to the user's wallet.

use crate::{
    Error,
    Result,
    constants::{
        SUPPORTED_CHAIN_ID,
        SUPPORTED_CHAIN_ID_HEX,
    },
    transport::{
        TransportError,
        WalletTransport,
        parse_quantity,
        parse_u64_quantity,
        to_quantity,
    },
};
use alloy_primitives::{
    Address,
    B256,
    U256,
};
use serde_json::{
    Value,
    json,
};
use std::{
    str::FromStr,
    sync::Arc,
};
use tokio::task::JoinHandle;
use tracing::{
    info,
    warn,
};

/// Outcome of looking for a wallet in the host environment. `Unavailable` is final.
#[derive(Debug)]
pub enum WalletAvailability<T> {
    Unavailable,
    Available(Connection<T>),
}

impl<T> WalletAvailability<T> {
    pub fn is_available(&self) -> bool {
        matches!(self, WalletAvailability::Available(_))
    }

    pub fn connection(self) -> Result<Connection<T>> {
        match self {
            WalletAvailability::Available(connection) => Ok(connection),
            WalletAvailability::Unavailable => Err(Error::ExtensionUnavailable),
        }
    }
}

pub fn detect<T: WalletTransport>(injected: Option<T>) -> WalletAvailability<T> {
    match injected {
        Some(transport) => WalletAvailability::Available(Connection::new(transport)),
        None => {
            info!("no wallet injected into the host environment");
            WalletAvailability::Unavailable
        }
    }
}

/// A wallet session. Never mutated once built; account or network changes are
/// handled by building a new one.
#[derive(Debug)]
pub struct Connection<T> {
    transport: Arc<T>,
}

impl<T> Clone for Connection<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChainCheck {
    Supported,
    /// The wallet is on another chain; a switch was requested and not awaited.
    SwitchRequested { detected: u64 },
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TransactionRequest {
    pub to: Address,
    pub value: U256,
    pub data: Vec<u8>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TransactionReceipt {
    pub transaction_hash: B256,
    pub success: bool,
    pub block_number: Option<u64>,
}

impl<T: WalletTransport> Connection<T> {
    pub fn new(transport: T) -> Self {
        Self::from_shared(Arc::new(transport))
    }

    pub fn from_shared(transport: Arc<T>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub(crate) async fn request(
        &self,
        method: &str,
        params: Value,
    ) -> std::result::Result<Value, TransportError> {
        self.transport.request(method, params).await
    }

    pub async fn chain_id(&self) -> Result<u64> {
        let raw = self
            .request("eth_chainId", json!([]))
            .await
            .map_err(Error::read("chain id"))?;
        parse_u64_quantity(&raw).map_err(Error::read("chain id"))
    }

    pub async fn accounts(&self) -> Result<Vec<Address>> {
        let raw = self
            .request("eth_accounts", json!([]))
            .await
            .map_err(Error::read("accounts"))?;
        parse_addresses(&raw)
    }

    /// Signing capability for the currently selected account. Fails with
    /// [`Error::NoAuthorizedAccount`] until the user has authorized this client.
    pub async fn signer(&self) -> Result<Signer<T>> {
        let accounts = match self.accounts().await {
            Ok(accounts) => accounts,
            Err(Error::Read { source, .. }) if source.is_unauthorized() => Vec::new(),
            Err(err) => return Err(err),
        };
        let account = accounts.first().copied().ok_or(Error::NoAuthorizedAccount)?;
        Ok(Signer {
            account,
            connection: self.clone(),
        })
    }

    /// Prompts the user to authorize an account for this client.
    pub async fn request_authorization(&self) -> Result<Vec<Address>> {
        let raw = self
            .request("eth_requestAccounts", json!([]))
            .await
            .map_err(Error::AuthorizationDenied)?;
        let accounts = parse_addresses(&raw)?;
        if accounts.is_empty() {
            return Err(Error::NoAuthorizedAccount);
        }
        Ok(accounts)
    }

    pub async fn balance_of(&self, address: Address) -> Result<U256> {
        let raw = self
            .request("eth_getBalance", json!([address.to_string(), "latest"]))
            .await
            .map_err(Error::read("balance"))?;
        parse_quantity(&raw).map_err(Error::read("balance"))
    }

    pub async fn call(&self, to: Address, data: &[u8], what: &'static str) -> Result<Vec<u8>> {
        let call = json!({
            "to": to.to_string(),
            "data": format!("0x{}", hex::encode(data)),
        });
        let raw = self
            .request("eth_call", json!([call, "latest"]))
            .await
            .map_err(Error::read(what))?;
        decode_bytes(&raw)
    }

    pub async fn block_number(&self) -> Result<u64> {
        let raw = self
            .request("eth_blockNumber", json!([]))
            .await
            .map_err(Error::read("block number"))?;
        parse_u64_quantity(&raw).map_err(Error::read("block number"))
    }

    pub async fn transaction_receipt(&self, hash: B256) -> Result<Option<TransactionReceipt>> {
        let raw = self
            .request("eth_getTransactionReceipt", json!([hash.to_string()]))
            .await
            .map_err(Error::read("transaction receipt"))?;
        if raw.is_null() {
            return Ok(None);
        }
        let status = parse_u64_quantity(&raw["status"]).map_err(Error::read("receipt status"))?;
        let block_number = match &raw["blockNumber"] {
            Value::Null => None,
            height => Some(parse_u64_quantity(height).map_err(Error::read("receipt block"))?),
        };
        Ok(Some(TransactionReceipt {
            transaction_hash: hash,
            success: status == 1,
            block_number,
        }))
    }
}

impl<T: WalletTransport + 'static> Connection<T> {
    /// Compares the wallet's chain with the one supported chain. On mismatch a
    /// switch request is fired off in the background and never awaited.
    pub async fn ensure_supported_chain(&self) -> Result<ChainCheck> {
        let detected = self.chain_id().await?;
        if detected == SUPPORTED_CHAIN_ID {
            return Ok(ChainCheck::Supported);
        }
        warn!(
            detected,
            supported = SUPPORTED_CHAIN_ID,
            "wallet is on an unsupported chain; requesting a switch"
        );
        drop(self.request_network_switch());
        Ok(ChainCheck::SwitchRequested { detected })
    }

    fn request_network_switch(&self) -> JoinHandle<()> {
        let connection = self.clone();
        tokio::spawn(async move {
            let params = json!([{ "chainId": SUPPORTED_CHAIN_ID_HEX }]);
            if let Err(err) = connection
                .request("wallet_switchEthereumChain", params)
                .await
            {
                warn!(?err, "network switch request failed");
            }
        })
    }
}

/// Delegated authority to sign transactions for one account.
#[derive(Debug)]
pub struct Signer<T> {
    account: Address,
    connection: Connection<T>,
}

impl<T> Clone for Signer<T> {
    fn clone(&self) -> Self {
        Self {
            account: self.account,
            connection: self.connection.clone(),
        }
    }
}

impl<T: WalletTransport> Signer<T> {
    pub fn address(&self) -> Address {
        self.account
    }

    /// Hands the transaction to the wallet for signing and broadcast. Returns once
    /// the wallet accepts it, long before it is mined.
    pub async fn send_transaction(&self, tx: &TransactionRequest) -> Result<B256> {
        let params = json!([{
            "from": self.account.to_string(),
            "to": tx.to.to_string(),
            "value": to_quantity(tx.value),
            "data": format!("0x{}", hex::encode(&tx.data)),
        }]);
        let raw = self
            .connection
            .request("eth_sendTransaction", params)
            .await
            .map_err(|err| {
                if err.is_user_rejection() {
                    Error::SignatureRejected
                } else {
                    Error::Submission(err)
                }
            })?;
        let hash = raw
            .as_str()
            .ok_or_else(|| Error::Decode(format!("expected transaction hash, got {raw}")))?;
        B256::from_str(hash).map_err(|err| Error::Decode(format!("bad transaction hash {hash}: {err}")))
    }
}

fn parse_addresses(raw: &Value) -> Result<Vec<Address>> {
    let items = raw
        .as_array()
        .ok_or_else(|| Error::Decode(format!("expected account list, got {raw}")))?;
    items
        .iter()
        .map(|item| {
            let text = item
                .as_str()
                .ok_or_else(|| Error::Decode(format!("expected account, got {item}")))?;
            Address::from_str(text)
                .map_err(|err| Error::Decode(format!("bad account {text}: {err}")))
        })
        .collect()
}

fn decode_bytes(raw: &Value) -> Result<Vec<u8>> {
    let text = raw
        .as_str()
        .ok_or_else(|| Error::Decode(format!("expected hex data, got {raw}")))?;
    hex::decode(text.strip_prefix("0x").unwrap_or(text))
        .map_err(|err| Error::Decode(format!("bad hex data: {err}")))
}
