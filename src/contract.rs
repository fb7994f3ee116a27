//! The lottery contract: a fixed address and ABI bound to a [`Connection`].

use crate::{
    Error,
    Result,
    constants::{
        LOTTERY_CONTRACT_ADDRESS,
        abi,
    },
    provider::{
        Connection,
        Signer,
        TransactionRequest,
    },
    transport::{
        WalletTransport,
        parse_u64_quantity,
    },
};
use alloy_primitives::{
    Address,
    B256,
    U256,
    keccak256,
};
use serde_json::{
    Value,
    json,
};
use std::str::FromStr;

pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

pub fn event_topic(signature: &str) -> B256 {
    keccak256(signature.as_bytes())
}

/// One observed `LotteryEnter(address)` log.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EntrantJoined {
    pub player: Address,
    pub block_number: u64,
    pub transaction_hash: Option<B256>,
}

#[derive(Debug)]
pub struct LotteryContract<T> {
    connection: Connection<T>,
    address: Address,
}

impl<T> Clone for LotteryContract<T> {
    fn clone(&self) -> Self {
        Self {
            connection: self.connection.clone(),
            address: self.address,
        }
    }
}

impl<T: WalletTransport> LotteryContract<T> {
    pub fn new(connection: Connection<T>) -> Self {
        Self::at(connection, LOTTERY_CONTRACT_ADDRESS)
    }

    pub fn at(connection: Connection<T>, address: Address) -> Self {
        Self {
            connection,
            address,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn connection(&self) -> &Connection<T> {
        &self.connection
    }

    /// Native currency currently pooled in the contract.
    pub async fn pooled_balance(&self) -> Result<U256> {
        self.connection.balance_of(self.address).await
    }

    pub async fn get_number_of_players(&self) -> Result<U256> {
        let data = self
            .connection
            .call(
                self.address,
                &selector(abi::GET_NUMBER_OF_PLAYERS),
                "player count",
            )
            .await?;
        decode_uint(&data)
    }

    pub async fn get_recent_winner(&self) -> Result<Address> {
        let data = self
            .connection
            .call(self.address, &selector(abi::GET_RECENT_WINNER), "recent winner")
            .await?;
        decode_address(&data)
    }

    pub fn enter_lottery_request(&self, value: U256) -> TransactionRequest {
        TransactionRequest {
            to: self.address,
            value,
            data: selector(abi::ENTER_LOTTERY).to_vec(),
        }
    }

    pub async fn enter_lottery(&self, signer: &Signer<T>, value: U256) -> Result<B256> {
        signer
            .send_transaction(&self.enter_lottery_request(value))
            .await
    }

    /// `LotteryEnter` logs emitted in `from_block..=to_block`.
    pub async fn entrants_between(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<EntrantJoined>> {
        let filter = json!({
            "address": self.address.to_string(),
            "topics": [event_topic(abi::LOTTERY_ENTER_EVENT).to_string()],
            "fromBlock": format!("{from_block:#x}"),
            "toBlock": format!("{to_block:#x}"),
        });
        let raw = self
            .connection
            .request("eth_getLogs", json!([filter]))
            .await
            .map_err(Error::read("entry logs"))?;
        let logs = raw
            .as_array()
            .ok_or_else(|| Error::Decode(format!("expected log list, got {raw}")))?;
        logs.iter().map(decode_entrant_log).collect()
    }
}

fn decode_uint(data: &[u8]) -> Result<U256> {
    let word = data
        .get(..32)
        .ok_or_else(|| Error::Decode(format!("expected 32-byte word, got {} bytes", data.len())))?;
    Ok(U256::from_be_slice(word))
}

fn decode_address(data: &[u8]) -> Result<Address> {
    let word = data
        .get(..32)
        .ok_or_else(|| Error::Decode(format!("expected 32-byte word, got {} bytes", data.len())))?;
    Ok(Address::from_slice(&word[12..]))
}

fn decode_entrant_log(log: &Value) -> Result<EntrantJoined> {
    // The player is indexed on newer deployments and sits in `data` on older ones.
    let word = match log["topics"].get(1).and_then(Value::as_str) {
        Some(topic) => topic,
        None => log["data"]
            .as_str()
            .ok_or_else(|| Error::Decode(format!("log without player: {log}")))?,
    };
    let bytes = hex::decode(word.strip_prefix("0x").unwrap_or(word))
        .map_err(|err| Error::Decode(format!("bad log word: {err}")))?;
    let player = decode_address(&bytes)?;
    let block_number = parse_u64_quantity(&log["blockNumber"])
        .map_err(|err| Error::Decode(err.to_string()))?;
    let transaction_hash = log["transactionHash"]
        .as_str()
        .and_then(|hash| B256::from_str(hash).ok());
    Ok(EntrantJoined {
        player,
        block_number,
        transaction_hash,
    })
}
