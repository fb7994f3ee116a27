//! Contract reader: the three round queries, the snapshot they feed, and the
//! `LotteryEnter` subscription that keeps it current.

use crate::{
    Error,
    Result,
    constants::WEI_PER_ETHER,
    contract::{
        EntrantJoined,
        LotteryContract,
    },
    transport::WalletTransport,
};
use alloy_primitives::{
    Address,
    U256,
};
use std::{
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{
        self,
        MissedTickBehavior,
    },
};
use tracing::{
    debug,
    info,
    warn,
};

/// Widest block range asked of `eth_getLogs` at once.
pub const LOG_RANGE_LIMIT: u64 = 1_000;

/// Last successfully read value of each round field. Fields are fetched
/// independently and may reflect different chain heights.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RoundSnapshot {
    /// Pooled balance in ether, empty until first read.
    pub balance: String,
    pub player_count: u64,
    /// `None` until a round has completed.
    pub recent_winner: Option<Address>,
}

pub struct ContractReader<T> {
    contract: LotteryContract<T>,
    snapshot: watch::Sender<RoundSnapshot>,
}

impl<T: WalletTransport> ContractReader<T> {
    pub fn new(contract: LotteryContract<T>) -> Self {
        let (snapshot, _) = watch::channel(RoundSnapshot::default());
        Self { contract, snapshot }
    }

    pub fn contract(&self) -> &LotteryContract<T> {
        &self.contract
    }

    pub fn snapshot(&self) -> RoundSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<RoundSnapshot> {
        self.snapshot.subscribe()
    }

    pub async fn balance(&self) -> Result<String> {
        self.contract.pooled_balance().await.map(format_ether)
    }

    pub async fn player_count(&self) -> Result<u64> {
        let count = self.contract.get_number_of_players().await?;
        u64::try_from(count)
            .map_err(|_| Error::Decode(format!("player count {count} overflows u64")))
    }

    pub async fn recent_winner(&self) -> Result<Option<Address>> {
        let winner = self.contract.get_recent_winner().await?;
        Ok((winner != Address::ZERO).then_some(winner))
    }

    pub async fn refresh_balance(&self) {
        if let Some(balance) = settle("balance", self.balance().await) {
            self.snapshot.send_modify(|s| s.balance = balance);
        }
    }

    pub async fn refresh_player_count(&self) {
        if let Some(count) = settle("player count", self.player_count().await) {
            self.snapshot.send_modify(|s| s.player_count = count);
        }
    }

    pub async fn refresh_recent_winner(&self) {
        if let Some(winner) = settle("recent winner", self.recent_winner().await) {
            self.snapshot.send_modify(|s| s.recent_winner = winner);
        }
    }

    pub async fn refresh_all(&self) {
        futures::join!(
            self.refresh_balance(),
            self.refresh_player_count(),
            self.refresh_recent_winner()
        );
    }

    /// A new entrant changes the pot and the head count. The winner only moves
    /// at round rollover, so it is left alone.
    pub async fn on_entrant_joined(&self, entrant: &EntrantJoined) {
        info!(player = %entrant.player, block = entrant.block_number, "ticket bought");
        futures::join!(self.refresh_balance(), self.refresh_player_count());
    }
}

impl<T: WalletTransport + 'static> ContractReader<T> {
    /// Polls for `LotteryEnter` logs from the block after the current head.
    /// Dropping the returned handle deregisters the listener.
    pub fn subscribe_entries(self: &Arc<Self>, poll_interval: Duration) -> EntrySubscription {
        let reader = Arc::clone(self);
        let handle = tokio::spawn(async move { reader.watch_entries(poll_interval).await });
        EntrySubscription { handle }
    }

    async fn watch_entries(&self, poll_interval: Duration) {
        let mut ticker = time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut next_block: Option<u64> = None;
        loop {
            ticker.tick().await;
            let head = match self.contract.connection().block_number().await {
                Ok(head) => head,
                Err(err) => {
                    warn!(%err, "entry poll could not read chain head");
                    continue;
                }
            };
            let Some(from) = next_block else {
                debug!(head, "entry subscription anchored");
                next_block = Some(head.saturating_add(1));
                continue;
            };
            if head < from {
                continue;
            }
            next_block = Some(self.catch_up(from, head).await);
        }
    }

    /// Walks `from..=head` in ranges providers accept. Returns the first block
    /// not yet scanned; a failed range is retried from its start on the next tick.
    async fn catch_up(&self, from: u64, head: u64) -> u64 {
        let mut from = from;
        while from <= head {
            let to = head.min(from.saturating_add(LOG_RANGE_LIMIT - 1));
            match self.contract.entrants_between(from, to).await {
                Ok(entrants) => {
                    for entrant in &entrants {
                        self.on_entrant_joined(entrant).await;
                    }
                    from = to.saturating_add(1);
                }
                Err(err) => {
                    warn!(%err, from, to, "entry log poll failed");
                    break;
                }
            }
        }
        from
    }
}

/// Lifetime of one `LotteryEnter` listener.
#[derive(Debug)]
pub struct EntrySubscription {
    handle: JoinHandle<()>,
}

impl EntrySubscription {
    pub fn is_active(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for EntrySubscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn settle<V>(what: &'static str, read: Result<V>) -> Option<V> {
    match read {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(%err, field = what, "round read failed; keeping last value");
            None
        }
    }
}

/// Wei to a decimal ether string, trailing zeros trimmed down to one digit.
pub fn format_ether(wei: U256) -> String {
    let unit = U256::from(WEI_PER_ETHER);
    let whole = wei / unit;
    let fraction = u64::try_from(wei % unit).unwrap_or_default();
    let digits = format!("{fraction:018}");
    let trimmed = digits.trim_end_matches('0');
    if trimmed.is_empty() {
        format!("{whole}.0")
    } else {
        format!("{whole}.{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::{
        constants::abi,
        provider::Connection,
        test_helpers::{
            FakeWallet,
            address_word,
            healthy_wallet,
            uint_word,
        },
        transport::TransportError,
    };
    use serde_json::json;

    fn reader_for(wallet: &FakeWallet) -> ContractReader<FakeWallet> {
        ContractReader::new(LotteryContract::new(Connection::new(wallet.clone())))
    }

    #[test]
    fn format_ether__trims_trailing_zeros() {
        assert_eq!(format_ether(U256::ZERO), "0.0");
        assert_eq!(format_ether(U256::from(WEI_PER_ETHER)), "1.0");
        assert_eq!(format_ether(U256::from(10_000_000_000_000_000u64)), "0.01");
        assert_eq!(
            format_ether(U256::from(1_500_000_000_000_000_000u64)),
            "1.5"
        );
        assert_eq!(format_ether(U256::from(1u64)), "0.000000000000000001");
    }

    #[tokio::test]
    async fn refresh_all__populates_every_field() {
        // given
        let winner = Address::repeat_byte(0x33);
        let wallet = healthy_wallet();
        wallet.respond_call(abi::GET_NUMBER_OF_PLAYERS, uint_word(4));
        wallet.respond_call(abi::GET_RECENT_WINNER, address_word(winner));
        let reader = reader_for(&wallet);

        // when
        reader.refresh_all().await;

        // then
        assert_eq!(
            reader.snapshot(),
            RoundSnapshot {
                balance: "0.01".to_string(),
                player_count: 4,
                recent_winner: Some(winner),
            }
        );
    }

    #[tokio::test]
    async fn recent_winner__zero_address_means_no_winner_yet() {
        // given
        let wallet = healthy_wallet();
        let reader = reader_for(&wallet);

        // when
        let winner = reader.recent_winner().await.unwrap();

        // then
        assert_eq!(winner, None);
    }

    #[tokio::test]
    async fn refresh_balance__keeps_last_value_when_read_fails() {
        // given
        let wallet = healthy_wallet();
        let reader = reader_for(&wallet);
        reader.refresh_all().await;
        wallet.fail("eth_getBalance", TransportError::Transport("node down".into()));
        wallet.fail_call(
            abi::GET_NUMBER_OF_PLAYERS,
            TransportError::Transport("node down".into()),
        );

        // when
        reader.refresh_balance().await;
        reader.refresh_player_count().await;

        // then
        let snapshot = reader.snapshot();
        assert_eq!(snapshot.balance, "0.01");
        assert_eq!(snapshot.player_count, 1);
    }

    #[tokio::test]
    async fn on_entrant_joined__refetches_balance_and_count_but_not_winner() {
        // given
        let wallet = healthy_wallet();
        let reader = reader_for(&wallet);
        let entrant = EntrantJoined {
            player: Address::repeat_byte(0x44),
            block_number: 17,
            transaction_hash: None,
        };

        // when
        reader.on_entrant_joined(&entrant).await;

        // then
        assert_eq!(wallet.calls("eth_getBalance"), 1);
        assert_eq!(wallet.calls_to(abi::GET_NUMBER_OF_PLAYERS), 1);
        assert_eq!(wallet.calls_to(abi::GET_RECENT_WINNER), 0);
    }

    #[tokio::test]
    async fn watch__notifies_receivers_on_refresh() {
        // given
        let wallet = healthy_wallet();
        wallet.respond("eth_getBalance", json!("0xde0b6b3a7640000"));
        let reader = reader_for(&wallet);
        let mut updates = reader.watch();

        // when
        reader.refresh_balance().await;

        // then
        assert!(updates.has_changed().unwrap());
        assert_eq!(updates.borrow_and_update().balance, "1.0");
    }
}
