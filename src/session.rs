//! One connection and everything bound to it. Dropping a [`Session`] tears down
//! its entry subscription, so reconnecting never stacks listeners.

use crate::{
    contract::LotteryContract,
    provider::{
        ChainCheck,
        Connection,
    },
    purchase::{
        PurchaseFlags,
        TicketPurchaser,
    },
    reader::{
        ContractReader,
        EntrySubscription,
        RoundSnapshot,
    },
    transport::WalletTransport,
};
use std::{
    sync::Arc,
    time::Duration,
};
use tokio::sync::watch;
use tracing::{
    info,
    warn,
};

#[derive(Clone, Copy, Debug)]
pub struct SessionSettings {
    pub log_poll_interval: Duration,
    pub receipt_poll_interval: Duration,
}

impl SessionSettings {
    pub fn uniform(poll_interval: Duration) -> Self {
        Self {
            log_poll_interval: poll_interval,
            receipt_poll_interval: poll_interval,
        }
    }
}

pub struct Session<T> {
    connection: Connection<T>,
    reader: Arc<ContractReader<T>>,
    purchaser: TicketPurchaser<T>,
    chain_check: Option<ChainCheck>,
    entries: EntrySubscription,
}

impl<T: WalletTransport + 'static> Session<T> {
    /// Checks the network (without waiting on any switch), performs the initial
    /// round read and subscribes to new entries.
    pub async fn start(connection: Connection<T>, settings: SessionSettings) -> Self {
        Self::start_with_flags(connection, settings, PurchaseFlags::default()).await
    }

    /// Like [`Session::start`], but purchases share `flags` with earlier
    /// sessions, so one still outstanding from before a reconnect keeps the new
    /// session pending and blocks a second purchase.
    pub async fn start_with_flags(
        connection: Connection<T>,
        settings: SessionSettings,
        flags: PurchaseFlags,
    ) -> Self {
        let chain_check = match connection.ensure_supported_chain().await {
            Ok(check) => Some(check),
            Err(err) => {
                warn!(%err, "could not read wallet network");
                None
            }
        };
        let contract = LotteryContract::new(connection.clone());
        let reader = Arc::new(ContractReader::new(contract.clone()));
        reader.refresh_all().await;
        let entries = reader.subscribe_entries(settings.log_poll_interval);
        let purchaser = TicketPurchaser::with_flags(contract, settings.receipt_poll_interval, flags);
        info!(contract = %reader.contract().address(), "session started");
        Self {
            connection,
            reader,
            purchaser,
            chain_check,
            entries,
        }
    }
}

impl<T> Session<T> {
    pub fn connection(&self) -> &Connection<T> {
        &self.connection
    }

    pub fn reader(&self) -> &Arc<ContractReader<T>> {
        &self.reader
    }

    pub fn purchaser(&self) -> &TicketPurchaser<T> {
        &self.purchaser
    }

    pub fn chain_check(&self) -> Option<ChainCheck> {
        self.chain_check
    }

    /// Whether the `LotteryEnter` listener is still running.
    pub fn is_listening(&self) -> bool {
        self.entries.is_active()
    }
}

impl<T: WalletTransport> Session<T> {
    pub fn round(&self) -> RoundSnapshot {
        self.reader.snapshot()
    }

    pub fn watch_round(&self) -> watch::Receiver<RoundSnapshot> {
        self.reader.watch()
    }
}
