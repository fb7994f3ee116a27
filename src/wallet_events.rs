use crate::{
    provider::Connection,
    transport::WalletTransport,
};
use alloy_primitives::Address;
use std::time::Duration;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{
        self,
        MissedTickBehavior,
    },
};
use tracing::{
    debug,
    info,
};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum WalletChange {
    ChainChanged(u64),
    AccountsChanged(Vec<Address>),
}

/// Watches the wallet for network and account switches by polling. A change
/// invalidates the connection it was observed on.
#[derive(Debug)]
pub struct WalletWatcher {
    changes: mpsc::UnboundedReceiver<WalletChange>,
    handle: JoinHandle<()>,
}

impl WalletWatcher {
    pub fn spawn<T: WalletTransport + 'static>(
        connection: Connection<T>,
        poll_interval: Duration,
    ) -> Self {
        let (tx, changes) = mpsc::unbounded_channel();
        let handle = tokio::spawn(watch_wallet(connection, poll_interval, tx));
        Self { changes, handle }
    }

    pub async fn next_change(&mut self) -> Option<WalletChange> {
        self.changes.recv().await
    }
}

impl Drop for WalletWatcher {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn watch_wallet<T: WalletTransport>(
    connection: Connection<T>,
    poll_interval: Duration,
    tx: mpsc::UnboundedSender<WalletChange>,
) {
    let mut ticker = time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_chain: Option<u64> = None;
    let mut last_accounts: Option<Vec<Address>> = None;
    loop {
        ticker.tick().await;
        // Unreadable state is skipped rather than reported as a change.
        if let Ok(chain_id) = connection.chain_id().await {
            if last_chain.is_some_and(|last| last != chain_id) {
                info!(chain_id, "wallet switched network");
                if tx.send(WalletChange::ChainChanged(chain_id)).is_err() {
                    break;
                }
            }
            last_chain = Some(chain_id);
        }
        if let Ok(accounts) = connection.accounts().await {
            if last_accounts.as_ref().is_some_and(|last| *last != accounts) {
                info!(?accounts, "wallet switched accounts");
                if tx.send(WalletChange::AccountsChanged(accounts.clone())).is_err() {
                    break;
                }
            }
            last_accounts = Some(accounts);
        }
    }
    debug!("wallet watcher stopped");
}
