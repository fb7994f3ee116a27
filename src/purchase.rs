//! Ticket purchase flow: signer acquisition, the payable `enterLottery` call and
//! confirmation tracking.
//!
//! At most one purchase is outstanding per [`PurchaseFlags`]. The guard lives in
//! the flow itself, so callers do not have to disable anything to stay safe: a
//! second [`TicketPurchaser::buy_ticket`] while one is outstanding, signing
//! included, fails with [`Error::PurchaseInFlight`]. The pending flag is narrower:
//! it is raised only once the transaction goes to the wallet for submission.
//!
//! The flow never touches the round snapshot. Fresh balance and player count
//! arrive through the reader's entry subscription once the `LotteryEnter` log is
//! seen, which can be before or after the purchase itself settles.

use crate::{
    Error,
    Result,
    constants::LOTTERY_ENTRANCE_FEE,
    contract::LotteryContract,
    provider::Signer,
    transport::WalletTransport,
};
use alloy_primitives::{
    Address,
    B256,
    U256,
};
use std::{
    sync::{
        Arc,
        atomic::{
            AtomicBool,
            Ordering,
        },
    },
    time::Duration,
};
use tokio::time;
use tracing::{
    error,
    info,
    warn,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PurchaseStatus {
    Submitted,
    Confirmed,
    Reverted,
}

impl PurchaseStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, PurchaseStatus::Submitted)
    }

    pub fn notification(self) -> Notification {
        match self {
            PurchaseStatus::Submitted => Notification::Loading,
            PurchaseStatus::Confirmed => Notification::Success,
            PurchaseStatus::Reverted => Notification::Failure,
        }
    }
}

/// Transient messages shown for the purchase lifecycle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Notification {
    Loading,
    Success,
    Failure,
}

impl Notification {
    pub fn message(self) -> &'static str {
        match self {
            Notification::Loading => "Waiting transaction confirmation",
            Notification::Success => "Transaction confirmed !",
            Notification::Failure => "Oops ... Transaction failed",
        }
    }
}

/// One submitted ticket purchase.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TicketPurchase {
    pub transaction_hash: B256,
    pub account: Address,
    pub amount: U256,
    pub status: PurchaseStatus,
}

/// Purchase state that outlives any one connection. Hand the same flags to the
/// purchaser of every rebuilt session so an outstanding purchase stays visible.
#[derive(Clone, Debug, Default)]
pub struct PurchaseFlags {
    /// Held from `buy_ticket` entry until the purchase settles or fails.
    in_flight: Arc<AtomicBool>,
    /// Held from submission until a terminal receipt.
    pending: Arc<AtomicBool>,
}

impl PurchaseFlags {
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }
}

pub struct TicketPurchaser<T> {
    contract: LotteryContract<T>,
    entrance_fee: U256,
    receipt_poll_interval: Duration,
    flags: PurchaseFlags,
}

impl<T> Clone for TicketPurchaser<T> {
    fn clone(&self) -> Self {
        Self {
            contract: self.contract.clone(),
            entrance_fee: self.entrance_fee,
            receipt_poll_interval: self.receipt_poll_interval,
            flags: self.flags.clone(),
        }
    }
}

/// Lowers its flag on every exit path.
struct FlagGuard {
    flag: Arc<AtomicBool>,
}

impl FlagGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                flag: Arc::clone(flag),
            })
    }
}

impl Drop for FlagGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl<T: WalletTransport> TicketPurchaser<T> {
    pub fn new(contract: LotteryContract<T>, receipt_poll_interval: Duration) -> Self {
        Self::with_flags(contract, receipt_poll_interval, PurchaseFlags::default())
    }

    pub fn with_flags(
        contract: LotteryContract<T>,
        receipt_poll_interval: Duration,
        flags: PurchaseFlags,
    ) -> Self {
        Self {
            contract,
            entrance_fee: LOTTERY_ENTRANCE_FEE,
            receipt_poll_interval,
            flags,
        }
    }

    pub fn flags(&self) -> &PurchaseFlags {
        &self.flags
    }

    /// True from submission until the receipt settles.
    pub fn is_pending(&self) -> bool {
        self.flags.is_pending()
    }

    /// True from `buy_ticket` entry, signer acquisition included, until the
    /// purchase settles or fails.
    pub fn is_in_flight(&self) -> bool {
        self.flags.is_in_flight()
    }

    pub fn entrance_fee(&self) -> U256 {
        self.entrance_fee
    }

    /// Signs and submits one ticket purchase. Returns as soon as the wallet
    /// accepts the transaction; await [`PendingPurchase::confirmation`] for the
    /// on-chain outcome.
    pub async fn buy_ticket(&self) -> Result<PendingPurchase<T>> {
        let in_flight =
            FlagGuard::acquire(&self.flags.in_flight).ok_or(Error::PurchaseInFlight)?;
        let signer = self.authorized_signer().await?;
        let account = signer.address();
        let pending = FlagGuard::acquire(&self.flags.pending).ok_or(Error::PurchaseInFlight)?;
        let transaction_hash = self
            .contract
            .enter_lottery(&signer, self.entrance_fee)
            .await
            .inspect_err(|err| error!(%err, %account, "ticket purchase not submitted"))?;
        info!(%transaction_hash, %account, "ticket purchase submitted");
        Ok(PendingPurchase {
            purchase: TicketPurchase {
                transaction_hash,
                account,
                amount: self.entrance_fee,
                status: PurchaseStatus::Submitted,
            },
            contract: self.contract.clone(),
            receipt_poll_interval: self.receipt_poll_interval,
            _pending: pending,
            _in_flight: in_flight,
        })
    }

    async fn authorized_signer(&self) -> Result<Signer<T>> {
        let connection = self.contract.connection();
        match connection.signer().await {
            Err(Error::NoAuthorizedAccount) => {
                info!("no authorized account; asking the wallet for authorization");
                connection.request_authorization().await?;
                connection.signer().await
            }
            other => other,
        }
    }
}

/// A purchase the wallet accepted and the chain has not settled yet. The
/// purchaser stays pending until this is consumed or dropped.
pub struct PendingPurchase<T> {
    purchase: TicketPurchase,
    contract: LotteryContract<T>,
    receipt_poll_interval: Duration,
    _pending: FlagGuard,
    _in_flight: FlagGuard,
}

impl<T: WalletTransport> PendingPurchase<T> {
    pub fn purchase(&self) -> &TicketPurchase {
        &self.purchase
    }

    /// Waits for the receipt with no timeout. Read errors while waiting are
    /// logged and the wait goes on; the transaction is out there regardless.
    pub async fn confirmation(self) -> TicketPurchase {
        let hash = self.purchase.transaction_hash;
        let connection = self.contract.connection();
        let mut ticker = time::interval(self.receipt_poll_interval);
        let receipt = loop {
            ticker.tick().await;
            match connection.transaction_receipt(hash).await {
                Ok(Some(receipt)) => break receipt,
                Ok(None) => continue,
                Err(err) => warn!(%err, %hash, "receipt poll failed"),
            }
        };
        let status = if receipt.success {
            info!(%hash, block = ?receipt.block_number, "ticket purchase confirmed");
            PurchaseStatus::Confirmed
        } else {
            warn!(%hash, block = ?receipt.block_number, "ticket purchase reverted");
            PurchaseStatus::Reverted
        };
        TicketPurchase {
            status,
            ..self.purchase
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::{
        provider::Connection,
        test_helpers::{
            ALICE,
            FakeWallet,
            GatedWallet,
            healthy_wallet,
            receipt,
            tx_hash,
        },
        transport::{
            TransportError,
            USER_REJECTED_REQUEST,
        },
    };
    use serde_json::{
        Value,
        json,
    };

    fn purchaser_for(wallet: &FakeWallet) -> TicketPurchaser<FakeWallet> {
        TicketPurchaser::new(
            LotteryContract::new(Connection::new(wallet.clone())),
            Duration::from_millis(1),
        )
    }

    #[test]
    fn notification__reverted_is_never_reported_as_success() {
        assert_eq!(PurchaseStatus::Reverted.notification(), Notification::Failure);
        assert_eq!(PurchaseStatus::Confirmed.notification(), Notification::Success);
        assert_ne!(
            Notification::Failure.message(),
            Notification::Success.message()
        );
    }

    #[tokio::test]
    async fn buy_ticket__submits_entrance_fee_from_authorized_account() {
        // given
        let wallet = healthy_wallet();
        let purchaser = purchaser_for(&wallet);

        // when
        let pending = purchaser.buy_ticket().await.unwrap();

        // then
        let purchase = pending.purchase().clone();
        assert_eq!(purchase.account, ALICE);
        assert_eq!(purchase.amount, LOTTERY_ENTRANCE_FEE);
        assert_eq!(purchase.status, PurchaseStatus::Submitted);
        assert_eq!(purchase.transaction_hash, tx_hash(0x42));
        let sent = &wallet.requests_for("eth_sendTransaction")[0][0];
        assert_eq!(sent["value"], json!("0x2386f26fc10000"));
        assert_eq!(sent["from"], json!(ALICE.to_string()));
    }

    #[tokio::test]
    async fn buy_ticket__pending_until_confirmation_settles() {
        // given
        let wallet = healthy_wallet();
        wallet.respond_once("eth_getTransactionReceipt", Ok(Value::Null));
        let purchaser = purchaser_for(&wallet);
        assert!(!purchaser.is_pending());

        // when
        let pending = purchaser.buy_ticket().await.unwrap();
        let pending_while_waiting = purchaser.is_pending();
        let settled = pending.confirmation().await;

        // then
        assert!(pending_while_waiting);
        assert_eq!(settled.status, PurchaseStatus::Confirmed);
        assert!(!purchaser.is_pending());
        assert_eq!(wallet.calls("eth_getTransactionReceipt"), 2);
    }

    #[tokio::test]
    async fn buy_ticket__rejects_second_call_while_one_is_outstanding() {
        // given
        let wallet = healthy_wallet();
        let purchaser = purchaser_for(&wallet);
        let _first = purchaser.buy_ticket().await.unwrap();

        // when
        let second = purchaser.buy_ticket().await;

        // then
        assert!(matches!(second, Err(Error::PurchaseInFlight)));
        assert_eq!(wallet.calls("eth_sendTransaction"), 1);
    }

    #[tokio::test]
    async fn confirmation__failure_status_is_reverted() {
        // given
        let wallet = healthy_wallet();
        wallet.respond("eth_getTransactionReceipt", receipt(false));
        let purchaser = purchaser_for(&wallet);

        // when
        let settled = purchaser.buy_ticket().await.unwrap().confirmation().await;

        // then
        assert_eq!(settled.status, PurchaseStatus::Reverted);
        assert!(!purchaser.is_pending());
    }

    #[tokio::test]
    async fn buy_ticket__signature_rejection_clears_pending() {
        // given
        let wallet = healthy_wallet();
        wallet.fail(
            "eth_sendTransaction",
            TransportError::rpc(USER_REJECTED_REQUEST, "User denied transaction signature"),
        );
        let purchaser = purchaser_for(&wallet);

        // when
        let result = purchaser.buy_ticket().await;

        // then
        assert!(matches!(result, Err(Error::SignatureRejected)));
        assert!(!purchaser.is_pending());
        assert_eq!(wallet.calls("eth_getTransactionReceipt"), 0);
    }

    #[tokio::test]
    async fn buy_ticket__pending_only_while_submission_is_with_the_wallet() {
        // given
        let wallet = healthy_wallet();
        wallet.fail(
            "eth_sendTransaction",
            TransportError::rpc(USER_REJECTED_REQUEST, "User denied transaction signature"),
        );
        let gated = GatedWallet::new(wallet.clone(), "eth_sendTransaction");
        let purchaser = TicketPurchaser::new(
            LotteryContract::new(Connection::new(gated.clone())),
            Duration::from_millis(1),
        );
        assert!(!purchaser.is_pending());

        // when
        let task = tokio::spawn({
            let purchaser = purchaser.clone();
            async move { purchaser.buy_ticket().await.map(|p| p.purchase().clone()) }
        });
        gated.held().await;
        let pending_during_prompt = purchaser.is_pending();
        gated.open();
        let result = task.await.unwrap();

        // then
        assert!(pending_during_prompt);
        assert!(matches!(result, Err(Error::SignatureRejected)));
        assert!(!purchaser.is_pending());
        assert!(!purchaser.is_in_flight());
        assert_eq!(wallet.calls("eth_getTransactionReceipt"), 0);
    }

    #[tokio::test]
    async fn buy_ticket__not_pending_while_authorization_prompt_is_open() {
        // given
        let wallet = healthy_wallet();
        wallet.respond_once("eth_accounts", Ok(json!([])));
        wallet.respond("eth_requestAccounts", json!([ALICE.to_string()]));
        let gated = GatedWallet::new(wallet.clone(), "eth_requestAccounts");
        let purchaser = TicketPurchaser::new(
            LotteryContract::new(Connection::new(gated.clone())),
            Duration::from_millis(1),
        );

        // when
        let task = tokio::spawn({
            let purchaser = purchaser.clone();
            async move { purchaser.buy_ticket().await }
        });
        gated.held().await;
        let pending_during_prompt = purchaser.is_pending();
        let in_flight_during_prompt = purchaser.is_in_flight();
        let second = purchaser.buy_ticket().await;
        gated.open();
        let first = task.await.unwrap().unwrap();

        // then
        assert!(!pending_during_prompt);
        assert!(in_flight_during_prompt);
        assert!(matches!(second, Err(Error::PurchaseInFlight)));
        assert!(purchaser.is_pending());
        assert_eq!(first.purchase().account, ALICE);
        assert_eq!(wallet.calls("eth_sendTransaction"), 1);
    }

    #[tokio::test]
    async fn with_flags__new_purchaser_sees_purchase_outstanding_on_old_one() {
        // given
        let wallet = healthy_wallet();
        let old = purchaser_for(&wallet);
        let outstanding = old.buy_ticket().await.unwrap();

        // when
        let rebuilt = TicketPurchaser::with_flags(
            LotteryContract::new(Connection::new(wallet.clone())),
            Duration::from_millis(1),
            old.flags().clone(),
        );
        let second = rebuilt.buy_ticket().await;
        let pending_before_receipt = rebuilt.is_pending();
        outstanding.confirmation().await;

        // then
        assert!(pending_before_receipt);
        assert!(matches!(second, Err(Error::PurchaseInFlight)));
        assert_eq!(wallet.calls("eth_sendTransaction"), 1);
        assert!(!rebuilt.is_pending());
    }

    #[tokio::test]
    async fn buy_ticket__node_rejection_is_submission_failure() {
        // given
        let wallet = healthy_wallet();
        wallet.fail(
            "eth_sendTransaction",
            TransportError::rpc(-32000, "insufficient funds"),
        );
        let purchaser = purchaser_for(&wallet);

        // when
        let result = purchaser.buy_ticket().await;

        // then
        assert!(matches!(result, Err(Error::Submission(_))));
        assert!(!purchaser.is_pending());
    }

    #[tokio::test]
    async fn buy_ticket__requests_authorization_once_then_retries_signer() {
        // given
        let wallet = healthy_wallet();
        wallet.respond_once("eth_accounts", Ok(json!([])));
        wallet.respond("eth_requestAccounts", json!([ALICE.to_string()]));
        let purchaser = purchaser_for(&wallet);

        // when
        let pending = purchaser.buy_ticket().await.unwrap();

        // then
        assert_eq!(pending.purchase().account, ALICE);
        assert_eq!(wallet.calls("eth_requestAccounts"), 1);
        assert_eq!(wallet.calls("eth_accounts"), 2);
    }

    #[tokio::test]
    async fn buy_ticket__denied_authorization_submits_nothing() {
        // given
        let wallet = healthy_wallet();
        wallet.respond("eth_accounts", json!([]));
        wallet.fail(
            "eth_requestAccounts",
            TransportError::rpc(USER_REJECTED_REQUEST, "User rejected the request"),
        );
        let purchaser = purchaser_for(&wallet);

        // when
        let result = purchaser.buy_ticket().await;

        // then
        assert!(matches!(result, Err(Error::AuthorizationDenied(_))));
        assert!(!purchaser.is_pending());
        assert_eq!(wallet.calls("eth_sendTransaction"), 0);
    }
}
