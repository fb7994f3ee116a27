#![allow(non_snake_case)]
use alloy_primitives::Address;
use serde_json::json;
use std::time::Duration;
use xlottery::{
    Connection,
    Error,
    PurchaseFlags,
    PurchaseStatus,
    Session,
    SessionSettings,
    WalletAvailability,
    detect,
    provider::ChainCheck,
    test_helpers::{
        ALICE,
        FakeWallet,
        healthy_wallet,
    },
    transport::TransportError,
    wallet_events::{
        WalletChange,
        WalletWatcher,
    },
};

fn fast() -> SessionSettings {
    SessionSettings::uniform(Duration::from_millis(2))
}

#[tokio::test]
async fn detect__without_injected_wallet_makes_no_requests() {
    // given
    let wallet = FakeWallet::new();

    // when
    let missing = detect::<FakeWallet>(None);
    let present = detect(Some(wallet.clone()));

    // then
    assert!(matches!(missing, WalletAvailability::Unavailable));
    assert!(present.is_available());
    assert_eq!(wallet.total_requests(), 0);
}

#[tokio::test]
async fn start__on_wrong_chain_requests_one_switch_and_still_reads_round() {
    // given
    let wallet = healthy_wallet();
    wallet.respond("eth_chainId", json!("0x1"));
    wallet.respond("wallet_switchEthereumChain", json!(null));

    // when
    let session = Session::start(Connection::new(wallet.clone()), fast()).await;
    tokio::task::yield_now().await;

    // then
    assert_eq!(
        session.chain_check(),
        Some(ChainCheck::SwitchRequested { detected: 1 })
    );
    assert_eq!(wallet.calls("wallet_switchEthereumChain"), 1);
    let round = session.round();
    assert_eq!(round.balance, "0.01");
    assert_eq!(round.player_count, 1);
    assert!(session.is_listening());
}

#[tokio::test]
async fn start__unreadable_network_does_not_block_round_reads() {
    // given
    let wallet = healthy_wallet();
    wallet.fail("eth_chainId", TransportError::Transport("node down".into()));

    // when
    let session = Session::start(Connection::new(wallet.clone()), fast()).await;

    // then
    assert_eq!(session.chain_check(), None);
    assert_eq!(wallet.calls("wallet_switchEthereumChain"), 0);
    assert_eq!(session.round().balance, "0.01");
}

#[tokio::test]
async fn rebuilding_session_after_chain_change_stops_old_listener() {
    // given
    let wallet = healthy_wallet();
    wallet.respond("wallet_switchEthereumChain", json!(null));
    let connection = Connection::new(wallet.clone());
    let mut watcher = WalletWatcher::spawn(connection.clone(), Duration::from_millis(2));
    let session = Session::start(connection.clone(), fast()).await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    wallet.respond("eth_chainId", json!("0x1"));

    // when
    let change = tokio::time::timeout(Duration::from_secs(1), watcher.next_change())
        .await
        .unwrap();
    drop(watcher);
    drop(session);
    tokio::task::yield_now().await;
    let polls_between_sessions = wallet.calls("eth_blockNumber");
    tokio::time::sleep(Duration::from_millis(10)).await;
    let old_listener_stopped = wallet.calls("eth_blockNumber") == polls_between_sessions;
    let session = Session::start(connection, fast()).await;

    // then
    assert_eq!(change, Some(WalletChange::ChainChanged(1)));
    assert!(old_listener_stopped);
    assert!(session.is_listening());
    assert_eq!(
        session.chain_check(),
        Some(ChainCheck::SwitchRequested { detected: 1 })
    );
}

#[tokio::test]
async fn wallet_watcher__reports_account_switch() {
    // given
    let wallet = healthy_wallet();
    let mut watcher = WalletWatcher::spawn(Connection::new(wallet.clone()), Duration::from_millis(2));
    tokio::time::sleep(Duration::from_millis(10)).await;
    let bob = Address::repeat_byte(0xb0);

    // when
    wallet.respond("eth_accounts", json!([bob.to_string()]));
    let change = tokio::time::timeout(Duration::from_secs(1), watcher.next_change())
        .await
        .unwrap();

    // then
    assert_eq!(change, Some(WalletChange::AccountsChanged(vec![bob])));
}

#[tokio::test]
async fn start_with_flags__purchase_survives_rebuild_after_first_authorization() {
    // given
    let wallet = healthy_wallet();
    wallet.respond("eth_accounts", json!([]));
    wallet.respond("eth_requestAccounts", json!([ALICE.to_string()]));
    let connection = Connection::new(wallet.clone());
    let flags = PurchaseFlags::default();
    let mut watcher = WalletWatcher::spawn(connection.clone(), Duration::from_millis(2));
    let session = Session::start_with_flags(connection.clone(), fast(), flags.clone()).await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    // when
    wallet.respond("eth_accounts", json!([ALICE.to_string()]));
    wallet.respond_once("eth_accounts", Ok(json!([])));
    let outstanding = session.purchaser().buy_ticket().await.unwrap();
    let change = tokio::time::timeout(Duration::from_secs(1), watcher.next_change())
        .await
        .unwrap();
    drop(session);
    let session = Session::start_with_flags(connection, fast(), flags).await;
    let pending_after_rebuild = session.purchaser().is_pending();
    let second = session.purchaser().buy_ticket().await;
    let settled = outstanding.confirmation().await;

    // then
    assert_eq!(change, Some(WalletChange::AccountsChanged(vec![ALICE])));
    assert!(pending_after_rebuild);
    assert!(matches!(second, Err(Error::PurchaseInFlight)));
    assert_eq!(wallet.calls("eth_requestAccounts"), 1);
    assert_eq!(wallet.calls("eth_sendTransaction"), 1);
    assert_eq!(settled.status, PurchaseStatus::Confirmed);
    assert!(!session.purchaser().is_pending());
}
