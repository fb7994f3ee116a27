//! Client library for the xLottery contract: wallet connection, round reads,
//! and ticket purchases.

pub mod config;
pub mod constants;
pub mod contract;
pub mod error;
pub mod http_wallet;
pub mod provider;
pub mod purchase;
pub mod reader;
pub mod session;
pub mod transport;
pub mod wallet_events;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use error::{
    Error,
    Result,
};
pub use provider::{
    Connection,
    WalletAvailability,
    detect,
};
pub use purchase::{
    Notification,
    PurchaseFlags,
    PurchaseStatus,
    TicketPurchase,
    TicketPurchaser,
};
pub use reader::{
    ContractReader,
    RoundSnapshot,
};
pub use session::{
    Session,
    SessionSettings,
};
