use crate::{
    http_wallet::HttpWallet,
    session::SessionSettings,
    transport::TransportError,
};
use clap::Parser;
use reqwest::Url;
use std::{
    path::PathBuf,
    time::Duration,
};

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 4_000;
pub const DEFAULT_LOG_DIR: &str = ".logs";

#[derive(Parser, Debug, Clone)]
#[command(version, about = "Terminal front-end for the xLottery contract", long_about = None)]
pub struct Cli {
    /// JSON-RPC endpoint of the wallet to play with. Without one no wallet is detected.
    #[arg(long, env = "XLOTTERY_WALLET_URL")]
    pub wallet_url: Option<Url>,

    /// How often to poll for entries, receipts and wallet changes.
    #[arg(
        long,
        default_value_t = DEFAULT_POLL_INTERVAL_MS,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub poll_interval_ms: u64,

    #[arg(long, default_value = DEFAULT_LOG_DIR)]
    pub log_dir: PathBuf,
}

impl Cli {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings::uniform(self.poll_interval())
    }

    /// The wallet injected into this process, if any.
    pub fn injected_wallet(&self) -> Result<Option<HttpWallet>, TransportError> {
        self.wallet_url.clone().map(HttpWallet::new).transpose()
    }
}
