use crate::ui;
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use std::{
    future,
    path::Path,
    sync::Arc,
};
use tokio::sync::{
    mpsc,
    watch,
};
use tracing::{
    error,
    info,
    warn,
};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling,
};
use tracing_subscriber::{
    EnvFilter,
    fmt,
};
use xlottery::{
    Connection,
    Error,
    Notification,
    PurchaseFlags,
    PurchaseStatus,
    RoundSnapshot,
    Session,
    SessionSettings,
    TicketPurchase,
    WalletAvailability,
    config::Cli,
    http_wallet::HttpWallet,
    provider::ChainCheck,
    wallet_events::{
        WalletChange,
        WalletWatcher,
    },
};

const MAX_ERRORS: usize = 5;

pub const INSTALL_PROMPT: &str = "No wallet detected. Install a wallet (set XLOTTERY_WALLET_URL or pass --wallet-url) and restart.";

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum WalletState {
    Unavailable,
    Connected { chain: Option<ChainCheck> },
}

#[derive(Clone, Debug)]
pub struct AppSnapshot {
    pub wallet: WalletState,
    pub round: RoundSnapshot,
    pub pending: bool,
    pub status: String,
    pub notification: Option<Notification>,
    pub errors: Vec<String>,
}

#[derive(Debug)]
pub enum PurchaseUpdate {
    Submitted(TicketPurchase),
    Settled(TicketPurchase),
    Failed(Error),
}

pub struct AppController {
    session: Option<Session<HttpWallet>>,
    settings: SessionSettings,
    status: String,
    notification: Option<Notification>,
    errors: Vec<String>,
    /// Shared with every session's purchaser; survives reconnects.
    purchases: PurchaseFlags,
    purchase_requested: bool,
    purchase_tx: mpsc::UnboundedSender<PurchaseUpdate>,
}

impl AppController {
    pub async fn new(
        availability: WalletAvailability<HttpWallet>,
        settings: SessionSettings,
        purchase_tx: mpsc::UnboundedSender<PurchaseUpdate>,
    ) -> Self {
        let purchases = PurchaseFlags::default();
        let session = match availability {
            WalletAvailability::Available(connection) => {
                Some(Session::start_with_flags(connection, settings, purchases.clone()).await)
            }
            WalletAvailability::Unavailable => None,
        };
        let status = match &session {
            Some(session) => match session.chain_check() {
                Some(ChainCheck::SwitchRequested { detected }) => format!(
                    "Wallet is on chain {detected}; asked it to switch networks"
                ),
                _ => String::from("Ready"),
            },
            None => String::from(INSTALL_PROMPT),
        };
        Self {
            session,
            settings,
            status,
            notification: None,
            errors: Vec::new(),
            purchases,
            purchase_requested: false,
            purchase_tx,
        }
    }

    fn watch_round(&self) -> Option<watch::Receiver<RoundSnapshot>> {
        self.session.as_ref().map(Session::watch_round)
    }

    fn pending(&self) -> bool {
        self.purchases.is_pending()
    }

    /// A purchase was requested and has not settled or failed yet.
    fn busy(&self) -> bool {
        self.purchase_requested || self.purchases.is_in_flight()
    }

    pub fn build_snapshot(&self) -> AppSnapshot {
        let (wallet, round) = match &self.session {
            Some(session) => (
                WalletState::Connected {
                    chain: session.chain_check(),
                },
                session.round(),
            ),
            None => (WalletState::Unavailable, RoundSnapshot::default()),
        };
        AppSnapshot {
            wallet,
            round,
            pending: self.pending(),
            status: self.status.clone(),
            notification: self.notification,
            errors: self.errors.clone(),
        }
    }

    fn set_status(&mut self, message: impl Into<String>) {
        self.status = message.into();
    }

    fn push_error(&mut self, message: String) {
        error!("{}", message);
        self.errors.push(message);
        if self.errors.len() > MAX_ERRORS {
            let excess = self.errors.len() - MAX_ERRORS;
            self.errors.drain(..excess);
        }
    }

    pub fn start_purchase(&mut self) {
        let Some(session) = &self.session else {
            self.set_status(INSTALL_PROMPT);
            return;
        };
        if self.busy() {
            self.set_status("A ticket purchase is already waiting for confirmation");
            return;
        }
        let purchaser = session.purchaser().clone();
        let tx = self.purchase_tx.clone();
        tokio::spawn(async move {
            let update = match purchaser.buy_ticket().await {
                Ok(pending) => {
                    let _ = tx.send(PurchaseUpdate::Submitted(pending.purchase().clone()));
                    PurchaseUpdate::Settled(pending.confirmation().await)
                }
                Err(err) => PurchaseUpdate::Failed(err),
            };
            let _ = tx.send(update);
        });
        self.purchase_requested = true;
        self.errors.clear();
        self.notification = None;
        self.set_status("Waiting for the wallet to sign the ticket purchase...");
    }

    pub fn apply_purchase_update(&mut self, update: PurchaseUpdate) {
        self.purchase_requested = false;
        match update {
            PurchaseUpdate::Submitted(purchase) => {
                self.notification = Some(purchase.status.notification());
                self.set_status(format!(
                    "Ticket purchase {} submitted",
                    purchase.transaction_hash
                ));
            }
            PurchaseUpdate::Settled(purchase) => {
                let notification = purchase.status.notification();
                self.notification = Some(notification);
                self.set_status(notification.message());
                if purchase.status == PurchaseStatus::Reverted {
                    self.push_error(format!(
                        "Ticket purchase {} reverted",
                        purchase.transaction_hash
                    ));
                }
            }
            PurchaseUpdate::Failed(Error::PurchaseInFlight) => {
                self.set_status("A ticket purchase is already waiting for confirmation");
            }
            PurchaseUpdate::Failed(err) => {
                self.notification = None;
                if err.is_recoverable() {
                    self.set_status("Ticket purchase cancelled; you can try again");
                } else {
                    self.set_status("Ticket purchase failed");
                }
                self.push_error(format!("Ticket purchase failed: {err}"));
            }
        }
    }

    /// Replaces the session after the wallet switched network or account.
    async fn reconnect(&mut self, change: WalletChange) {
        let Some(old) = self.session.take() else {
            return;
        };
        info!(?change, "wallet changed; rebuilding session");
        let connection = Connection::from_shared(Arc::clone(old.connection().transport()));
        drop(old);
        if !self.busy() {
            self.notification = None;
        }
        let session =
            Session::start_with_flags(connection, self.settings, self.purchases.clone()).await;
        self.status = match session.chain_check() {
            Some(ChainCheck::SwitchRequested { detected }) => {
                format!("Wallet moved to chain {detected}; asked it to switch back")
            }
            _ => String::from("Wallet changed; round reloaded"),
        };
        self.session = Some(session);
    }
}

pub fn init_tracing(log_dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)
        .wrap_err_with(|| format!("failed to create log directory {}", log_dir.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(rolling::daily(log_dir, "xlottery.log"));
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init();
    Ok(guard)
}

pub async fn run_app(cli: Cli) -> Result<()> {
    let injected = cli
        .injected_wallet()
        .wrap_err("failed to set up the wallet transport")?;
    if let Some(wallet) = &injected {
        tracing::info!(url = %wallet.url(), "wallet endpoint configured");
    }
    let availability = xlottery::detect(injected);
    let watcher = match &availability {
        WalletAvailability::Available(connection) => {
            Some(WalletWatcher::spawn(connection.clone(), cli.poll_interval()))
        }
        WalletAvailability::Unavailable => None,
    };
    let (purchase_tx, purchase_rx) = mpsc::unbounded_channel();
    let controller =
        AppController::new(availability, cli.session_settings(), purchase_tx).await;

    let mut ui_state = ui::UiState::default();
    let mut input_events = ui::input_event_stream();
    tracing::info!("Starting UI");
    ui::terminal_enter(&mut ui_state)?;
    let res = run_loop(
        controller,
        watcher,
        purchase_rx,
        &mut ui_state,
        &mut input_events,
    )
    .await;
    ui::terminal_exit()?;
    res
}

async fn round_changed(round: &mut Option<watch::Receiver<RoundSnapshot>>) {
    match round {
        Some(rx) => {
            if rx.changed().await.is_err() {
                future::pending::<()>().await;
            }
        }
        None => future::pending::<()>().await,
    }
}

async fn wallet_changed(watcher: &mut Option<WalletWatcher>) -> Option<WalletChange> {
    match watcher {
        Some(watcher) => watcher.next_change().await,
        None => future::pending().await,
    }
}

async fn run_loop(
    mut controller: AppController,
    mut watcher: Option<WalletWatcher>,
    mut purchase_rx: mpsc::UnboundedReceiver<PurchaseUpdate>,
    ui_state: &mut ui::UiState,
    input_events: &mut ui::InputEventReceiver,
) -> Result<()> {
    tracing::info!("Running app loop");
    let mut round = controller.watch_round();
    ui::draw(ui_state, &controller.build_snapshot()).wrap_err("initial draw failed")?;

    loop {
        tokio::select! {
            _ = round_changed(&mut round) => {
                ui::draw(ui_state, &controller.build_snapshot())
                    .wrap_err("draw after round refresh failed")?;
            }
            update = purchase_rx.recv() => {
                let Some(update) = update else {
                    return Err(eyre!("purchase channel closed"));
                };
                controller.apply_purchase_update(update);
                ui::draw(ui_state, &controller.build_snapshot())
                    .wrap_err("draw after purchase update failed")?;
            }
            change = wallet_changed(&mut watcher) => {
                match change {
                    Some(change) => {
                        controller.reconnect(change).await;
                        round = controller.watch_round();
                    }
                    None => {
                        warn!("wallet watcher channel closed");
                        watcher = None;
                    }
                }
                ui::draw(ui_state, &controller.build_snapshot())
                    .wrap_err("draw after wallet change failed")?;
            }
            _ = tokio::signal::ctrl_c() => {
                break;
            }
            raw_ev = ui::next_raw_event(input_events) => {
                let event = raw_ev?;
                let Some(ev) = ui::interpret_event(ui_state, event) else {
                    continue;
                };
                match ev {
                    ui::UserEvent::Quit => break,
                    ui::UserEvent::BuyTicket => controller.start_purchase(),
                    ui::UserEvent::Redraw => {}
                }
                ui::draw(ui_state, &controller.build_snapshot())
                    .wrap_err("draw after input failed")?;
            }
        }
    }
    Ok(())
}
