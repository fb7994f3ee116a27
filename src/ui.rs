use crate::client::{
    AppSnapshot,
    WalletState,
};
use color_eyre::eyre::{
    Result,
    eyre,
};
use crossterm::{
    event::{
        self,
        Event,
        KeyCode,
        KeyEventKind,
    },
    terminal::{
        disable_raw_mode,
        enable_raw_mode,
    },
};
use ratatui::{
    prelude::*,
    widgets::*,
};
use std::io::stdout;
use tokio::sync::mpsc;
use xlottery::{
    Notification,
    provider::ChainCheck,
};

pub enum UserEvent {
    Quit,
    BuyTicket,
    Redraw,
}

pub type InputEventReceiver = mpsc::UnboundedReceiver<std::io::Result<Event>>;

#[derive(Default)]
pub struct UiState {
    confirm_quit: bool,
    terminal: Option<Terminal<CrosstermBackend<std::io::Stdout>>>,
}

pub fn terminal_enter(state: &mut UiState) -> Result<()> {
    enable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::EnterAlternateScreen)?;
    // Single persistent Terminal so buffers survive across draws
    let backend = CrosstermBackend::new(stdout());
    let terminal = Terminal::new(backend)?;
    state.terminal = Some(terminal);
    Ok(())
}

pub fn terminal_exit() -> Result<()> {
    disable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::LeaveAlternateScreen)?;
    Ok(())
}

/// Blocking terminal reads on their own thread, forwarded to the async loop.
pub fn input_event_stream() -> InputEventReceiver {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        loop {
            let ev = event::read();
            let failed = ev.is_err();
            if tx.send(ev).is_err() || failed {
                break;
            }
        }
    });
    rx
}

pub async fn next_raw_event(events: &mut InputEventReceiver) -> Result<Event> {
    match events.recv().await {
        Some(ev) => Ok(ev?),
        None => Err(eyre!("terminal input stream closed")),
    }
}

pub fn interpret_event(state: &mut UiState, event: Event) -> Option<UserEvent> {
    let k = match event {
        Event::Key(k) => k,
        Event::Resize(..) => return Some(UserEvent::Redraw),
        _ => return None,
    };
    if k.kind != KeyEventKind::Press {
        return None;
    }
    if state.confirm_quit {
        state.confirm_quit = false;
        return Some(match k.code {
            KeyCode::Char('y') | KeyCode::Enter => UserEvent::Quit,
            _ => UserEvent::Redraw,
        });
    }
    match k.code {
        KeyCode::Char('q') | KeyCode::Esc => {
            state.confirm_quit = true;
            Some(UserEvent::Redraw)
        }
        KeyCode::Char('b') | KeyCode::Enter => Some(UserEvent::BuyTicket),
        _ => None,
    }
}

pub fn draw(state: &mut UiState, snap: &AppSnapshot) -> Result<()> {
    let confirm_quit = state.confirm_quit;
    if let Some(term) = state.terminal.as_mut() {
        term.draw(|f| render(f, snap, confirm_quit))?;
    }
    Ok(())
}

fn render(f: &mut Frame, snap: &AppSnapshot, confirm_quit: bool) {
    f.render_widget(Clear, f.area());
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // title
            Constraint::Length(5), // round
            Constraint::Length(3), // buy button
            Constraint::Min(4),    // status/errors
            Constraint::Length(3), // help
        ])
        .split(f.area());

    let title = Paragraph::new("Welcome to xLottery !")
        .alignment(Alignment::Center)
        .style(Style::default().add_modifier(Modifier::BOLD))
        .block(Block::default().borders(Borders::ALL).title(network_title(snap)));
    f.render_widget(title, chunks[0]);

    match snap.wallet {
        WalletState::Unavailable => draw_install_prompt(f, chunks[1]),
        WalletState::Connected { .. } => {
            draw_round_panel(f, chunks[1], snap);
            draw_buy_button(f, chunks[2], snap);
        }
    }
    draw_status(f, chunks[3], snap);

    let help = Paragraph::new("b/Enter buy ticket | q/Esc quit")
        .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(help, chunks[4]);

    if confirm_quit {
        draw_quit_modal(f);
    }
}

fn network_title(snap: &AppSnapshot) -> String {
    match &snap.wallet {
        WalletState::Unavailable => String::from("No wallet"),
        WalletState::Connected { chain: None } => String::from("Wallet connected"),
        WalletState::Connected {
            chain: Some(ChainCheck::Supported),
        } => String::from("Wallet connected | Sepolia"),
        WalletState::Connected {
            chain: Some(ChainCheck::SwitchRequested { detected }),
        } => format!("Wallet on unsupported chain {detected}"),
    }
}

fn draw_install_prompt(f: &mut Frame, area: Rect) {
    let widget = Paragraph::new(crate::client::INSTALL_PROMPT)
        .wrap(Wrap { trim: true })
        .style(Style::default().fg(Color::Yellow))
        .block(Block::default().borders(Borders::ALL).title("Install a wallet"));
    f.render_widget(widget, area);
}

fn draw_round_panel(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let winner = snap
        .round
        .recent_winner
        .map(|w| w.to_string())
        .unwrap_or_default();
    let label = Style::default().fg(Color::Gray);
    let lines = vec![
        Line::from(vec![
            Span::styled("Recent winner : ", label),
            Span::raw(winner),
        ]),
        Line::from(vec![
            Span::styled("Lottery balance : ", label),
            Span::raw(format!("{} ETH", snap.round.balance)),
        ]),
        Line::from(vec![
            Span::styled("Number of players for this round : ", label),
            Span::raw(snap.round.player_count.to_string()),
        ]),
    ];
    let widget =
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Round"));
    f.render_widget(widget, area);
}

fn draw_buy_button(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let (text, style) = if snap.pending {
        (
            "Waiting for the validation of the transaction ...",
            Style::default().fg(Color::DarkGray),
        )
    } else {
        (
            "Buy ticket",
            Style::default().fg(Color::Black).bg(Color::Cyan),
        )
    };
    let widget = Paragraph::new(text)
        .alignment(Alignment::Center)
        .style(style)
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(widget, area);
}

fn notification_style(notification: Notification) -> Style {
    match notification {
        Notification::Loading => Style::default().fg(Color::Yellow),
        Notification::Success => Style::default().fg(Color::Green),
        Notification::Failure => Style::default().fg(Color::Red),
    }
}

fn draw_status(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let mut lines: Vec<Line> = Vec::new();
    if let Some(notification) = snap.notification {
        lines.push(Line::styled(
            notification.message(),
            notification_style(notification),
        ));
    }
    if snap.status.trim().is_empty() {
        lines.push(Line::from("Ready"));
    } else {
        lines.push(Line::from(snap.status.clone()));
    }
    for e in &snap.errors {
        lines.push(Line::styled(e.clone(), Style::default().fg(Color::Red)));
    }
    let widget = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title("Status"));
    f.render_widget(widget, area);
}

fn draw_quit_modal(f: &mut Frame) {
    let area = centered_rect(40, 20, f.area());
    f.render_widget(Clear, area);
    let widget = Paragraph::new("Quit xLottery? (y/Enter to quit, any key to stay)")
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title("Quit"));
    f.render_widget(widget, area);
}

fn centered_rect(w_percent: u16, h_percent: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - h_percent) / 2),
            Constraint::Percentage(h_percent),
            Constraint::Percentage((100 - h_percent) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - w_percent) / 2),
            Constraint::Percentage(w_percent),
            Constraint::Percentage((100 - w_percent) / 2),
        ])
        .split(popup_layout[1])[1]
}
