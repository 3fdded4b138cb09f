use color_eyre::eyre::Result;
use crossterm::{
    event::{
        self,
        Event,
        KeyCode,
        KeyEvent,
        KeyEventKind,
    },
    terminal::{
        disable_raw_mode,
        enable_raw_mode,
    },
};
use itertools::Itertools;
use nft_arena::{
    actions::Action,
    character::{
        Character,
        CharacterId,
    },
    state::{
        AppState,
        Connectivity,
    },
};
use ratatui::{
    prelude::*,
    widgets::*,
};
use std::io::stdout;
use tokio::sync::mpsc;
use unicode_width::UnicodeWidthStr;

pub type InputEventReceiver = mpsc::UnboundedReceiver<std::io::Result<Event>>;

const MAX_ACCOUNT_WIDTH: usize = 24;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UserEvent {
    Quit,
    Redraw,
    Dispatch(Action),
    SelectOwn(CharacterId),
    CycleCreationType,
    DismissNotification,
    Reconnect,
    OpenAccountPicker,
    SwitchAccount(String),
    UnlockAccount { name: String, password: String },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum Focus {
    #[default]
    Mine,
    Opponents,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
enum Mode {
    #[default]
    Normal,
    QuitModal,
    AccountPicker(AccountPickerState),
    PasswordPrompt(PasswordState),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct AccountPickerState {
    choices: Vec<(String, bool)>,
    idx: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct PasswordState {
    name: String,
    input: String,
}

#[derive(Default)]
pub struct UiState {
    mode: Mode,
    focus: Focus,
    mine_idx: usize,
    others_idx: usize,
    terminal: Option<Terminal<CrosstermBackend<std::io::Stdout>>>,
}

impl UiState {
    pub fn open_account_picker(&mut self, choices: Vec<(String, bool)>, active: Option<&str>) {
        let idx = active
            .and_then(|name| choices.iter().position(|(n, _)| n == name))
            .unwrap_or(0);
        self.mode = Mode::AccountPicker(AccountPickerState { choices, idx });
    }

    fn clamp(&mut self, app: &AppState) {
        self.mine_idx = self
            .mine_idx
            .min(app.characters.mine.len().saturating_sub(1));
        self.others_idx = self
            .others_idx
            .min(app.characters.others.len().saturating_sub(1));
    }

    fn focused_mine<'a>(&self, app: &'a AppState) -> Option<&'a Character> {
        app.characters.mine.get(self.mine_idx)
    }

    fn focused_opponent<'a>(&self, app: &'a AppState) -> Option<&'a Character> {
        app.characters.others.get(self.others_idx)
    }
}

pub fn terminal_enter(state: &mut UiState) -> Result<()> {
    enable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout());
    state.terminal = Some(Terminal::new(backend)?);
    Ok(())
}

pub fn terminal_exit() -> Result<()> {
    disable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::LeaveAlternateScreen)?;
    Ok(())
}

/// Reads terminal events on a dedicated thread, since crossterm's reader
/// blocks.
pub fn input_event_stream() -> InputEventReceiver {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        loop {
            let event = event::read();
            let failed = event.is_err();
            if tx.send(event).is_err() || failed {
                break;
            }
        }
    });
    rx
}

pub async fn next_raw_event(input_events: &mut InputEventReceiver) -> Result<Event> {
    match input_events.recv().await {
        Some(event) => Ok(event?),
        None => Err(color_eyre::eyre::eyre!("terminal input closed")),
    }
}

pub fn interpret_event(state: &mut UiState, app: &AppState, event: Event) -> Option<UserEvent> {
    match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => interpret_key(state, app, key),
        Event::Resize(..) => Some(UserEvent::Redraw),
        _ => None,
    }
}

fn interpret_key(state: &mut UiState, app: &AppState, key: KeyEvent) -> Option<UserEvent> {
    state.clamp(app);
    match &mut state.mode {
        Mode::QuitModal => {
            return match key.code {
                KeyCode::Char('y') | KeyCode::Char('Y') => Some(UserEvent::Quit),
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                    state.mode = Mode::Normal;
                    Some(UserEvent::Redraw)
                }
                _ => None,
            };
        }
        Mode::AccountPicker(picker) => {
            return match key.code {
                KeyCode::Esc => {
                    state.mode = Mode::Normal;
                    Some(UserEvent::Redraw)
                }
                KeyCode::Up | KeyCode::Char('k') => {
                    picker.idx = picker.idx.saturating_sub(1);
                    Some(UserEvent::Redraw)
                }
                KeyCode::Down | KeyCode::Char('j') => {
                    if picker.idx + 1 < picker.choices.len() {
                        picker.idx += 1;
                    }
                    Some(UserEvent::Redraw)
                }
                KeyCode::Enter => {
                    let (name, unlocked) = picker.choices.get(picker.idx)?.clone();
                    if unlocked {
                        state.mode = Mode::Normal;
                        Some(UserEvent::SwitchAccount(name))
                    } else {
                        state.mode = Mode::PasswordPrompt(PasswordState {
                            name,
                            input: String::new(),
                        });
                        Some(UserEvent::Redraw)
                    }
                }
                _ => None,
            };
        }
        Mode::PasswordPrompt(prompt) => {
            return match key.code {
                KeyCode::Esc => {
                    state.mode = Mode::Normal;
                    Some(UserEvent::Redraw)
                }
                KeyCode::Enter => {
                    let PasswordState { name, input } = std::mem::take(prompt);
                    state.mode = Mode::Normal;
                    Some(UserEvent::UnlockAccount {
                        name,
                        password: input,
                    })
                }
                KeyCode::Backspace => {
                    prompt.input.pop();
                    Some(UserEvent::Redraw)
                }
                KeyCode::Char(c) => {
                    prompt.input.push(c);
                    Some(UserEvent::Redraw)
                }
                _ => None,
            };
        }
        Mode::Normal => {}
    }

    if app.notification.is_visible() {
        return match key.code {
            KeyCode::Enter | KeyCode::Esc => Some(UserEvent::DismissNotification),
            KeyCode::Char('q') => {
                state.mode = Mode::QuitModal;
                Some(UserEvent::Redraw)
            }
            _ => None,
        };
    }

    match key.code {
        KeyCode::Char('q') => {
            state.mode = Mode::QuitModal;
            Some(UserEvent::Redraw)
        }
        KeyCode::Tab => {
            state.focus = match state.focus {
                Focus::Mine => Focus::Opponents,
                Focus::Opponents => Focus::Mine,
            };
            Some(UserEvent::Redraw)
        }
        KeyCode::Up | KeyCode::Char('k') => {
            match state.focus {
                Focus::Mine => state.mine_idx = state.mine_idx.saturating_sub(1),
                Focus::Opponents => state.others_idx = state.others_idx.saturating_sub(1),
            }
            Some(UserEvent::Redraw)
        }
        KeyCode::Down | KeyCode::Char('j') => {
            match state.focus {
                Focus::Mine => state.mine_idx += 1,
                Focus::Opponents => state.others_idx += 1,
            }
            state.clamp(app);
            Some(UserEvent::Redraw)
        }
        KeyCode::Char('t') => Some(UserEvent::CycleCreationType),
        KeyCode::Char('c') => Some(UserEvent::Dispatch(Action::Create(app.creation_type))),
        KeyCode::Char('h') => state
            .focused_mine(app)
            .map(|c| UserEvent::Dispatch(Action::Heal(c.id))),
        KeyCode::Char('s') => state.focused_mine(app).map(|c| UserEvent::SelectOwn(c.id)),
        KeyCode::Char('f') | KeyCode::Char('m') => {
            let rival = state.focused_opponent(app)?;
            let my_token_id = app.selection?.id;
            let rival_token_id = rival.id;
            let action = if key.code == KeyCode::Char('f') {
                Action::Fight {
                    my_token_id,
                    rival_token_id,
                }
            } else {
                Action::Spell {
                    my_token_id,
                    rival_token_id,
                }
            };
            Some(UserEvent::Dispatch(action))
        }
        KeyCode::Char('w') if app.withdraw_available() => {
            Some(UserEvent::Dispatch(Action::Withdraw))
        }
        KeyCode::Char('a') => Some(UserEvent::OpenAccountPicker),
        KeyCode::Char('r') => Some(UserEvent::Reconnect),
        _ => None,
    }
}

pub fn draw(state: &mut UiState, app: &AppState) -> Result<()> {
    state.clamp(app);
    if let Some(mut term) = state.terminal.take() {
        let res = term.draw(|f| ui(f, state, app)).map(|_| ());
        state.terminal = Some(term);
        res?;
    }
    Ok(())
}

fn ui(f: &mut Frame, state: &UiState, app: &AppState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(6),
            Constraint::Length(3),
            Constraint::Length(3),
        ])
        .split(f.area());

    draw_header(f, chunks[0], app);
    draw_lists(f, chunks[1], state, app);
    draw_creation(f, chunks[2], app);
    draw_help(f, chunks[3], state, app);
    draw_modals(f, state, app);
}

fn truncate(s: &str, width: usize) -> String {
    if s.width() <= width {
        return s.to_string();
    }
    let mut out = String::new();
    for c in s.chars() {
        if out.width() + 1 >= width {
            break;
        }
        out.push(c);
    }
    out.push('…');
    out
}

fn draw_header(f: &mut Frame, area: Rect, app: &AppState) {
    let mut spans = match &app.connectivity {
        Connectivity::Connecting => vec![Span::styled(
            "Connecting...",
            Style::default().fg(Color::Yellow),
        )],
        Connectivity::Failed(reason) => vec![Span::styled(
            format!("Disconnected: {reason}"),
            Style::default().fg(Color::Red),
        )],
        Connectivity::Connected(session) => {
            let mut spans = vec![
                Span::raw(format!(
                    "{} ({})",
                    truncate(&session.account_name, MAX_ACCOUNT_WIDTH),
                    session.account.short()
                )),
                Span::raw("  |  "),
                Span::styled(
                    session.network.to_string(),
                    Style::default().fg(Color::Cyan),
                ),
            ];
            if session.is_owner {
                spans.push(Span::raw("  "));
                spans.push(Span::styled(
                    "[OWNER]",
                    Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD),
                ));
            }
            spans
        }
    };
    if app.pending {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(
            "⏳ pending",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ));
    }
    let p = Paragraph::new(Line::from(spans))
        .block(Block::default().borders(Borders::ALL).title("NFT Arena"));
    f.render_widget(p, area);
}

fn character_line(c: &Character, selected: bool) -> Line<'static> {
    let marker = if selected { "⚔ " } else { "  " };
    let hp_style = if c.can_be_healed() {
        Style::default().fg(Color::Red)
    } else {
        Style::default().fg(Color::Green)
    };
    Line::from(vec![
        Span::raw(format!("{marker}#{:<4} {:<10} ", c.id, c.character_type.label())),
        Span::styled(format!("hp {:>3} ", c.hp), hp_style),
        Span::raw(format!(
            "mana {:>3}  xp {:>3}  atk {:>3}  arm {:>3}  m.atk {:>3}  m.res {:>3}",
            c.mana, c.xp, c.attack, c.armor, c.magic_attack, c.magic_resistance
        )),
    ])
}

fn draw_lists(f: &mut Frame, area: Rect, state: &UiState, app: &AppState) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);

    let selected_id = app.selection.map(|s| s.id);
    let mine: Vec<ListItem> = app
        .characters
        .mine
        .iter()
        .map(|c| ListItem::new(character_line(c, Some(c.id) == selected_id)))
        .collect();
    let others: Vec<ListItem> = app
        .characters
        .others
        .iter()
        .map(|c| ListItem::new(character_line(c, false)))
        .collect();

    let focused_style = Style::default().fg(Color::Yellow);
    let block_for = |title: &'static str, focused: bool| {
        let block = Block::default().borders(Borders::ALL).title(title);
        if focused {
            block.border_style(focused_style)
        } else {
            block
        }
    };
    let highlight = Style::default().add_modifier(Modifier::REVERSED);

    let mut mine_state = ListState::default();
    if !app.characters.mine.is_empty() {
        mine_state.select(Some(state.mine_idx));
    }
    let mine_list = List::new(mine)
        .block(block_for("My characters", state.focus == Focus::Mine))
        .highlight_style(highlight);
    f.render_stateful_widget(mine_list, columns[0], &mut mine_state);

    let mut others_state = ListState::default();
    if !app.characters.others.is_empty() {
        others_state.select(Some(state.others_idx));
    }
    let others_list = List::new(others)
        .block(block_for("Opponents", state.focus == Focus::Opponents))
        .highlight_style(highlight);
    f.render_stateful_widget(others_list, columns[1], &mut others_state);
}

fn draw_creation(f: &mut Frame, area: Rect, app: &AppState) {
    let p = Paragraph::new(Line::from(vec![
        Span::raw("New character type: "),
        Span::styled(
            app.creation_type.label(),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::raw("   "),
        Span::styled(app.status.clone(), Style::default().fg(Color::Gray)),
    ]))
    .block(Block::default().borders(Borders::ALL).title("Create / Status"));
    f.render_widget(p, area);
}

/// Key hints for the actions the current state allows.
fn available_hints(state: &UiState, app: &AppState) -> Vec<&'static str> {
    let mut hints = vec!["Tab focus", "↑/↓ move", "t type", "c create"];
    if let Some(c) = state.focused_mine(app) {
        if app.heal_available(c) {
            hints.push("h heal");
        }
        hints.push("s select");
    }
    if let Some(rival) = state.focused_opponent(app) {
        for action in app.combat_actions_against(rival) {
            match action {
                Action::Fight { .. } => hints.push("f fight"),
                Action::Spell { .. } => hints.push("m spell"),
                _ => {}
            }
        }
    }
    if app.withdraw_available() {
        hints.push("w withdraw");
    }
    hints.extend(["a account", "r reconnect", "q quit"]);
    hints
}

fn draw_help(f: &mut Frame, area: Rect, state: &UiState, app: &AppState) {
    let p = Paragraph::new(available_hints(state, app).iter().join("  ·  "))
        .block(Block::default().borders(Borders::ALL).title("Keys"));
    f.render_widget(p, area);
}

fn draw_modals(f: &mut Frame, state: &UiState, app: &AppState) {
    if let Some(notification) = app.notification.visible() {
        let area = centered_rect(60, 30, f.area());
        let title = format!(
            "{} ({})",
            notification.title,
            notification.raised_at.format("%H:%M:%S")
        );
        let block = Block::default().borders(Borders::ALL).title(title);
        let p = Paragraph::new(format!("{}\n\n[Enter] close", notification.body))
            .wrap(Wrap { trim: true });
        f.render_widget(Clear, area);
        f.render_widget(block.clone(), area);
        f.render_widget(p, block.inner(area));
    }

    match &state.mode {
        Mode::QuitModal => {
            let area = centered_rect(40, 20, f.area());
            let block = Block::default().borders(Borders::ALL).title("Confirm Quit");
            let p = Paragraph::new("Quit the game? (Y/N)");
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(p, block.inner(area));
        }
        Mode::AccountPicker(picker) => {
            let area = centered_rect(50, 50, f.area());
            let items: Vec<ListItem> = picker
                .choices
                .iter()
                .map(|(name, unlocked)| {
                    let lock = if *unlocked { "  " } else { "🔒" };
                    ListItem::new(format!("{lock} {}", truncate(name, MAX_ACCOUNT_WIDTH)))
                })
                .collect();
            let mut list_state = ListState::default();
            list_state.select(Some(picker.idx));
            let list = List::new(items)
                .block(
                    Block::default()
                        .borders(Borders::ALL)
                        .title("Switch account (Enter select, Esc cancel)"),
                )
                .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
            f.render_widget(Clear, area);
            f.render_stateful_widget(list, area, &mut list_state);
        }
        Mode::PasswordPrompt(prompt) => {
            let area = centered_rect(50, 20, f.area());
            let block = Block::default()
                .borders(Borders::ALL)
                .title(format!("Password for '{}'", prompt.name));
            let p = Paragraph::new("*".repeat(prompt.input.chars().count()));
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(p, block.inner(area));
        }
        Mode::Normal => {}
    }
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
