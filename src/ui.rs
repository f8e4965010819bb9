use crate::{
    game::Move,
    provider::Approval,
    view::{
        Edit,
        Field,
        StatusLine,
        Tab,
        Tone,
        ViewState,
    },
};
use color_eyre::eyre::Result;
use crossterm::event::{
    Event,
    EventStream,
    KeyCode,
    KeyEvent,
    KeyEventKind,
};
use crossterm::terminal::{
    disable_raw_mode,
    enable_raw_mode,
};
use futures::{
    StreamExt,
    stream::LocalBoxStream,
};
use itertools::Itertools;
use ratatui::{
    prelude::*,
    widgets::*,
};
use std::io::stdout;
use unicode_width::UnicodeWidthStr;

pub type InputEvents = LocalBoxStream<'static, std::io::Result<Event>>;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum UserEvent {
    Quit,
    Redraw,
    SwitchTab,
    Connect(Approval),
    Disconnect,
    ReadNote,
    WriteNote,
    Play(Move),
    Edit { field: Field, edit: Edit },
    CommitField(Field),
}

#[derive(Debug, Default)]
pub struct UiState {
    mode: Mode,
    terminal: Option<Terminal<CrosstermBackend<std::io::Stdout>>>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
enum Mode {
    #[default]
    Normal,
    Editing(Field),
    Password(String),
    QuitModal,
}

pub fn input_event_stream() -> InputEvents {
    EventStream::new().boxed_local()
}

/// `None` once the input stream has ended.
pub async fn next_raw_event(events: &mut InputEvents) -> Result<Option<Event>> {
    Ok(events.next().await.transpose()?)
}

pub fn terminal_enter(state: &mut UiState) -> Result<()> {
    enable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::EnterAlternateScreen)?;
    // Create a single persistent Terminal to preserve buffers across draws
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

pub fn draw(state: &mut UiState, view: &ViewState) -> Result<()> {
    if let Some(mut term) = state.terminal.take() {
        term.draw(|f| ui(f, state, view))?;
        state.terminal = Some(term);
    }
    Ok(())
}

pub fn interpret_event(state: &mut UiState, view: &ViewState, event: Event) -> Option<UserEvent> {
    let Event::Key(key) = event else {
        return match event {
            Event::Resize(..) => Some(UserEvent::Redraw),
            _ => None,
        };
    };
    if key.kind != KeyEventKind::Press {
        return None;
    }
    match &mut state.mode {
        Mode::QuitModal => match key.code {
            KeyCode::Char('y') | KeyCode::Enter => Some(UserEvent::Quit),
            KeyCode::Char('n') | KeyCode::Esc => {
                state.mode = Mode::Normal;
                Some(UserEvent::Redraw)
            }
            _ => None,
        },
        Mode::Password(buffer) => match key.code {
            KeyCode::Esc => {
                state.mode = Mode::Normal;
                Some(UserEvent::Connect(Approval::Declined))
            }
            KeyCode::Enter => {
                let password = std::mem::take(buffer);
                state.mode = Mode::Normal;
                Some(UserEvent::Connect(Approval::Granted(password)))
            }
            KeyCode::Backspace => {
                buffer.pop();
                Some(UserEvent::Redraw)
            }
            KeyCode::Char(c) => {
                buffer.push(c);
                Some(UserEvent::Redraw)
            }
            _ => None,
        },
        Mode::Editing(field) => {
            let field = *field;
            match key.code {
                KeyCode::Enter | KeyCode::Esc => {
                    state.mode = Mode::Normal;
                    Some(UserEvent::CommitField(field))
                }
                KeyCode::Backspace => Some(UserEvent::Edit {
                    field,
                    edit: Edit::Backspace,
                }),
                KeyCode::Char(c) if accepts(field, c) => Some(UserEvent::Edit {
                    field,
                    edit: Edit::Insert(c),
                }),
                _ => None,
            }
        }
        Mode::Normal => interpret_normal(state, view, key),
    }
}

fn accepts(field: Field, c: char) -> bool {
    match field {
        Field::Note => !c.is_control(),
        Field::Bet => c.is_ascii_digit() || c == '.',
    }
}

fn interpret_normal(state: &mut UiState, view: &ViewState, key: KeyEvent) -> Option<UserEvent> {
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => {
            state.mode = Mode::QuitModal;
            return Some(UserEvent::Redraw);
        }
        KeyCode::Tab | KeyCode::BackTab => return Some(UserEvent::SwitchTab),
        _ => {}
    }
    if !view.inputs_enabled() {
        return None;
    }
    match (view.tab, key.code) {
        (_, KeyCode::Char('c')) if view.connection.connect_enabled => {
            state.mode = Mode::Password(String::new());
            Some(UserEvent::Redraw)
        }
        (_, KeyCode::Char('d')) => Some(UserEvent::Disconnect),
        (Tab::Notes, KeyCode::Char('e')) => {
            state.mode = Mode::Editing(Field::Note);
            Some(UserEvent::Redraw)
        }
        (Tab::Notes, KeyCode::Char('w')) => Some(UserEvent::WriteNote),
        (Tab::Notes, KeyCode::Char('g')) => Some(UserEvent::ReadNote),
        (Tab::Game, KeyCode::Char('b')) => {
            state.mode = Mode::Editing(Field::Bet);
            Some(UserEvent::Redraw)
        }
        (Tab::Game, KeyCode::Char('r')) => Some(UserEvent::Play(Move::Rock)),
        (Tab::Game, KeyCode::Char('p')) => Some(UserEvent::Play(Move::Paper)),
        (Tab::Game, KeyCode::Char('s')) => Some(UserEvent::Play(Move::Scissors)),
        _ => None,
    }
}

fn ui(f: &mut Frame, state: &UiState, view: &ViewState) {
    // Clear the whole frame to avoid leftover fragments
    f.render_widget(Clear, f.area());
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4),  // wallet
            Constraint::Length(3),  // tabs
            Constraint::Min(12),    // active tab
            Constraint::Length(10), // activity
            Constraint::Length(3),  // help
        ])
        .split(f.area());

    draw_wallet_panel(f, chunks[0], view);
    draw_tabs(f, chunks[1], view);
    match view.tab {
        Tab::Notes => draw_notes(f, chunks[2], state, view),
        Tab::Game => draw_game(f, chunks[2], state, view),
    }
    draw_activity(f, chunks[3], view);
    draw_help(f, chunks[4], view);
    draw_modals(f, state);
}

fn tone_style(tone: Tone) -> Style {
    match tone {
        Tone::Info => Style::default(),
        Tone::Progress => Style::default().fg(Color::Blue),
        Tone::Success => Style::default().fg(Color::Green),
        Tone::Error => Style::default().fg(Color::Red),
    }
}

fn status_line(status: &Option<StatusLine>) -> Line<'static> {
    match status {
        Some(status) => Line::styled(status.text.clone(), tone_style(status.tone)),
        None => Line::from(""),
    }
}

fn draw_wallet_panel(f: &mut Frame, area: Rect, view: &ViewState) {
    let connection = &view.connection;
    let button = if connection.connect_enabled {
        format!("[c] {}", connection.connect_label)
    } else {
        connection.connect_label.clone()
    };
    let mut lines = vec![Line::from(format!(
        "Network: {} | {} | {}",
        connection.network, connection.wallet_status, button
    ))];
    if let Some(advisory) = &connection.advisory {
        lines.push(Line::styled(
            advisory.clone(),
            Style::default().fg(Color::Yellow),
        ));
    }
    let widget = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Wallet"));
    f.render_widget(widget, area);
}

fn draw_tabs(f: &mut Frame, area: Rect, view: &ViewState) {
    let selected = match view.tab {
        Tab::Notes => 0,
        Tab::Game => 1,
    };
    let tabs = Tabs::new(vec!["Notes", "Rock Paper Scissors"])
        .select(selected)
        .highlight_style(Style::default().add_modifier(Modifier::BOLD).fg(Color::Cyan))
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(tabs, area);
}

fn input_block(title: &'static str, active: bool) -> Block<'static> {
    let block = Block::default().borders(Borders::ALL).title(title);
    if active {
        block.border_style(Style::default().fg(Color::Yellow))
    } else {
        block
    }
}

fn draw_notes(f: &mut Frame, area: Rect, state: &UiState, view: &ViewState) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(3),
            Constraint::Length(3),
            Constraint::Length(3),
        ])
        .split(area);

    let current = Paragraph::new(view.notes.display.clone())
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title("Current Note"));
    f.render_widget(current, rows[0]);

    let editing = state.mode == Mode::Editing(Field::Note);
    let input = Paragraph::new(view.notes.input.clone())
        .block(input_block("New Note", editing));
    f.render_widget(input, rows[1]);
    if editing {
        place_cursor(f, rows[1], view.field(Field::Note));
    }

    let status = Paragraph::new(status_line(&view.notes.tx_status))
        .block(Block::default().borders(Borders::ALL).title("Transaction"));
    f.render_widget(status, rows[2]);
}

fn draw_game(f: &mut Frame, area: Rect, state: &UiState, view: &ViewState) {
    let game = &view.game;
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(area);
    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4),
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(4),
        ])
        .split(columns[0]);

    let mut info = vec![Line::from(
        game.bounds.clone().unwrap_or_else(|| "Min: - | Max: -".into()),
    )];
    if let Some(house) = &game.house {
        info.push(Line::from(house.clone()));
    }
    f.render_widget(
        Paragraph::new(info).block(Block::default().borders(Borders::ALL).title("Table")),
        left[0],
    );

    let editing = state.mode == Mode::Editing(Field::Bet);
    f.render_widget(
        Paragraph::new(game.bet_input.clone()).block(input_block("Bet", editing)),
        left[1],
    );
    if editing {
        place_cursor(f, left[1], view.field(Field::Bet));
    }

    let move_style = if game.moves_enabled {
        Style::default()
    } else {
        Style::default().add_modifier(Modifier::DIM)
    };
    f.render_widget(
        Paragraph::new(Line::styled(
            "[r] Rock   [p] Paper   [s] Scissors",
            move_style,
        ))
        .block(Block::default().borders(Borders::ALL).title("Your Move")),
        left[2],
    );

    let mut result = vec![status_line(&game.message)];
    if let Some(narrative) = &game.narrative {
        result.push(Line::from(narrative.clone()));
    }
    f.render_widget(
        Paragraph::new(result)
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title("Result")),
        left[3],
    );

    let score = Paragraph::new(vec![
        Line::from(format!("You: {}", game.score.user)),
        Line::from(format!("Computer: {}", game.score.computer)),
    ])
    .block(Block::default().borders(Borders::ALL).title("Score"));
    f.render_widget(score, columns[1]);
}

fn place_cursor(f: &mut Frame, area: Rect, text: &str) {
    let x = area.x + 1 + (text.width() as u16).min(area.width.saturating_sub(2));
    f.set_cursor_position((x, area.y + 1));
}

fn draw_activity(f: &mut Frame, area: Rect, view: &ViewState) {
    let visible = area.height.saturating_sub(2) as usize;
    let lines: Vec<Line> = view
        .activity
        .iter()
        .rev()
        .take(visible)
        .map(|entry| {
            Line::styled(
                format!("{} {}", entry.at.format("%H:%M:%S"), entry.text),
                tone_style(entry.tone),
            )
        })
        .collect();
    let widget = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Activity"));
    f.render_widget(widget, area);
}

fn draw_help(f: &mut Frame, area: Rect, view: &ViewState) {
    let tab_keys: &[(&str, &str)] = match view.tab {
        Tab::Notes => &[("e", "edit note"), ("w", "write"), ("g", "get note")],
        Tab::Game => &[("b", "edit bet"), ("r/p/s", "play")],
    };
    let keys = [("Tab", "switch"), ("c", "connect"), ("d", "disconnect")]
        .iter()
        .chain(tab_keys)
        .chain(&[("q", "quit")])
        .map(|(key, action)| format!("{key} {action}"))
        .join(" | ");
    let help = Paragraph::new(keys).block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(help, area);
}

fn draw_modals(f: &mut Frame, state: &UiState) {
    match &state.mode {
        Mode::Password(buffer) => {
            let area = centered_rect(50, 20, f.area());
            let block = Block::default()
                .borders(Borders::ALL)
                .title("Unlock Wallet");
            let p = Paragraph::new(format!(
                "Password: {}\nEnter=connect Esc=reject",
                "*".repeat(buffer.chars().count())
            ));
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(p, block.inner(area));
        }
        Mode::QuitModal => {
            let area = centered_rect(30, 15, f.area());
            let block = Block::default().borders(Borders::ALL).title("Quit");
            let p = Paragraph::new("Quit dapp-console?\ny=yes n=no");
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(p, block.inner(area));
        }
        Mode::Normal | Mode::Editing(_) => {}
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

    let vertical = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - w_percent) / 2),
            Constraint::Percentage(w_percent),
            Constraint::Percentage((100 - w_percent) / 2),
        ])
        .split(popup_layout[1]);

    vertical[1]
}
