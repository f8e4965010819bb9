use crate::{
    game::Score,
    session::SessionState,
    units,
};
use chrono::{
    DateTime,
    Local,
};
use std::collections::VecDeque;

pub const ACTIVITY_CAP: usize = 50;

pub const PROVIDER_MISSING_ADVISORY: &str =
    "No wallet keystore found. Add one to your wallet directory to use this app!";
pub const CONNECT_TO_PLAY: &str = "Please connect your wallet to play.";
pub const NOTE_NEEDS_CONNECTION: &str = "Please connect wallet first";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Tone {
    Info,
    Progress,
    Success,
    Error,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StatusLine {
    pub text: String,
    pub tone: Tone,
}

impl StatusLine {
    pub fn new(text: impl Into<String>, tone: Tone) -> Self {
        Self {
            text: text.into(),
            tone,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Tab {
    #[default]
    Notes,
    Game,
}

impl Tab {
    pub fn other(self) -> Self {
        match self {
            Tab::Notes => Tab::Game,
            Tab::Game => Tab::Notes,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Field {
    Note,
    Bet,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Edit {
    Insert(char),
    Backspace,
    Clear,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConnectionView {
    pub network: String,
    pub wallet_status: String,
    pub connect_label: String,
    pub connect_enabled: bool,
    pub advisory: Option<String>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct NotesView {
    pub input: String,
    pub display: String,
    pub tx_status: Option<StatusLine>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct GameView {
    pub bet_input: String,
    pub bounds: Option<String>,
    pub house: Option<String>,
    pub message: Option<StatusLine>,
    pub narrative: Option<String>,
    pub score: Score,
    pub moves_enabled: bool,
}

#[derive(Clone, Debug)]
pub struct ActivityEntry {
    pub at: DateTime<Local>,
    pub text: String,
    pub tone: Tone,
}

/// Everything the terminal renders. Owned by the controller, read by `ui::draw`.
#[derive(Clone, Debug)]
pub struct ViewState {
    pub tab: Tab,
    pub connection: ConnectionView,
    pub notes: NotesView,
    pub game: GameView,
    pub activity: VecDeque<ActivityEntry>,
}

impl ViewState {
    pub fn new(network: impl Into<String>) -> Self {
        Self {
            tab: Tab::default(),
            connection: ConnectionView {
                network: network.into(),
                wallet_status: "Not connected".into(),
                connect_label: "Connect Wallet".into(),
                connect_enabled: false,
                advisory: None,
            },
            notes: NotesView {
                display: NOTE_NEEDS_CONNECTION.into(),
                ..NotesView::default()
            },
            game: GameView::default(),
            activity: VecDeque::new(),
        }
    }

    /// Contract-invoking controls are dead once the provider is known absent.
    pub fn inputs_enabled(&self) -> bool {
        self.connection.advisory.is_none()
    }

    pub fn apply_session(&mut self, state: SessionState) {
        let connection = &mut self.connection;
        match state {
            SessionState::Uninitialized => {
                connection.wallet_status = "Not connected".into();
                connection.connect_label = "Connect Wallet".into();
                connection.connect_enabled = false;
                self.game.moves_enabled = false;
            }
            SessionState::ProviderMissing => {
                connection.wallet_status = "No wallet provider".into();
                connection.connect_label = "Connect Wallet".into();
                connection.connect_enabled = false;
                connection.advisory = Some(PROVIDER_MISSING_ADVISORY.into());
                self.game.moves_enabled = false;
            }
            SessionState::Disconnected => {
                connection.wallet_status = "Not connected".into();
                connection.connect_label = "Connect Wallet".into();
                connection.connect_enabled = true;
                self.game.moves_enabled = false;
                self.notes.display = NOTE_NEEDS_CONNECTION.into();
            }
            SessionState::Connecting => {
                connection.wallet_status = "Connecting...".into();
                connection.connect_label = "Connecting...".into();
                connection.connect_enabled = false;
            }
            SessionState::Connected(account) => {
                let label = format!("Connected: {}", units::shorten_address(&account));
                connection.wallet_status = label.clone();
                connection.connect_label = label;
                connection.connect_enabled = false;
                self.game.moves_enabled = true;
            }
        }
    }

    pub fn field(&self, field: Field) -> &str {
        match field {
            Field::Note => &self.notes.input,
            Field::Bet => &self.game.bet_input,
        }
    }

    pub fn edit(&mut self, field: Field, edit: Edit) {
        let value = self.field_mut(field);
        match edit {
            Edit::Insert(c) => value.push(c),
            Edit::Backspace => {
                value.pop();
            }
            Edit::Clear => value.clear(),
        }
    }

    fn field_mut(&mut self, field: Field) -> &mut String {
        match field {
            Field::Note => &mut self.notes.input,
            Field::Bet => &mut self.game.bet_input,
        }
    }

    pub fn log(&mut self, text: impl Into<String>, tone: Tone) {
        self.activity.push_back(ActivityEntry {
            at: Local::now(),
            text: text.into(),
            tone,
        });
        while self.activity.len() > ACTIVITY_CAP {
            self.activity.pop_front();
        }
    }
}
