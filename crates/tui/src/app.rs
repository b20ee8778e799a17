use std::{collections::HashMap, future::Future, io, thread, time::Duration};

use anyhow::{Context, Result};
use chrono::Local;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use estokar_core::{
    ApiError, ApiResult, AuthCheck, Gate, ResourceKind, SessionGuard, SessionToken,
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use serde_json::Value;
use tokio::{spawn, sync::mpsc};
use tracing::{debug, error, info, warn};

use crate::{banner, records};

const TICK_RATE: Duration = Duration::from_millis(250);
const MAX_INPUT_LEN: usize = 4096;
const MENU_WIDTH: u16 = 22;
const FORM_WIDTH: u16 = 52;

#[derive(Debug, Clone)]
struct Theme {
    primary_bg: Color,
    primary_fg: Color,
    accent: Color,
    muted: Color,
    selection_bg: Color,
    selection_fg: Color,
    success: Color,
    warning: Color,
    danger: Color,
    on_accent: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            primary_bg: Color::Reset,
            primary_fg: Color::White,
            accent: Color::Cyan,
            muted: Color::DarkGray,
            selection_bg: Color::DarkGray,
            selection_fg: Color::White,
            success: Color::Green,
            warning: Color::Yellow,
            danger: Color::Red,
            on_accent: Color::Black,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Dashboard,
    Resource(ResourceKind),
}

impl Route {
    fn title(self) -> &'static str {
        match self {
            Route::Dashboard => "Dashboard",
            Route::Resource(kind) => kind.title(),
        }
    }
}

fn menu_routes() -> Vec<Route> {
    std::iter::once(Route::Dashboard)
        .chain(ResourceKind::ALL.into_iter().map(Route::Resource))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Focus {
    Menu,
    Content,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Browse,
    Filter,
    ConfirmDelete,
    Prompt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Notice {
    Info(String),
    Error(String),
}

/// Single-line editable text; the cursor counts characters, not bytes.
#[derive(Debug, Clone, Default)]
struct TextInput {
    value: String,
    cursor: usize,
}

impl TextInput {
    fn with_value(value: impl Into<String>) -> Self {
        let value = value.into();
        let cursor = value.chars().count();
        Self { value, cursor }
    }

    fn value(&self) -> &str {
        &self.value
    }

    fn len(&self) -> usize {
        self.value.chars().count()
    }

    fn clear(&mut self) {
        self.value.clear();
        self.cursor = 0;
    }

    fn byte_index(&self, char_index: usize) -> usize {
        self.value
            .char_indices()
            .nth(char_index)
            .map(|(index, _)| index)
            .unwrap_or(self.value.len())
    }

    fn insert(&mut self, ch: char) {
        if ch.is_control() || self.len() >= MAX_INPUT_LEN {
            return;
        }
        let at = self.byte_index(self.cursor);
        self.value.insert(at, ch);
        self.cursor += 1;
    }

    fn backspace(&mut self) {
        if self.cursor == 0 {
            return;
        }
        self.cursor -= 1;
        let at = self.byte_index(self.cursor);
        self.value.remove(at);
    }

    fn delete(&mut self) {
        if self.cursor >= self.len() {
            return;
        }
        let at = self.byte_index(self.cursor);
        self.value.remove(at);
    }

    fn move_cursor(&mut self, delta: isize) {
        let len = self.len() as isize;
        self.cursor = (self.cursor as isize + delta).clamp(0, len) as usize;
    }

    /// Apply an editing key; returns false when the key is not an edit.
    fn handle_key(&mut self, key: &KeyEvent) -> bool {
        match key.code {
            KeyCode::Char(ch) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.insert(ch)
            }
            KeyCode::Backspace => self.backspace(),
            KeyCode::Delete => self.delete(),
            KeyCode::Left => self.move_cursor(-1),
            KeyCode::Right => self.move_cursor(1),
            KeyCode::Home => self.cursor = 0,
            KeyCode::End => self.cursor = self.len(),
            _ => return false,
        }
        true
    }

    fn spans(&self, masked: bool, active: bool, theme: &Theme) -> Vec<Span<'static>> {
        let shown: Vec<char> = if masked {
            vec!['•'; self.len()]
        } else {
            self.value.chars().collect()
        };
        if !active {
            return vec![Span::raw(shown.into_iter().collect::<String>())];
        }
        let before: String = shown[..self.cursor].iter().collect();
        let at = shown.get(self.cursor).copied().unwrap_or(' ');
        let after: String = shown.iter().skip(self.cursor + 1).collect();
        vec![
            Span::raw(before),
            Span::styled(
                at.to_string(),
                Style::default().fg(theme.on_accent).bg(theme.accent),
            ),
            Span::raw(after),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum LoginField {
    #[default]
    Username,
    Password,
}

#[derive(Debug, Default)]
struct LoginForm {
    username: TextInput,
    password: TextInput,
    field: LoginField,
    signup: bool,
    pending: bool,
    notice: Option<Notice>,
}

impl LoginForm {
    fn active_input(&mut self) -> &mut TextInput {
        match self.field {
            LoginField::Username => &mut self.username,
            LoginField::Password => &mut self.password,
        }
    }

    fn toggle_field(&mut self) {
        self.field = match self.field {
            LoginField::Username => LoginField::Password,
            LoginField::Password => LoginField::Username,
        };
    }

    fn reset_after_session_end(&mut self) {
        self.password.clear();
        self.field = if self.username.value().is_empty() {
            LoginField::Username
        } else {
            LoginField::Password
        };
        self.signup = false;
        self.pending = false;
    }
}

/// Cached collection of one resource plus the list widget state.
#[derive(Debug, Default)]
struct ListView {
    records: Vec<Value>,
    visible: Vec<usize>,
    state: ListState,
    filter: TextInput,
    loading: bool,
    loaded: bool,
    error: Option<String>,
    detail: Option<Value>,
    detail_loading: bool,
}

impl ListView {
    fn set_records(&mut self, records: Vec<Value>) {
        self.records = records;
        self.loaded = true;
        self.loading = false;
        self.error = None;
        self.apply_filter();
    }

    fn apply_filter(&mut self) {
        let needle = self.filter.value();
        self.visible = self
            .records
            .iter()
            .enumerate()
            .filter(|(_, record)| records::record_matches(record, needle))
            .map(|(index, _)| index)
            .collect();
        if self.visible.is_empty() {
            self.state.select(None);
        } else {
            let current = self.state.selected().unwrap_or(0);
            self.state.select(Some(current.min(self.visible.len() - 1)));
        }
    }

    fn move_cursor(&mut self, delta: isize) {
        if self.visible.is_empty() {
            return;
        }
        let last = self.visible.len() as isize - 1;
        let current = self.state.selected().unwrap_or(0) as isize;
        self.state.select(Some((current + delta).clamp(0, last) as usize));
    }

    fn move_to_end(&mut self) {
        if !self.visible.is_empty() {
            self.state.select(Some(self.visible.len() - 1));
        }
    }

    fn selected(&self) -> Option<&Value> {
        self.state
            .selected()
            .and_then(|position| self.visible.get(position))
            .and_then(|&index| self.records.get(index))
    }
}

#[derive(Debug, Default)]
struct DashboardView {
    stats: Option<ApiResult<Value>>,
    recent: Option<ApiResult<Vec<Value>>>,
    low_stock: Option<ApiResult<Vec<Value>>>,
    loading: bool,
}

/// JSON payload typed by the user for a create or an update.
#[derive(Debug)]
struct PayloadPrompt {
    kind: ResourceKind,
    target: Option<String>,
    input: TextInput,
    error: Option<String>,
}

#[derive(Debug)]
enum Outcome {
    Login(ApiResult<SessionToken>),
    Signup(ApiResult<Value>),
    Logout,
    List(ResourceKind, ApiResult<Vec<Value>>),
    Detail(ResourceKind, ApiResult<Value>),
    Saved {
        kind: ResourceKind,
        updated: bool,
        result: ApiResult<Value>,
    },
    Removed {
        kind: ResourceKind,
        id: String,
        result: ApiResult<()>,
    },
    Dashboard {
        stats: ApiResult<Value>,
        recent: ApiResult<Vec<Value>>,
        low_stock: ApiResult<Vec<Value>>,
    },
}

enum AppEvent {
    Input(Event),
    Tick,
    Backend { generation: u64, outcome: Outcome },
}

/// Terminal console over the inventory backend.
pub struct EstokarApp {
    guard: SessionGuard,
    theme: Theme,
    seen: AuthCheck,
    generation: u64,
    routes: Vec<Route>,
    menu_cursor: usize,
    route: Route,
    focus: Focus,
    mode: Mode,
    login: LoginForm,
    lists: HashMap<ResourceKind, ListView>,
    dashboard: DashboardView,
    prompt: Option<PayloadPrompt>,
    /// Record named in the delete confirmation, fixed when the prompt opens.
    pending_delete: Option<(ResourceKind, String)>,
    status: String,
    should_quit: bool,
    event_tx: Option<mpsc::Sender<AppEvent>>,
}

impl EstokarApp {
    pub fn new(guard: SessionGuard) -> Self {
        let seen = guard.state();
        Self {
            guard,
            theme: Theme::default(),
            seen,
            generation: 0,
            routes: menu_routes(),
            menu_cursor: 0,
            route: Route::Dashboard,
            focus: Focus::Menu,
            mode: Mode::Browse,
            login: LoginForm::default(),
            lists: HashMap::new(),
            dashboard: DashboardView::default(),
            prompt: None,
            pending_delete: None,
            status: "Ready".to_string(),
            should_quit: false,
            event_tx: None,
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        let mut stdout = io::stdout();
        enable_raw_mode().context("failed to enter raw mode")?;
        execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).context("failed to create terminal")?;
        terminal.hide_cursor()?;
        terminal.clear()?;

        let (event_tx, mut event_rx) = mpsc::channel::<AppEvent>(128);
        spawn_input_thread(event_tx.clone());
        self.event_tx = Some(event_tx);

        terminal.draw(|frame| self.draw(frame))?;
        let check = self.guard.check_session();
        info!(?check, base_url = %self.guard.gateway().base_url(), "session check resolved");
        self.sync_session();

        loop {
            terminal.draw(|frame| self.draw(frame))?;
            if self.should_quit {
                break;
            }
            let maybe_event = event_rx.recv().await;
            if !self.process_app_event(maybe_event) {
                break;
            }
            self.sync_session();
        }

        restore_terminal(&mut terminal)?;
        self.event_tx = None;
        Ok(())
    }

    fn process_app_event(&mut self, maybe_event: Option<AppEvent>) -> bool {
        match maybe_event {
            Some(AppEvent::Input(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                self.handle_key(key);
                true
            }
            Some(AppEvent::Input(_)) | Some(AppEvent::Tick) => true,
            Some(AppEvent::Backend {
                generation,
                outcome,
            }) => {
                self.handle_outcome(generation, outcome);
                true
            }
            None => false,
        }
    }

    /// React to auth transitions made by the guard since the last event.
    fn sync_session(&mut self) {
        let current = self.guard.state();
        if current == self.seen {
            return;
        }
        debug!(from = ?self.seen, to = ?current, "auth state changed");
        self.seen = current;
        self.generation += 1;
        self.mode = Mode::Browse;
        self.prompt = None;
        self.pending_delete = None;
        self.lists.clear();
        self.dashboard = DashboardView::default();

        match current {
            AuthCheck::Authenticated => {
                self.login = LoginForm::default();
                let user = self
                    .guard
                    .current_user()
                    .map(|user| user.display_name())
                    .unwrap_or_else(|| "unknown user".to_string());
                self.status = format!("Signed in as {user}");
                self.load_route();
            }
            AuthCheck::Unauthenticated => {
                self.login.reset_after_session_end();
                self.route = Route::Dashboard;
                self.menu_cursor = 0;
                self.focus = Focus::Menu;
            }
            AuthCheck::Checking => {}
        }
    }

    fn spawn_backend<F>(&self, task: F)
    where
        F: Future<Output = Outcome> + Send + 'static,
    {
        let Some(sender) = self.event_tx.clone() else {
            warn!("backend call requested before the event loop started");
            return;
        };
        let generation = self.generation;
        spawn(async move {
            let outcome = task.await;
            if sender
                .send(AppEvent::Backend {
                    generation,
                    outcome,
                })
                .await
                .is_err()
            {
                debug!("event loop closed before backend result arrived");
            }
        });
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.should_quit = true;
            return;
        }
        match self.guard.state() {
            AuthCheck::Checking => {}
            AuthCheck::Unauthenticated => self.handle_login_key(key),
            AuthCheck::Authenticated => match self.mode {
                Mode::Prompt => self.handle_prompt_key(key),
                Mode::ConfirmDelete => self.handle_confirm_key(key),
                Mode::Filter => self.handle_filter_key(key),
                Mode::Browse => self.handle_browse_key(key),
            },
        }
    }

    fn handle_login_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => self.should_quit = true,
            KeyCode::Tab | KeyCode::BackTab | KeyCode::Up | KeyCode::Down => {
                self.login.toggle_field()
            }
            KeyCode::F(2) => {
                self.login.signup = !self.login.signup;
                self.login.notice = None;
            }
            KeyCode::Enter => {
                if self.login.field == LoginField::Username {
                    self.login.field = LoginField::Password;
                } else {
                    self.submit_login();
                }
            }
            _ => {
                if self.login.active_input().handle_key(&key) {
                    self.login.notice = None;
                }
            }
        }
    }

    fn submit_login(&mut self) {
        if self.login.pending {
            return;
        }
        let username = self.login.username.value().to_string();
        let password = self.login.password.value().to_string();
        if let Err(err) = self.guard.policy().validate(&username, &password) {
            self.login.notice = Some(Notice::Error(describe_error(&err)));
            return;
        }

        self.login.pending = true;
        let guard = self.guard.clone();
        if self.login.signup {
            self.login.notice = Some(Notice::Info("Creating account…".to_string()));
            self.spawn_backend(async move {
                Outcome::Signup(guard.signup(&username, &password).await)
            });
        } else {
            self.login.notice = Some(Notice::Info("Signing in…".to_string()));
            self.spawn_backend(async move { Outcome::Login(guard.login(&username, &password).await) });
        }
    }

    fn handle_browse_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') => {
                self.should_quit = true;
                return;
            }
            KeyCode::Char('L') => {
                self.start_logout();
                return;
            }
            KeyCode::Tab | KeyCode::BackTab => {
                self.focus = match self.focus {
                    Focus::Menu => Focus::Content,
                    Focus::Content => Focus::Menu,
                };
                return;
            }
            KeyCode::Char('r') => {
                self.load_route();
                return;
            }
            KeyCode::Char(digit @ '1'..='9') => {
                let index = digit as usize - '1' as usize;
                if let Some(route) = self.routes.get(index).copied() {
                    self.menu_cursor = index;
                    self.navigate(route);
                }
                return;
            }
            _ => {}
        }

        match self.focus {
            Focus::Menu => self.handle_menu_key(key),
            Focus::Content => self.handle_content_key(key),
        }
    }

    fn handle_menu_key(&mut self, key: KeyEvent) {
        let last = self.routes.len().saturating_sub(1);
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => {
                self.menu_cursor = self.menu_cursor.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                self.menu_cursor = (self.menu_cursor + 1).min(last);
            }
            KeyCode::Enter | KeyCode::Right | KeyCode::Char('l') => {
                if let Some(route) = self.routes.get(self.menu_cursor).copied() {
                    self.navigate(route);
                    self.focus = Focus::Content;
                }
            }
            _ => {}
        }
    }

    fn handle_content_key(&mut self, key: KeyEvent) {
        let Route::Resource(kind) = self.route else {
            if matches!(key.code, KeyCode::Esc | KeyCode::Left | KeyCode::Char('h')) {
                self.focus = Focus::Menu;
            }
            return;
        };

        match key.code {
            KeyCode::Up | KeyCode::Char('k') => self.list_mut(kind).move_cursor(-1),
            KeyCode::Down | KeyCode::Char('j') => self.list_mut(kind).move_cursor(1),
            KeyCode::PageUp => self.list_mut(kind).move_cursor(-10),
            KeyCode::PageDown => self.list_mut(kind).move_cursor(10),
            KeyCode::Home | KeyCode::Char('g') => self.list_mut(kind).state.select(Some(0)),
            KeyCode::End | KeyCode::Char('G') => self.list_mut(kind).move_to_end(),
            KeyCode::Enter => self.open_detail(kind),
            KeyCode::Char('/') => {
                self.mode = Mode::Filter;
                self.status = "Filter: type to narrow, Enter keeps it, Esc clears".to_string();
            }
            KeyCode::Char('n') => self.open_prompt(kind, None),
            KeyCode::Char('e') => {
                let selected = self.list_mut(kind).selected().cloned();
                match selected {
                    Some(record) => self.open_prompt(kind, Some(record)),
                    None => self.status = "Nothing selected to edit".to_string(),
                }
            }
            KeyCode::Char('d') | KeyCode::Delete => {
                let id = self.list_mut(kind).selected().and_then(records::record_id);
                match id {
                    Some(id) => {
                        self.mode = Mode::ConfirmDelete;
                        self.status = format!("Delete {} #{id}? (y/n)", kind.title());
                        self.pending_delete = Some((kind, id));
                    }
                    None => self.status = "Selected record has no identifier".to_string(),
                }
            }
            KeyCode::Esc | KeyCode::Left | KeyCode::Char('h') => {
                let list = self.list_mut(kind);
                if list.detail.is_some() {
                    list.detail = None;
                } else if !list.filter.value().is_empty() {
                    list.filter.clear();
                    list.apply_filter();
                } else {
                    self.focus = Focus::Menu;
                }
            }
            _ => {}
        }
    }

    fn handle_filter_key(&mut self, key: KeyEvent) {
        let Route::Resource(kind) = self.route else {
            self.mode = Mode::Browse;
            return;
        };
        match key.code {
            KeyCode::Enter => {
                self.mode = Mode::Browse;
                let list = self.list_mut(kind);
                let shown = list.visible.len();
                let total = list.records.len();
                self.status = format!("Showing {shown} of {total}");
            }
            KeyCode::Esc => {
                self.mode = Mode::Browse;
                let list = self.list_mut(kind);
                list.filter.clear();
                list.apply_filter();
                self.status = "Filter cleared".to_string();
            }
            _ => {
                let list = self.list_mut(kind);
                if list.filter.handle_key(&key) {
                    list.apply_filter();
                }
            }
        }
    }

    fn handle_confirm_key(&mut self, key: KeyEvent) {
        self.mode = Mode::Browse;
        let Some((kind, id)) = self.pending_delete.take() else {
            return;
        };
        if !matches!(key.code, KeyCode::Char('y') | KeyCode::Char('Y')) {
            self.status = "Delete cancelled".to_string();
            return;
        }

        self.status = format!("Deleting {} #{id}…", kind.title());
        let guard = self.guard.clone();
        let resource = guard.gateway().resource(kind);
        self.spawn_backend(async move {
            let result = guard.guarded(resource.remove(&id)).await;
            Outcome::Removed { kind, id, result }
        });
    }

    fn handle_prompt_key(&mut self, key: KeyEvent) {
        let Some(prompt) = self.prompt.as_mut() else {
            self.mode = Mode::Browse;
            return;
        };
        match key.code {
            KeyCode::Esc => {
                self.prompt = None;
                self.mode = Mode::Browse;
                self.status = "Edit cancelled".to_string();
            }
            KeyCode::Enter => {
                let payload = match serde_json::from_str::<Value>(prompt.input.value()) {
                    Ok(payload) if payload.is_object() => payload,
                    Ok(_) => {
                        prompt.error = Some("payload must be a JSON object".to_string());
                        return;
                    }
                    Err(err) => {
                        prompt.error = Some(format!("invalid JSON: {err}"));
                        return;
                    }
                };
                let kind = prompt.kind;
                let target = prompt.target.clone();
                self.prompt = None;
                self.mode = Mode::Browse;
                self.submit_payload(kind, target, payload);
            }
            _ => {
                if prompt.input.handle_key(&key) {
                    prompt.error = None;
                }
            }
        }
    }

    fn open_prompt(&mut self, kind: ResourceKind, record: Option<Value>) {
        let (target, initial) = match record {
            Some(record) => {
                let Some(id) = records::record_id(&record) else {
                    self.status = "Selected record has no identifier".to_string();
                    return;
                };
                (Some(id), record.to_string())
            }
            None => (None, "{}".to_string()),
        };
        self.prompt = Some(PayloadPrompt {
            kind,
            target,
            input: TextInput::with_value(initial),
            error: None,
        });
        self.mode = Mode::Prompt;
    }

    fn submit_payload(&mut self, kind: ResourceKind, target: Option<String>, payload: Value) {
        let guard = self.guard.clone();
        let resource = guard.gateway().resource(kind);
        match target {
            Some(id) => {
                self.status = format!("Updating {} #{id}…", kind.title());
                self.spawn_backend(async move {
                    let result = guard.guarded(resource.update(&id, &payload)).await;
                    Outcome::Saved {
                        kind,
                        updated: true,
                        result,
                    }
                });
            }
            None => {
                self.status = format!("Creating {} record…", kind.title());
                self.spawn_backend(async move {
                    let result = guard.guarded(resource.create(&payload)).await;
                    Outcome::Saved {
                        kind,
                        updated: false,
                        result,
                    }
                });
            }
        }
    }

    fn start_logout(&mut self) {
        self.status = "Signing out…".to_string();
        let guard = self.guard.clone();
        self.spawn_backend(async move {
            guard.logout().await;
            Outcome::Logout
        });
    }

    fn navigate(&mut self, route: Route) {
        if self.route == route {
            return;
        }
        self.route = route;
        self.mode = Mode::Browse;
        self.generation += 1;
        let needs_load = match route {
            Route::Dashboard => true,
            Route::Resource(kind) => !self.list_mut(kind).loaded,
        };
        if needs_load {
            self.load_route();
        } else {
            self.status = route.title().to_string();
        }
    }

    fn load_route(&mut self) {
        let guard = self.guard.clone();
        match self.route {
            Route::Dashboard => {
                self.dashboard.loading = true;
                self.status = "Loading dashboard…".to_string();
                self.spawn_backend(async move {
                    let dashboard = guard.gateway().dashboard();
                    let (stats, recent, low_stock) = tokio::join!(
                        guard.guarded(dashboard.get_stats::<Value>()),
                        guard.guarded(dashboard.get_recent_activity::<Value>()),
                        guard.guarded(dashboard.get_low_stock::<Value>()),
                    );
                    Outcome::Dashboard {
                        stats,
                        recent,
                        low_stock,
                    }
                });
            }
            Route::Resource(kind) => {
                self.list_mut(kind).loading = true;
                self.status = format!("Loading {}…", kind.title());
                let resource = guard.gateway().resource(kind);
                self.spawn_backend(async move {
                    Outcome::List(kind, guard.guarded(resource.list_all::<Value>()).await)
                });
            }
        }
    }

    fn open_detail(&mut self, kind: ResourceKind) {
        let Some(id) = self.list_mut(kind).selected().and_then(records::record_id) else {
            self.status = "Selected record has no identifier".to_string();
            return;
        };
        self.list_mut(kind).detail_loading = true;
        let guard = self.guard.clone();
        let resource = guard.gateway().resource(kind);
        self.spawn_backend(async move {
            Outcome::Detail(kind, guard.guarded(resource.get_one::<Value>(&id)).await)
        });
    }

    fn list_mut(&mut self, kind: ResourceKind) -> &mut ListView {
        self.lists.entry(kind).or_default()
    }

    fn handle_outcome(&mut self, generation: u64, outcome: Outcome) {
        if let Some(code) = expired_code(&outcome) {
            warn!(code, "backend rejected the session");
            self.login.notice = Some(Notice::Error(
                "Session expired, please sign in again".to_string(),
            ));
            return;
        }

        match outcome {
            Outcome::Login(result) => {
                self.login.pending = false;
                match result {
                    Ok(session) => {
                        let user = session
                            .user
                            .as_ref()
                            .map(|user| user.display_name())
                            .unwrap_or_default();
                        info!(%user, "signed in from console");
                    }
                    Err(err) => {
                        self.login.password.clear();
                        self.login.notice = Some(Notice::Error(describe_login_error(&err)));
                    }
                }
            }
            Outcome::Signup(result) => {
                self.login.pending = false;
                match result {
                    Ok(_) => {
                        self.login.signup = false;
                        self.login.password.clear();
                        self.login.field = LoginField::Password;
                        self.login.notice = Some(Notice::Info(
                            "Account created, sign in to continue".to_string(),
                        ));
                    }
                    Err(err) => {
                        self.login.notice = Some(Notice::Error(describe_error(&err)));
                    }
                }
            }
            Outcome::Logout => {
                self.login.notice = Some(Notice::Info("Signed out".to_string()));
            }
            Outcome::Dashboard {
                stats,
                recent,
                low_stock,
            } => {
                if generation != self.generation {
                    debug!(generation, "dropping stale dashboard result");
                    return;
                }
                self.status = match (&stats, &recent, &low_stock) {
                    (Ok(_), Ok(_), Ok(_)) => "Dashboard updated".to_string(),
                    _ => "Dashboard partially unavailable".to_string(),
                };
                self.dashboard = DashboardView {
                    stats: Some(stats),
                    recent: Some(recent),
                    low_stock: Some(low_stock),
                    loading: false,
                };
            }
            Outcome::List(kind, result) => {
                if generation != self.generation {
                    debug!(generation, resource = %kind, "dropping stale list result");
                    return;
                }
                let list = self.list_mut(kind);
                match result {
                    Ok(items) => {
                        list.set_records(items);
                        let total = list.records.len();
                        // Keep the confirmation question on screen.
                        if self.mode != Mode::ConfirmDelete {
                            self.status =
                                format!("Loaded {total} {}", kind.title().to_lowercase());
                        }
                    }
                    Err(err) => {
                        error!(resource = %kind, "list failed: {err}");
                        list.loading = false;
                        list.error = Some(describe_error(&err));
                        self.status = format!("Failed to load {}: {err}", kind.title());
                    }
                }
            }
            Outcome::Detail(kind, result) => {
                if generation != self.generation {
                    debug!(generation, resource = %kind, "dropping stale detail result");
                    return;
                }
                let list = self.list_mut(kind);
                list.detail_loading = false;
                match result {
                    Ok(record) => list.detail = Some(record),
                    Err(err) => self.status = format!("Failed to open record: {err}"),
                }
            }
            Outcome::Saved {
                kind,
                updated,
                result,
            } => {
                let verb = if updated { "updated" } else { "created" };
                match result {
                    Ok(_) => self.status = format!("{} record {verb}", kind.title()),
                    Err(ApiError::Parse(_)) => {
                        self.status = format!("{} record {verb}; response was not JSON", kind.title())
                    }
                    Err(err) => {
                        self.status = format!("Save failed: {}", describe_error(&err));
                        return;
                    }
                }
                self.refresh_if_current(kind);
            }
            Outcome::Removed { kind, id, result } => match result {
                Ok(()) => {
                    info!(resource = %kind, %id, "record removed");
                    self.status = format!("{} #{id} deleted", kind.title());
                    self.list_mut(kind).detail = None;
                    self.refresh_if_current(kind);
                }
                Err(err) => self.status = format!("Delete failed: {}", describe_error(&err)),
            },
        }
    }

    fn refresh_if_current(&mut self, kind: ResourceKind) {
        if self.route == Route::Resource(kind) {
            self.load_route();
        } else {
            self.list_mut(kind).loaded = false;
        }
    }

    fn draw(&mut self, frame: &mut Frame) {
        let area = frame.size();
        frame.render_widget(
            Block::default().style(
                Style::default()
                    .bg(self.theme.primary_bg)
                    .fg(self.theme.primary_fg),
            ),
            area,
        );

        match self.guard.require_session(|| ()) {
            Gate::Loading => self.draw_loading(frame, area),
            Gate::RedirectToLogin => self.draw_login(frame, area),
            Gate::Render(()) => self.draw_console(frame, area),
        }
    }

    fn draw_loading(&self, frame: &mut Frame, area: Rect) {
        let rect = centered_rect(32, 3, area);
        let paragraph = Paragraph::new("Checking session…")
            .style(Style::default().fg(self.theme.muted))
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL));
        frame.render_widget(paragraph, rect);
    }

    fn draw_login(&self, frame: &mut Frame, area: Rect) {
        let theme = &self.theme;
        let banner_lines = banner::render("EstoKar");
        let banner_height = banner_lines.len() as u16;
        let rect = centered_rect(FORM_WIDTH, banner_height + 13, area);
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(banner_height + 1), Constraint::Min(0)])
            .split(rect);

        let banner = Paragraph::new(
            banner_lines
                .into_iter()
                .map(|line| Line::from(Span::styled(line, Style::default().fg(theme.accent))))
                .collect::<Vec<_>>(),
        )
        .alignment(Alignment::Center);
        frame.render_widget(banner, chunks[0]);

        let form = &self.login;
        let title = if form.signup {
            " Create account "
        } else {
            " Sign in "
        };
        let field_line = |label: &str, input: &TextInput, field: LoginField| {
            let active = form.field == field && !form.pending;
            let label_style = if active {
                Style::default().fg(theme.accent).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(theme.muted)
            };
            let mut spans = vec![Span::styled(format!("{label:<10}"), label_style)];
            spans.extend(input.spans(field == LoginField::Password, active, theme));
            Line::from(spans)
        };

        let mut lines = vec![
            Line::from(""),
            field_line("Username", &form.username, LoginField::Username),
            Line::from(""),
            field_line("Password", &form.password, LoginField::Password),
            Line::from(""),
        ];
        match &form.notice {
            Some(Notice::Error(text)) => {
                lines.push(Line::from(Span::styled(text.clone(), Style::default().fg(theme.danger))))
            }
            Some(Notice::Info(text)) => {
                lines.push(Line::from(Span::styled(text.clone(), Style::default().fg(theme.success))))
            }
            None => lines.push(Line::from("")),
        }
        lines.push(Line::from(""));
        let toggle = if form.signup {
            "F2 back to sign in"
        } else {
            "F2 create an account"
        };
        lines.push(Line::from(Span::styled(
            format!("Enter submit • Tab switch field • {toggle} • Esc quit"),
            Style::default().fg(theme.muted),
        )));

        let paragraph = Paragraph::new(lines)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(title)
                    .border_style(Style::default().fg(theme.accent)),
            )
            .wrap(Wrap { trim: false });
        frame.render_widget(paragraph, chunks[1]);
    }

    fn draw_console(&mut self, frame: &mut Frame, area: Rect) {
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(0),
                Constraint::Length(1),
            ])
            .split(area);
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(MENU_WIDTH), Constraint::Min(0)])
            .split(rows[1]);

        self.draw_header(frame, rows[0]);
        self.draw_menu(frame, columns[0]);
        match self.route {
            Route::Dashboard => self.draw_dashboard(frame, columns[1]),
            Route::Resource(kind) => self.draw_resource(frame, columns[1], kind),
        }
        self.draw_status(frame, rows[2]);

        if self.mode == Mode::Prompt {
            self.draw_prompt(frame, area);
        }
    }

    fn draw_header(&self, frame: &mut Frame, area: Rect) {
        let theme = &self.theme;
        let session = self.guard.current_session();
        let user = session
            .as_ref()
            .and_then(|session| session.user.as_ref())
            .map(|user| user.display_name())
            .unwrap_or_else(|| "unknown user".to_string());
        let since = session
            .and_then(|session| session.issued_at)
            .map(|issued| format!(" since {}", issued.with_timezone(&Local).format("%d/%m %H:%M")))
            .unwrap_or_default();
        let line = Line::from(vec![
            Span::styled(
                " EstoKar ",
                Style::default()
                    .fg(theme.on_accent)
                    .bg(theme.accent)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::raw(" "),
            Span::styled(self.route.title(), Style::default().add_modifier(Modifier::BOLD)),
            Span::styled(
                format!("  {}  ", self.guard.gateway().base_url()),
                Style::default().fg(theme.muted),
            ),
            Span::styled(format!("● {user}{since}"), Style::default().fg(theme.success)),
        ]);
        frame.render_widget(Paragraph::new(line), area);
    }

    fn draw_menu(&self, frame: &mut Frame, area: Rect) {
        let theme = &self.theme;
        let items: Vec<ListItem> = self
            .routes
            .iter()
            .enumerate()
            .map(|(index, route)| {
                let style = if *route == self.route {
                    Style::default().fg(theme.accent).add_modifier(Modifier::BOLD)
                } else {
                    Style::default()
                };
                ListItem::new(Line::from(vec![
                    Span::styled(format!("{} ", index + 1), Style::default().fg(theme.muted)),
                    Span::styled(route.title(), style),
                ]))
            })
            .collect();
        let border = if self.focus == Focus::Menu {
            theme.accent
        } else {
            theme.muted
        };
        let list = List::new(items)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(" Menu ")
                    .border_style(Style::default().fg(border)),
            )
            .highlight_style(
                Style::default()
                    .bg(theme.selection_bg)
                    .fg(theme.selection_fg),
            )
            .highlight_symbol("› ");
        let mut state = ListState::default();
        state.select(Some(self.menu_cursor));
        frame.render_stateful_widget(list, area, &mut state);
    }

    fn draw_dashboard(&self, frame: &mut Frame, area: Rect) {
        let theme = &self.theme;
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
            .split(area);
        let lower = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(chunks[1]);

        let stats_lines: Vec<Line> = match &self.dashboard.stats {
            Some(Ok(stats)) => records::record_fields(stats)
                .into_iter()
                .map(|(key, value)| {
                    Line::from(vec![
                        Span::styled(format!("{key:<24}"), Style::default().fg(theme.muted)),
                        Span::styled(value, Style::default().add_modifier(Modifier::BOLD)),
                    ])
                })
                .collect(),
            Some(Err(err)) => vec![error_line(err, theme)],
            None => vec![placeholder_line(self.dashboard.loading, theme)],
        };
        frame.render_widget(
            Paragraph::new(stats_lines)
                .block(Block::default().borders(Borders::ALL).title(" Overview "))
                .wrap(Wrap { trim: true }),
            chunks[0],
        );

        self.draw_record_panel(frame, lower[0], " Recent activity ", self.dashboard.recent.as_ref());
        self.draw_record_panel(frame, lower[1], " Low stock ", self.dashboard.low_stock.as_ref());
    }

    fn draw_record_panel(
        &self,
        frame: &mut Frame,
        area: Rect,
        title: &str,
        data: Option<&ApiResult<Vec<Value>>>,
    ) {
        let theme = &self.theme;
        let items: Vec<ListItem> = match data {
            Some(Ok(items)) if items.is_empty() => {
                vec![ListItem::new(Span::styled("Nothing to show", Style::default().fg(theme.muted)))]
            }
            Some(Ok(items)) => items
                .iter()
                .map(|record| ListItem::new(records::record_label(record)))
                .collect(),
            Some(Err(err)) => vec![ListItem::new(error_line(err, theme))],
            None => vec![ListItem::new(placeholder_line(self.dashboard.loading, theme))],
        };
        let list = List::new(items).block(Block::default().borders(Borders::ALL).title(title.to_string()));
        frame.render_widget(list, area);
    }

    fn draw_resource(&mut self, frame: &mut Frame, area: Rect, kind: ResourceKind) {
        let theme = self.theme.clone();
        let focused = self.focus == Focus::Content;
        let filtering = self.mode == Mode::Filter;
        let list = self.lists.entry(kind).or_default();

        let columns = if list.detail.is_some() || list.detail_loading {
            Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
                .split(area)
        } else {
            Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(100)])
                .split(area)
        };
        let show_filter = filtering || !list.filter.value().is_empty();
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(if show_filter { 3 } else { 0 }),
                Constraint::Min(0),
            ])
            .split(columns[0]);

        if show_filter {
            let mut spans = vec![Span::styled("/ ", Style::default().fg(theme.accent))];
            spans.extend(list.filter.spans(false, filtering, &theme));
            frame.render_widget(
                Paragraph::new(Line::from(spans))
                    .block(Block::default().borders(Borders::ALL).title(" Filter ")),
                rows[0],
            );
        }

        let title = format!(
            " {} ({}/{}) ",
            kind.title(),
            list.visible.len(),
            list.records.len()
        );
        let border = if focused { theme.accent } else { theme.muted };
        let block = Block::default()
            .borders(Borders::ALL)
            .title(title)
            .border_style(Style::default().fg(border));

        if let Some(message) = list.error.as_ref() {
            frame.render_widget(
                Paragraph::new(Span::styled(message.clone(), Style::default().fg(theme.danger)))
                    .block(block)
                    .wrap(Wrap { trim: true }),
                rows[1],
            );
        } else if list.visible.is_empty() {
            let text = if list.loading || !list.loaded {
                "Loading…"
            } else if list.records.is_empty() {
                "No records yet. Press n to create one."
            } else {
                "No records match the filter."
            };
            frame.render_widget(
                Paragraph::new(Span::styled(text, Style::default().fg(theme.muted))).block(block),
                rows[1],
            );
        } else {
            let items: Vec<ListItem> = list
                .visible
                .iter()
                .filter_map(|&index| list.records.get(index))
                .map(|record| ListItem::new(records::record_label(record)))
                .collect();
            let widget = List::new(items)
                .block(block)
                .highlight_style(
                    Style::default()
                        .bg(theme.selection_bg)
                        .fg(theme.selection_fg)
                        .add_modifier(Modifier::BOLD),
                )
                .highlight_symbol("› ");
            frame.render_stateful_widget(widget, rows[1], &mut list.state);
        }

        if columns.len() > 1 {
            let lines: Vec<Line> = match list.detail.as_ref() {
                Some(record) => records::record_fields(record)
                    .into_iter()
                    .map(|(key, value)| {
                        Line::from(vec![
                            Span::styled(format!("{key}: "), Style::default().fg(theme.muted)),
                            Span::raw(value),
                        ])
                    })
                    .collect(),
                None => vec![placeholder_line(true, &theme)],
            };
            frame.render_widget(
                Paragraph::new(lines)
                    .block(Block::default().borders(Borders::ALL).title(" Detail "))
                    .wrap(Wrap { trim: false }),
                columns[1],
            );
        }
    }

    fn draw_prompt(&self, frame: &mut Frame, area: Rect) {
        let Some(prompt) = self.prompt.as_ref() else {
            return;
        };
        let theme = &self.theme;
        let rect = centered_rect(area.width.saturating_sub(8).min(96), 9, area);
        frame.render_widget(Clear, rect);

        let title = match &prompt.target {
            Some(id) => format!(" Edit {} #{id} ", prompt.kind.title()),
            None => format!(" New {} record ", prompt.kind.title()),
        };
        let mut lines = vec![
            Line::from(Span::styled(
                "JSON payload sent as-is to the backend:",
                Style::default().fg(theme.muted),
            )),
            Line::from(prompt.input.spans(false, true, theme)),
            Line::from(""),
        ];
        if let Some(err) = prompt.error.as_ref() {
            lines.push(Line::from(Span::styled(err.clone(), Style::default().fg(theme.danger))));
        }
        lines.push(Line::from(Span::styled(
            "Enter save • Esc cancel",
            Style::default().fg(theme.muted),
        )));
        frame.render_widget(
            Paragraph::new(lines)
                .block(
                    Block::default()
                        .borders(Borders::ALL)
                        .title(title)
                        .border_style(Style::default().fg(theme.accent)),
                )
                .wrap(Wrap { trim: false }),
            rect,
        );
    }

    fn draw_status(&self, frame: &mut Frame, area: Rect) {
        let theme = &self.theme;
        let hints = match (self.mode, self.route) {
            (Mode::ConfirmDelete, _) => "y confirm • any key cancel",
            (Mode::Filter, _) => "Enter keep • Esc clear",
            (Mode::Prompt, _) => "Enter save • Esc cancel",
            (Mode::Browse, Route::Dashboard) => "1-8 go • r refresh • L sign out • q quit",
            (Mode::Browse, Route::Resource(_)) => {
                "Enter open • / filter • n new • e edit • d delete • r refresh • L sign out • q quit"
            }
        };
        let status_style = if self.mode == Mode::ConfirmDelete {
            Style::default().fg(theme.warning).add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        let line = Line::from(vec![
            Span::styled(format!(" {} ", self.status), status_style),
            Span::styled(format!("│ {hints}"), Style::default().fg(theme.muted)),
        ]);
        frame.render_widget(Paragraph::new(line), area);
    }
}

fn expired_code(outcome: &Outcome) -> Option<u16> {
    let errors: Vec<&ApiError> = match outcome {
        Outcome::List(_, Err(err)) | Outcome::Detail(_, Err(err)) => vec![err],
        Outcome::Saved { result: Err(err), .. } | Outcome::Removed { result: Err(err), .. } => {
            vec![err]
        }
        Outcome::Dashboard {
            stats,
            recent,
            low_stock,
        } => [
            stats.as_ref().err(),
            recent.as_ref().err(),
            low_stock.as_ref().err(),
        ]
        .into_iter()
        .flatten()
        .collect(),
        _ => Vec::new(),
    };
    errors.into_iter().find_map(|err| match err {
        ApiError::SessionExpired { code } => Some(*code),
        _ => None,
    })
}

fn describe_error(err: &ApiError) -> String {
    match err {
        ApiError::Validation(message) => capitalize(message),
        ApiError::Network(_) => "Backend unreachable, check api.base_url".to_string(),
        other => other.to_string(),
    }
}

fn describe_login_error(err: &ApiError) -> String {
    match err.status_code() {
        Some(401) | Some(403) => "Invalid username or password".to_string(),
        _ => describe_error(err),
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn error_line(err: &ApiError, theme: &Theme) -> Line<'static> {
    Line::from(Span::styled(describe_error(err), Style::default().fg(theme.danger)))
}

fn placeholder_line(loading: bool, theme: &Theme) -> Line<'static> {
    let text = if loading { "Loading…" } else { "Press r to load" };
    Line::from(Span::styled(text, Style::default().fg(theme.muted)))
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor()?;
    Ok(())
}

fn spawn_input_thread(sender: mpsc::Sender<AppEvent>) {
    thread::spawn(move || loop {
        match event::poll(TICK_RATE) {
            Ok(true) => match event::read() {
                Ok(evt) => {
                    if sender.blocking_send(AppEvent::Input(evt)).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            },
            Ok(false) => {
                if sender.blocking_send(AppEvent::Tick).is_err() {
                    break;
                }
            }
            Err(_) => break,
        }
    });
}

fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width, height)
}
