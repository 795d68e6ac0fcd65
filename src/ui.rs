use std::io::{self, Stdout};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossbeam_channel::Receiver;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::{Frame, Terminal};

use crate::data::{CommentService, FeedService, LinkOpener};
use crate::fetch::FetchEnvelope;
use crate::reddit::{Feed, SortOption};
use crate::view::{DetailLine, Role, ViewState};

const SPINNER_FRAMES: [char; 4] = ['|', '/', '-', '\\'];

pub struct Options {
    pub status_message: String,
    pub feed_service: Arc<dyn FeedService>,
    pub comment_service: Arc<dyn CommentService>,
    pub opener: Arc<dyn LinkOpener>,
    pub default_feed: Feed,
    pub default_sort: SortOption,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Pane {
    Posts,
    Detail,
}

struct Spinner {
    index: usize,
}

impl Spinner {
    fn new() -> Self {
        Spinner { index: 0 }
    }

    fn advance(&mut self) {
        self.index = (self.index + 1) % SPINNER_FRAMES.len();
    }

    fn reset(&mut self) {
        self.index = 0;
    }

    fn frame(&self) -> char {
        SPINNER_FRAMES[self.index]
    }
}

pub struct Model {
    view: ViewState,
    responses: Receiver<FetchEnvelope>,
    status_message: String,
    feed: Feed,
    sort: SortOption,
    selected_row: usize,
    list_state: ListState,
    detail_scroll: u16,
    focused_pane: Pane,
    spinner: Spinner,
    needs_redraw: bool,
}

impl Model {
    pub fn new(opts: Options) -> Self {
        let (view, responses) = ViewState::new(
            opts.feed_service.clone(),
            opts.comment_service.clone(),
            opts.opener.clone(),
        );
        let mut model = Model {
            view,
            responses,
            status_message: opts.status_message,
            feed: opts.default_feed,
            sort: opts.default_sort,
            selected_row: 0,
            list_state: ListState::default(),
            detail_scroll: 0,
            focused_pane: Pane::Posts,
            spinner: Spinner::new(),
            needs_redraw: true,
        };
        model.refresh();
        model
    }

    pub fn run(&mut self) -> Result<()> {
        let mut stdout = io::stdout();
        enable_raw_mode()?;
        stdout.execute(EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        let result = self.event_loop(&mut terminal);

        disable_raw_mode()?;
        terminal.backend_mut().execute(LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let mut last_tick = Instant::now();
        let tick_rate = Duration::from_millis(120);

        loop {
            if self.poll_async() {
                self.mark_dirty();
            }

            if self.needs_redraw {
                terminal.draw(|frame| self.draw(frame))?;
                self.needs_redraw = false;
            }

            let timeout = tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_millis(16));

            if event::poll(timeout)? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press && self.handle_key(key.code) {
                        break;
                    }
                }
            }

            if last_tick.elapsed() >= tick_rate {
                last_tick = Instant::now();
                if self.view.is_loading() {
                    self.spinner.advance();
                    self.mark_dirty();
                }
            }
        }

        Ok(())
    }

    fn mark_dirty(&mut self) {
        self.needs_redraw = true;
    }

    fn poll_async(&mut self) -> bool {
        let mut changed = false;
        while let Ok(envelope) = self.responses.try_recv() {
            self.view.handle_envelope(envelope);
            changed = true;
        }
        if changed {
            self.clamp_selection();
            if !self.view.is_loading() {
                self.spinner.reset();
            }
        }
        changed
    }

    fn clamp_selection(&mut self) {
        let rows = self.view.list_lines().len();
        if rows == 0 {
            self.selected_row = 0;
        } else if self.selected_row >= rows {
            self.selected_row = rows - 1;
        }
    }

    /// Returns true when the application should exit.
    fn handle_key(&mut self, code: KeyCode) -> bool {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => return true,
            KeyCode::Char('j') | KeyCode::Down => self.move_down(),
            KeyCode::Char('k') | KeyCode::Up => self.move_up(),
            KeyCode::Char('h') | KeyCode::Left => self.focused_pane = Pane::Posts,
            KeyCode::Char('l') | KeyCode::Right => self.focused_pane = Pane::Detail,
            KeyCode::Enter => self.select_current(),
            KeyCode::Char('f') => {
                self.feed = self.feed.toggled();
                self.refresh();
            }
            KeyCode::Char('s') => {
                self.sort = self.sort.cycled();
                self.refresh();
            }
            KeyCode::Char('r') => self.refresh(),
            KeyCode::Char('o') => self.open_link(),
            _ => return false,
        }
        self.mark_dirty();
        false
    }

    fn move_down(&mut self) {
        match self.focused_pane {
            Pane::Posts => {
                let rows = self.view.list_lines().len();
                if rows > 0 && self.selected_row + 1 < rows {
                    self.selected_row += 1;
                }
            }
            Pane::Detail => {
                self.detail_scroll = self.detail_scroll.saturating_add(1);
            }
        }
    }

    fn move_up(&mut self) {
        match self.focused_pane {
            Pane::Posts => {
                self.selected_row = self.selected_row.saturating_sub(1);
            }
            Pane::Detail => {
                self.detail_scroll = self.detail_scroll.saturating_sub(1);
            }
        }
    }

    fn select_current(&mut self) {
        if self.focused_pane != Pane::Posts {
            return;
        }
        self.detail_scroll = 0;
        if self.view.select_post(self.selected_row).is_some() {
            let title = self
                .view
                .posts()
                .get(self.selected_row)
                .map(|post| post.title.clone())
                .unwrap_or_default();
            self.status_message = format!("Loading details for \"{}\"...", title);
            self.spinner.reset();
        }
    }

    fn refresh(&mut self) {
        self.selected_row = 0;
        self.detail_scroll = 0;
        self.status_message = format!(
            "Loading {} ({})...",
            self.feed.display_name(),
            self.sort.display_name()
        );
        self.spinner.reset();
        self.view.request_refresh(self.feed, self.sort);
        self.mark_dirty();
    }

    fn open_link(&mut self) {
        if self.view.selected_url().is_none() {
            self.status_message = "Select a post first.".to_string();
            return;
        }
        self.view.open_selected_link();
        self.status_message = "Opening post in browser...".to_string();
    }

    fn draw(&mut self, frame: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(3), Constraint::Length(1)])
            .split(frame.size());
        let panes = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(chunks[0]);

        let items: Vec<ListItem> = self
            .view
            .list_lines()
            .iter()
            .map(|line| ListItem::new(line.clone()))
            .collect();
        let list_title = format!(
            " {} ({}) ",
            self.feed.display_name(),
            self.sort.display_name()
        );
        let list = List::new(items)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(list_title)
                    .border_style(self.pane_border(Pane::Posts)),
            )
            .highlight_style(
                Style::default()
                    .bg(Color::DarkGray)
                    .add_modifier(Modifier::BOLD),
            );
        self.list_state.select(Some(self.selected_row));
        frame.render_stateful_widget(list, panes[0], &mut self.list_state);

        let detail = Paragraph::new(detail_text(self.view.detail_lines()))
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(" Details ")
                    .border_style(self.pane_border(Pane::Detail)),
            )
            .wrap(Wrap { trim: false })
            .scroll((self.detail_scroll, 0));
        frame.render_widget(detail, panes[1]);

        let status = if self.view.is_loading() {
            format!(" {} {}", self.spinner.frame(), self.status_message)
        } else {
            format!(
                " {}  [j/k] move  [Enter] details  [f] feed  [s] sort  [r] refresh  [o] open  [q] quit",
                self.status_message
            )
        };
        frame.render_widget(
            Paragraph::new(status).style(Style::default().fg(Color::Gray)),
            chunks[1],
        );
    }

    fn pane_border(&self, pane: Pane) -> Style {
        if self.focused_pane == pane {
            Style::default().fg(Color::Cyan)
        } else {
            Style::default()
        }
    }
}

fn detail_text(lines: &[DetailLine]) -> Text<'static> {
    let mut rendered: Vec<Line<'static>> = Vec::new();
    for line in lines {
        let style = role_style(line.role);
        for part in line.text.split('\n') {
            rendered.push(Line::from(Span::styled(part.to_string(), style)));
        }
        if matches!(line.role, Role::Url | Role::Content | Role::Comment) {
            rendered.push(Line::default());
        }
    }
    Text::from(rendered)
}

fn role_style(role: Role) -> Style {
    match role {
        Role::Title => Style::default()
            .fg(Color::Blue)
            .add_modifier(Modifier::BOLD),
        Role::Score => Style::default()
            .fg(Color::LightRed)
            .add_modifier(Modifier::BOLD),
        Role::Url => Style::default()
            .fg(Color::Blue)
            .add_modifier(Modifier::ITALIC),
        Role::Header => Style::default().add_modifier(Modifier::BOLD),
        Role::Content | Role::Comment => Style::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{MockCommentService, MockFeedService};

    struct NoopOpener;

    impl LinkOpener for NoopOpener {
        fn open(&self, _url: &str) {}
    }

    fn model() -> Model {
        Model::new(Options {
            status_message: String::new(),
            feed_service: Arc::new(MockFeedService),
            comment_service: Arc::new(MockCommentService),
            opener: Arc::new(NoopOpener),
            default_feed: Feed::Home,
            default_sort: SortOption::Hot,
        })
    }

    #[test]
    fn open_link_requires_a_selection() {
        let mut model = model();
        model.open_link();
        assert_eq!(model.status_message, "Select a post first.");

        let envelope = model
            .responses
            .recv_timeout(Duration::from_secs(5))
            .expect("list envelope");
        model.view.handle_envelope(envelope);
        model.select_current();
        model.open_link();
        assert_eq!(model.status_message, "Opening post in browser...");
    }

    #[test]
    fn detail_text_splits_multiline_content() {
        let lines = vec![DetailLine {
            role: Role::Content,
            text: "Content:\nfirst paragraph".to_string(),
        }];
        let text = detail_text(&lines);
        assert_eq!(text.lines[0].spans[0].content, "Content:");
        assert_eq!(text.lines[1].spans[0].content, "first paragraph");
    }

    #[test]
    fn spinner_cycles_and_resets() {
        let mut spinner = Spinner::new();
        let first = spinner.frame();
        spinner.advance();
        assert_ne!(spinner.frame(), first);
        spinner.reset();
        assert_eq!(spinner.frame(), first);
    }
}
