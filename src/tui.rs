use anyhow::Result;
use chrono::{DateTime, Utc};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
};
use std::io::stdout;
use std::time::Duration;
use tracing::warn;

use crate::feed::{Applied, FeedSession, FeedSource, FeedStatus, FetchErrorKind};
use crate::models::ScoreTier;
use crate::saved::{KeyValueStore, SavedJobStore};
use crate::share::{self, ShareChannel, SharePolicy};
use crate::view::{compute_view, summarize, DisplayJob, Tab, ViewState};

/// Redraw at least this often so time labels stay current.
const TICK: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputMode {
    Normal,
    Search,
}

#[derive(Debug, PartialEq, Eq)]
enum Action {
    None,
    Quit,
    Refresh,
    Share(String),
    Open(String),
}

struct AppState<S: KeyValueStore> {
    session: FeedSession,
    saved: SavedJobStore<S>,
    view: ViewState,
    mode: InputMode,
    selected: usize,
    scroll_offset: u16,
    message: Option<String>,
}

impl<S: KeyValueStore> AppState<S> {
    fn new(session: FeedSession, saved: SavedJobStore<S>) -> Self {
        Self {
            session,
            saved,
            view: ViewState::default(),
            mode: InputMode::Normal,
            selected: 0,
            scroll_offset: 0,
            message: None,
        }
    }

    fn visible(&self, now: DateTime<Utc>) -> Vec<DisplayJob<'_>> {
        compute_view(self.session.jobs(), &self.view, self.saved.current(), now)
    }

    fn current_id(&self, now: DateTime<Utc>) -> Option<String> {
        self.visible(now)
            .get(self.selected)
            .map(|d| d.job.id.clone())
    }

    fn clamp_selection(&mut self, now: DateTime<Utc>) {
        let len = self.visible(now).len();
        if self.selected >= len {
            self.selected = len.saturating_sub(1);
        }
    }

    fn next(&mut self, now: DateTime<Utc>) {
        let len = self.visible(now).len();
        if len > 0 && self.selected < len - 1 {
            self.selected += 1;
            self.scroll_offset = 0;
        }
    }

    fn prev(&mut self) {
        if self.selected > 0 {
            self.selected -= 1;
            self.scroll_offset = 0;
        }
    }

    fn reset_selection(&mut self) {
        self.selected = 0;
        self.scroll_offset = 0;
    }

    fn toggle_saved(&mut self, now: DateTime<Utc>) {
        let Some(id) = self.current_id(now) else { return };
        self.message = Some(match self.saved.toggle(&id) {
            Ok(set) if set.contains(&id) => format!("Saved job {}", id),
            Ok(_) => format!("Removed job {} from saved", id),
            Err(e) => format!("Could not persist saved jobs: {}", e),
        });
        self.clamp_selection(now);
    }

    fn handle_key(&mut self, code: KeyCode, now: DateTime<Utc>) -> Action {
        if self.mode == InputMode::Search {
            match code {
                KeyCode::Enter => self.mode = InputMode::Normal,
                KeyCode::Esc => {
                    self.view.search.clear();
                    self.mode = InputMode::Normal;
                    self.reset_selection();
                }
                KeyCode::Backspace => {
                    self.view.search.pop();
                    self.reset_selection();
                }
                KeyCode::Char(c) => {
                    self.view.search.push(c);
                    self.reset_selection();
                }
                _ => {}
            }
            return Action::None;
        }

        match code {
            KeyCode::Char('q') | KeyCode::Esc => return Action::Quit,
            KeyCode::Down | KeyCode::Char('j') => self.next(now),
            KeyCode::Up | KeyCode::Char('k') => self.prev(),
            KeyCode::Char('J') | KeyCode::PageDown => {
                self.scroll_offset = self.scroll_offset.saturating_add(3);
            }
            KeyCode::Char('K') | KeyCode::PageUp => {
                self.scroll_offset = self.scroll_offset.saturating_sub(3);
            }
            KeyCode::Tab => {
                self.view.tab = self.view.tab.toggle();
                self.reset_selection();
            }
            KeyCode::Char('/') => {
                self.mode = InputMode::Search;
                self.message = None;
            }
            KeyCode::Char('s') => self.toggle_saved(now),
            KeyCode::Char('S') => {
                if let Some(id) = self.current_id(now) {
                    return Action::Share(id);
                }
            }
            KeyCode::Char('o') | KeyCode::Enter => {
                let url = self
                    .visible(now)
                    .get(self.selected)
                    .map(|d| d.job.job_url.clone());
                if let Some(url) = url {
                    return Action::Open(url);
                }
            }
            KeyCode::Char('R') => return Action::Refresh,
            _ => {}
        }
        Action::None
    }

    fn share(&mut self, id: &str, policy: &SharePolicy, channel: &dyn ShareChannel) {
        let Some(job) = self.session.jobs().iter().find(|j| j.id == id) else { return };
        self.message = Some(match share::share_job(job, policy, channel) {
            Ok(receipt) => receipt.confirmation(),
            Err(e) => format!("{:#}", e),
        });
    }

    fn finish_refresh(&mut self, applied: Option<Applied>, now: DateTime<Utc>) {
        self.message = Some(match applied {
            Some(Applied::Replaced(n)) => format!("Loaded {} jobs", n),
            Some(Applied::Failed(kind)) => format!("{} (showing previous data)", failure_text(kind)),
            Some(Applied::Stale) | None => "Refresh already in progress".to_string(),
        });
        self.clamp_selection(now);
    }
}

fn failure_text(kind: FetchErrorKind) -> &'static str {
    match kind {
        FetchErrorKind::Unreachable => "Could not reach the job feed",
        FetchErrorKind::MalformedPayload => "Job feed returned unreadable data",
    }
}

pub fn run_browse<S: KeyValueStore>(
    source: &dyn FeedSource,
    saved: SavedJobStore<S>,
    policy: &SharePolicy,
    channel: &dyn ShareChannel,
) -> Result<()> {
    let mut state = AppState::new(FeedSession::new(), saved);

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let mut list_state = ListState::default();
    let result = load_feed(&mut terminal, &mut state, &mut list_state, source)
        .and_then(|_| run_loop(&mut terminal, &mut state, &mut list_state, source, policy, channel));

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
}

/// Draws the in-progress state, then blocks on the feed read.
fn load_feed<S: KeyValueStore>(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    state: &mut AppState<S>,
    list_state: &mut ListState,
    source: &dyn FeedSource,
) -> Result<()> {
    let Some(ticket) = state.session.begin_refresh() else {
        state.finish_refresh(None, Utc::now());
        return Ok(());
    };
    if let Err(e) = terminal.draw(|frame| draw(frame, state, list_state, Utc::now())) {
        state.session.abandon_refresh(&ticket);
        return Err(e.into());
    }
    let result = source.load_feed();
    let applied = state.session.apply(ticket, result);
    state.finish_refresh(Some(applied), Utc::now());
    Ok(())
}

fn run_loop<S: KeyValueStore>(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    state: &mut AppState<S>,
    list_state: &mut ListState,
    source: &dyn FeedSource,
    policy: &SharePolicy,
    channel: &dyn ShareChannel,
) -> Result<()> {
    loop {
        let now = Utc::now();
        list_state.select(Some(state.selected));
        terminal.draw(|frame| draw(frame, state, list_state, now))?;

        if !event::poll(TICK)? {
            continue;
        }
        let Event::Key(key) = event::read()? else { continue };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        match state.handle_key(key.code, Utc::now()) {
            Action::None => {}
            Action::Quit => break,
            Action::Refresh => {
                state.message = None;
                load_feed(terminal, state, list_state, source)?;
            }
            Action::Share(id) => state.share(&id, policy, channel),
            Action::Open(url) => {
                if let Err(e) = share::open_external(&url) {
                    warn!(error = %e, "failed to open apply link");
                    state.message = Some(format!("{:#}", e));
                }
            }
        }
    }
    Ok(())
}

fn draw<S: KeyValueStore>(
    frame: &mut Frame,
    state: &AppState<S>,
    list_state: &mut ListState,
    now: DateTime<Utc>,
) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(frame.area());

    let visible = state.visible(now);
    let summary = summarize(state.session.jobs(), state.saved.current(), &visible);

    // Header: tabs and feed status
    let tab_style = |tab: Tab| {
        if state.view.tab == tab {
            Style::default().fg(Color::Black).bg(Color::Green).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::DarkGray)
        }
    };
    let status = match state.session.status() {
        _ if state.session.is_refreshing() => " Refreshing...".to_string(),
        FeedStatus::Loading => " Waiting for data...".to_string(),
        FeedStatus::Ready => format!(" {} jobs", summary.total),
        FeedStatus::Failed(kind) => format!(" {}", failure_text(kind)),
    };
    let header = Line::from(vec![
        Span::styled(" Live Feed ", tab_style(Tab::Feed)),
        Span::raw(" "),
        Span::styled(format!(" Saved ({}) ", summary.saved), tab_style(Tab::Saved)),
        Span::styled(status, Style::default().fg(Color::DarkGray)),
    ]);
    frame.render_widget(Paragraph::new(header), rows[0]);

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(rows[1]);

    // Left panel: ranked jobs
    let items: Vec<ListItem> = visible
        .iter()
        .map(|d| {
            let score_style = match d.tier {
                ScoreTier::Strong => Style::default().fg(Color::Green),
                ScoreTier::Fair => Style::default().fg(Color::Yellow),
            };
            let marker = if d.is_saved { "♥" } else { " " };
            ListItem::new(Line::from(vec![
                Span::styled(format!("{:>3}% ", d.job.analysis.match_score), score_style),
                Span::raw(format!(
                    "{} {} | {}",
                    marker,
                    truncate(&d.job.title, 32),
                    truncate(&d.job.company, 20)
                )),
            ]))
        })
        .collect();

    let list_title = if state.view.search.is_empty() {
        format!(" Jobs ({}) ", summary.shown)
    } else {
        format!(" Jobs ({}) matching '{}' ", summary.shown, state.view.search)
    };
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(list_title))
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");
    frame.render_stateful_widget(list, chunks[0], list_state);

    // Right panel: job detail
    let detail = match visible.get(state.selected) {
        Some(d) => build_detail(d),
        None => Text::from(empty_message(state)),
    };
    let detail_widget = Paragraph::new(detail)
        .block(Block::default().borders(Borders::ALL).title(" Detail "))
        .wrap(Wrap { trim: false })
        .scroll((state.scroll_offset, 0));
    frame.render_widget(detail_widget, chunks[1]);

    // Footer: search input, last message, or help
    let footer = if state.mode == InputMode::Search {
        Paragraph::new(format!(" /{}_", state.view.search))
    } else if let Some(msg) = &state.message {
        Paragraph::new(format!(" {}", msg)).style(Style::default().fg(Color::Cyan))
    } else {
        Paragraph::new(
            " j/k:navigate  J/K:scroll  tab:feed/saved  /:search  s:save  S:share  o:apply  R:refresh  q:quit",
        )
        .style(Style::default().fg(Color::DarkGray))
    };
    frame.render_widget(footer, rows[2]);
}

fn empty_message<S: KeyValueStore>(state: &AppState<S>) -> String {
    match state.session.status() {
        FeedStatus::Loading => "Waiting for data...".to_string(),
        FeedStatus::Failed(kind) if state.session.jobs().is_empty() => {
            format!("{}. Press R to retry.", failure_text(kind))
        }
        _ if state.view.tab == Tab::Saved && state.saved.current().is_empty() => {
            "No saved jobs yet. Press s on a job to save it.".to_string()
        }
        _ if state.view.tab == Tab::Saved && state.view.search.trim().is_empty() => {
            "None of your saved jobs are in the current feed.".to_string()
        }
        _ => "No jobs match.".to_string(),
    }
}

fn build_detail<'a>(d: &DisplayJob<'a>) -> Text<'a> {
    let job = d.job;
    let analysis = &job.analysis;
    let mut lines: Vec<Line> = Vec::new();

    lines.push(Line::from(Span::styled(
        job.title.as_str(),
        Style::default().add_modifier(Modifier::BOLD),
    )));
    lines.push(Line::from(format!("at {}", job.company)));

    let score_style = match d.tier {
        ScoreTier::Strong => Style::default().fg(Color::Green),
        ScoreTier::Fair => Style::default().fg(Color::Yellow),
    };
    lines.push(Line::from(Span::styled(
        format!("Match: {}%", analysis.match_score),
        score_style,
    )));

    if !job.location.is_empty() {
        lines.push(Line::from(format!("Location: {}", job.location)));
    }
    lines.push(Line::from(format!("Source: {}", d.source_label)));
    lines.push(Line::from(format!("Found: {}", d.time_label)));
    if let Some(posted) = &job.date_posted {
        lines.push(Line::from(format!("Posted: {}", posted)));
    }
    if d.show_salary {
        lines.push(Line::from(Span::styled(
            format!("Salary: {}", analysis.salary_estimate),
            Style::default().fg(Color::Green),
        )));
    }
    if let Some(fresher) = analysis.is_suitable_for_fresher {
        lines.push(Line::from(format!(
            "Fresher friendly: {}",
            if fresher { "yes" } else { "no" }
        )));
    }
    if d.is_saved {
        lines.push(Line::from(Span::styled("♥ Saved", Style::default().fg(Color::Magenta))));
    }
    lines.push(Line::from(format!("URL: {}", job.job_url)));
    lines.push(Line::from(""));

    if analysis.has_skill_gap() {
        lines.push(Line::from(Span::styled(
            "SKILL GAPS DETECTED",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )));
        lines.push(Line::from(format!("  {}", analysis.skill_gap.join(", "))));
        lines.push(Line::from(""));
    }

    if let Some(hook) = &analysis.cover_letter_hook {
        lines.push(Line::from(Span::styled(
            "COVER LETTER HOOK",
            Style::default().add_modifier(Modifier::BOLD),
        )));
        for line in textwrap::fill(hook, 70).lines() {
            lines.push(Line::from(format!("  {}", line)));
        }
        lines.push(Line::from(""));
    }

    if !analysis.share_message.is_empty() {
        lines.push(Line::from(Span::styled(
            analysis.share_message.as_str(),
            Style::default().fg(Color::DarkGray),
        )));
    }

    Text::from(lines)
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::FetchError;
    use crate::models::{JobAnalysis, JobRecord};
    use crate::saved::MemoryStore;
    use chrono::TimeZone;

    struct StaticSource(Vec<JobRecord>);

    impl FeedSource for StaticSource {
        fn load_feed(&self) -> Result<Vec<JobRecord>, FetchError> {
            Ok(self.0.clone())
        }
    }

    struct DownSource;

    impl FeedSource for DownSource {
        fn load_feed(&self) -> Result<Vec<JobRecord>, FetchError> {
            Err(FetchError::Unreachable("connection refused".to_string()))
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 12, 0, 0).unwrap()
    }

    fn job(id: &str, title: &str, score: u8) -> JobRecord {
        JobRecord {
            id: id.to_string(),
            title: title.to_string(),
            company: "Acme".to_string(),
            location: "Remote".to_string(),
            site: "indeed".to_string(),
            found_at: None,
            date_posted: None,
            job_url: format!("https://example.com/{}", id),
            analysis: JobAnalysis {
                match_score: score,
                ..JobAnalysis::default()
            },
        }
    }

    fn loaded_state() -> AppState<MemoryStore> {
        let source = StaticSource(vec![
            job("a", "Python Dev", 42),
            job("b", "React Dev", 91),
            job("c", "Data Analyst", 77),
        ]);
        let session = FeedSession::start(&source);
        AppState::new(session, SavedJobStore::open(MemoryStore::new()))
    }

    fn visible_ids(state: &AppState<MemoryStore>) -> Vec<String> {
        state.visible(now()).iter().map(|d| d.job.id.clone()).collect()
    }

    #[test]
    fn test_navigation_follows_ranked_order() {
        let mut state = loaded_state();
        assert_eq!(state.current_id(now()).as_deref(), Some("b"));
        state.handle_key(KeyCode::Char('j'), now());
        assert_eq!(state.current_id(now()).as_deref(), Some("c"));
        state.handle_key(KeyCode::Char('j'), now());
        state.handle_key(KeyCode::Char('j'), now());
        assert_eq!(state.current_id(now()).as_deref(), Some("a"));
        state.handle_key(KeyCode::Char('k'), now());
        assert_eq!(state.current_id(now()).as_deref(), Some("c"));
    }

    #[test]
    fn test_save_then_saved_tab() {
        let mut state = loaded_state();
        state.handle_key(KeyCode::Char('j'), now());
        state.handle_key(KeyCode::Char('s'), now());
        assert_eq!(state.message.as_deref(), Some("Saved job c"));

        state.handle_key(KeyCode::Tab, now());
        assert_eq!(state.view.tab, Tab::Saved);
        assert_eq!(visible_ids(&state), vec!["c"]);

        // Unsaving the only job in the saved tab leaves nothing selected
        state.handle_key(KeyCode::Char('s'), now());
        assert!(visible_ids(&state).is_empty());
        assert_eq!(state.selected, 0);
        assert_eq!(state.current_id(now()), None);
    }

    #[test]
    fn test_search_mode_edits_filter() {
        let mut state = loaded_state();
        state.handle_key(KeyCode::Char('/'), now());
        for c in "dev".chars() {
            assert_eq!(state.handle_key(KeyCode::Char(c), now()), Action::None);
        }
        assert_eq!(visible_ids(&state), vec!["b", "a"]);

        // 'q' is text while searching
        assert_eq!(state.handle_key(KeyCode::Char('q'), now()), Action::None);
        assert!(visible_ids(&state).is_empty());
        state.handle_key(KeyCode::Backspace, now());
        state.handle_key(KeyCode::Enter, now());
        assert_eq!(state.mode, InputMode::Normal);
        assert_eq!(state.view.search, "dev");

        state.handle_key(KeyCode::Char('/'), now());
        state.handle_key(KeyCode::Esc, now());
        assert_eq!(state.view.search, "");
        assert_eq!(visible_ids(&state).len(), 3);
    }

    #[test]
    fn test_actions() {
        let mut state = loaded_state();
        assert_eq!(state.handle_key(KeyCode::Char('S'), now()), Action::Share("b".to_string()));
        assert_eq!(
            state.handle_key(KeyCode::Char('o'), now()),
            Action::Open("https://example.com/b".to_string())
        );
        assert_eq!(state.handle_key(KeyCode::Char('R'), now()), Action::Refresh);
        assert_eq!(state.handle_key(KeyCode::Char('q'), now()), Action::Quit);
    }

    #[test]
    fn test_failed_refresh_keeps_jobs_and_reports() {
        let mut state = loaded_state();
        let applied = state.session.refresh(&DownSource);
        state.finish_refresh(applied, now());
        assert_eq!(visible_ids(&state).len(), 3);
        assert_eq!(
            state.message.as_deref(),
            Some("Could not reach the job feed (showing previous data)")
        );
    }

    #[test]
    fn test_empty_message_states() {
        let state = AppState::new(FeedSession::new(), SavedJobStore::open(MemoryStore::new()));
        assert_eq!(empty_message(&state), "Waiting for data...");

        let session = FeedSession::start(&DownSource);
        let state = AppState::new(session, SavedJobStore::open(MemoryStore::new()));
        assert_eq!(empty_message(&state), "Could not reach the job feed. Press R to retry.");
    }

    #[test]
    fn test_saved_tab_empty_message_follows_saved_set() {
        let mut state = loaded_state();
        state.view.tab = Tab::Saved;
        assert_eq!(empty_message(&state), "No saved jobs yet. Press s on a job to save it.");

        state.saved.toggle("not-in-feed").unwrap();
        assert!(visible_ids(&state).is_empty());
        assert_eq!(empty_message(&state), "None of your saved jobs are in the current feed.");

        state.view.search = "zzz".to_string();
        assert_eq!(empty_message(&state), "No jobs match.");
    }

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("Développeur Python Senior", 10), "Dévelop...");
    }
}
