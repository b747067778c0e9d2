use std::io;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::prelude::*;
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Bar, BarChart, BarGroup, Block, Borders, Clear, Paragraph};
use tracing::info;

use fpl_forecast::config::PipelineConfig;
use fpl_forecast::feed;
use fpl_forecast::logging;
use fpl_forecast::metrics::format_metric;
use fpl_forecast::predictor::PlayerOutcome;
use fpl_forecast::state::{AppState, Delta, Screen, WorkerCommand, apply_delta};

struct App {
    state: AppState,
    should_quit: bool,
    cmd_tx: Option<mpsc::Sender<WorkerCommand>>,
}

impl App {
    fn new(config: &PipelineConfig, cmd_tx: Option<mpsc::Sender<WorkerCommand>>) -> Self {
        Self {
            state: AppState::from_config(config),
            should_quit: false,
            cmd_tx,
        }
    }

    fn on_key(&mut self, key: KeyEvent) {
        if self.state.search_active {
            match key.code {
                KeyCode::Esc => self.state.search_active = false,
                KeyCode::Enter => {
                    self.state.search_active = false;
                    self.state.lookup_selected();
                }
                KeyCode::Backspace => self.state.pop_search_char(),
                KeyCode::Down => self.state.select_next(),
                KeyCode::Up => self.state.select_prev(),
                KeyCode::Char(c) => self.state.push_search_char(c),
                _ => {}
            }
            return;
        }

        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('1') => self.state.set_screen(Screen::Overview),
            KeyCode::Char('2') => self.state.set_screen(Screen::Model),
            KeyCode::Char('3') => self.state.set_screen(Screen::Player),
            KeyCode::Char('/') => {
                self.state.set_screen(Screen::Player);
                self.state.search_active = true;
            }
            KeyCode::Enter if self.state.screen == Screen::Player => {
                self.state.lookup_selected()
            }
            KeyCode::Enter | KeyCode::Char('d') if self.state.screen == Screen::Overview => {
                if let Some(name) = self
                    .state
                    .totals
                    .get(self.state.selected)
                    .map(|t| t.name.clone())
                {
                    self.state.set_screen(Screen::Player);
                    self.state.search = name;
                    self.state.lookup_selected();
                }
            }
            KeyCode::Char('b') | KeyCode::Esc => self.state.set_screen(Screen::Overview),
            KeyCode::Char('j') | KeyCode::Down => self.state.select_next(),
            KeyCode::Char('k') | KeyCode::Up => self.state.select_prev(),
            KeyCode::Char('r') => self.request_reload(false),
            KeyCode::Char('R') => self.request_reload(true),
            KeyCode::Char('?') => self.state.help_overlay = !self.state.help_overlay,
            _ => {}
        }
    }

    fn request_reload(&mut self, refresh: bool) {
        let Some(tx) = &self.cmd_tx else {
            self.state.push_log("[INFO] Reload unavailable");
            return;
        };
        if tx.send(WorkerCommand::Reload { refresh }).is_err() {
            self.state.push_log("[WARN] Reload request failed");
        } else {
            let what = if refresh { "Refetch" } else { "Reload" };
            self.state.push_log(format!("[INFO] {what} requested"));
        }
    }
}

fn main() -> Result<()> {
    let log_path = logging::init_file("dashboard.log")?;
    let config = PipelineConfig::from_env().context("read FPL_* configuration")?;
    info!(log = %log_path.display(), season = config.current_season.as_str(), "dashboard starting");

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = ratatui::backend::CrosstermBackend::new(stdout);
    let mut terminal = ratatui::Terminal::new(backend)?;

    let (tx, rx) = mpsc::channel();
    let (cmd_tx, cmd_rx) = mpsc::channel();
    let mut app = App::new(&config, Some(cmd_tx));
    feed::spawn_worker(config, tx, cmd_rx);

    let res = run_app(&mut terminal, &mut app, rx);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        eprintln!("error: {err}");
    }
    Ok(())
}

fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    rx: mpsc::Receiver<Delta>,
) -> io::Result<()> {
    let tick_rate = Duration::from_millis(250);
    let mut last_tick = Instant::now();

    loop {
        while let Ok(delta) = rx.try_recv() {
            apply_delta(&mut app.state, delta);
        }

        terminal.draw(|f| ui(f, app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO);
        if event::poll(timeout)?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            app.on_key(key);
        }

        if last_tick.elapsed() >= tick_rate {
            last_tick = Instant::now();
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

fn ui(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(5),
            Constraint::Length(1),
        ])
        .split(frame.size());

    let header = Paragraph::new(header_text(&app.state))
        .block(Block::default().borders(Borders::BOTTOM));
    frame.render_widget(header, chunks[0]);

    match app.state.screen {
        Screen::Overview => render_overview(frame, chunks[1], &app.state),
        Screen::Model => render_model(frame, chunks[1], &app.state),
        Screen::Player => render_player(frame, chunks[1], &app.state),
    }

    let console = Paragraph::new(console_text(&app.state))
        .block(Block::default().title("Console").borders(Borders::ALL));
    frame.render_widget(console, chunks[2]);

    let footer = Paragraph::new(footer_text(&app.state));
    frame.render_widget(footer, chunks[3]);

    if app.state.help_overlay {
        render_help_overlay(frame, frame.size());
    }
}

fn header_text(state: &AppState) -> String {
    let line1 = format!(
        " FPL FORECAST | {} | Season {} | {}",
        state.screen.label(),
        state.season,
        state.status.to_uppercase()
    );
    let line2 = if state.source.is_empty() {
        " Source: -".to_string()
    } else {
        format!(" Source: {} ({} rows)", state.source, state.records.len())
    };
    format!("{line1}\n{line2}")
}

fn footer_text(state: &AppState) -> String {
    if state.search_active {
        return "Type to search | ↑/↓ Move | Enter Predict | Esc Done".to_string();
    }
    match state.screen {
        Screen::Overview => {
            "1 Overview | 2 Model | 3 Player | j/k Move | Enter Predict player | r Reload | R Refetch | ? Help | q Quit".to_string()
        }
        Screen::Model => {
            "1 Overview | 2 Model | 3 Player | j/k Scroll | r Reload | R Refetch | ? Help | q Quit".to_string()
        }
        Screen::Player => {
            "1 Overview | 2 Model | / Search | j/k Move | Enter Predict | b/Esc Back | ? Help | q Quit".to_string()
        }
    }
}

fn render_overview(frame: &mut Frame, area: Rect, state: &AppState) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);
    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(40),
            Constraint::Length(7),
            Constraint::Length(5),
            Constraint::Min(3),
        ])
        .split(columns[1]);

    let list_block = Block::default()
        .title(format!("Season Totals ({})", state.totals.len()))
        .borders(Borders::ALL);
    let inner = list_block.inner(columns[0]);
    frame.render_widget(list_block, columns[0]);
    render_totals_list(frame, inner, state);

    render_points_histogram(frame, right[0], state);

    let positions = Paragraph::new(position_goals_text(state))
        .block(Block::default().title("Goals by Position").borders(Borders::ALL));
    frame.render_widget(positions, right[1]);

    let relationships = Paragraph::new(relationships_text(state)).block(
        Block::default()
            .title("Correlation with Total Points")
            .borders(Borders::ALL),
    );
    frame.render_widget(relationships, right[2]);

    let xg = Paragraph::new(xg_text(state, right[3].height.saturating_sub(2) as usize))
        .block(Block::default().title("xG vs Goals").borders(Borders::ALL));
    frame.render_widget(xg, right[3]);
}

fn render_totals_list(frame: &mut Frame, area: Rect, state: &AppState) {
    if area.height < 2 {
        return;
    }
    if state.totals.is_empty() {
        frame.render_widget(Paragraph::new("No rows yet"), area);
        return;
    }
    let heading = format!(
        "  {:<24} {:>4} {:>5} {:>3} {:>3} {:>6}",
        "Player", "Pos", "Pts", "G", "A", "xG"
    );
    let visible = area.height.saturating_sub(1) as usize;
    let (start, end) = visible_range(state.selected, state.totals.len(), visible);
    let mut lines = vec![Line::from(Span::styled(
        heading,
        Style::default().add_modifier(Modifier::BOLD),
    ))];
    for (idx, t) in state.totals[start..end].iter().enumerate() {
        let selected = start + idx == state.selected;
        let prefix = if selected { "> " } else { "  " };
        let text = format!(
            "{prefix}{:<24} {:>4} {:>5} {:>3} {:>3} {:>6.2}",
            truncate(&t.name, 24),
            t.position,
            t.total_points,
            t.goals_scored,
            t.assists,
            t.expected_goals
        );
        let style = if selected {
            Style::default().bg(Color::DarkGray)
        } else {
            Style::default()
        };
        lines.push(Line::from(Span::styled(text, style)));
    }
    frame.render_widget(Paragraph::new(lines), area);
}

fn render_points_histogram(frame: &mut Frame, area: Rect, state: &AppState) {
    let block = Block::default()
        .title("Gameweek Points Distribution")
        .borders(Borders::ALL);
    if state.histogram.is_empty() {
        frame.render_widget(Paragraph::new("No data").block(block), area);
        return;
    }
    let bars: Vec<Bar> = state
        .histogram
        .iter()
        .map(|bin| {
            Bar::default()
                .value(bin.count as u64)
                .label(Line::from(format!("{:.0}", bin.start)))
                .style(Style::default().fg(Color::Green))
        })
        .collect();
    let chart = BarChart::default()
        .block(block)
        .data(BarGroup::default().bars(&bars))
        .bar_width(4)
        .bar_gap(1);
    frame.render_widget(chart, area);
}

fn position_goals_text(state: &AppState) -> String {
    if state.position_goals.is_empty() {
        return "No data".to_string();
    }
    state
        .position_goals
        .iter()
        .map(|p| {
            format!(
                "{:<4} players {:>3}  mean {:>5.2}  max {:>3}",
                p.position, p.players, p.mean_goals, p.max_goals
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn relationships_text(state: &AppState) -> String {
    if state.relationships.iter().all(|r| r.samples == 0) {
        return "No data".to_string();
    }
    state
        .relationships
        .iter()
        .map(|r| {
            if r.correlation.is_nan() {
                format!("{:<28} n {:>5}  r   n/a", r.x, r.samples)
            } else {
                format!(
                    "{:<28} n {:>5}  r {:+.2}  slope {:+.3}",
                    r.x, r.samples, r.correlation, r.slope
                )
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn xg_text(state: &AppState, limit: usize) -> String {
    if state.xg_vs_goals.is_empty() {
        return "No data".to_string();
    }
    state
        .xg_vs_goals
        .iter()
        .take(limit.max(1))
        .map(|(name, xg, goals)| {
            format!(
                "{:<22} xG {:>5.2}  G {:>3}  {:+.2}",
                truncate(name, 22),
                xg,
                goals,
                *goals as f64 - xg
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_model(frame: &mut Frame, area: Rect, state: &AppState) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Length(34),
            Constraint::Min(30),
            Constraint::Percentage(35),
        ])
        .split(area);
    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(9), Constraint::Min(3)])
        .split(columns[0]);

    let metrics = Paragraph::new(metrics_text(state))
        .block(Block::default().title("Held-out Metrics").borders(Borders::ALL));
    frame.render_widget(metrics, left[0]);

    let importance = Paragraph::new(importance_text(state, left[1].height.saturating_sub(2) as usize))
        .block(Block::default().title("Feature Importance").borders(Borders::ALL));
    frame.render_widget(importance, left[1]);

    let held_out = Paragraph::new(held_out_text(state, columns[1].height.saturating_sub(2) as usize))
        .block(Block::default().title("Actual vs Predicted").borders(Borders::ALL));
    frame.render_widget(held_out, columns[1]);

    let top_block = Block::default()
        .title(format!("Top Predicted ({})", state.season))
        .borders(Borders::ALL);
    let inner = top_block.inner(columns[2]);
    frame.render_widget(top_block, columns[2]);
    frame.render_widget(Paragraph::new(predictions_text(state, inner.height as usize)), inner);
}

fn metrics_text(state: &AppState) -> String {
    let Some(eval) = &state.evaluation else {
        return "Model not trained yet".to_string();
    };
    let m = &eval.metrics;
    let trees = state.model.as_ref().map(|m| m.n_trees()).unwrap_or(0);
    let cols = state.model.as_ref().map(|m| m.columns().len()).unwrap_or(0);
    [
        format!("MAE:   {}", format_metric(m.mae)),
        format!("RMSE:  {}", format_metric(m.rmse)),
        format!("R2:    {}", format_metric(m.r2)),
        format!("Train: {} rows", eval.split.train.len()),
        format!("Test:  {} rows", m.samples),
        format!("Trees: {trees}  Columns: {cols}"),
    ]
    .join("\n")
}

fn importance_text(state: &AppState, limit: usize) -> String {
    let Some(model) = &state.model else {
        return "-".to_string();
    };
    model
        .feature_importances()
        .into_iter()
        .take(limit.max(1))
        .map(|(col, value)| format!("{:<22} {:>6.3}", truncate(&col, 22), value))
        .collect::<Vec<_>>()
        .join("\n")
}

fn held_out_text(state: &AppState, limit: usize) -> String {
    let Some(eval) = &state.evaluation else {
        return "-".to_string();
    };
    let rows = eval.held_out_by_actual();
    if rows.is_empty() {
        return "No held-out rows".to_string();
    }
    let mut lines = vec![format!("{:<24} {:>6} {:>9}", "Player", "Actual", "Predicted")];
    lines.extend(rows.iter().take(limit.saturating_sub(1).max(1)).map(|r| {
        format!(
            "{:<24} {:>6.0} {:>9.2}",
            truncate(&r.name, 24),
            r.actual,
            r.predicted
        )
    }));
    lines.join("\n")
}

fn predictions_text(state: &AppState, visible: usize) -> String {
    if state.predictions.is_empty() {
        return "No predictions yet".to_string();
    }
    let (start, end) = visible_range(state.selected, state.predictions.len(), visible.max(1));
    state.predictions[start..end]
        .iter()
        .enumerate()
        .map(|(idx, p)| {
            let rank = start + idx;
            let prefix = if rank == state.selected { ">" } else { " " };
            format!(
                "{prefix}{:>3}. {:<22} {:>6.2}",
                rank + 1,
                truncate(&p.name, 22),
                p.predicted_points
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_player(frame: &mut Frame, area: Rect, state: &AppState) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(3)])
        .split(area);
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(rows[1]);

    let cursor = if state.search_active { "_" } else { "" };
    let search_style = if state.search_active {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };
    let search = Paragraph::new(format!("{}{cursor}", state.search))
        .style(search_style)
        .block(Block::default().title("Search (/)").borders(Borders::ALL));
    frame.render_widget(search, rows[0]);

    let matches = state.player_matches();
    let list_block = Block::default()
        .title(format!("Players ({})", matches.len()))
        .borders(Borders::ALL);
    let inner = list_block.inner(columns[0]);
    frame.render_widget(list_block, columns[0]);
    let (start, end) = visible_range(state.selected, matches.len(), inner.height as usize);
    let text = if matches.is_empty() {
        "No matching player".to_string()
    } else {
        matches[start..end]
            .iter()
            .enumerate()
            .map(|(idx, t)| {
                let prefix = if start + idx == state.selected { "> " } else { "  " };
                format!("{prefix}{} ({}, {})", t.name, t.position, t.team)
            })
            .collect::<Vec<_>>()
            .join("\n")
    };
    frame.render_widget(Paragraph::new(text), inner);

    let detail = Paragraph::new(player_detail_text(state))
        .block(Block::default().title("Prediction").borders(Borders::ALL));
    frame.render_widget(detail, columns[1]);
}

fn player_detail_text(state: &AppState) -> String {
    let Some(lookup) = &state.lookup else {
        return "Select a player and press Enter".to_string();
    };
    let mut lines = vec![lookup.name.clone(), String::new()];
    match &lookup.outcome {
        PlayerOutcome::NotFound => {
            lines.push(format!("Player not found in {}", state.season));
        }
        PlayerOutcome::OutsidePreset { position } => {
            lines.push(format!(
                "{position} is outside the {} preset",
                state.preset.label()
            ));
        }
        PlayerOutcome::NoPrediction { rows } => {
            lines.push("No prediction available".to_string());
            lines.push(format!("{rows} rows, none with every feature"));
        }
        PlayerOutcome::Predicted { points, rows } => {
            lines.push(format!("Predicted total points: {points:.2}"));
            lines.push(format!("Averaged over {rows} gameweek rows"));
        }
    }
    if let Some(t) = state
        .totals
        .iter()
        .find(|t| t.name.eq_ignore_ascii_case(&lookup.name))
    {
        lines.push(String::new());
        lines.push(format!("{} | {}", t.position, t.team));
        lines.push(format!(
            "Apps {}  Mins {}  Pts {}",
            t.appearances, t.minutes, t.total_points
        ));
        lines.push(format!(
            "Goals {}  Assists {}  xG {:.2}  xA {:.2}",
            t.goals_scored, t.assists, t.expected_goals, t.expected_assists
        ));
    }
    lines.join("\n")
}

fn console_text(state: &AppState) -> String {
    if state.logs.is_empty() {
        return "No alerts yet".to_string();
    }
    let start = state.logs.len().saturating_sub(3);
    state
        .logs
        .iter()
        .skip(start)
        .cloned()
        .collect::<Vec<_>>()
        .join("\n")
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut out: String = text.chars().take(width.saturating_sub(1)).collect();
    out.push('…');
    out
}

fn visible_range(selected: usize, total: usize, visible: usize) -> (usize, usize) {
    if total == 0 {
        return (0, 0);
    }
    if total <= visible {
        return (0, total);
    }

    let mut start = selected.saturating_sub(visible / 2);
    if start + visible > total {
        start = total - visible;
    }
    (start, start + visible)
}

fn render_help_overlay(frame: &mut Frame, area: Rect) {
    let popup_area = centered_rect(60, 60, area);
    frame.render_widget(Clear, popup_area);

    let text = [
        "FPL Forecast - Help",
        "",
        "Global:",
        "  1 / 2 / 3    Overview / Model / Player",
        "  j/k or ↑/↓   Move/scroll",
        "  r            Reload from store and refit",
        "  R            Refetch seasons and refit",
        "  ?            Toggle help",
        "  q            Quit",
        "",
        "Player:",
        "  /            Search by name",
        "  Enter        Predict highlighted player",
        "  b / Esc      Back",
    ]
    .join("\n");

    let help = Paragraph::new(text)
        .block(Block::default().title("Help").borders(Borders::ALL))
        .style(Style::default());
    frame.render_widget(help, popup_area);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1]);

    horizontal[1]
}
