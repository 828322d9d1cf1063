use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use chrono::Local;
use crossterm::ExecutableCommand;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use miette::IntoDiagnostic;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Gauge, List, ListItem, Paragraph, Wrap};

use crate::app::{ProgressEvent, ProgressSink};
use crate::error::CatalogError;
use crate::generator::SCANNER_MODEL;
use crate::progress::{SCAN_STEPS, ScanStep};
use crate::scan::ScanHandle;
use crate::session::ScanBatch;
use crate::timer::CancelToken;

const EVENTS_MAX: usize = 8;
const POLL_MS: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepMark {
    Done,
    Active,
    Pending,
}

impl StepMark {
    fn symbol(self) -> &'static str {
        match self {
            StepMark::Done => "[x]",
            StepMark::Active => "[>]",
            StepMark::Pending => "[ ]",
        }
    }

    fn color(self) -> Color {
        match self {
            StepMark::Done => Color::Green,
            StepMark::Active => Color::Cyan,
            StepMark::Pending => Color::DarkGray,
        }
    }
}

#[derive(Debug)]
struct DashboardState {
    title: String,
    batch_id: Option<String>,
    steps: Vec<ScanStep>,
    step_index: usize,
    completed_steps: usize,
    percent: f64,
    events: VecDeque<String>,
    finished: Option<ScanBatch>,
}

impl DashboardState {
    fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            batch_id: None,
            steps: SCAN_STEPS.to_vec(),
            step_index: 0,
            completed_steps: 0,
            percent: 0.0,
            events: VecDeque::new(),
            finished: None,
        }
    }

    fn apply(&mut self, event: ProgressEvent) {
        match event {
            ProgressEvent::Message(message) => self.push_event(message),
            ProgressEvent::Started {
                batch_id, config, ..
            } => {
                self.push_event(format!(
                    "{batch_id}: {} section(s), {}, {}",
                    config.num_sections, config.light_mode, config.resolution
                ));
                self.batch_id = Some(batch_id);
                self.percent = 0.0;
                self.step_index = 0;
                self.completed_steps = 0;
            }
            ProgressEvent::Step {
                step,
                step_index,
                completed_steps,
                percent,
                ..
            } => {
                if step_index != self.step_index || self.events.is_empty() {
                    self.push_event(step.label.to_string());
                }
                self.step_index = step_index;
                self.completed_steps = completed_steps;
                self.percent = self.percent.max(percent);
            }
            ProgressEvent::Completed { batch } => {
                self.percent = 100.0;
                self.completed_steps = self.steps.len();
                self.push_event(format!("{} completed", batch.id));
                self.finished = Some(*batch);
            }
            ProgressEvent::Download { label, percent } => {
                self.batch_id = Some(label);
                self.percent = self.percent.max(percent);
            }
            ProgressEvent::DownloadCompleted { label } => {
                self.percent = 100.0;
                self.push_event(format!("{label} downloaded"));
            }
        }
    }

    fn marks(&self) -> Vec<StepMark> {
        (0..self.steps.len())
            .map(|index| {
                if index < self.completed_steps {
                    StepMark::Done
                } else if index == self.step_index {
                    StepMark::Active
                } else {
                    StepMark::Pending
                }
            })
            .collect()
    }

    fn push_event(&mut self, message: String) {
        self.events
            .push_back(format!("[{}] {message}", Local::now().format("%H:%M:%S")));
        while self.events.len() > EVENTS_MAX {
            self.events.pop_front();
        }
    }
}

struct DashboardProgress {
    state: Arc<Mutex<DashboardState>>,
}

impl ProgressSink for DashboardProgress {
    fn event(&self, event: ProgressEvent) {
        if let Ok(mut state) = self.state.lock() {
            state.apply(event);
        }
    }
}

pub struct Dashboard {
    state: Arc<Mutex<DashboardState>>,
    show_steps: bool,
}

impl Dashboard {
    pub fn for_scan() -> Self {
        Self {
            state: Arc::new(Mutex::new(DashboardState::new("Scan"))),
            show_steps: true,
        }
    }

    pub fn for_download() -> Self {
        Self {
            state: Arc::new(Mutex::new(DashboardState::new("Download"))),
            show_steps: false,
        }
    }

    pub fn sink(&self) -> Arc<dyn ProgressSink> {
        Arc::new(DashboardProgress {
            state: self.state.clone(),
        })
    }

    pub fn watch_scan(&mut self, mut handle: ScanHandle) -> miette::Result<Option<ScanBatch>> {
        let mut terminal = enter_terminal()?;
        let outcome = loop {
            self.draw(&mut terminal)?;
            if let Some(result) = handle.try_result() {
                break result.map(Some);
            }
            if cancel_requested()? {
                handle.cancel();
                break Ok(None);
            }
        };
        if matches!(outcome, Ok(Some(_))) {
            self.draw(&mut terminal)?;
            wait_for_key()?;
        }
        leave_terminal()?;
        outcome.map_err(miette::Report::new)
    }

    /// Runs `f` on a worker thread while drawing the progress it reports.
    /// Quitting trips the token handed to `f` and waits for the worker.
    pub fn run<F, R>(&mut self, f: F) -> miette::Result<R>
    where
        F: FnOnce(Arc<dyn ProgressSink>, CancelToken) -> Result<R, CatalogError> + Send + 'static,
        R: Send + 'static,
    {
        let mut terminal = enter_terminal()?;
        let (tx, rx) = std::sync::mpsc::channel();
        let sink = self.sink();
        let cancel = CancelToken::new();
        let worker_cancel = cancel.clone();
        let handle = thread::spawn(move || tx.send(f(sink, worker_cancel)));

        loop {
            self.draw(&mut terminal)?;
            if let Ok(result) = rx.try_recv() {
                leave_terminal()?;
                handle.join().ok();
                return result.map_err(miette::Report::new);
            }
            if cancel_requested()? {
                break;
            }
        }

        cancel.cancel();
        leave_terminal()?;
        handle.join().ok();
        match rx.try_recv() {
            Ok(result) => result.map_err(miette::Report::new),
            Err(_) => Err(miette::Report::msg("aborted")),
        }
    }

    fn draw(&self, terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> miette::Result<()> {
        let Ok(state) = self.state.lock() else {
            return Ok(());
        };
        terminal
            .draw(|frame| draw_dashboard(frame, &state, self.show_steps))
            .into_diagnostic()?;
        Ok(())
    }
}

fn enter_terminal() -> miette::Result<Terminal<CrosstermBackend<io::Stdout>>> {
    let mut stdout = io::stdout();
    enable_raw_mode().into_diagnostic()?;
    stdout.execute(EnterAlternateScreen).into_diagnostic()?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout)).into_diagnostic()?;
    terminal.clear().into_diagnostic()?;
    Ok(terminal)
}

fn leave_terminal() -> miette::Result<()> {
    disable_raw_mode().into_diagnostic()?;
    io::stdout()
        .execute(LeaveAlternateScreen)
        .into_diagnostic()?;
    Ok(())
}

fn cancel_requested() -> miette::Result<bool> {
    if !event::poll(Duration::from_millis(POLL_MS)).into_diagnostic()? {
        return Ok(false);
    }
    if let Event::Key(key) = event::read().into_diagnostic()? {
        return Ok(key.kind == KeyEventKind::Press
            && matches!(key.code, KeyCode::Char('q') | KeyCode::Esc));
    }
    Ok(false)
}

fn wait_for_key() -> miette::Result<()> {
    loop {
        if let Event::Key(key) = event::read().into_diagnostic()? {
            if key.kind == KeyEventKind::Press {
                return Ok(());
            }
        }
    }
}

fn draw_dashboard(frame: &mut ratatui::Frame, state: &DashboardState, show_steps: bool) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(2),
            Constraint::Length(3),
            Constraint::Min(6),
            Constraint::Length(1),
        ])
        .split(frame.area());

    let header = Line::from(vec![
        Span::styled(
            "THINSLICE",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" "),
        Span::styled(env!("CARGO_PKG_VERSION"), Style::default().fg(Color::Gray)),
        Span::raw(format!("   {}   Scanner: {SCANNER_MODEL}   ", state.title)),
        Span::styled(
            state.batch_id.clone().unwrap_or_else(|| "-".to_string()),
            Style::default().fg(Color::Yellow),
        ),
    ]);
    frame.render_widget(
        Paragraph::new(header).block(Block::default().borders(Borders::BOTTOM)),
        chunks[0],
    );

    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title("Progress"))
        .gauge_style(Style::default().fg(Color::Cyan))
        .ratio((state.percent / 100.0).clamp(0.0, 1.0))
        .label(format!("{:.0}%", state.percent));
    frame.render_widget(gauge, chunks[1]);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(chunks[2]);

    if show_steps {
        let items: Vec<ListItem> = state
            .steps
            .iter()
            .zip(state.marks())
            .map(|(step, mark)| {
                ListItem::new(Line::from(vec![
                    Span::styled(mark.symbol(), Style::default().fg(mark.color())),
                    Span::raw(format!(" {}", step.label)),
                ]))
            })
            .collect();
        frame.render_widget(
            List::new(items).block(Block::default().borders(Borders::ALL).title("Steps")),
            body[0],
        );
    } else {
        frame.render_widget(
            Paragraph::new("Simulated transfer").block(Block::default().borders(Borders::ALL)),
            body[0],
        );
    }

    let mut lines: Vec<Line> = state
        .events
        .iter()
        .map(|event| Line::from(event.clone()))
        .collect();
    if let Some(output) = state.finished.as_ref().and_then(|batch| batch.output.as_ref()) {
        lines.push(Line::from(Span::styled(
            format!(
                "{} GB, {} frames, {}, checksum {}",
                output.total_size_display(),
                output.total_frames,
                output.scan_time_display(),
                &output.checksum[..output.checksum.len().min(12)]
            ),
            Style::default().fg(Color::Green),
        )));
    }
    frame.render_widget(
        Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL).title("Events"))
            .wrap(Wrap { trim: true }),
        body[1],
    );

    let footer = if state.finished.is_some() {
        "any key: close"
    } else {
        "q/Esc: cancel"
    };
    frame.render_widget(
        Paragraph::new(Span::styled(footer, Style::default().fg(Color::Gray))),
        chunks[3],
    );
}
