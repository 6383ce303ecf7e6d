#![cfg(feature = "tui")]

use crate::controller::{Controller, Field, FormState, Update};
use crate::generator::JobDescriptionGenerator;
use crate::prompt::JobInput;
use crate::system::{self, BackgroundClipboard, Clipboard, CopyFeedback, SystemClipboard};
use crate::theme::{FilePreferences, Palette, PreferenceStore, Rgb, ThemeState};
use crate::paths;
use anyhow::Context;
use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use ratatui::backend::{Backend, CrosstermBackend};
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::{Frame, Terminal};
use std::io;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

const SPINNER: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const SYSTEM_THEME_POLL: Duration = Duration::from_secs(3);
/// Skills is multi-line (Alt-Enter); its box shows three lines.
const SKILLS_HEIGHT: u16 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Focus {
    Field(Field),
    Submit,
}

impl Focus {
    fn next(self) -> Self {
        match self {
            Focus::Field(Field::Title) => Focus::Field(Field::Skills),
            Focus::Field(Field::Skills) => Focus::Field(Field::Experience),
            Focus::Field(Field::Experience) => Focus::Submit,
            Focus::Submit => Focus::Field(Field::Title),
        }
    }

    fn prev(self) -> Self {
        match self {
            Focus::Field(Field::Title) => Focus::Submit,
            Focus::Field(Field::Skills) => Focus::Field(Field::Title),
            Focus::Field(Field::Experience) => Focus::Field(Field::Skills),
            Focus::Submit => Focus::Field(Field::Experience),
        }
    }
}

/// View-only state: focus, theme, copy feedback. The form itself lives in [`Controller`].
struct FormView<S, C> {
    focus: Focus,
    theme: ThemeState<S>,
    clipboard: C,
    copied: CopyFeedback,
    notice: Option<String>,
    scroll: u16,
    frame: usize,
}

impl<S: PreferenceStore, C: Clipboard> FormView<S, C> {
    fn new(theme: ThemeState<S>, clipboard: C) -> Self {
        Self {
            focus: Focus::Field(Field::Title),
            theme,
            clipboard,
            copied: CopyFeedback::default(),
            notice: None,
            scroll: 0,
            frame: 0,
        }
    }

    /// Returns true when the user asked to quit.
    fn handle_key(&mut self, key: KeyEvent, controller: &mut Controller, now: Instant) -> bool {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Esc => return true,
            KeyCode::Char('c') if ctrl => return true,
            KeyCode::Char('t') if ctrl => match self.theme.toggle() {
                Ok(_) => self.notice = None,
                Err(e) => {
                    tracing::warn!("{e:#}");
                    self.notice = Some(format!("Could not save theme: {e}"));
                }
            },
            KeyCode::Char('y') if ctrl => self.copy(controller.state(), now),
            KeyCode::Tab => self.focus = self.focus.next(),
            KeyCode::BackTab => self.focus = self.focus.prev(),
            KeyCode::PageDown => self.scroll = self.scroll.saturating_add(5),
            KeyCode::PageUp => self.scroll = self.scroll.saturating_sub(5),
            KeyCode::Enter if key.modifiers.contains(KeyModifiers::ALT) => {
                if self.focus == Focus::Field(Field::Skills) {
                    if let Some(s) = controller.field_mut(Field::Skills) {
                        s.push('\n');
                    }
                }
            }
            KeyCode::Enter => {
                if let crate::controller::Submitted::Started(_) = controller.submit() {
                    self.scroll = 0;
                }
            }
            KeyCode::Char(c) if !ctrl => {
                if let Focus::Field(f) = self.focus {
                    if let Some(s) = controller.field_mut(f) {
                        s.push(c);
                    }
                }
            }
            KeyCode::Backspace => {
                if let Focus::Field(f) = self.focus {
                    if let Some(s) = controller.field_mut(f) {
                        s.pop();
                    }
                }
            }
            _ => {}
        }
        false
    }

    fn copy(&mut self, state: &FormState, now: Instant) {
        if state.display.is_empty() {
            return;
        }
        match self.copied.copy(&mut self.clipboard, &state.display, now) {
            Ok(()) => self.notice = None,
            Err(e) => {
                tracing::warn!("copy failed: {e:#}");
                self.notice = Some(format!("Copy failed: {e}"));
            }
        }
    }

    fn on_copy_result(&mut self, res: anyhow::Result<()>) {
        if let Err(e) = res {
            tracing::warn!("copy failed: {e:#}");
            self.copied.clear();
            self.notice = Some(format!("Copy failed: {e}"));
        }
    }

    fn on_system_theme(&mut self, system: Option<crate::theme::Theme>) {
        let Some(t) = system else { return };
        match self.theme.on_system_change(t) {
            Ok(true) => tracing::debug!(theme = %t, "following system theme"),
            Ok(false) => {}
            Err(e) => tracing::warn!("failed to read theme preference: {e:#}"),
        }
    }
}

pub async fn run_tui(generator: JobDescriptionGenerator, input: JobInput) -> anyhow::Result<()> {
    let store = FilePreferences::new(paths::preferences_path()?);
    let mut system_theme = system::watch_color_scheme(SYSTEM_THEME_POLL);
    let initial_system = *system_theme.borrow_and_update();
    let theme = ThemeState::load(store, initial_system).context("failed to load theme preference")?;

    tracing::info!(provider = generator.provider_name(), model = generator.model(), "starting form");
    let mut controller = Controller::new(generator).with_input(input);
    let (clipboard, mut copy_done) = BackgroundClipboard::new(SystemClipboard);
    let mut view = FormView::new(theme, clipboard);

    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("enter alt screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;

    let (ev_tx, mut ev_rx) = mpsc::unbounded_channel::<Event>();
    std::thread::spawn(move || {
        while let Ok(ev) = crossterm::event::read() {
            if ev_tx.send(ev).is_err() {
                break;
            }
        }
    });

    let mut ticker = tokio::time::interval(Duration::from_millis(33));

    let res = loop {
        tokio::select! {
            _ = ticker.tick() => {
                view.frame = view.frame.wrapping_add(1);
                if let Err(e) = draw(&mut terminal, &view, controller.state()) {
                    break Err(e);
                }
            }
            Some(ev) = ev_rx.recv() => {
                if let Event::Key(key) = ev {
                    if key.kind == KeyEventKind::Press && view.handle_key(key, &mut controller, Instant::now()) {
                        break Ok(());
                    }
                }
            }
            ev = controller.next_event() => {
                if let Update::Failed = controller.apply(ev) {
                    view.scroll = 0;
                }
            }
            Some(res) = copy_done.recv() => view.on_copy_result(res),
            Ok(()) = system_theme.changed() => {
                let probed = *system_theme.borrow_and_update();
                view.on_system_theme(probed);
            }
        }
    };

    disable_raw_mode().ok();
    execute!(terminal.backend_mut(), LeaveAlternateScreen).ok();
    terminal.show_cursor().ok();

    res
}

fn draw<B: Backend, S: PreferenceStore, C: Clipboard>(
    terminal: &mut Terminal<B>,
    view: &FormView<S, C>,
    state: &FormState,
) -> anyhow::Result<()> {
    let now = Instant::now();
    terminal.draw(|f| render(f, view, state, now))?;
    Ok(())
}

fn rgb((r, g, b): Rgb) -> Color {
    Color::Rgb(r, g, b)
}

fn render<S: PreferenceStore, C: Clipboard>(f: &mut Frame, view: &FormView<S, C>, state: &FormState, now: Instant) {
    let p: Palette = view.theme.palette();
    let root = Style::default().bg(rgb(p.background)).fg(rgb(p.foreground));
    let border = Style::default().fg(rgb(p.border));
    f.render_widget(Block::default().style(root), f.area());

    let status_height = if state.loading || state.error.is_some() || view.notice.is_some() { 3 } else { 0 };
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(2),
            Constraint::Length(3),
            Constraint::Length(SKILLS_HEIGHT),
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Length(status_height),
            Constraint::Min(3),
            Constraint::Length(1),
        ])
        .split(f.area());

    let header = Line::from(vec![
        Span::styled(
            "Smart Job Description Generator",
            Style::default().fg(rgb(p.accent)).add_modifier(Modifier::BOLD),
        ),
        Span::styled(format!("   theme: {} ", view.theme.current()), Style::default().fg(rgb(p.muted))),
    ]);
    f.render_widget(Paragraph::new(header).alignment(Alignment::Center), chunks[0]);

    for (i, field) in Field::ALL.into_iter().enumerate() {
        let area = chunks[1 + i];
        let focused = view.focus == Focus::Field(field);
        let value = match field {
            Field::Title => &state.input.title,
            Field::Skills => &state.input.skills,
            Field::Experience => &state.input.experience,
        };
        let inner_rows = area.height.saturating_sub(2).max(1) as usize;
        let lines: Vec<&str> = value.split('\n').collect();
        // Keep the line being typed visible.
        let skip = lines.len().saturating_sub(inner_rows);
        let body = if value.is_empty() {
            Text::from(Span::styled(
                field.placeholder(),
                Style::default().fg(rgb(p.muted)).add_modifier(Modifier::ITALIC),
            ))
        } else {
            Text::from(lines[skip..].iter().map(|l| Line::raw(*l)).collect::<Vec<_>>())
        };
        let block_style = if focused { Style::default().fg(rgb(p.accent)) } else { border };
        let mut w = Paragraph::new(body)
            .block(Block::default().borders(Borders::ALL).border_style(block_style).title(field.label()));
        if state.loading {
            w = w.style(Style::default().fg(rgb(p.muted)));
        }
        f.render_widget(w, area);

        if focused && !state.loading {
            let last = lines.last().copied().unwrap_or_default();
            let col = u16::try_from(last.chars().count()).unwrap_or(u16::MAX);
            let row = u16::try_from(lines.len() - 1 - skip).unwrap_or(0);
            let x = area.x.saturating_add(1).saturating_add(col);
            let max_x = area.x.saturating_add(area.width.saturating_sub(2));
            f.set_cursor_position((x.min(max_x), area.y.saturating_add(1).saturating_add(row)));
        }
    }

    let label = if state.loading { "Generating..." } else { "✨ Generate Description" };
    let mut button_style = Style::default().fg(rgb(p.background)).bg(rgb(p.accent)).add_modifier(Modifier::BOLD);
    if !state.can_submit() {
        button_style = Style::default().fg(rgb(p.muted)).add_modifier(Modifier::DIM);
    }
    let button_border = if view.focus == Focus::Submit { Style::default().fg(rgb(p.accent)) } else { border };
    f.render_widget(
        Paragraph::new(Span::styled(format!(" {label} "), button_style))
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL).border_style(button_border)),
        chunks[4],
    );

    if let Some(err) = &state.error {
        let banner = Line::from(vec![
            Span::styled("Oops! ", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(err.as_str()),
        ]);
        f.render_widget(
            Paragraph::new(banner)
                .alignment(Alignment::Center)
                .style(Style::default().fg(rgb(p.error_fg)).bg(rgb(p.error_bg)))
                .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(rgb(p.error_fg)))),
            chunks[5],
        );
    } else if state.loading {
        let spin = SPINNER[view.frame % SPINNER.len()];
        f.render_widget(
            Paragraph::new(format!("{spin} Writing your job description..."))
                .alignment(Alignment::Center)
                .style(Style::default().fg(rgb(p.accent))),
            chunks[5],
        );
    } else if let Some(notice) = &view.notice {
        f.render_widget(
            Paragraph::new(notice.as_str()).alignment(Alignment::Center).style(Style::default().fg(rgb(p.error_fg))),
            chunks[5],
        );
    }

    if !state.display.is_empty() {
        render_result(f, chunks[6], view, state, &p, now);
    }

    let help = "Tab/Shift-Tab: field  Enter: generate  Alt-Enter: new line  Ctrl-Y: copy  Ctrl-T: theme  PgUp/PgDn: scroll  Esc: quit";
    f.render_widget(Paragraph::new(help).style(Style::default().fg(rgb(p.muted))), chunks[7]);
}

fn render_result<S: PreferenceStore, C: Clipboard>(
    f: &mut Frame,
    area: Rect,
    view: &FormView<S, C>,
    state: &FormState,
    p: &Palette,
    now: Instant,
) {
    let badge = if view.copied.is_active(now) {
        Span::styled(" Copied! ", Style::default().fg(rgb(p.success)).add_modifier(Modifier::BOLD))
    } else {
        Span::styled(" Copy (Ctrl-Y) ", Style::default().fg(rgb(p.muted)))
    };

    let mut text = Text::default();
    for line in state.display.lines() {
        let styled = if line.starts_with('#') {
            Line::styled(line, Style::default().fg(rgb(p.accent)).add_modifier(Modifier::BOLD))
        } else {
            Line::raw(line)
        };
        text.lines.push(styled);
    }

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(rgb(p.border)))
        .title("Generated Job Description")
        .title_top(Line::from(badge).right_aligned());

    f.render_widget(
        Paragraph::new(text).block(block).wrap(Wrap { trim: false }).scroll((view.scroll, 0)),
        area,
    );
}
