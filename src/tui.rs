use color_eyre::{Result, eyre::WrapErr};
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
};
use log::{debug, info, warn};
use ratatui::{
    DefaultTerminal,
    buffer::Buffer,
    crossterm::event::{
        Event, KeyCode, KeyEventKind, KeyModifiers, MouseButton, MouseEventKind, poll, read,
    },
    layout::Flex,
    prelude::*,
    widgets::{
        Axis, Block, Chart, Clear, Dataset, FrameExt, GraphType, Paragraph,
        canvas::{Canvas, Line as CanvasLine},
    },
};
use ratatui_explorer::{FileExplorer, Theme as ExplorerTheme};
use std::{
    io,
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use crate::{
    analyzer::SpectrogramHistory,
    app::{Session, UiEvent},
    audio_output::AudioOutput,
    builtin_themes,
    config::Config,
    tuning::{NoteName, PIANO_KEYS},
    viewport::ZoomAxis,
};

/// Colours shared by every part of the screen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlobalTheme {
    pub background: Color,
    pub foreground: Color,
    pub highlight: Option<Color>,
}

impl Default for GlobalTheme {
    fn default() -> Self {
        Self {
            background: Color::Reset,
            foreground: Color::Reset,
            highlight: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Theme {
    pub global: GlobalTheme,
    pub waveform: Color,
    pub playhead: Color,
    /// Hottest spectrogram colour; silence is drawn in the background colour.
    pub spectrogram: Color,
    pub keys: Color,
    pub notes: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            global: GlobalTheme::default(),
            waveform: Color::Cyan,
            playhead: Color::Red,
            spectrogram: Color::Yellow,
            keys: Color::Magenta,
            notes: Color::Green,
        }
    }
}

impl Theme {
    /// Derives every element colour from the global palette.
    pub fn apply_global_as_default(&mut self) {
        let accent = self.global.highlight.unwrap_or(self.global.foreground);
        self.waveform = self.global.foreground;
        self.playhead = accent;
        self.spectrogram = accent;
        self.keys = accent;
        self.notes = accent;
    }

    /// Heatmap colour for a normalized magnitude.
    pub fn heat(&self, level: f32) -> Color {
        blend(self.global.background, self.spectrogram, level)
    }

    fn base(&self) -> Style {
        Style::default()
            .fg(self.global.foreground)
            .bg(self.global.background)
    }
}

/// Linear mix of two RGB colours. Anything else snaps to the nearer end.
fn blend(from: Color, to: Color, t: f32) -> Color {
    let t = t.clamp(0.0, 1.0);
    match (from, to) {
        (Color::Rgb(r0, g0, b0), Color::Rgb(r1, g1, b1)) => {
            let mix = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t).round() as u8;
            Color::Rgb(mix(r0, r1), mix(g0, g1), mix(b0, b1))
        }
        _ if t >= 0.5 => to,
        _ => from,
    }
}

fn format_time(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{}:{:02}.{}", secs / 60, secs % 60, d.subsec_millis() / 100)
}

/// Loudest bin of the `row`-th of `rows` equal bands, row 0 holding the lowest
/// frequencies.
fn band_level(bins: &[(f32, f32)], row: usize, rows: usize) -> f32 {
    if rows == 0 || row * bins.len() / rows >= bins.len() {
        return 0.0;
    }
    let lo = row * bins.len() / rows;
    let hi = ((row + 1) * bins.len() / rows).clamp(lo + 1, bins.len());
    bins[lo..hi].iter().map(|&(_, m)| m).fold(0.0, f32::max)
}

/// Past frames as a heatmap, newest at the right edge.
struct SpectrogramView<'a> {
    history: &'a SpectrogramHistory,
    theme: &'a Theme,
}

impl Widget for SpectrogramView<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.is_empty() {
            return;
        }
        let width = area.width as usize;
        let rows = area.height as usize;
        let skip = self.history.len().saturating_sub(width);
        let first_x = area.x + (width - (self.history.len() - skip)) as u16;

        for (i, frame) in self.history.iter().skip(skip).enumerate() {
            let x = first_x + i as u16;
            for row in 0..rows {
                let y = area.bottom() - 1 - row as u16;
                if let Some(cell) = buf.cell_mut((x, y)) {
                    cell.set_bg(self.theme.heat(band_level(frame.bins(), row, rows)));
                }
            }
        }
    }
}

/// One row of piano keys lit by intensity, A0 on the left.
struct KeyboardView<'a> {
    intensities: &'a [f32; PIANO_KEYS],
    theme: &'a Theme,
}

impl Widget for KeyboardView<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.is_empty() {
            return;
        }
        let width = area.width as usize;
        for col in 0..width {
            let lo = col * PIANO_KEYS / width;
            let hi = ((col + 1) * PIANO_KEYS / width).clamp(lo + 1, PIANO_KEYS);
            let level = self.intensities[lo..hi].iter().copied().fold(0.0, f32::max);
            let sharp = (lo..hi).all(|key| NoteName::from_key(key).is_sharp());
            let (symbol, unlit) = if sharp {
                ("▄", self.theme.global.background)
            } else {
                ("█", self.theme.global.foreground)
            };
            for y in area.top()..area.bottom() {
                if let Some(cell) = buf.cell_mut((area.x + col as u16, y)) {
                    cell.set_symbol(symbol)
                        .set_fg(blend(unlit, self.theme.keys, level));
                }
            }
        }
    }
}

struct App {
    session: Session,
    explorer: FileExplorer,
    show_explorer: bool,
    theme: Theme,
    tick_rate: Duration,
    /// Inside of the waveform block as last drawn; clicks are mapped against it.
    wave_area: Rect,
    status: Option<String>,
}

impl App {
    fn new(session: Session, explorer: FileExplorer, theme: Theme, tick_rate: Duration) -> Self {
        Self {
            session,
            explorer,
            show_explorer: false,
            theme,
            tick_rate,
            wave_area: Rect::default(),
            status: None,
        }
    }

    fn draw(&mut self, f: &mut Frame) {
        let area = f.area();
        f.render_widget(Block::new().style(self.theme.base()), area);

        let [header, wave, scope, spectrogram, keyboard, help] = Layout::vertical([
            Constraint::Length(1),
            Constraint::Percentage(40),
            Constraint::Length(7),
            Constraint::Min(4),
            Constraint::Length(3),
            Constraint::Length(1),
        ])
        .areas(area);

        self.render_header(f, header);
        self.render_waveform(f, wave);
        self.render_scope(f, scope);

        let block = Block::bordered().title("spectrogram").style(self.theme.base());
        let inner = block.inner(spectrogram);
        f.render_widget(block, spectrogram);
        f.render_widget(
            SpectrogramView {
                history: self.session.current_spectrogram_history(),
                theme: &self.theme,
            },
            inner,
        );

        let block = Block::bordered().title("keys").style(self.theme.base());
        let inner = block.inner(keyboard);
        f.render_widget(block, keyboard);
        f.render_widget(
            KeyboardView {
                intensities: self.session.key_intensities(),
                theme: &self.theme,
            },
            inner,
        );

        f.render_widget(
            Paragraph::new(
                "space play/stop  s stop  ←/→ scroll  +/- zoom  ↑/↓ amplitude  click seek  e open  q quit",
            )
            .style(self.theme.base().add_modifier(Modifier::DIM)),
            help,
        );

        // render explorer
        if self.show_explorer {
            let area = Self::popup_area(area, 50, 70);
            f.render_widget(Clear, area);
            f.render_widget_ref(self.explorer.widget(), area);
        }
    }

    fn render_header(&self, frame: &mut Frame, area: Rect) {
        let name = self
            .session
            .file_path()
            .and_then(|p| p.file_name())
            .map_or_else(|| "no file (press e)".to_string(), |n| n.to_string_lossy().into_owned());
        let state = if self.session.is_playing() { "▶" } else { "■" };
        let notes = self
            .session
            .current_dominant_notes()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ");

        let mut spans = vec![
            Span::raw(format!("{state} {name}  ")),
            Span::raw(format!(
                "{} / {}  ",
                format_time(self.session.elapsed()),
                format_time(self.session.duration())
            )),
            Span::styled(notes, Style::default().fg(self.theme.notes).bold()),
        ];
        if let Some(status) = &self.status {
            spans.push(Span::styled(
                format!("  {status}"),
                Style::default().fg(self.theme.playhead),
            ));
        }
        frame.render_widget(Paragraph::new(Line::from(spans)).style(self.theme.base()), area);
    }

    fn render_waveform(&mut self, frame: &mut Frame, area: Rect) {
        let viewport = self.session.viewport();
        let block = Block::bordered()
            .title(format!(
                "waveform  {:.2}x / {:.2}x",
                viewport.horizontal_zoom(),
                viewport.vertical_zoom()
            ))
            .style(self.theme.base());
        let inner = block.inner(area);
        self.wave_area = inner;

        let width = inner.width as usize;
        let height = inner.height as usize;
        let mid = (height / 2) as f64;
        let viewport = self.session.viewport();
        let offsets: Vec<(f64, f64)> = self
            .session
            .render_columns(width)
            .iter()
            .map(|col| (col.x as f64, viewport.column_offset(col.mean, height)))
            .collect();
        let playhead = self.session.playhead_pixel(width);
        let (wave_color, head_color) = (self.theme.waveform, self.theme.playhead);

        let canvas = Canvas::default()
            .block(block)
            .marker(symbols::Marker::Braille)
            .background_color(self.theme.global.background)
            .x_bounds([0.0, width as f64])
            .y_bounds([0.0, height as f64])
            .paint(move |ctx| {
                for &(x, y) in &offsets {
                    ctx.draw(&CanvasLine::new(x, mid, x, y, wave_color));
                }
                if let Some(px) = playhead {
                    let x = px as f64;
                    ctx.draw(&CanvasLine::new(x, 0.0, x, height as f64, head_color));
                }
            });
        frame.render_widget(canvas, area);
    }

    /// The raw samples the analyzer just looked at.
    fn render_scope(&self, frame: &mut Frame, area: Rect) {
        let window = &self.session.analysis().window;
        let step = (window.len() / (area.width as usize * 2).max(1)).max(1);
        let points: Vec<(f64, f64)> = window
            .iter()
            .enumerate()
            .step_by(step)
            .map(|(i, &s)| (i as f64, s as f64))
            .collect();
        let datasets = vec![
            Dataset::default()
                .marker(symbols::Marker::Braille)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(self.theme.waveform))
                .data(&points),
        ];

        let chart = Chart::new(datasets)
            .block(Block::bordered().title("scope").style(self.theme.base()))
            .x_axis(Axis::default().bounds([0., window.len().max(1) as f64]))
            .y_axis(Axis::default().bounds([-1., 1.]));

        frame.render_widget(chart, area);
    }

    fn run(mut self, mut terminal: DefaultTerminal) -> Result<()> {
        let mut last_tick = Instant::now();
        loop {
            terminal.draw(|f| self.draw(f))?;

            let timeout = self.tick_rate.saturating_sub(last_tick.elapsed());
            if poll(timeout)? {
                let event = read()?;
                if self.handle_event(&event)? {
                    return Ok(());
                }
            }

            if last_tick.elapsed() >= self.tick_rate {
                self.session.tick(self.wave_area.width as usize);
                self.take_events();
                last_tick = Instant::now();
            }
        }
    }

    /// Returns `true` when the user asked to quit.
    fn handle_event(&mut self, event: &Event) -> Result<bool> {
        match event {
            Event::Key(key) if key.kind == KeyEventKind::Press => {
                if self.show_explorer {
                    match key.code {
                        KeyCode::Char('q') => return Ok(true),
                        KeyCode::Char('e') | KeyCode::Esc => self.show_explorer = false,
                        KeyCode::Enter => self.select_file(),
                        _ => self.explorer.handle(event)?,
                    }
                    return Ok(false);
                }
                let width = self.wave_area.width as usize;
                match key.code {
                    KeyCode::Char('q') => return Ok(true),
                    KeyCode::Char('e') => self.show_explorer = true,
                    KeyCode::Char(' ') => {
                        let result = self.session.toggle();
                        self.report(result);
                    }
                    KeyCode::Char('s') => {
                        let result = self.session.stop();
                        self.report(result);
                    }
                    KeyCode::Home => self.session.seek(0),
                    KeyCode::Left => self.session.on_scroll(-1.0, width),
                    KeyCode::Right => self.session.on_scroll(1.0, width),
                    KeyCode::Up => self.session.on_zoom_gesture(1.0, ZoomAxis::Vertical, width),
                    KeyCode::Down => self.session.on_zoom_gesture(-1.0, ZoomAxis::Vertical, width),
                    KeyCode::Char('+') | KeyCode::Char('=') => {
                        self.session.on_zoom_gesture(1.0, ZoomAxis::Horizontal, width)
                    }
                    KeyCode::Char('-') => {
                        self.session.on_zoom_gesture(-1.0, ZoomAxis::Horizontal, width)
                    }
                    _ => (),
                }
            }
            Event::Mouse(mouse) if !self.show_explorer => {
                let width = self.wave_area.width as usize;
                let inside = self.wave_area.contains(Position::new(mouse.column, mouse.row));
                let zoom = mouse.modifiers.contains(KeyModifiers::CONTROL);
                match mouse.kind {
                    MouseEventKind::Down(MouseButton::Left) if inside => {
                        let x = (mouse.column - self.wave_area.x) as usize;
                        self.session.on_click(x, width);
                    }
                    MouseEventKind::ScrollUp if zoom => {
                        self.session.on_zoom_gesture(1.0, ZoomAxis::Horizontal, width)
                    }
                    MouseEventKind::ScrollDown if zoom => {
                        self.session.on_zoom_gesture(-1.0, ZoomAxis::Horizontal, width)
                    }
                    MouseEventKind::ScrollUp => self.session.on_scroll(-1.0, width),
                    MouseEventKind::ScrollDown => self.session.on_scroll(1.0, width),
                    _ => (),
                }
            }
            _ => (),
        }
        Ok(false)
    }

    fn select_file(&mut self) {
        let file = self.explorer.current();
        if !file.is_file() {
            return;
        }
        let path = file.path().clone();
        self.show_explorer = false;
        match self.session.load(&path) {
            Ok(()) => self.status = None,
            Err(err) => {
                warn!("could not load {}: {err}", path.display());
                self.status = Some(err.to_string());
            }
        }
    }

    fn report<E: std::fmt::Display>(&mut self, result: std::result::Result<(), E>) {
        match result {
            Ok(()) => self.status = None,
            Err(err) => self.status = Some(err.to_string()),
        }
    }

    fn take_events(&mut self) {
        for event in self.session.drain_events() {
            match event {
                UiEvent::PlaybackError(err) => {
                    self.status = Some(format!("playback stopped: {err}"));
                }
                other => debug!("{other:?}"),
            }
        }
    }

    fn popup_area(area: Rect, percent_x: u16, percent_y: u16) -> Rect {
        let vertical = Layout::vertical([Constraint::Percentage(percent_y)]).flex(Flex::Center);
        let horizontal = Layout::horizontal([Constraint::Percentage(percent_x)]).flex(Flex::Center);
        let [area] = vertical.areas(area);
        let [area] = horizontal.areas(area);
        area
    }
}

pub fn run(output: Arc<dyn AudioOutput>, config: Config, input: Option<PathBuf>) -> Result<()> {
    let theme = builtin_themes::get_by_name(&config.view.theme).unwrap_or_else(|| {
        warn!("unknown theme {:?}, using the default", config.view.theme);
        builtin_themes::catppuccin_mocha()
    });

    let mut session = Session::new(output, &config);
    if let Some(path) = input {
        session
            .load(&path)
            .wrap_err_with(|| format!("failed to open {}", path.display()))?;
        info!("opened {}", path.display());
    }

    let explorer_theme = ExplorerTheme::default()
        .add_default_title()
        .with_item_style(Style::default().fg(theme.global.foreground));
    let file_explorer = FileExplorer::with_theme(explorer_theme)?;
    let app = App::new(
        session,
        file_explorer,
        theme,
        Duration::from_millis(config.view.tick_ms.max(1)),
    );

    let terminal = ratatui::init();
    let app_result = execute!(io::stdout(), EnableMouseCapture)
        .wrap_err("failed to enable mouse capture")
        .and_then(|()| app.run(terminal));
    if let Err(err) = execute!(io::stdout(), DisableMouseCapture) {
        warn!("failed to disable mouse capture: {err}");
    }
    ratatui::restore();
    app_result
}
