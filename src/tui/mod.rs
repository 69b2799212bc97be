use std::io;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers, MouseButton, MouseEventKind,
};
use crossterm::execute;
use crossterm::terminal::{EnterAlternateScreen, LeaveAlternateScreen};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Paragraph};
use view::{ControlId, ControlKind, ControlTree, TabBar, TextInput, Value};

use crate::device::DeviceEvent;
use crate::editor::{Editor, KeyOutcome};
use crate::midi::{KnobEvent, MidiManager};

const PARTS: usize = 16;

const HELP: &str = "Tab focus  ←↑↓→ move  +/- step  Enter press  [ ] part  Ctrl+Q quit";

/// Event sources the editor listens to besides the terminal.
pub struct Inputs {
    pub device_rx: Receiver<DeviceEvent>,
    pub knob_rx: Receiver<KnobEvent>,
    pub knobs: Option<MidiManager>,
}

struct State<'a> {
    editor: &'a mut Editor,
    inputs: Inputs,
    /// Where the control tree was drawn last frame.
    origin: Rect,
    quit: bool,
}

pub fn run(editor: &mut Editor, inputs: Inputs) -> anyhow::Result<()> {
    let mut s = State {
        editor,
        inputs,
        origin: Rect::default(),
        quit: false,
    };

    // Set up terminal.
    crossterm::terminal::enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // When stderr is redirected (e.g. `knobedit run ... 2> debug.log`), keep
    // logging enabled. When stderr is a terminal, suppress logging to avoid
    // corrupting the alternate screen.
    let prev_log_level = log::max_level();
    if std::io::IsTerminal::is_terminal(&std::io::stderr()) {
        log::set_max_level(log::LevelFilter::Off);
    }

    let result = event_loop(&mut terminal, &mut s);

    log::set_max_level(prev_log_level);

    execute!(
        terminal.backend_mut(),
        DisableMouseCapture,
        LeaveAlternateScreen
    )?;
    crossterm::terminal::disable_raw_mode()?;

    result.map_err(Into::into)
}

fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    s: &mut State<'_>,
) -> io::Result<()> {
    let mut last_poll = Instant::now();
    loop {
        drain_inputs(s);

        render(terminal, s)?;
        if s.quit {
            break;
        }

        // Poll with timeout so device and knob changes show without input.
        if event::poll(Duration::from_millis(20))? {
            process_event(s, event::read()?);
            while event::poll(Duration::ZERO)? {
                process_event(s, event::read()?);
            }
        }

        // Poll for new knob controllers every ~1s
        if last_poll.elapsed() >= Duration::from_secs(1) {
            if let Some(knobs) = s.inputs.knobs.as_mut() {
                knobs.poll_new_devices();
            }
            last_poll = Instant::now();
        }
    }
    Ok(())
}

fn drain_inputs(s: &mut State<'_>) {
    while let Ok(event) = s.inputs.device_rx.try_recv() {
        s.editor.on_device_changed(&event);
    }
    while let Ok(event) = s.inputs.knob_rx.try_recv() {
        s.editor.on_knob(event);
    }
    s.editor.flush();
}

// ---------------------------------------------------------------------------
// Event processing
// ---------------------------------------------------------------------------

fn process_event(s: &mut State<'_>, ev: Event) {
    match ev {
        Event::Key(key) if key.kind == KeyEventKind::Press => {
            if key.modifiers.contains(KeyModifiers::CONTROL)
                && matches!(key.code, KeyCode::Char('c') | KeyCode::Char('q'))
            {
                s.quit = true;
                return;
            }
            if s.editor.on_key_event(key) == KeyOutcome::Unhandled {
                handle_key(s.editor, key);
            }
        }
        Event::Mouse(mouse) => {
            if let MouseEventKind::Down(MouseButton::Left) = mouse.kind {
                handle_click(s, mouse.column, mouse.row);
            }
        }
        _ => {}
    }
}

/// Keys neither navigation nor the key map claimed.
fn handle_key(editor: &mut Editor, key: KeyEvent) {
    let tree = editor.tree_mut();
    let focused = tree.focused();
    let is_text = focused
        .and_then(|id| tree.get(id))
        .is_some_and(|c| matches!(c.kind, ControlKind::Text(_)));

    match key.code {
        KeyCode::Tab => cycle_focus(tree, true),
        KeyCode::BackTab => cycle_focus(tree, false),
        KeyCode::Esc if is_text => cycle_focus(tree, true),
        _ if is_text => {
            if let Some(id) = focused {
                edit_text(tree, id, key.code);
            }
        }
        KeyCode::Enter | KeyCode::Char(' ') => {
            if let Some(id) = focused {
                activate(tree, id);
            }
        }
        KeyCode::Char(']') => {
            let page = (editor.page() + 1).min(PARTS - 1);
            editor.set_page(page);
        }
        KeyCode::Char('[') => {
            let page = editor.page().saturating_sub(1);
            editor.set_page(page);
        }
        _ => {}
    }
    editor.flush();
}

fn cycle_focus(tree: &mut ControlTree, forward: bool) {
    let chain = tree.focus_chain();
    if chain.is_empty() {
        return;
    }
    let position = tree
        .focused()
        .and_then(|id| chain.iter().position(|&c| c == id));
    let next = match (position, forward) {
        (None, _) => 0,
        (Some(i), true) => (i + 1) % chain.len(),
        (Some(i), false) => (i + chain.len() - 1) % chain.len(),
    };
    tree.set_focus(chain[next]);
}

fn edit_text(tree: &mut ControlTree, id: ControlId, code: KeyCode) {
    tree.edit_text(id, |input| match code {
        KeyCode::Char(ch) => input.insert(ch),
        KeyCode::Backspace => input.backspace(),
        KeyCode::Delete => input.delete(),
        KeyCode::Left => {
            input.move_left();
            false
        }
        KeyCode::Right => {
            input.move_right();
            false
        }
        KeyCode::Home => {
            input.home();
            false
        }
        KeyCode::End => {
            input.end();
            false
        }
        _ => false,
    });
}

/// Enter on a control: press buttons, flip toggles, turn notebook pages.
fn activate(tree: &mut ControlTree, id: ControlId) {
    let pages = tree.children(id).len();
    match tree.get(id).map(|c| &c.kind) {
        Some(ControlKind::Button { .. }) => {
            tree.press(id);
        }
        Some(ControlKind::Toggle(on)) => {
            let next = Value::Int(i32::from(!*on));
            if let Err(e) = tree.set_value(id, &next) {
                log::warn!("{e}");
            }
        }
        Some(ControlKind::Notebook(nb)) if pages > 0 => {
            let next = (nb.active + 1) % pages;
            tree.switch_page(id, next);
        }
        _ => {}
    }
}

fn handle_click(s: &mut State<'_>, x: u16, y: u16) {
    let origin = s.origin;
    let tree = s.editor.tree_mut();
    let notebooks: Vec<ControlId> = tree
        .walk()
        .filter(|&id| tree.is_shown(id) && tree.get(id).is_some_and(|c| c.kind.is_paged()))
        .collect();
    for id in notebooks {
        let Some(control) = tree.get(id) else {
            continue;
        };
        let ControlKind::Notebook(nb) = &control.kind else {
            continue;
        };
        let area = Rect { height: 1, ..place(control.bounds, origin) };
        if let Some(page) = TabBar::tab_at(x, y, area, &nb.labels) {
            tree.switch_page(id, page);
            tree.set_focus(id);
            break;
        }
    }
    s.editor.flush();
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Translate tree coordinates into the frame, clipped to `origin`.
fn place(bounds: Rect, origin: Rect) -> Rect {
    Rect {
        x: bounds.x.saturating_add(origin.x),
        y: bounds.y.saturating_add(origin.y),
        ..bounds
    }
    .intersection(origin)
}

fn render(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    s: &mut State<'_>,
) -> io::Result<()> {
    terminal.draw(|frame| {
        let area = frame.area();
        let [title_area, content_area, help_area] = Layout::vertical([
            Constraint::Length(1),
            Constraint::Fill(1),
            Constraint::Length(1),
        ])
        .areas(area);
        s.origin = content_area;

        frame.render_widget(
            Paragraph::new(title_line(s.editor))
                .style(Style::default().add_modifier(Modifier::BOLD)),
            title_area,
        );
        frame.render_widget(
            Paragraph::new(HELP).style(Style::default().fg(Color::DarkGray)),
            help_area,
        );

        let tree = s.editor.tree();
        let focused = tree.focused();
        for id in tree.walk() {
            if id == tree.root() || !tree.is_shown(id) {
                continue;
            }
            let Some(control) = tree.get(id) else {
                continue;
            };
            let rect = place(control.bounds, content_area);
            if rect.is_empty() {
                continue;
            }
            let has_focus = focused == Some(id);
            let style = if has_focus {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            let label = control.label();

            match &control.kind {
                ControlKind::Range(r) => {
                    let text = format!("{label} {}", bar(r.fraction(), 10, r.value));
                    frame.render_widget(Paragraph::new(text).style(style), rect);
                }
                ControlKind::Choice(c) => {
                    let text = format!("{label}: ‹{}›", c.label());
                    frame.render_widget(Paragraph::new(text).style(style), rect);
                }
                ControlKind::Toggle(on) => {
                    let mark = if *on { 'x' } else { ' ' };
                    let text = format!("[{mark}] {label}");
                    frame.render_widget(Paragraph::new(text).style(style), rect);
                }
                ControlKind::Text(input) => {
                    let widget = TextInput::new(input).focused(has_focus).style(style);
                    frame.render_widget(widget, rect);
                }
                ControlKind::Notebook(nb) => {
                    let tabs = Rect { height: 1, ..rect };
                    let widget = TabBar::new(&nb.labels, nb.active).focused(has_focus);
                    frame.render_widget(widget, tabs);
                }
                ControlKind::Button { label } => {
                    frame.render_widget(Paragraph::new(format!("[ {label} ]")).style(style), rect);
                }
                ControlKind::Container => {
                    let in_notebook = tree
                        .parent(id)
                        .and_then(|p| tree.get(p))
                        .is_some_and(|p| p.kind.is_paged());
                    if !in_notebook && rect.height >= 2 && control.name.is_some() {
                        frame.render_widget(
                            Block::bordered()
                                .title(label)
                                .border_style(Style::default().fg(Color::DarkGray)),
                            rect,
                        );
                    }
                }
            }
        }
    })?;
    Ok(())
}

/// Editor title, followed by the button pressed last.
fn title_line(editor: &Editor) -> String {
    let pressed = editor.last_pressed().and_then(|id| editor.tree().get(id));
    match pressed {
        Some(button) => format!("{}  | pressed {}", editor.title(), button.label()),
        None => editor.title(),
    }
}

fn bar(fraction: f64, width: usize, value: i32) -> String {
    let filled = ((fraction * width as f64).round() as usize).min(width);
    format!(
        "{}{} {value}",
        "█".repeat(filled),
        "░".repeat(width - filled)
    )
}
