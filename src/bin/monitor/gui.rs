use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    style::{Color, Style},
    symbols,
    text::Span,
    widgets::{Axis, Block, Chart, Dataset, GraphType},
    Frame, Terminal,
};
use std::{
    error::Error,
    io,
    time::{Duration, Instant},
};

use beaconranger::Point;

type PointGenerator = Box<dyn FnMut() -> Vec<Point>>;

struct App {
    truth_generator: PointGenerator,
    estimate_generator: PointGenerator,
    truth: Vec<(f64, f64)>,
    estimates: Vec<(f64, f64)>,
    /// Half the width of the square the chart shows, in meters.
    bound: f64,
}

impl App {
    fn new(truth_generator: PointGenerator, estimate_generator: PointGenerator, bound: f64) -> App {
        App {
            truth_generator,
            estimate_generator,
            truth: vec![],
            estimates: vec![],
            bound,
        }
    }

    fn on_tick(&mut self) {
        self.truth = (self.truth_generator)()
            .iter()
            .map(|&Point { x, y }| (x, y))
            .collect();
        self.estimates = (self.estimate_generator)()
            .iter()
            .map(|&Point { x, y }| (x, y))
            .collect();
    }
}

/// Charts the points the generators produce, refreshing four times a
/// second, until `q` is pressed.
pub fn engage_gui(
    truth_generator: PointGenerator,
    estimate_generator: PointGenerator,
    bound: f64,
) -> Result<(), Box<dyn Error>> {
    // setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // create app and run it
    let tick_rate = Duration::from_millis(250);
    let app = App::new(truth_generator, estimate_generator, bound);
    let res = run_app(&mut terminal, app, tick_rate);

    // restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    Ok(res?)
}

fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    mut app: App,
    tick_rate: Duration,
) -> io::Result<()> {
    let mut last_tick = Instant::now();
    loop {
        terminal.draw(|f| ui(f, &app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));
        if crossterm::event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if let KeyCode::Char('q') = key.code {
                    return Ok(());
                }
            }
        }
        if last_tick.elapsed() >= tick_rate {
            app.on_tick();
            last_tick = Instant::now();
        }
    }
}

fn axis_labels(bound: f64) -> Vec<Span<'static>> {
    [-bound, -bound / 2.0, 0.0, bound / 2.0, bound]
        .iter()
        .map(|v| Span::from(format!("{:.1}", v)))
        .collect()
}

fn ui(f: &mut Frame, app: &App) {
    // The receiver ring sits at the origin.
    let centre = [(0.0, 0.0)];
    let chart = Chart::new(vec![
        Dataset::default()
            .name("Array")
            .marker(symbols::Marker::Block)
            .graph_type(GraphType::Scatter)
            .style(Style::default().fg(Color::White))
            .data(&centre),
        Dataset::default()
            .name("Source")
            .marker(symbols::Marker::Dot)
            .graph_type(GraphType::Scatter)
            .style(Style::default().fg(Color::Cyan))
            .data(&app.truth),
        Dataset::default()
            .name("Estimated")
            .marker(symbols::Marker::Dot)
            .graph_type(GraphType::Scatter)
            .style(Style::default().fg(Color::Red))
            .data(&app.estimates),
    ])
    .block(Block::default().title("Beacon bearing (m)"))
    .x_axis(
        Axis::default()
            .title(Span::styled("X", Style::default().fg(Color::Red)))
            .style(Style::default().fg(Color::White))
            .bounds([-app.bound, app.bound])
            .labels(axis_labels(app.bound)),
    )
    .y_axis(
        Axis::default()
            .title(Span::styled("Y", Style::default().fg(Color::Red)))
            .style(Style::default().fg(Color::White))
            .bounds([-app.bound, app.bound])
            .labels(axis_labels(app.bound)),
    );

    f.render_widget(chart, f.size());
}
