//! A status screen over a worker thread, dismissed with any key.

use std::{
    collections::VecDeque,
    io::stdout,
    sync::mpsc::{self, TryRecvError},
    thread::spawn,
    time::Duration,
};

use crate::gui::error::GuiError;

use crossterm::{
    event::{self, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};

use ratatui::{
    prelude::*,
    widgets::{
        block::{Position, Title},
        *,
    },
    Terminal,
};

enum ThreadMessage {
    Stop,
}

/// The most recent lines of status, oldest first.
#[derive(Debug, Default)]
struct Backlog {
    lines: VecDeque<String>,
    capacity: usize,
}

impl Backlog {
    fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, line: String) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }
}

/// Runs `step` over and over on a worker thread until the user presses a
/// key, showing the status line each call returns. Hands back the final
/// state once the step in progress has finished.
///
/// `step` is a fold: it gets the state left by the previous call.
pub fn run_until_keypress<F, T>(title: &str, init: T, mut step: F) -> Result<T, GuiError>
where
    F: FnMut(&mut T) -> String + Send + 'static,
    T: Send + 'static,
{
    let (stop_tx, stop_rx) = mpsc::channel();
    let (status_tx, status_rx) = mpsc::channel();

    let th = spawn(move || {
        let mut val = init;
        loop {
            let status = step(&mut val);
            // Nobody listening only means the screen is gone.
            let _ = status_tx.send(status);
            match stop_rx.try_recv() {
                Ok(ThreadMessage::Stop) | Err(TryRecvError::Disconnected) => break,
                Err(TryRecvError::Empty) => {}
            }
        }
        val
    });

    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let shown = show_status(title, &status_rx);
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    // The worker stops on its own once the sender is gone, which covers an
    // error from the screen as well.
    let _ = stop_tx.send(ThreadMessage::Stop);
    drop(stop_tx);
    let res = th.join().map_err(|_| GuiError::JoinError)?;
    shown?;
    Ok(res)
}

fn show_status(title: &str, status_rx: &mpsc::Receiver<String>) -> Result<(), GuiError> {
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.clear()?;
    let mut backlog = Backlog::new(256);

    loop {
        while let Ok(line) = status_rx.try_recv() {
            backlog.push(line);
        }

        let heading = Title::from(format!(" {} ", title).magenta().bold());
        let instructions = Title::from(Line::from(vec![
            " Stop ".into(),
            "<Any Key> ".magenta().bold(),
        ]));
        let block = Block::default()
            .title(heading.alignment(Alignment::Center))
            .title(
                instructions
                    .alignment(Alignment::Center)
                    .position(Position::Bottom),
            )
            .borders(Borders::ALL);
        terminal.draw(|frame| {
            let area = frame.size();
            // Keep the newest line at the bottom of the box.
            let visible = area.height.saturating_sub(2) as usize;
            let skip = backlog.lines.len().saturating_sub(visible);
            let text: Vec<Line> = backlog
                .lines
                .iter()
                .skip(skip)
                .map(|l| Line::from(l.as_str()))
                .collect();
            frame.render_widget(Paragraph::new(text).block(block), area);
        })?;

        if event::poll(Duration::from_millis(16))? {
            if let event::Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backlog_keeps_the_newest() {
        let mut backlog = Backlog::new(2);
        for line in ["a", "b", "c"] {
            backlog.push(line.to_owned());
        }
        assert_eq!(backlog.lines, VecDeque::from(["b".to_owned(), "c".to_owned()]));
    }
}
