//! Picking a serial device from a list.

use std::{io::stdout, path::PathBuf, time::Duration};

use crate::gui::error::GuiError;

use crossterm::{
    event::{self, KeyCode, KeyEventKind},
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

/// A highlighted row in a list that wraps around at both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Highlight {
    row: usize,
    rows: usize,
}

impl Highlight {
    fn new(rows: usize) -> Self {
        Self { row: 0, rows }
    }

    fn down(&mut self) {
        self.row = (self.row + 1) % self.rows;
    }

    fn up(&mut self) {
        self.row = (self.row + self.rows - 1) % self.rows;
    }
}

/// Lets the user pick one of `available_ports`. Returns `None` if they quit
/// without choosing.
pub fn device_selector(mut available_ports: Vec<PathBuf>) -> Result<Option<PathBuf>, GuiError> {
    if available_ports.is_empty() {
        return Err(GuiError::NoDevices);
    }

    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let res = select(&available_ports);
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(res?.map(|i| available_ports.swap_remove(i)))
}

fn select(available_ports: &[PathBuf]) -> Result<Option<usize>, GuiError> {
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.clear()?;

    let mut highlight = Highlight::new(available_ports.len());
    let mut list_state = ListState::default().with_selected(Some(highlight.row));
    loop {
        let title = Title::from(" Beacon Rig ".magenta().bold());
        let instructions = Title::from(Line::from(vec![
            " Navigate ".into(),
            "<Up>/<Down>".magenta().bold(),
            " Select ".into(),
            "<Enter>".magenta().bold(),
            " Quit ".into(),
            "<Q> ".magenta().bold(),
        ]));
        let block = Block::default()
            .title(title.alignment(Alignment::Center))
            .title(
                instructions
                    .alignment(Alignment::Center)
                    .position(Position::Bottom),
            )
            .borders(Borders::ALL);
        let port_names = available_ports.iter().map(|p| p.to_string_lossy());
        let list = List::new(port_names)
            .style(Style::default().fg(Color::White))
            .highlight_symbol(">>")
            .highlight_style(Style::default().fg(Color::Magenta))
            .block(block);
        list_state.select(Some(highlight.row));
        terminal.draw(|frame| {
            let area = frame.size();
            frame.render_stateful_widget(list, area, &mut list_state);
        })?;

        if event::poll(Duration::from_millis(16))? {
            if let event::Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Down => highlight.down(),
                        KeyCode::Up => highlight.up(),
                        KeyCode::Enter => return Ok(Some(highlight.row)),
                        KeyCode::Char('q') | KeyCode::Esc => return Ok(None),
                        _ => {}
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn highlight_wraps() {
        let mut h = Highlight::new(3);
        h.up();
        assert_eq!(h.row, 2);
        h.down();
        h.down();
        assert_eq!(h.row, 1);
    }

    #[test]
    fn nothing_to_select() {
        assert!(matches!(device_selector(vec![]), Err(GuiError::NoDevices)));
    }
}
