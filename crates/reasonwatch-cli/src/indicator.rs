//! Terminal status indicator
//!
//! Prints one coloured line per status transition.

use chrono::Local;
use crossterm::style::{Color, Stylize};
use reasonwatch_core::Status;

pub fn colour_for(status: Status) -> Color {
    match status {
        Status::Thinking => Color::Red,
        Status::Streaming => Color::Yellow,
        Status::Idle => Color::Green,
    }
}

pub fn render(status: Status) -> String {
    format!(
        "[{}] {} {}",
        Local::now().format("%H:%M:%S%.3f"),
        "\u{25cf}".with(colour_for(status)),
        status.as_str().with(colour_for(status)).bold()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_mentions_status() {
        assert!(render(Status::Streaming).contains("STREAMING"));
        assert_eq!(colour_for(Status::Idle), Color::Green);
    }
}
