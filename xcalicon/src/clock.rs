// SPDX-License-Identifier: GPL-3.0-only

use std::fmt::{Display, Write};

use chrono::{DateTime, Datelike, TimeZone, Timelike};

pub const DEFAULT_TITLE_FORMAT: &str = "%a %H:%M";

/// What needs repainting after a tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Redraw {
    /// The minute rolled over; the window and icon names are stale.
    pub title: bool,
    /// The day rolled over; the icon pixmap must be recomposited.
    pub icon: bool,
    /// The window contents must be repainted.
    pub window: bool,
}

/// Remembers the last rendered day and minute so idle ticks do nothing.
#[derive(Debug, Default)]
pub struct RedrawState {
    last_day: Option<u32>,
    last_minute: Option<u32>,
}

impl RedrawState {
    pub fn tick<T: Datelike + Timelike>(&mut self, now: &T, exposed: bool) -> Redraw {
        let mut redraw = Redraw::default();

        if self.last_minute != Some(now.minute()) {
            tracing::debug!("minute changed, updating title");
            self.last_minute = Some(now.minute());
            redraw.title = true;
        }

        if self.last_day == Some(now.day()) && !exposed {
            return redraw;
        }

        if self.last_day != Some(now.day()) {
            tracing::debug!("day changed, rebuilding icon");
            self.last_day = Some(now.day());
            redraw.icon = true;
            redraw.window = true;
        }

        if exposed {
            redraw.window = true;
        }

        redraw
    }
}

/// Formats window titles with a user supplied strftime pattern.
#[derive(Debug)]
pub struct TitleFormat {
    pattern: String,
    warned: bool,
}

impl TitleFormat {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            warned: false,
        }
    }

    /// Do not use to_string() on the formatter. It panics on invalid specifiers.
    pub fn format<Tz: TimeZone>(&mut self, now: &DateTime<Tz>) -> String
    where
        Tz::Offset: Display,
    {
        let mut title = String::new();
        if write!(title, "{}", now.format(&self.pattern)).is_ok() {
            return title;
        }

        if !self.warned {
            tracing::warn!(pattern = %self.pattern, "invalid title format, using default");
            self.warned = true;
        }
        now.format(DEFAULT_TITLE_FORMAT).to_string()
    }
}
