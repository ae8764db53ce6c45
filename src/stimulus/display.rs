// src/stimulus/display.rs

use colored::Colorize;
use std::io::{self, Write};
use std::time::Duration;

use super::scheduler::SchedulerState;
use super::StimulusEvent;
use crate::error::{P300Error, Result};

/// Presentation surface driven once per frame by the foreground loop. Pixel
/// rendering lives behind this trait.
pub trait StimulusDisplay {
    fn present(&mut self, state: SchedulerState, event: Option<&StimulusEvent>) -> Result<()>;

    /// Whether the participant or operator asked to quit through the display.
    fn quit_requested(&mut self) -> bool {
        false
    }
}

// -----------------------------------------------------------------------------
// CONSOLE
// -----------------------------------------------------------------------------

/// Prints one line per state change, with targets in their own color.
pub struct ConsoleDisplay<W: Write> {
    out: W,
    last: Option<SchedulerState>,
}

impl ConsoleDisplay<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> ConsoleDisplay<W> {
    pub fn new(out: W) -> Self {
        Self { out, last: None }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> StimulusDisplay for ConsoleDisplay<W> {
    fn present(&mut self, state: SchedulerState, event: Option<&StimulusEvent>) -> Result<()> {
        if self.last == Some(state) {
            return Ok(());
        }
        self.last = Some(state);

        let line = match (state, event.and_then(|e| e.payload.as_ref().map(|p| (e, p)))) {
            (SchedulerState::Idle, _) | (_, None) => "+".white().to_string(),
            (SchedulerState::Target, Some((event, payload))) => {
                let [r, g, b] = payload.color;
                format!(
                    "{} size {} at {:?} for {} ms",
                    payload.letter.to_string().truecolor(r, g, b).bold(),
                    payload.size,
                    payload.position,
                    event.duration.as_millis()
                )
            }
            (SchedulerState::NonTarget, Some((event, payload))) => {
                let tag = if event.marker.is_none() { "" } else { " *" };
                format!("{}{}", payload.letter.to_string().blue(), tag)
            }
        };

        writeln!(self.out, "{}", line)
            .and_then(|_| self.out.flush())
            .map_err(|e| P300Error::Scheduler(format!("display write failed: {}", e)))
    }
}

// -----------------------------------------------------------------------------
// HEADLESS
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Presentation {
    pub state: SchedulerState,
    pub onset: Option<Duration>,
}

/// Records state changes without drawing anything. Can ask to quit after a
/// number of frames.
#[derive(Debug, Default)]
pub struct HeadlessDisplay {
    presentations: Vec<Presentation>,
    frames: usize,
    quit_after_frames: Option<usize>,
}

impl HeadlessDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn quit_after(frames: usize) -> Self {
        Self {
            quit_after_frames: Some(frames),
            ..Self::default()
        }
    }

    pub fn presentations(&self) -> &[Presentation] {
        &self.presentations
    }

    pub fn frames(&self) -> usize {
        self.frames
    }
}

impl StimulusDisplay for HeadlessDisplay {
    fn present(&mut self, state: SchedulerState, event: Option<&StimulusEvent>) -> Result<()> {
        self.frames += 1;
        if self.presentations.last().map(|p| p.state) != Some(state) {
            self.presentations.push(Presentation {
                state,
                onset: event.map(|e| e.onset),
            });
        }
        Ok(())
    }

    fn quit_requested(&mut self) -> bool {
        self.quit_after_frames
            .map_or(false, |limit| self.frames >= limit)
    }
}
