//! Recording fakes for the GPIO bank and the engine's delays.
//!
//! Both fakes append to one shared trace so tests can tell where a delay
//! happened relative to the clock edges.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use nix::errno::Errno;
use nu801d::{Delay, Line, LineRequest, LineValues, Nu801Error, PSEUDO_LATCH_HOLD};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Commit(LineValues),
    Delay(Duration),
}

pub type Trace = Rc<RefCell<Vec<Event>>>;

pub fn trace() -> Trace {
    Rc::new(RefCell::new(Vec::new()))
}

/// Line request that records every commit, optionally failing the n-th
pub struct RecordingLines {
    trace: Trace,
    fail_at: Option<usize>,
    commits: usize,
}

impl RecordingLines {
    pub fn new(trace: &Trace) -> Self {
        Self {
            trace: Rc::clone(trace),
            fail_at: None,
            commits: 0,
        }
    }

    /// Fail the `n`-th commit (1-based) and every one after it
    pub fn failing_at(trace: &Trace, n: usize) -> Self {
        Self {
            fail_at: Some(n),
            ..Self::new(trace)
        }
    }
}

impl LineRequest for RecordingLines {
    fn set_values(&mut self, values: &LineValues) -> nu801d::Result<()> {
        self.commits += 1;
        if self.fail_at.is_some_and(|n| self.commits >= n) {
            return Err(Nu801Error::GpioCommit(Errno::EIO.into()));
        }
        self.trace.borrow_mut().push(Event::Commit(*values));
        Ok(())
    }

    fn get_values(&mut self, values: &mut LineValues) -> nu801d::Result<()> {
        values.bits = 0;
        Ok(())
    }
}

pub struct RecordingDelay {
    trace: Trace,
}

impl RecordingDelay {
    pub fn new(trace: &Trace) -> Self {
        Self {
            trace: Rc::clone(trace),
        }
    }
}

impl Delay for RecordingDelay {
    fn delay(&mut self, duration: Duration) {
        self.trace.borrow_mut().push(Event::Delay(duration));
    }
}

/// What the chip would have seen
#[derive(Debug, Default)]
pub struct Decoded {
    /// Data level at every rising clock edge
    pub bits: Vec<bool>,
    /// Clock pulse number (1-based) during which each 600us hold happened
    pub holds_at: Vec<usize>,
    /// Rising edges on the latch line
    pub latch_pulses: usize,
    /// Clock pulses seen before each latch pulse
    pub latch_after: Vec<usize>,
    pub commits: usize,
}

impl Decoded {
    pub fn pulses(&self) -> usize {
        self.bits.len()
    }

    /// Reassemble the shifted bits into 16-bit words
    pub fn words(&self) -> Vec<u16> {
        self.bits
            .chunks(16)
            .map(|word| word.iter().fold(0u16, |acc, &b| (acc << 1) | u16::from(b)))
            .collect()
    }
}

pub fn decode(events: &[Event]) -> Decoded {
    let mut decoded = Decoded::default();
    let mut clock = false;
    let mut latch = false;

    for event in events {
        match *event {
            Event::Commit(values) => {
                decoded.commits += 1;
                let new_clock = values.level(Line::Clock);
                if new_clock && !clock {
                    decoded.bits.push(values.level(Line::Data));
                }
                clock = new_clock;

                let new_latch = values.level(Line::Latch);
                if new_latch && !latch {
                    decoded.latch_pulses += 1;
                    decoded.latch_after.push(decoded.bits.len());
                }
                latch = new_latch;
            }
            Event::Delay(d) if d == PSEUDO_LATCH_HOLD && clock => {
                decoded.holds_at.push(decoded.bits.len());
            }
            Event::Delay(_) => {}
        }
    }

    decoded
}

/// Split a trace into frames, one per `transmit`, by the commit count of a
/// frame (two per bit plus two for a latch pulse)
pub fn frames(events: &[Event], commits_per_frame: usize) -> Vec<Vec<Event>> {
    let mut frames = Vec::new();
    let mut current = Vec::new();
    let mut commits = 0;
    for event in events {
        current.push(*event);
        if matches!(event, Event::Commit(_)) {
            commits += 1;
            if commits == commits_per_frame {
                frames.push(std::mem::take(&mut current));
                commits = 0;
            }
        }
    }
    if !current.is_empty() {
        frames.push(current);
    }
    frames
}
