// SPDX-License-Identifier: GPL-2.0
//! Supported hardware
//!
//! The device id is the program's one and only positional parameter and is
//! matched exactly against [`SUPPORTED_HARDWARE`].

use std::time::Duration;

use crate::error::{Nu801Error, Result};

/// The NU801 has at most three channels
pub const MAX_CHANNELS: usize = 3;

/// GPIO line offsets on the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineOffsets {
    /// CKI
    pub clock: u32,
    /// SDI
    pub data: u32,
    /// LEI, `None` for boards wired in 2-wire mode
    pub latch: Option<u32>,
}

/// Color/function label of one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedLabel {
    pub color: &'static str,
    pub function: &'static str,
}

impl LedLabel {
    pub const fn new(color: &'static str, function: &'static str) -> Self {
        Self { color, function }
    }

    fn is_empty(&self) -> bool {
        self.color.is_empty() || self.function.is_empty()
    }
}

/// Per-board description of GPIO lines and channel labels
#[derive(Debug, Clone, Copy)]
pub struct HardwareProfile {
    pub id: &'static str,
    pub board: Option<&'static str>,
    pub gpiochip: &'static str,
    pub lines: LineOffsets,
    /// Delay after each falling clock edge. Userspace is slow enough that
    /// this is mostly cosmetic.
    pub bit_delay_ns: u32,
    pub leds: &'static [LedLabel],
}

impl HardwareProfile {
    pub fn has_latch_line(&self) -> bool {
        self.lines.latch.is_some()
    }

    /// Offsets in bank order: clock, data, then latch if present
    pub fn line_offsets(&self) -> Vec<u32> {
        let mut offsets = vec![self.lines.clock, self.lines.data];
        offsets.extend(self.lines.latch);
        offsets
    }

    pub fn bit_delay(&self) -> Duration {
        Duration::from_nanos(u64::from(self.bit_delay_ns))
    }

    /// Labels that become channels, in channel order
    pub fn channel_labels(&self) -> impl Iterator<Item = &LedLabel> {
        self.leds
            .iter()
            .take(MAX_CHANNELS)
            .take_while(|label| !label.is_empty())
    }
}

/// All supported boards
pub const SUPPORTED_HARDWARE: &[HardwareProfile] = &[
    HardwareProfile {
        id: "Cisco MX100-HW",
        board: Some("mx100"),
        gpiochip: "gpiochip0",
        lines: LineOffsets {
            clock: 41,
            data: 6,
            latch: Some(5),
        },
        bit_delay_ns: 150,
        leds: &[
            LedLabel::new("blue", "tricolor"),
            LedLabel::new("green", "tricolor"),
            LedLabel::new("red", "tricolor"),
        ],
    },
    // TODO: Meraki Z1 and Meraki MR18 carry the same chip; add them once
    // their line offsets are confirmed on hardware.
];

/// Find a profile by exact id
pub fn find_profile(id: &str) -> Option<&'static HardwareProfile> {
    SUPPORTED_HARDWARE.iter().find(|p| p.id == id)
}

/// Like [`find_profile`], but an unknown id is an error
pub fn lookup(id: &str) -> Result<&'static HardwareProfile> {
    find_profile(id).ok_or_else(|| Nu801Error::UnknownProfile(id.to_string()))
}
