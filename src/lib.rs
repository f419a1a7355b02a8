// SPDX-License-Identifier: GPL-2.0
//! Userspace LED driver for the NumEn Tech. NU801 LED controller
//! (3 channel 16 bit PWM constant current driver)
//!
//! Every channel of the chip is announced to the kernel's LED class through
//! uleds. Brightness changes are picked up in a single-threaded poll loop and
//! bit-banged to the chip over two or three GPIO lines.

pub mod controller;
pub mod error;
pub mod gpio;
pub mod profile;
pub mod protocol;
pub mod signal;
pub mod uleds;

use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, info};

pub use controller::{Controller, StopReason};
pub use error::{Nu801Error, Result};
pub use gpio::{ChipLineRequest, GpioBank, Line, LineRequest, LineValues};
pub use profile::{find_profile, lookup, HardwareProfile, LedLabel, LineOffsets, SUPPORTED_HARDWARE};
pub use protocol::{
    hardware_value, Delay, LatchMode, ProtocolEngine, ThreadDelay, PSEUDO_LATCH_HOLD,
};
pub use uleds::{Channel, ChannelRegistry, Update};

/// The daemon as run on real hardware
pub type Daemon = Controller<ChipLineRequest, ThreadDelay>;

/// Runtime overrides on top of the hardware profile
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// uleds control device
    pub uleds_path: PathBuf,
    /// Replaces the profile's per-bit delay
    pub bit_delay: Option<Duration>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            uleds_path: PathBuf::from(uleds::ULEDS_PATH),
            bit_delay: None,
        }
    }
}

/// Register the LEDs and claim the GPIO lines of `profile`
///
/// Whatever was acquired before a failure is released again when the
/// partial state is dropped.
pub fn start(profile: &HardwareProfile, config: &DaemonConfig) -> Result<Daemon> {
    debug!(
        "cki:{} sdi:{} lei:{:?}",
        profile.lines.clock, profile.lines.data, profile.lines.latch
    );

    let mut registry = ChannelRegistry::new(&config.uleds_path);
    registry.register_profile(profile)?;

    let bank = GpioBank::open(profile.gpiochip, &profile.line_offsets())?;

    let mut engine = ProtocolEngine::new(profile);
    if let Some(bit_delay) = config.bit_delay {
        engine.set_bit_delay(bit_delay);
    }
    info!(
        "Driving {} LEDs in {} mode, {:?} per bit",
        registry.len(),
        match engine.latch_mode() {
            LatchMode::Line => "3-wire",
            LatchMode::Pseudo => "2-wire",
        },
        engine.bit_delay()
    );

    Ok(Controller::new(registry.into_channels(), bank, engine))
}
