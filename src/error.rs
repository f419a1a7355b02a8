// SPDX-License-Identifier: GPL-2.0
//! Error types for the NU801 driver

use std::io;
use std::path::PathBuf;

use nix::errno::Errno;
use thiserror::Error;

/// Errors that can occur while driving the NU801
#[derive(Error, Debug)]
pub enum Nu801Error {
    // Configuration
    #[error("unsupported device '{0}'")]
    UnknownProfile(String),

    #[error("hardware profile '{0}' defines no LED channels")]
    NoChannels(String),

    #[error("too many LED channels (the NU801 has {max})")]
    TooManyChannels { max: usize },

    // uleds
    #[error("failed to open {}: {source}", .path.display())]
    LedControlOpen { path: PathBuf, source: io::Error },

    #[error("failed to register LED '{name}': {source}")]
    LedRegister { name: String, source: io::Error },

    #[error("LED '{0}' was withdrawn (end of stream)")]
    EndOfStream(String),

    // GPIO
    #[error("failed to request GPIO lines {offsets:?} on {controller}: {source}")]
    GpioRequest {
        controller: String,
        offsets: Vec<u32>,
        source: gpiocdev::Error,
    },

    #[error("failed to read GPIO line values: {0}")]
    GpioGet(io::Error),

    #[error("GPIO commit failed: {0}")]
    GpioCommit(io::Error),

    #[error("GPIO lines already released")]
    GpioReleased,

    // Event loop
    #[error("waiting for LED events failed: {0}")]
    Wait(Errno),

    #[error("failed to set up signal handling: {0}")]
    Signal(Errno),
}

pub type Result<T> = std::result::Result<T, Nu801Error>;
