// SPDX-License-Identifier: GPL-2.0
//! LED channels exposed through the kernel's userspace LED driver (uleds)
//!
//! Each channel is one open handle on `/dev/uleds`. Writing a
//! `struct uleds_user_dev` announces the LED to the LED class; from then on
//! every brightness change shows up as a native-endian `int` to read.

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Nu801Error, Result};
use crate::profile::{HardwareProfile, MAX_CHANNELS};

/// Default uleds control device
pub const ULEDS_PATH: &str = "/dev/uleds";

/// `LED_MAX_NAME_SIZE` from linux/uleds.h
pub const LED_MAX_NAME_SIZE: usize = 64;

/// Size of `struct uleds_user_dev`
pub const ULEDS_RECORD_LEN: usize = LED_MAX_NAME_SIZE + 4;

/// Longest LED class name this driver announces
pub const LED_NAME_MAX_LEN: usize = LED_MAX_NAME_SIZE - 2;

pub const MAX_BRIGHTNESS: u8 = 255;

/// Build the LED class name: `board:color:function` or `color:function`
///
/// Names are cut to [`LED_NAME_MAX_LEN`] bytes, as the leds-nu801 driver
/// does.
pub fn led_name(board: Option<&str>, color: &str, function: &str) -> String {
    let mut name = match board {
        Some(board) => format!("{board}:{color}:{function}"),
        None => format!("{color}:{function}"),
    };
    if name.len() > LED_NAME_MAX_LEN {
        let mut end = LED_NAME_MAX_LEN;
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        name.truncate(end);
    }
    name
}

/// Encode a `struct uleds_user_dev`
pub fn encode_user_dev(name: &str, max_brightness: i32) -> [u8; ULEDS_RECORD_LEN] {
    let mut record = [0u8; ULEDS_RECORD_LEN];
    let bytes = name.as_bytes();
    let len = bytes.len().min(LED_MAX_NAME_SIZE - 1);
    record[..len].copy_from_slice(&bytes[..len]);
    record[LED_MAX_NAME_SIZE..].copy_from_slice(&max_brightness.to_ne_bytes());
    record
}

/// Result of reading a channel handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Update {
    /// New brightness, clamped to 0..=255
    Brightness(u8),
    /// Nothing to read right now
    Pending,
    /// The kernel withdrew the LED
    EndOfStream,
}

/// One chip channel and its uleds handle
#[derive(Debug)]
pub struct Channel {
    name: String,
    max_brightness: u8,
    brightness: u8,
    handle: Option<File>,
}

impl Channel {
    /// Channel on an already announced handle. The handle should be
    /// non-blocking.
    pub fn with_handle(name: impl Into<String>, handle: impl Into<OwnedFd>) -> Self {
        Self {
            name: name.into(),
            max_brightness: MAX_BRIGHTNESS,
            brightness: 0,
            handle: Some(File::from(handle.into())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_brightness(&self) -> u8 {
        self.max_brightness
    }

    pub fn brightness(&self) -> u8 {
        self.brightness
    }

    pub fn set_brightness(&mut self, brightness: u8) {
        self.brightness = brightness.min(self.max_brightness);
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_none()
    }

    /// Descriptor to wait on, `None` once closed
    pub fn poll_handle(&self) -> Option<BorrowedFd<'_>> {
        self.handle.as_ref().map(|f| f.as_fd())
    }

    /// Read the latest brightness without blocking
    pub fn read_update(&mut self) -> Update {
        let Some(handle) = self.handle.as_mut() else {
            return Update::EndOfStream;
        };

        let mut buf = [0u8; 4];
        let n = loop {
            match handle.read(&mut buf) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Update::Pending,
                Err(e) => {
                    warn!("Failed to read LED {}: {}", self.name, e);
                    return Update::EndOfStream;
                }
            }
        };

        if n < buf.len() {
            if n > 0 {
                warn!("Short read ({} bytes) from LED {}", n, self.name);
            }
            return Update::EndOfStream;
        }

        let raw = i32::from_ne_bytes(buf);
        let brightness = raw.clamp(0, i32::from(self.max_brightness)) as u8;
        Update::Brightness(brightness)
    }

    /// Close the handle; the LED disappears from the LED class
    pub fn close(&mut self) {
        self.handle = None;
    }
}

/// Registers channels with uleds
pub struct ChannelRegistry {
    control_path: PathBuf,
    channels: Vec<Channel>,
}

impl ChannelRegistry {
    pub fn new(control_path: impl AsRef<Path>) -> Self {
        Self {
            control_path: control_path.as_ref().to_path_buf(),
            channels: Vec::with_capacity(MAX_CHANNELS),
        }
    }

    /// Announce one LED and keep its handle
    pub fn register(
        &mut self,
        board: Option<&str>,
        color: &str,
        function: &str,
    ) -> Result<&Channel> {
        if self.channels.len() >= MAX_CHANNELS {
            return Err(Nu801Error::TooManyChannels { max: MAX_CHANNELS });
        }

        let name = led_name(board, color, function);
        debug!("Registering LED {} {}", self.channels.len(), name);

        let mut handle = File::options()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK | libc::O_CLOEXEC)
            .open(&self.control_path)
            .map_err(|source| Nu801Error::LedControlOpen {
                path: self.control_path.clone(),
                source,
            })?;

        let record = encode_user_dev(&name, i32::from(MAX_BRIGHTNESS));
        match handle.write(&record) {
            Ok(n) if n == record.len() => {}
            Ok(n) => {
                return Err(Nu801Error::LedRegister {
                    name,
                    source: io::Error::new(
                        io::ErrorKind::WriteZero,
                        format!("short write ({n} of {} bytes)", record.len()),
                    ),
                })
            }
            Err(source) => return Err(Nu801Error::LedRegister { name, source }),
        }

        self.channels.push(Channel::with_handle(name, OwnedFd::from(handle)));
        Ok(&self.channels[self.channels.len() - 1])
    }

    /// Register one channel per label pair of `profile`
    pub fn register_profile(&mut self, profile: &HardwareProfile) -> Result<()> {
        for label in profile.channel_labels() {
            self.register(profile.board, label.color, label.function)?;
        }
        if self.channels.is_empty() {
            return Err(Nu801Error::NoChannels(profile.id.to_string()));
        }
        debug!("Registered {} LEDs", self.channels.len());
        Ok(())
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn into_channels(self) -> Vec<Channel> {
        self.channels
    }
}
