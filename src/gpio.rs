// SPDX-License-Identifier: GPL-2.0
//! GPIO line bank on top of the Linux GPIO character device
//!
//! Levels are staged in a bits/mask buffer with [`GpioBank::set`] and pushed
//! to the hardware with [`GpioBank::commit`], which is a single set-values
//! call on the line request. All lines of the bank change together.

use std::io;
use std::path::PathBuf;

use gpiocdev::line::{Offset, Value, Values};
use gpiocdev::Request;
use tracing::debug;

use crate::error::{Nu801Error, Result};

/// Consumer label shown in `gpioinfo`
pub const CONSUMER: &str = "nu801";

/// Position of a line inside the bank
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line {
    Clock = 0,
    Data = 1,
    Latch = 2,
}

impl Line {
    pub const fn bit(self) -> u64 {
        1 << self as u64
    }
}

/// Staged line levels, one bit per bank position
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineValues {
    pub bits: u64,
    pub mask: u64,
}

impl LineValues {
    pub fn level(&self, line: Line) -> bool {
        self.bits & line.bit() != 0
    }

    pub fn assign(&mut self, line: Line, level: bool) {
        if level {
            self.bits |= line.bit();
        } else {
            self.bits &= !line.bit();
        }
    }
}

/// Kernel side of a bank: an open line request
pub trait LineRequest {
    /// Drive the lines selected by `values.mask` to `values.bits`
    fn set_values(&mut self, values: &LineValues) -> Result<()>;

    /// Read the lines selected by `values.mask` into `values.bits`
    fn get_values(&mut self, values: &mut LineValues) -> Result<()>;
}

fn chip_path(controller: &str) -> PathBuf {
    if controller.starts_with('/') {
        PathBuf::from(controller)
    } else {
        PathBuf::from("/dev").join(controller)
    }
}

/// Offsets selected by `mask`, paired with their bank position
fn selected(offsets: &[Offset], mask: u64) -> impl Iterator<Item = (u64, Offset)> + '_ {
    offsets
        .iter()
        .enumerate()
        .map(|(i, &offset)| (1u64 << i, offset))
        .filter(move |&(bit, _)| mask & bit != 0)
}

/// Line request on a `/dev/gpiochipN` character device
pub struct ChipLineRequest {
    request: Request,
    offsets: Vec<Offset>,
}

impl ChipLineRequest {
    /// Request `offsets` as outputs on `controller`
    ///
    /// `controller` is either a chip name (`gpiochip0`) or a device path.
    /// The lines start out inactive.
    pub fn request(controller: &str, offsets: &[u32], consumer: &str) -> Result<Self> {
        let path = chip_path(controller);
        let request = Request::builder()
            .on_chip(path.as_path())
            .with_lines(offsets)
            .as_output(Value::Inactive)
            .with_consumer(consumer)
            .request()
            .map_err(|source| Nu801Error::GpioRequest {
                controller: controller.to_string(),
                offsets: offsets.to_vec(),
                source,
            })?;

        debug!("Requested lines {:?} on {}", offsets, path.display());
        Ok(Self {
            request,
            offsets: offsets.to_vec(),
        })
    }
}

impl LineRequest for ChipLineRequest {
    fn set_values(&mut self, values: &LineValues) -> Result<()> {
        let mut lines = Values::default();
        for (bit, offset) in selected(&self.offsets, values.mask) {
            let level = if values.bits & bit != 0 {
                Value::Active
            } else {
                Value::Inactive
            };
            lines.set(offset, level);
        }
        self.request
            .set_values(&lines)
            .map_err(|e| Nu801Error::GpioCommit(io::Error::other(e)))
    }

    fn get_values(&mut self, values: &mut LineValues) -> Result<()> {
        let mut lines = Values::default();
        for (_, offset) in selected(&self.offsets, values.mask) {
            lines.set(offset, Value::Inactive);
        }
        self.request
            .values(&mut lines)
            .map_err(|e| Nu801Error::GpioGet(io::Error::other(e)))?;

        values.bits = selected(&self.offsets, values.mask)
            .filter(|&(_, offset)| lines.get(offset) == Some(Value::Active))
            .fold(0, |bits, (bit, _)| bits | bit);
        Ok(())
    }
}

/// The 2 or 3 output lines wired to the chip
pub struct GpioBank<R: LineRequest> {
    line_count: usize,
    values: LineValues,
    request: Option<R>,
}

impl GpioBank<ChipLineRequest> {
    /// Request `offsets` (clock, data and optionally latch) on `controller`
    pub fn open(controller: &str, offsets: &[u32]) -> Result<Self> {
        debug!("Registering {} gpio lines", offsets.len());
        let request = ChipLineRequest::request(controller, offsets, CONSUMER)?;
        Self::with_request(offsets, request)
    }
}

impl<R: LineRequest> GpioBank<R> {
    /// Wrap an already granted request and read back the initial levels
    pub fn with_request(offsets: &[u32], mut request: R) -> Result<Self> {
        let mask = (0..offsets.len()).fold(0u64, |mask, i| mask | (1 << i));
        let mut values = LineValues { bits: 0, mask };
        request.get_values(&mut values)?;
        values.bits &= mask;
        debug!(
            "Initial states: bits={:#x} mask={:#x}",
            values.bits, values.mask
        );

        Ok(Self {
            line_count: offsets.len(),
            values,
            request: Some(request),
        })
    }

    pub fn line_count(&self) -> usize {
        self.line_count
    }

    /// Currently staged levels
    pub fn values(&self) -> LineValues {
        self.values
    }

    /// Stage a level; nothing reaches the hardware until [`commit`](Self::commit)
    pub fn set(&mut self, line: Line, level: bool) {
        self.values.assign(line, level);
    }

    /// Write the staged levels of all lines in one operation
    pub fn commit(&mut self) -> Result<()> {
        let request = self.request.as_mut().ok_or(Nu801Error::GpioReleased)?;
        request.set_values(&self.values)
    }

    pub fn is_released(&self) -> bool {
        self.request.is_none()
    }

    /// Give the lines back to the kernel. Later calls do nothing.
    pub fn release(&mut self) {
        self.request = None;
    }
}
