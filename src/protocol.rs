// SPDX-License-Identifier: GPL-2.0
//! NU801 wire protocol
//!
//! There's no fancy protocol: the 16-bit PWM value of every channel is
//! shifted out MSB first, one channel after the other, data sampled on the
//! rising clock edge. The shifted data is then latched either by pulsing the
//! LEI line (3-wire) or, on boards without LEI, by keeping the clock high for
//! more than 600us on the very last bit (2-wire). From the datasheet:
//!
//! > When clock signal keep high for more than 600us, NU801 will generate an
//! > internal pseudo LE signal. That will trigger the data latch circuit to
//! > hold the luminance data.

use std::time::Duration;

use crate::error::Result;
use crate::gpio::{GpioBank, Line, LineRequest};
use crate::profile::HardwareProfile;

/// Clock-high time that makes the chip generate its internal latch
pub const PSEUDO_LATCH_HOLD: Duration = Duration::from_micros(600);

/// 8-bit LED class brightness to the chip's 16-bit PWM value
///
/// Full brightness is 0xFF00, not 0xFFFF. This matches the kernel's
/// leds-nu801 driver bit for bit.
pub const fn hardware_value(brightness: u8) -> u16 {
    (brightness as u16) << 8
}

/// How shifted data gets latched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatchMode {
    /// 2-wire: hold the clock high on the last bit
    Pseudo,
    /// 3-wire: pulse the latch line after the last bit
    Line,
}

impl LatchMode {
    pub fn for_profile(profile: &HardwareProfile) -> Self {
        if profile.has_latch_line() {
            LatchMode::Line
        } else {
            LatchMode::Pseudo
        }
    }
}

/// Timing source for the engine
pub trait Delay {
    fn delay(&mut self, duration: Duration);
}

/// Sleeps the calling thread
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadDelay;

impl Delay for ThreadDelay {
    fn delay(&mut self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Shifts brightness frames into the chip
#[derive(Debug)]
pub struct ProtocolEngine<D: Delay = ThreadDelay> {
    latch: LatchMode,
    bit_delay: Duration,
    delay: D,
}

impl ProtocolEngine<ThreadDelay> {
    pub fn new(profile: &HardwareProfile) -> Self {
        Self::with_delay(LatchMode::for_profile(profile), profile.bit_delay(), ThreadDelay)
    }
}

impl<D: Delay> ProtocolEngine<D> {
    pub fn with_delay(latch: LatchMode, bit_delay: Duration, delay: D) -> Self {
        Self {
            latch,
            bit_delay,
            delay,
        }
    }

    pub fn latch_mode(&self) -> LatchMode {
        self.latch
    }

    pub fn bit_delay(&self) -> Duration {
        self.bit_delay
    }

    pub fn set_bit_delay(&mut self, bit_delay: Duration) {
        self.bit_delay = bit_delay;
    }

    /// Transmit one frame: every channel's value, then the latch
    ///
    /// `levels[0]` goes out first. A failed commit aborts the frame; the
    /// partial frame is not resumed.
    pub fn transmit<R: LineRequest>(
        &mut self,
        bank: &mut GpioBank<R>,
        levels: &[u8],
    ) -> Result<()> {
        let last = levels.len().saturating_sub(1);
        for (i, &brightness) in levels.iter().enumerate() {
            let hwval = hardware_value(brightness);

            let mut bit: u16 = 0x8000;
            while bit != 0 {
                bank.set(Line::Data, hwval & bit != 0);
                bank.set(Line::Clock, true);
                bank.commit()?;

                if i == last && bit == 1 && self.latch == LatchMode::Pseudo {
                    self.delay.delay(PSEUDO_LATCH_HOLD);
                }

                bank.set(Line::Clock, false);
                bank.commit()?;

                self.delay.delay(self.bit_delay);
                bit >>= 1;
            }
        }

        if self.latch == LatchMode::Line {
            bank.set(Line::Latch, true);
            bank.commit()?;
            self.delay.delay(self.bit_delay);
            bank.set(Line::Latch, false);
            bank.commit()?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpio::LineValues;

    #[derive(Default)]
    struct Wire {
        commits: Vec<u64>,
    }

    impl LineRequest for &mut Wire {
        fn set_values(&mut self, values: &LineValues) -> Result<()> {
            self.commits.push(values.bits);
            Ok(())
        }

        fn get_values(&mut self, _values: &mut LineValues) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct Holds(Vec<Duration>);

    impl Delay for &mut Holds {
        fn delay(&mut self, duration: Duration) {
            self.0.push(duration);
        }
    }

    #[test]
    fn test_hardware_value() {
        assert_eq!(hardware_value(0), 0x0000);
        assert_eq!(hardware_value(1), 0x0100);
        assert_eq!(hardware_value(127), 0x7F00);
        assert_eq!(hardware_value(255), 0xFF00);
        for b in 0..=255u8 {
            assert_eq!(u32::from(hardware_value(b)), u32::from(b) * 256);
            assert_eq!(hardware_value(b) & 0x00FF, 0);
        }
    }

    #[test]
    fn test_single_channel_bit_order() {
        let mut wire = Wire::default();
        let mut holds = Holds::default();
        {
            let mut bank = GpioBank::with_request(&[0, 1], &mut wire).unwrap();
            let mut engine =
                ProtocolEngine::with_delay(LatchMode::Pseudo, Duration::ZERO, &mut holds);
            engine.transmit(&mut bank, &[0xA5]).unwrap();
        }

        // Two commits per bit: rising edge with data, then falling edge
        assert_eq!(wire.commits.len(), 32);
        let sampled: Vec<bool> = wire
            .commits
            .chunks(2)
            .map(|edge| {
                assert_eq!(edge[0] & Line::Clock.bit(), Line::Clock.bit());
                assert_eq!(edge[1] & Line::Clock.bit(), 0);
                edge[0] & Line::Data.bit() != 0
            })
            .collect();
        let value = sampled.iter().fold(0u16, |acc, &b| (acc << 1) | u16::from(b));
        assert_eq!(value, 0xA500);

        assert_eq!(
            holds.0.iter().filter(|d| **d == PSEUDO_LATCH_HOLD).count(),
            1
        );
    }

    #[test]
    fn test_latch_line_pulse() {
        let mut wire = Wire::default();
        let mut holds = Holds::default();
        {
            let mut bank = GpioBank::with_request(&[0, 1, 2], &mut wire).unwrap();
            let mut engine =
                ProtocolEngine::with_delay(LatchMode::Line, Duration::from_nanos(150), &mut holds);
            engine.transmit(&mut bank, &[255]).unwrap();
        }

        assert_eq!(wire.commits.len(), 34);
        let tail = &wire.commits[32..];
        assert_eq!(tail[0] & Line::Latch.bit(), Line::Latch.bit());
        assert_eq!(tail[1] & Line::Latch.bit(), 0);
        assert!(wire.commits[..32].iter().all(|bits| bits & Line::Latch.bit() == 0));
        assert!(!holds.0.contains(&PSEUDO_LATCH_HOLD));
        // One delay per bit plus one inside the latch pulse
        assert_eq!(holds.0.len(), 17);
    }

    #[test]
    fn test_latch_mode_for_profile() {
        let three_wire = crate::profile::SUPPORTED_HARDWARE[0];
        assert_eq!(LatchMode::for_profile(&three_wire), LatchMode::Line);

        let mut two_wire = three_wire;
        two_wire.lines.latch = None;
        assert_eq!(LatchMode::for_profile(&two_wire), LatchMode::Pseudo);
    }
}
