// SPDX-License-Identifier: GPL-2.0
//! Event loop and teardown
//!
//! [`Controller`] owns everything the daemon touches: the channels, the
//! GPIO bank and the protocol engine. [`Controller::run`] blocks in poll(2)
//! over all uleds handles (plus the shutdown wake-up pipe), applies new
//! brightness values and retransmits the whole frame on every wake. Every
//! way out of the loop ends in [`Controller::shutdown`].

use std::fs::File;
use std::io::Read;
use std::os::fd::AsFd;
use std::sync::atomic::{AtomicBool, Ordering};

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use tracing::{debug, error};

use crate::error::{Nu801Error, Result};
use crate::gpio::{GpioBank, LineRequest};
use crate::profile::MAX_CHANNELS;
use crate::protocol::{Delay, ProtocolEngine, ThreadDelay};
use crate::uleds::{Channel, Update};

/// Why the loop stopped without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The wake-up descriptor became readable
    Wakeup,
}

pub struct Controller<R: LineRequest, D: Delay = ThreadDelay> {
    channels: Vec<Channel>,
    bank: GpioBank<R>,
    engine: ProtocolEngine<D>,
    wakeup: Option<File>,
    torn_down: AtomicBool,
}

impl<R: LineRequest, D: Delay> Controller<R, D> {
    pub fn new(channels: Vec<Channel>, bank: GpioBank<R>, engine: ProtocolEngine<D>) -> Self {
        debug_assert!(channels.len() <= MAX_CHANNELS);
        Self {
            channels,
            bank,
            engine,
            wakeup: None,
            torn_down: AtomicBool::new(false),
        }
    }

    /// Stop the loop once `wakeup` becomes readable
    pub fn with_wakeup(mut self, wakeup: File) -> Self {
        self.wakeup = Some(wakeup);
        self
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn bank(&self) -> &GpioBank<R> {
        &self.bank
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }

    /// Transmit the current brightness of every channel
    pub fn commit(&mut self) -> Result<()> {
        let mut levels = [0u8; MAX_CHANNELS];
        let count = self.channels.len().min(MAX_CHANNELS);
        for (level, channel) in levels.iter_mut().zip(&self.channels) {
            *level = channel.brightness();
        }
        self.engine.transmit(&mut self.bank, &levels[..count])
    }

    /// Run until a channel goes away, the wait fails or the wake-up
    /// descriptor fires, then tear down
    ///
    /// The loop's own error wins; otherwise a failed teardown is returned.
    pub fn run(&mut self) -> Result<StopReason> {
        let outcome = self.event_loop();
        let teardown = self.shutdown();
        if let (Err(_), Err(e)) = (&outcome, &teardown) {
            error!("Failed to turn off LEDs: {}", e);
        }
        let reason = outcome?;
        teardown?;
        Ok(reason)
    }

    fn event_loop(&mut self) -> Result<StopReason> {
        loop {
            let (woken, ready) = self.wait()?;
            if woken {
                self.drain_wakeup();
                debug!("Shutdown requested");
                return Ok(StopReason::Wakeup);
            }

            for (i, channel) in self.channels.iter_mut().enumerate() {
                if !ready[i] {
                    continue;
                }
                debug!(
                    "LED {} has new data (old brightness: {})",
                    i,
                    channel.brightness()
                );
                match channel.read_update() {
                    Update::Brightness(brightness) => {
                        debug!("Set LED {} to brightness {}", i, brightness);
                        channel.set_brightness(brightness);
                    }
                    Update::Pending => {}
                    Update::EndOfStream => {
                        return Err(Nu801Error::EndOfStream(channel.name().to_string()));
                    }
                }
            }

            debug!("Committing new brightness values to NU801");
            self.commit()?;
        }
    }

    /// Block until something is readable. Returns (wakeup fired, ready
    /// channels).
    fn wait(&self) -> Result<(bool, [bool; MAX_CHANNELS])> {
        let interesting = PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR;

        loop {
            let mut fds = Vec::with_capacity(MAX_CHANNELS + 1);
            if let Some(wakeup) = &self.wakeup {
                fds.push(PollFd::new(wakeup.as_fd(), PollFlags::POLLIN));
            }
            let first_channel = fds.len();
            let mut owners = [0usize; MAX_CHANNELS];
            for (i, channel) in self.channels.iter().enumerate() {
                if let Some(fd) = channel.poll_handle() {
                    owners[fds.len() - first_channel] = i;
                    fds.push(PollFd::new(fd, PollFlags::POLLIN));
                }
            }

            debug!("Polling LEDs...");
            match poll(&mut fds, PollTimeout::NONE) {
                Ok(_) => {}
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(Nu801Error::Wait(e)),
            }

            let is_ready = |fd: &PollFd| fd.revents().is_some_and(|r| r.intersects(interesting));
            let woken = first_channel == 1 && is_ready(&fds[0]);
            let mut ready = [false; MAX_CHANNELS];
            for (k, fd) in fds[first_channel..].iter().enumerate() {
                ready[owners[k]] = is_ready(fd);
            }
            return Ok((woken, ready));
        }
    }

    fn drain_wakeup(&mut self) {
        if let Some(wakeup) = self.wakeup.as_mut() {
            let mut buf = [0u8; 16];
            while matches!(wakeup.read(&mut buf), Ok(n) if n > 0) {}
        }
    }

    /// Turn every LED off, release the GPIO lines and close the channels
    ///
    /// Runs its body at most once; later calls return `Ok(false)` without
    /// touching the hardware. The lines are released and the channels closed
    /// even if the all-off frame fails, in which case that error is returned.
    pub fn shutdown(&mut self) -> Result<bool> {
        if self
            .torn_down
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(false);
        }

        for channel in &mut self.channels {
            channel.set_brightness(0);
        }
        let all_off = if self.bank.is_released() {
            Ok(())
        } else {
            self.commit()
        };
        self.bank.release();
        for channel in &mut self.channels {
            channel.close();
        }

        all_off.map(|()| true)
    }
}

impl<R: LineRequest, D: Delay> Drop for Controller<R, D> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!("Failed to turn off LEDs: {}", e);
        }
    }
}
