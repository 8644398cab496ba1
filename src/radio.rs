//! Radio shim: the narrow surface the scheduler uses to drive the physical
//! radio, plus the staging area that the three completion callbacks
//! (`on_tx_done`, `on_tx_timeout`, `on_rx_done`) write into.
//!
//! The callbacks run at a priority distinct from the main tick (a real IRQ,
//! or in the simulator/tests, another thread). Their only permitted actions
//! are to copy received bytes into the staging buffer and toggle flags —
//! never touch the scheduler, queue, or tables directly. [`RadioStaging`]
//! is built on `embassy_sync`'s blocking mutex, the same primitive the
//! teacher uses for state shared across its UI/simulation thread boundary,
//! so the flag-plus-buffer write is released under one critical section.
//!
//! A real half-duplex radio only ever has one frame in flight, but nothing
//! guarantees the main tick drains a reception before the next one lands —
//! on shared media, two frames can arrive back to back. The received side
//! of the staging area is therefore a small bounded FIFO rather than a
//! single slot: at most one frame is handled per tick (the scheduler only
//! ever calls [`RadioStaging::take_received`] once per pass), but none are
//! silently clobbered while they wait their turn.

use core::cell::RefCell;
use std::collections::VecDeque;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

use crate::config::MAX_PACKET_SIZE;

/// Bound on queued-but-undrained receptions. Overflow is logged and the
/// new frame is dropped, the same "log and continue" policy the rest of
/// the crate uses for soft-capacity overflows.
const MAX_STAGED_FRAMES: usize = 8;

/// Narrow facade over the physical radio driver. A host implements this
/// against real hardware; [`crate::radio::loopback`] provides one for tests.
pub trait RadioDevice {
    /// Initiate transmission of `bytes`. Completion is reported later via
    /// [`RadioStaging::on_tx_done`] or [`RadioStaging::on_tx_timeout`].
    fn send(&mut self, bytes: &[u8]);
    /// Arm passive (continuous) reception.
    fn receive(&mut self);
    /// Give the driver CPU time to service its hardware queues/interrupts.
    fn process_irq(&mut self);
}

/// A successfully received frame, staged until the main tick drains it.
#[derive(Debug, Clone, Default)]
pub struct ReceivedFrame {
    pub bytes: Vec<u8>,
    pub rssi: i16,
    pub snr: i8,
}

#[derive(Debug, Default)]
struct StagingState {
    tx_done: bool,
    tx_error: bool,
    received: VecDeque<ReceivedFrame>,
}

/// Single-writer (callback) / single-reader (main tick) staging area for
/// the three radio completion flags and the received-frame buffer.
pub struct RadioStaging {
    inner: Mutex<CriticalSectionRawMutex, RefCell<StagingState>>,
}

impl Default for RadioStaging {
    fn default() -> Self {
        Self::new()
    }
}

impl RadioStaging {
    pub fn new() -> Self {
        RadioStaging {
            inner: Mutex::new(RefCell::new(StagingState::default())),
        }
    }

    /// Callback: a transmission completed successfully.
    pub fn on_tx_done(&self) {
        self.inner.lock(|cell| cell.borrow_mut().tx_done = true);
    }

    /// Callback: a transmission timed out. Treated as "radio free again";
    /// any in-flight DATA stays tracked in the pending-ACK table and will
    /// retry on its own schedule.
    pub fn on_tx_timeout(&self) {
        self.inner.lock(|cell| cell.borrow_mut().tx_error = true);
    }

    /// Callback: a frame was received. Silently dropped if it exceeds
    /// [`MAX_PACKET_SIZE`], or if [`MAX_STAGED_FRAMES`] are already queued
    /// and undrained (logged, since that case means the main tick has
    /// fallen behind the channel rather than a routine oversize frame).
    pub fn on_rx_done(&self, bytes: &[u8], rssi: i16, snr: i8) {
        if bytes.len() > MAX_PACKET_SIZE {
            return;
        }
        self.inner.lock(|cell| {
            let mut state = cell.borrow_mut();
            if state.received.len() >= MAX_STAGED_FRAMES {
                log::warn!("radio staging queue full, dropping received frame");
                return;
            }
            state.received.push_back(ReceivedFrame {
                bytes: bytes.to_vec(),
                rssi,
                snr,
            });
        });
    }

    /// Take and clear the tx-done flag.
    pub fn take_tx_done(&self) -> bool {
        self.inner.lock(|cell| core::mem::take(&mut cell.borrow_mut().tx_done))
    }

    /// Take and clear the tx-error flag.
    pub fn take_tx_error(&self) -> bool {
        self.inner.lock(|cell| core::mem::take(&mut cell.borrow_mut().tx_error))
    }

    /// Take the oldest staged received frame, if any. Frames that arrived
    /// while an earlier one was still undrained are served in order on
    /// subsequent calls rather than being clobbered by the latest arrival.
    pub fn take_received(&self) -> Option<ReceivedFrame> {
        self.inner.lock(|cell| cell.borrow_mut().received.pop_front())
    }
}

/// An in-process loopback radio for tests: frames sent by one node are
/// delivered to every other node sharing the same [`LoopbackChannel`],
/// the same separation of protocol logic from device I/O the teacher's
/// own `radio_devices::simulator::RadioDevice` establishes.
#[cfg(any(test, feature = "loopback-radio"))]
pub mod loopback {
    use super::RadioStaging;
    use std::rc::Rc;
    use std::sync::Mutex as StdMutex;

    /// Shared medium: every [`LoopbackRadio`] attached to the same channel
    /// observes every other attached radio's transmissions.
    #[derive(Default)]
    pub struct LoopbackChannel {
        listeners: StdMutex<Vec<Rc<RadioStaging>>>,
    }

    impl LoopbackChannel {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn attach(&self, staging: Rc<RadioStaging>) {
            self.listeners.lock().unwrap().push(staging);
        }

        fn broadcast(&self, from: *const RadioStaging, bytes: &[u8], rssi: i16) {
            for listener in self.listeners.lock().unwrap().iter() {
                if Rc::as_ptr(listener) as *const RadioStaging != from {
                    listener.on_rx_done(bytes, rssi, 0);
                }
            }
        }
    }

    /// A [`super::RadioDevice`] that delivers every send to every other
    /// radio on the same [`LoopbackChannel`] at a fixed simulated RSSI.
    pub struct LoopbackRadio<'a> {
        staging: Rc<RadioStaging>,
        channel: &'a LoopbackChannel,
        simulated_rssi: i16,
    }

    impl<'a> LoopbackRadio<'a> {
        pub fn new(staging: Rc<RadioStaging>, channel: &'a LoopbackChannel, simulated_rssi: i16) -> Self {
            channel.attach(staging.clone());
            LoopbackRadio {
                staging,
                channel,
                simulated_rssi,
            }
        }
    }

    impl<'a> super::RadioDevice for LoopbackRadio<'a> {
        fn send(&mut self, bytes: &[u8]) {
            self.channel
                .broadcast(Rc::as_ptr(&self.staging), bytes, self.simulated_rssi);
            self.staging.on_tx_done();
        }

        fn receive(&mut self) {}

        fn process_irq(&mut self) {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversize_reception_leaves_flag_unset() {
        let staging = RadioStaging::new();
        let oversize = vec![0u8; MAX_PACKET_SIZE + 1];
        staging.on_rx_done(&oversize, -50, 5);
        assert!(staging.take_received().is_none());
    }

    #[test]
    fn flags_are_read_once_then_cleared() {
        let staging = RadioStaging::new();
        staging.on_tx_done();
        assert!(staging.take_tx_done());
        assert!(!staging.take_tx_done());
    }

    #[test]
    fn received_frame_is_staged_and_drained_once() {
        let staging = RadioStaging::new();
        staging.on_rx_done(&[1, 2, 3], -70, 8);
        let frame = staging.take_received().expect("frame staged");
        assert_eq!(frame.bytes, vec![1, 2, 3]);
        assert_eq!(frame.rssi, -70);
        assert!(staging.take_received().is_none());
    }

    #[test]
    fn multiple_receptions_queue_fifo_instead_of_clobbering() {
        let staging = RadioStaging::new();
        staging.on_rx_done(&[1], -40, 0);
        staging.on_rx_done(&[2], -50, 0);
        staging.on_rx_done(&[3], -60, 0);

        let first = staging.take_received().expect("first frame staged");
        assert_eq!(first.bytes, vec![1]);
        let second = staging.take_received().expect("second frame staged");
        assert_eq!(second.bytes, vec![2]);
        let third = staging.take_received().expect("third frame staged");
        assert_eq!(third.bytes, vec![3]);
        assert!(staging.take_received().is_none());
    }

    #[test]
    fn overflow_beyond_capacity_is_dropped_and_logged() {
        let staging = RadioStaging::new();
        for i in 0..(MAX_STAGED_FRAMES + 2) {
            staging.on_rx_done(&[i as u8], -40, 0);
        }
        let mut drained = Vec::new();
        while let Some(frame) = staging.take_received() {
            drained.push(frame.bytes[0]);
        }
        assert_eq!(drained.len(), MAX_STAGED_FRAMES);
        // The oldest MAX_STAGED_FRAMES frames survive; later arrivals are dropped.
        assert_eq!(drained, (0..MAX_STAGED_FRAMES as u8).collect::<Vec<_>>());
    }
}
