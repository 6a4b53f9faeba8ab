//! Delivery statistics.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::session::{Delivery, DropReason};

/// Counters describing what a monitor did with the audio it received.
///
/// Counts accumulate across resets for the lifetime of the monitor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorStats {
    /// Buffers written to the device.
    pub buffers_written: u64,
    /// Buffers released as silence while the source was muted.
    pub buffers_silenced: u64,
    /// Frames written to the device, in the device's rate.
    pub frames_written: u64,
    /// Buffers dropped because a reset or destroy held the session.
    pub dropped_lock_busy: u64,
    /// Buffers dropped because no session was open.
    pub dropped_no_session: u64,
    /// Buffers dropped because the source was inactive.
    pub dropped_inactive: u64,
    /// Buffers the converter rejected.
    pub dropped_conversion: u64,
    /// Buffers that converted to zero frames.
    pub dropped_empty: u64,
    /// Buffers dropped because the device was too far behind.
    pub dropped_backpressure: u64,
    /// Buffers dropped because no write region was available.
    pub dropped_buffer_unavailable: u64,
}

impl MonitorStats {
    /// Total buffers dropped for any reason.
    pub fn dropped(&self) -> u64 {
        self.dropped_lock_busy
            + self.dropped_no_session
            + self.dropped_inactive
            + self.dropped_conversion
            + self.dropped_empty
            + self.dropped_backpressure
            + self.dropped_buffer_unavailable
    }
}

/// Lock-free counters updated from the audio thread.
#[derive(Default)]
pub(crate) struct StatsCounters {
    buffers_written: AtomicU64,
    buffers_silenced: AtomicU64,
    frames_written: AtomicU64,
    dropped_lock_busy: AtomicU64,
    dropped_no_session: AtomicU64,
    dropped_inactive: AtomicU64,
    dropped_conversion: AtomicU64,
    dropped_empty: AtomicU64,
    dropped_backpressure: AtomicU64,
    dropped_buffer_unavailable: AtomicU64,
}

impl StatsCounters {
    pub fn record(&self, delivery: Delivery) {
        match delivery {
            Delivery::Written { frames } => {
                self.buffers_written.fetch_add(1, Ordering::Relaxed);
                self.frames_written
                    .fetch_add(u64::from(frames), Ordering::Relaxed);
            }
            Delivery::Silenced { .. } => {
                self.buffers_silenced.fetch_add(1, Ordering::Relaxed);
            }
            Delivery::Dropped(reason) => {
                self.dropped(reason).fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn dropped(&self, reason: DropReason) -> &AtomicU64 {
        match reason {
            DropReason::LockBusy => &self.dropped_lock_busy,
            DropReason::NoSession => &self.dropped_no_session,
            DropReason::Inactive => &self.dropped_inactive,
            DropReason::ConversionFailed => &self.dropped_conversion,
            DropReason::Empty => &self.dropped_empty,
            DropReason::Backpressure => &self.dropped_backpressure,
            DropReason::BufferUnavailable => &self.dropped_buffer_unavailable,
        }
    }

    pub fn snapshot(&self) -> MonitorStats {
        MonitorStats {
            buffers_written: self.buffers_written.load(Ordering::Relaxed),
            buffers_silenced: self.buffers_silenced.load(Ordering::Relaxed),
            frames_written: self.frames_written.load(Ordering::Relaxed),
            dropped_lock_busy: self.dropped_lock_busy.load(Ordering::Relaxed),
            dropped_no_session: self.dropped_no_session.load(Ordering::Relaxed),
            dropped_inactive: self.dropped_inactive.load(Ordering::Relaxed),
            dropped_conversion: self.dropped_conversion.load(Ordering::Relaxed),
            dropped_empty: self.dropped_empty.load(Ordering::Relaxed),
            dropped_backpressure: self.dropped_backpressure.load(Ordering::Relaxed),
            dropped_buffer_unavailable: self.dropped_buffer_unavailable.load(Ordering::Relaxed),
        }
    }
}
