//! Process-wide control flags

use std::sync::atomic::{AtomicBool, Ordering};

/// Audio and demo flags shared by the extractor, interpreter and sequencer
///
/// Starts as `{audio_enabled: false, demo_running: false}`. Every transition
/// helper reports whether it changed anything, so callers can make their
/// side effects idempotent.
#[derive(Debug, Default)]
pub struct ControlState {
    audio_enabled: AtomicBool,
    demo_running: AtomicBool,
    capture_faulted: AtomicBool,
}

impl ControlState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_audio_enabled(&self) -> bool {
        self.audio_enabled.load(Ordering::Acquire)
    }

    /// Returns true if audio was off before
    pub fn enable_audio(&self) -> bool {
        !self.audio_enabled.swap(true, Ordering::AcqRel)
    }

    /// Returns true if audio was on before
    pub fn disable_audio(&self) -> bool {
        self.audio_enabled.swap(false, Ordering::AcqRel)
    }

    pub fn is_demo_running(&self) -> bool {
        self.demo_running.load(Ordering::Acquire)
    }

    /// Claims the demo slot; false if a demo is already running
    pub fn try_start_demo(&self) -> bool {
        self.demo_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Returns true if a demo was running
    pub fn stop_demo(&self) -> bool {
        self.demo_running.swap(false, Ordering::AcqRel)
    }

    /// Capture device failed for good; audio stays off until restart
    pub fn mark_capture_faulted(&self) {
        self.capture_faulted.store(true, Ordering::Release);
        self.audio_enabled.store(false, Ordering::Release);
    }

    pub fn is_capture_faulted(&self) -> bool {
        self.capture_faulted.load(Ordering::Acquire)
    }
}
