use std::sync::Mutex;
use std::time::Instant;

/// The authoritative UTC mapping, anchored to a monotonic tick.
///
/// `set` is called only from the serial reader thread; `sample` is called
/// from every request handler. Both critical sections are a handful of
/// field reads/writes plus one monotonic clock read, never allocating.
pub struct TimeRef {
    configured_serial_delay: f64,
    state: Mutex<State>,
}

struct State {
    gps_utc: f64,
    anchor_mono: Instant,
    root_delay: f64,
}

impl TimeRef {
    /// `configured_serial_delay` is the mean one-way serial transport delay
    /// measured by the external `setup` collaborator (`SERIAL_DELAY`).
    pub fn new(configured_serial_delay: f64) -> Self {
        TimeRef {
            configured_serial_delay,
            state: Mutex::new(State {
                gps_utc: 0.0,
                anchor_mono: Instant::now(),
                root_delay: 0.0,
            }),
        }
    }

    /// Records a freshly decoded GPS UTC instant.
    ///
    /// `utc == 0.0` is the sentinel `NmeaDecoder` uses for a failed decode
    /// and is a no-op here — state is left exactly as it was.
    ///
    /// `mono_before_read` is the monotonic tick captured immediately after
    /// the serial line was read, before decoding; the gap between it and
    /// "now" measures how long the sentence spent traversing the serial
    /// layer after the GPS emitted it.
    pub fn set(&self, utc: f64, mono_before_read: Instant) {
        if utc == 0.0 {
            return;
        }

        let anchor_mono = Instant::now();
        let root_delay = anchor_mono
            .saturating_duration_since(mono_before_read)
            .as_secs_f64()
            + self.configured_serial_delay;

        let mut state = self.state.lock().unwrap();
        state.gps_utc = utc;
        state.anchor_mono = anchor_mono;
        state.root_delay = root_delay;
    }

    /// Returns `(current_utc, reference_utc, root_delay)`.
    ///
    /// `current_utc` extrapolates the last GPS fix forward by the elapsed
    /// monotonic time plus `root_delay`, biasing the estimate by the known
    /// one-way transport delay so the error distribution centres on zero.
    pub fn sample(&self) -> (f64, f64, f64) {
        let state = self.state.lock().unwrap();
        let elapsed = Instant::now()
            .saturating_duration_since(state.anchor_mono)
            .as_secs_f64();
        let current_utc = state.gps_utc + elapsed + state.root_delay;
        (current_utc, state.gps_utc, state.root_delay)
    }
}
