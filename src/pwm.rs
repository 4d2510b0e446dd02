use crate::gpio::{GpioPin, PinDirection};
use log::{debug, warn};
use parking_lot::{Condvar, Mutex};
use std::error::Error;
use std::fmt::Display;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

#[derive(Debug, PartialEq)]
pub enum PwmError {
    InvalidConfig(String),
    OsError(String),
}

impl Display for PwmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&match self {
            PwmError::InvalidConfig(msg) => format!("invalid PWM config: {}", msg),
            PwmError::OsError(msg) => format!("PWM OS error: {}", msg),
        })
    }
}

impl Error for PwmError {}

pub(crate) fn period_micros(frequency_hz: u32) -> u64 {
    1_000_000 / frequency_hz as u64
}

/// High-phase duration for a signal value in permille of the period. The
/// two-step integer scaling (divide by 10, then by 100) is the calibration
/// convention the hardware was tuned against; keep it.
pub(crate) fn signal_micros(period_micros: u64, signal: u32) -> u64 {
    period_micros * (signal as u64 / 10) / 100
}

pub(crate) fn validate(frequency_hz: u32, signal: u32) -> Result<(), PwmError> {
    if frequency_hz == 0 {
        return Err(PwmError::InvalidConfig(
            "frequency must be greater than zero".to_string(),
        ));
    }

    if signal > 1000 {
        return Err(PwmError::InvalidConfig(format!(
            "signal must be 0 - 1000 permille, got {}",
            signal
        )));
    }

    Ok(())
}

struct PwmShared {
    running: AtomicBool,
    signal_micros: AtomicU64,
    wakeup_lock: Mutex<()>,
    wakeup: Condvar,
}

impl PwmShared {
    /// Sleep that a shutdown can interrupt, so teardown latency is bounded
    /// by one wakeup instead of one full sleep interval.
    fn pause(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }

        let mut guard = self.wakeup_lock.lock();
        if !self.running.load(Ordering::SeqCst) {
            return;
        }

        self.wakeup.wait_for(&mut guard, duration);
    }
}

/// Software-timed PWM: toggles an output pin from a background thread.
///
/// The pin is shared via `Arc`, so the line always outlives the generator.
/// Timing is drift-compensated: the low-phase sleep is the period minus the
/// time the cycle has already consumed, which keeps the long-run average
/// frequency on target even though individual edges are not interrupt-
/// accurate.
pub struct SoftwarePwm {
    shared: Arc<PwmShared>,
    period_micros: u64,
    worker: Option<JoinHandle<()>>,
}

impl SoftwarePwm {
    /// `signal` is the duty value in permille (0 - 1000).
    pub fn new(pin: Arc<GpioPin>, frequency_hz: u32, signal: u32) -> Result<Self, PwmError> {
        validate(frequency_hz, signal)?;

        if pin.direction() != PinDirection::Out {
            return Err(PwmError::InvalidConfig(format!(
                "pin {} is not configured as an output",
                pin.port()
            )));
        }

        let period = period_micros(frequency_hz);
        let high = signal_micros(period, signal);
        debug!(
            "pwm on pin {}: period {} us, signal {} us",
            pin.port(),
            period,
            high
        );

        let shared = Arc::new(PwmShared {
            running: AtomicBool::new(true),
            signal_micros: AtomicU64::new(high),
            wakeup_lock: Mutex::new(()),
            wakeup: Condvar::new(),
        });

        let worker_shared = shared.clone();
        let worker = thread::Builder::new()
            .name(format!("pwm-gpio{}", pin.port()))
            .spawn(move || pwm_loop(worker_shared, pin, period))
            .map_err(|err| PwmError::OsError(format!("could not spawn PWM thread: {}", err)))?;

        Ok(SoftwarePwm {
            shared,
            period_micros: period,
            worker: Some(worker),
        })
    }

    pub fn period_micros(&self) -> u64 {
        self.period_micros
    }

    /// Update the duty value. Never blocks; the toggling thread picks the
    /// new high time up at the start of its next cycle.
    pub fn change_signal(&self, signal: u32) {
        let signal = match signal > 1000 {
            true => {
                warn!("pwm signal {} out of range, clamping to 1000", signal);
                1000
            }
            false => signal,
        };

        let high = signal_micros(self.period_micros, signal);
        self.shared.signal_micros.store(high, Ordering::SeqCst);
        debug!("pwm signal time is now {} us", high);
    }
}

impl Drop for SoftwarePwm {
    fn drop(&mut self) {
        debug!("stopping software pwm");
        self.shared.running.store(false, Ordering::SeqCst);

        // the worker is either about to check the flag or already waiting
        drop(self.shared.wakeup_lock.lock());
        self.shared.wakeup.notify_all();

        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn pwm_loop(shared: Arc<PwmShared>, pin: Arc<GpioPin>, period_micros: u64) {
    let period = Duration::from_micros(period_micros);

    while shared.running.load(Ordering::SeqCst) {
        let cycle_start = Instant::now();
        let high = Duration::from_micros(shared.signal_micros.load(Ordering::SeqCst));

        if let Err(err) = pin.write_value(1) {
            warn!("pwm write failed on pin {}: {}", pin.port(), err);
        }
        shared.pause(high);

        if let Err(err) = pin.write_value(0) {
            warn!("pwm write failed on pin {}: {}", pin.port(), err);
        }

        // a high-phase overrun shrinks the low-phase sleep accordingly
        shared.pause(period.saturating_sub(cycle_start.elapsed()));
    }
}
