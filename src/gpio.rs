use inotify::{EventMask, Inotify, WatchDescriptor, WatchMask, Watches};
use log::{debug, error, warn};
use parking_lot::Mutex;
use std::error::Error;
use std::fmt::Display;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const GPIO_BASE_PATH: &str = "/sys/class/gpio";
const GPIO_EXPORT_PATH: &str = "/sys/class/gpio/export";
const GPIO_UNEXPORT_PATH: &str = "/sys/class/gpio/unexport";

// newly exported attribute files need a moment before udev fixes up access
const EXPORT_SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Sentinel returned by [`GpioPin::read`] when the value stream could not be
/// read or parsed.
pub const READ_FAILED: i32 = -1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum PinDirection {
    In,
    Out,
}

/// Edge configuration written to the line's `edge` attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum PinTrigger {
    None,
    Falling,
    Rising,
    Both,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum PinValue {
    Off,
    On,
}

#[derive(Debug, PartialEq)]
pub enum GpioError {
    ConfigError(String),
    OsError(String),
}

impl Display for GpioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&match self {
            GpioError::ConfigError(msg) => format!("GPIO configuration failed: {}", msg),
            GpioError::OsError(msg) => format!("GPIO OS error: {}", msg),
        })
    }
}

impl Error for GpioError {}

/// Callback invoked by the edge watcher with the line id and the value read
/// right after the event.
pub type PinChangeCallback = Box<dyn Fn(&str, i32) + Send + 'static>;

struct PinShared {
    port: String,
    value_file: Mutex<File>,
    callback: Mutex<Option<PinChangeCallback>>,
    watcher_run: AtomicBool,
}

impl PinShared {
    fn read_value(&self) -> i32 {
        let mut file = self.value_file.lock();

        if let Err(err) = file.seek(SeekFrom::Start(0)) {
            error!("gpio{}: seek on value stream failed: {}", self.port, err);
            return READ_FAILED;
        }

        let mut raw = [0u8; 1];
        match file.read(&mut raw) {
            Ok(0) => {
                error!("gpio{}: nothing to read from value stream", self.port);
                READ_FAILED
            }
            Ok(_) => match (raw[0] as char).to_digit(10) {
                Some(value) => value as i32,
                None => {
                    error!(
                        "gpio{}: value stream returned a non-digit byte {:#04x}",
                        self.port, raw[0]
                    );
                    READ_FAILED
                }
            },
            Err(err) => {
                warn!("gpio{}: value stream read failed: {}", self.port, err);
                READ_FAILED
            }
        }
    }
}

/// One kernel-exported GPIO line.
///
/// Construction exports the line, fixes its direction and edge trigger and
/// keeps a persistent stream to the `value` attribute. If the trigger is not
/// [`PinTrigger::None`], a background watcher turns kernel file-change
/// notifications into calls of the registered callback. Dropping the pin
/// stops the watcher and unexports the line.
///
/// Exporting is a process-wide OS side effect; creating two `GpioPin`s for
/// the same physical line is a caller error.
pub struct GpioPin {
    shared: Arc<PinShared>,
    direction: PinDirection,
    trigger: PinTrigger,
    watcher: Option<JoinHandle<()>>,
    watch: Option<(Watches, WatchDescriptor)>,
}

impl GpioPin {
    pub fn new(port: &str, direction: PinDirection, trigger: PinTrigger) -> Result<Self, GpioError> {
        debug!("creating pin {} as {} with trigger {}", port, direction, trigger);

        fs::write(GPIO_EXPORT_PATH, port).map_err(|err| {
            error!("gpio{}: export failed: {}", port, err);
            GpioError::ConfigError(format!("could not export pin {}: {}", port, err))
        })?;

        thread::sleep(EXPORT_SETTLE_DELAY);

        let pin_dir = pin_path(port);
        fs::write(pin_dir.join("direction"), direction.to_string()).map_err(|err| {
            error!("gpio{}: could not configure direction {}: {}", port, direction, err);
            GpioError::ConfigError(format!("could not configure pin {}: {}", port, err))
        })?;

        let value_file = OpenOptions::new()
            .read(true)
            .write(direction == PinDirection::Out)
            .open(pin_dir.join("value"))
            .map_err(|err| {
                error!("gpio{}: could not open value stream: {}", port, err);
                GpioError::ConfigError(format!("could not open value stream of pin {}: {}", port, err))
            })?;

        fs::write(pin_dir.join("edge"), trigger.to_string()).map_err(|err| {
            error!("gpio{}: could not configure trigger {}: {}", port, trigger, err);
            GpioError::ConfigError(format!("could not configure pin {}: {}", port, err))
        })?;

        let mut pin = GpioPin {
            shared: Arc::new(PinShared {
                port: port.to_string(),
                value_file: Mutex::new(value_file),
                callback: Mutex::new(None),
                watcher_run: AtomicBool::new(false),
            }),
            direction,
            trigger,
            watcher: None,
            watch: None,
        };

        if trigger != PinTrigger::None {
            pin.start_watcher(&pin_dir)?;
        }

        Ok(pin)
    }

    pub fn new_output(port: &str) -> Result<Self, GpioError> {
        Self::new(port, PinDirection::Out, PinTrigger::None)
    }

    pub fn new_input(port: &str) -> Result<Self, GpioError> {
        Self::new(port, PinDirection::In, PinTrigger::None)
    }

    pub fn port(&self) -> &str {
        &self.shared.port
    }

    pub fn direction(&self) -> PinDirection {
        self.direction
    }

    pub fn trigger(&self) -> PinTrigger {
        self.trigger
    }

    /// Drive the line and flush immediately. Only valid for output pins.
    pub fn write_value(&self, value: i32) -> Result<(), GpioError> {
        if self.direction != PinDirection::Out {
            return Err(GpioError::ConfigError(format!(
                "pin {} is not configured as an output",
                self.shared.port
            )));
        }

        let mut file = self.shared.value_file.lock();
        file.write_all(value.to_string().as_bytes())
            .and_then(|_| file.flush())
            .map_err(|err| {
                error!("gpio{}: value write failed: {}", self.shared.port, err);
                GpioError::OsError(format!("could not write pin {}: {}", self.shared.port, err))
            })
    }

    pub fn write(&self, value: PinValue) -> Result<(), GpioError> {
        match value {
            PinValue::On => self.write_value(1),
            PinValue::Off => self.write_value(0),
        }
    }

    /// Read the current line state. Returns [`READ_FAILED`] when the stream
    /// is empty or yields a non-digit; both are recoverable and only logged.
    pub fn read(&self) -> i32 {
        self.shared.read_value()
    }

    /// Install the edge callback. May be called at any time, also after the
    /// watcher is already armed; events seen while no callback is installed
    /// are logged and dropped.
    pub fn register<F>(&self, callback: F)
    where
        F: Fn(&str, i32) + Send + 'static,
    {
        *self.shared.callback.lock() = Some(Box::new(callback));
    }

    fn start_watcher(&mut self, pin_dir: &Path) -> Result<(), GpioError> {
        let inotify = Inotify::init().map_err(|err| {
            error!("gpio{}: inotify init failed: {}", self.shared.port, err);
            GpioError::OsError(format!("inotify init failed: {}", err))
        })?;

        let mut watches = inotify.watches();
        let descriptor = watches
            .add(pin_dir.join("value"), WatchMask::MODIFY)
            .map_err(|err| {
                error!("gpio{}: inotify watch failed: {}", self.shared.port, err);
                GpioError::OsError(format!("could not watch value stream: {}", err))
            })?;

        // Idle -> Running
        self.shared.watcher_run.store(true, Ordering::SeqCst);
        let shared = self.shared.clone();
        let handle = thread::Builder::new()
            .name(format!("gpio{}-watch", self.shared.port))
            .spawn(move || watch_loop(shared, inotify))
            .map_err(|err| {
                self.shared.watcher_run.store(false, Ordering::SeqCst);
                GpioError::OsError(format!("could not spawn watcher thread: {}", err))
            })?;

        self.watch = Some((watches, descriptor));
        self.watcher = Some(handle);
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn with_value_file(port: &str, direction: PinDirection, value_file: File) -> Self {
        GpioPin {
            shared: Arc::new(PinShared {
                port: port.to_string(),
                value_file: Mutex::new(value_file),
                callback: Mutex::new(None),
                watcher_run: AtomicBool::new(false),
            }),
            direction,
            trigger: PinTrigger::None,
            watcher: None,
            watch: None,
        }
    }
}

impl Drop for GpioPin {
    fn drop(&mut self) {
        debug!("gpio{}: releasing pin", self.shared.port);

        // Running -> Stopping: clear the run flag, then remove the watch so
        // the blocking event read wakes up.
        if let Some(handle) = self.watcher.take() {
            self.shared.watcher_run.store(false, Ordering::SeqCst);
            if let Some((mut watches, descriptor)) = self.watch.take() {
                if let Err(err) = watches.remove(descriptor) {
                    warn!("gpio{}: could not remove inotify watch: {}", self.shared.port, err);
                }
            }

            // Stopping -> Stopped
            let _ = handle.join();
        }

        if let Err(err) = fs::write(GPIO_UNEXPORT_PATH, self.shared.port.as_bytes()) {
            warn!("gpio{}: unexport failed: {}", self.shared.port, err);
        }
    }
}

fn pin_path(port: &str) -> PathBuf {
    Path::new(GPIO_BASE_PATH).join(format!("gpio{}", port))
}

fn watch_loop(shared: Arc<PinShared>, mut inotify: Inotify) {
    debug!("gpio{}: watcher running", shared.port);
    let mut buffer = [0u8; 1024];

    while shared.watcher_run.load(Ordering::SeqCst) {
        let events = match inotify.read_events_blocking(&mut buffer) {
            Ok(events) => events,
            Err(err) => {
                error!("gpio{}: inotify read failed: {}", shared.port, err);
                break;
            }
        };

        for event in events {
            // watch removal during shutdown wakes the read with a
            // non-MODIFY event
            if !shared.watcher_run.load(Ordering::SeqCst) {
                break;
            }

            if !event.mask.contains(EventMask::MODIFY) {
                continue;
            }

            let value = shared.read_value();
            match shared.callback.lock().as_ref() {
                Some(callback) => callback(&shared.port, value),
                None => warn!(
                    "gpio{}: edge event but no callback registered, dropping",
                    shared.port
                ),
            }
        }
    }

    debug!("gpio{}: watcher stopped", shared.port);
}
