//! Generic HID controller: activation state machine and read pump.
//!
//! A controller owns one device handle. `activate` analyzes the device's
//! report descriptor, sizes the state model, opens the stream, and starts
//! a pump thread that keeps exactly one read in flight: read, decode, log,
//! notify, re-arm. All state mutation happens on the pump thread under the
//! state lock; consumers read copy-on-read snapshots.
//!
//! Nothing in here panics across the pump boundary or propagates an error
//! out of `activate`/`deactivate`: failures become state transitions.

use crate::capability::{detect_capabilities, DeviceCapability};
use crate::decoder::ReportDecoder;
use crate::descriptor::ReportDescriptor;
use crate::error::{Error, ErrorClass, Result};
use crate::log::InputLog;
use crate::state::{ControllerState, StateModel};
use crate::time::{LocalTimeOracle, TimeOracle};
use crate::transport::{HidDeviceHandle, HidStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, trace, warn};

/// Read poll interval. A timeout tick re-arms the read and lets the pump
/// observe deactivation; it never surfaces as data or an error.
const READ_POLL_MS: i32 = 50;

type ChangeListener = Box<dyn Fn() + Send + Sync>;

/// State shared between the controller facade and its pump thread.
struct Shared {
    state: Mutex<StateModel>,
    log: Mutex<InputLog>,
    listeners: Mutex<Vec<ChangeListener>>,
    active: AtomicBool,
}

/// A generic HID game controller driven by its own report descriptor.
pub struct GenericController {
    device: Arc<dyn HidDeviceHandle>,
    oracle: Arc<dyn TimeOracle>,
    shared: Arc<Shared>,
    capability: Option<DeviceCapability>,
    pump: Option<JoinHandle<()>>,
}

impl GenericController {
    pub fn new(device: Arc<dyn HidDeviceHandle>) -> Self {
        Self::with_time_oracle(device, Arc::new(LocalTimeOracle))
    }

    /// Use a specific time oracle for input-log entries.
    pub fn with_time_oracle(
        device: Arc<dyn HidDeviceHandle>,
        oracle: Arc<dyn TimeOracle>,
    ) -> Self {
        Self {
            device,
            oracle,
            shared: Arc::new(Shared {
                state: Mutex::new(StateModel::new()),
                log: Mutex::new(InputLog::new()),
                listeners: Mutex::new(Vec::new()),
                active: AtomicBool::new(false),
            }),
            capability: None,
            pump: None,
        }
    }

    pub fn name(&self) -> &str {
        self.device.name()
    }

    pub fn path(&self) -> &str {
        self.device.path()
    }

    /// Start receiving inputs. Re-entrant-safe: any prior stream is
    /// disposed first. Returns false and stays inactive on any failure;
    /// never propagates an error.
    pub fn activate(&mut self) -> bool {
        self.deactivate();
        match self.try_activate() {
            Ok(()) => {
                info!(device = self.device.name(), "controller activated");
                true
            }
            Err(e) => {
                warn!(device = self.device.name(), error = %e, "activation failed");
                false
            }
        }
    }

    fn try_activate(&mut self) -> Result<()> {
        let raw = self.device.report_descriptor()?;
        let descriptor = ReportDescriptor::parse(&raw)?;

        // Capabilities are re-detected on every activation; they are not
        // assumed stable across connect/disconnect.
        let capability = detect_capabilities(&descriptor);
        debug!(
            device = self.device.name(),
            buttons = capability.buttons,
            axes = capability.axes,
            hats = capability.hats,
            "capabilities detected"
        );
        self.shared
            .state
            .lock()
            .unwrap()
            .apply_capabilities(&capability);
        self.capability = Some(capability);

        let stream = self.device.open()?;
        let uses_ids = descriptor.uses_report_ids();
        let buf_len = descriptor.max_input_report_len();
        let decoder = ReportDecoder::new(descriptor);

        self.shared.active.store(true, Ordering::SeqCst);
        let shared = Arc::clone(&self.shared);
        let oracle = Arc::clone(&self.oracle);
        let handle = thread::Builder::new()
            .name("padscope-pump".into())
            .spawn(move || pump(stream, decoder, uses_ids, buf_len, shared, oracle))
            .map_err(|e| {
                self.shared.active.store(false, Ordering::SeqCst);
                Error::Hid(format!("spawn pump thread: {e}"))
            })?;
        self.pump = Some(handle);
        Ok(())
    }

    /// Stop the pump and dispose the stream. Idempotent. The decoder and
    /// its report-layout cache die with the pump.
    pub fn deactivate(&mut self) {
        self.shared.active.store(false, Ordering::SeqCst);
        if let Some(handle) = self.pump.take() {
            if handle.join().is_err() {
                warn!(device = self.device.name(), "pump thread panicked");
            }
        }
    }

    /// True iff the pump is running on an open stream.
    pub fn is_active(&self) -> bool {
        self.pump.is_some() && self.shared.active.load(Ordering::SeqCst)
    }

    /// Non-invasive probe: open, check readability, close. Never leaves a
    /// stream open.
    pub fn is_available(&self) -> bool {
        match self.device.open() {
            Ok(stream) => stream.readable(),
            Err(_) => false,
        }
    }

    /// Capability detected by the most recent activation.
    pub fn capability(&self) -> Option<DeviceCapability> {
        self.capability
    }

    /// Point-in-time copy of the decoded state.
    pub fn snapshot(&self) -> ControllerState {
        self.shared.state.lock().unwrap().snapshot()
    }

    /// Run `f` against the input log. Holding the log lock for the
    /// duration serializes exports with pump appends.
    pub fn with_input_log<T>(&self, f: impl FnOnce(&InputLog) -> T) -> T {
        f(&self.shared.log.lock().unwrap())
    }

    /// Register a state-change observer. The callback carries no payload;
    /// consumers re-read [`snapshot`](Self::snapshot). It runs on the pump
    /// thread, so it must not call back into `deactivate`.
    pub fn on_state_changed(&self, listener: impl Fn() + Send + Sync + 'static) {
        self.shared.listeners.lock().unwrap().push(Box::new(listener));
    }
}

impl Drop for GenericController {
    fn drop(&mut self) {
        self.deactivate();
    }
}

/// The continuous read pump: one receive in flight, re-armed after every
/// completion until deactivation or stream failure.
fn pump(
    mut stream: Box<dyn HidStream>,
    mut decoder: ReportDecoder,
    uses_ids: bool,
    buf_len: usize,
    shared: Arc<Shared>,
    oracle: Arc<dyn TimeOracle>,
) {
    let mut raw = vec![0u8; buf_len.max(1)];
    let mut framed = vec![0u8; buf_len.max(1) + 1];

    while shared.active.load(Ordering::SeqCst) {
        match stream.read(&mut raw, READ_POLL_MS) {
            Ok(0) => continue,
            Ok(n) => {
                // Devices without numbered reports send bare bodies; give
                // the decoder its uniform [id, body...] shape.
                let report: &[u8] = if uses_ids {
                    &raw[..n]
                } else {
                    framed[0] = 0;
                    framed[1..=n].copy_from_slice(&raw[..n]);
                    &framed[..=n]
                };

                let changed = {
                    let mut state = shared.state.lock().unwrap();
                    decoder.decode(report, &mut state)
                };
                // Logged for every completed read, decoded or not.
                shared.log.lock().unwrap().record(report, oracle.as_ref());
                if changed {
                    notify(&shared);
                }
            }
            Err(e) => {
                let class = ErrorClass::classify(&e);
                if class.is_retryable() {
                    trace!(error = %e, "transient read failure");
                    continue;
                }
                warn!(error = %e, class = ?class, "stream failure, stopping pump");
                break;
            }
        }
    }

    shared.active.store(false, Ordering::SeqCst);
    // Stream and decoder are disposed here, on the pump's own thread.
}

fn notify(shared: &Shared) {
    let listeners = shared.listeners.lock().unwrap();
    for listener in listeners.iter() {
        listener();
    }
}
