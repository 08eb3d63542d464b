//! HID transport abstraction for device communication.
//!
//! Provides trait seams between the controller and the operating system so
//! that real HID devices and mock devices share the same interface. One
//! controller owns one [`HidDeviceHandle`]; streams are never shared
//! across controllers.

use crate::error::Result;

/// A connectable HID device.
pub trait HidDeviceHandle: Send + Sync {
    /// Open the device for reading. Each call produces an independent
    /// stream; the caller owns it exclusively and drops it to close.
    fn open(&self) -> Result<Box<dyn HidStream>>;

    /// Raw report descriptor bytes.
    fn report_descriptor(&self) -> Result<Vec<u8>>;

    /// Human-readable device name.
    fn name(&self) -> &str;

    /// Platform device path.
    fn path(&self) -> &str;
}

/// An open input stream on a HID device.
///
/// Reports come back as the platform delivers them: devices with numbered
/// reports include the leading ID byte, unnumbered devices send the bare
/// body. The pump normalizes both to `[report_id, body...]` using the
/// parsed descriptor.
pub trait HidStream: Send {
    /// Read one input report. Returns the number of bytes written to
    /// `buf`; `Ok(0)` means the timeout elapsed with no report, which the
    /// pump treats as a re-arm tick, not an error.
    fn read(&mut self, buf: &mut [u8], timeout_ms: i32) -> Result<usize>;

    /// Whether the stream is still readable.
    fn readable(&self) -> bool;
}

/// A mock HID device for testing.
///
/// Scripts a queue of reports and failures; tracks opens so tests can
/// assert stream lifecycle behavior.
#[cfg(test)]
pub mod mock {
    use super::*;
    use crate::error::Error;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Canonical test gamepad: report ID 1, 8 buttons, one hat with 4 bits
    /// of padding, X/Y axes 0..255. Report layout `[01, buttons, hat, x, y]`.
    pub fn gamepad_descriptor() -> Vec<u8> {
        vec![
            0x05, 0x01, // Usage Page (Generic Desktop)
            0x09, 0x05, // Usage (Gamepad)
            0xA1, 0x01, // Collection (Application)
            0x85, 0x01, //   Report ID (1)
            0x05, 0x09, //   Usage Page (Button)
            0x19, 0x01, //   Usage Minimum (1)
            0x29, 0x08, //   Usage Maximum (8)
            0x15, 0x00, //   Logical Minimum (0)
            0x25, 0x01, //   Logical Maximum (1)
            0x75, 0x01, //   Report Size (1)
            0x95, 0x08, //   Report Count (8)
            0x81, 0x02, //   Input (Data,Var,Abs)
            0x05, 0x01, //   Usage Page (Generic Desktop)
            0x09, 0x39, //   Usage (Hat Switch)
            0x15, 0x00, //   Logical Minimum (0)
            0x25, 0x07, //   Logical Maximum (7)
            0x75, 0x04, //   Report Size (4)
            0x95, 0x01, //   Report Count (1)
            0x81, 0x42, //   Input (Data,Var,Abs,Null)
            0x75, 0x04, //   Report Size (4)
            0x95, 0x01, //   Report Count (1)
            0x81, 0x03, //   Input (Const)
            0x09, 0x30, //   Usage (X)
            0x09, 0x31, //   Usage (Y)
            0x15, 0x00, //   Logical Minimum (0)
            0x26, 0xFF, 0x00, // Logical Maximum (255)
            0x75, 0x08, //   Report Size (8)
            0x95, 0x02, //   Report Count (2)
            0x81, 0x02, //   Input (Data,Var,Abs)
            0xC0, // End Collection
        ]
    }

    /// Test pad with an X axis and an Rz trigger, both 8-bit 0..255.
    /// Report layout `[01, x, rz]`.
    pub fn trigger_descriptor() -> Vec<u8> {
        vec![
            0x05, 0x01, // Usage Page (Generic Desktop)
            0x09, 0x05, // Usage (Gamepad)
            0xA1, 0x01, // Collection (Application)
            0x85, 0x01, //   Report ID (1)
            0x09, 0x30, //   Usage (X)
            0x09, 0x35, //   Usage (Rz)
            0x15, 0x00, //   Logical Minimum (0)
            0x26, 0xFF, 0x00, // Logical Maximum (255)
            0x75, 0x08, //   Report Size (8)
            0x95, 0x02, //   Report Count (2)
            0x81, 0x02, //   Input (Data,Var,Abs)
            0xC0, // End Collection
        ]
    }

    /// One scripted stream event.
    enum Step {
        Report(Vec<u8>),
        Error(Error),
    }

    #[derive(Default)]
    struct Script {
        steps: VecDeque<Step>,
    }

    /// Scripted mock device.
    pub struct MockDevice {
        descriptor: Vec<u8>,
        script: Arc<Mutex<Script>>,
        opens: AtomicUsize,
        open_streams: Arc<AtomicUsize>,
        fail_open: bool,
    }

    impl MockDevice {
        pub fn new(descriptor: Vec<u8>) -> Self {
            Self {
                descriptor,
                script: Arc::new(Mutex::new(Script::default())),
                opens: AtomicUsize::new(0),
                open_streams: Arc::new(AtomicUsize::new(0)),
                fail_open: false,
            }
        }

        /// A mock whose `open` always fails.
        pub fn unopenable(descriptor: Vec<u8>) -> Self {
            Self {
                fail_open: true,
                ..Self::new(descriptor)
            }
        }

        /// Queue a report for the stream to deliver.
        pub fn push_report(&self, report: &[u8]) {
            self.script
                .lock()
                .unwrap()
                .steps
                .push_back(Step::Report(report.to_vec()));
        }

        /// Queue a read error (e.g. a disconnect).
        pub fn push_error(&self, err: Error) {
            self.script.lock().unwrap().steps.push_back(Step::Error(err));
        }

        /// How many times the device has been opened.
        pub fn open_count(&self) -> usize {
            self.opens.load(Ordering::SeqCst)
        }

        /// How many streams are currently alive.
        pub fn live_streams(&self) -> usize {
            self.open_streams.load(Ordering::SeqCst)
        }
    }

    impl HidDeviceHandle for MockDevice {
        fn open(&self) -> Result<Box<dyn HidStream>> {
            if self.fail_open {
                return Err(Error::PermissionDenied("mock device is unopenable".into()));
            }
            self.opens.fetch_add(1, Ordering::SeqCst);
            self.open_streams.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(MockStream {
                script: Arc::clone(&self.script),
                open_streams: Arc::clone(&self.open_streams),
            }))
        }

        fn report_descriptor(&self) -> Result<Vec<u8>> {
            Ok(self.descriptor.clone())
        }

        fn name(&self) -> &str {
            "Mock Gamepad"
        }

        fn path(&self) -> &str {
            "mock:0"
        }
    }

    struct MockStream {
        script: Arc<Mutex<Script>>,
        open_streams: Arc<AtomicUsize>,
    }

    impl HidStream for MockStream {
        fn read(&mut self, buf: &mut [u8], timeout_ms: i32) -> Result<usize> {
            let step = self.script.lock().unwrap().steps.pop_front();
            match step {
                Some(Step::Report(report)) => {
                    let n = report.len().min(buf.len());
                    buf[..n].copy_from_slice(&report[..n]);
                    Ok(n)
                }
                Some(Step::Error(err)) => Err(err),
                // Script exhausted: behave like a quiet device and let the
                // timeout elapse.
                None => {
                    let wait = timeout_ms.clamp(0, 5) as u64;
                    std::thread::sleep(std::time::Duration::from_millis(wait));
                    Ok(0)
                }
            }
        }

        fn readable(&self) -> bool {
            true
        }
    }

    impl Drop for MockStream {
        fn drop(&mut self) {
            self.open_streams.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn mock_delivers_scripted_reports_in_order() {
            let device = MockDevice::new(gamepad_descriptor());
            device.push_report(&[0x01, 0xAA]);
            device.push_report(&[0x01, 0xBB]);

            let mut stream = device.open().unwrap();
            let mut buf = [0u8; 8];
            assert_eq!(stream.read(&mut buf, 10).unwrap(), 2);
            assert_eq!(buf[1], 0xAA);
            assert_eq!(stream.read(&mut buf, 10).unwrap(), 2);
            assert_eq!(buf[1], 0xBB);
            // Exhausted script reads as timeout ticks
            assert_eq!(stream.read(&mut buf, 10).unwrap(), 0);
        }

        #[test]
        fn mock_surfaces_scripted_errors() {
            let device = MockDevice::new(gamepad_descriptor());
            device.push_error(Error::Hid("device disconnect".into()));
            let mut stream = device.open().unwrap();
            let mut buf = [0u8; 8];
            assert!(stream.read(&mut buf, 10).is_err());
        }

        #[test]
        fn mock_tracks_stream_lifecycle() {
            let device = MockDevice::new(gamepad_descriptor());
            assert_eq!(device.live_streams(), 0);
            let stream = device.open().unwrap();
            assert_eq!(device.open_count(), 1);
            assert_eq!(device.live_streams(), 1);
            drop(stream);
            assert_eq!(device.live_streams(), 0);
        }

        #[test]
        fn unopenable_mock_rejects_open() {
            let device = MockDevice::unopenable(gamepad_descriptor());
            assert!(device.open().is_err());
            assert_eq!(device.open_count(), 0);
        }
    }
}
