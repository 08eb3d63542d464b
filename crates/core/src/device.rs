//! Device discovery and the hidapi-backed transport.

use crate::error::{Error, Result};
use crate::transport::{HidDeviceHandle, HidStream};
use crate::usage::{extended, GAMEPAD, JOYSTICK};
use serde::Serialize;
use std::ffi::CString;
use tracing::{debug, info};

/// hidapi caps report descriptors at 4 KiB.
const MAX_DESCRIPTOR_LEN: usize = 4096;

/// Information about a discovered controller-like device.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    pub name: String,
    pub path: String,
    pub vendor_id: u16,
    pub product_id: u16,
    pub serial: Option<String>,
    pub usage_page: u16,
    pub usage: u16,
}

/// Discover all connected devices with a joystick or gamepad usage.
pub fn discover_devices() -> Result<Vec<DeviceInfo>> {
    debug!("Starting HID device enumeration");
    let api = hidapi::HidApi::new().map_err(|e| Error::Hid(e.to_string()))?;

    let mut devices = Vec::new();
    for info in api.device_list() {
        let ext = extended(info.usage_page(), info.usage());
        if ext != JOYSTICK && ext != GAMEPAD {
            continue;
        }

        let name = info
            .product_string()
            .map(str::to_owned)
            .unwrap_or_else(|| "Unknown controller".to_owned());
        info!(
            name = %name,
            vid = format_args!("0x{:04X}", info.vendor_id()),
            pid = format_args!("0x{:04X}", info.product_id()),
            path = %info.path().to_string_lossy(),
            "Found game controller"
        );
        devices.push(DeviceInfo {
            name,
            path: info.path().to_string_lossy().into_owned(),
            vendor_id: info.vendor_id(),
            product_id: info.product_id(),
            serial: info.serial_number().map(|s| s.to_string()),
            usage_page: info.usage_page(),
            usage: info.usage(),
        });
    }

    debug!(count = devices.len(), "Device enumeration complete");
    Ok(devices)
}

/// A hidapi-backed device handle.
pub struct HidapiDevice {
    name: String,
    path: String,
    cpath: CString,
}

impl HidapiDevice {
    pub fn from_info(info: &DeviceInfo) -> Result<Self> {
        Self::from_parts(info.name.clone(), &info.path)
    }

    pub fn from_path(path: &str) -> Result<Self> {
        Self::from_parts(path.to_owned(), path)
    }

    fn from_parts(name: String, path: &str) -> Result<Self> {
        let cpath = CString::new(path)
            .map_err(|_| Error::DeviceNotFound(format!("invalid device path: {path}")))?;
        Ok(Self {
            name,
            path: path.to_owned(),
            cpath,
        })
    }

    fn open_raw(&self) -> Result<hidapi::HidDevice> {
        let api = hidapi::HidApi::new().map_err(|e| Error::Hid(e.to_string()))?;
        api.open_path(&self.cpath)
            .map_err(|e| Error::Hid(format!("open {}: {e}", self.path)))
    }
}

impl HidDeviceHandle for HidapiDevice {
    fn open(&self) -> Result<Box<dyn HidStream>> {
        let device = self.open_raw()?;
        Ok(Box::new(HidapiStream { device }))
    }

    fn report_descriptor(&self) -> Result<Vec<u8>> {
        let device = self.open_raw()?;
        let mut buf = vec![0u8; MAX_DESCRIPTOR_LEN];
        let n = device
            .get_report_descriptor(&mut buf)
            .map_err(|e| Error::Descriptor(format!("read descriptor: {e}")))?;
        buf.truncate(n);
        Ok(buf)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn path(&self) -> &str {
        &self.path
    }
}

struct HidapiStream {
    device: hidapi::HidDevice,
}

impl HidStream for HidapiStream {
    fn read(&mut self, buf: &mut [u8], timeout_ms: i32) -> Result<usize> {
        self.device
            .read_timeout(buf, timeout_ms)
            .map_err(|e| Error::Hid(format!("read: {e}")))
    }

    fn readable(&self) -> bool {
        true
    }
}
