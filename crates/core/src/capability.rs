//! Capability detection: size the state model from a report descriptor.

use crate::descriptor::ReportDescriptor;
use crate::usage::{self, UsageClass};
use serde::Serialize;
use tracing::debug;

/// Detected input shape of a device.
///
/// `buttons` includes the four synthetic direction slots reserved per hat.
/// Derived once per activation and immutable until the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeviceCapability {
    pub buttons: usize,
    pub axes: usize,
    pub hats: usize,
}

/// Classify every usage of every input data field and count buttons, axes,
/// and hats.
///
/// Button and axis counts come from the highest usage index seen, not the
/// number of fields; a device declaring only Button 5 still gets five
/// button slots. Each hat-switch field counts one hat. Unrecognized usages
/// are ignored.
pub fn detect_capabilities(descriptor: &ReportDescriptor) -> DeviceCapability {
    let mut buttons = 0usize;
    let mut axes = 0usize;
    let mut hats = 0usize;

    for report in descriptor.input_reports() {
        for field in &report.fields {
            for &u in &field.usages {
                match usage::classify(u) {
                    UsageClass::Button(idx) => buttons = buttons.max(idx + 1),
                    UsageClass::Hat => hats += 1,
                    UsageClass::Axis(idx) => axes = axes.max(idx + 1),
                    UsageClass::Unrecognized => {
                        debug!(usage = format_args!("0x{:08X}", u), "unrecognized usage");
                    }
                }
            }
        }
    }

    // Reserve a synthetic button per hat direction.
    buttons += 4 * hats;

    DeviceCapability {
        buttons,
        axes,
        hats,
    }
}
