//! HID report descriptor parsing.
//!
//! Walks the raw descriptor bytes (short items: main/global/local with
//! push/pop) and flattens every INPUT main item into a [`DataField`] with
//! resolved usages, logical range, and bit position, grouped per report ID.
//! Output and feature reports are skipped; this core only reads input.
//!
//! Item reference: USB HID 1.11, section 6.2.2.

use crate::error::{Error, Result};
use crate::usage;
use tracing::{debug, trace};

/// Upper bound on a single report's payload, in bits. A descriptor
/// declaring more than this is rejected as malformed rather than letting a
/// corrupt length drive allocation.
const MAX_REPORT_BITS: u32 = 0x1_0000;

/// Upper bound on a usage-min/usage-max expansion.
const MAX_USAGE_RANGE: u16 = 0x0FFF;

/// One data field of an input report.
///
/// A field covers `report_count` elements of `report_size` bits each,
/// starting at `bit_offset` within the report body (the byte after the
/// report ID). A field may multiplex several usages, e.g. a button bank.
#[derive(Debug, Clone)]
pub struct DataField {
    /// Extended usages carried by this field, in declaration order.
    pub usages: Vec<u32>,
    pub logical_min: i32,
    pub logical_max: i32,
    /// Bits per element.
    pub report_size: u16,
    /// Number of elements.
    pub report_count: u16,
    /// Bit position of the first element, relative to the report body.
    pub bit_offset: u32,
    /// Constant (padding) fields carry no data.
    pub is_constant: bool,
}

impl DataField {
    /// Usage of the `k`-th element. When the declaration lists fewer usages
    /// than elements the last usage applies to the remainder.
    pub fn element_usage(&self, k: usize) -> Option<u32> {
        if self.usages.is_empty() {
            None
        } else {
            Some(self.usages[k.min(self.usages.len() - 1)])
        }
    }
}

/// All data fields of one input report ID.
#[derive(Debug, Clone)]
pub struct InputReport {
    pub report_id: u8,
    pub fields: Vec<DataField>,
}

impl InputReport {
    /// Total payload size in bits (excluding the report ID byte).
    pub fn total_bits(&self) -> u32 {
        self.fields
            .iter()
            .map(|f| f.bit_offset + f.report_size as u32 * f.report_count as u32)
            .max()
            .unwrap_or(0)
    }
}

/// Parsed input-report layout of a device.
#[derive(Debug, Clone)]
pub struct ReportDescriptor {
    input_reports: Vec<InputReport>,
    saw_report_id: bool,
}

impl ReportDescriptor {
    /// Parse raw report descriptor bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        Parser::default().run(bytes)
    }

    /// All input reports in declaration order.
    pub fn input_reports(&self) -> &[InputReport] {
        &self.input_reports
    }

    /// Look up the input report with the given ID.
    pub fn input_report(&self, id: u8) -> Option<&InputReport> {
        self.input_reports.iter().find(|r| r.report_id == id)
    }

    /// Whether the device tags its reports with IDs. When false the device
    /// has a single report with ID 0 and sends bare bodies on the wire; the
    /// transport layer synthesizes the leading zero byte.
    pub fn uses_report_ids(&self) -> bool {
        self.saw_report_id
    }

    /// Size in bytes of the largest input report, including the report ID
    /// byte. Sizes the pump's receive buffer.
    pub fn max_input_report_len(&self) -> usize {
        self.input_reports
            .iter()
            .map(|r| 1 + r.total_bits().div_ceil(8) as usize)
            .max()
            .unwrap_or(1)
    }
}

/// Global item state, subject to push/pop.
#[derive(Debug, Clone, Copy, Default)]
struct GlobalState {
    usage_page: u16,
    logical_min: i32,
    logical_max: i32,
    report_size: u32,
    report_count: u32,
    report_id: Option<u8>,
}

/// A local usage declaration, resolved against the usage page at main-item
/// time. Four-byte usage items carry their page explicitly.
#[derive(Debug, Clone, Copy)]
enum LocalUsage {
    Single { page: Option<u16>, id: u16 },
    Range { page: Option<u16>, min: u16, max: u16 },
}

#[derive(Default)]
struct Parser {
    globals: GlobalState,
    global_stack: Vec<GlobalState>,
    locals: Vec<LocalUsage>,
    pending_usage_min: Option<(Option<u16>, u16)>,
    reports: Vec<InputReport>,
    /// Input bit cursor per report ID, parallel to `reports`.
    cursors: Vec<u32>,
    saw_report_id: bool,
}

impl Parser {
    fn run(mut self, bytes: &[u8]) -> Result<ReportDescriptor> {
        let mut i = 0usize;
        while i < bytes.len() {
            let prefix = bytes[i];
            i += 1;

            // Long item: one size byte, one tag byte, then payload. Nothing
            // in this core consumes long items, so skip the payload.
            if prefix == 0xFE {
                let size = *bytes
                    .get(i)
                    .ok_or_else(|| Error::Descriptor("truncated long item".into()))?
                    as usize;
                i = i
                    .checked_add(2 + size)
                    .filter(|&end| end <= bytes.len())
                    .ok_or_else(|| Error::Descriptor("truncated long item".into()))?;
                continue;
            }

            let size = match prefix & 0x03 {
                3 => 4,
                s => s as usize,
            };
            let data = bytes
                .get(i..i + size)
                .ok_or_else(|| Error::Descriptor(format!("truncated item 0x{prefix:02X}")))?;
            i += size;

            let tag = prefix >> 4;
            match (prefix >> 2) & 0x03 {
                0 => self.main_item(tag, udata(data))?,
                1 => self.global_item(tag, data)?,
                2 => self.local_item(tag, data),
                _ => trace!(prefix = format_args!("0x{:02X}", prefix), "reserved item"),
            }
        }

        Ok(ReportDescriptor {
            input_reports: self.reports,
            saw_report_id: self.saw_report_id,
        })
    }

    fn main_item(&mut self, tag: u8, data: u32) -> Result<()> {
        match tag {
            // Input
            8 => self.push_input_field(data)?,
            // Output, Feature, Collection, End Collection: no input data
            9 | 10 | 11 | 12 => {}
            _ => trace!(tag, "unknown main item"),
        }
        self.locals.clear();
        self.pending_usage_min = None;
        Ok(())
    }

    fn push_input_field(&mut self, flags: u32) -> Result<()> {
        let gs = self.globals;
        let report_id = gs.report_id.unwrap_or(0);
        let is_constant = flags & 0x01 != 0;

        let idx = match self.reports.iter().position(|r| r.report_id == report_id) {
            Some(idx) => idx,
            None => {
                self.reports.push(InputReport {
                    report_id,
                    fields: Vec::new(),
                });
                self.cursors.push(0);
                self.reports.len() - 1
            }
        };

        let bits = gs.report_size.saturating_mul(gs.report_count);
        let bit_offset = self.cursors[idx];
        let end = bit_offset
            .checked_add(bits)
            .ok_or_else(|| Error::Descriptor("report bit count overflow".into()))?;
        if end > MAX_REPORT_BITS {
            return Err(Error::Descriptor(format!(
                "report 0x{report_id:02X} exceeds {MAX_REPORT_BITS} bits"
            )));
        }
        self.cursors[idx] = end;

        if gs.report_size > 32 {
            // Elements wider than an i32 cannot be decoded; the bit cursor
            // above stays honest so later fields still line up.
            debug!(report_size = gs.report_size, "skipping oversized field");
            return Ok(());
        }

        let usages = if is_constant {
            Vec::new()
        } else {
            self.resolve_usages()?
        };

        self.reports[idx].fields.push(DataField {
            usages,
            logical_min: gs.logical_min,
            logical_max: gs.logical_max,
            report_size: gs.report_size as u16,
            report_count: gs.report_count as u16,
            bit_offset,
            is_constant,
        });
        Ok(())
    }

    fn resolve_usages(&self) -> Result<Vec<u32>> {
        let default_page = self.globals.usage_page;
        let mut usages = Vec::new();
        for local in &self.locals {
            match *local {
                LocalUsage::Single { page, id } => {
                    usages.push(usage::extended(page.unwrap_or(default_page), id));
                }
                LocalUsage::Range { page, min, max } => {
                    if max < min || max - min > MAX_USAGE_RANGE {
                        return Err(Error::Descriptor(format!(
                            "invalid usage range 0x{min:04X}..0x{max:04X}"
                        )));
                    }
                    let page = page.unwrap_or(default_page);
                    usages.extend((min..=max).map(|id| usage::extended(page, id)));
                }
            }
        }
        Ok(usages)
    }

    fn global_item(&mut self, tag: u8, data: &[u8]) -> Result<()> {
        match tag {
            0 => self.globals.usage_page = udata(data) as u16,
            1 => self.globals.logical_min = sdata(data),
            2 => self.globals.logical_max = sdata(data),
            // Physical min/max, unit exponent, unit: not consumed here.
            3..=6 => {}
            7 => self.globals.report_size = udata(data),
            8 => {
                self.globals.report_id = Some(udata(data) as u8);
                self.saw_report_id = true;
            }
            9 => self.globals.report_count = udata(data),
            10 => self.global_stack.push(self.globals),
            11 => {
                self.globals = self
                    .global_stack
                    .pop()
                    .ok_or_else(|| Error::Descriptor("pop without push".into()))?;
            }
            _ => trace!(tag, "unknown global item"),
        }
        Ok(())
    }

    fn local_item(&mut self, tag: u8, data: &[u8]) {
        // Four-byte usage items carry an explicit page in the upper word.
        let split = |data: &[u8]| -> (Option<u16>, u16) {
            let v = udata(data);
            if data.len() == 4 {
                (Some((v >> 16) as u16), v as u16)
            } else {
                (None, v as u16)
            }
        };
        match tag {
            0 => {
                let (page, id) = split(data);
                self.locals.push(LocalUsage::Single { page, id });
            }
            1 => self.pending_usage_min = Some(split(data)),
            2 => {
                let (max_page, max) = split(data);
                match self.pending_usage_min.take() {
                    Some((page, min)) => self.locals.push(LocalUsage::Range {
                        page: page.or(max_page),
                        min,
                        max,
                    }),
                    None => debug!("usage maximum without preceding minimum"),
                }
            }
            // Designators and strings: not consumed here.
            _ => {}
        }
    }
}

/// Little-endian unsigned item data.
fn udata(data: &[u8]) -> u32 {
    data.iter()
        .rev()
        .fold(0u32, |acc, &b| (acc << 8) | b as u32)
}

/// Little-endian item data sign-extended from its declared size.
fn sdata(data: &[u8]) -> i32 {
    let v = udata(data);
    match data.len() {
        1 => v as u8 as i8 as i32,
        2 => v as u16 as i16 as i32,
        _ => v as i32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usage::{AXIS_X, BUTTON_1, HAT_SWITCH};

    /// 8 buttons, one hat (plus 4 bits padding), X/Y axes, report ID 1.
    fn gamepad_bytes() -> Vec<u8> {
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

    #[test]
    fn parse_gamepad_layout() {
        let desc = ReportDescriptor::parse(&gamepad_bytes()).unwrap();
        assert!(desc.uses_report_ids());
        assert_eq!(desc.input_reports().len(), 1);

        let report = desc.input_report(1).unwrap();
        assert_eq!(report.fields.len(), 4);

        let buttons = &report.fields[0];
        assert_eq!(buttons.usages.len(), 8);
        assert_eq!(buttons.usages[0], BUTTON_1);
        assert_eq!(buttons.bit_offset, 0);
        assert_eq!((buttons.report_size, buttons.report_count), (1, 8));

        let hat = &report.fields[1];
        assert_eq!(hat.usages, vec![HAT_SWITCH]);
        assert_eq!(hat.bit_offset, 8);
        assert_eq!(hat.logical_max, 7);

        let pad = &report.fields[2];
        assert!(pad.is_constant);
        assert!(pad.usages.is_empty());
        assert_eq!(pad.bit_offset, 12);

        let axes = &report.fields[3];
        assert_eq!(axes.usages[0], AXIS_X);
        assert_eq!(axes.bit_offset, 16);
        assert_eq!(axes.logical_max, 255);

        assert_eq!(report.total_bits(), 32);
        assert_eq!(desc.max_input_report_len(), 5);
    }

    #[test]
    fn parse_without_report_ids() {
        // Two axes only, no report ID item anywhere.
        let bytes = vec![
            0x05, 0x01, // Usage Page (Generic Desktop)
            0x09, 0x04, // Usage (Joystick)
            0xA1, 0x01, // Collection (Application)
            0x09, 0x30, //   Usage (X)
            0x09, 0x31, //   Usage (Y)
            0x15, 0x81, //   Logical Minimum (-127)
            0x25, 0x7F, //   Logical Maximum (127)
            0x75, 0x08, //   Report Size (8)
            0x95, 0x02, //   Report Count (2)
            0x81, 0x02, //   Input (Data,Var,Abs)
            0xC0, // End Collection
        ];
        let desc = ReportDescriptor::parse(&bytes).unwrap();
        assert!(!desc.uses_report_ids());
        let report = desc.input_report(0).unwrap();
        assert_eq!(report.fields[0].logical_min, -127);
        assert_eq!(report.fields[0].logical_max, 127);
        assert_eq!(desc.max_input_report_len(), 3);
    }

    #[test]
    fn element_usage_repeats_last() {
        let field = DataField {
            usages: vec![AXIS_X],
            logical_min: 0,
            logical_max: 255,
            report_size: 8,
            report_count: 3,
            bit_offset: 0,
            is_constant: false,
        };
        assert_eq!(field.element_usage(0), Some(AXIS_X));
        assert_eq!(field.element_usage(2), Some(AXIS_X));
    }

    #[test]
    fn truncated_descriptor_is_rejected() {
        // Two-byte item prefix with no data byte
        assert!(ReportDescriptor::parse(&[0x05]).is_err());
        // Truncated long item
        assert!(ReportDescriptor::parse(&[0xFE, 0x10, 0x00]).is_err());
    }

    #[test]
    fn pop_without_push_is_rejected() {
        assert!(ReportDescriptor::parse(&[0xB4]).is_err());
    }

    #[test]
    fn long_items_are_skipped() {
        let mut bytes = vec![0xFE, 0x02, 0x00, 0xAA, 0xBB];
        bytes.extend_from_slice(&gamepad_bytes());
        let desc = ReportDescriptor::parse(&bytes).unwrap();
        assert_eq!(desc.input_reports().len(), 1);
    }

    #[test]
    fn oversized_report_is_rejected() {
        let bytes = vec![
            0x05, 0x01, // Usage Page (Generic Desktop)
            0x75, 0x20, // Report Size (32)
            0x96, 0xFF, 0x7F, // Report Count (32767)
            0x81, 0x02, // Input
        ];
        assert!(ReportDescriptor::parse(&bytes).is_err());
    }

    #[test]
    fn signed_item_data() {
        assert_eq!(sdata(&[0x81]), -127);
        assert_eq!(sdata(&[0x00, 0x80]), -32768);
        assert_eq!(sdata(&[0x7F]), 127);
        assert_eq!(udata(&[0xFF, 0x00]), 0x00FF);
    }
}
