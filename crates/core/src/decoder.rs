//! Report decoding: raw input report bytes → state model mutations.
//!
//! The decoder flattens each input report's fields into per-element layouts
//! (cached per report ID on first encounter) and diffs every incoming
//! report against the previous element values, so resent-unchanged reports
//! produce no state churn. Parse failures are swallowed; the pump just
//! waits for the next report.

use crate::descriptor::{InputReport, ReportDescriptor};
use crate::state::{Hat, StateModel};
use crate::usage::{self, UsageClass};
use std::collections::HashMap;
use tracing::{debug, trace};

/// One decodable element: a single usage at a fixed bit position.
#[derive(Debug, Clone, Copy)]
struct Element {
    usage: Option<u32>,
    logical_min: i32,
    logical_max: i32,
    bits: u16,
    bit_offset: u32,
}

/// Flattened layout of one report ID.
#[derive(Debug)]
struct ReportLayout {
    total_bits: u32,
    elements: Vec<Element>,
}

/// Decodes raw reports against a device's descriptor, tracking changes.
///
/// Built fresh at every activation; dropping it clears the layout cache.
pub struct ReportDecoder {
    descriptor: ReportDescriptor,
    /// Per-ID layouts, built on first encounter. `None` records an ID the
    /// descriptor does not declare, so the scan is not repeated per report.
    layouts: HashMap<u8, Option<ReportLayout>>,
    /// Last element values per report ID, for change detection.
    prev: HashMap<u8, Vec<i32>>,
}

impl ReportDecoder {
    pub fn new(descriptor: ReportDescriptor) -> Self {
        Self {
            descriptor,
            layouts: HashMap::new(),
            prev: HashMap::new(),
        }
    }

    /// Decode one raw report (`[id, body...]`) into the state model.
    ///
    /// Returns true iff at least one element changed value. The first
    /// report seen for an ID counts every element as changed so the model
    /// is fully populated. Malformed or unknown reports return false and
    /// leave the model untouched.
    pub fn decode(&mut self, report: &[u8], state: &mut StateModel) -> bool {
        let Some((&report_id, body)) = report.split_first() else {
            trace!("empty report buffer");
            return false;
        };

        if !self.layouts.contains_key(&report_id) {
            let layout = self.descriptor.input_report(report_id).map(build_layout);
            self.layouts.insert(report_id, layout);
        }
        let Some(layout) = self.layouts.get(&report_id).and_then(Option::as_ref) else {
            trace!(report_id, "no input report with this ID");
            return false;
        };

        if (body.len() as u32) * 8 < layout.total_bits {
            trace!(
                report_id,
                len = body.len(),
                expected_bits = layout.total_bits,
                "truncated report"
            );
            return false;
        }

        let values: Vec<i32> = layout.elements.iter().map(|e| extract(body, e)).collect();

        let changed: Vec<usize> = match self.prev.get(&report_id) {
            Some(prev) => values
                .iter()
                .enumerate()
                .filter(|&(i, &v)| prev[i] != v)
                .map(|(i, _)| i)
                .collect(),
            None => (0..values.len()).collect(),
        };

        if changed.is_empty() {
            self.prev.insert(report_id, values);
            return false;
        }

        for &i in &changed {
            apply_element(&layout.elements[i], values[i], state);
        }
        state.mirror_hat_buttons();

        self.prev.insert(report_id, values);
        true
    }
}

fn build_layout(report: &InputReport) -> ReportLayout {
    let mut elements = Vec::new();
    for field in &report.fields {
        if field.is_constant {
            continue;
        }
        for k in 0..field.report_count as usize {
            elements.push(Element {
                usage: field.element_usage(k),
                logical_min: field.logical_min,
                logical_max: field.logical_max,
                bits: field.report_size,
                bit_offset: field.bit_offset + (k as u32) * field.report_size as u32,
            });
        }
    }
    ReportLayout {
        total_bits: report.total_bits(),
        elements,
    }
}

/// Read an element's logical value out of the report body, LSB-first,
/// sign-extended when the declared range is signed.
fn extract(body: &[u8], elem: &Element) -> i32 {
    let mut v = 0u32;
    for i in 0..elem.bits as u32 {
        let bit = elem.bit_offset + i;
        let byte = (bit / 8) as usize;
        if byte < body.len() && (body[byte] >> (bit % 8)) & 1 == 1 {
            v |= 1 << i;
        }
    }
    if elem.logical_min < 0 && elem.bits > 0 && elem.bits < 32 {
        let sign = 1u32 << (elem.bits - 1);
        if v & sign != 0 {
            v |= !0u32 << elem.bits;
        }
    }
    v as i32
}

fn apply_element(elem: &Element, raw: i32, state: &mut StateModel) {
    let Some(u) = elem.usage else { return };
    match usage::classify(u) {
        UsageClass::Button(idx) => state.set_button(idx, raw != 0),
        // Single hat slot; any further hat field overwrites it.
        UsageClass::Hat => state.set_hat(0, Hat::from_raw(raw)),
        UsageClass::Axis(idx) => state.set_axis(idx, scale_axis(elem, raw, u)),
        UsageClass::Unrecognized => {
            debug!(usage = format_args!("0x{:08X}", u), "unrecognized usage");
        }
    }
}

/// Normalize a raw logical axis value.
///
/// A well-formed declared range scales by its span; otherwise the element's
/// bit width sets the divisor. Triggers idle at the low end of their range,
/// so they are recentered to read as centered like the other axes.
fn scale_axis(elem: &Element, raw: i32, u: u32) -> f64 {
    let mut value = if elem.logical_min < elem.logical_max {
        raw as f64 / (elem.logical_max - elem.logical_min) as f64
    } else {
        raw as f64 / (1u64 << elem.bits) as f64
    };
    if usage::is_trigger(u) {
        value -= 0.5;
    }
    value
}
