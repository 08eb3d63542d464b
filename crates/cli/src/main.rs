//! padscope CLI: controller inspection and input capture tool.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use padscope_core::capability::detect_capabilities;
use padscope_core::controller::GenericController;
use padscope_core::descriptor::ReportDescriptor;
use padscope_core::device::{discover_devices, HidapiDevice};
use padscope_core::state::{ControllerState, Hat};
use padscope_core::transport::HidDeviceHandle;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Parser)]
#[command(
    name = "padscope",
    version,
    about = "HID game controller capture and inspection"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List connected game controllers.
    ListDevices {
        /// Emit machine-readable JSON.
        #[arg(long)]
        json: bool,
    },
    /// Show the detected capabilities of a device.
    Capabilities {
        /// HID device path (see list-devices).
        path: String,
        /// Emit machine-readable JSON.
        #[arg(long)]
        json: bool,
    },
    /// Capture inputs from a device, printing each state change.
    Watch {
        /// HID device path (see list-devices).
        path: String,
        /// How long to capture, in seconds.
        #[arg(long, default_value_t = 10)]
        seconds: u64,
        /// Write the text input log here afterwards.
        #[arg(long)]
        text_log: Option<PathBuf>,
        /// Write the packed binary input log here afterwards.
        #[arg(long)]
        packed_log: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::ListDevices { json } => list_devices(json),
        Commands::Capabilities { path, json } => capabilities(&path, json),
        Commands::Watch {
            path,
            seconds,
            text_log,
            packed_log,
        } => watch(&path, seconds, text_log, packed_log),
    }
}

fn list_devices(json: bool) -> Result<()> {
    let devices = discover_devices()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }

    if devices.is_empty() {
        println!("No game controllers found.");
        println!("Ensure the device is connected and hidraw permissions are set up.");
    } else {
        for dev in &devices {
            println!(
                "{} (VID: 0x{:04X}, PID: 0x{:04X}, path: {})",
                dev.name, dev.vendor_id, dev.product_id, dev.path
            );
        }
    }
    Ok(())
}

fn capabilities(path: &str, json: bool) -> Result<()> {
    let device = HidapiDevice::from_path(path)?;
    let raw = device
        .report_descriptor()
        .with_context(|| format!("read report descriptor from {path}"))?;
    let descriptor = ReportDescriptor::parse(&raw)?;
    let cap = detect_capabilities(&descriptor);

    if json {
        println!("{}", serde_json::to_string_pretty(&cap)?);
    } else {
        println!("Buttons: {} (including hat directions)", cap.buttons);
        println!("Axes:    {}", cap.axes);
        println!("Hats:    {}", cap.hats);
        println!(
            "Reports: {} input report(s), up to {} bytes",
            descriptor.input_reports().len(),
            descriptor.max_input_report_len()
        );
    }
    Ok(())
}

fn watch(
    path: &str,
    seconds: u64,
    text_log: Option<PathBuf>,
    packed_log: Option<PathBuf>,
) -> Result<()> {
    let device = HidapiDevice::from_path(path)?;
    let mut controller = GenericController::new(Arc::new(device));

    let dirty = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&dirty);
    controller.on_state_changed(move || {
        flag.store(true, Ordering::SeqCst);
    });

    if !controller.activate() {
        bail!("failed to activate {path}; is the device in use?");
    }
    let cap = controller
        .capability()
        .context("no capability after activation")?;
    println!(
        "Watching {path} for {seconds}s ({} buttons, {} axes, {} hats). Move some inputs.",
        cap.buttons, cap.axes, cap.hats
    );

    let deadline = Instant::now() + Duration::from_secs(seconds);
    while Instant::now() < deadline {
        if dirty.swap(false, Ordering::SeqCst) {
            println!("{}", format_state(&controller.snapshot()));
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    controller.deactivate();

    let captured = controller.with_input_log(|log| log.len());
    debug!(captured, "capture finished");
    println!("Captured {captured} report(s).");

    if let Some(dest) = text_log {
        let file = File::create(&dest)
            .with_context(|| format!("create text log {}", dest.display()))?;
        let mut writer = BufWriter::new(file);
        controller.with_input_log(|log| log.write_text(&mut writer))?;
        println!("Text log written to {}", dest.display());
    }
    if let Some(dest) = packed_log {
        let file = File::create(&dest)
            .with_context(|| format!("create packed log {}", dest.display()))?;
        let mut writer = BufWriter::new(file);
        controller.with_input_log(|log| log.write_packed(&mut writer))?;
        println!("Packed log written to {}", dest.display());
    }
    Ok(())
}

fn format_state(state: &ControllerState) -> String {
    let buttons: String = state
        .buttons
        .iter()
        .map(|&b| if b { '#' } else { '.' })
        .collect();
    let axes: Vec<String> = state.axes.iter().map(|a| format!("{a:+.3}")).collect();
    let hats: Vec<&str> = state.hats.iter().map(|h| hat_label(*h)).collect();
    format!(
        "buttons [{buttons}] axes [{}] hats [{}]",
        axes.join(" "),
        hats.join(" ")
    )
}

fn hat_label(hat: Hat) -> &'static str {
    match (
        hat.contains(Hat::UP),
        hat.contains(Hat::DOWN),
        hat.contains(Hat::LEFT),
        hat.contains(Hat::RIGHT),
    ) {
        (true, false, false, false) => "U",
        (true, false, false, true) => "UR",
        (false, false, false, true) => "R",
        (false, true, false, true) => "DR",
        (false, true, false, false) => "D",
        (false, true, true, false) => "DL",
        (false, false, true, false) => "L",
        (true, false, true, false) => "UL",
        _ => "-",
    }
}
