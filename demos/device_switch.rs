//! Device switching example.
//!
//! Starts a monitor on the default output device, then moves it to every
//! other output device in turn by changing the monitoring device and
//! resetting all monitors.
//!
//! Run with: cargo run --example device_switch

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use audio_monitor::backend::CpalBackend;
use audio_monitor::source::{CaptureSource, MonitoredSource, ToneGenerator};
use audio_monitor::{AudioMonitor, DeviceId, MonitorContext, ProcessRegistry};

fn play(source: &CaptureSource, tone: &mut ToneGenerator, seconds: u32) {
    for _ in 0..seconds * 100 {
        let block = tone.next_block(480);
        let planes: Vec<&[f32]> = block.iter().map(Vec::as_slice).collect();
        source.push_audio(&planes, 480, 0);
        thread::sleep(Duration::from_millis(10));
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let backend = CpalBackend::new();
    let devices = backend.output_devices()?;
    println!("Available output devices:");
    for device in &devices {
        println!("  - {device}");
    }
    println!();

    let ctx = Arc::new(MonitorContext::new(backend));
    let registry = Arc::new(ProcessRegistry::new());

    let source = Arc::new(CaptureSource::new("test tone"));
    let dyn_source: Arc<dyn MonitoredSource> = source.clone();
    source.activate();

    let monitor = AudioMonitor::create(ctx.clone(), registry.clone(), &dyn_source)?;
    let mut tone = ToneGenerator::new(48_000, 2, 330.0, 0.2);

    println!("Playing on the default device");
    play(&source, &mut tone, 2);

    for device in devices {
        ctx.set_device(Some(DeviceId::new(device.as_str())));
        let reset = registry.reset_all();
        println!(
            "Switched to {device} ({reset} of {} monitors reset)",
            registry.len()
        );
        play(&source, &mut tone, 2);
    }

    println!("Stats: {:?}", monitor.stats());
    monitor.destroy();
    Ok(())
}
