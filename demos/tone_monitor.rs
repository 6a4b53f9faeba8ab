//! Tone monitoring example.
//!
//! Plays a 440 Hz test tone through a monitor on the default output device,
//! then walks through volume and mute changes.
//!
//! Run with: cargo run --example tone_monitor

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use audio_monitor::backend::CpalBackend;
use audio_monitor::source::{CaptureSource, MonitoredSource, ToneGenerator};
use audio_monitor::{AudioMonitor, MonitorContext, ProcessRegistry};

/// 10 ms at the pipeline's 48 kHz.
const BLOCK_FRAMES: usize = 480;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for debug output
    tracing_subscriber::fmt::init();

    let ctx = Arc::new(MonitorContext::new(CpalBackend::new()));
    let registry = Arc::new(ProcessRegistry::new());

    let source = Arc::new(CaptureSource::new("test tone"));
    let dyn_source: Arc<dyn MonitoredSource> = source.clone();
    source.activate();

    let monitor = AudioMonitor::create(ctx, registry, &dyn_source)?;
    println!("Monitoring on {}", monitor.device_name().unwrap_or_default());

    let steps = [
        ("full volume", 1.0, false),
        ("half volume", 0.5, false),
        ("muted", 1.0, true),
        ("quiet", 0.1, false),
    ];

    let mut tone = ToneGenerator::new(48_000, 2, 440.0, 0.2);
    for (label, volume, muted) in steps {
        println!("  {label}");
        source.set_volume(volume);
        source.set_muted(muted);

        // Push blocks at real-time pace for one second.
        let started = Instant::now();
        for block_index in 0..100u32 {
            let block = tone.next_block(BLOCK_FRAMES);
            let planes: Vec<&[f32]> = block.iter().map(Vec::as_slice).collect();
            source.push_audio(&planes, BLOCK_FRAMES as u32, 0);

            let due = started + Duration::from_millis(10) * (block_index + 1);
            thread::sleep(due.saturating_duration_since(Instant::now()));
        }
    }

    let stats = monitor.stats();
    monitor.destroy();

    println!("Stats: {stats:?}");
    Ok(())
}
