//! rfmix - drive the RF engine with simulated receivers
//!
//! Spawns one tone generator per channel, spreads them across the stereo
//! field, and prints monitor events until the run time elapses.

mod args;
mod receiver;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use rfmix_core::{
    linear_to_db, ChannelId, ChannelState, Event, MixerSettings, NoopPowerGuard, RfEngine,
    Session, SoftwareBackend, StreamBackend,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::args::Cli;
use crate::receiver::{spawn_clock, spawn_receiver, ToneReceiver};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rfmix=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.engine_config()?;
    let sample_rate = config.stream.sample_rate;

    let (backend, software) = select_backend(cli.software);
    let engine = Arc::new(RfEngine::new(backend, config).context("creating RF engine")?);
    info!("Starting rfmix with {} channels on {} output", cli.channels, engine.backend_name());

    if cli.load_settings {
        engine.apply_settings(&MixerSettings::load());
    } else {
        engine.set_master_gain(cli.master_gain);
        for channel in 0..cli.channels {
            engine.update_channel_gain(channel, cli.gain);
            engine.update_channel_pan(channel, spread_pan(channel, cli.channels));
        }
    }

    let mut session = Session::start(Arc::clone(&engine), Box::<NoopPowerGuard>::default())?;

    let stop = Arc::new(AtomicBool::new(false));
    let block_frames = cli.block_frames.max(1);
    let block_period = Duration::from_secs_f64(block_frames as f64 / sample_rate as f64);
    let mut threads: Vec<JoinHandle<()>> = Vec::new();

    if let Some(software) = software {
        threads.push(spawn_clock(software, block_frames, block_period, Arc::clone(&stop))?);
    }
    for channel in 0..cli.channels {
        let frequency = 220.0 * (1.0 + channel as f32 * 0.25);
        let receiver = ToneReceiver::new(channel, frequency, sample_rate, 0.3);
        threads.push(spawn_receiver(
            Arc::clone(&engine),
            receiver,
            block_frames,
            block_period,
            Arc::clone(&stop),
        )?);
    }

    let deadline = Instant::now() + Duration::from_secs(cli.seconds);
    while Instant::now() < deadline {
        if let Some(event) = session.wait_event_timeout(Duration::from_millis(100)) {
            print_event(&event, cli.json)?;
        }
    }

    stop.store(true, Ordering::Relaxed);
    for handle in threads {
        let _ = handle.join();
    }

    let stats = engine.rf_stats();
    let channels = engine.channel_count();
    if cli.save_settings {
        let mut settings = engine.capture_settings();
        match settings.save() {
            Ok(path) => info!("Mix saved to {:?}", path),
            Err(e) => warn!("Could not save mix: {}", e),
        }
    }
    session.shutdown();

    info!(
        "Done: {} packets, {} frames dropped ({:.2}%), {} streams for {} channels at exit",
        stats.total_packets,
        stats.dropped_frames,
        stats.drop_rate,
        stats.active_streams,
        channels
    );
    Ok(())
}

/// Hardware output when built with it, else a software device with a clock
fn select_backend(force_software: bool) -> (Arc<dyn StreamBackend>, Option<Arc<SoftwareBackend>>) {
    if !force_software && rfmix_core::supports_hardware_output() {
        let backend = rfmix_core::default_backend();
        if backend.name() != "software" {
            return (backend, None);
        }
    }
    let software = Arc::new(SoftwareBackend::new());
    let shared: Arc<dyn StreamBackend> = software.clone();
    (shared, Some(software))
}

/// Spread `count` channels evenly from hard left to hard right
fn spread_pan(channel: u32, count: u32) -> f32 {
    if count <= 1 {
        0.0
    } else {
        -1.0 + 2.0 * channel as f32 / (count - 1) as f32
    }
}

fn print_event(event: &Event, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
        return Ok(());
    }
    match event {
        Event::Started => println!("monitor started"),
        Event::Stopped => println!("monitor stopped"),
        Event::ChannelLevels { channels } => println!("levels  {}", format_levels(channels)),
        Event::Stats(stats) => println!(
            "stats   packets={} dropped={} rate={:.2}% latency={:.1}ms streams={} underruns={}",
            stats.total_packets,
            stats.dropped_frames,
            stats.drop_rate,
            stats.avg_latency_ms,
            stats.active_streams,
            stats.underruns
        ),
        Event::Error { message } => eprintln!("error   {}", message),
    }
    Ok(())
}

/// Peak/RMS per channel in dBFS, floored at the mute level
fn format_levels(channels: &BTreeMap<ChannelId, ChannelState>) -> String {
    let line: Vec<String> = channels
        .iter()
        .map(|(id, state)| {
            format!(
                "ch{}: {:.1}/{:.1} dB",
                id,
                linear_to_db(state.peak_level),
                linear_to_db(state.rms_level)
            )
        })
        .collect();
    line.join("  ")
}
