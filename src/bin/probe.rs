//! Command-line probe: list Airspy devices and exercise the sample stream.
//!
//! Without the `hardware` feature this only reports that no backend is
//! compiled in, which is still useful for checking config-file handling.

use airspy_source::{AirspySource, ConfigStore, hal};
use clap::Parser;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "airspy-probe", about = "List Airspy devices and test the sample stream")]
struct Args {
    /// Tune frequency in Hz when streaming
    #[arg(long, default_value_t = 100_000_000.0)]
    frequency: f64,

    /// Stream for this many seconds and report throughput
    #[arg(long)]
    stream: Option<u64>,

    /// Config file path (defaults to the platform config directory)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let driver = hal::default_driver();
    let config = Arc::new(match args.config {
        Some(path) => ConfigStore::open(path),
        None => ConfigStore::open_default(),
    });
    let source = Arc::new(Mutex::new(AirspySource::new(driver, config)));

    {
        let source = source.lock().unwrap();
        let devices = source.devices();
        if devices.is_empty() {
            println!("No Airspy devices found");
            return;
        }
        println!("Found {} device(s):", devices.len());
        for (i, device) in devices.iter().enumerate() {
            println!("  [{i}] {}", device.label);
        }
        println!("Selected {}:", source.selected_label());
        for (i, rate) in source.sample_rates().iter().enumerate() {
            let marker = if i == source.sample_rate_index() { "*" } else { " " };
            println!("  {marker} {}", rate.label);
        }
    }

    let Some(seconds) = args.stream else {
        return;
    };

    let mut reader = source.lock().unwrap().reader();
    {
        let mut source = source.lock().unwrap();
        source.tune(args.frequency);
        source.start();
        if !source.is_running() {
            eprintln!("Could not start streaming (see log)");
            return;
        }
    }

    // Stop from a second thread after the deadline; the reader drains and
    // unblocks once the stream is torn down
    let stopper = Arc::clone(&source);
    std::thread::spawn(move || {
        std::thread::sleep(Duration::from_secs(seconds));
        let mut source = stopper.lock().unwrap();
        source.stop();
        source.stop_reader();
    });

    let mut total: u64 = 0;
    while let Some(block) = reader.read() {
        total += block.len() as u64;
    }

    #[allow(clippy::cast_precision_loss, reason = "throughput report only")]
    let msps = total as f64 / seconds as f64 / 1e6;
    println!("Received {total} samples in {seconds} s (~{msps:.3} Msps)");
}
