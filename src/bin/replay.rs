use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use chrono::DateTime;
use clap::Parser;
use flate2::read::GzDecoder;
use serde::Deserialize;
use serde_json::json;

use indoor_locate_rs::geodesy::haversine_distance;
use indoor_locate_rs::geofence::Geofence;
use indoor_locate_rs::pipeline::{PipelineConfig, PositionPipeline};
use indoor_locate_rs::types::{DeviceClass, RawSample};

/// Replay a recorded position trace through the filter pipeline and report
/// what the marker would have done, for offline tuning of filter knobs.
#[derive(Parser, Debug)]
struct Args {
    /// Path to a trace_*.json[.gz] log
    #[arg(long, conflicts_with = "log_dir")]
    log: Option<PathBuf>,

    /// Directory of logs to batch replay (processes trace_*.json[.gz])
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Device class the trace was recorded on
    #[arg(long, default_value = "standard")]
    device: String,

    /// Base median window size
    #[arg(long, default_value = "5")]
    median_window: usize,

    /// Low-pass time constant (seconds)
    #[arg(long, default_value = "1.0")]
    tau: f64,

    /// Kalman process noise (Q)
    #[arg(long, default_value = "0.01")]
    process_noise: f64,

    /// Kalman base measurement noise (R)
    #[arg(long, default_value = "0.1")]
    measurement_noise: f64,

    /// Reject samples with reported accuracy above this (meters)
    #[arg(long, default_value = "100.0")]
    max_accuracy: f64,

    /// Reject samples implying speed above this (m/s)
    #[arg(long, default_value = "10.0")]
    max_speed: f64,

    /// Rejections in a row before the fallback engages
    #[arg(long, default_value = "5")]
    max_rejections: u32,

    /// Reject instead of falling back to the last good location
    #[arg(long, default_value_t = false)]
    strict: bool,

    /// Rectangular geofence as min_lat,min_lng,max_lat,max_lng
    #[arg(long, value_delimiter = ',', num_args = 4)]
    fence: Option<Vec<f64>>,

    /// Print every emission, not just jumps/rejections/fallbacks
    #[arg(long, default_value_t = false)]
    verbose: bool,
}

#[derive(Deserialize)]
struct TraceFile {
    samples: Vec<RawSample>,
}

fn load_trace(path: &Path) -> anyhow::Result<TraceFile> {
    let file = File::open(path)?;
    if path.extension().map(|e| e == "gz").unwrap_or(false) {
        let gz = GzDecoder::new(file);
        let reader = BufReader::new(gz);
        Ok(serde_json::from_reader(reader)?)
    } else {
        let reader = BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }
}

fn format_ts(timestamp_ms: i64) -> String {
    DateTime::from_timestamp_millis(timestamp_ms)
        .map(|dt| dt.format("%H:%M:%S%.3f").to_string())
        .unwrap_or_else(|| timestamp_ms.to_string())
}

fn build_config(args: &Args) -> anyhow::Result<PipelineConfig> {
    let device_class = match args.device.as_str() {
        "standard" => DeviceClass::Standard,
        "degraded" => DeviceClass::DegradedAccuracy,
        other => anyhow::bail!("unknown device class {other:?} (standard|degraded)"),
    };
    let geofence = match args.fence.as_deref() {
        Some([min_lat, min_lng, max_lat, max_lng]) => {
            Some(Geofence::rect(*min_lat, *min_lng, *max_lat, *max_lng))
        }
        Some(other) => anyhow::bail!("--fence needs 4 values, got {}", other.len()),
        None => None,
    };
    Ok(PipelineConfig {
        median_window_size: args.median_window,
        low_pass_tau_secs: args.tau,
        kalman_process_noise: args.process_noise,
        kalman_measurement_noise: args.measurement_noise,
        max_accuracy_m: args.max_accuracy,
        max_speed_mps: args.max_speed,
        max_consecutive_rejections: args.max_rejections,
        strict_mode: args.strict,
        geofence,
        ..PipelineConfig::for_device(device_class)
    })
}

fn run_once(path: &Path, args: &Args) -> anyhow::Result<serde_json::Value> {
    let trace = load_trace(path)?;
    let mut pipeline = PositionPipeline::new(build_config(args)?);

    let mut emissions = 0u64;
    let mut dropped = 0u64;
    let mut correction_sum_m = 0.0;
    let mut max_correction_m: f64 = 0.0;
    let mut confidence_sum = 0.0;
    let mut path_length_m = 0.0;
    let mut prev_emitted: Option<(f64, f64)> = None;

    for sample in &trace.samples {
        let Some(out) = pipeline.process(sample) else {
            dropped += 1;
            continue;
        };
        emissions += 1;
        confidence_sum += out.confidence;

        if out.is_jump {
            println!(
                "[JUMP] {} raw=({:.6},{:.6}) emitted=({:.6},{:.6})",
                format_ts(sample.timestamp),
                sample.latitude,
                sample.longitude,
                out.latitude,
                out.longitude
            );
        } else if out.is_rejected {
            println!(
                "[REJECT] {} acc={:.1}m marker held at ({:.6},{:.6})",
                format_ts(sample.timestamp),
                sample.accuracy,
                out.latitude,
                out.longitude
            );
        } else if out.is_fallback {
            println!(
                "[FALLBACK] {} holding ({:.6},{:.6}) confidence={:.0}",
                format_ts(sample.timestamp),
                out.latitude,
                out.longitude,
                out.confidence
            );
        } else if args.verbose {
            println!(
                "[POS] {} ({:.6},{:.6}) acc={:.1}m confidence={:.0}",
                format_ts(sample.timestamp),
                out.latitude,
                out.longitude,
                out.accuracy,
                out.confidence
            );
        }

        if !out.is_rejected {
            let correction = haversine_distance(
                sample.latitude,
                sample.longitude,
                out.latitude,
                out.longitude,
            );
            correction_sum_m += correction;
            if correction > max_correction_m {
                max_correction_m = correction;
            }
            if let Some((prev_lat, prev_lng)) = prev_emitted {
                path_length_m +=
                    haversine_distance(prev_lat, prev_lng, out.latitude, out.longitude);
            }
            prev_emitted = Some((out.latitude, out.longitude));
        }
    }

    let stats = pipeline.stats();
    Ok(json!({
        "log": path.display().to_string(),
        "device": args.device,
        "median_window": args.median_window,
        "tau": args.tau,
        "process_noise": args.process_noise,
        "measurement_noise": args.measurement_noise,
        "samples": trace.samples.len(),
        "emissions": emissions,
        "dropped": dropped,
        "total_updates": stats.total_updates,
        "jumps_detected": stats.jumps_detected,
        "max_jump_distance_m": stats.max_jump_distance_m,
        "accuracy_rejections": stats.accuracy_rejections,
        "geofence_rejections": stats.geofence_rejections,
        "speed_rejections": stats.speed_rejections,
        "fallback_used": stats.fallback_used,
        "mean_correction_m": if emissions > 0 { correction_sum_m / emissions as f64 } else { 0.0 },
        "max_correction_m": max_correction_m,
        "mean_confidence": if emissions > 0 { confidence_sum / emissions as f64 } else { 0.0 },
        "path_length_m": path_length_m,
    }))
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();
    let mut results = Vec::new();

    if let Some(dir) = args.log_dir.as_ref() {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if !(name.starts_with("trace_")
                && (name.ends_with(".json") || name.ends_with(".json.gz")))
            {
                continue;
            }
            match run_once(&path, &args) {
                Ok(res) => results.push(res),
                Err(e) => eprintln!("Failed {}: {}", path.display(), e),
            }
        }
    } else if let Some(log) = args.log.as_ref() {
        results.push(run_once(log, &args)?);
    } else {
        anyhow::bail!("Provide --log or --log-dir");
    }

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
