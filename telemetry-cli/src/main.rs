//! Telemetry Convert CLI Application
//!
//! Command-line front end for the telemetry-decoder library:
//! - `dbc-to-json`: convert a DBC file into a frame-layout JSON document
//! - `info`: summarize a recording
//! - `extract`: time-windowed extraction of one or all topics
//! - `gps`: GPS point list from navigation-fix records
//! - `replay`: pose/path synthesis and routing to a JSON-lines sink

use anyhow::{bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use telemetry_decoder::{
    extract_gps_points, extract_topic_to_file, parse_dbc_file, safe_topic_name, write_gps_points,
    write_topic_files, ExtractConfig, JsonLinesPublisher, JsonlRecording, LayoutDocument, RecordSource,
    Replayer, TopicStatus,
};

mod config;

/// Telemetry Convert - Decode and extract vehicle telemetry
#[derive(Parser, Debug)]
#[command(name = "telemetry-cli")]
#[command(about = "Convert CAN layouts and telemetry recordings to JSON", long_about = None)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert a DBC file to a JSON layout document
    DbcToJson {
        /// Path to the DBC file
        dbc: PathBuf,

        /// Output JSON file
        #[arg(default_value = "vehicle.json")]
        output: PathBuf,
    },

    /// Show recording information
    Info {
        /// Path to the recording (JSON lines)
        recording: PathBuf,
    },

    /// Extract one topic, or every topic, to JSON
    Extract {
        /// Path to the recording (JSON lines)
        recording: PathBuf,

        /// Extract a specific topic
        #[arg(long, conflicts_with = "all_topics")]
        topic: Option<String>,

        /// Extract all topics, one file per topic
        #[arg(long)]
        all_topics: bool,

        /// Output file (single topic) or directory (all topics)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,

        #[command(flatten)]
        window: WindowArgs,
    },

    /// Extract GPS points from navigation-fix records
    Gps {
        /// Path to the recording (JSON lines)
        recording: PathBuf,

        /// Navigation-fix topic
        #[arg(long, default_value = "/chcnav_fix_demo/fix")]
        topic: String,

        /// Output JSON file
        #[arg(short, long, value_name = "FILE", default_value = "gps_points.json")]
        output: PathBuf,
    },

    /// Synthesize pose and path records and write them as JSON lines
    Replay {
        /// Path to the recording (JSON lines)
        recording: PathBuf,

        /// Also forward /lidar_points as the terrain map
        #[arg(long)]
        terrain_map: bool,

        /// Output file (default: stdout)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        #[command(flatten)]
        window: WindowArgs,
    },
}

#[derive(ClapArgs, Debug)]
struct WindowArgs {
    /// Window start, seconds since the epoch
    #[arg(long, value_name = "SECS")]
    start_time: Option<f64>,

    /// Window end, seconds since the epoch
    #[arg(long, value_name = "SECS")]
    end_time: Option<f64>,

    /// Path to configuration file (TOML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

impl WindowArgs {
    /// Config-file settings with the command line window applied on top
    fn resolve(&self) -> Result<config::AppConfig> {
        let mut app = config::load_or_default(self.config.as_deref())?;
        if let Some(start) = self.start_time {
            app.extract.start_ms = ExtractConfig::new().with_window_secs(Some(start), None).start_ms;
        }
        if let Some(end) = self.end_time {
            app.extract.end_ms = ExtractConfig::new().with_window_secs(None, Some(end)).end_ms;
        }
        app.extract.validate().context("Invalid time window")?;
        Ok(app)
    }
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::debug!("Telemetry Convert CLI v{}", env!("CARGO_PKG_VERSION"));
    log::debug!("Using decoder library v{}", telemetry_decoder::VERSION);

    match args.command {
        Command::DbcToJson { dbc, output } => dbc_to_json(&dbc, &output),
        Command::Info { recording } => show_info(&recording),
        Command::Extract {
            recording,
            topic,
            all_topics,
            output,
            window,
        } => run_extract(&recording, topic.as_deref(), all_topics, output, &window),
        Command::Gps {
            recording,
            topic,
            output,
        } => run_gps(&recording, &topic, &output),
        Command::Replay {
            recording,
            terrain_map,
            output,
            window,
        } => run_replay(&recording, terrain_map, output.as_deref(), &window),
    }
}

fn open_recording(path: &Path) -> Result<JsonlRecording> {
    JsonlRecording::open(path).with_context(|| format!("Failed to open recording: {:?}", path))
}

/// DBC -> layout JSON document
fn dbc_to_json(dbc: &Path, output: &Path) -> Result<()> {
    let layouts = parse_dbc_file(dbc).with_context(|| format!("Failed to load DBC: {:?}", dbc))?;
    let document = LayoutDocument::from_layouts(layouts);

    // Report layouts the decoder would reject; the document is still written
    let invalid = document.decode_all().iter().filter(|r| r.is_err()).count();
    if invalid > 0 {
        log::warn!("{} of {} messages have invalid layouts", invalid, document.messages.len());
    }

    document
        .save(output)
        .with_context(|| format!("Failed to write {:?}", output))?;

    let signals: usize = document.messages.iter().map(|m| m.signals.len()).sum();
    log::info!(
        "Converted {} messages ({} signals) from {:?} to {:?}",
        document.messages.len(),
        signals,
        dbc,
        output
    );
    Ok(())
}

fn show_info(path: &Path) -> Result<()> {
    let recording = open_recording(path)?;
    let info = recording.info();
    let when = |t: Option<chrono::DateTime<chrono::Utc>>| {
        t.map(|d| d.format("%Y-%m-%d %H:%M:%S%.3f UTC").to_string())
            .unwrap_or_else(|| "-".to_string())
    };

    println!("Recording: {:?}", path);
    println!("Size: {:.2} MB", info.size_bytes as f64 / 1024.0 / 1024.0);
    println!("Duration: {:.2} seconds", info.duration());
    println!("Start: {}", when(info.start_datetime()));
    println!("End: {}", when(info.end_datetime()));
    println!("Messages: {}", info.message_count);
    println!("\nTopics ({}):", info.topics.len());
    for (topic, t) in &info.topics {
        println!("  {}", topic);
        println!("    Type: {}", t.message_type);
        println!("    Messages: {}", t.message_count);
        println!("    Connections: {}", t.connection_count);
    }
    Ok(())
}

fn run_extract(
    path: &Path,
    topic: Option<&str>,
    all_topics: bool,
    output: Option<PathBuf>,
    window: &WindowArgs,
) -> Result<()> {
    let app = window.resolve()?;
    let recording = open_recording(path)?;

    if let Some(topic) = topic {
        let output = output.unwrap_or_else(|| PathBuf::from(format!("{}.json", safe_topic_name(topic))));
        let count = extract_topic_to_file(&recording, topic, &app.extract, &output)
            .with_context(|| format!("Failed to extract {}", topic))?;
        if count == 0 {
            log::info!("Nothing to write for {} in the requested window", topic);
        }
        return Ok(());
    }

    if !all_topics {
        bail!("Specify --topic <TOPIC> or --all-topics");
    }

    let output_dir = output
        .or(app.output.output_dir)
        .unwrap_or_else(|| PathBuf::from("extracted"));
    let summary = write_topic_files(&recording, &app.extract, &output_dir)
        .with_context(|| format!("Failed to extract topics to {:?}", output_dir))?;

    if summary.failed_records > 0 {
        log::warn!("{} records could not be decoded", summary.failed_records);
    }
    if summary.is_empty() {
        log::info!("No messages matched the requested topics and window");
    } else {
        let files = summary
            .topics
            .iter()
            .filter(|t| matches!(t.status, TopicStatus::Written { .. }))
            .count();
        log::info!("Wrote {} messages to {} files in {:?}", summary.written_count(), files, output_dir);
    }
    Ok(())
}

fn run_gps(path: &Path, topic: &str, output: &Path) -> Result<()> {
    let recording = open_recording(path)?;
    let points = extract_gps_points(&recording, topic)?;

    if points.is_empty() {
        log::info!("No GPS points found on {}", topic);
        return Ok(());
    }

    write_gps_points(&points, output).with_context(|| format!("Failed to write {:?}", output))?;
    log::info!("Extracted {} GPS points to {:?}", points.len(), output);
    Ok(())
}

fn run_replay(path: &Path, terrain_map: bool, output: Option<&Path>, window: &WindowArgs) -> Result<()> {
    let app = window.resolve()?;
    let mut replay_config = app.replay;
    if terrain_map && replay_config.terrain_topic.is_none() {
        replay_config = replay_config.with_terrain_topic("/lidar_points");
    }

    let recording = open_recording(path)?;
    let mut replayer = Replayer::new(replay_config)?;

    let sink: Box<dyn Write> = match output {
        Some(p) => Box::new(File::create(p).with_context(|| format!("Failed to create {:?}", p))?),
        None => Box::new(io::stdout().lock()),
    };
    let mut publisher = JsonLinesPublisher::new(BufWriter::new(sink));

    let stats = replayer.replay_source(&recording, &app.extract, &mut publisher)?;
    publisher.into_inner().flush()?;

    if stats.poses + stats.fixes + stats.forwarded == 0 {
        log::info!("No routed records found in the requested window");
    }
    Ok(())
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
