use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgGroup, Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use zonecount::{
    pipeline::{self, Headless, RunOptions},
    session::{Session, SessionConfig},
    source::{RecordedDetections, ReplaySource},
    zones::{ZoneRect, ZoneStore},
    SessionReporter, PERSON_CLASS_ID,
};

#[derive(Parser, Debug)]
#[command(name = "zonecount", about = "Person line-crossing and zone occupancy counting")]
struct Cli {
    /// Zone file, rewritten on every zone change.
    #[arg(long = "zones", global = true, default_value = "zones.json")]
    zone_file: PathBuf,
    #[command(subcommand)]
    command: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Count people on a live camera, video file or RTSP stream (needs the `opencv` feature).
    Run(RunArgs),
    /// Count people from recorded detections (JSON lines).
    Replay(ReplayArgs),
    /// Inspect or edit the zone file.
    Zones {
        #[command(subcommand)]
        action: ZoneAction,
    },
}

#[derive(Args, Debug)]
struct CountingArgs {
    /// Horizontal crossing line; centers above it count as entries.
    #[arg(long, default_value_t = 250.0)]
    line_y: f32,
    /// Centroid distance in pixels under which a detection keeps its identity.
    #[arg(long, default_value_t = 50.0)]
    match_distance: f32,
    #[arg(long, default_value_t = PERSON_CLASS_ID)]
    person_class: i32,
    /// Totals log; one `entry,exit` line is appended per session.
    #[arg(long, default_value = "count_data.csv")]
    totals: PathBuf,
    #[arg(long)]
    log_json: Option<PathBuf>,
    #[arg(long, default_value_t = 5)]
    log_interval_seconds: u64,
    /// Stop after this many frames.
    #[arg(long)]
    max_frames: Option<u64>,
}

#[derive(Args, Debug)]
#[cfg_attr(not(feature = "opencv"), allow(dead_code))]
#[command(group(ArgGroup::new("input").required(true).args(["file", "rtsp", "camera"])))]
struct RunArgs {
    #[arg(long, value_name = "PATH")]
    file: Option<PathBuf>,
    #[arg(long, value_name = "URL")]
    rtsp: Option<String>,
    #[arg(long, value_name = "INDEX")]
    camera: Option<i32>,
    /// YOLO ONNX model with a `[1, 4 + classes, anchors]` output.
    #[arg(long, default_value = "yolov8n.onnx")]
    model: PathBuf,
    #[arg(long, default_value_t = 640)]
    input_size: i32,
    /// Detector-internal candidate score cut before suppression.
    #[arg(long, default_value_t = 0.25)]
    score_threshold: f32,
    #[arg(long, default_value_t = 0.45)]
    nms_iou: f32,
    /// Resize frames to this width before detection (0 keeps the source size).
    #[arg(long, default_value_t = 640)]
    width: i32,
    #[arg(long, default_value_t = 480)]
    height: i32,
    #[arg(long)]
    headless: bool,
    #[command(flatten)]
    counting: CountingArgs,
}

#[derive(Args, Debug)]
struct ReplayArgs {
    #[arg(value_name = "PATH")]
    input: PathBuf,
    #[command(flatten)]
    counting: CountingArgs,
}

#[derive(Subcommand, Debug)]
enum ZoneAction {
    List,
    /// Add a zone given as `x1,y1,x2,y2`.
    Add {
        #[arg(allow_hyphen_values = true)]
        rect: ZoneRect,
    },
    DeleteLast,
    Clear,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = Cli::parse();
    match cli.command {
        Mode::Run(args) => run_live(cli.zone_file, args),
        Mode::Replay(args) => replay(cli.zone_file, args),
        Mode::Zones { action } => edit_zones(cli.zone_file, action),
    }
}

fn session_for(zones: PathBuf, counting: &CountingArgs) -> Session {
    let config = SessionConfig {
        line_y: counting.line_y,
        match_distance: counting.match_distance,
        person_class: counting.person_class,
    };
    Session::new(
        config,
        ZoneStore::open(zones),
        SessionReporter::new(&counting.totals),
    )
}

fn run_options(counting: &CountingArgs) -> RunOptions {
    RunOptions {
        max_frames: counting.max_frames,
        log_json: counting.log_json.clone(),
        log_interval_seconds: counting.log_interval_seconds,
    }
}

fn replay(zones: PathBuf, args: ReplayArgs) -> Result<()> {
    let mut source = ReplaySource::open(&args.input)?;
    let mut session = session_for(zones, &args.counting);
    pipeline::run(
        &mut session,
        &mut source,
        &mut RecordedDetections,
        &mut Headless,
        &run_options(&args.counting),
    )?;
    Ok(())
}

#[cfg(feature = "opencv")]
fn run_live(zones: PathBuf, args: RunArgs) -> Result<()> {
    use anyhow::{bail, Context};
    use zonecount::video::{CaptureSource, Window, YoloDetector};

    let resize = (args.width > 0 && args.height > 0).then_some((args.width, args.height));
    let mut source = if let Some(index) = args.camera {
        CaptureSource::open_camera(index, resize)?
    } else if let Some(file) = &args.file {
        CaptureSource::open_file(&file.to_string_lossy(), resize)?
    } else if let Some(rtsp) = &args.rtsp {
        CaptureSource::open_file(rtsp, resize)?
    } else {
        bail!("Provide --file, --rtsp or --camera");
    };
    let model = args.model.to_str().context("Model path is invalid")?;
    let mut detector = YoloDetector::new(model, args.input_size, args.score_threshold, args.nms_iou)?;
    let mut session = session_for(zones, &args.counting);
    let options = run_options(&args.counting);

    if args.headless {
        pipeline::run(&mut session, &mut source, &mut detector, &mut Headless, &options)?;
        return Ok(());
    }
    let mut window = match Window::open("zonecount") {
        Ok(window) => window,
        Err(err) => {
            tracing::warn!("Failed to open display window: {}. Running headless.", err);
            pipeline::run(&mut session, &mut source, &mut detector, &mut Headless, &options)?;
            return Ok(());
        }
    };
    pipeline::run(&mut session, &mut source, &mut detector, &mut window, &options)?;
    Ok(())
}

#[cfg(not(feature = "opencv"))]
fn run_live(_zones: PathBuf, _args: RunArgs) -> Result<()> {
    anyhow::bail!("Live capture needs a build with `--features opencv`; use `replay` for recorded detections")
}

fn edit_zones(path: PathBuf, action: ZoneAction) -> Result<()> {
    let mut store = ZoneStore::open(&path);
    match action {
        ZoneAction::List => {
            for (index, zone) in store.iter().enumerate() {
                println!("Zone {}: {} (created {})", index + 1, zone.rect, zone.created_at);
            }
        }
        ZoneAction::Add { rect } => match store.add(rect) {
            Ok(index) => tracing::info!("Zone {} saved to {}", index + 1, path.display()),
            Err(err) if err.is_degenerate() => tracing::warn!("Zone {} not added: {}", rect, err),
            Err(err) => return Err(err.into()),
        },
        ZoneAction::DeleteLast => {
            if store.remove_last()? {
                tracing::info!("Last zone deleted");
            } else {
                tracing::info!("No zones to delete");
            }
        }
        ZoneAction::Clear => {
            store.clear()?;
            tracing::info!("All zones cleared");
        }
    }
    Ok(())
}
