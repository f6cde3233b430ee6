//! plateaim CLI — command-line front end for armor-plate detection and
//! tracking.

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};

use plateaim::{
    AimPipeline, Armor, CameraModel, Detector, GimbalCommand, PipelineConfig, PoseSolver, Target,
};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "plateaim")]
#[command(about = "Detect and track armor plates, emitting gimbal aim commands")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect armor plates in a single image.
    Detect(DetectArgs),

    /// Run the full pipeline over an image sequence.
    Track(TrackArgs),
}

#[derive(Debug, Clone, Args)]
struct DetectArgs {
    /// Path to the input image.
    #[arg(long)]
    image: PathBuf,

    /// Pipeline configuration (JSON); built-in defaults when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Camera model (JSON); enables per-armor pose recovery.
    #[arg(long)]
    camera: Option<PathBuf>,

    /// Path to write detection results (JSON).
    #[arg(long)]
    out: PathBuf,
}

#[derive(Debug, Clone, Args)]
struct TrackArgs {
    /// Directory of frame images, processed in sorted filename order.
    #[arg(long)]
    frames: PathBuf,

    /// Camera model (JSON).
    #[arg(long)]
    camera: PathBuf,

    /// Pipeline configuration (JSON); built-in defaults when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Frame rate used to derive dt between consecutive frames.
    #[arg(long, default_value = "100.0")]
    fps: f64,

    /// Path to write per-frame target/command records (JSON).
    #[arg(long)]
    out: PathBuf,
}

#[derive(Serialize)]
struct DetectReport {
    image: String,
    armors: Vec<Armor>,
}

#[derive(Serialize)]
struct FrameRecord {
    file: String,
    target: Target,
    command: Option<GimbalCommand>,
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Detect(args) => run_detect(args),
        Commands::Track(args) => run_track(args),
    }
}

fn load_config(path: &Option<PathBuf>) -> CliResult<PipelineConfig> {
    match path {
        Some(p) => Ok(PipelineConfig::from_json_file(p)?),
        None => Ok(PipelineConfig::default()),
    }
}

fn load_camera(path: &Path) -> CliResult<CameraModel> {
    let data = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

fn run_detect(args: DetectArgs) -> CliResult<()> {
    let config = load_config(&args.config)?;

    tracing::info!("Loading image: {}", args.image.display());
    let frame = image::open(&args.image)?.to_rgb8();

    let mut detector = Detector::new(config.detector.clone());
    let mut armors = detector.detect(&frame, config.detect_color);
    tracing::info!("{} armors detected", armors.len());

    if let Some(camera_path) = &args.camera {
        let camera = load_camera(camera_path)?;
        let solver = PoseSolver::new(camera, &config.pose);
        let mut solved = 0usize;
        for armor in &mut armors {
            match solver.solve(armor) {
                Ok(pose) => {
                    armor.pose = Some(pose);
                    solved += 1;
                }
                Err(err) => tracing::warn!("pose solve failed: {err}"),
            }
        }
        tracing::info!("{} poses recovered", solved);
    }

    let report = DetectReport {
        image: args.image.display().to_string(),
        armors,
    };
    std::fs::write(&args.out, serde_json::to_string_pretty(&report)?)?;
    tracing::info!("Results written to {}", args.out.display());
    Ok(())
}

fn run_track(args: TrackArgs) -> CliResult<()> {
    let config = load_config(&args.config)?;
    let camera = load_camera(&args.camera)?;

    if args.fps <= 0.0 {
        return Err("fps must be positive".into());
    }
    let dt = 1.0 / args.fps;

    let mut frame_paths: Vec<PathBuf> = std::fs::read_dir(&args.frames)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .map(|e| matches!(e.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg" | "bmp"))
                .unwrap_or(false)
        })
        .collect();
    frame_paths.sort();

    if frame_paths.is_empty() {
        return Err(format!("no frame images found in {}", args.frames.display()).into());
    }
    tracing::info!("{} frames to process", frame_paths.len());

    let mut pipeline = AimPipeline::new(config);
    pipeline.set_camera(camera);

    let mut records = Vec::with_capacity(frame_paths.len());
    for path in &frame_paths {
        let frame = image::open(path)?.to_rgb8();
        let Some(output) = pipeline.process_frame(&frame, dt) else {
            continue;
        };
        records.push(FrameRecord {
            file: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            target: output.target,
            command: output.command,
        });
    }

    let tracking_frames = records.iter().filter(|r| r.target.tracking).count();
    tracing::info!(
        "{} of {} frames tracking (final state: {})",
        tracking_frames,
        records.len(),
        pipeline.tracker().state().label()
    );

    std::fs::write(&args.out, serde_json::to_string_pretty(&records)?)?;
    tracing::info!("Results written to {}", args.out.display());
    Ok(())
}
