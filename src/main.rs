// src/main.rs - Command-line front end for the swing stabilizer
use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;

use swing_stabilizer::ball::CircularObjectDetector;
use swing_stabilizer::config::PipelineConfig;
use swing_stabilizer::data::{RecordedSwing, TrajectoryExporter};
use swing_stabilizer::detector::HandModelGate;
use swing_stabilizer::hand_fusion::FusionConfig;
use swing_stabilizer::line_orientation::LineOrientationDetector;
use swing_stabilizer::pose::Region;
use swing_stabilizer::video::FrameImages;
use swing_stabilizer::SwingPipeline;

#[derive(Parser)]
#[command(name = "swing_stabilizer")]
#[command(about = "Stabilize golf swing keypoints and locate swing cues in video frames")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the correction pipeline over recorded keypoints and export the trajectory.
    Stabilize(StabilizeArgs),

    /// Locate the ball in a single frame.
    Ball {
        #[arg(long)]
        image: PathBuf,

        /// Ignore candidates above this y coordinate (pixels).
        #[arg(long)]
        floor: Option<f64>,

        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Estimate the dominant line (club shaft) orientation in a frame.
    Line {
        #[arg(long)]
        image: PathBuf,

        /// Region of interest as x,y,width,height.
        #[arg(long)]
        roi: Option<String>,

        /// Prior orientation in degrees.
        #[arg(long)]
        prior: Option<f64>,

        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Args)]
struct StabilizeArgs {
    /// Recorded keypoints (JSON).
    #[arg(long)]
    keypoints: PathBuf,

    /// Pipeline configuration (JSON). Defaults apply to omitted fields.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the recorded frame rate.
    #[arg(long)]
    fps: Option<f64>,

    /// Directory frame images are resolved against (default: next to the keypoints file).
    #[arg(long)]
    frames_dir: Option<PathBuf>,

    /// Canvas size used for frames without an image.
    #[arg(long, default_value = "1920")]
    frame_width: u32,

    #[arg(long, default_value = "1080")]
    frame_height: u32,

    /// Use the Kalman fusion tuning instead of the EMA one.
    #[arg(long)]
    kalman: bool,

    /// Directory for the trajectory CSV.
    #[arg(long, default_value = "output")]
    out_dir: PathBuf,

    /// CSV file stem (default: swing_<timestamp>).
    #[arg(long)]
    session: Option<String>,

    /// Write the run report (JSON) here.
    #[arg(long)]
    report: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Stabilize(args) => run_stabilize(args).await,
        Commands::Ball { image, floor, config } => run_ball(&image, floor, config.as_deref()),
        Commands::Line {
            image,
            roi,
            prior,
            config,
        } => run_line(&image, roi.as_deref(), prior, config.as_deref()),
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(p) => Ok(PipelineConfig::from_json_file(p)?),
        None => Ok(PipelineConfig::default()),
    }
}

async fn run_stabilize(args: StabilizeArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if args.kalman {
        config.fusion = FusionConfig::kalman_variant();
    }

    let swing = RecordedSwing::from_json_file(&args.keypoints)?;
    let base_dir = match &args.frames_dir {
        Some(dir) => dir.clone(),
        None => args
            .keypoints
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
    };
    let mut images = FrameImages::new(base_dir, args.frame_width, args.frame_height);
    let seq = swing.into_sequence(args.fps, |reference| images.resolve(reference))?;
    info!("Loaded {} frames at {} fps ({} images)", seq.len(), seq.fps, images.loaded());

    let pipeline = SwingPipeline::new(config);
    let gate = HandModelGate::new();
    let output = pipeline
        .run_gated(&seq, &gate, || async {
            Err(anyhow::anyhow!("no hand landmark model is configured for this build"))
        })
        .await;

    let exporter = TrajectoryExporter::new(&args.out_dir, args.session);
    let csv_path = exporter.export_csv(&output.sequence)?;
    println!("Trajectory written to {}", csv_path.display());

    let report = serde_json::to_string_pretty(&output.report)?;
    match args.report {
        Some(path) => {
            std::fs::write(&path, report)
                .with_context(|| format!("Cannot write report {}", path.display()))?;
            println!("Report written to {}", path.display());
        }
        None => println!("{report}"),
    }
    Ok(())
}

fn run_ball(image: &Path, floor: Option<f64>, config: Option<&Path>) -> Result<()> {
    let config = load_config(config)?;
    let img = image::open(image).with_context(|| format!("Cannot open image {}", image.display()))?;
    let detection = CircularObjectDetector::new(config.ball).detect(&img, floor);
    println!("{}", serde_json::to_string_pretty(&detection)?);
    Ok(())
}

fn run_line(
    image: &Path,
    roi: Option<&str>,
    prior_deg: Option<f64>,
    config: Option<&Path>,
) -> Result<()> {
    let config = load_config(config)?;
    let img = image::open(image).with_context(|| format!("Cannot open image {}", image.display()))?;
    let region = roi.map(parse_roi).transpose()?;
    let detection = LineOrientationDetector::new(config.club_cue.line).detect(
        &img,
        region,
        prior_deg.map(f64::to_radians),
    );
    println!("{}", serde_json::to_string_pretty(&detection)?);
    Ok(())
}

fn parse_roi(s: &str) -> Result<Region> {
    let parts = s
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("ROI `{s}` must be four numbers"))?;
    let &[x, y, w, h] = parts.as_slice() else {
        bail!("ROI `{s}` must be x,y,width,height");
    };
    if w <= 0.0 || h <= 0.0 {
        bail!("ROI `{s}` has a non-positive size");
    }
    Ok(Region::new(x, y, w, h))
}
