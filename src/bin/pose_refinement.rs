use camera_pose_refinement::config::RefinementConfig;
use camera_pose_refinement::data_loader::{FolderSequence, RgbdSequence};
use camera_pose_refinement::error::Result;
use camera_pose_refinement::io::{object_from_json, object_to_json, write_coverage_report};
use camera_pose_refinement::refinement::PoseRefinementDriver;
use camera_pose_refinement::sampling::FrameSamplingMode;
use camera_pose_refinement::visualization::{ImageFolderSink, MatchSink, RerunSink};
use clap::Parser;
use std::time::Instant;

#[derive(Parser)]
#[command(version, about, author)]
struct CPRSCli {
    /// path to the dataset folder (rgb/, depth/, optional mask/, camera.json)
    path: String,

    /// refinement config json, flags below override its values
    #[arg(long)]
    config: Option<String>,

    /// frame sampling: ["exhaustive", "consecutive", "hierarchical"]
    #[arg(long)]
    sampling: Option<FrameSamplingMode>,

    #[arg(long)]
    min_features: Option<usize>,

    #[arg(long)]
    max_features: Option<usize>,

    /// detect features on dynamic objects too
    #[arg(long)]
    no_mask: bool,

    /// raw depth value per meter
    #[arg(long, default_value_t = 1000.0)]
    depth_scale: f32,

    /// write one feature match image per frame pair into this folder
    #[arg(long)]
    debug_dir: Option<String>,

    /// save a rerun recording to this file
    #[arg(long)]
    rerun: Option<String>,

    /// coverage report output
    #[arg(long, default_value = "coverage_report.json")]
    report: String,

    /// correspondence output
    #[arg(long)]
    output: Option<String>,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = CPRSCli::parse();

    let mut config = match &cli.config {
        Some(path) => object_from_json(path)?,
        None => RefinementConfig {
            min_features_per_frame: 40,
            max_features_per_frame: Some(4096),
            ..Default::default()
        },
    };
    if let Some(sampling) = cli.sampling {
        config.frame_sampling = sampling;
    }
    if let Some(min_features) = cli.min_features {
        config.min_features_per_frame = min_features;
    }
    if let Some(max_features) = cli.max_features {
        config.max_features_per_frame = Some(max_features);
    }
    if cli.no_mask {
        config.mask_features = false;
    }

    let sequence = FolderSequence::open(&cli.path, cli.depth_scale)?;
    log::info!("{} frames in {}", sequence.num_frames(), cli.path);

    let mut sinks: Vec<Box<dyn MatchSink>> = Vec::new();
    if let Some(debug_dir) = &cli.debug_dir {
        sinks.push(Box::new(ImageFolderSink::new(debug_dir)?));
    }
    if let Some(rrd) = &cli.rerun {
        let recording = rerun::RecordingStreamBuilder::new("pose_refinement")
            .save(rrd)
            .map_err(|e| camera_pose_refinement::error::Error::Visualization(e.to_string()))?;
        sinks.push(Box::new(RerunSink::new(recording, "/matches")));
    }

    let frame_sampling = config.frame_sampling;
    let mut driver = PoseRefinementDriver::new(config)?;
    if !sinks.is_empty() {
        driver = driver.with_sink(Box::new(sinks));
    }

    let now = Instant::now();
    let output = driver.run(&sequence)?;
    println!(
        "extracting correspondences took {:.6} sec",
        now.elapsed().as_secs_f64()
    );
    println!(
        "{} correspondences from {}/{} frame pairs, stage {:?}",
        output.correspondences.len(),
        output.coverage.accepted_pairs,
        output.coverage.total_pairs,
        output.stage
    );

    write_coverage_report(
        &cli.report,
        frame_sampling,
        output.correspondences.len(),
        &output.coverage,
    )?;
    if let Some(path) = &cli.output {
        object_to_json(path, &output.correspondences)?;
    }
    Ok(())
}
