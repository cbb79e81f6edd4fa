//! Application-level wiring: command-line options, image I/O and the
//! align-then-blend run shared by the binary and the integration tests.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use clap::{ArgAction, Parser};
use image::{DynamicImage, ImageReader};
use log::info;
use serde::Serialize;

use crate::align::{self, AlignParams, AlignStats};
use crate::blend::{self, BlendMode};
use crate::config::{self, AlignConfig};
use crate::error::{AlignError, Result};

/// Reads IMG1 and IMG2, registers the first to match the second, then blends
/// them and writes the result to DST.
#[derive(Parser, Debug, Clone)]
#[command(name = "align-merge", version, long_about = None)]
pub struct Cli {
    /// Treat both images as grayscale when blending.
    #[arg(short = 'g', long)]
    pub grayscale: bool,

    /// How the aligned pair is combined [default: average].
    #[arg(short, long, value_enum)]
    pub mode: Option<BlendMode>,

    /// Weight of the aligned first image in `average` mode, in [0, 1] [default: 0.5].
    #[arg(short, long)]
    pub alpha: Option<f64>,

    /// Lowe ratio for descriptor matching.
    #[arg(long)]
    pub ratio: Option<f64>,

    /// Keep at most this many corners per image.
    #[arg(long)]
    pub max_corners: Option<usize>,

    #[arg(long)]
    pub ransac_iterations: Option<usize>,

    /// Reprojection error, in pixels, below which a match is an inlier.
    #[arg(long)]
    pub ransac_threshold: Option<f64>,

    /// Only keep mutual nearest-neighbour matches.
    #[arg(long)]
    pub cross_check: bool,

    /// Seed for descriptor sampling and RANSAC.
    #[arg(long)]
    pub seed: Option<u64>,

    /// JSON file with default settings; flags override it.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Write the estimated homography and match statistics as JSON.
    #[arg(long)]
    pub homography_out: Option<PathBuf>,

    /// Also write the warped first image.
    #[arg(long)]
    pub aligned_out: Option<PathBuf>,

    /// More logging (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    pub img1: PathBuf,
    pub img2: PathBuf,
    pub dst: PathBuf,
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub img1: PathBuf,
    pub img2: PathBuf,
    pub dst: PathBuf,
    pub grayscale: bool,
    pub mode: BlendMode,
    pub alpha: f64,
    pub params: AlignParams,
    pub homography_out: Option<PathBuf>,
    pub aligned_out: Option<PathBuf>,
}

impl Cli {
    pub fn load_config(&self) -> Result<AlignConfig> {
        match &self.config {
            Some(path) => config::load_config(path),
            None => Ok(AlignConfig::default()),
        }
    }

    pub fn log_filter(&self, cfg: &AlignConfig) -> String {
        match self.verbose {
            0 => cfg.log_level.clone().unwrap_or_else(|| "warn".to_string()),
            1 => "info".to_string(),
            2 => "debug".to_string(),
            _ => "trace".to_string(),
        }
    }

    /// Merge flags over the config file over built-in defaults.
    pub fn resolve(&self, cfg: AlignConfig) -> RunOptions {
        let mut params = cfg.align;
        if let Some(r) = self.ratio {
            params.ratio = r;
        }
        if let Some(n) = self.max_corners {
            params.harris.max_corners = n;
        }
        if let Some(k) = self.ransac_iterations {
            params.ransac.iterations = k;
        }
        if let Some(t) = self.ransac_threshold {
            params.ransac.threshold = t;
        }
        if self.cross_check {
            params.cross_check = true;
        }
        if self.seed.is_some() {
            params.seed = self.seed;
        }

        RunOptions {
            img1: self.img1.clone(),
            img2: self.img2.clone(),
            dst: self.dst.clone(),
            grayscale: self.grayscale || cfg.grayscale.unwrap_or(false),
            mode: self.mode.or(cfg.mode).unwrap_or_default(),
            alpha: self.alpha.or(cfg.alpha).unwrap_or(0.5),
            params,
            homography_out: self.homography_out.clone().or(cfg.homography_out),
            aligned_out: self.aligned_out.clone().or(cfg.aligned_out),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HomographyReport {
    pub img1: String,
    pub img2: String,
    /// Row-major; maps img1 pixel coordinates onto img2.
    pub homography: [[f64; 3]; 3],
    pub stats: AlignStats,
}

/// Decode an image as 8-bit color, dropping any alpha channel.
pub fn load_image(path: &Path) -> Result<DynamicImage> {
    let read = |path: &Path| -> std::result::Result<DynamicImage, image::ImageError> {
        Ok(ImageReader::open(path)?.with_guessed_format()?.decode()?)
    };
    let img = read(path).map_err(|source| AlignError::ReadImage {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(DynamicImage::ImageRgb8(img.to_rgb8()))
}

pub fn save_image(img: &DynamicImage, path: &Path) -> Result<()> {
    ensure_parent_dir(path)?;
    img.save(path).map_err(|source| AlignError::WriteImage {
        path: path.to_path_buf(),
        source,
    })
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn write_json(path: &Path, value: &impl Serialize) -> Result<()> {
    ensure_parent_dir(path)?;
    let mut out = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut out, value)?;
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}

pub fn run(opts: &RunOptions) -> Result<AlignStats> {
    let im1 = load_image(&opts.img1)?;
    let im2 = load_image(&opts.img2)?;
    info!(
        "{} ({}x{}) -> {} ({}x{})",
        opts.img1.display(),
        im1.width(),
        im1.height(),
        opts.img2.display(),
        im2.width(),
        im2.height()
    );

    let alignment = align::align_images(&im1, &im2, &opts.params)?;

    if let Some(path) = &opts.aligned_out {
        save_image(&alignment.aligned, path)?;
        info!("wrote aligned image {}", path.display());
    }
    if let Some(path) = &opts.homography_out {
        let h = &alignment.homography;
        let report = HomographyReport {
            img1: opts.img1.to_string_lossy().into_owned(),
            img2: opts.img2.to_string_lossy().into_owned(),
            homography: [
                [h[(0, 0)], h[(0, 1)], h[(0, 2)]],
                [h[(1, 0)], h[(1, 1)], h[(1, 2)]],
                [h[(2, 0)], h[(2, 1)], h[(2, 2)]],
            ],
            stats: alignment.stats.clone(),
        };
        write_json(path, &report)?;
        info!("wrote homography {}", path.display());
    }

    let merged = blend::blend(
        &alignment.aligned,
        &im2,
        opts.mode,
        opts.alpha,
        opts.grayscale,
    )?;
    save_image(&merged, &opts.dst)?;
    info!("wrote {} ({} blend)", opts.dst.display(), opts.mode);

    Ok(alignment.stats)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_positional_and_flags_any_order() {
        let cli = Cli::try_parse_from([
            "align-merge",
            "a.png",
            "-g",
            "b.png",
            "--mode",
            "screen",
            "out.png",
        ])
        .expect("parses");
        assert!(cli.grayscale);
        assert_eq!(cli.mode, Some(BlendMode::Screen));
        assert_eq!(cli.img1, PathBuf::from("a.png"));
        assert_eq!(cli.img2, PathBuf::from("b.png"));
        assert_eq!(cli.dst, PathBuf::from("out.png"));
    }

    #[test]
    fn test_legacy_order() {
        let cli =
            Cli::try_parse_from(["align-merge", "-g", "a.jpg", "b.jpg", "c.jpg"]).expect("parses");
        let opts = cli.resolve(AlignConfig::default());
        assert!(opts.grayscale);
        assert_eq!(opts.mode, BlendMode::Average);
        assert_eq!(opts.alpha, 0.5);
    }

    #[test]
    fn test_missing_positional_is_error() {
        assert!(Cli::try_parse_from(["align-merge", "a.png", "b.png"]).is_err());
        assert!(Cli::try_parse_from(["align-merge", "--mode", "overlay", "a", "b", "c"]).is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from([
            "align-merge",
            "--alpha",
            "0.3",
            "--ratio",
            "0.7",
            "--seed",
            "9",
            "a",
            "b",
            "c",
        ])
        .expect("parses");
        let mut cfg = AlignConfig {
            mode: Some(BlendMode::Darken),
            alpha: Some(0.9),
            grayscale: Some(true),
            log_level: Some("debug".into()),
            ..Default::default()
        };
        cfg.align.ratio = 0.5;
        cfg.align.ransac.iterations = 77;
        assert_eq!(cli.log_filter(&cfg), "debug");

        let opts = cli.resolve(cfg);
        assert_eq!(opts.mode, BlendMode::Darken);
        assert_eq!(opts.alpha, 0.3);
        assert!(opts.grayscale);
        assert_eq!(opts.params.ratio, 0.7);
        assert_eq!(opts.params.ransac.iterations, 77);
        assert_eq!(opts.params.seed, Some(9));
    }

    #[test]
    fn test_verbosity() {
        let cli = Cli::try_parse_from(["align-merge", "-vv", "a", "b", "c"]).expect("parses");
        assert_eq!(cli.log_filter(&AlignConfig::default()), "debug");
    }

    #[test]
    fn test_unreadable_image_message() {
        let err = load_image(Path::new("/nonexistent/im1.png")).unwrap_err();
        assert_eq!(err.to_string(), "Could not read image: /nonexistent/im1.png");
    }
}
