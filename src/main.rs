use std::{
    error::Error,
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::bail;
use indicatif::{ProgressBar, ProgressIterator};
use npyz::{DType, NpyFile, Order, TypeChar};
use psf_distiller::{
    analyse_batch, AcquisitionMetadata, Axis, Dimensions, ImageOutcome, ImageReport,
    InMemoryImage, PixelSize, PsfConfig,
};
use strum::IntoEnumIterator;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "psf-distiller",
    about = "Microscope PSF estimation from fluorescent bead volumes"
)]
struct Opt {
    /// Bead volumes, .npy arrays shaped [x][y][z] or [time][channel][x][y][z]
    #[structopt(parse(from_os_str), required = true)]
    images: Vec<PathBuf>,
    /// Pixel size along x
    #[structopt(long, default_value = "1")]
    pixel_x: f64,
    /// Pixel size along y
    #[structopt(long, default_value = "1")]
    pixel_y: f64,
    /// Plane spacing along z
    #[structopt(long, default_value = "1")]
    pixel_z: f64,
    /// Minimum distance [pixel] of a bead to the border and to another bead
    #[structopt(short = "d", long, default_value = "10")]
    min_distance: usize,
    /// Noise tolerance of the maxima finder
    #[structopt(short, long, default_value = "50")]
    tolerance: f64,
    /// Half-width [pixel] of the lateral bead patch
    #[structopt(short, long, default_value = "8")]
    crop: usize,
    /// Channel index
    #[structopt(long, default_value = "0")]
    channel: usize,
    /// Time point index
    #[structopt(long, default_value = "0")]
    time_point: usize,
    /// Emission wavelength, in the pixel size unit
    #[structopt(long)]
    wavelength: Option<f64>,
    /// Objective numerical aperture
    #[structopt(long)]
    na: Option<f64>,
    /// Fits the beads in parallel
    #[structopt(long)]
    parallel: bool,
}

/// Loads a .npy volume into an image
fn load_npy(path: &Path) -> anyhow::Result<InMemoryImage> {
    let npy = NpyFile::new(BufReader::new(File::open(path)?))?;
    if matches!(npy.order(), Order::Fortran) {
        bail!("Fortran ordered arrays are not supported");
    }
    let shape: Vec<usize> = npy.shape().iter().map(|&n| n as usize).collect();
    let dimensions = match shape.as_slice() {
        &[x, y, z] => Dimensions::volume(x, y, z),
        &[time_points, channels, x, y, z] => Dimensions {
            x,
            y,
            z,
            channels,
            time_points,
        },
        _ => bail!("expected a 3 or 5 dimensions array, found shape {:?}", shape),
    };
    let samples: Vec<f64> = match npy.dtype() {
        DType::Plain(ts) => match (ts.type_char(), ts.size_field()) {
            (TypeChar::Float, 8) => npy.into_vec::<f64>()?,
            (TypeChar::Float, 4) => npy.into_vec::<f32>()?.into_iter().map(f64::from).collect(),
            (TypeChar::Uint, 1) => npy.into_vec::<u8>()?.into_iter().map(f64::from).collect(),
            (TypeChar::Uint, 2) => npy.into_vec::<u16>()?.into_iter().map(f64::from).collect(),
            (TypeChar::Uint, 4) => npy.into_vec::<u32>()?.into_iter().map(f64::from).collect(),
            (TypeChar::Int, 2) => npy.into_vec::<i16>()?.into_iter().map(f64::from).collect(),
            (TypeChar::Int, 4) => npy.into_vec::<i32>()?.into_iter().map(f64::from).collect(),
            _ => bail!("unsupported sample type {}", ts),
        },
        dtype => bail!("unsupported array type {:?}", dtype),
    };
    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(InMemoryImage::new(name, dimensions, samples))
}

fn summary(outcome: &ImageOutcome) {
    match &outcome.result {
        Ok(ImageReport::Analysed(analysis)) => {
            println!("{}:", outcome.name);
            println!(
                " - peaks: {} found, {} kept",
                analysis.raw_peaks.len(),
                analysis.peaks.len()
            );
            println!(
                " - beads: {} fitted out of {}",
                analysis.n_fitted(),
                analysis.beads.len()
            );
            for axis in Axis::iter() {
                println!(" - {} resolution: {}", axis, analysis.resolution.get(axis));
            }
            if let Some(theory) = analysis.theoretical {
                println!(" - {}", theory);
            }
        }
        Ok(ImageReport::NoPeaksFound { raw_peaks }) => println!(
            "{}: no peaks found ({} maxima rejected)",
            outcome.name,
            raw_peaks.len()
        ),
        Err(e) => {
            println!("{}: {}", outcome.name, e);
            let mut source = e.source();
            while let Some(cause) = source {
                println!("   caused by: {}", cause);
                source = cause.source();
            }
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let opt = Opt::from_args();

    let config = PsfConfig::default()
        .min_distance(opt.min_distance)
        .tolerance(opt.tolerance)
        .crop(opt.crop)
        .channel(opt.channel)
        .time_point(opt.time_point)
        .parallel(opt.parallel);
    let pixel_size = PixelSize::new(opt.pixel_x, opt.pixel_y, opt.pixel_z);
    let metadata = AcquisitionMetadata {
        emission_wavelength: opt.wavelength,
        numerical_aperture: opt.na,
    };

    let pb = ProgressBar::new(opt.images.len() as u64);
    let images = opt
        .images
        .iter()
        .progress_with(pb)
        .filter_map(|path| match load_npy(path) {
            Ok(image) => Some(image.pixel_size(pixel_size).metadata(metadata)),
            Err(e) => {
                log::error!("failed to load {}: {}", path.display(), e);
                None
            }
        });
    let outcomes = analyse_batch(images, &config)?;

    for outcome in &outcomes {
        summary(outcome);
    }

    Ok(())
}
