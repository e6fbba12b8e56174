use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand, ValueEnum};

use skyorient::compass::{CompassConfig, CompassOverlay, ScaleProbe};
use skyorient::geom::tan::TanWcs;
use skyorient::orientation::{
    Dataset, OrientationLayer, OrientationManager, OrientationRequest, parse_rotation_angle,
};
use skyorient::rotated::{DEFAULT_RESCALE_PER_PIXEL, FrameConfig};
use skyorient::wcs::{ImageShape, SkyCoord, WcsInfo, WorldMapping};

#[derive(Parser)]
#[command(name = "skyorient", about = "Sky orientation compass and rotated reference frames")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the North/East compass for a reference image.
    Compass {
        #[command(flatten)]
        reference: ReferenceArgs,

        /// Arm length as a fraction of the smaller image dimension.
        #[arg(long, default_value = "0.4")]
        radius_fraction: f64,

        /// How the plate scale is probed at the image center.
        #[arg(long, value_enum, default_value = "pixel")]
        probe: Probe,
    },

    /// Synthesize a rotated, coordinates-only frame from a reference image.
    Orient {
        #[command(flatten)]
        reference: ReferenceArgs,

        /// Counter-clockwise rotation in degrees (blank means 0).
        #[arg(long, default_value = "", allow_hyphen_values = true)]
        angle: String,

        /// Place East to the right of North (mirrored).
        #[arg(long)]
        east_right: bool,

        /// Build a North-up preset instead of a custom angle.
        #[arg(long, value_enum)]
        preset: Option<Preset>,

        /// Placeholder frame shape as ROWSxCOLS.
        #[arg(long, default_value = "2x2", value_parser = parse_shape)]
        target_shape: ImageShape,

        /// Pixel scale multiplier per placeholder pixel.
        #[arg(long, default_value_t = DEFAULT_RESCALE_PER_PIXEL)]
        rescale: f64,
    },
}

#[derive(Args)]
struct ReferenceArgs {
    /// FITS file whose primary header supplies the WCS.
    #[arg(long, conflicts_with_all = ["crval", "scale"])]
    fits: Option<PathBuf>,

    /// Field center as "RA,DEC" in degrees.
    #[arg(long, allow_hyphen_values = true)]
    crval: Option<String>,

    /// Pixel scale in arcsec/pixel.
    #[arg(long)]
    scale: Option<f64>,

    /// Counter-clockwise rotation of North from +y, in degrees.
    #[arg(long, default_value = "0.0", allow_hyphen_values = true)]
    rotation: f64,

    /// Reference image has East to the right of North.
    #[arg(long)]
    mirrored: bool,

    /// Image shape as ROWSxCOLS (taken from NAXIS with --fits).
    #[arg(long, value_parser = parse_shape)]
    shape: Option<ImageShape>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Probe {
    Pixel,
    Degree,
}

#[derive(Clone, Copy, ValueEnum)]
enum Preset {
    NorthUpEastLeft,
    NorthUpEastRight,
}

fn fail(msg: impl std::fmt::Display) -> ! {
    eprintln!("Error: {msg}");
    process::exit(1);
}

fn parse_shape(s: &str) -> Result<ImageShape, String> {
    let (rows, cols) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("shape must look like ROWSxCOLS, got {s:?}"))?;
    let rows: usize = rows.trim().parse().map_err(|e| format!("bad row count: {e}"))?;
    let cols: usize = cols.trim().parse().map_err(|e| format!("bad column count: {e}"))?;
    Ok(ImageShape::new(rows, cols))
}

fn parse_pair(s: &str) -> (f64, f64) {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != 2 {
        fail(format!("expected two comma-separated values, got {s:?}"));
    }
    let parse = |p: &str| {
        p.trim()
            .parse::<f64>()
            .unwrap_or_else(|_| fail(format!("invalid number {p:?}")))
    };
    (parse(parts[0]), parse(parts[1]))
}

#[cfg(feature = "fits")]
fn load_fits_header(path: &std::path::Path) -> WcsInfo {
    use fitsrs::Fits;
    use fitsrs::card::Value;
    use fitsrs::hdu::HDU;
    use std::fs::File;
    use std::io::BufReader;

    const KEYWORDS: &[&str] = &[
        "CRVAL1", "CRVAL2", "CRPIX1", "CRPIX2", "CDELT1", "CDELT2", "PC1_1", "PC1_2", "PC2_1",
        "PC2_2", "CD1_1", "CD1_2", "CD2_1", "CD2_2",
    ];

    let f = File::open(path)
        .unwrap_or_else(|e| fail(format!("failed to open FITS file {}: {e}", path.display())));
    let mut hdu_list = Fits::from_reader(BufReader::new(f));

    // The primary HDU may be empty, with the image in an extension.
    let hdu = loop {
        match hdu_list.next() {
            Some(Ok(HDU::Primary(hdu))) | Some(Ok(HDU::XImage(hdu))) => {
                if hdu.get_header().get_xtension().get_naxis().len() >= 2 {
                    break hdu;
                }
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => fail(format!("failed to read FITS HDU: {e}")),
            None => fail("no image HDU with data found in FITS file"),
        }
    };

    let header = hdu.get_header();
    let naxis = header.get_xtension().get_naxis();
    let mut info = WcsInfo::new();
    info.insert("NAXIS1", naxis[0] as f64);
    info.insert("NAXIS2", naxis[1] as f64);
    for key in KEYWORDS {
        match header.get(key) {
            Some(Value::Float { value, .. }) => info.insert(key, *value),
            Some(Value::Integer { value, .. }) => info.insert(key, *value as f64),
            _ => {}
        }
    }
    log::info!("read {} WCS keywords from {}", info.iter().count(), path.display());
    info
}

#[cfg(not(feature = "fits"))]
fn load_fits_header(_path: &std::path::Path) -> WcsInfo {
    fail("FITS support not enabled. Build with --features fits")
}

fn load_reference(args: &ReferenceArgs) -> Dataset {
    if let Some(path) = &args.fits {
        let info = load_fits_header(path);
        let shape = args
            .shape
            .or_else(|| info.shape())
            .unwrap_or_else(|| fail("image shape missing; pass --shape"));
        let wcs = TanWcs::from_header(&info).unwrap_or_else(|e| fail(e));
        let label = path.file_name().map_or_else(
            || path.display().to_string(),
            |n| n.to_string_lossy().into_owned(),
        );
        return Dataset::new(label, shape).with_mapping(wcs).with_wcs_info(info);
    }

    let shape = args
        .shape
        .unwrap_or_else(|| fail("--shape is required without --fits"));
    let Some(crval) = &args.crval else {
        log::warn!("no --crval or --fits given; the compass falls back to the image center");
        return Dataset::new("reference", shape);
    };
    let (ra, dec) = parse_pair(crval);
    let scale = args
        .scale
        .unwrap_or_else(|| fail("--scale is required with --crval"));
    let wcs = TanWcs::from_scale_rotation(
        SkyCoord::new(ra, dec),
        shape.center(),
        scale / 3600.0,
        args.rotation,
        !args.mirrored,
    );
    Dataset::new("reference", shape).with_mapping(wcs)
}

fn cmd_compass(reference: &ReferenceArgs, radius_fraction: f64, probe: Probe) {
    let dataset = load_reference(reference);
    let config = CompassConfig {
        radius_fraction,
        probe: match probe {
            Probe::Pixel => ScaleProbe::Pixel,
            Probe::Degree => ScaleProbe::Degree,
        },
    };
    let mapping = dataset.mapping.as_deref().map(|m| m as &dyn WorldMapping);
    let overlay = CompassOverlay::for_mapping(mapping, dataset.shape, &config);
    let ((xx, xy), (yx, yy)) = overlay.pixel_arms(dataset.shape);

    match overlay {
        CompassOverlay::Full(g) => {
            println!("Compass for {}:", dataset.label);
            println!("  Center: ({:.3}, {:.3})", g.x, g.y);
            println!("  North:  ({:.3}, {:.3})  degn = {:+.3} deg", g.xn, g.yn, g.degn);
            println!("  East:   ({:.3}, {:.3})  dege = {:+.3} deg", g.xe, g.ye, g.dege);
            println!("  X flip: {}", g.xflip);
        }
        CompassOverlay::CenterOnly { x, y } => {
            println!("No usable WCS for {}; center only:", dataset.label);
            println!("  Center: ({x:.3}, {y:.3})");
        }
    }
    println!("  Pixel axes: X -> ({xx:.3}, {xy:.3}), Y -> ({yx:.3}, {yy:.3})");
}

fn print_layer(layer: &OrientationLayer) {
    let frame = &layer.frame;
    let cd = frame.wcs.cd_degrees();
    let shape = frame.shape();
    println!("Orientation {:?}:", layer.label);
    println!(
        "  Center: RA = {:.6} deg, Dec = {:+.6} deg",
        frame.center.ra, frame.center.dec
    );
    println!("  Frame rotation: {:.3} deg", frame.rotation_angle);
    println!("  Axis flips: {:?}", frame.axis_sign_flips);
    println!("  Placeholder shape: {} x {}", shape.rows, shape.cols);
    println!("  CD (deg/pix): [[{:.6e}, {:.6e}], [{:.6e}, {:.6e}]]", cd[0][0], cd[0][1], cd[1][0], cd[1][1]);
    println!("  Coordinates only: {}", frame.wcs_only);
}

fn cmd_orient(
    reference: &ReferenceArgs,
    angle: &str,
    east_right: bool,
    preset: Option<Preset>,
    target_shape: ImageShape,
    rescale: f64,
) {
    let dataset = load_reference(reference);
    let frame_config = FrameConfig {
        target_shape,
        rescale_per_pixel: rescale,
        ..FrameConfig::default()
    };
    let mut manager = OrientationManager::new(dataset).with_frame_config(frame_config);

    match manager.reference_angles() {
        Ok((degn, dege, xflip)) => eprintln!(
            "Reference angles: degn = {degn:+.3}, dege = {dege:+.3}, xflip = {xflip}"
        ),
        Err(e) => fail(e),
    }

    let label = match preset {
        Some(Preset::NorthUpEastLeft) => manager.north_up_east_left(true).map(str::to_string),
        Some(Preset::NorthUpEastRight) => manager.north_up_east_right(true).map(str::to_string),
        None => {
            let rotation_angle = parse_rotation_angle(angle).unwrap_or_else(|e| fail(e));
            let request = OrientationRequest {
                rotation_angle,
                east_left: !east_right,
                ..OrientationRequest::default()
            };
            manager.add_orientation(&request).map(|l| l.label.clone())
        }
    }
    .unwrap_or_else(|e| fail(e));

    match manager.get(&label) {
        Some(layer) => print_layer(layer),
        None => fail(format!("orientation {label:?} missing after creation")),
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Compass {
            reference,
            radius_fraction,
            probe,
        } => cmd_compass(reference, *radius_fraction, *probe),
        Commands::Orient {
            reference,
            angle,
            east_right,
            preset,
            target_shape,
            rescale,
        } => cmd_orient(reference, angle, *east_right, *preset, *target_shape, *rescale),
    }
}
