use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};

use bone_morphometry::nifti_io::{
    read_feature_map_file, read_mask_file, read_nifti_file, save_feature_map_to_file,
};
use bone_morphometry::utils::create_box_mask;
use bone_morphometry::{
    compute_global, compute_global_partitioned, compute_local_with_progress, repair_in_place,
    LocalMorphometryParams, Mask, MorphometryParams, Region, Volume,
};

#[derive(Parser, Debug)]
#[command(name = "bone_morphometry")]
#[command(about = "Trabecular bone morphometry (BV/TV, Tb.N, Tb.Th, Tb.Sp, BS/BV) from NIfTI volumes")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Metrics over the whole volume or ROI
    #[command(name = "global")]
    Global(GlobalArgs),
    /// Five-channel per-voxel feature map
    #[command(name = "local")]
    Local(LocalArgs),
    /// Replace NaN/Inf in an existing feature map
    #[command(name = "repair")]
    Repair(RepairArgs),
}

#[derive(Args, Debug, Clone)]
struct InputArgs {
    #[arg(long, required = true)]
    input: PathBuf,
    /// Mask volume; nonzero voxels are analysed
    #[arg(long, conflicts_with = "roi_box")]
    mask: Option<PathBuf>,
    /// Box ROI as X,Y,Z,SX,SY,SZ in voxels
    #[arg(long, value_delimiter = ',')]
    roi_box: Option<Vec<usize>>,
    /// Intensity at or above which a voxel is bone
    #[arg(long, default_value_t = 1.0)]
    threshold: f64,
    /// Intensity read for neighbours outside the grid
    #[arg(long, default_value_t = 0.0)]
    boundary: f64,
}

#[derive(Args, Debug, Clone)]
struct GlobalArgs {
    #[command(flatten)]
    input: InputArgs,
    #[arg(long)]
    partitions: Option<usize>,
    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug, Clone)]
struct LocalArgs {
    #[command(flatten)]
    input: InputArgs,
    #[arg(long, default_value_t = 2, conflicts_with = "radius_xyz")]
    radius: usize,
    /// Per-axis radius as X,Y,Z
    #[arg(long, value_delimiter = ',')]
    radius_xyz: Option<Vec<usize>>,
    #[arg(long, required = true)]
    output: PathBuf,
    /// Keep NaN/Inf from degenerate windows
    #[arg(long)]
    no_repair: bool,
}

#[derive(Args, Debug, Clone)]
struct RepairArgs {
    #[arg(long, required = true)]
    input: PathBuf,
    #[arg(long, required = true)]
    output: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.cmd {
        Command::Global(args) => run_global(args),
        Command::Local(args) => run_local(args),
        Command::Repair(args) => run_repair(args),
    }
}

fn run_global(args: GlobalArgs) -> Result<()> {
    let (volume, _, mask) = load_inputs(&args.input, !args.json)?;
    let params = MorphometryParams::new(args.input.threshold);

    let start = Instant::now();
    let result = match args.partitions {
        Some(n) => compute_global_partitioned(&volume, mask.as_ref(), &params, n),
        None => compute_global(&volume, mask.as_ref(), &params),
    }
    .context("global morphometry failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result).context("serializing result")?);
    } else {
        println!("[INFO] Computed in {:.2?}", start.elapsed());
        println!("Threshold: {}", params.threshold);
        println!("{}", result);
    }
    Ok(())
}

fn run_local(args: LocalArgs) -> Result<()> {
    let (volume, affine, mask) = load_inputs(&args.input, true)?;

    let params = match &args.radius_xyz {
        Some(r) if r.len() == 3 => {
            LocalMorphometryParams::new(args.input.threshold).with_radius_xyz([r[0], r[1], r[2]])
        }
        Some(r) => bail!("--radius-xyz needs 3 values, got {}", r.len()),
        None => LocalMorphometryParams::new(args.input.threshold).with_radius(args.radius),
    };

    println!(
        "\n[STEP 1] Sliding-window morphometry (radius {:?}, {} voxels per window)...",
        params.radius,
        params.window_len()
    );
    let start = Instant::now();
    let nz = volume.dims().2;
    let step = (nz / 10).max(1);
    let mut map = compute_local_with_progress(&volume, mask.as_ref(), &params, |done, total| {
        if done % step == 0 || done == total {
            println!("[INFO]   {}/{} slices", done, total);
        }
    })
    .context("local morphometry failed")?;
    println!("[INFO] Computed in {:.2?}", start.elapsed());

    let degenerate = map.count_non_finite();
    if args.no_repair {
        println!("[INFO] {} non-finite values kept", degenerate);
    } else {
        println!("\n[STEP 2] Repairing {} non-finite values...", degenerate);
        repair_in_place(&mut map);
    }

    println!("\n[STEP 3] Writing {}", args.output.display());
    save_feature_map_to_file(&args.output, &map, volume.voxel_size(), &affine)
        .with_context(|| format!("writing feature map {}", args.output.display()))?;
    Ok(())
}

fn run_repair(args: RepairArgs) -> Result<()> {
    ensure_file_exists(&args.input, "feature map")?;
    let mut loaded = read_feature_map_file(&args.input)
        .with_context(|| format!("reading feature map {}", args.input.display()))?;

    let before = loaded.map.count_non_finite();
    repair_in_place(&mut loaded.map);
    println!("[INFO] Replaced {} non-finite values", before);

    save_feature_map_to_file(&args.output, &loaded.map, loaded.voxel_size, &loaded.affine)
        .with_context(|| format!("writing feature map {}", args.output.display()))?;
    Ok(())
}

/// Volume, its affine, and the optional ROI from `--mask` or `--roi-box`
fn load_inputs(args: &InputArgs, verbose: bool) -> Result<(Volume, [f64; 16], Option<Mask>)> {
    ensure_file_exists(&args.input, "input")?;

    let start = Instant::now();
    let image = read_nifti_file(&args.input)
        .with_context(|| format!("reading volume {}", args.input.display()))?;
    let volume = image.volume.with_boundary_value(args.boundary);

    if verbose {
        let (nx, ny, nz) = volume.dims();
        let (vsx, vsy, vsz) = volume.voxel_size();
        println!("[INFO] Loaded in {:.2?}", start.elapsed());
        println!("[INFO] Volume: {}x{}x{}, Voxel: {:.3}x{:.3}x{:.3} mm", nx, ny, nz, vsx, vsy, vsz);
    }

    let mask = match (&args.mask, &args.roi_box) {
        (Some(path), _) => {
            ensure_file_exists(path, "mask")?;
            let mask = read_mask_file(path)
                .with_context(|| format!("reading mask {}", path.display()))?;
            if mask.dims() != volume.dims() && verbose {
                println!("[INFO] Mask extent {:?} differs from volume; outside is excluded", mask.dims());
            }
            Some(mask)
        }
        (None, Some(b)) => {
            if b.len() != 6 {
                bail!("--roi-box needs 6 values, got {}", b.len());
            }
            let region = Region::new((b[0], b[1], b[2]), (b[3], b[4], b[5]));
            if !region.fits_in(volume.dims()) {
                bail!("--roi-box {:?} does not fit in volume {:?}", b, volume.dims());
            }
            Some(Mask::from_u8(&create_box_mask(volume.dims(), &region), volume.dims())?)
        }
        (None, None) => None,
    };

    if verbose {
        if let Some(m) = &mask {
            println!("[INFO] Mask: {} voxels in scope", m.count_in_scope());
        }
    }

    Ok((volume, image.affine, mask))
}

fn ensure_file_exists(path: &Path, what: &str) -> Result<()> {
    if !path.exists() {
        bail!("{} file does not exist: {}", what, path.display());
    }
    if !path.is_file() {
        bail!("{} path is not a file: {}", what, path.display());
    }
    Ok(())
}
