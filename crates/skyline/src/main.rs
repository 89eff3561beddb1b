use anyhow::{Context, Result, bail};
use chrono::Local;
use clap::Parser;
use log::{debug, error, info, warn};
use std::io::Write;
use std::path::{Path, PathBuf};

use skyline::config::ENV_OPENSCAD;
use skyline::{
    AspectRatio, Config, Contributions, Granularity, Labels, SkylineError, SkylineGenerator,
    aggregate, emit, export_buckets_csv, materialize, write_scad,
};

#[derive(Parser)]
#[command(author, version, about = "Generate a 3D-printable skyline from daily contribution counts", long_about = None)]
struct Args {
    /// Contributions file (JSON)
    #[arg(short = 'f', long = "contributions", default_value = "contributions.json")]
    contributions: PathBuf,

    /// Output file (.scad, or .stl which requires OpenSCAD)
    #[arg(short = 'o', long = "output", default_value = "skyline.scad")]
    output: PathBuf,

    /// Configuration file (TOML)
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Aspect ratio of the skyline, e.g. 16:9
    #[arg(short = 'a', long = "aspect-ratio")]
    aspect_ratio: Option<AspectRatio>,

    /// Interval to use for contributions (day, week)
    #[arg(short = 'i', long = "interval")]
    interval: Option<Granularity>,

    /// Slope of the base walls in degrees
    #[arg(short = 'A', long = "base-angle")]
    base_angle: Option<f64>,

    /// Height of the base (mm)
    #[arg(short = 'H', long = "base-height")]
    base_height: Option<f64>,

    /// Distance from the buildings to the base walls (mm)
    #[arg(short = 'g', long = "base-margin")]
    base_margin: Option<f64>,

    /// Max building height (mm)
    #[arg(short = 'm', long = "max-building-height")]
    max_building_height: Option<f64>,

    /// Building width (mm)
    #[arg(short = 'w', long = "building-width")]
    building_width: Option<f64>,

    /// Building length (mm)
    #[arg(short = 'l', long = "building-length")]
    building_length: Option<f64>,

    /// Font used for the base labels
    #[arg(long = "font")]
    font: Option<String>,

    /// Username shown on the base (defaults to the one in the contributions file)
    #[arg(short = 'u', long = "username")]
    username: Option<String>,

    /// Drop leading years without any contribution
    #[arg(long = "trim-start-year")]
    trim_start_year: bool,

    /// Write the cleaned contributions record (future dates dropped, trimmed) to FILE
    #[arg(long = "save-contributions", value_name = "FILE")]
    save_contributions: Option<PathBuf>,

    /// Also write the aggregated buckets as CSV
    #[arg(long = "stats-csv")]
    stats_csv: Option<PathBuf>,

    /// Path to the openscad executable
    #[arg(long = "openscad")]
    openscad: Option<String>,

    /// Timeout for mesh generation in seconds
    #[arg(long = "timeout")]
    timeout: Option<u64>,

    /// Fail instead of writing a base-only model
    #[arg(long = "require-buildings")]
    require_buildings: bool,

    /// Verbose logging
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputType {
    Scad,
    Stl,
}

impl OutputType {
    fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("scad") => Ok(OutputType::Scad),
            Some("stl") => Ok(OutputType::Stl),
            Some(other) => bail!("Output file must be .scad or .stl, got .{other}"),
            None => bail!("Output file must have an extension: {}", path.display()),
        }
    }
}

fn main() {
    let args = Args::parse();

    // RUST_LOG wins when set
    let default_filter = if args.verbose { "debug" } else { "info" };
    let env = env_logger::Env::default().default_filter_or(default_filter);
    let _ = env_logger::Builder::from_env(env).try_init();

    if let Err(e) = run(args) {
        error!("Error: {e:#}");
        print_hints(&e);
        let _ = std::io::stderr().flush();
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let config = build_config(&args)?;
    debug!("{config:#?}");

    let output_type = OutputType::from_path(&args.output)?;

    let mut contribs = Contributions::load_from_file(&args.contributions)
        .with_context(|| format!("Loading contributions from {}", args.contributions.display()))?;
    contribs.discard_future(Local::now().date_naive())?;
    if args.trim_start_year && contribs.trim_start_year()? {
        info!("Start date moved to {}", contribs.first_date);
    }

    info!(
        "Total contributions: {} between {} and {}",
        contribs.total_contributions, contribs.first_date, contribs.last_date
    );
    if let Some(path) = &args.save_contributions {
        contribs
            .save_to_file(path)
            .with_context(|| format!("Saving contributions to {}", path.display()))?;
    }

    let buckets = aggregate(&contribs.by_date, config.granularity)?;
    if let Some(path) = &args.stats_csv {
        export_buckets_csv(&buckets, path)
            .with_context(|| format!("Exporting buckets to {}", path.display()))?;
        info!("Bucket statistics saved to: {}", path.display());
    }

    if buckets.is_empty() {
        return Err(SkylineError::EmptyInput.into());
    }
    let labels = labels_for(&config, &contribs)?;

    info!("Generating OpenSCAD ...");
    let skyline = SkylineGenerator::new(config.skyline_params()).generate(&buckets, labels)?;

    match output_type {
        OutputType::Scad => {
            write_scad(&skyline, &args.output, &config.emit_options())?;
        }
        OutputType::Stl => {
            // Keep the program on disk next to the mesh so a failed compile can be retried
            let scad_path = args.output.with_extension("scad");
            write_scad(&skyline, &scad_path, &config.emit_options())?;

            info!("Generating STL ...");
            let report = materialize(
                &emit(&skyline),
                &config.openscad_path,
                &args.output,
                config.tool_timeout(),
            )?;
            info!(
                "STL file written to {} in {:?}",
                report.path.display(),
                report.elapsed
            );
        }
    }

    Ok(())
}

/// Defaults, then the config file, then the environment, then flags.
fn build_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("Loading config from {}", path.display()))?,
        None => Config::default(),
    };
    config.apply_env()?;

    if let Some(v) = args.aspect_ratio {
        config.aspect_ratio = v;
    }
    if let Some(v) = args.interval {
        config.granularity = v;
    }
    if let Some(v) = args.base_angle {
        config.base_angle = v;
    }
    if let Some(v) = args.base_height {
        config.base_height = v;
    }
    if let Some(v) = args.base_margin {
        config.base_margin = v;
    }
    if let Some(v) = args.max_building_height {
        config.max_building_height = v;
    }
    if let Some(v) = args.building_width {
        config.building_width = v;
    }
    if let Some(v) = args.building_length {
        config.building_length = v;
    }
    if let Some(v) = &args.font {
        config.font = v.clone();
    }
    if let Some(v) = &args.username {
        config.username = Some(v.clone());
    }
    if let Some(v) = &args.openscad {
        config.openscad_path = v.clone();
    }
    if let Some(v) = args.timeout {
        config.tool_timeout_secs = v;
    }
    if args.require_buildings {
        config.allow_empty_model = false;
    }

    config.validate()?;
    Ok(config)
}

fn labels_for(config: &Config, contribs: &Contributions) -> Result<Labels> {
    let left = match &config.left_label {
        Some(label) => label.clone(),
        None => {
            let username = config.username.as_deref().unwrap_or(&contribs.username);
            if username.is_empty() {
                warn!("No username available; left label left blank");
                String::new()
            } else {
                format!("@{username}")
            }
        }
    };

    let right = match &config.right_label {
        Some(label) => label.clone(),
        None => contribs.year_range_text()?,
    };

    Ok(Labels { left, right })
}

fn print_hints(e: &anyhow::Error) {
    use std::io::ErrorKind;
    for cause in e.chain() {
        if let Some(err) = cause.downcast_ref::<SkylineError>() {
            if err.is_external_tool() {
                match err {
                    SkylineError::ToolNotFound { .. } => error!(
                        "Hint: Install OpenSCAD or point {ENV_OPENSCAD} / --openscad at it."
                    ),
                    SkylineError::ToolTimeout { .. } => error!(
                        "Hint: Raise --timeout; the .scad file was kept next to the output."
                    ),
                    _ => error!("Hint: Open the .scad file kept next to the output in OpenSCAD."),
                }
                return;
            }
            if matches!(err, SkylineError::EmptyInput) {
                error!("Hint: The contributions file has no dates.");
                return;
            }
        }
        if let Some(ioe) = cause.downcast_ref::<std::io::Error>() {
            match ioe.kind() {
                ErrorKind::PermissionDenied => {
                    error!("Hint: Run in a writable directory or choose another --output.");
                    return;
                }
                ErrorKind::NotFound => {
                    error!("Hint: Check that the input file exists.");
                    return;
                }
                _ => {}
            }
        }
    }
}
