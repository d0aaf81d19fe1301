use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use rand::{SeedableRng, rngs::StdRng};
use tracing_subscriber::EnvFilter;

use synthpaste::{
    ClassIndex, MaskChannels, MaskResolver, NoMasks, OutputDirs, PasteConfig, PriorAnnotations,
    ProjectLayout, RecordDocument, ResampleFilter, RunInputs, SiblingMaskFolder,
    annotation::export::write_labels,
};

#[derive(Parser, Debug)]
#[command(name = "synthpaste", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Paste instances onto every background of a project.
    Run(RunArgs),
    /// Convert one JSON box record to a normalized label file.
    Labels(LabelsArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Project root containing `backgrounds/` and `instances/`.
    #[arg(long)]
    project: PathBuf,

    /// JSON configuration; flags below override its fields.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output directory; defaults to `<project>/output/<timestamp>`.
    #[arg(long)]
    out: Option<PathBuf>,

    #[arg(long)]
    min_scale: Option<f64>,

    #[arg(long)]
    max_scale: Option<f64>,

    /// Ignore existing boxes when choosing scale.
    #[arg(long)]
    manual_scaling: bool,

    #[arg(long, value_enum)]
    filter: Option<FilterChoice>,

    #[arg(long)]
    max_attempts: Option<u32>,

    #[arg(long)]
    min_instances: Option<usize>,

    #[arg(long)]
    max_instances: Option<usize>,

    #[arg(long)]
    background_limit: Option<usize>,

    #[arg(long)]
    instance_limit: Option<usize>,

    /// Comma-separated category folders to draw instances from.
    #[arg(long, value_delimiter = ',')]
    categories: Option<Vec<String>>,

    /// Comma-separated ordered class list for label indices.
    #[arg(long, value_delimiter = ',')]
    classes: Option<Vec<String>>,

    /// Cumulative mask channel count (1 or 3).
    #[arg(long)]
    mask_channels: Option<u8>,

    /// Skip writing cumulative masks.
    #[arg(long)]
    no_masks: bool,

    /// Paste every instance opaquely, without looking for mask files.
    #[arg(long)]
    ignore_instance_masks: bool,

    /// JSON list of existing annotations keyed by background file name.
    #[arg(long)]
    prior_annotations: Option<PathBuf>,

    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Parser, Debug)]
struct LabelsArgs {
    /// JSON record written by `run`.
    #[arg(long)]
    record: PathBuf,

    /// Comma-separated ordered class list.
    #[arg(long, value_delimiter = ',', required = true)]
    classes: Vec<String>,

    /// Output label file.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FilterChoice {
    Nearest,
    Triangle,
    CatmullRom,
    Gaussian,
    Lanczos3,
}

impl From<FilterChoice> for ResampleFilter {
    fn from(choice: FilterChoice) -> Self {
        match choice {
            FilterChoice::Nearest => ResampleFilter::Nearest,
            FilterChoice::Triangle => ResampleFilter::Triangle,
            FilterChoice::CatmullRom => ResampleFilter::CatmullRom,
            FilterChoice::Gaussian => ResampleFilter::Gaussian,
            FilterChoice::Lanczos3 => ResampleFilter::Lanczos3,
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Run(args) => cmd_run(args),
        Command::Labels(args) => cmd_labels(args),
    }
}

fn load_config(args: &RunArgs) -> anyhow::Result<PasteConfig> {
    let mut cfg = match &args.config {
        Some(path) => PasteConfig::read(path)?,
        None => PasteConfig::default(),
    };

    if let Some(v) = args.min_scale {
        cfg.scaling.min_scaling_factor = v;
    }
    if let Some(v) = args.max_scale {
        cfg.scaling.max_scaling_factor = v;
    }
    if args.manual_scaling {
        cfg.scaling.manual_scaling = true;
    }
    if let Some(f) = args.filter {
        cfg.scaling.resample_filter = f.into();
    }
    if let Some(v) = args.max_attempts {
        cfg.max_placement_attempts = v;
    }
    if let Some(v) = args.min_instances {
        cfg.min_instances_per_background = v;
    }
    if let Some(v) = args.max_instances {
        cfg.max_instances_per_background = v;
    }
    if args.background_limit.is_some() {
        cfg.background_limit = args.background_limit;
    }
    if args.instance_limit.is_some() {
        cfg.instance_limit = args.instance_limit;
    }
    if let Some(cats) = &args.categories {
        cfg.instance_categories = Some(cats.clone());
    }
    if let Some(classes) = &args.classes {
        cfg.class_index_list = Some(classes.clone());
    }
    if let Some(n) = args.mask_channels {
        cfg.mask_channels = MaskChannels::from_count(n)?;
    }
    if args.no_masks {
        cfg.mask_disabled = true;
    }
    if args.seed.is_some() {
        cfg.seed = args.seed;
    }

    cfg.validate()?;
    Ok(cfg)
}

fn cmd_run(args: RunArgs) -> anyhow::Result<()> {
    let cfg = load_config(&args)?;
    let project = ProjectLayout::new(&args.project);

    let priors = match &args.prior_annotations {
        Some(path) => PriorAnnotations::read(path)?,
        None => PriorAnnotations::default(),
    };
    let masks: Box<dyn MaskResolver> = if args.ignore_instance_masks {
        Box::new(NoMasks)
    } else {
        Box::new(SiblingMaskFolder::default())
    };

    let out_base = match &args.out {
        Some(dir) => dir.clone(),
        None => project.output_dir(&synthpaste::run_timestamp()),
    };
    let out = OutputDirs::create(&out_base, !cfg.mask_disabled)?;

    let mut rng = match cfg.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let inputs = RunInputs {
        project: &project,
        priors: &priors,
        masks: masks.as_ref(),
        out: &out,
    };
    let summary = synthpaste::run(&cfg, &inputs, &mut rng)?;

    eprintln!(
        "wrote {} composites to {} ({} instances placed, {} skipped, {} backgrounds discarded)",
        summary.backgrounds_written,
        out_base.display(),
        summary.instances_placed,
        summary.instances_skipped,
        summary.backgrounds_discarded.len()
    );
    Ok(())
}

fn cmd_labels(args: LabelsArgs) -> anyhow::Result<()> {
    let doc = RecordDocument::read(&args.record)?;
    let classes = ClassIndex::new(args.classes)?;
    let boxes = synthpaste::normalize_document(&doc, &classes)?;

    ensure_parent(&args.out)?;
    write_labels(&args.out, &boxes)?;

    eprintln!("wrote {} ({} boxes)", args.out.display(), boxes.len());
    Ok(())
}

fn ensure_parent(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    Ok(())
}
