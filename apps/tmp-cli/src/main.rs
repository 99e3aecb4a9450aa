//! TMP Assembly CLI
//!
//! Thin caller around `tmp-core`: every subcommand builds an engine from
//! the standard (or a TOML) catalog and layout, then hands off.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::borrow::Cow;
use std::io::Read;
use std::path::{Path, PathBuf};
use tmp_core::{
    output_file_name, process_request, AssemblyInput, AssemblyRequest, HazardCatalog,
    HazardSelection, JobRecord, LayoutConfig, TemplateDocument, TmpEngine,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "tmp-cli")]
#[command(version, about = "Assemble Traffic Management Plans from a PDF template")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fill the template from a job file and write the finished TMP
    Generate {
        /// Source template PDF
        #[arg(long, env = "TMP_TEMPLATE")]
        template: PathBuf,

        /// Job record as JSON
        #[arg(long)]
        job: PathBuf,

        /// Hazard keys in display order (repeat or comma-separate)
        #[arg(long = "hazard", value_delimiter = ',')]
        hazards: Vec<String>,

        /// Free-text site specific hazard
        #[arg(long)]
        custom_hazard: Option<String>,

        /// Traffic management diagram (PNG or JPEG)
        #[arg(long)]
        diagram: Option<PathBuf>,

        #[command(flatten)]
        config: ConfigArgs,

        /// Output file; defaults to TMP_<reference>_<HHMM>.pdf in --out-dir
        #[arg(short, long, conflicts_with = "out_dir")]
        output: Option<PathBuf>,

        /// Directory for the generated file
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },

    /// Read an assembly request as JSON on stdin and print the result
    Process {
        #[arg(long, env = "TMP_TEMPLATE")]
        template: PathBuf,

        #[command(flatten)]
        config: ConfigArgs,
    },

    /// List the hazard catalog
    Hazards {
        /// Hazard catalog TOML (defaults to the standard catalog)
        #[arg(long)]
        catalog: Option<PathBuf>,
    },

    /// Report placements the template cannot satisfy
    Check {
        #[arg(long, env = "TMP_TEMPLATE")]
        template: PathBuf,

        /// Layout TOML (defaults to the standard layout)
        #[arg(long)]
        layout: Option<PathBuf>,
    },
}

#[derive(clap::Args, Debug)]
struct ConfigArgs {
    /// Layout TOML (defaults to the standard layout)
    #[arg(long)]
    layout: Option<PathBuf>,

    /// Hazard catalog TOML (defaults to the standard catalog)
    #[arg(long)]
    catalog: Option<PathBuf>,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // stdout carries results only
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Command::Generate {
            template,
            job,
            hazards,
            custom_hazard,
            diagram,
            config,
            output,
            out_dir,
        } => generate(
            &template,
            &job,
            hazards,
            custom_hazard,
            diagram.as_deref(),
            &config,
            output,
            &out_dir,
        ),
        Command::Process { template, config } => process(&template, &config),
        Command::Hazards { catalog } => list_hazards(catalog.as_deref()),
        Command::Check { template, layout } => check(&template, layout.as_deref()),
    }
}

fn load_catalog(path: Option<&Path>) -> Result<Cow<'static, HazardCatalog>> {
    match path {
        Some(path) => HazardCatalog::from_file(path)
            .map(Cow::Owned)
            .with_context(|| format!("Failed to load hazard catalog {}", path.display())),
        None => Ok(Cow::Borrowed(HazardCatalog::standard())),
    }
}

fn load_layout(path: Option<&Path>) -> Result<LayoutConfig> {
    match path {
        Some(path) => LayoutConfig::from_file(path)
            .with_context(|| format!("Failed to load layout {}", path.display())),
        None => Ok(LayoutConfig::default()),
    }
}

#[allow(clippy::too_many_arguments)]
fn generate(
    template: &Path,
    job: &Path,
    hazards: Vec<String>,
    custom_hazard: Option<String>,
    diagram: Option<&Path>,
    config: &ConfigArgs,
    output: Option<PathBuf>,
    out_dir: &Path,
) -> Result<()> {
    let catalog = load_catalog(config.catalog.as_deref())?;
    let engine = TmpEngine::new(&catalog, load_layout(config.layout.as_deref())?)?;

    let job_json = std::fs::read_to_string(job)
        .with_context(|| format!("Failed to read job file {}", job.display()))?;
    let job: JobRecord = serde_json::from_str(&job_json)
        .with_context(|| format!("Invalid job record in {}", job.display()))?;

    let diagram = diagram
        .map(|path| {
            std::fs::read(path)
                .with_context(|| format!("Failed to read diagram {}", path.display()))
        })
        .transpose()?;

    let input = AssemblyInput {
        hazards: HazardSelection::new(hazards, custom_hazard)?,
        job,
        diagram,
    };

    let output = output.unwrap_or_else(|| {
        out_dir.join(output_file_name(
            &input.job.reference,
            chrono::Local::now().naive_local(),
        ))
    });

    let document = TemplateDocument::load(template)
        .with_context(|| format!("Failed to open template {}", template.display()))?;
    let report = engine
        .compose(document, &input)?
        .save(&output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    for skipped in &report.skipped {
        tracing::warn!("Skipped: {}", skipped);
    }
    tracing::info!(
        rows = report.hazard_rows,
        pages = report.page_count,
        diagram = report.diagram_placed,
        "Wrote TMP"
    );
    println!("{}", output.display());
    Ok(())
}

fn process(template: &Path, config: &ConfigArgs) -> Result<()> {
    let catalog = load_catalog(config.catalog.as_deref())?;
    let engine = TmpEngine::new(&catalog, load_layout(config.layout.as_deref())?)?;

    let template_bytes = std::fs::read(template)
        .with_context(|| format!("Failed to read template {}", template.display()))?;

    let mut body = String::new();
    std::io::stdin()
        .read_to_string(&mut body)
        .context("Failed to read request from stdin")?;
    let request: AssemblyRequest =
        serde_json::from_str(&body).context("Invalid assembly request")?;

    let result = process_request(
        &engine,
        &template_bytes,
        request,
        chrono::Local::now().naive_local(),
    );
    println!("{}", serde_json::to_string_pretty(&result)?);

    if !result.success {
        bail!(
            "Assembly failed: {}",
            result.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

fn list_hazards(catalog: Option<&Path>) -> Result<()> {
    let catalog = load_catalog(catalog)?;
    for (key, hazard) in catalog.iter() {
        println!(
            "{:<12} {:>3} -> {:<3} {}",
            key, hazard.score, hazard.residual, hazard.label
        );
    }
    Ok(())
}

fn check(template: &Path, layout: Option<&Path>) -> Result<()> {
    let layout = load_layout(layout)?;
    layout.validate()?;
    let document = TemplateDocument::load(template)
        .with_context(|| format!("Failed to open template {}", template.display()))?;

    println!("{}: {} pages", template.display(), document.page_count());
    let skipped = document.check_layout(&layout);
    if skipped.is_empty() {
        println!("All placements fit");
    }
    for placement in skipped {
        println!("  {}", placement);
    }
    Ok(())
}
