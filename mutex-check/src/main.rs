#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::PathBuf;

use clap::Parser;
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use mutex_check_core::report::{RETURN_ESCAPE_MESSAGE, UNLOCKED_MESSAGE, finding_line};
use mutex_check_core::{AnalyzerOptions, Report, Violation, VariantKind, check_program};
use mutex_check_ir::{LoadConfig, ProgramModel};

mod manifest;

const LOG_ENV: &str = "MUTEX_CHECK_LOG";

#[derive(Parser, Debug)]
#[command(
    name = "mutex-check",
    version,
    about = "Check that annotated variables and struct fields are only touched with their mutex held"
)]
struct Cli {
    /// Root package directory.
    #[arg(long, default_value = ".")]
    path: PathBuf,

    /// Program snapshot written by the front end. Overrides `mutex-check.toml`.
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Build flag the snapshot is expected to carry (repeatable).
    #[arg(long = "build-flag")]
    build_flags: Vec<String>,

    /// Location kind to check (repeatable). Defaults to all.
    #[arg(long = "variant", value_enum)]
    variants: Vec<VariantArg>,

    /// Print the failing call path under each unlocked-access line.
    #[arg(long, default_value_t = false)]
    show_paths: bool,

    /// Verify locations on the current thread only.
    #[arg(long, default_value_t = false)]
    sequential: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum VariantArg {
    /// Package-level variables guarded by a package-level mutex.
    Globals,
    /// Struct fields guarded by a sibling mutex field.
    Fields,
}

impl From<VariantArg> for VariantKind {
    fn from(v: VariantArg) -> Self {
        match v {
            VariantArg::Globals => VariantKind::Globals,
            VariantArg::Fields => VariantKind::Fields,
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn load_config(cli: &Cli, resolved: &manifest::ResolvedManifest) -> LoadConfig {
    let mut cfg = LoadConfig::new(&cli.path);
    cfg.snapshot = cli.snapshot.clone().or_else(|| resolved.snapshot.clone());
    cfg.module = resolved.module.clone();
    cfg.build_flags = if cli.build_flags.is_empty() {
        resolved.build_flags.clone()
    } else {
        cli.build_flags.clone()
    };
    cfg
}

fn analyzer_options(cli: &Cli, resolved: &manifest::ResolvedManifest) -> AnalyzerOptions {
    let mut options = AnalyzerOptions::default();
    if !cli.variants.is_empty() {
        options.variants = Vec::new();
        for v in &cli.variants {
            let kind = VariantKind::from(*v);
            if !options.variants.contains(&kind) {
                options.variants.push(kind);
            }
        }
    } else if let Some(variants) = &resolved.variants {
        options.variants = variants.clone();
    }
    options.parallel = !cli.sequential && resolved.parallel.unwrap_or(true);
    options
}

/// Warnings first, then unlocked-access lines, then return-escape lines.
fn render(report: &Report, model: &ProgramModel, show_paths: bool) -> Vec<String> {
    let mut out = report.warning_lines(model);
    if !show_paths {
        out.extend(report.finding_lines(model));
        return out;
    }

    let mut grouped: BTreeMap<String, Vec<&Violation>> = BTreeMap::new();
    for v in report.violations() {
        if let Some(pos) = v.primary_position() {
            grouped
                .entry(finding_line(model, pos, UNLOCKED_MESSAGE))
                .or_default()
                .push(v);
        }
    }
    for (line, violations) in grouped {
        out.push(line);
        for v in violations {
            out.push(format!("    {}", v.signature));
            for pos in v.positions.iter().filter(|p| p.is_valid()).skip(1) {
                out.push(format!("      also at {}", model.display_position(*pos)));
            }
        }
    }
    out.extend(
        report
            .finding_lines(model)
            .into_iter()
            .filter(|l| l.ends_with(RETURN_ESCAPE_MESSAGE)),
    );
    out
}

fn main() -> miette::Result<()> {
    init_logging();
    let cli = Cli::parse();

    let resolved = manifest::load_resolved_manifest(&cli.path)?;
    let config = load_config(&cli, &resolved);
    let model = mutex_check_ir::resolve(&config)?;

    let options = analyzer_options(&cli, &resolved);
    tracing::debug!(variants = ?options.variants, parallel = options.parallel, "starting analysis");
    let report = check_program(&model, &options);

    let stdout = io::stdout();
    let mut lock = stdout.lock();
    for line in render(&report, &model, cli.show_paths) {
        writeln!(lock, "{line}").into_diagnostic()?;
    }
    Ok(())
}
