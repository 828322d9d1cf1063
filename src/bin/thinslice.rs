use std::process::ExitCode;
use std::sync::Arc;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use thinslice_catalog::app::{App, DownloadOptions, SearchResult, SpecimenDetail};
use thinslice_catalog::config::ConfigLoader;
use thinslice_catalog::domain::{BatchConfig, LightMode, MAX_SECTIONS, Resolution};
use thinslice_catalog::error::CatalogError;
use thinslice_catalog::output::{JsonOutput, OutputMode};
use thinslice_catalog::timer::CancelToken;
use thinslice_catalog::tui::Dashboard;

#[derive(Parser)]
#[command(name = "thinslice")]
#[command(about = "Catalog of geological thin-section specimens with a simulated scanner")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Search the catalog")]
    Search(SearchArgs),
    #[command(about = "Show one specimen")]
    Show(ShowArgs),
    #[command(about = "Run a simulated scan batch")]
    Scan(ScanArgs),
    #[command(about = "List completed scan batches, newest first")]
    History,
    #[command(about = "Download simulated specimen files")]
    Download(DownloadArgs),
    #[command(about = "Static export utilities")]
    Export(ExportArgs),
}

#[derive(Args)]
struct SearchArgs {
    #[arg(default_value = "")]
    query: String,

    #[arg(long)]
    category: Option<String>,
}

#[derive(Args)]
struct ShowArgs {
    id: String,
}

#[derive(Args)]
struct ScanArgs {
    #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
    sections: i64,

    #[arg(long, value_enum, default_value_t = LightMode::Both)]
    light_mode: LightMode,

    #[arg(long, value_enum, default_value_t = Resolution::High)]
    resolution: Resolution,
}

#[derive(Args)]
struct DownloadArgs {
    id: String,

    #[arg(long = "format")]
    formats: Vec<String>,

    #[arg(long, default_value = ".")]
    out: Utf8PathBuf,

    #[arg(long)]
    simulate: bool,

    #[arg(long)]
    mbps: Option<f64>,
}

#[derive(Args)]
struct ExportArgs {
    #[command(subcommand)]
    command: ExportCommand,
}

#[derive(Subcommand)]
enum ExportCommand {
    #[command(about = "Rewrite root-relative paths in an exported site")]
    FixPaths { dir: Utf8PathBuf },
    #[command(about = "Write the JSON of a completed scan batch")]
    Batch {
        id: String,
        #[arg(long, default_value = ".")]
        out: Utf8PathBuf,
    },
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<CatalogError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &CatalogError) -> u8 {
    match error {
        CatalogError::SpecimenNotFound(_)
        | CatalogError::BatchNotFound(_)
        | CatalogError::MissingConfig(_) => 2,
        CatalogError::CatalogHttp(_) | CatalogError::CatalogStatus { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let app = App::from_config(config)?;

    match cli.command {
        Commands::Search(args) => run_search(args, &app, output_mode),
        Commands::Show(args) => run_show(args, &app, output_mode),
        Commands::Scan(args) => run_scan(args, &app, output_mode),
        Commands::History => run_history(&app, output_mode),
        Commands::Download(args) => run_download(args, app, output_mode),
        Commands::Export(args) => run_export(args, &app, output_mode),
    }
}

fn run_search(args: SearchArgs, app: &App, output_mode: OutputMode) -> miette::Result<()> {
    let result = app.search(&args.query, args.category.as_deref(), &JsonOutput)?;
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_search(&result).into_diagnostic(),
        OutputMode::Interactive => {
            print_search_summary(&result);
            Ok(())
        }
    }
}

fn run_show(args: ShowArgs, app: &App, output_mode: OutputMode) -> miette::Result<()> {
    let detail = app.show(&args.id, &JsonOutput)?;
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_show(&detail).into_diagnostic(),
        OutputMode::Interactive => {
            print_detail(&detail);
            Ok(())
        }
    }
}

fn run_scan(args: ScanArgs, app: &App, output_mode: OutputMode) -> miette::Result<()> {
    if args.sections > MAX_SECTIONS as i64 || args.sections < 1 {
        tracing::warn!(requested = args.sections, "section count clamped");
    }
    let config = BatchConfig::clamped(args.sections, args.light_mode, args.resolution);

    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.scan(config, Arc::new(JsonOutput))?;
            JsonOutput::print_scan(&result).into_diagnostic()
        }
        OutputMode::Interactive => {
            let mut dashboard = Dashboard::for_scan();
            let handle = app.start_scan(config, dashboard.sink())?;
            match dashboard.watch_scan(handle)? {
                Some(batch) => {
                    let result = App::scan_result(batch);
                    println!(
                        "{}: {} section(s), {} GB, {} frames, {}",
                        result.batch.id,
                        result.batch.config.num_sections,
                        result.total_size_gb,
                        result
                            .batch
                            .output
                            .as_ref()
                            .map(|output| output.total_frames)
                            .unwrap_or_default(),
                        result.scan_time
                    );
                }
                None => println!("scan cancelled"),
            }
            Ok(())
        }
    }
}

fn run_history(app: &App, output_mode: OutputMode) -> miette::Result<()> {
    let result = app.history()?;
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_history(&result).into_diagnostic(),
        OutputMode::Interactive => {
            println!("{} ({:?})", result.scanner_model, result.scanner_status);
            if result.batches.is_empty() {
                println!("no completed scans");
            }
            for batch in &result.batches {
                let size = batch
                    .output
                    .as_ref()
                    .map(|output| output.total_size_display())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{}  {}  {} section(s)  {}  {}  {} GB",
                    batch.id,
                    batch.start_time.format("%Y-%m-%d %H:%M:%S"),
                    batch.config.num_sections,
                    batch.config.light_mode,
                    batch.config.resolution,
                    size
                );
            }
            Ok(())
        }
    }
}

fn run_download(args: DownloadArgs, app: App, output_mode: OutputMode) -> miette::Result<()> {
    let simulate_mbps = args
        .simulate
        .then(|| args.mbps.unwrap_or(app.config().bandwidth_mbps));
    let options = DownloadOptions {
        formats: args.formats,
        out_dir: args.out,
        simulate_mbps,
        cancel: CancelToken::new(),
    };

    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.download(&args.id, options, Arc::new(JsonOutput))?;
            JsonOutput::print_download(&result).into_diagnostic()
        }
        OutputMode::Interactive => {
            let id = args.id;
            let result = if simulate_mbps.is_some() {
                let mut dashboard = Dashboard::for_download();
                dashboard.run(move |sink, cancel| {
                    app.download(&id, DownloadOptions { cancel, ..options }, sink)
                })?
            } else {
                app.download(&id, options, Arc::new(JsonOutput))?
            };
            for file in &result.files {
                println!("saved {file}");
            }
            Ok(())
        }
    }
}

fn run_export(args: ExportArgs, app: &App, output_mode: OutputMode) -> miette::Result<()> {
    match args.command {
        ExportCommand::FixPaths { dir } => {
            let report = app.fix_export_paths(&dir)?;
            match output_mode {
                OutputMode::NonInteractive => JsonOutput::print_export(&report).into_diagnostic(),
                OutputMode::Interactive => {
                    for file in &report.files {
                        println!("Fixed paths in: {} (prefix: \"{}\")", file.path, file.prefix);
                    }
                    println!(
                        "{} of {} HTML files rewritten",
                        report.changed_count(),
                        report.files.len()
                    );
                    Ok(())
                }
            }
        }
        ExportCommand::Batch { id, out } => {
            let path = app.export_batch(&id, &out)?;
            println!("{path}");
            Ok(())
        }
    }
}

fn print_search_summary(result: &SearchResult) {
    println!(
        "{} of {} specimens match \"{}\" in {}",
        result.matched, result.total, result.query, result.category
    );
    for record in &result.records {
        println!(
            "{:>6}  {:<40} {:<20} {}",
            record.id, record.name, record.rock_type, record.formation
        );
    }
    if !result.categories.is_empty() {
        println!("categories: {}", result.categories.join(", "));
    }
}

fn print_detail(detail: &SpecimenDetail) {
    let record = &detail.record;
    println!("{} ({})", record.name, record.thin_section_id);
    println!("  rock type:  {}", record.rock_type);
    println!("  formation:  {}", record.formation);
    println!("  location:   {}", record.location);
    println!("  minerals:   {}", record.minerals.join(", "));
    println!(
        "  porosity:   {:.1}%   grain size: {:.2} mm   density: {:.2} g/cm3",
        record.porosity_percent, record.grain_size_mm, record.density_g_cm3
    );
    println!("  scanned:    {} on {}", record.scan_date, record.scanner);
    if let Some(doi) = &detail.doi_url {
        println!("  doi:        {doi}");
    }
    for format in &record.file_formats {
        println!("  file:       {} {} ({})", format.name, format.size, format.format);
    }
}
