use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use label_splitter::geometry::pt_to_mm;
use label_splitter::{
    scan_labels, split_labels, ErrorKind, FormatId, GridLayout, ProgressBar, ProgressInfo,
    ProgressSink, SplitError, SplitOptions, SplitReport,
};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing_subscriber::EnvFilter;

/// Exit status when every cell was blank and nothing was written
const EXIT_ALL_BLANK: u8 = 2;

#[derive(Parser)]
#[command(
    name = "labelsplit",
    about = "Split multi-label PDF sheets into one page per label",
    version
)]
struct Cli {
    /// Increase log output (-v info, -vv debug); RUST_LOG applies otherwise
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract the non-blank labels of a sheet into a new PDF
    Split {
        /// Input PDF file
        input: PathBuf,

        /// Sheet format (6up, 45up)
        #[arg(short, long, default_value = "6up", value_parser = parse_format)]
        format: FormatId,

        /// Output file name; defaults to Split_<input name>.pdf
        #[arg(short, long)]
        name: Option<String>,

        /// Directory to write the output to
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Fraction of non-white pixels under which a cell counts as blank
        #[arg(long)]
        threshold: Option<f64>,

        /// Do not draw the progress bar
        #[arg(short, long)]
        quiet: bool,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Classify every cell without writing anything
    Scan {
        /// Input PDF file
        input: PathBuf,

        /// Sheet format (6up, 45up)
        #[arg(short, long, default_value = "6up", value_parser = parse_format)]
        format: FormatId,

        /// Fraction of non-white pixels under which a cell counts as blank
        #[arg(long)]
        threshold: Option<f64>,

        /// Print the cells as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the configured sheet formats
    Formats {
        /// Print the formats as JSON
        #[arg(long)]
        json: bool,
    },
}

fn parse_format(s: &str) -> std::result::Result<FormatId, String> {
    s.parse::<FormatId>().map_err(|e| e.to_string())
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        _ => EnvFilter::new("debug"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn options(format: FormatId, threshold: Option<f64>) -> SplitOptions {
    let options = SplitOptions::new(format);
    match threshold {
        Some(threshold) => options.with_threshold(threshold),
        None => options,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            exit_code(&e)
        }
    }
}

fn exit_code(error: &anyhow::Error) -> ExitCode {
    let all_blank = error
        .chain()
        .filter_map(|cause| cause.downcast_ref::<SplitError>())
        .any(|e| e.kind() == ErrorKind::AllLabelsBlank);
    if all_blank {
        ExitCode::from(EXIT_ALL_BLANK)
    } else {
        ExitCode::FAILURE
    }
}

async fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Split {
            input,
            format,
            name,
            output_dir,
            threshold,
            quiet,
            json,
        } => {
            let mut options = options(format, threshold);
            options.custom_name = name;
            options.output_dir = output_dir;

            let report = split(input, options, !quiet && !json).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("✓ Saved as {}", report.output_path.display());
                println!(
                    "  {} labels written, {} of {} cells blank",
                    report.labels_written, report.blank_cells, report.total_cells
                );
            }
        }

        Commands::Scan {
            input,
            format,
            threshold,
            json,
        } => {
            let options = options(format, threshold);
            let scans = tokio::task::spawn_blocking({
                let input = input.clone();
                move || scan_labels(&input, &options)
            })
            .await
            .context("scan worker stopped unexpectedly")?
            .with_context(|| format!("Failed to scan {}", input.display()))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&scans)?);
            } else {
                println!(
                    "{:>4} {:>3} {:>3} {:>7} {:>7} {:>9}  verdict",
                    "page", "row", "col", "x mm", "y mm", "non-white"
                );
                for scan in &scans {
                    let fraction = scan
                        .nonwhite_fraction
                        .map(|f| format!("{:.4}", f))
                        .unwrap_or_else(|| "-".to_string());
                    // Top-left corner of the cell on the sheet
                    println!(
                        "{:>4} {:>3} {:>3} {:>7.1} {:>7.1} {:>9}  {}",
                        scan.cell.page + 1,
                        scan.cell.row,
                        scan.cell.col,
                        pt_to_mm(scan.rect.x0),
                        pt_to_mm(scan.rect.y0),
                        fraction,
                        if scan.blank { "blank" } else { "label" }
                    );
                }
                let labels = scans.iter().filter(|scan| !scan.blank).count();
                println!("{labels} of {} cells hold a label", scans.len());
            }
        }

        Commands::Formats { json } => {
            let mut entries = Vec::new();
            for id in FormatId::ALL {
                entries.push((id, GridLayout::for_format(id)?));
            }

            if json {
                let formats: Vec<_> = entries
                    .iter()
                    .map(|(id, layout)| {
                        serde_json::json!({
                            "name": id.name(),
                            "format": layout.format,
                            "offset": layout.offset,
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&formats)?);
            } else {
                for (id, layout) in &entries {
                    let format = &layout.format;
                    println!(
                        "{:<5} {} x {} labels of {} x {} mm, offset ({}, {}) mm",
                        id.name(),
                        format.columns,
                        format.rows,
                        format.label_width_mm,
                        format.label_height_mm,
                        layout.offset.x_mm,
                        layout.offset.y_mm
                    );
                    if let Some(page_height) = format.page_height_mm {
                        println!(
                            "      centered on {} x {} mm pages",
                            format.label_width_mm, page_height
                        );
                    }
                }
            }
        }
    }

    Ok(())
}

/// Forwards every processed cell from the worker to the drawing task
struct ChannelProgress(UnboundedSender<ProgressInfo>);

impl ProgressSink for ChannelProgress {
    fn on_progress(&mut self, _fraction: f64) {}

    fn on_cell(&mut self, info: &ProgressInfo) {
        // The receiver only goes away once the run is over
        let _ = self.0.send(info.clone());
    }
}

/// Run the pipeline on a blocking worker, drawing progress as it arrives
async fn split(input: PathBuf, options: SplitOptions, show_progress: bool) -> Result<SplitReport> {
    let (tx, mut rx) = mpsc::unbounded_channel::<ProgressInfo>();

    let worker = tokio::task::spawn_blocking({
        let input = input.clone();
        move || split_labels(&input, options, &mut ChannelProgress(tx))
    });

    let bar = ProgressBar::default();
    let mut drawn = false;
    let mut last_len: usize = 0;
    while let Some(info) = rx.recv().await {
        if show_progress {
            let line = bar.render(&info);
            // Blank out the tail of a longer previous line
            let pad = " ".repeat(last_len.saturating_sub(line.len()));
            last_len = line.len();
            let mut stderr = std::io::stderr().lock();
            let _ = write!(stderr, "\r{line}{pad}");
            let _ = stderr.flush();
            drawn = true;
        }
    }
    if drawn {
        eprintln!();
    }

    let report = worker
        .await
        .context("split worker stopped unexpectedly")?
        .with_context(|| format!("Failed to split {}", input.display()))?;
    tracing::info!(
        "Wrote {} labels from {} pages to {}",
        report.labels_written,
        report.pages,
        report.output_path.display()
    );
    Ok(report)
}
