use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use docmill::batch::{self, BatchOutcome};
use docmill::handlers::{self, AppState};
use docmill::watch::{AutoConverter, WatchConfig, DEFAULT_CONFIG_FILE};
use docmill::{matrix, select, ConvertOptions, Converter, ConverterConfig, Format, Quality};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "docmill",
    version,
    about = "Convert documents and images between formats",
    long_about = "Convert documents and images between formats.\n\n\
    The backend (office suite, pandoc, docling, image codecs, SVG renderer, \
    e-book reader, PDF rasterizer or headless Chromium) is chosen from the \
    input and target formats, with fallbacks when a tool is missing.\n\n\
    USAGE EXAMPLES:\n  \
      docmill convert report.pdf -f docx\n  \
      docmill convert scans/*.png -f pdf --batch --workers 4\n  \
      docmill watch --config auto_convert_config.json\n  \
      docmill serve"
)]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API (address from DOCMILL_ADDR)
    Serve,

    /// Convert one or more files
    Convert {
        /// Input files
        #[arg(required = true, value_name = "FILE")]
        files: Vec<PathBuf>,

        /// Target format (pdf, docx, html, md, png, ...)
        #[arg(short, long)]
        format: String,

        /// Output directory
        #[arg(short, long, default_value = "./converted", value_name = "PATH")]
        output: PathBuf,

        #[arg(long, value_enum, default_value = "medium")]
        quality: CliQuality,

        /// OCR scanned pages when parsing PDFs
        #[arg(long)]
        ocr: bool,

        /// Convert files in parallel
        #[arg(long)]
        batch: bool,

        /// Parallel conversions with --batch (default: CPU count, at most 4)
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Watch folders and convert files dropped into them
    Watch {
        /// Rule file; created with a default rule if missing
        #[arg(long, default_value = DEFAULT_CONFIG_FILE, value_name = "FILE")]
        config: PathBuf,
    },

    /// List supported formats, or the targets for one input
    Formats {
        /// Format name or file path
        input: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliQuality {
    Low,
    Medium,
    High,
}

impl From<CliQuality> for Quality {
    fn from(q: CliQuality) -> Self {
        match q {
            CliQuality::Low => Quality::Low,
            CliQuality::Medium => Quality::Medium,
            CliQuality::High => Quality::High,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "docmill=debug,tower_http=debug"
    } else {
        "docmill=info,tower_http=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    match cli.command {
        Command::Serve => serve().await,
        Command::Convert {
            files,
            format,
            output,
            quality,
            ocr,
            batch,
            workers,
        } => {
            let options = ConvertOptions {
                quality: quality.into(),
                ocr,
                preserve_layout: true,
            };
            let workers = if batch {
                workers.unwrap_or_else(batch::default_workers)
            } else {
                1
            };
            convert(&files, &format, &output, &options, workers).await
        }
        Command::Watch { config } => watch(&config).await,
        Command::Formats { input } => formats(input.as_deref()),
    }
}

async fn serve() -> anyhow::Result<ExitCode> {
    let converter = Converter::new(ConverterConfig::from_env());
    for (kind, available) in converter.engines().availability().await {
        info!("{:?} backend: {}", kind, if available { "available" } else { "missing" });
    }

    let state = Arc::new(AppState { converter });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = handlers::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr = std::env::var("DOCMILL_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("could not bind {}", addr))?;

    info!("🚀 docmill server running on http://{}", addr);
    info!("📖 API documentation: http://{}/info", addr);
    info!("🔄 Convert files: POST http://{}/convert", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(ExitCode::SUCCESS)
}

async fn convert(
    files: &[PathBuf],
    target: &str,
    output: &Path,
    options: &ConvertOptions,
    workers: usize,
) -> anyhow::Result<ExitCode> {
    let converter = Converter::new(ConverterConfig::from_env());
    let total = files.len();
    println!("Converting {} file(s) to {}", total, target.to_uppercase());

    let outcomes = batch::convert_all_with_progress(
        &converter,
        files,
        target,
        output,
        options,
        workers,
        |done, total, outcome: &BatchOutcome| {
            let name = outcome
                .input
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            match &outcome.result {
                Ok(path) => println!("[{}/{}] {} → {}", done, total, name, path.display()),
                Err(err) => println!("[{}/{}] {} ✗ {}", done, total, name, err),
            }
        },
    )
    .await;

    let converted = outcomes.iter().filter(|o| o.success()).count();
    println!("{}/{} converted into {}", converted, total, output.display());
    Ok(if converted == total {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn watch(config_path: &Path) -> anyhow::Result<ExitCode> {
    let config = WatchConfig::load_or_create(config_path)?;
    let converter = Converter::new(ConverterConfig::from_env());
    AutoConverter::new(converter, config)
        .run(shutdown_signal())
        .await?;
    Ok(ExitCode::SUCCESS)
}

fn formats(input: Option<&str>) -> anyhow::Result<ExitCode> {
    let Some(raw) = input else {
        for format in docmill::format::ALL_FORMATS {
            let targets: Vec<&str> = matrix::targets(*format).iter().map(|f| f.name()).collect();
            if targets.is_empty() {
                println!("{:<9} (input only through the office suite)", format.name());
            } else {
                println!("{:<9} → {}", format.name(), targets.join(", "));
            }
        }
        return Ok(ExitCode::SUCCESS);
    };

    let format = Format::parse(raw)
        .or_else(|_| Format::from_path(Path::new(raw)))
        .with_context(|| format!("unknown format: {}", raw))?;
    let recommended: Vec<&str> = matrix::recommended_targets(format)
        .iter()
        .map(|f| f.name())
        .collect();
    println!("{}: recommended {}", format, recommended.join(", "));
    for target in matrix::targets(format) {
        println!("  {:<9} via {:?}", target.name(), select(format, *target));
    }
    Ok(ExitCode::SUCCESS)
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutting down");
}
