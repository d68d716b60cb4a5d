use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use focal_reader::{ImageBucket, Pipeline, PipelineConfig, ProcessedDocument, SourceKind, Span, TocEntry};

#[derive(Debug, Parser)]
#[command(author, version, about = "Recover readable, navigable prose from PDF, EPUB and text files")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Process one document and print its transcript
    Process(ProcessArgs),
}

#[derive(Debug, Args)]
struct ProcessArgs {
    /// PDF, EPUB or TXT file
    file: PathBuf,

    /// Path to configuration JSON file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Footer text to remove wherever it appears (repeatable)
    #[arg(long = "footer")]
    footers: Vec<String>,

    /// Start the transcript at this PDF page instead of the detected one
    #[arg(long)]
    start_page: Option<usize>,

    /// Print a JSON summary instead of the transcript
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct ImageSummary {
    id: usize,
    href: String,
    media_type: &'static str,
    bucket: ImageBucket,
}

#[derive(Debug, Serialize)]
struct DocumentSummary<'a> {
    kind: SourceKind,
    start_page: Option<usize>,
    footer_version: u64,
    readable: bool,
    toc: &'a [TocEntry],
    images: Vec<ImageSummary>,
    sentence_spans: &'a [Span],
    paragraph_sentence_map: &'a [Vec<usize>],
    displayed_text: &'a str,
}

impl<'a> DocumentSummary<'a> {
    fn new(doc: &'a ProcessedDocument) -> Self {
        Self {
            kind: doc.kind,
            start_page: doc.start_page,
            footer_version: doc.footer_version,
            readable: doc.is_readable(),
            toc: &doc.toc,
            images: doc
                .images
                .iter()
                .map(|r| ImageSummary {
                    id: r.id.0,
                    href: r.href.clone(),
                    media_type: r.media_type,
                    bucket: r.bucket,
                })
                .collect(),
            sentence_spans: doc.sentence_spans(),
            paragraph_sentence_map: doc.paragraph_sentence_map(),
            displayed_text: doc.displayed_text(),
        }
    }
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Process(args) => process_command(args),
    }
}

fn process_command(args: ProcessArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => {
            info!("Loading configuration from: {:?}", path);
            PipelineConfig::load(path)?
        }
        None => PipelineConfig::default(),
    };

    let pipeline = Pipeline::new(config);
    let mut footers = pipeline
        .footer_patterns()
        .with_context(|| "Invalid footer pattern in configuration")?;
    for footer in &args.footers {
        footers.add_literal(footer);
    }

    let doc = pipeline
        .process_path(&args.file, &footers, args.start_page)
        .with_context(|| format!("Failed to process {:?}", args.file))?;

    info!(
        "{} sentences, {} paragraphs, {} chapters, {} images",
        doc.navigation.len(),
        doc.navigation.paragraph_count(),
        doc.toc.len(),
        doc.images.len()
    );

    if args.json {
        let summary = serde_json::to_string_pretty(&DocumentSummary::new(&doc))
            .with_context(|| "Failed to serialize summary")?;
        println!("{}", summary);
    } else if doc.is_readable() {
        println!("{}", doc.displayed_text());
    } else {
        info!("Nothing to read in {:?}", args.file);
    }

    Ok(())
}
