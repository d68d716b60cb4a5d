use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use focal_reader::{FooterPatternSet, Pipeline, PipelineConfig, ProcessedDocument};

#[derive(Debug, Parser)]
#[command(author, version, about = "Write reading transcripts for every book in a directory")]
struct Args {
    /// Input directory containing PDF/EPUB/TXT files
    #[arg(short, long)]
    input: PathBuf,

    /// Output directory for transcripts
    #[arg(short, long)]
    output: PathBuf,

    /// Path to configuration JSON file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Also write the display HTML of EPUB books
    #[arg(long, default_value = "false")]
    html: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct DocumentMetadata {
    filename: String,
    file_type: String,
    character_count: usize,
    sentence_count: usize,
    paragraph_count: usize,
    chapter_count: usize,
    image_count: usize,
    start_page: Option<usize>,
    processed_at: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct BatchMetadata {
    total_documents: usize,
    failed_documents: Vec<String>,
    total_sentences: usize,
    documents: Vec<DocumentMetadata>,
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    info!("Starting batch transcription");
    info!("Input directory: {:?}", args.input);
    info!("Output directory: {:?}", args.output);

    let config = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    let pipeline = Pipeline::new(config);
    let footers = pipeline
        .footer_patterns()
        .with_context(|| "Invalid footer pattern in configuration")?;

    fs::create_dir_all(&args.output)
        .with_context(|| format!("Failed to create output directory: {:?}", args.output))?;

    // Find all book files
    let mut book_files = Vec::new();

    for entry in WalkDir::new(&args.input)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path();

        if let Some(ext) = path.extension() {
            let ext_str = ext.to_string_lossy().to_lowercase();

            if matches!(ext_str.as_str(), "pdf" | "epub" | "txt") {
                book_files.push(path.to_path_buf());
            }
        }
    }
    book_files.sort();

    info!("Found {} book files", book_files.len());

    if book_files.is_empty() {
        anyhow::bail!("No book files found in {:?}", args.input);
    }

    let mut documents = Vec::new();
    let mut failed = Vec::new();

    for (idx, book_path) in book_files.iter().enumerate() {
        info!("Processing {}/{}: {:?}", idx + 1, book_files.len(), book_path);

        match transcribe(&pipeline, &footers, book_path, &args) {
            Ok(meta) => documents.push(meta),
            Err(e) => {
                warn!("Failed to process {:?}: {:#}", book_path, e);
                failed.push(book_path.to_string_lossy().into_owned());
            }
        }
    }

    let metadata = BatchMetadata {
        total_documents: documents.len(),
        failed_documents: failed,
        total_sentences: documents.iter().map(|d| d.sentence_count).sum(),
        documents,
    };

    let metadata_path = args.output.join("metadata.json");
    let metadata_json = serde_json::to_string_pretty(&metadata)?;
    fs::write(&metadata_path, metadata_json)
        .with_context(|| format!("Failed to write metadata: {:?}", metadata_path))?;
    info!("Metadata saved to: {:?}", metadata_path);

    info!("Batch complete!");
    info!("Summary:");
    info!("  - Documents: {}", metadata.total_documents);
    info!("  - Failed: {}", metadata.failed_documents.len());
    info!("  - Sentences: {}", metadata.total_sentences);

    Ok(())
}

fn transcribe(
    pipeline: &Pipeline,
    footers: &FooterPatternSet,
    path: &Path,
    args: &Args,
) -> Result<DocumentMetadata> {
    let doc: ProcessedDocument = pipeline.process_path(path, footers, None)?;

    let filename = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_string();

    if !doc.is_readable() {
        anyhow::bail!("no readable text recovered");
    }

    let transcript_path = args.output.join(format!("{}.txt", filename));
    fs::write(&transcript_path, doc.displayed_text())
        .with_context(|| format!("Failed to write transcript: {:?}", transcript_path))?;

    if args.html {
        if let Some(html) = &doc.displayed_html {
            let html_path = args.output.join(format!("{}.html", filename));
            fs::write(&html_path, html)
                .with_context(|| format!("Failed to write HTML: {:?}", html_path))?;
        }
    }

    Ok(DocumentMetadata {
        filename,
        file_type: path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown")
            .to_lowercase(),
        character_count: doc.displayed_text().chars().count(),
        sentence_count: doc.navigation.len(),
        paragraph_count: doc.navigation.paragraph_count(),
        chapter_count: doc.toc.len(),
        image_count: doc.images.len(),
        start_page: doc.start_page,
        processed_at: std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0),
    })
}
