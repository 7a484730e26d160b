//! drksci-press: render, merge, compress and publish drksci PDFs.
//!
//! ```text
//! drksci-press batch pdfs.json
//! drksci-press render http://localhost:3000/c/blake -o resume.pdf --cover http://localhost:3000/c/blake/cover
//! drksci-press merge -o complete.pdf resume.pdf ats.pdf
//! ```

use std::path::{Path, PathBuf};
use std::process;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::{error, info, warn};

use drksci_press::cdp::CdpLauncher;
use drksci_press::compose::{attach_cover, compress_pdf, merge_pdfs, DocumentKind, PdfDocument};
use drksci_press::{
    BatchConfig, BatchRunner, Margins, PageReadinessCriteria, PageSizing, PrepressOptimizer, RenderConfig,
    RenderTarget, Renderer, RetryPolicy, Theme,
};

#[derive(Parser, Debug)]
#[command(name = "drksci-press", version, about = "Headless-browser PDF composer")]
struct Cli {
    /// Chrome binary to launch
    #[arg(long, global = true)]
    chrome: Option<PathBuf>,

    /// Run Chrome without its sandbox (containers)
    #[arg(long, global = true)]
    no_sandbox: bool,

    /// Skip the HTTP reachability check before launching Chrome
    #[arg(long, global = true)]
    no_preflight: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a batch described by a JSON config and write its manifest
    Batch {
        config: PathBuf,
    },
    /// Render a single page, optionally behind a cover
    Render {
        url: String,
        #[arg(short, long)]
        output: PathBuf,
        /// Cover page rendered as fixed A4 and placed first
        #[arg(long)]
        cover: Option<String>,
        /// fixed-a4 or dynamic-height
        #[arg(long, default_value = "fixed-a4")]
        sizing: PageSizing,
        /// unchanged, dark, light or hash
        #[arg(long, default_value = "unchanged")]
        theme: Theme,
        #[arg(long)]
        zoom: Option<f64>,
        /// Uniform margin for fixed-a4 content pages; covers stay edge to edge
        #[arg(long)]
        margin_mm: Option<f64>,
        /// Normalize typographic punctuation for applicant tracking systems
        #[arg(long)]
        ats: bool,
        #[arg(long)]
        compress: bool,
        #[arg(long)]
        prepress: bool,
        /// Attempts when the page is not ready yet
        #[arg(long, default_value_t = 3)]
        attempts: u32,
    },
    /// Merge PDFs from disk in the given order
    Merge {
        #[arg(short, long)]
        output: PathBuf,
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
    /// Losslessly recompress a PDF
    Compress {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Size target in KB, reported only
        #[arg(long)]
        target_kb: Option<usize>,
    },
    /// Write a prepress-optimized copy beside the input
    Optimize {
        input: PathBuf,
    },
}

fn render_config(cli: &Cli) -> RenderConfig {
    RenderConfig {
        chrome_path: cli.chrome.clone(),
        sandbox: !cli.no_sandbox,
        preflight: !cli.no_preflight,
        ..RenderConfig::default()
    }
}

fn write_output(path: &Path, pdf: &PdfDocument) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create '{}'", parent.display()))?;
        }
    }
    std::fs::write(path, pdf.as_bytes()).with_context(|| format!("failed to write '{}'", path.display()))?;
    info!("Wrote {} ({:.2} KB)", path.display(), pdf.len() as f64 / 1024.0);
    Ok(())
}

/// Returns whether every document was generated
fn run_batch(cli: &Cli, config_path: &Path) -> Result<bool> {
    let batch = BatchConfig::from_path(config_path)?.resolve()?;
    let base_url = batch.base_url.to_string();

    let renderer = Renderer::new(CdpLauncher, render_config(cli));
    let runner = BatchRunner::new(renderer, &batch.output_dir)
        .with_public_prefix(batch.public_prefix.clone())
        .with_retry(batch.retry);

    let summary = runner.run(&batch.documents);
    summary
        .manifest(&base_url)
        .write(&batch.manifest_path)
        .with_context(|| format!("failed to write manifest '{}'", batch.manifest_path.display()))?;
    info!("Manifest written to {}", batch.manifest_path.display());

    Ok(summary.is_success())
}

fn run(cli: &Cli) -> Result<bool> {
    match &cli.command {
        Command::Batch { config } => run_batch(cli, config),
        Command::Render {
            url,
            output,
            cover,
            sizing,
            theme,
            zoom,
            margin_mm,
            ats,
            compress,
            prepress,
            attempts,
        } => {
            let renderer = Renderer::new(CdpLauncher, render_config(cli));
            let readiness = PageReadinessCriteria::default();

            let cover_pdf = cover.as_ref().and_then(|cover_url| {
                let target = RenderTarget::new(cover_url.clone(), "cover").with_theme(*theme);
                renderer
                    .try_render_page_to_pdf(&target, &readiness, &PageSizing::FixedA4)
                    .map(|pdf| pdf.with_kind(DocumentKind::Cover))
            });

            let mut target = RenderTarget::new(url.clone(), url.clone())
                .with_theme(*theme)
                .with_ats_normalize(*ats);
            if let Some(zoom) = zoom {
                target = target.with_zoom(*zoom);
            }
            if let Some(mm) = margin_mm {
                target = target.with_margins(Margins::uniform(*mm));
            }
            let policy = RetryPolicy {
                max_attempts: *attempts,
                ..RetryPolicy::default()
            };
            let content = renderer.render_with_retry(&target, &readiness, sizing, &policy).result?;

            let mut pdf = attach_cover(cover_pdf, content);
            if *compress {
                pdf = compress_pdf(pdf, None);
            }
            write_output(output, &pdf)?;

            if *prepress {
                if let Err(e) = PrepressOptimizer::default().optimize_for_prepress(output) {
                    warn!("Prepress pass skipped: {}", e);
                }
            }
            Ok(true)
        }
        Command::Merge { output, inputs } => {
            let docs = inputs
                .iter()
                .map(|path| {
                    PdfDocument::read_from(path, DocumentKind::Content)
                        .with_context(|| format!("failed to read '{}'", path.display()))
                })
                .collect::<Result<Vec<_>>>()?;
            let parts: Vec<Option<&PdfDocument>> = docs.iter().map(Some).collect();
            let merged = merge_pdfs(&parts)?;
            info!("Merged {} files into {} pages", docs.len(), merged.page_count()?);
            write_output(output, &merged)?;
            Ok(true)
        }
        Command::Compress {
            input,
            output,
            target_kb,
        } => {
            let doc = PdfDocument::read_from(input, DocumentKind::Merged)
                .with_context(|| format!("failed to read '{}'", input.display()))?;
            let compressed = compress_pdf(doc, target_kb.map(|kb| kb.saturating_mul(1024)));
            write_output(output, &compressed)?;
            Ok(true)
        }
        Command::Optimize { input } => {
            let optimizer = PrepressOptimizer::default();
            if !optimizer.is_available() {
                bail!("'{}' is not on PATH", optimizer.program.to_string_lossy());
            }
            let out = optimizer.optimize_for_prepress(input)?;
            info!("Prepress copy: {}", out.display());
            Ok(true)
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            error!("{:#}", e);
            process::exit(1);
        }
    }
}
