use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kwtag_dict::{AnnotatedResult, DictionaryStore, FeedbackBatch, FeedbackLoop};
use kwtag_types::Language;
use tracing::{info, warn};

use kwtagger::classifier::{ClassifierConfig, build_classifier};
use kwtagger::logging::init_tracing;
use kwtagger::{KeywordRequest, TaggingEngine, Tokenizers};

#[derive(Parser)]
#[command(name = "kwtag")]
#[command(about = "Batch keyword tagging and dictionary feedback")]
struct Cli {
    /// Directory holding the `{language}_{tag}.txt` term lists.
    #[arg(long, global = true, default_value = "dictionaries")]
    dictionary_dir: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Tag `{keyword, language}` JSON lines into a feedback batch.
    Tag {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
        #[arg(long, default_value_t = false)]
        no_classifier: bool,
    },
    /// Append classifier-discovered terms from a batch to the term lists.
    Promote {
        #[arg(long)]
        input: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Tag {
            input,
            output,
            no_classifier,
        } => {
            let written = tag_batch(&cli.dictionary_dir, &input, &output, no_classifier).await?;
            println!("Wrote {written} results to {}.", output.display());
        }
        Commands::Promote { input } => {
            let batch = FeedbackBatch::read(&input)
                .with_context(|| format!("cannot load feedback batch {}", input.display()))?;
            info!("loaded {} records from {}", batch.len(), input.display());
            let report = FeedbackLoop::new(&cli.dictionary_dir).promote(&batch);
            println!(
                "{} files updated, {} terms added ({} classifier tokens, {} skipped).",
                report.files_updated, report.terms_added, report.classifier_tokens, report.skipped
            );
            if report.terms_added > 0 {
                println!("Restart the tagging service to load the new terms.");
            }
        }
    }

    Ok(())
}

async fn tag_batch(
    dictionary_dir: &Path,
    input: &Path,
    output: &Path,
    no_classifier: bool,
) -> Result<usize> {
    let contents = fs::read_to_string(input)
        .with_context(|| format!("cannot read {}", input.display()))?;

    let classifier_config = if no_classifier {
        None
    } else {
        ClassifierConfig::from_env()
    };
    let engine = TaggingEngine::new(
        Arc::new(DictionaryStore::new(dictionary_dir)),
        Tokenizers::default(),
        build_classifier(classifier_config)?,
    );

    let mut results = Vec::new();
    for (idx, line) in contents.lines().enumerate() {
        let line_no = idx + 1;
        if line.trim().is_empty() {
            continue;
        }
        let request: KeywordRequest = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(err) => {
                warn!("skipping line {line_no}: {err}");
                continue;
            }
        };
        let language: Language = match request.language.parse() {
            Ok(language) => language,
            Err(err) => {
                warn!("skipping line {line_no}: {err}");
                continue;
            }
        };
        let result = engine.tag_language(&request.keyword, language).await?;
        results.push(AnnotatedResult {
            result,
            language_code: language,
        });
    }

    let file = File::create(output).with_context(|| format!("cannot create {}", output.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), &results)
        .with_context(|| format!("cannot write {}", output.display()))?;
    Ok(results.len())
}
