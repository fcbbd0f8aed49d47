// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


//! Ragscore CLI
//!
//! Scores a JSON or JSON Lines dataset of RAG examples with LLM-judged
//! metrics and writes the scored rows back out.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ragscore_evals::metrics::{AnswerRelevancy, ContextRecall, Metric};
use ragscore_evals::{evaluate, Dataset, EvalConfig, Example, OpenAIClient};
use ragscore_prompts::FileTemplateStore;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const ALL_METRICS: &[&str] = &["answer_relevancy", "context_recall"];

#[derive(Parser)]
#[command(name = "ragscore")]
#[command(about = "Ragscore - LLM-judged metrics for RAG pipelines", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose mode
    #[arg(short, long, global = true)]
    verbose: bool,

    /// API key for the judge and embedding models
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a dataset
    Score {
        /// Input rows: a JSON array, or JSON Lines when the file ends in .jsonl
        #[arg(short, long)]
        input: PathBuf,

        /// Where to write the scored rows (JSON array)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Comma-separated metric names
        #[arg(long, value_delimiter = ',', default_values_t = vec!["answer_relevancy".to_string(), "context_recall".to_string()])]
        metrics: Vec<String>,

        /// Adapt prompts to this language before scoring
        #[arg(long)]
        language: Option<String>,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Translate the built-in prompts and save them to the cache
    Adapt {
        /// Target language
        #[arg(long)]
        language: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();

    let config = EvalConfig::load(cli.config.clone()).context("Failed to load configuration")?;
    let client = Arc::new(
        OpenAIClient::new(cli.api_key.clone().unwrap_or_default(), config.model.clone())
            .with_base_url(config.base_url.clone())
            .with_embedding_model(config.embedding_model.clone()),
    );

    match cli.command {
        Commands::Score {
            input,
            output,
            metrics,
            language,
            json,
        } => {
            let rows = read_rows(&input)?;
            let dataset = Dataset::from_rows(&rows).context("Invalid dataset")?;
            info!("Loaded {} rows from {:?}", dataset.len(), input);

            let mut metrics = build_metrics(&metrics, &config, &client)?;
            if let Some(language) = language.or_else(|| config.language.clone()) {
                adapt_metrics(&mut metrics, &language, &config).await?;
            }

            let report = evaluate(&dataset, &mut metrics)
                .await
                .context("Evaluation failed")?;

            if let Some(path) = output {
                let scored = serde_json::to_string_pretty(&report.dataset.to_rows())?;
                fs::write(&path, scored)
                    .with_context(|| format!("Failed to write {:?}", path))?;
                info!("Wrote scored rows to {:?}", path);
            }

            if json {
                println!("{}", report.summary_json()?);
            } else {
                print!("{}", report);
            }
        }

        Commands::Adapt { language } => {
            let names: Vec<String> = ALL_METRICS.iter().map(|m| m.to_string()).collect();
            let mut metrics = build_metrics(&names, &config, &client)?;
            adapt_metrics(&mut metrics, &language, &config).await?;
            println!("✓ Adapted {} prompts to {}", metrics.len(), language);
        }
    }

    Ok(())
}

fn build_metrics(
    names: &[String],
    config: &EvalConfig,
    client: &Arc<OpenAIClient>,
) -> Result<Vec<Box<dyn Metric>>> {
    let mut metrics: Vec<Box<dyn Metric>> = Vec::with_capacity(names.len());
    for name in names {
        match name.trim() {
            "answer_relevancy" => metrics.push(Box::new(
                AnswerRelevancy::from_config(config)
                    .with_llm(client.clone())
                    .with_embeddings(client.clone()),
            )),
            "context_recall" => metrics.push(Box::new(
                ContextRecall::from_config(config).with_llm(client.clone()),
            )),
            other => bail!(
                "Unknown metric '{}'. Available: {}",
                other,
                ALL_METRICS.join(", ")
            ),
        }
    }
    Ok(metrics)
}

async fn adapt_metrics(
    metrics: &mut [Box<dyn Metric>],
    language: &str,
    config: &EvalConfig,
) -> Result<()> {
    let cache_dir = config
        .cache_dir
        .clone()
        .unwrap_or_else(FileTemplateStore::default_dir);
    let store = FileTemplateStore::new(cache_dir);

    for metric in metrics.iter_mut() {
        metric
            .adapt(language, &store)
            .await
            .with_context(|| format!("Failed to adapt {} to {}", metric.name(), language))?;
        metric.save(&store)?;
    }
    info!("Prompt cache: {:?}", store.cache_dir());
    Ok(())
}

fn read_rows(path: &Path) -> Result<Vec<Example>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    parse_rows(&content, path.extension().is_some_and(|ext| ext == "jsonl"))
}

fn parse_rows(content: &str, json_lines: bool) -> Result<Vec<Example>> {
    if !json_lines {
        return serde_json::from_str(content).context("Input is not a JSON array of rows");
    }

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).with_context(|| format!("Invalid row on line {}", i + 1))
        })
        .collect()
}
