use anyhow::{Context, Result};
use console::style;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{ChatCredentials, Config};
use crate::database::{VectorIndex, VectorStore};
use crate::embeddings::{EmbeddingProvider, OllamaClient};
use crate::export::{DEFAULT_EXPORT_FILE, export_entries};
use crate::ingest::{IngestReport, Ingestor};
use crate::query::{QueryEngine, QueryOutcome, QueryRequest};
use crate::records::read_folder;
use crate::rewrite::QueryRewriter;

/// Words that end the interactive loop
const EXIT_WORDS: [&str; 3] = ["quit", "exit", "退出"];

const RULE_WIDTH: usize = 60;

/// Flags of the `query` subcommand
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    pub question: Option<String>,
    pub top_k: Option<usize>,
    pub min_score: Option<f32>,
    pub interactive: bool,
    pub no_rewrite: bool,
    pub json: bool,
}

/// Resolved per-query parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuerySettings {
    pub top_k: usize,
    pub min_score: f32,
    pub use_rewrite: bool,
}

impl QuerySettings {
    /// CLI flags over config defaults
    #[inline]
    pub fn resolve(config: &Config, options: &QueryOptions) -> Self {
        Self {
            top_k: options.top_k.unwrap_or(config.query.top_k),
            min_score: options.min_score.unwrap_or(config.query.min_score),
            use_rewrite: config.query.use_rewrite && !options.no_rewrite,
        }
    }

    fn request(&self, question: &str) -> QueryRequest {
        QueryRequest {
            question: question.to_string(),
            top_k: self.top_k,
            min_score: self.min_score,
            use_rewrite: self.use_rewrite,
        }
    }
}

/// Read every spreadsheet in `folder` and add its QA pairs to the index
#[inline]
pub async fn ingest_folder(
    folder: &Path,
    batch_size: Option<usize>,
    clear: bool,
) -> Result<IngestReport> {
    let config = Config::load_default()?;
    info!("Ingesting spreadsheets from {}", folder.display());

    let load = read_folder(folder)
        .with_context(|| format!("Failed to read folder {}", folder.display()))?;

    for (file, reason) in &load.failed_files {
        eprintln!("{} {}: {}", style("⚠ Skipped").yellow(), file, reason);
    }
    if load.files_read.is_empty() && load.failed_files.is_empty() {
        eprintln!(
            "{}",
            style(format!("No spreadsheet files found in {}", folder.display())).yellow()
        );
    }
    println!(
        "Read {} QA records from {} files ({} rows skipped)",
        load.records.len(),
        load.files_read.len(),
        load.skipped_rows
    );

    let client = OllamaClient::new(&config).context("Failed to create Ollama client")?;
    if !load.records.is_empty() {
        client.health_check()?;
    }
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(client);
    let store = VectorStore::new(&config)
        .await
        .context("Failed to open vector store")?;

    if clear {
        store.clear().await.context("Failed to clear collection")?;
        println!("Cleared collection '{}'", store.collection());
    }

    let index: Arc<dyn VectorIndex> = Arc::new(store);
    let report = Ingestor::new(embedder, Arc::clone(&index))
        .with_batch_size(batch_size.unwrap_or(config.ingest.batch_size))
        .with_progress(true)
        .ingest(&load.records)
        .await
        .context("Ingestion failed")?;

    println!("{}", style("✓ Ingestion complete").green());
    println!("  Entries written: {}", report.entries_written);
    println!("  Standard questions: {}", report.standard_entries);
    println!("  Extended questions: {}", report.extended_entries);
    println!("  Duplicate standard questions skipped: {}", report.duplicates_skipped);
    println!("  Total entries in collection: {}", index.count().await?);

    Ok(report)
}

/// Build the query pipeline from configuration and environment credentials
#[inline]
pub async fn build_query_engine(config: &Config) -> Result<QueryEngine> {
    let embedder: Arc<dyn EmbeddingProvider> =
        Arc::new(OllamaClient::new(config).context("Failed to create Ollama client")?);
    let index: Arc<dyn VectorIndex> = Arc::new(
        VectorStore::new(config)
            .await
            .context("Failed to open vector store")?,
    );

    let credentials = ChatCredentials::from_env().unwrap_or_else(|e| {
        warn!("{}; query rewriting disabled", e);
        None
    });
    let rewriter = QueryRewriter::from_config(&config.rewrite, credentials)
        .context("Invalid rewrite configuration")?;

    Ok(QueryEngine::new(embedder, index).with_rewriter(rewriter))
}

/// Answer one question, or start the interactive loop when none is given
#[inline]
pub async fn query(options: QueryOptions) -> Result<()> {
    let config = Config::load_default()?;
    let settings = QuerySettings::resolve(&config, &options);
    let engine = build_query_engine(&config).await?;

    if settings.use_rewrite && !engine.rewrite_available() {
        info!("Query rewriting unavailable, searching questions verbatim");
    }

    match options.question.filter(|_| !options.interactive) {
        Some(question) => {
            let outcome = engine.search(&settings.request(&question)).await?;
            if options.json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                print!("{}", format_outcome(&outcome));
            }
            Ok(())
        }
        None => {
            let input = BufReader::new(io::stdin());
            let mut stdout = io::stdout();
            run_interactive(&engine, settings, input, &mut stdout).await
        }
    }
}

/// Read questions line by line until an exit word or end of input
#[inline]
pub async fn run_interactive<R, W>(
    engine: &QueryEngine,
    settings: QuerySettings,
    input: R,
    output: &mut W,
) -> Result<()>
where
    R: BufRead + Send,
    W: Write + Send,
{
    writeln!(output, "{}", style("🎯 Interactive query mode").bold().cyan())?;
    writeln!(output, "Index holds {} entries", engine.entry_count().await?)?;
    writeln!(output, "Type 'quit' or 'exit' to leave")?;
    writeln!(output, "{}", "=".repeat(RULE_WIDTH))?;

    let mut lines = input.lines();
    loop {
        write!(output, "\nQuestion: ")?;
        output.flush()?;

        let Some(line) = lines.next() else {
            writeln!(output)?;
            break;
        };
        let question = line?;
        let question = question.trim();

        if EXIT_WORDS
            .iter()
            .any(|word| question.eq_ignore_ascii_case(word))
        {
            break;
        }
        if question.is_empty() {
            writeln!(output, "{}", style("Question cannot be empty").yellow())?;
            continue;
        }

        match engine.search(&settings.request(question)).await {
            Ok(outcome) => write!(output, "{}", format_outcome(&outcome))?,
            Err(e) => writeln!(output, "{} {}", style("Error:").red(), e)?,
        }
    }

    writeln!(output, "Goodbye!")?;
    Ok(())
}

/// Human-readable rendering of a query outcome
#[inline]
pub fn format_outcome(outcome: &QueryOutcome) -> String {
    use std::fmt::Write as _;

    let mut out = String::new();

    if outcome.was_rewritten() {
        let _ = writeln!(out, "Rewritten question: {}", outcome.effective_question);
    }

    if outcome.results.is_empty() {
        out.push_str("❌ No matching answer found\n");
        return out;
    }

    let _ = writeln!(out, "✅ Found {} results:\n", outcome.results.len());
    let stars = "*".repeat(RULE_WIDTH);
    for (i, result) in outcome.results.iter().enumerate() {
        let _ = writeln!(out, "[Result {}] score: {:.4}", i + 1, result.score);
        let _ = writeln!(out, "  Question: {}", result.question);
        let _ = writeln!(out, "  Answer: {}", result.standard_answer);
        let _ = writeln!(out, "  Category: {}", result.header);
        let _ = writeln!(
            out,
            "  Source: {} (row {})",
            result.file_source, result.row_index
        );
        let _ = writeln!(out, "  Content:\n{stars}\n{}\n{stars}", result.raw_content);
        let _ = writeln!(
            out,
            "  Image: {}",
            result.image_url.as_deref().unwrap_or("none")
        );
        let _ = writeln!(out, "{}", "-".repeat(RULE_WIDTH));
    }
    out
}

/// Print entry count and storage details for the configured collection
#[inline]
pub async fn show_stats() -> Result<()> {
    let config = Config::load_default()?;
    let store = VectorStore::new(&config).await?;

    let count = store.count().await?;
    println!("{}", style("📊 Index Statistics").bold().cyan());
    println!("  Collection: {}", style(store.collection()).cyan());
    println!("  Entries: {}", style(count).cyan());
    match store.dimension().await? {
        Some(dimension) => println!("  Vector dimension: {}", style(dimension).cyan()),
        None => println!("  Vector dimension: {}", style("not created yet").yellow()),
    }
    println!(
        "  Location: {}",
        style(config.vector_database_path().display()).cyan()
    );
    Ok(())
}

/// Dump the configured collection to JSON
#[inline]
pub async fn export(output: Option<PathBuf>) -> Result<usize> {
    let config = Config::load_default()?;
    let store = VectorStore::new(&config).await?;
    let path = output.unwrap_or_else(|| PathBuf::from(DEFAULT_EXPORT_FILE));

    let written = export_entries(&store, &path).await?;
    if written == 0 {
        println!("{}", style("❌ The index has no data to export").yellow());
    } else {
        println!(
            "{} Exported {} entries to {}",
            style("✓").green(),
            written,
            path.display()
        );
    }
    Ok(written)
}

/// Print every collection in the vector database
#[inline]
pub async fn list_collections() -> Result<()> {
    let config = Config::load_default()?;
    let store = VectorStore::new(&config).await?;

    let mut names = store.list_collections().await?;
    names.sort();

    if names.is_empty() {
        println!("No collections yet. Use 'qa-search ingest <folder>' to build one.");
        return Ok(());
    }

    println!("Collections ({} total):", names.len());
    for name in names {
        let marker = if name == store.collection() { " (active)" } else { "" };
        println!("  📁 {name}{marker}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::IndexedEntry;
    use crate::database::memory::MemoryIndex;
    use crate::embeddings::fake::FakeEmbedder;
    use crate::query::QueryResult;
    use crate::records::{EntryMetadata, QuestionType};
    use std::io::Cursor;

    fn settings() -> QuerySettings {
        QuerySettings {
            top_k: 5,
            min_score: 0.3,
            use_rewrite: false,
        }
    }

    async fn engine() -> QueryEngine {
        let index = Arc::new(MemoryIndex::new());
        index
            .add(&[IndexedEntry {
                id: "1".to_string(),
                question: "What is the warranty period?".to_string(),
                vector: vec![1.0, 0.0],
                metadata: EntryMetadata {
                    chunk_id: "c-1".to_string(),
                    header: "Warranty".to_string(),
                    raw_content: "Two year coverage.".to_string(),
                    standard_answer: "Two years.".to_string(),
                    image_url: None,
                    file_source: "faq.xlsx".to_string(),
                    row_index: 0,
                    question_type: QuestionType::Standard,
                },
            }])
            .await
            .expect("add");
        let embedder = FakeEmbedder::new(2).with_vector("warranty", vec![1.0, 0.0]);
        QueryEngine::new(Arc::new(embedder), index)
    }

    async fn run(input: &str) -> String {
        let engine = engine().await;
        let mut output = Vec::new();
        run_interactive(&engine, settings(), Cursor::new(input), &mut output)
            .await
            .expect("loop runs");
        String::from_utf8(output).expect("utf8 output")
    }

    #[test]
    fn flags_override_config_defaults() {
        let config = Config::default();
        let options = QueryOptions {
            top_k: Some(3),
            no_rewrite: true,
            ..QueryOptions::default()
        };

        let settings = QuerySettings::resolve(&config, &options);
        assert_eq!(settings.top_k, 3);
        assert_eq!(settings.min_score, 0.3);
        assert!(!settings.use_rewrite);
        assert!(QuerySettings::resolve(&config, &QueryOptions::default()).use_rewrite);
    }

    #[tokio::test]
    async fn interactive_loop_answers_until_quit() {
        let output = run("warranty\nquit\nwarranty\n").await;

        assert!(output.contains("Index holds 1 entries"));
        assert_eq!(output.matches("Found 1 results").count(), 1);
        assert!(output.contains("Two years."));
        assert!(output.contains("Goodbye!"));
    }

    #[tokio::test]
    async fn interactive_loop_accepts_every_exit_word() {
        for word in ["exit", "EXIT", "退出"] {
            let output = run(&format!("{word}\nwarranty\n")).await;
            assert!(!output.contains("Found"), "{word} should exit");
        }
    }

    #[tokio::test]
    async fn interactive_loop_reprompts_on_blank_and_stops_at_eof() {
        let output = run("   \nwarranty").await;

        assert!(output.contains("Question cannot be empty"));
        assert!(output.contains("Found 1 results"));
        assert!(output.contains("Goodbye!"));
    }

    #[tokio::test]
    async fn interactive_errors_are_one_line() {
        let engine = engine().await;
        let mut output = Vec::new();
        let settings = QuerySettings {
            top_k: 0,
            ..settings()
        };

        run_interactive(&engine, settings, Cursor::new("warranty\n"), &mut output)
            .await
            .expect("loop survives errors");

        let output = String::from_utf8(output).expect("utf8 output");
        let error_line = output
            .lines()
            .find(|l| l.contains("Error:"))
            .expect("error printed");
        assert!(error_line.contains("top_k"));
    }

    #[test]
    fn empty_outcome_says_nothing_found() {
        let outcome = QueryOutcome {
            original_question: "warranty".to_string(),
            effective_question: "warranty".to_string(),
            results: Vec::new(),
        };

        assert_eq!(format_outcome(&outcome), "❌ No matching answer found\n");
    }

    #[test]
    fn formatted_outcome_shows_rewrite_and_fields() {
        let outcome = QueryOutcome {
            original_question: "warranty".to_string(),
            effective_question: "What is the warranty period?".to_string(),
            results: vec![QueryResult {
                question: "What is the warranty period?".to_string(),
                score: 0.75,
                chunk_id: "c-1".to_string(),
                header: "Warranty".to_string(),
                raw_content: "Two year coverage.".to_string(),
                standard_answer: "Two years.".to_string(),
                image_url: Some("http://img/1.png".to_string()),
                file_source: "faq.xlsx".to_string(),
                row_index: 7,
                question_type: QuestionType::Standard,
            }],
        };

        let text = format_outcome(&outcome);
        assert!(text.starts_with("Rewritten question: What is the warranty period?"));
        assert!(text.contains("[Result 1] score: 0.7500"));
        assert!(text.contains("Source: faq.xlsx (row 7)"));
        assert!(text.contains("Image: http://img/1.png"));
    }
}
