//! thesis-qa CLI application
//!
//! Command-line interface for asking questions about a folder of PDFs.

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use thesis_qa::{
    Answer, Availability, Config, QaError, QaService, SetupAction, SetupReport,
    ml::index::ScoredChunk,
    utils::{directory_size, format_file_size, truncate_chars},
};

#[derive(Parser)]
#[command(name = "thesis-qa")]
#[command(about = "Ask questions about your PDF documents with retrieval-augmented generation")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to thesis-qa.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Folder containing the PDF documents
    #[arg(short, long, global = true)]
    documents: Option<PathBuf>,

    /// Directory holding the vector index
    #[arg(short, long, global = true)]
    index: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the vector index, or load it if it already exists
    Setup {
        /// Discard the existing index and rebuild from the documents
        #[arg(long)]
        rebuild: bool,
    },

    /// Ask a single question
    Ask {
        /// The question
        question: String,

        /// Number of chunks used as context
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// Show the most similar chunks without generating an answer
    Search {
        /// Search query
        query: String,

        /// Number of results to return
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// Interactive question answering
    Chat {
        /// Number of chunks used as context
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// Show statistics of the persisted index
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let outcome = match cli.command {
        Commands::Setup { rebuild } => setup_command(config, rebuild),
        Commands::Ask { question, top_k } => ask_command(config, &question, top_k).await,
        Commands::Search { query, top_k } => search_command(config, &query, top_k),
        Commands::Chat { top_k } => chat_command(config, top_k).await,
        Commands::Stats => stats_command(config),
    };

    match outcome {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            match e.downcast_ref::<QaError>() {
                Some(qa_error) => render_error(qa_error),
                None => eprintln!("❌ {:#}", e),
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    if let Some(documents) = &cli.documents {
        config.paths.documents_dir = documents.clone();
    }
    if let Some(index) = &cli.index {
        config.paths.index_dir = index.clone();
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn error_title(error: &QaError) -> String {
    let icon = if error.is_recoverable() { "⚠️ " } else { "❌" };
    let label = match error {
        QaError::MissingConfiguration(_) => "Question answering is not configured",
        QaError::NoDocumentsFound(_) => "No documents found",
        QaError::IndexUnavailable(_) => "Index not available",
        QaError::ExternalCall(_) => "External service error",
        _ => "Error",
    };
    format!("{} {}", icon, label)
}

/// Inline error panel with remediation hint
fn render_error(error: &QaError) {
    let title = error_title(error);

    eprintln!();
    eprintln!("{}", title);
    eprintln!("   {}", error);
    if let Some(hint) = error.remediation() {
        eprintln!("   💡 {}", hint);
    }
    eprintln!();
}

fn embedding_progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    if let Ok(style) =
        ProgressStyle::with_template("🧠 Embedding [{bar:40.cyan/blue}] {pos}/{len} chunks ({eta})")
    {
        bar.set_style(style.progress_chars("=>-"));
    }
    bar
}

fn run_setup(service: &mut QaService, rebuild: bool) -> thesis_qa::Result<SetupReport> {
    let will_build = rebuild || !service.pipeline().index_exists();
    if !will_build {
        return service.setup(false);
    }

    let bar = embedding_progress_bar();
    let report = service.pipeline_mut().setup_with_progress(rebuild, |done, total| {
        bar.set_length(total as u64);
        bar.set_position(done as u64);
    });
    bar.finish_and_clear();
    report
}

fn print_report(report: &SetupReport) {
    match report.action {
        SetupAction::Built => println!("✅ Index built!"),
        SetupAction::Loaded => println!("✅ Existing index loaded"),
    }
    println!("   📄 Documents: {}", report.documents);
    println!("   📑 Pages: {}", report.pages);
    println!("   📊 Chunks: {}", report.chunks);
    println!("   ⏱️  Time: {:.2}s", report.elapsed_secs);
    for warning in &report.warnings {
        println!("   ⚠️  {}", warning);
    }
}

fn setup_command(config: Config, rebuild: bool) -> anyhow::Result<()> {
    println!("🔧 Setting up the document index...");
    let mut service = QaService::from_config(config)?;
    let report = run_setup(&mut service, rebuild)?;
    print_report(&report);
    Ok(())
}

fn print_answer(answer: &Answer) {
    println!();
    if answer.no_context {
        println!("🤷 {}", answer.text);
        println!();
        return;
    }

    println!("💡 {}", answer.text);
    println!();
    println!("📚 Sources:");
    for (i, source) in answer.sources.iter().enumerate() {
        println!(
            "{}. {}, page {} (score {:.3})",
            i + 1,
            source.document,
            source.page,
            source.score
        );
        println!("   {}", source.snippet.replace('\n', " "));
    }
    println!();
}

fn print_results(results: &[ScoredChunk]) {
    if results.is_empty() {
        println!("❌ No results found");
        return;
    }

    println!("📋 Found {} results:", results.len());
    println!();
    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. Score: {:.3}  {} (page {})",
            i + 1,
            result.score,
            result.chunk.source,
            result.chunk.page
        );
        println!("   {}", truncate_chars(&result.chunk.text, 300).replace('\n', " "));
        println!();
    }
}

async fn ask_command(config: Config, question: &str, top_k: Option<usize>) -> anyhow::Result<()> {
    // Checked before any model download or index work
    if config.llm.resolve_api_key().is_none() {
        return Err(QaError::MissingConfiguration(format!("{} is not set", config.llm.api_key_env)).into());
    }

    let mut service = QaService::from_config(config)?;
    if let Some(k) = top_k {
        service = service.with_top_k(k);
    }
    run_setup(&mut service, false)?;

    println!("❓ {}", question);
    let answer = service.ask(question).await?;
    print_answer(&answer);
    Ok(())
}

fn search_command(config: Config, query: &str, top_k: Option<usize>) -> anyhow::Result<()> {
    let k = top_k.unwrap_or(config.search.top_k);
    let mut service = QaService::from_config(config)?;
    run_setup(&mut service, false)?;

    println!("🔍 Searching for: \"{}\"", query);
    let results = service.pipeline_mut().retrieve(query, k)?;
    print_results(&results);
    Ok(())
}

fn print_stats(service: &QaService) {
    match service.pipeline().stats() {
        Some(stats) => {
            println!("📊 Index statistics");
            println!("   📊 Chunks: {}", stats.total_chunks);
            println!("   📄 Documents: {}", stats.documents);
            println!("   📑 Pages: {}", stats.pages);
            println!("   📏 Avg chunk length: {:.0} chars", stats.avg_chunk_chars);
            println!("   🧠 Model: {} ({} dims, {} search)", stats.model_name, stats.dimension, stats.index_type);
            println!("   🕒 Built: {}", stats.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
            if let Ok(size) = directory_size(&service.pipeline().config().paths.index_dir) {
                println!("   💾 Size on disk: {}", format_file_size(size));
            }
        }
        None => println!("❌ No index loaded"),
    }
}

async fn chat_command(config: Config, top_k: Option<usize>) -> anyhow::Result<()> {
    let mut service = QaService::from_config(config)?;
    if let Some(k) = top_k {
        service = service.with_top_k(k);
    }
    let report = run_setup(&mut service, false)?;
    print_report(&report);

    let answers_enabled = match service.availability() {
        Availability::Ready => true,
        Availability::MissingConfiguration { guidance } => {
            println!();
            println!("⚠️  Question answering is not configured. Showing matching excerpts only.");
            println!("   💡 {}", guidance);
            false
        }
    };

    println!();
    println!("💬 Starting interactive chat mode...");
    println!("   Type 'help' for commands, 'exit' to end the session");
    println!();

    loop {
        print!("❓ Question: ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();

        match input {
            "" => continue,
            "quit" | "exit" => {
                println!("👋 Goodbye!");
                break;
            }
            "help" => {
                println!("   help   show this message");
                println!("   stats  show index statistics");
                println!("   exit   end the session");
                continue;
            }
            "stats" => {
                print_stats(&service);
                continue;
            }
            _ => {}
        }

        if answers_enabled {
            match service.ask(input).await {
                Ok(answer) => print_answer(&answer),
                Err(e) => render_error(&e),
            }
        } else {
            let k = service.top_k();
            match service.pipeline_mut().retrieve(input, k) {
                Ok(results) => print_results(&results),
                Err(e) => render_error(&e),
            }
        }
    }

    Ok(())
}

fn stats_command(config: Config) -> anyhow::Result<()> {
    let mut service = QaService::from_config(config)?;
    if !service.pipeline().index_exists() {
        return Err(QaError::IndexUnavailable(format!(
            "No index at {}",
            service.pipeline().index_path().display()
        ))
        .into());
    }

    service.pipeline_mut().load_index()?;
    print_stats(&service);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["thesis-qa", "ask", "What was measured?", "-k", "2"]).unwrap();
        match cli.command {
            Commands::Ask { question, top_k } => {
                assert_eq!(question, "What was measured?");
                assert_eq!(top_k, Some(2));
            }
            _ => panic!("expected ask"),
        }
    }

    #[test]
    fn test_global_path_overrides() {
        let cli =
            Cli::try_parse_from(["thesis-qa", "setup", "--rebuild", "--documents", "papers"]).unwrap();
        assert_eq!(cli.documents, Some(PathBuf::from("papers")));
        assert!(matches!(cli.command, Commands::Setup { rebuild: true }));
    }

    #[test]
    fn test_error_title_marks_recoverable_kinds() {
        let title = error_title(&QaError::ExternalCall("timeout".into()));
        assert!(title.starts_with("⚠️"));
        assert!(title.ends_with("External service error"));

        let title = error_title(&QaError::Storage("disk full".into()));
        assert_eq!(title, "❌ Error");
    }

    #[test]
    fn test_question_required() {
        assert!(Cli::try_parse_from(["thesis-qa", "ask"]).is_err());
    }
}
