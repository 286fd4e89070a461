use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use reply_assist::cli::Cli;
use reply_assist::config::{AppConfig, log_path_from_env};
use reply_assist::error::Result;
use reply_assist::llm::create_provider;
use reply_assist::pipeline::ReplyPipeline;
use reply_assist::service::{HandledEmail, ReplyService};
use reply_assist::store::{JsonlLog, ReplyStats};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if cli.stats {
        return print_stats().await;
    }
    process_files(&cli.files).await
}

async fn process_files(files: &[PathBuf]) -> Result<ExitCode> {
    let config = AppConfig::from_env()?;
    eprintln!("📨 Reply Assist v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Backend: {} ({})", config.llm.backend, config.llm.model);
    eprintln!("   Log: {}", config.log_path.display());

    let retry = &config.pipeline.retry;
    tracing::info!(
        temperature = config.pipeline.temperature,
        max_tokens = config.pipeline.max_tokens,
        max_retries = retry.max_retries,
        base_delay_ms = retry.base_delay.as_millis() as u64,
        max_delay_ms = retry.max_delay.as_millis() as u64,
        jitter = retry.jitter,
        "Pipeline configured"
    );

    let llm = create_provider(&config.llm)?;
    let pipeline = ReplyPipeline::new(llm, config.pipeline.clone());
    let log = Arc::new(JsonlLog::new(&config.log_path));
    let service = ReplyService::new(pipeline, log);

    let results =
        futures::future::join_all(files.iter().map(|path| service.handle_file(path))).await;

    let mut failed = false;
    for (path, result) in files.iter().zip(results) {
        match result {
            Ok(handled) => {
                print_handled(path, &handled);
                if let Err(e) = &handled.logged {
                    eprintln!("Warning: reply for {} was not logged: {e}", path.display());
                    failed = true;
                }
            }
            Err(e) => {
                eprintln!("Error: {e}");
                failed = true;
            }
        }
    }

    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn print_handled(path: &std::path::Path, handled: &HandledEmail) {
    let record = &handled.interaction;
    let entities = serde_json::to_string_pretty(&record.entities).unwrap_or_else(|_| "{}".into());

    println!("── {} ──", path.display());
    println!("Subject:  {}", record.subject);
    println!("From:     {}", record.sender);
    println!("Category: {}", record.category);
    println!("Intent:   {}", record.intent);
    println!("Entities: {entities}");
    println!("Reply:\n{}\n", record.reply);
}

async fn print_stats() -> Result<ExitCode> {
    let log = JsonlLog::new(log_path_from_env());
    let records = log.load().await?;
    let stats = ReplyStats::from_records(&records);

    if stats.total_replies == 0 {
        println!("No interactions logged at {}", log.path().display());
        return Ok(ExitCode::SUCCESS);
    }

    println!("Interaction log: {}", log.path().display());
    println!("Total replies:      {}", stats.total_replies);
    println!("Unique categories:  {}", stats.unique_categories);
    println!("Unique intents:     {}", stats.unique_intents);
    if let Some(category) = &stats.most_common_category {
        println!("Top category:       {category}");
    }
    if let Some(intent) = &stats.most_common_intent {
        println!("Top intent:         {intent}");
    }
    println!("Avg reply length:   {:.1} chars", stats.avg_reply_length);
    println!(
        "Reply length range: {}..={} chars (std dev {:.1})",
        stats.min_reply_length, stats.max_reply_length, stats.reply_length_std_dev
    );
    println!(
        "Reply lengths:      {} short / {} medium / {} long",
        stats.short_replies, stats.medium_replies, stats.long_replies
    );
    println!("Degraded runs:      {}", stats.degraded_runs);
    for (category, count) in &stats.category_counts {
        println!("  {category:<10} {count}");
    }

    Ok(ExitCode::SUCCESS)
}
