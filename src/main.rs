//! Yakusu CLI - save episodes, extract glossary entities and publish translations.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use yakusu::config::Config;
use yakusu::console::{Console, Style};
use yakusu::utils::truncate_text;
use yakusu::{
    Entity, Episode, Language, NovelRef, Pipeline, RetryOutcome, SaveOutcome, TranslationRun,
};

/// Multilingual publishing pipeline for web novel authors.
#[derive(Parser, Debug)]
#[command(name = "yakusu")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Use this config file instead of the default location.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Show debug logs on stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the remaining daily translation quota.
    Quota,

    /// Extract glossary entities from an episode body.
    Extract {
        /// File containing the episode body.
        file: PathBuf,

        #[arg(long)]
        novel_id: String,

        #[arg(long)]
        novel_title: String,

        /// Language the body is written in.
        #[arg(long)]
        source: Language,

        /// Save every extracted entity to the novel's glossary.
        #[arg(long)]
        save: bool,

        /// Category for saved entities.
        #[arg(long, default_value = "term")]
        category: String,
    },

    /// Save an episode and translate it into every configured language.
    Translate {
        /// File containing the episode body.
        file: PathBuf,

        #[arg(long)]
        novel_id: String,

        #[arg(long)]
        novel_title: String,

        /// Episode number.
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        ep: u32,

        #[arg(long)]
        title: String,

        #[arg(long)]
        source: Language,

        /// Retry failed languages once after the first pass finishes.
        #[arg(long)]
        retry_failed: bool,
    },

    /// Show translation status of a dispatched episode.
    Status {
        #[arg(long)]
        novel_id: String,

        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        ep: u32,

        #[arg(long)]
        source: Language,
    },

    /// Retry failed translations of a dispatched episode.
    Retry {
        #[arg(long)]
        novel_id: String,

        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        ep: u32,

        #[arg(long)]
        source: Language,

        /// Languages to retry. Every failed language when omitted.
        #[arg(long = "language", num_args = 1..)]
        languages: Vec<Language>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { "yakusu=debug" } else { "yakusu=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let console = Console::new();

    let Some(config) = load_config(args.config.as_deref(), &console)? else {
        return Ok(());
    };
    let pipeline = Pipeline::from_config(&config).context("Failed to set up service clients")?;

    match args.command {
        Command::Quota => show_quota(&pipeline, &console).await,
        Command::Extract {
            file,
            novel_id,
            novel_title,
            source,
            save,
            category,
        } => {
            let novel = NovelRef::new(novel_id, novel_title);
            extract(&pipeline, &console, &file, &novel, source, save.then_some(category.as_str())).await
        }
        Command::Translate {
            file,
            novel_id,
            novel_title,
            ep,
            title,
            source,
            retry_failed,
        } => {
            let body = read_body(&file).await?;
            let mut episode = Episode::new(NovelRef::new(novel_id, novel_title), ep, title, body);
            translate(&pipeline, &console, &mut episode, source, retry_failed).await
        }
        Command::Status {
            novel_id,
            ep,
            source,
        } => {
            let novel = NovelRef::new(novel_id, String::new());
            let run = pipeline
                .resume(&novel, ep, source)
                .await
                .context("Failed to read translation status")?;
            console.section(&format!("Episode {}", run.key()));
            console.job_table(&run.progress());
            Ok(())
        }
        Command::Retry {
            novel_id,
            ep,
            source,
            languages,
        } => {
            let novel = NovelRef::new(novel_id, String::new());
            let run = pipeline
                .resume(&novel, ep, source)
                .await
                .context("Failed to read translation status")?;
            retry(&run, &console, &languages).await?;
            follow(&run, &console).await;
            Ok(())
        }
    }
}

/// Loads and validates the configuration. Returns `None` on first run, after
/// pointing the user at the file to edit.
fn load_config(path: Option<&Path>, console: &Console) -> Result<Option<Config>> {
    console.step("Loading configuration...");
    let (config, config_path) = match path {
        Some(path) => (
            Config::load_from(path).context("Failed to load configuration")?,
            path.to_path_buf(),
        ),
        None => (
            Config::load().context("Failed to load configuration")?,
            Config::config_path()?,
        ),
    };

    if !config.platform.is_configured() {
        console.warning(&format!(
            "Access token not configured. Please edit: {}",
            config_path.display()
        ));
        console.info("Set your platform access token in the config file and run again.");
        return Ok(None);
    }

    config.validate().context("Invalid configuration")?;
    console.success("Configuration loaded");
    Ok(Some(config))
}

async fn read_body(path: &Path) -> Result<String> {
    let body = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    if body.trim().is_empty() {
        anyhow::bail!("{} is empty", path.display());
    }
    Ok(body)
}

async fn show_quota(pipeline: &Pipeline, console: &Console) -> Result<()> {
    let snapshot = pipeline.quota().await.context("Failed to read quota")?;
    console.info(&format!("Translations: {}", console.quota(&snapshot)));
    Ok(())
}

async fn extract(
    pipeline: &Pipeline,
    console: &Console,
    file: &Path,
    novel: &NovelRef,
    source: Language,
    save_as: Option<&str>,
) -> Result<()> {
    let body = read_body(file).await?;

    console.step("Extracting entities...");
    let candidates = pipeline
        .extract_for(&body, novel, source)
        .await
        .context("Entity extraction failed")?;

    if candidates.is_empty() {
        console.success("No new entities found");
        return Ok(());
    }

    console.success(&format!("Found {} new entities", candidates.len()));
    for candidate in &candidates {
        let translations: Vec<String> = candidate
            .translations
            .iter()
            .map(|(lang, text)| format!("{}={}", lang, truncate_text(text, 24)))
            .collect();
        println!(
            "  {} {}",
            console.style(&candidate.source_text, &[Style::Bold]),
            console.muted(&translations.join(" "))
        );
    }

    let Some(category) = save_as else {
        return Ok(());
    };

    console.step("Saving entities...");
    let entities: Vec<Entity> = candidates
        .into_iter()
        .map(|c| c.into_entity(category))
        .collect();
    let results = pipeline.save_entities(novel, &entities).await;

    let mut created = 0;
    for (entity, result) in entities.iter().zip(results) {
        match result {
            Ok(SaveOutcome::Created) => created += 1,
            Ok(SaveOutcome::AlreadyExisted) => {}
            Err(e) => console.error(&format!("Failed to save '{}': {}", entity.source_text, e)),
        }
    }
    console.success(&format!("Saved {} entities", created));
    Ok(())
}

async fn translate(
    pipeline: &Pipeline,
    console: &Console,
    episode: &mut Episode,
    source: Language,
    retry_failed: bool,
) -> Result<()> {
    console.section(&format!("Episode {}: {}", episode.ep, episode.title));

    console.step("Checking quota and dispatching translations...");
    let run = pipeline
        .translate(episode, source)
        .await
        .context("Translation dispatch failed")?;
    if let Some(id) = episode.remote_id() {
        console.info(&format!("Episode saved as {}", id));
    }
    if let Ok(snapshot) = pipeline.current_quota().await {
        console.info(&format!("Quota: {}", console.quota(&snapshot)));
    }

    let progress = follow(&run, console).await;
    if retry_failed && !progress.failed().is_empty() {
        retry(&run, console, &[]).await?;
        follow(&run, console).await;
    }
    Ok(())
}

/// Retries `languages`, or every failed language when empty.
async fn retry(run: &TranslationRun, console: &Console, languages: &[Language]) -> Result<()> {
    let results = if languages.is_empty() {
        run.retry_failed().await
    } else {
        let mut results = Vec::with_capacity(languages.len());
        for &language in languages {
            results.push((language, run.retry(language).await));
        }
        results
    };

    if results.is_empty() {
        console.info("Nothing to retry");
    }
    for (language, result) in results {
        match result {
            Ok(RetryOutcome::Dispatched) => console.step(&format!("Retrying {}", language)),
            Ok(RetryOutcome::AlreadyDone) => console.info(&format!("{} is already translated", language)),
            Ok(RetryOutcome::InFlight) => console.info(&format!("{} is still in progress", language)),
            Err(e) => console.error(&format!("Retry of {} failed: {}", language, e)),
        }
    }
    Ok(())
}

/// Prints progress until the run is finished or cancelled, then the final table.
async fn follow(run: &TranslationRun, console: &Console) -> yakusu::Progress {
    let progress = run
        .watch(|progress| console.progress_update(&console.progress_line(progress)))
        .await;
    console.clear_line();
    println!();

    console.job_table(&progress);
    if !progress.is_finished() {
        console.warning("Stopped following before every translation finished");
    } else if progress.failed().is_empty() {
        console.success("All translations finished");
    } else {
        console.warning("Some translations failed; run `yakusu retry` to try them again");
    }
    progress
}
