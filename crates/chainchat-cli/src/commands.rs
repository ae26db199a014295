//! One-shot subcommands. These talk to the clients directly, no controller state.

use std::io::{self, Write};

use anyhow::{bail, Result};
use chainchat_client::{CatalogClient, GenerateRequest, GenerationClient};
use chainchat_core::{ChainChatConfig, DownloadProgress, ModelCatalog, ModelInfoTable};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::render;

pub async fn models(config: &ChainChatConfig) -> Result<()> {
    let client = CatalogClient::from_config(config);
    let available = client.try_fetch_available_models().await?;

    println!();
    println!("Installed Models:");
    println!("{:-<50}", "");
    if available.is_empty() {
        println!("  (none)");
    }
    for (i, name) in available.iter().enumerate() {
        println!("  {:<4} {}", i + 1, name);
    }
    println!();

    Ok(())
}

pub fn catalog(config: &ChainChatConfig, ram: Option<&str>, use_case: Option<&str>) -> Result<()> {
    let catalog = ModelCatalog::load(config.catalog.models_path.as_deref());
    let model_info = ModelInfoTable::load(config.catalog.info_path.as_deref());

    if let Some(ram) = ram {
        if !catalog.has_tier(ram) {
            bail!("Unknown RAM tier: {}. Options: {}", ram, catalog.ram_tiers().join(", "));
        }
    }
    if let Some(use_case) = use_case {
        if !catalog.has_use_case(use_case) {
            bail!("Unknown use case: {}. Options: {}", use_case, catalog.use_cases().join(", "));
        }
    }

    println!();
    for (tier, case, names) in catalog.entries() {
        if ram.is_some_and(|r| r != tier) || use_case.is_some_and(|u| u != case) {
            continue;
        }
        println!("{} / {}", tier, case);
        for name in names {
            let info = model_info
                .get(name)
                .map(|info| info.summary())
                .unwrap_or_else(|| "-".to_string());
            println!("  {:<24} {}", name, info);
        }
        println!();
    }

    Ok(())
}

pub async fn ask(
    config: &ChainChatConfig,
    prompt: String,
    models: Vec<String>,
    need_reasoning: bool,
) -> Result<()> {
    if prompt.trim().is_empty() {
        bail!(chainchat_core::PROMPT_REQUIRED);
    }

    let client = GenerationClient::from_config(config);
    let cancel = CancellationToken::new();
    let mut stream = client.generate(GenerateRequest::new(prompt, models, need_reasoning), cancel.clone());
    let mut stdout = io::stdout();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            item = stream.next() => match item {
                Some(Ok(chunk)) => {
                    print!("{}", chunk);
                    stdout.flush()?;
                }
                Some(Err(e)) => {
                    println!();
                    return Err(e.into());
                }
                None => break,
            },
            _ = &mut ctrl_c => {
                cancel.cancel();
                println!();
                println!("  Interrupted");
                return Ok(());
            }
        }
    }
    println!();

    Ok(())
}

pub async fn pull(config: &ChainChatConfig, model: &str) -> Result<()> {
    let client = CatalogClient::from_config(config);
    let cancel = CancellationToken::new();
    let mut stream = client.pull_model(model, cancel.clone());
    let mut stdout = io::stdout();
    let mut completed = false;

    print!("  {}", render::progress_line(&DownloadProgress::starting()));
    stdout.flush()?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            item = stream.next() => match item {
                Some(Ok(record)) => {
                    let progress = DownloadProgress::from_record(&record);
                    print!("\r\x1B[2K  {}", render::progress_line(&progress));
                    stdout.flush()?;
                    if record.is_success() {
                        completed = true;
                        break;
                    }
                }
                Some(Err(e)) => {
                    println!();
                    return Err(e.into());
                }
                None => break,
            },
            _ = &mut ctrl_c => {
                cancel.cancel();
                println!();
                bail!("Pull interrupted");
            }
        }
    }
    println!();

    if !completed {
        bail!("Error pulling model: stream ended before completion");
    }
    Ok(())
}

pub async fn status(config: &ChainChatConfig) -> Result<()> {
    println!("System Status:");
    println!("{:-<40}", "");
    println!("  Gateway: {}", config.server.base_url());
    println!(
        "  Timeouts: generate {}s, pull {}s",
        config.timeouts.generate_secs, config.timeouts.pull_secs
    );

    let client = CatalogClient::from_config(config);
    match client.try_fetch_available_models().await {
        Ok(models) => println!("  Gateway: connected ({} models installed)", models.len()),
        Err(e) => println!("  Gateway: disconnected ({})", e),
    }

    Ok(())
}
