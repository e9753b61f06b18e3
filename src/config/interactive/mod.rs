
use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};

use super::settings::{validate_min_score, validate_top_k};
use super::{ChatCredentials, Config, ConfigError, OllamaConfig, RewriteConfig};

#[inline]
pub fn run_interactive_config() -> Result<()> {
    eprintln!("{}", style("🔧 QA Search Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config()?;

    eprintln!("{}", style("Ollama Configuration").bold().yellow());
    eprintln!("Configure the Ollama instance used for question embeddings.");
    eprintln!();

    configure_ollama(&mut config.ollama)?;

    eprintln!();
    eprintln!("{}", style("Index & Query Defaults").bold().yellow());
    configure_index_and_query(&mut config)?;

    eprintln!();
    eprintln!("{}", style("Question Rewriting").bold().yellow());
    eprintln!("Credentials are read from the environment, never from this file.");
    configure_rewrite(&mut config.rewrite)?;

    eprintln!();
    eprintln!("{}", style("Testing configuration...").yellow());

    if test_ollama_connection(&config.ollama)? {
        eprintln!("{}", style("✓ Ollama connection successful!").green());
    } else {
        eprintln!(
            "{}",
            style("⚠ Warning: Could not connect to Ollama").yellow()
        );
        eprintln!("You can continue, but make sure Ollama is running before ingesting.");
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config() -> Result<()> {
    let config = Config::load_default().context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Ollama Settings:").bold().yellow());
    eprintln!("  Host: {}", style(&config.ollama.host).cyan());
    eprintln!("  Port: {}", style(config.ollama.port).cyan());
    eprintln!("  Model: {}", style(&config.ollama.model).cyan());
    eprintln!(
        "  Texts per Embed Request: {}",
        style(config.ollama.batch_size).cyan()
    );
    match config.ollama_url() {
        Ok(url) => eprintln!("  Ollama URL: {}", style(url).cyan()),
        Err(e) => eprintln!("  Ollama URL: {} ({})", style("Invalid").red(), e),
    }

    eprintln!();
    eprintln!("{}", style("Index:").bold().yellow());
    eprintln!("  Collection: {}", style(&config.index.collection).cyan());
    eprintln!(
        "  Entries per Write Batch: {} (sent to Ollama {} texts at a time)",
        style(config.ingest.batch_size).cyan(),
        config.embed_request_size()
    );
    eprintln!(
        "  Vector Database: {}",
        style(config.vector_database_path().display()).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Query Defaults:").bold().yellow());
    eprintln!("  Top K: {}", style(config.query.top_k).cyan());
    eprintln!("  Min Score: {}", style(config.query.min_score).cyan());
    eprintln!("  Use Rewrite: {}", style(config.query.use_rewrite).cyan());

    eprintln!();
    eprintln!("{}", style("Question Rewriting:").bold().yellow());
    eprintln!("  Enabled: {}", style(config.rewrite.enabled).cyan());
    eprintln!(
        "  Endpoint: {}",
        style(config.rewrite.endpoint.as_deref().unwrap_or("(not set)")).cyan()
    );
    eprintln!("  Max Retries: {}", style(config.rewrite.max_retries).cyan());
    let credentials = match ChatCredentials::from_env() {
        Ok(Some(_)) => style("present".to_string()).green(),
        Ok(None) => style("not set".to_string()).yellow(),
        Err(e) => style(e.to_string()).red(),
    };
    eprintln!("  Credentials: {}", credentials);

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

fn load_existing_config() -> Result<Config> {
    let config_dir = Config::config_dir().context("Failed to resolve configuration directory")?;
    Config::load(&config_dir).map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("No usable configuration found. Using defaults.").yellow()
            );
            Ok(Config::with_base_dir(&config_dir))
        },
        |config| {
            eprintln!("{}", style("Found existing configuration.").green());
            Ok(config)
        },
    )
}

fn configure_ollama(ollama: &mut OllamaConfig) -> Result<()> {
    let protocols = &["http", "https"];
    let default_index = protocols
        .iter()
        .position(|&p| p == ollama.protocol)
        .unwrap_or(0);

    let protocol_index = Select::new()
        .with_prompt("Ollama protocol")
        .default(default_index)
        .items(protocols)
        .interact()?;

    let protocol = protocols[protocol_index].to_string();

    let host: String = Input::new()
        .with_prompt("Ollama host")
        .default(ollama.host.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let temp_config = OllamaConfig {
                protocol: protocol.clone(),
                host: input.clone(),
                ..OllamaConfig::default()
            };
            temp_config.validate()
        })
        .interact_text()?;

    let port: u16 = Input::new()
        .with_prompt("Ollama port")
        .default(ollama.port)
        .validate_with(|input: &u16| -> Result<(), &str> {
            if *input == 0 {
                Err("Port must be greater than 0")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let model: String = Input::new()
        .with_prompt("Embedding model")
        .default(ollama.model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let batch_size: u32 = Input::new()
        .with_prompt("Texts per embedding request")
        .default(ollama.batch_size)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if *input == 0 {
                Err("Batch size must be greater than 0")
            } else if *input > 1000 {
                Err("Batch size must be 1000 or less")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    ollama.set_protocol(protocol)?;
    ollama.set_host(host)?;
    ollama.set_port(port)?;
    ollama.set_model(model)?;
    ollama.set_batch_size(batch_size)?;

    Ok(())
}

fn configure_index_and_query(config: &mut Config) -> Result<()> {
    let collection: String = Input::new()
        .with_prompt("Collection name")
        .default(config.index.collection.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            super::IndexConfig {
                collection: input.clone(),
            }
            .validate()
        })
        .interact_text()?;

    let top_k: usize = Input::new()
        .with_prompt("Default number of results")
        .default(config.query.top_k)
        .validate_with(|input: &usize| validate_top_k(*input))
        .interact_text()?;

    let min_score: f32 = Input::new()
        .with_prompt("Default minimum similarity score")
        .default(config.query.min_score)
        .validate_with(|input: &f32| validate_min_score(*input))
        .interact_text()?;

    config.index.collection = collection;
    config.query.top_k = top_k;
    config.query.min_score = min_score;

    Ok(())
}

fn configure_rewrite(rewrite: &mut RewriteConfig) -> Result<()> {
    rewrite.enabled = Confirm::new()
        .with_prompt("Rewrite questions through the chat service before searching?")
        .default(rewrite.enabled)
        .interact()?;

    if !rewrite.enabled {
        return Ok(());
    }

    let endpoint: String = Input::new()
        .with_prompt("Chat websocket URL, ws:// or wss:// (leave empty to disable)")
        .default(rewrite.endpoint.clone().unwrap_or_default())
        .allow_empty(true)
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            if input.trim().is_empty() {
                return Ok(());
            }
            RewriteConfig {
                endpoint: Some(input.trim().to_string()),
                ..RewriteConfig::default()
            }
            .validate()
        })
        .interact_text()?;

    rewrite.endpoint = Some(endpoint.trim().to_string()).filter(|e| !e.is_empty());

    Ok(())
}

fn test_ollama_connection(ollama: &OllamaConfig) -> Result<bool> {
    let url = format!(
        "{}://{}:{}/api/version",
        ollama.protocol, ollama.host, ollama.port
    );

    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(std::time::Duration::from_secs(5)))
        .build()
        .into();

    match agent.get(&url).call() {
        Ok(_) => Ok(true),
        Err(ureq::Error::StatusCode(code)) if (400..500).contains(&code) => Ok(true),
        Err(_) => Ok(false),
    }
}
