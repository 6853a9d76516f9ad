use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use log::info;

use convert_models::{ConvertConfig, Outcome, SafetensorsStore};

#[derive(Parser)]
#[command(name = "convert-models")]
#[command(about = "Convert model parameters between their native and portable forms")]
#[command(version)]
struct Cli {
    /// Conversion direction: old (native to portable) or new (portable to native)
    #[arg(long)]
    stage: Option<String>,

    /// Model schema: sentiment or dvparser
    #[arg(long)]
    model: Option<String>,

    /// File to convert
    #[arg(long)]
    input: Option<PathBuf>,

    /// Where the converted file is written
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config = ConvertConfig::new(
        cli.stage.as_deref(),
        cli.model.as_deref(),
        cli.input,
        cli.output,
    )?;

    let outcome = convert_models::convert(&config, &SafetensorsStore)
        .with_context(|| format!("failed to convert {}", config.input.display()))?;

    match outcome {
        Outcome::Converted { fields } => info!(
            "converted {fields} fields into {}",
            config.output.display()
        ),
        Outcome::NothingToDo => println!("Nothing to do for {}", config.input.display()),
    }

    Ok(())
}
