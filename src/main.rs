use clap::{Parser, Subcommand};
use descriptor_engine::application::builder::DescriptorBuilder;
use descriptor_engine::application::validator::validate_concurrently;
use descriptor_engine::domain::context::{ExperienceSettings, RequestContext};
use descriptor_engine::domain::ports::{ConfigSource, ConfigSourceBox};
use descriptor_engine::interfaces::csv::directory::CsvDirectorySource;
use descriptor_engine::settings::EngineSettings;
use miette::{IntoDiagnostic, Result, miette};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration directory (`dictionaries.csv` plus one folder per partner)
    config_dir: PathBuf,

    /// Engine settings TOML. Defaults to `<config_dir>/settings.toml` when present.
    #[arg(long)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check the configuration for unused, dangling and cyclic entries
    Validate,
    /// Resolve descriptors for one request and print them as JSON
    Resolve {
        #[arg(long)]
        country: String,
        /// Description kind (address, profile, taxId...)
        #[arg(long)]
        kind: String,
        /// Form identity (billing, shipping...)
        #[arg(long = "type")]
        identity: String,
        #[arg(long, default_value = "en-us")]
        language: String,
        #[arg(long, default_value = "defaulttemplate")]
        partner: String,
        #[arg(long, default_value = "add")]
        operation: String,
        #[arg(long)]
        scenario: Option<String>,
        /// Exposed flight, repeatable
        #[arg(long = "flight")]
        flights: Vec<String>,
        /// Template parameter as key=value, repeatable
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
        /// Experience settings JSON file
        #[arg(long)]
        experience: Option<PathBuf>,
    },
}

fn parse_param(raw: &str) -> std::result::Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .ok_or_else(|| format!("expected key=value, got \"{raw}\""))
}

fn load_settings(cli: &Cli) -> Result<EngineSettings> {
    let path = match &cli.settings {
        Some(path) => path.clone(),
        None => {
            let default = cli.config_dir.join("settings.toml");
            if !default.is_file() {
                return Ok(EngineSettings::default());
            }
            default
        }
    };
    EngineSettings::from_path(&path).into_diagnostic()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Arc::new(load_settings(&cli)?);
    let source: ConfigSourceBox = Box::new(CsvDirectorySource::new(&cli.config_dir));
    let store = Arc::new(source.load().await.into_diagnostic()?);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match cli.command {
        Command::Validate => {
            let issues = validate_concurrently(store, settings).await.into_diagnostic()?;
            for issue in &issues {
                writeln!(out, "{issue}").into_diagnostic()?;
            }
            if !issues.is_empty() {
                return Err(miette!("{} configuration issue(s) found", issues.len()));
            }
            writeln!(out, "configuration is consistent").into_diagnostic()?;
        }
        Command::Resolve {
            country,
            kind,
            identity,
            language,
            partner,
            operation,
            scenario,
            flights,
            params,
            experience,
        } => {
            let mut ctx = RequestContext::new(
                country,
                kind.parse().into_diagnostic()?,
                identity,
                language,
                partner,
                operation.parse().into_diagnostic()?,
            )
            .with_flights(flights);
            if let Some(scenario) = scenario {
                ctx = ctx.with_scenario(scenario);
            }
            for (key, value) in params {
                ctx = ctx.with_parameter(key, value);
            }
            if let Some(path) = experience {
                let raw = std::fs::read_to_string(path).into_diagnostic()?;
                let experience: ExperienceSettings = serde_json::from_str(&raw).into_diagnostic()?;
                ctx = ctx.with_experience_settings(experience);
            }

            let builder = DescriptorBuilder::new(store, settings).into_diagnostic()?;
            let descriptors = builder.build(&ctx).into_diagnostic()?;
            serde_json::to_writer_pretty(&mut out, &descriptors).into_diagnostic()?;
            writeln!(out).into_diagnostic()?;
        }
    }

    Ok(())
}
