use std::env;
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result, anyhow, bail};
use playlist_worker::app::ComponentRegistry;
use playlist_worker::config::Config;
use playlist_worker::pipeline::JobContext;

struct CliArgs {
    query: String,
    top_n: Option<usize>,
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args(env::args().skip(1))?;
    let config = Config::from_env().context("failed to load configuration")?;
    let top_n = args.top_n.unwrap_or_else(|| config.rank_top_n());

    let registry = ComponentRegistry::build(config)
        .await
        .context("failed to build component registry")?;
    let job = JobContext::new(&args.query, top_n);

    let outcome = match registry.pipeline().execute(&job).await {
        Ok(outcome) => outcome,
        Err(error) => {
            let kind = error.kind();
            eprintln!("{} ({}, job {})", kind.user_message(), kind.as_str(), job.job_id);
            process::exit(1);
        }
    };

    let rendered =
        serde_json::to_string_pretty(&outcome).context("failed to serialize playlist")?;
    match args.output {
        Some(path) => tokio::fs::write(&path, rendered)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => println!("{rendered}"),
    }
    Ok(())
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<CliArgs> {
    let mut query = None;
    let mut top_n = None;
    let mut output = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--query" => {
                let value = args.next().context("--query requires a text argument")?;
                query = Some(value);
            }
            "--top-n" => {
                let value = args.next().context("--top-n requires a number")?;
                let parsed = value
                    .parse::<usize>()
                    .context("--top-n must be a positive integer")?;
                if parsed == 0 {
                    bail!("--top-n must be greater than zero");
                }
                top_n = Some(parsed);
            }
            "--output" => {
                let value = args.next().context("--output requires a path argument")?;
                output = Some(PathBuf::from(value));
            }
            "--help" => {
                print_usage();
                process::exit(0);
            }
            _ => {
                bail!("unknown argument: {}", arg);
            }
        }
    }

    let query = query
        .map(|query| query.trim().to_string())
        .filter(|query| !query.is_empty())
        .ok_or_else(|| anyhow!("--query is required"))?;

    Ok(CliArgs {
        query,
        top_n,
        output,
    })
}

fn print_usage() {
    eprintln!("Usage: generate_playlist --query <text> [--top-n 20] [--output <path>]");
}
