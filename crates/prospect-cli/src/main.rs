use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use prospect_pipeline::{read_snapshot_summary, rescore_snapshot, EnrichmentPipeline, PipelineConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "prospect-cli")]
#[command(about = "Prospect search agent: enrich and score companies against an ICP")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Query every enabled source, merge by domain, score and write the snapshot.
    Run {
        #[arg(long)]
        workspace: Option<PathBuf>,
        #[arg(long)]
        icp: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print company name and confidence from an existing snapshot.
    Summary {
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Re-score an existing snapshot against an ICP.
    Rescore {
        #[arg(long)]
        icp: Option<PathBuf>,
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "prospect_pipeline=info,prospect_adapters=info,prospect_storage=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let mut config = PipelineConfig::from_env();

    match cli.command.unwrap_or(Commands::Run {
        workspace: None,
        icp: None,
        output: None,
    }) {
        Commands::Run {
            workspace,
            icp,
            output,
        } => {
            if let Some(workspace) = workspace {
                config.workspace_root = workspace;
            }
            if let Some(icp) = icp {
                config.icp_path = icp;
            }
            if let Some(output) = output {
                config.output_path = output;
            }

            let summary = EnrichmentPipeline::new(config)?.run_once().await?;
            println!("output saved to {}", summary.output_path);
            println!("found {} companies:", summary.merged_records);
            for company in &summary.companies {
                println!("{company}");
            }
        }
        Commands::Summary { input } => {
            let input = input.unwrap_or_else(|| config.output_file());
            for company in read_snapshot_summary(&input).await? {
                println!("{company}");
            }
        }
        Commands::Rescore { icp, input, output } => {
            let icp = icp.unwrap_or_else(|| config.icp_file());
            let input = input.unwrap_or_else(|| config.output_file());
            let output = output.unwrap_or_else(|| input.clone());
            let companies = rescore_snapshot(&icp, &input, &output).await?;
            println!("rescored {} companies into {}:", companies.len(), output.display());
            for company in &companies {
                println!("{company}");
            }
        }
    }

    Ok(())
}
