use anyhow::Result;
use askdata::config::AppConfig;
use askdata::gate::Decision;
use askdata::server;
use askdata::session::AskService;
use askdata::table::{frame_to_markdown, MARKDOWN_ROWS};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "askdata")]
#[command(about = "Ask questions of a data warehouse in plain language")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the demo page
    Serve {
        /// Address to listen on (or set ASKDATA_BIND)
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Run a single question through the pipeline and print the results
    Ask {
        /// The question in natural language
        question: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = AppConfig::from_env()?;
    let service = AskService::from_config(&config)?;

    match args.command {
        Command::Serve { bind } => {
            let bind = bind.unwrap_or(config.bind);
            info!("askdata starting on {}", bind);
            server::serve(service, &bind).await?;
        }
        Command::Ask { question } => {
            let session = service.sessions().create();
            let submission = service.submit(session, Some(&question)).await;

            let report = match (submission.decision, submission.report) {
                (Decision::Accepted, Some(report)) => report,
                (decision, _) => {
                    println!("{}", decision.message().unwrap_or_default());
                    return Ok(());
                }
            };

            if let Some(sql) = &report.sql {
                println!("\n=== SQL ===\n{}", sql);
            }
            if let Some(df) = &report.table {
                println!("\n=== Table ({} rows) ===\n{}", df.height(), frame_to_markdown(df, MARKDOWN_ROWS)?);
            }
            if let Some(code) = &report.chart_code {
                println!("\n=== Plotly Code ===\n{}", code);
            }
            if let Some(figure) = &report.figure {
                println!("\n=== Chart ===\n{}", serde_json::to_string_pretty(&figure.to_plotly_json())?);
            }
            if let Some(failure) = &report.failure {
                eprintln!("\n{}", failure);
            }
        }
    }

    Ok(())
}
