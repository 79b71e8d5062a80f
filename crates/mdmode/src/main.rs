use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

#[derive(Parser, Debug)]
pub struct Args {
    /// Log file path, also settable via `MDMODE_LOG_PATH`.
    #[clap(long)]
    log: Option<PathBuf>,

    /// Max log level.
    #[clap(long, default_value = "debug")]
    log_level: String,
}

#[derive(Parser, Debug)]
pub enum Cmd {
    /// Starts the JSON-RPC service on stdio.
    #[clap(name = "rpc")]
    Rpc,
}

#[derive(Parser, Debug)]
#[clap(name = "mdmode", version)]
pub struct Mdmode {
    #[clap(flatten)]
    pub args: Args,

    #[clap(subcommand)]
    pub cmd: Cmd,
}

/// Log files are capped; past this size the old log is dropped on startup.
const MAX_LOG_SIZE: u64 = 8 * 1024 * 1024;

fn setup_logging(args: &Args) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let maybe_log = args.log.clone().or_else(|| {
        std::env::var("MDMODE_LOG_PATH")
            .map(PathBuf::from)
            .ok()
    });

    let Some(log_path) = maybe_log else {
        return Ok(None);
    };

    if let Ok(metadata) = std::fs::metadata(&log_path) {
        if log_path.is_file() && metadata.len() > MAX_LOG_SIZE {
            std::fs::remove_file(&log_path)?;
        }
    }

    let file_name = log_path
        .file_name()
        .ok_or_else(|| anyhow!("no file name in {log_path:?}"))?;

    let directory = log_path
        .parent()
        .ok_or_else(|| anyhow!("{log_path:?} has no parent"))?;

    let file_appender = tracing_appender::rolling::never(directory, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let max_level = args
        .log_level
        .parse()
        .unwrap_or(tracing::Level::DEBUG);

    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(max_level)
        .with_line_number(true)
        .with_writer(non_blocking)
        .with_ansi(std::io::stdout().is_terminal())
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    Ok(Some(guard))
}

#[tokio::main]
async fn main() -> Result<()> {
    let mdmode = Mdmode::parse();

    match mdmode.cmd {
        Cmd::Rpc => {
            let _guard = setup_logging(&mdmode.args)?;
            mdmode_core::stdio_server::start().await;
        }
    }

    Ok(())
}
