use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use wa_bulk_sender::browser::ChromeLauncher;
use wa_bulk_sender::checkpoint::CheckpointStore;
use wa_bulk_sender::config;
use wa_bulk_sender::model::RunEnd;
use wa_bulk_sender::sender::{SendJob, Sender};
use wa_bulk_sender::sink::{self, TracingSink};

#[derive(Debug, Parser)]
#[command(author, version, about = "Send personalized WhatsApp Web messages to a contact list")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Contacts spreadsheet (.xlsx/.xls/.ods) or .csv with name, phone and optional message columns
    #[arg(long)]
    contacts: PathBuf,

    /// Message template; `{{name}}` is replaced by the contact's name
    #[arg(long)]
    template: Option<PathBuf>,

    /// Image attached to every message
    #[arg(long)]
    image: Option<PathBuf>,

    /// Ignore the saved position and start from the first contact
    #[arg(long)]
    fresh: bool,

    /// Override `sending.daily_limit`
    #[arg(long)]
    daily_limit: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(sink::env_filter(std::env::var("RUST_LOG").ok().as_deref()))
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let mut run_cfg = cfg.run_config();
    if args.fresh {
        run_cfg.resume = false;
    }
    if let Some(limit) = args.daily_limit {
        run_cfg.daily_limit = limit;
    }

    let cancel = CancellationToken::new();
    let stop = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("stop requested; finishing the current contact (close the browser window to abort now)");
            stop.cancel();
        }
    });

    let sender = Sender::new(
        Arc::new(ChromeLauncher::from_config(&cfg)),
        CheckpointStore::new(&cfg.app.state_file),
        Arc::new(TracingSink),
    );
    let job = SendJob {
        contacts: args.contacts,
        template: args.template,
        image: args.image,
    };

    match sender.run(&job, &run_cfg, cancel).await {
        Ok(summary) => {
            info!(
                sent = summary.sent,
                skipped = summary.skipped,
                failed = summary.failed,
                next_index = summary.next_index,
                total = summary.total,
                "done"
            );
            if summary.end == RunEnd::DailyLimitReached {
                info!("daily limit reached; run again tomorrow to continue");
            }
            Ok(())
        }
        Err(err) => {
            error!(%err, config_error = err.is_config(), "run failed");
            Err(err.into())
        }
    }
}
