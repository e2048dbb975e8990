use anyhow::Result;
use clap::Parser;
use std::fs;
use std::path::PathBuf;

use wa_bulk_sender::checkpoint::CheckpointStore;
use wa_bulk_sender::config::App as AppCfg;
use wa_bulk_sender::contacts::{self, normalize_phone};
use wa_bulk_sender::render;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Print what a run would send, without opening a browser"
)]
struct Args {
    /// Path to YAML config file (reads only `app`)
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Contacts spreadsheet or .csv
    #[arg(long)]
    contacts: PathBuf,

    /// Message template
    #[arg(long)]
    template: Option<PathBuf>,

    /// Print at most this many contacts
    #[arg(long)]
    limit: Option<usize>,
}

#[derive(Debug, serde::Deserialize)]
struct AppOnlyConfig {
    app: AppCfg,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let raw = fs::read_to_string(&args.config)?;
    let cfg: AppOnlyConfig = serde_yaml::from_str(&raw)?;
    let state = CheckpointStore::new(&cfg.app.state_file).load();
    let list = contacts::load(&args.contacts)?;
    let template = render::load_template(args.template.as_deref())?;

    println!(
        "checkpoint: last_index={} last_sent_date={} sent_today={}",
        state.last_index,
        state
            .last_sent_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".into()),
        state.sent_today
    );
    println!("contacts: {}", list.len());

    let shown = args.limit.unwrap_or(list.len());
    for (i, contact) in list.iter().enumerate().take(shown) {
        let marker = if i == state.last_index { ">" } else { " " };
        let phone = normalize_phone(&contact.phone).unwrap_or_else(|| format!("INVALID({:?})", contact.phone));
        let message = render::message_for(contact, &template);
        println!("{}[{}] {} <{}>: {}", marker, i, contact.name, phone, message.replace('\n', "\\n"));
    }
    Ok(())
}
