use anyhow::Result;
use shopdesk::{CredentialStore, TelegramNotifier};
use shopdesk_hooks::*;
use std::sync::Arc;

use log::{self, debug, info};
use structopt::StructOpt;

#[derive(StructOpt)]
#[structopt(
    rename_all = "kebab-case",
    about = "receives storefront order and feedback webhooks and notifies authorized staff"
)]
struct Opt {
    /// File path of the sqlite database holding staff credentials (shared with the CLI)
    #[structopt(
        parse(from_os_str),
        long = "--db",
        env = "SHOPDESK_DB",
        default_value = "shopdesk_credentials.sqlite"
    )]
    db_path: std::path::PathBuf,

    /// Telegram bot token used to send notifications
    #[structopt(long, env = "SHOPDESK_BOT_TOKEN", hide_env_values = true)]
    bot_token: String,

    /// Base URL of the Telegram bot API
    #[structopt(long, env = "SHOPDESK_BOT_API", default_value = "https://api.telegram.org")]
    bot_api: String,

    /// Prefix of storefront order pages; the order's unique token is appended
    #[structopt(long, env = "SHOPDESK_ORDER_URL", default_value = "https://ass74.ru/order/")]
    order_url: String,

    #[structopt(long, default_value = "127.0.0.1")]
    host: String,

    #[structopt(long, default_value = "5000")]
    port: u16,

    /// Log more messages. Pass multiple times for ever more verbosity
    #[structopt(long, short = "v", parse(from_occurrences))]
    verbose: i8,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let opt = Opt::from_args();

    let log_level = match opt.verbose {
        std::i8::MIN..=-1 => "none",
        0 => "info",
        1 => "debug",
        2..=std::i8::MAX => "trace",
    };
    // hyper logging is very verbose, so crank that down even if everything else is more verbose
    let cli_filter = format!("{},hyper=error", log_level);
    // defer to env var config, fallback to CLI settings
    let log_filter = std::env::var("RUST_LOG").unwrap_or(cli_filter);
    pretty_env_logger::formatted_timed_builder()
        .parse_filters(&log_filter)
        .init();

    debug!("config parsed, starting up");

    // server threads are plain OS threads; async work (store access, deliveries) runs here
    let runtime = tokio::runtime::Runtime::new()?;
    let store = CredentialStore::open(&opt.db_path)?;
    info!("credential store: {}", opt.db_path.display());
    let notifier = TelegramNotifier::new(&opt.bot_api, &opt.bot_token)?;

    let ctx = HookContext {
        store,
        notifier: Arc::new(notifier),
        runtime: runtime.handle().clone(),
        order_url: opt.order_url,
    };
    run_server(&opt.host, opt.port, ctx)
}
