use anyhow::anyhow;
use serde_json::{json, Value};
use shopdesk::models::{ApplicationEvent, OrderEvent};
use shopdesk::render::order_link;
use shopdesk::supplier::{supplier_name, ImportStatus};
use shopdesk::{
    dashboard, ApiError, ChargeStep, ConversationStore, CredentialStore, DashboardRange, Identity,
    LoginStep, RequestMethod, SessionClient,
};
use shopdesk_cli::*;

use colored_json::to_colored_json_auto;
use log::{self, debug};
use std::io::Write;
use structopt::StructOpt;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

#[derive(StructOpt)]
#[structopt(
    rename_all = "kebab-case",
    about = "CLI for storefront staff: orders, applications, dashboard and supplier imports"
)]
struct Opt {
    /// Base URL of the storefront backend API
    #[structopt(global = true, long = "--api-url", env = "SHOPDESK_API_URL")]
    api_url: Option<String>,

    /// File path of the sqlite database holding staff credentials (shared with the webhook
    /// listener)
    #[structopt(
        parse(from_os_str),
        global = true,
        long = "--db",
        env = "SHOPDESK_DB",
        default_value = "shopdesk_credentials.sqlite"
    )]
    db_path: std::path::PathBuf,

    /// Staff identity (chat id) to act as
    #[structopt(global = true, long, short = "i", env = "SHOPDESK_IDENTITY")]
    identity: Option<Identity>,

    /// Prefix of storefront order pages; the order's unique token is appended
    #[structopt(
        global = true,
        long,
        env = "SHOPDESK_ORDER_URL",
        default_value = "https://ass74.ru/order/"
    )]
    order_url: String,

    /// Print raw JSON responses instead of formatted summaries
    #[structopt(global = true, long)]
    json: bool,

    /// Log more messages. Pass multiple times for ever more verbosity
    ///
    /// By default, it'll only report errors. Passing `-v` one time also prints
    /// warnings, `-vv` enables info logging, `-vvv` debug, and `-vvvv` trace.
    #[structopt(global = true, long, short = "v", parse(from_occurrences))]
    verbose: i8,

    #[structopt(long = "--shell-completions", hidden = true)]
    shell_completions: Option<structopt::clap::Shell>,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(StructOpt)]
enum Command {
    /// Log in with backend staff credentials and store the tokens for this identity
    Login {
        #[structopt(long, short)]
        email: String,

        #[structopt(long, short, env = "SHOPDESK_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Forget stored credentials for this identity
    Logout,

    /// Summarize configuration and authorization state
    Status,

    /// List all identities with stored credentials
    Authorized,

    Orders {
        #[structopt(long, default_value = "1")]
        page: u32,
    },

    Order {
        id: u64,
    },

    /// List feedback applications
    Applications {
        #[structopt(long, default_value = "1")]
        page: u32,
    },

    Application {
        id: u64,
    },

    /// Sales figures for one of: current-month, last-2-months, last-3-months, last-6-months,
    /// last-year
    Dashboard {
        #[structopt(default_value = "current-month")]
        range: DashboardRange,
    },

    /// List suppliers whose imports can be managed
    Suppliers,

    /// Show a supplier's markup and latest import runs
    SupplierImport {
        slug: String,
    },

    /// Set a supplier's markup, eg "1.15" or "1,15"; must be at least 1
    SupplierCharge {
        slug: String,
        value: String,
    },

    /// Raw bearer-authenticated call. Query fields are 'key==value', body fields 'key=value'
    Request {
        method: RequestMethod,
        path: String,
        fields: Vec<ArgField>,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let opt = Opt::from_args();

    let log_level = match opt.verbose {
        std::i8::MIN..=-1 => "none",
        0 => "error",
        1 => "warn",
        2 => "info",
        3 => "debug",
        4..=std::i8::MAX => "trace",
    };
    // hyper logging is very verbose, so crank that down even if everything else is more verbose
    let log_filter = format!("{},hyper=error", log_level);
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_filter))
        .format_timestamp(None)
        .init();

    debug!("Args parsed, starting up");

    #[cfg(windows)]
    colored_json::enable_ansi_support();

    if let Some(shell) = opt.shell_completions {
        Opt::clap().gen_completions_to("shopdesk", shell, &mut std::io::stdout());
        std::process::exit(0);
    }

    let runtime = tokio::runtime::Runtime::new()?;
    if let Err(err) = runtime.block_on(run(opt)) {
        // Be graceful about some errors
        if let Some(io_err) = err.root_cause().downcast_ref::<std::io::Error>() {
            if let std::io::ErrorKind::BrokenPipe = io_err.kind() {
                // presumably due to something like writing to stdout and piped to `head -n10` and
                // stdout was closed
                debug!("got BrokenPipe error, assuming stdout closed as expected and exiting with success");
                std::process::exit(0);
            }
        }
        let mut color_stderr = StandardStream::stderr(if atty::is(atty::Stream::Stderr) {
            ColorChoice::Auto
        } else {
            ColorChoice::Never
        });
        color_stderr.set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true))?;
        eprintln!("Error: {:?}", err);
        color_stderr.set_color(&ColorSpec::new())?;
        if let Some(api_err) = err.downcast_ref::<ApiError>() {
            if api_err.requires_login() {
                eprintln!("Log in again with: shopdesk login --email <email>");
            }
        }
        std::process::exit(1);
    }
    Ok(())
}

fn print_result_json(result: Option<Value>) -> Result<()> {
    if let Some(val) = result {
        writeln!(&mut std::io::stdout(), "{}", to_colored_json_auto(&val)?)?
    };
    Ok(())
}

fn require_identity(identity: Option<Identity>) -> Result<Identity> {
    identity.ok_or(anyhow!(
        "expected an identity (--identity or SHOPDESK_IDENTITY)"
    ))
}

async fn run(opt: Opt) -> Result<()> {
    let store = CredentialStore::open(&opt.db_path)?;

    // commands that only touch the local credential store
    match opt.cmd {
        Command::Status => {
            println!("Configuration");
            println!(
                "  SHOPDESK_API_URL: {}",
                opt.api_url.as_deref().unwrap_or("")
            );
            println!("  SHOPDESK_DB: {}", opt.db_path.display());
            match opt.identity {
                Some(identity) => {
                    println!("  SHOPDESK_IDENTITY: {}", identity);
                    let authorized = store.is_authorized(identity).await?;
                    println!("Authorized: {}", if authorized { "yes" } else { "no" });
                }
                None => println!("  SHOPDESK_IDENTITY:"),
            }
            return Ok(());
        }
        Command::Authorized => {
            let identities = store.list_authorized().await?;
            if opt.json {
                return print_result_json(Some(json!(identities)));
            }
            for identity in identities {
                println!("{}", identity);
            }
            return Ok(());
        }
        Command::Suppliers => {
            if opt.json {
                let list: Vec<Value> = shopdesk::supplier::KNOWN_SUPPLIERS
                    .iter()
                    .map(|(slug, name)| json!({"slug": slug, "name": name}))
                    .collect();
                return print_result_json(Some(Value::Array(list)));
            }
            return pretty::pp_suppliers();
        }
        _ => (),
    }

    let api_url = opt
        .api_url
        .clone()
        .ok_or(anyhow!("expected a backend URL (--api-url or SHOPDESK_API_URL)"))?;
    let identity = require_identity(opt.identity)?;
    let client = SessionClient::new(&api_url, store)?;

    let result = match opt.cmd {
        Command::Login { email, password } => {
            let convo = ConversationStore::default();
            convo.start_login(identity);
            convo.submit_login(identity, &email);
            match convo.submit_password(identity, &password, &client).await? {
                LoginStep::Authorized => {
                    println!("Logged in; identity {} is authorized", identity);
                    None
                }
                LoginStep::Rejected => return Err(anyhow!("login refused, check email and password")),
                step => return Err(anyhow!("login did not complete: {:?}", step)),
            }
        }
        Command::Logout => {
            if client.logout(identity).await? {
                println!("Logged out identity {}", identity);
            } else {
                println!("Identity {} was not logged in", identity);
            }
            None
        }
        Command::Orders { page } => {
            let page = client.list_orders(identity, page).await?;
            if opt.json {
                Some(serde_json::to_value(&page)?)
            } else {
                pretty::pp_order_page(&page)?;
                None
            }
        }
        Command::Order { id } => {
            let resp = client.order_detail(identity, id).await?;
            match serde_json::from_value::<OrderEvent>(resp.clone()) {
                Ok(order) if !opt.json => {
                    let link = order_link(&opt.order_url, &order.detail);
                    pretty::pp_order(&order.detail, &link.url)?;
                    None
                }
                _ => Some(resp),
            }
        }
        Command::Applications { page } => {
            let page = client.list_applications(identity, page).await?;
            if opt.json {
                Some(serde_json::to_value(&page)?)
            } else {
                pretty::pp_application_page(&page)?;
                None
            }
        }
        Command::Application { id } => {
            let resp = client.application_detail(identity, id).await?;
            match serde_json::from_value::<ApplicationEvent>(resp.clone()) {
                Ok(app) if !opt.json => {
                    pretty::pp_application(&app)?;
                    None
                }
                _ => Some(resp),
            }
        }
        Command::Dashboard { range } => {
            let span = range.span_ending_today()?;
            let resp = client.dashboard(identity, &span).await?;
            if opt.json {
                Some(resp)
            } else {
                pretty::pp_indicators(range, &span, &dashboard::indicators(&resp))?;
                None
            }
        }
        Command::SupplierImport { slug } => {
            supplier_name(&slug).ok_or(anyhow!("unknown supplier: {} (see `suppliers`)", slug))?;
            let resp = client.supplier_import(identity, &slug).await?;
            if opt.json {
                Some(resp)
            } else {
                pretty::pp_import_status(&ImportStatus::from_value(&resp))?;
                None
            }
        }
        Command::SupplierCharge { slug, value } => {
            supplier_name(&slug).ok_or(anyhow!("unknown supplier: {} (see `suppliers`)", slug))?;
            let convo = ConversationStore::default();
            convo.start_charge_edit(identity, &slug);
            match convo.submit_extra_charge(identity, &value, &client).await? {
                ChargeStep::Updated {
                    supplier_slug,
                    extra_charge,
                    response,
                } => {
                    if opt.json {
                        Some(response)
                    } else {
                        println!(
                            "Extra charge for {} updated to {}",
                            supplier_slug, extra_charge
                        );
                        None
                    }
                }
                ChargeStep::InvalidValue(msg) => return Err(anyhow!(msg)),
                ChargeStep::NotStarted => return Err(anyhow!("extra charge edit was not started")),
            }
        }
        Command::Request {
            method,
            path,
            fields,
        } => {
            let query = query_from_fields(&fields);
            let body = value_from_fields(fields);
            Some(
                client
                    .request(identity, method.into(), &path, query, body.as_ref())
                    .await?,
            )
        }
        Command::Status | Command::Authorized | Command::Suppliers => None,
    };
    print_result_json(result)?;
    Ok(())
}
