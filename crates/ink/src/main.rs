use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use ink::logging::init_logging;
use ink::{Area, Capabilities, HostError, HostServices, Ink, InkSettings, RequestContext, Response};
use ink_core::{ConfigError, Url};
use ink_notices::ActorId;
use ink_platform::AppPaths;

const DEFAULT_ADMIN_URL: &str = "http://localhost/admin/";

/// Run one privileged request cycle: follow an action link if asked, check
/// for updates, then print the notices an administrator would see.
#[derive(Parser, Debug)]
#[clap(name = "ink-tick", version)]
struct Cli {
    /// Settings file (defaults to settings.json in the config directory)
    #[clap(long)]
    settings: Option<PathBuf>,

    /// Follow the apply action link with a freshly minted token
    #[clap(long)]
    apply: bool,

    /// Identity the request is made as
    #[clap(long, default_value = "1")]
    actor: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("ink-tick: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), HostError> {
    let paths = AppPaths::new()?;
    let settings_path = cli.settings.unwrap_or_else(|| paths.settings_file());
    let settings = InkSettings::load(&settings_path)?;

    init_logging(&settings.logging, &paths);

    let services = HostServices::open(&paths)?;
    let ink = Ink::new(&settings, &paths, services)?;

    let actor = ActorId::new(cli.actor);
    let mut url = settings
        .landing_url
        .as_deref()
        .and_then(|raw| Url::parse(raw.trim()).ok())
        .or_else(|| Url::parse(DEFAULT_ADMIN_URL).ok())
        .ok_or_else(|| ConfigError::InvalidLandingUrl(DEFAULT_ADMIN_URL.to_string()))?;

    if cli.apply {
        match ink.pipeline() {
            Some(pipeline) => url = pipeline.action_link(&url, Some(&actor)),
            None => eprintln!("ink-tick: the updater is not configured; nothing to apply"),
        }
    }

    let mut ctx = admin_request(url, &actor);
    ink.handle(&mut ctx).await;

    if let Some(Response::Redirect(to)) = ctx.take_response() {
        println!("redirect: {to}");
        ctx = admin_request(to, &actor);
        ink.handle(&mut ctx).await;
    }

    match ctx.response() {
        Some(Response::Redirect(to)) => println!("redirect: {to}"),
        Some(Response::Halt { status, message }) => println!("halted ({status}): {message}"),
        Some(Response::Json(body)) => println!("{body}"),
        None => {}
    }
    for notice in &ctx.notices {
        println!("[{}] {}", notice.kind, notice.text);
    }

    Ok(())
}

fn admin_request(url: Url, actor: &ActorId) -> RequestContext {
    RequestContext::new(Area::Admin, url).with_actor(actor.clone(), Capabilities::administrator())
}
