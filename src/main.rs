use std::path::PathBuf;

use anyhow::{anyhow, bail, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{debug, error, info};
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use lineup_admin::sessions::{ListEvent, SessionList};
use lineup_admin::{
    AdminClient, ConfigManager, GateState, HistoryFilter, Session, SessionStatus, SessionWatch,
    WatchEvent,
};

#[derive(Debug, Parser)]
#[command(
    name = "lineup-admin",
    about = "Admin console for editor sessions",
    author,
    version = lineup_admin::VERSION,
    propagate_version = true
)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, env = "LINEUP_ADMIN_CONFIG_PATH", global = true)]
    config: Option<PathBuf>,

    /// Override the API base URL
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Complete a login from the URL the OAuth flow redirected to
    Login {
        #[arg(long)]
        callback: String,
    },
    /// Forget the stored credentials
    Logout,
    /// Check the stored session and print the principal
    Whoami,
    /// Start an editor session and follow it until it is ready
    Start {
        #[arg(long)]
        map: String,
        #[arg(long)]
        collection: String,
    },
    /// Follow a session until it ends
    Watch {
        /// Session id (defaults to the active session)
        #[arg(long)]
        id: Option<String>,
    },
    /// List running sessions
    Running {
        /// Keep polling and reprint on every change
        #[arg(long)]
        follow: bool,
    },
    /// Request termination of a session
    End { id: String },
    /// Browse past sessions
    History {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long)]
        status: Option<SessionStatus>,
        #[arg(long)]
        search: Option<String>,
    },
    /// Principals that used up their session allowance
    Exhausted,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file if it exists
    let env_file_path = dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            if cfg!(debug_assertions) {
                "lineup_admin=debug,warn".into()
            } else {
                "lineup_admin=info,warn".into()
            }
        }))
        .with(tracing_subscriber::fmt::layer().with_target(true).with_writer(std::io::stderr))
        .init();

    match env_file_path {
        Some(path) => info!("Loaded environment variables from {}", path.display()),
        None => debug!("No .env file found. Using existing environment variables."),
    };

    let cli = Cli::parse();

    let manager = match &cli.config {
        Some(path) => ConfigManager::with_path(path.clone()).await?,
        None => ConfigManager::new().await?,
    };
    let mut config = manager.get_config().await;
    if let Some(api_url) = cli.api_url {
        config.api.base_url = api_url;
    }
    config.validate()?;
    debug!(config_path = %manager.path().display(), "Configuration loaded");

    let client = AdminClient::new(&config);

    if let Err(e) = run(&client, cli.command, config.sessions.history_page_size).await {
        error!(error = %e, "Command failed");
        return Err(e);
    }
    Ok(())
}

async fn run(client: &AdminClient, command: Commands, page_size: u32) -> Result<()> {
    match command {
        Commands::Login { callback } => {
            let principal = client.login(&callback).await?;
            println!("Logged in as {} ({:?})", principal.display_name, principal.role);
            require_access(client).await?;
        }
        Commands::Logout => {
            client.store().hydrate().await?;
            client.logout().await?;
            println!("Logged out");
        }
        Commands::Whoami => {
            require_access(client).await?;
            if let Some(principal) = client.store().principal().await {
                println!("{} [{}] {:?}", principal.display_name, principal.id, principal.role);
            }
        }
        Commands::Start { map, collection } => {
            require_access(client).await?;
            let session = client.sessions().start_editor_session(&map, &collection).await?;
            print_session(&session);
            follow(client.sessions().watch_started(session), true).await?;
        }
        Commands::Watch { id } => {
            require_access(client).await?;
            let watch = match id {
                Some(id) => client.sessions().watch_session(&id),
                None => client.sessions().watch_active(),
            };
            follow(watch, false).await?;
        }
        Commands::Running { follow } => {
            require_access(client).await?;
            if follow {
                follow_running(client).await?;
            } else {
                let mut list = SessionList::new();
                list.apply_poll(client.sessions().get_running_sessions().await?);
                print_list(&list);
            }
        }
        Commands::End { id } => {
            require_access(client).await?;
            let ack = client.sessions().end_session(&id).await?;
            println!(
                "End requested for {}{}",
                id,
                ack.message.map(|m| format!(": {}", m)).unwrap_or_default()
            );
        }
        Commands::History {
            page,
            limit,
            status,
            search,
        } => {
            require_access(client).await?;
            let mut filter = HistoryFilter::new(page, limit.unwrap_or(page_size));
            if let Some(status) = status {
                filter = filter.status(status);
            }
            if let Some(search) = search {
                filter = filter.search(search);
            }
            let page = client.sessions().get_session_history(&filter).await?;
            for session in &page.items {
                print_session(session);
            }
            println!("page {}/{} ({} total)", page.page, page.total_pages(), page.total);
        }
        Commands::Exhausted => {
            require_access(client).await?;
            for user in client.sessions().get_exhausted_users().await? {
                println!(
                    "{:<24} {:>6}s / {:>6}s",
                    user.username.as_deref().unwrap_or(&user.user_id),
                    user.consumed_seconds,
                    user.limit_seconds
                );
            }
        }
    }
    Ok(())
}

/// Run the auth gate and refuse to continue unless it opens
async fn require_access(client: &AdminClient) -> Result<()> {
    match client.gate().activate().await {
        GateState::Authorized(_) => Ok(()),
        GateState::RedirectToLogin => bail!("Not logged in. Run `lineup-admin login --callback <url>`"),
        GateState::Unauthorized => bail!("This account is not allowed to use the admin console"),
        GateState::Failed(reason) => Err(anyhow!("Could not verify the session: {}", reason)),
        GateState::Loading => Err(anyhow!("Session check did not complete")),
    }
}

/// Print watch events until the watch ends or the user interrupts.
/// With `until_ready`, returns as soon as connection details are known.
async fn follow(mut watch: SessionWatch, until_ready: bool) -> Result<()> {
    loop {
        let event = tokio::select! {
            event = watch.next() => Some(event),
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(event) = event else {
            watch.stop();
            return Ok(());
        };

        match event {
            Some(WatchEvent::Updated(session)) => {
                print_session(&session);
                if until_ready && session.connection().is_some() {
                    watch.stop();
                    return Ok(());
                }
            }
            Some(WatchEvent::Finished(session)) => {
                print_session(&session);
                return Ok(());
            }
            Some(WatchEvent::Gone) => {
                println!("No session");
                return Ok(());
            }
            Some(WatchEvent::Failed(e)) if e.is_auth() => return Err(e.into()),
            Some(WatchEvent::Failed(e)) => eprintln!("poll failed: {}", e),
            None => return Ok(()),
        }
    }
}

async fn follow_running(client: &AdminClient) -> Result<()> {
    let mut watch = client.sessions().watch_running();
    let mut list = SessionList::new();
    loop {
        let event = tokio::select! {
            event = watch.next() => Some(event),
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(event) = event else {
            client.sessions().stop_watching(watch);
            return Ok(());
        };

        match event {
            Some(ListEvent::Snapshot(sessions)) => {
                list.apply_poll(sessions);
                print_list(&list);
            }
            Some(ListEvent::Failed(e)) if e.is_auth() => return Err(e.into()),
            Some(ListEvent::Failed(e)) => eprintln!("poll failed: {}", e),
            None => return Ok(()),
        }
    }
}

fn print_session(session: &Session) {
    let mut line = format!("{} {:<12} {}", session.id, session.status.as_str(), session.map_name);
    if let Some(position) = session.queue_position() {
        line.push_str(&format!(" (queue #{})", position));
    }
    if let Some(connection) = session.connection() {
        line.push_str(&format!(" | {}", connection.connect_command()));
    }
    if let Some(label) = session.termination_label() {
        line.push_str(&format!(" | {}", label));
    }
    if !session.is_terminal() {
        line.push_str(&format!(" | {}s left", session.seconds_remaining(Utc::now())));
    }
    println!("{}", line);
}

fn print_list(list: &SessionList) {
    println!("{} running", list.len());
    for row in list.rows() {
        print!("{}", if row.ending_requested { "* " } else { "  " });
        print_session(&row.session);
    }
}
