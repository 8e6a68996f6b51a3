/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! `mcp-terminal` - CLI entry point wiring every crate in the workspace
//! into the `chat`/`history`/`user`/`machine` surface described in spec
//! §6. See `DESIGN.md` for the rustyline/crossterm split this binary
//! introduces for the interactive loop.

mod ai;
mod chat;
mod commands;
mod config;
mod paths;
mod patterns;
mod shell;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::Config;
use event_bus::EventBus;
use history_view::HistoryView;
use identity::{register_machine, resolve_user, MachineInfo};
use local_store::LocalStore;
use remote_store::{RemoteStore, RemoteStoreError, RemoteStoreHandle};
use request_controller::RequestController;
use std::sync::{Arc, Mutex as StdMutex};
use sync_engine::SyncEngine;

/// Exit codes per spec §6: 0 normal, 1 fatal init, 2 schema missing, 130
/// user-interrupt. Returned via `std::process::exit`, never `panic!`.
const EXIT_OK: i32 = 0;
const EXIT_FATAL_INIT: i32 = 1;
const EXIT_SCHEMA_MISSING: i32 = 2;
const EXIT_USER_INTERRUPT: i32 = 130;

#[derive(Parser)]
#[command(name = "mcp-terminal", about = "Terminal AI assistant", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Verbose logging; equivalent to `RUST_LOG=debug` or `DEBUG=1`.
    #[arg(long, short, global = true, action = clap::ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Main interactive session.
    Chat {
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        debug: bool,
    },
    /// Browse or search history.
    History {
        #[arg(long, default_value_t = 20)]
        limit: i64,
        #[arg(long)]
        search: Option<String>,
        #[arg(long, default_value = "hybrid")]
        scope: String,
    },
    /// Admin user management.
    User {
        #[command(subcommand)]
        action: UserCommand,
    },
    /// Local machine record.
    Machine {
        #[command(subcommand)]
        action: MachineCommand,
    },
}

#[derive(Subcommand)]
enum UserCommand {
    Create {
        username: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    List,
    Stats {
        username: String,
    },
    Delete {
        username: String,
    },
    Reactivate {
        username: String,
    },
}

#[derive(Subcommand)]
enum MachineCommand {
    Info,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start the async runtime: {e}");
            std::process::exit(EXIT_FATAL_INIT);
        }
    };

    std::process::exit(runtime.block_on(run(cli)));
}

fn init_logging(verbose: bool) {
    let default_level = if verbose || config::debug_env_set() {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();
}

async fn run(cli: Cli) -> i32 {
    let base = match paths::base_dir() {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("fatal: {e:#}");
            return EXIT_FATAL_INIT;
        }
    };

    let setup = match initialize(&base).await {
        Ok(setup) => setup,
        Err(InitError::SchemaMissing) => {
            eprintln!("fatal: remote schema is missing required tables");
            return EXIT_SCHEMA_MISSING;
        }
        Err(InitError::Other(e)) => {
            eprintln!("fatal: {e:#}");
            return EXIT_FATAL_INIT;
        }
    };

    let _sync_task = setup.sync_engine.clone().spawn_periodic(std::time::Duration::from_secs(
        setup.config.sync_interval.unwrap_or(30),
    ));

    let command = cli.command.unwrap_or(Command::Chat { user: None, debug: false });
    match command {
        Command::Chat { user, .. } => match run_chat(&setup, user).await {
            Ok(true) => EXIT_USER_INTERRUPT,
            Ok(false) => EXIT_OK,
            Err(e) => {
                eprintln!("error: {e:#}");
                EXIT_FATAL_INIT
            }
        },
        Command::History { limit, search, scope } => exit_for(
            commands::history::run(
                &setup.history_view,
                commands::history::HistoryArgs {
                    limit,
                    search,
                    scope,
                    user_id: setup.user_id,
                    machine_id: Some(setup.machine_id.clone()),
                },
            )
            .await,
        ),
        Command::User { action } => exit_for(run_user_command(&setup.remote, action).await),
        Command::Machine { action: MachineCommand::Info } => {
            exit_for(commands::machine::run(&setup.local.lock().unwrap(), &setup.machine_id))
        }
    }
}

fn exit_for(result: Result<()>) -> i32 {
    match result {
        Ok(()) => EXIT_OK,
        Err(e) => {
            eprintln!("error: {e:#}");
            EXIT_FATAL_INIT
        }
    }
}

async fn run_chat(setup: &Setup, user_override: Option<String>) -> Result<bool> {
    let user_id = match user_override.or_else(config::user_override) {
        Some(username) => {
            let handle = RemoteStoreHandle(Arc::clone(&setup.remote));
            Some(resolve_user(&handle, &username)?.id)
        }
        None => setup.user_id,
    };

    let controller = Arc::new(RequestController::new(
        Arc::clone(&setup.local),
        Arc::clone(&setup.remote),
        Arc::new(ai::NullAiProvider),
        setup.events.clone(),
        Some(Arc::new(patterns::builtin_planner())),
        Some(Arc::new(shell::TokioShellRunner)),
        remote_store::Scope::Hybrid,
        setup.session_id.clone(),
        user_id,
        Some(setup.machine_id.clone()),
    ));

    chat::run(controller, Arc::clone(&setup.history_view)).await
}

async fn run_user_command(remote: &RemoteStore, action: UserCommand) -> Result<()> {
    let args = match action {
        UserCommand::Create { username, name, email } => commands::user::UserArgs::Create { username, name, email },
        UserCommand::List => commands::user::UserArgs::List,
        UserCommand::Stats { username } => commands::user::UserArgs::Stats { username },
        UserCommand::Delete { username } => commands::user::UserArgs::Delete { username },
        UserCommand::Reactivate { username } => commands::user::UserArgs::Reactivate { username },
    };
    commands::user::run(remote, args).await
}

struct Setup {
    local: Arc<StdMutex<LocalStore>>,
    remote: Arc<RemoteStore>,
    history_view: Arc<HistoryView>,
    sync_engine: Arc<SyncEngine>,
    events: EventBus,
    machine_id: String,
    user_id: Option<i64>,
    session_id: String,
    config: Config,
}

enum InitError {
    SchemaMissing,
    Other(anyhow::Error),
}

impl From<anyhow::Error> for InitError {
    fn from(e: anyhow::Error) -> Self {
        InitError::Other(e)
    }
}

async fn initialize(base: &std::path::Path) -> std::result::Result<Setup, InitError> {
    let config = Config::load(&paths::config_path(base)).context("loading turso-config.json")?;

    let machine_id = identity::machine_id(&paths::machine_id_path(base)).context("generating machine id")?;

    let local = LocalStore::open(paths::cache_db_path(base)).context("opening local store")?;
    let info = MachineInfo::gather(machine_id.clone());
    register_machine(&local, &info).context("registering machine")?;
    let local = Arc::new(StdMutex::new(local));

    let remote_config = config
        .remote_config()
        .context("no remote database configured (set REMOTE_DB_URL or turso-config.json)")?;
    let remote = match RemoteStore::connect_with_config(&remote_config).await {
        Ok(store) => Arc::new(store),
        Err(RemoteStoreError::SchemaMissing(tables)) => {
            log::error!("remote schema missing tables: {tables:?}");
            return Err(InitError::SchemaMissing);
        }
        Err(e) => return Err(InitError::Other(anyhow::anyhow!("connecting to remote store: {e}"))),
    };

    let events = EventBus::default();
    let history_view = Arc::new(HistoryView::new(Arc::clone(&local), Arc::clone(&remote)));
    let sync_engine = Arc::new(SyncEngine::new(Arc::clone(&local), Arc::clone(&remote), events.clone()));

    let session_id = uuid::Uuid::new_v4().to_string();

    Ok(Setup {
        local,
        remote,
        history_view,
        sync_engine,
        events,
        machine_id,
        user_id: None,
        session_id,
        config,
    })
}
