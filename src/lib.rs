pub mod application;
mod cli;
pub mod domain;
pub mod infrastructure;

use application::bootstrap::bootstrap_workspace;
use application::commands::{
    cancel_mode_impl, clear_sessions_impl, confirm_mode_impl, connect_impl,
    delete_session_impl, disconnect_impl, list_events_impl, list_modes_impl, logout_impl,
    move_session_impl, notifications_impl, place_session_impl, push_pending_impl, refresh_impl,
    save_mode_impl, save_template_impl, select_mode_impl, select_template_impl,
    watch_session_impl, week_summary_impl, AppState,
};
use clap::Parser;
use cli::{Cli, Commands};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Debug, Serialize)]
struct BootstrapResponse {
    workspace_root: String,
    database_path: String,
    timezone: String,
}

fn bootstrap(root: &Path) -> Result<BootstrapResponse, String> {
    let result =
        bootstrap_workspace(root, |key| std::env::var(key).ok()).map_err(|error| error.to_string())?;
    Ok(BootstrapResponse {
        workspace_root: root.display().to_string(),
        database_path: result.database_path.display().to_string(),
        timezone: result.config.timezone.name().to_string(),
    })
}

fn render<T: Serialize>(value: T) -> Result<String, String> {
    serde_json::to_string_pretty(&value).map_err(|error| error.to_string())
}

async fn execute(
    state: &AppState,
    workspace_root: &Path,
    command: Commands,
) -> Result<String, String> {
    match command {
        Commands::Bootstrap => render(bootstrap(workspace_root)?),
        Commands::Modes => {
            render(list_modes_impl(state).map_err(|error| state.command_error("modes", &error))?)
        }
        Commands::Templates => render(
            week_summary_impl(state).map_err(|error| state.command_error("templates", &error))?,
        ),
        Commands::SelectMode { mode_id } => render(
            select_mode_impl(state, mode_id)
                .map_err(|error| state.command_error("select_mode", &error))?,
        ),
        Commands::ConfirmMode => render(
            confirm_mode_impl(state)
                .await
                .map_err(|error| state.command_error("confirm_mode", &error))?,
        ),
        Commands::CancelMode => render(
            cancel_mode_impl(state).map_err(|error| state.command_error("cancel_mode", &error))?,
        ),
        Commands::SaveMode {
            name,
            sessions,
            edit,
        } => render(
            save_mode_impl(state, edit, name, sessions)
                .map_err(|error| state.command_error("save_mode", &error))?,
        ),
        Commands::SaveTemplate {
            title,
            sessions,
            duration,
            edit,
        } => render(
            save_template_impl(state, edit, title, sessions, duration)
                .map_err(|error| state.command_error("save_template", &error))?,
        ),
        Commands::SelectTemplate { template_id } => render(
            select_template_impl(state, template_id)
                .map_err(|error| state.command_error("select_template", &error))?,
        ),
        Commands::Place { slot, template } => render(
            place_session_impl(state, template, slot)
                .await
                .map_err(|error| state.command_error("place_session", &error))?,
        ),
        Commands::Move {
            event_id,
            start,
            end,
        } => render(
            move_session_impl(state, event_id, start, end)
                .await
                .map_err(|error| state.command_error("move_session", &error))?,
        ),
        Commands::Delete { event_id } => render(
            delete_session_impl(state, event_id)
                .await
                .map_err(|error| state.command_error("delete_session", &error))?,
        ),
        Commands::Clear => render(
            clear_sessions_impl(state)
                .await
                .map_err(|error| state.command_error("clear_sessions", &error))?,
        ),
        Commands::Events => {
            render(list_events_impl(state).map_err(|error| state.command_error("events", &error))?)
        }
        Commands::Connect {
            access_token,
            expires_in,
        } => render(
            connect_impl(state, access_token, expires_in)
                .await
                .map_err(|error| state.command_error("connect", &error))?,
        ),
        Commands::Refresh => render(
            refresh_impl(state)
                .await
                .map_err(|error| state.command_error("refresh", &error))?,
        ),
        Commands::Disconnect => render(
            disconnect_impl(state).map_err(|error| state.command_error("disconnect", &error))?,
        ),
        Commands::Logout => {
            render(logout_impl(state).map_err(|error| state.command_error("logout", &error))?)
        }
        Commands::PushPending => render(
            push_pending_impl(state)
                .await
                .map_err(|error| state.command_error("push_pending", &error))?,
        ),
        Commands::Watch { checks } => render(
            watch_session_impl(state, checks)
                .await
                .map_err(|error| state.command_error("watch_session", &error))?,
        ),
        Commands::Notifications { clear } => render(
            notifications_impl(state, clear)
                .map_err(|error| state.command_error("notifications", &error))?,
        ),
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let workspace_root = match cli.root {
        Some(path) => path,
        None => match std::env::current_dir() {
            Ok(path) => path,
            Err(error) => return fail(&format!("failed to resolve current directory: {error}")),
        },
    };

    match run_command(workspace_root, cli.command) {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(message) => fail(&message),
    }
}

fn run_command(workspace_root: PathBuf, command: Commands) -> Result<String, String> {
    let state = AppState::new(workspace_root.clone())
        .map_err(|error| format!("failed to initialize app state: {error}"))?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|error| format!("failed to start async runtime: {error}"))?;
    runtime.block_on(execute(&state, &workspace_root, command))
}

fn fail(message: &str) -> ExitCode {
    eprintln!("error: {message}");
    ExitCode::FAILURE
}
