use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "weekblock")]
#[command(about = "Plan weekly task sessions and mirror them to Google Calendar")]
pub struct Cli {
    /// Workspace holding config/, state/ and logs/ (defaults to the current directory)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the workspace layout and default config
    Bootstrap,
    /// List week modes
    Modes,
    /// Show templates of the active mode with used/remaining sessions
    Templates,
    /// Request a switch to another week mode
    SelectMode { mode_id: String },
    /// Confirm the pending switch; clears placed sessions
    ConfirmMode,
    CancelMode,
    /// Create a week mode, or edit one with --edit
    SaveMode {
        name: String,

        #[arg(long)]
        sessions: u32,

        /// Id of the mode to edit
        #[arg(long)]
        edit: Option<String>,
    },
    /// Create a template in the active mode, or edit one with --edit
    SaveTemplate {
        title: String,

        /// Sessions per week
        #[arg(long)]
        sessions: u32,

        /// Minutes per session (default 30)
        #[arg(long)]
        duration: Option<u32>,

        #[arg(long)]
        edit: Option<String>,
    },
    /// Select the template used by `place` when --template is omitted
    SelectTemplate { template_id: String },
    /// Place a session at a local slot start (e.g. "2026-02-16T09:00")
    Place {
        slot: String,

        #[arg(short, long)]
        template: Option<String>,
    },
    /// Move or resize a placed session
    Move {
        event_id: String,

        #[arg(long)]
        start: String,

        #[arg(long)]
        end: String,
    },
    Delete { event_id: String },
    /// Remove every placed session; calendar events stay
    Clear,
    Events,
    /// Store an access token and load calendar events
    Connect {
        access_token: String,

        /// Seconds until the token expires
        #[arg(long)]
        expires_in: Option<i64>,
    },
    Refresh,
    /// Forget the token and hide calendar events
    Disconnect,
    /// Forget the token and remove all events
    Logout,
    /// Create remotely the sessions that failed to sync
    PushPending,
    /// Check the calendar session periodically
    Watch {
        /// Stop after this many checks
        #[arg(long)]
        checks: Option<u64>,
    },
    Notifications {
        /// Remove the notifications after printing them
        #[arg(long)]
        clear: bool,
    },
}
