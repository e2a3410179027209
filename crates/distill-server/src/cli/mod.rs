// crates/distill-server/src/cli/mod.rs
// CLI surface: hook dispatch for the host, operator commands for humans

use clap::{Parser, Subcommand};

pub mod ops;

pub use ops::{run_annotate, run_inspect, run_search, run_sessions, run_status};

#[derive(Parser)]
#[command(name = "distill")]
#[command(about = "Session-scoped context distiller for coding-assistant hooks")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Host hook handlers (read JSON on stdin, write JSON on stdout)
    Hook {
        #[command(subcommand)]
        action: HookAction,
    },

    /// List known session databases
    Sessions,

    /// Show prompt index and entry counts for a session
    Status {
        /// Session id (as sent by the host)
        session_id: String,
    },

    /// Print recent entries and links of a session
    Inspect {
        /// Session id
        session_id: String,

        /// Number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Run the retrieval query path against a session and print the hits
    Search {
        /// Session id
        session_id: String,

        /// Query text (tokenized like a user prompt)
        query: String,
    },

    /// LLM annotation pass for one turn (spawned detached by the Stop hook)
    Annotate {
        /// Session id
        session_id: String,

        /// Turn to annotate
        prompt_index: i64,
    },
}

#[derive(Subcommand)]
pub enum HookAction {
    /// Handle SessionStart - create/open the session database
    SessionStart,
    /// Handle UserPromptSubmit - bump the turn counter, inject context
    UserPrompt,
    /// Handle PostToolUse - buffer the tool call
    PostTool,
    /// Handle Stop - fold the buffer into entries and annotate
    Stop,
}
