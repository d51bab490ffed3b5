//! Artifact Signature CLI
//!
//! Usage:
//!   artifact-sig keygen <key-id>          - Add a key to the keyring
//!   artifact-sig sign <file>...           - Write detached signatures
//!   artifact-sig verify <file>...         - Check detached signatures
//!   artifact-sig batch <ops.json>         - Run a JSON operation list
//!   artifact-sig session <action>         - Multi-signature sessions
//!   artifact-sig stats                    - Service counters

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "artifact-sig")]
#[command(about = "Detached and multi-party signatures for release artifacts")]
#[command(version)]
pub struct Cli {
    /// JSON keyring file
    #[arg(long, env = "SIG_KEYRING", default_value = "keyring.json", global = true)]
    pub keyring: PathBuf,

    /// Root directory for session mirrors and archives
    #[arg(long, env = "SIG_SERVICE_SIGNATURES_DIR", global = true)]
    pub signatures_dir: Option<PathBuf>,

    /// JSON array of trusted hex public keys
    #[arg(long, env = "SIG_TRUST_FILE", global = true)]
    pub trust_file: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate a key and store it in the keyring
    Keygen {
        /// Key identifier
        key_id: String,
        /// Passphrase protecting the key
        #[arg(short, long, env = "SIG_PASSPHRASE")]
        passphrase: Option<String>,
        /// Make the new key the default signing key
        #[arg(long)]
        current: bool,
    },

    /// Sign one or more files
    Sign {
        /// Files to sign
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Key to sign with; the current key when omitted
        #[arg(short, long)]
        key_id: Option<String>,
        #[arg(short, long, env = "SIG_PASSPHRASE")]
        passphrase: Option<String>,
    },

    /// Verify detached signatures
    Verify {
        /// Files to verify
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Signature file, for a single input file
        #[arg(short, long)]
        signature: Option<PathBuf>,
        /// Hex public key overriding the keyring
        #[arg(long)]
        public_key: Option<String>,
        /// Skip the trust check
        #[arg(long)]
        no_trust: bool,
    },

    /// Execute a JSON list of batch operations
    Batch {
        /// File holding the operation list
        file: PathBuf,
        /// Number of concurrent groups
        #[arg(short, long)]
        concurrency: Option<usize>,
        /// Skip the rest of a group after its first failure
        #[arg(long)]
        stop_on_error: bool,
        /// Dedupe and group operations by kind
        #[arg(long)]
        optimize: bool,
        /// Passphrase applied to sign operations that carry none
        #[arg(short, long, env = "SIG_PASSPHRASE")]
        passphrase: Option<String>,
    },

    /// Multi-signature sessions
    Session {
        #[command(subcommand)]
        action: SessionCommands,
    },

    /// Show queue, recovery, batch and session counters
    Stats,
}

#[derive(Subcommand)]
pub enum SessionCommands {
    /// Open a session over a file
    Create {
        file: PathBuf,
        /// Signatures needed to complete
        #[arg(short, long)]
        min: Option<usize>,
        /// Key ids that must sign (comma separated or repeated)
        #[arg(short, long, value_delimiter = ',')]
        required: Vec<String>,
    },

    /// Sign the session's file with a key
    Add {
        session_id: String,
        #[arg(short, long)]
        key_id: String,
        #[arg(short, long, env = "SIG_PASSPHRASE")]
        passphrase: Option<String>,
    },

    /// Show a session's progress
    Status { session_id: String },

    /// List active sessions
    List,

    /// Close a session
    Close {
        session_id: String,
        #[arg(short, long, default_value = "manual")]
        reason: String,
    },

    /// Close every expired session
    Cleanup,

    /// Export a session as JSON or a text report
    Export {
        session_id: String,
        #[arg(short, long, default_value = "json")]
        format: String,
    },

    /// Re-verify every signature in a session
    Verify {
        session_id: String,
        #[arg(long)]
        no_trust: bool,
    },

    /// Aggregate session counters
    Stats,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing();

    if let Err(e) = commands::run_command(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "artifact_sig=info,artifact_signer=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
