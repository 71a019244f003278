use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use trilan_core::{CategoryKind, Collection};

#[derive(Parser)]
#[command(name = "trilan")]
#[command(about = "Keep a Chinese / English / Korean glossary from the command line")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// CLI profile name for cloud auth/sync configuration
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Add a dictionary word or a phrase
    #[command(alias = "new")]
    Add {
        /// Where the entry goes
        #[arg(value_enum)]
        kind: EntryKind,
        #[command(flatten)]
        fields: EntryFields,
        /// Category ID
        #[arg(long, value_name = "ID")]
        category: Option<i64>,
    },
    /// Manage categories
    Category {
        #[command(subcommand)]
        command: CategoryCommands,
    },
    /// List dictionary words or phrases
    List {
        #[arg(value_enum)]
        kind: EntryKind,
        /// Only show entries in this category
        #[arg(long, value_name = "ID")]
        category: Option<i64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Search one collection in all four languages
    Search {
        #[arg(value_enum)]
        kind: EntryKind,
        /// Search query
        query: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Search dictionary and phrases together
    Lookup {
        /// Text in any of the four languages
        query: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit an entry; opens $EDITOR when no field is given
    Edit {
        #[arg(value_enum)]
        kind: EntryKind,
        /// Entry ID
        id: i64,
        #[command(flatten)]
        fields: EntryFields,
        /// Move the entry to this category
        #[arg(long, value_name = "ID", conflicts_with = "uncategorize")]
        category: Option<i64>,
        /// Remove the entry from its category
        #[arg(long)]
        uncategorize: bool,
    },
    /// Delete an entry
    Delete {
        #[arg(value_enum)]
        kind: EntryKind,
        /// Entry ID
        id: i64,
    },
    /// Export a full backup as JSON
    Export {
        /// Output file or directory (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Replace all local data with a backup file
    Import {
        /// Backup file produced by `trilan export`
        path: PathBuf,
    },
    /// Show record counts
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Sync the local glossary with the cloud
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },
    /// Configure CLI profiles
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Sign in to cloud sync
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum EntryKind {
    #[value(alias = "dict")]
    Dictionary,
    #[value(alias = "phrases")]
    Phrase,
}

impl EntryKind {
    pub const fn collection(self) -> Collection {
        self.category_kind().entry_collection()
    }

    pub const fn category_kind(self) -> CategoryKind {
        match self {
            Self::Dictionary => CategoryKind::Dictionary,
            Self::Phrase => CategoryKind::Phrase,
        }
    }
}

/// The four language fields
#[derive(Args, Clone, Debug, Default, PartialEq, Eq)]
pub struct EntryFields {
    /// Traditional Chinese
    #[arg(short = 't', long)]
    pub traditional: Option<String>,
    /// Simplified Chinese
    #[arg(short = 's', long)]
    pub simplified: Option<String>,
    /// English
    #[arg(short = 'e', long)]
    pub english: Option<String>,
    /// Korean
    #[arg(short = 'k', long)]
    pub korean: Option<String>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

impl From<CompletionShell> for clap_complete::Shell {
    fn from(shell: CompletionShell) -> Self {
        match shell {
            CompletionShell::Bash => Self::Bash,
            CompletionShell::Zsh => Self::Zsh,
            CompletionShell::Fish => Self::Fish,
        }
    }
}

#[derive(Subcommand)]
pub enum CategoryCommands {
    /// Create a category
    Add {
        /// Category name
        name: Vec<String>,
        /// Which collection the category groups
        #[arg(long, value_enum)]
        kind: EntryKind,
    },
    /// List categories
    List {
        /// Only show categories of this kind
        #[arg(long, value_enum)]
        kind: Option<EntryKind>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Rename a category
    Rename {
        /// Category ID
        id: i64,
        /// New name
        name: Vec<String>,
    },
    /// Delete a category; its entries become uncategorized
    Delete {
        /// Category ID
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// Overwrite the cloud copy with local data
    Push,
    /// Replace local data with the cloud copy
    Pull,
    /// Show sign-in and connectivity status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Keep applying cloud changes until interrupted
    Watch,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Initialize or update profile config
    Init {
        /// Firebase web API key
        #[arg(long, value_name = "KEY")]
        api_key: Option<String>,
        /// Firebase project ID
        #[arg(long, value_name = "ID")]
        project_id: Option<String>,
        /// JSON file holding the Firebase console `firebaseConfig` object
        #[arg(long, value_name = "PATH")]
        web_config: Option<PathBuf>,
        /// Identity Toolkit base URL override (emulators)
        #[arg(long, value_name = "URL")]
        auth_url: Option<String>,
        /// Secure Token base URL override (emulators)
        #[arg(long, value_name = "URL")]
        secure_token_url: Option<String>,
        /// Firestore base URL override (emulators)
        #[arg(long, value_name = "URL")]
        firestore_url: Option<String>,
        /// Seconds between cloud polls in `trilan sync watch`
        #[arg(long, value_name = "SECONDS")]
        watch_interval: Option<u64>,
        /// Keep current active profile instead of activating this one
        #[arg(long)]
        no_activate: bool,
    },
}

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Sign in and store the session in the keychain
    Login {
        /// User name; the account is created on first sign-in
        #[arg(long, value_name = "NAME", required_unless_present = "google_id_token")]
        user: Option<String>,
        /// Account password
        #[arg(
            long,
            value_name = "PASSWORD",
            requires = "user",
            required_unless_present = "google_id_token"
        )]
        password: Option<String>,
        /// Sign in with a Google ID token instead of a user name
        #[arg(long, value_name = "TOKEN", conflicts_with_all = ["user", "password"])]
        google_id_token: Option<String>,
        /// Replace local data with the cloud copy instead of uploading it
        #[arg(long)]
        pull: bool,
    },
    /// Show auth status for profile
    Status,
    /// Sign out and clear stored session; local data is kept
    Logout,
}
