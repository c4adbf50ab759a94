//! Ivathy CLI - pairing codes and partner push notifications.
//!
//! This is the main binary entry point. See the `ivathy` library for the
//! core functionality.

use anyhow::Result;
use clap::{Parser, Subcommand};
use ivathy::env::Environment;
use ivathy::{commands, Config, Ivathy};

// CLI
#[derive(Parser)]
#[command(name = "ivathy")]
#[command(version)]
#[command(about = "Pair with your partner and send a \"thinking of you\" push")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new user
    CreateUser {
        /// Display name
        name: String,
    },
    /// Generate a pairing code to share with your partner
    GenerateCode {
        /// Your user id
        #[arg(long)]
        user: String,
    },
    /// Pair with the user who gave you a code
    Join {
        /// Your user id
        #[arg(long)]
        user: String,
        /// The code your partner shared
        #[arg(long)]
        code: String,
    },
    /// Show your current partner
    Status {
        /// Your user id
        #[arg(long)]
        user: String,
    },
    /// Register a browser push subscription
    Subscribe {
        /// Your user id
        #[arg(long)]
        user: String,
        /// PushSubscription JSON, or @path to a file containing it
        #[arg(long)]
        subscription: String,
    },
    /// Send your partner a "thinking of you" notification
    Notify {
        /// Your user id
        #[arg(long)]
        user: String,
    },
    /// Generate the server's VAPID keypair and print the public key
    VapidKeys {
        /// Replace existing keys
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration
    Config,
}

fn init_logging() {
    let environment = Environment::current();
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(environment.default_log_filter()),
    );
    builder.format_timestamp_secs();

    if let Ok(path) = std::env::var("IVATHY_LOG_FILE") {
        match std::fs::File::create(&path) {
            Ok(file) => {
                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
            Err(e) => eprintln!("Warning: cannot open log file {path}: {e}"),
        }
    }

    builder.init();
    log::debug!("Running in {environment} environment");
}

/// Run a command that operates on the store.
async fn run(app: &Ivathy, command: Commands) -> Result<()> {
    match command {
        Commands::CreateUser { name } => commands::pair::create_user(app, &name),
        Commands::GenerateCode { user } => commands::pair::generate_code(app, &user),
        Commands::Join { user, code } => commands::pair::join(app, &user, &code),
        Commands::Status { user } => commands::pair::status(app, &user),
        Commands::Subscribe { user, subscription } => {
            commands::push::subscribe(app, &user, &subscription)
        }
        Commands::Notify { user } => commands::push::notify(app, &user).await,
        // Handled in main without opening the store
        Commands::VapidKeys { .. } | Commands::Config => Ok(()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let mut config = Config::load()?;

    match cli.command {
        Commands::VapidKeys { force } => commands::push::vapid_keys(&mut config, force)?,
        Commands::Config => commands::print_json(&config)?,
        command => {
            let app = Ivathy::from_config(&config)?;
            run(&app, command).await?;
        }
    }

    Ok(())
}
