//! OMS CLI - Database migrations and management tools.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! oms-cli migrate
//!
//! # Seed demo users, a customer and a product catalogue
//! oms-cli seed
//!
//! # Create a user
//! oms-cli user create -u alice -r seller
//!
//! # Issue a bearer token for a user
//! oms-cli token -u 1 -r admin --ttl-minutes 60
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `seed` - Seed database with demo data
//! - `user create` - Create users
//! - `token` - Issue bearer tokens

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "oms-cli")]
#[command(author, version, about = "OMS CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Seed the database with demo data
    Seed,
    /// Manage users
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Issue a bearer token
    Token {
        /// User id the token is for
        #[arg(short, long)]
        user_id: i32,

        /// Role (`admin`, `seller`, `customer`)
        #[arg(short, long, default_value = "customer")]
        role: String,

        /// Lifetime in minutes
        #[arg(long, default_value_t = 60)]
        ttl_minutes: i64,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Create a new user
    Create {
        /// Unique username
        #[arg(short, long)]
        username: String,

        /// Role (`admin`, `seller`, `customer`)
        #[arg(short, long, default_value = "customer")]
        role: String,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Seed => commands::seed::run().await?,
        Commands::User { action } => match action {
            UserAction::Create { username, role } => {
                commands::user::create_user(&username, &role).await?;
            }
        },
        Commands::Token {
            user_id,
            role,
            ttl_minutes,
        } => commands::token::issue(user_id, &role, ttl_minutes)?,
    }
    Ok(())
}
