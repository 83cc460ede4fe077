//! FarmData Admin CLI
//!
//! Administration tool for managing API users on the server database.
//!
//! # Usage
//!
//! ```bash
//! farmdata-admin user add achieng --email achieng@example.com --role admin
//! farmdata-admin user list
//! farmdata-admin user set-role achieng clerk
//! farmdata-admin user deactivate achieng
//! farmdata-admin user rotate-token achieng
//! ```
//!
//! The database location follows the server's configuration
//! (`FARMDATA_DATABASE_PATH`, `FARMDATA_CONFIG`).

use clap::{Args, Parser, Subcommand};
use farmdata::config::Config;
use farmdata::db::{init_db, is_unique_violation, UserRepository};
use farmdata::models::{Role, User, UserUpdate};
use farmdata::server::tokens::{generate_token, hash_token};
use std::path::PathBuf;

type CliResult = Result<(), Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "farmdata-admin")]
#[command(version)]
#[command(about = "FarmData server administration tool")]
struct Cli {
    /// Path to config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage users
    User(UserCommand),
}

#[derive(Args)]
struct UserCommand {
    #[command(subcommand)]
    command: UserSubcommand,
}

#[derive(Subcommand)]
enum UserSubcommand {
    /// Add a new user and print their API token
    Add {
        username: String,
        /// User's email address
        #[arg(long, short)]
        email: Option<String>,
        /// admin or clerk
        #[arg(long, short, default_value = "clerk")]
        role: Role,
    },
    /// List all users
    List,
    /// Change a user's role
    SetRole { username: String, role: Role },
    /// Stop a user's token from authenticating
    Deactivate { username: String },
    /// Re-enable a deactivated user
    Activate { username: String },
    /// Issue a new token, invalidating the old one
    RotateToken { username: String },
}

async fn find_user(users: &UserRepository, username: &str) -> Result<User, Box<dyn std::error::Error>> {
    users
        .get_by_username(username)
        .await?
        .ok_or_else(|| format!("User '{}' not found", username).into())
}

async fn add_user(
    users: &UserRepository,
    username: String,
    email: Option<String>,
    role: Role,
) -> CliResult {
    let token = generate_token();
    let user = match users
        .create(&username, email.as_deref(), role, &hash_token(&token))
        .await
    {
        Ok(user) => user,
        Err(e) if is_unique_violation(&e) => {
            return Err(format!("User '{}' already exists", username).into())
        }
        Err(e) => return Err(e.into()),
    };

    println!("Added user: {}", user.username);
    println!("  Role: {}", user.role);
    if let Some(email) = &user.email {
        println!("  Email: {}", email);
    }
    println!("  Token: {}", token);
    println!();
    println!("Store this token now; it cannot be shown again.");

    Ok(())
}

async fn list_users(users: &UserRepository) -> CliResult {
    let all = users.list().await?;

    if all.is_empty() {
        println!("No users registered.");
        return Ok(());
    }

    println!("{:<6} {:<24} {:<8} {:<8} {:<30}", "ID", "USERNAME", "ROLE", "ACTIVE", "EMAIL");
    println!("{}", "-".repeat(80));

    for user in &all {
        println!(
            "{:<6} {:<24} {:<8} {:<8} {:<30}",
            user.id,
            user.username,
            user.role,
            if user.is_active { "yes" } else { "no" },
            user.email.as_deref().unwrap_or("")
        );
    }

    println!();
    println!("Total: {} user(s)", all.len());

    Ok(())
}

async fn update_user(users: &UserRepository, username: &str, update: UserUpdate) -> CliResult {
    let user = find_user(users, username).await?;
    let updated = users
        .update(user.id, &update)
        .await?
        .ok_or_else(|| format!("User '{}' not found", username))?;

    println!(
        "Updated user: {} (role: {}, active: {})",
        updated.username, updated.role, updated.is_active
    );
    Ok(())
}

async fn rotate_token(users: &UserRepository, username: &str) -> CliResult {
    let user = find_user(users, username).await?;
    let token = generate_token();
    users.set_token_hash(user.id, &hash_token(&token)).await?;

    println!("New token for {}: {}", user.username, token);
    Ok(())
}

async fn run(cli: Cli) -> CliResult {
    let config = Config::load(cli.config)?;
    let users = UserRepository::new(init_db(&config.database_path).await?);

    match cli.command {
        Commands::User(user_cmd) => match user_cmd.command {
            UserSubcommand::Add {
                username,
                email,
                role,
            } => add_user(&users, username, email, role).await,
            UserSubcommand::List => list_users(&users).await,
            UserSubcommand::SetRole { username, role } => {
                let update = UserUpdate {
                    role: Some(role),
                    ..Default::default()
                };
                update_user(&users, &username, update).await
            }
            UserSubcommand::Deactivate { username } => {
                let update = UserUpdate {
                    is_active: Some(false),
                    ..Default::default()
                };
                update_user(&users, &username, update).await
            }
            UserSubcommand::Activate { username } => {
                let update = UserUpdate {
                    is_active: Some(true),
                    ..Default::default()
                };
                update_user(&users, &username, update).await
            }
            UserSubcommand::RotateToken { username } => rotate_token(&users, &username).await,
        },
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
