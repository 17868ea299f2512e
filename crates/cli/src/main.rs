//! `warden` operator binary.

use std::io::{self, BufRead, IsTerminal, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tracing::info;

use warden_auth::AuthDeps;
use warden_auth::service::{Bootstrap, CreateSuperadminInput};
use warden_core::{RequestContext, codes};
use warden_infra::{BcryptHasher, Config, JwtTokenIssuer, PgUowFactory};

const BOOTSTRAP_TIMEOUT: Duration = Duration::from_secs(30);
const PROMPT_USERNAME_MIN: usize = 3;
const PROMPT_USERNAME_MAX: usize = 30;
const PROMPT_PASSWORD_MIN: usize = 5;

/// Operator tooling for the warden authorization store.
#[derive(Parser, Debug)]
#[command(name = "warden", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply the bundled SQL schema.
    Migrate,

    /// Create the first superadmin.
    CreateSuperadmin {
        #[arg(long)]
        username: String,

        /// Read from stdin when unset.
        #[arg(long, env = "WARDEN_SUPERADMIN_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    warden_observability::init();

    let cli = Cli::parse();
    let config = Config::from_env().context("load configuration")?;

    match cli.command {
        Command::Migrate => {
            let factory = PgUowFactory::connect(&config).await?;
            factory.migrate().await.context("apply migrations")?;
            info!("migrations applied");
        }
        Command::CreateSuperadmin { username, password } => {
            let password = match password {
                Some(password) => password,
                None => read_password()?,
            };
            check_bootstrap_input(&username, &password)?;
            create_superadmin(&config, username, password).await?;
        }
    }
    Ok(())
}

async fn create_superadmin(config: &Config, username: String, password: String) -> anyhow::Result<()> {
    let factory = PgUowFactory::connect(config).await?;
    let deps = AuthDeps::new(
        Arc::new(factory),
        Arc::new(BcryptHasher::new(config.bcrypt_cost)),
        Arc::new(JwtTokenIssuer::from_config(config)),
    )
    .with_role_name_scope(config.role_name_scope);

    let ctx = RequestContext::with_timeout(BOOTSTRAP_TIMEOUT);
    let input = CreateSuperadminInput {
        username: username.clone(),
        password,
    };
    match Bootstrap::new(deps).create_superadmin(&ctx, input).await {
        Ok(admin) => {
            println!("created superadmin '{}' ({})", admin.username, admin.id);
            Ok(())
        }
        Err(err) if err.is(codes::USERNAME_EXISTS) => {
            bail!("an admin named '{username}' already exists")
        }
        Err(err) => Err(err).context("create superadmin"),
    }
}

fn read_password() -> anyhow::Result<String> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        eprint!("Password: ");
        io::stderr().flush()?;
    }
    let mut line = String::new();
    stdin.lock().read_line(&mut line).context("read password from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Prompt-level limits, stricter than the service's own validation.
fn check_bootstrap_input(username: &str, password: &str) -> anyhow::Result<()> {
    let len = username.trim().chars().count();
    if !(PROMPT_USERNAME_MIN..=PROMPT_USERNAME_MAX).contains(&len) {
        bail!("username must be between {PROMPT_USERNAME_MIN} and {PROMPT_USERNAME_MAX} characters");
    }
    if password.chars().count() < PROMPT_PASSWORD_MIN {
        bail!("password must be at least {PROMPT_PASSWORD_MIN} characters");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_create_superadmin() {
        let cli = Cli::try_parse_from(["warden", "create-superadmin", "--username", "root"]).unwrap();
        match cli.command {
            Command::CreateSuperadmin { username, .. } => assert_eq!(username, "root"),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn bootstrap_input_limits() {
        assert!(check_bootstrap_input("root", "pw12345").is_ok());
        assert!(check_bootstrap_input("ro", "pw12345").is_err());
        assert!(check_bootstrap_input(&"r".repeat(31), "pw12345").is_err());
        assert!(check_bootstrap_input("root", "pw12").is_err());
    }
}
