//! Creates a user bound to a fresh provider conversation and prints a token.

use clap::Parser;
use role_chat_orchestrator::{
    auth::JwtAuthenticator, config::AppConfig, models::Role, provider::OpenAiProvider,
    service::provision_user, store,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Login name; also the display name used in emails
    #[arg(long)]
    username: String,

    #[arg(long)]
    email: String,

    /// interviewer | generate code | optimize code | assistant
    #[arg(long, default_value = "assistant")]
    role: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = AppConfig::from_env()?;
    let role: Role = args.role.parse()?;

    if config.database_url.is_none() {
        warn!("DATABASE_URL not set; the user will not outlive this process");
    }

    let stores = store::open(config.database_url.as_deref());
    let provider = OpenAiProvider::new(config.openai.clone())?;

    let user = provision_user(
        stores.users.as_ref(),
        &provider,
        &args.username,
        &args.email,
        role,
    )
    .await?;

    let token = JwtAuthenticator::new(&config.jwt_secret, stores.users.clone()).issue(&user.username)?;

    info!(user = %user.username, conversation = %user.conversation_ref, "Provisioned");
    println!("{}", token);

    Ok(())
}
