use std::time::Duration;

use clap::{Parser, Subcommand};
use scribo_client::ClientConfig;
use scribo_client::config::DEFAULT_API_URL;
use scribo_client::oauth::GOOGLE_AUTHORIZE_URL;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod util;

use commands::chat::ChatArgs;
use commands::document::DocumentCommands;
use commands::section::SectionCommands;

#[derive(Parser)]
#[command(name = "scribo", version, about = "Scribo CLI: documents, sections and the AI writing assistant")]
struct Cli {
    /// API base URL
    #[arg(long, env = "SCRIBO_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Base URL of /login and /user/* (defaults to the API URL)
    #[arg(long, env = "SCRIBO_AUTH_URL")]
    auth_url: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, env = "SCRIBO_TIMEOUT_SECS", default_value_t = 30)]
    timeout_secs: u64,

    /// OAuth client id used by `scribo login`
    #[arg(long, env = "SCRIBO_OAUTH_CLIENT_ID")]
    oauth_client_id: Option<String>,

    /// Authorization endpoint of the identity provider
    #[arg(long, env = "SCRIBO_OAUTH_AUTHORIZE_URL", default_value = GOOGLE_AUTHORIZE_URL)]
    oauth_authorize_url: String,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in through the browser
    Login {
        /// Print the authorization URL instead of opening a browser
        #[arg(long)]
        no_browser: bool,
    },
    /// Sign out and drop the local session
    Logout,
    /// Show who is signed in
    Whoami,
    /// Document operations
    Document {
        #[command(subcommand)]
        command: DocumentCommands,
    },
    /// Section operations
    Section {
        #[command(subcommand)]
        command: SectionCommands,
    },
    /// Talk to the writing assistant about a section
    Chat(ChatArgs),
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "warn".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let mut config =
        ClientConfig::new(&cli.api_url).with_timeout(Duration::from_secs(cli.timeout_secs));
    if let Some(auth_url) = &cli.auth_url {
        config = config.with_auth_url(auth_url);
    }

    let ctx = match util::Context::new(&config) {
        Ok(ctx) => ctx,
        Err(e) => util::exit_error(&e.to_string(), Some("Check SCRIBO_API_URL and SCRIBO_AUTH_URL.")),
    };

    let code = match cli.command {
        Commands::Login { no_browser } => {
            let Some(client_id) = cli.oauth_client_id.as_deref() else {
                util::exit_usage(
                    "an OAuth client id is required to sign in",
                    Some("Set --oauth-client-id or SCRIBO_OAUTH_CLIENT_ID"),
                );
            };
            commands::auth::login(&ctx, client_id, &cli.oauth_authorize_url, no_browser).await
        }
        Commands::Logout => commands::auth::logout(&ctx).await,
        Commands::Whoami => commands::auth::whoami(&ctx).await,
        Commands::Document { command } => commands::document::run(&ctx, command).await,
        Commands::Section { command } => commands::section::run(&ctx, command).await,
        Commands::Chat(args) => commands::chat::run(&ctx, args).await,
    };

    std::process::exit(code);
}
