use std::io::IsTerminal as _;

use clap::Parser;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

use stampcard::backend::BackendError;
use stampcard::config::{ConfigError, StampcardConfig};
use stampcard::router::{Location, NavHint};
use stampcard::shell::{Shell, ShellError};
use stampcard::state::AppState;

#[derive(Debug, thiserror::Error)]
enum MainError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Shell(#[from] ShellError),
}

#[derive(Parser, Debug)]
#[command(name = "stampcard", about = "Restaurant loyalty client: sign up, collect stamps, redeem coupons")]
struct Cli {
    /// Entry location, e.g. `https://stamps.example.com/?view=login&restaurant=luigi`.
    #[arg(long, env = "STAMPCARD_URL")]
    url: Option<String>,

    /// Start screen hint: `login`, `restaurant-signup` or `restaurant-login`.
    #[arg(long, env = "STAMPCARD_VIEW")]
    view: Option<String>,

    /// Restaurant slug preselected in customer signup.
    #[arg(long, env = "STAMPCARD_RESTAURANT")]
    restaurant: Option<String>,
}

impl Cli {
    /// `--url` first, then the explicit flags override what it carried.
    fn location(&self) -> Location {
        let mut location = self.url.as_deref().map(Location::parse).unwrap_or_default();
        if let Some(view) = &self.view {
            location.view = NavHint::parse(view);
            if location.view.is_none() {
                tracing::warn!(%view, "unknown view hint; ignoring");
            }
        }
        if let Some(slug) = self.restaurant.as_ref().filter(|s| !s.is_empty()) {
            location.restaurant = Some(slug.clone());
        }
        location
    }
}

#[tokio::main]
async fn main() -> Result<(), MainError> {
    dotenvy::dotenv().ok();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("stampcard=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let config = StampcardConfig::from_env()?;
    let state = AppState::remote(config)?;

    let mut router = state.mount_router(cli.location());
    println!("Loading...");
    router.resolve_initial().await;

    let interactive = std::io::stdin().is_terminal();
    let mut shell =
        Shell::new(state, router, BufReader::new(tokio::io::stdin())).with_hidden_passwords(interactive);
    shell.run().await?;
    Ok(())
}
