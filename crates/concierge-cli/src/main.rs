use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use tracing_subscriber::EnvFilter;

mod chat;
mod error_state;
mod prompt;
mod session;
mod transport;

use prompt::cliclack::CliclackPrompt;
use session::Session;
use transport::HttpTransport;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Chat endpoint of a running conciergd
    #[arg(long, env = "CONCIERGE_URL", default_value = "http://127.0.0.1:3000/api/chat")]
    url: String,

    /// Use the Google-connected variant of the endpoint
    #[arg(long)]
    google: bool,

    /// Session token, sent as a bearer token
    #[arg(long, env = "CONCIERGE_SESSION", hide_env_values = true)]
    session: Option<String>,

    /// Where to send the user to sign out and sign back in
    #[arg(
        long,
        env = "CONCIERGE_REAUTH_URL",
        default_value = "http://127.0.0.1:3000/auth/signout"
    )]
    reauth_url: String,
}

impl Cli {
    fn endpoint(&self) -> String {
        let base = self.url.trim_end_matches('/');
        if self.google {
            format!("{}/google", base)
        } else {
            base.to_string()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout belongs to the conversation
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let endpoint = cli.endpoint();

    let transport =
        HttpTransport::new(endpoint.clone(), cli.session.clone()).context("building HTTP client")?;

    println!(
        "{} {}",
        style("concierge").cyan().bold(),
        style(format!("connected to {}", endpoint)).dim()
    );

    let mut session = Session::new(
        Box::new(transport),
        Box::new(CliclackPrompt::new()),
        cli.reauth_url,
        Box::new(|url: &str| webbrowser::open(url).map_err(anyhow::Error::from)),
    );
    session.start().await
}
