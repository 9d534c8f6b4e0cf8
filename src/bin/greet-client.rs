use std::time::Duration;

use clap::Parser;
use mcp_greet::{
    auth::{MetadataDiscoverer, OAuthClient},
    AuthConfig,
};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Obtain an access token via PKCE and call the greet tool",
    long_about = None
)]
struct Args {
    /// Greet server base URL
    #[arg(short, long, default_value = "http://127.0.0.1:3000")]
    server: String,

    /// Authorization server issuer URL (falls back to MCP_GREET_ISSUER)
    #[arg(short, long)]
    issuer: Option<String>,

    /// Client display name for dynamic registration
    #[arg(short = 'n', long, default_value = "mcp-greet client")]
    client_name: String,

    /// Local OAuth callback port
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// OAuth scopes (comma-separated)
    #[arg(long, default_value = "")]
    scopes: String,

    /// Name to greet
    #[arg(long, default_value = "world")]
    name: String,

    /// Seconds to wait for the browser authorization
    #[arg(long, default_value = "300")]
    authorization_wait: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let args = Args::parse();

    let scopes: Vec<String> = if args.scopes.is_empty() {
        vec![]
    } else {
        args.scopes
            .split(',')
            .map(|s| s.trim().to_string())
            .collect()
    };

    let config = match args.issuer {
        Some(issuer) => AuthConfig::new(issuer),
        None => AuthConfig::from_env()?,
    };

    info!(issuer = %config.issuer, "discovering authorization server");
    let metadata = config.resolve(&MetadataDiscoverer::new()).await?;

    let redirect_url = format!("http://localhost:{}/callback", args.port);

    info!("performing dynamic client registration");
    let mut oauth_client =
        OAuthClient::register(&metadata, args.client_name, redirect_url, scopes).await?;

    info!("starting authorization flow, waiting for the browser callback");
    let token = oauth_client
        .authorize(args.port, Duration::from_secs(args.authorization_wait))
        .await?;
    info!("access token obtained");

    let endpoint = format!("{}/tools/greet", args.server.trim_end_matches('/'));
    let response = reqwest::Client::new()
        .post(&endpoint)
        .bearer_auth(&token.access_token)
        .json(&serde_json::json!({ "arguments": { "name": args.name } }))
        .send()
        .await?;

    let status = response.status();
    let body: serde_json::Value = response.json().await?;
    if !status.is_success() {
        return Err(format!("greet call failed with status {status}: {body}").into());
    }

    match body.pointer("/result/greeting").and_then(|v| v.as_str()) {
        Some(greeting) => println!("{greeting}"),
        None => println!("{body}"),
    }

    Ok(())
}
