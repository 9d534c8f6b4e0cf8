use clap::Parser;
use mcp_greet::{
    auth::{BearerAuth, KeyResolver, MetadataDiscoverer, TokenVerifier},
    AuthConfig, GreetServer,
};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(author, version, about = "OAuth-protected greeting tool server", long_about = None)]
struct Args {
    /// Address to bind
    #[arg(short, long, default_value = "127.0.0.1:3000")]
    bind: String,

    /// Authorization server issuer URL (falls back to MCP_GREET_ISSUER)
    #[arg(short, long)]
    issuer: Option<String>,

    /// Key-set endpoint override (skips discovery of it)
    #[arg(long)]
    jwks_uri: Option<String>,

    /// Authorization endpoint override, used in the WWW-Authenticate challenge
    #[arg(long)]
    authorization_endpoint: Option<String>,

    /// Token endpoint override
    #[arg(long)]
    token_endpoint: Option<String>,

    /// Externally visible resource identifier (defaults to the bind address)
    #[arg(short, long)]
    resource: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let args = Args::parse();

    let mut config = match args.issuer {
        Some(issuer) => AuthConfig::new(issuer),
        None => AuthConfig::from_env()?,
    };
    if args.authorization_endpoint.is_some() {
        config.authorization_endpoint = args.authorization_endpoint;
    }
    if args.token_endpoint.is_some() {
        config.token_endpoint = args.token_endpoint;
    }
    if args.jwks_uri.is_some() {
        config.jwks_uri = args.jwks_uri;
    }

    let metadata = config.resolve(&MetadataDiscoverer::new()).await?;
    info!(issuer = %metadata.issuer, jwks_uri = %metadata.jwks_uri, "authorization server resolved");

    let resolver = KeyResolver::new(metadata.jwks_uri.clone());
    let verifier = TokenVerifier::new(metadata.issuer.clone(), resolver);
    let auth = BearerAuth::new(verifier, "greet", metadata.authorization_endpoint.clone());

    let resource = args
        .resource
        .unwrap_or_else(|| format!("http://{}", args.bind));
    let server = GreetServer::new(auth, metadata.issuer.clone(), resource);

    let running = server.serve(&args.bind).await?;
    info!(addr = %running.addr, "ready; protected routes require a bearer token from {}", metadata.issuer);

    running.handle.await??;
    Ok(())
}
