//! pkce-gate - Entry Point
//!
//! `serve` runs the bearer-gated HTTP API; `pkce` prints a verifier/challenge pair.

use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use pkce_gate::config::{Config, defaults};
use pkce_gate::pkce::{self, AuthorizationRequest, DEFAULT_VERIFIER_BYTES, OsEntropy, PkcePair};
use pkce_gate::server::GateServer;

#[derive(Parser, Debug)]
#[command(name = "pkce-gate")]
#[command(about = "OAuth2 PKCE helper and bearer-JWT gated API")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API with the bearer gate in front of /hello
    Serve(ServeArgs),
    /// Generate a PKCE verifier and S256 challenge
    Pkce(PkceArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// HTTP server port
    #[arg(long, default_value_t = defaults::PORT, env = "BACKEND_PORT")]
    port: u16,

    /// Token issuer (expected `iss` claim)
    #[arg(long, env = "ISSUER_URL")]
    issuer: String,

    /// Expected `aud` claim
    #[arg(long, env = "AUDIENCE")]
    audience: String,

    /// Key set URL (defaults to <issuer>/.well-known/jwks.json)
    #[arg(long, env = "JWKS_URL")]
    jwks_url: Option<String>,

    /// Allowed clock skew in seconds
    #[arg(long, default_value_t = defaults::CLOCK_SKEW.as_secs(), env = "CLOCK_SKEW_SECS")]
    clock_skew_secs: u64,

    /// Signing key cache TTL in seconds
    #[arg(long, default_value_t = defaults::KEY_CACHE_TTL.as_secs(), env = "JWKS_CACHE_TTL_SECS")]
    jwks_cache_ttl_secs: u64,

    /// Seconds keys from the last fetched set stay usable while the key set endpoint is down
    #[arg(long, default_value_t = defaults::STALE_KEY_GRACE.as_secs(), env = "JWKS_STALE_GRACE_SECS")]
    jwks_stale_grace_secs: u64,
}

#[derive(Args, Debug)]
struct PkceArgs {
    /// Verifier size in random bytes (hex output is twice as long)
    #[arg(long, default_value_t = DEFAULT_VERIFIER_BYTES)]
    bytes: usize,

    /// Authorization endpoint; prints a full authorization URL when set
    #[arg(long, requires_all = ["client_id", "redirect_uri"])]
    authorize_url: Option<String>,

    /// OAuth client id
    #[arg(long, env = "OAUTH_CLIENT_ID")]
    client_id: Option<String>,

    /// Registered redirect URI
    #[arg(long, env = "OAUTH_REDIRECT_URI")]
    redirect_uri: Option<String>,

    /// Requested scope
    #[arg(long)]
    scope: Option<String>,
}

fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber.with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        subscriber.with(tracing_subscriber::fmt::layer().compact().with_writer(std::io::stderr)).init();
    }
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let mut config = Config::new(args.issuer, args.audience)
        .with_clock_skew(Duration::from_secs(args.clock_skew_secs))
        .with_key_cache_ttl(Duration::from_secs(args.jwks_cache_ttl_secs))
        .with_stale_key_grace(Duration::from_secs(args.jwks_stale_grace_secs));
    if let Some(jwks_url) = args.jwks_url {
        config = config.with_jwks_url(jwks_url);
    }

    tracing::info!(
        issuer = %config.issuer,
        audience = %config.audience,
        jwks_url = %config.jwks_url,
        "Running in HTTP mode"
    );

    let server = GateServer::new(&config)?;
    server.prefetch_keys().await;
    server.run_http(args.port).await
}

fn print_pkce(args: &PkceArgs) -> anyhow::Result<()> {
    let pair = PkcePair::generate(args.bytes)?;

    println!("code_verifier={}", pair.verifier.as_str());
    println!("code_challenge={}", pair.challenge);
    println!("code_challenge_method={}", pair.method());

    if let (Some(endpoint), Some(client_id), Some(redirect_uri)) =
        (&args.authorize_url, &args.client_id, &args.redirect_uri)
    {
        let state = pkce::generate_state(&mut OsEntropy)?;
        let request = AuthorizationRequest {
            authorization_endpoint: endpoint,
            client_id,
            redirect_uri,
            scope: args.scope.as_deref(),
            state: &state,
        };
        println!("state={state}");
        println!("authorization_url={}", request.to_url(&pair.challenge)?);
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    init_tracing(&cli.log_level, cli.json_logs);

    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "Starting pkce-gate");

    match cli.command {
        Command::Serve(args) => serve(args).await?,
        Command::Pkce(args) => print_pkce(&args)?,
    }

    Ok(())
}
