//! Verifies a bearer token against an authorization server.
//!
//! Usage: `cargo run --example verify_token -- <settings.yaml> <token>`
//!
//! ```yaml
//! issuer: https://dev-123456.okta.com/oauth2/default
//! client_id: 0oa1abc
//! audience: api://default
//! leeway: PT2M
//! discovery: oauth
//! cache_ttl_seconds: 3600
//! ```
use nila_jwt_verifier::prelude::*;
use std::fs;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let (Some(settings_path), Some(token)) = (args.next(), args.next()) else {
        eprintln!("usage: verify_token <settings.yaml> <token>");
        std::process::exit(2);
    };

    let settings: VerifierSettings = serde_yaml::from_str(&fs::read_to_string(&settings_path)?)?;
    let verifier = settings.into_builder()?.build()?;
    info!("Verifying token against issuer {}", verifier.issuer());

    match verifier.verify(&token).await {
        Ok(jwt) => {
            println!("{}", serde_json::to_string_pretty(jwt.claims())?);
            Ok(())
        }
        Err(e) => {
            error!("Token verification failed: {}", e);
            std::process::exit(1);
        }
    }
}
