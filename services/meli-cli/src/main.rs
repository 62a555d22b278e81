//! Mercado Libre command-line client
//!
//! Thin wrapper over the `meli` crate for walking through the OAuth flow and
//! poking at endpoints:
//!
//! ```text
//! meli [--config PATH] auth-url <redirect_uri> [--pkce]
//! meli [--config PATH] authorize <code> <redirect_uri> [--verifier V]
//! meli [--config PATH] refresh
//! meli [--config PATH] get <path> [key=value ...]
//! ```
//!
//! App credentials and tokens come from MELI_APP_ID, MELI_SECRET,
//! MELI_ACCESS_TOKEN and MELI_REFRESH_TOKEN. Results are printed as JSON on
//! stdout; logs go to stderr.

use anyhow::{Context, Result, bail};
use common::{SdkConfig, Secret};
use meli::{Credentials, MeliClient, TokenResult};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "usage: meli [--config PATH] <auth-url <redirect_uri> [--pkce] | authorize <code> <redirect_uri> [--verifier V] | refresh | get <path> [key=value ...]>";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    AuthUrl {
        redirect_uri: String,
        pkce: bool,
    },
    Authorize {
        code: String,
        redirect_uri: String,
        verifier: Option<String>,
    },
    Refresh,
    Get {
        path: String,
        params: Vec<(String, String)>,
    },
}

#[derive(Debug, PartialEq, Eq)]
struct Invocation {
    config_path: Option<String>,
    command: Command,
}

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs on stderr, LOG_LEVEL / RUST_LOG filter
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let invocation = parse_args(&args)?;

    let config = load_config(invocation.config_path.as_deref())?;
    info!(api_root_url = %config.api_root_url, "configuration loaded");

    let client = MeliClient::new(config, credentials_from_env())
        .context("failed to create Mercado Libre client")?;

    let output = run(&client, invocation.command).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn run(client: &MeliClient, command: Command) -> Result<serde_json::Value> {
    match command {
        Command::AuthUrl { redirect_uri, pkce } => {
            if pkce {
                let verifier = meli::generate_verifier();
                let challenge = meli::compute_challenge(&verifier);
                Ok(serde_json::json!({
                    "url": client.auth_url_with_challenge(&redirect_uri, &challenge),
                    "code_verifier": verifier,
                }))
            } else {
                Ok(serde_json::json!({ "url": client.auth_url(&redirect_uri) }))
            }
        }
        Command::Authorize {
            code,
            redirect_uri,
            verifier,
        } => {
            let result = match verifier {
                Some(v) => client.authorize_with_verifier(&code, &redirect_uri, &v).await,
                None => client.authorize(&code, &redirect_uri).await,
            }
            .context("authorization code exchange failed")?;
            Ok(token_json(&result))
        }
        Command::Refresh => {
            let result = client.refresh().await.context("token refresh failed")?;
            Ok(token_json(&result))
        }
        Command::Get { path, params } => {
            let params: Vec<(&str, &str)> = params
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect();
            let response = client
                .get(&path, &params)
                .await
                .with_context(|| format!("GET {path} failed"))?;
            let body = response
                .json::<serde_json::Value>()
                .unwrap_or_else(|_| serde_json::Value::String(response.text()));
            Ok(serde_json::json!({
                "status": response.status.as_u16(),
                "body": body,
            }))
        }
    }
}

/// Tokens are printed in full: the caller needs them to persist the session.
fn token_json(result: &TokenResult) -> serde_json::Value {
    serde_json::json!({
        "access_token": result.access_token,
        "refresh_token": result.refresh_token,
        "expires_in": result.expires_in,
        "user_id": result.user_id,
        "scope": result.scope,
        "date": result.date,
    })
}

fn parse_args(args: &[String]) -> Result<Invocation> {
    let mut config_path = None;
    let mut rest = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            let value = iter.next().context("--config requires a path")?;
            config_path = Some(value.clone());
        } else {
            rest.push(arg.as_str());
        }
    }

    let command = match rest.as_slice() {
        ["auth-url", redirect_uri] => Command::AuthUrl {
            redirect_uri: redirect_uri.to_string(),
            pkce: false,
        },
        ["auth-url", redirect_uri, "--pkce"] => Command::AuthUrl {
            redirect_uri: redirect_uri.to_string(),
            pkce: true,
        },
        ["authorize", code, redirect_uri] => Command::Authorize {
            code: code.to_string(),
            redirect_uri: redirect_uri.to_string(),
            verifier: None,
        },
        ["authorize", code, redirect_uri, "--verifier", verifier] => Command::Authorize {
            code: code.to_string(),
            redirect_uri: redirect_uri.to_string(),
            verifier: Some(verifier.to_string()),
        },
        ["refresh"] => Command::Refresh,
        ["get", path, params @ ..] => Command::Get {
            path: path.to_string(),
            params: params
                .iter()
                .map(|p| parse_param(p))
                .collect::<Result<_>>()?,
        },
        _ => bail!("{USAGE}"),
    };

    Ok(Invocation {
        config_path,
        command,
    })
}

fn parse_param(raw: &str) -> Result<(String, String)> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => bail!("query parameter must be key=value, got: {raw}"),
    }
}

/// An explicit path (flag or MELI_CONFIG_PATH) must exist; the implicit
/// `meli.toml` falls back to the built-in defaults when absent.
fn load_config(cli_path: Option<&str>) -> Result<SdkConfig> {
    let explicit = cli_path.is_some() || std::env::var_os("MELI_CONFIG_PATH").is_some();
    let path = SdkConfig::resolve_path(cli_path);
    if !explicit && !path.exists() {
        return Ok(SdkConfig::default());
    }
    SdkConfig::load(&path).with_context(|| format!("failed to load config from {}", path.display()))
}

fn credentials_from_env() -> Credentials {
    let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
    Credentials {
        app_id: var("MELI_APP_ID"),
        secret: var("MELI_SECRET").map(Secret::new),
        access_token: var("MELI_ACCESS_TOKEN").map(Secret::new),
        refresh_token: var("MELI_REFRESH_TOKEN").map(Secret::new),
    }
}
