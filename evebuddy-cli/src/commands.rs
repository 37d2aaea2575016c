//! Subcommand implementations.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use evebuddy_lib::auth::SsoClient;
use evebuddy_lib::auth::Token;
use evebuddy_lib::error::AuthError;
use evebuddy_lib::rate_limit::generate;
use evebuddy_lib::rate_limit::parse_spec;
use tokio_util::sync::CancellationToken;

use crate::args::SsoArgs;
use crate::assets;
use crate::config::Settings;
use crate::error::CliError;
use crate::error::CliResult;
use crate::paths;

fn token_path(token: Option<PathBuf>) -> CliResult<PathBuf> {
    match token {
        Some(path) => Ok(path),
        None => paths::token_file().ok_or(CliError::NoDirectory("data")),
    }
}

pub(crate) fn load_token(path: &Path) -> CliResult<Token> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(CliError::NoToken(path.to_path_buf()));
        }
        Err(e) => return Err(CliError::io(path, e)),
    };
    serde_json::from_str(&content).map_err(|e| CliError::json(path, e))
}

pub(crate) fn save_token(path: &Path, token: &Token) -> CliResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| CliError::io(parent, e))?;
    }
    let json = serde_json::to_string_pretty(token).map_err(|e| CliError::json(path, e))?;
    fs::write(path, json).map_err(|e| CliError::io(path, e))?;
    log::debug!("token saved to {}", path.display());
    Ok(())
}

/// Cancellation token fired by Ctrl-C.
fn ctrl_c_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });
    cancel
}

pub async fn login(
    settings: Settings,
    sso: SsoArgs,
    no_browser: bool,
    token: Option<PathBuf>,
) -> CliResult<()> {
    let mut settings = sso.apply(settings);
    if no_browser {
        settings.open_browser = false;
    }
    let path = token_path(token)?;
    let config = settings.sso_config()?;
    let timeout = config.timeout;
    let client = SsoClient::new(config)?;
    let cancel = ctrl_c_token();

    let token = if settings.open_browser {
        client
            .authenticate_with_cancel(&settings.scopes, cancel)
            .await?
    } else {
        let pending = client.start(&settings.scopes).await?;
        println!("Open this URL to log in:\n\n  {}\n", pending.auth_url);
        tokio::time::timeout(timeout, pending.wait_with_cancel(cancel))
            .await
            .map_err(|_| AuthError::Timeout(timeout))??
    };

    save_token(&path, &token)?;
    println!(
        "Logged in as {} ({}), token expires {}",
        token.character_name,
        token.character_id,
        token.expires_at.to_rfc3339()
    );
    Ok(())
}

pub async fn refresh(settings: Settings, sso: SsoArgs, token: Option<PathBuf>) -> CliResult<()> {
    let settings = sso.apply(settings);
    let path = token_path(token)?;
    let stored = load_token(&path)?;
    let refresh_token = stored
        .refresh_token
        .as_deref()
        .ok_or(AuthError::MissingRefreshToken)?;

    let client = SsoClient::new(settings.sso_config()?)?;
    let token = client.refresh(refresh_token).await?;
    if token.character_id != stored.character_id {
        log::warn!(
            "refreshed token belongs to {} instead of {}",
            token.character_id,
            stored.character_id
        );
    }

    save_token(&path, &token)?;
    println!(
        "Refreshed token for {}, expires {}",
        token.character_name,
        token.expires_at.to_rfc3339()
    );
    Ok(())
}

pub fn gen_ratelimit(input: &Path, output: Option<&Path>) -> CliResult<()> {
    let content = fs::read_to_string(input).map_err(|e| CliError::io(input, e))?;
    let spec = parse_spec(&content)?;
    log::info!(
        "parsed {} groups and {} operations from {}",
        spec.groups.len(),
        spec.operations.len(),
        input.display()
    );
    let source = generate(&spec);

    match output {
        Some(path) => {
            fs::write(path, source).map_err(|e| CliError::io(path, e))?;
            log::info!("wrote {}", path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(source.as_bytes())
                .map_err(|e| CliError::io("<stdout>", e))?;
        }
    }
    Ok(())
}

pub fn show_assets(input: &Path, collapsed: bool) -> CliResult<()> {
    let content = fs::read_to_string(input).map_err(|e| CliError::io(input, e))?;
    let listing: Vec<assets::Asset> =
        serde_json::from_str(&content).map_err(|e| CliError::json(input, e))?;
    let forest = assets::build_forest(&listing)?;
    log::debug!("built asset tree with {} nodes", forest.len());

    for line in assets::render_text(forest, !collapsed) {
        println!("{line}");
    }
    Ok(())
}
