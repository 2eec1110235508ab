use anyhow::{Context, Result};
use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use market_client::{
    auth::{CredentialStore, SqliteCredentialStore},
    client::MarketClient,
    config::{prompt_credentials, Command, Config},
    endpoint::Endpoint,
    error::ApiError,
    transport::ReqwestTransport,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (for log level)
    let (config, command) = Config::load()?;
    config.validate()?;

    // Initialize logging with a configured level
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(base_url = %config.base_url, "Configuration loaded");

    let mut store = SqliteCredentialStore::open(&config.credentials_db)?;
    if let Some(credentials) = &config.credentials {
        store.set_credentials(Some(credentials.clone()))?;
    }

    let transport = Arc::new(ReqwestTransport::new(
        config.http_max_connections,
        config.http_connect_timeout,
        config.http_request_timeout,
    )?);

    let client = MarketClient::new(transport, Box::new(store), config.base_url.clone())
        .with_refresh_timeout(Duration::from_secs(config.refresh_timeout));

    if let Err(e) = run(&client, &config, command).await {
        tracing::error!(kind = e.kind(), "{}", e);
        eprintln!("{}", e.user_message());
        std::process::exit(1);
    }

    Ok(())
}

async fn run(client: &MarketClient, config: &Config, command: Command) -> Result<(), ApiError> {
    match command {
        Command::Login => {
            let credentials = match &config.credentials {
                Some(c) => c.clone(),
                None => prompt_credentials()?,
            };
            let auth = client.login(credentials).await?;
            println!("Signed in as user {}", auth.user_id);
        }

        Command::Logout => {
            client.logout().await?;
            println!("Signed out");
        }

        Command::Whoami => {
            let snapshot = client.snapshot().await;
            match snapshot.credentials {
                Some(ref c) => println!("login:      {}", c.login),
                None => println!("login:      <none>"),
            }
            match snapshot.user_id {
                Some(id) => println!("user id:    {}", id),
                None => println!("user id:    <none>"),
            }
            let token_state = if snapshot.valid_token().is_some() {
                "valid"
            } else {
                "absent or expired"
            };
            println!("token:      {}", token_state);
            if let Some(expires_at) = snapshot.expires_at {
                println!("expires at: {}", expires_at.to_rfc3339());
            }
        }

        Command::Get { path, public } => {
            let endpoint = if public {
                Endpoint::get(path).public()
            } else {
                ensure_signed_in(client).await?;
                Endpoint::get(path)
            };
            let value: serde_json::Value = client.get(&endpoint).await?;
            let rendered = serde_json::to_string_pretty(&value)
                .map_err(|e| ApiError::DataCorrupted(e.to_string()))?;
            println!("{}", rendered);
        }

        Command::Download { path, output } => {
            ensure_signed_in(client).await?;
            let bytes = client.download(&Endpoint::get(path)).await?;
            tokio::fs::write(&output, &bytes)
                .await
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!("Saved {} bytes to {}", bytes.len(), output.display());
        }

        Command::Upload {
            path,
            item_id,
            file,
        } => {
            ensure_signed_in(client).await?;
            client.ensure_token().await?;
            let data = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let endpoint = Endpoint::post(path).with_headers([("Accept", "*/*")]);
            let response = client.upload_photo(&endpoint, data, item_id).await?;
            println!("Uploaded as {}", response.filename);
        }
    }

    Ok(())
}

/// Make sure a token or stored credentials exist, prompting on a terminal
async fn ensure_signed_in(client: &MarketClient) -> Result<(), ApiError> {
    let snapshot = client.snapshot().await;
    if snapshot.valid_token().is_some() || snapshot.credentials.is_some() {
        return Ok(());
    }

    if !std::io::stdin().is_terminal() {
        return Err(ApiError::Auth(
            "No stored credentials (run `market-client login` first)".to_string(),
        ));
    }

    let credentials = prompt_credentials()?;
    let auth = client.login(credentials).await?;
    tracing::info!(user_id = auth.user_id, "Signed in");
    Ok(())
}
