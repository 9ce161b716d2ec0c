use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use challenge_auth::auth::{self, ChallengeAuth};
use challenge_auth::bot::Bot;
use challenge_auth::client::{self, ConnectConfig};
use challenge_auth::config::BotConfig;
use challenge_auth::engine::RsaEngineFactory;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("challenge_auth=info".parse()?))
        .init();

    let config = BotConfig::parse();
    let challenge = config.challenge_config()?;
    if challenge.opername.is_empty() {
        tracing::warn!("No opername configured; CHALLENGE will be rejected by the server");
    }

    let auth = Arc::new(ChallengeAuth::new(
        RsaEngineFactory,
        challenge,
        !config.no_auto_challenge,
    ));

    let mut bot = Bot::new(&config.prefix);
    for owner in &config.owners {
        bot = bot.owner(owner);
    }
    auth.register(&mut bot);

    let connect = ConnectConfig {
        server_addr: config.server.clone(),
        nick: config.nick.clone(),
        user: config.nick.clone(),
        realname: "CHALLENGE oper bot".to_string(),
        tls: config.tls,
        tls_insecure: config.tls_insecure,
    };
    #[cfg(unix)]
    tokio::spawn(reload_on_hangup(config.clone(), Arc::clone(&auth)));

    tracing::info!(server = %connect.server_addr, nick = %connect.nick, "Connecting");
    let (handle, events) = client::connect(connect).await?;

    auth::serve(handle, events, &bot, &auth, &config.channels).await
}

/// Re-read the challenge settings on SIGHUP. Attempts already in flight keep their key.
#[cfg(unix)]
async fn reload_on_hangup(config: BotConfig, auth: Arc<ChallengeAuth<RsaEngineFactory>>) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(e) => {
            tracing::warn!(error = %e, "Cannot install SIGHUP handler");
            return;
        }
    };
    while hangup.recv().await.is_some() {
        match config.challenge_config() {
            Ok(challenge) => {
                tracing::info!(opername = %challenge.opername, "Reloaded challenge settings");
                auth.set_config(challenge).await;
            }
            Err(e) => tracing::warn!(error = %e, "Keeping previous challenge settings"),
        }
    }
}
