use std::sync::Arc;

use anyhow::Context;
use controller_channel::LocalChannel;
use session_dispatch::{
    ConnectionRequest, ControllerIdentity, MediaItem, OutboundMessage, PlayerAction,
    SessionBuilder, SessionHandle, config::PROTOCOL_VERSION,
};
use session_host::config::AppConfig;
use session_host::player::MemoryPlayer;
use session_host::policy::HostPolicy;
use session_host::routes;
use session_host::state::AppState;
use session_host::telemetry::init_tracing;
use tokio::signal;
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = AppConfig::from_env()?;
    init_tracing(&cfg.log_filter);

    info!(
        addr = %cfg.bind_addr,
        session_id = %cfg.session.session_id,
        allow_untrusted = cfg.session.allow_untrusted,
        host_uid = ?cfg.session.host_uid,
        demo_controller = cfg.demo_controller,
        "starting session-host"
    );

    let player = MemoryPlayer::new().with_library(vec![
        MediaItem::new("intro"),
        MediaItem::new("episode-1"),
        MediaItem::new("episode-2"),
    ]);
    let session = SessionBuilder::new(player)
        .policy(HostPolicy::new())
        .config(cfg.session.clone())
        .spawn();

    if cfg.demo_controller {
        attach_demo_controller(&session, cfg.session.host_uid.unwrap_or(1000))?;
    }

    let app = routes::router(AppState::new(session.clone()));
    let listener = tokio::net::TcpListener::bind(cfg.bind_addr)
        .await
        .context("failed to bind listener")?;
    info!("session-host listening on {}", cfg.bind_addr);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server shutdown with error")?;

    info!("shutdown signal received; releasing session");
    session.release().await;
    Ok(())
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
}

/// Loopback controller that logs whatever the session pushes to it and queues
/// a short playlist.
fn attach_demo_controller(session: &SessionHandle, uid: u32) -> anyhow::Result<()> {
    let identity = ControllerIdentity::new(0, "session-host.demo", std::process::id(), uid);
    let (channel, mut rx) = LocalChannel::<OutboundMessage>::new("demo");
    session
        .connect(
            ConnectionRequest::new(identity.clone(), PROTOCOL_VERSION),
            Arc::new(channel),
        )
        .context("demo controller could not connect")?;

    let handle = session.clone();
    tokio::spawn(async move {
        let mut request_seq = 0;
        while let Some(message) = rx.recv().await {
            debug!(
                target = "session_host.demo",
                kind = message.kind(),
                seq = message.seq(),
                "received"
            );
            match message {
                OutboundMessage::Connected { .. } => {
                    let items = ["intro", "episode-1"].map(MediaItem::new).to_vec();
                    for action in [
                        PlayerAction::SetMediaItems {
                            items,
                            start_index: Some(0),
                            start_position_ms: None,
                        },
                        PlayerAction::Prepare,
                        PlayerAction::Play,
                    ] {
                        request_seq += 1;
                        handle.dispatch(&identity, request_seq, action.into());
                    }
                }
                OutboundMessage::Result {
                    request_seq,
                    result,
                    ..
                } if !result.code.is_success() => {
                    warn!(
                        target = "session_host.demo",
                        request_seq,
                        code = %result.code,
                        "demo command failed"
                    );
                }
                OutboundMessage::Result { .. } => handle.notify_player_state_changed(),
                OutboundMessage::Disconnected { .. } => break,
                _ => {}
            }
        }
    });
    Ok(())
}
