//! # Connect Collab CLI
//!
//! Join a collaboration session from the terminal, or manage sessions over
//! the HTTP API. Events are written to stdout as JSON lines; logs go to
//! stderr.

use anyhow::Context;
use clap::Parser;
use collab_client::{metrics, ClientConfig, CliArgs, CollaborationClient, Command, SessionApi};
use collab_core::{
    CollabEvent, CreateSessionRequest, InvitationRequest, ParticipantRole, ANY_EVENT,
};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize structured tracing on stderr with optional JSON format.
///
/// Set `RUST_LOG` to control log levels (default: info,collab_client=debug,collab_core=debug).
/// Set `RUST_LOG_FORMAT=json` for JSON output.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,collab_client=debug,collab_core=debug"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    if std::env::var("RUST_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = CliArgs::parse();
    let config = ClientConfig::try_from(&args)?;

    if let Some(addr) = args.metrics_addr {
        metrics::init_metrics(addr)
            .map_err(|e| anyhow::anyhow!("Failed to initialize Prometheus metrics: {}", e))?;
        tracing::info!("Prometheus metrics on http://{}/metrics", addr);
    }

    match args.command {
        Command::Join {
            session,
            user,
            name,
            role,
        } => run_join(config, &session, &user, &name, role).await,
        Command::Create {
            title,
            session_type,
            owner,
            description,
        } => {
            let api = SessionApi::new(&config)?;
            let mut request = CreateSessionRequest::new(session_type, title, owner);
            request.description = description;
            let session = api
                .try_create_session(&request)
                .await
                .context("creating session")?;
            print_json(&session)
        }
        Command::Get { session_id } => {
            let api = SessionApi::new(&config)?;
            let session = api
                .try_get_session(&session_id)
                .await
                .with_context(|| format!("fetching session {session_id}"))?;
            print_json(&session)
        }
        Command::Invite {
            session_id,
            email,
            role,
            message,
        } => {
            let api = SessionApi::new(&config)?;
            let invitation = api
                .try_invite_participant(
                    &session_id,
                    &InvitationRequest {
                        email,
                        role,
                        message,
                    },
                )
                .await
                .with_context(|| format!("inviting to session {session_id}"))?;
            print_json(&invitation)
        }
    }
}

/// Stay in the session until Ctrl-C, a clean server close, or reconnect exhaustion.
async fn run_join(
    config: ClientConfig,
    session: &str,
    user: &str,
    name: &str,
    role: ParticipantRole,
) -> anyhow::Result<()> {
    let client = CollaborationClient::new(config);

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<CollabEvent>();
    client.add_event_listener(ANY_EVENT, move |event: &CollabEvent| {
        let _ = event_tx.send(event.clone());
    });

    if !client.join_session(session, user, name, role) {
        anyhow::bail!("could not start joining session {session}");
    }

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    let outcome = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, leaving session");
                break Ok(());
            }
            Some(event) = event_rx.recv() => {
                print_json(&event)?;
                match event {
                    CollabEvent::ConnectionFailed { attempts } => {
                        break Err(anyhow::anyhow!("gave up after {attempts} reconnect attempts"));
                    }
                    CollabEvent::Disconnected { clean: true, .. } => {
                        tracing::info!("Server closed the session");
                        break Ok(());
                    }
                    _ => {}
                }
            }
            line = stdin.next_line(), if stdin_open => match line? {
                Some(line) if !line.trim().is_empty() => {
                    if !client.send_chat_message(line.trim()) {
                        tracing::warn!("Not connected, chat message dropped");
                    }
                }
                Some(_) => {}
                None => stdin_open = false,
            }
        }
    };

    client.leave_session().await;
    outcome
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}
