//! Command-line arguments for `collab-cli`.

use std::net::SocketAddr;
use std::time::Duration;

use clap::{Parser, Subcommand};
use collab_core::{ParticipantRole, ReconnectPolicy, SessionType};

use crate::config::{ClientConfig, ConfigError, DEFAULT_API_URL};

/// Command-line arguments for collab-cli.
#[derive(Debug, Clone, Parser)]
#[command(name = "collab-cli")]
#[command(about = "Connect Collab real-time collaboration client")]
#[command(version)]
pub struct CliArgs {
    /// Collaboration API base URL (e.g., <https://connect.example/api>)
    #[arg(long, env = "COLLAB_API_URL", default_value = DEFAULT_API_URL, global = true)]
    pub api_url: String,

    /// Bearer token for the API and session socket
    #[arg(long, env = "COLLAB_TOKEN", hide_env_values = true, global = true)]
    pub token: Option<String>,

    /// Reconnect delay unit in milliseconds (attempt n waits n times this)
    #[arg(long, env = "COLLAB_RECONNECT_BASE_MS", default_value_t = 1000, global = true)]
    pub reconnect_base_ms: u64,

    /// Reconnect attempts before giving up
    #[arg(long, env = "COLLAB_RECONNECT_MAX_ATTEMPTS", default_value_t = 5, global = true)]
    pub reconnect_max_attempts: u32,

    /// HTTP request timeout in seconds
    #[arg(long, env = "COLLAB_HTTP_TIMEOUT_SECS", global = true)]
    pub http_timeout_secs: Option<u64>,

    /// Serve Prometheus metrics on this address
    #[arg(long, env = "COLLAB_METRICS_ADDR", global = true)]
    pub metrics_addr: Option<SocketAddr>,

    /// What to do
    #[command(subcommand)]
    pub command: Command,
}

/// collab-cli subcommands.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Join a session and print every event as a JSON line. Lines read from
    /// stdin are sent as chat messages.
    Join {
        /// Session to join
        #[arg(long)]
        session: String,
        /// Local user id
        #[arg(long)]
        user: String,
        /// Display name
        #[arg(long)]
        name: String,
        /// Role to request
        #[arg(long, default_value = "editor")]
        role: ParticipantRole,
    },
    /// Create a session and print it.
    Create {
        /// Session title
        #[arg(long)]
        title: String,
        /// Session type (document, whiteboard, project, discussion, video-conference)
        #[arg(long = "type", default_value = "document")]
        session_type: SessionType,
        /// Owner user id
        #[arg(long)]
        owner: String,
        /// Optional description
        #[arg(long)]
        description: Option<String>,
    },
    /// Fetch a session and print it.
    Get {
        /// Session id
        session_id: String,
    },
    /// Invite someone to a session.
    Invite {
        /// Session id
        session_id: String,
        /// Invitee email address
        #[arg(long)]
        email: String,
        /// Role granted on acceptance
        #[arg(long, default_value = "viewer")]
        role: ParticipantRole,
        /// Personal note
        #[arg(long)]
        message: Option<String>,
    },
}

impl TryFrom<&CliArgs> for ClientConfig {
    type Error = ConfigError;

    fn try_from(args: &CliArgs) -> Result<Self, Self::Error> {
        let mut config = Self::parse(&args.api_url)?.with_reconnect(ReconnectPolicy::new(
            Duration::from_millis(args.reconnect_base_ms),
            args.reconnect_max_attempts,
        ));
        config.auth_token = args.token.clone().filter(|t| !t.is_empty());
        config.request_timeout = args
            .http_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(std::iter::once("collab-cli").chain(args.iter().copied()))
            .expect("args")
    }

    #[test]
    fn test_join_args() {
        let args = parse(&[
            "--api-url",
            "https://connect.example/api",
            "join",
            "--session",
            "s1",
            "--user",
            "u1",
            "--name",
            "Alice",
            "--reconnect-base-ms",
            "200",
        ]);

        match &args.command {
            Command::Join {
                session,
                user,
                name,
                role,
            } => {
                assert_eq!(session, "s1");
                assert_eq!(user, "u1");
                assert_eq!(name, "Alice");
                assert_eq!(*role, ParticipantRole::Editor);
            }
            other => panic!("unexpected command: {other:?}"),
        }

        let config = ClientConfig::try_from(&args).expect("config");
        assert_eq!(config.api_url.as_str(), "https://connect.example/api");
        assert_eq!(config.reconnect.base_delay, Duration::from_millis(200));
        assert_eq!(config.reconnect.max_attempts, 5);
    }

    #[test]
    fn test_create_args() {
        let args = parse(&[
            "create",
            "--title",
            "Reading plan",
            "--type",
            "video-conference",
            "--owner",
            "u1",
        ]);
        match args.command {
            Command::Create {
                session_type,
                description,
                ..
            } => {
                assert_eq!(session_type, SessionType::VideoConference);
                assert!(description.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_invite_args_and_timeout() {
        let args = parse(&[
            "invite",
            "s1",
            "--email",
            "head@school.example",
            "--role",
            "commenter",
            "--http-timeout-secs",
            "10",
            "--token",
            "secret",
        ]);
        assert!(matches!(
            args.command,
            Command::Invite {
                role: ParticipantRole::Commenter,
                ..
            }
        ));

        let config = ClientConfig::try_from(&args).expect("config");
        assert_eq!(config.request_timeout, Some(Duration::from_secs(10)));
        assert_eq!(config.auth_token.as_deref(), Some("secret"));
    }

    #[test]
    fn test_unknown_role_is_rejected() {
        let result = CliArgs::try_parse_from([
            "collab-cli",
            "join",
            "--session",
            "s1",
            "--user",
            "u1",
            "--name",
            "Alice",
            "--role",
            "admin",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_api_url() {
        let args = parse(&["--api-url", "::nope::", "get", "s1"]);
        assert!(ClientConfig::try_from(&args).is_err());
    }
}
