use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::message::ProtocolVersion;

/// rc-notify – RocketChat notifications from the shell
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Activate verbose output (-v, -vv, etc.)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Config profile to take defaults from
    #[arg(short, long, global = true)]
    pub profile: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every subcommand that talks to RocketChat.
#[derive(Args, Debug, Clone, Default)]
pub struct Target {
    /// RocketChat URI for transmission
    #[arg(long, env = "RC_URI")]
    pub uri: Option<String>,

    /// Wire format of the target instance
    #[arg(long, value_enum)]
    pub protocol: Option<ProtocolVersion>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send a single message
    Send {
        #[command(flatten)]
        target: Target,

        /// Channel to emit to
        #[arg(long = "chan")]
        channel: Option<String>,

        /// User to emit as
        #[arg(long)]
        user: Option<String>,

        /// Alias shown next to the message
        #[arg(long)]
        alias: Option<String>,

        /// Message to send
        #[arg(long = "msg")]
        message: Option<String>,

        /// Emoji for the message
        #[arg(long)]
        emoji: Option<String>,

        /// Emit message as code
        #[arg(long)]
        code: bool,
    },
    /// Run a command and report its outcome
    Run {
        #[command(flatten)]
        target: Target,

        /// Channel to emit to
        #[arg(long = "chan")]
        channel: Option<String>,

        /// User to emit as
        #[arg(long)]
        user: Option<String>,

        /// Run command in the background
        #[arg(long)]
        background: bool,

        /// Skip notification if command was successful
        #[arg(long)]
        skip_successful: bool,

        /// Emit messages to console / shell as well
        #[arg(long = "print-console")]
        print_console: bool,

        /// Maximum number of command output lines to emit (default: unlimited)
        #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
        max_lines: i64,

        /// Command line to execute
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
        command: Vec<String>,
    },
    /// Upload a file into a room through the REST API
    Upload {
        #[command(flatten)]
        target: Target,

        /// Room identifier to upload into
        #[arg(long)]
        room: String,

        /// File to upload
        #[arg(long, value_name = "PATH")]
        file: PathBuf,

        /// Message posted with the file
        #[arg(long = "msg")]
        message: Option<String>,

        /// Description of the file
        #[arg(long)]
        description: Option<String>,

        /// API user id
        #[arg(long, env = "RC_USER_ID")]
        user_id: Option<String>,

        /// API access token
        #[arg(long, env = "RC_AUTH_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },
    /// Print build information
    Version {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_collects_trailing_command() {
        let cli = Cli::try_parse_from([
            "rc-notify", "run", "--chan", "ops", "--max-lines", "2", "--", "ls", "-la", "/tmp",
        ])
        .unwrap();
        match cli.command {
            Commands::Run {
                channel,
                max_lines,
                command,
                ..
            } => {
                assert_eq!(channel.as_deref(), Some("ops"));
                assert_eq!(max_lines, 2);
                assert_eq!(command, vec!["ls", "-la", "/tmp"]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn run_requires_a_command() {
        assert!(Cli::try_parse_from(["rc-notify", "run", "--chan", "ops"]).is_err());
    }

    #[test]
    fn send_parses_protocol() {
        let cli = Cli::try_parse_from([
            "rc-notify", "send", "--uri", "http://x", "--chan", "c", "--msg", "m", "--protocol", "legacy",
        ])
        .unwrap();
        match cli.command {
            Commands::Send { target, .. } => {
                assert_eq!(target.protocol, Some(ProtocolVersion::Legacy));
                assert_eq!(target.uri.as_deref(), Some("http://x"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
