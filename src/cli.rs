use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::chat_list::ChatList;

#[derive(Debug, Parser)]
#[command(
    name = "tdcache",
    about = "Local state cache for a TDLib-style chat backend"
)]
pub struct Cli {
    /// Path to config file (default: ./tdcache.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Replay a JSONL update log and print the resulting rows
    Replay(ReplayArgs),
    /// Print the effective configuration
    Inspect,
}

#[derive(Debug, Clone, Args)]
pub struct ReplayArgs {
    /// Newline-delimited JSON file, one update object per line
    pub path: PathBuf,

    /// Chat list to show: main, archive or filter:<id>
    #[arg(long, default_value_t = ChatList::Main)]
    pub list: ChatList,

    /// Show the messages of this chat instead of the chat list
    #[arg(long, allow_negative_numbers = true)]
    pub chat: Option<i64>,
}

impl Cli {
    pub fn command_or_default(&self) -> Command {
        self.command.clone().unwrap_or(Command::Inspect)
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Command};
    use crate::domain::chat_list::ChatList;

    #[test]
    fn defaults_to_inspect_when_command_is_missing() {
        let cli = Cli::parse_from(["tdcache"]);

        assert!(matches!(cli.command_or_default(), Command::Inspect));
    }

    #[test]
    fn parses_replay_with_list_and_global_config() {
        let cli = Cli::parse_from([
            "tdcache",
            "replay",
            "updates.jsonl",
            "--list",
            "filter:3",
            "--config",
            "custom.toml",
        ]);

        let Command::Replay(args) = cli.command_or_default() else {
            panic!("replay command expected");
        };
        assert_eq!(args.list, ChatList::Filter(3));
        assert_eq!(args.chat, None);
        assert_eq!(args.path.to_string_lossy(), "updates.jsonl");
        assert_eq!(
            cli.config
                .as_deref()
                .map(|p| p.to_string_lossy().to_string()),
            Some("custom.toml".to_owned())
        );
    }

    #[test]
    fn accepts_negative_chat_ids() {
        let cli = Cli::parse_from(["tdcache", "replay", "log.jsonl", "--chat", "-1001234"]);

        let Command::Replay(args) = cli.command_or_default() else {
            panic!("replay command expected");
        };
        assert_eq!(args.list, ChatList::Main);
        assert_eq!(args.chat, Some(-1_001_234));
    }

    #[test]
    fn rejects_unknown_lists() {
        let parsed = Cli::try_parse_from(["tdcache", "replay", "log.jsonl", "--list", "pinned"]);

        assert!(parsed.is_err());
    }
}
