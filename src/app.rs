use anyhow::Result;
use serde_json::Value;

use crate::{
    cli::{Cli, Command, ReplayArgs},
    domain,
    infra::{self, config::AppConfig},
    telegram,
    usecases::{
        self, bootstrap,
        replay::{run_replay, ReplayReport, ReplayRequest},
    },
};

pub fn run(cli: Cli) -> Result<()> {
    let context = bootstrap::bootstrap(cli.config.as_deref())?;

    tracing::debug!(
        domain = domain::module_name(),
        telegram = telegram::module_name(),
        usecases = usecases::module_name(),
        infra = infra::module_name(),
        "module boundaries loaded"
    );

    match cli.command_or_default() {
        Command::Inspect => print!("{}", render_config(&context.config)?),
        Command::Replay(args) => {
            let report = run_replay(&context.config, &replay_request(args))?;
            for line in render_report(&report) {
                println!("{line}");
            }
        }
    }

    Ok(())
}

fn replay_request(args: ReplayArgs) -> ReplayRequest {
    ReplayRequest {
        path: args.path,
        list: args.list,
        chat_id: args.chat,
    }
}

fn render_config(config: &AppConfig) -> Result<String> {
    Ok(toml::to_string_pretty(config)?)
}

/// One JSON object per row, preceded by two header lines.
fn render_report(report: &ReplayReport) -> Vec<String> {
    let header = match report {
        ReplayReport::Chats { list, rows, .. } => {
            format!("# chat list {list}: {} rows", rows.len())
        }
        ReplayReport::Messages { chat_id, rows, .. } => {
            format!("# chat {chat_id}: {} messages", rows.len())
        }
    };
    let roles = format!("# roles: {}", report.roles().join(", "));

    [header, roles]
        .into_iter()
        .chain(
            report
                .rows()
                .iter()
                .map(|row| Value::Object(row.clone()).to_string()),
        )
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{domain::chat_list::ChatList, test_support::fields};

    #[test]
    fn config_renders_as_toml_sections() {
        let rendered = render_config(&AppConfig::default()).expect("config should render");

        assert!(rendered.contains("[logging]"));
        assert!(rendered.contains("[cache]"));
        assert!(rendered.contains("message_page_size = 50"));
        assert!(rendered.contains("idle_exit_ms = 1500"));
    }

    #[test]
    fn report_lines_start_with_header() {
        let report = ReplayReport::Chats {
            list: ChatList::Archive,
            roles: &["id", "title"],
            rows: vec![fields(json!({"id": "5", "title": "A"}))],
        };

        let lines = render_report(&report);

        assert_eq!(lines[0], "# chat list archive: 1 rows");
        assert_eq!(lines[1], "# roles: id, title");
        assert_eq!(lines[2], r#"{"id":"5","title":"A"}"#);
    }
}
