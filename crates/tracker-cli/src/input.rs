//! Parsing of interactive commands typed on stdin

use tracker_core::{DashboardCommand, MessageId, SourceFilter, StatusFilter};

pub const HELP: &str = "\
Commands:
  read <id>          toggle read/unread for a message
  status <all|unread|read>
  source <all|arbor|gmail>
  search <text>      filter by subject, sender or content
  clear              clear the search
  dismiss <n>        dismiss notification #n
  reload             reload messages
  show               redraw the dashboard
  help               show this help
  quit               exit";

/// What a line of input asks for
#[derive(Debug, Clone)]
pub enum Input {
    Command(DashboardCommand),
    Redraw,
    Help,
    Quit,
}

pub fn parse_line(line: &str) -> Result<Option<Input>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    let input = match verb.to_ascii_lowercase().as_str() {
        "read" | "toggle" => {
            if rest.is_empty() {
                return Err("usage: read <id>".to_string());
            }
            Input::Command(DashboardCommand::ToggleRead {
                id: MessageId::new(rest),
            })
        }
        "status" => Input::Command(DashboardCommand::SetStatusFilter(
            rest.parse::<StatusFilter>()?,
        )),
        "source" => Input::Command(DashboardCommand::SetSourceFilter(
            rest.parse::<SourceFilter>()?,
        )),
        "search" => Input::Command(DashboardCommand::SetSearch(rest.to_string())),
        "clear" => Input::Command(DashboardCommand::SetSearch(String::new())),
        "dismiss" => {
            let id = rest
                .trim_start_matches('#')
                .parse()
                .map_err(|_| format!("not a notification number: {}", rest))?;
            Input::Command(DashboardCommand::Dismiss(id))
        }
        "reload" => Input::Command(DashboardCommand::Reload),
        "show" => Input::Redraw,
        "help" | "?" => Input::Help,
        "quit" | "exit" | "q" => Input::Quit,
        other => return Err(format!("unknown command: {} (try 'help')", other)),
    };

    Ok(Some(input))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(line: &str) -> DashboardCommand {
        match parse_line(line) {
            Ok(Some(Input::Command(command))) => command,
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_commands() {
        assert!(matches!(
            command("read 42"),
            DashboardCommand::ToggleRead { id } if id == MessageId::from(42)
        ));
        assert!(matches!(
            command("status unread"),
            DashboardCommand::SetStatusFilter(StatusFilter::Unread)
        ));
        assert!(matches!(
            command("SOURCE Gmail"),
            DashboardCommand::SetSourceFilter(SourceFilter::Gmail)
        ));
        assert!(matches!(
            command("search  field trip "),
            DashboardCommand::SetSearch(q) if q == "field trip"
        ));
        assert!(matches!(command("clear"), DashboardCommand::SetSearch(q) if q.is_empty()));
        assert!(matches!(command("dismiss #3"), DashboardCommand::Dismiss(3)));
        assert!(matches!(command("reload"), DashboardCommand::Reload));
    }

    #[test]
    fn test_parse_other_inputs() {
        assert!(matches!(parse_line("   "), Ok(None)));
        assert!(matches!(parse_line("q"), Ok(Some(Input::Quit))));
        assert!(matches!(parse_line("help"), Ok(Some(Input::Help))));
        assert!(matches!(parse_line("show"), Ok(Some(Input::Redraw))));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_line("read").is_err());
        assert!(parse_line("status spam").is_err());
        assert!(parse_line("dismiss abc").is_err());
        assert!(parse_line("frobnicate").is_err());
    }
}
