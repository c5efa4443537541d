/// One line of REPL input.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    None,
    Ask(String),
    /// Show modes, or switch to the named one.
    Mode(Option<String>),
    /// Enrich message `n` (1-based), or the latest eligible one.
    Web(Option<usize>),
    Sources(usize),
    Filters,
    History(Option<u32>),
    Delete(String),
    Health,
    Clear,
    Login,
    Logout,
    Help,
    Quit,
    /// A known command with bad arguments.
    Usage(&'static str),
    Unknown(String),
}

pub fn parse(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::None;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Command::Ask(line.to_string());
    };

    let mut parts = rest.split_whitespace();
    let name = parts.next().unwrap_or_default().to_lowercase();
    let arg = parts.next();
    let extra = parts.next().is_some();

    match (name.as_str(), arg) {
        ("mode", arg) if !extra => Command::Mode(arg.map(str::to_string)),
        ("mode", _) => Command::Usage("/mode [basic|combined|enhanced]"),
        ("web", None) => Command::Web(None),
        ("web", Some(n)) => match parse_index(n) {
            Some(n) if !extra => Command::Web(Some(n)),
            _ => Command::Usage("/web [message number]"),
        },
        ("sources", Some(n)) => match parse_index(n) {
            Some(n) if !extra => Command::Sources(n),
            _ => Command::Usage("/sources <message number>"),
        },
        ("sources", None) => Command::Usage("/sources <message number>"),
        ("filters", None) => Command::Filters,
        ("history", None) => Command::History(None),
        ("history", Some(n)) => match n.parse::<u32>() {
            Ok(limit) if limit > 0 && !extra => Command::History(Some(limit)),
            _ => Command::Usage("/history [limit]"),
        },
        ("delete", Some(id)) if !extra => Command::Delete(id.to_string()),
        ("delete", _) => Command::Usage("/delete <stored message id>"),
        ("health", None) => Command::Health,
        ("clear", None) => Command::Clear,
        ("login", None) => Command::Login,
        ("logout", None) => Command::Logout,
        ("help" | "?", _) => Command::Help,
        ("quit" | "exit" | "q", None) => Command::Quit,
        _ => Command::Unknown(line.to_string()),
    }
}

fn parse_index(value: &str) -> Option<usize> {
    value.parse::<usize>().ok().filter(|n| *n > 0)
}

pub const HELP: &[(&str, &str)] = &[
    ("<text>", "ask a question"),
    ("/mode [name]", "show or switch the query mode"),
    ("/web [n]", "enrich answer n with a web search (default: latest eligible)"),
    ("/sources <n>", "show or hide the sources of message n"),
    ("/filters", "list the filter values the backend knows"),
    ("/history [limit]", "reload stored exchanges from the server"),
    ("/delete <id>", "delete a stored exchange on the server"),
    ("/health", "check the backend"),
    ("/clear", "clear the conversation"),
    ("/login", "log in again"),
    ("/logout", "forget the saved session"),
    ("/help", "show this help"),
    ("/quit", "leave"),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_a_question() {
        assert_eq!(parse("  What is X  "), Command::Ask("What is X".into()));
        assert_eq!(parse("   "), Command::None);
    }

    #[test]
    fn parses_commands_with_arguments() {
        assert_eq!(parse("/mode"), Command::Mode(None));
        assert_eq!(parse("/mode basic"), Command::Mode(Some("basic".into())));
        assert_eq!(parse("/WEB"), Command::Web(None));
        assert_eq!(parse("/web 3"), Command::Web(Some(3)));
        assert_eq!(parse("/sources 2"), Command::Sources(2));
        assert_eq!(parse("/history 20"), Command::History(Some(20)));
        assert_eq!(parse("/delete 65f0c2"), Command::Delete("65f0c2".into()));
        assert_eq!(parse("/exit"), Command::Quit);
    }

    #[test]
    fn bad_arguments_report_usage() {
        assert!(matches!(parse("/web zero"), Command::Usage(_)));
        assert!(matches!(parse("/web 0"), Command::Usage(_)));
        assert!(matches!(parse("/sources"), Command::Usage(_)));
        assert!(matches!(parse("/history -1"), Command::Usage(_)));
        assert!(matches!(parse("/delete"), Command::Usage(_)));
        assert!(matches!(parse("/mode basic extra"), Command::Usage(_)));
    }

    #[test]
    fn unknown_commands_are_kept_verbatim() {
        assert_eq!(parse("/frobnicate"), Command::Unknown("/frobnicate".into()));
        assert_eq!(parse("/clear now"), Command::Unknown("/clear now".into()));
    }
}
