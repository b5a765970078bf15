// src/commands.rs

use std::str::FromStr;
use thiserror::Error;
use url::Url;
use vanguard_rs_verdict::core::ledger::PurgeScope;
use vanguard_rs_verdict::{ListKind, Verdict};

/// What a line typed into the console asks for.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Evaluate(String),
    Add(ListKind, String),
    Remove(ListKind, String),
    Clear(ListKind),
    Forget(String),
    Purge(PurgeScope),
    /// Narrative by query id (`q-...`) or by domain.
    Report(String),
    Lists,
    History,
    Quit,
}

#[derive(Error, Debug, PartialEq)]
pub enum CommandError {
    #[error("unknown command ':{0}'")]
    Unknown(String),
    #[error(":{0} needs {1}")]
    MissingArgument(&'static str, &'static str),
    #[error("'{0}' is not a valid argument here")]
    BadArgument(String),
}

/// Reduces typed input to a host name: `https://Foo.com/login` becomes `Foo.com`.
pub fn target_host(raw: &str) -> String {
    let raw = raw.trim();
    let with_scheme = if raw.contains("://") { raw.to_string() } else { format!("http://{raw}") };
    Url::parse(&with_scheme)
        .ok()
        .and_then(|url| url.host_str().map(String::from))
        .unwrap_or_else(|| raw.to_string())
}

fn list_kind(word: &str) -> Result<ListKind, CommandError> {
    ListKind::from_str(word).map_err(|_| CommandError::BadArgument(word.to_string()))
}

pub fn parse_command(input: &str) -> Result<Command, CommandError> {
    let input = input.trim();
    let Some(rest) = input.strip_prefix(':') else {
        return Ok(Command::Evaluate(target_host(input)));
    };

    let mut words = rest.split_whitespace();
    let name = words.next().unwrap_or_default().to_ascii_lowercase();
    let arg = words.next();

    let domain = |cmd: &'static str| {
        arg.map(target_host).ok_or(CommandError::MissingArgument(cmd, "a domain"))
    };

    match name.as_str() {
        "allow" => Ok(Command::Add(ListKind::Allow, domain("allow")?)),
        "block" => Ok(Command::Add(ListKind::Block, domain("block")?)),
        "unallow" => Ok(Command::Remove(ListKind::Allow, domain("unallow")?)),
        "unblock" => Ok(Command::Remove(ListKind::Block, domain("unblock")?)),
        "clear" => {
            let word = arg.ok_or(CommandError::MissingArgument("clear", "allow or block"))?;
            Ok(Command::Clear(list_kind(word)?))
        }
        "forget" => {
            let query_id = arg.ok_or(CommandError::MissingArgument("forget", "a query id"))?;
            Ok(Command::Forget(query_id.to_string()))
        }
        "purge" => match arg {
            None => Ok(Command::Purge(PurgeScope::All)),
            Some(word) if word.eq_ignore_ascii_case("all") => Ok(Command::Purge(PurgeScope::All)),
            Some(word) => Verdict::from_str(word)
                .map(|v| Command::Purge(PurgeScope::Verdict(v)))
                .map_err(|_| CommandError::BadArgument(word.to_string())),
        },
        "report" => {
            let target = arg.ok_or(CommandError::MissingArgument("report", "a query id or domain"))?;
            if target.starts_with("q-") {
                Ok(Command::Report(target.to_string()))
            } else {
                Ok(Command::Report(target_host(target)))
            }
        }
        "lists" => Ok(Command::Lists),
        "history" => Ok(Command::History),
        "q" | "quit" => Ok(Command::Quit),
        other => Err(CommandError::Unknown(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_input_is_an_evaluation_of_its_host() {
        assert_eq!(parse_command("example.com").unwrap(), Command::Evaluate("example.com".into()));
        assert_eq!(
            parse_command("  https://Login.Example.com/verify?x=1 ").unwrap(),
            Command::Evaluate("login.example.com".into())
        );
    }

    #[test]
    fn list_commands() {
        assert_eq!(parse_command(":block evil.tk").unwrap(), Command::Add(ListKind::Block, "evil.tk".into()));
        assert_eq!(parse_command(":UNALLOW good.com").unwrap(), Command::Remove(ListKind::Allow, "good.com".into()));
        assert_eq!(parse_command(":clear Block").unwrap(), Command::Clear(ListKind::Block));
        assert_eq!(parse_command(":lists").unwrap(), Command::Lists);
        assert_eq!(parse_command(":allow"), Err(CommandError::MissingArgument("allow", "a domain")));
        assert_eq!(parse_command(":clear grey"), Err(CommandError::BadArgument("grey".into())));
    }

    #[test]
    fn ledger_commands() {
        assert_eq!(parse_command(":purge").unwrap(), Command::Purge(PurgeScope::All));
        assert_eq!(parse_command(":purge malicious").unwrap(), Command::Purge(PurgeScope::Verdict(Verdict::Malicious)));
        assert_eq!(parse_command(":purge nope"), Err(CommandError::BadArgument("nope".into())));
        assert_eq!(parse_command(":forget q-abc").unwrap(), Command::Forget("q-abc".into()));
        assert_eq!(parse_command(":report q-abc").unwrap(), Command::Report("q-abc".into()));
        assert_eq!(parse_command(":report Bad.TK").unwrap(), Command::Report("bad.tk".into()));
    }

    #[test]
    fn unknown_commands_are_rejected() {
        assert_eq!(parse_command(":frobnicate x"), Err(CommandError::Unknown("frobnicate".into())));
        assert_eq!(parse_command(":q").unwrap(), Command::Quit);
    }
}
