//! Operator command grammar for `send-to-port`
//!
//! Tokens are whitespace-delimited and order-independent, with last-write-wins
//! on repeated flags:
//!
//! - any token containing `?` or `--help` (any case) aborts with usage
//! - `-i:<int>` / `-I:<int>` selects the chassis address
//! - `-p:<int>` / `-P:<int>` selects the 1-based port index
//! - everything else is payload, joined with single spaces

use crate::error::{CardFrameError, Result};

/// Name the console registers the command under
pub const SEND_COMMAND: &str = "send-to-port";

/// Usage text printed for `?` / `--help`
pub const USAGE: &str = "\
send-to-port [-i:<chassis>] -p:<port> <payload...>
    -i:<chassis>   chassis address (defaults to the console's default chassis)
    -p:<port>      1-based serial port index on the chassis card
    ? | --help     show this help";

/// Addressed send request produced by the parser
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendRequest {
    /// Raw `-i:` value, validated at resolution time
    pub chassis: Option<u32>,
    /// Raw `-p:` value, validated at resolution time
    pub target_port_index: Option<u32>,
    pub payload: String,
}

/// Outcome of parsing one command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedCommand {
    /// Input too short to mean anything
    Empty,
    /// Help requested; nothing is sent
    Help,
    Send(SendRequest),
}

/// Parse the arguments of one `send-to-port` invocation
///
/// # Examples
///
/// ```
/// use cardframe_core::command::{parse_command, ParsedCommand};
///
/// let ParsedCommand::Send(req) = parse_command("-p:2 hello world").unwrap() else {
///     panic!("expected a send request");
/// };
/// assert_eq!(req.target_port_index, Some(2));
/// assert_eq!(req.payload, "hello world");
/// ```
pub fn parse_command(input: &str) -> Result<ParsedCommand> {
    if input.trim().chars().count() <= 1 {
        return Ok(ParsedCommand::Empty);
    }

    let mut request = SendRequest::default();
    let mut payload: Vec<&str> = Vec::new();

    for token in input.split_whitespace() {
        if token.contains('?') || token.to_lowercase().contains("--help") {
            return Ok(ParsedCommand::Help);
        }

        if let Some(value) = flag_value(token, 'i') {
            request.chassis = Some(parse_flag_int(token, value)?);
        } else if let Some(value) = flag_value(token, 'p') {
            request.target_port_index = Some(parse_flag_int(token, value)?);
        } else {
            payload.push(token);
        }
    }

    request.payload = payload.join(" ").trim_end().to_string();
    Ok(ParsedCommand::Send(request))
}

/// Last well-formed `-p:` value in `input`, even when the line fails to parse
pub fn attempted_port_index(input: &str) -> Option<u32> {
    input
        .split_whitespace()
        .filter_map(|token| flag_value(token, 'p'))
        .filter_map(|value| value.parse::<u32>().ok())
        .last()
}

/// Value of a `-x:` / `-X:` flag, if `token` is that flag
fn flag_value(token: &str, flag: char) -> Option<&str> {
    let rest = token.strip_prefix('-')?;
    let mut chars = rest.chars();
    let name = chars.next()?;
    if !name.eq_ignore_ascii_case(&flag) {
        return None;
    }
    chars.as_str().strip_prefix(':')
}

fn parse_flag_int(token: &str, value: &str) -> Result<u32> {
    if value.is_empty() {
        return Err(CardFrameError::Parse(format!(
            "Flag '{}' requires an integer value",
            token
        )));
    }
    value
        .parse::<u32>()
        .map_err(|e| CardFrameError::Parse(format!("Invalid value in '{}': {}", token, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn send(input: &str) -> SendRequest {
        match parse_command(input).unwrap() {
            ParsedCommand::Send(req) => req,
            other => panic!("Expected Send, got {:?}", other),
        }
    }

    #[test]
    fn test_port_and_payload() {
        let req = send("-p:2 hello world");
        assert_eq!(req.target_port_index, Some(2));
        assert_eq!(req.chassis, None);
        assert_eq!(req.payload, "hello world");
    }

    #[test]
    fn test_flags_are_order_independent() {
        let req = send("hello -P:3 there -I:8 world");
        assert_eq!(req.target_port_index, Some(3));
        assert_eq!(req.chassis, Some(8));
        assert_eq!(req.payload, "hello there world");
    }

    #[test]
    fn test_last_flag_wins() {
        let req = send("-p:1 -p:3 data");
        assert_eq!(req.target_port_index, Some(3));
    }

    #[test]
    fn test_help_aborts_parsing() {
        assert_eq!(parse_command("-i:8 -p:1 ?").unwrap(), ParsedCommand::Help);
        assert_eq!(parse_command("--HELP").unwrap(), ParsedCommand::Help);
        assert_eq!(parse_command("-p:1 what?").unwrap(), ParsedCommand::Help);
    }

    #[test]
    fn test_empty_and_single_char_are_noop() {
        assert_eq!(parse_command("").unwrap(), ParsedCommand::Empty);
        assert_eq!(parse_command("x").unwrap(), ParsedCommand::Empty);
        assert_eq!(parse_command("?").unwrap(), ParsedCommand::Empty);
        assert_eq!(parse_command("   ").unwrap(), ParsedCommand::Empty);
    }

    #[test]
    fn test_flag_without_value_is_parse_error() {
        assert!(matches!(
            parse_command("-p: hello"),
            Err(CardFrameError::Parse(_))
        ));
        assert!(matches!(
            parse_command("-i: -p:1 hello"),
            Err(CardFrameError::Parse(_))
        ));
    }

    #[test]
    fn test_flag_with_garbage_is_parse_error() {
        assert!(matches!(
            parse_command("-p:two hello"),
            Err(CardFrameError::Parse(_))
        ));
        assert!(matches!(
            parse_command("-p:-1 hello"),
            Err(CardFrameError::Parse(_))
        ));
    }

    #[test]
    fn test_attempted_port_index_survives_bad_chassis() {
        assert!(parse_command("-p:2 -i:x hello").is_err());
        assert_eq!(attempted_port_index("-p:2 -i:x hello"), Some(2));
        assert_eq!(attempted_port_index("-P:4 -p:oops"), Some(4));
        assert_eq!(attempted_port_index("-p: hello"), None);
        assert_eq!(attempted_port_index("hello"), None);
    }

    #[test]
    fn test_zero_index_parses() {
        // Rejected later, at resolution
        assert_eq!(send("-p:0 x").target_port_index, Some(0));
    }

    #[test]
    fn test_payload_may_be_empty() {
        let req = send("-p:1");
        assert_eq!(req.target_port_index, Some(1));
        assert_eq!(req.payload, "");
    }

    #[test]
    fn test_unrelated_dash_tokens_are_payload() {
        let req = send("-p:1 -x:5 -pfoo --verbose");
        assert_eq!(req.payload, "-x:5 -pfoo --verbose");
    }

    #[test]
    fn test_whitespace_collapses_in_payload() {
        let req = send("-p:1   POWER    ON  ");
        assert_eq!(req.payload, "POWER ON");
    }
}
