//! # REPL Command Interpreter
//!
//! Parses text commands typed at the console and runs them against a
//! [`ServoLink`].
//!
//! ## Commands
//!
//! | Command | Args | Effect |
//! |---------|------|--------|
//! | `e`, `exit` | - | end the session |
//! | `so`, `setone` | `CHANNEL VALUE` | set one channel |
//! | `sp`, `sop`, `spo`, `setpercent`, `setonepercent` | `CHANNEL PERCENT` | set one channel from a percentage |
//! | `sm`, `setmultiple` | `[VALUE \| CHANNEL:VALUE]...` | set consecutive channels |
//! | `gt`, `telemetry` | `ID` | request one telemetry sample |
//! | `h`, `help` | - | list commands |
//! | `<CHANNEL> <VALUE>` | - | shorthand for `so` |
//!
//! For `sm`, a channel counter starts at 0. A bare value advances the counter
//! and targets the new channel; `CHANNEL:VALUE` jumps the counter to CHANNEL.
//! `sm 10 20 5:30 40` sets 1=10, 2=20, 5=30, 6=40.

use std::str::FromStr;

use crate::error::{Result, ServoBridgeError};
use crate::link::{SetOutcome, SetReport, ServoLink};
use crate::protocol::wire::{CHANNEL_VALUE_MAX, CHANNEL_VALUE_MIN};

/// Help text printed by `help`
pub const HELP: &str = "\
commands:
  so|setone CHANNEL VALUE          set one channel (-1024..1024)
  sp|setpercent CHANNEL PERCENT    set one channel in percent (-100..100)
  sm|setmultiple [V|CH:V]...       set consecutive channels
  gt|telemetry ID                  request one telemetry sample
  CHANNEL VALUE                    shorthand for so
  h|help                           this text
  e|exit                           quit";

/// One parsed REPL command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Exit,
    Help,
    SetOne { channel: i64, value: i64 },
    SetOnePercent { channel: i64, percent: f64 },
    SetMultiple(Vec<(i64, i64)>),
    GetTelemetry { id: i64 },
}

/// What the session should do after a line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    /// Keep reading; print the message if any
    Continue(Option<String>),

    /// End the session
    Exit,
}

/// Parse one input line
///
/// Returns `Ok(None)` for a blank line.
///
/// # Errors
///
/// Returns [`ServoBridgeError::Parse`] for unknown commands, missing
/// arguments, or malformed numbers. Any integer that fits in an `i64` parses;
/// out-of-domain values are reported as `Range` when the command runs.
///
/// # Examples
///
/// ```
/// use servo_bridge::repl::{parse_command, Command};
///
/// let cmd = parse_command("so 3 -200").unwrap();
/// assert_eq!(cmd, Some(Command::SetOne { channel: 3, value: -200 }));
///
/// let cmd = parse_command("3 -200").unwrap();
/// assert_eq!(cmd, Some(Command::SetOne { channel: 3, value: -200 }));
/// ```
pub fn parse_command(line: &str) -> Result<Option<Command>> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some((&head, args)) = tokens.split_first() else {
        return Ok(None);
    };

    let command = match head {
        "e" | "exit" => Command::Exit,
        "h" | "help" => Command::Help,
        "so" | "setone" => Command::SetOne {
            channel: number(arg(args, 0, "CHANNEL")?)?,
            value: number(arg(args, 1, "VALUE")?)?,
        },
        "sp" | "sop" | "spo" | "setpercent" | "setonepercent" => Command::SetOnePercent {
            channel: number(arg(args, 0, "CHANNEL")?)?,
            percent: percent(arg(args, 1, "PERCENT")?)?,
        },
        "sm" | "setmultiple" => Command::SetMultiple(parse_multiple(args)?),
        "gt" | "telemetry" => Command::GetTelemetry {
            id: number(arg(args, 0, "ID")?)?,
        },
        _ if head.parse::<i64>().is_ok() => Command::SetOne {
            channel: number(head)?,
            value: number(arg(args, 0, "VALUE")?)?,
        },
        _ => {
            return Err(ServoBridgeError::Parse(format!(
                "unknown command '{}' (try 'help')",
                head
            )))
        }
    };

    Ok(Some(command))
}

fn parse_multiple(args: &[&str]) -> Result<Vec<(i64, i64)>> {
    let mut channel: i64 = 0;
    let mut entries = Vec::with_capacity(args.len());

    for token in args {
        let value = match token.split_once(':') {
            Some((ch, value)) => {
                channel = number(ch)?;
                number(value)?
            }
            None => {
                channel = channel.checked_add(1).ok_or_else(|| {
                    ServoBridgeError::Parse("channel counter overflowed".to_string())
                })?;
                number(token)?
            }
        };
        entries.push((channel, value));
    }

    Ok(entries)
}

fn arg<'a>(args: &[&'a str], index: usize, name: &str) -> Result<&'a str> {
    args.get(index)
        .copied()
        .ok_or_else(|| ServoBridgeError::Parse(format!("missing {}", name)))
}

fn percent(token: &str) -> Result<f64> {
    let value: f64 = number(token)?;
    if !value.is_finite() {
        return Err(ServoBridgeError::Parse(format!("'{}' is not a finite percentage", token)));
    }
    Ok(value)
}

fn number<T: FromStr>(token: &str) -> Result<T> {
    token
        .parse()
        .map_err(|_| ServoBridgeError::Parse(format!("'{}' is not a valid number", token)))
}

/// Parse and run one input line against the link.
///
/// Parse and engine errors become a message; they never end the session.
pub async fn handle_line(link: &ServoLink, line: &str) -> Flow {
    let command = match parse_command(line) {
        Ok(Some(command)) => command,
        Ok(None) => return Flow::Continue(None),
        Err(e) => return Flow::Continue(Some(e.to_string())),
    };

    match execute(link, command).await {
        Ok(flow) => flow,
        Err(e) => Flow::Continue(Some(format!("error: {}", e))),
    }
}

/// Run one parsed command.
pub async fn execute(link: &ServoLink, command: Command) -> Result<Flow> {
    let message = match command {
        Command::Exit => return Ok(Flow::Exit),
        Command::Help => HELP.to_string(),
        Command::SetOne { channel, value } => {
            let channel = channel_id(channel)?;
            let outcome = link.set_channel(channel, channel_value(value)?).await?;
            describe_outcome(channel, outcome)
        }
        Command::SetOnePercent { channel, percent } => {
            let report = link.set_percent([(channel_id(channel)?, percent)]).await;
            describe_report(report)
        }
        Command::SetMultiple(entries) => {
            let entries = entries
                .into_iter()
                .map(|(channel, value)| Ok((channel_id(channel)?, channel_value(value)?)))
                .collect::<Result<Vec<_>>>()?;
            describe_report(link.set(entries).await)
        }
        Command::GetTelemetry { id } => {
            let id = i32::try_from(id)
                .map_err(|_| ServoBridgeError::InvalidArgument(format!("telemetry id {} out of range", id)))?;
            let sample = link.get_telemetry(id).await?;
            format!("sensor {} = {}", sample.id, sample.value)
        }
    };

    Ok(Flow::Continue(Some(message)))
}

fn channel_id(channel: i64) -> Result<u16> {
    u16::try_from(channel).map_err(|_| ServoBridgeError::Range(format!("channel {} does not exist", channel)))
}

fn channel_value(value: i64) -> Result<i32> {
    i32::try_from(value).map_err(|_| {
        ServoBridgeError::Range(format!(
            "channel value {} outside {}..={}",
            value, CHANNEL_VALUE_MIN, CHANNEL_VALUE_MAX
        ))
    })
}

fn describe_outcome(channel: u16, outcome: SetOutcome) -> String {
    match outcome {
        SetOutcome::Sent => format!("ch{}: sent", channel),
        SetOutcome::Unchanged => format!("ch{}: unchanged", channel),
        SetOutcome::Skipped => format!("ch{}: not in channel map, skipped", channel),
    }
}

fn describe_report(report: SetReport) -> String {
    report
        .results
        .into_iter()
        .map(|result| match result.outcome {
            Ok(outcome) => describe_outcome(result.channel, outcome),
            Err(e) => format!("ch{}: error: {}", result.channel, e),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::mapper::ChannelMapper;
    use crate::serial::port_trait::mocks::MockLinkPort;
    use crate::trace::TraceFilter;

    // ==================== Parser Tests ====================

    #[test]
    fn test_blank_line() {
        assert_eq!(parse_command("").unwrap(), None);
        assert_eq!(parse_command("   \t ").unwrap(), None);
    }

    #[test]
    fn test_exit_aliases() {
        assert_eq!(parse_command("e").unwrap(), Some(Command::Exit));
        assert_eq!(parse_command("exit").unwrap(), Some(Command::Exit));
    }

    #[test]
    fn test_setone_aliases() {
        for line in ["so 2 100", "setone 2 100", "2 100", "  so   2\t100 "] {
            assert_eq!(
                parse_command(line).unwrap(),
                Some(Command::SetOne { channel: 2, value: 100 }),
                "line: {:?}",
                line
            );
        }
    }

    #[test]
    fn test_setpercent_aliases() {
        for head in ["sp", "sop", "spo", "setpercent", "setonepercent"] {
            let line = format!("{} 4 -25.5", head);
            assert_eq!(
                parse_command(&line).unwrap(),
                Some(Command::SetOnePercent { channel: 4, percent: -25.5 })
            );
        }
    }

    #[test]
    fn test_setmultiple_counter() {
        assert_eq!(
            parse_command("sm 10 20 5:30 40").unwrap(),
            Some(Command::SetMultiple(vec![(1, 10), (2, 20), (5, 30), (6, 40)]))
        );
        assert_eq!(
            parse_command("setmultiple").unwrap(),
            Some(Command::SetMultiple(vec![]))
        );
    }

    #[test]
    fn test_telemetry_command() {
        assert_eq!(parse_command("gt 3").unwrap(), Some(Command::GetTelemetry { id: 3 }));
        assert_eq!(parse_command("telemetry 1").unwrap(), Some(Command::GetTelemetry { id: 1 }));
    }

    #[test]
    fn test_malformed_numbers_are_parse_errors() {
        for line in ["so x 1", "so 1 y", "sp 1 half", "sp 1 NaN", "sp 1 inf", "sm 1 a:2", "sm 1:b", "gt one", "1.5 5"] {
            let result = parse_command(line);
            assert!(
                matches!(result, Err(ServoBridgeError::Parse(_))),
                "line {:?} gave {:?}",
                line,
                result
            );
        }
    }

    #[test]
    fn test_out_of_range_integers_still_parse() {
        assert_eq!(
            parse_command("-1 5").unwrap(),
            Some(Command::SetOne { channel: -1, value: 5 })
        );
        assert_eq!(
            parse_command("so 70000 99999999999").unwrap(),
            Some(Command::SetOne { channel: 70000, value: 99_999_999_999 })
        );
        assert_eq!(parse_command("gt -2").unwrap(), Some(Command::GetTelemetry { id: -2 }));
    }

    #[test]
    fn test_missing_arguments() {
        assert!(matches!(parse_command("so 1"), Err(ServoBridgeError::Parse(_))));
        assert!(matches!(parse_command("so"), Err(ServoBridgeError::Parse(_))));
        assert!(matches!(parse_command("5"), Err(ServoBridgeError::Parse(_))));
    }

    #[test]
    fn test_unknown_command() {
        assert!(matches!(parse_command("jump 1"), Err(ServoBridgeError::Parse(_))));
    }

    // ==================== Session Tests ====================

    async fn open_link() -> (ServoLink, MockLinkPort, tokio::io::DuplexStream) {
        let link = ServoLink::new(ChannelMapper::identity(), TraceFilter::new());
        let port = MockLinkPort::new();
        let (device, host) = tokio::io::duplex(256);
        link.open_split(host, port.clone()).await.unwrap();
        (link, port, device)
    }

    #[tokio::test]
    async fn test_handle_line_sets_channel() {
        let (link, port, _device) = open_link().await;

        let flow = handle_line(&link, "so 1 300").await;
        assert_eq!(flow, Flow::Continue(Some("ch1: sent".to_string())));

        let flow = handle_line(&link, "1 300").await;
        assert_eq!(flow, Flow::Continue(Some("ch1: unchanged".to_string())));

        assert_eq!(port.written_lines(), vec!["sc 1 300\n".to_string()]);
    }

    #[tokio::test]
    async fn test_handle_line_percent() {
        let (link, port, _device) = open_link().await;

        handle_line(&link, "sp 2 50").await;
        assert_eq!(port.written_lines(), vec!["sc 2 512\n".to_string()]);
    }

    #[tokio::test]
    async fn test_handle_line_multiple_reports_each_channel() {
        let (link, port, _device) = open_link().await;

        let flow = handle_line(&link, "sm 10 2000 3").await;
        match flow {
            Flow::Continue(Some(message)) => {
                let lines: Vec<&str> = message.lines().collect();
                assert_eq!(lines.len(), 3);
                assert_eq!(lines[0], "ch1: sent");
                assert!(lines[1].starts_with("ch2: error"));
                assert_eq!(lines[2], "ch3: sent");
            }
            other => panic!("unexpected flow: {:?}", other),
        }
        assert_eq!(port.written_lines(), vec!["sc 1 10\n".to_string(), "sc 3 3\n".to_string()]);
    }

    #[tokio::test]
    async fn test_handle_line_parse_error_keeps_session() {
        let (link, port, _device) = open_link().await;

        match handle_line(&link, "so 1 abc").await {
            Flow::Continue(Some(message)) => assert!(message.contains("abc")),
            other => panic!("unexpected flow: {:?}", other),
        }
        assert!(port.get_written_data().is_empty());
    }

    #[tokio::test]
    async fn test_handle_line_engine_error_is_reported() {
        let (link, _port, _device) = open_link().await;

        match handle_line(&link, "so 17 0").await {
            Flow::Continue(Some(message)) => assert!(message.starts_with("error:")),
            other => panic!("unexpected flow: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_out_of_range_integers_are_range_errors() {
        let (link, port, _device) = open_link().await;

        for line in ["-1 5", "so 70000 0", "so 1 99999999999", "sm 1 -3:4"] {
            match handle_line(&link, line).await {
                Flow::Continue(Some(message)) => assert!(
                    message.starts_with("error: Out of range"),
                    "line {:?} gave {:?}",
                    line,
                    message
                ),
                other => panic!("unexpected flow: {:?}", other),
            }
        }
        assert!(port.get_written_data().is_empty());
    }

    #[tokio::test]
    async fn test_handle_line_exit() {
        let (link, _port, _device) = open_link().await;
        assert_eq!(handle_line(&link, "exit").await, Flow::Exit);
        assert_eq!(handle_line(&link, "").await, Flow::Continue(None));
    }
}
