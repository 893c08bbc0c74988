//! Input Source
//!
//! Feeds gyroscope samples and button edges into the session. The shipped
//! source reads a small line protocol:
//!
//! ```text
//! gyro <x> <y> <z>                      angular velocity, device axes
//! key <volume_down|volume_up> <down|up>  physical key edge
//! button <left|right> <down|up>          pointer button edge
//! # comment
//! ```

use crate::domain::models::{ButtonId, InputEvent, MotionSample, PhysicalKey};
use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{error, warn};

#[async_trait]
pub trait InputSource: Send + 'static {
    /// Next event, or `None` once the source is exhausted
    async fn next_event(&mut self) -> Option<InputEvent>;
}

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("Unknown command: {0}")]
    UnknownCommand(String),
    #[error("Expected {expected} arguments, got {got}")]
    ArgumentCount { expected: usize, got: usize },
    #[error("Invalid number: {0}")]
    InvalidNumber(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

pub struct LineInputSource<R> {
    lines: Lines<R>,
}

impl<R: AsyncBufRead + Unpin + Send + 'static> LineInputSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
        }
    }
}

impl LineInputSource<BufReader<Stdin>> {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send + 'static> InputSource for LineInputSource<R> {
    async fn next_event(&mut self) -> Option<InputEvent> {
        loop {
            match self.lines.next_line().await {
                Ok(Some(line)) => match parse_line(&line) {
                    Ok(Some(event)) => return Some(event),
                    Ok(None) => continue,
                    Err(e) => warn!("Skipping input line {:?}: {}", line, e),
                },
                Ok(None) => return None,
                Err(e) => {
                    error!("Input read error: {}", e);
                    return None;
                }
            }
        }
    }
}

/// Parse one line. Blank lines and comments yield `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<InputEvent>, ParseError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let mut parts = line.split_whitespace();
    let command = parts.next().unwrap_or_default();
    let args: Vec<&str> = parts.collect();

    match command.to_ascii_lowercase().as_str() {
        "gyro" => {
            expect_args(&args, 3)?;
            let x = parse_rate(args[0])?;
            let y = parse_rate(args[1])?;
            let z = parse_rate(args[2])?;
            Ok(Some(InputEvent::Motion(MotionSample::new(x, y, z))))
        }
        "key" => {
            expect_args(&args, 2)?;
            let key = match args[0].to_ascii_lowercase().as_str() {
                "volume_down" => PhysicalKey::VolumeDown,
                "volume_up" => PhysicalKey::VolumeUp,
                other => return Err(ParseError::InvalidArgument(other.to_string())),
            };
            Ok(Some(InputEvent::Button {
                id: key.button(),
                pressed: parse_edge(args[1])?,
            }))
        }
        "button" => {
            expect_args(&args, 2)?;
            let id = match args[0].to_ascii_lowercase().as_str() {
                "left" => ButtonId::Left,
                "right" => ButtonId::Right,
                other => return Err(ParseError::InvalidArgument(other.to_string())),
            };
            Ok(Some(InputEvent::Button {
                id,
                pressed: parse_edge(args[1])?,
            }))
        }
        other => Err(ParseError::UnknownCommand(other.to_string())),
    }
}

fn expect_args(args: &[&str], expected: usize) -> Result<(), ParseError> {
    if args.len() != expected {
        return Err(ParseError::ArgumentCount {
            expected,
            got: args.len(),
        });
    }
    Ok(())
}

fn parse_rate(value: &str) -> Result<f64, ParseError> {
    value
        .parse::<f64>()
        .map_err(|_| ParseError::InvalidNumber(value.to_string()))
}

fn parse_edge(value: &str) -> Result<bool, ParseError> {
    match value.to_ascii_lowercase().as_str() {
        "down" | "press" | "1" => Ok(true),
        "up" | "release" | "0" => Ok(false),
        other => Err(ParseError::InvalidArgument(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_gyro() {
        assert_eq!(
            parse_line("gyro 0.1 0 -2.5"),
            Ok(Some(InputEvent::Motion(MotionSample::new(0.1, 0.0, -2.5))))
        );
        assert_eq!(
            parse_line("gyro 1 2"),
            Err(ParseError::ArgumentCount {
                expected: 3,
                got: 2
            })
        );
        assert!(matches!(
            parse_line("gyro a 0 0"),
            Err(ParseError::InvalidNumber(_))
        ));
    }

    #[test]
    fn test_parse_volume_keys() {
        assert_eq!(
            parse_line("key volume_down down"),
            Ok(Some(InputEvent::Button {
                id: ButtonId::Left,
                pressed: true
            }))
        );
        assert_eq!(
            parse_line("KEY volume_up up"),
            Ok(Some(InputEvent::Button {
                id: ButtonId::Right,
                pressed: false
            }))
        );
    }

    #[test]
    fn test_skips_blank_and_comments() {
        assert_eq!(parse_line(""), Ok(None));
        assert_eq!(parse_line("   # resting"), Ok(None));
        assert!(matches!(
            parse_line("wiggle 1"),
            Err(ParseError::UnknownCommand(_))
        ));
    }

    #[tokio::test]
    async fn test_reads_events_and_skips_garbage() {
        let input = "gyro 0 0 1\nnonsense\n\nbutton right down\n";
        let mut source = LineInputSource::new(BufReader::new(input.as_bytes()));

        assert_eq!(
            source.next_event().await,
            Some(InputEvent::Motion(MotionSample::new(0.0, 0.0, 1.0)))
        );
        assert_eq!(
            source.next_event().await,
            Some(InputEvent::Button {
                id: ButtonId::Right,
                pressed: true
            })
        );
        assert_eq!(source.next_event().await, None);
    }
}
