//! Control signals emitted by agents and their priority resolution.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Control directive an agent attaches to its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    Continue,
    SkipNext,
    Halt,
    Retry,
    Escalate,
    Branch,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Continue => "continue",
            Signal::SkipNext => "skip_next",
            Signal::Halt => "halt",
            Signal::Retry => "retry",
            Signal::Escalate => "escalate",
            Signal::Branch => "branch",
        }
    }

    pub fn parse(s: &str) -> Result<Self, SignalParseError> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "continue" => Ok(Signal::Continue),
            "skip_next" | "skipnext" => Ok(Signal::SkipNext),
            "halt" | "stop" => Ok(Signal::Halt),
            "retry" => Ok(Signal::Retry),
            "escalate" => Ok(Signal::Escalate),
            "branch" => Ok(Signal::Branch),
            _ => Err(SignalParseError(s.to_string())),
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Signal {
    type Err = SignalParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Error when parsing an invalid signal string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalParseError(pub String);

impl fmt::Display for SignalParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid signal: {}", self.0)
    }
}

impl std::error::Error for SignalParseError {}

/// Flow decision derived from a set of signals.
///
/// Variants are declared lowest priority first so that `Ord` matches the
/// resolution order `halt > skip_next > retry > continue`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowDirective {
    Continue,
    Retry,
    SkipNext,
    Halt,
}

/// Resolve an agent's signals to a single flow directive.
///
/// `escalate` and `branch` are informational and resolve to `Continue`; an
/// empty signal list also continues.
pub fn resolve_signals(signals: &[Signal]) -> FlowDirective {
    signals
        .iter()
        .map(|signal| match signal {
            Signal::Halt => FlowDirective::Halt,
            Signal::SkipNext => FlowDirective::SkipNext,
            Signal::Retry => FlowDirective::Retry,
            Signal::Continue | Signal::Escalate | Signal::Branch => FlowDirective::Continue,
        })
        .max()
        .unwrap_or(FlowDirective::Continue)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_signals_continue() {
        assert_eq!(resolve_signals(&[]), FlowDirective::Continue);
    }

    #[test]
    fn test_halt_wins_over_everything() {
        let signals = [
            Signal::Continue,
            Signal::SkipNext,
            Signal::Retry,
            Signal::Halt,
            Signal::Branch,
        ];
        assert_eq!(resolve_signals(&signals), FlowDirective::Halt);
    }

    #[test]
    fn test_skip_next_beats_retry() {
        assert_eq!(
            resolve_signals(&[Signal::Retry, Signal::SkipNext]),
            FlowDirective::SkipNext
        );
    }

    #[test]
    fn test_retry_beats_continue() {
        assert_eq!(
            resolve_signals(&[Signal::Continue, Signal::Retry]),
            FlowDirective::Retry
        );
    }

    #[test]
    fn test_informational_signals_continue() {
        assert_eq!(
            resolve_signals(&[Signal::Escalate, Signal::Branch]),
            FlowDirective::Continue
        );
    }

    #[test]
    fn test_signal_serde_snake_case() {
        let json = serde_json::to_string(&vec![Signal::SkipNext, Signal::Halt]).unwrap();
        assert_eq!(json, r#"["skip_next","halt"]"#);
        assert_eq!("skip-next".parse::<Signal>(), Ok(Signal::SkipNext));
        assert!("jump".parse::<Signal>().is_err());
    }
}
