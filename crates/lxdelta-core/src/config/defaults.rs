use std::time::Duration;

use chrono::Weekday;

use crate::error::{LxdeltaError, Result};
use crate::layout::DEFAULT_PREFIX;

pub(super) fn default_target() -> String {
    ".".to_string()
}

pub(super) fn default_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}

pub(super) fn default_zstd_level() -> i32 {
    3
}

pub(super) fn default_week_rollover() -> Weekday {
    Weekday::Mon
}

pub(super) fn default_runtime_binary() -> String {
    "lxc".to_string()
}

pub(super) fn default_command_timeout() -> String {
    "1h".to_string()
}

pub(super) fn default_export_timeout() -> String {
    "6h".to_string()
}

/// Parse a simple duration string like "90s", "30m", "4h" or "2d". A bare
/// number is taken as seconds.
pub fn parse_human_duration(raw: &str) -> Result<Duration> {
    let input = raw.trim();
    let (num_part, unit) = match input.chars().last() {
        Some(c) if c.is_ascii_alphabetic() => (&input[..input.len() - 1], Some(c)),
        Some(_) => (input, None),
        None => return Err(LxdeltaError::Config("duration must not be empty".into())),
    };

    let value: u64 = num_part
        .parse()
        .map_err(|_| LxdeltaError::Config(format!("invalid duration value: '{raw}'")))?;

    let secs = match unit {
        None | Some('s') | Some('S') => value,
        Some('m') | Some('M') => value.saturating_mul(60),
        Some('h') | Some('H') => value.saturating_mul(60 * 60),
        Some('d') | Some('D') => value.saturating_mul(60 * 60 * 24),
        Some(other) => {
            return Err(LxdeltaError::Config(format!(
                "unsupported duration suffix '{other}' in '{raw}' (use s/m/h/d)"
            )));
        }
    };

    if secs == 0 {
        return Err(LxdeltaError::Config(
            "duration must be greater than zero".into(),
        ));
    }
    Ok(Duration::from_secs(secs))
}
