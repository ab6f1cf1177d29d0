//! Filename template expansion
//!
//! Expands user-supplied `{token}` templates against call metadata, including
//! strftime-style `{time:FMT}` (local) and `{ztime:FMT}` (UTC) tokens with a
//! custom `%f` millisecond specifier. Unknown tokens are preserved literally
//! so a typo shows up in the output path instead of silently vanishing.

use crate::types::CallData;
use chrono::{DateTime, Local, TimeZone, Utc};
use std::fmt::Write as _;
use tracing::warn;

/// Replace filesystem-unsafe characters in a token value with underscores.
/// Path separators come only from the template itself; token values that
/// contain them are sanitized.
fn sanitize_token(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            other => other,
        })
        .collect()
}

/// Apply a strftime-style format, substituting a custom `%f` specifier with
/// zero-padded milliseconds before formatting. A format chrono cannot render
/// yields an empty string and a warning.
fn apply_strftime<Tz: TimeZone>(fmt: &str, when: &DateTime<Tz>, millis: u32) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let mut processed = String::with_capacity(fmt.len() + 8);
    let mut chars = fmt.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '%' && chars.peek() == Some(&'f') {
            chars.next();
            let _ = write!(processed, "{:03}", millis.min(999));
        } else {
            processed.push(c);
        }
    }

    let mut output = String::new();
    if write!(output, "{}", when.format(&processed)).is_err() {
        warn!(format = %fmt, "filename time format could not be rendered");
        return String::new();
    }
    output
}

/// Expand a token name against the call metadata. Unknown tokens are
/// preserved literally, braces included.
fn expand_token(token: &str, call: &CallData, start_time: i64) -> String {
    match token {
        "talkgroup" => call.talkgroup.to_string(),
        "talkgroup_tag" => sanitize_token(&call.talkgroup_tag),
        "talkgroup_alpha_tag" => sanitize_token(&call.talkgroup_alpha_tag),
        "talkgroup_description" => sanitize_token(&call.talkgroup_description),
        "talkgroup_group" => sanitize_token(&call.talkgroup_group),
        "talkgroup_display" => sanitize_token(&call.talkgroup_display),
        "short_name" => sanitize_token(&call.short_name),
        "freq" => format!("{:.0}", call.freq),
        "freq_mhz" => format!("{:.4}", call.freq / 1_000_000.0),
        "call_num" => call.call_num.to_string(),
        "tdma_slot" => {
            if call.tdma_slot == -1 {
                String::new()
            } else {
                call.tdma_slot.to_string()
            }
        }
        "sys_num" => call.sys_num.to_string(),
        "epoch" => start_time.to_string(),
        "source_num" => call.source_num.to_string(),
        "recorder_num" => call.recorder_num.to_string(),
        "audio_type" => sanitize_token(&call.audio_type.to_string()),
        "emergency" => u8::from(call.emergency).to_string(),
        "encrypted" => u8::from(call.encrypted).to_string(),
        "priority" => call.priority.to_string(),
        "signal" => (call.signal as i64).to_string(),
        "noise" => (call.noise as i64).to_string(),
        "color_code" => call.color_code.to_string(),
        _ => {
            if let Some(fmt) = token.strip_prefix("time:")
                && !fmt.is_empty()
            {
                let Some(when) = Local.timestamp_opt(start_time, 0).single() else {
                    return String::new();
                };
                return match fmt {
                    "iso" => apply_strftime("%Y-%m-%dT%H:%M:%S", &when, 0),
                    "iso_ms" => apply_strftime("%Y-%m-%dT%H:%M:%S.%f", &when, 0),
                    other => apply_strftime(other, &when, 0),
                };
            }
            if let Some(fmt) = token.strip_prefix("ztime:")
                && !fmt.is_empty()
            {
                let Some(when) = Utc.timestamp_opt(start_time, 0).single() else {
                    return String::new();
                };
                return match fmt {
                    "iso" => apply_strftime("%Y-%m-%dT%H:%M:%SZ", &when, 0),
                    "iso_ms" => apply_strftime("%Y-%m-%dT%H:%M:%S.%fZ", &when, 0),
                    other => apply_strftime(other, &when, 0),
                };
            }

            warn!(token, "unknown filename format token");
            format!("{{{token}}}")
        }
    }
}

/// Expand a filename template by replacing `{token}` patterns with values
/// from the call metadata.
///
/// Supported tokens: `{talkgroup}`, `{talkgroup_tag}`, `{talkgroup_alpha_tag}`,
/// `{talkgroup_description}`, `{talkgroup_group}`, `{talkgroup_display}`,
/// `{short_name}`, `{freq}` (integer Hz), `{freq_mhz}` (4-decimal),
/// `{call_num}`, `{tdma_slot}` (empty when -1), `{sys_num}`, `{epoch}`,
/// `{source_num}`, `{recorder_num}`, `{audio_type}`, `{emergency}`,
/// `{encrypted}`, `{priority}`, `{signal}`, `{noise}`, `{color_code}`,
/// `{time:FMT}` (local strftime), `{ztime:FMT}` (UTC strftime), with
/// `iso`/`iso_ms` aliases and a `%f` millisecond specifier inside `FMT`.
#[must_use]
pub fn expand_filename_format(format: &str, call: &CallData, start_time: i64) -> String {
    let mut result = String::with_capacity(format.len() * 2);
    let mut rest = format;

    while let Some(open) = rest.find('{') {
        result.push_str(&rest[..open]);
        let after = &rest[open..];
        match after.find('}') {
            Some(close) => {
                result.push_str(&expand_token(&after[1..close], call, start_time));
                rest = &after[close + 1..];
            }
            None => {
                // Unclosed brace, copy literally
                result.push('{');
                rest = &after[1..];
            }
        }
    }
    result.push_str(rest);

    result
}

#[cfg(test)]
#[allow(clippy::unreadable_literal)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_call() -> CallData {
        CallData {
            talkgroup: 101,
            short_name: "PD".to_string(),
            talkgroup_alpha_tag: "PD Dispatch".to_string(),
            talkgroup_tag: "Law Enforcement".to_string(),
            freq: 851_012_500.0,
            call_num: 42,
            sys_num: 1,
            source_num: 2,
            recorder_num: 7,
            priority: 3,
            signal: -42.7,
            noise: -97.2,
            color_code: 5,
            ..CallData::default()
        }
    }

    #[test]
    fn test_basic_tokens() {
        let call = sample_call();
        assert_eq!(
            expand_filename_format("{short_name}-{talkgroup}", &call, 0),
            "PD-101"
        );
        assert_eq!(expand_filename_format("{freq}", &call, 0), "851012500");
        assert_eq!(expand_filename_format("{freq_mhz}", &call, 0), "851.0125");
        assert_eq!(expand_filename_format("{call_num}", &call, 0), "42");
        assert_eq!(expand_filename_format("{priority}", &call, 0), "3");
        assert_eq!(expand_filename_format("{signal}", &call, 0), "-42");
        assert_eq!(expand_filename_format("{noise}", &call, 0), "-97");
        assert_eq!(expand_filename_format("{color_code}", &call, 0), "5");
        assert_eq!(expand_filename_format("{epoch}", &call, 1705330252), "1705330252");
    }

    #[test]
    fn test_tdma_slot_empty_when_unset() {
        let mut call = sample_call();
        assert_eq!(expand_filename_format("x{tdma_slot}y", &call, 0), "xy");
        call.tdma_slot = 1;
        assert_eq!(expand_filename_format("x{tdma_slot}y", &call, 0), "x1y");
    }

    #[test]
    fn test_flag_tokens() {
        let mut call = sample_call();
        assert_eq!(expand_filename_format("{emergency}{encrypted}", &call, 0), "00");
        call.emergency = true;
        call.encrypted = true;
        assert_eq!(expand_filename_format("{emergency}{encrypted}", &call, 0), "11");
    }

    #[test]
    fn test_token_value_sanitization() {
        let mut call = sample_call();
        call.talkgroup_alpha_tag = "A/B:C*D".to_string();
        assert_eq!(
            expand_filename_format("{talkgroup_alpha_tag}", &call, 0),
            "A_B_C_D"
        );
    }

    #[test]
    fn test_unknown_token_preserved() {
        let call = sample_call();
        assert_eq!(
            expand_filename_format("a-{bogus}-b", &call, 0),
            "a-{bogus}-b"
        );
    }

    #[test]
    fn test_unclosed_brace_copied_literally() {
        let call = sample_call();
        assert_eq!(expand_filename_format("a{b", &call, 0), "a{b");
    }

    #[test]
    fn test_ztime_iso() {
        let call = sample_call();
        // 2024-01-15T14:10:52Z
        assert_eq!(
            expand_filename_format("{ztime:iso}", &call, 1705327852),
            "2024-01-15T14:10:52Z"
        );
        assert_eq!(
            expand_filename_format("{ztime:iso_ms}", &call, 1705327852),
            "2024-01-15T14:10:52.000Z"
        );
    }

    #[test]
    fn test_ztime_custom_format_with_millis() {
        let call = sample_call();
        assert_eq!(
            expand_filename_format("{ztime:%Y%m%d_%H%M%S.%f}", &call, 1705327852),
            "20240115_141052.000"
        );
    }

    #[test]
    fn test_local_time_matches_chrono() {
        let call = sample_call();
        let start_time = 1705330252;
        let expected = Local
            .timestamp_opt(start_time, 0)
            .single()
            .unwrap()
            .format("%Y-%m-%dT%H:%M:%S")
            .to_string();
        assert_eq!(
            expand_filename_format("{time:iso}", &call, start_time),
            expected
        );
    }

    #[test]
    fn test_full_template() {
        let call = sample_call();
        let start_time = 1705330252;
        let stamp = Local
            .timestamp_opt(start_time, 0)
            .single()
            .unwrap()
            .format("%Y-%m-%dT%H:%M:%S")
            .to_string();
        assert_eq!(
            expand_filename_format(
                "{short_name}/{talkgroup}/{time:iso}-{freq_mhz}",
                &call,
                start_time
            ),
            format!("PD/101/{stamp}-851.0125")
        );
    }

    #[test]
    fn test_expansion_is_deterministic() {
        let call = sample_call();
        let template = "{short_name}/{talkgroup}/{talkgroup}-{ztime:iso}";
        let a = expand_filename_format(template, &call, 1705327852);
        let b = expand_filename_format(template, &call, 1705327852);
        assert_eq!(a, b);
        assert_eq!(a, "PD/101/101-2024-01-15T14:10:52Z");
    }

    #[test]
    fn test_bare_time_prefix_is_unknown() {
        let call = sample_call();
        assert_eq!(expand_filename_format("{time:}", &call, 0), "{time:}");
    }

    #[test]
    fn test_sanitize_token_characters() {
        assert_eq!(sanitize_token(r#"a/b\c:d*e?f"g<h>i|j"#), "a_b_c_d_e_f_g_h_i_j");
        assert_eq!(sanitize_token("clean-name_1.wav"), "clean-name_1.wav");
    }
}
