use chrono::{NaiveDate, NaiveTime, Timelike};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::utils::AppError;

static USER_MENTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^<@([A-Z0-9]+)\|([^>]+)>$").expect("valid user mention regex"));
static CHANNEL_MENTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^<#([A-Z0-9]+)(?:\|[^>]*)?>$").expect("valid channel mention regex"));
static TIME_OF_DAY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{2}:\d{2}$").expect("valid time regex"));
static CALENDAR_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid date regex"));

/// Whitespace-separated arguments of a slash command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub command: String,
    pub args: Vec<String>,
}

impl ParsedCommand {
    pub fn new(command: &str, text: &str) -> Self {
        Self {
            command: command.trim().to_string(),
            args: text.split_whitespace().map(ToString::to_string).collect(),
        }
    }

    pub fn expect_args(&self, count: usize) -> Result<&[String], AppError> {
        if self.args.len() != count {
            return Err(AppError::Validation("Wrong number of arguments".to_string()));
        }
        Ok(&self.args)
    }
}

/// Splits an escaped Slack mention `<@U123|alice>` into id and name.
pub fn parse_user_mention(text: &str) -> Result<(String, String), AppError> {
    let caps = USER_MENTION.captures(text.trim()).ok_or_else(|| {
        AppError::Validation(format!(
            "could not parse user mention `{}`, expected <@USERID|name>",
            text.trim()
        ))
    })?;
    Ok((caps[1].to_string(), caps[2].to_string()))
}

/// Accepts `<@U123|alice>`, `@alice` or `alice` and returns the user name.
pub fn parse_user_name(text: &str) -> Result<String, AppError> {
    let trimmed = text.trim();
    if trimmed.starts_with("<@") {
        return parse_user_mention(trimmed).map(|(_, name)| name);
    }
    let name = trimmed.trim_start_matches('@');
    if name.is_empty() {
        return Err(AppError::Validation("user name cannot be empty".to_string()));
    }
    Ok(name.to_string())
}

/// Accepts `<#C123|general>`, `<#C123>` or a bare channel id.
pub fn parse_channel_ref(text: &str) -> Result<String, AppError> {
    let trimmed = text.trim();
    if let Some(caps) = CHANNEL_MENTION.captures(trimmed) {
        return Ok(caps[1].to_string());
    }
    if trimmed.is_empty() || trimmed.starts_with('<') {
        return Err(AppError::Validation(format!(
            "could not parse channel `{trimmed}`"
        )));
    }
    Ok(trimmed.to_string())
}

/// Strict 24-hour `HH:MM`.
pub fn parse_time_of_day(text: &str) -> Result<NaiveTime, AppError> {
    let trimmed = text.trim();
    let invalid = || AppError::Validation(format!("could not convert time: `{trimmed}`"));
    if !TIME_OF_DAY.is_match(trimmed) {
        return Err(invalid());
    }
    NaiveTime::parse_from_str(trimmed, "%H:%M").map_err(|_| invalid())
}

/// Seconds after midnight UTC on 1970-01-01, the stored form of a standup time.
pub fn time_of_day_to_timestamp(time: NaiveTime) -> i64 {
    i64::from(time.num_seconds_from_midnight())
}

/// Strict `YYYY-MM-DD`.
pub fn parse_date(text: &str) -> Result<NaiveDate, AppError> {
    let trimmed = text.trim();
    let invalid = || {
        AppError::Validation(format!(
            "could not parse date `{trimmed}`, expected YYYY-MM-DD"
        ))
    };
    if !CALENDAR_DATE.is_match(trimmed) {
        return Err(invalid());
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").map_err(|_| invalid())
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test]
    fn parsed_command_splits_text() {
        let parsed =
            ParsedCommand::new("/comedian_report_by_project", " C1  2026-01-01 2026-01-02 ");
        assert_eq!(parsed.args.len(), 3);
        assert!(parsed.expect_args(3).is_ok());
        let err = parsed.expect_args(2).unwrap_err();
        assert_eq!(err.to_string(), "Wrong number of arguments");
    }

    #[test]
    fn user_mention_yields_id_and_name() {
        assert_eq!(
            parse_user_mention("<@U024BE7LH|bob>").unwrap(),
            ("U024BE7LH".to_string(), "bob".to_string())
        );
        assert!(parse_user_mention("@bob").is_err());
    }

    #[test_case("<@U1|alice>", "alice" ; "escaped mention")]
    #[test_case("@alice", "alice" ; "at name")]
    #[test_case("alice", "alice" ; "bare name")]
    fn user_name_forms(input: &str, expected: &str) {
        assert_eq!(parse_user_name(input).unwrap(), expected);
    }

    #[test_case("<#C024BE7LR|general>", "C024BE7LR" ; "escaped channel")]
    #[test_case("<#C024BE7LR>", "C024BE7LR" ; "channel without name")]
    #[test_case("C024BE7LR", "C024BE7LR" ; "bare id")]
    fn channel_forms(input: &str, expected: &str) {
        assert_eq!(parse_channel_ref(input).unwrap(), expected);
    }

    #[test_case("09:00", Some((9, 0)) ; "morning")]
    #[test_case("23:59", Some((23, 59)) ; "last minute")]
    #[test_case("24:00", None ; "hour out of range")]
    #[test_case("9:00", None ; "single digit hour")]
    #[test_case("09:00:00", None ; "seconds not allowed")]
    #[test_case("nine", None ; "words")]
    fn time_of_day_is_strict(input: &str, expected: Option<(u32, u32)>) {
        let parsed = parse_time_of_day(input).ok().map(|t| (t.hour(), t.minute()));
        assert_eq!(parsed, expected);
    }

    #[test]
    fn timestamp_is_seconds_after_midnight() {
        let time = parse_time_of_day("09:30").unwrap();
        assert_eq!(time_of_day_to_timestamp(time), 9 * 3600 + 30 * 60);
    }

    #[test_case("2026-02-28", true ; "valid")]
    #[test_case("2026-02-30", false ; "no such day")]
    #[test_case("2026-2-3", false ; "missing padding")]
    #[test_case("03/02/2026", false ; "wrong format")]
    fn dates_are_strict(input: &str, ok: bool) {
        assert_eq!(parse_date(input).is_ok(), ok);
    }
}
