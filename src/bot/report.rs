use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::debug;

use crate::db::{Standup, StandupStore, UserStore};
use crate::parsers::parse_date;
use crate::utils::AppError;

/// Inclusive calendar range `[from, to]` in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    from: NaiveDate,
    to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self, AppError> {
        if from > to {
            return Err(AppError::Validation(format!(
                "start date {from} is after end date {to}"
            )));
        }
        Ok(Self { from, to })
    }

    pub fn parse(from: &str, to: &str) -> Result<Self, AppError> {
        Self::new(parse_date(from)?, parse_date(to)?)
    }

    /// Half-open instants covering every day of the range.
    fn bounds(&self) -> Result<(DateTime<Utc>, DateTime<Utc>), AppError> {
        let end = self
            .to
            .succ_opt()
            .ok_or_else(|| AppError::Validation(format!("end date {} is out of range", self.to)))?;
        Ok((start_of_day(self.from), start_of_day(end)))
    }
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

type DayGroups<'a> = BTreeMap<NaiveDate, Vec<(String, Vec<&'a Standup>)>>;

/// Buckets standups by UTC day, then by `key` in order of first appearance.
fn group_by_day<'a>(standups: &'a [Standup], key: impl Fn(&Standup) -> String) -> DayGroups<'a> {
    let mut days: DayGroups<'a> = BTreeMap::new();
    for standup in standups {
        let groups = days.entry(standup.created_at.date_naive()).or_default();
        let key = key(standup);
        match groups.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, items)) => items.push(standup),
            None => groups.push((key, vec![standup])),
        }
    }
    days
}

fn render_days(out: &mut String, days: &DayGroups<'_>) {
    for (day, groups) in days {
        let _ = writeln!(out, "\nReport for {day}:");
        for (label, standups) in groups {
            let _ = writeln!(out, "{label}:");
            for standup in standups {
                let _ = writeln!(out, "{}", standup.comment);
            }
        }
    }
}

pub struct ReportAggregator {
    standups: Arc<dyn StandupStore>,
    users: Arc<dyn UserStore>,
}

impl ReportAggregator {
    pub fn new(standups: Arc<dyn StandupStore>, users: Arc<dyn UserStore>) -> Self {
        Self { standups, users }
    }

    pub async fn report_by_project(
        &self,
        channel_id: &str,
        range: DateRange,
    ) -> Result<String, AppError> {
        let (from, until) = range.bounds()?;
        let standups = self
            .standups
            .list_standups_by_channel_in_range(channel_id, from, until)
            .await?;
        debug!(channel_id, count = standups.len(), "loaded standups for project report");

        if standups.is_empty() {
            return Ok(format!(
                "No standups found for <#{channel_id}> from {} to {}",
                range.from, range.to
            ));
        }

        let mut out = format!(
            "Full Standup Report for <#{channel_id}> from {} to {}:\n",
            range.from, range.to
        );
        render_days(&mut out, &group_by_day(&standups, |s| format!("<@{}>", s.user_id)));
        Ok(out)
    }

    pub async fn report_by_user(
        &self,
        user_name: &str,
        range: DateRange,
    ) -> Result<String, AppError> {
        let user = self
            .users
            .get_user_by_name(user_name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {user_name} not found")))?;

        let (from, until) = range.bounds()?;
        let standups = self
            .standups
            .list_standups_by_user_in_range(&user.user_id, from, until)
            .await?;
        debug!(user_id = %user.user_id, count = standups.len(), "loaded standups for user report");

        if standups.is_empty() {
            return Ok(format!(
                "No standups found for <@{}> from {} to {}",
                user.user_name, range.from, range.to
            ));
        }

        let mut out = format!(
            "Full Standup Report for <@{}> from {} to {}:\n",
            user.user_name, range.from, range.to
        );
        render_days(&mut out, &group_by_day(&standups, |s| format!("<#{}>", s.channel_id)));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn standup_at(channel: &str, user: &str, comment: &str, at: DateTime<Utc>) -> Standup {
        let mut standup = Standup::new(
            channel.to_string(),
            user.to_string(),
            comment.to_string(),
            format!("{}", at.timestamp()),
        );
        standup.created_at = at;
        standup.updated_at = at;
        standup
    }

    #[test]
    fn reversed_range_is_rejected() {
        let err = DateRange::parse("2026-03-05", "2026-03-01").unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(DateRange::parse("2026-03-01", "2026-03-01").is_ok());
        assert!(DateRange::parse("yesterday", "2026-03-01").is_err());
    }

    #[test]
    fn bounds_cover_whole_last_day() {
        let range = DateRange::parse("2026-03-01", "2026-03-02").unwrap();
        let (from, until) = range.bounds().unwrap();
        assert_eq!(from, Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap());
        assert_eq!(until, Utc.with_ymd_and_hms(2026, 3, 3, 0, 0, 0).unwrap());
    }

    #[test]
    fn groups_by_day_then_first_seen_key() {
        let day = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let standups = vec![
            standup_at("C1", "U2", "b1", day),
            standup_at("C1", "U1", "a1", day + Duration::minutes(5)),
            standup_at("C1", "U2", "b2", day + Duration::minutes(10)),
            standup_at("C1", "U1", "a2", day + Duration::days(1)),
        ];

        let days = group_by_day(&standups, |s| s.user_id.clone());
        assert_eq!(days.len(), 2);
        let first = &days[&day.date_naive()];
        assert_eq!(first[0].0, "U2");
        assert_eq!(first[0].1.len(), 2);
        assert_eq!(first[1].0, "U1");
    }

    #[cfg(feature = "sqlite")]
    mod storage {
        use super::*;
        use crate::db::{DatabaseManager, User, UserRole};

        #[tokio::test]
        async fn empty_project_report_says_so() {
            let (_dir, db) = DatabaseManager::sqlite_for_tests().await;
            let reports = ReportAggregator::new(db.standup_store(), db.user_store());

            let range = DateRange::parse("2026-03-01", "2026-03-07").unwrap();
            let text = reports.report_by_project("C1", range).await.unwrap();
            assert!(text.starts_with("No standups found"));
        }

        #[tokio::test]
        async fn stored_standup_appears_in_project_report() {
            let (_dir, db) = DatabaseManager::sqlite_for_tests().await;
            let at = Utc.with_ymd_and_hms(2026, 3, 2, 10, 30, 0).unwrap();
            db.standup_store()
                .create_standup(&standup_at("C1", "U1", "Yesterday X. Today Y. Problem none.", at))
                .await
                .unwrap();
            let reports = ReportAggregator::new(db.standup_store(), db.user_store());

            let range = DateRange::parse("2026-03-02", "2026-03-02").unwrap();
            let text = reports.report_by_project("C1", range).await.unwrap();
            assert!(text.contains("Report for 2026-03-02:"));
            assert!(text.contains("<@U1>:\nYesterday X. Today Y. Problem none."));
        }

        #[tokio::test]
        async fn user_report_spans_channels() {
            let (_dir, db) = DatabaseManager::sqlite_for_tests().await;
            db.user_store()
                .create_user(&User::new("U1".into(), "alice".into(), UserRole::Member))
                .await
                .unwrap();
            let at = Utc.with_ymd_and_hms(2026, 3, 2, 10, 30, 0).unwrap();
            let store = db.standup_store();
            store.create_standup(&standup_at("C1", "U1", "first", at)).await.unwrap();
            store
                .create_standup(&standup_at("C2", "U1", "second", at + Duration::hours(1)))
                .await
                .unwrap();
            store
                .create_standup(&standup_at("C2", "U2", "other user", at))
                .await
                .unwrap();
            let reports = ReportAggregator::new(db.standup_store(), db.user_store());

            let range = DateRange::parse("2026-03-01", "2026-03-03").unwrap();
            let text = reports.report_by_user("alice", range).await.unwrap();
            assert!(text.contains("<#C1>:\nfirst"));
            assert!(text.contains("<#C2>:\nsecond"));
            assert!(!text.contains("other user"));
        }

        #[tokio::test]
        async fn unknown_user_is_not_found() {
            let (_dir, db) = DatabaseManager::sqlite_for_tests().await;
            let reports = ReportAggregator::new(db.standup_store(), db.user_store());

            let range = DateRange::parse("2026-03-01", "2026-03-03").unwrap();
            let err = reports.report_by_user("nobody", range).await.unwrap_err();
            assert!(matches!(err, AppError::NotFound(_)));
        }
    }
}
