//! Day grouping and compaction of a message feed for display.
//!
//! Input is the flat, newest-first list a [`PaginatedFeed`](crate::pagination::PaginatedFeed)
//! holds. Output is one [`DayGroup`] per calendar day in the viewer's time
//! zone, most recent day first, each listing its messages oldest first.

use chrono::{DateTime, Datelike, Days, NaiveDate, TimeDelta, TimeZone, Utc};

use parley_types::models::Message;

/// Consecutive messages by the same member closer together than this are
/// rendered without repeating the author header.
pub const COMPACT_WINDOW_SECS: i64 = 5 * 60;

#[derive(Debug, Clone, PartialEq)]
pub struct FeedEntry {
    pub message: Message,
    pub compact: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DayGroup {
    pub date: NaiveDate,
    pub label: String,
    pub entries: Vec<FeedEntry>,
}

/// "Today", "Yesterday", or e.g. "Wednesday, June 5".
pub fn day_label(date: NaiveDate, today: NaiveDate) -> String {
    if date == today {
        return "Today".into();
    }
    if today.checked_sub_days(Days::new(1)) == Some(date) {
        return "Yesterday".into();
    }
    format!("{}, {} {}", date.format("%A"), date.format("%B"), date.day())
}

/// Whether `message` continues the run started by `previous`.
pub fn is_compact(previous: &Message, message: &Message) -> bool {
    previous.member_id == message.member_id
        && message.created_at - previous.created_at < TimeDelta::seconds(COMPACT_WINDOW_SECS)
}

/// Group newest-first messages by the calendar day they were created on.
///
/// Groups appear in order of first appearance in the input. Each message is
/// prepended to its group, which turns newest-first input into oldest-first
/// groups. Only `created_at` is consulted, so edits never move a message.
pub fn group_by_day<Tz: TimeZone>(messages: &[Message], tz: &Tz, now: DateTime<Utc>) -> Vec<DayGroup> {
    let today = now.with_timezone(tz).date_naive();

    let mut groups: Vec<(NaiveDate, Vec<Message>)> = Vec::new();
    for message in messages {
        let date = message.created_at.with_timezone(tz).date_naive();
        match groups.iter_mut().find(|(d, _)| *d == date) {
            Some((_, day)) => day.insert(0, message.clone()),
            None => groups.push((date, vec![message.clone()])),
        }
    }

    groups
        .into_iter()
        .map(|(date, day)| {
            let mut entries: Vec<FeedEntry> = Vec::with_capacity(day.len());
            for message in day {
                let compact = entries
                    .last()
                    .is_some_and(|prev| is_compact(&prev.message, &message));
                entries.push(FeedEntry { message, compact });
            }
            DayGroup {
                date,
                label: day_label(date, today),
                entries,
            }
        })
        .collect()
}
