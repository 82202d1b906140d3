//! Human-readable timestamps and typing labels for clients that render
//! server data directly.

use chrono::{DateTime, Datelike, TimeZone, Utc};

const TIME: &str = "%-I:%M %p";
const MONTH_DAY: &str = "%b %-d";
const MONTH_DAY_YEAR: &str = "%b %-d, %Y";

/// Conversation list preview time.
/// - Today: "2:34 PM"
/// - This year: "Feb 15"
/// - Older: "Feb 15, 2023"
pub fn format_conversation_time<Tz: TimeZone>(ts: DateTime<Utc>, now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let local = ts.with_timezone(&now.timezone());

    if local.date_naive() == now.date_naive() {
        local.format(TIME).to_string()
    } else if local.year() == now.year() {
        local.format(MONTH_DAY).to_string()
    } else {
        local.format(MONTH_DAY_YEAR).to_string()
    }
}

/// Per-message time.
/// - Today: "2:34 PM"
/// - This year: "Feb 15, 2:34 PM"
/// - Older: "Feb 15, 2023, 2:34 PM"
pub fn format_message_time<Tz: TimeZone>(ts: DateTime<Utc>, now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let local = ts.with_timezone(&now.timezone());
    let time = local.format(TIME);

    if local.date_naive() == now.date_naive() {
        time.to_string()
    } else if local.year() == now.year() {
        format!("{}, {}", local.format(MONTH_DAY), time)
    } else {
        format!("{}, {}", local.format(MONTH_DAY_YEAR), time)
    }
}

/// "Ana is typing" / "Ana, Ben are typing". Empty input yields `None`.
pub fn typing_label<S: AsRef<str>>(names: &[S]) -> Option<String> {
    match names {
        [] => None,
        [one] => Some(format!("{} is typing", one.as_ref())),
        many => {
            let joined: Vec<&str> = many.iter().map(|n| n.as_ref()).collect();
            Some(format!("{} are typing", joined.join(", ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_conversation_time() {
        let now = utc(2024, 3, 10, 18, 0);
        assert_eq!(format_conversation_time(utc(2024, 3, 10, 14, 34), &now), "2:34 PM");
        assert_eq!(format_conversation_time(utc(2024, 2, 15, 9, 5), &now), "Feb 15");
        assert_eq!(format_conversation_time(utc(2023, 2, 15, 9, 5), &now), "Feb 15, 2023");
    }

    #[test]
    fn test_message_time() {
        let now = utc(2024, 3, 10, 18, 0);
        assert_eq!(format_message_time(utc(2024, 3, 10, 9, 5), &now), "9:05 AM");
        assert_eq!(format_message_time(utc(2024, 2, 15, 14, 34), &now), "Feb 15, 2:34 PM");
        assert_eq!(
            format_message_time(utc(2023, 2, 15, 14, 34), &now),
            "Feb 15, 2023, 2:34 PM"
        );
    }

    #[test]
    fn test_day_boundary_uses_viewer_zone() {
        // 23:30 UTC on Mar 9 is already Mar 10 at UTC+2
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let now = utc(2024, 3, 10, 8, 0).with_timezone(&tz);
        assert_eq!(format_conversation_time(utc(2024, 3, 9, 23, 30), &now), "1:30 AM");
    }

    #[test]
    fn test_typing_label() {
        assert_eq!(typing_label::<&str>(&[]), None);
        assert_eq!(typing_label(&["Ana"]).as_deref(), Some("Ana is typing"));
        assert_eq!(typing_label(&["Ana", "Ben"]).as_deref(), Some("Ana, Ben are typing"));
    }
}
