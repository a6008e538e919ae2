//! REST handlers under `/api` and `/auth`.
//!
//! Handlers are thin: extract the caller, call one service operation, map
//! the result. Every error goes through [`AppError`](talkboard_web::AppError).

pub mod auth;
pub mod certificates;
pub mod live;
pub mod registrations;
pub mod reports;
pub mod talks;
pub mod users;

/// Start times are written `HH:MM`; `HH:MM:SS` is accepted too.
pub(crate) mod clock_time {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer};

    pub(crate) fn parse(raw: &str) -> Option<NaiveTime> {
        let raw = raw.trim();
        NaiveTime::parse_from_str(raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
            .ok()
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid time {raw:?}, expected HH:MM")))
    }

    pub(crate) fn deserialize_option<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<NaiveTime>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|raw| parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid time {raw:?}"))))
            .transpose()
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_parse_accepts_minutes_and_seconds() {
            assert_eq!(parse("19:30"), NaiveTime::from_hms_opt(19, 30, 0));
            assert_eq!(parse(" 08:05:10 "), NaiveTime::from_hms_opt(8, 5, 10));
            assert_eq!(parse("7pm"), None);
        }
    }
}
