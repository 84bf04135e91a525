//! Text formatting of TIME, TOD, DATE and DT values.
//!
//! A format string is a sequence of `#`-separated tokens. Text before the
//! first `#` is ignored; tokens that are not recognized are copied as they
//! are, which is how separators are written:
//!
//! ```
//! use chrono::NaiveDate;
//! use tame_ads::format::{format_date, format_time, Language};
//!
//! let dt = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap().and_hms_opt(8, 5, 0).unwrap();
//! assert_eq!(format_date(&dt, "#DD#.#MM#.#YYYY", Language::German), "19.10.2026");
//! assert_eq!(format_date(&dt, "#WEEKDAY#, #hh#:#mm", Language::English), "Monday, 08:05");
//!
//! assert_eq!(format_time(90_000, "#m"), "1.5");
//! assert_eq!(format_time(90_000, "#m#:#ss"), "1:30");
//! ```
//!
//! Date tokens: `D DD WD WKD WEEKDAY M MM MON MONTH YY YYYY h hh m mm s ss
//! ms msmsms`. Duration tokens: `d dd h hh m mm s ss ms msmsms`. A duration
//! format with a single token yields a fractional value; with several
//! tokens each unit takes its whole part and passes the remainder on.

use chrono::{Datelike, NaiveDateTime, Timelike};

/// Language of weekday and month names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Language {
    /// German names (`Mo`, `Montag`, `Mrz`, `März`).
    #[default]
    German,
    /// English names (`Mon`, `Monday`, `Mar`, `March`).
    English,
}

struct Names {
    weekday_short: [&'static str; 7],
    weekday_long: [&'static str; 7],
    month_short: [&'static str; 12],
    month_long: [&'static str; 12],
}

const GERMAN: Names = Names {
    weekday_short: ["So", "Mo", "Di", "Mi", "Do", "Fr", "Sa"],
    weekday_long: [
        "Sonntag", "Montag", "Dienstag", "Mittwoch", "Donnerstag", "Freitag", "Samstag",
    ],
    month_short: [
        "Jan", "Feb", "Mrz", "Apr", "Mai", "Jun", "Jul", "Aug", "Sep", "Okt", "Nov", "Dez",
    ],
    month_long: [
        "Januar", "Februar", "März", "April", "Mai", "Juni", "Juli", "August", "September",
        "Oktober", "November", "Dezember",
    ],
};

const ENGLISH: Names = Names {
    weekday_short: ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"],
    weekday_long: [
        "Sunday", "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday",
    ],
    month_short: [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "July", "Aug", "Sept", "Oct", "Nov", "Dez",
    ],
    month_long: [
        "January", "February", "March", "April", "May", "June", "July", "August", "September",
        "October", "November", "December",
    ],
};

impl Language {
    fn names(self) -> &'static Names {
        match self {
            Language::German => &GERMAN,
            Language::English => &ENGLISH,
        }
    }
}

const MS_PER_DAY: u64 = 86_400_000;
const MS_PER_HOUR: u64 = 3_600_000;
const MS_PER_MINUTE: u64 = 60_000;
const MS_PER_SECOND: u64 = 1_000;

/// Formats a wall-clock date/time.
pub fn format_date(dt: &NaiveDateTime, format: &str, language: Language) -> String {
    let names = language.names();
    let weekday = dt.weekday().num_days_from_sunday() as usize;
    let month = dt.month0() as usize;
    let millis = dt.nanosecond() / 1_000_000 % 1_000;

    let mut out = String::new();
    for token in format.split('#').skip(1) {
        match token {
            "D" => out.push_str(&dt.day().to_string()),
            "DD" => out.push_str(&format!("{:02}", dt.day())),
            "WD" => out.push_str(&weekday.to_string()),
            "WKD" => out.push_str(names.weekday_short[weekday]),
            "WEEKDAY" => out.push_str(names.weekday_long[weekday]),
            "M" => out.push_str(&dt.month().to_string()),
            "MM" => out.push_str(&format!("{:02}", dt.month())),
            "MON" => out.push_str(names.month_short[month]),
            "MONTH" => out.push_str(names.month_long[month]),
            "YY" => out.push_str(&dt.year().rem_euclid(100).to_string()),
            "YYYY" => out.push_str(&dt.year().to_string()),
            "h" => out.push_str(&dt.hour().to_string()),
            "hh" => out.push_str(&format!("{:02}", dt.hour())),
            "m" => out.push_str(&dt.minute().to_string()),
            "mm" => out.push_str(&format!("{:02}", dt.minute())),
            "s" => out.push_str(&dt.second().to_string()),
            "ss" => out.push_str(&format!("{:02}", dt.second())),
            "ms" => out.push_str(&millis.to_string()),
            "msmsms" => out.push_str(&format!("{millis:03}")),
            literal => out.push_str(literal),
        }
    }
    out
}

/// Formats a duration given in milliseconds.
pub fn format_time(ms: u32, format: &str) -> String {
    let tokens: Vec<&str> = format.split('#').skip(1).collect();
    let cascade = tokens.len() > 1;
    let mut rest = u64::from(ms);

    let mut out = String::new();
    for token in tokens {
        let (unit, width) = match token {
            "d" => (MS_PER_DAY, 0),
            "dd" => (MS_PER_DAY, 2),
            "h" => (MS_PER_HOUR, 0),
            "hh" => (MS_PER_HOUR, 2),
            "m" => (MS_PER_MINUTE, 0),
            "mm" => (MS_PER_MINUTE, 2),
            "s" => (MS_PER_SECOND, 0),
            "ss" => (MS_PER_SECOND, 2),
            "ms" => (1, 0),
            "msmsms" => (1, 3),
            literal => {
                out.push_str(literal);
                continue;
            }
        };
        if !cascade && unit > 1 {
            out.push_str(&(rest as f64 / unit as f64).to_string());
            continue;
        }
        let whole = rest / unit;
        rest %= unit;
        out.push_str(&format!("{whole:0width$}"));
    }
    out
}
