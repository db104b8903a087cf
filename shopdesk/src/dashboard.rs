use anyhow::{anyhow, Result};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use time::macros::format_description;
use time::{Date, Duration, OffsetDateTime};

/// Preset reporting periods offered for the sales dashboard.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum DashboardRange {
    CurrentMonth,
    LastTwoMonths,
    LastThreeMonths,
    LastSixMonths,
    LastYear,
}

impl DashboardRange {
    pub const ALL: [DashboardRange; 5] = [
        DashboardRange::CurrentMonth,
        DashboardRange::LastTwoMonths,
        DashboardRange::LastThreeMonths,
        DashboardRange::LastSixMonths,
        DashboardRange::LastYear,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            DashboardRange::CurrentMonth => "current month",
            DashboardRange::LastTwoMonths => "last 2 months",
            DashboardRange::LastThreeMonths => "last 3 months",
            DashboardRange::LastSixMonths => "last 6 months",
            DashboardRange::LastYear => "last year",
        }
    }

    /// Period ending on `today`. Periods always start on the first of a month.
    pub fn span_ending(&self, today: Date) -> Result<DateSpan> {
        let start = match self {
            DashboardRange::CurrentMonth => first_of_month(today)?,
            DashboardRange::LastTwoMonths => first_of_month(today - Duration::days(60))?,
            DashboardRange::LastThreeMonths => first_of_month(today - Duration::days(90))?,
            DashboardRange::LastSixMonths => first_of_month(today - Duration::days(180))?,
            DashboardRange::LastYear => {
                Date::from_calendar_date(today.year() - 1, today.month(), 1)?
            }
        };
        Ok(DateSpan { start, end: today })
    }

    pub fn span_ending_today(&self) -> Result<DateSpan> {
        self.span_ending(OffsetDateTime::now_utc().date())
    }
}

impl FromStr for DashboardRange {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.replace('_', "-").as_str() {
            "current-month" => Ok(DashboardRange::CurrentMonth),
            "last-2-months" => Ok(DashboardRange::LastTwoMonths),
            "last-3-months" => Ok(DashboardRange::LastThreeMonths),
            "last-6-months" => Ok(DashboardRange::LastSixMonths),
            "last-year" => Ok(DashboardRange::LastYear),
            _ => Err(anyhow!(
                "unknown dashboard range: {} (expected current-month, last-2-months, last-3-months, last-6-months or last-year)",
                s
            )),
        }
    }
}

impl fmt::Display for DashboardRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

fn first_of_month(d: Date) -> Result<Date> {
    Ok(Date::from_calendar_date(d.year(), d.month(), 1)?)
}

/// Inclusive date range, sent to the backend as `YYYY-MM-DD` strings.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct DateSpan {
    pub start: Date,
    pub end: Date,
}

impl DateSpan {
    pub fn date_in(&self) -> Result<String> {
        format_date(self.start)
    }

    pub fn date_out(&self) -> Result<String> {
        format_date(self.end)
    }
}

fn format_date(d: Date) -> Result<String> {
    let format = format_description!("[year]-[month]-[day]");
    Ok(d.format(&format)?)
}

/// One named figure from the dashboard response.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Indicator {
    pub name: String,
    pub value: String,
}

/// Pulls `indicators: [{name, value}]` out of a dashboard payload, skipping entries without
/// a name.
pub fn indicators(dashboard: &Value) -> Vec<Indicator> {
    dashboard["indicators"]
        .as_array()
        .map(|list| {
            list.iter()
                .filter_map(|ind| {
                    Some(Indicator {
                        name: ind["name"].as_str()?.to_string(),
                        value: crate::models::value_text(&ind["value"]),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}
