//! Per-category spending summaries.

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};

use crate::{Amount, Category};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timeframe {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Timeframe {
    /// First instant covered by the timeframe ending at `now`.
    ///
    /// `Daily` starts at midnight (UTC) of the current day, the others look
    /// back one week, one month or one year.
    pub fn start(self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Daily => now
                .date_naive()
                .and_hms_opt(0, 0, 0)
                .map(|midnight| midnight.and_utc())
                .unwrap_or(now),
            Self::Weekly => now - Duration::days(7),
            Self::Monthly => now.checked_sub_months(Months::new(1)).unwrap_or(now),
            Self::Yearly => now.checked_sub_months(Months::new(12)).unwrap_or(now),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CategoryTotal {
    pub category: Category,
    pub total: Amount,
}
