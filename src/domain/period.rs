use chrono::{Datelike, NaiveDate};
use serde::Deserialize;
use std::fmt;

/// A campaign quarter, written `YYYY-Tn` (T for trimestre).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period {
    pub year: i32,
    pub quarter: u8,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PeriodError {
    #[error("period must look like 2025-T1")]
    Format,
    #[error("quarter must be between 1 and 4")]
    Quarter,
}

impl Period {
    pub fn new(year: i32, quarter: u8) -> Result<Self, PeriodError> {
        if !(1..=4).contains(&quarter) {
            return Err(PeriodError::Quarter);
        }
        Ok(Self { year, quarter })
    }

    pub fn containing(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            quarter: (date.month0() / 3 + 1) as u8,
        }
    }

    pub fn label(&self) -> String {
        format!("Trimestre {} {}", self.quarter, self.year)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-T{}", self.year, self.quarter)
    }
}

impl TryFrom<&str> for Period {
    type Error = PeriodError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let trimmed = value.trim().to_uppercase();
        let (year, quarter) = trimmed.split_once('-').ok_or(PeriodError::Format)?;
        if year.len() != 4 || !year.chars().all(|c| c.is_ascii_digit()) {
            return Err(PeriodError::Format);
        }
        let quarter = quarter.strip_prefix('T').ok_or(PeriodError::Format)?;
        if quarter.len() != 1 {
            return Err(PeriodError::Format);
        }
        let year: i32 = year.parse().map_err(|_| PeriodError::Format)?;
        let quarter: u8 = quarter.parse().map_err(|_| PeriodError::Format)?;
        Period::new(year, quarter)
    }
}

impl std::str::FromStr for Period {
    type Err = PeriodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Period::try_from(s)
    }
}

impl<'de> Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Period::try_from(raw.as_str()).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_canonical() {
        let period: Period = "2025-T1".parse().unwrap();
        assert_eq!(period, Period { year: 2025, quarter: 1 });
        assert_eq!(period.to_string(), "2025-T1");
        assert_eq!(Period::try_from(" 2024-t4 ").unwrap().to_string(), "2024-T4");
    }

    #[test]
    fn test_rejects_malformed() {
        assert_eq!(Period::try_from("2025-T5"), Err(PeriodError::Quarter));
        assert_eq!(Period::try_from("2025-T0"), Err(PeriodError::Quarter));
        assert_eq!(Period::try_from("T1"), Err(PeriodError::Format));
        assert_eq!(Period::try_from("25-T1"), Err(PeriodError::Format));
        assert_eq!(Period::try_from("2025-Q1"), Err(PeriodError::Format));
        assert_eq!(Period::try_from("2025-T12"), Err(PeriodError::Format));
    }

    #[test]
    fn test_containing_date() {
        let date = NaiveDate::from_ymd_opt(2025, 8, 14).unwrap();
        assert_eq!(Period::containing(date).to_string(), "2025-T3");
        let date = NaiveDate::from_ymd_opt(2025, 12, 31).unwrap();
        assert_eq!(Period::containing(date).quarter, 4);
    }

    #[test]
    fn test_deserialize_from_string() {
        let period: Period = serde_json::from_str("\"2026-t2\"").unwrap();
        assert_eq!(period, Period::new(2026, 2).unwrap());
        assert!(serde_json::from_str::<Period>("\"2026\"").is_err());
        assert!(serde_json::from_str::<Period>("20262").is_err());
    }
}
