use chrono::{Duration, NaiveDate, NaiveDateTime};

/// Seconds in a Julian year, the unit of GNSS trend slopes.
pub const SECONDS_PER_YEAR: f64 = 365.25 * 24.0 * 3600.0;

/// One line of a `<Station>_NEU_TIME*_LOS.txt` file.
#[derive(Debug, Clone, PartialEq)]
pub struct GnssRecord {
    pub mjd: f64,
    pub time: String,
    pub north: f64,
    pub east: f64,
    pub up: f64,
    pub los: f64,
    pub date: NaiveDateTime,
    pub decimal_year: f64,
}

/// GNSS line of sight series in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GnssSeries {
    pub records: Vec<GnssRecord>,
}

impl GnssSeries {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn dates(&self) -> Vec<NaiveDateTime> {
        self.records.iter().map(|r| r.date).collect()
    }

    pub fn los(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.los).collect()
    }

    pub fn decimal_years(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.decimal_year).collect()
    }
}

fn mjd_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1858, 11, 17)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Converts a Modified Julian Date to a calendar timestamp.
///
/// Fractional days are kept to millisecond precision. `None` for values
/// outside the representable range.
pub fn mjd_to_datetime(mjd: f64) -> Option<NaiveDateTime> {
    if !mjd.is_finite() {
        return None;
    }
    let millis = (mjd * 86_400_000.0).round();
    if millis.abs() >= i64::MAX as f64 {
        return None;
    }
    mjd_epoch().checked_add_signed(Duration::try_milliseconds(millis as i64)?)
}

/// Years elapsed between `start` and `date`.
pub fn years_between(start: NaiveDateTime, date: NaiveDateTime) -> f64 {
    let elapsed = date - start;
    elapsed.num_milliseconds() as f64 / 1000.0 / SECONDS_PER_YEAR
}
