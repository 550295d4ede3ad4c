//! Readers for the workflow input files.

use crate::error::{Result, WorkflowError};
use crate::models::gnss::{GnssRecord, GnssSeries, mjd_to_datetime, years_between};
use crate::models::insar::{InsarDataset, InsarPoint};
use crate::models::plane::{CorrectionPlane, PlaneParametersRecord};
use crate::models::serde_helpers::parse_float;
use crate::models::station::Station;
use chrono::NaiveDate;
use regex::Regex;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

const TIME_COLUMN_FORMAT: &str = "%Y%m%d";

fn is_time_column(header: &str) -> bool {
    !header.is_empty() && header.bytes().all(|b| b.is_ascii_digit())
}

fn column_index(headers: &csv::StringRecord, name: &str, path: &Path) -> Result<usize> {
    headers
        .iter()
        .position(|h| h.trim() == name)
        .ok_or_else(|| WorkflowError::MissingColumn {
            path: path.to_path_buf(),
            column: name.to_string(),
        })
}

/// Loads an InSAR CSV table.
///
/// Columns with all-digit headers are acquisition dates (`YYYYMMDD`); blank or
/// malformed displacement cells are kept as `NaN`.
pub fn load_insar_csv(path: &Path) -> Result<InsarDataset> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| WorkflowError::csv(path, e))?;
    let headers = reader
        .headers()
        .map_err(|e| WorkflowError::csv(path, e))?
        .clone();

    let lat_idx = column_index(&headers, "latitude", path)?;
    let lon_idx = column_index(&headers, "longitude", path)?;
    let coherence_idx = column_index(&headers, "temporal_coherence", path)?;

    let mut time_columns = Vec::new();
    let mut dates = Vec::new();
    for (i, header) in headers.iter().enumerate() {
        if is_time_column(header) {
            let date = NaiveDate::parse_from_str(header, TIME_COLUMN_FORMAT).map_err(|e| {
                WorkflowError::Date {
                    path: path.to_path_buf(),
                    value: header.to_string(),
                    source: e,
                }
            })?;
            time_columns.push(i);
            dates.push(date);
        }
    }

    let mut points = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(|e| WorkflowError::csv(path, e))?;
        // Header is line 1.
        let line = row + 2;
        let required = |idx: usize, column: &str| -> Result<f64> {
            let value = record.get(idx).unwrap_or_default();
            parse_float(value).ok_or_else(|| WorkflowError::InvalidValue {
                path: path.to_path_buf(),
                column: column.to_string(),
                row: line,
                value: value.to_string(),
            })
        };

        points.push(InsarPoint {
            latitude: required(lat_idx, "latitude")?,
            longitude: required(lon_idx, "longitude")?,
            temporal_coherence: required(coherence_idx, "temporal_coherence")?,
            displacements: time_columns
                .iter()
                .map(|&i| record.get(i).and_then(parse_float).unwrap_or(f64::NAN))
                .collect(),
        });
    }

    info!(
        path = %path.display(),
        points = points.len(),
        acquisitions = dates.len(),
        "Loaded InSAR table"
    );
    Ok(InsarDataset { dates, points })
}

/// Loads the whitespace separated station list.
pub fn load_stations(path: &Path) -> Result<Vec<Station>> {
    let content = fs::read_to_string(path).map_err(|e| WorkflowError::io(path, e))?;
    // Collapse runs of blanks so the csv reader sees single separators.
    let normalized: String = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join("\n");

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b' ')
        .trim(csv::Trim::All)
        .from_reader(normalized.as_bytes());
    let stations = reader
        .deserialize()
        .collect::<std::result::Result<Vec<Station>, _>>()
        .map_err(|e| WorkflowError::csv(path, e))?;

    info!(path = %path.display(), stations = stations.len(), "Loaded station list");
    Ok(stations)
}

fn is_gnss_header(line: &str) -> bool {
    line.is_empty() || line.starts_with("MJD") || line.starts_with("---") || line.contains("in mm")
}

fn parse_gnss_line(parts: &[&str]) -> Option<(f64, String, f64, f64, f64, f64)> {
    Some((
        parts[0].parse().ok()?,
        format!("{} {}", parts[1], parts[2]),
        parts[3].parse().ok()?,
        parts[4].parse().ok()?,
        parts[5].parse().ok()?,
        parts[6].parse().ok()?,
    ))
}

/// Parses the text of a GNSS LOS file.
///
/// Expects at least seven whitespace separated fields per line: MJD, date,
/// time, North, East, Up and LOS.
pub fn parse_gnss(content: &str, origin: &Path) -> Result<GnssSeries> {
    let mut rows = Vec::new();
    for raw in content.lines() {
        let line = raw.trim();
        if is_gnss_header(line) {
            continue;
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 7 {
            continue;
        }
        match parse_gnss_line(&parts).and_then(|row| mjd_to_datetime(row.0).map(|d| (row, d))) {
            Some(parsed) => rows.push(parsed),
            None => warn!(file = %origin.display(), line, "Skipping invalid line in GNSS file"),
        }
    }

    let Some(start) = rows.first().map(|(_, date)| *date) else {
        return Err(WorkflowError::EmptyData(format!(
            "GNSS file '{}' contains no valid MJD data",
            origin.display()
        )));
    };

    let records = rows
        .into_iter()
        .map(|((mjd, time, north, east, up, los), date)| GnssRecord {
            mjd,
            time,
            north,
            east,
            up,
            los,
            date,
            decimal_year: years_between(start, date),
        })
        .collect();
    Ok(GnssSeries { records })
}

pub fn load_gnss_file(path: &Path) -> Result<GnssSeries> {
    let content = fs::read_to_string(path).map_err(|e| WorkflowError::io(path, e))?;
    let series = parse_gnss(&content, path)?;
    debug!(path = %path.display(), samples = series.len(), "Loaded GNSS series");
    Ok(series)
}

/// Finds the `<station>_NEU_TIME*_LOS.txt` file of a station.
///
/// When several files match, the lexicographically first one is used.
pub fn find_gnss_file(data_dir: &Path, station: &str) -> Result<Option<PathBuf>> {
    let pattern = format!(r"^{}_NEU_TIME.*_LOS\.txt$", regex::escape(station));
    let re = Regex::new(&pattern)
        .map_err(|e| WorkflowError::Config(format!("invalid station name '{station}': {e}")))?;

    let entries = fs::read_dir(data_dir).map_err(|e| WorkflowError::io(data_dir, e))?;
    let mut matches: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|s| s.to_str())
                    .is_some_and(|name| re.is_match(name))
        })
        .collect();
    matches.sort();
    Ok(matches.into_iter().next())
}

/// Reads the plane coefficients from the first row of `parameters.csv`.
pub fn load_plane_parameters(path: &Path) -> Result<CorrectionPlane> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| WorkflowError::csv(path, e))?;
    let record: PlaneParametersRecord = reader
        .deserialize()
        .next()
        .ok_or_else(|| {
            WorkflowError::EmptyData(format!("'{}' has no parameter rows", path.display()))
        })?
        .map_err(|e| WorkflowError::csv(path, e))?;
    Ok(record.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn loads_insar_with_time_columns() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("insar.csv");
        fs::write(
            &path,
            "pid,latitude,longitude,temporal_coherence,20200101,20200113\n\
             a,45.0,9.0,0.8,1.5,\n\
             b,45.1,9.1,0.6,2.0,3.0\n",
        )
        .unwrap();

        let dataset = load_insar_csv(&path).unwrap();
        assert_eq!(dataset.dates.len(), 2);
        assert_eq!(dataset.dates[1], NaiveDate::from_ymd_opt(2020, 1, 13).unwrap());
        assert_eq!(dataset.points.len(), 2);
        assert_eq!(dataset.points[0].displacements[0], 1.5);
        assert!(dataset.points[0].displacements[1].is_nan());
        assert_eq!(dataset.points[1].temporal_coherence, 0.6);
    }

    #[test]
    fn insar_missing_column_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("insar.csv");
        fs::write(&path, "latitude,longitude,20200101\n45,9,1\n").unwrap();
        let err = load_insar_csv(&path).unwrap_err();
        assert!(matches!(err, WorkflowError::MissingColumn { ref column, .. } if column == "temporal_coherence"));
    }

    #[test]
    fn insar_bad_coordinate_names_row() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("insar.csv");
        fs::write(
            &path,
            "latitude,longitude,temporal_coherence\n45,9,0.9\nx,9,0.9\n",
        )
        .unwrap();
        let err = load_insar_csv(&path).unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidValue { row: 3, .. }));
    }

    #[test]
    fn insar_bad_date_header_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("insar.csv");
        fs::write(
            &path,
            "latitude,longitude,temporal_coherence,20201399\n45,9,0.9,1\n",
        )
        .unwrap();
        assert!(matches!(
            load_insar_csv(&path),
            Err(WorkflowError::Date { .. })
        ));
    }

    #[test]
    fn loads_whitespace_station_list() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stations_list");
        fs::write(
            &path,
            "  Station   latitude    longitude  height\n\
             ABCD   45.10   9.20  120\n\n\
             EFGH\t46.00\t10.50\t80\n",
        )
        .unwrap();

        let stations = load_stations(&path).unwrap();
        assert_eq!(stations.len(), 2);
        assert_eq!(stations[0].name, "ABCD");
        assert_eq!(stations[1].longitude, 10.5);
    }

    #[test]
    fn gnss_parser_skips_headers_and_bad_lines() {
        let content = "MJD DATE TIME N E U LOS\n\
                       --------------------------\n\
                       values in mm\n\
                       58849.0 2020-01-01 00:00:00 1.0 2.0 3.0 4.0\n\
                       58849.5 2020-01-01 12:00:00 bad 2.0 3.0 4.0\n\
                       short line\n\
                       59214.25 2021-01-01 06:00:00 1.5 2.5 3.5 5.0\n";
        let series = parse_gnss(content, Path::new("test.txt")).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.records[0].time, "2020-01-01 00:00:00");
        assert_eq!(series.records[0].decimal_year, 0.0);
        assert!((series.records[1].decimal_year - 365.25 / 365.25).abs() < 1e-9);
        assert_eq!(series.los(), vec![4.0, 5.0]);
    }

    #[test]
    fn gnss_line_with_out_of_range_mjd_is_skipped() {
        let content = "-106751991167.300644 2020-01-01 00:00:00 0 0 0 1.0\n\
                       58849.0 2020-01-01 00:00:00 0 0 0 2.0\n";
        let series = parse_gnss(content, Path::new("range.txt")).unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series.records[0].los, 2.0);
    }

    #[test]
    fn gnss_without_rows_is_an_error() {
        let err = parse_gnss("MJD header only\n", Path::new("empty.txt")).unwrap_err();
        assert!(matches!(err, WorkflowError::EmptyData(_)));
    }

    #[test]
    fn finds_first_matching_gnss_file() {
        let dir = tempdir().unwrap();
        for name in [
            "ABCD_NEU_TIME_2020_LOS.txt",
            "ABCD_NEU_TIME_2019_LOS.txt",
            "ABCDE_NEU_TIME_2019_LOS.txt",
            "ABCD_NEU_TIME_2019_LOS.csv",
        ] {
            fs::write(dir.path().join(name), "").unwrap();
        }

        let found = find_gnss_file(dir.path(), "ABCD").unwrap().unwrap();
        assert_eq!(
            found.file_name().unwrap().to_str().unwrap(),
            "ABCD_NEU_TIME_2019_LOS.txt"
        );
        assert_eq!(find_gnss_file(dir.path(), "ZZZZ").unwrap(), None);
    }

    #[test]
    fn reads_plane_parameters() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("parameters.csv");
        fs::write(
            &path,
            "Plane Coefficient a,Plane Coefficient b,Plane Coefficient c\n0.5,-0.25,3\n9,9,9\n",
        )
        .unwrap();
        let plane = load_plane_parameters(&path).unwrap();
        assert_eq!(
            plane,
            CorrectionPlane {
                a: 0.5,
                b: -0.25,
                c: 3.0
            }
        );
    }
}
