use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use time::Date;

use super::FetchError;
use crate::models::{ChartRow, parse_chart_date};

/// One chart appearance read from a history CSV.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatedRow {
    pub chart_date: Date,
    pub row: ChartRow,
}

/// Rows of a history CSV plus the lines that had to be dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryCsv {
    pub rows: Vec<DatedRow>,
    pub skipped_rows: usize,
}

#[derive(Debug, Deserialize)]
struct CsvRecord {
    date: String,
    rank: u32,
    song: String,
    artist: String,
    #[serde(rename = "last-week", default, deserialize_with = "csv::invalid_option")]
    last_week: Option<u32>,
    #[serde(rename = "peak-rank", default, deserialize_with = "csv::invalid_option")]
    peak_rank: Option<u32>,
    #[serde(rename = "weeks-on-board", default, deserialize_with = "csv::invalid_option")]
    weeks_on_board: Option<u32>,
}

impl CsvRecord {
    /// Records without a date, title, artist or a 1-100 rank are unusable.
    fn into_dated_row(self) -> Option<DatedRow> {
        let chart_date = parse_chart_date(&self.date).ok()?;
        let title = self.song.trim();
        let artist = self.artist.trim();
        if title.is_empty() || artist.is_empty() || !(1..=100).contains(&self.rank) {
            return None;
        }

        let row = ChartRow::new(self.rank, title, artist)
            .with_peak(self.peak_rank.filter(|&p| p >= 1).unwrap_or(self.rank))
            .with_weeks(self.weeks_on_board.filter(|&w| w >= 1).unwrap_or(1))
            .with_last_week(self.last_week.filter(|&r| r >= 1));
        Some(DatedRow { chart_date, row })
    }
}

/// Reads a weekly chart history CSV with the header
/// `date,rank,song,artist,last-week,peak-rank,weeks-on-board`.
///
/// Bad lines are skipped and counted; a missing header column fails the
/// whole read.
///
/// # Examples
///
/// ```
/// use hot100::fetch::read_history_csv;
///
/// let csv = "date,rank,song,artist,last-week,peak-rank,weeks-on-board\n\
///            2021-11-06,1,Easy On Me,Adele,1,1,3\n\
///            2021-11-06,x,Broken,Nobody,,,\n";
///
/// let history = read_history_csv(csv.as_bytes()).unwrap();
/// assert_eq!(history.rows.len(), 1);
/// assert_eq!(history.skipped_rows, 1);
/// ```
pub fn read_history_csv(input: impl Read) -> Result<HistoryCsv, FetchError> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(input);

    let headers = reader.headers().map_err(FetchError::Csv)?.clone();
    for column in ["date", "rank", "song", "artist"] {
        if !headers.iter().any(|h| h == column) {
            return Err(FetchError::MissingColumn(column));
        }
    }

    let mut history = HistoryCsv::default();
    for (line, record) in reader.deserialize::<CsvRecord>().enumerate() {
        match record.map(CsvRecord::into_dated_row) {
            Ok(Some(row)) => history.rows.push(row),
            Ok(None) => {
                tracing::debug!(line = line + 2, "history row missing date, title, artist or rank");
                history.skipped_rows += 1;
            }
            Err(e) => {
                tracing::debug!(line = line + 2, error = %e, "malformed history row");
                history.skipped_rows += 1;
            }
        }
    }

    if history.skipped_rows > 0 {
        tracing::warn!(skipped = history.skipped_rows, "history rows skipped");
    }
    Ok(history)
}

/// Opens and reads a history CSV from disk.
pub fn load_history_csv(path: &Path) -> Result<HistoryCsv, FetchError> {
    let file = std::fs::File::open(path).map_err(FetchError::Io)?;
    tracing::info!(path = %path.display(), "reading chart history");
    read_history_csv(std::io::BufReader::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    const HEADER: &str = "date,rank,song,artist,last-week,peak-rank,weeks-on-board\n";

    #[test]
    fn rows_carry_peak_weeks_and_last_week() {
        let csv = format!(
            "{HEADER}2021-11-06,1,Easy On Me,Adele,1,1,3\n\
             2021-11-06,2,Stay,The Kid LAROI & Justin Bieber,,1,16\n"
        );

        let history = read_history_csv(csv.as_bytes()).unwrap();

        assert_eq!(history.skipped_rows, 0);
        assert_eq!(
            history.rows[0],
            DatedRow {
                chart_date: date!(2021 - 11 - 06),
                row: ChartRow::new(1, "Easy On Me", "Adele")
                    .with_peak(1)
                    .with_weeks(3)
                    .with_last_week(Some(1)),
            }
        );
        assert_eq!(history.rows[1].row.last_week_rank, None);
        assert_eq!(history.rows[1].row.weeks_on_chart, 16);
    }

    #[test]
    fn unusable_lines_are_counted() {
        let csv = format!(
            "{HEADER}not a date,3,Song,Artist,,3,1\n\
             2021-11-06,101,Song,Artist,,3,1\n\
             2021-11-06,4,,Artist,,4,1\n\
             2021-11-06,five,Song,Artist,,5,1\n\
             2021-11-06,6,Song,Artist,NA,n/a,\n"
        );

        let history = read_history_csv(csv.as_bytes()).unwrap();

        assert_eq!(history.skipped_rows, 4);
        assert_eq!(history.rows.len(), 1);
        assert_eq!(history.rows[0].row.peak_rank, 6);
        assert_eq!(history.rows[0].row.weeks_on_chart, 1);
    }

    #[test]
    fn missing_required_column_fails() {
        let csv = "date,rank,title,artist\n2021-11-06,1,Easy On Me,Adele\n";
        assert!(matches!(
            read_history_csv(csv.as_bytes()),
            Err(FetchError::MissingColumn("song"))
        ));
    }
}
