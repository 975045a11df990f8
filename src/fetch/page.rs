//! Scraper for the live chart page.
//!
//! The page markup changes from time to time, so every field is located
//! through an ordered list of patterns and the first match wins.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use time::{Date, Month};

use super::FetchError;
use crate::config::Clock;
use crate::http::{HttpClient, RetryPolicy};
use crate::models::{ChartRow, ChartSnapshot, parse_chart_date};

static DATE_PICKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<div\b[^>]*\bid="chart-date-picker"[^>]*>"#).unwrap()
});

static DATA_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"data-date="([^"]+)""#).unwrap());

static PAGE_TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap());

static TITLE_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"For\s+([A-Za-z]+)\s+(\d{1,2}),\s+(\d{4})").unwrap());

static TEXT_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(January|February|March|April|May|June|July|August|September|October|November|December)\s+(\d{1,2}),\s+(\d{4})\b",
    )
    .unwrap()
});

/// Positions on the Hot 100.
const MAX_ROWS: usize = 100;

/// Row containers, most specific first.
static ROW_CONTAINERS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        ("div", "o-chart-results-list-row-container"),
        ("li", "chart-list__element"),
        ("div", "chart-list-item"),
        ("article", "chart-row"),
    ]
    .into_iter()
    .map(|(tag, class)| element_with_class(tag, class))
    .collect()
});

static TITLE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r#"(?s)<h3\b[^>]*\bid="title-of-a-story"[^>]*>(.*?)</h3>"#).unwrap(),
        inner_text_of("span", "chart-element__information__song"),
        inner_text_of("h3", "c-title"),
        inner_text_of("[a-z0-9]+", "chart-row__song"),
    ]
});

static ARTIST_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(
            r#"(?s)<span\b[^>]*\bclass="[^"]*\bc-label\b[^"]*\ba-font-primary-s\b[^"]*"[^>]*>(.*?)</span>"#,
        )
        .unwrap(),
        inner_text_of("span", "chart-element__information__artist"),
        inner_text_of("[a-z0-9]+", "chart-row__artist"),
    ]
});

/// Short numeric (or "-") cells: last week, peak, weeks on chart.
static STAT_CELL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<span\b[^>]*>\s*(\d{1,3}|-)\s*</span>").unwrap());

static IMAGE_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<img\b[^>]*>").unwrap());

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());

static ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);").unwrap());

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

fn element_with_class(tag: &str, class: &str) -> Regex {
    Regex::new(&format!(
        r#"<{tag}\b[^>]*\bclass="[^"]*\b{}\b[^"]*""#,
        regex::escape(class)
    ))
    .unwrap()
}

fn inner_text_of(tag: &str, class: &str) -> Regex {
    Regex::new(&format!(
        r#"(?s)<({tag})\b[^>]*\bclass="[^"]*\b{}\b[^"]*"[^>]*>(.*?)</[a-z0-9]+>"#,
        regex::escape(class)
    ))
    .unwrap()
}

/// Parses the chart page into a snapshot.
///
/// The chart date comes from the date picker, then the page title, then any
/// "Month D, YYYY" text, and finally `clock`'s today.
pub fn parse_chart_page(html: &str, clock: &dyn Clock) -> Result<ChartSnapshot, FetchError> {
    let chart_date = extract_chart_date(html).unwrap_or_else(|| {
        let today = clock.today();
        tracing::warn!(%today, "chart date not found on page, using today");
        today
    });

    let blocks = row_blocks(html);
    if blocks.is_empty() {
        return Err(FetchError::NoRows);
    }

    let mut rows = Vec::with_capacity(blocks.len());
    let mut skipped = 0;

    for (index, block) in blocks.iter().enumerate() {
        let rank = index as u32 + 1;
        match parse_row(block, rank) {
            Some(row) => rows.push(row),
            None => {
                tracing::warn!(rank, "chart row without title or artist, skipping");
                skipped += 1;
            }
        }
    }

    let mut snapshot = ChartSnapshot::new(chart_date, rows);
    snapshot.skipped_rows = skipped;
    Ok(snapshot)
}

fn extract_chart_date(html: &str) -> Option<Date> {
    if let Some(tag) = DATE_PICKER.find(html)
        && let Some(captures) = DATA_DATE.captures(tag.as_str())
        && let Ok(date) = parse_chart_date(&captures[1])
    {
        return Some(date);
    }

    if let Some(title) = PAGE_TITLE.captures(html)
        && let Some(captures) = TITLE_DATE.captures(&title[1])
        && let Some(date) = month_day_year(&captures[1], &captures[2], &captures[3])
    {
        return Some(date);
    }

    let text = visible_text(html);
    TEXT_DATE
        .captures_iter(&text)
        .find_map(|c| month_day_year(&c[1], &c[2], &c[3]))
}

fn month_day_year(month: &str, day: &str, year: &str) -> Option<Date> {
    const MONTHS: [&str; 12] = [
        "january",
        "february",
        "march",
        "april",
        "may",
        "june",
        "july",
        "august",
        "september",
        "october",
        "november",
        "december",
    ];

    let month_index = MONTHS
        .iter()
        .position(|name| name.eq_ignore_ascii_case(month))?;
    let month = Month::try_from(month_index as u8 + 1).ok()?;
    Date::from_calendar_date(year.parse().ok()?, month, day.parse().ok()?).ok()
}

/// Splits the page into row blocks using the first container pattern that
/// matches anything, keeping at most [`MAX_ROWS`].
fn row_blocks(html: &str) -> Vec<&str> {
    for pattern in ROW_CONTAINERS.iter() {
        let starts: Vec<usize> = pattern.find_iter(html).map(|m| m.start()).collect();
        if starts.is_empty() {
            continue;
        }

        return starts
            .iter()
            .enumerate()
            .map(|(i, &start)| {
                let end = starts.get(i + 1).copied().unwrap_or(html.len());
                &html[start..end]
            })
            .take(MAX_ROWS)
            .collect();
    }
    Vec::new()
}

fn parse_row(block: &str, rank: u32) -> Option<ChartRow> {
    let title = first_text(&TITLE_PATTERNS, block)?;
    let (artist, artist_end) = ARTIST_PATTERNS.iter().find_map(|pattern| {
        let captures = pattern.captures(block)?;
        let inner = captures.get(captures.len() - 1)?;
        let text = clean_text(inner.as_str());
        (!text.is_empty()).then(|| (text, captures.get(0).map_or(0, |m| m.end())))
    })?;

    let stats: Vec<Option<u32>> = STAT_CELL
        .captures_iter(&block[artist_end..])
        .take(3)
        .map(|c| c[1].parse().ok())
        .collect();

    let last_week = stats.first().copied().flatten();
    let peak = stats.get(1).copied().flatten().filter(|&p| p >= 1);
    let weeks = stats.get(2).copied().flatten().filter(|&w| w >= 1);

    let mut row = ChartRow::new(rank, title, artist)
        .with_peak(peak.unwrap_or(rank))
        .with_weeks(weeks.unwrap_or(1))
        .with_last_week(last_week);
    row.image_url = image_url(block);
    Some(row)
}

fn first_text(patterns: &[Regex], block: &str) -> Option<String> {
    patterns.iter().find_map(|pattern| {
        let captures = pattern.captures(block)?;
        let inner = captures.get(captures.len() - 1)?;
        let text = clean_text(inner.as_str());
        (!text.is_empty()).then_some(text)
    })
}

fn image_url(block: &str) -> Option<String> {
    let tag = IMAGE_TAG.find(block)?.as_str();
    ["data-lazy-src", "src", "data-src"].iter().find_map(|attr| {
        let pattern = Regex::new(&format!(r#"\b{attr}="([^"]+)""#)).ok()?;
        pattern
            .captures(tag)
            .map(|c| decode_entities(&c[1]))
            .filter(|url| !url.starts_with("data:"))
    })
}

fn visible_text(html: &str) -> String {
    TAG.replace_all(html, " ").into_owned()
}

/// Strips markup, decodes entities and collapses whitespace.
fn clean_text(fragment: &str) -> String {
    let without_tags = TAG.replace_all(fragment, " ");
    let decoded = decode_entities(&without_tags);
    WHITESPACE.replace_all(decoded.trim(), " ").into_owned()
}

fn decode_entities(text: &str) -> String {
    ENTITY
        .replace_all(text, |captures: &regex::Captures<'_>| {
            let entity = &captures[1];
            let decoded = if let Some(hex) = entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = entity.strip_prefix('#') {
                dec.parse().ok().and_then(char::from_u32)
            } else {
                match entity {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "nbsp" => Some(' '),
                    _ => None,
                }
            };
            decoded.map_or_else(|| captures[0].to_string(), String::from)
        })
        .into_owned()
}

/// The live chart page over HTTP.
pub struct PageSource {
    http: HttpClient,
    url: String,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl PageSource {
    pub fn new(
        http: HttpClient,
        url: impl Into<String>,
        retry: RetryPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            http,
            url: url.into(),
            retry,
            clock,
        }
    }

    /// Downloads and parses the current chart.
    pub fn fetch_latest(&self) -> Result<ChartSnapshot, FetchError> {
        tracing::info!(url = %self.url, "fetching chart page");
        let html = self
            .retry
            .run(|| self.http.send_text(self.http.get(&self.url)?))?;

        let snapshot = parse_chart_page(&html, self.clock.as_ref())?;
        tracing::info!(
            chart_date = %snapshot.chart_date,
            rows = snapshot.rows.len(),
            skipped = snapshot.skipped_rows,
            "chart page parsed"
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FixedClock;
    use time::macros::date;

    fn row_html(title: &str, artist: &str, stats: [&str; 3]) -> String {
        format!(
            r#"<div class="o-chart-results-list-row-container">
                <ul class="o-chart-results-list-row">
                  <li><span class="c-label a-font-primary-bold-l">0</span></li>
                  <li><img class="c-lazy-image__img" src="data:image/gif;base64,x" data-lazy-src="https://charts.example/{title}.jpg"></li>
                  <li class="o-chart-results-list__item">
                    <h3 id="title-of-a-story" class="c-title a-no-trucate">
                      {title}
                    </h3>
                    <span class="c-label a-no-trucate a-font-primary-s lrv-u-font-size-14">
                      {artist}
                    </span>
                  </li>
                  <li class="o-chart-results-list__item"><span class="c-label">{}</span></li>
                  <li class="o-chart-results-list__item"><span class="c-label">{}</span></li>
                  <li class="o-chart-results-list__item"><span class="c-label">{}</span></li>
                </ul>
              </div>"#,
            stats[0], stats[1], stats[2]
        )
    }

    fn page(head: &str, rows: &[String]) -> String {
        format!("<html><head>{head}</head><body>{}</body></html>", rows.concat())
    }

    fn clock() -> FixedClock {
        FixedClock::on(date!(2030 - 01 - 01))
    }

    #[test]
    fn parses_rows_in_rank_order() {
        let html = page(
            r#"<title>Billboard Hot 100</title></head><body><div id="chart-date-picker" data-date="2025-05-24" class="x"></div>"#,
            &[
                row_html("A Bar Song (Tipsy)", "Shaboozey", ["1", "1", "20"]),
                row_html("Espresso", "Sabrina Carpenter", ["3", "2", "8"]),
            ],
        );

        let snapshot = parse_chart_page(&html, &clock()).unwrap();

        assert_eq!(snapshot.chart_date, date!(2025 - 05 - 24));
        assert_eq!(snapshot.rows.len(), 2);
        assert_eq!(snapshot.skipped_rows, 0);

        let second = &snapshot.rows[1];
        assert_eq!(second.rank, 2);
        assert_eq!(second.title, "Espresso");
        assert_eq!(second.artist, "Sabrina Carpenter");
        assert_eq!(second.last_week_rank, Some(3));
        assert_eq!(second.peak_rank, 2);
        assert_eq!(second.weeks_on_chart, 8);
        assert_eq!(
            second.image_url.as_deref(),
            Some("https://charts.example/Espresso.jpg")
        );
    }

    #[test]
    fn missing_stats_fall_back_to_rank_and_one_week() {
        let html = page("", &[row_html("New Song", "New Artist", ["-", "-", "-"])]);
        let snapshot = parse_chart_page(&html, &clock()).unwrap();
        let row = &snapshot.rows[0];

        assert_eq!(row.last_week_rank, None);
        assert_eq!(row.peak_rank, 1);
        assert_eq!(row.weeks_on_chart, 1);
    }

    #[test]
    fn row_without_artist_is_skipped_and_counted() {
        let html = page(
            "",
            &[
                row_html("Fine", "Someone", ["1", "1", "2"]),
                row_html("Broken", "", ["2", "2", "2"]),
                row_html("Also Fine", "Someone Else", ["3", "3", "2"]),
            ],
        );
        let snapshot = parse_chart_page(&html, &clock()).unwrap();

        assert_eq!(snapshot.rows.len(), 2);
        assert_eq!(snapshot.skipped_rows, 1);
        assert_eq!(snapshot.rows[1].rank, 3);
    }

    #[test]
    fn chart_date_falls_back_to_page_title() {
        let html = page(
            "<title>Billboard Hot 100 Top 10 Countdown For May 24, 2025</title>",
            &[row_html("Song", "Artist", ["1", "1", "1"])],
        );
        let snapshot = parse_chart_page(&html, &clock()).unwrap();
        assert_eq!(snapshot.chart_date, date!(2025 - 05 - 24));
    }

    #[test]
    fn chart_date_falls_back_to_clock() {
        let html = page("", &[row_html("Song", "Artist", ["1", "1", "1"])]);
        let snapshot = parse_chart_page(&html, &clock()).unwrap();
        assert_eq!(snapshot.chart_date, date!(2030 - 01 - 01));
    }

    #[test]
    fn entities_are_decoded() {
        let html = page("", &[row_html("Don&#039;t Start Now", "Dua Lipa &amp; Friends", ["1", "1", "1"])]);
        let snapshot = parse_chart_page(&html, &clock()).unwrap();
        assert_eq!(snapshot.rows[0].title, "Don't Start Now");
        assert_eq!(snapshot.rows[0].artist, "Dua Lipa & Friends");
    }

    #[test]
    fn rows_beyond_the_hundredth_are_ignored() {
        let rows: Vec<String> = (1..=105)
            .map(|n| row_html(&format!("Song {n}"), "Artist", ["-", "-", "1"]))
            .collect();
        let snapshot = parse_chart_page(&page("", &rows), &clock()).unwrap();

        assert_eq!(snapshot.rows.len(), 100);
        assert_eq!(snapshot.rows[99].rank, 100);
        assert_eq!(snapshot.rows[99].title, "Song 100");
    }

    #[test]
    fn page_without_rows_is_structural_failure() {
        let result = parse_chart_page("<html><body>maintenance</body></html>", &clock());
        assert!(matches!(result, Err(FetchError::NoRows)));
    }

    #[test]
    fn legacy_markup_is_recognized() {
        let html = r#"<ol>
            <li class="chart-list__element display--flex">
              <span class="chart-element__information__song text--truncate">Old Song</span>
              <span class="chart-element__information__artist text--truncate">Old Artist</span>
            </li>
        </ol>"#;
        let snapshot = parse_chart_page(html, &clock()).unwrap();
        assert_eq!(snapshot.rows[0].title, "Old Song");
        assert_eq!(snapshot.rows[0].artist, "Old Artist");
    }
}
