//! Pulls of forecast-hub predictions and surveillance truth data.
//!
//! Files come from the COVID-19 Forecast Hub and the COVID-19 Scenario
//! Modeling Hub GitHub repositories and are returned as [`RawTable`]s, to be
//! mapped onto record sets with a schema. Nothing in the scoring core calls
//! into this module.

use anyhow::{Context, Result, bail};
use chrono::{Datelike, Duration, NaiveDate};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{Instrument, debug, info, warn};

use crate::fetch::{HttpClient, fetch_bytes};
use crate::table::RawTable;

const FORECAST_HUB_BASE: &str =
    "https://raw.githubusercontent.com/reichlab/covid19-forecast-hub/master/data-processed";
const SCENARIO_HUB_BASE: &str =
    "https://raw.githubusercontent.com/midas-network/covid19-scenario-modeling-hub/master/data-processed";
const TRUTH_BASE: &str =
    "https://media.githubusercontent.com/media/reichlab/covid19-forecast-hub/master/data-truth";

/// Extensions tried, in order, for a scenario hub round file.
pub const SCENARIO_EXTENSIONS: [&str; 5] = [".csv", ".gz", ".zip", ".csv.zip", ".csv.gz"];

/// MMWR epidemiological week: Sunday to Saturday, week 1 being the first
/// week with at least four days in the year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Epiweek {
    year: i32,
    week: u32,
}

/// Sunday starting week 1 of `year`.
fn week_one_start(year: i32) -> Option<NaiveDate> {
    let jan1 = NaiveDate::from_ymd_opt(year, 1, 1)?;
    let wd = i64::from(jan1.weekday().num_days_from_sunday());
    Some(if wd <= 3 {
        jan1 - Duration::days(wd)
    } else {
        jan1 + Duration::days(7 - wd)
    })
}

impl Epiweek {
    /// `None` when `week` does not exist in `year`.
    pub fn new(year: i32, week: u32) -> Option<Self> {
        (week >= 1 && week <= Self::weeks_in_year(year)?).then_some(Self { year, week })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn week(&self) -> u32 {
        self.week
    }

    /// 52 or 53.
    pub fn weeks_in_year(year: i32) -> Option<u32> {
        let days = (week_one_start(year + 1)? - week_one_start(year)?).num_days();
        u32::try_from(days / 7).ok()
    }

    /// The Sunday opening the week.
    pub fn start_date(&self) -> NaiveDate {
        // week_one_start only fails outside chrono's date range, which
        // `new` and `containing` already rule out
        week_one_start(self.year).unwrap_or(NaiveDate::MIN) + Duration::weeks(i64::from(self.week) - 1)
    }

    pub fn end_date(&self) -> NaiveDate {
        self.start_date() + Duration::days(6)
    }

    /// The epiweek `date` falls in.
    pub fn containing(date: NaiveDate) -> Option<Self> {
        let mut year = date.year();
        if date >= week_one_start(year + 1)? {
            year += 1;
        } else if date < week_one_start(year)? {
            year -= 1;
        }
        let days = (date - week_one_start(year)?).num_days();
        Some(Self {
            year,
            week: u32::try_from(days / 7).ok()? + 1,
        })
    }

    /// The following week.
    pub fn succ(&self) -> Option<Self> {
        Self::containing(self.start_date() + Duration::weeks(1))
    }

    /// Every week from `start` to `end`, both included. Empty when
    /// `start` comes after `end`.
    pub fn range(start: Epiweek, end: Epiweek) -> Vec<Epiweek> {
        let mut weeks = Vec::new();
        let mut current = Some(start);
        while let Some(w) = current.filter(|w| *w <= end) {
            weeks.push(w);
            current = w.succ();
        }
        weeks
    }
}

impl fmt::Display for Epiweek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:02}", self.year, self.week)
    }
}

/// Surveillance series published as truth data by the forecast hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurveillanceTarget {
    Death,
    Case,
    Hospitalization,
}

impl SurveillanceTarget {
    fn file_label(&self) -> &'static str {
        match self {
            SurveillanceTarget::Death => "Deaths",
            SurveillanceTarget::Case => "Cases",
            SurveillanceTarget::Hospitalization => "Hospitalizations",
        }
    }
}

impl FromStr for SurveillanceTarget {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "death" => Ok(SurveillanceTarget::Death),
            "case" => Ok(SurveillanceTarget::Case),
            "hospitalization" => Ok(SurveillanceTarget::Hospitalization),
            other => Err(format!("unknown surveillance target '{}'", other)),
        }
    }
}

pub fn forecast_hub_url(model: &str, date: NaiveDate) -> String {
    format!(
        "{}/{}/{}-{}.csv",
        FORECAST_HUB_BASE,
        model,
        date.format("%Y-%m-%d"),
        model
    )
}

pub fn scenario_hub_url(model: &str, date: &str, extension: &str) -> String {
    format!("{}/{}/{}-{}{}", SCENARIO_HUB_BASE, model, date, model, extension)
}

pub fn surveillance_url(target: SurveillanceTarget, incidence: bool) -> String {
    let kind = if incidence { "Incident" } else { "Cumulative" };
    format!("{}/truth-{}%20{}.csv", TRUTH_BASE, kind, target.file_label())
}

/// First URL of `urls` that downloads successfully.
async fn fetch_first<C: HttpClient + ?Sized>(
    client: &C,
    urls: &[String],
) -> Option<(String, Vec<u8>)> {
    for url in urls {
        match fetch_bytes(client, url).await {
            Ok(bytes) => return Some((url.clone(), bytes)),
            Err(e) => debug!(url = %url, error = %e, "File not reachable"),
        }
    }
    None
}

/// Downloads the submissions of `model` for every epiweek from `start` to
/// `end` and concatenates them in week order.
///
/// A week's file is looked up for its Monday, then for its Sunday since
/// some teams submit on Sundays. Weeks with no file are skipped with a
/// warning; at most `concurrency` downloads run at once.
#[tracing::instrument(skip(client, start, end), fields(start = %start, end = %end))]
pub async fn pull_forecast_hub_predictions<C: HttpClient + 'static>(
    client: Arc<C>,
    model: &str,
    start: Epiweek,
    end: Epiweek,
    concurrency: usize,
) -> Result<RawTable> {
    let weeks = Epiweek::range(start, end);
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for (idx, week) in weeks.iter().enumerate() {
        let client = client.clone();
        let sem = semaphore.clone();
        let sunday = week.start_date();
        let monday = sunday + Duration::days(1);
        let urls = vec![forecast_hub_url(model, monday), forecast_hub_url(model, sunday)];
        let week_span = tracing::info_span!("pull_week", week = %week);

        tasks.spawn(
            async move {
                let _permit = sem.acquire_owned().await?;
                let found = fetch_first(client.as_ref(), &urls).await;
                if found.is_none() {
                    warn!(date = %monday, "Data for date is unavailable");
                }
                Ok::<_, anyhow::Error>((idx, found))
            }
            .instrument(week_span),
        );
    }

    let mut files = Vec::with_capacity(weeks.len());
    while let Some(joined) = tasks.join_next().await {
        let (idx, found) = joined.context("Download task failed")??;
        if let Some((url, bytes)) = found {
            let table =
                RawTable::from_csv_bytes(&bytes).with_context(|| format!("Failed to parse {}", url))?;
            files.push((idx, table));
        }
    }
    files.sort_by_key(|(idx, _)| *idx);

    if files.is_empty() {
        bail!("No forecast file available for model {}", model);
    }
    info!(weeks = weeks.len(), files = files.len(), "Forecast hub files pulled");

    Ok(RawTable::concat(files.into_iter().map(|(_, t)| t).collect())?)
}

/// Downloads the scenario hub round files of `model` for each date
/// (`YYYY-MM-DD`), trying every extension of [`SCENARIO_EXTENSIONS`].
/// Returns `None` when no file is available.
#[tracing::instrument(skip(client, dates))]
pub async fn pull_scenario_hub_predictions<C: HttpClient + ?Sized>(
    client: &C,
    model: &str,
    dates: &[&str],
) -> Result<Option<RawTable>> {
    let mut tables = Vec::new();
    for date in dates {
        let urls: Vec<String> = SCENARIO_EXTENSIONS
            .iter()
            .map(|ext| scenario_hub_url(model, date, ext))
            .collect();
        if let Some((url, bytes)) = fetch_first(client, &urls).await {
            tables.push(
                RawTable::from_csv_bytes(&bytes).with_context(|| format!("Failed to parse {}", url))?,
            );
        }
    }

    if tables.is_empty() {
        warn!(model, dates = ?dates, "Data for model and dates unavailable");
        return Ok(None);
    }
    Ok(Some(RawTable::concat(tables)?))
}

/// Downloads the truth series for `target`, incident or cumulative.
#[tracing::instrument(skip(client))]
pub async fn pull_surveillance_data<C: HttpClient + ?Sized>(
    client: &C,
    target: SurveillanceTarget,
    incidence: bool,
) -> Result<RawTable> {
    let url = surveillance_url(target, incidence);
    let bytes = fetch_bytes(client, &url).await?;
    let table = RawTable::from_csv_bytes(&bytes).with_context(|| format!("Failed to parse {}", url))?;
    info!(rows = table.len(), "Surveillance data pulled");
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use reqwest::{Request, Response};
    use std::collections::HashMap;
    use std::io::{Cursor, Write};
    use std::sync::Mutex;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    /// Serves `files` by URL and answers 404 otherwise. A URL listed in
    /// `slow` yields to the runtime that many times before answering.
    #[derive(Default)]
    struct MockClient {
        files: HashMap<String, Vec<u8>>,
        slow: HashMap<String, usize>,
        requested: Mutex<Vec<String>>,
    }

    impl MockClient {
        fn serve(mut self, url: String, body: &[u8]) -> Self {
            self.files.insert(url, body.to_vec());
            self
        }

        fn requested(&self) -> Vec<String> {
            self.requested.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HttpClient for MockClient {
        async fn execute(&self, req: Request) -> reqwest::Result<Response> {
            let url = req.url().to_string();
            self.requested.lock().unwrap().push(url.clone());
            for _ in 0..self.slow.get(&url).copied().unwrap_or(0) {
                tokio::task::yield_now().await;
            }

            let (status, body) = match self.files.get(&url) {
                Some(body) => (200, body.clone()),
                None => (404, Vec::new()),
            };
            Ok(http::Response::builder().status(status).body(body).unwrap().into())
        }
    }

    fn forecast_csv(day: &str, value: u32) -> Vec<u8> {
        format!("target_end_date,quantile,value\n{},0.5,{}\n", day, value).into_bytes()
    }

    fn zipped(name: &str, content: &[u8]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file(name, zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(content).unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_week_one_start() {
        // Jan 1st on a Wednesday: week 1 starts the Sunday before
        assert_eq!(week_one_start(2020), Some(date("2019-12-29")));
        // Jan 1st on a Friday: week 1 starts the Sunday after
        assert_eq!(week_one_start(2021), Some(date("2021-01-03")));
        assert_eq!(week_one_start(2022), Some(date("2022-01-02")));
    }

    #[test]
    fn test_weeks_in_year() {
        assert_eq!(Epiweek::weeks_in_year(2020), Some(53));
        assert_eq!(Epiweek::weeks_in_year(2021), Some(52));
        assert!(Epiweek::new(2020, 53).is_some());
        assert!(Epiweek::new(2021, 53).is_none());
        assert!(Epiweek::new(2021, 0).is_none());
    }

    #[test]
    fn test_containing_across_year_boundary() {
        assert_eq!(Epiweek::containing(date("2021-01-01")), Epiweek::new(2020, 53));
        assert_eq!(Epiweek::containing(date("2019-12-30")), Epiweek::new(2020, 1));
        assert_eq!(Epiweek::containing(date("2020-11-28")), Epiweek::new(2020, 48));
    }

    #[test]
    fn test_start_and_end_dates() {
        let w = Epiweek::new(2020, 48).unwrap();
        assert_eq!(w.start_date(), date("2020-11-22"));
        assert_eq!(w.end_date(), date("2020-11-28"));
        assert_eq!(w.to_string(), "202048");
    }

    #[test]
    fn test_range_crosses_years() {
        let weeks = Epiweek::range(Epiweek::new(2020, 52).unwrap(), Epiweek::new(2021, 2).unwrap());
        let labels: Vec<String> = weeks.iter().map(|w| w.to_string()).collect();
        assert_eq!(labels, vec!["202052", "202053", "202101", "202102"]);

        assert!(Epiweek::range(Epiweek::new(2021, 2).unwrap(), Epiweek::new(2021, 1).unwrap()).is_empty());
    }

    #[test]
    fn test_forecast_hub_url() {
        assert_eq!(
            forecast_hub_url("COVIDhub-ensemble", date("2020-11-23")),
            "https://raw.githubusercontent.com/reichlab/covid19-forecast-hub/master/data-processed/COVIDhub-ensemble/2020-11-23-COVIDhub-ensemble.csv"
        );
    }

    #[test]
    fn test_scenario_hub_url() {
        assert_eq!(
            scenario_hub_url("MOBS_NEU-GLEAM_COVID", "2021-05-02", ".csv.gz"),
            "https://raw.githubusercontent.com/midas-network/covid19-scenario-modeling-hub/master/data-processed/MOBS_NEU-GLEAM_COVID/2021-05-02-MOBS_NEU-GLEAM_COVID.csv.gz"
        );
    }

    #[test]
    fn test_surveillance_url() {
        assert_eq!(
            surveillance_url(SurveillanceTarget::Death, true),
            "https://media.githubusercontent.com/media/reichlab/covid19-forecast-hub/master/data-truth/truth-Incident%20Deaths.csv"
        );
        assert!(
            surveillance_url(SurveillanceTarget::Hospitalization, false)
                .ends_with("truth-Cumulative%20Hospitalizations.csv")
        );
    }

    #[test]
    fn test_target_from_str() {
        assert_eq!("Case".parse::<SurveillanceTarget>(), Ok(SurveillanceTarget::Case));
        assert!("recovery".parse::<SurveillanceTarget>().is_err());
    }

    #[tokio::test]
    async fn test_forecast_pull_falls_back_to_sunday() {
        let model = "team-model";
        let client = MockClient::default()
            .serve(forecast_hub_url(model, date("2020-11-23")), &forecast_csv("2020-11-28", 1))
            .serve(forecast_hub_url(model, date("2020-11-29")), &forecast_csv("2020-12-05", 2));
        let client = Arc::new(client);

        let table = pull_forecast_hub_predictions(
            client.clone(),
            model,
            Epiweek::new(2020, 48).unwrap(),
            Epiweek::new(2020, 50).unwrap(),
            1,
        )
        .await
        .unwrap();

        let values: Vec<&str> = table.records.iter().filter_map(|r| r.get(2)).collect();
        assert_eq!(values, vec!["1", "2"]);

        // week 49: Monday first, then the Sunday that opens the week
        let requested = client.requested();
        let monday = requested
            .iter()
            .position(|u| *u == forecast_hub_url(model, date("2020-11-30")))
            .unwrap();
        let sunday = requested
            .iter()
            .position(|u| *u == forecast_hub_url(model, date("2020-11-29")))
            .unwrap();
        assert!(monday < sunday);
        // week 50 has no file under either date
        assert_eq!(requested.len(), 1 + 2 + 2);
    }

    #[tokio::test]
    async fn test_forecast_pull_keeps_week_order() {
        let model = "team-model";
        let mondays = ["2020-11-23", "2020-11-30", "2020-12-07"];
        let mut client = MockClient::default();
        for (i, monday) in mondays.iter().enumerate() {
            let url = forecast_hub_url(model, date(monday));
            client.files.insert(url.clone(), forecast_csv(monday, i as u32));
            // earlier weeks answer last
            client.slow.insert(url, 10 * (mondays.len() - i));
        }

        let table = pull_forecast_hub_predictions(
            Arc::new(client),
            model,
            Epiweek::new(2020, 48).unwrap(),
            Epiweek::new(2020, 50).unwrap(),
            3,
        )
        .await
        .unwrap();

        let values: Vec<&str> = table.records.iter().filter_map(|r| r.get(2)).collect();
        assert_eq!(values, vec!["0", "1", "2"]);
    }

    #[tokio::test]
    async fn test_forecast_pull_without_any_file_fails() {
        let result = pull_forecast_hub_predictions(
            Arc::new(MockClient::default()),
            "team-model",
            Epiweek::new(2020, 48).unwrap(),
            Epiweek::new(2020, 49).unwrap(),
            2,
        )
        .await;

        let err = result.unwrap_err();
        assert!(err.to_string().contains("team-model"));
    }

    #[tokio::test]
    async fn test_scenario_pull_concatenates_dates() {
        let model = "team-model";
        let header = "scenario_id,target_end_date,quantile,value\n";
        let first = format!("{}A-2021-05-01,2021-05-08,0.5,10\n", header);
        let second = format!("{}B-2021-05-22,2021-05-29,0.5,20\n", header);
        let client = MockClient::default()
            .serve(scenario_hub_url(model, "2021-05-02", ".csv"), first.as_bytes())
            .serve(
                scenario_hub_url(model, "2021-05-23", ".csv.zip"),
                &zipped("2021-05-23-team-model.csv", second.as_bytes()),
            );

        let table = pull_scenario_hub_predictions(&client, model, &["2021-05-02", "2021-05-23", "2021-06-13"])
            .await
            .unwrap()
            .unwrap();

        assert_eq!(table.headers, vec!["scenario_id", "target_end_date", "quantile", "value"]);
        let scenarios: Vec<&str> = table.records.iter().filter_map(|r| r.get(0)).collect();
        assert_eq!(scenarios, vec!["A-2021-05-01", "B-2021-05-22"]);

        // every extension is tried for the missing date
        let requested = client.requested();
        for ext in SCENARIO_EXTENSIONS {
            assert!(requested.contains(&scenario_hub_url(model, "2021-06-13", ext)));
        }
    }

    #[tokio::test]
    async fn test_scenario_pull_without_any_file() {
        let client = MockClient::default();
        let result = pull_scenario_hub_predictions(&client, "team-model", &["2021-05-02"])
            .await
            .unwrap();
        assert!(result.is_none());
        assert_eq!(client.requested().len(), SCENARIO_EXTENSIONS.len());
    }

    #[tokio::test]
    async fn test_surveillance_pull() {
        let client = MockClient::default().serve(
            surveillance_url(SurveillanceTarget::Death, true),
            b"date,location,location_name,value\n2020-11-28,US,US,100\n",
        );

        let table = pull_surveillance_data(&client, SurveillanceTarget::Death, true)
            .await
            .unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.column_index("value"), Some(3));

        assert!(
            pull_surveillance_data(&client, SurveillanceTarget::Death, false)
                .await
                .is_err()
        );
    }
}
