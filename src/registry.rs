use crate::error::LookupError;
use crate::types::{RegistryColour, RegistryRecord};
use async_trait::async_trait;
use log::debug;
use reqwest::StatusCode;
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Fixed row positions used when a row carries no recognisable label.
/// Row 2 of the vehicle table is the make and row 3 the model.
const MAKE_ROW: usize = 1;
const MODEL_ROW: usize = 2;

#[async_trait]
pub trait Registry: Send + Sync {
    async fn lookup(&self, plate: &str) -> Result<RegistryRecord, LookupError>;
}

/// Scrapes the public vehicle registry page (`<base>?q=<plate>`).
pub struct RegistryClient {
    client: reqwest::Client,
    base_url: Url,
}

impl RegistryClient {
    pub fn new(client: reqwest::Client, base_url: Url) -> Self {
        RegistryClient { client, base_url }
    }

    fn page_url(&self, plate: &str) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut().append_pair("q", plate);
        url
    }
}

#[async_trait]
impl Registry for RegistryClient {
    async fn lookup(&self, plate: &str) -> Result<RegistryRecord, LookupError> {
        let url = self.page_url(plate);
        debug!("Looking up plate {} at {}", plate, url);
        let response = self.client.get(url).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => return Err(LookupError::NotFound(plate.to_string())),
            status if !status.is_success() => return Err(LookupError::Service(status)),
            _ => {}
        }
        let html = response.text().await?;
        parse_vehicle_page(&html)
    }
}

/// Extracts make, model and colour from the registry's vehicle table.
///
/// Cells are located by their label (`Make`, `Model`, `Colour`) where the
/// page provides one. Without labels, make and model fall back to rows 2 and
/// 3 of the table, whose second cell holds the value. Each value is reduced
/// to its first word and lower-cased. Colour has no positional fallback: the
/// registry does not always publish it, and then it is `UNKNOWN`.
pub fn parse_vehicle_page(html: &str) -> Result<RegistryRecord, LookupError> {
    let document = Html::parse_document(html);
    let table = document
        .select(&selector("table.table"))
        .next()
        .ok_or(LookupError::NoTable)?;
    let rows: Vec<Vec<String>> = table
        .select(&selector("tr"))
        .map(row_cells)
        .collect();
    if rows.len() <= MODEL_ROW {
        return Err(LookupError::MissingRows {
            expected: MODEL_ROW + 1,
            found: rows.len(),
        });
    }

    let make = labelled_value(&rows, |label| label == "make")
        .or_else(|| positional_value(&rows[MAKE_ROW]))
        .and_then(first_word)
        .ok_or(LookupError::MissingField("make"))?;
    let model = labelled_value(&rows, |label| label == "model")
        .or_else(|| positional_value(&rows[MODEL_ROW]))
        .and_then(first_word)
        .ok_or(LookupError::MissingField("model"))?;
    let colour = labelled_value(&rows, |label| {
        label.contains("colour") || label.contains("color")
    })
    .and_then(first_word)
    .map(RegistryColour::Known)
    .unwrap_or(RegistryColour::Unknown);

    Ok(RegistryRecord {
        make,
        model,
        colour,
    })
}

fn selector(css: &'static str) -> Selector {
    Selector::parse(css).expect("static selector")
}

fn row_cells(row: ElementRef<'_>) -> Vec<String> {
    row.select(&selector("th, td"))
        .map(|cell| cell.text().collect::<Vec<_>>().join(" "))
        .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|text| !text.is_empty())
        .collect()
}

fn labelled_value<'a, F>(rows: &'a [Vec<String>], matches: F) -> Option<&'a str>
where
    F: Fn(&str) -> bool,
{
    rows.iter()
        .filter(|cells| cells.len() >= 2)
        .find(|cells| matches(&normalize_label(&cells[0])))
        .map(|cells| cells[1].as_str())
}

fn positional_value(cells: &[String]) -> Option<&str> {
    match cells {
        [_, value, ..] => Some(value.as_str()),
        [single] => single.split_once(' ').map(|(_, rest)| rest),
        [] => None,
    }
}

fn normalize_label(label: &str) -> String {
    label.trim().trim_end_matches(':').trim().to_lowercase()
}

fn first_word(value: &str) -> Option<String> {
    value.split_whitespace().next().map(str::to_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    const LABELLED_PAGE: &str = r#"
        <html><body>
        <table class="table">
          <tr><th colspan="2">Vehicle details</th></tr>
          <tr><td>Make</td><td>TOYOTA</td></tr>
          <tr><td>Model</td><td>COROLLA GX</td></tr>
          <tr><td>Year</td><td>2012</td></tr>
          <tr><td>Body</td><td>Sedan</td></tr>
          <tr><td>Main Colour</td><td>Silver</td></tr>
        </table>
        </body></html>"#;

    #[test]
    fn extracts_labelled_fields() {
        let record = parse_vehicle_page(LABELLED_PAGE).unwrap();
        assert_eq!(
            record,
            RegistryRecord {
                make: "toyota".to_string(),
                model: "corolla".to_string(),
                colour: RegistryColour::Known("silver".to_string()),
            }
        );
    }

    #[test]
    fn missing_colour_row_is_unknown() {
        let html = r#"<table class="table">
            <tr><th>Details</th></tr>
            <tr><td>Make:</td><td>Mazda</td></tr>
            <tr><td>Model:</td><td>Demio</td></tr>
            <tr><td>Year:</td><td>2008</td></tr>
        </table>"#;
        let record = parse_vehicle_page(html).unwrap();
        assert_eq!(record.make, "mazda");
        assert_eq!(record.model, "demio");
        assert_eq!(record.colour, RegistryColour::Unknown);
    }

    #[test]
    fn unlabelled_rows_fall_back_to_fixed_positions() {
        let html = r#"<table class="table">
            <tr><td>NZ registered vehicle</td></tr>
            <tr><td>1.</td><td>Honda</td></tr>
            <tr><td>2.</td><td>Civic Type R</td></tr>
        </table>"#;
        let record = parse_vehicle_page(html).unwrap();
        assert_eq!(record.make, "honda");
        assert_eq!(record.model, "civic");
        assert_eq!(record.colour, RegistryColour::Unknown);
    }

    #[test]
    fn unexpected_page_shapes_are_lookup_errors() {
        assert!(matches!(
            parse_vehicle_page("<html><p>No vehicle found</p></html>"),
            Err(LookupError::NoTable)
        ));
        assert!(matches!(
            parse_vehicle_page(r#"<table class="other"><tr><td>Make</td><td>Ford</td></tr></table>"#),
            Err(LookupError::NoTable)
        ));
        assert!(matches!(
            parse_vehicle_page(
                r#"<table class="table"><tr><th>x</th></tr><tr><td>Make</td><td>Ford</td></tr></table>"#
            ),
            Err(LookupError::MissingRows {
                expected: 3,
                found: 2
            })
        ));
        assert!(matches!(
            parse_vehicle_page(
                r#"<table class="table"><tr><th>x</th></tr><tr><td>Make</td><td>Ford</td></tr><tr></tr></table>"#
            ),
            Err(LookupError::MissingField("model"))
        ));
    }

    #[tokio::test]
    async fn queries_registry_by_plate() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/c/")
            .match_query(Matcher::UrlEncoded("q".into(), "ABC123".into()))
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body(LABELLED_PAGE)
            .create_async()
            .await;

        let base = Url::parse(&format!("{}/c/", server.url())).unwrap();
        let registry = RegistryClient::new(reqwest::Client::new(), base);
        let record = registry.lookup("ABC123").await.unwrap();
        assert_eq!(record.model, "corolla");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn missing_page_is_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/c/")
            .match_query(Matcher::Any)
            .with_status(404)
            .create_async()
            .await;

        let base = Url::parse(&format!("{}/c/", server.url())).unwrap();
        let registry = RegistryClient::new(reqwest::Client::new(), base);
        assert!(matches!(
            registry.lookup("ZZZ999").await,
            Err(LookupError::NotFound(plate)) if plate == "ZZZ999"
        ));
    }

    #[tokio::test]
    async fn unanswered_lookup_times_out() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let base = Url::parse(&format!("http://{}/c/", listener.local_addr().unwrap())).unwrap();

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(200))
            .build()
            .unwrap();
        let registry = RegistryClient::new(client, base);
        assert!(matches!(
            registry.lookup("ABC123").await,
            Err(LookupError::Timeout)
        ));
        drop(listener);
    }
}
