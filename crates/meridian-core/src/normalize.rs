//! Field normalisation for text read off listing and detail markup.

use std::sync::LazyLock;

use regex::Regex;
use scraper::Html;
use unicode_normalization::UnicodeNormalization;
use url::Url;

use crate::models::Coordinates;

static COORDS_IN_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/@(-?\d+\.\d+),(-?\d+\.\d+),").expect("valid regex"));

static DECIMAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:[.,]\d+)?").expect("valid regex"));

/// Unescape HTML entities, apply Unicode NFC and trim.
///
/// The value is parsed as an HTML fragment, so stray markup is dropped
/// along with the entities being decoded.
pub fn normalize_text(raw: &str) -> String {
    let unescaped = if raw.contains('&') || raw.contains('<') {
        let fragment = Html::parse_fragment(raw);
        fragment.root_element().text().collect::<String>()
    } else {
        raw.to_string()
    };
    unescaped.nfc().collect::<String>().trim().to_string()
}

/// Normalised text, or `None` when nothing is left.
pub fn non_empty_text(raw: &str) -> Option<String> {
    let text = normalize_text(raw);
    (!text.is_empty() && text != "N/A").then_some(text)
}

pub fn digits_only(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

/// Phone reduced to its digits; `None` when it has fewer than `min_digits`.
pub fn parse_phone(raw: &str, min_digits: usize) -> Option<String> {
    let digits = digits_only(raw);
    (!digits.is_empty() && digits.len() >= min_digits).then_some(digits)
}

/// `"(1,234)"` → 1234. Anything unparseable counts as zero.
pub fn parse_review_count(raw: &str) -> u32 {
    digits_only(raw).parse().unwrap_or(0)
}

/// First decimal number in the text, accepting `,` as the decimal separator.
pub fn parse_rating(raw: &str) -> Option<f64> {
    let found = DECIMAL.find(raw)?;
    found.as_str().replace(',', ".").parse().ok()
}

/// Coordinates embedded in a map URL as `/@lat,lng,zoom`.
pub fn coordinates_from_url(url: &str) -> Option<Coordinates> {
    let caps = COORDS_IN_URL.captures(url)?;
    let latitude = caps.get(1)?.as_str().parse().ok()?;
    let longitude = caps.get(2)?.as_str().parse().ok()?;
    valid_coordinates(latitude, longitude)
}

/// Coordinates from a pair of attribute values such as `data-lat`/`data-lng`.
pub fn coordinates_from_pair(lat: &str, lng: &str) -> Option<Coordinates> {
    let latitude = lat.trim().parse().ok()?;
    let longitude = lng.trim().parse().ok()?;
    valid_coordinates(latitude, longitude)
}

/// Coordinates from a script result shaped `{"lat": .., "lng": ..}` or `[lat, lng]`.
pub fn coordinates_from_json(value: &serde_json::Value) -> Option<Coordinates> {
    let (lat, lng) = match value {
        serde_json::Value::Object(map) => (map.get("lat")?.as_f64()?, map.get("lng")?.as_f64()?),
        serde_json::Value::Array(items) if items.len() == 2 => {
            (items[0].as_f64()?, items[1].as_f64()?)
        }
        _ => return None,
    };
    valid_coordinates(lat, lng)
}

fn valid_coordinates(latitude: f64, longitude: f64) -> Option<Coordinates> {
    ((-90.0..=90.0).contains(&latitude) && (-180.0..=180.0).contains(&longitude)).then_some(
        Coordinates {
            latitude,
            longitude,
        },
    )
}

/// An outbound business website: absolute http(s) and not one of `excluded_hosts`.
pub fn usable_website(href: &str, excluded_hosts: &[String]) -> Option<String> {
    let href = href.trim();
    if !href.starts_with("http") {
        return None;
    }
    let url = Url::parse(href).ok()?;
    let host = url.host_str()?;
    let excluded = excluded_hosts
        .iter()
        .any(|blocked| host == blocked || host.ends_with(&format!(".{blocked}")));
    (!excluded).then(|| href.to_string())
}

/// Detail-view addresses must contain a digit and be longer than five characters.
pub fn plausible_address(address: &str) -> bool {
    address.chars().count() > 5 && address.chars().any(|c| c.is_ascii_digit())
}
