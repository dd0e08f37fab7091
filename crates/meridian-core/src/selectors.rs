//! Site markup as data.
//!
//! Every field is an ordered list of probes tried front to back. A probe is
//! either a CSS selector (read the element's text) or `css@attribute` (read
//! that attribute). Markup drifts often, so profiles can be overridden from a
//! JSON file without rebuilding.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// One parsed probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe<'a> {
    pub css: &'a str,
    pub attribute: Option<&'a str>,
}

impl<'a> Probe<'a> {
    pub fn parse(raw: &'a str) -> Self {
        match raw.rsplit_once('@') {
            Some((css, attr))
                if !css.is_empty()
                    && !attr.is_empty()
                    && attr
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') =>
            {
                Self {
                    css,
                    attribute: Some(attr),
                }
            }
            _ => Self {
                css: raw,
                attribute: None,
            },
        }
    }
}

/// Probes for fields shown on a listing entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryFields {
    pub name: Vec<String>,
    pub address: Vec<String>,
    pub rating: Vec<String>,
    pub reviews: Vec<String>,
    pub phone: Vec<String>,
    pub website: Vec<String>,
    /// Anchors whose `href` may embed coordinates.
    pub links: Vec<String>,
}

impl Default for EntryFields {
    fn default() -> Self {
        Self {
            name: strings(&["div.qBF1Pd", "a.hfpxzc@aria-label"]),
            address: strings(&[
                "div.W4Efsd div.W4Efsd span:nth-of-type(2) span:nth-of-type(2)",
                "div.W4Efsd span:nth-of-type(2)",
            ]),
            rating: strings(&["span.MW4etd"]),
            reviews: strings(&["span.UY7F9"]),
            phone: strings(&["span.UsdlK"]),
            website: strings(&["a.lcr4fd@href"]),
            links: strings(&["a"]),
        }
    }
}

/// Probes for the detail view ("card") opened by clicking an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetailFields {
    pub name: Vec<String>,
    pub address: Vec<String>,
    pub rating: Vec<String>,
    pub reviews: Vec<String>,
    pub phone: Vec<String>,
    pub website: Vec<String>,
    pub close_buttons: Vec<String>,
    pub back_buttons: Vec<String>,
}

impl Default for DetailFields {
    fn default() -> Self {
        Self {
            name: strings(&["h1.DUwDvf"]),
            address: strings(&[
                "button[data-item-id='address'] div.Io6YTe",
                "button[aria-label*='address'] div.Io6YTe",
                "div.rogA2c div.Io6YTe.fontBodyMedium",
            ]),
            rating: strings(&["div.F7nice span span", "span.Aq14fc"]),
            reviews: strings(&["div.F7nice span:nth-child(2) span span", "span.z5jxId"]),
            phone: strings(&[
                "button[data-item-id='phone:tel'] div.Io6YTe",
                "button[aria-label*='phone'] div.Io6YTe",
                "button[data-tooltip='Copy phone number'] div.Io6YTe",
            ]),
            website: strings(&[
                "a[data-item-id='authority']@href",
                "a[aria-label*='website']@href",
                "a[data-tooltip*='website']@href",
            ]),
            close_buttons: strings(&[
                "button[aria-label='Close']",
                "button[jsaction*='closeButton']",
                "[role='button'][aria-label='Close']",
                "button.mL3xi",
            ]),
            back_buttons: strings(&["button[aria-label='Back']"]),
        }
    }
}

/// Everything the engines need to know about one map site's markup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteProfile {
    pub search_url: String,
    /// Cookie/consent buttons, clicked once after navigation if present.
    pub consent_buttons: Vec<String>,
    pub search_box: Vec<String>,
    /// Scrollable container holding the result entries.
    pub results_container: Vec<String>,
    pub entry: Vec<String>,
    /// Explicit "no results" indicators.
    pub no_results: Vec<String>,
    /// Text shown once the listing cannot load more entries.
    pub end_markers: Vec<String>,
    pub entry_fields: EntryFields,
    pub detail: DetailFields,
    /// Attributes that make an entry identifier stable across re-renders.
    pub entry_id_attributes: Vec<String>,
    pub latitude_attribute: String,
    pub longitude_attribute: String,
    /// Script returning `{lat, lng}` for the entry named `arguments[0]`, or null.
    pub coordinate_script: String,
    /// Hosts whose links never count as a business website.
    pub excluded_website_hosts: Vec<String>,
}

impl Default for SiteProfile {
    fn default() -> Self {
        Self {
            search_url: "https://www.google.com/maps".to_string(),
            consent_buttons: strings(&[
                "button[aria-label='Reject all']",
                "button[aria-label='Accept all']",
                "button[aria-label='I agree']",
                "button[aria-label='Dismiss']",
            ]),
            search_box: strings(&["#searchboxinput", "input[name='q']"]),
            results_container: strings(&["div[role='feed']", "div[aria-label*='Results']"]),
            entry: strings(&["div.Nv2PK"]),
            no_results: strings(&["div.Q2vNVc"]),
            end_markers: strings(&[
                "You've reached the end of the list",
                "No more results",
                "End of results",
                "No additional results found",
            ]),
            entry_fields: EntryFields::default(),
            detail: DetailFields::default(),
            entry_id_attributes: strings(&["data-cid", "data-result-index", "data-item-id"]),
            latitude_attribute: "data-lat".to_string(),
            longitude_attribute: "data-lng".to_string(),
            coordinate_script: COORDINATE_SCRIPT.to_string(),
            excluded_website_hosts: strings(&["google.com"]),
        }
    }
}

const COORDINATE_SCRIPT: &str = r#"
const name = arguments[0];
const state = window.APP_INITIALIZATION_STATE;
if (!state || !name) { return null; }
const text = JSON.stringify(state);
const at = text.indexOf(name);
if (at < 0) { return null; }
const m = text.slice(at, at + 2000).match(/(-?\d{1,2}\.\d{4,}),(-?\d{1,3}\.\d{4,})/);
return m ? { lat: parseFloat(m[1]), lng: parseFloat(m[2]) } : null;
"#;

impl SiteProfile {
    pub fn from_json(raw: &str) -> Result<Self, AppError> {
        let profile: SiteProfile = serde_json::from_str(raw)?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn from_file(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::ConfigError(format!(
                "Failed to read site profile {}: {e}",
                path.display()
            ))
        })?;
        Self::from_json(&raw)
    }

    /// Lists the engines cannot work without must not be empty.
    pub fn validate(&self) -> Result<(), AppError> {
        let required = [
            ("search_box", &self.search_box),
            ("results_container", &self.results_container),
            ("entry", &self.entry),
            ("entry_fields.name", &self.entry_fields.name),
            ("detail.name", &self.detail.name),
        ];
        for (field, probes) in required {
            if probes.is_empty() {
                return Err(AppError::ConfigError(format!(
                    "Site profile field '{field}' needs at least one selector"
                )));
            }
        }
        Ok(())
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
