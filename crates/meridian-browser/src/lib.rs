pub mod chromium;

pub use chromium::{BrowserSettings, ChromiumBrowser, ChromiumSession};
