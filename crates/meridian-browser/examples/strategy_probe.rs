/// Smoke-test for `ChromiumBrowser` against the live map site.
///
/// Launches Chromium, runs one search and prints the strategy the hybrid
/// engine would pick for it.
///
/// Run with:
///   cargo run -p meridian-browser --example strategy_probe -- "plumber in 10001 NY"
use std::sync::Arc;

use meridian_browser::{BrowserSettings, ChromiumBrowser};
use meridian_core::pacing::Pacing;
use meridian_core::selectors::SiteProfile;
use meridian_core::strategy::StrategySelector;
use meridian_core::traits::{BrowserAutomation, BrowserSession};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let query = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "coffee in 10001 NY".to_string());

    println!("Launching browser…");
    let browser = ChromiumBrowser::launch(BrowserSettings::default()).await?;
    let session = browser.new_session().await?;

    let selector = StrategySelector::new(Arc::new(SiteProfile::default()), Pacing::default());
    let decision = selector
        .select(&session, &query, &CancellationToken::new())
        .await;
    session.close().await?;

    match decision {
        Some(decision) => {
            println!("Strategy: {}", decision.strategy);
            println!("Rationale: {}", decision.rationale);
            println!(
                "Sampled {} entries, completeness {:.2}",
                decision.sample_size, decision.completeness_score
            );
        }
        None => println!("Cancelled before a decision"),
    }
    Ok(())
}
