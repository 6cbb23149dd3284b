// src/fetch/mod.rs

use reqwest::Client;
use tokio::fs;
use tracing::{debug, instrument};

use crate::error::BoxError;
use crate::sources::Locator;

/// Read the whole body behind `locator` as text.
///
/// Remote locators must answer with a success status; anything else,
/// including a body that is not valid UTF-8, is an error.
#[instrument(level = "debug", skip_all, fields(locator = %locator))]
pub async fn fetch_text(client: &Client, locator: &Locator) -> Result<String, BoxError> {
    let text = match locator {
        Locator::Remote(url) => {
            client
                .get(url.clone())
                .send()
                .await?
                .error_for_status()?
                .text()
                .await?
        }
        Locator::File(path) => fs::read_to_string(path).await?,
    };
    debug!(bytes = text.len(), "fetched");
    Ok(text)
}
