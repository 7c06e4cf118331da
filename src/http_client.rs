use std::time::Duration;

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use reqwest::blocking::Client;

static CLIENT: OnceCell<Client> = OnceCell::new();

/// Shared client. The first caller decides the timeout; later calls reuse it.
pub fn http_client_with_timeout(timeout: Duration) -> Result<&'static Client> {
    CLIENT.get_or_try_init(|| {
        Client::builder()
            .timeout(timeout)
            .user_agent(concat!("dota_insights/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build http client")
    })
}
