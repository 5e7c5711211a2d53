use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

use super::{parse_address, RegistryError, RegistryProvider};
use crate::types::NonCirculatingAccount;

pub const DEFAULT_MULTISIGS_URL: &str = "https://info.send.it/finance/multisigs";

static HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<h3[^>]*>(.*?)</h3>").expect("heading pattern"));
static TABLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<table[^>]*>(.*?)</table>").expect("table pattern"));
static ROW: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<tr[^>]*>(.*?)</tr>").expect("row pattern"));
static CELL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<td[^>]*>(.*?)</td>").expect("cell pattern"));
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("tag pattern"));
static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\W").expect("non-word pattern"));

/// Registry read from the hosted treasury page.
///
/// The page lists one `<h3>` heading per group followed by a table of
/// `name | address` rows; the n-th table belongs to the n-th heading.
pub struct DocumentRegistry {
    client: Client,
    url: String,
}

impl DocumentRegistry {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, RegistryError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RegistryError::Fetch(e.to_string()))?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl RegistryProvider for DocumentRegistry {
    async fn fetch(&self) -> Result<Vec<NonCirculatingAccount>, RegistryError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| RegistryError::Fetch(format!("{}: {}", self.url, e)))?;

        if !response.status().is_success() {
            return Err(RegistryError::Fetch(format!("{} returned {}", self.url, response.status())));
        }

        let body = response
            .text()
            .await
            .map_err(|e| RegistryError::Fetch(format!("{}: {}", self.url, e)))?;

        let accounts = parse_multisig_document(&body)?;
        info!("Fetched {} non-circulating accounts from {}", accounts.len(), self.url);
        Ok(accounts)
    }

    fn provider_name(&self) -> &str {
        "document"
    }
}

/// Extract `(group, label, address)` entries from the treasury page HTML.
pub fn parse_multisig_document(html: &str) -> Result<Vec<NonCirculatingAccount>, RegistryError> {
    let headings: Vec<String> = HEADING
        .captures_iter(html)
        .map(|c| cell_text(&c[1]))
        .collect();
    debug!("Found headings: {}", headings.join(", "));

    let mut accounts = Vec::new();

    for (table_index, table) in TABLE.captures_iter(html).enumerate() {
        let heading = headings.get(table_index);

        // First row is the header
        for row in ROW.captures_iter(&table[1]).skip(1) {
            let cells: Vec<String> = CELL.captures_iter(&row[1]).map(|c| c[1].to_string()).collect();
            if cells.len() < 2 {
                continue;
            }

            let label = cell_text(&cells[0]);
            let raw_address = NON_WORD.replace_all(&cell_text(&cells[1]), "").into_owned();
            let address = parse_address(&raw_address)?;

            let mut account = NonCirculatingAccount::new(&label, address);
            if let Some(heading) = heading {
                account = account.with_group(heading);
            }
            debug!("Found multisig {} ({:?}) {}", label, heading, account.checksummed());
            accounts.push(account);
        }
    }

    if accounts.is_empty() {
        return Err(RegistryError::Empty);
    }
    Ok(accounts)
}

fn cell_text(fragment: &str) -> String {
    let stripped = TAG.replace_all(fragment, "");
    stripped
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&#x27;", "'")
        .replace("&#39;", "'")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
        <h3 id="core">Core <span>Multisigs</span></h3>
        <table>
          <thead><tr><th>Name</th><th>Address</th></tr></thead>
          <tbody>
            <tr><td>Treasury</td><td><a href="https://etherscan.io/address/0x5355c409fa3D0901292231Ddb953C949C2211D96"><code>0x5355c409fa3D0901292231Ddb953C949C2211D96</code></a> </td></tr>
            <tr><td>Core Team</td><td>0xE52D0967A2eE242098d11c209f53C8158E329eCC&nbsp;</td></tr>
          </tbody>
        </table>
        <h3>Distributions &amp; Listings</h3>
        <table>
          <tr><td>Name</td><td>Address</td></tr>
          <tr><td>Dex n Cex Listings</td><td>0xF530e6E60e7a65Ea717f843a8b2e6fcdC727aC9E</td></tr>
          <tr><td colspan="2">note row</td></tr>
        </table>
        </body></html>
    "#;

    #[test]
    fn test_parse_document() {
        let accounts = parse_multisig_document(PAGE).unwrap();
        assert_eq!(accounts.len(), 3);

        assert_eq!(accounts[0].label, "Treasury");
        assert_eq!(accounts[0].group.as_deref(), Some("Core Multisigs"));
        assert_eq!(accounts[0].checksummed(), "0x5355c409fa3D0901292231Ddb953C949C2211D96");

        assert_eq!(accounts[1].label, "Core Team");
        assert_eq!(accounts[1].checksummed(), "0xE52D0967A2eE242098d11c209f53C8158E329eCC");

        assert_eq!(accounts[2].group.as_deref(), Some("Distributions & Listings"));
        assert_eq!(accounts[2].label, "Dex n Cex Listings");
    }

    #[test]
    fn test_empty_document() {
        let html = "<h3>Nothing</h3><table><tr><th>Name</th><th>Address</th></tr></table>";
        assert_eq!(parse_multisig_document(html).unwrap_err(), RegistryError::Empty);
    }

    #[test]
    fn test_invalid_address_is_parse_error() {
        let html = "<table><tr><td>h</td><td>h</td></tr><tr><td>Bad</td><td>0xnot-an-address</td></tr></table>";
        assert!(matches!(parse_multisig_document(html), Err(RegistryError::Parse(_))));
    }
}
