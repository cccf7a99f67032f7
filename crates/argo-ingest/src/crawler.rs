//! Directory crawler
//!
//! Walks the HTML directory listings of the remote archive down a fixed number
//! of folder levels and collects the data-file links found at the deepest
//! level. Only anchor `href`s are considered; a page without any anchors is
//! treated as a failed listing.

use std::collections::HashSet;

use scraper::{Html, Selector};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use crate::fetch::Fetcher;
use crate::state::RemoteFileRef;

/// Outcome of one crawl
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlReport {
    /// Data files in discovery order, without duplicates
    pub files: Vec<RemoteFileRef>,
    /// Listings that could not be fetched; their branches were skipped
    pub failed_listings: usize,
}

/// Crawler over a directory-indexed HTTP archive
pub struct Crawler {
    fetcher: Fetcher,
    depth: usize,
    data_suffix: String,
}

impl Crawler {
    pub fn new(fetcher: Fetcher, config: &IngestConfig) -> Self {
        Self {
            fetcher,
            depth: config.crawl_depth,
            data_suffix: config.data_suffix.to_ascii_lowercase(),
        }
    }

    /// Absolute URLs linked from a listing page, minus self and parent links
    pub async fn list_entries(&self, url: &str) -> Result<Vec<Url>> {
        let page = Url::parse(url)?;
        let html = self.fetcher.get_text(url).await?;
        parse_listing(&html, &page)
    }

    /// Child folders of a listing page
    pub async fn list_subfolders(&self, url: &str) -> Result<Vec<Url>> {
        let page = Url::parse(url)?;
        let entries = self.list_entries(url).await?;
        Ok(entries.into_iter().filter(|e| is_child_folder(e, &page)).collect())
    }

    /// Data files linked from a listing page
    pub async fn list_data_files(&self, url: &str) -> Result<Vec<RemoteFileRef>> {
        let entries = self.list_entries(url).await?;
        Ok(entries
            .into_iter()
            .filter(|e| has_suffix(e, &self.data_suffix))
            .map(|e| RemoteFileRef::new(String::from(e)))
            .collect())
    }

    /// Walk `depth` folder levels below `base_url`, then collect data files
    ///
    /// A listing that cannot be fetched contributes nothing and is counted in
    /// [`CrawlReport::failed_listings`]; the rest of the walk continues.
    pub async fn discover(&self, base_url: &str) -> CrawlReport {
        let mut report = CrawlReport::default();
        let mut level = vec![base_url.to_string()];

        for depth in 1..=self.depth {
            let mut next = Vec::new();
            let mut seen = HashSet::new();
            for folder in &level {
                match self.list_subfolders(folder).await {
                    Ok(children) => {
                        for child in children {
                            let child = String::from(child);
                            if seen.insert(child.clone()) {
                                next.push(child);
                            }
                        }
                    },
                    Err(e) => {
                        warn!(url = %folder, error = %e, "Skipping folder listing");
                        report.failed_listings += 1;
                    },
                }
            }
            debug!(depth, folders = next.len(), "Crawled folder level");
            level = next;
        }

        let mut seen = HashSet::new();
        for folder in &level {
            match self.list_data_files(folder).await {
                Ok(files) => {
                    for file in files {
                        if seen.insert(file.clone()) {
                            report.files.push(file);
                        }
                    }
                },
                Err(e) => {
                    warn!(url = %folder, error = %e, "Skipping file listing");
                    report.failed_listings += 1;
                },
            }
        }

        info!(
            files = report.files.len(),
            failed_listings = report.failed_listings,
            "Crawl complete"
        );
        report
    }
}

/// Parse anchors out of a listing page and resolve them against `page`
///
/// Drops links back to the page itself (including query-only variants such as
/// Apache sort links), links to any ancestor directory, fragments, and
/// non-HTTP schemes. Document order is kept; duplicates are removed.
///
/// A page with no anchors at all is not a directory listing and fails with
/// [`IngestError::Parse`].
pub fn parse_listing(html: &str, page: &Url) -> Result<Vec<Url>> {
    let document = Html::parse_document(html);
    let anchors =
        Selector::parse("a[href]").map_err(|e| IngestError::Parse(format!("selector: {e:?}")))?;

    let mut seen = HashSet::new();
    let mut entries = Vec::new();
    let mut anchor_count = 0;
    for element in document.select(&anchors) {
        anchor_count += 1;
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let href = href.trim();
        if href.is_empty() || href.starts_with('#') {
            continue;
        }
        let Ok(mut resolved) = page.join(href) else {
            debug!(href, "Ignoring unresolvable link");
            continue;
        };
        resolved.set_fragment(None);

        if !matches!(resolved.scheme(), "http" | "https") {
            continue;
        }
        if same_location(&resolved, page) || is_ancestor(&resolved, page) {
            continue;
        }
        if seen.insert(resolved.clone()) {
            entries.push(resolved);
        }
    }

    if anchor_count == 0 {
        return Err(IngestError::Parse(format!("{page} is not an anchor-based listing")));
    }
    Ok(entries)
}

fn same_origin(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme() && a.host_str() == b.host_str() && a.port_or_known_default() == b.port_or_known_default()
}

/// Same path on the same host, whatever the query
fn same_location(entry: &Url, page: &Url) -> bool {
    same_origin(entry, page) && entry.path() == page.path()
}

fn is_ancestor(entry: &Url, page: &Url) -> bool {
    same_origin(entry, page)
        && entry.path().ends_with('/')
        && page.path().len() > entry.path().len()
        && page.path().starts_with(entry.path())
}

fn is_child_folder(entry: &Url, page: &Url) -> bool {
    let page_dir = match page.path().rfind('/') {
        Some(idx) => &page.path()[..=idx],
        None => "/",
    };
    same_origin(entry, page)
        && entry.query().is_none()
        && entry.path().ends_with('/')
        && entry.path().len() > page_dir.len()
        && entry.path().starts_with(page_dir)
}

fn has_suffix(entry: &Url, suffix: &str) -> bool {
    entry.path().to_ascii_lowercase().ends_with(suffix)
}
