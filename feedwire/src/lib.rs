mod datetime;
mod text;

pub use datetime::parse_published;
pub use text::strip_html;

use log::debug;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum FeedFetchError {
    #[error("error building feed HTTP client")]
    ClientBuildError(#[source] reqwest::Error),

    #[error("error executing feed request")]
    RequestExecuteError(#[source] reqwest::Error),

    #[error("feed host reported an error status")]
    FeedStatusError(#[source] reqwest::Error),

    #[error("error extracting feed response body")]
    RequestBodyError(#[source] reqwest::Error),

    #[error("error parsing feed XML")]
    FeedParseError(#[source] rss::Error),
}

/// One feed entry as it came off the wire, before any normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEntry {
    pub title: Option<String>,
    pub link: Option<String>,
    pub summary: Option<String>,
    pub published: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug)]
pub struct FetchedFeed {
    pub title: String,
    pub description: Option<String>,
    pub entries: Vec<RawEntry>,
}

pub struct FeedClient {
    client: reqwest::Client,
}

impl FeedClient {
    pub fn new(timeout: Duration) -> Result<Self, FeedFetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(FeedFetchError::ClientBuildError)?;

        Ok(Self { client })
    }

    pub async fn fetch(&self, url: &str) -> Result<FetchedFeed, FeedFetchError> {
        debug!("Fetching feed {url}");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(FeedFetchError::RequestExecuteError)?
            .error_for_status()
            .map_err(FeedFetchError::FeedStatusError)?;

        let body = response
            .bytes()
            .await
            .map_err(FeedFetchError::RequestBodyError)?;

        let channel =
            rss::Channel::read_from(&body[..]).map_err(FeedFetchError::FeedParseError)?;

        let entries = channel.items().iter().map(item_to_entry).collect();

        Ok(FetchedFeed {
            title: channel.title().to_string(),
            description: match channel.description() {
                "" => None,
                other => Some(other.to_string()),
            },
            entries,
        })
    }
}

fn item_to_entry(item: &rss::Item) -> RawEntry {
    // RSS 2.0 permits a single enclosure; it only counts as the entry's
    // image when its declared type says so.
    let image = item.enclosure().and_then(|enclosure| {
        if enclosure.mime_type().to_ascii_lowercase().contains("image") {
            Some(enclosure.url().to_string())
        } else {
            None
        }
    });

    RawEntry {
        title: item.title().map(str::to_string),
        link: item.link().map(str::to_string),
        summary: item.description().map(str::to_string),
        published: item.pub_date().map(str::to_string),
        image,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
        <rss version="2.0">
          <channel>
            <title>Example Wire</title>
            <description>World news</description>
            <item>
              <title>First story</title>
              <link>https://example.com/a</link>
              <description>&lt;p&gt;Lead paragraph&lt;/p&gt;</description>
              <pubDate>Sat, 01 Mar 2026 12:00:00 GMT</pubDate>
              <enclosure url="https://example.com/a.jpg" length="1024" type="image/jpeg"/>
            </item>
            <item>
              <title>Second story</title>
              <link>https://example.com/b</link>
              <enclosure url="https://example.com/b.mp3" length="2048" type="audio/mpeg"/>
            </item>
          </channel>
        </rss>"#;

    #[test]
    fn parses_items_and_image_enclosures() {
        let channel = rss::Channel::read_from(SAMPLE_FEED.as_bytes()).unwrap();
        let entries: Vec<_> = channel.items().iter().map(item_to_entry).collect();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].title.as_deref(), Some("First story"));
        assert_eq!(entries[0].link.as_deref(), Some("https://example.com/a"));
        assert_eq!(
            entries[0].image.as_deref(),
            Some("https://example.com/a.jpg")
        );
        assert_eq!(
            entries[0].published.as_deref(),
            Some("Sat, 01 Mar 2026 12:00:00 GMT")
        );

        // The audio enclosure must not be picked up as an image
        assert_eq!(entries[1].image, None);
        assert_eq!(entries[1].published, None);
    }
}
