use async_trait::async_trait;
use feedfusion_db::models::DbNews;
use log::{debug, warn};
use miette::Diagnostic;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum SearchError {
    #[error("error executing search index request")]
    RequestError(#[source] reqwest::Error),

    #[error("search index reported an error status")]
    StatusError(#[source] reqwest::Error),

    #[error("error decoding search index response")]
    DecodeError(#[source] reqwest::Error),

    #[error("search index response had an unexpected shape")]
    ResponseShape,
}

/// The indexed projection of a news row.
#[derive(Debug, Serialize)]
pub struct NewsDoc<'a> {
    pub id: i32,
    pub channel_id: i32,
    pub title: &'a str,
    pub summary: &'a str,
    pub source: &'a str,
    pub link: &'a str,
    pub image: Option<&'a str>,
    pub published: chrono::NaiveDateTime,
    pub content_hash: &'a str,
}

impl<'a> From<&'a DbNews> for NewsDoc<'a> {
    fn from(news: &'a DbNews) -> Self {
        Self {
            id: news.id,
            channel_id: news.channel_id,
            title: &news.title,
            summary: &news.summary,
            source: &news.source,
            link: &news.link,
            image: news.image.as_deref(),
            published: news.published,
            content_hash: &news.content_hash,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub query: Option<String>,
    pub categories: Option<Vec<String>>,
    pub channel_ids: Option<Vec<i32>>,
    pub limit: i64,
    pub search_after: Option<serde_json::Value>,
    pub recent_first: bool,
}

#[derive(Debug)]
pub struct SearchResponse {
    pub total: i64,
    pub docs: Vec<serde_json::Value>,
    pub last_sort: Option<serde_json::Value>,
}

/// The two capabilities the pipeline needs from the index: bulk ingest and
/// cursor-paginated search.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Indexes the documents. Per-item failures come back as messages; they
    /// are the caller's to log, never to fail on.
    async fn bulk_add(&self, docs: &[NewsDoc<'_>]) -> Result<Vec<String>, SearchError>;

    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, SearchError>;
}

pub struct ElasticSearchIndex {
    client: reqwest::Client,
    base_url: String,
    index: String,
}

impl ElasticSearchIndex {
    pub fn new(base_url: &str, index: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            index: index.to_string(),
        }
    }

    fn build_query(request: &SearchRequest) -> serde_json::Value {
        let must = match &request.query {
            Some(query) => json!({
                "bool": {
                    "should": [
                        {
                            "multi_match": {
                                "query": query,
                                "fields": ["title^3", "summary^1.5", "source"],
                                "type": "best_fields",
                                "fuzziness": "AUTO",
                                "operator": "or",
                            }
                        },
                        {
                            "multi_match": {
                                "query": query,
                                "fields": ["title^5", "summary^2"],
                                "type": "phrase",
                                "boost": 2,
                            }
                        },
                    ],
                    "minimum_should_match": 1,
                }
            }),
            None => json!({ "match_all": {} }),
        };

        let mut filter = Vec::new();
        if let Some(categories) = &request.categories {
            filter.push(json!({ "terms": { "category": categories } }));
        }
        if let Some(channel_ids) = &request.channel_ids {
            filter.push(json!({ "terms": { "channel_id": channel_ids } }));
        }

        let order = if request.recent_first { "desc" } else { "asc" };
        let mut body = json!({
            "query": { "bool": { "must": must, "filter": filter } },
            "size": request.limit,
            "sort": [
                { "published": { "order": order } },
                { "id": { "order": order } },
            ],
            "track_total_hits": true,
        });

        if let Some(search_after) = &request.search_after {
            body["search_after"] = search_after.clone();
        }

        body
    }
}

#[async_trait]
impl SearchIndex for ElasticSearchIndex {
    async fn bulk_add(&self, docs: &[NewsDoc<'_>]) -> Result<Vec<String>, SearchError> {
        let mut body = String::new();
        for doc in docs {
            body.push_str("{\"index\":{}}\n");
            body.push_str(
                &serde_json::to_string(doc).expect("news doc serialization cannot fail"),
            );
            body.push('\n');
        }

        let response = self
            .client
            .post(format!("{}/{}/_bulk", self.base_url, self.index))
            .header("content-type", "application/x-ndjson")
            .body(body)
            .send()
            .await
            .map_err(SearchError::RequestError)?
            .error_for_status()
            .map_err(SearchError::StatusError)?;

        let parsed: serde_json::Value =
            response.json().await.map_err(SearchError::DecodeError)?;

        let mut item_errors = Vec::new();
        if parsed["errors"].as_bool() == Some(true) {
            for item in parsed["items"].as_array().into_iter().flatten() {
                if let Some(error) = item["index"]["error"].as_object() {
                    item_errors.push(
                        serde_json::to_string(error)
                            .unwrap_or_else(|_| "unknown index error".to_string()),
                    );
                }
            }
            warn!("Bulk indexing had {} item errors", item_errors.len());
        } else {
            debug!("Indexed {} documents", docs.len());
        }

        Ok(item_errors)
    }

    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, SearchError> {
        let body = Self::build_query(request);

        let response = self
            .client
            .post(format!("{}/{}/_search", self.base_url, self.index))
            .json(&body)
            .send()
            .await
            .map_err(SearchError::RequestError)?
            .error_for_status()
            .map_err(SearchError::StatusError)?;

        let parsed: serde_json::Value =
            response.json().await.map_err(SearchError::DecodeError)?;

        let hits = parsed["hits"]["hits"]
            .as_array()
            .ok_or(SearchError::ResponseShape)?;
        let total = parsed["hits"]["total"]["value"]
            .as_i64()
            .ok_or(SearchError::ResponseShape)?;

        let last_sort = hits.last().and_then(|hit| hit.get("sort")).cloned();
        let docs = hits
            .iter()
            .filter_map(|hit| hit.get("_source").cloned())
            .collect();

        Ok(SearchResponse {
            total,
            docs,
            last_sort,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_defaults_to_match_all() {
        let body = ElasticSearchIndex::build_query(&SearchRequest {
            limit: 15,
            recent_first: true,
            ..Default::default()
        });

        assert!(body["query"]["bool"]["must"]["match_all"].is_object());
        assert_eq!(body["size"], 15);
        assert_eq!(body["sort"][0]["published"]["order"], "desc");
        assert!(body.get("search_after").is_none());
    }

    #[test]
    fn filters_and_cursor_are_applied() {
        let body = ElasticSearchIndex::build_query(&SearchRequest {
            query: Some("economy".to_string()),
            categories: Some(vec!["economics".to_string()]),
            channel_ids: Some(vec![1, 2]),
            limit: 10,
            search_after: Some(json!([1234, 56])),
            recent_first: false,
        });

        assert_eq!(
            body["query"]["bool"]["filter"][0]["terms"]["category"][0],
            "economics"
        );
        assert_eq!(
            body["query"]["bool"]["filter"][1]["terms"]["channel_id"][1],
            2
        );
        assert_eq!(body["sort"][0]["published"]["order"], "asc");
        assert_eq!(body["search_after"], json!([1234, 56]));
    }
}
