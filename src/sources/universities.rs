use serde::{Deserialize, Serialize};

use crate::error::HttpError;
use crate::sources::client::FetchClient;
use crate::sources::request::ApiRequest;

pub const PAGE_SIZE: u32 = 20;

const SEARCH_PATH: &str = "/search";

/// One catalog record as returned by the search endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct University {
    pub alpha_two_code: String,
    pub name: String,
    #[serde(rename = "state-province")]
    pub state_province: Option<String>,
    pub web_pages: Vec<String>,
    pub domains: Vec<String>,
    pub country: Option<String>,
}

/// `GET /search?name=&offset=&limit=` for one page of results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniversitySearchRequest {
    name: Option<String>,
    page: u32,
}

impl UniversitySearchRequest {
    /// A blank query browses the whole catalog; pages start at 1.
    pub fn new(query: &str, page: u32) -> Self {
        let query = query.trim();
        Self {
            name: (!query.is_empty()).then(|| query.to_string()),
            page: page.max(1),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn offset(&self) -> u32 {
        (self.page - 1).saturating_mul(PAGE_SIZE)
    }
}

impl ApiRequest for UniversitySearchRequest {
    type Response = Vec<University>;

    fn path(&self) -> &str {
        SEARCH_PATH
    }

    fn query(&self) -> Vec<(String, String)> {
        let mut params = Vec::with_capacity(3);
        if let Some(name) = &self.name {
            params.push(("name".to_string(), name.clone()));
        }
        params.push(("offset".to_string(), self.offset().to_string()));
        params.push(("limit".to_string(), PAGE_SIZE.to_string()));
        params
    }
}

/// Paginated name search over the catalog.
#[async_trait::async_trait]
pub trait UniversitySearch: Send + Sync {
    async fn search(&self, query: &str, page: u32) -> Result<Vec<University>, HttpError>;
}

#[derive(Clone, Debug)]
pub struct UniversitiesService {
    client: FetchClient,
}

impl UniversitiesService {
    pub fn new(client: FetchClient) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl UniversitySearch for UniversitiesService {
    async fn search(&self, query: &str, page: u32) -> Result<Vec<University>, HttpError> {
        self.client
            .send(&UniversitySearchRequest::new(query, page))
            .await
    }
}
