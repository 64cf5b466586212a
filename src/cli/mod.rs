//! Command-line surface.

use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::warn;

use crate::controller::ControllerConfig;
use crate::error::UniSearchError;
use crate::render;
use crate::sources::client::FetchClient;
use crate::sources::connectivity::{Connectivity, ConnectivityMonitor, Probe};
use crate::sources::universities::{PAGE_SIZE, UniversitiesService, UniversitySearch};
use crate::sources::{BASE_URL_ENV, configured_base};
use crate::transform::university::{self, UniversityRow};

pub mod browse;
pub mod health;

#[derive(Parser, Debug)]
#[command(name = "unisearch", version, about = "Search universities by name")]
pub struct Cli {
    /// Catalog endpoint, e.g. http://universities.hipolabs.com (overrides UNISEARCH_BASE_URL)
    #[arg(long, global = true, value_name = "URL")]
    pub base_url: Option<String>,

    /// Output JSON instead of markdown
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch one page of search results
    Search {
        /// Name fragment; omit to browse the whole catalog
        query: Option<String>,

        /// 1-based page number
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    /// Incremental search: each stdin line is a new query, `:more` loads the next page, `:quit` exits
    Browse {
        /// Quiet period after the last edit before searching
        #[arg(long, default_value_t = 750)]
        debounce_ms: u64,

        /// Load the next page when a row this close to the end is reached
        #[arg(long, default_value_t = 5)]
        lookback: usize,
    },
    /// Check connectivity and the search endpoint
    Health,
}

#[derive(Debug, Serialize)]
struct SearchPage<'a> {
    query: &'a str,
    page: u32,
    page_size: u32,
    has_more: bool,
    rows: Vec<UniversityRow>,
}

fn resolve_base(flag: Option<String>) -> Option<String> {
    flag.map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(configured_base)
}

/// Starts the process-wide monitor against the endpoint host and returns its
/// state handle.
fn connectivity_for(probe: Option<&Probe>) -> Connectivity {
    let monitor = ConnectivityMonitor::global();
    if let Some(probe) = probe {
        monitor.start(probe.clone());
    }
    monitor.state()
}

async fn search(
    service: &impl UniversitySearch,
    query: &str,
    page: u32,
    json: bool,
) -> Result<String, UniSearchError> {
    if page == 0 {
        return Err(UniSearchError::InvalidArgument(
            "--page must be 1 or greater".into(),
        ));
    }
    let rows: Vec<UniversityRow> = service
        .search(query, page)
        .await?
        .iter()
        .map(university::from_university)
        .collect();

    if json {
        return render::json::to_pretty(&SearchPage {
            query: query.trim(),
            page,
            page_size: PAGE_SIZE,
            has_more: !rows.is_empty(),
            rows,
        });
    }
    render::markdown::university_search_markdown(query, page, PAGE_SIZE, &rows)
}

/// Runs a non-interactive command, or a browse session, and returns what
/// should be printed to stdout.
pub async fn run(cli: Cli) -> anyhow::Result<String> {
    let Cli {
        base_url,
        json,
        command,
    } = cli;

    let base = resolve_base(base_url);
    if base.is_none() {
        warn!("No catalog endpoint configured; pass --base-url or set {BASE_URL_ENV}");
    }
    let probe = base.as_deref().and_then(Probe::for_base_url);
    let connectivity = connectivity_for(probe.as_ref());
    let service = UniversitiesService::new(FetchClient::new(base, connectivity.clone())?);

    match command {
        Commands::Search { query, page } => {
            Ok(search(&service, query.as_deref().unwrap_or_default(), page, json).await?)
        }
        Commands::Browse {
            debounce_ms,
            lookback,
        } => {
            let config = ControllerConfig {
                debounce: Duration::from_millis(debounce_ms),
                lookback,
            };
            browse::run(service, config, json).await?;
            Ok(String::new())
        }
        Commands::Health => {
            let report = health::check(&service, &connectivity, probe.as_ref()).await;
            if json {
                Ok(render::json::to_pretty(&report)?)
            } else {
                Ok(report.to_markdown())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("unisearch").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = parse(&["search", "saint mary", "--page", "3", "--json"]);
        assert!(cli.json);
        match cli.command {
            Commands::Search { query, page } => {
                assert_eq!(query.as_deref(), Some("saint mary"));
                assert_eq!(page, 3);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn browse_defaults_match_controller_defaults() {
        let cli = parse(&["browse"]);
        let Commands::Browse {
            debounce_ms,
            lookback,
        } = cli.command
        else {
            panic!("expected browse");
        };
        let defaults = ControllerConfig::default();
        assert_eq!(Duration::from_millis(debounce_ms), defaults.debounce);
        assert_eq!(lookback, defaults.lookback);
    }

    #[test]
    fn base_flag_wins_and_blank_flag_is_ignored() {
        assert_eq!(
            resolve_base(Some(" http://localhost:8080 ".into())).as_deref(),
            Some("http://localhost:8080")
        );
        assert_eq!(resolve_base(Some("  ".into())), configured_base());
    }

    fn service_for(server: &MockServer) -> UniversitiesService {
        UniversitiesService::new(
            FetchClient::new(Some(server.uri()), Connectivity::online()).unwrap(),
        )
    }

    #[tokio::test]
    async fn search_renders_requested_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("name", "stanford"))
            .and(query_param("offset", "20"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{
                "alpha_two_code": "US",
                "name": "Stanford University",
                "state-province": "California",
                "web_pages": ["https://www.stanford.edu/"],
                "domains": ["stanford.edu"],
                "country": "United States"
            }])))
            .expect(2)
            .mount(&server)
            .await;
        let service = service_for(&server);

        let markdown = search(&service, "stanford", 2, false).await.unwrap();
        assert!(markdown.contains("| Stanford University | California, United States |"));
        assert!(markdown.contains("Showing result 21. Use --page 3 for more."));

        let json: serde_json::Value =
            serde_json::from_str(&search(&service, "stanford", 2, true).await.unwrap()).unwrap();
        assert_eq!(json["page"], 2);
        assert_eq!(json["has_more"], true);
        assert_eq!(json["rows"][0]["location"], "California, United States");
    }

    #[tokio::test]
    async fn search_rejects_page_zero_without_a_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .expect(0)
            .mount(&server)
            .await;

        let err = search(&service_for(&server), "mit", 0, false)
            .await
            .unwrap_err();
        assert!(matches!(err, UniSearchError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn search_surfaces_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = search(&service_for(&server), "mit", 1, false)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Server error (500)");
    }
}
