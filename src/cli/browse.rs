//! Interactive incremental search over line-oriented input.
//!
//! Each input line replaces the raw query; `:more` scrolls to the last loaded
//! row and `:quit` ends the session. The view is re-rendered whenever what it
//! shows changes. At end of input the session waits for pending work to
//! settle, so piped input behaves like a slow typist.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::LinesStream;
use tracing::debug;

use crate::controller::{ControllerConfig, SearchController, SearchSnapshot};
use crate::error::UniSearchError;
use crate::render;
use crate::sources::universities::UniversitySearch;

#[derive(Debug, Clone, PartialEq, Eq)]
enum BrowseInput {
    Query(String),
    More,
    Quit,
}

impl BrowseInput {
    fn parse(line: &str) -> Self {
        match line.trim() {
            ":more" => Self::More,
            ":quit" | ":q" => Self::Quit,
            _ => Self::Query(line.to_string()),
        }
    }
}

/// Runs a browse session on stdin and stdout.
pub async fn run<S: UniversitySearch + 'static>(
    service: S,
    config: ControllerConfig,
    json: bool,
) -> anyhow::Result<()> {
    let input = BufReader::new(tokio::io::stdin());
    let mut output = tokio::io::stdout();
    run_session(SearchController::new(service, config), input, &mut output, json).await
}

pub async fn run_session<S, R, W>(
    mut controller: SearchController<S>,
    input: R,
    output: &mut W,
    json: bool,
) -> anyhow::Result<()>
where
    S: UniversitySearch + 'static,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = LinesStream::new(input.lines());
    let mut input_open = true;
    let mut pending_more = false;
    let mut shown: Option<SearchSnapshot> = None;

    controller.start();
    render_if_changed(&controller, &mut shown, output, json).await?;

    loop {
        // `:more` waits until the view reflects the latest query.
        if pending_more && !controller.is_busy() {
            pending_more = false;
            if let Some(last) = controller.snapshot().rows.last() {
                controller.notify_scrolled_near(&last.id);
            }
            render_if_changed(&controller, &mut shown, output, json).await?;
        }
        if !input_open && !pending_more && !controller.is_busy() {
            break;
        }

        let busy = controller.is_busy();
        tokio::select! {
            line = lines.next(), if input_open => match line {
                Some(line) => match BrowseInput::parse(&line?) {
                    BrowseInput::Query(text) => controller.set_query(text),
                    BrowseInput::More => pending_more = true,
                    BrowseInput::Quit => break,
                },
                None => {
                    debug!("Browse input closed");
                    input_open = false;
                }
            },
            transition = controller.step(), if busy => {
                debug!(?transition, "Browse transition");
            }
            else => break,
        }

        render_if_changed(&controller, &mut shown, output, json).await?;
    }

    controller.shutdown();
    Ok(())
}

/// Writes the current view unless it only differs from the last one in the
/// raw, not yet debounced, query.
async fn render_if_changed<S, W>(
    controller: &SearchController<S>,
    shown: &mut Option<SearchSnapshot>,
    output: &mut W,
    json: bool,
) -> Result<(), UniSearchError>
where
    S: UniversitySearch + 'static,
    W: AsyncWrite + Unpin,
{
    let visible = SearchSnapshot {
        query: String::new(),
        ..controller.snapshot()
    };
    if shown.as_ref() == Some(&visible) {
        return Ok(());
    }

    let rendered = if json {
        render::json::to_pretty(&visible)?
    } else {
        render::markdown::snapshot_markdown(&visible)?
    };
    output.write_all(rendered.as_bytes()).await?;
    output.write_all(b"\n").await?;
    output.flush().await?;
    *shown = Some(visible);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::sources::client::FetchClient;
    use crate::sources::connectivity::Connectivity;
    use crate::sources::universities::UniversitiesService;
    use wiremock::matchers::{method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn universities(prefix: &str, count: usize) -> serde_json::Value {
        serde_json::Value::Array(
            (0..count)
                .map(|i| {
                    serde_json::json!({
                        "alpha_two_code": "US",
                        "name": format!("{prefix} {i}"),
                        "state-province": null,
                        "web_pages": [format!("https://{prefix}{i}.edu/")],
                        "domains": [format!("{prefix}{i}.edu")],
                        "country": "United States"
                    })
                })
                .collect(),
        )
    }

    fn controller(server: &MockServer) -> SearchController<UniversitiesService> {
        let client = FetchClient::new(Some(server.uri()), Connectivity::online()).unwrap();
        SearchController::new(
            UniversitiesService::new(client),
            ControllerConfig {
                debounce: Duration::from_millis(10),
                lookback: 5,
            },
        )
    }

    async fn session(server: &MockServer, input: &str, json: bool) -> String {
        let mut output = Vec::new();
        run_session(controller(server), input.as_bytes(), &mut output, json)
            .await
            .unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn parses_commands_and_queries() {
        assert_eq!(BrowseInput::parse(" :more "), BrowseInput::More);
        assert_eq!(BrowseInput::parse(":quit"), BrowseInput::Quit);
        assert_eq!(BrowseInput::parse(":q"), BrowseInput::Quit);
        assert_eq!(
            BrowseInput::parse("saint mary "),
            BrowseInput::Query("saint mary ".into())
        );
    }

    #[tokio::test]
    async fn piped_query_renders_first_load_then_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param_is_missing("name"))
            .respond_with(ResponseTemplate::new(200).set_body_json(universities("Alpha", 1)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("name", "mit"))
            .respond_with(ResponseTemplate::new(200).set_body_json(universities("MIT", 2)))
            .expect(1)
            .mount(&server)
            .await;

        let output = session(&server, "mit\n", false).await;

        assert!(output.starts_with("# Universities\n"));
        assert!(output.contains("Searching..."));
        let last = output.rsplit("# Universities").next().unwrap();
        assert!(last.starts_with(": mit"));
        assert!(last.contains("| 2 | MIT 1 | United States |"));
        assert!(last.contains("Showing 2 results. Type :more to load more."));
    }

    #[tokio::test]
    async fn more_appends_the_next_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("offset", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(universities("First", 20)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("offset", "20"))
            .respond_with(ResponseTemplate::new(200).set_body_json(universities("Second", 3)))
            .expect(1)
            .mount(&server)
            .await;

        let output = session(&server, ":more\n", false).await;

        assert!(output.contains("Showing 20 results. Loading more..."));
        assert!(output.contains("| 23 | Second 2 |"));
        assert!(output.contains("Showing 23 results."));
    }

    #[tokio::test]
    async fn quit_stops_before_later_lines() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("name", "mit"))
            .respond_with(ResponseTemplate::new(200).set_body_json(universities("MIT", 2)))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(universities("Alpha", 1)))
            .mount(&server)
            .await;

        let output = session(&server, ":quit\nmit\n", false).await;
        assert!(!output.contains("MIT"));
    }

    #[tokio::test]
    async fn failure_is_rendered_as_json_view_state() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let output = session(&server, "", true).await;
        assert!(output.contains("\"state\": \"loading\""));
        assert!(output.contains("\"state\": \"failure\""));
        assert!(output.contains("\"message\": \"Server error (503)\""));
    }
}
