use std::time::Instant;

use crate::sources::connectivity::{Connectivity, Probe};
use crate::sources::universities::UniversitySearch;

#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthRow {
    pub check: String,
    pub status: String,
    pub latency: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthReport {
    pub healthy: usize,
    pub total: usize,
    pub rows: Vec<HealthRow>,
}

impl HealthReport {
    pub fn all_healthy(&self) -> bool {
        self.healthy == self.total
    }

    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str("# Unisearch Health Check\n\n");
        out.push_str("| Check | Status | Latency |\n");
        out.push_str("|-------|--------|---------|\n");
        for row in &self.rows {
            out.push_str(&format!(
                "| {} | {} | {} |\n",
                row.check, row.status, row.latency
            ));
        }
        out.push_str(&format!(
            "\nStatus: {}/{} checks healthy\n",
            self.healthy, self.total
        ));
        out
    }
}

async fn check_reachability(probe: &Probe) -> HealthRow {
    let start = Instant::now();
    let reachable = probe.reachable().await;
    let elapsed = start.elapsed().as_millis();
    HealthRow {
        check: format!("Reachability ({})", probe.target()),
        status: if reachable { "ok" } else { "error" }.into(),
        latency: if reachable {
            format!("{elapsed}ms")
        } else {
            "connect".into()
        },
    }
}

fn check_connectivity(connectivity: &Connectivity) -> HealthRow {
    let online = connectivity.is_online();
    HealthRow {
        check: "Connectivity".into(),
        status: if online { "ok" } else { "error" }.into(),
        latency: if online { "online" } else { "offline" }.into(),
    }
}

async fn check_search(service: &impl UniversitySearch) -> HealthRow {
    let start = Instant::now();
    let result = service.search("", 1).await;
    let elapsed = start.elapsed().as_millis();
    match result {
        Ok(results) => HealthRow {
            check: "Search (page 1)".into(),
            status: "ok".into(),
            latency: format!("{elapsed}ms ({} results)", results.len()),
        },
        Err(err) => HealthRow {
            check: "Search (page 1)".into(),
            status: "error".into(),
            latency: format!("{elapsed}ms ({err})"),
        },
    }
}

/// Checks the connectivity flag, the endpoint's TCP reachability (when a probe
/// target is known) and a first-page search.
pub async fn check(
    service: &impl UniversitySearch,
    connectivity: &Connectivity,
    probe: Option<&Probe>,
) -> HealthReport {
    let mut rows = vec![check_connectivity(connectivity)];
    if let Some(probe) = probe {
        rows.push(check_reachability(probe).await);
    }
    rows.push(check_search(service).await);

    let healthy = rows.iter().filter(|r| r.status == "ok").count();
    HealthReport {
        healthy,
        total: rows.len(),
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::client::FetchClient;
    use crate::sources::universities::UniversitiesService;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service_for(server: &MockServer, connectivity: Connectivity) -> UniversitiesService {
        UniversitiesService::new(FetchClient::new(Some(server.uri()), connectivity).unwrap())
    }

    #[test]
    fn markdown_lists_every_row() {
        let report = HealthReport {
            healthy: 1,
            total: 2,
            rows: vec![
                HealthRow {
                    check: "Connectivity".into(),
                    status: "ok".into(),
                    latency: "online".into(),
                },
                HealthRow {
                    check: "Search (page 1)".into(),
                    status: "error".into(),
                    latency: "3ms (Server error (500))".into(),
                },
            ],
        };
        let markdown = report.to_markdown();
        assert!(markdown.contains("| Connectivity | ok | online |"));
        assert!(markdown.contains("| Search (page 1) | error | 3ms (Server error (500)) |"));
        assert!(markdown.contains("Status: 1/2 checks healthy"));
        assert!(!report.all_healthy());
    }

    #[tokio::test]
    async fn healthy_endpoint_passes_every_check() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .expect(1)
            .mount(&server)
            .await;

        let connectivity = Connectivity::online();
        let probe = Probe::for_base_url(&server.uri()).unwrap();
        let report = check(
            &service_for(&server, connectivity.clone()),
            &connectivity,
            Some(&probe),
        )
        .await;

        assert_eq!(report.total, 3);
        assert!(report.all_healthy(), "{report:?}");
        assert!(report.rows[2].latency.ends_with("(0 results)"));
    }

    #[tokio::test]
    async fn offline_state_fails_connectivity_and_search() {
        let server = MockServer::start().await;
        let connectivity = Connectivity::offline();
        let report = check(&service_for(&server, connectivity.clone()), &connectivity, None).await;

        assert_eq!(report.total, 2);
        assert_eq!(report.healthy, 0);
        assert_eq!(report.rows[0].latency, "offline");
        assert!(
            report.rows[1]
                .latency
                .contains("No internet connection available")
        );
    }
}
