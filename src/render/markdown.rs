use std::sync::OnceLock;

use minijinja::{Environment, context};

use crate::controller::{SearchSnapshot, ViewState};
use crate::error::UniSearchError;
use crate::transform::university::UniversityRow;

static ENV: OnceLock<Environment<'static>> = OnceLock::new();

/// Footer for one page of a paged search.
pub fn page_pagination_footer(page: u32, page_size: u32, returned: usize) -> String {
    if returned == 0 {
        return if page <= 1 {
            String::new()
        } else {
            format!("No results on page {page}.")
        };
    }
    let start = u64::from(page.saturating_sub(1)) * u64::from(page_size) + 1;
    let end = start + returned as u64 - 1;
    let range = if start == end {
        format!("Showing result {end}.")
    } else {
        format!("Showing results {start}-{end}.")
    };
    format!("{range} Use --page {} for more.", page.saturating_add(1))
}

fn snapshot_footer(snapshot: &SearchSnapshot) -> String {
    let count = snapshot.rows.len();
    if count == 0 || matches!(snapshot.view_state, ViewState::Loading | ViewState::Empty) {
        return String::new();
    }
    let shown = format!("Showing {count} results.");
    if snapshot.is_loading_more {
        format!("{shown} Loading more...")
    } else if snapshot.has_more {
        format!("{shown} Type :more to load more.")
    } else {
        format!("{shown} End of results.")
    }
}

fn with_pagination_footer(mut body: String, pagination_footer: &str) -> String {
    let footer = pagination_footer.trim();
    if footer.is_empty() || body.contains(footer) {
        return body;
    }
    if !body.ends_with('\n') {
        body.push('\n');
    }
    body.push('\n');
    body.push_str(footer);
    body.push('\n');
    body
}

fn env() -> Result<&'static Environment<'static>, UniSearchError> {
    if let Some(env) = ENV.get() {
        return Ok(env);
    }

    let mut env = Environment::new();
    // Keep table cells on one line and out of the column separators.
    env.add_filter("cell", |s: String| -> String {
        s.split_whitespace().collect::<Vec<_>>().join(" ").replace('|', "\\|")
    });
    env.add_template(
        "university_search.md.j2",
        include_str!("../../templates/university_search.md.j2"),
    )?;
    env.add_template(
        "search_snapshot.md.j2",
        include_str!("../../templates/search_snapshot.md.j2"),
    )?;

    Ok(ENV.get_or_init(|| env))
}

pub fn university_search_markdown(
    query: &str,
    page: u32,
    page_size: u32,
    rows: &[UniversityRow],
) -> Result<String, UniSearchError> {
    let tmpl = env()?.get_template("university_search.md.j2")?;
    let body = tmpl.render(context! {
        query => query.trim(),
        page => page,
        count => rows.len(),
        rows => rows,
    })?;
    let footer = page_pagination_footer(page, page_size, rows.len());
    Ok(with_pagination_footer(body, &footer))
}

/// Renders the controller's current view for interactive browsing.
pub fn snapshot_markdown(snapshot: &SearchSnapshot) -> Result<String, UniSearchError> {
    let (state, message) = match &snapshot.view_state {
        ViewState::Idle => ("idle", None),
        ViewState::Loading => ("loading", None),
        ViewState::Empty => ("empty", None),
        ViewState::Failure(message) => ("failure", Some(message.as_str())),
    };
    let tmpl = env()?.get_template("search_snapshot.md.j2")?;
    let body = tmpl.render(context! {
        query => snapshot.debounced_query.trim(),
        state => state,
        message => message,
        count => snapshot.rows.len(),
        rows => &snapshot.rows,
    })?;
    Ok(with_pagination_footer(body, &snapshot_footer(snapshot)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::university::RowId;

    fn row(name: &str, location: Option<&str>) -> UniversityRow {
        UniversityRow {
            id: RowId::from(name),
            name: name.to_string(),
            web_page: Some(format!("https://{}.edu/", name.to_lowercase())),
            location: location.map(str::to_string),
        }
    }

    fn snapshot(rows: Vec<UniversityRow>, view_state: ViewState) -> SearchSnapshot {
        SearchSnapshot {
            query: "mit".into(),
            debounced_query: "mit".into(),
            rows,
            has_more: true,
            is_loading_initial: view_state == ViewState::Loading,
            is_loading_more: false,
            view_state,
        }
    }

    #[test]
    fn page_footer_counts_from_the_page_offset() {
        assert_eq!(
            page_pagination_footer(1, 20, 20),
            "Showing results 1-20. Use --page 2 for more."
        );
        assert_eq!(
            page_pagination_footer(3, 20, 1),
            "Showing result 41. Use --page 4 for more."
        );
        assert_eq!(page_pagination_footer(2, 20, 0), "No results on page 2.");
        assert_eq!(page_pagination_footer(1, 20, 0), "");
    }

    #[test]
    fn search_markdown_lists_rows_with_placeholders() {
        let rows = vec![
            row("MIT", Some("Massachusetts, United States")),
            row("Lonely", None),
        ];
        let markdown = university_search_markdown(" mit ", 1, 20, &rows).expect("markdown");
        assert!(markdown.starts_with("# Universities: mit"));
        assert!(markdown.contains("| MIT | Massachusetts, United States | https://mit.edu/ |"));
        assert!(markdown.contains("| Lonely | - | https://lonely.edu/ |"));
        assert!(markdown.contains("Use --page 2 for more."));
    }

    #[test]
    fn search_markdown_without_results() {
        let markdown = university_search_markdown("", 1, 20, &[]).expect("markdown");
        assert!(markdown.starts_with("# Universities\n"));
        assert!(markdown.contains("No universities found."));
        assert!(!markdown.contains("Use --page"));
    }

    #[test]
    fn cells_escape_pipes_and_newlines() {
        let rows = vec![row("A | B\nCollege", Some("X|Y"))];
        let markdown = university_search_markdown("a", 1, 20, &rows).expect("markdown");
        assert!(markdown.contains("| A \\| B College | X\\|Y |"));
    }

    #[test]
    fn web_page_cells_are_escaped_too() {
        let mut odd = row("Odd", None);
        odd.web_page = Some("https://odd.edu/a|b\nc".to_string());
        let rows = vec![odd.clone()];

        let search = university_search_markdown("odd", 1, 20, &rows).expect("markdown");
        assert!(search.contains("| Odd | - | https://odd.edu/a\\|b c |"));

        let browse = snapshot_markdown(&snapshot(vec![odd], ViewState::Idle)).expect("md");
        assert!(browse.contains("| 1 | Odd | - | https://odd.edu/a\\|b c |"));
    }

    #[test]
    fn snapshot_markdown_reflects_view_state() {
        let loading = snapshot_markdown(&snapshot(Vec::new(), ViewState::Loading)).expect("md");
        assert!(loading.contains("Searching..."));

        let empty = snapshot_markdown(&snapshot(Vec::new(), ViewState::Empty)).expect("md");
        assert!(empty.contains("No universities found."));
        assert!(!empty.contains("Showing"));

        let idle = snapshot_markdown(&snapshot(vec![row("MIT", None)], ViewState::Idle))
            .expect("md");
        assert!(idle.contains("| 1 | MIT | - |"));
        assert!(idle.contains("Showing 1 results. Type :more to load more."));
    }

    #[test]
    fn snapshot_markdown_keeps_rows_under_a_failure() {
        let failed = snapshot(
            vec![row("MIT", None)],
            ViewState::Failure("Server error (500)".into()),
        );
        let markdown = snapshot_markdown(&failed).expect("md");
        assert!(markdown.contains("> Error: Server error (500)"));
        assert!(markdown.contains("| 1 | MIT |"));
    }

    #[test]
    fn snapshot_footer_tracks_paging() {
        let mut s = snapshot(vec![row("MIT", None)], ViewState::Idle);
        s.is_loading_more = true;
        assert_eq!(snapshot_footer(&s), "Showing 1 results. Loading more...");
        s.is_loading_more = false;
        s.has_more = false;
        assert_eq!(snapshot_footer(&s), "Showing 1 results. End of results.");
    }
}
