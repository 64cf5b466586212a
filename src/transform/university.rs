use std::fmt;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::sources::universities::University;

/// Stable row identity derived from every natural-key field of a record, so
/// two institutions sharing a name still get distinct ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RowId(String);

impl RowId {
    pub fn for_university(university: &University) -> Self {
        let mut hasher = Sha256::new();
        let mut field = |tag: &str, value: &str| {
            hasher.update(tag.as_bytes());
            hasher.update([0x1f_u8]);
            hasher.update(value.as_bytes());
            hasher.update([0x1e_u8]);
        };

        field("name", &university.name);
        field("alpha_two_code", &university.alpha_two_code);
        field("country", university.country.as_deref().unwrap_or_default());
        field(
            "state_province",
            university.state_province.as_deref().unwrap_or_default(),
        );
        for domain in &university.domains {
            field("domain", domain);
        }
        for page in &university.web_pages {
            field("web_page", page);
        }

        let digest = hasher.finalize();
        Self(
            digest[..16]
                .iter()
                .map(|b| format!("{b:02x}"))
                .collect::<String>(),
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RowId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UniversityRow {
    pub id: RowId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_page: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

pub fn from_university(university: &University) -> UniversityRow {
    UniversityRow {
        id: RowId::for_university(university),
        name: university.name.clone(),
        web_page: university.web_pages.first().cloned(),
        location: format_location(
            university.state_province.as_deref(),
            university.country.as_deref(),
        ),
    }
}

/// `"{state}, {country}"`, or just the country; absent without a country.
pub fn format_location(state_province: Option<&str>, country: Option<&str>) -> Option<String> {
    let country = clean(country)?;
    match clean(state_province) {
        Some(state) => Some(format!("{state}, {country}")),
        None => Some(country.to_string()),
    }
}

fn clean(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
