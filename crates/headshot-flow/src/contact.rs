use headshot_core::ImageHandle;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Contact grouping in the app's kebab-case vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    FriendsFamily,
    Work,
    School,
    Neighborhood,
    Community,
    #[default]
    Other,
}

/// (app value, backend value)
static CATEGORY_TABLE: [(Category, &str, &str); 6] = [
    (Category::FriendsFamily, "friends-family", "friends_and_family"),
    (Category::Work, "work", "coworkers"),
    (Category::School, "school", "classmates"),
    (Category::Neighborhood, "neighborhood", "neighbors"),
    (Category::Community, "community", "community"),
    (Category::Other, "other", "other"),
];

impl Category {
    pub fn all() -> impl Iterator<Item = Category> {
        CATEGORY_TABLE.iter().map(|(c, _, _)| *c)
    }

    pub fn as_str(&self) -> &'static str {
        self.row().1
    }

    /// Name used by the remote contact API.
    pub fn backend_name(&self) -> &'static str {
        self.row().2
    }

    /// Translate a remote value. Unknown values become [`Category::Other`].
    pub fn from_backend(value: &str) -> Self {
        match CATEGORY_TABLE.iter().find(|(_, _, backend)| *backend == value) {
            Some((category, _, _)) => *category,
            None => {
                tracing::warn!(value, "unknown backend category, using other");
                Category::Other
            }
        }
    }

    fn row(&self) -> &'static (Category, &'static str, &'static str) {
        CATEGORY_TABLE
            .iter()
            .find(|(c, _, _)| c == self)
            .unwrap_or(&CATEGORY_TABLE[5])
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CATEGORY_TABLE
            .iter()
            .find(|(_, app, _)| *app == s)
            .map(|(c, _, _)| *c)
            .ok_or_else(|| {
                let known: Vec<&str> = CATEGORY_TABLE.iter().map(|(_, app, _)| *app).collect();
                format!("unknown category {s:?} (expected one of: {})", known.join(", "))
            })
    }
}

/// Trim, drop empties and duplicates, keep first-seen order.
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.as_ref().trim();
        if !tag.is_empty() && !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}

/// Form state for one contact, owned by the active workflow.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContactDraft {
    pub name: String,
    pub hint: Option<String>,
    pub summary: Option<String>,
    pub category: Category,
    pub tags: Vec<String>,
    pub photo: Option<ImageHandle>,
}

impl ContactDraft {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn has_name(&self) -> bool {
        !self.name.trim().is_empty()
    }
}

/// A face from a party photo with the name the user typed for it.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedFace {
    pub id: String,
    pub name: String,
    pub face: ImageHandle,
}

/// Per-item result of a batch commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub name: String,
    pub succeeded: bool,
}
