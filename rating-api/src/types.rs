use serde::{Deserialize, Serialize};

/// Marks where the repository path begins in a submitted URL.
pub const REPO_PATH_MARKER: &str = "github.com/";

/// Site-wide counters. A single pre-seeded document holds them.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct AppTotals {
    #[serde(rename = "ratings", default)]
    pub ratings_count: i64,
    #[serde(rename = "repos", default)]
    pub repos_count: i64,
    #[serde(rename = "stars", default)]
    pub stars_sum: f64,
}

impl AppTotals {
    pub const RATINGS: &'static str = "ratings";
    pub const REPOS: &'static str = "repos";
    pub const STARS: &'static str = "stars";
}

/// One user's rating of one repository, keyed by (username, url).
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct RatingRecord {
    pub username: String,
    pub url: String,
    pub rating: i64,
}

/// Repository metadata as denormalized from the code-hosting API.
///
/// `stars` is the upstream star count, unrelated to ratings submitted here.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct RepoMetadata {
    pub name: String,
    pub owner: String,
    pub description: Option<String>,
    pub logo: String,
    pub language: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    pub stars: u64,
}

/// Per-repository aggregate: metadata plus the derived mean rating and vote count.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct RepoAggregate {
    pub url: String,
    #[serde(flatten)]
    pub metadata: RepoMetadata,
    pub rating: f64,
    pub votes: u64,
}

/// A submitted repository URL after normalization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RepoTarget {
    /// Normalized URL, used as the storage key.
    pub url: String,
    /// `owner/name` path handed to the code-hosting API.
    pub path: String,
}

impl RepoTarget {
    /// Strips one trailing slash and splits on [`REPO_PATH_MARKER`].
    ///
    /// Returns `None` unless the marker occurs exactly once.
    pub fn parse(raw: &str) -> Option<Self> {
        let url = raw.strip_suffix('/').unwrap_or(raw);

        let mut segments = url.split(REPO_PATH_MARKER);
        let (Some(_host), Some(path), None) = (segments.next(), segments.next(), segments.next())
        else {
            return None;
        };

        Some(RepoTarget {
            url: url.to_string(),
            path: path.to_string(),
        })
    }
}

/// The `rating` field of a submission, which clients send as a number or a string.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum RatingInput {
    Number(f64),
    Text(String),
}

impl RatingInput {
    /// Integer value of the rating with integer-prefix semantics: fractions are
    /// truncated and trailing garbage after the leading digits is ignored.
    ///
    /// Values outside the `i64` range are rejected.
    pub fn to_rating(&self) -> Option<i64> {
        match self {
            RatingInput::Number(n) => {
                let n = n.trunc();
                // `i64::MAX as f64` rounds up to 2^63, which is already out of range
                (n >= i64::MIN as f64 && n < i64::MAX as f64).then_some(n as i64)
            }
            RatingInput::Text(s) => parse_int_prefix(s),
        }
    }
}

impl From<i64> for RatingInput {
    fn from(value: i64) -> Self {
        RatingInput::Number(value as f64)
    }
}

fn parse_int_prefix(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let sign_len = match s.as_bytes().first() {
        Some(b'-' | b'+') => 1,
        _ => 0,
    };

    let digits = &s[sign_len..];
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }

    s[..sign_len + end].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_repo_target_strips_one_trailing_slash() {
        let target = RepoTarget::parse("https://github.com/acme/widget/").unwrap();
        assert_eq!(target.url, "https://github.com/acme/widget");
        assert_eq!(target.path, "acme/widget");

        // Only one slash is removed
        let target = RepoTarget::parse("https://github.com/acme/widget//").unwrap();
        assert_eq!(target.url, "https://github.com/acme/widget/");
        assert_eq!(target.path, "acme/widget/");
    }

    #[test]
    fn test_repo_target_requires_single_marker() {
        assert_eq!(RepoTarget::parse("not-a-github-url"), None);
        assert_eq!(
            RepoTarget::parse("https://github.com/acme/github.com/widget"),
            None
        );
        assert!(RepoTarget::parse("github.com/acme/widget").is_some());
    }

    #[test]
    fn test_rating_input() {
        let cases = [
            (json!(5), Some(5)),
            (json!(4.9), Some(4)),
            (json!("4"), Some(4)),
            (json!("4.7"), Some(4)),
            (json!(" 5 stars"), Some(5)),
            (json!("-2"), Some(-2)),
            (json!("five"), None),
            (json!(""), None),
            (json!("9223372036854775807"), Some(i64::MAX)),
            (json!("9223372036854775808"), None),
            (json!("-9223372036854775808"), Some(i64::MIN)),
            (json!("+7"), Some(7)),
            (json!(1e30), None),
            (json!(-1e30), None),
        ];

        for (value, expected) in cases {
            let input: RatingInput = serde_json::from_value(value.clone()).unwrap();
            assert_eq!(input.to_rating(), expected, "input {value}");
        }

        assert!(serde_json::from_value::<RatingInput>(json!(null)).is_err());
    }

    #[test]
    fn test_app_totals_attribute_names() {
        let totals: AppTotals =
            serde_json::from_value(json!({"ratings": 3, "repos": 2, "stars": 11})).unwrap();
        assert_eq!(totals.ratings_count, 3);
        assert_eq!(totals.repos_count, 2);
        assert_eq!(totals.stars_sum, 11.0);
    }

    #[test]
    fn test_repo_aggregate_is_flat() {
        let aggregate = RepoAggregate {
            url: "https://github.com/acme/widget".into(),
            metadata: RepoMetadata {
                name: "widget".into(),
                owner: "acme".into(),
                description: None,
                logo: "https://avatars.example/acme.png".into(),
                language: Some("Rust".into()),
                topics: vec!["cli".into()],
                stars: 42,
            },
            rating: 4.5,
            votes: 2,
        };

        let value = serde_json::to_value(&aggregate).unwrap();
        assert_eq!(value["name"], "widget");
        assert_eq!(value["stars"], 42);
        assert_eq!(value["votes"], 2);
        assert!(value.get("metadata").is_none());
    }
}
