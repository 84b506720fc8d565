use log::warn;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::config::Resolver;

pub const LABEL_CREATED: &str = "org.opencontainers.image.created";
pub const LABEL_REVISION: &str = "org.opencontainers.image.revision";
pub const LABEL_SOURCE: &str = "org.opencontainers.image.source";
pub const LABEL_URL: &str = "org.opencontainers.image.url";
pub const LABEL_AUTHOR: &str = "io.vela.build.author";
pub const LABEL_AUTHOR_EMAIL: &str = "io.vela.build.author-email";
pub const LABEL_NUMBER: &str = "io.vela.build.number";

/// Where an image comes from, as reported by the pipeline that builds it.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Provenance {
    pub author: Option<String>,
    pub author_email: Option<String>,
    pub commit: Option<String>,
    /// Unix timestamp of the pipeline build.
    pub created: Option<i64>,
    /// Link to the pipeline build.
    pub link: Option<String>,
    pub number: Option<String>,
    /// Link to the source repository.
    pub source: Option<String>,
}

impl Provenance {
    pub fn from_resolver(resolver: &Resolver) -> Self {
        let var = |key: &str| resolver.var(key).map(str::to_owned);

        let created = resolver
            .var("VELA_BUILD_CREATED")
            .and_then(|value| match value.trim().parse() {
                Ok(created) => Some(created),
                Err(error) => {
                    warn!("ignoring VELA_BUILD_CREATED={value:?}: {error}");
                    None
                }
            });

        Self {
            author: var("VELA_BUILD_AUTHOR"),
            author_email: var("VELA_BUILD_AUTHOR_EMAIL"),
            commit: var("VELA_BUILD_COMMIT"),
            created,
            link: var("VELA_BUILD_LINK"),
            number: var("VELA_BUILD_NUMBER"),
            source: var("VELA_REPO_LINK"),
        }
    }

    fn created_rfc3339(&self) -> Option<String> {
        let created = OffsetDateTime::from_unix_timestamp(self.created?).ok()?;
        created.format(&Rfc3339).ok()
    }

    /// The image labels, skipping anything that is unknown.
    pub fn labels(&self) -> Vec<(&'static str, String)> {
        [
            (LABEL_CREATED, self.created_rfc3339()),
            (LABEL_REVISION, self.commit.clone()),
            (LABEL_SOURCE, self.source.clone()),
            (LABEL_URL, self.link.clone()),
            (LABEL_AUTHOR, self.author.clone()),
            (LABEL_AUTHOR_EMAIL, self.author_email.clone()),
            (LABEL_NUMBER, self.number.clone()),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.map(|value| (key, value)))
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn test_from_resolver() {
        let resolver = Resolver::new(
            [
                ("VELA_BUILD_AUTHOR", "octocat"),
                ("VELA_BUILD_COMMIT", "abc123"),
                ("VELA_BUILD_CREATED", "1563474077"),
                ("VELA_BUILD_NUMBER", "42"),
                ("VELA_REPO_LINK", ""),
            ]
            .map(|(key, value)| (key.to_owned(), value.to_owned())),
            Vec::<PathBuf>::new(),
        );

        let provenance = Provenance::from_resolver(&resolver);
        assert_eq!(
            provenance.labels(),
            [
                (LABEL_CREATED, "2019-07-18T18:21:17Z".to_owned()),
                (LABEL_REVISION, "abc123".to_owned()),
                (LABEL_AUTHOR, "octocat".to_owned()),
                (LABEL_NUMBER, "42".to_owned()),
            ]
        );
    }

    #[test]
    fn test_invalid_created_is_ignored() {
        let resolver = Resolver::new(
            [("VELA_BUILD_CREATED".to_owned(), "yesterday".to_owned())],
            Vec::<PathBuf>::new(),
        );
        assert_eq!(Provenance::from_resolver(&resolver), Provenance::default());
    }

    #[test]
    fn test_no_labels_by_default() {
        assert!(Provenance::default().labels().is_empty());
    }
}
