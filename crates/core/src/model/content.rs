use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ContentError {
    #[error("section heading cannot be blank")]
    BlankHeading,

    #[error("invalid video url: {0}")]
    InvalidVideoUrl(String),

    #[error("invalid article url: {0}")]
    InvalidArticleUrl(String),
}

//
// ─── CONTENT SECTION ───────────────────────────────────────────────────────────
//

/// One titled block of learning material inside a concept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentSection {
    pub heading: String,
    pub body: String,
    #[serde(default)]
    pub code_examples: Vec<String>,
}

impl ContentSection {
    /// Creates a section, rejecting blank headings.
    ///
    /// # Errors
    ///
    /// Returns `ContentError::BlankHeading` if the heading is empty or whitespace.
    pub fn new(
        heading: impl Into<String>,
        body: impl Into<String>,
        code_examples: Vec<String>,
    ) -> Result<Self, ContentError> {
        let heading = heading.into();
        if heading.trim().is_empty() {
            return Err(ContentError::BlankHeading);
        }
        Ok(Self {
            heading,
            body: body.into(),
            code_examples,
        })
    }
}

//
// ─── CONCEPT CONTENT ───────────────────────────────────────────────────────────
//

/// Authored learning material attached to a concept: an intro, ordered
/// sections, and optional video/article links.
///
/// The core never fetches or streams media; it only validates that the
/// links are well-formed URLs so the host can embed them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptContent {
    intro: Option<String>,
    sections: Vec<ContentSection>,
    video_url: Option<String>,
    article_url: Option<String>,
}

impl ConceptContent {
    /// Validates and assembles concept content.
    ///
    /// # Errors
    ///
    /// Returns `ContentError` if a URL fails to parse.
    pub fn new(
        intro: Option<String>,
        sections: Vec<ContentSection>,
        video_url: Option<String>,
        article_url: Option<String>,
    ) -> Result<Self, ContentError> {
        if let Some(raw) = &video_url {
            Url::parse(raw).map_err(|_| ContentError::InvalidVideoUrl(raw.clone()))?;
        }
        if let Some(raw) = &article_url {
            Url::parse(raw).map_err(|_| ContentError::InvalidArticleUrl(raw.clone()))?;
        }
        Ok(Self {
            intro,
            sections,
            video_url,
            article_url,
        })
    }

    #[must_use]
    pub fn intro(&self) -> Option<&str> {
        self.intro.as_deref()
    }

    #[must_use]
    pub fn sections(&self) -> &[ContentSection] {
        &self.sections
    }

    #[must_use]
    pub fn video_url(&self) -> Option<&str> {
        self.video_url.as_deref()
    }

    #[must_use]
    pub fn article_url(&self) -> Option<&str> {
        self.article_url.as_deref()
    }

    /// Whether the host has a video to offer for this concept.
    #[must_use]
    pub fn has_video(&self) -> bool {
        self.video_url.is_some()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_heading_is_rejected() {
        let err = ContentSection::new("   ", "body", Vec::new()).unwrap_err();
        assert_eq!(err, ContentError::BlankHeading);
    }

    #[test]
    fn bad_video_url_is_rejected() {
        let err = ConceptContent::new(None, Vec::new(), Some("not a url".into()), None)
            .unwrap_err();
        assert!(matches!(err, ContentError::InvalidVideoUrl(_)));
    }

    #[test]
    fn valid_content_exposes_fields() {
        let section = ContentSection::new("Ownership", "Moves and borrows.", Vec::new()).unwrap();
        let content = ConceptContent::new(
            Some("Intro text".into()),
            vec![section],
            Some("https://videos.example.com/ownership".into()),
            None,
        )
        .unwrap();

        assert_eq!(content.intro(), Some("Intro text"));
        assert_eq!(content.sections().len(), 1);
        assert!(content.has_video());
        assert_eq!(content.article_url(), None);
    }
}
