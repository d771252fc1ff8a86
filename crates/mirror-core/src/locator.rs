//! Locator parsing: the scheme decides which source fetches the content.

use std::fmt;

use crate::error::MirrorError;

/// A parsed remote content locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// `magnet:?xt=urn:btih:...`
    Magnet {
        uri: String,
        /// `dn=` display name, if the link carries one.
        display_name: Option<String>,
    },
    /// Absolute `http://` or `https://` URL.
    Http { url: url::Url },
}

impl Locator {
    /// Parses a raw locator string. Anything that is neither a magnet link with an
    /// exact topic (`xt`) nor an absolute HTTP(S) URL is a `Resolution` error.
    pub fn parse(raw: &str) -> Result<Self, MirrorError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(MirrorError::Resolution("empty locator".to_string()));
        }
        let parsed = url::Url::parse(raw)
            .map_err(|e| MirrorError::Resolution(format!("{}: {}", raw, e)))?;
        match parsed.scheme() {
            "magnet" => {
                let mut has_topic = false;
                let mut display_name = None;
                for (key, value) in parsed.query_pairs() {
                    match key.as_ref() {
                        "xt" if !value.is_empty() => has_topic = true,
                        "dn" if !value.is_empty() => display_name = Some(value.into_owned()),
                        _ => {}
                    }
                }
                if !has_topic {
                    return Err(MirrorError::Resolution(format!(
                        "magnet link has no exact topic (xt): {}",
                        raw
                    )));
                }
                Ok(Locator::Magnet {
                    uri: raw.to_string(),
                    display_name,
                })
            }
            "http" | "https" => {
                if parsed.host_str().is_none() {
                    return Err(MirrorError::Resolution(format!("URL has no host: {}", raw)));
                }
                Ok(Locator::Http { url: parsed })
            }
            other => Err(MirrorError::Resolution(format!(
                "unsupported scheme {:?} in {}",
                other, raw
            ))),
        }
    }

    /// The locator as it should be handed to an engine or remote service.
    pub fn as_str(&self) -> &str {
        match self {
            Locator::Magnet { uri, .. } => uri,
            Locator::Http { url } => url.as_str(),
        }
    }

    pub fn is_magnet(&self) -> bool {
        matches!(self, Locator::Magnet { .. })
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
