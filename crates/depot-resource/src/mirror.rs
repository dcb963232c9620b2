use serde::{Deserialize, Serialize};
use url::Url;

use crate::{ResourceError, Result};

/// Ordered, non-empty list of mirror base URLs.
///
/// Attempt `t` goes to `mirrors[t % len]`, so successive retries walk the
/// whole list before coming back to the first mirror.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Url>", into = "Vec<Url>")]
pub struct MirrorList(Vec<Url>);

impl MirrorList {
    pub fn new(mirrors: Vec<Url>) -> Result<Self> {
        if mirrors.is_empty() {
            return Err(ResourceError::NoMirrors);
        }
        if let Some(bad) = mirrors.iter().find(|url| url.cannot_be_a_base()) {
            return Err(ResourceError::malformed(bad.as_str(), "cannot be used as a base URL"));
        }
        Ok(Self(mirrors))
    }

    /// Parse every entry, failing on the first malformed one.
    pub fn parse<I, S>(mirrors: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mirrors = mirrors
            .into_iter()
            .map(|raw| {
                let raw = raw.as_ref();
                Url::parse(raw).map_err(|e| ResourceError::malformed(raw, e))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(mirrors)
    }

    pub fn select(&self, attempt: u32) -> &Url {
        &self.0[attempt as usize % self.0.len()]
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn iter(&self) -> impl Iterator<Item = &Url> {
        self.0.iter()
    }
}

impl TryFrom<Vec<Url>> for MirrorList {
    type Error = ResourceError;

    fn try_from(mirrors: Vec<Url>) -> Result<Self> {
        Self::new(mirrors)
    }
}

impl From<MirrorList> for Vec<Url> {
    fn from(list: MirrorList) -> Self {
        list.0
    }
}

/// Join a mirror base URL with a resource-relative path.
///
/// The resulting path is the base path and `relative` joined with duplicate
/// slashes collapsed and `.`/`..` segments resolved lexically; `..` never
/// climbs above the root. Scheme, host, port, query and fragment of the base
/// are kept as they are.
pub fn join_url(base: &Url, relative: &str) -> Result<Url> {
    if base.cannot_be_a_base() {
        return Err(ResourceError::malformed(base.as_str(), "cannot be used as a base URL"));
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in base.path().split('/').chain(relative.split('/')) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            segment => segments.push(segment),
        }
    }

    let mut joined = base.clone();
    joined.set_path(&format!("/{}", segments.join("/")));
    Ok(joined)
}

/// Parse `base` and join it with `relative`.
pub fn join_url_str(base: &str, relative: &str) -> Result<Url> {
    let base = Url::parse(base).map_err(|e| ResourceError::malformed(base, e))?;
    join_url(&base, relative)
}
