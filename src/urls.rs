// src/urls.rs

//! Registry endpoint construction
//!
//! All endpoints are composed from the registry base URL by appending
//! percent-escaped path segments and query pairs. A base URL that cannot
//! carry path segments (`mailto:` and friends) is a configuration error.

use url::Url;

use crate::error::{Error, Result};

/// Append path segments to a base URL, percent-escaping each segment.
pub fn join(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    {
        let mut path = url.path_segments_mut().map_err(|_| Error::InvalidUrl {
            url: base.to_string(),
        })?;
        path.pop_if_empty();
        path.extend(segments);
    }
    Ok(url)
}

/// Append a query pair, percent-escaping the value.
pub fn with_query(mut url: Url, name: &str, value: &str) -> Url {
    url.query_pairs_mut().append_pair(name, value);
    url
}
