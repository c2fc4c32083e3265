//! Helpers for reading protocol parameters out of callback URLs.

use std::collections::HashMap;

use url::form_urlencoded;

/// Which part of a callback URL carries the response parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamsLocation {
    Query,
    Fragment,
}

impl ParamsLocation {
    fn delimiter(self) -> char {
        match self {
            ParamsLocation::Query => '?',
            ParamsLocation::Fragment => '#',
        }
    }
}

/// Parses `key=value` pairs found after the last `?` or `#` in `url`.
///
/// A bare parameter string (no delimiter at all) is parsed as-is. When reading
/// the query, any trailing fragment is ignored.
pub fn parse_url_params(url: &str, location: ParamsLocation) -> HashMap<String, String> {
    let delimiter = location.delimiter();
    let mut value = match url.rfind(delimiter) {
        Some(index) => &url[index + 1..],
        None if url.contains('=') && !url.contains("://") => url,
        None => "",
    };
    if location == ParamsLocation::Query {
        if let Some(index) = value.find('#') {
            value = &value[..index];
        }
    }

    form_urlencoded::parse(value.as_bytes())
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect()
}
