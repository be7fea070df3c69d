//! Resource classes, their fixed strategies, and cache-key normalisation.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use super::ProxyConfig;
use crate::domain::format_coordinate;
use crate::domain::ports::{HttpRequest, RequestMode};

/// Query parameters treated as coordinates when building cache keys.
const COORDINATE_PARAMS: [&str; 4] = ["latitude", "longitude", "lat", "lng"];

/// Kinds of outbound request the proxy distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceClass {
    /// Third-party prayer API.
    Api,
    /// Local geographic and reference JSON.
    Data,
    /// Application code.
    Scripts,
    /// Navigation and document requests.
    Pages,
    /// Styles, fonts, icons, and anything else.
    Static,
}

impl ResourceClass {
    /// Every class, in report order.
    pub const ALL: [Self; 5] = [
        Self::Api,
        Self::Data,
        Self::Scripts,
        Self::Pages,
        Self::Static,
    ];

    /// Strategy bound to this class.
    pub fn strategy(self) -> CachingStrategy {
        match self {
            Self::Api => CachingStrategy::StaleWhileRevalidate,
            Self::Data | Self::Static => CachingStrategy::CacheFirst,
            Self::Scripts | Self::Pages => CachingStrategy::NetworkFirst,
        }
    }

    /// Suffix used in cache names.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Data => "data",
            Self::Scripts => "scripts",
            Self::Pages => "pages",
            Self::Static => "static",
        }
    }
}

impl fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caching strategies applied by the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachingStrategy {
    /// Serve cached immediately, refresh in the background.
    StaleWhileRevalidate,
    /// Serve cached when present, otherwise fetch and store.
    CacheFirst,
    /// Fetch first, fall back to cache on failure.
    NetworkFirst,
}

/// Classify a request into its resource class.
///
/// API hosts win over everything else, then navigations, then the file
/// extension of the last path segment.
pub fn classify(config: &ProxyConfig, request: &HttpRequest) -> ResourceClass {
    let is_api = request.url.host_str().is_some_and(|host| {
        config
            .api_hosts
            .iter()
            .any(|api_host| api_host.eq_ignore_ascii_case(host))
    });
    if is_api {
        return ResourceClass::Api;
    }
    if request.mode == RequestMode::Navigate {
        return ResourceClass::Pages;
    }
    let extension = request
        .url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(|file| file.rsplit_once('.'))
        .map(|(_, extension)| extension.to_ascii_lowercase());
    match extension.as_deref() {
        Some("json") => ResourceClass::Data,
        Some("js" | "mjs") => ResourceClass::Scripts,
        Some("html" | "htm") => ResourceClass::Pages,
        _ => ResourceClass::Static,
    }
}

/// Cache key for `url`: fragment dropped, coordinate parameters rounded to
/// four decimal places. Parameter order is preserved.
///
/// ```
/// use prayer_sync::domain::normalized_cache_key;
/// use url::Url;
///
/// let url = Url::parse("https://api.aladhan.com/v1/timings/01-03-2026?latitude=-6.208812&longitude=106.845634#x")
///     .expect("valid url");
/// assert_eq!(
///     normalized_cache_key(&url),
///     "https://api.aladhan.com/v1/timings/01-03-2026?latitude=-6.2088&longitude=106.8456"
/// );
/// ```
pub fn normalized_cache_key(url: &Url) -> String {
    let mut normalized = url.clone();
    normalized.set_fragment(None);
    if url.query().is_some() {
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(name, value)| {
                let value = if COORDINATE_PARAMS.contains(&name.as_ref()) {
                    value
                        .parse::<f64>()
                        .ok()
                        .filter(|degrees| degrees.is_finite())
                        .map_or_else(|| value.clone().into_owned(), format_coordinate)
                } else {
                    value.into_owned()
                };
                (name.into_owned(), value)
            })
            .collect();
        normalized.query_pairs_mut().clear().extend_pairs(pairs);
    }
    normalized.into()
}

/// Key of a manually cached `timings` payload for the API date segment of
/// `url`, if the URL is a timings request.
pub(super) fn manual_key_for(url: &Url) -> Option<String> {
    let segments: Vec<&str> = url.path_segments()?.collect();
    segments.windows(2).find_map(|pair| match pair {
        [name, date] if *name == "timings" => Some(manual_key(date)),
        _ => None,
    })
}

/// Key under which a manually supplied payload for `api_date` is stored.
pub(super) fn manual_key(api_date: &str) -> String {
    format!("manual:timings/{api_date}")
}
