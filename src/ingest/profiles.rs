// src/ingest/profiles.rs
//! Identity profiles: named header sets presented to publishers.
//!
//! Some publishers reject script-looking clients but serve a desktop browser
//! or a well-known crawler. Which profile a source uses is configuration.

use anyhow::{anyhow, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use std::collections::BTreeMap;

pub const DEFAULT_PROFILE: &str = "default";

const DEFAULT_UA: &str = concat!("news-sitemap-harvester/", env!("CARGO_PKG_VERSION"));

const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

const GOOGLEBOT_UA: &str =
    "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";

const XML_ACCEPT: &str = "application/xml, text/xml, application/x-gzip, */*;q=0.8";

#[derive(Debug, Clone)]
pub struct IdentityProfile {
    pub name: String,
    pub headers: HeaderMap,
}

impl Default for IdentityProfile {
    fn default() -> Self {
        builtin(DEFAULT_PROFILE).unwrap_or_else(|| Self {
            name: DEFAULT_PROFILE.to_string(),
            headers: HeaderMap::new(),
        })
    }
}

impl IdentityProfile {
    /// Build a profile from a user agent plus extra raw headers.
    /// Fails on header names/values that are not valid HTTP.
    pub fn from_parts(
        name: &str,
        user_agent: Option<&str>,
        extra: &BTreeMap<String, String>,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            HeaderValue::from_static(XML_ACCEPT),
        );
        if let Some(ua) = user_agent {
            let v = HeaderValue::from_str(ua)
                .map_err(|e| anyhow!("profile {name}: invalid user_agent: {e}"))?;
            headers.insert(USER_AGENT, v);
        }
        for (k, v) in extra {
            let hn = HeaderName::from_bytes(k.as_bytes())
                .map_err(|e| anyhow!("profile {name}: invalid header name {k:?}: {e}"))?;
            let hv = HeaderValue::from_str(v)
                .map_err(|e| anyhow!("profile {name}: invalid value for {k}: {e}"))?;
            headers.insert(hn, hv);
        }
        Ok(Self {
            name: name.to_string(),
            headers,
        })
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.headers.get(USER_AGENT).and_then(|v| v.to_str().ok())
    }
}

/// Profiles shipped with the binary: `default`, `browser`, `googlebot`.
pub fn builtin(name: &str) -> Option<IdentityProfile> {
    let mut headers = HeaderMap::new();
    headers.insert(
        reqwest::header::ACCEPT,
        HeaderValue::from_static(XML_ACCEPT),
    );
    match name.to_ascii_lowercase().as_str() {
        "default" => {
            headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_UA));
        }
        "browser" => {
            headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_UA));
            headers.insert(
                reqwest::header::ACCEPT,
                HeaderValue::from_static(
                    "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
                ),
            );
            headers.insert(
                reqwest::header::ACCEPT_LANGUAGE,
                HeaderValue::from_static("en-US,en;q=0.9"),
            );
            headers.insert(
                reqwest::header::CACHE_CONTROL,
                HeaderValue::from_static("max-age=0"),
            );
            headers.insert(
                reqwest::header::UPGRADE_INSECURE_REQUESTS,
                HeaderValue::from_static("1"),
            );
            headers.insert(
                "sec-ch-ua",
                HeaderValue::from_static(
                    "\"Chromium\";v=\"124\", \"Google Chrome\";v=\"124\", \"Not-A.Brand\";v=\"99\"",
                ),
            );
            headers.insert("sec-ch-ua-mobile", HeaderValue::from_static("?0"));
            headers.insert(
                "sec-ch-ua-platform",
                HeaderValue::from_static("\"Windows\""),
            );
        }
        "googlebot" => {
            headers.insert(USER_AGENT, HeaderValue::from_static(GOOGLEBOT_UA));
        }
        _ => return None,
    }
    Some(IdentityProfile {
        name: name.to_ascii_lowercase(),
        headers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_carry_distinct_user_agents() {
        let d = builtin("default").unwrap();
        let b = builtin("Browser").unwrap();
        let g = builtin("googlebot").unwrap();
        assert!(d.user_agent().unwrap().starts_with("news-sitemap-harvester/"));
        assert!(b.user_agent().unwrap().contains("Chrome"));
        assert!(g.user_agent().unwrap().contains("Googlebot"));
        assert_eq!(b.name, "browser");
        assert!(builtin("curl").is_none());
    }

    #[test]
    fn custom_profile_rejects_bad_header_names() {
        let mut extra = BTreeMap::new();
        extra.insert("bad header".to_string(), "x".to_string());
        assert!(IdentityProfile::from_parts("x", Some("ua"), &extra).is_err());

        let mut ok = BTreeMap::new();
        ok.insert("Referer".to_string(), "https://news.google.com/".to_string());
        let p = IdentityProfile::from_parts("ref", Some("ua/1.0"), &ok).unwrap();
        assert_eq!(p.user_agent(), Some("ua/1.0"));
        assert_eq!(
            p.headers.get("referer").unwrap(),
            "https://news.google.com/"
        );
    }
}
