//! Request classification

use crate::shared::CacheSettings;
use reqwest::Method;

/// How a request is served
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceClass {
    /// Network-first, cached copy as fallback
    Data,
    /// Cache-first
    Asset,
    /// Stale-while-revalidate, offline placeholder as last resort
    Document,
    /// Never cached
    Passthrough,
}

/// What the request is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestKind {
    /// A page navigation
    Document,
    #[default]
    Resource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub kind: RequestKind,
}

impl Request {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            kind: RequestKind::Resource,
        }
    }

    pub fn document(url: impl Into<String>) -> Self {
        Self {
            kind: RequestKind::Document,
            ..Self::get(url)
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }
}

/// Declarative routing of requests to caching strategies
#[derive(Debug, Clone, Default)]
pub struct CacheRules {
    settings: CacheSettings,
}

impl CacheRules {
    pub fn new(settings: CacheSettings) -> Self {
        Self { settings }
    }

    pub fn offline_page(&self) -> &str {
        &self.settings.offline_page
    }

    /// First match wins: method, passthrough prefix, data prefix, navigation,
    /// asset extension. Anything left is treated as data.
    pub fn classify(&self, request: &Request) -> ResourceClass {
        if request.method != Method::GET {
            return ResourceClass::Passthrough;
        }

        let path = match reqwest::Url::parse(&request.url) {
            Ok(url) => url.path().to_string(),
            Err(_) => request.url.split(['?', '#']).next().unwrap_or_default().to_string(),
        };

        if self.settings.passthrough_prefixes.iter().any(|p| path.starts_with(p.as_str())) {
            return ResourceClass::Passthrough;
        }
        if self.settings.data_prefixes.iter().any(|p| path.starts_with(p.as_str())) {
            return ResourceClass::Data;
        }
        if request.kind == RequestKind::Document {
            return ResourceClass::Document;
        }

        let extension = path
            .rsplit('/')
            .next()
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase());
        match extension {
            Some(ext) if self.settings.asset_extensions.iter().any(|a| a.eq_ignore_ascii_case(&ext)) => {
                ResourceClass::Asset
            }
            _ => ResourceClass::Data,
        }
    }
}
