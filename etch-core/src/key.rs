//! Resource identity.
//!
//! A [`ResourceId`] names one upstream document: the origin host (with an explicit
//! port, if any) and the request path. It is the key of the content store and of the
//! request deduplicator, so two requests for the same document must always produce
//! equal identities no matter which headers or query parameters they carry.
//!
//! ```
//! use etch_core::ResourceId;
//!
//! let uri: http::Uri = "http://toro.2ch.net/book/dat/1363665368.dat?raw=1".parse().unwrap();
//! let id = ResourceId::from_uri(&uri).unwrap();
//!
//! assert_eq!(id.host(), "toro.2ch.net");
//! assert_eq!(id.path(), "/book/dat/1363665368.dat");
//! assert_eq!(id.to_string(), "toro.2ch.net/book/dat/1363665368.dat");
//! assert_eq!(id.url(), "http://toro.2ch.net/book/dat/1363665368.dat");
//! ```
//!
//! ## Performance
//!
//! [`ResourceId`] wraps its data in an `Arc`, so cloning only bumps a reference
//! count. Host and path use [`SmolStr`], which keeps short strings inline.

use std::fmt;
use std::sync::Arc;

use smol_str::SmolStr;

#[derive(Debug, PartialEq, Eq, Hash)]
struct ResourceIdInner {
    host: SmolStr,
    path: SmolStr,
}

/// Identity of a cached upstream resource.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResourceId {
    inner: Arc<ResourceIdInner>,
}

impl ResourceId {
    /// Creates an identity from a host (optionally `host:port`) and a path.
    ///
    /// The path is normalized: empty and `.` segments are dropped and `..` removes the
    /// preceding segment, never climbing above the root. Spellings of one path
    /// therefore produce equal identities.
    pub fn new(host: impl Into<SmolStr>, path: impl AsRef<str>) -> Self {
        let path = normalize(path.as_ref());
        Self {
            inner: Arc::new(ResourceIdInner {
                host: host.into(),
                path,
            }),
        }
    }

    /// Derives the identity of an absolute request URI.
    ///
    /// Returns `None` for origin-form URIs (no host), which are not proxy requests.
    pub fn from_uri(uri: &http::Uri) -> Option<Self> {
        let host = uri.host().filter(|host| !host.is_empty())?;
        let host = match uri.port_u16() {
            Some(port) => SmolStr::new(format!("{host}:{port}")),
            None => SmolStr::new(host),
        };
        Some(Self::new(host, uri.path()))
    }

    /// Rebuilds an identity from a host and its path segments.
    pub fn from_segments<'a>(host: &str, segments: impl IntoIterator<Item = &'a str>) -> Self {
        let path = segments.into_iter().fold(String::new(), |mut path, segment| {
            path.push('/');
            path.push_str(segment);
            path
        });
        Self::new(host, path)
    }

    /// Origin host, including the port when the request named one.
    pub fn host(&self) -> &str {
        &self.inner.host
    }

    /// Absolute request path.
    pub fn path(&self) -> &str {
        &self.inner.path
    }

    /// Path segments; empty for the root path.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.inner.path.split('/').filter(|segment| !segment.is_empty())
    }

    /// Absolute URL of the resource, as reported in cache-change events.
    pub fn url(&self) -> String {
        format!("http://{}{}", self.inner.host, self.inner.path)
    }
}

fn normalize(path: &str) -> SmolStr {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            segment => segments.push(segment),
        }
    }
    if segments.is_empty() {
        return SmolStr::new_static("/");
    }
    let normalized = segments.iter().fold(String::with_capacity(path.len()), |mut out, segment| {
        out.push('/');
        out.push_str(segment);
        out
    });
    SmolStr::new(normalized)
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.inner.host, self.inner.path)
    }
}
