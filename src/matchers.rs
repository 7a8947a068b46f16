//! Request matchers built from container labels.
//!
//! A label such as `com.caddyserver.http.matchers.host=example.com` is
//! turned into a [`Matcher`] by the producer registered under that label
//! key. Producers never fail; a matcher validates its value when it is
//! provisioned, and a matcher that fails to provision is dropped by the
//! candidate builder.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use http::header::{HeaderName, CONTENT_TYPE, HOST};
use http::uri::Scheme;
use http::{HeaderMap, Method, Request, Uri, Version};
use ipnet::IpNet;

use crate::config::Labels;
use crate::error::MatcherError;

/// Client address of a request, stored in the request's extensions by the
/// server that accepted the connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RemoteAddr(pub SocketAddr);

/// Marks a request that arrived over TLS. Inserted into the request's
/// extensions by the server that terminated TLS; origin-form URIs carry no
/// scheme to tell.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Tls;

/// Everything a matcher may inspect. Borrowed from an `http::Request` so
/// matching never touches the body.
#[derive(Clone, Copy, Debug)]
pub struct RequestHead<'a> {
    pub method: &'a Method,
    pub uri: &'a Uri,
    pub version: Version,
    pub headers: &'a HeaderMap,
    pub remote_addr: Option<SocketAddr>,
    /// Arrived over TLS, per the [`Tls`] extension or an `https` URI.
    pub tls: bool,
}

impl<'a> RequestHead<'a> {
    pub fn from_request<B>(req: &'a Request<B>) -> Self {
        Self {
            method: req.method(),
            uri: req.uri(),
            version: req.version(),
            headers: req.headers(),
            remote_addr: req.extensions().get::<RemoteAddr>().map(|a| a.0),
            tls: req.extensions().get::<Tls>().is_some()
                || req.uri().scheme() == Some(&Scheme::HTTPS),
        }
    }

    /// Requested host without port, from the `Host` header or the URI
    /// authority.
    fn host(&self) -> Option<&'a str> {
        let host = self
            .headers
            .get(HOST)
            .and_then(|v| v.to_str().ok())
            .or_else(|| self.uri.host())?;
        Some(strip_port(host))
    }
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => host,
    }
}

/// A request predicate.
pub trait Matcher: Send + Sync + fmt::Debug {
    /// Resolve the raw label value into a ready-to-evaluate form.
    fn provision(&mut self) -> Result<(), MatcherError> {
        Ok(())
    }

    fn matches(&self, req: &RequestHead<'_>) -> bool;
}

/// Turns a label value into a matcher.
pub type Producer = fn(&str) -> Box<dyn Matcher>;

/// Matchers combined with AND semantics. An empty set matches everything.
#[derive(Debug, Default)]
pub struct MatchSet(Vec<Box<dyn Matcher>>);

impl MatchSet {
    pub fn push(&mut self, matcher: Box<dyn Matcher>) {
        self.0.push(matcher);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn matches(&self, req: &RequestHead<'_>) -> bool {
        self.0.iter().all(|m| m.matches(req))
    }
}

impl FromIterator<Box<dyn Matcher>> for MatchSet {
    fn from_iter<I: IntoIterator<Item = Box<dyn Matcher>>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Producers keyed by label, kept in registration order.
#[derive(Clone, Default)]
pub struct MatcherRegistry {
    producers: Vec<(String, Producer)>,
}

impl MatcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in matchers under `<namespace>.matchers.<name>`.
    pub fn with_defaults(labels: &Labels) -> Self {
        let mut registry = Self::new();
        registry
            .register(labels.matcher("host"), |v| Box::new(MatchHost::new(v)))
            .register(labels.matcher("path"), |v| Box::new(MatchPath::new(v)))
            .register(labels.matcher("method"), |v| Box::new(MatchMethod::new(v)))
            .register(labels.matcher("protocol"), |v| {
                Box::new(MatchProtocol::new(v))
            })
            .register(labels.matcher("query"), |v| Box::new(MatchQuery::new(v)))
            .register(labels.matcher("header"), |v| Box::new(MatchHeader::new(v)))
            .register(labels.matcher("remote_ip"), |v| {
                Box::new(MatchRemoteIp::new(v))
            });
        registry
    }

    /// Register `producer` for `key`. Re-registering a key replaces its
    /// producer but keeps its original position.
    pub fn register(&mut self, key: impl Into<String>, producer: Producer) -> &mut Self {
        let key = key.into();
        match self.producers.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = producer,
            None => self.producers.push((key, producer)),
        }
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Producer)> + '_ {
        self.producers.iter().map(|(k, p)| (k.as_str(), *p))
    }

    pub fn len(&self) -> usize {
        self.producers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.producers.is_empty()
    }
}

impl fmt::Debug for MatcherRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.producers.iter().map(|(k, _)| k))
            .finish()
    }
}

/// Splits a label value into its whitespace or comma separated items.
fn items(value: &str) -> impl Iterator<Item = &str> {
    value
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
}

fn non_empty<T>(value: &str, list: Vec<T>) -> Result<Vec<T>, MatcherError> {
    if list.is_empty() {
        return Err(MatcherError::invalid(value, "no values given"));
    }
    Ok(list)
}

/// A string pattern with an optional leading and/or trailing `*`.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Pattern {
    Any,
    Exact(String),
    Prefix(String),
    Suffix(String),
    Contains(String),
}

impl Pattern {
    fn parse(raw: &str) -> Result<Self, &'static str> {
        if raw == "*" {
            return Ok(Self::Any);
        }
        let (leading, rest) = match raw.strip_prefix('*') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        let (trailing, inner) = match rest.strip_suffix('*') {
            Some(inner) => (true, inner),
            None => (false, rest),
        };
        if inner.contains('*') {
            return Err("only leading or trailing wildcards are supported");
        }
        let inner = inner.to_string();
        Ok(match (leading, trailing) {
            (true, true) => Self::Contains(inner),
            (true, false) => Self::Suffix(inner),
            (false, true) => Self::Prefix(inner),
            (false, false) => Self::Exact(inner),
        })
    }

    fn is_match(&self, value: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(s) => value == s,
            Self::Prefix(s) => value.starts_with(s.as_str()),
            Self::Suffix(s) => value.ends_with(s.as_str()),
            Self::Contains(s) => value.contains(s.as_str()),
        }
    }
}

// === impl MatchHost ===

/// Matches the requested host. `*.example.com` matches exactly one label
/// in place of the `*`.
#[derive(Clone, Debug)]
pub struct MatchHost {
    raw: String,
    hosts: Vec<String>,
}

impl MatchHost {
    pub fn new(value: &str) -> Self {
        Self {
            raw: value.to_string(),
            hosts: Vec::new(),
        }
    }

    fn host_matches(pattern: &str, host: &str) -> bool {
        match pattern.strip_prefix('*') {
            Some(suffix) => host
                .strip_suffix(suffix)
                .map_or(false, |label| !label.is_empty() && !label.contains('.')),
            None => pattern == host,
        }
    }
}

impl Matcher for MatchHost {
    fn provision(&mut self) -> Result<(), MatcherError> {
        let hosts = items(&self.raw)
            .map(|h| {
                if h.contains('*') && !(h.starts_with("*.") && !h[1..].contains('*')) {
                    return Err(MatcherError::invalid(
                        &self.raw,
                        format!("unsupported wildcard in host {h:?}"),
                    ));
                }
                Ok(h.to_ascii_lowercase())
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.hosts = non_empty(&self.raw, hosts)?;
        Ok(())
    }

    fn matches(&self, req: &RequestHead<'_>) -> bool {
        let Some(host) = req.host() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        self.hosts.iter().any(|p| Self::host_matches(p, &host))
    }
}

// === impl MatchPath ===

/// Matches the request path, case-insensitively: `/api/*` (prefix),
/// `*.php` (suffix), `*admin*` (substring), or an exact path.
#[derive(Clone, Debug)]
pub struct MatchPath {
    raw: String,
    patterns: Vec<Pattern>,
}

impl MatchPath {
    pub fn new(value: &str) -> Self {
        Self {
            raw: value.to_string(),
            patterns: Vec::new(),
        }
    }
}

impl Matcher for MatchPath {
    fn provision(&mut self) -> Result<(), MatcherError> {
        let patterns = items(&self.raw)
            .map(|p| {
                Pattern::parse(&p.to_lowercase())
                    .map_err(|reason| MatcherError::invalid(&self.raw, reason))
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.patterns = non_empty(&self.raw, patterns)?;
        Ok(())
    }

    fn matches(&self, req: &RequestHead<'_>) -> bool {
        let path = req.uri.path().to_lowercase();
        self.patterns.iter().any(|p| p.is_match(&path))
    }
}

// === impl MatchMethod ===

#[derive(Clone, Debug)]
pub struct MatchMethod {
    raw: String,
    methods: Vec<Method>,
}

impl MatchMethod {
    pub fn new(value: &str) -> Self {
        Self {
            raw: value.to_string(),
            methods: Vec::new(),
        }
    }
}

impl Matcher for MatchMethod {
    fn provision(&mut self) -> Result<(), MatcherError> {
        let methods = items(&self.raw)
            .map(|m| {
                Method::from_bytes(m.to_ascii_uppercase().as_bytes())
                    .map_err(|e| MatcherError::invalid(&self.raw, e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.methods = non_empty(&self.raw, methods)?;
        Ok(())
    }

    fn matches(&self, req: &RequestHead<'_>) -> bool {
        self.methods.iter().any(|m| m == req.method)
    }
}

// === impl MatchProtocol ===

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Protocol {
    Http,
    Https,
    Grpc,
    Version(Version),
}

impl Protocol {
    fn parse(raw: &str) -> Option<Self> {
        let protocol = match raw.to_ascii_lowercase().as_str() {
            "http" => Self::Http,
            "https" => Self::Https,
            "grpc" => Self::Grpc,
            "http/1.0" => Self::Version(Version::HTTP_10),
            "http/1.1" => Self::Version(Version::HTTP_11),
            "http/2" => Self::Version(Version::HTTP_2),
            "http/3" => Self::Version(Version::HTTP_3),
            _ => return None,
        };
        Some(protocol)
    }

    fn is_match(&self, req: &RequestHead<'_>) -> bool {
        match self {
            Self::Http => !req.tls,
            Self::Https => req.tls,
            Self::Grpc => req
                .headers
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map_or(false, |ct| ct.starts_with("application/grpc")),
            Self::Version(version) => req.version == *version,
        }
    }
}

/// Matches the request protocol: `http`, `https`, `grpc` or an HTTP
/// version such as `http/2`.
#[derive(Clone, Debug)]
pub struct MatchProtocol {
    raw: String,
    protocols: Vec<Protocol>,
}

impl MatchProtocol {
    pub fn new(value: &str) -> Self {
        Self {
            raw: value.to_string(),
            protocols: Vec::new(),
        }
    }
}

impl Matcher for MatchProtocol {
    fn provision(&mut self) -> Result<(), MatcherError> {
        let protocols = items(&self.raw)
            .map(|p| {
                Protocol::parse(p).ok_or_else(|| {
                    MatcherError::invalid(&self.raw, format!("unknown protocol {p:?}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.protocols = non_empty(&self.raw, protocols)?;
        Ok(())
    }

    fn matches(&self, req: &RequestHead<'_>) -> bool {
        self.protocols.iter().any(|p| p.is_match(req))
    }
}

// === impl MatchQuery ===

/// Matches query parameters written as `key=value&other=value`. Every key
/// must be present with one of its listed values; `*` accepts any value.
#[derive(Clone, Debug)]
pub struct MatchQuery {
    raw: String,
    params: Vec<(String, Vec<String>)>,
}

impl MatchQuery {
    pub fn new(value: &str) -> Self {
        Self {
            raw: value.to_string(),
            params: Vec::new(),
        }
    }
}

impl Matcher for MatchQuery {
    fn provision(&mut self) -> Result<(), MatcherError> {
        let mut params: Vec<(String, Vec<String>)> = Vec::new();
        for (key, value) in url::form_urlencoded::parse(self.raw.trim().as_bytes()) {
            if key.is_empty() {
                return Err(MatcherError::invalid(&self.raw, "empty query key"));
            }
            match params.iter_mut().find(|(k, _)| *k == key) {
                Some((_, values)) => values.push(value.into_owned()),
                None => params.push((key.into_owned(), vec![value.into_owned()])),
            }
        }
        self.params = non_empty(&self.raw, params)?;
        Ok(())
    }

    fn matches(&self, req: &RequestHead<'_>) -> bool {
        let query = req.uri.query().unwrap_or_default();
        let pairs = url::form_urlencoded::parse(query.as_bytes()).collect::<Vec<_>>();

        self.params.iter().all(|(key, values)| {
            pairs
                .iter()
                .filter(|(k, _)| k == key)
                .any(|(_, v)| values.iter().any(|want| want == "*" || want == v))
        })
    }
}

// === impl MatchHeader ===

/// Matches a header written as `Name: value`. The value may be `*`
/// (presence only) or carry a leading/trailing wildcard.
#[derive(Clone, Debug)]
pub struct MatchHeader {
    raw: String,
    header: Option<(HeaderName, Pattern)>,
}

impl MatchHeader {
    pub fn new(value: &str) -> Self {
        Self {
            raw: value.to_string(),
            header: None,
        }
    }
}

impl Matcher for MatchHeader {
    fn provision(&mut self) -> Result<(), MatcherError> {
        let (name, value) = self
            .raw
            .split_once(':')
            .ok_or_else(|| MatcherError::invalid(&self.raw, "expected `Name: value`"))?;
        let name = HeaderName::from_bytes(name.trim().as_bytes())
            .map_err(|e| MatcherError::invalid(&self.raw, e.to_string()))?;
        let pattern =
            Pattern::parse(value.trim()).map_err(|reason| MatcherError::invalid(&self.raw, reason))?;
        self.header = Some((name, pattern));
        Ok(())
    }

    fn matches(&self, req: &RequestHead<'_>) -> bool {
        let Some((name, pattern)) = &self.header else {
            return false;
        };
        req.headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .any(|v| pattern.is_match(v))
    }
}

// === impl MatchRemoteIp ===

/// Matches the client address against IPs or CIDR ranges. Requests without
/// a [`RemoteAddr`] never match.
#[derive(Clone, Debug)]
pub struct MatchRemoteIp {
    raw: String,
    ranges: Vec<IpNet>,
}

impl MatchRemoteIp {
    pub fn new(value: &str) -> Self {
        Self {
            raw: value.to_string(),
            ranges: Vec::new(),
        }
    }

    fn parse_range(raw: &str) -> Option<IpNet> {
        if raw.contains('/') {
            return raw.parse::<IpNet>().ok();
        }
        raw.parse::<IpAddr>().ok().map(IpNet::from)
    }
}

impl Matcher for MatchRemoteIp {
    fn provision(&mut self) -> Result<(), MatcherError> {
        let ranges = items(&self.raw)
            .map(|r| {
                Self::parse_range(r).ok_or_else(|| {
                    MatcherError::invalid(&self.raw, format!("invalid ip or cidr {r:?}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.ranges = non_empty(&self.raw, ranges)?;
        Ok(())
    }

    fn matches(&self, req: &RequestHead<'_>) -> bool {
        let Some(addr) = req.remote_addr else {
            return false;
        };
        let ip = addr.ip();
        self.ranges.iter().any(|net| net.contains(&ip))
    }
}
