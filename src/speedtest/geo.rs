//! Geolocation of candidate addresses
//!
//! A [`GeoResolver`] walks an ordered list of [`GeoProvider`]s and turns the
//! first answer into a [`GeoInfo`]. It never fails: when every provider is
//! exhausted, or the fallback policy says to stop, the caller gets
//! [`GeoInfo::unknown`].

use crate::speedtest::country::{self, FlagStyle};
use async_trait::async_trait;
use maxminddb::{geoip2, Reader};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Default timeout for provider requests
pub const DEFAULT_GEO_TIMEOUT: Duration = Duration::from_secs(5);

pub const IP_API_URL: &str =
    "http://ip-api.com/json/{ip}?fields=status,message,country,countryCode";
pub const IPINFO_URL: &str = "https://ipinfo.io/{ip}/json";
pub const IPAPI_CO_URL: &str = "https://ipapi.co/{ip}/country/";

/// Geographic information attached to a probed address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoInfo {
    /// ISO 3166-1 alpha-2 code, uppercase
    pub country_code: Option<String>,
    /// Country name in English
    pub country_name: String,
    /// Country label in the report locale
    pub label: String,
    /// Emoji, image URL or label, depending on [`FlagStyle`]
    pub flag: String,
    /// Provider that answered, `None` for the unknown sentinel
    pub source: Option<String>,
}

impl GeoInfo {
    /// Sentinel used when no provider could classify the address
    pub fn unknown(style: &FlagStyle) -> Self {
        Self {
            country_code: None,
            country_name: "Unknown".to_string(),
            label: country::UNKNOWN_LABEL.to_string(),
            flag: style.render(None),
            source: None,
        }
    }

    /// Build from a provider answer, filling gaps from the country table
    pub fn from_hit(hit: CountryHit, style: &FlagStyle, source: &str) -> Self {
        let code = hit
            .code
            .map(|c| c.trim().to_uppercase())
            .filter(|c| !c.is_empty())
            .or_else(|| {
                hit.name
                    .as_deref()
                    .and_then(country::code_for_name)
                    .map(String::from)
            });
        let country_name = hit
            .name
            .clone()
            .or_else(|| code.as_deref().and_then(country::english_name).map(String::from))
            .or_else(|| code.clone())
            .unwrap_or_else(|| "Unknown".to_string());
        let label = match (&code, &hit.name) {
            (Some(code), _) => country::localized_label(code),
            (None, Some(name)) => country::localized_label(name),
            (None, None) => country::UNKNOWN_LABEL.to_string(),
        };

        // a name-only hit has no code to draw a flag from, show what was resolved
        let flag = match (style, &code) {
            (FlagStyle::Label, None) => label.clone(),
            _ => style.render(code.as_deref()),
        };

        Self {
            flag,
            country_code: code,
            country_name,
            label,
            source: Some(source.to_string()),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.source.is_none()
    }
}

/// Raw provider answer, either field may be missing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountryHit {
    pub code: Option<String>,
    pub name: Option<String>,
}

impl CountryHit {
    pub fn code(code: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            name: None,
        }
    }

    fn is_empty(&self) -> bool {
        self.code.is_none() && self.name.is_none()
    }
}

/// Failure of a single provider lookup
#[derive(Debug, Error)]
pub enum GeoError {
    #[error("rate limited")]
    RateLimited,
    #[error("unexpected HTTP status: {0}")]
    Status(StatusCode),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("database lookup failed: {0}")]
    Database(String),
}

/// When the resolver moves on to the next provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FallbackPolicy {
    /// Only a rate-limited provider hands over to the next one
    #[default]
    RateLimitOnly,
    /// Any provider failure hands over to the next one
    AnyError,
}

impl GeoError {
    /// Whether the resolver should try the next provider after this error
    pub fn falls_through(&self, policy: FallbackPolicy) -> bool {
        match self {
            // offline data is only a first guess, missing entries never block the network chain
            GeoError::RateLimited | GeoError::Database(_) => true,
            _ => policy == FallbackPolicy::AnyError,
        }
    }
}

/// A source of country information for an address
#[async_trait]
pub trait GeoProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn lookup(&self, ip: Ipv4Addr) -> Result<CountryHit, GeoError>;
}

/// GET `url`, mapping 429 and other non-success statuses to errors
async fn fetch(client: &Client, url: &str) -> Result<reqwest::Response, GeoError> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(GeoError::RateLimited);
    }
    if !status.is_success() {
        return Err(GeoError::Status(status));
    }
    Ok(response)
}

fn build_client(timeout: Duration) -> Result<Client, GeoError> {
    Ok(Client::builder()
        .timeout(timeout)
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

fn expand(template: &str, ip: Ipv4Addr) -> String {
    template.replace("{ip}", &ip.to_string())
}

fn decode_error(e: reqwest::Error) -> GeoError {
    if e.is_decode() {
        GeoError::Malformed(e.to_string())
    } else {
        GeoError::Transport(e)
    }
}

#[derive(Debug, Deserialize)]
struct IpApiResponse {
    status: String,
    message: Option<String>,
    country: Option<String>,
    #[serde(rename = "countryCode")]
    country_code: Option<String>,
}

/// ip-api.com JSON lookup
pub struct IpApiProvider {
    client: Client,
    url_template: String,
}

impl IpApiProvider {
    pub fn new(timeout: Duration) -> Result<Self, GeoError> {
        Self::with_url(IP_API_URL, timeout)
    }

    /// `url_template` contains `{ip}` where the address goes
    pub fn with_url(url_template: &str, timeout: Duration) -> Result<Self, GeoError> {
        Ok(Self {
            client: build_client(timeout)?,
            url_template: url_template.to_string(),
        })
    }
}

#[async_trait]
impl GeoProvider for IpApiProvider {
    fn name(&self) -> &str {
        "ip-api.com"
    }

    async fn lookup(&self, ip: Ipv4Addr) -> Result<CountryHit, GeoError> {
        let response = fetch(&self.client, &expand(&self.url_template, ip)).await?;
        let body: IpApiResponse = response.json().await.map_err(decode_error)?;
        if body.status != "success" {
            return Err(GeoError::Malformed(
                body.message.unwrap_or_else(|| format!("status {}", body.status)),
            ));
        }
        let hit = CountryHit {
            code: body.country_code.filter(|c| !c.is_empty()),
            name: body.country.filter(|c| !c.is_empty()),
        };
        if hit.is_empty() {
            return Err(GeoError::Malformed("no country in response".to_string()));
        }
        Ok(hit)
    }
}

#[derive(Debug, Deserialize)]
struct IpInfoResponse {
    country: Option<String>,
    error: Option<serde::de::IgnoredAny>,
}

/// ipinfo.io JSON lookup
pub struct IpInfoProvider {
    client: Client,
    url_template: String,
}

impl IpInfoProvider {
    pub fn new(timeout: Duration) -> Result<Self, GeoError> {
        Self::with_url(IPINFO_URL, timeout)
    }

    pub fn with_url(url_template: &str, timeout: Duration) -> Result<Self, GeoError> {
        Ok(Self {
            client: build_client(timeout)?,
            url_template: url_template.to_string(),
        })
    }
}

#[async_trait]
impl GeoProvider for IpInfoProvider {
    fn name(&self) -> &str {
        "ipinfo.io"
    }

    async fn lookup(&self, ip: Ipv4Addr) -> Result<CountryHit, GeoError> {
        let response = fetch(&self.client, &expand(&self.url_template, ip)).await?;
        let body: IpInfoResponse = response.json().await.map_err(decode_error)?;
        if body.error.is_some() {
            return Err(GeoError::Malformed("provider returned an error object".to_string()));
        }
        match body.country.filter(|c| !c.trim().is_empty()) {
            Some(code) => Ok(CountryHit::code(code)),
            None => Err(GeoError::Malformed("no country in response".to_string())),
        }
    }
}

/// Plain-text lookup whose body is the bare country code
pub struct PlainTextProvider {
    client: Client,
    url_template: String,
}

impl PlainTextProvider {
    pub fn new(timeout: Duration) -> Result<Self, GeoError> {
        Self::with_url(IPAPI_CO_URL, timeout)
    }

    pub fn with_url(url_template: &str, timeout: Duration) -> Result<Self, GeoError> {
        Ok(Self {
            client: build_client(timeout)?,
            url_template: url_template.to_string(),
        })
    }
}

#[async_trait]
impl GeoProvider for PlainTextProvider {
    fn name(&self) -> &str {
        "ipapi.co"
    }

    async fn lookup(&self, ip: Ipv4Addr) -> Result<CountryHit, GeoError> {
        let response = fetch(&self.client, &expand(&self.url_template, ip)).await?;
        let body = response.text().await?;
        let code = body.trim();
        if code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic()) {
            Ok(CountryHit::code(code))
        } else {
            Err(GeoError::Malformed(format!("unexpected body {:?}", code)))
        }
    }
}

/// Offline lookup in a MaxMind City database
pub struct MmdbProvider {
    reader: Reader<Vec<u8>>,
}

impl MmdbProvider {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, GeoError> {
        let reader = Reader::open_readfile(path).map_err(|e| GeoError::Database(e.to_string()))?;
        Ok(Self { reader })
    }
}

#[async_trait]
impl GeoProvider for MmdbProvider {
    fn name(&self) -> &str {
        "mmdb"
    }

    async fn lookup(&self, ip: Ipv4Addr) -> Result<CountryHit, GeoError> {
        let lookup_result = self
            .reader
            .lookup(IpAddr::V4(ip))
            .map_err(|e| GeoError::Database(e.to_string()))?;
        let city: Option<geoip2::City> = lookup_result
            .decode()
            .map_err(|e| GeoError::Database(e.to_string()))?;

        let Some(city) = city else {
            return Err(GeoError::Database(format!("{} not in database", ip)));
        };

        let hit = CountryHit {
            code: city.country.iso_code.map(String::from),
            name: city.country.names.english.map(String::from),
        };
        if hit.is_empty() {
            return Err(GeoError::Database(format!("{} has no country", ip)));
        }
        Ok(hit)
    }
}

/// Geolocation configuration
#[derive(Debug, Clone)]
pub struct GeoConfig {
    /// Timeout for each provider request
    pub timeout: Duration,
    pub fallback: FallbackPolicy,
    pub flag_style: FlagStyle,
    /// Optional MaxMind database consulted before the network providers
    pub mmdb_path: Option<PathBuf>,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_GEO_TIMEOUT,
            fallback: FallbackPolicy::default(),
            flag_style: FlagStyle::default(),
            mmdb_path: None,
        }
    }
}

impl GeoConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_fallback(mut self, fallback: FallbackPolicy) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_flag_style(mut self, flag_style: FlagStyle) -> Self {
        self.flag_style = flag_style;
        self
    }

    pub fn with_mmdb_path(mut self, path: PathBuf) -> Self {
        self.mmdb_path = Some(path);
        self
    }
}

/// Resolves addresses through an ordered provider chain
pub struct GeoResolver {
    providers: Vec<Box<dyn GeoProvider>>,
    fallback: FallbackPolicy,
    flag_style: FlagStyle,
}

impl GeoResolver {
    /// Resolver with an explicit provider chain
    pub fn new(
        providers: Vec<Box<dyn GeoProvider>>,
        fallback: FallbackPolicy,
        flag_style: FlagStyle,
    ) -> Self {
        Self {
            providers,
            fallback,
            flag_style,
        }
    }

    /// Default chain: optional MMDB, then ip-api.com, ipinfo.io and ipapi.co
    pub fn with_config(config: &GeoConfig) -> Result<Self, GeoError> {
        let mut providers: Vec<Box<dyn GeoProvider>> = Vec::new();

        if let Some(path) = &config.mmdb_path {
            match MmdbProvider::from_path(path) {
                Ok(provider) => providers.push(Box::new(provider)),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "ignoring geolocation database")
                }
            }
        }
        providers.push(Box::new(IpApiProvider::new(config.timeout)?));
        providers.push(Box::new(IpInfoProvider::new(config.timeout)?));
        providers.push(Box::new(PlainTextProvider::new(config.timeout)?));

        Ok(Self::new(providers, config.fallback, config.flag_style.clone()))
    }

    /// Look up `ip`, degrading to [`GeoInfo::unknown`] on failure
    pub async fn resolve(&self, ip: Ipv4Addr) -> GeoInfo {
        for provider in &self.providers {
            match provider.lookup(ip).await {
                Ok(hit) => {
                    debug!(%ip, provider = provider.name(), ?hit, "geolocation resolved");
                    return GeoInfo::from_hit(hit, &self.flag_style, provider.name());
                }
                Err(e) if e.falls_through(self.fallback) => {
                    debug!(
                        %ip,
                        provider = provider.name(),
                        error = %e,
                        "trying next geolocation provider"
                    );
                }
                Err(e) => {
                    warn!(%ip, provider = provider.name(), error = %e, "geolocation failed");
                    return GeoInfo::unknown(&self.flag_style);
                }
            }
        }
        warn!(%ip, "no geolocation provider answered");
        GeoInfo::unknown(&self.flag_style)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speedtest::country::{flag_emoji, PLACEHOLDER_FLAG};
    use mockito::{Server, ServerGuard};

    const IP: Ipv4Addr = Ipv4Addr::new(1, 2, 3, 4);
    const TIMEOUT: Duration = Duration::from_secs(2);

    fn url(server: &ServerGuard, path: &str) -> String {
        format!("{}{}", server.url(), path)
    }

    /// Offline source that either knows one answer or misses
    struct StubDatabase {
        hit: Option<CountryHit>,
    }

    #[async_trait]
    impl GeoProvider for StubDatabase {
        fn name(&self) -> &str {
            "mmdb"
        }

        async fn lookup(&self, ip: Ipv4Addr) -> Result<CountryHit, GeoError> {
            self.hit
                .clone()
                .ok_or_else(|| GeoError::Database(format!("{} not in database", ip)))
        }
    }

    #[test]
    fn test_geo_info_unknown() {
        let info = GeoInfo::unknown(&FlagStyle::Emoji);
        assert!(info.is_unknown());
        assert_eq!(info.flag, PLACEHOLDER_FLAG);
        assert_eq!(info.label, country::UNKNOWN_LABEL);
        assert!(info.country_code.is_none());
    }

    #[test]
    fn test_geo_info_from_code() {
        let info = GeoInfo::from_hit(CountryHit::code("jp"), &FlagStyle::Emoji, "test");
        assert_eq!(info.country_code.as_deref(), Some("JP"));
        assert_eq!(info.country_name, "Japan");
        assert_eq!(info.label, "日本");
        assert_eq!(info.flag, flag_emoji(Some("JP")));
        assert_eq!(info.source.as_deref(), Some("test"));
    }

    #[test]
    fn test_geo_info_from_name_only() {
        let hit = CountryHit {
            code: None,
            name: Some("Germany".to_string()),
        };
        let info = GeoInfo::from_hit(hit, &FlagStyle::Emoji, "test");
        assert_eq!(info.country_code.as_deref(), Some("DE"));
        assert_eq!(info.label, "德国");

        let hit = CountryHit {
            code: None,
            name: Some("Atlantis".to_string()),
        };
        let info = GeoInfo::from_hit(hit, &FlagStyle::Emoji, "test");
        assert!(info.country_code.is_none());
        assert_eq!(info.label, "Atlantis");
        assert_eq!(info.flag, PLACEHOLDER_FLAG);
    }

    #[test]
    fn test_label_style_name_only() {
        let hit = CountryHit {
            code: None,
            name: Some("Atlantis".to_string()),
        };
        let info = GeoInfo::from_hit(hit, &FlagStyle::Label, "test");
        assert_eq!(info.label, "Atlantis");
        assert_eq!(info.flag, "Atlantis");

        let hit = CountryHit {
            code: None,
            name: Some("Japan".to_string()),
        };
        let info = GeoInfo::from_hit(hit, &FlagStyle::Label, "test");
        assert_eq!(info.flag, "日本");

        let info = GeoInfo::from_hit(CountryHit::default(), &FlagStyle::Label, "test");
        assert_eq!(info.flag, country::UNKNOWN_LABEL);
    }

    #[test]
    fn test_fallback_policy() {
        assert!(GeoError::RateLimited.falls_through(FallbackPolicy::RateLimitOnly));
        assert!(GeoError::Database("x".into()).falls_through(FallbackPolicy::RateLimitOnly));
        assert!(!GeoError::Malformed("x".into()).falls_through(FallbackPolicy::RateLimitOnly));
        assert!(GeoError::Malformed("x".into()).falls_through(FallbackPolicy::AnyError));
        assert!(
            !GeoError::Status(StatusCode::BAD_GATEWAY).falls_through(FallbackPolicy::RateLimitOnly)
        );
    }

    #[tokio::test]
    async fn test_ip_api_provider() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/json/1.2.3.4")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status":"success","country":"United States","countryCode":"US"}"#)
            .create_async()
            .await;

        let provider = IpApiProvider::with_url(&url(&server, "/json/{ip}"), TIMEOUT).unwrap();
        let hit = provider.lookup(IP).await.unwrap();
        assert_eq!(hit.code.as_deref(), Some("US"));
        assert_eq!(hit.name.as_deref(), Some("United States"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_ip_api_provider_fail_status() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/json/1.2.3.4")
            .with_status(200)
            .with_body(r#"{"status":"fail","message":"reserved range"}"#)
            .create_async()
            .await;

        let provider = IpApiProvider::with_url(&url(&server, "/json/{ip}"), TIMEOUT).unwrap();
        let err = provider.lookup(IP).await.unwrap_err();
        assert!(matches!(err, GeoError::Malformed(ref m) if m == "reserved range"));
    }

    #[tokio::test]
    async fn test_rate_limit_status() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/1.2.3.4/json")
            .with_status(429)
            .create_async()
            .await;

        let provider = IpInfoProvider::with_url(&url(&server, "/{ip}/json"), TIMEOUT).unwrap();
        assert!(matches!(provider.lookup(IP).await, Err(GeoError::RateLimited)));
    }

    #[tokio::test]
    async fn test_plain_text_provider() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/1.2.3.4/country/")
            .with_status(200)
            .with_body("SG\n")
            .create_async()
            .await;
        server
            .mock("GET", "/5.6.7.8/country/")
            .with_status(200)
            .with_body("Undefined")
            .create_async()
            .await;

        let provider =
            PlainTextProvider::with_url(&url(&server, "/{ip}/country/"), TIMEOUT).unwrap();
        assert_eq!(provider.lookup(IP).await.unwrap(), CountryHit::code("SG"));
        assert!(matches!(
            provider.lookup(Ipv4Addr::new(5, 6, 7, 8)).await,
            Err(GeoError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_resolver_falls_back_on_rate_limit() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/primary/1.2.3.4")
            .with_status(429)
            .create_async()
            .await;
        let secondary = server
            .mock("GET", "/secondary/1.2.3.4")
            .with_status(200)
            .with_body(r#"{"ip":"1.2.3.4","country":"HK"}"#)
            .create_async()
            .await;

        let resolver = GeoResolver::new(
            vec![
                Box::new(IpApiProvider::with_url(&url(&server, "/primary/{ip}"), TIMEOUT).unwrap()),
                Box::new(
                    IpInfoProvider::with_url(&url(&server, "/secondary/{ip}"), TIMEOUT).unwrap(),
                ),
            ],
            FallbackPolicy::RateLimitOnly,
            FlagStyle::Emoji,
        );

        let info = resolver.resolve(IP).await;
        assert_eq!(info.country_code.as_deref(), Some("HK"));
        assert_eq!(info.label, "香港");
        assert_eq!(info.source.as_deref(), Some("ipinfo.io"));
        secondary.assert_async().await;
    }

    #[tokio::test]
    async fn test_resolver_stops_on_other_errors() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/primary/1.2.3.4")
            .with_status(500)
            .create_async()
            .await;
        let secondary = server
            .mock("GET", "/secondary/1.2.3.4")
            .with_status(200)
            .with_body(r#"{"country":"HK"}"#)
            .expect(0)
            .create_async()
            .await;

        let resolver = GeoResolver::new(
            vec![
                Box::new(IpApiProvider::with_url(&url(&server, "/primary/{ip}"), TIMEOUT).unwrap()),
                Box::new(
                    IpInfoProvider::with_url(&url(&server, "/secondary/{ip}"), TIMEOUT).unwrap(),
                ),
            ],
            FallbackPolicy::RateLimitOnly,
            FlagStyle::Emoji,
        );

        let info = resolver.resolve(IP).await;
        assert!(info.is_unknown());
        secondary.assert_async().await;
    }

    #[tokio::test]
    async fn test_resolver_any_error_policy() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/primary/1.2.3.4")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;
        server
            .mock("GET", "/secondary/1.2.3.4")
            .with_status(200)
            .with_body("DE")
            .create_async()
            .await;

        let resolver = GeoResolver::new(
            vec![
                Box::new(IpApiProvider::with_url(&url(&server, "/primary/{ip}"), TIMEOUT).unwrap()),
                Box::new(
                    PlainTextProvider::with_url(&url(&server, "/secondary/{ip}"), TIMEOUT).unwrap(),
                ),
            ],
            FallbackPolicy::AnyError,
            FlagStyle::image(country::DEFAULT_FLAG_CDN),
        );

        let info = resolver.resolve(IP).await;
        assert_eq!(info.country_code.as_deref(), Some("DE"));
        assert_eq!(info.flag, "https://flagcdn.com/24x18/de.png");
    }

    #[tokio::test]
    async fn test_resolver_unreachable_provider() {
        // nothing listens on port 1
        let resolver = GeoResolver::new(
            vec![Box::new(IpApiProvider::with_url("http://127.0.0.1:1/{ip}", TIMEOUT).unwrap())],
            FallbackPolicy::AnyError,
            FlagStyle::Emoji,
        );
        let info = resolver.resolve(IP).await;
        assert!(info.is_unknown());
        assert_eq!(info.flag, PLACEHOLDER_FLAG);
    }

    #[tokio::test]
    async fn test_resolver_without_providers() {
        let resolver = GeoResolver::new(Vec::new(), FallbackPolicy::AnyError, FlagStyle::Label);
        let info = resolver.resolve(IP).await;
        assert!(info.is_unknown());
        assert_eq!(info.flag, country::UNKNOWN_LABEL);
    }

    #[tokio::test]
    async fn test_resolver_database_miss_uses_network() {
        let mut server = Server::new_async().await;
        let network = server
            .mock("GET", "/geo/1.2.3.4")
            .with_status(200)
            .with_body(r#"{"country":"SG"}"#)
            .create_async()
            .await;

        let resolver = GeoResolver::new(
            vec![
                Box::new(StubDatabase { hit: None }),
                Box::new(IpInfoProvider::with_url(&url(&server, "/geo/{ip}"), TIMEOUT).unwrap()),
            ],
            FallbackPolicy::RateLimitOnly,
            FlagStyle::Emoji,
        );

        let info = resolver.resolve(IP).await;
        assert_eq!(info.country_code.as_deref(), Some("SG"));
        assert_eq!(info.source.as_deref(), Some("ipinfo.io"));
        network.assert_async().await;
    }

    #[tokio::test]
    async fn test_resolver_database_hit_skips_network() {
        let mut server = Server::new_async().await;
        let network = server
            .mock("GET", "/geo/1.2.3.4")
            .with_status(200)
            .with_body(r#"{"country":"SG"}"#)
            .expect(0)
            .create_async()
            .await;

        let hit = CountryHit {
            code: Some("NL".to_string()),
            name: Some("Netherlands".to_string()),
        };
        let resolver = GeoResolver::new(
            vec![
                Box::new(StubDatabase { hit: Some(hit) }),
                Box::new(IpInfoProvider::with_url(&url(&server, "/geo/{ip}"), TIMEOUT).unwrap()),
            ],
            FallbackPolicy::RateLimitOnly,
            FlagStyle::Emoji,
        );

        let info = resolver.resolve(IP).await;
        assert_eq!(info.country_code.as_deref(), Some("NL"));
        assert_eq!(info.label, "荷兰");
        assert_eq!(info.source.as_deref(), Some("mmdb"));
        network.assert_async().await;
    }

    #[test]
    fn test_mmdb_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = MmdbProvider::from_path(dir.path().join("missing.mmdb"));
        assert!(matches!(result, Err(GeoError::Database(_))));
    }

    #[test]
    fn test_geo_config_builder() {
        let config = GeoConfig::new()
            .with_timeout(Duration::from_secs(1))
            .with_fallback(FallbackPolicy::AnyError)
            .with_flag_style(FlagStyle::Label)
            .with_mmdb_path(PathBuf::from("GeoLite2-City.mmdb"));
        assert_eq!(config.timeout, Duration::from_secs(1));
        assert_eq!(config.fallback, FallbackPolicy::AnyError);
        assert_eq!(config.flag_style, FlagStyle::Label);
        assert!(config.mmdb_path.is_some());
    }
}
