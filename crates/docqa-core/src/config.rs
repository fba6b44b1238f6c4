use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;

/// Environment variable consulted for the endpoint when no explicit value is given.
pub const DEFAULT_ENDPOINT_VAR: &str = "DOCQA_ENDPOINT";
/// Environment variable consulted for the credential when no explicit value is given.
pub const DEFAULT_CREDENTIAL_VAR: &str = "DOCQA_API_KEY";

/// Inference flavour requested when opening an answer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InferenceMode {
    #[default]
    Documentation,
}

impl InferenceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            InferenceMode::Documentation => "documentation",
        }
    }
}

/// Retrieval strategy used by the remote search operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    #[default]
    Fulltext,
    Vector,
    Hybrid,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Fulltext => "fulltext",
            SearchMode::Vector => "vector",
            SearchMode::Hybrid => "hybrid",
        }
    }
}

/// Whether a chunk of answer text carries the whole answer so far or only
/// the newly arrived fragment.
///
/// Used twice: once for what the remote answer stream sends, once for what
/// the adapter emits to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccumulationPolicy {
    Delta,
    WholeSoFar,
}

/// Free-form context forwarded to the answer session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserContext {
    Text(String),
    Fields(Map<String, Value>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortBy {
    pub property: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<SortOrder>,
}

/// Default options applied to every search call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    #[serde(alias = "where", skip_serializing_if = "Option::is_none")]
    pub filter: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sort_by: Vec<SortBy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facets: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub boost: BTreeMap<String, f64>,
}

/// Explicit, possibly partial adapter options as supplied by the caller or
/// read from a TOML table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigOptions {
    pub endpoint: Option<String>,
    #[serde(alias = "api_key")]
    pub credential: Option<String>,
    pub user_context: Option<UserContext>,
    pub inference_mode: Option<InferenceMode>,
    pub search_mode: Option<SearchMode>,
    pub search_options: Option<SearchOptions>,
    pub stream_policy: Option<AccumulationPolicy>,
    pub source_chunks: Option<AccumulationPolicy>,
}

impl ConfigOptions {
    /// Parse options from TOML.
    pub fn from_toml(src: &str) -> Result<Self, ConfigError> {
        toml::from_str(src).map_err(ConfigError::from)
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    pub fn with_search_mode(mut self, mode: SearchMode) -> Self {
        self.search_mode = Some(mode);
        self
    }

    pub fn with_search_options(mut self, options: SearchOptions) -> Self {
        self.search_options = Some(options);
        self
    }

    pub fn with_user_context(mut self, context: UserContext) -> Self {
        self.user_context = Some(context);
        self
    }

    pub fn with_stream_policy(mut self, policy: AccumulationPolicy) -> Self {
        self.stream_policy = Some(policy);
        self
    }

    pub fn with_source_chunks(mut self, policy: AccumulationPolicy) -> Self {
        self.source_chunks = Some(policy);
        self
    }
}

impl From<&AdapterConfig> for ConfigOptions {
    fn from(config: &AdapterConfig) -> Self {
        Self {
            endpoint: Some(config.endpoint.clone()),
            credential: Some(config.credential.clone()),
            user_context: config.user_context.clone(),
            inference_mode: Some(config.inference_mode),
            search_mode: config.search_mode,
            search_options: Some(config.search_options.clone()),
            stream_policy: Some(config.stream_policy),
            source_chunks: Some(config.source_chunks),
        }
    }
}

/// Fully validated adapter configuration. Immutable once built; obtain a new
/// one through [`ConfigResolver`] to reconfigure.
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterConfig {
    endpoint: String,
    credential: String,
    user_context: Option<UserContext>,
    inference_mode: InferenceMode,
    search_mode: Option<SearchMode>,
    search_options: SearchOptions,
    stream_policy: AccumulationPolicy,
    source_chunks: AccumulationPolicy,
}

impl AdapterConfig {
    /// Endpoint without trailing slashes.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn credential(&self) -> &str {
        &self.credential
    }

    pub fn user_context(&self) -> Option<&UserContext> {
        self.user_context.as_ref()
    }

    pub fn inference_mode(&self) -> InferenceMode {
        self.inference_mode
    }

    /// `Some` when one-shot calls should go through the search path.
    pub fn search_mode(&self) -> Option<SearchMode> {
        self.search_mode
    }

    pub fn search_options(&self) -> &SearchOptions {
        &self.search_options
    }

    /// Accumulation policy for emitted text deltas.
    pub fn stream_policy(&self) -> AccumulationPolicy {
        self.stream_policy
    }

    /// Accumulation convention of the remote answer stream.
    pub fn source_chunks(&self) -> AccumulationPolicy {
        self.source_chunks
    }

    /// Settings echoed back in call metadata. The credential is never included.
    pub fn raw_settings(&self) -> Value {
        json!({
            "endpoint": self.endpoint,
            "userContext": self.user_context,
            "inferenceMode": self.inference_mode,
            "searchMode": self.search_mode,
            "searchOptions": self.search_options,
            "streamPolicy": self.stream_policy,
            "sourceChunks": self.source_chunks,
        })
    }
}

/// Names of the environment variables consulted when the endpoint or
/// credential is not given explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvFallbacks {
    pub endpoint: String,
    pub credential: String,
}

impl Default for EnvFallbacks {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT_VAR.into(),
            credential: DEFAULT_CREDENTIAL_VAR.into(),
        }
    }
}

/// Turns [`ConfigOptions`] into an [`AdapterConfig`].
///
/// Resolution is pure: environment values are read through the lookup
/// function handed to [`ConfigResolver::resolve`], so the same inputs always
/// produce the same result.
#[derive(Debug, Clone, Default)]
pub struct ConfigResolver {
    fallbacks: Option<EnvFallbacks>,
}

impl ConfigResolver {
    /// Resolver consulting the default `DOCQA_*` variables.
    pub fn new() -> Self {
        Self {
            fallbacks: Some(EnvFallbacks::default()),
        }
    }

    /// Resolver that only looks at explicit options.
    pub fn without_env() -> Self {
        Self { fallbacks: None }
    }

    pub fn with_fallbacks(fallbacks: EnvFallbacks) -> Self {
        Self {
            fallbacks: Some(fallbacks),
        }
    }

    /// Validate `options`, filling the endpoint and credential from `env`
    /// when they are absent or blank.
    pub fn resolve<F>(&self, options: ConfigOptions, env: F) -> Result<AdapterConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let fallback = |explicit: Option<String>, var: Option<&str>| {
            non_blank(explicit).or_else(|| var.and_then(|name| non_blank(env(name))))
        };

        let endpoint = fallback(
            options.endpoint,
            self.fallbacks.as_ref().map(|f| f.endpoint.as_str()),
        )
        .map(|e| e.trim_end_matches('/').to_string())
        .filter(|e| !e.is_empty())
        .ok_or(ConfigError::Missing { field: "endpoint" })?;

        let credential = fallback(
            options.credential,
            self.fallbacks.as_ref().map(|f| f.credential.as_str()),
        )
        .ok_or(ConfigError::Missing {
            field: "credential",
        })?;

        Ok(AdapterConfig {
            endpoint,
            credential,
            user_context: options.user_context,
            inference_mode: options.inference_mode.unwrap_or_default(),
            search_mode: options.search_mode,
            search_options: options.search_options.unwrap_or_default(),
            stream_policy: options.stream_policy.unwrap_or(AccumulationPolicy::Delta),
            source_chunks: options
                .source_chunks
                .unwrap_or(AccumulationPolicy::WholeSoFar),
        })
    }

    /// [`ConfigResolver::resolve`] against the process environment.
    pub fn resolve_from_env(&self, options: ConfigOptions) -> Result<AdapterConfig, ConfigError> {
        self.resolve(options, |name| std::env::var(name).ok())
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Errors that can occur when building configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration field `{field}`")]
    Missing { field: &'static str },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::io::Write;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn resolves_explicit_options_and_strips_trailing_slashes() {
        let options = ConfigOptions::default()
            .with_endpoint("https://docs.example.com//")
            .with_credential("k");
        let cfg = ConfigResolver::new().resolve(options, no_env).unwrap();
        assert_eq!(cfg.endpoint(), "https://docs.example.com");
        assert_eq!(cfg.credential(), "k");
        assert_eq!(cfg.inference_mode(), InferenceMode::Documentation);
        assert_eq!(cfg.search_mode(), None);
        assert_eq!(cfg.stream_policy(), AccumulationPolicy::Delta);
        assert_eq!(cfg.source_chunks(), AccumulationPolicy::WholeSoFar);
    }

    #[test]
    fn falls_back_to_named_env_vars() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("SEARCH_URL", "https://env.example.com/"),
            ("SEARCH_KEY", "secret"),
        ]);
        let resolver = ConfigResolver::with_fallbacks(EnvFallbacks {
            endpoint: "SEARCH_URL".into(),
            credential: "SEARCH_KEY".into(),
        });
        let cfg = resolver
            .resolve(ConfigOptions::default(), |k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(cfg.endpoint(), "https://env.example.com");
        assert_eq!(cfg.credential(), "secret");
    }

    #[test]
    fn explicit_values_win_over_env() {
        let options = ConfigOptions::default()
            .with_endpoint("https://explicit")
            .with_credential("explicit-key");
        let cfg = ConfigResolver::new()
            .resolve(options, |_| Some("from-env".into()))
            .unwrap();
        assert_eq!(cfg.endpoint(), "https://explicit");
        assert_eq!(cfg.credential(), "explicit-key");
    }

    #[test]
    fn blank_or_missing_fields_name_the_field() {
        let err = ConfigResolver::new()
            .resolve(ConfigOptions::default().with_credential("k"), no_env)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Missing { field: "endpoint" }));

        let err = ConfigResolver::new()
            .resolve(
                ConfigOptions::default()
                    .with_endpoint("https://x")
                    .with_credential("   "),
                no_env,
            )
            .unwrap_err();
        assert!(matches!(err, ConfigError::Missing { field: "credential" }));

        let err = ConfigResolver::without_env()
            .resolve(ConfigOptions::default().with_endpoint("///").with_credential("k"), |_| {
                Some("ignored".into())
            })
            .unwrap_err();
        assert!(matches!(err, ConfigError::Missing { field: "endpoint" }));
    }

    #[test]
    fn resolving_twice_is_idempotent() {
        let options = ConfigOptions::default()
            .with_endpoint("https://x/")
            .with_credential("k")
            .with_search_mode(SearchMode::Hybrid);
        let resolver = ConfigResolver::new();
        let first = resolver.resolve(options, no_env).unwrap();
        let second = resolver
            .resolve(ConfigOptions::from(&first), no_env)
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn parse_options_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"endpoint = "https://x/"
api_key = "k"
search_mode = "vector"
stream_policy = "whole-so-far"
user_context = {{ plan = "pro" }}

[search_options]
limit = 5
where = {{ category = "laptops" }}
sort_by = [{{ property = "price", order = "desc" }}]
boost = {{ title = 2.0 }}"#
        )
        .unwrap();
        let contents = std::fs::read_to_string(file.path()).unwrap();
        let options = ConfigOptions::from_toml(&contents).unwrap();
        let cfg = ConfigResolver::without_env().resolve(options, no_env).unwrap();

        assert_eq!(cfg.search_mode(), Some(SearchMode::Vector));
        assert_eq!(cfg.stream_policy(), AccumulationPolicy::WholeSoFar);
        let search = cfg.search_options();
        assert_eq!(search.limit, Some(5));
        assert_eq!(search.filter.as_ref().unwrap()["category"], "laptops");
        assert_eq!(search.sort_by[0].order, Some(SortOrder::Desc));
        assert_eq!(search.boost.get("title"), Some(&2.0));
        assert!(matches!(cfg.user_context(), Some(UserContext::Fields(_))));
    }

    #[test]
    fn raw_settings_never_expose_the_credential() {
        let cfg = ConfigResolver::without_env()
            .resolve(
                ConfigOptions::default()
                    .with_endpoint("https://x")
                    .with_credential("top-secret"),
                no_env,
            )
            .unwrap();
        let settings = cfg.raw_settings().to_string();
        assert!(!settings.contains("top-secret"));
        assert!(settings.contains("https://x"));
    }
}
