use crate::StoreError;
use std::time::Duration;
use url::Url;

pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Connection settings for a Weaviate instance.
#[derive(Debug, Clone)]
pub struct WeaviateConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub cohere_api_key: Option<String>,
    pub huggingface_api_key: Option<String>,
    pub timeout_secs: u64,
    /// Merged after the inference keys, so they override on name clashes.
    pub extra_headers: Vec<(String, String)>,
}

impl WeaviateConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: None,
            openai_api_key: None,
            cohere_api_key: None,
            huggingface_api_key: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            extra_headers: Vec::new(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = non_blank(Some(api_key.into()));
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// Cluster URLs are often given as bare hosts; those default to https.
    pub fn base_url(&self) -> Result<Url, StoreError> {
        let trimmed = self.url.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(StoreError::Request("weaviate url is empty".to_string()));
        }

        let with_scheme = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("https://{trimmed}")
        };

        Ok(Url::parse(&format!("{with_scheme}/"))?)
    }

    pub fn headers(&self) -> Vec<(String, String)> {
        let inference = [
            ("X-OpenAI-Api-Key", &self.openai_api_key),
            ("X-Cohere-Api-Key", &self.cohere_api_key),
            ("X-HuggingFace-Api-Key", &self.huggingface_api_key),
        ];

        let mut headers: Vec<(String, String)> = inference
            .into_iter()
            .filter_map(|(name, value)| {
                non_blank(value.clone()).map(|value| (name.to_string(), value))
            })
            .collect();

        for (name, value) in &self.extra_headers {
            headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
            headers.push((name.clone(), value.clone()));
        }

        headers
    }
}

pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim().to_string();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_host_gets_https_scheme() {
        let config = WeaviateConfig::new("my-cluster.weaviate.cloud");
        let url = config.base_url().unwrap();
        assert_eq!(url.as_str(), "https://my-cluster.weaviate.cloud/");
        assert_eq!(
            url.join("v1/schema").unwrap().as_str(),
            "https://my-cluster.weaviate.cloud/v1/schema"
        );
    }

    #[test]
    fn explicit_scheme_and_trailing_slash_are_kept_clean() {
        let config = WeaviateConfig::new("http://localhost:8080/");
        assert_eq!(config.base_url().unwrap().as_str(), "http://localhost:8080/");
    }

    #[test]
    fn empty_url_is_rejected() {
        assert!(WeaviateConfig::new("  ").base_url().is_err());
    }

    #[test]
    fn blank_inference_keys_are_skipped_and_extras_override() {
        let mut config = WeaviateConfig::new("localhost:8080");
        config.openai_api_key = Some("sk-1".to_string());
        config.cohere_api_key = Some("   ".to_string());
        config.extra_headers = vec![("x-openai-api-key".to_string(), "sk-2".to_string())];

        let headers = config.headers();
        assert_eq!(headers, vec![("x-openai-api-key".to_string(), "sk-2".to_string())]);
    }
}
