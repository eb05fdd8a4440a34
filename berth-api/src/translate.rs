/// LibreTranslate client
///
/// Messages are annotated with their detected language and a translation into
/// every other language the service offers. Translation is best effort: a
/// failing target is logged and left out, and a failing detection leaves the
/// message untranslated.
///
/// # Example
///
/// ```no_run
/// use berth_api::translate::Translator;
///
/// # async fn example() -> Result<(), berth_api::translate::TranslateError> {
/// let translator = Translator::new("http://libretranslate:5000");
/// let source = translator.detect("bonjour tout le monde").await?;
/// println!("detected {:?}", source);
/// # Ok(())
/// # }
/// ```

use std::collections::BTreeMap;
use std::time::Duration;

use berth_shared::models::MessageMetadata;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    #[error("Translation request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Unexpected translation response: {0}")]
    Response(String),
}

/// A language offered by the service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Language {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub targets: Vec<String>,
}

#[derive(Deserialize)]
struct Detection {
    language: String,
    #[serde(default)]
    confidence: f64,
}

#[derive(Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranslateResponse {
    translated_text: String,
}

pub struct Translator {
    http: reqwest::Client,
    base_url: String,
    languages: OnceCell<Vec<Language>>,
}

impl Translator {
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            languages: OnceCell::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Supported languages, fetched once and cached
    pub async fn languages(&self) -> Result<Vec<Language>, TranslateError> {
        let languages = self
            .languages
            .get_or_try_init(|| async {
                let languages: Vec<Language> = self
                    .http
                    .get(self.url("languages"))
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await?;
                tracing::info!(count = languages.len(), "Loaded translation languages");
                Ok::<_, TranslateError>(languages)
            })
            .await?;
        Ok(languages.clone())
    }

    /// Most likely language of `text`, if any was detected
    pub async fn detect(&self, text: &str) -> Result<Option<String>, TranslateError> {
        let detections: Vec<Detection> = self
            .http
            .post(self.url("detect"))
            .json(&serde_json::json!({ "q": text }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(detections
            .into_iter()
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
            .map(|d| d.language))
    }

    pub async fn translate(
        &self,
        text: &str,
        source: &str,
        target: &str,
    ) -> Result<String, TranslateError> {
        let response: TranslateResponse = self
            .http
            .post(self.url("translate"))
            .json(&TranslateRequest {
                q: text,
                source,
                target,
                format: "text",
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if response.translated_text.is_empty() && !text.is_empty() {
            return Err(TranslateError::Response("Empty translation".to_string()));
        }
        Ok(response.translated_text)
    }

    /// Translates into each target concurrently; failed targets are omitted
    pub async fn translate_all(
        &self,
        text: &str,
        source: &str,
        targets: &[String],
    ) -> BTreeMap<String, String> {
        let requests = targets
            .iter()
            .filter(|target| target.as_str() != source)
            .map(|target| async move {
                (target.clone(), self.translate(text, source, target).await)
            });

        join_all(requests)
            .await
            .into_iter()
            .filter_map(|(target, result)| match result {
                Ok(translated) => Some((target, translated)),
                Err(e) => {
                    tracing::warn!(source, target = %target, error = %e, "Translation failed");
                    None
                }
            })
            .collect()
    }

    /// Detects the language of `text` and translates it to every other language
    ///
    /// Returns `None` when detection fails.
    pub async fn annotate(&self, text: &str) -> Option<MessageMetadata> {
        let source = match self.detect(text).await {
            Ok(Some(source)) => source,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "Language detection failed");
                return None;
            }
        };

        let targets: Vec<String> = match self.languages().await {
            Ok(languages) => languages.into_iter().map(|l| l.code).collect(),
            Err(e) => {
                tracing::warn!(error = %e, "Could not load translation languages");
                Vec::new()
            }
        };

        let translations = self.translate_all(text, &source, &targets).await;
        Some(MessageMetadata {
            source_language: source,
            translations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_without_double_slash() {
        let translator = Translator::new("http://libretranslate:5000/");
        assert_eq!(translator.url("detect"), "http://libretranslate:5000/detect");
    }

    #[test]
    fn test_language_list_decodes() {
        let raw = r#"[{"code":"en","name":"English","targets":["fr","de"]},{"code":"fr","name":"French"}]"#;
        let languages: Vec<Language> = serde_json::from_str(raw).unwrap();
        assert_eq!(languages.len(), 2);
        assert!(languages[1].targets.is_empty());
    }

    #[test]
    fn test_request_body_shape() {
        let body = serde_json::to_value(TranslateRequest {
            q: "hello",
            source: "en",
            target: "fr",
            format: "text",
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({"q": "hello", "source": "en", "target": "fr", "format": "text"})
        );

        let response: TranslateResponse =
            serde_json::from_str(r#"{"translatedText":"bonjour"}"#).unwrap();
        assert_eq!(response.translated_text, "bonjour");
    }

    #[tokio::test]
    async fn test_annotate_without_service_is_none() {
        let translator = Translator::new("http://127.0.0.1:9");
        assert!(translator.annotate("hello").await.is_none());
    }
}
