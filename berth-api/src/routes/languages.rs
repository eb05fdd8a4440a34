/// Translation languages
///
/// ```text
/// GET /languages
/// ```
///
/// Returns the languages offered by the translation service, or an empty
/// list when translation is not configured.
///
/// # Errors
///
/// - `503 Service Unavailable`: The translation service did not answer

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    translate::Language,
};
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct LanguagesResponse {
    pub enabled: bool,
    pub languages: Vec<Language>,
}

pub async fn list_languages(State(state): State<AppState>) -> ApiResult<Json<LanguagesResponse>> {
    let Some(translator) = &state.translator else {
        return Ok(Json(LanguagesResponse {
            enabled: false,
            languages: Vec::new(),
        }));
    };

    let languages = translator.languages().await.map_err(|e| {
        tracing::warn!(error = %e, "Failed to load translation languages");
        ApiError::ServiceUnavailable("Translation service unavailable".to_string())
    })?;

    Ok(Json(LanguagesResponse {
        enabled: true,
        languages,
    }))
}
