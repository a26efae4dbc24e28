// src/middleware/i18n.rs

use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts, HeaderMap};

// O idioma padrão dos operadores é o português
const DEFAULT_LANG: &str = "pt";

// Nosso extrator de idioma
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locale(pub String);

impl Locale {
    pub fn is_english(&self) -> bool {
        self.0 == "en"
    }

    pub fn from_header(header_str: &str) -> Self {
        let lang = accept_language::parse(header_str)
            .into_iter()
            .find(|tag| !tag.trim().is_empty()) // Pega o primeiro idioma (ex: "pt-BR")
            .and_then(|tag_string| {
                // "pt-BR" -> split vira ["pt", "BR"] -> next() pega "pt"
                tag_string
                    .split('-')
                    .next()
                    .map(|primary| primary.trim().to_lowercase())
            })
            .filter(|primary| !primary.is_empty() && primary != "*")
            .unwrap_or_else(|| DEFAULT_LANG.to_string());

        Locale(lang)
    }

    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(header::ACCEPT_LANGUAGE)
            .and_then(|header_value| header_value.to_str().ok())
            .map(Locale::from_header)
            .unwrap_or_default()
    }
}

impl Default for Locale {
    fn default() -> Self {
        Locale(DEFAULT_LANG.to_string())
    }
}

impl<S> FromRequestParts<S> for Locale
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Locale::from_headers(&parts.headers))
    }
}
