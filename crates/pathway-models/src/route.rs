use std::fmt;

use pathway_protocol::ModelConfig;

/// Cache key of a specialized client.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ClientKey {
    pub model: String,
    pub api_key: String,
}

impl fmt::Debug for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientKey")
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Where an invocation goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// A cached provider client, built by the factory registered for `prefix`.
    Specialized { prefix: String, key: ClientKey },
    /// The generic backend, called with the effective configuration unchanged.
    Generic,
}

/// Picks the route for an effective configuration. The first registered
/// prefix matching the lowercased model name wins; an unset model is generic.
pub fn select_route<'a>(
    effective: &ModelConfig,
    prefixes: impl IntoIterator<Item = &'a str>,
    default_api_key: Option<&str>,
) -> Route {
    let Some(model) = effective.model.as_deref() else {
        return Route::Generic;
    };
    let normalized = model.trim().to_ascii_lowercase();

    let matched = prefixes
        .into_iter()
        .find(|prefix| normalized.starts_with(&prefix.to_ascii_lowercase()));

    match matched {
        Some(prefix) => Route::Specialized {
            prefix: prefix.to_owned(),
            key: ClientKey {
                model: model.to_owned(),
                api_key: effective
                    .api_key
                    .as_deref()
                    .or(default_api_key)
                    .unwrap_or_default()
                    .to_owned(),
            },
        },
        None => Route::Generic,
    }
}
