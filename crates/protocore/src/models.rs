//! Model capability catalog.
//!
//! Knows which provider serves a model, whether it accepts a temperature, and
//! which provider parameters it understands. The Agent capability uses it to
//! shape the parameter bag before handing a request to the gateway.

use crate::{Map, Value};
use serde::Serialize;
use std::collections::BTreeMap;

pub const TEMPERATURE: &str = "temperature";
pub const TOP_P: &str = "top_p";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
    Google,
}

impl Provider {
    /// Anthropic rejects requests that set both `temperature` and `top_p`.
    pub fn allows_temperature_with_top_p(self) -> bool {
        !matches!(self, Provider::Anthropic)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ParamSpec {
    Float { range: [f64; 2], default: f64 },
    Int { min: i64, max: i64, default: i64 },
    Enum { values: Vec<&'static str>, default: &'static str },
    Bool { default: bool },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelInfo {
    pub provider: Provider,
    pub supports_temperature: bool,
    pub valid_params: BTreeMap<&'static str, ParamSpec>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct ModelCatalog {
    models: BTreeMap<String, ModelInfo>,
}

impl ModelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, info: ModelInfo) {
        self.models.insert(name.into(), info);
    }

    pub fn get(&self, model: &str) -> Option<&ModelInfo> {
        self.models.get(model)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ModelInfo)> {
        self.models.iter().map(|(name, info)| (name.as_str(), info))
    }

    /// Drops controls the model or its provider refuses.
    ///
    /// Models without temperature support lose `temperature`; providers that
    /// forbid combining `temperature` and `top_p` lose `top_p` when both are set.
    /// Unknown models are left untouched.
    pub fn enforce_policy(&self, model: &str, params: &mut Map) {
        let Some(info) = self.get(model) else {
            return;
        };

        if !info.supports_temperature {
            if params.remove(TEMPERATURE).is_some() {
                tracing::info!("Temperature ignored for restricted model: {}", model);
            }
        } else if !info.provider.allows_temperature_with_top_p()
            && params.contains_key(TEMPERATURE)
            && params.remove(TOP_P).is_some()
        {
            tracing::debug!("Removed top_p (mutually exclusive with temperature for {})", model);
        }
    }

    /// Keeps only parameters the model declares, coercing numeric strings
    /// for float parameters. Unknown models pass through untouched.
    pub fn sanitize_params(&self, model: &str, params: &Map) -> Map {
        let Some(info) = self.get(model) else {
            return params.clone();
        };

        let mut sanitized = Map::new();
        for (key, value) in params {
            let Some(spec) = info.valid_params.get(key.as_str()) else {
                tracing::warn!(model, param = %key, "Invalid param for model, skipping");
                continue;
            };

            match (spec, value) {
                (ParamSpec::Float { .. }, Value::String(raw)) => {
                    match raw.trim().parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
                        Some(number) => {
                            sanitized.insert(key.clone(), Value::Number(number));
                        }
                        None => tracing::warn!(model, param = %key, value = %raw, "Invalid float, skipping"),
                    }
                }
                _ => {
                    sanitized.insert(key.clone(), value.clone());
                }
            }
        }
        sanitized
    }

    /// Catalog of the models the editor offers.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();

        let mut gpt5 = openai_reasoning((8192, 2048), &["minimal", "low", "medium", "high"], "medium");
        gpt5.insert("verbosity", choice(&["low", "medium", "high"], "medium"));
        gpt5.insert("reasoning_summary", choice(&["auto", "concise", "detailed"], "auto"));
        catalog.insert("gpt-5", openai(gpt5));

        let mut gpt5_pro = openai_reasoning((16384, 4096), &["high"], "high");
        gpt5_pro.insert("verbosity", choice(&["low", "medium", "high"], "medium"));
        gpt5_pro.insert("preamble", ParamSpec::Bool { default: false });
        catalog.insert("gpt-5-pro", openai(gpt5_pro));

        let mut gpt5_codex = openai_reasoning((8192, 2048), &["low", "medium", "high"], "medium");
        gpt5_codex.insert("verbosity", choice(&["low", "medium", "high"], "medium"));
        catalog.insert("gpt-5-codex", openai(gpt5_codex));

        let mut gpt5_mini = openai_reasoning((4096, 1024), &["minimal", "low", "medium"], "low");
        gpt5_mini.insert("verbosity", choice(&["low", "medium", "high"], "medium"));
        catalog.insert("gpt-5-mini", openai(gpt5_mini));

        let mut gpt5_nano = openai_reasoning((2048, 512), &["minimal", "low"], "minimal");
        gpt5_nano.insert("verbosity", choice(&["low", "medium"], "medium"));
        catalog.insert("gpt-5-nano", openai(gpt5_nano));

        catalog.insert(
            "o3-pro",
            openai(openai_reasoning((8192, 2048), &["low", "medium", "high"], "medium")),
        );
        catalog.insert("o3-mini", openai(openai_reasoning((4096, 1024), &["low", "medium"], "low")));
        catalog.insert(
            "o4-mini",
            openai(openai_reasoning((4096, 1024), &["low", "medium", "high"], "medium")),
        );

        catalog.insert("claude-opus-4-1", anthropic(2048));
        catalog.insert("claude-sonnet-4-5", anthropic(1024));
        catalog.insert("claude-haiku-4-5", anthropic_with_ceiling(4096, 512));

        catalog.insert("gemini-2.5-pro", gemini(0.95, true));
        catalog.insert("gemini-2.5-flash", gemini(0.95, true));
        catalog.insert("gemini-2.5-flash-lite", gemini(0.9, true));
        catalog.insert("gemini-2.5-flash-native-audio", gemini(0.95, false));

        catalog
    }
}

fn int(min: i64, max: i64, default: i64) -> ParamSpec {
    ParamSpec::Int { min, max, default }
}

fn float(low: f64, high: f64, default: f64) -> ParamSpec {
    ParamSpec::Float { range: [low, high], default }
}

fn choice(values: &[&'static str], default: &'static str) -> ParamSpec {
    ParamSpec::Enum { values: values.to_vec(), default }
}

fn openai_reasoning(
    max_tokens: (i64, i64),
    efforts: &[&'static str],
    effort: &'static str,
) -> BTreeMap<&'static str, ParamSpec> {
    let mut params = BTreeMap::new();
    params.insert("max_completion_tokens", int(1, max_tokens.0, max_tokens.1));
    params.insert("reasoning_effort", choice(efforts, effort));
    params
}

fn openai(valid_params: BTreeMap<&'static str, ParamSpec>) -> ModelInfo {
    ModelInfo {
        provider: Provider::OpenAi,
        supports_temperature: false,
        valid_params,
    }
}

fn anthropic(default_max_tokens: i64) -> ModelInfo {
    anthropic_with_ceiling(8192, default_max_tokens)
}

fn anthropic_with_ceiling(max_tokens: i64, default_max_tokens: i64) -> ModelInfo {
    let mut params = BTreeMap::new();
    params.insert(TEMPERATURE, float(0.0, 1.0, 0.5));
    params.insert(TOP_P, float(0.0, 1.0, 0.9));
    params.insert("top_k", int(1, 500, 5));
    params.insert("max_tokens", int(1, max_tokens, default_max_tokens));
    ModelInfo {
        provider: Provider::Anthropic,
        supports_temperature: true,
        valid_params: params,
    }
}

fn gemini(top_p: f64, penalties: bool) -> ModelInfo {
    let mut params = BTreeMap::new();
    params.insert(TEMPERATURE, float(0.0, 2.0, 1.0));
    params.insert(TOP_P, float(0.0, 1.0, top_p));
    params.insert("top_k", int(1, 40, 20));
    params.insert("max_output_tokens", int(1, 8192, 500));
    if penalties {
        params.insert("frequency_penalty", float(-2.0, 2.0, 0.0));
        params.insert("presence_penalty", float(-2.0, 2.0, 0.0));
    }
    ModelInfo {
        provider: Provider::Google,
        supports_temperature: true,
        valid_params: params,
    }
}
