//! Normalization of untrusted completion text into an [`AnalysisResult`].
//!
//! The model is asked for bare JSON but regularly answers with markdown fences,
//! prose around the object, or plain text. Recovery runs as a ladder:
//!
//! 1. strip code fences and parse the remainder as a JSON object
//! 2. parse the substring between the first `{` and the last `}` of the raw text
//! 3. keep the first [`SUMMARY_FALLBACK_CHARS`] characters of the text as the summary
//!
//! Whatever tier succeeds, [`complete_schema`] then fills every missing or
//! mistyped field with its default, so callers always get the same shape.

use crate::models::{
    AnalysisResult, LeadState, Level, MessageTemplate, Objection, DEFAULT_NEXT_ACTION,
    DEFAULT_OBJECTION_RESPONSE, DEFAULT_PROBABILITY, DEFAULT_SUMMARY, DEFAULT_TIMING,
    NOT_AVAILABLE,
};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

/// Characters of raw text kept as the executive summary when no JSON is found.
pub const SUMMARY_FALLBACK_CHARS: usize = 200;

/// Which step of the ladder produced the object that was completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryTier {
    /// The text (after fence stripping) was a JSON object.
    Direct,
    /// A JSON object was found embedded in surrounding text.
    Extracted,
    /// No JSON object could be recovered; the text became the summary.
    TextFallback,
}

impl RecoveryTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryTier::Direct => "direct",
            RecoveryTier::Extracted => "extracted",
            RecoveryTier::TextFallback => "text_fallback",
        }
    }
}

/// Normalizes raw model output. Never fails.
pub fn normalize(raw: &str) -> AnalysisResult {
    normalize_with_tier(raw).0
}

/// Same as [`normalize`], also reporting which tier recovered the data.
pub fn normalize_with_tier(raw: &str) -> (AnalysisResult, RecoveryTier) {
    let (object, tier) = recover_object(raw);
    (complete_schema(&object), tier)
}

/// Runs the recovery ladder and returns the best JSON object available.
pub fn recover_object(raw: &str) -> (Map<String, Value>, RecoveryTier) {
    if let Some(object) = parse_object(&strip_code_fences(raw)) {
        return (object, RecoveryTier::Direct);
    }

    if let Some(object) = extract_braced(raw).and_then(parse_object) {
        return (object, RecoveryTier::Extracted);
    }

    (text_fallback(raw), RecoveryTier::TextFallback)
}

fn fence_open() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^```[ \t]*[A-Za-z0-9_+\-]*").expect("valid fence pattern"))
}

fn fence_close() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"```\s*$").expect("valid fence pattern"))
}

/// Removes a leading ```` ```lang ```` fence, a trailing ```` ``` ```` fence and
/// surrounding whitespace.
pub fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_open = fence_open().replace(trimmed, "");
    let without_close = fence_close().replace(without_open.trim_end(), "");
    without_close.trim().to_string()
}

/// Parses `text` as a JSON object. Arrays, scalars and invalid JSON yield `None`.
///
/// A lone `{"analisis": {...}}` wrapper is unwrapped, since models sometimes
/// echo the response envelope.
pub fn parse_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text).ok()? {
        Value::Object(mut object) => {
            if object.len() == 1 {
                if let Some(Value::Object(inner)) = object.remove("analisis") {
                    return Some(inner);
                }
            }
            Some(object)
        }
        _ => None,
    }
}

/// Returns the greedy `{ ... }` span of `raw`: first opening brace to last closing brace.
pub fn extract_braced(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end > start {
        Some(&raw[start..=end])
    } else {
        None
    }
}

/// Minimal object for text that holds no recoverable JSON.
pub fn text_fallback(raw: &str) -> Map<String, Value> {
    let mut object = Map::new();
    let summary: String = raw.trim().chars().take(SUMMARY_FALLBACK_CHARS).collect();
    if !summary.trim().is_empty() {
        object.insert(
            "resumen_ejecutivo".to_string(),
            Value::String(summary.trim().to_string()),
        );
    }
    object
}

/// Fills every field of the result from `object`, using the default whenever the
/// value is missing or not of the expected type.
pub fn complete_schema(object: &Map<String, Value>) -> AnalysisResult {
    let get = |keys: &[&str]| lookup(object, keys);

    AnalysisResult {
        estado_lead: get(&["estado_lead", "clasificacion"])
            .and_then(Value::as_str)
            .and_then(LeadState::from_label)
            .unwrap_or_default(),
        probabilidad_cierre: get(&["probabilidad_cierre"])
            .and_then(probability)
            .unwrap_or(DEFAULT_PROBABILITY),
        nivel_interes: level(get(&["nivel_interes"])),
        riesgo_perdida: level(get(&["riesgo_perdida"])),
        resumen_ejecutivo: text(get(&["resumen_ejecutivo"]), DEFAULT_SUMMARY),
        senales_positivas: string_list(get(&["senales_positivas", "señales_positivas"])),
        senales_negativas: string_list(get(&["senales_negativas", "señales_negativas"])),
        objeciones_detectadas: objections(get(&["objeciones_detectadas"])),
        proximos_pasos: string_list(get(&["proximos_pasos"])),
        recomendaciones: string_list(get(&["recomendaciones", "recomendaciones_estrategicas"])),
        plantillas_sugeridas: templates(get(&["plantillas_sugeridas"])),
        urgencia: level(get(&["urgencia"])),
        siguiente_accion_recomendada: text(
            get(&["siguiente_accion_recomendada"]),
            DEFAULT_NEXT_ACTION,
        ),
        momento_sugerido: text(get(&["momento_sugerido"]), DEFAULT_TIMING),
    }
}

/// First non-null value among `keys`, canonical key first.
fn lookup<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| object.get(*k))
        .find(|v| !v.is_null())
}

fn level(value: Option<&Value>) -> Level {
    value
        .and_then(Value::as_str)
        .and_then(Level::from_label)
        .unwrap_or_default()
}

fn probability(value: &Value) -> Option<u8> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !number.is_finite() {
        return None;
    }
    Some(number.round().clamp(0.0, 100.0) as u8)
}

/// Any JSON string, kept exactly as received.
fn string_value(value: &Value) -> Option<String> {
    value.as_str().map(str::to_string)
}

fn text(value: Option<&Value>, default: &str) -> String {
    value
        .and_then(string_value)
        .unwrap_or_else(|| default.to_string())
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        })
        .collect()
}

fn objections(value: Option<&Value>) -> Vec<Objection> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(objecion) => Some(Objection {
                objecion: objecion.clone(),
                respuesta_sugerida: DEFAULT_OBJECTION_RESPONSE.to_string(),
            }),
            Value::Object(obj) => {
                let objecion = lookup(obj, &["objecion", "objeción"]).and_then(string_value)?;
                Some(Objection {
                    objecion,
                    respuesta_sugerida: text(
                        lookup(obj, &["respuesta_sugerida", "respuesta"]),
                        DEFAULT_OBJECTION_RESPONSE,
                    ),
                })
            }
            _ => None,
        })
        .collect()
}

fn templates(value: Option<&Value>) -> Vec<MessageTemplate> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|obj| {
            let contenido = lookup(obj, &["contenido"]).and_then(string_value)?;
            Some(MessageTemplate {
                canal: text(lookup(obj, &["canal"]), NOT_AVAILABLE),
                nombre: text(lookup(obj, &["nombre"]), NOT_AVAILABLE),
                contenido,
                contexto_uso: text(lookup(obj, &["contexto_uso"]), NOT_AVAILABLE),
            })
        })
        .collect()
}
