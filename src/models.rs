use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

// ============ Request Models ============

/// Body of `POST /api/analizar`.
#[derive(Debug, Clone, Default, Deserialize, Serialize, ToSchema)]
pub struct AnalyzeRequest {
    /// Lead being analyzed. Required, and must be a JSON object.
    #[serde(default, deserialize_with = "lead_object")]
    pub lead: Option<LeadInput>,
    /// Seller notes: a single note or a list of notes.
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub notas: Option<OneOrMany<NoteEntry>>,
    /// Interaction history, oldest first.
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub interacciones: Option<OneOrMany<InteractionEntry>>,
    /// Scheduled activities.
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub actividades: Option<OneOrMany<ActivityEntry>>,
}

/// Lead contact and pipeline data as sent by the CRM.
///
/// Every field is optional. Numbers and booleans are accepted and kept as text,
/// blank strings count as absent.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, ToSchema)]
pub struct LeadInput {
    #[serde(default, deserialize_with = "lenient_text")]
    pub nombre: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub empresa: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub telefono: Option<String>,
    /// Pipeline stage in the CRM (e.g. "Nuevo", "En negociación").
    #[serde(default, deserialize_with = "lenient_text")]
    pub estado: Option<String>,
    /// Estimated deal value in CLP.
    #[serde(default, deserialize_with = "lenient_amount")]
    #[schema(value_type = Option<f64>)]
    pub valor_estimado: Option<EstimatedValue>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub prioridad: Option<String>,
    /// Temperature the seller assigned manually, used as a hint only.
    #[serde(default, deserialize_with = "lenient_text")]
    pub temperatura: Option<String>,
    /// Acquisition channel (web form, referral, fair...).
    #[serde(default, deserialize_with = "lenient_text")]
    pub origen: Option<String>,
}

/// Estimated value as received: a usable amount or free text we render verbatim.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EstimatedValue {
    Amount(f64),
    Text(String),
}

/// Accepts either a single element or a list of them.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    /// Views the collection as a list for uniform rendering.
    pub fn as_slice(&self) -> &[T] {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => std::slice::from_ref(item),
        }
    }
}

/// A seller note.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum NoteEntry {
    Text(String),
    Structured(NoteRecord),
    /// Anything else the front end sent; rendered as compact JSON.
    Other(Value),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NoteRecord {
    #[serde(alias = "text", alias = "contenido", alias = "nota")]
    pub texto: String,
    #[serde(default)]
    pub fecha: Option<String>,
    #[serde(default)]
    pub autor: Option<String>,
}

/// A past interaction with the lead (call, visit, email...).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum InteractionEntry {
    Text(String),
    Structured(InteractionRecord),
    Other(Value),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct InteractionRecord {
    #[serde(alias = "type")]
    pub tipo: String,
    #[serde(default, alias = "notas", alias = "result")]
    pub resultado: Option<String>,
    #[serde(default)]
    pub fecha: Option<String>,
}

/// A scheduled activity.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ActivityEntry {
    Text(String),
    Structured(ActivityRecord),
    Other(Value),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ActivityRecord {
    #[serde(alias = "titulo", alias = "description")]
    pub descripcion: String,
    #[serde(default, alias = "type")]
    pub tipo: Option<String>,
    #[serde(default)]
    pub fecha: Option<String>,
    #[serde(default)]
    pub estado: Option<String>,
}

fn scalar_to_text(value: Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(scalar_to_text))
}

/// `null` counts as absent; any value other than an object is rejected.
fn lead_object<'de, D>(deserializer: D) -> Result<Option<LeadInput>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None => Ok(None),
        Some(value @ Value::Object(_)) => LeadInput::deserialize(value)
            .map(Some)
            .map_err(serde::de::Error::custom),
        Some(_) => Err(serde::de::Error::custom("lead debe ser un objeto")),
    }
}

fn lenient_amount<'de, D>(deserializer: D) -> Result<Option<EstimatedValue>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_f64().map(EstimatedValue::Amount),
        Some(other) => scalar_to_text(other).map(|text| {
            parse_amount(&text)
                .map(EstimatedValue::Amount)
                .unwrap_or(EstimatedValue::Text(text))
        }),
        None => None,
    })
}

/// Parses "15000000", "15.000.000" or "$15.000.000" as an amount. Chilean
/// formatting uses `.` for thousands, so a dot followed by exactly three
/// digits is treated as a separator.
fn parse_amount(text: &str) -> Option<f64> {
    let cleaned: String = text
        .trim()
        .trim_start_matches('$')
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    let groups: Vec<&str> = cleaned.split('.').collect();
    let grouped = groups.len() > 1
        && groups[1..].iter().all(|g| g.len() == 3)
        && groups.iter().all(|g| !g.is_empty() && g.chars().all(|c| c.is_ascii_digit()));
    if grouped {
        return groups.concat().parse::<f64>().ok();
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

// ============ Response Models ============

/// Body returned by `POST /api/analizar`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AnalyzeResponse {
    pub analisis: AnalysisResult,
}

/// Normalized analysis of a lead. Always fully populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AnalysisResult {
    pub estado_lead: LeadState,
    /// Close probability, 0 to 100.
    pub probabilidad_cierre: u8,
    pub nivel_interes: Level,
    pub riesgo_perdida: Level,
    pub resumen_ejecutivo: String,
    pub senales_positivas: Vec<String>,
    pub senales_negativas: Vec<String>,
    pub objeciones_detectadas: Vec<Objection>,
    pub proximos_pasos: Vec<String>,
    pub recomendaciones: Vec<String>,
    pub plantillas_sugeridas: Vec<MessageTemplate>,
    pub urgencia: Level,
    pub siguiente_accion_recomendada: String,
    pub momento_sugerido: String,
}

pub const DEFAULT_PROBABILITY: u8 = 50;
pub const DEFAULT_SUMMARY: &str = "No fue posible generar un resumen del lead con la información disponible.";
pub const DEFAULT_NEXT_ACTION: &str = "Contactar al lead para confirmar su interés y sus necesidades.";
pub const DEFAULT_TIMING: &str = "Dentro de los próximos 2 a 3 días hábiles.";
pub const DEFAULT_OBJECTION_RESPONSE: &str = "Sin respuesta sugerida.";
pub const NOT_AVAILABLE: &str = "N/D";

impl Default for AnalysisResult {
    fn default() -> Self {
        Self {
            estado_lead: LeadState::default(),
            probabilidad_cierre: DEFAULT_PROBABILITY,
            nivel_interes: Level::default(),
            riesgo_perdida: Level::default(),
            resumen_ejecutivo: DEFAULT_SUMMARY.to_string(),
            senales_positivas: Vec::new(),
            senales_negativas: Vec::new(),
            objeciones_detectadas: Vec::new(),
            proximos_pasos: Vec::new(),
            recomendaciones: Vec::new(),
            plantillas_sugeridas: Vec::new(),
            urgencia: Level::default(),
            siguiente_accion_recomendada: DEFAULT_NEXT_ACTION.to_string(),
            momento_sugerido: DEFAULT_TIMING.to_string(),
        }
    }
}

/// Lead temperature.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum LeadState {
    Caliente,
    Tibio,
    Frio,
    #[default]
    Neutral,
}

impl LeadState {
    /// Matches a model-provided label, ignoring case and accents.
    pub fn from_label(label: &str) -> Option<Self> {
        match fold_label(label).as_str() {
            "CALIENTE" | "HOT" => Some(LeadState::Caliente),
            "TIBIO" | "WARM" => Some(LeadState::Tibio),
            "FRIO" | "COLD" => Some(LeadState::Frio),
            "NEUTRAL" | "NEUTRO" => Some(LeadState::Neutral),
            _ => None,
        }
    }
}

/// High / medium / low scale used by interest, loss risk and urgency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Alto,
    #[default]
    Medio,
    Bajo,
}

impl Level {
    pub fn from_label(label: &str) -> Option<Self> {
        match fold_label(label).as_str() {
            "ALTO" | "ALTA" | "HIGH" => Some(Level::Alto),
            "MEDIO" | "MEDIA" | "MEDIUM" => Some(Level::Medio),
            "BAJO" | "BAJA" | "LOW" => Some(Level::Bajo),
            _ => None,
        }
    }
}

/// Uppercases and strips Spanish accents and surrounding whitespace.
fn fold_label(label: &str) -> String {
    label
        .trim()
        .chars()
        .map(|c| match c {
            'á' | 'Á' => 'A',
            'é' | 'É' => 'E',
            'í' | 'Í' => 'I',
            'ó' | 'Ó' => 'O',
            'ú' | 'Ú' | 'ü' | 'Ü' => 'U',
            other => other.to_ascii_uppercase(),
        })
        .collect()
}

/// An objection detected in the conversation and how to answer it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Objection {
    pub objecion: String,
    pub respuesta_sugerida: String,
}

/// A ready-to-send message suggested for the seller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MessageTemplate {
    /// Channel such as "whatsapp", "email" or "llamada".
    pub canal: String,
    pub nombre: String,
    pub contenido: String,
    pub contexto_uso: String,
}

// ============ Completion API Models ============

/// Chat message sent to the completion API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    #[serde(default)]
    pub message: Option<ChatChoiceMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatCompletionResponse {
    /// Text of the first choice, if any.
    pub fn first_content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.as_ref())
            .and_then(|m| m.content.as_deref())
    }
}
