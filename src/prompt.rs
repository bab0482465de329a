//! Prompt construction for lead analysis.
//!
//! Turns the CRM payload into the lead-information block, the user prompt with
//! the exact JSON schema the model must answer with, and the fixed system
//! instruction. Everything here is a pure text transformation.

use crate::errors::AppError;
use crate::models::{
    ActivityEntry, AnalyzeRequest, ChatMessage, EstimatedValue, InteractionEntry, LeadInput,
    NoteEntry, OneOrMany, NOT_AVAILABLE,
};
use chrono::NaiveDate;
use serde_json::Value;

/// Sent as its own `system` message ahead of the user prompt.
pub const SYSTEM_INSTRUCTION: &str = "Eres un analista comercial senior experto en ventas B2C y B2B \
de paneles SIP para Metcorp. Respondes SIEMPRE con un único objeto JSON válido, sin bloques de \
código markdown, sin texto antes ni después del JSON y usando exactamente los nombres de campo pedidos.";

pub const NO_NOTES: &str = "Sin notas registradas.";
pub const NO_INTERACTIONS: &str = "Sin interacciones registradas.";
pub const NO_ACTIVITIES: &str = "Sin actividades registradas.";

const RESPONSE_SCHEMA: &str = r#"{
  "estado_lead": "CALIENTE" | "TIBIO" | "FRIO" | "NEUTRAL",
  "probabilidad_cierre": número entero entre 0 y 100,
  "nivel_interes": "ALTO" | "MEDIO" | "BAJO",
  "riesgo_perdida": "ALTO" | "MEDIO" | "BAJO",
  "resumen_ejecutivo": "texto corto (máximo 3 frases)",
  "senales_positivas": ["texto", "..."],
  "senales_negativas": ["texto", "..."],
  "objeciones_detectadas": [
    { "objecion": "texto", "respuesta_sugerida": "texto" }
  ],
  "proximos_pasos": ["texto", "..."],
  "recomendaciones": ["texto", "..."],
  "plantillas_sugeridas": [
    { "canal": "whatsapp" | "email" | "llamada", "nombre": "texto", "contenido": "texto", "contexto_uso": "texto" }
  ],
  "urgencia": "ALTO" | "MEDIO" | "BAJO",
  "siguiente_accion_recomendada": "texto",
  "momento_sugerido": "texto"
}"#;

/// System and user messages for one analysis request.
#[derive(Debug, Clone, PartialEq)]
pub struct LeadPrompt {
    pub system: String,
    pub user: String,
}

impl LeadPrompt {
    pub fn into_messages(self) -> Vec<ChatMessage> {
        vec![ChatMessage::system(self.system), ChatMessage::user(self.user)]
    }
}

/// Builds the prompt for a request, failing only when the lead itself is missing.
pub fn build_lead_prompt(request: &AnalyzeRequest, today: NaiveDate) -> Result<LeadPrompt, AppError> {
    let lead = request
        .lead
        .as_ref()
        .ok_or_else(|| AppError::BadRequest("Faltan datos del lead".to_string()))?;

    let info = render_lead_info(
        lead,
        request.notas.as_ref(),
        request.interacciones.as_ref(),
        request.actividades.as_ref(),
    );

    Ok(LeadPrompt {
        system: SYSTEM_INSTRUCTION.to_string(),
        user: build_user_prompt(&info, today),
    })
}

/// Renders the lead, notes, interactions and activities as a plain text block.
pub fn render_lead_info(
    lead: &LeadInput,
    notas: Option<&OneOrMany<NoteEntry>>,
    interacciones: Option<&OneOrMany<InteractionEntry>>,
    actividades: Option<&OneOrMany<ActivityEntry>>,
) -> String {
    let valor = lead
        .valor_estimado
        .as_ref()
        .map(render_estimated_value)
        .unwrap_or_else(|| NOT_AVAILABLE.to_string());

    let mut out = String::from("LEAD:\n");
    for (label, value) in [
        ("Nombre", field(&lead.nombre)),
        ("Empresa", field(&lead.empresa)),
        ("Email", field(&lead.email)),
        ("Teléfono", field(&lead.telefono)),
        ("Estado en CRM", field(&lead.estado)),
        ("Valor estimado", valor.as_str()),
        ("Prioridad", field(&lead.prioridad)),
        ("Temperatura asignada por el vendedor", field(&lead.temperatura)),
        ("Origen", field(&lead.origen)),
    ] {
        out.push_str(&format!("- {}: {}\n", label, value));
    }

    out.push_str("\nNOTAS DEL VENDEDOR:\n");
    out.push_str(&render_notes(notas));
    out.push_str("\n\nINTERACCIONES:\n");
    out.push_str(&render_numbered(interacciones, NO_INTERACTIONS));
    out.push_str("\n\nACTIVIDADES PROGRAMADAS:\n");
    out.push_str(&render_numbered(actividades, NO_ACTIVITIES));
    out.push('\n');
    out
}

/// Wraps the lead block with the role, the response schema and the formatting rules.
pub fn build_user_prompt(lead_info: &str, today: NaiveDate) -> String {
    format!(
        "Eres un analista comercial senior de Metcorp Panel SIP.\n\
Analiza la información del lead y responde ÚNICAMENTE con JSON válido con esta estructura EXACTA:\n\n\
{schema}\n\n\
Reglas:\n\
- Responde solo con el objeto JSON, sin bloques ``` ni texto adicional.\n\
- Usa exactamente los nombres de campo indicados, sin agregar ni omitir campos.\n\
- Si no hay información suficiente para un campo de lista, usa una lista vacía.\n\
- \"momento_sugerido\" debe ser concreto considerando que hoy es {today}.\n\n\
Información del lead:\n\
{info}",
        schema = RESPONSE_SCHEMA,
        today = today.format("%Y-%m-%d"),
        info = lead_info,
    )
}

fn field(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or(NOT_AVAILABLE)
}

fn render_estimated_value(value: &EstimatedValue) -> String {
    match value {
        EstimatedValue::Amount(amount) => format_clp(*amount),
        EstimatedValue::Text(text) => text.clone(),
    }
}

/// Formats an amount as Chilean pesos: `15000000.0` becomes `15.000.000 CLP`.
pub fn format_clp(amount: f64) -> String {
    let rounded = amount.round();
    let digits = format!("{}", rounded.abs() as u64);
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }
    let sign = if rounded < 0.0 { "-" } else { "" };
    format!("{}{} CLP", sign, grouped)
}

/// One collection element rendered as a single line of the prompt.
trait RenderEntry {
    fn render(&self) -> String;
}

impl RenderEntry for NoteEntry {
    fn render(&self) -> String {
        match self {
            NoteEntry::Text(text) => text.trim().to_string(),
            NoteEntry::Structured(note) => {
                let mut line = String::new();
                if let Some(fecha) = non_blank(&note.fecha) {
                    line.push_str(&format!("[{}] ", fecha));
                }
                if let Some(autor) = non_blank(&note.autor) {
                    line.push_str(&format!("({}) ", autor));
                }
                line.push_str(note.texto.trim());
                line
            }
            NoteEntry::Other(value) => render_other(value),
        }
    }
}

impl RenderEntry for InteractionEntry {
    fn render(&self) -> String {
        match self {
            InteractionEntry::Text(text) => text.trim().to_string(),
            InteractionEntry::Structured(interaction) => {
                let mut line = String::new();
                if let Some(fecha) = non_blank(&interaction.fecha) {
                    line.push_str(&format!("[{}] ", fecha));
                }
                line.push_str(interaction.tipo.trim());
                line.push_str(": ");
                line.push_str(non_blank(&interaction.resultado).unwrap_or("sin resultado registrado"));
                line
            }
            InteractionEntry::Other(value) => render_other(value),
        }
    }
}

impl RenderEntry for ActivityEntry {
    fn render(&self) -> String {
        match self {
            ActivityEntry::Text(text) => text.trim().to_string(),
            ActivityEntry::Structured(activity) => {
                let mut line = String::new();
                if let Some(fecha) = non_blank(&activity.fecha) {
                    line.push_str(&format!("[{}] ", fecha));
                }
                if let Some(tipo) = non_blank(&activity.tipo) {
                    line.push_str(&format!("{}: ", tipo));
                }
                line.push_str(activity.descripcion.trim());
                if let Some(estado) = non_blank(&activity.estado) {
                    line.push_str(&format!(" (estado: {})", estado));
                }
                line
            }
            ActivityEntry::Other(value) => render_other(value),
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn render_other(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn rendered_lines<T: RenderEntry>(items: Option<&OneOrMany<T>>) -> Vec<String> {
    items
        .map(|c| c.as_slice())
        .unwrap_or_default()
        .iter()
        .map(RenderEntry::render)
        .filter(|line| !line.is_empty())
        .collect()
}

fn render_notes(notas: Option<&OneOrMany<NoteEntry>>) -> String {
    let lines = rendered_lines(notas);
    if lines.is_empty() {
        NO_NOTES.to_string()
    } else {
        lines.join("\n")
    }
}

fn render_numbered<T: RenderEntry>(items: Option<&OneOrMany<T>>, empty: &str) -> String {
    let lines = rendered_lines(items);
    if lines.is_empty() {
        return empty.to_string();
    }
    lines
        .iter()
        .enumerate()
        .map(|(idx, line)| format!(" {}. {}", idx + 1, line))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 2).unwrap()
    }

    fn request(body: serde_json::Value) -> AnalyzeRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_missing_lead_is_rejected() {
        let req = request(json!({"notas": "algo"}));
        let err = build_lead_prompt(&req, today()).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn test_absent_fields_render_placeholder() {
        let req = request(json!({"lead": {"nombre": "Ana"}}));
        let prompt = build_lead_prompt(&req, today()).unwrap();

        assert!(prompt.user.contains("- Nombre: Ana"));
        assert!(prompt.user.contains("- Empresa: N/D"));
        assert!(prompt.user.contains("- Email: N/D"));
        assert!(prompt.user.contains("- Valor estimado: N/D"));
        assert!(prompt.user.contains(NO_NOTES));
        assert!(prompt.user.contains(NO_INTERACTIONS));
        assert!(prompt.user.contains(NO_ACTIVITIES));
    }

    #[test]
    fn test_system_instruction_is_separate_message() {
        let req = request(json!({"lead": {}}));
        let messages = build_lead_prompt(&req, today()).unwrap().into_messages();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[0].content, SYSTEM_INSTRUCTION);
        assert_eq!(messages[1].role, "user");
        assert!(!messages[1].content.contains(SYSTEM_INSTRUCTION));
    }

    #[test]
    fn test_prompt_embeds_schema_and_rules() {
        let req = request(json!({"lead": {}}));
        let prompt = build_lead_prompt(&req, today()).unwrap();

        for key in [
            "estado_lead",
            "probabilidad_cierre",
            "objeciones_detectadas",
            "plantillas_sugeridas",
            "momento_sugerido",
        ] {
            assert!(prompt.user.contains(key), "schema key {} missing", key);
        }
        assert!(prompt.user.contains("sin bloques"));
        assert!(prompt.user.contains("2024-05-02"));
    }

    #[test]
    fn test_collections_render_as_numbered_lists() {
        let req = request(json!({
            "lead": {"nombre": "Ana"},
            "notas": ["primera nota", {"texto": "segunda", "fecha": "2024-04-30", "autor": "Luis"}],
            "interacciones": [
                "Llamada inicial",
                {"tipo": "Visita", "resultado": "Pidió cotización", "fecha": "2024-04-28"}
            ],
            "actividades": {"titulo": "Enviar cotización", "tipo": "email", "estado": "pendiente"}
        }));
        let prompt = build_lead_prompt(&req, today()).unwrap();

        assert!(prompt.user.contains("primera nota\n[2024-04-30] (Luis) segunda"));
        assert!(prompt.user.contains(" 1. Llamada inicial\n 2. [2024-04-28] Visita: Pidió cotización"));
        assert!(prompt.user.contains(" 1. email: Enviar cotización (estado: pendiente)"));
    }

    #[test]
    fn test_empty_collections_use_fixed_sentence() {
        let req = request(json!({
            "lead": {},
            "notas": [],
            "interacciones": ["  "],
            "actividades": [null]
        }));
        let prompt = build_lead_prompt(&req, today()).unwrap();

        assert!(prompt.user.contains(NO_NOTES));
        assert!(prompt.user.contains(NO_INTERACTIONS));
        assert!(prompt.user.contains(NO_ACTIVITIES));
    }

    #[test]
    fn test_unknown_shapes_render_as_json() {
        let req = request(json!({
            "lead": {},
            "interacciones": [{"canal": "web"}]
        }));
        let prompt = build_lead_prompt(&req, today()).unwrap();
        assert!(prompt.user.contains(r#" 1. {"canal":"web"}"#));
    }

    #[test]
    fn test_format_clp() {
        assert_eq!(format_clp(15_000_000.0), "15.000.000 CLP");
        assert_eq!(format_clp(999.0), "999 CLP");
        assert_eq!(format_clp(1000.4), "1.000 CLP");
        assert_eq!(format_clp(0.0), "0 CLP");
        assert_eq!(format_clp(-2500.0), "-2.500 CLP");
    }

    #[test]
    fn test_estimated_value_rendering() {
        let req = request(json!({"lead": {"valor_estimado": 4500000}}));
        let prompt = build_lead_prompt(&req, today()).unwrap();
        assert!(prompt.user.contains("- Valor estimado: 4.500.000 CLP"));

        let req = request(json!({"lead": {"valor_estimado": "a convenir"}}));
        let prompt = build_lead_prompt(&req, today()).unwrap();
        assert!(prompt.user.contains("- Valor estimado: a convenir"));
    }
}
