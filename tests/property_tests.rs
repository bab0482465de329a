/// Property-based tests using proptest
/// Tests invariants of the prompt builder and the response normalizer
use chrono::NaiveDate;
use metcorp_crm_ia::core::models::{AnalyzeRequest, LeadInput};
use metcorp_crm_ia::core::normalizer::{normalize, normalize_with_tier, RecoveryTier};
use metcorp_crm_ia::core::prompt::build_lead_prompt;
use proptest::prelude::*;
use serde_json::json;

const REQUIRED_KEYS: [&str; 14] = [
    "estado_lead",
    "probabilidad_cierre",
    "nivel_interes",
    "riesgo_perdida",
    "resumen_ejecutivo",
    "senales_positivas",
    "senales_negativas",
    "objeciones_detectadas",
    "proximos_pasos",
    "recomendaciones",
    "plantillas_sugeridas",
    "urgencia",
    "siguiente_accion_recomendada",
    "momento_sugerido",
];

fn lead_state_label() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec!["CALIENTE", "TIBIO", "FRIO", "NEUTRAL"])
}

fn level_label() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec!["ALTO", "MEDIO", "BAJO"])
}

// Property: the output contract holds for any text
proptest! {
    #[test]
    fn normalize_always_returns_complete_record(raw in "\\PC*") {
        let result = normalize(&raw);
        prop_assert!(result.probabilidad_cierre <= 100);

        let value = serde_json::to_value(&result).unwrap();
        let object = value.as_object().unwrap();
        prop_assert_eq!(object.len(), REQUIRED_KEYS.len());
        for key in REQUIRED_KEYS {
            prop_assert!(object.contains_key(key), "missing key {}", key);
        }
        prop_assert!(["CALIENTE", "TIBIO", "FRIO", "NEUTRAL"]
            .contains(&object["estado_lead"].as_str().unwrap()));
        for key in ["nivel_interes", "riesgo_perdida", "urgencia"] {
            prop_assert!(["ALTO", "MEDIO", "BAJO"].contains(&object[key].as_str().unwrap()));
        }
        prop_assert!(!result.resumen_ejecutivo.is_empty());
    }

    #[test]
    fn normalize_is_idempotent(raw in "\\PC*") {
        prop_assert_eq!(normalize(&raw), normalize(&raw));
    }

    #[test]
    fn probability_is_clamped(probability in -1000i64..1000i64) {
        let raw = json!({"probabilidad_cierre": probability}).to_string();
        let expected = probability.clamp(0, 100) as u8;
        prop_assert_eq!(normalize(&raw).probabilidad_cierre, expected);
    }
}

// Property: fences and surrounding prose don't change the recovered values
proptest! {
    #[test]
    fn fenced_json_equals_plain_json(
        estado in lead_state_label(),
        urgencia in level_label(),
        probability in 0u8..=100u8,
        summary in "[a-zA-Z][a-zA-Z ]{0,40}",
        lang in prop::sample::select(vec!["", "json", "JSON"]),
    ) {
        let plain = json!({
            "estado_lead": estado,
            "urgencia": urgencia,
            "probabilidad_cierre": probability,
            "resumen_ejecutivo": summary,
        })
        .to_string();
        let fenced = format!("```{}\n{}\n```", lang, plain);

        let (fenced_result, tier) = normalize_with_tier(&fenced);
        prop_assert_eq!(tier, RecoveryTier::Direct);
        prop_assert_eq!(&fenced_result, &normalize(&plain));
        prop_assert_eq!(fenced_result.probabilidad_cierre, probability);
        prop_assert_eq!(fenced_result.resumen_ejecutivo, summary);
    }

    #[test]
    fn embedded_json_is_recovered(
        estado in lead_state_label(),
        probability in 0u8..=100u8,
        prefix in "[a-zA-Z][a-zA-Z ,.:]{0,39}",
        suffix in "[a-zA-Z ,.]{0,40}",
    ) {
        let plain = json!({"estado_lead": estado, "probabilidad_cierre": probability}).to_string();
        let raw = format!("{} {} {}", prefix, plain, suffix);

        let (result, tier) = normalize_with_tier(&raw);
        prop_assert_eq!(tier, RecoveryTier::Extracted);
        prop_assert_eq!(result, normalize(&plain));
    }

    #[test]
    fn brace_free_text_uses_text_fallback(raw in "[a-zA-Z0-9 .,;:!?]{1,400}") {
        let (result, tier) = normalize_with_tier(&raw);
        prop_assert_eq!(tier, RecoveryTier::TextFallback);
        prop_assert!(result.resumen_ejecutivo.chars().count() <= 200);
        prop_assert!(result.senales_positivas.is_empty());
        prop_assert!(result.proximos_pasos.is_empty());
    }
}

// Property: every lead field is rendered, either with its value or a placeholder
proptest! {
    #[test]
    fn prompt_renders_every_lead_field(
        nombre in proptest::option::of("[a-zA-Z]{1,20}"),
        empresa in proptest::option::of("[a-zA-Z]{1,20}"),
        email in proptest::option::of("[a-z]{1,10}@[a-z]{1,10}\\.cl"),
        telefono in proptest::option::of("\\+569[0-9]{8}"),
        estado in proptest::option::of("[a-zA-Z]{1,15}"),
        prioridad in proptest::option::of("[a-zA-Z]{1,10}"),
        temperatura in proptest::option::of("[a-zA-Z]{1,10}"),
        origen in proptest::option::of("[a-zA-Z]{1,15}"),
    ) {
        let lead = LeadInput {
            nombre: nombre.clone(),
            empresa: empresa.clone(),
            email: email.clone(),
            telefono: telefono.clone(),
            estado: estado.clone(),
            valor_estimado: None,
            prioridad: prioridad.clone(),
            temperatura: temperatura.clone(),
            origen: origen.clone(),
        };
        let request = AnalyzeRequest {
            lead: Some(lead),
            ..Default::default()
        };
        let today = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let prompt = build_lead_prompt(&request, today).unwrap();

        for (label, value) in [
            ("Nombre", nombre),
            ("Empresa", empresa),
            ("Email", email),
            ("Teléfono", telefono),
            ("Estado en CRM", estado),
            ("Prioridad", prioridad),
            ("Temperatura asignada por el vendedor", temperatura),
            ("Origen", origen),
        ] {
            let expected = format!("- {}: {}\n", label, value.as_deref().unwrap_or("N/D"));
            prop_assert!(prompt.user.contains(&expected), "missing line {:?}", expected);
        }
        prop_assert!(prompt.user.contains("- Valor estimado: N/D\n"));
    }
}
