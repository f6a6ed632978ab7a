// Prompt construction for the financial assistant and the AI analysis.
//
// Every figure in a prompt is computed beforehand and rendered with the same
// CLP formatting the UI uses, so the model can quote numbers verbatim instead
// of doing arithmetic. Output is deterministic for a given context.

use finanzas_core::context::{ContextReport, FinancialContext};
use finanzas_core::format::{format_clp, format_percent};
use finanzas_core::model::TransactionKind;
use finanzas_core::stats::Statistics;

// ---------------------------------------------------------------------------
// Fixed texts
// ---------------------------------------------------------------------------

/// First message shown in a fresh conversation.
pub const WELCOME_MESSAGE: &str = "¡Hola! 👋 Soy tu asistente financiero personal. Puedo ayudarte a analizar tus finanzas, dar consejos de ahorro y responder preguntas sobre tu situación financiera.\n\n¿En qué puedo ayudarte hoy?";

/// Shown in the conversation when a turn fails.
pub const CHAT_ERROR_MESSAGE: &str = "Lo siento, hubo un error al procesar tu consulta. Por favor, verifica tu configuración de OpenAI e intenta de nuevo.";

/// Reply the model must give to off-topic questions.
pub const OFF_TOPIC_REPLY: &str = "Lo siento, soy un asistente financiero especializado y solo puedo ayudarte con temas de finanzas, economía y el uso de esta aplicación. ¿En qué puedo ayudarte con tus finanzas personales?";

/// One-click questions offered under the chat input: (label, question).
pub const QUICK_PROMPTS: [(&str, &str); 3] = [
    ("💰 Consejos de ahorro", "¿Cómo puedo ahorrar más dinero?"),
    ("📊 Análisis de gastos", "Analiza mis gastos del último mes"),
    ("📈 Estado financiero", "¿Cómo está mi situación financiera?"),
];

/// Prefix used when a suggestion is sent as a question.
pub const SUGGESTION_PREFIX: &str = "Explícame: ";

pub const ANALYSIS_SYSTEM_PROMPT: &str = "Eres un asesor financiero experto que analiza datos financieros personales y proporciona consejos prácticos y específicos en español.";

/// Categories listed in the assistant prompt.
pub const TOP_CATEGORY_COUNT: usize = 5;

/// Recent transactions listed in the assistant prompt.
pub const RECENT_TRANSACTION_COUNT: usize = 10;

// ---------------------------------------------------------------------------
// Assistant system prompt
// ---------------------------------------------------------------------------

/// Build the system prompt for an assistant chat turn.
pub fn assistant_system_prompt(ctx: &FinancialContext, report: &ContextReport) -> String {
    let history = ctx.historical_totals();
    let month_expenses = format_clp(ctx.monthly_expenses);
    let avg_expenses = format_clp(ctx.avg_monthly_expenses);
    let total_expenses = format_clp(history.expenses);

    let mut p = String::with_capacity(6144);

    p.push_str(
        "Eres un asistente financiero personal especializado EXCLUSIVAMENTE en ayudar con finanzas personales, economía y el uso de esta aplicación financiera.\n\n",
    );

    p.push_str("🚫 RESTRICCIONES IMPORTANTES:\n");
    p.push_str("- SOLO puedes hablar de temas relacionados con FINANZAS, ECONOMÍA y USO DE LA APLICACIÓN\n");
    p.push_str(&format!(
        "- Si el usuario pregunta sobre historia, deportes, entretenimiento, política, ciencia, tecnología general, o cualquier tema NO financiero, debes responder: \"{OFF_TOPIC_REPLY}\"\n"
    ));
    p.push_str("- NUNCA cambies de tema fuera del ámbito financiero\n");
    p.push_str("- SIEMPRE redirige la conversación hacia finanzas personales\n\n");

    p.push_str("CONTEXTO FINANCIERO DEL USUARIO:\n");
    p.push_str(&format!("- Balance actual: {}\n", format_clp(ctx.balance)));
    p.push_str(&format!(
        "- Total de transacciones registradas: {}\n\n",
        ctx.transaction_count
    ));

    p.push_str("RESUMEN DE GASTOS E INGRESOS:\n");
    p.push_str(&format!("- Gastos del mes actual: {month_expenses}\n"));
    p.push_str(&format!(
        "- Ingresos del mes actual: {}\n",
        format_clp(ctx.monthly_income)
    ));
    p.push_str(&format!(
        "- Promedio gastos últimos {} meses: {avg_expenses}\n",
        ctx.average_months
    ));
    p.push_str(&format!(
        "- Promedio ingresos últimos {} meses: {}\n",
        ctx.average_months,
        format_clp(ctx.avg_monthly_income)
    ));
    p.push_str(&format!("- TOTAL HISTÓRICO de gastos: {total_expenses}\n"));
    p.push_str(&format!(
        "- TOTAL HISTÓRICO de ingresos: {}\n\n",
        format_clp(history.income)
    ));

    p.push_str("METAS DE AHORRO:\n");
    p.push_str(&format!(
        "- Metas registradas: {} (activas: {})\n\n",
        ctx.goals.len(),
        ctx.active_goals_count
    ));

    p.push_str("CATEGORÍAS MÁS UTILIZADAS:\n");
    for cat in ctx.top_categories(TOP_CATEGORY_COUNT) {
        p.push_str(&format!(
            "- {} ({}): {} ({} transacciones)\n",
            cat.name,
            cat.kind.label().to_lowercase(),
            format_clp(cat.total),
            cat.count
        ));
    }
    p.push('\n');

    p.push_str(&format!(
        "TRANSACCIONES RECIENTES (últimas {RECENT_TRANSACTION_COUNT}):\n"
    ));
    for tx in ctx.recent_transactions(RECENT_TRANSACTION_COUNT) {
        p.push_str(&format!(
            "- {}{} - {} ({})\n",
            tx.kind.symbol(),
            format_clp(tx.amount),
            tx.category,
            tx.description_or_default()
        ));
    }

    if let Some(warning) = &report.warning {
        p.push_str(&format!("\n⚠️ ADVERTENCIA: {warning}\n"));
    }
    if !report.inconsistencies.is_empty() {
        p.push_str("\n🔍 INCONSISTENCIAS DETECTADAS:\n");
        for inc in &report.inconsistencies {
            p.push_str(&format!("- {inc}\n"));
        }
    }

    p.push_str("\nREGLAS CRÍTICAS PARA EVITAR ERRORES:\n");
    p.push_str("1. 🎯 NUNCA des cifras sin especificar el período exacto\n");
    p.push_str("2. 📊 Cuando el usuario pregunte \"gasto total\", SIEMPRE pregunta qué período específico quiere:\n");
    p.push_str(&format!("   - Gastos del mes actual: {month_expenses}\n"));
    p.push_str(&format!(
        "   - Promedio mensual ({} meses): {avg_expenses}\n",
        ctx.average_months
    ));
    p.push_str(&format!("   - Total histórico: {total_expenses}\n"));
    p.push_str("   - ¿O se refiere a otro período específico?\n");
    p.push_str("3. 🔍 SIEMPRE verifica que los números que menciones coincidan exactamente con los datos proporcionados\n");
    p.push_str("4. ⚡ Si hay discrepancias en los datos, menciona que requieren verificación\n");
    p.push_str("5. 📝 Antes de responder con cifras, revisa dos veces que sean correctas\n");
    p.push_str("6. 🚫 NUNCA inventes o calcules cifras que no estén en el contexto\n");
    p.push_str("7. ✅ Si no estás seguro de un cálculo, pide aclaración al usuario\n");
    p.push_str("8. 🚫 NUNCA hables de temas que NO sean finanzas, economía o uso de la aplicación\n\n");

    p.push_str("INSTRUCCIONES ADICIONALES:\n");
    for line in [
        "Responde en español de manera amigable y profesional",
        "Usa emojis ocasionalmente para hacer la conversación más amigable",
        "Proporciona consejos prácticos basados en datos reales",
        "Sé conversacional pero siempre preciso con los números",
        "Si detectas inconsistencias, sugiere verificar los datos",
        "Mantén las respuestas concisas pero informativas",
        "Siempre enfócate en educación financiera y mejores prácticas",
        "REDIRIGE cualquier tema no financiero hacia finanzas personales",
    ] {
        p.push_str(&format!("- {line}\n"));
    }
    p.push('\n');

    p.push_str("TEMAS PERMITIDOS ÚNICAMENTE:\n");
    for topic in [
        "Análisis de gastos e ingresos (especificando períodos exactos)",
        "Recomendaciones de ahorro",
        "Planificación de presupuesto",
        "Identificación de patrones de gasto",
        "Consejos para alcanzar metas financieras",
        "Explicación de conceptos financieros y económicos",
        "Aclaración de diferencias entre datos mensuales vs. históricos",
        "Uso y funcionalidades de la aplicación financiera",
        "Inversiones y productos financieros",
        "Educación financiera",
        "Economía personal y familiar",
    ] {
        p.push_str(&format!("- {topic}\n"));
    }
    p.push('\n');

    p.push_str("Recuerda: NUNCA comprometas la precisión de los datos financieros y NUNCA salgas del ámbito financiero/económico.");

    p
}

// ---------------------------------------------------------------------------
// AI analysis prompt
// ---------------------------------------------------------------------------

/// Build the user message for the one-shot AI analysis.
pub fn analysis_prompt(balance: f64, stats: &Statistics) -> String {
    let by_category =
        serde_json::to_string(&stats.expenses_by_category).unwrap_or_else(|_| "{}".into());
    let monthly = serde_json::to_string(&stats.monthly_map()).unwrap_or_else(|_| "{}".into());

    let mut p = String::with_capacity(2048);
    p.push_str("Analiza los siguientes datos financieros de esta aplicación y proporciona:\n");
    p.push_str("1. Un análisis detallado de la situación financiera actual basado en los datos registrados\n");
    p.push_str("2. 3-5 sugerencias específicas para mejorar las finanzas usando las funcionalidades de la aplicación\n");
    p.push_str("3. 2-3 objetivos de ahorro realistas que se puedan gestionar con las metas de la aplicación\n");
    p.push_str("4. Identificación de patrones de gasto problemáticos visibles en las categorías registradas\n");
    p.push_str("5. Recomendaciones para optimizar el presupuesto aprovechando las estadísticas disponibles\n\n");

    p.push_str("Datos financieros registrados en la aplicación:\n");
    p.push_str(&format!("- Balance actual: {}\n", format_clp(balance)));
    p.push_str(&format!(
        "- Ingresos totales: {}\n",
        format_clp(stats.total_income)
    ));
    p.push_str(&format!(
        "- Gastos totales: {}\n",
        format_clp(stats.total_expenses)
    ));
    p.push_str(&format!(
        "- Tasa de ahorro: {}\n",
        format_percent(stats.savings_rate)
    ));
    p.push_str(&format!(
        "- Gastos desde último salario: {}\n",
        format_clp(stats.expenses_since_salary)
    ));
    p.push_str(&format!(
        "- Distribución de gastos por categoría: {by_category}\n"
    ));
    p.push_str(&format!("- Datos mensuales: {monthly}\n\n"));

    p.push_str("Enfócate únicamente en cómo usar mejor esta aplicación de finanzas para mejorar el control financiero. No sugieras herramientas externas.");
    p
}

// ---------------------------------------------------------------------------
// Suggestions
// ---------------------------------------------------------------------------

/// Short observations offered as conversation starters.
pub fn suggestions(ctx: &FinancialContext) -> Vec<String> {
    let mut out = Vec::new();

    if ctx.monthly_income > ctx.monthly_expenses {
        out.push(format!(
            "💰 Podrías ahorrar {} mensuales",
            format_clp(ctx.monthly_income - ctx.monthly_expenses)
        ));
    }

    let largest_expense = ctx
        .top_categories(usize::MAX)
        .into_iter()
        .find(|c| c.kind == TransactionKind::Expense);
    if let Some(cat) = largest_expense {
        out.push(format!("📊 Tu mayor gasto es en {}", cat.name));
    }

    if ctx.balance < ctx.monthly_expenses {
        out.push("⚠️ Tu balance es menor a tus gastos mensuales".to_string());
    }

    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use finanzas_core::context::{ContextSettings, FinancialSnapshot};
    use finanzas_core::model::Transaction;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    fn tx(kind: TransactionKind, amount: f64, category: &str, date: &str, desc: Option<&str>) -> Transaction {
        Transaction {
            id: format!("{category}-{date}"),
            user_id: Some("u-1".into()),
            kind,
            amount,
            category: category.into(),
            description: desc.map(str::to_string),
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").ok(),
            created_at: None,
        }
    }

    fn context(transactions: Vec<Transaction>, balance: Option<f64>) -> FinancialContext {
        FinancialContext::build(
            FinancialSnapshot {
                user_id: "u-1".into(),
                transactions,
                stored_balance: balance,
                goals: vec![],
                custom_categories: vec![],
            },
            today(),
            &ContextSettings::default(),
        )
    }

    fn sample() -> FinancialContext {
        use TransactionKind::*;
        context(
            vec![
                tx(Income, 900_000.0, "Salario", "2026-10-01", Some("Sueldo octubre")),
                tx(Expense, 45_500.0, "Alimentación", "2026-10-03", Some("Supermercado")),
                tx(Expense, 12_000.0, "Transporte", "2026-10-07", None),
                tx(Expense, 30_000.0, "Alimentación", "2026-09-14", None),
            ],
            Some(1_234_567.0),
        )
    }

    #[test]
    fn system_prompt_embeds_computed_figures() {
        let ctx = sample();
        let p = assistant_system_prompt(&ctx, &ContextReport::default());
        assert!(p.contains("- Balance actual: $1.234.567\n"));
        assert!(p.contains("- Total de transacciones registradas: 4\n"));
        assert!(p.contains("- Gastos del mes actual: $57.500\n"));
        assert!(p.contains("- Ingresos del mes actual: $900.000\n"));
        // 87_500 / 3
        assert!(p.contains("- Promedio gastos últimos 3 meses: $29.167\n"));
        assert!(p.contains("- Promedio ingresos últimos 3 meses: $300.000\n"));
        assert!(p.contains("- TOTAL HISTÓRICO de gastos: $87.500\n"));
        assert!(p.contains("- TOTAL HISTÓRICO de ingresos: $900.000\n"));
        assert!(p.contains("   - Total histórico: $87.500\n"));
    }

    #[test]
    fn system_prompt_lists_categories_and_recent() {
        let p = assistant_system_prompt(&sample(), &ContextReport::default());
        assert!(p.contains("- Salario (ingreso): $900.000 (1 transacciones)\n"));
        assert!(p.contains("- Alimentación (gasto): $75.500 (2 transacciones)\n"));
        // newest first
        let transporte = p.find("- -$12.000 - Transporte (Sin descripción)").unwrap();
        let super_ = p.find("- -$45.500 - Alimentación (Supermercado)").unwrap();
        assert!(transporte < super_);
        assert!(p.contains("- +$900.000 - Salario (Sueldo octubre)\n"));
    }

    #[test]
    fn system_prompt_guardrails() {
        let p = assistant_system_prompt(&sample(), &ContextReport::default());
        assert!(p.starts_with("Eres un asistente financiero personal"));
        assert!(p.contains(OFF_TOPIC_REPLY));
        assert!(p.contains("1. 🎯 NUNCA des cifras sin especificar el período exacto"));
        assert!(p.contains("6. 🚫 NUNCA inventes o calcules cifras que no estén en el contexto"));
        assert!(p.contains("TEMAS PERMITIDOS ÚNICAMENTE:\n- Análisis de gastos e ingresos"));
        assert!(!p.contains("ADVERTENCIA"));
        assert!(!p.contains("INCONSISTENCIAS"));
    }

    #[test]
    fn system_prompt_includes_report_sections() {
        let report = ContextReport {
            warning: Some("Revisar".into()),
            inconsistencies: vec!["uno".into(), "dos".into()],
        };
        let p = assistant_system_prompt(&sample(), &report);
        assert!(p.contains("\n⚠️ ADVERTENCIA: Revisar\n"));
        assert!(p.contains("\n🔍 INCONSISTENCIAS DETECTADAS:\n- uno\n- dos\n"));
    }

    #[test]
    fn system_prompt_is_deterministic() {
        let ctx = sample();
        let report = ctx.report();
        assert_eq!(
            assistant_system_prompt(&ctx, &report),
            assistant_system_prompt(&ctx, &report)
        );
    }

    #[test]
    fn recent_list_capped_at_ten() {
        let txs = (1..=15)
            .map(|d| {
                tx(
                    TransactionKind::Expense,
                    d as f64,
                    "Otros",
                    &format!("2026-10-{d:02}"),
                    None,
                )
            })
            .collect();
        let p = assistant_system_prompt(&context(txs, None), &ContextReport::default());
        let section = p.split("TRANSACCIONES RECIENTES").nth(1).unwrap();
        let section = section.split("REGLAS CRÍTICAS").next().unwrap();
        assert_eq!(section.matches("- -$").count(), 10);
        assert!(section.contains("- -$15 - Otros"));
        assert!(!section.contains("- -$5 - Otros"));
    }

    #[test]
    fn analysis_prompt_embeds_statistics() {
        let ctx = sample();
        let stats = Statistics::compute(&ctx.transactions, today());
        let p = analysis_prompt(1_234_567.0, &stats);
        assert!(p.contains("- Balance actual: $1.234.567\n"));
        assert!(p.contains("- Ingresos totales: $900.000\n"));
        assert!(p.contains("- Gastos totales: $87.500\n"));
        assert!(p.contains("- Tasa de ahorro: 90.3%\n"));
        assert!(p.contains("- Gastos desde último salario: $57.500\n"));
        assert!(p.contains(r#""Alimentación":75500.0"#));
        assert!(p.contains(r#""2026-10":{"income":900000.0,"expenses":57500.0}"#));
        assert!(p.ends_with("No sugieras herramientas externas."));
    }

    #[test]
    fn suggestions_cover_all_rules() {
        use TransactionKind::*;
        let ctx = context(
            vec![
                tx(Income, 100_000.0, "Salario", "2026-10-01", None),
                tx(Expense, 40_000.0, "Hogar", "2026-10-02", None),
                tx(Expense, 10_000.0, "Ropa", "2026-10-03", None),
            ],
            Some(20_000.0),
        );
        let s = suggestions(&ctx);
        assert_eq!(
            s,
            vec![
                "💰 Podrías ahorrar $50.000 mensuales".to_string(),
                "📊 Tu mayor gasto es en Hogar".to_string(),
                "⚠️ Tu balance es menor a tus gastos mensuales".to_string(),
            ]
        );
    }

    #[test]
    fn no_suggestions_for_empty_context() {
        let ctx = context(vec![], None);
        assert!(suggestions(&ctx).is_empty());
    }
}
