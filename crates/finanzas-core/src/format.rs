// Chilean-peso formatting and Spanish date labels.
//
// Amounts are shown the way es-CL renders CLP: no minor unit, `.` as the
// thousands separator, `-` before the currency sign for negatives.

use chrono::{Datelike, NaiveDate};

use crate::model::ValidationError;

/// Placeholder shown instead of figures when values are hidden.
pub const MASKED_AMOUNT: &str = "$ ****";

const MONTHS_ES: [&str; 12] = [
    "Enero",
    "Febrero",
    "Marzo",
    "Abril",
    "Mayo",
    "Junio",
    "Julio",
    "Agosto",
    "Septiembre",
    "Octubre",
    "Noviembre",
    "Diciembre",
];

/// Format an amount as CLP, e.g. `$1.234.567` or `-$12.000`.
pub fn format_clp(amount: f64) -> String {
    let rounded = if amount.is_finite() { amount.round() } else { 0.0 };
    let negative = rounded < 0.0;
    let digits = format!("{:.0}", rounded.abs());
    let grouped = group_thousands(&digits);
    if negative {
        format!("-${grouped}")
    } else {
        format!("${grouped}")
    }
}

/// Format an amount, or mask it when `visible` is false.
pub fn format_amount(amount: f64, visible: bool) -> String {
    if visible {
        format_clp(amount)
    } else {
        MASKED_AMOUNT.to_string()
    }
}

/// Format a percentage with one decimal, e.g. `23.5%`.
pub fn format_percent(value: f64) -> String {
    let v = if value.is_finite() { value } else { 0.0 };
    format!("{v:.1}%")
}

fn group_thousands(digits: &str) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push('.');
        }
        out.push(ch);
    }
    out
}

/// Parse an amount typed by the user.
///
/// Accepts plain numbers (`12500`, `12500.5`), es-CL grouping (`12.500`,
/// `1.234.567`), a decimal comma (`12.500,50`) and a leading `$`.
pub fn parse_clp(input: &str) -> Result<f64, ValidationError> {
    let cleaned: String = input
        .trim()
        .trim_start_matches('$')
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return Err(ValidationError::MissingFields);
    }

    let normalized = if cleaned.contains(',') {
        cleaned.replace('.', "").replace(',', ".")
    } else if is_dot_grouped(&cleaned) {
        cleaned.replace('.', "")
    } else {
        cleaned.clone()
    };

    match normalized.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(ValidationError::InvalidAmount(input.trim().to_string())),
    }
}

/// `1.234` and `1.234.567` are grouped; `12.5` and `1.23` are decimals.
fn is_dot_grouped(s: &str) -> bool {
    let mut parts = s.split('.');
    let Some(head) = parts.next() else {
        return false;
    };
    let tail: Vec<&str> = parts.collect();
    !tail.is_empty()
        && !head.is_empty()
        && head.len() <= 3
        && tail
            .iter()
            .all(|p| p.len() == 3 && p.chars().all(|c| c.is_ascii_digit()))
}

/// Capitalized Spanish month name for a 1-based month number.
pub fn month_name_es(month: u32) -> &'static str {
    let idx = (month.clamp(1, 12) - 1) as usize;
    MONTHS_ES[idx]
}

/// `"octubre de 2026"`
pub fn month_year_label(year: i32, month: u32) -> String {
    format!("{} de {}", month_name_es(month).to_lowercase(), year)
}

/// `"oct 26"`
pub fn short_month_label(year: i32, month: u32) -> String {
    let name: String = month_name_es(month).to_lowercase().chars().take(3).collect();
    format!("{} {:02}", name, year.rem_euclid(100))
}

/// `"19 de Octubre 2026"`
pub fn long_date_es(date: NaiveDate) -> String {
    format!(
        "{} de {} {}",
        date.day(),
        month_name_es(date.month()),
        date.year()
    )
}

/// `"19 oct"`
pub fn short_date_es(date: NaiveDate) -> String {
    let name: String = month_name_es(date.month())
        .to_lowercase()
        .chars()
        .take(3)
        .collect();
    format!("{} {}", date.day(), name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clp_grouping() {
        assert_eq!(format_clp(0.0), "$0");
        assert_eq!(format_clp(999.0), "$999");
        assert_eq!(format_clp(1000.0), "$1.000");
        assert_eq!(format_clp(1234567.0), "$1.234.567");
        assert_eq!(format_clp(-12000.0), "-$12.000");
    }

    #[test]
    fn clp_rounds_to_whole_pesos() {
        assert_eq!(format_clp(1499.5), "$1.500");
        assert_eq!(format_clp(1499.4), "$1.499");
        assert_eq!(format_clp(-0.4), "$0");
        assert_eq!(format_clp(f64::NAN), "$0");
    }

    #[test]
    fn masked_amounts() {
        assert_eq!(format_amount(5000.0, false), MASKED_AMOUNT);
        assert_eq!(format_amount(5000.0, true), "$5.000");
    }

    #[test]
    fn parse_plain_and_grouped() {
        assert_eq!(parse_clp("12500").unwrap(), 12500.0);
        assert_eq!(parse_clp("$12.500").unwrap(), 12500.0);
        assert_eq!(parse_clp("1.234.567").unwrap(), 1234567.0);
        assert_eq!(parse_clp("12.5").unwrap(), 12.5);
        assert_eq!(parse_clp("12.500,50").unwrap(), 12500.5);
        assert_eq!(parse_clp(" 3 000 ").unwrap(), 3000.0);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(parse_clp("   "), Err(ValidationError::MissingFields));
        assert!(matches!(parse_clp("doce"), Err(ValidationError::InvalidAmount(_))));
    }

    #[test]
    fn spanish_labels() {
        assert_eq!(month_name_es(1), "Enero");
        assert_eq!(month_name_es(12), "Diciembre");
        assert_eq!(month_year_label(2026, 10), "octubre de 2026");
        assert_eq!(short_month_label(2026, 3), "mar 26");
        let d = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        assert_eq!(long_date_es(d), "19 de Octubre 2026");
        assert_eq!(short_date_es(d), "19 oct");
    }

    #[test]
    fn percent() {
        assert_eq!(format_percent(23.456), "23.5%");
        assert_eq!(format_percent(f64::INFINITY), "0.0%");
    }
}
