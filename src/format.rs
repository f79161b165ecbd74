use crate::models::{FormattedKpi, KpiResult};

pub fn format_kpi(result: &KpiResult) -> FormattedKpi {
    FormattedKpi {
        value: format_number(result.value),
        delta: format_delta(result.delta_percent as f64),
    }
}

/// Thousands-separated number; fractions keep one decimal place.
pub fn format_number(value: f64) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    let rounded = crate::stats::round_to(value, 1);
    let negative = rounded < 0.0;
    let magnitude = rounded.abs();
    let whole = magnitude.trunc() as u64;
    let tenths = ((magnitude - magnitude.trunc()) * 10.0).round() as u64;

    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 3);
    if negative && (whole > 0 || tenths > 0) {
        grouped.push('-');
    }
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if tenths > 0 {
        grouped.push('.');
        grouped.push_str(&tenths.to_string());
    }
    grouped
}

/// Signed percentage: `+12%`, `+0%`, `-3%`.
pub fn format_delta(percent: f64) -> String {
    if !percent.is_finite() {
        return "0%".to_string();
    }
    let body = format_percent(percent);
    if percent >= 0.0 {
        format!("+{body}")
    } else {
        body
    }
}

pub fn format_percent(percent: f64) -> String {
    if !percent.is_finite() {
        return "0%".to_string();
    }
    format!("{}%", format_number(percent))
}
