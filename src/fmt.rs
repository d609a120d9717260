use rust_decimal::Decimal;

use crate::models::Fee;

/// Human-readable byte size: 512 B, 1.5 KB, 2.0 MB.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

/// Amount with its currency, or an empty string when either is missing.
pub fn amount(value: Option<Decimal>, currency: Option<&str>) -> String {
    match value {
        Some(v) => format!("{} {}", v.normalize(), currency.unwrap_or("")).trim_end().to_string(),
        None => String::new(),
    }
}

pub fn fee(value: Option<Fee>, currency: Option<&str>) -> String {
    match value {
        Some(Fee::Auto) => format!("auto {}", currency.unwrap_or("")).trim_end().to_string(),
        Some(Fee::Amount(d)) => amount(Some(d), currency),
        None => String::new(),
    }
}

/// Dollar value with thousands separators: $1,234.56
pub fn usd(value: Option<Decimal>) -> String {
    let Some(val) = value else {
        return String::new();
    };
    let rounded = val.round_dp(2);
    let cents = format!("{:.2}", rounded.abs());
    let (int_part, dec_part) = cents.split_once('.').unwrap_or((cents.as_str(), "00"));

    let mut with_commas = String::new();
    for (i, c) in int_part.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            with_commas.push(',');
        }
        with_commas.push(c);
    }
    let with_commas: String = with_commas.chars().rev().collect();

    if rounded.is_sign_negative() && !rounded.is_zero() {
        format!("-${with_commas}.{dec_part}")
    } else {
        format!("${with_commas}.{dec_part}")
    }
}
