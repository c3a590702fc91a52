// Parsing and formatting helpers.
//
// Everything that turns user- or query-supplied text into numbers, and
// numbers back into display text, lives here so the pricing code can assume
// clean, typed values.
use num_format::{Locale, ToFormattedString};

/// Decimal amount from a decoded query value or a menu answer, e.g. the
/// `finalPrice` of a shared quote link or a new cable cost typed as
/// `1,250.50`. Thousands separators and surrounding blanks are tolerated.
/// Anything with letters in it (`NaN`, `inf`, `12abc`) decodes to `None`, so
/// an absent or garbled field never turns into zero.
pub fn parse_f64_safe(s: Option<&str>) -> Option<f64> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    if s.chars().any(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let s = s.replace(",", "");
    s.parse::<f64>().ok()
}

pub fn parse_u32_safe(s: Option<&str>) -> Option<u32> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    s.parse::<u32>().ok()
}

pub fn parse_bool_safe(s: Option<&str>) -> Option<bool> {
    match s?.trim() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// `n` at `decimals` places with `en` thousands separators, e.g.
/// `1,234,567.89`. Magnitudes beyond `u64` are printed ungrouped.
pub fn format_number(n: f64, decimals: usize) -> String {
    let neg = n.is_sign_negative() && n != 0.0;
    let fixed = format!("{:.*}", decimals, n.abs());
    let (int_part, frac_part) = match fixed.split_once('.') {
        Some((int_part, frac)) => (int_part, Some(frac)),
        None => (fixed.as_str(), None),
    };
    let mut res = match int_part.parse::<u64>() {
        Ok(v) => v.to_formatted_string(&Locale::en),
        Err(_) => int_part.to_string(),
    };
    if let Some(frac) = frac_part {
        res.push('.');
        res.push_str(frac);
    }
    if neg && res.chars().any(|c| c.is_ascii_digit() && c != '0') {
        format!("-{}", res)
    } else {
        res
    }
}

/// Whole-dollar AUD amount, e.g. `$9,951` or `-$120`.
pub fn format_money(n: f64) -> String {
    // Halves round away from zero, unlike `{:.0}` which rounds them to even.
    let body = format_number(n.round(), 0);
    match body.strip_prefix('-') {
        Some(rest) => format!("-${}", rest),
        None => format!("${}", body),
    }
}

/// Money with cents, used where line items need to add up visibly.
pub fn format_money_cents(n: f64) -> String {
    let body = format_number((n * 100.0).round() / 100.0, 2);
    match body.strip_prefix('-') {
        Some(rest) => format!("-${}", rest),
        None => format!("${}", body),
    }
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    n.to_formatted_string(&Locale::en)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_f64_handles_separators_and_rejects_text() {
        assert_eq!(parse_f64_safe(Some(" 1,250.5 ")), Some(1250.5));
        assert_eq!(parse_f64_safe(Some("42.15")), Some(42.15));
        assert_eq!(parse_f64_safe(Some("NaN")), None);
        assert_eq!(parse_f64_safe(Some("12abc")), None);
        assert_eq!(parse_f64_safe(Some("")), None);
        assert_eq!(parse_f64_safe(None), None);
    }

    #[test]
    fn parse_u32_rejects_negative_and_fractional() {
        assert_eq!(parse_u32_safe(Some("3")), Some(3));
        assert_eq!(parse_u32_safe(Some("-1")), None);
        assert_eq!(parse_u32_safe(Some("2.5")), None);
    }

    #[test]
    fn parse_bool_is_strict() {
        assert_eq!(parse_bool_safe(Some("true")), Some(true));
        assert_eq!(parse_bool_safe(Some("false")), Some(false));
        assert_eq!(parse_bool_safe(Some("yes")), None);
    }

    #[test]
    fn money_formatting() {
        assert_eq!(format_money(9950.5), "$9,951");
        assert_eq!(format_money(68232.0), "$68,232");
        assert_eq!(format_money(-120.0), "-$120");
        assert_eq!(format_money(0.0), "$0");
        assert_eq!(format_money_cents(2950.5), "$2,950.50");
        assert_eq!(format_int(12345u32), "12,345");
    }

    #[test]
    fn huge_amounts_keep_their_digits() {
        assert_eq!(format_number(1e20, 0), "100000000000000000000");
        assert_eq!(format_money(1e20), "$100000000000000000000");
        assert_eq!(format_number(1234567.891, 2), "1,234,567.89");
    }

    #[test]
    fn negative_zero_is_not_signed() {
        assert_eq!(format_number(-0.0, 2), "0.00");
        assert_eq!(format_number(-0.001, 2), "0.00");
    }
}
