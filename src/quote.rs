use crate::types::{
    ChargerUnitPrice, Estimate, LineItem, Quote, QuoteCoefficients, QuoteMetrics, QuoteParams,
    SiteType,
};
use crate::util::{parse_bool_safe, parse_f64_safe, parse_u32_safe};
use chrono::{DateTime, Duration, Local, TimeZone};
use std::fmt;
use tracing::debug;
use url::form_urlencoded;

/// Result of turning decoded query data into a quote.
#[derive(Debug, Clone, PartialEq)]
pub enum QuoteResolution {
    Ready(Box<Quote>),
    /// Site type or estimate missing: send the user back to the calculator.
    CollectInputs,
}

pub fn generate_quote_number() -> String {
    generate_quote_number_at(&Local::now())
}

/// `EV{YY}{MM}{DD}-{last six digits of the millisecond timestamp}`.
///
/// A display identifier only; two calls in the same millisecond collide.
pub fn generate_quote_number_at<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: fmt::Display,
{
    let suffix = now.timestamp_millis().rem_euclid(1_000_000);
    format!("EV{}-{:06}", now.format("%y%m%d"), suffix)
}

pub fn calculate_quote_metrics(
    estimate: &Estimate,
    site_type: SiteType,
    coefficients: &QuoteCoefficients,
) -> QuoteMetrics {
    let multiplier = coefficients.incumbent_multipliers.get(site_type);
    QuoteMetrics {
        one_off_cost: estimate.cost,
        // The markup, read as an annual operating figure.
        operating_cost_pa: estimate.markup(),
        incumbent_annual_price: (estimate.final_price * multiplier).round(),
        estimated_co2_savings_pa: ((estimate.charger_cost / 1000.0)
            * coefficients.co2_kg_per_thousand)
            .round(),
    }
}

/// Hardware rows only for charger classes actually ordered; the cabling and
/// commissioning rows are always present.
pub fn generate_line_items(
    estimate: &Estimate,
    ac_count: u32,
    dc_count: u32,
    is_underground: bool,
    unit_prices: &ChargerUnitPrice,
) -> Vec<LineItem> {
    let mut items = Vec::with_capacity(4);

    if ac_count > 0 {
        items.push(LineItem {
            label: "AC Charging Units".to_string(),
            qty: ac_count,
            unit: "unit".to_string(),
            unit_price: unit_prices.ac,
            subtotal: ac_count as f64 * unit_prices.ac,
        });
    }
    if dc_count > 0 {
        items.push(LineItem {
            label: "DC Fast Charging Units".to_string(),
            qty: dc_count,
            unit: "unit".to_string(),
            unit_price: unit_prices.dc,
            subtotal: dc_count as f64 * unit_prices.dc,
        });
    }

    let method = if is_underground { "Underground" } else { "Surface" };
    items.push(LineItem {
        label: format!("Cable Installation ({})", method),
        qty: estimate.effective_run_m,
        unit: "m".to_string(),
        unit_price: estimate.per_meter_rate.round(),
        subtotal: estimate.cabling_cost,
    });

    let markup = estimate.markup();
    items.push(LineItem {
        label: "Installation & Commissioning".to_string(),
        qty: 1,
        unit: "lot".to_string(),
        unit_price: markup.round(),
        subtotal: markup,
    });

    items
}

/// Flat `key=value&...` encoding of the recognised quote fields.
///
/// Absent fields and empty strings are left out entirely.
pub fn serialize_quote_data(data: &QuoteParams) -> String {
    let mut out = form_urlencoded::Serializer::new(String::new());

    if let Some(site) = data.site_type {
        out.append_pair("siteType", site.label());
    }
    if let Some(v) = data.ac_count {
        out.append_pair("acCount", &v.to_string());
    }
    if let Some(v) = data.dc_count {
        out.append_pair("dcCount", &v.to_string());
    }
    if let Some(v) = data.is_underground {
        out.append_pair("isUnderground", &v.to_string());
    }
    if let Some(v) = data.effective_run_m {
        out.append_pair("effectiveRunM", &v.to_string());
    }
    for (key, value) in [
        ("contactName", &data.contact_name),
        ("contactEmail", &data.contact_email),
        ("address", &data.address),
    ] {
        if let Some(v) = value.as_deref().filter(|v| !v.is_empty()) {
            out.append_pair(key, v);
        }
    }
    if let Some(e) = &data.estimate {
        // `Display` for f64 is the shortest text that parses back exactly.
        out.append_pair("finalPrice", &e.final_price.to_string());
        out.append_pair("cost", &e.cost.to_string());
        out.append_pair("cablingCost", &e.cabling_cost.to_string());
        out.append_pair("chargerCost", &e.charger_cost.to_string());
    }

    out.finish()
}

/// Inverse of [`serialize_quote_data`]. Unknown keys are ignored, and a
/// missing or unparsable value leaves its field `None`.
///
/// The estimate is only rebuilt when all four money fields parse. Its
/// per-meter rate is not carried, so it is recovered from the cabling cost.
pub fn deserialize_quote_data(encoded: &str) -> QuoteParams {
    let encoded = encoded.strip_prefix('?').unwrap_or(encoded);

    let mut site_type = None;
    let mut ac_count = None;
    let mut dc_count = None;
    let mut is_underground = None;
    let mut effective_run_m = None;
    let mut contact_name = None;
    let mut contact_email = None;
    let mut address = None;
    let (mut final_price, mut cost, mut cabling_cost, mut charger_cost) = (None, None, None, None);

    for (key, value) in form_urlencoded::parse(encoded.as_bytes()) {
        let v = Some(&*value);
        match &*key {
            "siteType" => match value.parse::<SiteType>() {
                Ok(site) => site_type = Some(site),
                Err(e) => debug!(error = %e, "ignoring siteType"),
            },
            "acCount" => ac_count = parse_u32_safe(v),
            "dcCount" => dc_count = parse_u32_safe(v),
            "isUnderground" => is_underground = parse_bool_safe(v),
            "effectiveRunM" => effective_run_m = parse_u32_safe(v),
            "contactName" => contact_name = non_empty(&value),
            "contactEmail" => contact_email = non_empty(&value),
            "address" => address = non_empty(&value),
            "finalPrice" => final_price = parse_f64_safe(v),
            "cost" => cost = parse_f64_safe(v),
            "cablingCost" => cabling_cost = parse_f64_safe(v),
            "chargerCost" => charger_cost = parse_f64_safe(v),
            _ => {}
        }
    }

    let estimate = match (final_price, cost, cabling_cost, charger_cost) {
        (Some(final_price), Some(cost), Some(cabling_cost), Some(charger_cost)) => {
            let run = effective_run_m.unwrap_or(0);
            let per_meter_rate = if run > 0 {
                cabling_cost / run as f64
            } else {
                0.0
            };
            Some(Estimate {
                effective_run_m: run,
                per_meter_rate,
                cabling_cost,
                charger_cost,
                cost,
                final_price,
            })
        }
        _ => None,
    };

    QuoteParams {
        site_type,
        ac_count,
        dc_count,
        is_underground,
        effective_run_m,
        contact_name,
        contact_email,
        address,
        estimate,
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

/// Build the printable quote, or ask for the inputs again when the decoded
/// data lacks a site type or an estimate. Nothing is synthesized from
/// partial data.
pub fn assemble_quote<Tz: TimeZone>(
    params: &QuoteParams,
    unit_prices: &ChargerUnitPrice,
    coefficients: &QuoteCoefficients,
    now: &DateTime<Tz>,
) -> QuoteResolution
where
    Tz::Offset: fmt::Display,
{
    let (Some(site_type), Some(estimate)) = (params.site_type, params.estimate) else {
        return QuoteResolution::CollectInputs;
    };

    let ac_count = params.ac_count.unwrap_or(0);
    let dc_count = params.dc_count.unwrap_or(0);
    let is_underground = params.is_underground.unwrap_or(false);

    let metrics = calculate_quote_metrics(&estimate, site_type, coefficients);
    let line_items =
        generate_line_items(&estimate, ac_count, dc_count, is_underground, unit_prices);
    let valid_until = now.clone() + Duration::days(coefficients.validity_days);

    QuoteResolution::Ready(Box::new(Quote {
        quote_number: generate_quote_number_at(now),
        date_generated: now.format("%d %b %Y").to_string(),
        valid_until: valid_until.format("%d %b %Y").to_string(),
        site_type,
        ac_count,
        dc_count,
        is_underground,
        effective_run_m: params.effective_run_m.unwrap_or(estimate.effective_run_m),
        contact_name: params.contact_name.clone(),
        contact_email: params.contact_email.clone(),
        address: params.address.clone(),
        savings_vs_incumbent: metrics.incumbent_annual_price - estimate.final_price,
        monthly_equivalent: estimate.final_price / 12.0,
        estimate,
        metrics,
        line_items,
    }))
}
