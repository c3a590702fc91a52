// Pricing for a configured installation.
//
// Pure functions only: the same request and table always produce the same
// estimate.
use crate::types::{Assumptions, Estimate, EstimateOverrides, EstimateRequest};

/// Discrete run-length multipliers offered by the calculator slider.
pub const RUN_FACTOR_STEPS: [f64; 5] = [0.75, 0.875, 1.0, 1.125, 1.25];
pub const DEFAULT_RUN_STEP: usize = 2;

pub const MIN_RUN_FACTOR: f64 = 0.5;
pub const MAX_RUN_FACTOR: f64 = 2.0;

/// Out-of-range indices pin to the nearest end of the slider.
pub fn run_factor_for_step(step: usize) -> f64 {
    RUN_FACTOR_STEPS[step.min(RUN_FACTOR_STEPS.len() - 1)]
}

pub fn clamp_run_factor(factor: f64) -> f64 {
    if factor.is_nan() {
        return 1.0;
    }
    factor.clamp(MIN_RUN_FACTOR, MAX_RUN_FACTOR)
}

/// The engine never validates counts; callers clamp raw input with this.
pub fn clamp_count(raw: i64) -> u32 {
    raw.clamp(0, u32::MAX as i64) as u32
}

/// Site default run scaled by the factor, rounded to whole meters.
pub fn effective_run(base_distance: f64, run_factor: f64) -> u32 {
    // `as` saturates: negatives and NaN become 0.
    (base_distance * run_factor).round().max(0.0) as u32
}

pub fn compute_estimate(request: &EstimateRequest, table: &Assumptions) -> Estimate {
    compute_estimate_with_overrides(request, table, &EstimateOverrides::default())
}

/// Like [`compute_estimate`], but an override replaces the derived value
/// before any dependent cost is priced. An overridden run is used as-is and
/// never re-derived from the site distance.
pub fn compute_estimate_with_overrides(
    request: &EstimateRequest,
    table: &Assumptions,
    overrides: &EstimateOverrides,
) -> Estimate {
    let ac_count = overrides.ac_count.unwrap_or(request.ac_count);
    let dc_count = overrides.dc_count.unwrap_or(request.dc_count);

    let Some(site) = request.site_type else {
        return Estimate::default();
    };
    if ac_count == 0 && dc_count == 0 {
        return Estimate::default();
    }

    let effective_run_m = overrides.effective_run_m.unwrap_or_else(|| {
        effective_run(table.site_type_meters.get(site), request.run_factor)
    });

    let carrier_rate = if request.is_underground {
        table.carrier_cost_per_meter.trench
    } else {
        table.carrier_cost_per_meter.tray
    };

    // Copper is paid per charger; the tray or trench is shared, so once.
    let per_meter_rate = dc_count as f64 * table.cable_cost_per_meter.dc
        + ac_count as f64 * table.cable_cost_per_meter.ac
        + carrier_rate;

    let cabling_cost = effective_run_m as f64 * per_meter_rate;
    let charger_cost = ac_count as f64 * table.charger_unit_price.ac
        + dc_count as f64 * table.charger_unit_price.dc;
    let cost = cabling_cost + charger_cost;
    let final_price = cost * (1.0 + table.labour_markup_percent / 100.0);

    Estimate {
        effective_run_m,
        per_meter_rate,
        cabling_cost,
        charger_cost,
        cost,
        final_price,
    }
}
