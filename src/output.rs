use crate::types::{
    Assumptions, BreakdownRow, Estimate, EstimateRequest, LineItem, LineItemRow, Quote, SiteType,
};
use crate::util::{format_int, format_money, format_money_cents, format_number};
use serde::Serialize;
use std::error::Error;
use std::path::{Path, PathBuf};
use tabled::{settings::Style, Table, Tabled};

pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), Box<dyn Error>> {
    let mut wtr = csv::Writer::from_path(path)?;
    for r in rows {
        wtr.serialize(r)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), Box<dyn Error>> {
    let s = serde_json::to_string_pretty(value)?;
    std::fs::write(path, s)?;
    Ok(())
}

pub fn render_table<T>(rows: &[T]) -> String
where
    T: Tabled + Clone,
{
    if rows.is_empty() {
        return "(no rows)".to_string();
    }
    Table::new(rows.to_vec()).with(Style::markdown()).to_string()
}

fn row(item: impl Into<String>, value: impl Into<String>) -> BreakdownRow {
    BreakdownRow {
        item: item.into(),
        value: value.into(),
    }
}

pub fn estimate_rows(request: &EstimateRequest, estimate: &Estimate) -> Vec<BreakdownRow> {
    let site = request
        .site_type
        .map(|s| s.label().to_string())
        .unwrap_or_else(|| "-".to_string());
    let install = if request.is_underground {
        "Underground (trench)"
    } else {
        "Surface (tray)"
    };
    vec![
        row("Site type", site),
        row("AC / DC chargers", format!("{} / {}", request.ac_count, request.dc_count)),
        row("Install", install),
        row("Cable run", format!("{} m", format_int(estimate.effective_run_m))),
        row("Per-meter rate", format_money_cents(estimate.per_meter_rate)),
        row("Cabling", format_money(estimate.cabling_cost)),
        row("Chargers", format_money(estimate.charger_cost)),
        row("Subtotal", format_money(estimate.cost)),
        row("Estimated price", format_money(estimate.final_price)),
    ]
}

pub fn assumption_rows(table: &Assumptions) -> Vec<BreakdownRow> {
    let mut rows: Vec<BreakdownRow> = SiteType::ALL
        .into_iter()
        .map(|site| {
            row(
                format!("Run: {}", site),
                format!("{} m", format_number(table.site_type_meters.get(site), 0)),
            )
        })
        .collect();
    rows.extend([
        row("Cable AC ($/m)", format_money_cents(table.cable_cost_per_meter.ac)),
        row("Cable DC ($/m)", format_money_cents(table.cable_cost_per_meter.dc)),
        row("Carrier tray ($/m)", format_money_cents(table.carrier_cost_per_meter.tray)),
        row("Carrier trench ($/m)", format_money_cents(table.carrier_cost_per_meter.trench)),
        row("Charger AC ($/unit)", format_money_cents(table.charger_unit_price.ac)),
        row("Charger DC ($/unit)", format_money_cents(table.charger_unit_price.dc)),
        row(
            "Labour markup",
            format!("{}%", format_number(table.labour_markup_percent, 2)),
        ),
    ]);
    rows
}

pub fn line_item_rows(items: &[LineItem]) -> Vec<LineItemRow> {
    items
        .iter()
        .map(|i| LineItemRow {
            label: i.label.clone(),
            qty: format_int(i.qty),
            unit: i.unit.clone(),
            unit_price: format_money(i.unit_price),
            subtotal: format_money(i.subtotal),
        })
        .collect()
}

/// Plain-text rendering of the printable quote document.
pub fn render_quote(quote: &Quote) -> String {
    let dash = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());
    let install = if quote.is_underground {
        "Underground"
    } else {
        "Surface"
    };
    let savings = quote.savings_vs_incumbent;
    let sign = if savings >= 0.0 { "+" } else { "-" };

    let mut out = String::new();
    out.push_str(&format!("QUOTE # {}\n", quote.quote_number));
    out.push_str(&format!("Date: {}\n", quote.date_generated));
    out.push_str(&format!("Valid until: {}\n", quote.valid_until));
    out.push_str(&format!("Prepared for: {}\n\n", dash(&quote.contact_name)));

    let summary = vec![
        row("Estimated annual price (us)", format_money(quote.estimate.final_price)),
        row("Monthly equivalent", format_money(quote.monthly_equivalent)),
        row(
            "Incumbent annual price",
            format_money(quote.metrics.incumbent_annual_price),
        ),
        row("Savings est.", format!("{}{}", sign, format_money(savings.abs()))),
        row("One-off cost", format_money(quote.metrics.one_off_cost)),
        row("Operating cost p.a.", format_money(quote.metrics.operating_cost_pa)),
        row(
            "Est. CO2 savings p.a.",
            format!("{} kg", format_number(quote.metrics.estimated_co2_savings_pa, 0)),
        ),
    ];
    out.push_str(&render_table(&summary));
    out.push_str("\n\nSite Details\n");

    let site = vec![
        row("Type", quote.site_type.label()),
        row("Install", install),
        row("Address", dash(&quote.address)),
        row("AC / DC", format!("{} / {}", quote.ac_count, quote.dc_count)),
        row("Cable run", format!("{} m", format_int(quote.effective_run_m))),
        row("Contact email", dash(&quote.contact_email)),
    ];
    out.push_str(&render_table(&site));
    out.push_str("\n\nLine Items\n");
    out.push_str(&render_table(&line_item_rows(&quote.line_items)));
    out.push_str(&format!(
        "\n\nTotal (AUD): {}\n",
        format_money(quote.estimate.final_price)
    ));
    out
}

/// Writes `quote-<number>.json` and `quote-<number>-items.csv` into `dir`.
pub fn export_quote(dir: &Path, quote: &Quote) -> Result<(PathBuf, PathBuf), Box<dyn Error>> {
    std::fs::create_dir_all(dir)?;
    let json_path = dir.join(format!("quote-{}.json", quote.quote_number));
    let csv_path = dir.join(format!("quote-{}-items.csv", quote.quote_number));
    write_json(&json_path, quote)?;
    write_csv(&csv_path, &quote.line_items)?;
    Ok((json_path, csv_path))
}
