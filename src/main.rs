// Entry point and interactive menu.
//
// - Option [1] configures an installation and prints the estimate.
// - Option [2] captures contact details, submits the lead and produces the
//   printable quote (console preview plus JSON/CSV export).
// - Options [3]-[5] view, edit and reset the pricing assumptions.
mod cli;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use ev_quote::assumptions::AssumptionsStore;
use ev_quote::contact::{self, ContactDetails, ContactField, SimulatedIntake};
use ev_quote::quote::{self, QuoteResolution};
use ev_quote::storage::FileStorage;
use ev_quote::types::{
    AssumptionsPatch, EstimateOverrides, EstimateRequest, Quote, QuoteCoefficients, QuoteParams,
    SiteType,
};
use ev_quote::{estimate, init_tracing, output, util};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Calculator form state for this session. Kept intact when a submission
/// fails so the user can retry without re-entering anything.
#[derive(Debug, Default)]
struct Session {
    request: EstimateRequest,
    overrides: EstimateOverrides,
    address: Option<String>,
    contact: Option<ContactDetails>,
}

struct App {
    store: AssumptionsStore<FileStorage>,
    intake: SimulatedIntake,
    runtime: tokio::runtime::Runtime,
    out_dir: PathBuf,
    coefficients: QuoteCoefficients,
    session: Session,
}

/// Returns `None` once stdin is closed.
fn read_line() -> Option<String> {
    let _ = io::stdout().flush();
    let mut buf = String::new();
    match io::stdin().read_line(&mut buf) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(buf.trim().to_string()),
    }
}

fn prompt(label: &str) -> String {
    print!("{}: ", label);
    read_line().unwrap_or_default()
}

/// Empty input keeps `current`.
fn prompt_with_default(label: &str, current: &str) -> String {
    let answer = if current.is_empty() {
        prompt(label)
    } else {
        prompt(&format!("{} [{}]", label, current))
    };
    if answer.is_empty() {
        current.to_string()
    } else {
        answer
    }
}

fn prompt_yes_no(label: &str, current: bool) -> bool {
    loop {
        let default = if current { "Y" } else { "N" };
        let resp = prompt(&format!("{} (Y/N) [{}]", label, default)).to_uppercase();
        match resp.as_str() {
            "" => return current,
            "Y" => return true,
            "N" => return false,
            _ => println!("Invalid choice. Please enter Y or N."),
        }
    }
}

fn prompt_count(label: &str, current: u32) -> u32 {
    let answer = prompt(&format!("{} [{}]", label, current));
    if answer.is_empty() {
        return current;
    }
    match answer.parse::<i64>() {
        Ok(n) => estimate::clamp_count(n),
        Err(_) => {
            println!("Not a whole number; keeping {}.", current);
            current
        }
    }
}

fn prompt_site_type(current: Option<SiteType>) -> Option<SiteType> {
    println!("Site type:");
    for (i, site) in SiteType::ALL.iter().enumerate() {
        println!("[{}] {}", i + 1, site);
    }
    let label = match current {
        Some(site) => format!("Choose site [{}]", site),
        None => "Choose site".to_string(),
    };
    let answer = prompt(&label);
    if answer.is_empty() {
        return current;
    }
    if let Some(i) = util::parse_u32_safe(Some(&answer)) {
        if let Some(site) = (i as usize).checked_sub(1).and_then(|i| SiteType::ALL.get(i)) {
            return Some(*site);
        }
    }
    match answer.parse::<SiteType>() {
        Ok(site) => Some(site),
        Err(e) => {
            println!("{}", e);
            current
        }
    }
}

fn prompt_run_step(base_meters: f64) -> f64 {
    println!("Cable run length:");
    for (i, factor) in estimate::RUN_FACTOR_STEPS.iter().enumerate() {
        println!(
            "[{}] {} m",
            i + 1,
            estimate::effective_run(base_meters, *factor)
        );
    }
    let answer = prompt(&format!("Choose length [{}]", estimate::DEFAULT_RUN_STEP + 1));
    let step = util::parse_u32_safe(Some(&answer))
        .and_then(|n| (n as usize).checked_sub(1))
        .unwrap_or(estimate::DEFAULT_RUN_STEP);
    estimate::run_factor_for_step(step)
}

/// Export failures are reported and the session carries on; the quote has
/// already been shown on the console.
fn export_and_report(out_dir: &Path, quote: &Quote) -> bool {
    match output::export_quote(out_dir, quote) {
        Ok((json_path, csv_path)) => {
            info!(quote = %quote.quote_number, "quote exported");
            println!(
                "(Quote exported to {} and {})\n",
                json_path.display(),
                csv_path.display()
            );
            true
        }
        Err(e) => {
            warn!(error = %e, out_dir = %out_dir.display(), "quote export failed");
            println!("Could not export the quote: {}", e);
            println!("Check --out-dir and request the quote again.\n");
            false
        }
    }
}

impl App {
    /// Handle option [1]: configure the installation and print the estimate.
    fn handle_configure(&mut self) {
        let table = self.store.get();
        let req = &mut self.session.request;

        req.site_type = prompt_site_type(req.site_type);
        let Some(site) = req.site_type else {
            println!("No site type selected; estimate is $0.\n");
            return;
        };
        req.ac_count = prompt_count("AC chargers", req.ac_count);
        req.dc_count = prompt_count("DC chargers", req.dc_count);
        req.is_underground = prompt_yes_no("Underground install", req.is_underground);
        req.run_factor = prompt_run_step(table.site_type_meters.get(site));

        let derived = estimate::compute_estimate(req, &table);
        let answer = prompt(&format!(
            "Cable run override in meters (Enter to use {} m)",
            derived.effective_run_m
        ));
        self.session.overrides.effective_run_m = util::parse_u32_safe(Some(&answer));

        let estimate =
            estimate::compute_estimate_with_overrides(req, &table, &self.session.overrides);
        debug!(?estimate, "estimate recomputed");
        println!();
        println!("{}\n", output::render_table(&output::estimate_rows(req, &estimate)));
    }

    /// Handle option [2]: contact capture, lead submission and the quote.
    fn handle_quote(&mut self) {
        let table = self.store.get();
        let request = self.session.request.clone();
        let estimate =
            estimate::compute_estimate_with_overrides(&request, &table, &self.session.overrides);
        if request.site_type.is_none() || (request.ac_count == 0 && request.dc_count == 0) {
            println!("Configure a site with at least one charger first (option 1).\n");
            return;
        }

        let prefill = self
            .session
            .contact
            .clone()
            .or_else(|| contact::load_contact(self.store.storage()))
            .unwrap_or_default();
        let mut details = ContactDetails::default();
        for (field, label) in [
            (ContactField::FirstName, "First name"),
            (ContactField::LastName, "Last name"),
            (ContactField::Phone, "Mobile"),
            (ContactField::Email, "Email"),
        ] {
            let value = prompt_with_default(label, prefill.value(field));
            match field {
                ContactField::FirstName => details.first_name = value,
                ContactField::LastName => details.last_name = value,
                ContactField::Phone => details.phone = value,
                ContactField::Email => details.email = value,
            }
        }
        let address = prompt_with_default(
            "Site address",
            self.session.address.as_deref().unwrap_or_default(),
        );
        self.session.contact = Some(details.clone());
        self.session.address = (!address.is_empty()).then_some(address);

        println!("Sending...");
        let submitted = self.runtime.block_on(contact::submit_lead(
            &self.intake,
            self.store.storage(),
            &details,
            &request,
            &estimate,
        ));
        if let Err(e) = submitted {
            println!("Could not send your estimate: {}", e);
            println!("Your details were kept; choose option 2 to try again.\n");
            return;
        }
        println!("Estimate sent! Price breakdown has been sent to {}\n", details.email);

        let params = QuoteParams {
            site_type: request.site_type,
            ac_count: Some(request.ac_count),
            dc_count: Some(request.dc_count),
            is_underground: Some(request.is_underground),
            effective_run_m: Some(estimate.effective_run_m),
            contact_name: Some(details.full_name()),
            contact_email: Some(details.email.clone()),
            address: self.session.address.clone(),
            estimate: Some(estimate),
        };
        let query = quote::serialize_quote_data(&params);
        println!("Shareable estimate: /estimate?{}\n", query);

        let decoded = quote::deserialize_quote_data(&query);
        match quote::assemble_quote(
            &decoded,
            &table.charger_unit_price,
            &self.coefficients,
            &Local::now(),
        ) {
            QuoteResolution::Ready(q) => {
                println!("{}", output::render_quote(&q));
                export_and_report(&self.out_dir, &q);
            }
            QuoteResolution::CollectInputs => {
                println!("Some inputs are missing; please configure the installation again.\n");
            }
        }
    }

    /// Handle option [3].
    fn handle_show_assumptions(&self) {
        println!("Assumptions\n");
        println!(
            "{}\n",
            output::render_table(&output::assumption_rows(&self.store.get()))
        );
    }

    /// Handle option [4]: change one coefficient. Sub-tables are patched whole.
    fn handle_edit_assumption(&mut self) {
        let mut table = self.store.get();
        println!("[1] Site run length");
        println!("[2] AC cable cost per meter");
        println!("[3] DC cable cost per meter");
        println!("[4] Tray cost per meter");
        println!("[5] Trench cost per meter");
        println!("[6] AC charger unit price");
        println!("[7] DC charger unit price");
        println!("[8] Labour markup %");
        let choice = prompt("Enter choice");

        let site = if choice == "1" {
            match prompt_site_type(None) {
                Some(site) => Some(site),
                None => return,
            }
        } else {
            None
        };

        let value = match util::parse_f64_safe(Some(&prompt("New value"))) {
            Some(v) if v >= 0.0 => v,
            _ => {
                println!("Please enter a non-negative number.\n");
                return;
            }
        };

        let patch = match (choice.as_str(), site) {
            ("1", Some(site)) => {
                table.site_type_meters.set(site, value);
                AssumptionsPatch {
                    site_type_meters: Some(table.site_type_meters),
                    ..Default::default()
                }
            }
            ("2" | "3", _) => {
                let cable = &mut table.cable_cost_per_meter;
                if choice == "2" {
                    cable.ac = value;
                } else {
                    cable.dc = value;
                }
                AssumptionsPatch {
                    cable_cost_per_meter: Some(*cable),
                    ..Default::default()
                }
            }
            ("4" | "5", _) => {
                let carrier = &mut table.carrier_cost_per_meter;
                if choice == "4" {
                    carrier.tray = value;
                } else {
                    carrier.trench = value;
                }
                AssumptionsPatch {
                    carrier_cost_per_meter: Some(*carrier),
                    ..Default::default()
                }
            }
            ("6" | "7", _) => {
                let prices = &mut table.charger_unit_price;
                if choice == "6" {
                    prices.ac = value;
                } else {
                    prices.dc = value;
                }
                AssumptionsPatch {
                    charger_unit_price: Some(*prices),
                    ..Default::default()
                }
            }
            ("8", _) => AssumptionsPatch {
                labour_markup_percent: Some(value),
                ..Default::default()
            },
            _ => {
                println!("Invalid choice.\n");
                return;
            }
        };
        self.store.patch(patch);
        println!("Settings saved.\n");
    }

    /// Handle option [5].
    fn handle_reset(&mut self) {
        if prompt_yes_no("Reset all assumptions to defaults", false) {
            self.store.reset_to_defaults();
            println!("All assumptions have been reset to default values.\n");
        }
    }
}

fn main() -> Result<()> {
    let args = cli::Cli::parse();
    init_tracing(&args.log_level);

    let data_dir = args.resolve_data_dir();
    info!(data_dir = %data_dir.display(), "opening assumptions store");
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("failed to start runtime")?;

    let mut app = App {
        store: AssumptionsStore::open(FileStorage::new(data_dir)),
        intake: SimulatedIntake::new(Duration::from_millis(args.submit_delay_ms)),
        runtime,
        out_dir: args.out_dir.clone(),
        coefficients: QuoteCoefficients::default(),
        session: Session::default(),
    };

    loop {
        println!("EV Charging Price Estimator");
        println!("[1] Configure installation");
        println!("[2] Request quote");
        println!("[3] Show assumptions");
        println!("[4] Edit assumption");
        println!("[5] Reset assumptions");
        println!("[0] Exit\n");
        print!("Enter choice: ");
        let Some(choice) = read_line() else {
            break;
        };
        println!();
        match choice.as_str() {
            "1" => app.handle_configure(),
            "2" => app.handle_quote(),
            "3" => app.handle_show_assumptions(),
            "4" => app.handle_edit_assumption(),
            "5" => app.handle_reset(),
            "0" => break,
            _ => println!("Invalid choice. Please enter 0-5.\n"),
        }
    }
    println!("Exiting the program.");
    Ok(())
}
