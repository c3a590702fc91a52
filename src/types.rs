use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tabled::Tabled;

/// The kinds of site an installation can be quoted for.
///
/// Serialized with the human-readable label, which is also what the
/// persisted coefficient table and the query encoding use as keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SiteType {
    #[serde(rename = "Car Dealership")]
    CarDealership,
    #[serde(rename = "Public Station")]
    PublicStation,
    #[serde(rename = "Office Building")]
    OfficeBuilding,
    #[serde(rename = "Apartment")]
    Apartment,
    #[serde(rename = "House")]
    House,
}

impl SiteType {
    pub const ALL: [SiteType; 5] = [
        SiteType::CarDealership,
        SiteType::PublicStation,
        SiteType::OfficeBuilding,
        SiteType::Apartment,
        SiteType::House,
    ];

    pub fn label(self) -> &'static str {
        match self {
            SiteType::CarDealership => "Car Dealership",
            SiteType::PublicStation => "Public Station",
            SiteType::OfficeBuilding => "Office Building",
            SiteType::Apartment => "Apartment",
            SiteType::House => "House",
        }
    }

    /// Key used by the legacy persisted schema (`siteDistances.carDealership`).
    pub fn legacy_key(self) -> &'static str {
        match self {
            SiteType::CarDealership => "carDealership",
            SiteType::PublicStation => "publicStation",
            SiteType::OfficeBuilding => "officeBuilding",
            SiteType::Apartment => "apartment",
            SiteType::House => "house",
        }
    }
}

impl fmt::Display for SiteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown site type: {0:?}")]
pub struct ParseSiteTypeError(pub String);

impl FromStr for SiteType {
    type Err = ParseSiteTypeError;

    /// Accepts either the display label or the legacy camelCase key.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        SiteType::ALL
            .into_iter()
            .find(|site| site.label() == s || site.legacy_key() == s)
            .ok_or_else(|| ParseSiteTypeError(s.to_string()))
    }
}

/// Default cable run, in meters, for each site type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteTypeMeters {
    #[serde(rename = "Car Dealership")]
    pub car_dealership: f64,
    #[serde(rename = "Public Station")]
    pub public_station: f64,
    #[serde(rename = "Office Building")]
    pub office_building: f64,
    #[serde(rename = "Apartment")]
    pub apartment: f64,
    #[serde(rename = "House")]
    pub house: f64,
}

impl Default for SiteTypeMeters {
    fn default() -> Self {
        Self {
            car_dealership: 50.0,
            public_station: 40.0,
            office_building: 40.0,
            apartment: 20.0,
            house: 20.0,
        }
    }
}

impl SiteTypeMeters {
    pub fn get(&self, site: SiteType) -> f64 {
        match site {
            SiteType::CarDealership => self.car_dealership,
            SiteType::PublicStation => self.public_station,
            SiteType::OfficeBuilding => self.office_building,
            SiteType::Apartment => self.apartment,
            SiteType::House => self.house,
        }
    }

    pub fn set(&mut self, site: SiteType, meters: f64) {
        let slot = match site {
            SiteType::CarDealership => &mut self.car_dealership,
            SiteType::PublicStation => &mut self.public_station,
            SiteType::OfficeBuilding => &mut self.office_building,
            SiteType::Apartment => &mut self.apartment,
            SiteType::House => &mut self.house,
        };
        *slot = meters;
    }
}

/// Copper cost per meter, per charger of each class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CablePerMeter {
    pub ac: f64,
    pub dc: f64,
}

impl Default for CablePerMeter {
    fn default() -> Self {
        Self { ac: 50.0, dc: 150.0 }
    }
}

/// Physical carrier cost per meter: cable tray on the surface, trench underground.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CarrierPerMeter {
    pub tray: f64,
    pub trench: f64,
}

impl Default for CarrierPerMeter {
    fn default() -> Self {
        Self {
            tray: 50.0,
            trench: 1000.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChargerUnitPrice {
    pub ac: f64,
    pub dc: f64,
}

impl Default for ChargerUnitPrice {
    fn default() -> Self {
        Self {
            ac: 2000.0,
            dc: 25000.0,
        }
    }
}

/// The coefficient table every estimate is priced against.
///
/// `Default` is the hard-coded table the store falls back to and resets to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assumptions {
    pub site_type_meters: SiteTypeMeters,
    pub cable_cost_per_meter: CablePerMeter,
    pub carrier_cost_per_meter: CarrierPerMeter,
    pub charger_unit_price: ChargerUnitPrice,
    pub labour_markup_percent: f64,
}

impl Default for Assumptions {
    fn default() -> Self {
        Self {
            site_type_meters: SiteTypeMeters::default(),
            cable_cost_per_meter: CablePerMeter::default(),
            carrier_cost_per_meter: CarrierPerMeter::default(),
            charger_unit_price: ChargerUnitPrice::default(),
            labour_markup_percent: 42.15,
        }
    }
}

impl Assumptions {
    /// Shallow merge: each top-level field present in `patch` replaces the
    /// current value wholesale, everything else is left untouched.
    pub fn merge(&mut self, patch: AssumptionsPatch) {
        let AssumptionsPatch {
            site_type_meters,
            cable_cost_per_meter,
            carrier_cost_per_meter,
            charger_unit_price,
            labour_markup_percent,
        } = patch;
        if let Some(v) = site_type_meters {
            self.site_type_meters = v;
        }
        if let Some(v) = cable_cost_per_meter {
            self.cable_cost_per_meter = v;
        }
        if let Some(v) = carrier_cost_per_meter {
            self.carrier_cost_per_meter = v;
        }
        if let Some(v) = charger_unit_price {
            self.charger_unit_price = v;
        }
        if let Some(v) = labour_markup_percent {
            self.labour_markup_percent = v;
        }
    }

    pub fn merged(mut self, patch: AssumptionsPatch) -> Self {
        self.merge(patch);
        self
    }

    /// Replace every negative or non-finite coefficient with its default.
    /// Returns the names of the replaced fields.
    pub fn sanitize(&mut self) -> Vec<String> {
        let d = Assumptions::default();
        let mut replaced = Vec::new();
        let mut fix = |name: String, v: &mut f64, default: f64| {
            if !v.is_finite() || *v < 0.0 {
                *v = default;
                replaced.push(name);
            }
        };
        for site in SiteType::ALL {
            let mut meters = self.site_type_meters.get(site);
            fix(
                format!("siteTypeMeters.{}", site),
                &mut meters,
                d.site_type_meters.get(site),
            );
            self.site_type_meters.set(site, meters);
        }
        fix(
            "cableCostPerMeter.ac".into(),
            &mut self.cable_cost_per_meter.ac,
            d.cable_cost_per_meter.ac,
        );
        fix(
            "cableCostPerMeter.dc".into(),
            &mut self.cable_cost_per_meter.dc,
            d.cable_cost_per_meter.dc,
        );
        fix(
            "carrierCostPerMeter.tray".into(),
            &mut self.carrier_cost_per_meter.tray,
            d.carrier_cost_per_meter.tray,
        );
        fix(
            "carrierCostPerMeter.trench".into(),
            &mut self.carrier_cost_per_meter.trench,
            d.carrier_cost_per_meter.trench,
        );
        fix(
            "chargerUnitPrice.ac".into(),
            &mut self.charger_unit_price.ac,
            d.charger_unit_price.ac,
        );
        fix(
            "chargerUnitPrice.dc".into(),
            &mut self.charger_unit_price.dc,
            d.charger_unit_price.dc,
        );
        fix(
            "labourMarkupPercent".into(),
            &mut self.labour_markup_percent,
            d.labour_markup_percent,
        );
        replaced
    }
}

/// A partial coefficient table.
///
/// Also the shape persisted records are read through, so the short field
/// names written by earlier builds are accepted as aliases.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssumptionsPatch {
    pub site_type_meters: Option<SiteTypeMeters>,
    #[serde(alias = "cableCostPerM")]
    pub cable_cost_per_meter: Option<CablePerMeter>,
    #[serde(alias = "carrierPerM")]
    pub carrier_cost_per_meter: Option<CarrierPerMeter>,
    #[serde(alias = "chargerPrice")]
    pub charger_unit_price: Option<ChargerUnitPrice>,
    #[serde(alias = "labourMarkupPct")]
    pub labour_markup_percent: Option<f64>,
}

/// What the user configured on the calculator form.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimateRequest {
    pub site_type: Option<SiteType>,
    pub ac_count: u32,
    pub dc_count: u32,
    pub is_underground: bool,
    /// Multiplier on the site's default run length.
    pub run_factor: f64,
}

impl Default for EstimateRequest {
    fn default() -> Self {
        Self {
            site_type: None,
            ac_count: 0,
            dc_count: 0,
            is_underground: false,
            run_factor: 1.0,
        }
    }
}

/// Direct substitutions applied by the calculator when the user types a
/// value instead of deriving it.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EstimateOverrides {
    pub effective_run_m: Option<u32>,
    pub ac_count: Option<u32>,
    pub dc_count: Option<u32>,
}

/// Itemized price. Every field is derived from a request and a table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Estimate {
    pub effective_run_m: u32,
    pub per_meter_rate: f64,
    pub cabling_cost: f64,
    pub charger_cost: f64,
    /// Subtotal before the labour markup.
    pub cost: f64,
    pub final_price: f64,
}

impl Estimate {
    pub fn markup(&self) -> f64 {
        self.final_price - self.cost
    }
}

/// Incumbent price multiplier per site type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IncumbentMultipliers {
    #[serde(rename = "Car Dealership")]
    pub car_dealership: f64,
    #[serde(rename = "Public Station")]
    pub public_station: f64,
    #[serde(rename = "Office Building")]
    pub office_building: f64,
    #[serde(rename = "Apartment")]
    pub apartment: f64,
    #[serde(rename = "House")]
    pub house: f64,
}

impl Default for IncumbentMultipliers {
    fn default() -> Self {
        Self {
            car_dealership: 1.35,
            public_station: 1.42,
            office_building: 1.28,
            apartment: 1.25,
            house: 1.20,
        }
    }
}

impl IncumbentMultipliers {
    pub fn get(&self, site: SiteType) -> f64 {
        match site {
            SiteType::CarDealership => self.car_dealership,
            SiteType::PublicStation => self.public_station,
            SiteType::OfficeBuilding => self.office_building,
            SiteType::Apartment => self.apartment,
            SiteType::House => self.house,
        }
    }
}

/// Business assumptions used only when presenting a quote.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteCoefficients {
    pub incumbent_multipliers: IncumbentMultipliers,
    /// Kilograms of CO2 saved per year for every $1000 of charger hardware.
    pub co2_kg_per_thousand: f64,
    pub validity_days: i64,
}

impl Default for QuoteCoefficients {
    fn default() -> Self {
        Self {
            incumbent_multipliers: IncumbentMultipliers::default(),
            co2_kg_per_thousand: 2.5,
            validity_days: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteMetrics {
    pub one_off_cost: f64,
    #[serde(rename = "operatingCostPA")]
    pub operating_cost_pa: f64,
    pub incumbent_annual_price: f64,
    #[serde(rename = "estimatedCO2SavingsPA")]
    pub estimated_co2_savings_pa: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub label: String,
    pub qty: u32,
    pub unit: String,
    pub unit_price: f64,
    pub subtotal: f64,
}

/// The subset of quote fields that travels between pages in the query string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuoteParams {
    pub site_type: Option<SiteType>,
    pub ac_count: Option<u32>,
    pub dc_count: Option<u32>,
    pub is_underground: Option<bool>,
    pub effective_run_m: Option<u32>,
    pub contact_name: Option<String>,
    pub contact_email: Option<String>,
    pub address: Option<String>,
    pub estimate: Option<Estimate>,
}

/// A fully assembled quote document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub quote_number: String,
    pub date_generated: String,
    pub valid_until: String,
    pub site_type: SiteType,
    pub ac_count: u32,
    pub dc_count: u32,
    pub is_underground: bool,
    pub effective_run_m: u32,
    pub contact_name: Option<String>,
    pub contact_email: Option<String>,
    pub address: Option<String>,
    pub estimate: Estimate,
    pub metrics: QuoteMetrics,
    pub line_items: Vec<LineItem>,
    pub savings_vs_incumbent: f64,
    pub monthly_equivalent: f64,
}

#[derive(Debug, Tabled, Clone)]
pub struct LineItemRow {
    #[tabled(rename = "Item")]
    pub label: String,
    #[tabled(rename = "Qty")]
    pub qty: String,
    #[tabled(rename = "Unit")]
    pub unit: String,
    #[tabled(rename = "UnitPrice")]
    pub unit_price: String,
    #[tabled(rename = "Subtotal")]
    pub subtotal: String,
}

#[derive(Debug, Tabled, Clone)]
pub struct BreakdownRow {
    #[tabled(rename = "Item")]
    pub item: String,
    #[tabled(rename = "Value")]
    pub value: String,
}
