use crate::storage::Storage;
use crate::types::{
    Assumptions, AssumptionsPatch, CablePerMeter, CarrierPerMeter, ChargerUnitPrice, SiteTypeMeters,
};
use serde::Deserialize;
use tracing::{debug, info, warn};

pub const STORAGE_KEY: &str = "ev-calculator-assumptions";
pub const LEGACY_STORAGE_KEY: &str = "jetcharge-assumptions";

/// What happened to the legacy record when a store was opened.
#[derive(Debug, Clone, PartialEq)]
pub enum MigrationOutcome {
    NoLegacyRecord,
    /// Legacy values were written under the current key and the legacy record removed.
    Migrated,
    /// A current record already existed; the legacy record was removed unread.
    Superseded,
    /// The legacy record could not be parsed and was removed.
    Discarded,
    /// The current record could not be read; the legacy record is left
    /// untouched for the next session.
    Skipped,
    /// The migrated table could not be written; the legacy record is kept
    /// for the next session and the table is used in memory.
    Deferred(Assumptions),
}

/// Holds the coefficient table for a session and writes every change through
/// to storage.
///
/// Storage failures never surface to callers: reads fall back to defaults,
/// failed writes leave the in-memory table authoritative.
#[derive(Debug)]
pub struct AssumptionsStore<S: Storage> {
    storage: S,
    assumptions: Assumptions,
}

impl<S: Storage> AssumptionsStore<S> {
    /// Migrate any legacy record, then load the current one over defaults.
    pub fn open(storage: S) -> Self {
        let assumptions = match migrate_legacy(&storage) {
            MigrationOutcome::Deferred(table) => table,
            outcome => {
                debug!(?outcome, "legacy assumptions check");
                load_from_storage(&storage)
            }
        };
        Self {
            storage,
            assumptions,
        }
    }

    /// An owned copy; mutating it does not affect the store.
    pub fn get(&self) -> Assumptions {
        self.assumptions.clone()
    }

    /// Negative or non-finite values in `patch` are replaced by defaults.
    pub fn patch(&mut self, patch: AssumptionsPatch) {
        self.assumptions = sanitized(self.assumptions.clone().merged(patch));
        self.save();
    }

    pub fn reset_to_defaults(&mut self) {
        self.assumptions = Assumptions::default();
        self.save();
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    fn save(&self) {
        let json = match serde_json::to_string(&self.assumptions) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "failed to encode assumptions");
                return;
            }
        };
        if let Err(e) = self.storage.set(STORAGE_KEY, &json) {
            warn!(error = %e, "failed to save assumptions; keeping them for this session only");
        }
    }
}

/// Defaults, overlaid with whatever top-level fields the persisted record has.
fn load_from_storage<S: Storage>(storage: &S) -> Assumptions {
    let stored = match storage.get(STORAGE_KEY) {
        Ok(Some(s)) => s,
        Ok(None) => return Assumptions::default(),
        Err(e) => {
            warn!(error = %e, "failed to read assumptions; using defaults");
            return Assumptions::default();
        }
    };
    match serde_json::from_str::<AssumptionsPatch>(&stored) {
        Ok(patch) => sanitized(Assumptions::default().merged(patch)),
        Err(e) => {
            warn!(error = %e, "stored assumptions are malformed; using defaults");
            Assumptions::default()
        }
    }
}

/// Coefficients must be finite and non-negative; anything else falls back
/// to its default.
fn sanitized(mut table: Assumptions) -> Assumptions {
    let replaced = table.sanitize();
    if !replaced.is_empty() {
        warn!(fields = ?replaced, "invalid assumption values replaced with defaults");
    }
    table
}

// Earlier builds persisted the table under different, nested names. Every
// field is optional so a half-written record still migrates.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct LegacyAssumptions {
    site_distances: LegacySiteDistances,
    cable_costs: LegacyAcDc,
    carrier_costs: LegacyCarrier,
    charger_prices: LegacyAcDc,
    labour_markup: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct LegacySiteDistances {
    car_dealership: Option<f64>,
    public_station: Option<f64>,
    office_building: Option<f64>,
    apartment: Option<f64>,
    house: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LegacyAcDc {
    ac: Option<f64>,
    dc: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LegacyCarrier {
    tray: Option<f64>,
    trench: Option<f64>,
}

impl LegacyAssumptions {
    fn into_current(self) -> Assumptions {
        let d = Assumptions::default();
        let sites = self.site_distances;
        Assumptions {
            site_type_meters: SiteTypeMeters {
                car_dealership: sites
                    .car_dealership
                    .unwrap_or(d.site_type_meters.car_dealership),
                public_station: sites
                    .public_station
                    .unwrap_or(d.site_type_meters.public_station),
                office_building: sites
                    .office_building
                    .unwrap_or(d.site_type_meters.office_building),
                apartment: sites.apartment.unwrap_or(d.site_type_meters.apartment),
                house: sites.house.unwrap_or(d.site_type_meters.house),
            },
            cable_cost_per_meter: CablePerMeter {
                ac: self.cable_costs.ac.unwrap_or(d.cable_cost_per_meter.ac),
                dc: self.cable_costs.dc.unwrap_or(d.cable_cost_per_meter.dc),
            },
            carrier_cost_per_meter: CarrierPerMeter {
                tray: self
                    .carrier_costs
                    .tray
                    .unwrap_or(d.carrier_cost_per_meter.tray),
                trench: self
                    .carrier_costs
                    .trench
                    .unwrap_or(d.carrier_cost_per_meter.trench),
            },
            charger_unit_price: ChargerUnitPrice {
                ac: self.charger_prices.ac.unwrap_or(d.charger_unit_price.ac),
                dc: self.charger_prices.dc.unwrap_or(d.charger_unit_price.dc),
            },
            labour_markup_percent: self.labour_markup.unwrap_or(d.labour_markup_percent),
        }
    }
}

/// One-time move of the legacy record into the current schema.
///
/// Running it again after a successful run finds no legacy record and does
/// nothing.
pub fn migrate_legacy<S: Storage>(storage: &S) -> MigrationOutcome {
    let legacy = match storage.get(LEGACY_STORAGE_KEY) {
        Ok(Some(s)) => s,
        Ok(None) => return MigrationOutcome::NoLegacyRecord,
        Err(e) => {
            warn!(error = %e, "failed to read legacy assumptions; skipping migration");
            return MigrationOutcome::NoLegacyRecord;
        }
    };

    let current = match storage.get(STORAGE_KEY) {
        Ok(current) => current,
        Err(e) => {
            warn!(error = %e, "failed to read current assumptions; keeping legacy record");
            return MigrationOutcome::Skipped;
        }
    };
    let current_is_usable = current
        .as_deref()
        .is_some_and(|s| serde_json::from_str::<AssumptionsPatch>(s).is_ok());

    // A current record that does not parse would load as defaults, so the
    // legacy values still win over it.
    let outcome = if current_is_usable {
        MigrationOutcome::Superseded
    } else {
        match serde_json::from_str::<LegacyAssumptions>(&legacy) {
            Ok(parsed) => {
                let table = sanitized(parsed.into_current());
                let written = serde_json::to_string(&table)
                    .map_err(|e| e.to_string())
                    .and_then(|json| {
                        storage
                            .set(STORAGE_KEY, &json)
                            .map_err(|e| e.to_string())
                    });
                if let Err(e) = written {
                    warn!(error = %e, "failed to write migrated assumptions");
                    return MigrationOutcome::Deferred(table);
                }
                MigrationOutcome::Migrated
            }
            Err(e) => {
                warn!(error = %e, "legacy assumptions are malformed; discarding");
                MigrationOutcome::Discarded
            }
        }
    };

    if let Err(e) = storage.remove(LEGACY_STORAGE_KEY) {
        warn!(error = %e, "failed to remove legacy assumptions record");
    }
    info!(?outcome, "legacy assumptions record processed");
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimate::compute_estimate;
    use crate::storage::{MemoryStorage, StorageError};
    use crate::types::{EstimateRequest, SiteType};
    use std::io;

    /// Reads from an inner store but refuses every write.
    struct ReadOnly(MemoryStorage);

    impl Storage for ReadOnly {
        fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.0.get(key)
        }
        fn set(&self, key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::Write {
                key: key.to_string(),
                source: io::Error::new(io::ErrorKind::PermissionDenied, "read-only"),
            })
        }
        fn remove(&self, key: &str) -> Result<(), StorageError> {
            Err(StorageError::Remove {
                key: key.to_string(),
                source: io::Error::new(io::ErrorKind::PermissionDenied, "read-only"),
            })
        }
    }

    fn stored(storage: &MemoryStorage) -> serde_json::Value {
        serde_json::from_str(&storage.get(STORAGE_KEY).unwrap().unwrap()).unwrap()
    }

    #[test]
    fn empty_storage_yields_defaults() {
        let store = AssumptionsStore::open(MemoryStorage::new());
        assert_eq!(store.get(), Assumptions::default());
    }

    #[test]
    fn get_returns_a_detached_copy() {
        let store = AssumptionsStore::open(MemoryStorage::new());
        let mut copy = store.get();
        copy.labour_markup_percent = 99.0;
        copy.site_type_meters.set(SiteType::House, 999.0);
        assert_eq!(store.get(), Assumptions::default());
    }

    #[test]
    fn patch_merges_and_persists() {
        let storage = MemoryStorage::new();
        let mut store = AssumptionsStore::open(storage.clone());
        store.patch(AssumptionsPatch {
            labour_markup_percent: Some(50.0),
            ..Default::default()
        });

        let table = store.get();
        assert_eq!(table.labour_markup_percent, 50.0);
        assert_eq!(table.cable_cost_per_meter, CablePerMeter { ac: 50.0, dc: 150.0 });
        assert_eq!(table.site_type_meters, SiteTypeMeters::default());
        assert_eq!(stored(&storage)["labourMarkupPercent"], 50.0);

        let reopened = AssumptionsStore::open(storage);
        assert_eq!(reopened.get(), table);
    }

    #[test]
    fn patch_replaces_sub_objects_wholesale() {
        let mut store = AssumptionsStore::open(MemoryStorage::new());
        store.patch(AssumptionsPatch {
            carrier_cost_per_meter: Some(CarrierPerMeter {
                tray: 10.0,
                trench: 20.0,
            }),
            ..Default::default()
        });
        let table = store.get();
        assert_eq!(table.carrier_cost_per_meter, CarrierPerMeter { tray: 10.0, trench: 20.0 });
        assert_eq!(table.charger_unit_price, ChargerUnitPrice::default());
    }

    #[test]
    fn reset_restores_defaults_and_persists() {
        let storage = MemoryStorage::new();
        let mut store = AssumptionsStore::open(storage.clone());
        store.patch(AssumptionsPatch {
            labour_markup_percent: Some(5.0),
            charger_unit_price: Some(ChargerUnitPrice { ac: 1.0, dc: 2.0 }),
            ..Default::default()
        });
        store.reset_to_defaults();
        assert_eq!(store.get(), Assumptions::default());
        store.reset_to_defaults();
        assert_eq!(store.get(), Assumptions::default());
        assert_eq!(AssumptionsStore::open(storage).get(), Assumptions::default());
    }

    #[test]
    fn malformed_record_falls_back_to_defaults() {
        let storage = MemoryStorage::new();
        storage.set(STORAGE_KEY, "{not json").unwrap();
        assert_eq!(AssumptionsStore::open(storage).get(), Assumptions::default());
    }

    #[test]
    fn old_record_missing_fields_is_completed_from_defaults() {
        let storage = MemoryStorage::new();
        storage
            .set(STORAGE_KEY, r#"{"labourMarkupPct":30,"chargerPrice":{"ac":1500}}"#)
            .unwrap();
        let table = AssumptionsStore::open(storage).get();
        assert_eq!(table.labour_markup_percent, 30.0);
        assert_eq!(table.charger_unit_price, ChargerUnitPrice { ac: 1500.0, dc: 25000.0 });
        assert_eq!(table.site_type_meters, SiteTypeMeters::default());
    }

    #[test]
    fn failed_write_keeps_patch_in_memory() {
        let mut store = AssumptionsStore::open(ReadOnly(MemoryStorage::new()));
        store.patch(AssumptionsPatch {
            labour_markup_percent: Some(12.5),
            ..Default::default()
        });
        assert_eq!(store.get().labour_markup_percent, 12.5);
        assert_eq!(store.storage().get(STORAGE_KEY).unwrap(), None);
    }

    #[test]
    fn legacy_record_is_migrated_once() {
        let storage = MemoryStorage::new();
        storage
            .set(
                LEGACY_STORAGE_KEY,
                r#"{"siteDistances":{"carDealership":70,"house":25},
                    "cableCosts":{"ac":55,"dc":155},
                    "carrierCosts":{"tray":60},
                    "labourMarkup":40}"#,
            )
            .unwrap();

        assert_eq!(migrate_legacy(&storage), MigrationOutcome::Migrated);
        assert!(!storage.contains(LEGACY_STORAGE_KEY));
        let after_first = storage.get(STORAGE_KEY).unwrap();

        assert_eq!(migrate_legacy(&storage), MigrationOutcome::NoLegacyRecord);
        assert_eq!(storage.get(STORAGE_KEY).unwrap(), after_first);

        let table = AssumptionsStore::open(storage).get();
        assert_eq!(table.site_type_meters.get(SiteType::CarDealership), 70.0);
        assert_eq!(table.site_type_meters.get(SiteType::House), 25.0);
        assert_eq!(table.site_type_meters.get(SiteType::PublicStation), 40.0);
        assert_eq!(table.cable_cost_per_meter, CablePerMeter { ac: 55.0, dc: 155.0 });
        assert_eq!(table.carrier_cost_per_meter, CarrierPerMeter { tray: 60.0, trench: 1000.0 });
        assert_eq!(table.charger_unit_price, ChargerUnitPrice::default());
        assert_eq!(table.labour_markup_percent, 40.0);
    }

    #[test]
    fn open_runs_the_migration() {
        let storage = MemoryStorage::new();
        storage
            .set(LEGACY_STORAGE_KEY, r#"{"labourMarkup":10}"#)
            .unwrap();
        let store = AssumptionsStore::open(storage.clone());
        assert_eq!(store.get().labour_markup_percent, 10.0);
        assert!(!storage.contains(LEGACY_STORAGE_KEY));
        assert!(storage.contains(STORAGE_KEY));
    }

    #[test]
    fn current_record_supersedes_legacy() {
        let storage = MemoryStorage::new();
        storage.set(STORAGE_KEY, r#"{"labourMarkupPercent":20}"#).unwrap();
        storage.set(LEGACY_STORAGE_KEY, r#"{"labourMarkup":10}"#).unwrap();
        assert_eq!(migrate_legacy(&storage), MigrationOutcome::Superseded);
        assert!(!storage.contains(LEGACY_STORAGE_KEY));
        assert_eq!(AssumptionsStore::open(storage).get().labour_markup_percent, 20.0);
    }

    #[test]
    fn malformed_legacy_record_is_discarded() {
        let storage = MemoryStorage::new();
        storage.set(LEGACY_STORAGE_KEY, "[1,2").unwrap();
        assert_eq!(migrate_legacy(&storage), MigrationOutcome::Discarded);
        assert!(!storage.contains(LEGACY_STORAGE_KEY));
        assert!(!storage.contains(STORAGE_KEY));
    }

    #[test]
    fn unwritable_migration_is_deferred_but_used() {
        let inner = MemoryStorage::new();
        inner.set(LEGACY_STORAGE_KEY, r#"{"labourMarkup":33}"#).unwrap();
        let store = AssumptionsStore::open(ReadOnly(inner.clone()));
        assert_eq!(store.get().labour_markup_percent, 33.0);
        assert!(inner.contains(LEGACY_STORAGE_KEY));
    }

    /// Fails every read of the current record; everything else passes through.
    struct UnreadableCurrent(MemoryStorage);

    impl Storage for UnreadableCurrent {
        fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            if key == STORAGE_KEY {
                return Err(StorageError::Read {
                    key: key.to_string(),
                    source: io::Error::new(io::ErrorKind::Other, "disk busy"),
                });
            }
            self.0.get(key)
        }
        fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
            self.0.set(key, value)
        }
        fn remove(&self, key: &str) -> Result<(), StorageError> {
            self.0.remove(key)
        }
    }

    #[test]
    fn negative_stored_values_fall_back_to_defaults() {
        let storage = MemoryStorage::new();
        storage
            .set(
                STORAGE_KEY,
                r#"{"labourMarkupPercent":-50,"chargerUnitPrice":{"ac":-3000,"dc":25000}}"#,
            )
            .unwrap();
        let table = AssumptionsStore::open(storage).get();
        assert_eq!(table.labour_markup_percent, 42.15);
        assert_eq!(table.charger_unit_price, ChargerUnitPrice::default());

        let request = EstimateRequest {
            site_type: Some(SiteType::CarDealership),
            ac_count: 1,
            ..Default::default()
        };
        let estimate = compute_estimate(&request, &table);
        assert!(estimate.charger_cost >= 0.0);
        assert!(estimate.final_price >= estimate.cost);
    }

    #[test]
    fn negative_patch_values_are_not_applied() {
        let storage = MemoryStorage::new();
        let mut store = AssumptionsStore::open(storage.clone());
        store.patch(AssumptionsPatch {
            labour_markup_percent: Some(-10.0),
            cable_cost_per_meter: Some(CablePerMeter {
                ac: 70.0,
                dc: f64::INFINITY,
            }),
            ..Default::default()
        });
        let table = store.get();
        assert_eq!(table.labour_markup_percent, 42.15);
        assert_eq!(table.cable_cost_per_meter, CablePerMeter { ac: 70.0, dc: 150.0 });
        assert_eq!(stored(&storage)["labourMarkupPercent"], 42.15);
    }

    #[test]
    fn legacy_record_replaces_malformed_current_record() {
        let storage = MemoryStorage::new();
        storage.set(STORAGE_KEY, "{garbage").unwrap();
        storage.set(LEGACY_STORAGE_KEY, r#"{"labourMarkup":10}"#).unwrap();
        let store = AssumptionsStore::open(storage.clone());
        assert_eq!(store.get().labour_markup_percent, 10.0);
        assert!(!storage.contains(LEGACY_STORAGE_KEY));
        assert_eq!(stored(&storage)["labourMarkupPercent"], 10.0);
    }

    #[test]
    fn unreadable_current_record_keeps_legacy() {
        let inner = MemoryStorage::new();
        inner.set(STORAGE_KEY, r#"{"labourMarkupPercent":20}"#).unwrap();
        inner.set(LEGACY_STORAGE_KEY, r#"{"labourMarkup":10}"#).unwrap();
        let storage = UnreadableCurrent(inner.clone());
        assert_eq!(migrate_legacy(&storage), MigrationOutcome::Skipped);
        assert!(inner.contains(LEGACY_STORAGE_KEY));
        assert_eq!(
            inner.get(STORAGE_KEY).unwrap().as_deref(),
            Some(r#"{"labourMarkupPercent":20}"#)
        );
    }
}
