//! The fixed collection contract: six known stores, their remote table
//! names, and the per-collection primary-key field.
//!
//! The local store accepts arbitrary collection names; the remote client
//! only works with the names listed here.

/// Wire cutting records.
pub const CUTTING_RECORDS: &str = "cuttingRecords";
/// Inventory stock records.
pub const INVENTORY_RECORDS: &str = "inventoryRecords";
/// Maintenance checklist logs.
pub const MAINTENANCE_LOGS: &str = "maintenanceLogs";
/// Saved calculator runs.
pub const CALCULATOR_HISTORY: &str = "calculatorHistory";
/// App settings, including the persisted offline queue.
pub const SETTINGS: &str = "settings";
/// Maintenance/stock notifications.
pub const NOTIFICATIONS: &str = "notifications";

/// Every collection known to the remote store, paired with its table name.
/// Bulk migration and sync walk this list in order.
pub const COLLECTION_TABLES: [(&str, &str); 6] = [
    (CUTTING_RECORDS, "cutting_records"),
    (INVENTORY_RECORDS, "inventory_records"),
    (MAINTENANCE_LOGS, "maintenance_logs"),
    (CALCULATOR_HISTORY, "calculator_history"),
    (SETTINGS, "app_settings"),
    (NOTIFICATIONS, "notifications"),
];

/// Remote table for a collection name, `None` for names outside the
/// contract.
pub fn remote_table(collection: &str) -> Option<&'static str> {
    COLLECTION_TABLES
        .iter()
        .find(|(store, _)| *store == collection)
        .map(|(_, table)| *table)
}

/// Primary-key field of a collection on the remote side. `app_settings`
/// rows are keyed by a caller-supplied `name`; everything else by a
/// backend-generated `id`.
pub fn remote_key_field(collection: &str) -> &'static str {
    if collection == SETTINGS {
        "name"
    } else {
        "id"
    }
}
