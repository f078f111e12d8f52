//! Failure markers emitted by the monitored application.
//!
//! Order matters: it is the resolution tie-break and downstream remediation
//! depends on it, so new entries go at the end.

/// `(name, substring)` pairs registered by `TriggerRegistry::builtin`.
pub const BUILTIN_TRIGGERS: &[(&str, &str)] = &[
    // Corrupt reference table; remediation clears the reference-table store.
    (
        "FAILED_GET_REFERENCE_TABLES",
        "storeAction() fail: LoadAll:getAllReferenceTables",
    ),
    // Missing device info or a corrupt object store; remediation clears device
    // info, cookies and the service worker.
    (
        "FAILED_GET_DEVICE_INFO",
        "storeAction() fail: LoadByKey:getDeviceInfo",
    ),
    // Database corruption; hard reset of the application data directory.
    ("CORRUPT_SCHEMA", "init schema: error: Internal error"),
    // Database corruption; hard reset of the application data directory.
    ("STORES_NOT_CORRECTLY_SET_UP", "Stores not correctly set up, db"),
];
