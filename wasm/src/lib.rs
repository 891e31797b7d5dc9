//! WebAssembly module for the parts fulfillment client
//!
//! Provides client-side computation for:
//! - Dispatch ledger totals and the capacity check shown while editing
//! - Branch toggles across a bulk dispatch form
//! - Set progress
//! - Offline validation of new requests
//!
//! Everything here mirrors checks the server repeats on commit.

use rust_decimal::prelude::ToPrimitive;
use wasm_bindgen::prelude::*;

// Re-export shared types for use in JavaScript
pub use shared::models::*;
pub use shared::types::*;

fn parse<T: serde::de::DeserializeOwned>(json: &str, what: &str) -> Result<T, JsValue> {
    serde_json::from_str(json).map_err(|e| JsValue::from_str(&format!("Invalid {} JSON: {}", what, e)))
}

fn rejection(error: shared::WorkflowError) -> JsValue {
    web_sys::console::warn_1(&JsValue::from_str(&format!("{}: {}", error.code(), error)));
    JsValue::from_str(&error.to_string())
}

/// Sum of planned quantities over toggled rows
#[wasm_bindgen]
pub fn ledger_total_planned(ledger_json: &str) -> Result<u64, JsValue> {
    let ledger: DispatchLedger = parse(ledger_json, "ledger")?;
    Ok(ledger.total_planned())
}

/// Remaining quantity after the toggled rows, or the capacity error
#[wasm_bindgen]
pub fn ledger_check_capacity(ledger_json: &str, received: u32) -> Result<u32, JsValue> {
    let ledger: DispatchLedger = parse(ledger_json, "ledger")?;
    ledger.check_capacity(received).map_err(rejection)
}

/// Names of branches not yet toggled
#[wasm_bindgen]
pub fn pending_branches(ledger_json: &str) -> Result<js_sys::Array, JsValue> {
    let ledger: DispatchLedger = parse(ledger_json, "ledger")?;
    Ok(ledger
        .pending_branches()
        .map(|row| JsValue::from_str(&row.branch_name))
        .collect())
}

/// Whether every ledger having `branch_name` has it toggled on
#[wasm_bindgen]
pub fn is_branch_fully_dispatched(ledgers_json: &str, branch_name: &str) -> Result<bool, JsValue> {
    let ledgers: Vec<DispatchLedger> = parse(ledgers_json, "ledgers")?;
    Ok(is_branch_fully_dispatched_across(&ledgers, branch_name))
}

/// Completion percentage of a set
#[wasm_bindgen]
pub fn set_progress_percentage(completed: u32, total: u32) -> f64 {
    calculate_progress_percentage(completed, total)
        .to_f64()
        .unwrap_or(0.0)
}

/// Full progress view for a set from its members' statuses
#[wasm_bindgen]
pub fn set_progress(set_id: &str, statuses_json: &str) -> Result<String, JsValue> {
    let statuses: Vec<RequestStatus> = parse(statuses_json, "statuses")?;
    let progress = SetProgress::derive(set_id, statuses);
    serde_json::to_string(&progress).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Display label for a status; Korean unless `language` is "en"
#[wasm_bindgen]
pub fn status_label(status: &str, language: Option<String>) -> Result<String, JsValue> {
    let status: RequestStatus = status.parse().map_err(rejection)?;
    let language = match language.as_deref() {
        Some("en") => Language::English,
        _ => Language::Korean,
    };
    Ok(status.label(language).to_string())
}

/// Check a new request before it is queued offline
#[wasm_bindgen]
pub fn validate_request_input(input_json: &str) -> Result<(), JsValue> {
    let input: CreateRequestInput = parse(input_json, "request")?;
    input.check("").map_err(rejection)
}
