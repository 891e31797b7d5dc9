//! Validation utilities for the parts fulfillment workflow

use std::collections::HashSet;

use rust_decimal::Decimal;
use validator::ValidationErrors;

use crate::error::WorkflowError;
use crate::models::{BranchRequirement, ItemGroup};
use crate::types::Actor;

// ============================================================================
// Field Validations
// ============================================================================

/// Trimmed value, or None when absent or blank
pub fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Require a non-blank text value
pub fn require_text(value: Option<&str>) -> Result<String, &'static str> {
    non_blank(value).ok_or("is required")
}

/// Require a quantity strictly greater than zero
pub fn require_positive_quantity(quantity: Option<u32>) -> Result<u32, &'static str> {
    match quantity {
        None => Err("is required"),
        Some(0) => Err("must be greater than 0"),
        Some(q) => Ok(q),
    }
}

/// Validate all three item-group levels are filled in
pub fn validate_item_group(group: &ItemGroup) -> Result<(), (&'static str, &'static str)> {
    if group.level1.trim().is_empty() {
        return Err(("itemGroup.level1", "item group level 1 is required"));
    }
    if group.level2.trim().is_empty() {
        return Err(("itemGroup.level2", "item group level 2 is required"));
    }
    if group.level3.trim().is_empty() {
        return Err(("itemGroup.level3", "item group level 3 is required"));
    }
    Ok(())
}

/// Price may be absent or zero, never negative
pub fn validate_price(price: Option<Decimal>) -> Result<(), &'static str> {
    match price {
        Some(p) if p < Decimal::ZERO => Err("price cannot be negative"),
        _ => Ok(()),
    }
}

/// Validate ISO 4217 style currency code (3 uppercase letters)
pub fn validate_currency_code(code: &str) -> Result<(), &'static str> {
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase()) {
        Ok(())
    } else {
        Err("currency must be 3 uppercase letters")
    }
}

/// Each branch may appear only once in a request
pub fn validate_unique_branches(requirements: &[BranchRequirement]) -> Result<(), &'static str> {
    let mut seen = HashSet::new();
    if requirements.iter().all(|r| seen.insert(r.branch_id.as_str())) {
        Ok(())
    } else {
        Err("each branch may appear only once")
    }
}

/// The acting user must be identified
pub fn validate_actor(actor: &Actor) -> Result<(), &'static str> {
    if actor.uid.trim().is_empty() || actor.name.trim().is_empty() {
        return Err("actor uid and name are required");
    }
    Ok(())
}

/// Supplier for a purchase order: the explicit actual supplier wins, the
/// supplier named at submission is the fallback
pub fn resolve_supplier(actual: Option<&str>, initial: Option<&str>) -> Option<String> {
    non_blank(actual).or_else(|| non_blank(initial))
}

// ============================================================================
// validator crate bridge
// ============================================================================

/// Turn derive-validation errors into a single field error.
///
/// Picks the alphabetically first failing field so the result is stable, and
/// reports it in camelCase under `prefix`.
pub fn first_violation(errors: &ValidationErrors, prefix: &str) -> WorkflowError {
    let field_errors = errors.field_errors();
    let first = field_errors
        .iter()
        .min_by_key(|(field, _)| **field)
        .map(|(field, list)| {
            let message = list
                .first()
                .and_then(|e| e.message.as_ref().map(|m| m.to_string()))
                .unwrap_or_else(|| "is invalid".to_string());
            (to_camel_case(field), message)
        });

    let (field, message) = first.unwrap_or_else(|| ("input".to_string(), "is invalid".to_string()));
    let field = if prefix.is_empty() {
        field
    } else {
        format!("{}.{}", prefix, field)
    };
    WorkflowError::validation(field, message)
}

fn to_camel_case(snake: &str) -> String {
    let mut out = String::with_capacity(snake.len());
    let mut upper = false;
    for c in snake.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}
