//! Admission checks for caller-supplied fields.

use carbon_ledger::Principal;

use crate::error::{MarketError, MarketResult};

/// Rejects empty or oversized free-text fields.
pub(crate) fn text_field(field: &'static str, value: &str, max_len: usize) -> MarketResult<()> {
    if value.trim().is_empty() {
        return Err(MarketError::InvalidInput {
            field,
            reason: "must not be empty".to_string(),
        });
    }
    if value.len() > max_len {
        return Err(MarketError::InvalidInput {
            field,
            reason: format!("{} bytes exceeds limit of {}", value.len(), max_len),
        });
    }
    Ok(())
}

/// Rejects the blank principal.
pub(crate) fn principal(field: &'static str, who: &Principal) -> MarketResult<()> {
    if who.is_empty() {
        return Err(MarketError::InvalidInput {
            field,
            reason: "principal must not be empty".to_string(),
        });
    }
    Ok(())
}

/// Rejects zero amounts.
pub(crate) fn positive_amount(amount: u64) -> MarketResult<()> {
    if amount == 0 {
        return Err(MarketError::InvalidAmount);
    }
    Ok(())
}
