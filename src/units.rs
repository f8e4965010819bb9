use ethers::{
    types::{
        Address,
        U256,
    },
    utils::{
        format_ether,
        parse_ether,
    },
};
use thiserror::Error;

/// Decimals of the network's native currency.
pub const NATIVE_DECIMALS: usize = 18;

#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum AmountError {
    #[error("amount is empty")]
    Empty,
    #[error("'{0}' is not a decimal amount")]
    Malformed(String),
    #[error("amount must be greater than zero")]
    NotPositive,
}

/// Parses a plain decimal such as `0.25` into base units (wei).
pub fn parse_amount(input: &str) -> Result<U256, AmountError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(AmountError::Empty);
    }
    let (whole, fraction) = match trimmed.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (trimmed, ""),
    };
    let well_formed = !(whole.is_empty() && fraction.is_empty())
        && whole.chars().all(|c| c.is_ascii_digit())
        && fraction.chars().all(|c| c.is_ascii_digit())
        && fraction.len() <= NATIVE_DECIMALS;
    if !well_formed {
        return Err(AmountError::Malformed(trimmed.to_string()));
    }
    let normalized = match (whole.is_empty(), fraction.is_empty()) {
        (true, _) => format!("0.{fraction}"),
        (false, true) => whole.to_string(),
        (false, false) => format!("{whole}.{fraction}"),
    };
    let wei = parse_ether(normalized)
        .map_err(|_| AmountError::Malformed(trimmed.to_string()))?;
    if wei.is_zero() {
        return Err(AmountError::NotPositive);
    }
    Ok(wei)
}

/// Renders base units as a trimmed decimal: `10^16` becomes `0.01`.
pub fn format_amount(wei: U256) -> String {
    let full = format_ether(wei);
    if !full.contains('.') {
        return full;
    }
    full.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// `0x1234...abcd`
pub fn shorten_address(address: &Address) -> String {
    let full = format!("{address:?}");
    if full.len() <= 10 {
        return full;
    }
    format!("{}...{}", &full[..6], &full[full.len() - 4..])
}

/// Pulls an out-of-range amount back inside `[min, max]`. Returns the replacement
/// text when the input parsed and needed clamping.
pub fn clamp_amount_input(
    input: &str,
    min: Option<U256>,
    max: Option<U256>,
) -> Option<String> {
    let value = parse_amount(input).ok()?;
    match (min, max) {
        (Some(min), _) if value < min => Some(format_amount(min)),
        (_, Some(max)) if value > max => Some(format_amount(max)),
        _ => None,
    }
}
