use ethers_core::types::U256;

/// Multiplier applied over quoted gas prices and gas estimates, i.e. 20%.
pub const GAS_UPLIFT_NUMERATOR: u64 = 12;
/// Denominator paired with [`GAS_UPLIFT_NUMERATOR`]
pub const GAS_UPLIFT_DENOMINATOR: u64 = 10;

/// Apply the fixed safety margin to a gas price or gas estimate.
pub fn apply_uplift(value: U256) -> U256 {
    value.saturating_mul(GAS_UPLIFT_NUMERATOR.into()) / U256::from(GAS_UPLIFT_DENOMINATOR)
}
