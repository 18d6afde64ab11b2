mod oracle;
mod gas;
mod cost;

pub use oracle::{
    ChainlinkFeed, OracleError, OracleRouter, PriceFeed, PriceFeedRegistry, PricePoint,
    StaticPriceFeed,
};
pub use gas::{attempt_gas_used, leg_gas, FixedGasOracle, GasOracle, ProviderGasOracle, BASE_GAS, FLASH_LOAN_GAS};
pub use cost::ExecutionCostModel;
