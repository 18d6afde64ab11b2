pub mod ledger;
pub mod venues;
pub mod fee_prefs;
pub mod router;
mod tiered;
mod path;

pub use ledger::{AssetLedger, CheckpointId, InMemoryLedger};
pub use venues::{FeeTieredVenue, PathVenue};
pub use fee_prefs::{PoolFeePreferences, DEFAULT_FEE_TIER};
pub use router::{QuoteFallbackPolicy, SwapLeg, SwapRouter};
pub use tiered::UniswapStyleTieredVenue;
pub use path::RouterStylePathVenue;
