use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::money::Money;

/// Share rates and advance limits applied by the settlement engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementPolicy {
    pub service_share: Decimal,
    pub add_on_share: Decimal,
    pub consumption_share: Decimal,
    pub max_advance: Money,
}

impl Default for SettlementPolicy {
    fn default() -> Self {
        Self {
            service_share: Decimal::new(5, 1),
            add_on_share: Decimal::ONE,
            consumption_share: Decimal::new(2, 1),
            max_advance: Money::from(50_000),
        }
    }
}
