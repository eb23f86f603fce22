//! Configuration for the Sui mint provider.

use serde::{Deserialize, Serialize};

/// Default gas budget for mint transactions, in MIST.
pub const DEFAULT_GAS_BUDGET: u64 = 3_000_000;

/// Configuration for submitting mint calls against the Sui ledger.
///
/// The bridge does not sign or construct Sui transactions itself; it
/// describes the mint move call and hands it to a signing/execution endpoint
/// (see [`SuiMintProvider`](super::provider::SuiMintProvider)). This
/// configuration identifies the deployed token package and the endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiLedgerConfig {
    /// The signing/execution endpoint the mint call is posted to.
    pub mint_endpoint: String,
    /// The published package id containing the token module.
    pub package_id: String,
    /// The module name inside the package, e.g. `btc_token`.
    pub module: String,
    /// The `TreasuryCap` object id authorizing mints.
    pub treasury_cap: String,
    /// Gas budget for the mint transaction, in MIST.
    #[serde(default = "default_gas_budget")]
    pub gas_budget: u64,
}

fn default_gas_budget() -> u64 {
    DEFAULT_GAS_BUDGET
}

impl SuiLedgerConfig {
    /// Returns the fully qualified move call target, `package::module::mint`.
    pub fn mint_target(&self) -> String {
        format!("{}::{}::mint", self.package_id, self.module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mint_target() {
        let config = SuiLedgerConfig {
            mint_endpoint: "http://localhost:9000/mint".to_string(),
            package_id: "0xabc".to_string(),
            module: "btc_token".to_string(),
            treasury_cap: "0xcap".to_string(),
            gas_budget: DEFAULT_GAS_BUDGET,
        };
        assert_eq!(config.mint_target(), "0xabc::btc_token::mint");
    }

    #[test]
    fn test_gas_budget_defaults_when_omitted() {
        let json = r#"{
            "mint_endpoint": "http://localhost:9000/mint",
            "package_id": "0xabc",
            "module": "btc_token",
            "treasury_cap": "0xcap"
        }"#;
        let config: SuiLedgerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.gas_budget, DEFAULT_GAS_BUDGET);
    }
}
