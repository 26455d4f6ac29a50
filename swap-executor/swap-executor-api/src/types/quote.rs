//! API types describing a price quote and the tokens it trades
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

use crate::orders::SignableOrder;

// ---------
// | Types |
// ---------

/// The settlement protocol of a quote
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// A same-chain swap
    Swap,
    /// A resting limit order settled by a relayer
    Limit,
    /// A cross-chain bridge
    Bridge,
}

/// Which side of the trade the quoted amount fixes
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QuoteKind {
    /// The pay amount is fixed
    Sell,
    /// The receive amount is fixed
    Buy,
}

/// A token on a specific network
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SwapToken {
    /// The network the token lives on
    pub network_id: String,
    /// The token contract address, empty for the native asset on some chains
    pub contract_address: String,
    /// The token ticker
    pub symbol: String,
    /// The number of decimals of the token
    pub decimals: u8,
    /// Whether the token is the network's native asset
    #[serde(default)]
    pub is_native: bool,
}

impl SwapToken {
    /// Whether two tokens refer to the same asset
    ///
    /// Contract addresses are compared case-insensitively
    pub fn same_asset(&self, other: &SwapToken) -> bool {
        self.network_id == other.network_id
            && self.contract_address.eq_ignore_ascii_case(&other.contract_address)
    }
}

/// The allowance a quote requires before its swap can execute
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AllowanceRequirement {
    /// The spender that must be approved
    pub allowance_target: String,
    /// The amount the allowance was checked against
    pub amount: BigDecimal,
    /// Whether a non-zero allowance must be reset to zero first
    #[serde(default)]
    pub should_reset_approve: bool,
}

/// A single hop inside a route
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RouteHop {
    /// The liquidity source used for the hop
    pub name: String,
    /// The share of the route's volume, in percent
    #[serde(default)]
    pub part: Option<BigDecimal>,
}

/// A route through one or more liquidity sources
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    /// The share of the input amount routed through this path, in percent
    #[serde(default)]
    pub part: Option<BigDecimal>,
    /// The hops grouped by leg, if the provider reports them
    #[serde(default)]
    pub sub_routes: Option<Vec<Vec<RouteHop>>>,
}

impl Route {
    /// The number of hops this route contributes to a gas estimate
    ///
    /// A route without hop information counts as a single hop
    pub fn hop_count(&self) -> u64 {
        match &self.sub_routes {
            Some(legs) => legs.iter().map(|leg| leg.len() as u64).sum(),
            None => 1,
        }
    }
}

/// Sum the hop counts of a set of routes
pub fn total_hop_count(routes: &[Route]) -> u64 {
    routes.iter().map(Route::hop_count).sum()
}

/// An additional fee, paid in a token other than the network fee token
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OtherFeeInfo {
    /// The token the fee is charged in
    pub token: SwapToken,
    /// The fee amount
    pub amount: BigDecimal,
}

/// The provider's report that network costs are large relative to the trade
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkCostExceedInfo {
    /// The network cost, denominated in the receive token
    pub cost: BigDecimal,
    /// The provider-computed share of the receive amount, in percent
    pub exceed_percent: BigDecimal,
}

/// The provider that produced a quote
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProviderInfo {
    /// The provider identifier
    pub provider: String,
    /// The human readable provider name
    #[serde(default)]
    pub provider_name: String,
}

/// An immutable price quote
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuoteSnapshot {
    /// The quote identifier assigned by the quote service
    pub quote_id: String,
    /// The settlement protocol
    pub protocol: Protocol,
    /// Which amount is fixed
    pub kind: QuoteKind,
    /// The token being paid
    pub from_token: SwapToken,
    /// The token being received
    pub to_token: SwapToken,
    /// The pay amount, in token units
    pub from_amount: BigDecimal,
    /// The receive amount, in token units
    pub to_amount: BigDecimal,
    /// The allowance required before swapping, if any
    #[serde(default)]
    pub allowance: Option<AllowanceRequirement>,
    /// The provider's gas limit for the swap transaction
    #[serde(default)]
    pub gas_limit_hint: Option<u64>,
    /// The routes the swap takes
    #[serde(default)]
    pub routes: Vec<Route>,
    /// The quoting provider
    pub provider: ProviderInfo,
    /// Whether the provider forbids merging approval and swap
    #[serde(default)]
    pub provider_disables_batching: bool,
    /// Whether this is a native <-> wrapped conversion
    #[serde(default)]
    pub is_wrapped: bool,
    /// The order to sign, for protocols settled by a relayer
    #[serde(default)]
    pub signable_order: Option<SignableOrder>,
    /// Auxiliary fees charged in other tokens
    #[serde(default)]
    pub other_fees: Vec<OtherFeeInfo>,
    /// The provider's network cost warning
    #[serde(default)]
    pub network_cost_exceed: Option<NetworkCostExceedInfo>,
    /// Opaque provider context, passed back to the builder untouched
    #[serde(default)]
    pub context: serde_json::Value,
}

impl QuoteSnapshot {
    /// Whether an allowance must be granted before swapping
    pub fn needs_approval(&self) -> bool {
        self.allowance.is_some()
    }

    /// Whether an existing allowance must first be reset to zero
    pub fn should_reset_approve(&self) -> bool {
        self.allowance.as_ref().is_some_and(|a| a.should_reset_approve)
    }

    /// Whether the quote settles through a signed off-chain order
    pub fn requires_offchain_signature(&self) -> bool {
        self.signable_order.is_some()
    }
}
