//! CLI argument definition & parsing for the swap executor

use std::time::Duration;

use clap::{Args, Parser, ValueEnum};
use reqwest::Url;
use swap_executor_api::{gas::FeeTierPreference, tx::AccountKind};

// -------------
// | Constants |
// -------------

/// The network on which every transaction needs its own signer prompt
const TRON_MAINNET: &str = "tron--0x2b6653dc";
/// The number of quote polls after which a held quote is stale
pub const DEFAULT_QUOTE_INTERVAL_MAX_COUNT: u32 = 5;
/// The interval between quote polls, in seconds
pub const DEFAULT_QUOTE_FETCH_INTERVAL_SECS: u64 = 10;
/// The interval between refreshes of a held quote, in seconds
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 15;
/// The default lifetime of a limit order, in seconds
pub const DEFAULT_LIMIT_EXPIRATION_SECS: u64 = 7 * 24 * 60 * 60; // one week

// ---------
// | Types |
// ---------

/// Validated executor configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorConfig {
    /// Networks that need one signer prompt per transaction
    pub unsupported_batch_networks: Vec<String>,
    /// Networks whose plans start in fallback mode
    pub fallback_networks: Vec<String>,
    /// The number of quote polls after which a held quote is stale
    pub quote_interval_max_count: u32,
    /// The interval between quote polls
    pub quote_fetch_interval: Duration,
    /// The interval between refreshes of a held quote
    pub refresh_interval: Duration,
    /// The default lifetime of a limit order
    pub limit_expiration: Duration,
    /// The base URL of the order relayer, if orders are relayed
    pub relayer_url: Option<String>,
    /// The API key sent to the order relayer
    pub relayer_api_key: Option<String>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            unsupported_batch_networks: vec![TRON_MAINNET.to_string()],
            fallback_networks: vec![TRON_MAINNET.to_string()],
            quote_interval_max_count: DEFAULT_QUOTE_INTERVAL_MAX_COUNT,
            quote_fetch_interval: Duration::from_secs(DEFAULT_QUOTE_FETCH_INTERVAL_SECS),
            refresh_interval: Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS),
            limit_expiration: Duration::from_secs(DEFAULT_LIMIT_EXPIRATION_SECS),
            relayer_url: None,
            relayer_api_key: None,
        }
    }
}

impl ExecutorConfig {
    /// Whether the network needs one signer prompt per transaction
    pub fn batch_unsupported(&self, network_id: &str) -> bool {
        self.unsupported_batch_networks.iter().any(|n| n == network_id)
    }

    /// Whether plans on the network start in fallback mode
    pub fn starts_in_fallback(&self, network_id: &str) -> bool {
        self.fallback_networks.iter().any(|n| n == network_id)
    }
}

/// Executor options, shared by every binary embedding the executor
#[rustfmt::skip]
#[derive(Args, Debug, Clone)]
pub struct ExecutorArgs {
    // --- Network Capabilities --- //

    /// Networks that need one signer prompt per transaction
    #[clap(long, env = "SWAP_UNSUPPORTED_BATCH_NETWORKS", value_delimiter = ',', default_value = TRON_MAINNET)]
    pub unsupported_batch_networks: Vec<String>,
    /// Networks whose plans start in fallback mode
    #[clap(long, env = "SWAP_FALLBACK_NETWORKS", value_delimiter = ',', default_value = TRON_MAINNET)]
    pub fallback_networks: Vec<String>,

    // --- Quote Readiness --- //

    /// The number of quote polls after which a held quote is stale
    #[clap(long, env = "SWAP_QUOTE_INTERVAL_MAX_COUNT", default_value_t = DEFAULT_QUOTE_INTERVAL_MAX_COUNT)]
    pub quote_interval_max_count: u32,
    /// The interval between quote polls, in seconds
    #[clap(long, env = "SWAP_QUOTE_FETCH_INTERVAL_SECS", default_value_t = DEFAULT_QUOTE_FETCH_INTERVAL_SECS)]
    pub quote_fetch_interval_secs: u64,
    /// The interval between refreshes of a held quote, in seconds
    #[clap(long, env = "SWAP_REFRESH_INTERVAL_SECS", default_value_t = DEFAULT_REFRESH_INTERVAL_SECS)]
    pub refresh_interval_secs: u64,

    // --- Limit Orders --- //

    /// The default lifetime of a limit order, in seconds
    #[clap(long, env = "SWAP_LIMIT_EXPIRATION_SECS", default_value_t = DEFAULT_LIMIT_EXPIRATION_SECS)]
    pub limit_expiration_secs: u64,
    /// The base URL of the order relayer
    #[clap(long, env = "SWAP_RELAYER_URL")]
    pub relayer_url: Option<String>,
    /// The API key sent to the order relayer
    #[clap(long, env = "SWAP_RELAYER_API_KEY")]
    pub relayer_api_key: Option<String>,
}

impl ExecutorArgs {
    /// Validate the arguments
    pub fn validate(&self) -> Result<(), String> {
        if self.quote_interval_max_count == 0 {
            return Err("--quote-interval-max-count must be positive".to_string());
        }

        if self.quote_fetch_interval_secs == 0 || self.refresh_interval_secs == 0 {
            return Err("quote intervals must be positive".to_string());
        }

        if self.limit_expiration_secs == 0 {
            return Err("--limit-expiration-secs must be positive".to_string());
        }

        if let Some(url) = &self.relayer_url {
            Url::parse(url).map_err(|e| format!("invalid --relayer-url: {e}"))?;
        }

        Ok(())
    }

    /// Convert the arguments into an executor config
    pub fn to_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            unsupported_batch_networks: self.unsupported_batch_networks.clone(),
            fallback_networks: self.fallback_networks.clone(),
            quote_interval_max_count: self.quote_interval_max_count,
            quote_fetch_interval: Duration::from_secs(self.quote_fetch_interval_secs),
            refresh_interval: Duration::from_secs(self.refresh_interval_secs),
            limit_expiration: Duration::from_secs(self.limit_expiration_secs),
            relayer_url: self.relayer_url.clone(),
            relayer_api_key: self.relayer_api_key.clone(),
        }
    }
}

/// The account kinds accepted on the command line
#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum AccountKindArg {
    /// A hot wallet derived from a local seed
    Hd,
    /// A hot wallet backed by an imported key
    Imported,
    /// A hardware signer
    Hardware,
    /// An air-gapped QR signer
    Qr,
    /// An externally connected wallet
    External,
}

impl From<AccountKindArg> for AccountKind {
    fn from(arg: AccountKindArg) -> Self {
        match arg {
            AccountKindArg::Hd => AccountKind::Hd,
            AccountKindArg::Imported => AccountKind::Imported,
            AccountKindArg::Hardware => AccountKind::Hardware,
            AccountKindArg::Qr => AccountKind::Qr,
            AccountKindArg::External => AccountKind::External,
        }
    }
}

/// The fee tiers accepted on the command line
#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum FeeTierArg {
    /// The cheapest tier
    Low,
    /// The middle tier
    Average,
    /// The fastest tier
    High,
}

impl From<FeeTierArg> for FeeTierPreference {
    fn from(arg: FeeTierArg) -> Self {
        match arg {
            FeeTierArg::Low => FeeTierPreference::Low,
            FeeTierArg::Average => FeeTierPreference::Average,
            FeeTierArg::High => FeeTierPreference::High,
        }
    }
}

/// The cli for the swap planner
#[rustfmt::skip]
#[derive(Parser, Debug)]
#[clap(about = "Dry-run planner for swap execution: classifies a quote and prints its step plan")]
pub struct Cli {
    // --- Inputs --- //

    /// Path to a JSON file containing the quote snapshot
    #[clap(long)]
    pub quote_path: String,
    /// The kind of account that would sign
    #[clap(long, value_enum, default_value = "hd")]
    pub account_kind: AccountKindArg,
    /// Whether the user prefers merging approval and swap
    #[clap(long)]
    pub batch_approve_and_swap: bool,
    /// The fee tier the user prefers
    #[clap(long, value_enum, default_value = "average")]
    pub fee_tier: FeeTierArg,
    /// The pay amount currently entered, defaults to the quote's
    #[clap(long)]
    pub live_amount: Option<String>,
    /// The pay token balance of the paying address
    #[clap(long)]
    pub balance: Option<String>,
    /// The paying address
    #[clap(long)]
    pub address: Option<String>,
    /// The receiving address, defaults to the paying address
    #[clap(long)]
    pub receiving_address: Option<String>,

    // --- Executor --- //

    /// Executor options
    #[clap(flatten)]
    pub executor: ExecutorArgs,

    // --- Telemetry --- //

    /// Whether to emit JSON formatted logs
    #[clap(long, env = "SWAP_JSON_LOGS")]
    pub json_logs: bool,
}

impl Cli {
    /// Validate the CLI arguments
    pub fn validate(&self) -> Result<(), String> {
        self.executor.validate()
    }
}
