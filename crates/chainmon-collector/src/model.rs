//! Typed views of the daemon's RPC results.
//!
//! Only the fields the exporter reads are declared. Fields marked optional
//! are missing on older daemon versions; every other field is required and
//! its absence is an unexpected response shape.

use serde::Deserialize;
use serde::de::IgnoredAny;

/// Base units per coin. Monetary amounts arrive as integers in base units.
pub const SATOSHIS_PER_COIN: u64 = 100_000_000;

/// Fields requested from `getblockstats`.
pub const BLOCK_STATS_FIELDS: [&str; 8] = [
    "total_size",
    "total_weight",
    "totalfee",
    "txs",
    "height",
    "ins",
    "outs",
    "total_out",
];

/// Convert an integer base-unit amount to coins.
pub fn to_coins(base_units: u64) -> f64 {
    base_units as f64 / SATOSHIS_PER_COIN as f64
}

/// `getmemoryinfo "stats"`.
#[derive(Debug, Clone, Deserialize)]
pub struct MemoryInfo {
    pub locked: LockedMemory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LockedMemory {
    pub used: u64,
    pub free: u64,
    pub total: u64,
    pub locked: u64,
    pub chunks_used: u64,
    pub chunks_free: u64,
}

/// `getblockchaininfo`.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockchainInfo {
    pub blocks: u64,
    pub difficulty: f64,
    pub size_on_disk: u64,
    pub verificationprogress: f64,
    pub bestblockhash: String,
}

/// `getnetworkinfo`.
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkInfo {
    pub version: u64,
    pub protocolversion: u64,
    pub connections: u64,
    #[serde(default)]
    pub connections_in: Option<u64>,
    #[serde(default)]
    pub connections_out: Option<u64>,
    #[serde(default)]
    pub warnings: Warnings,
}

/// Network warnings: a string on older daemons, a list on newer ones.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Warnings {
    Text(String),
    List(Vec<String>),
}

impl Default for Warnings {
    fn default() -> Self {
        Warnings::Text(String::new())
    }
}

impl Warnings {
    pub fn is_empty(&self) -> bool {
        match self {
            Warnings::Text(text) => text.is_empty(),
            Warnings::List(list) => list.iter().all(|w| w.is_empty()),
        }
    }
}

/// `getmempoolinfo`.
#[derive(Debug, Clone, Deserialize)]
pub struct MempoolInfo {
    pub bytes: u64,
    pub size: u64,
    pub usage: u64,
    #[serde(default)]
    pub minrelaytxfee: Option<f64>,
    #[serde(default)]
    pub unbroadcastcount: Option<u64>,
}

/// `getnettotals`.
#[derive(Debug, Clone, Deserialize)]
pub struct NetTotals {
    pub totalbytesrecv: u64,
    pub totalbytessent: u64,
}

/// `getrpcinfo`.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcInfo {
    pub active_commands: Vec<IgnoredAny>,
}

impl RpcInfo {
    /// In-flight commands other than the `getrpcinfo` call that observed them.
    pub fn active_excluding_self(&self) -> usize {
        self.active_commands.len().saturating_sub(1)
    }
}

/// `getchaintxstats`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainTxStats {
    pub txcount: u64,
}

/// `getblockstats <hash> [fields]`.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockStats {
    pub total_size: u64,
    pub total_weight: u64,
    pub totalfee: u64,
    pub txs: u64,
    pub height: u64,
    pub ins: u64,
    pub outs: u64,
    pub total_out: u64,
}

/// `estimatesmartfee <target>`. `feerate` is absent when the daemon lacks data.
#[derive(Debug, Clone, Deserialize)]
pub struct SmartFee {
    #[serde(default)]
    pub feerate: Option<f64>,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// One `listbanned` entry. `ban_reason` was dropped by newer daemons.
#[derive(Debug, Clone, Deserialize)]
pub struct BannedEntry {
    pub address: String,
    pub ban_created: i64,
    pub banned_until: i64,
    #[serde(default)]
    pub ban_reason: Option<String>,
}

/// One battery call's decoded result, written out as soon as it arrives.
#[derive(Debug)]
pub enum Reading {
    Uptime(u64),
    Memory(MemoryInfo),
    Blockchain(BlockchainInfo),
    Network(NetworkInfo),
    ChainTips(usize),
    Mempool(MempoolInfo),
    NetTotals(NetTotals),
    RpcInfo(RpcInfo),
    TxStats(ChainTxStats),
    Banned(Vec<BannedEntry>),
    SmartFee { target: i64, feerate: f64 },
    HashPs { window: i64, rate: f64 },
    BlockStats(BlockStats),
}
