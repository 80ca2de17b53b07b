//! The exported metric surface and how each [`Reading`] is written into it.

use chainmon_metrics::{
    Counter, Gauge, GaugeFamily, LabeledCounter, LabeledGauge, MetricRegistry, MetricsResult,
    hashps_metric_name, suffixed_metric_name,
};
use chainmon_rpc::{EXPORTER_ERRORS_HELP, EXPORTER_ERRORS_METRIC};
use tracing::warn;

use crate::model::{Reading, to_coins};

/// `reason` label used when a ban entry carries no reason.
pub const DEFAULT_BAN_REASON: &str = "manually added";

fn smart_fee_help(target: i64) -> String {
    format!("Estimated smart fee per kilobyte for confirmation in {target} blocks")
}

fn hashps_help(window: i64) -> String {
    match window {
        w if w < 0 => {
            "Estimated network hash rate per second since the last difficulty change".to_string()
        }
        1 => "Estimated network hash rate per second for the last block".to_string(),
        w => format!("Estimated network hash rate per second for the last {w} blocks"),
    }
}

/// Handles to every instrument the exporter writes.
#[derive(Clone)]
pub struct ChainMetrics {
    pub blocks: Gauge,
    pub difficulty: Gauge,
    pub peers: Gauge,
    pub conn_in: Gauge,
    pub conn_out: Gauge,
    pub hashps: GaugeFamily,
    pub smart_fee: GaugeFamily,
    pub warnings: Counter,
    pub uptime: Gauge,

    pub meminfo_used: Gauge,
    pub meminfo_free: Gauge,
    pub meminfo_total: Gauge,
    pub meminfo_locked: Gauge,
    pub meminfo_chunks_used: Gauge,
    pub meminfo_chunks_free: Gauge,

    pub mempool_bytes: Gauge,
    pub mempool_size: Gauge,
    pub mempool_usage: Gauge,
    pub mempool_unbroadcast: Gauge,
    pub min_relay_fee: Gauge,

    pub latest_block_height: Gauge,
    pub latest_block_weight: Gauge,
    pub latest_block_size: Gauge,
    pub latest_block_txs: Gauge,
    pub latest_block_inputs: Gauge,
    pub latest_block_outputs: Gauge,
    pub latest_block_value: Gauge,
    pub latest_block_fee: Gauge,

    pub txcount: Gauge,
    pub num_chaintips: Gauge,
    pub total_bytes_recv: Gauge,
    pub total_bytes_sent: Gauge,

    pub ban_created: LabeledGauge,
    pub banned_until: LabeledGauge,

    pub server_version: Gauge,
    pub protocol_version: Gauge,
    pub size_on_disk: Gauge,
    pub verification_progress: Gauge,
    pub rpc_active: Gauge,

    pub exporter_errors: LabeledCounter,
    pub process_time: Counter,
}

impl ChainMetrics {
    /// Register (or look up) every instrument in `registry`.
    pub fn new(registry: &MetricRegistry) -> MetricsResult<Self> {
        let gauge = |name: &str, help: &str| registry.gauge(name, help);
        let ban_labels = &["address", "reason"];

        Ok(Self {
            blocks: gauge("bitcoin_blocks", "Block height")?,
            difficulty: gauge("bitcoin_difficulty", "Difficulty")?,
            peers: gauge("bitcoin_peers", "Number of peers")?,
            conn_in: gauge("bitcoin_conn_in", "Number of connections in")?,
            conn_out: gauge("bitcoin_conn_out", "Number of connections out")?,
            hashps: registry.gauge_family("bitcoin_hashps", hashps_help, hashps_metric_name),
            smart_fee: registry.gauge_family(
                "bitcoin_est_smart_fee",
                smart_fee_help,
                suffixed_metric_name,
            ),
            warnings: registry.counter(
                "bitcoin_warnings",
                "Number of network or blockchain warnings detected",
            )?,
            uptime: gauge(
                "bitcoin_uptime",
                "Number of seconds the Bitcoin daemon has been running",
            )?,

            meminfo_used: gauge("bitcoin_meminfo_used", "Number of bytes used")?,
            meminfo_free: gauge("bitcoin_meminfo_free", "Number of bytes available")?,
            meminfo_total: gauge("bitcoin_meminfo_total", "Number of bytes managed")?,
            meminfo_locked: gauge("bitcoin_meminfo_locked", "Number of bytes locked")?,
            meminfo_chunks_used: gauge(
                "bitcoin_meminfo_chunks_used",
                "Number of allocated chunks",
            )?,
            meminfo_chunks_free: gauge("bitcoin_meminfo_chunks_free", "Number of unused chunks")?,

            mempool_bytes: gauge("bitcoin_mempool_bytes", "Size of mempool in bytes")?,
            mempool_size: gauge(
                "bitcoin_mempool_size",
                "Number of unconfirmed transactions in mempool",
            )?,
            mempool_usage: gauge("bitcoin_mempool_usage", "Total memory usage for the mempool")?,
            mempool_unbroadcast: gauge(
                "bitcoin_mempool_unbroadcast",
                "Number of transactions waiting for acknowledgment",
            )?,
            min_relay_fee: gauge(
                "bitcoin_min_relay_fee",
                "Minimum relay fee per kilobyte for transactions to be accepted",
            )?,

            latest_block_height: gauge(
                "bitcoin_latest_block_height",
                "Height or index of latest block",
            )?,
            latest_block_weight: gauge(
                "bitcoin_latest_block_weight",
                "Weight of latest block according to BIP 141",
            )?,
            latest_block_size: gauge("bitcoin_latest_block_size", "Size of latest block in bytes")?,
            latest_block_txs: gauge(
                "bitcoin_latest_block_txs",
                "Number of transactions in latest block",
            )?,
            latest_block_inputs: gauge(
                "bitcoin_latest_block_inputs",
                "Number of inputs in transactions of latest block",
            )?,
            latest_block_outputs: gauge(
                "bitcoin_latest_block_outputs",
                "Number of outputs in transactions of latest block",
            )?,
            latest_block_value: gauge(
                "bitcoin_latest_block_value",
                "Bitcoin value of all transactions in the latest block",
            )?,
            latest_block_fee: gauge(
                "bitcoin_latest_block_fee",
                "Total fee to process the latest block",
            )?,

            txcount: gauge("bitcoin_txcount", "Number of TX since the genesis block")?,
            num_chaintips: gauge("bitcoin_num_chaintips", "Number of known blockchain branches")?,
            total_bytes_recv: gauge("bitcoin_total_bytes_recv", "Total bytes received")?,
            total_bytes_sent: gauge("bitcoin_total_bytes_sent", "Total bytes sent")?,

            ban_created: registry.gauge_with_labels(
                "bitcoin_ban_created",
                "Time the ban was created",
                ban_labels,
            )?,
            banned_until: registry.gauge_with_labels(
                "bitcoin_banned_until",
                "Time the ban expires",
                ban_labels,
            )?,

            server_version: gauge("bitcoin_server_version", "The server version")?,
            protocol_version: gauge(
                "bitcoin_protocol_version",
                "The protocol version of the server",
            )?,
            size_on_disk: gauge(
                "bitcoin_size_on_disk",
                "Estimated size of the block and undo files",
            )?,
            verification_progress: gauge(
                "bitcoin_verification_progress",
                "Estimate of verification progress [0..1]",
            )?,
            rpc_active: gauge("bitcoin_rpc_active", "Number of RPC calls being processed")?,

            exporter_errors: registry.counter_with_labels(
                EXPORTER_ERRORS_METRIC,
                EXPORTER_ERRORS_HELP,
                &["type"],
            )?,
            process_time: registry.counter(
                "bitcoin_exporter_process_time",
                "Time spent processing metrics from bitcoin node",
            )?,
        })
    }

    /// Count an error of `kind` on the exporter error counter.
    pub fn count_error(&self, kind: &str) {
        if let Err(e) = self.exporter_errors.inc(&[kind]) {
            warn!(error = %e, kind, "failed to count exporter error");
        }
    }

    /// Write one call's result. Gauges it has no value for are left alone.
    pub fn record(&self, reading: &Reading) -> MetricsResult<()> {
        match reading {
            Reading::Uptime(uptime) => self.uptime.set(*uptime as f64),
            Reading::Memory(memory) => {
                let locked = &memory.locked;
                self.meminfo_used.set(locked.used as f64);
                self.meminfo_free.set(locked.free as f64);
                self.meminfo_total.set(locked.total as f64);
                self.meminfo_locked.set(locked.locked as f64);
                self.meminfo_chunks_used.set(locked.chunks_used as f64);
                self.meminfo_chunks_free.set(locked.chunks_free as f64);
            }
            Reading::Blockchain(chain) => {
                self.blocks.set(chain.blocks as f64);
                self.difficulty.set(chain.difficulty);
                self.size_on_disk.set(chain.size_on_disk as f64);
                self.verification_progress.set(chain.verificationprogress);
            }
            Reading::Network(network) => {
                self.peers.set(network.connections as f64);
                if let Some(inbound) = network.connections_in {
                    self.conn_in.set(inbound as f64);
                }
                if let Some(outbound) = network.connections_out {
                    self.conn_out.set(outbound as f64);
                }
                self.server_version.set(network.version as f64);
                self.protocol_version.set(network.protocolversion as f64);
                // Edge-triggered: one increment per pass that sees any warning.
                if !network.warnings.is_empty() {
                    self.warnings.inc();
                }
            }
            Reading::ChainTips(tips) => self.num_chaintips.set(*tips as f64),
            Reading::Mempool(mempool) => {
                self.mempool_bytes.set(mempool.bytes as f64);
                self.mempool_size.set(mempool.size as f64);
                self.mempool_usage.set(mempool.usage as f64);
                if let Some(fee) = mempool.minrelaytxfee {
                    self.min_relay_fee.set(fee);
                }
                if let Some(unbroadcast) = mempool.unbroadcastcount {
                    self.mempool_unbroadcast.set(unbroadcast as f64);
                }
            }
            Reading::NetTotals(totals) => {
                self.total_bytes_recv.set(totals.totalbytesrecv as f64);
                self.total_bytes_sent.set(totals.totalbytessent as f64);
            }
            Reading::RpcInfo(rpc) => self.rpc_active.set(rpc.active_excluding_self() as f64),
            Reading::TxStats(stats) => self.txcount.set(stats.txcount as f64),
            Reading::Banned(bans) => {
                for ban in bans {
                    let reason = ban.ban_reason.as_deref().unwrap_or(DEFAULT_BAN_REASON);
                    let labels = [ban.address.as_str(), reason];
                    self.ban_created.set(&labels, ban.ban_created as f64)?;
                    self.banned_until.set(&labels, ban.banned_until as f64)?;
                }
            }
            Reading::SmartFee { target, feerate } => self.smart_fee.gauge(*target)?.set(*feerate),
            Reading::HashPs { window, rate } => self.hashps.gauge(*window)?.set(*rate),
            Reading::BlockStats(block) => {
                self.latest_block_size.set(block.total_size as f64);
                self.latest_block_weight.set(block.total_weight as f64);
                self.latest_block_txs.set(block.txs as f64);
                self.latest_block_height.set(block.height as f64);
                self.latest_block_inputs.set(block.ins as f64);
                self.latest_block_outputs.set(block.outs as f64);
                self.latest_block_value.set(to_coins(block.total_out));
                self.latest_block_fee.set(to_coins(block.totalfee));
            }
        }
        Ok(())
    }
}
