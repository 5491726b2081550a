// Block version gates
//
// Older chains keep their historical behavior: every feature below is only
// active once the block version reaches its gate. Versions are compared as
// plain integers (2.3.0 was encoded as 2300, later releases as 2030100...).

pub type BlockVersion = u32;

pub const BLOCK_VERSION_2300: BlockVersion = 2300;
pub const BLOCK_VERSION_2310: BlockVersion = 2030100;
pub const BLOCK_VERSION_2312: BlockVersion = 2030102;
pub const BLOCK_VERSION_2340: BlockVersion = 2030400;

/// Behavior switches derived from a block version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockFeatures {
    /// Invoke txs needing gas must carry a gas limit, refunds go through
    /// `REFUND_GAS_VM`, native install/upgrade/multi-sign charge gas and the
    /// received DAG is checked and compared
    pub gas_limit_guard: bool,
    /// Payer resolution honors `tx.payer` and contract-configured payers
    pub payer_resolution: bool,
    /// Frozen accounts resolve to `ACCOUNT_STATUS_FROZEN`
    pub typed_frozen_status: bool,
    /// Sender collection partitions txs, executor pre-checks balance and
    /// accounts gas after the run, charge totals come from the result map
    pub optimized_gas_accounting: bool,
}

impl BlockFeatures {
    pub const fn for_version(version: BlockVersion) -> Self {
        Self {
            gas_limit_guard: version >= BLOCK_VERSION_2300,
            payer_resolution: version >= BLOCK_VERSION_2310,
            typed_frozen_status: version >= BLOCK_VERSION_2312,
            optimized_gas_accounting: version >= BLOCK_VERSION_2340,
        }
    }
}
