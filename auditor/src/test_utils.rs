//! In-memory chain that produces blocks the way a fee-charging runtime would,
//! used to exercise the auditor without a node.
//!
//! The runtime side keeps its own arithmetic: fees are computed from the
//! parent block's multiplier and spec version, split per component, credited
//! to the treasury and burnt from issuance. Faults can be injected to make it
//! misbehave in ways the auditor must notice.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use sp_arithmetic::Perbill;
use sp_core::U256;

use crate::constants::{
    ConstantStore, RuntimeName, EXTRINSIC_BASE_WEIGHT, FEE_MULTIPLIER_DENOMINATOR, WEIGHT_PER_GAS,
};
use crate::error::{ClientError, ClientResult};
use crate::fees::base_fee_from_multiplier;
use crate::fetcher::ChainClient;
use crate::portions::FeeSplit;
use crate::types::{
    AccountBalance, AccountId, Balance, Block, BlockHash, BlockId, BlockNumber, DispatchClass,
    DispatchInfo, EthereumTransaction, Event, EventKind, EventRecord, FeeQuote, Header, Phase,
    RawExtrinsic, Weight, H160, H256,
};

/// `modlpc/trsry` padded to 20 bytes.
pub const TREASURY_ACCOUNT: AccountId = H160([
    0x6d, 0x6f, 0x64, 0x6c, 0x70, 0x63, 0x2f, 0x74, 0x72, 0x73, 0x72, 0x79, 0, 0, 0, 0, 0, 0, 0, 0,
]);
/// Receiver of every simulated transfer.
pub const TRANSFER_SINK: AccountId = H160([0x5e; 20]);

pub const ALITH: AccountId = H160([
    0xf2, 0x4f, 0xf3, 0xa9, 0xcf, 0x04, 0xc7, 0x1d, 0xbc, 0x94, 0xd0, 0xb5, 0x66, 0xf7, 0xa2, 0x7b,
    0x94, 0x56, 0x6c, 0xac,
]);
pub const BALTATHAR: AccountId = H160([
    0x3c, 0xd0, 0xa7, 0x05, 0xa2, 0xdc, 0x65, 0xe5, 0xb1, 0xe1, 0x20, 0x58, 0x96, 0xba, 0xa2, 0xbe,
    0x8a, 0x07, 0xc6, 0xe0,
]);
pub const CHARLETH: AccountId = H160([
    0x79, 0x8d, 0x4b, 0xa9, 0xba, 0xf0, 0x06, 0x4e, 0xc1, 0x9e, 0xb4, 0xf0, 0xa1, 0xa4, 0x57, 0x85,
    0xae, 0x9d, 0x6d, 0xfc,
]);

pub const UNIT: Balance = 1_000_000_000_000_000_000;
pub const GWEI: Balance = 1_000_000_000;

/// Ways the simulated runtime can get its accounting wrong.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fault {
    /// Treasury is credited but no `treasury.Deposit` event is emitted.
    SkipDeposit,
    /// Every fee-paying extrinsic burns this much more than it should.
    ExtraBurn(Balance),
    /// `query_info` over-reports the partial fee by this much.
    QuoteSkew(Balance),
    /// Fee and tip are split as one amount instead of separately.
    CombinedRounding,
    /// Fetching this block's body fails.
    UnavailableBlock(BlockNumber),
}

/// One extrinsic to include in the next block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TxSpec {
    Native {
        signer: AccountId,
        section: String,
        method: String,
        tip: Balance,
        encoded_len: u32,
        ref_time: u64,
        transfer: Balance,
        fail: bool,
    },
    Ethereum {
        sender: AccountId,
        transaction: EthereumTransaction,
        gas_used: u64,
        transfer: Balance,
    },
    /// Fee-free call that moves `treasury_deposit` from the signer to the
    /// treasury, announced with a `treasury.Deposit` event.
    Sudo {
        signer: AccountId,
        treasury_deposit: Balance,
    },
    /// Extrinsic that emits no dispatch outcome event.
    Silent { section: String, method: String },
}

impl TxSpec {
    pub fn transfer(signer: AccountId, amount: Balance) -> Self {
        TxSpec::Native {
            signer,
            section: "balances".into(),
            method: "transferKeepAlive".into(),
            tip: 0,
            encoded_len: 146,
            ref_time: 140_625_000,
            transfer: amount,
            fail: false,
        }
    }

    pub fn transfer_with_tip(signer: AccountId, amount: Balance, tip: Balance) -> Self {
        let mut spec = Self::transfer(signer, amount);
        if let TxSpec::Native { tip: spec_tip, .. } = &mut spec {
            *spec_tip = tip;
        }
        spec
    }

    pub fn ethereum(
        sender: AccountId,
        transaction: EthereumTransaction,
        transfer: Balance,
    ) -> Self {
        TxSpec::Ethereum {
            sender,
            transaction,
            gas_used: 21_000,
            transfer,
        }
    }
}

/// Fee parameters of the simulated runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeeParams {
    pub length_fee_per_byte: Balance,
    /// Multiplier at genesis, scaled by 10^18.
    pub initial_multiplier: u128,
    /// Added to the multiplier after every produced block.
    pub multiplier_step: u128,
}

impl Default for FeeParams {
    fn default() -> Self {
        Self {
            length_fee_per_byte: GWEI,
            initial_multiplier: 8 * FEE_MULTIPLIER_DENOMINATOR,
            multiplier_step: FEE_MULTIPLIER_DENOMINATOR / 1_000,
        }
    }
}

#[derive(Clone, Debug)]
struct Snapshot {
    balances: HashMap<AccountId, Balance>,
    issuance: Balance,
    multiplier: u128,
    spec_version: u32,
}

impl Snapshot {
    fn free(&self, who: &AccountId) -> Balance {
        self.balances.get(who).copied().unwrap_or_default()
    }

    fn debit(&mut self, who: AccountId, amount: Balance) {
        let balance = self.balances.entry(who).or_default();
        *balance = balance.saturating_sub(amount);
    }

    fn credit(&mut self, who: AccountId, amount: Balance) {
        *self.balances.entry(who).or_default() += amount;
    }
}

#[derive(Clone, Debug)]
struct MockBlock {
    block: Block,
    records: Vec<EventRecord>,
    snapshot: Snapshot,
}

#[derive(Debug)]
struct MockState {
    constants: ConstantStore,
    split: FeeSplit,
    params: FeeParams,
    block_time_ms: u64,
    genesis_time_ms: u64,
    finality_lag: u32,
    blocks: Vec<MockBlock>,
    by_hash: HashMap<BlockHash, usize>,
    weights: HashMap<Vec<u8>, Weight>,
    faults: Vec<Fault>,
    pending_spec_version: Option<u32>,
}

#[derive(Clone, Debug)]
pub struct MockChain {
    state: Arc<Mutex<MockState>>,
}

fn block_hash(number: BlockNumber) -> BlockHash {
    H256::from_low_u64_be(0xb10c_0000_0000 + number as u64)
}

fn encoded_extrinsic(number: BlockNumber, index: u32, len: u32) -> Vec<u8> {
    let mut encoded = vec![0xab; len.max(8) as usize];
    encoded[..4].copy_from_slice(&number.to_le_bytes());
    encoded[4..8].copy_from_slice(&index.to_le_bytes());
    encoded
}

fn event(section: &str, method: &str, kind: EventKind, data: Vec<String>) -> Event {
    Event::new(section, method, kind).with_data(data)
}

fn success(info: DispatchInfo) -> Event {
    event(
        "system",
        "ExtrinsicSuccess",
        EventKind::ExtrinsicSuccess {
            dispatch_info: info,
        },
        vec![format!("{info:?}")],
    )
}

impl MockChain {
    pub fn new(runtime: RuntimeName) -> Self {
        let genesis = Snapshot {
            balances: HashMap::new(),
            issuance: 0,
            multiplier: FeeParams::default().initial_multiplier,
            spec_version: 3400,
        };
        let genesis_time_ms = 1_700_000_000_000;
        let header = Header {
            number: 0,
            hash: block_hash(0),
            parent_hash: H256::zero(),
        };
        let state = MockState {
            constants: ConstantStore::for_runtime(runtime),
            split: FeeSplit::default(),
            params: FeeParams::default(),
            block_time_ms: 12_000,
            genesis_time_ms,
            finality_lag: 0,
            blocks: vec![MockBlock {
                block: Block {
                    header,
                    extrinsics: Vec::new(),
                    timestamp: Some(genesis_time_ms),
                },
                records: Vec::new(),
                snapshot: genesis,
            }],
            by_hash: HashMap::from([(header.hash, 0)]),
            weights: HashMap::new(),
            faults: Vec::new(),
            pending_spec_version: None,
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Moonbase chain with Alith, Baltathar and Charleth endowed.
    pub fn dev() -> Self {
        Self::new(RuntimeName::Moonbase)
            .with_account(ALITH, 1_000_000 * UNIT)
            .with_account(BALTATHAR, 1_000_000 * UNIT)
            .with_account(CHARLETH, 1_000_000 * UNIT)
    }

    /// Endows `who` in the genesis state.
    pub fn with_account(self, who: AccountId, balance: Balance) -> Self {
        {
            let mut state = self.state.lock();
            let genesis = &mut state.blocks[0].snapshot;
            genesis.credit(who, balance);
            genesis.issuance += balance;
        }
        self
    }

    /// Rule the runtime uses to split fees.
    pub fn with_split(self, split: FeeSplit) -> Self {
        self.state.lock().split = split;
        self
    }

    pub fn with_fee_params(self, params: FeeParams) -> Self {
        {
            let mut state = self.state.lock();
            state.params = params;
            state.blocks[0].snapshot.multiplier = params.initial_multiplier;
        }
        self
    }

    pub fn with_spec_version(self, spec_version: u32) -> Self {
        self.state.lock().blocks[0].snapshot.spec_version = spec_version;
        self
    }

    pub fn with_block_time(self, block_time_ms: u64) -> Self {
        self.state.lock().block_time_ms = block_time_ms;
        self
    }

    pub fn with_finality_lag(self, lag: u32) -> Self {
        self.state.lock().finality_lag = lag;
        self
    }

    /// Changes the runtime split from the next produced block on.
    pub fn set_split(&self, split: FeeSplit) {
        self.state.lock().split = split;
    }

    /// Runs blocks from the next produced one on under `spec_version`.
    pub fn upgrade_runtime(&self, spec_version: u32) {
        self.state.lock().pending_spec_version = Some(spec_version);
    }

    pub fn inject(&self, fault: Fault) {
        self.state.lock().faults.push(fault);
    }

    pub fn clear_faults(&self) {
        self.state.lock().faults.clear();
    }

    pub fn best_number(&self) -> BlockNumber {
        self.state.lock().blocks.len() as BlockNumber - 1
    }

    pub fn hash_of(&self, number: BlockNumber) -> Option<BlockHash> {
        let state = self.state.lock();
        state
            .blocks
            .get(number as usize)
            .map(|block| block.block.hash())
    }

    pub fn free_balance(&self, who: AccountId) -> Balance {
        let state = self.state.lock();
        state.best().snapshot.free(&who)
    }

    pub fn issuance(&self) -> Balance {
        self.state.lock().best().snapshot.issuance
    }

    /// EVM base fee per gas recorded in block `number`.
    pub fn base_fee_at(&self, number: BlockNumber) -> Option<u128> {
        let state = self.state.lock();
        let block = state.blocks.get(number as usize)?;
        Some(state.base_fee(&block.snapshot))
    }

    /// Events emitted by the most recent block.
    pub fn last_events(&self) -> Vec<EventRecord> {
        self.state.lock().best().records.clone()
    }

    /// Produces `count` blocks that only carry the timestamp inherent.
    pub fn produce_empty(&self, count: u32) -> BlockNumber {
        let mut number = self.best_number();
        for _ in 0..count {
            number = self.produce_block(Vec::new());
        }
        number
    }

    /// Applies `txs` on top of the best block and returns the new number.
    /// Extrinsic 0 is always the timestamp inherent.
    pub fn produce_block(&self, txs: Vec<TxSpec>) -> BlockNumber {
        let mut state = self.state.lock();
        state.produce(txs)
    }
}

impl MockState {
    fn best(&self) -> &MockBlock {
        // Genesis is always present.
        &self.blocks[self.blocks.len() - 1]
    }

    fn has_fault(&self, fault: Fault) -> bool {
        self.faults.contains(&fault)
    }

    fn extra_burn(&self) -> Balance {
        self.faults
            .iter()
            .map(|fault| match fault {
                Fault::ExtraBurn(amount) => *amount,
                _ => 0,
            })
            .sum()
    }

    fn quote_skew(&self) -> Balance {
        self.faults
            .iter()
            .map(|fault| match fault {
                Fault::QuoteSkew(amount) => *amount,
                _ => 0,
            })
            .sum()
    }

    fn weight_fee(&self, snapshot: &Snapshot) -> Balance {
        self.constants
            .weight_fee_at(snapshot.spec_version)
            .unwrap_or_default()
    }

    fn weight_to_fee(&self, snapshot: &Snapshot, weight: Weight) -> Balance {
        weight.ref_time as Balance * self.weight_fee(snapshot)
    }

    fn length_to_fee(&self, len: u32) -> Balance {
        len as Balance * self.params.length_fee_per_byte
    }

    fn partial_fee(&self, snapshot: &Snapshot, len: u32, weight: Weight) -> Balance {
        let unadjusted = U256::from(self.weight_to_fee(snapshot, weight));
        let adjusted = unadjusted * U256::from(snapshot.multiplier)
            / U256::from(FEE_MULTIPLIER_DENOMINATOR);
        self.length_to_fee(len)
            + adjusted.low_u128()
            + self.weight_to_fee(snapshot, Weight::from_ref_time(EXTRINSIC_BASE_WEIGHT))
    }

    fn base_fee(&self, snapshot: &Snapshot) -> u128 {
        base_fee_from_multiplier(snapshot.multiplier, self.weight_fee(snapshot), WEIGHT_PER_GAS)
            .unwrap_or(u128::MAX)
    }

    /// Treasury share of one fee component under the runtime's split.
    fn treasury_share(&self, amount: Balance) -> Balance {
        match self.split {
            FeeSplit::BurnFloor { burn_ppb } => {
                amount - Perbill::from_parts(burn_ppb).mul_floor(amount)
            }
            FeeSplit::TreasuryFloor { treasury_ppb } => {
                Perbill::from_parts(treasury_ppb).mul_floor(amount)
            }
        }
    }

    /// Routes fee components to treasury and burn, returning the deposit
    /// events to emit.
    fn deal_with_fees(&self, snapshot: &mut Snapshot, components: &[Balance]) -> Vec<Event> {
        let total: Balance = components.iter().sum();
        let treasury_parts: Vec<Balance> = if self.has_fault(Fault::CombinedRounding) {
            vec![self.treasury_share(total)]
        } else {
            components
                .iter()
                .map(|amount| self.treasury_share(*amount))
                .collect()
        };
        let to_treasury: Balance = treasury_parts.iter().sum();
        let burnt = total - to_treasury + self.extra_burn();

        snapshot.credit(TREASURY_ACCOUNT, to_treasury);
        snapshot.issuance = snapshot.issuance.saturating_sub(burnt);

        if self.has_fault(Fault::SkipDeposit) {
            return Vec::new();
        }
        treasury_parts
            .into_iter()
            .filter(|value| *value > 0)
            .map(|value| {
                event(
                    "treasury",
                    "Deposit",
                    EventKind::TreasuryDeposit { value },
                    vec![value.to_string()],
                )
            })
            .collect()
    }

    fn produce(&mut self, txs: Vec<TxSpec>) -> BlockNumber {
        let parent = self.best().clone();
        let number = parent.block.number() + 1;
        let mut snapshot = parent.snapshot.clone();
        let parent_base_fee = self.base_fee(&parent.snapshot);
        let timestamp = self.genesis_time_ms + number as u64 * self.block_time_ms;

        let mut extrinsics = vec![RawExtrinsic {
            index: 0,
            section: "timestamp".into(),
            method: "set".into(),
            signer: None,
            tip: 0,
            encoded: encoded_extrinsic(number, 0, 11),
            args: vec![timestamp.to_string()],
            ethereum: None,
        }];
        let mut records = vec![EventRecord {
            phase: Phase::ApplyExtrinsic(0),
            event: success(DispatchInfo {
                weight: Weight::from_ref_time(9_000_000),
                class: DispatchClass::Mandatory,
                pays_fee: true,
            }),
        }];

        for (position, tx) in txs.into_iter().enumerate() {
            let index = position as u32 + 1;
            let (extrinsic, events) =
                self.apply(tx, number, index, &parent.snapshot, parent_base_fee, &mut snapshot);
            records.extend(events.into_iter().map(|event| EventRecord {
                phase: Phase::ApplyExtrinsic(index),
                event,
            }));
            extrinsics.push(extrinsic);
        }

        snapshot.multiplier += self.params.multiplier_step;
        if let Some(version) = self.pending_spec_version.take() {
            snapshot.spec_version = version;
        }

        let header = Header {
            number,
            hash: block_hash(number),
            parent_hash: parent.block.hash(),
        };
        self.by_hash.insert(header.hash, self.blocks.len());
        self.blocks.push(MockBlock {
            block: Block {
                header,
                extrinsics,
                timestamp: Some(timestamp),
            },
            records,
            snapshot,
        });
        number
    }

    fn apply(
        &mut self,
        tx: TxSpec,
        number: BlockNumber,
        index: u32,
        parent: &Snapshot,
        parent_base_fee: u128,
        snapshot: &mut Snapshot,
    ) -> (RawExtrinsic, Vec<Event>) {
        match tx {
            TxSpec::Native {
                signer,
                section,
                method,
                tip,
                encoded_len,
                ref_time,
                transfer,
                fail,
            } => {
                let encoded = encoded_extrinsic(number, index, encoded_len);
                let weight = Weight::from_ref_time(ref_time);
                self.weights.insert(encoded.clone(), weight);
                let partial = self.partial_fee(parent, encoded.len() as u32, weight);
                let fee = partial + tip;

                snapshot.debit(signer, fee);
                if !fail {
                    snapshot.debit(signer, transfer);
                    snapshot.credit(TRANSFER_SINK, transfer);
                }
                let mut events = self.deal_with_fees(snapshot, &[partial, tip]);
                events.push(event(
                    "transactionPayment",
                    "TransactionFeePaid",
                    EventKind::TransactionFeePaid {
                        who: signer,
                        actual_fee: fee,
                        tip,
                    },
                    vec![format!("{signer:?}"), fee.to_string(), tip.to_string()],
                ));
                let info = DispatchInfo {
                    weight,
                    class: DispatchClass::Normal,
                    pays_fee: true,
                };
                events.push(if fail {
                    event(
                        "system",
                        "ExtrinsicFailed",
                        EventKind::ExtrinsicFailed {
                            dispatch_error: "Module(Balances::InsufficientBalance)".into(),
                            dispatch_info: info,
                        },
                        vec!["InsufficientBalance".into(), format!("{info:?}")],
                    )
                } else {
                    success(info)
                });

                let extrinsic = RawExtrinsic {
                    index,
                    section,
                    method,
                    signer: Some(signer),
                    tip,
                    encoded,
                    args: vec![format!("{TRANSFER_SINK:?}"), transfer.to_string()],
                    ethereum: None,
                };
                (extrinsic, events)
            }
            TxSpec::Ethereum {
                sender,
                transaction,
                gas_used,
                transfer,
            } => {
                let gas = gas_used as Balance;
                let tip_per_gas = transaction
                    .priority_fee_signal()
                    .saturating_sub(parent_base_fee);
                let base_paid = gas * parent_base_fee;
                let tip_paid = gas * tip_per_gas;

                snapshot.debit(sender, base_paid + tip_paid + transfer);
                snapshot.credit(TRANSFER_SINK, transfer);
                let mut events = vec![event(
                    "ethereum",
                    "Executed",
                    EventKind::EthereumExecuted { from: sender },
                    vec![format!("{sender:?}"), format!("{TRANSFER_SINK:?}")],
                )];
                events.extend(self.deal_with_fees(snapshot, &[base_paid, tip_paid]));
                events.push(success(DispatchInfo {
                    weight: Weight::from_ref_time(gas_used * WEIGHT_PER_GAS),
                    class: DispatchClass::Normal,
                    pays_fee: false,
                }));

                let extrinsic = RawExtrinsic {
                    index,
                    section: "ethereum".into(),
                    method: "transact".into(),
                    signer: None,
                    tip: 0,
                    encoded: encoded_extrinsic(number, index, 120),
                    args: vec![format!("{transaction:?}")],
                    ethereum: Some(transaction),
                };
                (extrinsic, events)
            }
            TxSpec::Sudo {
                signer,
                treasury_deposit,
            } => {
                snapshot.debit(signer, treasury_deposit);
                snapshot.credit(TREASURY_ACCOUNT, treasury_deposit);
                let events = vec![
                    event(
                        "treasury",
                        "Deposit",
                        EventKind::TreasuryDeposit {
                            value: treasury_deposit,
                        },
                        vec![treasury_deposit.to_string()],
                    ),
                    success(DispatchInfo {
                        weight: Weight::from_ref_time(200_000_000),
                        class: DispatchClass::Operational,
                        pays_fee: false,
                    }),
                ];
                let extrinsic = RawExtrinsic {
                    index,
                    section: "sudo".into(),
                    method: "sudo".into(),
                    signer: Some(signer),
                    tip: 0,
                    encoded: encoded_extrinsic(number, index, 80),
                    args: vec!["parameters.setParameter".into()],
                    ethereum: None,
                };
                (extrinsic, events)
            }
            TxSpec::Silent { section, method } => {
                let extrinsic = RawExtrinsic {
                    index,
                    section,
                    method,
                    signer: None,
                    tip: 0,
                    encoded: encoded_extrinsic(number, index, 16),
                    args: Vec::new(),
                    ethereum: None,
                };
                (extrinsic, Vec::new())
            }
        }
    }

    fn block_at(&self, hash: BlockHash) -> ClientResult<&MockBlock> {
        self.by_hash
            .get(&hash)
            .and_then(|position| self.blocks.get(*position))
            .ok_or(ClientError::UnknownBlock(BlockId::Hash(hash)))
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn block_hash(&self, number: BlockNumber) -> ClientResult<BlockHash> {
        self.hash_of(number)
            .ok_or(ClientError::UnknownBlock(BlockId::Number(number)))
    }

    async fn header(&self, hash: BlockHash) -> ClientResult<Header> {
        Ok(self.state.lock().block_at(hash)?.block.header)
    }

    async fn block(&self, hash: BlockHash) -> ClientResult<Block> {
        let state = self.state.lock();
        let block = &state.block_at(hash)?.block;
        if state.has_fault(Fault::UnavailableBlock(block.number())) {
            return Err(ClientError::Rpc(format!(
                "chain_getBlock failed for #{}",
                block.number()
            )));
        }
        Ok(block.clone())
    }

    async fn best_block(&self) -> ClientResult<Header> {
        Ok(self.state.lock().best().block.header)
    }

    async fn finalized_head(&self) -> ClientResult<BlockHash> {
        let state = self.state.lock();
        let best = state.best().block.number();
        let finalized = best.saturating_sub(state.finality_lag);
        Ok(state.blocks[finalized as usize].block.hash())
    }

    async fn events(&self, hash: BlockHash) -> ClientResult<Vec<EventRecord>> {
        Ok(self.state.lock().block_at(hash)?.records.clone())
    }

    async fn query_fee_info(
        &self,
        extrinsic: &RawExtrinsic,
        at: BlockHash,
    ) -> ClientResult<FeeQuote> {
        let state = self.state.lock();
        let snapshot = &state.block_at(at)?.snapshot;
        let weight = state
            .weights
            .get(&extrinsic.encoded)
            .copied()
            .unwrap_or_default();
        let partial_fee = state.partial_fee(snapshot, extrinsic.encoded_len(), weight)
            + state.quote_skew();
        Ok(FeeQuote {
            weight,
            class: DispatchClass::Normal,
            partial_fee,
        })
    }

    async fn query_length_to_fee(&self, len: u32, at: BlockHash) -> ClientResult<Balance> {
        let state = self.state.lock();
        state.block_at(at)?;
        Ok(state.length_to_fee(len))
    }

    async fn query_weight_to_fee(&self, weight: Weight, at: BlockHash) -> ClientResult<Balance> {
        let state = self.state.lock();
        let snapshot = &state.block_at(at)?.snapshot;
        Ok(state.weight_to_fee(snapshot, weight))
    }

    async fn account_balance(
        &self,
        who: AccountId,
        at: BlockHash,
    ) -> ClientResult<AccountBalance> {
        let state = self.state.lock();
        Ok(AccountBalance {
            free: state.block_at(at)?.snapshot.free(&who),
            ..AccountBalance::default()
        })
    }

    async fn total_issuance(&self, at: BlockHash) -> ClientResult<Balance> {
        Ok(self.state.lock().block_at(at)?.snapshot.issuance)
    }

    async fn next_fee_multiplier(&self, at: BlockHash) -> ClientResult<u128> {
        Ok(self.state.lock().block_at(at)?.snapshot.multiplier)
    }

    async fn base_fee_per_gas(&self, number: BlockNumber) -> ClientResult<u128> {
        self.base_fee_at(number)
            .ok_or(ClientError::UnknownBlock(BlockId::Number(number)))
    }

    async fn spec_version(&self, at: BlockHash) -> ClientResult<u32> {
        Ok(self.state.lock().block_at(at)?.snapshot.spec_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_chain_to_their_parents() {
        let chain = MockChain::dev();
        chain.produce_empty(3);
        assert_eq!(chain.best_number(), 3);
        let state = chain.state.lock();
        for pair in state.blocks.windows(2) {
            assert_eq!(pair[1].block.header.parent_hash, pair[0].block.hash());
        }
    }

    #[test]
    fn fees_leave_issuance_and_treasury_consistent() {
        let chain = MockChain::dev();
        let issuance = chain.issuance();
        chain.produce_block(vec![TxSpec::transfer_with_tip(BALTATHAR, UNIT, 1_000)]);
        let treasury = chain.free_balance(TREASURY_ACCOUNT);
        let burnt = issuance - chain.issuance();
        let paid = 1_000_000 * UNIT - UNIT - chain.free_balance(BALTATHAR);
        assert_eq!(paid, burnt + treasury);
        assert!(treasury > 0);
    }

    #[test]
    fn default_multiplier_gives_genesis_base_fee() {
        let chain = MockChain::dev();
        let store = ConstantStore::for_runtime(RuntimeName::Moonbase);
        assert_eq!(chain.base_fee_at(0), store.genesis_base_fee_at(3400));
    }

    #[tokio::test]
    async fn unavailable_block_fails_fetch() {
        let chain = MockChain::dev();
        chain.produce_empty(2);
        chain.inject(Fault::UnavailableBlock(2));
        let hash = chain.hash_of(2).unwrap();
        assert!(matches!(chain.block(hash).await, Err(ClientError::Rpc(_))));
        let hash = chain.hash_of(1).unwrap();
        assert!(chain.block(hash).await.is_ok());
    }
}
