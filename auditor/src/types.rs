use std::fmt;

use serde::{Deserialize, Serialize};
pub use sp_core::{H160, H256};

use crate::error::{AuditError, AuditResult};

pub type BlockNumber = u32;
pub type Balance = u128;
pub type BlockHash = H256;
pub type AccountId = H160;

/// Either side of a block lookup, used for error reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockId {
    Number(BlockNumber),
    Hash(BlockHash),
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockId::Number(number) => write!(f, "#{number}"),
            BlockId::Hash(hash) => write!(f, "{hash:?}"),
        }
    }
}

/// Inclusive range of blocks to audit together with the fetch fan-out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct BlockRange {
    from: BlockNumber,
    to: BlockNumber,
    concurrency: usize,
}

impl BlockRange {
    pub fn new(from: BlockNumber, to: BlockNumber, concurrency: usize) -> AuditResult<Self> {
        if from > to {
            return Err(AuditError::InvalidRange(format!(
                "from #{from} is after to #{to}"
            )));
        }
        if concurrency == 0 {
            return Err(AuditError::InvalidRange(
                "concurrency must be at least 1".into(),
            ));
        }
        Ok(Self {
            from,
            to,
            concurrency,
        })
    }

    pub fn single(number: BlockNumber) -> Self {
        Self {
            from: number,
            to: number,
            concurrency: 1,
        }
    }

    pub fn from(&self) -> BlockNumber {
        self.from
    }

    pub fn to(&self) -> BlockNumber {
        self.to
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn block_count(&self) -> usize {
        (self.to - self.from) as usize + 1
    }

    /// Block numbers grouped into fetch batches, in ascending order.
    pub fn batches(&self) -> impl Iterator<Item = Vec<BlockNumber>> + '_ {
        let numbers: Vec<BlockNumber> = (self.from..=self.to).collect();
        numbers
            .chunks(self.concurrency)
            .map(|chunk| chunk.to_vec())
            .collect::<Vec<_>>()
            .into_iter()
    }
}

/// Two-dimensional weight (`ref_time` is the computational part).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Weight {
    pub ref_time: u64,
    pub proof_size: u64,
}

impl Weight {
    pub const fn from_ref_time(ref_time: u64) -> Self {
        Self {
            ref_time,
            proof_size: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchClass {
    #[default]
    Normal,
    Operational,
    Mandatory,
}

/// Dispatch information carried by `ExtrinsicSuccess` / `ExtrinsicFailed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchInfo {
    pub weight: Weight,
    pub class: DispatchClass,
    pub pays_fee: bool,
}

/// Answer of `TransactionPaymentApi::query_info` at a given block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeQuote {
    pub weight: Weight,
    pub class: DispatchClass,
    pub partial_fee: Balance,
}

/// Ethereum transaction wrapped by an `ethereum.transact` extrinsic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EthereumTransaction {
    Legacy {
        gas_price: u128,
    },
    Eip2930 {
        gas_price: u128,
    },
    Eip1559 {
        max_fee_per_gas: u128,
        max_priority_fee_per_gas: u128,
    },
}

impl EthereumTransaction {
    /// Price signal the fee engine compares against the base fee.
    pub fn priority_fee_signal(&self) -> u128 {
        match self {
            EthereumTransaction::Legacy { gas_price }
            | EthereumTransaction::Eip2930 { gas_price } => *gas_price,
            EthereumTransaction::Eip1559 {
                max_priority_fee_per_gas,
                ..
            } => *max_priority_fee_per_gas,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            EthereumTransaction::Legacy { .. } => "legacy",
            EthereumTransaction::Eip2930 { .. } => "eip2930",
            EthereumTransaction::Eip1559 { .. } => "eip1559",
        }
    }
}

/// Decoded extrinsic as it appears in a block body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawExtrinsic {
    pub index: u32,
    pub section: String,
    pub method: String,
    pub signer: Option<AccountId>,
    pub tip: Balance,
    /// Full opaque encoding, length prefix included.
    pub encoded: Vec<u8>,
    /// Rendered call arguments for diagnostics.
    pub args: Vec<String>,
    pub ethereum: Option<EthereumTransaction>,
}

impl RawExtrinsic {
    pub fn encoded_len(&self) -> u32 {
        self.encoded.len() as u32
    }

    pub fn is_signed(&self) -> bool {
        self.signer.is_some()
    }

    pub fn is_ethereum(&self) -> bool {
        self.section == "ethereum"
    }

    pub fn call_name(&self) -> String {
        format!("{}.{}", self.section, self.method)
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.encoded))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    ApplyExtrinsic(u32),
    Finalization,
    Initialization,
}

/// Typed view over the events the auditor reasons about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventKind {
    ExtrinsicSuccess {
        dispatch_info: DispatchInfo,
    },
    ExtrinsicFailed {
        dispatch_error: String,
        dispatch_info: DispatchInfo,
    },
    EthereumExecuted {
        from: AccountId,
    },
    TreasuryDeposit {
        value: Balance,
    },
    TransactionFeePaid {
        who: AccountId,
        actual_fee: Balance,
        tip: Balance,
    },
    Other,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    pub section: String,
    pub method: String,
    pub kind: EventKind,
    /// Rendered event fields for diagnostics.
    pub data: Vec<String>,
}

impl Event {
    pub fn new(section: impl Into<String>, method: impl Into<String>, kind: EventKind) -> Self {
        Self {
            section: section.into(),
            method: method.into(),
            kind,
            data: Vec::new(),
        }
    }

    pub fn with_data(mut self, data: Vec<String>) -> Self {
        self.data = data;
        self
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}:: [{}]", self.section, self.method, self.data.join(", "))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventRecord {
    pub phase: Phase,
    pub event: Event,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub number: BlockNumber,
    pub hash: BlockHash,
    pub parent_hash: BlockHash,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub header: Header,
    pub extrinsics: Vec<RawExtrinsic>,
    /// Value of the `timestamp.set` inherent, in milliseconds.
    pub timestamp: Option<u64>,
}

impl Block {
    pub fn number(&self) -> BlockNumber {
        self.header.number
    }

    pub fn hash(&self) -> BlockHash {
        self.header.hash
    }
}

/// One extrinsic together with everything observed about its execution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtrinsicWithOutcome {
    pub extrinsic: RawExtrinsic,
    pub events: Vec<Event>,
    pub dispatch_info: Option<DispatchInfo>,
    pub dispatch_error: Option<String>,
    pub fee_quote: Option<FeeQuote>,
}

impl ExtrinsicWithOutcome {
    pub fn find_event<T>(&self, f: impl Fn(&EventKind) -> Option<T>) -> Option<T> {
        self.events.iter().find_map(|event| f(&event.kind))
    }
}

/// A fetched block ready for reconciliation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockDetails {
    pub block: Block,
    pub extrinsics: Vec<ExtrinsicWithOutcome>,
}

impl BlockDetails {
    pub fn number(&self) -> BlockNumber {
        self.block.header.number
    }

    pub fn hash(&self) -> BlockHash {
        self.block.header.hash
    }

    pub fn parent_hash(&self) -> BlockHash {
        self.block.header.parent_hash
    }
}

/// Balance snapshot of one account at one block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalance {
    pub free: Balance,
    pub reserved: Balance,
    pub frozen: Balance,
}
