//! WebSocket JSON-RPC implementation of [`ChainClient`].
//!
//! Blocks and events are decoded against the metadata of the runtime that
//! produced them, cached per spec version. Fee queries go through
//! `state_call` into `TransactionPaymentApi`, base fees through the node's
//! Ethereum RPC.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use codec::{Decode, Encode};
use fee_auditor::types::{
    AccountBalance, AccountId, Balance, Block, BlockHash, BlockId, BlockNumber, DispatchClass,
    EventRecord, FeeQuote, Header, RawExtrinsic, Weight,
};
use fee_auditor::{ChainClient, ClientError, ClientResult, HeightWaiters};
use futures::StreamExt;
use jsonrpsee::core::client::{ClientT, Subscription, SubscriptionClientT};
use jsonrpsee::core::params::ArrayParams;
use jsonrpsee::rpc_params;
use jsonrpsee::ws_client::{WsClient, WsClientBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sp_core::U256;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::block::{decode_events, decode_extrinsic};
use crate::config::RpcConfig;
use crate::metadata::RuntimeTypes;
use crate::storage;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcHeader {
    parent_hash: String,
    number: String,
}

#[derive(Deserialize)]
struct RpcBlockBody {
    header: RpcHeader,
    extrinsics: Vec<String>,
}

#[derive(Deserialize)]
struct RpcSignedBlock {
    block: RpcBlockBody,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcRuntimeVersion {
    spec_version: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EthBlock {
    base_fee_per_gas: Option<String>,
}

#[derive(Encode, Decode)]
struct WeightV2 {
    #[codec(compact)]
    ref_time: u64,
    #[codec(compact)]
    proof_size: u64,
}

#[derive(Decode)]
enum WireDispatchClass {
    Normal,
    Operational,
    Mandatory,
}

/// `pallet_transaction_payment::RuntimeDispatchInfo`.
#[derive(Decode)]
struct WireDispatchInfo {
    weight: WeightV2,
    class: WireDispatchClass,
    partial_fee: Balance,
}

impl From<WireDispatchInfo> for FeeQuote {
    fn from(info: WireDispatchInfo) -> Self {
        FeeQuote {
            weight: Weight {
                ref_time: info.weight.ref_time,
                proof_size: info.weight.proof_size,
            },
            class: match info.class {
                WireDispatchClass::Normal => DispatchClass::Normal,
                WireDispatchClass::Operational => DispatchClass::Operational,
                WireDispatchClass::Mandatory => DispatchClass::Mandatory,
            },
            partial_fee: info.partial_fee,
        }
    }
}

fn hash_param(hash: BlockHash) -> String {
    storage::to_hex(hash.as_bytes())
}

fn parse_hash(value: &str) -> ClientResult<BlockHash> {
    let bytes = storage::from_hex(value)?;
    if bytes.len() != 32 {
        return Err(ClientError::Decode(format!(
            "expected 32-byte hash, got {} bytes",
            bytes.len()
        )));
    }
    Ok(BlockHash::from_slice(&bytes))
}

fn parse_quantity(value: &str) -> ClientResult<U256> {
    U256::from_str_radix(value.trim_start_matches("0x"), 16)
        .map_err(|e| ClientError::Decode(format!("invalid quantity {value}: {e:?}")))
}

fn parse_number(value: &str) -> ClientResult<BlockNumber> {
    let number = parse_quantity(value)?;
    if number > U256::from(BlockNumber::MAX) {
        return Err(ClientError::Decode(format!("block number {value} out of range")));
    }
    Ok(number.low_u32())
}

fn decode_scale<T: Decode>(bytes: &[u8], what: &str) -> ClientResult<T> {
    T::decode(&mut &bytes[..]).map_err(|e| ClientError::Decode(format!("{what}: {e}")))
}

/// Substrate WebSocket client implementing [`ChainClient`].
pub struct RpcChainClient {
    client: Arc<RwLock<WsClient>>,
    config: RpcConfig,
    metadata: RwLock<HashMap<u32, Arc<RuntimeTypes>>>,
}

impl RpcChainClient {
    pub async fn connect(endpoint: &str) -> ClientResult<Self> {
        Self::connect_with_config(RpcConfig::with_endpoint(endpoint)).await
    }

    pub async fn connect_with_config(config: RpcConfig) -> ClientResult<Self> {
        let client = Self::build_client(&config).await?;
        info!(endpoint = %config.endpoint, "connected");
        Ok(Self {
            client: Arc::new(RwLock::new(client)),
            config,
            metadata: RwLock::new(HashMap::new()),
        })
    }

    async fn build_client(config: &RpcConfig) -> ClientResult<WsClient> {
        WsClientBuilder::default()
            .connection_timeout(config.connection_timeout)
            .request_timeout(config.request_timeout)
            .build(&config.endpoint)
            .await
            .map_err(|e| ClientError::Rpc(format!("failed to connect to {}: {e}", config.endpoint)))
    }

    /// Reconnects when the socket dropped, up to the configured attempts.
    async fn ensure_connected(&self) -> ClientResult<()> {
        if self.client.read().await.is_connected() {
            return Ok(());
        }

        let mut attempts = 0;
        loop {
            attempts += 1;
            match Self::build_client(&self.config).await {
                Ok(new_client) => {
                    *self.client.write().await = new_client;
                    info!(attempts, "reconnected");
                    return Ok(());
                }
                Err(e) if attempts >= self.config.max_reconnect_attempts => return Err(e),
                Err(e) => {
                    warn!(attempts, error = %e, "reconnect failed");
                    tokio::time::sleep(self.config.reconnect_delay).await;
                }
            }
        }
    }

    async fn request<R: DeserializeOwned>(
        &self,
        method: &'static str,
        params: ArrayParams,
    ) -> ClientResult<R> {
        self.ensure_connected().await?;
        let client = self.client.read().await;
        client
            .request(method, params)
            .await
            .map_err(|e| ClientError::Rpc(format!("{method} failed: {e}")))
    }

    async fn storage(&self, key: Vec<u8>, at: BlockHash) -> ClientResult<Option<Vec<u8>>> {
        let value: Option<String> = self
            .request(
                "state_getStorage",
                rpc_params![storage::to_hex(&key), hash_param(at)],
            )
            .await?;
        value.as_deref().map(storage::from_hex).transpose()
    }

    async fn runtime_call(
        &self,
        function: &str,
        args: Vec<u8>,
        at: BlockHash,
    ) -> ClientResult<Vec<u8>> {
        let result: String = self
            .request(
                "state_call",
                rpc_params![function, storage::to_hex(&args), hash_param(at)],
            )
            .await?;
        storage::from_hex(&result)
    }

    /// Metadata of the runtime active at `at`, fetched once per spec version.
    pub async fn runtime_types(&self, at: BlockHash) -> ClientResult<Arc<RuntimeTypes>> {
        let spec_version = self.spec_version(at).await?;
        if let Some(types) = self.metadata.read().await.get(&spec_version) {
            return Ok(types.clone());
        }

        let raw: String = self
            .request("state_getMetadata", rpc_params![hash_param(at)])
            .await?;
        let types = Arc::new(RuntimeTypes::decode(spec_version, &storage::from_hex(&raw)?)?);
        debug!(spec_version, pallets = types.pallets.len(), "cached runtime metadata");
        self.metadata
            .write()
            .await
            .insert(spec_version, types.clone());
        Ok(types)
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    pub async fn subscribe_new_heads(&self) -> ClientResult<Subscription<serde_json::Value>> {
        self.ensure_connected().await?;
        let client = self.client.read().await;
        client
            .subscribe(
                "chain_subscribeNewHeads",
                rpc_params![],
                "chain_unsubscribeNewHeads",
            )
            .await
            .map_err(|e| ClientError::Rpc(format!("failed to subscribe to new heads: {e}")))
    }

    /// Feeds every new head into `waiters` until the subscription ends.
    pub async fn drive_height_waiters(&self, waiters: &HeightWaiters) -> ClientResult<()> {
        let mut heads = self.subscribe_new_heads().await?;
        while let Some(head) = heads.next().await {
            let head = head.map_err(|e| ClientError::Rpc(format!("new heads: {e}")))?;
            let header: RpcHeader = serde_json::from_value(head)
                .map_err(|e| ClientError::Decode(format!("new head: {e}")))?;
            let number = parse_number(&header.number)?;
            let woken = waiters.notify(number);
            debug!(block = number, woken, "new head");
        }
        warn!("new heads subscription closed");
        waiters.close();
        Ok(())
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn block_hash(&self, number: BlockNumber) -> ClientResult<BlockHash> {
        let hash: Option<String> = self
            .request("chain_getBlockHash", rpc_params![number])
            .await?;
        match hash {
            Some(hash) => parse_hash(&hash),
            None => Err(ClientError::UnknownBlock(BlockId::Number(number))),
        }
    }

    async fn header(&self, hash: BlockHash) -> ClientResult<Header> {
        let header: Option<RpcHeader> = self
            .request("chain_getHeader", rpc_params![hash_param(hash)])
            .await?;
        let header = header.ok_or(ClientError::UnknownBlock(BlockId::Hash(hash)))?;
        Ok(Header {
            number: parse_number(&header.number)?,
            hash,
            parent_hash: parse_hash(&header.parent_hash)?,
        })
    }

    async fn block(&self, hash: BlockHash) -> ClientResult<Block> {
        let (signed, types) = futures::try_join!(
            self.request::<Option<RpcSignedBlock>>("chain_getBlock", rpc_params![hash_param(hash)]),
            self.runtime_types(hash),
        )?;
        let body = signed.ok_or(ClientError::UnknownBlock(BlockId::Hash(hash)))?.block;
        let header = Header {
            number: parse_number(&body.header.number)?,
            hash,
            parent_hash: parse_hash(&body.header.parent_hash)?,
        };

        let mut timestamp = None;
        let mut extrinsics = Vec::with_capacity(body.extrinsics.len());
        for (index, raw) in body.extrinsics.iter().enumerate() {
            let decoded = decode_extrinsic(&types, index as u32, storage::from_hex(raw)?)?;
            timestamp = timestamp.or(decoded.timestamp);
            extrinsics.push(decoded.extrinsic);
        }
        Ok(Block {
            header,
            extrinsics,
            timestamp,
        })
    }

    async fn best_block(&self) -> ClientResult<Header> {
        let hash: String = self.request("chain_getBlockHash", rpc_params![]).await?;
        self.header(parse_hash(&hash)?).await
    }

    async fn finalized_head(&self) -> ClientResult<BlockHash> {
        let hash: String = self
            .request("chain_getFinalizedHead", rpc_params![])
            .await?;
        parse_hash(&hash)
    }

    async fn events(&self, hash: BlockHash) -> ClientResult<Vec<EventRecord>> {
        let (raw, types) = futures::try_join!(
            self.storage(storage::system_events(), hash),
            self.runtime_types(hash),
        )?;
        match raw {
            Some(raw) => decode_events(&types, &raw),
            None => Ok(Vec::new()),
        }
    }

    async fn query_fee_info(
        &self,
        extrinsic: &RawExtrinsic,
        at: BlockHash,
    ) -> ClientResult<FeeQuote> {
        let mut args = extrinsic.encoded.clone();
        extrinsic.encoded_len().encode_to(&mut args);
        let result = self
            .runtime_call("TransactionPaymentApi_query_info", args, at)
            .await?;
        decode_scale::<WireDispatchInfo>(&result, "query_info").map(FeeQuote::from)
    }

    async fn query_length_to_fee(&self, len: u32, at: BlockHash) -> ClientResult<Balance> {
        let result = self
            .runtime_call("TransactionPaymentApi_query_length_to_fee", len.encode(), at)
            .await?;
        decode_scale(&result, "query_length_to_fee")
    }

    async fn query_weight_to_fee(&self, weight: Weight, at: BlockHash) -> ClientResult<Balance> {
        let args = WeightV2 {
            ref_time: weight.ref_time,
            proof_size: weight.proof_size,
        }
        .encode();
        let result = self
            .runtime_call("TransactionPaymentApi_query_weight_to_fee", args, at)
            .await?;
        decode_scale(&result, "query_weight_to_fee")
    }

    async fn account_balance(&self, who: AccountId, at: BlockHash) -> ClientResult<AccountBalance> {
        match self.storage(storage::system_account(who), at).await? {
            Some(raw) => storage::decode_account(&raw),
            None => Ok(AccountBalance::default()),
        }
    }

    async fn total_issuance(&self, at: BlockHash) -> ClientResult<Balance> {
        match self.storage(storage::total_issuance(), at).await? {
            Some(raw) => storage::decode_u128(&raw, "total issuance"),
            None => Ok(0),
        }
    }

    async fn next_fee_multiplier(&self, at: BlockHash) -> ClientResult<u128> {
        let raw = self
            .storage(storage::next_fee_multiplier(), at)
            .await?
            .ok_or_else(|| ClientError::Decode("NextFeeMultiplier not set".into()))?;
        storage::decode_u128(&raw, "next fee multiplier")
    }

    async fn base_fee_per_gas(&self, number: BlockNumber) -> ClientResult<u128> {
        let block: Option<EthBlock> = self
            .request(
                "eth_getBlockByNumber",
                rpc_params![format!("{number:#x}"), false],
            )
            .await?;
        let block = block.ok_or(ClientError::UnknownBlock(BlockId::Number(number)))?;
        let base_fee = block
            .base_fee_per_gas
            .ok_or_else(|| ClientError::Decode(format!("block #{number} has no baseFeePerGas")))?;
        let base_fee = parse_quantity(&base_fee)?;
        if base_fee > U256::from(u128::MAX) {
            return Err(ClientError::Decode(format!("base fee {base_fee} out of range")));
        }
        Ok(base_fee.low_u128())
    }

    async fn spec_version(&self, at: BlockHash) -> ClientResult<u32> {
        let version: RpcRuntimeVersion = self
            .request("state_getRuntimeVersion", rpc_params![hash_param(at)])
            .await?;
        Ok(version.spec_version)
    }
}
