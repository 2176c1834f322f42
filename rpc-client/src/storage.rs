//! Storage key construction for the handful of items the auditor reads.
//!
//! Plain values live at `twox_128(pallet) ++ twox_128(item)`, map entries
//! append `blake2_128_concat(key)`.

use codec::{Decode, Encode};
use fee_auditor::types::{AccountBalance, AccountId, Balance};
use fee_auditor::ClientError;
use sp_crypto_hashing::{blake2_128, twox_128};

pub fn plain_key(pallet: &str, item: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(&twox_128(pallet.as_bytes()));
    key.extend_from_slice(&twox_128(item.as_bytes()));
    key
}

/// Key of a `Blake2_128Concat` map entry.
pub fn map_key(pallet: &str, item: &str, encoded_key: &[u8]) -> Vec<u8> {
    let mut key = plain_key(pallet, item);
    key.extend_from_slice(&blake2_128(encoded_key));
    key.extend_from_slice(encoded_key);
    key
}

pub fn system_account(who: AccountId) -> Vec<u8> {
    map_key("System", "Account", who.as_bytes())
}

pub fn system_events() -> Vec<u8> {
    plain_key("System", "Events")
}

pub fn total_issuance() -> Vec<u8> {
    plain_key("Balances", "TotalIssuance")
}

pub fn next_fee_multiplier() -> Vec<u8> {
    plain_key("TransactionPayment", "NextFeeMultiplier")
}

pub fn to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

pub fn from_hex(value: &str) -> Result<Vec<u8>, ClientError> {
    hex::decode(value.trim_start_matches("0x"))
        .map_err(|e| ClientError::Decode(format!("invalid hex: {e}")))
}

/// `frame_system::AccountInfo` with the balances pallet's `AccountData`.
#[derive(Decode, Encode)]
struct AccountInfo {
    nonce: u32,
    consumers: u32,
    providers: u32,
    sufficients: u32,
    free: Balance,
    reserved: Balance,
    frozen: Balance,
}

pub fn decode_account(bytes: &[u8]) -> Result<AccountBalance, ClientError> {
    let info = AccountInfo::decode(&mut &bytes[..])
        .map_err(|e| ClientError::Decode(format!("account info: {e}")))?;
    Ok(AccountBalance {
        free: info.free,
        reserved: info.reserved,
        frozen: info.frozen,
    })
}

/// `u128` storage values, including `FixedU128` whose inner value is stored.
pub fn decode_u128(bytes: &[u8], what: &str) -> Result<u128, ClientError> {
    u128::decode(&mut &bytes[..]).map_err(|e| ClientError::Decode(format!("{what}: {e}")))
}
