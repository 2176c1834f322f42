//! Turns SCALE-encoded extrinsics and `System.Events` into the auditor's
//! typed view.

use codec::Compact;
use codec::Decode;
use fee_auditor::types::{
    DispatchClass, DispatchInfo, EthereumTransaction, Event, EventKind, EventRecord, Phase,
    RawExtrinsic, Weight,
};
use fee_auditor::{ClientError, ClientResult};
use tracing::trace;

use crate::decode::{decode_value, to_camel_case, to_section_name, Value};
use crate::metadata::RuntimeTypes;

const SIGNED_BIT: u8 = 0b1000_0000;
const EXTRINSIC_VERSION: u8 = 4;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedExtrinsic {
    pub extrinsic: RawExtrinsic,
    /// Argument of `timestamp.set`.
    pub timestamp: Option<u64>,
}

fn malformed(what: impl Into<String>) -> ClientError {
    ClientError::Decode(what.into())
}

/// Decodes one opaque extrinsic (length prefix included) as found in
/// `chain_getBlock`.
pub fn decode_extrinsic(
    types: &RuntimeTypes,
    index: u32,
    encoded: Vec<u8>,
) -> ClientResult<DecodedExtrinsic> {
    let registry = &types.registry;
    let mut input = &encoded[..];
    Compact::<u32>::decode(&mut input).map_err(|e| malformed(format!("length prefix: {e}")))?;
    let version = u8::decode(&mut input).map_err(|e| malformed(format!("version: {e}")))?;
    if version & !SIGNED_BIT != EXTRINSIC_VERSION {
        return Err(ClientError::Unsupported(format!(
            "extrinsic #{index} has version byte {version:#04x}"
        )));
    }

    let mut signer = None;
    let mut tip = 0;
    if version & SIGNED_BIT != 0 {
        let address = decode_value(registry, types.address_ty, &mut input)?;
        decode_value(registry, types.signature_ty, &mut input)?;
        for extension in &types.signed_extensions {
            let value = decode_value(registry, extension.ty, &mut input)?;
            if extension.identifier == "ChargeTransactionPayment" {
                tip = value.as_u128().ok_or_else(|| {
                    malformed(format!("extrinsic #{index} ChargeTransactionPayment {value}"))
                })?;
            }
        }
        signer = Some(
            address
                .as_account()
                .ok_or_else(|| malformed(format!("extrinsic #{index} signer {address}")))?,
        );
    }

    let pallet_index =
        u8::decode(&mut input).map_err(|e| malformed(format!("pallet index: {e}")))?;
    let pallet = types.pallet_by_index(pallet_index)?;
    let call_ty = pallet
        .call_ty
        .ok_or_else(|| malformed(format!("pallet {} has no calls", pallet.name)))?;
    let call = decode_value(registry, call_ty, &mut input)?;
    let call_name = call
        .variant_name()
        .ok_or_else(|| malformed(format!("call of {} is not a variant", pallet.name)))?;

    let section = to_section_name(&pallet.name);
    let method = to_camel_case(call_name);
    trace!(extrinsic = index, %section, %method, "decoded extrinsic");

    let ethereum = match (section.as_str(), method.as_str()) {
        ("ethereum", "transact") => call.field("transaction").and_then(ethereum_transaction),
        _ => None,
    };
    let timestamp = match (section.as_str(), method.as_str()) {
        ("timestamp", "set") => call
            .field("now")
            .and_then(Value::as_u128)
            .and_then(|now| u64::try_from(now).ok()),
        _ => None,
    };
    let args = call.fields().iter().map(|(_, value)| value.to_string()).collect();

    Ok(DecodedExtrinsic {
        extrinsic: RawExtrinsic {
            index,
            section,
            method,
            signer,
            tip,
            encoded,
            args,
            ethereum,
        },
        timestamp,
    })
}

fn ethereum_transaction(value: &Value) -> Option<EthereumTransaction> {
    let body = value.first_field()?;
    let price = |name: &str| body.field(name).and_then(Value::as_u128);
    match value.variant_name()? {
        "Legacy" => Some(EthereumTransaction::Legacy {
            gas_price: price("gas_price")?,
        }),
        "EIP2930" => Some(EthereumTransaction::Eip2930 {
            gas_price: price("gas_price")?,
        }),
        "EIP1559" => Some(EthereumTransaction::Eip1559 {
            max_fee_per_gas: price("max_fee_per_gas")?,
            max_priority_fee_per_gas: price("max_priority_fee_per_gas")?,
        }),
        _ => None,
    }
}

/// Decodes the raw `System.Events` storage value.
pub fn decode_events(types: &RuntimeTypes, bytes: &[u8]) -> ClientResult<Vec<EventRecord>> {
    let value = decode_value(&types.registry, types.events_ty, &mut &bytes[..])?;
    let Value::Sequence(records) = value else {
        return Err(malformed("System.Events is not a sequence"));
    };
    records.iter().map(event_record).collect()
}

fn event_record(record: &Value) -> ClientResult<EventRecord> {
    let phase = record
        .field("phase")
        .ok_or_else(|| malformed("event record without phase"))?;
    let phase = match phase.variant_name() {
        Some("ApplyExtrinsic") => Phase::ApplyExtrinsic(
            phase
                .first_field()
                .and_then(Value::as_u128)
                .and_then(|index| u32::try_from(index).ok())
                .ok_or_else(|| malformed(format!("phase {phase}")))?,
        ),
        Some("Finalization") => Phase::Finalization,
        Some("Initialization") => Phase::Initialization,
        _ => return Err(malformed(format!("phase {phase}"))),
    };

    let outer = record
        .field("event")
        .ok_or_else(|| malformed("event record without event"))?;
    let pallet = outer
        .variant_name()
        .ok_or_else(|| malformed(format!("event {outer}")))?;
    let inner = outer
        .first_field()
        .ok_or_else(|| malformed(format!("event {outer}")))?;
    let method = inner
        .variant_name()
        .ok_or_else(|| malformed(format!("event {inner}")))?;

    let section = to_section_name(pallet);
    let kind = event_kind(&section, method, inner)?;
    let data = inner.fields().iter().map(|(_, value)| value.to_string()).collect();
    Ok(EventRecord {
        phase,
        event: Event::new(section, method, kind).with_data(data),
    })
}

fn required<'a>(event: &'a Value, field: &str) -> ClientResult<&'a Value> {
    event
        .field(field)
        .ok_or_else(|| malformed(format!("event field {field} missing in {event}")))
}

fn balance(event: &Value, field: &str) -> ClientResult<u128> {
    let value = required(event, field)?;
    value
        .as_u128()
        .ok_or_else(|| malformed(format!("{field} is not a balance: {value}")))
}

fn account(event: &Value, field: &str) -> ClientResult<fee_auditor::types::AccountId> {
    let value = required(event, field)?;
    value
        .as_account()
        .ok_or_else(|| malformed(format!("{field} is not an account: {value}")))
}

fn event_kind(section: &str, method: &str, event: &Value) -> ClientResult<EventKind> {
    let kind = match (section, method) {
        ("system", "ExtrinsicSuccess") => EventKind::ExtrinsicSuccess {
            dispatch_info: dispatch_info(required(event, "dispatch_info")?)?,
        },
        ("system", "ExtrinsicFailed") => EventKind::ExtrinsicFailed {
            dispatch_error: required(event, "dispatch_error")?.to_string(),
            dispatch_info: dispatch_info(required(event, "dispatch_info")?)?,
        },
        ("ethereum", "Executed") => EventKind::EthereumExecuted {
            from: account(event, "from")?,
        },
        ("treasury", "Deposit") => EventKind::TreasuryDeposit {
            value: balance(event, "value")?,
        },
        ("transactionPayment", "TransactionFeePaid") => EventKind::TransactionFeePaid {
            who: account(event, "who")?,
            actual_fee: balance(event, "actual_fee")?,
            tip: balance(event, "tip")?,
        },
        _ => EventKind::Other,
    };
    Ok(kind)
}

fn dispatch_info(info: &Value) -> ClientResult<DispatchInfo> {
    let weight = required(info, "weight")?;
    let weight = match weight.as_u128() {
        // Runtimes before weight v2 report a bare `u64`.
        Some(ref_time) => Weight::from_ref_time(ref_time as u64),
        None => Weight {
            ref_time: weight
                .field("ref_time")
                .and_then(Value::as_u128)
                .ok_or_else(|| malformed(format!("weight {weight}")))? as u64,
            proof_size: weight
                .field("proof_size")
                .and_then(Value::as_u128)
                .unwrap_or_default() as u64,
        },
    };
    let class = match required(info, "class")?.variant_name() {
        Some("Normal") => DispatchClass::Normal,
        Some("Operational") => DispatchClass::Operational,
        Some("Mandatory") => DispatchClass::Mandatory,
        other => return Err(malformed(format!("dispatch class {other:?}"))),
    };
    let pays_fee = required(info, "pays_fee")?.variant_name() == Some("Yes");
    Ok(DispatchInfo {
        weight,
        class,
        pays_fee,
    })
}

#[cfg(test)]
mod tests {
    #![allow(non_camel_case_types, dead_code)]

    use super::*;
    use crate::metadata::{PalletInfo, SignedExtension};
    use codec::Encode;
    use fee_auditor::types::AccountId;
    use scale_info::{MetaType, Registry, TypeInfo};

    #[derive(Encode, TypeInfo)]
    struct AccountId20([u8; 20]);

    #[derive(Encode, TypeInfo)]
    struct EthereumSignature([u8; 65]);

    #[derive(Encode, TypeInfo)]
    struct CheckNonce(#[codec(compact)] u32);

    #[derive(Encode, TypeInfo)]
    struct ChargeTransactionPayment(#[codec(compact)] u128);

    #[derive(Encode, TypeInfo)]
    struct U256([u64; 4]);

    #[derive(Encode, TypeInfo)]
    enum TimestampCall {
        set {
            #[codec(compact)]
            now: u64,
        },
    }

    #[derive(Encode, TypeInfo)]
    enum BalancesCall {
        #[codec(index = 3)]
        transfer_keep_alive {
            dest: AccountId20,
            #[codec(compact)]
            value: u128,
        },
    }

    #[derive(Encode, TypeInfo)]
    struct Eip1559Body {
        chain_id: u64,
        max_priority_fee_per_gas: U256,
        max_fee_per_gas: U256,
        gas_limit: U256,
    }

    #[derive(Encode, TypeInfo)]
    enum TransactionV2 {
        Legacy,
        EIP2930,
        EIP1559(Eip1559Body),
    }

    #[derive(Encode, TypeInfo)]
    enum EthereumCall {
        transact { transaction: TransactionV2 },
    }

    #[derive(Encode, TypeInfo)]
    struct WeightV2 {
        #[codec(compact)]
        ref_time: u64,
        #[codec(compact)]
        proof_size: u64,
    }

    #[derive(Encode, TypeInfo)]
    enum Class {
        Normal,
        Operational,
        Mandatory,
    }

    #[derive(Encode, TypeInfo)]
    enum Pays {
        Yes,
        No,
    }

    #[derive(Encode, TypeInfo)]
    struct Info {
        weight: WeightV2,
        class: Class,
        pays_fee: Pays,
    }

    #[derive(Encode, TypeInfo)]
    enum SystemEvent {
        ExtrinsicSuccess { dispatch_info: Info },
        ExtrinsicFailed { dispatch_error: DispatchError, dispatch_info: Info },
    }

    #[derive(Encode, TypeInfo)]
    enum DispatchError {
        Other,
        BadOrigin,
    }

    #[derive(Encode, TypeInfo)]
    enum TreasuryEvent {
        #[codec(index = 6)]
        Deposit { value: u128 },
    }

    #[derive(Encode, TypeInfo)]
    enum TransactionPaymentEvent {
        TransactionFeePaid {
            who: AccountId20,
            actual_fee: u128,
            tip: u128,
        },
    }

    #[derive(Encode, TypeInfo)]
    enum RuntimeEvent {
        System(SystemEvent),
        #[codec(index = 17)]
        Treasury(TreasuryEvent),
        #[codec(index = 32)]
        TransactionPayment(TransactionPaymentEvent),
    }

    #[derive(Encode, TypeInfo)]
    enum EventPhase {
        ApplyExtrinsic(u32),
        Finalization,
        Initialization,
    }

    #[derive(Encode, TypeInfo)]
    struct Record {
        phase: EventPhase,
        event: RuntimeEvent,
        topics: Vec<[u8; 32]>,
    }

    #[derive(Encode, TypeInfo)]
    struct FlaggedPayment(bool);

    fn runtime_types() -> RuntimeTypes {
        runtime_types_with_payment::<ChargeTransactionPayment>()
    }

    fn runtime_types_with_payment<P: TypeInfo + 'static>() -> RuntimeTypes {
        let mut registry = Registry::new();
        let mut id = |meta: MetaType| registry.register_type(&meta).id;
        let address_ty = id(MetaType::new::<AccountId20>());
        let signature_ty = id(MetaType::new::<EthereumSignature>());
        let nonce_ty = id(MetaType::new::<CheckNonce>());
        let payment_ty = id(MetaType::new::<P>());
        let timestamp_ty = id(MetaType::new::<TimestampCall>());
        let balances_ty = id(MetaType::new::<BalancesCall>());
        let ethereum_ty = id(MetaType::new::<EthereumCall>());
        let events_ty = id(MetaType::new::<Vec<Record>>());

        let pallet = |index, name: &str, call_ty| PalletInfo {
            index,
            name: name.into(),
            call_ty: Some(call_ty),
            event_ty: None,
        };
        RuntimeTypes {
            spec_version: 3400,
            pallets: vec![
                pallet(3, "Timestamp", timestamp_ty),
                pallet(10, "Balances", balances_ty),
                pallet(52, "Ethereum", ethereum_ty),
            ],
            address_ty,
            signature_ty,
            signed_extensions: vec![
                SignedExtension {
                    identifier: "CheckNonce".into(),
                    ty: nonce_ty,
                },
                SignedExtension {
                    identifier: "ChargeTransactionPayment".into(),
                    ty: payment_ty,
                },
            ],
            events_ty,
            registry: registry.into(),
        }
    }

    fn opaque(body: Vec<u8>) -> Vec<u8> {
        let mut encoded = Compact(body.len() as u32).encode();
        encoded.extend(body);
        encoded
    }

    fn gwei(value: u64) -> U256 {
        U256([value * 1_000_000_000, 0, 0, 0])
    }

    #[test]
    fn signed_transfer_yields_signer_and_tip() {
        let types = runtime_types();
        let mut body = vec![SIGNED_BIT | EXTRINSIC_VERSION];
        body.extend(AccountId20([0xf2; 20]).encode());
        body.extend(EthereumSignature([0; 65]).encode());
        body.extend(CheckNonce(7).encode());
        body.extend(ChargeTransactionPayment(500).encode());
        body.push(10);
        body.extend(
            BalancesCall::transfer_keep_alive {
                dest: AccountId20([0x3c; 20]),
                value: 1_000,
            }
            .encode(),
        );

        let encoded = opaque(body);
        let decoded = decode_extrinsic(&types, 1, encoded.clone()).unwrap();
        let extrinsic = decoded.extrinsic;
        assert_eq!(extrinsic.call_name(), "balances.transferKeepAlive");
        assert_eq!(extrinsic.signer, Some(AccountId::repeat_byte(0xf2)));
        assert_eq!(extrinsic.tip, 500);
        assert_eq!(extrinsic.encoded, encoded);
        assert_eq!(extrinsic.args[1], "1000");
        assert!(decoded.timestamp.is_none());
    }

    #[test]
    fn undecodable_tip_is_an_error() {
        let types = runtime_types_with_payment::<FlaggedPayment>();
        let mut body = vec![SIGNED_BIT | EXTRINSIC_VERSION];
        body.extend(AccountId20([0xf2; 20]).encode());
        body.extend(EthereumSignature([0; 65]).encode());
        body.extend(CheckNonce(7).encode());
        body.extend(FlaggedPayment(true).encode());
        body.push(10);
        body.extend(
            BalancesCall::transfer_keep_alive {
                dest: AccountId20([0x3c; 20]),
                value: 1_000,
            }
            .encode(),
        );

        let err = decode_extrinsic(&types, 1, opaque(body)).unwrap_err();
        assert!(
            matches!(err, ClientError::Decode(ref msg) if msg.contains("ChargeTransactionPayment"))
        );
    }

    #[test]
    fn timestamp_inherent_carries_block_time() {
        let types = runtime_types();
        let mut body = vec![EXTRINSIC_VERSION, 3];
        body.extend(TimestampCall::set { now: 1_700_000_000_000 }.encode());
        let decoded = decode_extrinsic(&types, 0, opaque(body)).unwrap();
        assert_eq!(decoded.extrinsic.call_name(), "timestamp.set");
        assert!(!decoded.extrinsic.is_signed());
        assert_eq!(decoded.timestamp, Some(1_700_000_000_000));
    }

    #[test]
    fn ethereum_transact_exposes_fee_fields() {
        let types = runtime_types();
        let mut body = vec![EXTRINSIC_VERSION, 52];
        body.extend(
            EthereumCall::transact {
                transaction: TransactionV2::EIP1559(Eip1559Body {
                    chain_id: 1287,
                    max_priority_fee_per_gas: gwei(1),
                    max_fee_per_gas: gwei(3),
                    gas_limit: U256([21_000, 0, 0, 0]),
                }),
            }
            .encode(),
        );
        let extrinsic = decode_extrinsic(&types, 2, opaque(body)).unwrap().extrinsic;
        assert!(extrinsic.is_ethereum());
        assert_eq!(
            extrinsic.ethereum,
            Some(EthereumTransaction::Eip1559 {
                max_fee_per_gas: 3_000_000_000,
                max_priority_fee_per_gas: 1_000_000_000,
            })
        );
    }

    #[test]
    fn unknown_pallet_and_version_are_errors() {
        let types = runtime_types();
        assert!(decode_extrinsic(&types, 0, opaque(vec![EXTRINSIC_VERSION, 99, 0])).is_err());
        assert!(matches!(
            decode_extrinsic(&types, 0, opaque(vec![5, 3])),
            Err(ClientError::Unsupported(_))
        ));
    }

    #[test]
    fn events_map_to_typed_kinds() {
        let types = runtime_types();
        let info = || Info {
            weight: WeightV2 {
                ref_time: 250_000_000,
                proof_size: 3_593,
            },
            class: Class::Normal,
            pays_fee: Pays::Yes,
        };
        let records = vec![
            Record {
                phase: EventPhase::ApplyExtrinsic(1),
                event: RuntimeEvent::TransactionPayment(
                    TransactionPaymentEvent::TransactionFeePaid {
                        who: AccountId20([0xf2; 20]),
                        actual_fee: 1_200,
                        tip: 200,
                    },
                ),
                topics: vec![],
            },
            Record {
                phase: EventPhase::ApplyExtrinsic(1),
                event: RuntimeEvent::Treasury(TreasuryEvent::Deposit { value: 240 }),
                topics: vec![],
            },
            Record {
                phase: EventPhase::ApplyExtrinsic(1),
                event: RuntimeEvent::System(SystemEvent::ExtrinsicSuccess {
                    dispatch_info: info(),
                }),
                topics: vec![],
            },
            Record {
                phase: EventPhase::ApplyExtrinsic(2),
                event: RuntimeEvent::System(SystemEvent::ExtrinsicFailed {
                    dispatch_error: DispatchError::BadOrigin,
                    dispatch_info: info(),
                }),
                topics: vec![],
            },
            Record {
                phase: EventPhase::Finalization,
                event: RuntimeEvent::Treasury(TreasuryEvent::Deposit { value: 1 }),
                topics: vec![[0; 32]],
            },
        ];

        let events = decode_events(&types, &records.encode()).unwrap();
        assert_eq!(events.len(), 5);
        assert_eq!(events[0].phase, Phase::ApplyExtrinsic(1));
        assert_eq!(
            events[0].event.kind,
            EventKind::TransactionFeePaid {
                who: AccountId::repeat_byte(0xf2),
                actual_fee: 1_200,
                tip: 200,
            }
        );
        assert_eq!(events[1].event.to_string(), "treasury.Deposit:: [240]");
        assert_eq!(
            events[2].event.kind,
            EventKind::ExtrinsicSuccess {
                dispatch_info: DispatchInfo {
                    weight: Weight {
                        ref_time: 250_000_000,
                        proof_size: 3_593,
                    },
                    class: DispatchClass::Normal,
                    pays_fee: true,
                },
            }
        );
        assert!(matches!(
            &events[3].event.kind,
            EventKind::ExtrinsicFailed { dispatch_error, .. } if dispatch_error == "BadOrigin"
        ));
        assert_eq!(events[4].phase, Phase::Finalization);
    }
}
