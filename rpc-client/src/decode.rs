//! Registry-driven SCALE decoding into a dynamic [`Value`].

use std::fmt;

use codec::{Compact, Decode};
use fee_auditor::types::AccountId;
use fee_auditor::ClientError;
use scale_info::form::PortableForm;
use scale_info::{Field, PortableRegistry, TypeDef, TypeDefPrimitive};
use sp_core::U256;

pub type Fields = Vec<(Option<String>, Value)>;

/// A decoded SCALE value, shaped by the type it was decoded with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Bool(bool),
    Char(char),
    Str(String),
    Uint(u128),
    Int(i128),
    U256(U256),
    /// `Vec<u8>` and `[u8; N]`.
    Bytes(Vec<u8>),
    Sequence(Vec<Value>),
    Composite(Fields),
    Variant { name: String, fields: Fields },
}

impl Value {
    /// Numeric view, looking through single-field wrappers such as `Compact`
    /// newtypes and `FixedU128`.
    pub fn as_u128(&self) -> Option<u128> {
        match self.as_u256()? {
            value if value <= U256::from(u128::MAX) => Some(value.low_u128()),
            _ => None,
        }
    }

    /// Also accepts `primitive_types::U256` as the runtime describes it: a
    /// newtype over four little-endian `u64` limbs.
    pub fn as_u256(&self) -> Option<U256> {
        match self {
            Value::Uint(value) => Some(U256::from(*value)),
            Value::U256(value) => Some(*value),
            Value::Composite(fields) if fields.len() == 1 => fields[0].1.as_u256(),
            Value::Sequence(limbs) if limbs.len() == 4 => {
                let mut words = [0u64; 4];
                for (word, limb) in words.iter_mut().zip(limbs) {
                    match limb {
                        Value::Uint(value) => *word = u64::try_from(*value).ok()?,
                        _ => return None,
                    }
                }
                Some(U256(words))
            }
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(bytes) => Some(bytes),
            Value::Composite(fields) if fields.len() == 1 => fields[0].1.as_bytes(),
            _ => None,
        }
    }

    /// 20-byte account, possibly wrapped (`AccountId20`, `H160`).
    pub fn as_account(&self) -> Option<AccountId> {
        match self.as_bytes() {
            Some(bytes) if bytes.len() == 20 => Some(AccountId::from_slice(bytes)),
            _ => None,
        }
    }

    pub fn variant_name(&self) -> Option<&str> {
        match self {
            Value::Variant { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn fields(&self) -> &[(Option<String>, Value)] {
        match self {
            Value::Composite(fields) | Value::Variant { fields, .. } => fields,
            _ => &[],
        }
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields()
            .iter()
            .find(|(field, _)| field.as_deref() == Some(name))
            .map(|(_, value)| value)
    }

    pub fn first_field(&self) -> Option<&Value> {
        self.fields().first().map(|(_, value)| value)
    }
}

fn write_fields(f: &mut fmt::Formatter<'_>, fields: &Fields) -> fmt::Result {
    let named = fields.iter().all(|(name, _)| name.is_some());
    let (open, close) = if named { ("{", "}") } else { ("(", ")") };
    f.write_str(open)?;
    for (i, (name, value)) in fields.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        match name {
            Some(name) => write!(f, "{name}: {value}")?,
            None => write!(f, "{value}")?,
        }
    }
    f.write_str(close)
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(value) => write!(f, "{value}"),
            Value::Char(value) => write!(f, "{value}"),
            Value::Str(value) => write!(f, "{value}"),
            Value::Uint(value) => write!(f, "{value}"),
            Value::Int(value) => write!(f, "{value}"),
            Value::U256(value) => write!(f, "{value}"),
            Value::Bytes(bytes) => write!(f, "0x{}", hex::encode(bytes)),
            Value::Sequence(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Composite(fields) if fields.len() == 1 && fields[0].0.is_none() => {
                write!(f, "{}", fields[0].1)
            }
            Value::Composite(fields) => write_fields(f, fields),
            Value::Variant { name, fields } if fields.is_empty() => f.write_str(name),
            Value::Variant { name, fields } => {
                f.write_str(name)?;
                write_fields(f, fields)
            }
        }
    }
}

fn decode_err(what: impl fmt::Display) -> ClientError {
    ClientError::Decode(what.to_string())
}

fn scalar<T: Decode>(input: &mut &[u8], what: &str) -> Result<T, ClientError> {
    T::decode(input).map_err(|e| decode_err(format!("{what}: {e}")))
}

fn take(input: &mut &[u8], len: usize) -> Result<Vec<u8>, ClientError> {
    if input.len() < len {
        return Err(decode_err(format!(
            "need {len} bytes, {} remaining",
            input.len()
        )));
    }
    let (head, tail) = input.split_at(len);
    *input = tail;
    Ok(head.to_vec())
}

/// Decodes one value of type `type_id` from the front of `input`.
pub fn decode_value(
    registry: &PortableRegistry,
    type_id: u32,
    input: &mut &[u8],
) -> Result<Value, ClientError> {
    let ty = registry
        .resolve(type_id)
        .ok_or_else(|| decode_err(format!("type {type_id} missing from registry")))?;

    match &ty.type_def {
        TypeDef::Composite(composite) => {
            decode_fields(registry, &composite.fields, input).map(Value::Composite)
        }
        TypeDef::Variant(variant) => {
            let index: u8 = scalar(input, "variant index")?;
            let chosen = variant
                .variants
                .iter()
                .find(|candidate| candidate.index == index)
                .ok_or_else(|| {
                    decode_err(format!("variant {index} not in type {type_id}"))
                })?;
            Ok(Value::Variant {
                name: chosen.name.clone(),
                fields: decode_fields(registry, &chosen.fields, input)?,
            })
        }
        TypeDef::Sequence(sequence) => {
            let len = scalar::<Compact<u32>>(input, "sequence length")?.0 as usize;
            decode_items(registry, sequence.type_param.id, len, input)
        }
        TypeDef::Array(array) => {
            decode_items(registry, array.type_param.id, array.len as usize, input)
        }
        TypeDef::Tuple(tuple) => {
            let mut fields = Vec::with_capacity(tuple.fields.len());
            for field in &tuple.fields {
                fields.push((None, decode_value(registry, field.id, input)?));
            }
            Ok(Value::Composite(fields))
        }
        TypeDef::Primitive(primitive) => decode_primitive(primitive, input),
        TypeDef::Compact(_) => Ok(Value::Uint(scalar::<Compact<u128>>(input, "compact")?.0)),
        TypeDef::BitSequence(_) => Err(ClientError::Unsupported(format!(
            "bit sequence in type {type_id}"
        ))),
    }
}

fn decode_fields(
    registry: &PortableRegistry,
    fields: &[Field<PortableForm>],
    input: &mut &[u8],
) -> Result<Fields, ClientError> {
    fields
        .iter()
        .map(|field| Ok((field.name.clone(), decode_value(registry, field.ty.id, input)?)))
        .collect()
}

fn is_byte(registry: &PortableRegistry, type_id: u32) -> bool {
    matches!(
        registry.resolve(type_id).map(|ty| &ty.type_def),
        Some(TypeDef::Primitive(TypeDefPrimitive::U8))
    )
}

fn decode_items(
    registry: &PortableRegistry,
    item_ty: u32,
    len: usize,
    input: &mut &[u8],
) -> Result<Value, ClientError> {
    if is_byte(registry, item_ty) {
        return take(input, len).map(Value::Bytes);
    }
    let mut items = Vec::with_capacity(len.min(input.len()));
    for _ in 0..len {
        items.push(decode_value(registry, item_ty, input)?);
    }
    Ok(Value::Sequence(items))
}

fn decode_primitive(primitive: &TypeDefPrimitive, input: &mut &[u8]) -> Result<Value, ClientError> {
    let value = match primitive {
        TypeDefPrimitive::Bool => Value::Bool(scalar(input, "bool")?),
        TypeDefPrimitive::Char => {
            let code: u32 = scalar(input, "char")?;
            Value::Char(char::from_u32(code).ok_or_else(|| decode_err("invalid char"))?)
        }
        TypeDefPrimitive::Str => Value::Str(scalar(input, "str")?),
        TypeDefPrimitive::U8 => Value::Uint(scalar::<u8>(input, "u8")?.into()),
        TypeDefPrimitive::U16 => Value::Uint(scalar::<u16>(input, "u16")?.into()),
        TypeDefPrimitive::U32 => Value::Uint(scalar::<u32>(input, "u32")?.into()),
        TypeDefPrimitive::U64 => Value::Uint(scalar::<u64>(input, "u64")?.into()),
        TypeDefPrimitive::U128 => Value::Uint(scalar(input, "u128")?),
        TypeDefPrimitive::U256 => Value::U256(U256::from_little_endian(&take(input, 32)?)),
        TypeDefPrimitive::I8 => Value::Int(scalar::<i8>(input, "i8")?.into()),
        TypeDefPrimitive::I16 => Value::Int(scalar::<i16>(input, "i16")?.into()),
        TypeDefPrimitive::I32 => Value::Int(scalar::<i32>(input, "i32")?.into()),
        TypeDefPrimitive::I64 => Value::Int(scalar::<i64>(input, "i64")?.into()),
        TypeDefPrimitive::I128 => Value::Int(scalar(input, "i128")?),
        TypeDefPrimitive::I256 => Value::Bytes(take(input, 32)?),
    };
    Ok(value)
}

/// `transfer_keep_alive` -> `transferKeepAlive`.
pub fn to_camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for c in name.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// `TransactionPayment` -> `transactionPayment`, `EVM` -> `evm`.
pub fn to_section_name(pallet: &str) -> String {
    if pallet.chars().all(|c| !c.is_lowercase()) {
        return pallet.to_lowercase();
    }
    let mut chars = pallet.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}
