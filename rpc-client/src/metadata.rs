use codec::Decode;
use frame_metadata::v14::StorageEntryType;
use frame_metadata::{RuntimeMetadata, RuntimeMetadataPrefixed};
use fee_auditor::ClientError;
use scale_info::PortableRegistry;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PalletInfo {
    pub index: u8,
    pub name: String,
    pub call_ty: Option<u32>,
    pub event_ty: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedExtension {
    pub identifier: String,
    pub ty: u32,
}

/// Type layout of one runtime version, enough to decode extrinsics and
/// `System.Events`.
#[derive(Clone, Debug)]
pub struct RuntimeTypes {
    pub spec_version: u32,
    pub registry: PortableRegistry,
    pub pallets: Vec<PalletInfo>,
    pub address_ty: u32,
    pub signature_ty: u32,
    pub signed_extensions: Vec<SignedExtension>,
    /// Value type of `System.Events`.
    pub events_ty: u32,
}

fn missing(what: impl Into<String>) -> ClientError {
    ClientError::Decode(format!("runtime metadata missing {}", what.into()))
}

macro_rules! collect_pallets {
    ($meta:expr) => {
        $meta
            .pallets
            .iter()
            .map(|pallet| PalletInfo {
                index: pallet.index,
                name: pallet.name.clone(),
                call_ty: pallet.calls.as_ref().map(|calls| calls.ty.id),
                event_ty: pallet.event.as_ref().map(|event| event.ty.id),
            })
            .collect::<Vec<_>>()
    };
}

macro_rules! events_storage_ty {
    ($meta:expr) => {
        $meta
            .pallets
            .iter()
            .find(|pallet| pallet.name == "System")
            .and_then(|pallet| pallet.storage.as_ref())
            .and_then(|storage| storage.entries.iter().find(|entry| entry.name == "Events"))
            .and_then(|entry| match &entry.ty {
                StorageEntryType::Plain(ty) => Some(ty.id),
                _ => None,
            })
    };
}

macro_rules! signed_extensions {
    ($extensions:expr) => {
        $extensions
            .iter()
            .map(|extension| SignedExtension {
                identifier: extension.identifier.clone(),
                ty: extension.ty.id,
            })
            .collect::<Vec<_>>()
    };
}

/// Finds the type parameter `name` of the `UncheckedExtrinsic` type. V14
/// metadata only exposes address and signature types this way.
fn extrinsic_type_param(
    registry: &PortableRegistry,
    extrinsic_ty: u32,
    name: &str,
) -> Result<u32, ClientError> {
    registry
        .resolve(extrinsic_ty)
        .and_then(|ty| ty.type_params.iter().find(|param| param.name == name))
        .and_then(|param| param.ty.as_ref())
        .map(|ty| ty.id)
        .ok_or_else(|| missing(format!("extrinsic type parameter {name}")))
}

impl RuntimeTypes {
    /// Decodes the output of `state_getMetadata`.
    pub fn decode(spec_version: u32, metadata_bytes: &[u8]) -> Result<Self, ClientError> {
        let prefixed = RuntimeMetadataPrefixed::decode(&mut &metadata_bytes[..])
            .map_err(|e| ClientError::Decode(format!("failed to decode runtime metadata: {e}")))?;

        match prefixed.1 {
            RuntimeMetadata::V14(meta) => {
                let extrinsic_ty = meta.extrinsic.ty.id;
                Ok(Self {
                    spec_version,
                    pallets: collect_pallets!(meta),
                    address_ty: extrinsic_type_param(&meta.types, extrinsic_ty, "Address")?,
                    signature_ty: extrinsic_type_param(&meta.types, extrinsic_ty, "Signature")?,
                    signed_extensions: signed_extensions!(meta.extrinsic.signed_extensions),
                    events_ty: events_storage_ty!(meta).ok_or_else(|| missing("System.Events"))?,
                    registry: meta.types,
                })
            }
            RuntimeMetadata::V15(meta) => Ok(Self {
                spec_version,
                pallets: collect_pallets!(meta),
                address_ty: meta.extrinsic.address_ty.id,
                signature_ty: meta.extrinsic.signature_ty.id,
                signed_extensions: signed_extensions!(meta.extrinsic.signed_extensions),
                events_ty: events_storage_ty!(meta).ok_or_else(|| missing("System.Events"))?,
                registry: meta.types,
            }),
            other => Err(ClientError::Unsupported(format!(
                "runtime metadata version {}",
                other.version()
            ))),
        }
    }

    pub fn pallet_by_index(&self, index: u8) -> Result<&PalletInfo, ClientError> {
        self.pallets
            .iter()
            .find(|pallet| pallet.index == index)
            .ok_or_else(|| missing(format!("pallet index {index}")))
    }

    pub fn pallet_by_name(&self, name: &str) -> Option<&PalletInfo> {
        self.pallets.iter().find(|pallet| pallet.name == name)
    }
}
