//! # Typed Structured Data (EIP-712)
//!
//! A message schema is declared once at configuration time. [`TypedSchema::new`]
//! precomputes the type hash and domain separator, so hashing a message only
//! encodes its field values.
//!
//! The signed struct is the application fields in declaration order followed by
//! the envelope header (`nonce`, `blockNumber`, `blockHash`), which binds the
//! signature to the freshness anchor as well as to the payload.
//!
//! ```text
//! digest = keccak256(0x19 || 0x01 || domainSeparator || hashStruct(message))
//! ```

use serde_json::Value;

use super::entities::{BlockPointer, Hash};
use super::errors::SchemaError;
use super::identity::keccak256;

/// Domain name shared by every radio.
pub const GRAPHCAST_DOMAIN_NAME: &str = "graphcast";

/// Domain version shared by every radio.
pub const GRAPHCAST_DOMAIN_VERSION: &str = "0";

/// Primary type name of every gossip message.
pub const GRAPHCAST_PRIMARY_TYPE: &str = "GraphcastMessage";

const DOMAIN_TYPE: &str = "EIP712Domain(string name,string version)";

/// Envelope header fields appended to every schema.
const HEADER_FIELDS: [(&str, FieldType); 3] = [
    ("nonce", FieldType::Uint64),
    ("blockNumber", FieldType::Uint64),
    ("blockHash", FieldType::String),
];

/// Solidity types a payload field may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Uint64,
    Bool,
    Address,
    Bytes32,
}

impl FieldType {
    pub fn solidity_name(self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Uint64 => "uint64",
            FieldType::Bool => "bool",
            FieldType::Address => "address",
            FieldType::Bytes32 => "bytes32",
        }
    }
}

/// One declared payload field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldType,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: FieldType) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// The EIP-712 domain of a message family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eip712Domain {
    pub name: String,
    pub version: String,
}

impl Eip712Domain {
    pub fn graphcast() -> Self {
        Self {
            name: GRAPHCAST_DOMAIN_NAME.to_string(),
            version: GRAPHCAST_DOMAIN_VERSION.to_string(),
        }
    }

    fn separator(&self) -> Hash {
        let mut encoded = Vec::with_capacity(96);
        encoded.extend_from_slice(&keccak256(DOMAIN_TYPE.as_bytes()));
        encoded.extend_from_slice(&keccak256(self.name.as_bytes()));
        encoded.extend_from_slice(&keccak256(self.version.as_bytes()));
        keccak256(&encoded)
    }
}

/// A resolved message schema with its hashing constants.
#[derive(Debug, Clone)]
pub struct TypedSchema {
    domain: Eip712Domain,
    primary_type: String,
    fields: Vec<FieldSpec>,
    type_hash: Hash,
    domain_separator: Hash,
}

impl TypedSchema {
    /// Resolve a schema.
    ///
    /// Field names must be unique and must not collide with the header fields.
    pub fn new(
        domain: Eip712Domain,
        primary_type: impl Into<String>,
        fields: Vec<FieldSpec>,
    ) -> Result<Self, SchemaError> {
        if fields.is_empty() {
            return Err(SchemaError::Empty);
        }
        for (i, field) in fields.iter().enumerate() {
            if HEADER_FIELDS.iter().any(|(name, _)| *name == field.name) {
                return Err(SchemaError::ReservedField(field.name.clone()));
            }
            if fields[..i].iter().any(|f| f.name == field.name) {
                return Err(SchemaError::DuplicateField(field.name.clone()));
            }
        }

        Ok(Self::resolve(domain, primary_type.into(), fields))
    }

    /// Schema of the POI cross-checker payload (`subgraph`, `nPOI`).
    pub fn npoi() -> Self {
        let fields = vec![
            FieldSpec::new("subgraph", FieldType::String),
            FieldSpec::new("nPOI", FieldType::String),
        ];
        Self::resolve(
            Eip712Domain::graphcast(),
            GRAPHCAST_PRIMARY_TYPE.to_string(),
            fields,
        )
    }

    fn resolve(domain: Eip712Domain, primary_type: String, fields: Vec<FieldSpec>) -> Self {
        let type_hash = keccak256(encode_type(&primary_type, &fields).as_bytes());
        let domain_separator = domain.separator();
        Self {
            domain,
            primary_type,
            fields,
            type_hash,
            domain_separator,
        }
    }

    pub fn domain(&self) -> &Eip712Domain {
        &self.domain
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Canonical type string, e.g. `GraphcastMessage(string subgraph,...)`.
    pub fn encoded_type(&self) -> String {
        encode_type(&self.primary_type, &self.fields)
    }

    /// `hashStruct` of a payload plus its envelope header.
    pub fn hash_struct(
        &self,
        payload: &Value,
        nonce: u64,
        block: &BlockPointer,
    ) -> Result<Hash, SchemaError> {
        let object = payload.as_object().ok_or(SchemaError::NotAnObject)?;

        let mut encoded = Vec::with_capacity(32 * (1 + self.fields.len() + HEADER_FIELDS.len()));
        encoded.extend_from_slice(&self.type_hash);

        for field in &self.fields {
            let value = object
                .get(&field.name)
                .ok_or_else(|| SchemaError::MissingField(field.name.clone()))?;
            encoded.extend_from_slice(&encode_value(&field.name, field.kind, value)?);
        }

        encoded.extend_from_slice(&encode_u64(nonce));
        encoded.extend_from_slice(&encode_u64(block.number));
        encoded.extend_from_slice(&keccak256(block.hash.as_bytes()));

        Ok(keccak256(&encoded))
    }

    /// Final digest that gets signed.
    pub fn signing_digest(
        &self,
        payload: &Value,
        nonce: u64,
        block: &BlockPointer,
    ) -> Result<Hash, SchemaError> {
        let struct_hash = self.hash_struct(payload, nonce, block)?;

        let mut message = Vec::with_capacity(66);
        message.extend_from_slice(&[0x19, 0x01]);
        message.extend_from_slice(&self.domain_separator);
        message.extend_from_slice(&struct_hash);
        Ok(keccak256(&message))
    }
}

fn encode_type(primary_type: &str, fields: &[FieldSpec]) -> String {
    let members: Vec<String> = fields
        .iter()
        .map(|f| (f.name.as_str(), f.kind))
        .chain(HEADER_FIELDS.iter().copied())
        .map(|(name, kind)| format!("{} {}", kind.solidity_name(), name))
        .collect();
    format!("{}({})", primary_type, members.join(","))
}

fn encode_u64(value: u64) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}

fn encode_value(name: &str, kind: FieldType, value: &Value) -> Result<[u8; 32], SchemaError> {
    let mismatch = || SchemaError::TypeMismatch {
        field: name.to_string(),
        expected: kind.solidity_name(),
    };

    match kind {
        FieldType::String => value
            .as_str()
            .map(|s| keccak256(s.as_bytes()))
            .ok_or_else(mismatch),
        FieldType::Uint64 => {
            let number = match value {
                Value::Number(n) => n.as_u64().ok_or_else(mismatch)?,
                Value::String(s) => s.parse::<u64>().map_err(|e| SchemaError::InvalidValue {
                    field: name.to_string(),
                    reason: e.to_string(),
                })?,
                _ => return Err(mismatch()),
            };
            Ok(encode_u64(number))
        }
        FieldType::Bool => {
            let flag = value.as_bool().ok_or_else(mismatch)?;
            let mut word = [0u8; 32];
            word[31] = u8::from(flag);
            Ok(word)
        }
        FieldType::Address => {
            let bytes = decode_hex_field(name, value.as_str().ok_or_else(mismatch)?, 20)?;
            let mut word = [0u8; 32];
            word[12..].copy_from_slice(&bytes);
            Ok(word)
        }
        FieldType::Bytes32 => {
            let bytes = decode_hex_field(name, value.as_str().ok_or_else(mismatch)?, 32)?;
            let mut word = [0u8; 32];
            word.copy_from_slice(&bytes);
            Ok(word)
        }
    }
}

fn decode_hex_field(name: &str, text: &str, len: usize) -> Result<Vec<u8>, SchemaError> {
    let stripped = text.strip_prefix("0x").unwrap_or(text);
    let bytes = hex::decode(stripped).map_err(|e| SchemaError::InvalidValue {
        field: name.to_string(),
        reason: e.to_string(),
    })?;
    if bytes.len() != len {
        return Err(SchemaError::InvalidValue {
            field: name.to_string(),
            reason: format!("expected {} bytes, got {}", len, bytes.len()),
        });
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn block() -> BlockPointer {
        BlockPointer::new(1, "0x0001")
    }

    #[test]
    fn test_npoi_encoded_type() {
        assert_eq!(
            TypedSchema::npoi().encoded_type(),
            "GraphcastMessage(string subgraph,string nPOI,uint64 nonce,uint64 blockNumber,string blockHash)"
        );
    }

    #[test]
    fn test_digest_is_deterministic() {
        let schema = TypedSchema::npoi();
        let payload = json!({"subgraph": "Qmaaa", "nPOI": "poi0"});
        let a = schema.signing_digest(&payload, 10, &block()).unwrap();
        let b = schema.signing_digest(&payload, 10, &block()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_digest_covers_every_field() {
        let schema = TypedSchema::npoi();
        let payload = json!({"subgraph": "Qmaaa", "nPOI": "poi0"});
        let base = schema.signing_digest(&payload, 10, &block()).unwrap();

        let other_value = json!({"subgraph": "Qmaaa", "nPOI": "poi1"});
        assert_ne!(base, schema.signing_digest(&other_value, 10, &block()).unwrap());
        assert_ne!(base, schema.signing_digest(&payload, 11, &block()).unwrap());
        assert_ne!(
            base,
            schema
                .signing_digest(&payload, 10, &BlockPointer::new(2, "0x0001"))
                .unwrap()
        );
        assert_ne!(
            base,
            schema
                .signing_digest(&payload, 10, &BlockPointer::new(1, "0x0002"))
                .unwrap()
        );
    }

    #[test]
    fn test_domain_separates_digests() {
        let payload = json!({"subgraph": "Qmaaa", "nPOI": "poi0"});
        let other_domain = TypedSchema::new(
            Eip712Domain {
                name: "graphcast".to_string(),
                version: "1".to_string(),
            },
            GRAPHCAST_PRIMARY_TYPE,
            TypedSchema::npoi().fields().to_vec(),
        )
        .unwrap();

        assert_ne!(
            TypedSchema::npoi().signing_digest(&payload, 1, &block()).unwrap(),
            other_domain.signing_digest(&payload, 1, &block()).unwrap()
        );
    }

    #[test]
    fn test_missing_field() {
        let payload = json!({"subgraph": "Qmaaa"});
        assert_eq!(
            TypedSchema::npoi().signing_digest(&payload, 1, &block()),
            Err(SchemaError::MissingField("nPOI".to_string()))
        );
    }

    #[test]
    fn test_type_mismatch() {
        let payload = json!({"subgraph": "Qmaaa", "nPOI": 7});
        assert!(matches!(
            TypedSchema::npoi().signing_digest(&payload, 1, &block()),
            Err(SchemaError::TypeMismatch { expected: "string", .. })
        ));
    }

    #[test]
    fn test_non_object_payload() {
        assert_eq!(
            TypedSchema::npoi().signing_digest(&json!("poi0"), 1, &block()),
            Err(SchemaError::NotAnObject)
        );
    }

    #[test]
    fn test_schema_validation() {
        let domain = Eip712Domain::graphcast();
        assert_eq!(
            TypedSchema::new(domain.clone(), "Ping", vec![]).unwrap_err(),
            SchemaError::Empty
        );
        assert_eq!(
            TypedSchema::new(
                domain.clone(),
                "Ping",
                vec![FieldSpec::new("nonce", FieldType::Uint64)]
            )
            .unwrap_err(),
            SchemaError::ReservedField("nonce".to_string())
        );
        assert_eq!(
            TypedSchema::new(
                domain,
                "Ping",
                vec![
                    FieldSpec::new("content", FieldType::String),
                    FieldSpec::new("content", FieldType::String),
                ]
            )
            .unwrap_err(),
            SchemaError::DuplicateField("content".to_string())
        );
    }

    #[test]
    fn test_all_field_types_encode() {
        let schema = TypedSchema::new(
            Eip712Domain::graphcast(),
            "Mixed",
            vec![
                FieldSpec::new("label", FieldType::String),
                FieldSpec::new("count", FieldType::Uint64),
                FieldSpec::new("flag", FieldType::Bool),
                FieldSpec::new("who", FieldType::Address),
                FieldSpec::new("root", FieldType::Bytes32),
            ],
        )
        .unwrap();

        let payload = json!({
            "label": "x",
            "count": "12",
            "flag": true,
            "who": format!("0x{}", "11".repeat(20)),
            "root": format!("0x{}", "22".repeat(32)),
        });
        assert!(schema.signing_digest(&payload, 1, &block()).is_ok());

        let short_address = json!({
            "label": "x",
            "count": 12,
            "flag": true,
            "who": "0x1111",
            "root": format!("0x{}", "22".repeat(32)),
        });
        assert!(matches!(
            schema.signing_digest(&short_address, 1, &block()),
            Err(SchemaError::InvalidValue { .. })
        ));
    }
}
