use alloy::primitives::{keccak256, I256, U256};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use tracing::warn;

use super::{utils, Web3Error};

type Result<T> = std::result::Result<T, Web3Error>;

/// Selectors pinned for the zero-argument functions the farm calls.
const KNOWN_SELECTORS: [(&str, [u8; 4]); 3] = [
    ("createClone", [0x64, 0xf2, 0xd4, 0xb9]),
    ("ping", [0x5c, 0x36, 0xb1, 0x86]),
    ("counter", [0x61, 0xbc, 0x22, 0x1a]),
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AbiParam {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AbiItemKind {
    Function,
    Constructor,
}

/// Minimal ABI fragment: enough to find a function and encode its inputs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AbiItem {
    #[serde(rename = "type")]
    pub kind: AbiItemKind,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<AbiParam>,
    pub state_mutability: String,
}

impl AbiItem {
    pub fn function(name: &str, inputs: &[(&str, &str)], state_mutability: &str) -> Self {
        Self {
            kind: AbiItemKind::Function,
            name: name.to_string(),
            inputs: params(inputs),
            state_mutability: state_mutability.to_string(),
        }
    }

    pub fn constructor(inputs: &[(&str, &str)]) -> Self {
        Self {
            kind: AbiItemKind::Constructor,
            name: String::new(),
            inputs: params(inputs),
            state_mutability: "nonpayable".to_string(),
        }
    }

    /// Canonical signature, e.g. `mint(string,uint256)`.
    pub fn signature(&self) -> String {
        let types: Vec<&str> = self.inputs.iter().map(|i| i.ty.as_str()).collect();
        format!("{}({})", self.name, types.join(","))
    }
}

fn params(inputs: &[(&str, &str)]) -> Vec<AbiParam> {
    inputs
        .iter()
        .map(|(name, ty)| AbiParam {
            name: name.to_string(),
            ty: ty.to_string(),
        })
        .collect()
}

pub fn find_function<'a>(abi: &'a [AbiItem], method_name: &str) -> Result<&'a AbiItem> {
    utils::validate_function_name(method_name)?;
    abi.iter()
        .find(|item| item.kind == AbiItemKind::Function && item.name == method_name)
        .ok_or_else(|| Web3Error::MethodNotFound(method_name.to_string()))
}

pub fn find_constructor(abi: &[AbiItem]) -> Option<&AbiItem> {
    abi.iter().find(|item| item.kind == AbiItemKind::Constructor)
}

pub fn keccak_selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

fn known_selector(name: &str) -> Option<[u8; 4]> {
    KNOWN_SELECTORS
        .iter()
        .find(|(known, _)| *known == name)
        .map(|(_, selector)| *selector)
}

/// Selector for a zero-argument function, `0x` + 8 hex digits.
pub fn function_selector(method_name: &str) -> String {
    let selector =
        known_selector(method_name).unwrap_or_else(|| keccak_selector(&format!("{}()", method_name)));
    format!("0x{}", hex::encode(selector))
}

/// Selector for an ABI function. Pinned selectors only apply to the
/// zero-argument overloads.
pub fn encode_function_signature(item: &AbiItem) -> [u8; 4] {
    if item.inputs.is_empty() {
        if let Some(selector) = known_selector(&item.name) {
            return selector;
        }
    }
    keccak_selector(&item.signature())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SolKind {
    Uint(usize),
    Int(usize),
    Address,
    Bool,
    String,
    Bytes,
    Array,
}

impl SolKind {
    fn parse(ty: &str) -> Result<Self> {
        if ty.ends_with("[]") {
            return Ok(SolKind::Array);
        }
        match ty {
            "address" => Ok(SolKind::Address),
            "bool" => Ok(SolKind::Bool),
            "string" => Ok(SolKind::String),
            "bytes" => Ok(SolKind::Bytes),
            _ => {
                if let Some(bits) = ty.strip_prefix("uint") {
                    parse_bits(bits, ty).map(SolKind::Uint)
                } else if let Some(bits) = ty.strip_prefix("int") {
                    parse_bits(bits, ty).map(SolKind::Int)
                } else {
                    Err(Web3Error::UnsupportedType(ty.to_string()))
                }
            }
        }
    }

    fn is_dynamic(self) -> bool {
        matches!(self, SolKind::String | SolKind::Bytes | SolKind::Array)
    }
}

fn parse_bits(bits: &str, ty: &str) -> Result<usize> {
    if bits.is_empty() {
        return Ok(256);
    }
    match bits.parse::<usize>() {
        Ok(n) if n > 0 && n <= 256 && n % 8 == 0 => Ok(n),
        _ => Err(Web3Error::UnsupportedType(ty.to_string())),
    }
}

fn invalid_param(input: &AbiParam, message: impl std::fmt::Display) -> Web3Error {
    Web3Error::InvalidInput(format!(
        "Invalid parameter '{}' of type '{}': {}",
        input.name, input.ty, message
    ))
}

/// Encodes one static value as a left-padded 32-byte word.
fn encode_static_word(kind: SolKind, input: &AbiParam, value: &Value) -> Result<[u8; 32]> {
    match kind {
        SolKind::Uint(bits) => {
            let num = match value {
                Value::Number(n) => n
                    .as_u64()
                    .map(U256::from)
                    .ok_or_else(|| invalid_param(input, "expected an unsigned integer"))?,
                Value::String(s) if s.starts_with("0x") || s.starts_with("0X") => {
                    U256::from_str_radix(utils::strip_0x(s), 16)
                        .map_err(|_| invalid_param(input, format!("invalid hex uint '{}'", s)))?
                }
                Value::String(s) => U256::from_str(s)
                    .map_err(|_| invalid_param(input, format!("invalid uint '{}'", s)))?,
                _ => return Err(invalid_param(input, "uint must be a number or string")),
            };
            if bits < 256 && num >> bits != U256::ZERO {
                return Err(invalid_param(input, format!("value does not fit in {} bits", bits)));
            }
            Ok(num.to_be_bytes::<32>())
        }
        SolKind::Int(bits) => {
            let num = match value {
                Value::Number(n) => n
                    .as_i64()
                    .map(I256::try_from)
                    .and_then(|r| r.ok())
                    .ok_or_else(|| invalid_param(input, "expected an integer"))?,
                Value::String(s) => I256::from_dec_str(s)
                    .map_err(|_| invalid_param(input, format!("invalid int '{}'", s)))?,
                _ => return Err(invalid_param(input, "int must be a number or string")),
            };
            if bits < 256 {
                let high = num.asr(bits - 1);
                if high != I256::ZERO && high != I256::MINUS_ONE {
                    return Err(invalid_param(input, format!("value does not fit in {} bits", bits)));
                }
            }
            Ok(num.into_raw().to_be_bytes::<32>())
        }
        SolKind::Address => {
            let s = value
                .as_str()
                .ok_or_else(|| invalid_param(input, "address must be a string"))?;
            let address = utils::validate_address(s)?;
            let mut word = [0u8; 32];
            word[12..].copy_from_slice(address.as_slice());
            Ok(word)
        }
        SolKind::Bool => {
            let b = value
                .as_bool()
                .ok_or_else(|| invalid_param(input, "bool must be a boolean"))?;
            let mut word = [0u8; 32];
            word[31] = u8::from(b);
            Ok(word)
        }
        SolKind::String | SolKind::Bytes | SolKind::Array => {
            Err(invalid_param(input, "not a static type"))
        }
    }
}

fn check_param_count(inputs: &[AbiParam], params: &[Value]) -> Result<()> {
    if inputs.len() != params.len() {
        return Err(Web3Error::InvalidInput(format!(
            "Parameter count mismatch: expected {} parameters, got {}",
            inputs.len(),
            params.len()
        )));
    }
    Ok(())
}

/// Positional encoder used for contract calls and deployments.
///
/// Static values (`uintN`, `intN`, `address`, `bool`) become consecutive
/// 32-byte words. Dynamic values (`string`, `bytes`, `T[]`) are not encoded
/// and are left out of the output; only zero-argument calls and static
/// constructors are safe with this encoder.
pub fn encode_parameters(inputs: &[AbiParam], params: &[Value]) -> Result<String> {
    if inputs.is_empty() {
        return Ok("0x".to_string());
    }
    check_param_count(inputs, params)?;

    let mut encoded = String::from("0x");
    for (input, param) in inputs.iter().zip(params) {
        let kind = SolKind::parse(&input.ty)?;
        if kind.is_dynamic() {
            warn!(
                "Dynamic parameter '{}' of type '{}' is not supported by the positional encoder and was skipped",
                input.name, input.ty
            );
            continue;
        }
        encoded.push_str(&hex::encode(encode_static_word(kind, input, param)?));
    }
    Ok(encoded)
}

/// Selector plus positionally encoded parameters.
pub fn encode_call(item: &AbiItem, params: &[Value]) -> Result<String> {
    let selector = encode_function_signature(item);
    let encoded = encode_parameters(&item.inputs, params)?;
    Ok(format!("0x{}{}", hex::encode(selector), &encoded[2..]))
}

/// Head/tail encoder for functions with `string`/`bytes` arguments.
///
/// The selector is supplied by the caller: it must be the target
/// contract's real selector and is never derived here.
pub struct AbiEncoder;

impl AbiEncoder {
    pub fn encode_function_data(
        abi: &[AbiItem],
        function_name: &str,
        params: &[Value],
        selector: [u8; 4],
    ) -> Result<String> {
        let function = find_function(abi, function_name)?;
        let encoded = Self::encode_parameters(&function.inputs, params)?;
        Ok(format!("0x{}{}", hex::encode(selector), hex::encode(encoded)))
    }

    pub fn encode_parameters(inputs: &[AbiParam], params: &[Value]) -> Result<Vec<u8>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        check_param_count(inputs, params)?;

        let mut head = Vec::with_capacity(inputs.len() * 32);
        let mut tail = Vec::new();
        let head_size = inputs.len() * 32;

        for (input, param) in inputs.iter().zip(params) {
            let kind = SolKind::parse(&input.ty)?;
            if kind.is_dynamic() {
                let offset = U256::from(head_size + tail.len());
                head.extend_from_slice(&offset.to_be_bytes::<32>());
                tail.extend(Self::encode_dynamic(kind, input, param)?);
            } else {
                head.extend_from_slice(&encode_static_word(kind, input, param)?);
            }
        }

        head.extend(tail);
        Ok(head)
    }

    fn encode_dynamic(kind: SolKind, input: &AbiParam, value: &Value) -> Result<Vec<u8>> {
        let payload = match kind {
            SolKind::String => value
                .as_str()
                .ok_or_else(|| invalid_param(input, "string parameter must be a string"))?
                .as_bytes()
                .to_vec(),
            SolKind::Bytes => {
                let s = value
                    .as_str()
                    .ok_or_else(|| invalid_param(input, "bytes must be a hex string"))?;
                hex::decode(utils::strip_0x(s))
                    .map_err(|_| invalid_param(input, format!("invalid hex string '{}'", s)))?
            }
            _ => {
                return Err(Web3Error::UnsupportedType(format!(
                    "dynamic type {}",
                    input.ty
                )))
            }
        };
        Ok(Self::encode_length_prefixed(&payload))
    }

    /// 32-byte length word followed by the payload right-padded with zeros
    /// to a multiple of 32 bytes.
    fn encode_length_prefixed(payload: &[u8]) -> Vec<u8> {
        let padded_len = payload.len().div_ceil(32) * 32;
        let mut out = Vec::with_capacity(32 + padded_len);
        out.extend_from_slice(&U256::from(payload.len()).to_be_bytes::<32>());
        out.extend_from_slice(payload);
        out.resize(32 + padded_len, 0);
        out
    }
}
