use crate::error::{LiteCoreError, Result};

/// Tree-form revision ID: `<gen>-<hex digest>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TreeRevId {
    pub generation: u64,
    pub digest: Vec<u8>,
}

impl TreeRevId {
    pub fn new(generation: u64, digest: Vec<u8>) -> Result<Self> {
        super::validate_not_zero_generation(generation)?;
        Ok(Self { generation, digest })
    }

    /// Parses `<gen>-<hex>`. The generation is parsed as decimal first (the
    /// wire/canonical form, spec.md §6); a hex fallback is tried for
    /// leniency with historical data, per spec.md §4.1's
    /// "decimal-or-hex-gen".
    pub fn parse(s: &str) -> Result<Self> {
        let (gen_part, hex_part) = s
            .split_once('-')
            .ok_or_else(|| LiteCoreError::BadRevisionId(format!("not a tree-form revision ID: {s:?}")))?;

        let generation = gen_part
            .parse::<u64>()
            .or_else(|_| u64::from_str_radix(gen_part, 16))
            .map_err(|_| LiteCoreError::BadRevisionId(format!("bad generation in {s:?}")))?;

        if hex_part.is_empty() || !hex_part.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(LiteCoreError::BadRevisionId(format!("bad digest in {s:?}")));
        }
        let digest = hex::decode(hex_part)
            .map_err(|_| LiteCoreError::BadRevisionId(format!("bad digest hex in {s:?}")))?;

        TreeRevId::new(generation, digest)
    }

    pub fn format(&self) -> String {
        format!("{}-{}", self.generation, hex::encode(&self.digest))
    }
}
