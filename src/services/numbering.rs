use uuid::Uuid;

/// Generates human-readable BOM numbers like `BOM-1A2B3C4D`.
///
/// The suffix is the first eight hex digits of a v4 UUID, which is short
/// enough to read out loud. Collisions are possible at that length, so the
/// writer checks the number against the store and asks again on a hit.
#[derive(Debug, Clone)]
pub struct BomNumberGenerator {
    prefix: String,
}

impl BomNumberGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn generate(&self) -> String {
        let id = Uuid::new_v4().simple().to_string();
        format!("{}-{}", self.prefix, id[..8].to_uppercase())
    }
}
