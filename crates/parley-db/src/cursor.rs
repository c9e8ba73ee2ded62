use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;
use uuid::Uuid;

/// Position of the last row of a page. Pages are ordered by
/// `(created_at DESC, id DESC)`, so the next page starts strictly after it and
/// rows inserted in the meantime never shift earlier pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub created_at: i64,
    pub id: Uuid,
}

impl Cursor {
    pub fn encode(&self) -> String {
        B64.encode(format!("{}:{}", self.created_at, self.id))
    }

    pub fn decode(raw: &str) -> Option<Self> {
        let bytes = B64.decode(raw).ok()?;
        let text = String::from_utf8(bytes).ok()?;
        let (ms, id) = text.split_once(':')?;
        Some(Self {
            created_at: ms.parse().ok()?,
            id: id.parse().ok()?,
        })
    }
}
