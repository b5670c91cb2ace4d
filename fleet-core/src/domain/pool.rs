//! Model and Pool entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Declarative model record. Existence does not imply the model is pulled
/// anywhere — pulling is driven by the Runtime State Engine's reconciliation
/// against pool membership.
///
/// Invariant: `context_length > 0`; at least one capability flag is true.
/// Constructors enforce this; callers that need to deserialize untrusted data
/// should validate with [`Model::validate`] before use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub id: String,
    pub name: String,
    pub context_length: u32,
    pub can_chat: bool,
    pub can_prompt: bool,
    pub can_embed: bool,
    pub can_stream: bool,
    pub created_at: DateTime<Utc>,
}

impl Model {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        context_length: u32,
        can_chat: bool,
        can_prompt: bool,
        can_embed: bool,
        can_stream: bool,
    ) -> Result<Self, String> {
        let model = Self {
            id: id.into(),
            name: name.into(),
            context_length,
            can_chat,
            can_prompt,
            can_embed,
            can_stream,
            created_at: Utc::now(),
        };
        model.validate()?;
        Ok(model)
    }

    /// Checks the two declared invariants: positive context length, at
    /// least one capability.
    pub fn validate(&self) -> Result<(), String> {
        if self.context_length == 0 {
            return Err(format!("model {}: context_length must be > 0", self.id));
        }
        if !(self.can_chat || self.can_prompt || self.can_embed || self.can_stream) {
            return Err(format!("model {}: at least one capability flag must be true", self.id));
        }
        Ok(())
    }
}

/// Reserved, immutable pool ids. Mutation attempts against these
/// (e.g. deleting the pool, or deleting the last backend/model reference that
/// would orphan it) must fail with `CoreError::Immutable`.
pub mod reserved {
    pub const EMBEDDING_POOL: &str = "embedding";
    pub const TASKS_POOL: &str = "tasks";
}

/// Strongly-typed pool id so call sites can't typo a reserved id check.
pub type PoolId = String;

/// What a pool is used for. Informational; routing only cares about membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurposeType {
    General,
    Embedding,
    Tasks,
}

/// A named set with two membership relations: pool↔backend and pool↔model.
///
/// A backend participates in request routing only if it belongs to ≥1 pool; a
/// model is a routing candidate only if it belongs to ≥1 pool. Membership
/// itself lives in the Store (join tables), not on this struct, to keep
/// `Pool` cheap to clone into the runtime snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pool {
    pub id: PoolId,
    pub name: String,
    pub purpose_type: PurposeType,
    pub created_at: DateTime<Utc>,
}

impl Pool {
    pub fn new(id: impl Into<String>, name: impl Into<String>, purpose_type: PurposeType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            purpose_type,
            created_at: Utc::now(),
        }
    }

    /// True for the two pool ids that must never be renamed or deleted.
    pub fn is_reserved(&self) -> bool {
        self.id == reserved::EMBEDDING_POOL || self.id == reserved::TASKS_POOL
    }
}
