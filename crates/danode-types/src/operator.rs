use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Identifier of a quorum a blob can be striped across.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuorumId(pub u8);

impl fmt::Display for QuorumId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// On-chain identity of an operator.
///
/// Derived deterministically from the operator's public key using BLAKE3, so
/// the same key material always yields the same `OperatorId`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperatorId([u8; 32]);

impl OperatorId {
    /// Derive an `OperatorId` from a 32-byte public key.
    pub fn from_public_key(public_key: &[u8; 32]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"danode-operator-v1:");
        hasher.update(public_key);
        Self(*hasher.finalize().as_bytes())
    }

    /// Create a random `OperatorId` for tests and local networks.
    pub fn ephemeral() -> Self {
        let mut bytes = [0u8; 32];
        rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
        Self::from_public_key(&bytes)
    }

    /// Create from a raw 32-byte id. Use `from_public_key()` for production code.
    pub const fn from_raw(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// The raw 32-byte id.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Full hex-encoded string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short identifier (first 8 hex characters).
    pub fn short_id(&self) -> String {
        format!("op:{}", hex::encode(&self.0[..4]))
    }

    /// Parse from a hex string (64 hex characters).
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(TypeError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for OperatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OperatorId({})", self.short_id())
    }
}

impl fmt::Display for OperatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Stake and index of one operator within one quorum.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorInfo {
    pub stake: u64,
    pub index: u32,
}

/// Snapshot of operator stakes at a reference block.
///
/// Fetched once per batch. When requested "by operator" the snapshot only
/// covers the quorums that operator is registered in.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorState {
    pub block_number: u64,
    pub operators: BTreeMap<QuorumId, BTreeMap<OperatorId, OperatorInfo>>,
    pub totals: BTreeMap<QuorumId, u64>,
}

impl OperatorState {
    /// Empty state at the given block.
    pub fn new(block_number: u64) -> Self {
        Self {
            block_number,
            ..Default::default()
        }
    }

    /// Register `operator` in `quorum` with the given stake.
    ///
    /// Indices are assigned in registration order within the quorum.
    pub fn insert(&mut self, quorum: QuorumId, operator: OperatorId, stake: u64) {
        let members = self.operators.entry(quorum).or_default();
        let index = members.len() as u32;
        let previous = members.insert(operator, OperatorInfo { stake, index });
        let total = self.totals.entry(quorum).or_default();
        if let Some(prev) = previous {
            *total -= prev.stake;
            members.insert(
                operator,
                OperatorInfo {
                    stake,
                    index: prev.index,
                },
            );
        }
        *total += stake;
    }

    /// Stake info of `operator` in `quorum`, if registered.
    pub fn operator_info(&self, quorum: QuorumId, operator: &OperatorId) -> Option<&OperatorInfo> {
        self.operators.get(&quorum)?.get(operator)
    }

    /// Returns `true` if `operator` holds stake in `quorum`.
    pub fn is_member(&self, quorum: QuorumId, operator: &OperatorId) -> bool {
        self.operator_info(quorum, operator)
            .is_some_and(|info| info.stake > 0)
    }

    /// Total stake registered in `quorum`.
    pub fn total_stake(&self, quorum: QuorumId) -> u64 {
        self.totals.get(&quorum).copied().unwrap_or(0)
    }

    /// Restrict the snapshot to the quorums `operator` belongs to.
    pub fn for_operator(&self, operator: &OperatorId) -> Self {
        let operators: BTreeMap<_, _> = self
            .operators
            .iter()
            .filter(|(_, members)| members.contains_key(operator))
            .map(|(q, members)| (*q, members.clone()))
            .collect();
        let totals = self
            .totals
            .iter()
            .filter(|(q, _)| operators.contains_key(q))
            .map(|(q, t)| (*q, *t))
            .collect();
        Self {
            block_number: self.block_number,
            operators,
            totals,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_is_deterministic() {
        let id1 = OperatorId::from_public_key(&[42u8; 32]);
        let id2 = OperatorId::from_public_key(&[42u8; 32]);
        assert_eq!(id1, id2);
    }

    #[test]
    fn different_keys_different_ids() {
        let id1 = OperatorId::from_public_key(&[1u8; 32]);
        let id2 = OperatorId::from_public_key(&[2u8; 32]);
        assert_ne!(id1, id2);
    }

    #[test]
    fn operator_id_hex_roundtrip() {
        let id = OperatorId::ephemeral();
        assert_eq!(OperatorId::from_hex(&id.to_hex()).unwrap(), id);
        assert!(id.short_id().starts_with("op:"));
    }

    #[test]
    fn state_membership_and_totals() {
        let a = OperatorId::from_raw([1; 32]);
        let b = OperatorId::from_raw([2; 32]);
        let mut state = OperatorState::new(100);
        state.insert(QuorumId(0), a, 10);
        state.insert(QuorumId(0), b, 30);
        state.insert(QuorumId(1), b, 5);

        assert!(state.is_member(QuorumId(0), &a));
        assert!(!state.is_member(QuorumId(1), &a));
        assert_eq!(state.total_stake(QuorumId(0)), 40);
        assert_eq!(state.operator_info(QuorumId(0), &b).unwrap().index, 1);
    }

    #[test]
    fn reinserting_replaces_stake() {
        let a = OperatorId::from_raw([1; 32]);
        let mut state = OperatorState::new(1);
        state.insert(QuorumId(0), a, 10);
        state.insert(QuorumId(0), a, 25);
        assert_eq!(state.total_stake(QuorumId(0)), 25);
        assert_eq!(state.operator_info(QuorumId(0), &a).unwrap().index, 0);
    }

    #[test]
    fn zero_stake_is_not_membership() {
        let a = OperatorId::from_raw([1; 32]);
        let mut state = OperatorState::new(1);
        state.insert(QuorumId(0), a, 0);
        assert!(!state.is_member(QuorumId(0), &a));
    }

    #[test]
    fn for_operator_filters_quorums() {
        let a = OperatorId::from_raw([1; 32]);
        let b = OperatorId::from_raw([2; 32]);
        let mut state = OperatorState::new(7);
        state.insert(QuorumId(0), a, 10);
        state.insert(QuorumId(1), b, 10);

        let scoped = state.for_operator(&a);
        assert_eq!(scoped.block_number, 7);
        assert!(scoped.operators.contains_key(&QuorumId(0)));
        assert!(!scoped.operators.contains_key(&QuorumId(1)));
        assert_eq!(scoped.total_stake(QuorumId(1)), 0);
    }
}
