use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::game::constants::replication::BATCH_SIZE;
use crate::game::profile::{ExplosionId, ProfileId};
use crate::game::projectile::WireId;
use crate::game::registry::EntityId;

/// Messages from the authority to observers.
///
/// All one-way; no acknowledgement. Losing a position batch is harmless
/// (the next one overwrites it), a lost terminate is covered by the
/// observer's local lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReplicationMessage {
    /// A projectile was fired
    Spawn(SpawnNotice),
    /// Latest positions for up to [`BATCH_SIZE`] projectiles
    PositionBatch { entries: Vec<PositionEntry> },
    /// A projectile ended; duplicates are no-ops on the receiver
    Terminate { id: WireId },
    /// Play an explosion effect (visual/audio only)
    Explosion {
        explosion: ExplosionId,
        position: Vec3,
        rotation: Quat,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpawnNotice {
    pub id: WireId,
    pub profile: ProfileId,
    pub owner: EntityId,
    /// Simulated origin
    pub position: Vec3,
    /// Where observers draw the projectile first (the muzzle)
    pub visual_position: Vec3,
    pub direction: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionEntry {
    pub id: WireId,
    pub position: Vec3,
}

impl ReplicationMessage {
    /// Position batch from `(id, position)` pairs. Callers chunk to
    /// [`BATCH_SIZE`] first.
    pub fn position_batch(pairs: &[(WireId, Vec3)]) -> Self {
        debug_assert!(pairs.len() <= BATCH_SIZE, "position batch over {}", BATCH_SIZE);
        Self::PositionBatch {
            entries: pairs
                .iter()
                .map(|&(id, position)| PositionEntry { id, position })
                .collect(),
        }
    }

    /// Short name for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Spawn(_) => "spawn",
            Self::PositionBatch { .. } => "position_batch",
            Self::Terminate { .. } => "terminate",
            Self::Explosion { .. } => "explosion",
        }
    }
}

/// Encode a message using bincode
/// Uses legacy config for fixed-size integers (stable layout for non-Rust observers)
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, EncodeError> {
    bincode::serde::encode_to_vec(message, bincode::config::legacy())
        .map_err(|e| EncodeError(e.to_string()))
}

/// Decode a message using bincode
pub fn decode<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, DecodeError> {
    bincode::serde::decode_from_slice(data, bincode::config::legacy())
        .map(|(msg, _)| msg)
        .map_err(|e| DecodeError(e.to_string()))
}

#[derive(Debug, thiserror::Error)]
#[error("Encode error: {0}")]
pub struct EncodeError(String);

#[derive(Debug, thiserror::Error)]
#[error("Decode error: {0}")]
pub struct DecodeError(String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_message() {
        let msg = ReplicationMessage::Spawn(SpawnNotice {
            id: 42,
            profile: ProfileId(1),
            owner: 7,
            position: Vec3::new(1.0, 2.0, 3.0),
            visual_position: Vec3::new(1.1, 2.0, 3.0),
            direction: Vec3::Z,
        });
        let encoded = encode(&msg).unwrap();
        let decoded: ReplicationMessage = decode(&encoded).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_full_batch_fits_one_frame() {
        let pairs: Vec<_> = (0..BATCH_SIZE as u16)
            .map(|i| (i, Vec3::splat(i as f32)))
            .collect();
        let msg = ReplicationMessage::position_batch(&pairs);
        let encoded = encode(&msg).unwrap();

        // tag + length + 64 * (u16 + 3 * f32)
        assert_eq!(encoded.len(), 4 + 8 + BATCH_SIZE * 14);
        assert!(encoded.len() < crate::game::constants::net::MAX_MESSAGE_SIZE);

        match decode::<ReplicationMessage>(&encoded).unwrap() {
            ReplicationMessage::PositionBatch { entries } => {
                assert_eq!(entries.len(), BATCH_SIZE);
                assert_eq!(entries[63].id, 63);
                assert_eq!(entries[63].position, Vec3::splat(63.0));
            }
            other => panic!("Wrong message type: {}", other.kind()),
        }
    }

    #[test]
    fn test_terminate_is_small() {
        let encoded = encode(&ReplicationMessage::Terminate { id: 9 }).unwrap();
        assert_eq!(encoded.len(), 4 + 2);
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(decode::<ReplicationMessage>(&[0xff, 0xff, 0xff, 0xff, 1]).is_err());
    }
}
