//! Static RelationshipChecker for development and testing.
//!
//! Matches are registered up front. A production deployment points the
//! port at the match service instead.
//!
//! # Usage
//!
//! ```ignore
//! let checker = StaticRelationshipChecker::new()
//!     .with_match(&alice, &bob, RoomId::new("room-ab")?);
//!
//! // Local development: everyone is matched with everyone
//! let checker = StaticRelationshipChecker::permissive();
//! ```

use std::collections::HashMap;

use async_trait::async_trait;

use crate::domain::foundation::{RoomId, UserId};
use crate::domain::quota::PairKey;
use crate::ports::{RelationshipChecker, RelationshipError};

/// RelationshipChecker backed by a fixed table of matches.
#[derive(Debug, Clone, Default)]
pub struct StaticRelationshipChecker {
    matches: HashMap<PairKey, RoomId>,
    /// Every pair is matched and every room is open.
    permissive: bool,
    /// Simulate an outage of the relationship service.
    unavailable: bool,
}

impl StaticRelationshipChecker {
    /// Creates a checker with no matches.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a checker that authorizes everything. Each pair talks in
    /// room `dm:{low}:{high}`.
    pub fn permissive() -> Self {
        Self {
            permissive: true,
            ..Self::default()
        }
    }

    /// Creates a checker whose every call fails.
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    /// Registers a match. A user cannot be matched with themselves; such
    /// entries are ignored.
    pub fn with_match(mut self, a: &UserId, b: &UserId, room_id: RoomId) -> Self {
        if let Ok(pair) = PairKey::new(a, b) {
            self.matches.insert(pair, room_id);
        }
        self
    }

    fn check_available(&self) -> Result<(), RelationshipError> {
        if self.unavailable {
            Err(RelationshipError::Unavailable(
                "simulated outage".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RelationshipChecker for StaticRelationshipChecker {
    async fn is_room_participant(
        &self,
        user_id: &UserId,
        room_id: &RoomId,
    ) -> Result<bool, RelationshipError> {
        self.check_available()?;
        if self.permissive {
            return Ok(true);
        }
        Ok(self
            .matches
            .iter()
            .any(|(pair, room)| room == room_id && pair.contains(user_id)))
    }

    async fn conversation_room(
        &self,
        a: &UserId,
        b: &UserId,
    ) -> Result<Option<RoomId>, RelationshipError> {
        self.check_available()?;
        let Ok(pair) = PairKey::new(a, b) else {
            return Ok(None);
        };
        if let Some(room) = self.matches.get(&pair) {
            return Ok(Some(room.clone()));
        }
        if self.permissive {
            return Ok(RoomId::new(format!("dm:{}", pair)).ok());
        }
        Ok(None)
    }
}
