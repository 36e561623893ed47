//! Tag Engine
//!
//! Converts reasons to recompute a data-block into dirty operations and
//! propagates the dirtiness along relations.
//!
//! # Overview
//!
//! A tag request names a data-block, a set of [`RecalcFlags`] and an
//! [`UpdateSource`]. Each flag seeds one or more operations (see
//! [`seed_operations`]); the seeds are then flushed breadth-first along
//! outgoing relations:
//!
//! - `NO_FLUSH` and `FLUSH_BLOCKED` relations are never crossed
//! - `FLUSH_USER_EDIT_ONLY` relations are crossed for user edits only
//! - an operation already tagged is not visited twice
//!
//! Every tagged operation ORs the recalc bit of its component into the
//! owning id node, so the evaluator can tell what changed.

mod flush;

pub use flush::{flush, seed_operations, tag_id, tag_operation, tag_operations, tag_time_source};

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Reasons a data-block needs to be re-evaluated.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct RecalcFlags: u32 {
        const TRANSFORM = 1 << 0;
        const GEOMETRY = 1 << 1;
        const ANIMATION = 1 << 2;
        const COPY_ON_EVAL = 1 << 3;
        /// Visibility or selection of the object's base changed.
        const BASE_FLAGS = 1 << 4;
        /// Collections or objects were added to or removed from the scene.
        const HIERARCHY = 1 << 5;
        /// The relations of the graph are out of date.
        const RELATIONS = 1 << 6;
        const SHADING = 1 << 7;
        const PARAMETERS = 1 << 8;
        const POINT_CACHE = 1 << 9;
        const SEQUENCER = 1 << 10;
        const AUDIO = 1 << 11;

        const ALL = Self::TRANSFORM.bits()
            | Self::GEOMETRY.bits()
            | Self::ANIMATION.bits()
            | Self::COPY_ON_EVAL.bits()
            | Self::BASE_FLAGS.bits()
            | Self::HIERARCHY.bits()
            | Self::RELATIONS.bits()
            | Self::SHADING.bits()
            | Self::PARAMETERS.bits()
            | Self::POINT_CACHE.bits()
            | Self::SEQUENCER.bits()
            | Self::AUDIO.bits();
    }
}

/// Where a tag request comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpdateSource {
    /// An interactive edit.
    UserEdit,
    /// Re-applied after the relations were rebuilt.
    Relations,
    /// The current frame changed.
    Time,
    /// Preparation of a render.
    Render,
}

impl UpdateSource {
    pub fn is_user_edit(&self) -> bool {
        matches!(self, UpdateSource::UserEdit)
    }
}
