//! 错误类型模块
//!
//! `EditError` 是可恢复的用户输入错误；`InvariantViolation` 表示调用方的程序错误，
//! 只用于诊断，随后立即 panic。

use crate::structure::{Ppqn, RegionId, RegionKind, TrackId, TrackKind};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    #[error("Cannot move region to different track type.")]
    TrackKindMismatch {
        region: RegionId,
        region_kind: RegionKind,
        track: TrackId,
        track_kind: TrackKind,
    },
    #[error("region modifier `{active}` is already in use")]
    ModifierInUse { active: &'static str },
    #[error("no region modifier is active")]
    NoActiveModifier,
    #[error("selection holds no region eligible for `{modifier}`")]
    EmptySelection { modifier: &'static str },
    #[error("unknown track {0:?}")]
    UnknownTrack(TrackId),
    #[error("unknown track index {0}")]
    UnknownTrackIndex(usize),
    #[error("unknown region {0:?}")]
    UnknownRegion(RegionId),
    #[error("duration({0}) must be positive")]
    InvalidDuration(Ppqn),
    #[error("nothing to {0}")]
    EmptyHistory(&'static str),
}

impl EditError {
    /// 需要以提示框告知用户的错误
    pub fn is_user_facing(&self) -> bool {
        matches!(self, EditError::TrackKindMismatch { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason} (track: {track_kind:?}, regions: {dump})")]
pub struct InvariantViolation {
    pub track: TrackId,
    pub track_kind: TrackKind,
    pub reason: String,
    /// JSON 形式的区域列表 `[{"p":..,"d":..}]`
    pub dump: String,
}
