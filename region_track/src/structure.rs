//! 数据结构模块
//!
//! 定义了区域引擎使用的核心数据结构，包括区域（Region）、音轨（Track）以及
//! 以脉冲（ppqn）为单位的音乐时间。

use crate::collection::RegionCollection;
use crate::utils::format_pulses;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// 音乐时间单位（脉冲）。所有位置与长度运算均使用整数。
pub type Ppqn = i64;

/// 脉冲常量，与四分音符 960 脉冲的分辨率一致
pub mod ppqn {
    use super::Ppqn;

    pub const QUARTER: Ppqn = 960;
    pub const BAR: Ppqn = QUARTER * 4;
    pub const SEMI_QUAVER: Ppqn = QUARTER / 4;

    /// 将拍号分数（如 1/16）转换为脉冲
    pub const fn from_signature(nominator: Ppqn, denominator: Ppqn) -> Ppqn {
        BAR / denominator * nominator
    }
}

static TRACK_ID_COUNTER: AtomicU64 = AtomicU64::new(1);
static REGION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);
static CONTENT_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrackId(pub u64);

impl TrackId {
    pub fn next() -> Self {
        TrackId(TRACK_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// 区域标识。被删除的区域标识不会被复用。
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RegionId(pub u64);

impl RegionId {
    pub fn next() -> Self {
        RegionId(REGION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// 事件内容（音符集合、音频文件、自动化数值集合）的引用。
/// 多个区域引用同一内容时即为“镜像”区域。
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContentId(pub u64);

impl ContentId {
    pub fn next() -> Self {
        ContentId(CONTENT_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegionKind {
    Note,
    Audio,
    Value,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackKind {
    Notes,
    Audio,
    Value,
}

impl TrackKind {
    pub fn accepts(&self, kind: RegionKind) -> bool {
        matches!(
            (self, kind),
            (TrackKind::Notes, RegionKind::Note)
                | (TrackKind::Audio, RegionKind::Audio)
                | (TrackKind::Value, RegionKind::Value)
        )
    }

    /// 该音轨上新建区域所使用的内容类型
    pub fn new_content(&self) -> RegionContent {
        let id = ContentId::next();
        match self {
            TrackKind::Notes => RegionContent::Notes { events: id },
            TrackKind::Audio => RegionContent::Audio { file: id },
            TrackKind::Value => RegionContent::Values { events: id },
        }
    }
}

/// 区域内容。引擎只通过本类型的方法访问类型相关的逻辑。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegionContent {
    Notes { events: ContentId },
    Audio { file: ContentId },
    Values { events: ContentId },
}

impl RegionContent {
    pub fn kind(&self) -> RegionKind {
        match self {
            RegionContent::Notes { .. } => RegionKind::Note,
            RegionContent::Audio { .. } => RegionKind::Audio,
            RegionContent::Values { .. } => RegionKind::Value,
        }
    }

    pub fn content_id(&self) -> ContentId {
        match *self {
            RegionContent::Notes { events } => events,
            RegionContent::Audio { file } => file,
            RegionContent::Values { events } => events,
        }
    }

    /// 音频区域共享文件，但从不视为镜像
    pub fn can_mirror(&self) -> bool {
        match self {
            RegionContent::Notes { .. } | RegionContent::Values { .. } => true,
            RegionContent::Audio { .. } => false,
        }
    }

    /// 所有区域类型都带有循环参数
    pub fn is_loopable(&self) -> bool {
        match self {
            RegionContent::Notes { .. } | RegionContent::Audio { .. } | RegionContent::Values { .. } => true,
        }
    }

    /// 复制事件内容，返回引用新内容的副本（音频文件保持共享）
    pub(crate) fn consolidated(&self) -> Self {
        match self {
            RegionContent::Notes { .. } => RegionContent::Notes { events: ContentId::next() },
            RegionContent::Audio { file } => RegionContent::Audio { file: *file },
            RegionContent::Values { .. } => RegionContent::Values { events: ContentId::next() },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub id: RegionId,
    pub track_id: TrackId,
    pub position: Ppqn,
    pub duration: Ppqn,
    pub loop_offset: Ppqn,
    pub loop_duration: Ppqn,
    pub mute: bool,
    pub hue: u16,
    pub label: String,
    pub content: RegionContent,
    pub selected: bool,
    // 由 Arrangement 维护：内容被多个区域引用时为 true
    #[serde(default)]
    pub(crate) mirrored: bool,
}

impl Region {
    pub fn new(track_id: TrackId, content: RegionContent, position: Ppqn, duration: Ppqn, label: String) -> Self {
        let hue = match content.kind() {
            RegionKind::Note => 120,
            RegionKind::Audio => 200,
            RegionKind::Value => 30,
        };
        Self {
            id: RegionId::next(),
            track_id,
            position,
            duration,
            loop_offset: 0,
            loop_duration: duration,
            mute: false,
            hue,
            label,
            content,
            selected: false,
            mirrored: false,
        }
    }

    pub fn new_note(track_id: TrackId, position: Ppqn, duration: Ppqn, label: String) -> Self {
        Self::new(track_id, RegionContent::Notes { events: ContentId::next() }, position, duration, label)
    }

    pub fn new_audio(track_id: TrackId, position: Ppqn, duration: Ppqn, label: String) -> Self {
        Self::new(track_id, RegionContent::Audio { file: ContentId::next() }, position, duration, label)
    }

    pub fn new_value(track_id: TrackId, position: Ppqn, duration: Ppqn, label: String) -> Self {
        Self::new(track_id, RegionContent::Values { events: ContentId::next() }, position, duration, label)
    }

    pub fn with_loop(mut self, loop_offset: Ppqn, loop_duration: Ppqn) -> Self {
        self.loop_offset = loop_offset;
        self.loop_duration = loop_duration;
        self
    }

    pub fn complete(&self) -> Ppqn {
        self.position + self.duration
    }

    /// 循环内容第一次开始的位置
    pub fn offset(&self) -> Ppqn {
        self.position - self.loop_offset
    }

    pub fn kind(&self) -> RegionKind {
        self.content.kind()
    }

    pub fn can_mirror(&self) -> bool {
        self.content.can_mirror()
    }

    pub fn is_mirrored(&self) -> bool {
        self.mirrored
    }

    pub fn is_loopable(&self) -> bool {
        self.content.is_loopable()
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{{:?}Region #{} p: {}, c: {}}}",
            self.kind(),
            self.id.0,
            format_pulses(self.position),
            format_pulses(self.complete())
        )
    }
}

/// 保持循环相位：起点移动 delta 后新的循环偏移
pub fn fold_loop_offset(loop_offset: Ppqn, delta: Ppqn, loop_duration: Ppqn) -> Ppqn {
    (loop_offset + delta).rem_euclid(loop_duration)
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub name: String,
    pub kind: TrackKind,
    pub height: f32, // 轨道高度（像素）
    pub regions: RegionCollection,
}

impl Track {
    pub fn new(name: String, kind: TrackKind) -> Self {
        Self {
            id: TrackId::next(),
            name,
            kind,
            height: 80.0,
            regions: RegionCollection::new(),
        }
    }

    pub fn with_height(mut self, height: f32) -> Self {
        self.height = height;
        self
    }

    /// 内容类型兼容性检查
    pub fn accepts(&self, region: &Region) -> bool {
        self.kind.accepts(region.kind())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loop_offset_folds_into_loop_duration() {
        assert_eq!(fold_loop_offset(5, 7, 16), 12);
        assert_eq!(fold_loop_offset(12, 10, 16), 6);
        assert_eq!(fold_loop_offset(2, -5, 16), 13);
    }

    #[test]
    fn signatures_resolve_to_pulses() {
        assert_eq!(ppqn::from_signature(1, 1), ppqn::BAR);
        assert_eq!(ppqn::from_signature(1, 4), ppqn::QUARTER);
        assert_eq!(ppqn::from_signature(1, 16), ppqn::SEMI_QUAVER);
        assert_eq!(ppqn::from_signature(3, 8), 1440);
    }

    #[test]
    fn track_kinds_accept_only_matching_regions() {
        let notes = Track::new("Notes".to_string(), TrackKind::Notes);
        let audio = Track::new("Audio".to_string(), TrackKind::Audio);
        let region = Region::new_note(notes.id, 0, 100, String::new());
        assert!(notes.accepts(&region));
        assert!(!audio.accepts(&region));
    }

    #[test]
    fn audio_content_never_mirrors() {
        let region = Region::new_audio(TrackId(1), 0, 10, String::new());
        assert!(!region.can_mirror());
        let consolidated = region.content.consolidated();
        assert_eq!(consolidated.content_id(), region.content.content_id());
    }
}
