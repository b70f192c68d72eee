//! 区域命中检测模块
//!
//! 根据指针位置判断按下的是音轨空白处，还是区域的某个敏感部位（主体、左右边缘、循环末尾）。

use crate::arrangement::Arrangement;
use crate::structure::RegionId;
use crate::timeline::TimelineState;
use egui::Pos2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegionPart {
    Position,
    Start,
    Complete,
    ContentResize,
    LoopDuration,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureTarget {
    Track { index: usize },
    Region { part: RegionPart, region: RegionId, track_index: usize },
}

/// 音轨的纵向布局（像素），由各音轨高度累加得到
#[derive(Clone, Debug, PartialEq)]
pub struct TrackLayout {
    tops: Vec<f32>,
    heights: Vec<f32>,
    bottom: f32,
}

impl TrackLayout {
    pub fn new(arrangement: &Arrangement) -> Self {
        let mut tops = Vec::with_capacity(arrangement.num_tracks());
        let mut heights = Vec::with_capacity(arrangement.num_tracks());
        let mut y = 0.0;
        for track in arrangement.tracks() {
            tops.push(y);
            heights.push(track.height);
            y += track.height;
        }
        Self {
            tops,
            heights,
            bottom: y,
        }
    }

    pub fn top(&self, index: usize) -> Option<f32> {
        self.tops.get(index).copied()
    }

    pub fn height(&self, index: usize) -> Option<f32> {
        self.heights.get(index).copied()
    }

    pub fn bottom(&self) -> f32 {
        self.bottom
    }

    /// 内容坐标 y 处的音轨；超出所有音轨时返回 None
    pub fn index_at(&self, y: f32) -> Option<usize> {
        if y < 0.0 || y >= self.bottom {
            return None;
        }
        self.tops.partition_point(|&top| top <= y).checked_sub(1)
    }

    /// 与 `index_at` 相同，但把越界的位置截断到 `[0, 音轨数量]`
    pub fn local_to_index(&self, y: f32) -> usize {
        if y > self.bottom {
            return self.tops.len();
        }
        self.tops.partition_point(|&top| top <= y).saturating_sub(1)
    }
}

/// 命中检测。`pointer.y` 为音轨区视口坐标，内部加上纵向滚动。
pub fn capture(arrangement: &Arrangement, timeline: &TimelineState, pointer: Pos2, radius: f32) -> Option<CaptureTarget> {
    let layout = TrackLayout::new(arrangement);
    let y = pointer.y + timeline.scroll_y;
    let index = layout.index_at(y)?;
    let track = arrangement.track_at(index)?;
    let position = timeline.x_to_unit(pointer.x).floor() as i64;
    let region = match track.regions.lower_equal(position, |_| true) {
        Some(region) if position < region.complete() => region,
        _ => return Some(CaptureTarget::Track { index }),
    };
    let hit = |part| {
        Some(CaptureTarget::Region {
            part,
            region: region.id,
            track_index: index,
        })
    };
    let x = pointer.x;
    let x0 = timeline.unit_to_x(region.position);
    let x1 = timeline.unit_to_x(region.complete());
    if x1 - x0 <= radius * 4.0 {
        // 太窄，没有其他敏感区
        return hit(RegionPart::Position);
    }
    if region.is_loopable() {
        if x - x0 < radius * 2.0 {
            return hit(RegionPart::Start);
        }
        let bottom = layout.top(index).unwrap_or(0.0) + track.height;
        let bottom_edge = y > bottom - radius;
        if x1 - x < radius * 2.0 {
            return if bottom_edge {
                hit(RegionPart::ContentResize)
            } else {
                hit(RegionPart::Complete)
            };
        }
        let loop_end = timeline.unit_to_x(region.offset() + region.loop_duration);
        if bottom_edge && (x - loop_end).abs() <= radius {
            return hit(RegionPart::LoopDuration);
        }
    }
    hit(RegionPart::Position)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::{Region, Track, TrackKind};

    // 100 px/quarter, tracks 80 px high
    fn fixture() -> (Arrangement, RegionId) {
        let mut arrangement = Arrangement::new();
        let track = arrangement.add_track(Track::new("Notes".to_string(), TrackKind::Notes));
        arrangement.add_track(Track::new("Audio".to_string(), TrackKind::Audio).with_height(40.0));
        let region = arrangement
            .add_region(Region::new_note(track, 960, 3840, String::new()).with_loop(0, 1920))
            .unwrap();
        (arrangement, region)
    }

    fn part(target: Option<CaptureTarget>) -> Option<RegionPart> {
        match target? {
            CaptureTarget::Region { part, .. } => Some(part),
            CaptureTarget::Track { .. } => None,
        }
    }

    #[test]
    fn captures_region_parts() {
        let (arrangement, _) = fixture();
        let timeline = TimelineState::default();
        let at = |x: f32, y: f32| part(capture(&arrangement, &timeline, Pos2::new(x, y), 4.0));
        assert_eq!(at(102.0, 10.0), Some(RegionPart::Start));
        assert_eq!(at(250.0, 10.0), Some(RegionPart::Position));
        assert_eq!(at(495.0, 10.0), Some(RegionPart::Complete));
        assert_eq!(at(495.0, 78.0), Some(RegionPart::ContentResize));
        // 循环第一次结束于 960 + 1920 = 2880，即 x = 300
        assert_eq!(at(302.0, 78.0), Some(RegionPart::LoopDuration));
        assert_eq!(at(302.0, 10.0), Some(RegionPart::Position));
    }

    #[test]
    fn captures_tracks_outside_regions() {
        let (arrangement, _) = fixture();
        let timeline = TimelineState::default();
        assert_eq!(
            capture(&arrangement, &timeline, Pos2::new(50.0, 10.0), 4.0),
            Some(CaptureTarget::Track { index: 0 })
        );
        assert_eq!(
            capture(&arrangement, &timeline, Pos2::new(50.0, 100.0), 4.0),
            Some(CaptureTarget::Track { index: 1 })
        );
        assert_eq!(capture(&arrangement, &timeline, Pos2::new(50.0, 130.0), 4.0), None);
    }

    #[test]
    fn narrow_regions_only_expose_position() {
        let (arrangement, _) = fixture();
        let timeline = TimelineState {
            zoom_x: 1.0,
            ..TimelineState::default()
        };
        assert_eq!(
            part(capture(&arrangement, &timeline, Pos2::new(1.5, 10.0), 4.0)),
            Some(RegionPart::Position)
        );
    }

    #[test]
    fn layout_maps_y_to_index() {
        let (arrangement, _) = fixture();
        let layout = TrackLayout::new(&arrangement);
        assert_eq!(layout.bottom(), 120.0);
        assert_eq!(layout.local_to_index(-5.0), 0);
        assert_eq!(layout.local_to_index(79.0), 0);
        assert_eq!(layout.local_to_index(80.0), 1);
        assert_eq!(layout.local_to_index(500.0), 2);
        assert_eq!(layout.index_at(500.0), None);
    }
}
