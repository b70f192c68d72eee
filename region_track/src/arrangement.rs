//! 编排模块
//!
//! `Arrangement` 持有按列表索引排列的音轨及其区域，是区域的唯一所有者。
//! 所有结构性修改（添加、删除、复制、合并）都经由这里，以便维护镜像标记。

use crate::error::EditError;
use crate::structure::{fold_loop_offset, ContentId, Ppqn, Region, RegionId, Track, TrackId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `copy_to` 的可选覆盖参数，未给出的字段沿用原区域
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CopyParams {
    pub track: Option<TrackId>,
    pub position: Option<Ppqn>,
    pub duration: Option<Ppqn>,
    pub loop_offset: Option<Ppqn>,
    pub loop_duration: Option<Ppqn>,
    pub consolidate: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Arrangement {
    tracks: Vec<Track>,
}

impl Arrangement {
    pub fn new() -> Self {
        Self { tracks: Vec::new() }
    }

    pub fn add_track(&mut self, track: Track) -> TrackId {
        let id = track.id;
        self.tracks.push(track);
        self.refresh_mirrors();
        id
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn num_tracks(&self) -> usize {
        self.tracks.len()
    }

    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }

    pub fn track_at(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub fn track_index(&self, id: TrackId) -> Option<usize> {
        self.tracks.iter().position(|t| t.id == id)
    }

    fn track_mut(&mut self, id: TrackId) -> Option<&mut Track> {
        self.tracks.iter_mut().find(|t| t.id == id)
    }

    pub fn region(&self, id: RegionId) -> Option<&Region> {
        self.tracks.iter().find_map(|t| t.regions.get(id))
    }

    /// 区域所在音轨的列表索引
    pub fn region_track_index(&self, id: RegionId) -> Option<usize> {
        self.tracks.iter().position(|t| t.regions.contains(id))
    }

    pub fn regions(&self) -> impl Iterator<Item = &Region> + '_ {
        self.tracks.iter().flat_map(|t| t.regions.iter())
    }

    /// Adds a region to the track named by `region.track_id`. Overlaps are not checked here.
    pub fn add_region(&mut self, region: Region) -> Result<RegionId, EditError> {
        let track = self
            .track_mut(region.track_id)
            .ok_or(EditError::UnknownTrack(region.track_id))?;
        if !track.accepts(&region) {
            return Err(EditError::TrackKindMismatch {
                region: region.id,
                region_kind: region.kind(),
                track: track.id,
                track_kind: track.kind,
            });
        }
        if region.duration <= 0 {
            return Err(EditError::InvalidDuration(region.duration));
        }
        if region.loop_duration <= 0 {
            return Err(EditError::InvalidDuration(region.loop_duration));
        }
        let id = region.id;
        track.regions.add(region);
        self.refresh_mirrors();
        Ok(id)
    }

    pub fn delete_region(&mut self, id: RegionId) -> Option<Region> {
        let removed = self.tracks.iter_mut().find_map(|t| t.regions.remove(id));
        if removed.is_some() {
            self.refresh_mirrors();
        }
        removed
    }

    pub fn modify_region<F>(&mut self, id: RegionId, f: F) -> bool
    where
        F: FnOnce(&mut Region),
    {
        match self.tracks.iter_mut().find(|t| t.regions.contains(id)) {
            Some(track) => track.regions.modify(id, f),
            None => false,
        }
    }

    /// 将区域重新挂到另一条音轨上
    pub fn move_to_track(&mut self, id: RegionId, target: TrackId) -> Result<(), EditError> {
        let target_track = self.track(target).ok_or(EditError::UnknownTrack(target))?;
        let region = self.region(id).ok_or(EditError::UnknownRegion(id))?;
        if !target_track.accepts(region) {
            return Err(EditError::TrackKindMismatch {
                region: id,
                region_kind: region.kind(),
                track: target,
                track_kind: target_track.kind,
            });
        }
        if region.track_id == target {
            return Ok(());
        }
        let mut region = self
            .tracks
            .iter_mut()
            .find_map(|t| t.regions.remove(id))
            .ok_or(EditError::UnknownRegion(id))?;
        region.track_id = target;
        self.track_mut(target)
            .ok_or(EditError::UnknownTrack(target))?
            .regions
            .add(region);
        Ok(())
    }

    /// 复制区域。`consolidate` 为 false 时副本与原区域共享内容（镜像）。
    pub fn copy_to(&mut self, id: RegionId, params: CopyParams) -> Result<RegionId, EditError> {
        let original = self.region(id).ok_or(EditError::UnknownRegion(id))?;
        let content = if params.consolidate {
            original.content.consolidated()
        } else {
            original.content
        };
        let copy = Region {
            id: RegionId::next(),
            track_id: params.track.unwrap_or(original.track_id),
            position: params.position.unwrap_or(original.position),
            duration: params.duration.unwrap_or(original.duration),
            loop_offset: params.loop_offset.unwrap_or(original.loop_offset),
            loop_duration: params.loop_duration.unwrap_or(original.loop_duration),
            mute: original.mute,
            hue: original.hue,
            label: original.label.clone(),
            content,
            selected: false,
            mirrored: false,
        };
        self.add_region(copy)
    }

    /// 解除镜像：为区域分配独立的内容副本
    pub fn consolidate(&mut self, id: RegionId) -> bool {
        let Some(region) = self.region(id) else {
            return false;
        };
        if !region.is_mirrored() {
            return false;
        }
        let content = region.content.consolidated();
        self.modify_region(id, |r| r.content = content);
        self.refresh_mirrors();
        true
    }

    /// 裁剪原语：区域保留 `[position, begin)`，新副本占据 `[end, complete)`。
    /// 返回尾部副本的标识。
    pub fn clip(&mut self, id: RegionId, begin: Ppqn, end: Ppqn) -> Option<RegionId> {
        let region = self.region(id)?;
        if !(region.position < begin && begin <= end && end < region.complete()) {
            return None;
        }
        let shift = end - region.position;
        let params = CopyParams {
            position: Some(end),
            duration: Some(region.complete() - end),
            loop_offset: Some(fold_loop_offset(region.loop_offset, shift, region.loop_duration)),
            ..CopyParams::default()
        };
        let position = region.position;
        let tail = self.copy_to(id, params).ok()?;
        self.modify_region(id, |r| r.duration = begin - position);
        Some(tail)
    }

    /// 在 `at` 处一分为二
    pub fn split(&mut self, id: RegionId, at: Ppqn) -> Option<RegionId> {
        self.clip(id, at, at)
    }

    pub fn set_selected(&mut self, id: RegionId, selected: bool) -> bool {
        self.modify_region(id, |r| r.selected = selected)
    }

    pub fn deselect_all(&mut self) {
        for track in &mut self.tracks {
            track.regions.for_each_mut(|r| r.selected = false);
        }
    }

    pub fn select_all(&mut self) {
        for track in &mut self.tracks {
            track.regions.for_each_mut(|r| r.selected = true);
        }
    }

    /// 已选区域，按音轨索引与位置排序
    pub fn selected(&self) -> Vec<&Region> {
        self.regions().filter(|r| r.selected).collect()
    }

    pub fn selected_ids(&self) -> Vec<RegionId> {
        self.regions().filter(|r| r.selected).map(|r| r.id).collect()
    }

    fn refresh_mirrors(&mut self) {
        let mut owners: BTreeMap<ContentId, usize> = BTreeMap::new();
        for region in self.regions().filter(|r| r.can_mirror()) {
            *owners.entry(region.content.content_id()).or_default() += 1;
        }
        for track in &mut self.tracks {
            track.regions.for_each_mut(|r| {
                let count = owners.get(&r.content.content_id()).copied().unwrap_or(0);
                r.mirrored = r.can_mirror() && count > 1;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::TrackKind;

    fn notes_arrangement() -> (Arrangement, TrackId) {
        let mut arrangement = Arrangement::new();
        let track = arrangement.add_track(Track::new("Notes".to_string(), TrackKind::Notes));
        (arrangement, track)
    }

    #[test]
    fn copies_share_content_until_consolidated() {
        let (mut arrangement, track) = notes_arrangement();
        let id = arrangement
            .add_region(Region::new_note(track, 0, 100, "A".to_string()))
            .unwrap();
        let copy = arrangement
            .copy_to(id, CopyParams { position: Some(200), ..CopyParams::default() })
            .unwrap();
        assert!(arrangement.region(id).unwrap().is_mirrored());
        assert!(arrangement.region(copy).unwrap().is_mirrored());

        assert!(arrangement.consolidate(copy));
        assert!(!arrangement.region(id).unwrap().is_mirrored());
        assert!(!arrangement.region(copy).unwrap().is_mirrored());
        assert!(!arrangement.consolidate(copy));
    }

    #[test]
    fn consolidated_copy_is_independent() {
        let (mut arrangement, track) = notes_arrangement();
        let id = arrangement
            .add_region(Region::new_note(track, 0, 100, "A".to_string()))
            .unwrap();
        let copy = arrangement
            .copy_to(id, CopyParams { position: Some(200), consolidate: true, ..CopyParams::default() })
            .unwrap();
        assert!(!arrangement.region(copy).unwrap().is_mirrored());
        assert_ne!(
            arrangement.region(copy).unwrap().content,
            arrangement.region(id).unwrap().content
        );
    }

    #[test]
    fn clip_keeps_head_and_creates_phase_correct_tail() {
        let (mut arrangement, track) = notes_arrangement();
        let id = arrangement
            .add_region(Region::new_note(track, 0, 100, String::new()).with_loop(5, 16))
            .unwrap();
        let tail = arrangement.clip(id, 40, 60).unwrap();
        let head = arrangement.region(id).unwrap();
        assert_eq!((head.position, head.complete()), (0, 40));
        let tail = arrangement.region(tail).unwrap();
        assert_eq!((tail.position, tail.complete()), (60, 100));
        assert_eq!(tail.loop_offset, (5 + 60) % 16);
        assert!(arrangement.clip(id, 0, 10).is_none());
    }

    #[test]
    fn move_to_track_rejects_foreign_kind() {
        let (mut arrangement, notes) = notes_arrangement();
        let audio = arrangement.add_track(Track::new("Audio".to_string(), TrackKind::Audio));
        let id = arrangement
            .add_region(Region::new_note(notes, 0, 100, String::new()))
            .unwrap();
        assert!(matches!(
            arrangement.move_to_track(id, audio),
            Err(EditError::TrackKindMismatch { .. })
        ));
        assert_eq!(arrangement.region(id).unwrap().track_id, notes);
    }

    #[test]
    fn add_region_rejects_non_positive_duration() {
        let (mut arrangement, track) = notes_arrangement();
        assert_eq!(
            arrangement.add_region(Region::new_note(track, 0, 0, String::new())),
            Err(EditError::InvalidDuration(0))
        );
    }
}
