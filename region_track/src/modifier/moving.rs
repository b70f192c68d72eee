use super::{Approval, GestureEnv, PointerContext, PointerEvent};
use crate::arrangement::{Arrangement, CopyParams};
use crate::editing::Editing;
use crate::error::EditError;
use crate::resolver::{validate_tracks, RegionClipResolver};
use crate::strategy::{ModifyStrategies, ModifyStrategy};
use crate::structure::{Ppqn, Region, RegionId, TrackId};
use crate::utils::format_pulses;

#[derive(Debug, Default)]
struct SelectedStrategy {
    delta_position: Ppqn,
    delta_index: isize,
    mirrored_copy: bool,
}

impl ModifyStrategy for SelectedStrategy {
    fn read_position(&self, region: &Region) -> Ppqn {
        region.position + self.delta_position
    }

    fn read_complete(&self, region: &Region) -> Ppqn {
        region.complete() + self.delta_position
    }

    fn read_loop_offset(&self, region: &Region) -> Ppqn {
        region.loop_offset
    }

    fn read_loop_duration(&self, region: &Region) -> Ppqn {
        region.loop_duration
    }

    fn read_mirror(&self, region: &Region) -> bool {
        region.can_mirror() && region.is_mirrored() != self.mirrored_copy
    }

    fn translate_track_index(&self, index: isize) -> isize {
        index - self.delta_index
    }
}

#[derive(Debug, Default)]
struct UnselectedStrategy {
    mirrored_copy: bool,
}

impl ModifyStrategy for UnselectedStrategy {
    fn read_position(&self, region: &Region) -> Ppqn {
        region.position
    }

    fn read_complete(&self, region: &Region) -> Ppqn {
        region.complete()
    }

    fn read_loop_offset(&self, region: &Region) -> Ppqn {
        region.loop_offset
    }

    fn read_loop_duration(&self, region: &Region) -> Ppqn {
        region.loop_duration
    }

    // 镜像复制时，原区域也显示为镜像
    fn read_mirror(&self, region: &Region) -> bool {
        region.can_mirror() && (region.is_mirrored() || (region.selected && self.mirrored_copy))
    }

    fn translate_track_index(&self, index: isize) -> isize {
        index
    }
}

#[derive(Clone, Copy, Debug)]
struct MovedRegion {
    id: RegionId,
    track_index: usize,
    position: Ppqn,
}

/// 移动（或复制）所选区域，可跨音轨
pub struct RegionMoveModifier {
    regions: Vec<MovedRegion>,
    pointer_pulse: Ppqn,
    pointer_index: usize,
    reference_position: Ppqn,
    copy: bool,
    mirrored: bool,
    selected: SelectedStrategy,
    unselected: UnselectedStrategy,
}

impl RegionMoveModifier {
    pub fn create(arrangement: &Arrangement, selection: &[RegionId], context: PointerContext) -> Option<Self> {
        let reference = arrangement.region(context.reference)?;
        let regions: Vec<MovedRegion> = selection
            .iter()
            .filter_map(|&id| {
                Some(MovedRegion {
                    id,
                    track_index: arrangement.region_track_index(id)?,
                    position: arrangement.region(id)?.position,
                })
            })
            .collect();
        if regions.is_empty() {
            return None;
        }
        Some(Self {
            regions,
            pointer_pulse: context.pointer_pulse,
            pointer_index: context.pointer_index,
            reference_position: reference.position,
            copy: false,
            mirrored: false,
            selected: SelectedStrategy::default(),
            unselected: UnselectedStrategy::default(),
        })
    }

    pub fn copy(&self) -> bool {
        self.copy
    }

    /// 只有在复制时才生效
    pub fn mirrored_copy(&self) -> bool {
        self.mirrored && self.copy
    }

    pub fn delta_index(&self) -> isize {
        self.selected.delta_index
    }

    pub fn delta_position(&self) -> Ppqn {
        self.selected.delta_position
    }

    pub fn update(&mut self, event: &PointerEvent, env: &GestureEnv<'_>) -> Vec<TrackId> {
        let max_index = env.arrangement.num_tracks() as isize - 1;
        let delta_index = self.regions.iter().fold(
            env.pointer_index as isize - self.pointer_index as isize,
            |delta, region| {
                let index = region.track_index as isize;
                delta.clamp(-index, max_index - index)
            },
        );
        let delta_position = self.regions.iter().fold(
            env.snapping
                .compute_delta(self.pointer_pulse, event.position.x, self.reference_position),
            |delta, region| delta.max(-region.position),
        );
        let mut changed = Vec::new();
        let mut change = false;
        if self.selected.delta_position != delta_position {
            self.selected.delta_position = delta_position;
            change = true;
        }
        if self.selected.delta_index != delta_index {
            // 旧的预览位置也需要重绘
            changed.extend(self.shifted_tracks(env.arrangement, self.selected.delta_index));
            self.selected.delta_index = delta_index;
            change = true;
        }
        if self.copy != event.modifiers.alt {
            self.copy = event.modifiers.alt;
            change = true;
        }
        if self.mirrored != event.modifiers.shift {
            self.mirrored = event.modifiers.shift;
            change = true;
        }
        if !change {
            return Vec::new();
        }
        let mirrored_copy = self.mirrored_copy();
        self.selected.mirrored_copy = mirrored_copy;
        self.unselected.mirrored_copy = mirrored_copy;
        for track in self.touched_tracks(env.arrangement) {
            if !changed.contains(&track) {
                changed.push(track);
            }
        }
        changed
    }

    fn destination(&self, region: &MovedRegion) -> usize {
        (region.track_index as isize + self.selected.delta_index).max(0) as usize
    }

    fn shifted_tracks(&self, arrangement: &Arrangement, delta_index: isize) -> Vec<TrackId> {
        let mut tracks = Vec::new();
        for region in &self.regions {
            let index = region.track_index as isize + delta_index;
            let track = usize::try_from(index).ok().and_then(|index| arrangement.track_at(index));
            if let Some(track) = track {
                if !tracks.contains(&track.id) {
                    tracks.push(track.id);
                }
            }
        }
        tracks
    }

    fn touched_tracks(&self, arrangement: &Arrangement) -> Vec<TrackId> {
        let mut tracks = self.shifted_tracks(arrangement, 0);
        if self.selected.delta_index != 0 {
            for track in self.shifted_tracks(arrangement, self.selected.delta_index) {
                if !tracks.contains(&track) {
                    tracks.push(track);
                }
            }
        }
        tracks
    }

    pub fn approve(self, arrangement: &mut Arrangement, editing: &mut Editing) -> Result<Approval, EditError> {
        let delta_index = self.selected.delta_index;
        let delta_position = self.selected.delta_position;
        if delta_index == 0 && delta_position == 0 {
            return Ok(Approval {
                tracks: self.touched_tracks(arrangement),
                committed: false,
            });
        }
        let mut destinations: Vec<(RegionId, usize, TrackId)> = Vec::with_capacity(self.regions.len());
        for moved in &self.regions {
            let index = self.destination(moved);
            let track = arrangement
                .track_at(index)
                .ok_or(EditError::UnknownTrackIndex(index))?;
            let region = arrangement
                .region(moved.id)
                .ok_or(EditError::UnknownRegion(moved.id))?;
            if !track.accepts(region) {
                return Err(EditError::TrackKindMismatch {
                    region: region.id,
                    region_kind: region.kind(),
                    track: track.id,
                    track_kind: track.kind,
                });
            }
            destinations.push((moved.id, index, track.id));
        }
        let mut modified: Vec<usize> = Vec::new();
        for &(_, index, _) in &destinations {
            if !modified.contains(&index) {
                modified.push(index);
            }
        }
        let ids: Vec<RegionId> = destinations.iter().map(|&(id, _, _)| id).collect();
        let solver = RegionClipResolver::from_selection(arrangement, &modified, &ids, &self, delta_index);
        let copy = self.copy;
        let mirrored_copy = self.mirrored_copy();
        let moved = &self.regions;
        editing.try_modify(arrangement, |arrangement| {
            if copy {
                let mut copies = Vec::with_capacity(destinations.len());
                for (&(id, _, track), origin) in destinations.iter().zip(moved) {
                    let mirrored = arrangement.region(id).map_or(false, Region::is_mirrored);
                    let params = CopyParams {
                        track: (delta_index != 0).then_some(track),
                        position: Some(origin.position + delta_position),
                        consolidate: mirrored == mirrored_copy,
                        ..CopyParams::default()
                    };
                    copies.push(arrangement.copy_to(id, params)?);
                }
                arrangement.deselect_all();
                for copy in copies {
                    arrangement.set_selected(copy, true);
                }
            } else {
                if delta_index != 0 {
                    for &(id, _, track) in &destinations {
                        arrangement.move_to_track(id, track)?;
                    }
                }
                for (&(id, _, _), origin) in destinations.iter().zip(moved) {
                    arrangement.modify_region(id, |region| region.position = origin.position + delta_position);
                }
            }
            solver.execute(arrangement);
            Ok(())
        })?;
        validate_tracks(arrangement, &modified);
        log::info!(
            "{} {} region(s) by {} pulses ({}) and {} track(s)",
            if copy { "copied" } else { "moved" },
            ids.len(),
            delta_position,
            format_pulses(delta_position),
            delta_index
        );
        let mut tracks = self.shifted_tracks(arrangement, 0);
        for index in modified {
            if let Some(track) = arrangement.track_at(index) {
                if !tracks.contains(&track.id) {
                    tracks.push(track.id);
                }
            }
        }
        Ok(Approval {
            tracks,
            committed: true,
        })
    }

    pub fn cancel(&mut self, arrangement: &Arrangement) -> Vec<TrackId> {
        self.touched_tracks(arrangement)
    }
}

impl ModifyStrategies for RegionMoveModifier {
    fn show_origin(&self) -> bool {
        self.copy
    }

    fn selected_strategy(&self) -> &dyn ModifyStrategy {
        &self.selected
    }

    fn unselected_strategy(&self) -> &dyn ModifyStrategy {
        &self.unselected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::{Track, TrackKind};
    use crate::timeline::Snapping;
    use egui::Modifiers;

    struct Fixture {
        arrangement: Arrangement,
        snapping: Snapping,
        tracks: Vec<TrackId>,
    }

    impl Fixture {
        fn new(kinds: &[TrackKind]) -> Self {
            let mut arrangement = Arrangement::new();
            let tracks = kinds
                .iter()
                .map(|&kind| arrangement.add_track(Track::new(format!("{:?}", kind), kind)))
                .collect();
            let mut snapping = Snapping::default();
            snapping.set_enabled(false);
            Self {
                arrangement,
                snapping,
                tracks,
            }
        }

        fn update(&self, modifier: &mut RegionMoveModifier, event: PointerEvent, pointer_index: usize) -> Vec<TrackId> {
            let env = GestureEnv {
                arrangement: &self.arrangement,
                snapping: &self.snapping,
                pointer_index,
            };
            modifier.update(&event, &env)
        }
    }

    #[test]
    fn delta_position_never_moves_a_region_below_zero() {
        let mut fixture = Fixture::new(&[TrackKind::Notes]);
        let track = fixture.tracks[0];
        let a = fixture.arrangement.add_region(Region::new_note(track, 960, 960, String::new())).unwrap();
        let b = fixture.arrangement.add_region(Region::new_note(track, 2880, 960, String::new())).unwrap();
        let context = PointerContext {
            pointer_pulse: 2880,
            pointer_index: 0,
            reference: b,
        };
        let mut modifier = RegionMoveModifier::create(&fixture.arrangement, &[a, b], context).unwrap();
        let changed = fixture.update(&mut modifier, PointerEvent::new(0.0, 0.0), 0);
        assert_eq!(changed, vec![track]);
        assert_eq!(modifier.delta_position(), -960);
    }

    #[test]
    fn delta_index_is_clamped_per_region() {
        let mut fixture = Fixture::new(&[TrackKind::Notes, TrackKind::Notes, TrackKind::Notes]);
        let a = fixture.arrangement.add_region(Region::new_note(fixture.tracks[0], 0, 960, String::new())).unwrap();
        let b = fixture.arrangement.add_region(Region::new_note(fixture.tracks[1], 0, 960, String::new())).unwrap();
        let context = PointerContext {
            pointer_pulse: 0,
            pointer_index: 0,
            reference: a,
        };
        let mut modifier = RegionMoveModifier::create(&fixture.arrangement, &[a, b], context).unwrap();
        fixture.update(&mut modifier, PointerEvent::new(0.0, 0.0), 3);
        assert_eq!(modifier.delta_index(), 1);
        let preview = crate::strategy::RegionPreview::read(
            modifier.selected_strategy(),
            fixture.arrangement.region(b).unwrap(),
            1,
        );
        assert_eq!(preview.track_index, 2);
    }

    #[test]
    fn mirrored_copy_requires_copy() {
        let mut fixture = Fixture::new(&[TrackKind::Notes]);
        let a = fixture.arrangement.add_region(Region::new_note(fixture.tracks[0], 0, 960, String::new())).unwrap();
        fixture.arrangement.set_selected(a, true);
        let context = PointerContext {
            pointer_pulse: 0,
            pointer_index: 0,
            reference: a,
        };
        let mut modifier = RegionMoveModifier::create(&fixture.arrangement, &[a], context).unwrap();
        fixture.update(&mut modifier, PointerEvent::new(100.0, 0.0).with_modifiers(Modifiers::SHIFT), 0);
        assert!(!modifier.mirrored_copy());
        assert!(!modifier.show_origin());

        let both = Modifiers {
            alt: true,
            shift: true,
            ..Modifiers::NONE
        };
        fixture.update(&mut modifier, PointerEvent::new(100.0, 0.0).with_modifiers(both), 0);
        assert!(modifier.mirrored_copy());
        assert!(modifier.show_origin());
        let region = fixture.arrangement.region(a).unwrap();
        assert!(modifier.selected_strategy().read_mirror(region));
        assert!(modifier.unselected_strategy().read_mirror(region));
    }

    #[test]
    fn moving_onto_foreign_track_kind_is_rejected() {
        let mut fixture = Fixture::new(&[TrackKind::Notes, TrackKind::Audio]);
        let a = fixture.arrangement.add_region(Region::new_note(fixture.tracks[0], 0, 960, String::new())).unwrap();
        fixture.arrangement.set_selected(a, true);
        let context = PointerContext {
            pointer_pulse: 0,
            pointer_index: 0,
            reference: a,
        };
        let mut modifier = RegionMoveModifier::create(&fixture.arrangement, &[a], context).unwrap();
        fixture.update(&mut modifier, PointerEvent::new(0.0, 0.0), 1);
        let before = serde_json::to_string(&fixture.arrangement).unwrap();
        let mut editing = Editing::default();
        let result = modifier.approve(&mut fixture.arrangement, &mut editing);
        assert!(matches!(result, Err(EditError::TrackKindMismatch { .. })));
        assert_eq!(serde_json::to_string(&fixture.arrangement).unwrap(), before);
        assert!(!editing.can_undo());
    }
}
