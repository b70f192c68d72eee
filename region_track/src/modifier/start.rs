use super::{commit_trim, distinct_tracks, trim_targets, Approval, GestureEnv, PointerContext, PointerEvent, TrimTarget};
use crate::arrangement::Arrangement;
use crate::editing::Editing;
use crate::error::EditError;
use crate::strategy::{ModifyStrategies, ModifyStrategy, IDENTITY};
use crate::structure::{fold_loop_offset, Ppqn, Region, RegionId, TrackId};
use std::collections::BTreeMap;

#[derive(Debug, Default)]
struct SelectedStrategy {
    deltas: BTreeMap<RegionId, Ppqn>,
}

impl SelectedStrategy {
    fn delta(&self, region: &Region) -> Ppqn {
        self.deltas.get(&region.id).copied().unwrap_or(0)
    }
}

impl ModifyStrategy for SelectedStrategy {
    fn read_position(&self, region: &Region) -> Ppqn {
        region.position + self.delta(region)
    }

    fn read_complete(&self, region: &Region) -> Ppqn {
        region.complete()
    }

    fn read_loop_offset(&self, region: &Region) -> Ppqn {
        fold_loop_offset(region.loop_offset, self.delta(region), region.loop_duration)
    }

    fn read_loop_duration(&self, region: &Region) -> Ppqn {
        region.loop_duration
    }

    fn read_mirror(&self, region: &Region) -> bool {
        region.is_mirrored()
    }

    fn translate_track_index(&self, index: isize) -> isize {
        index
    }
}

/// 拖拽左边缘：移动起点，保持结束位置与循环相位
pub struct RegionStartModifier {
    targets: Vec<TrimTarget>,
    reference: Region,
    pointer_pulse: Ppqn,
    aligned: bool,
    delta_start: Ppqn,
    selected: SelectedStrategy,
}

impl RegionStartModifier {
    pub fn create(arrangement: &Arrangement, selection: &[RegionId], context: PointerContext) -> Option<Self> {
        let reference = arrangement.region(context.reference)?.clone();
        // 不能越过前一个区域的结束位置，因此提交时不需要求解器
        let targets = trim_targets(arrangement, selection, |track, region| {
            track
                .regions
                .lower_equal(region.position - 1, |_| true)
                .map(Region::complete)
        });
        if targets.is_empty() {
            return None;
        }
        Some(Self {
            targets,
            reference,
            pointer_pulse: context.pointer_pulse,
            aligned: false,
            delta_start: 0,
            selected: SelectedStrategy::default(),
        })
    }

    pub fn aligned(&self) -> bool {
        self.aligned
    }

    pub fn delta_start(&self) -> Ppqn {
        self.delta_start
    }

    pub fn update(&mut self, event: &PointerEvent, env: &GestureEnv<'_>) -> Vec<TrackId> {
        let aligned = event.modifiers.ctrl;
        let delta_start = env
            .snapping
            .compute_delta(self.pointer_pulse, event.position.x, self.reference.position);
        if self.aligned == aligned && self.delta_start == delta_start {
            return Vec::new();
        }
        self.aligned = aligned;
        self.delta_start = delta_start;
        let snap = env.snapping.value();
        self.selected.deltas = self
            .targets
            .iter()
            .map(|target| (target.id, self.clamped_delta(target, snap)))
            .collect();
        distinct_tracks(&self.targets)
    }

    fn clamped_delta(&self, target: &TrimTarget, snap: Ppqn) -> Ppqn {
        let anchor = if self.aligned {
            self.reference.position
        } else {
            target.position
        };
        let mut position = anchor + self.delta_start;
        if let Some(limit) = target.limiter {
            position = position.max(limit);
        }
        let min = target.duration.min(snap);
        (target.duration - min.max(target.complete() - position)).max(-target.position)
    }

    pub fn approve(self, arrangement: &mut Arrangement, editing: &mut Editing) -> Result<Approval, EditError> {
        if self.selected.deltas.values().all(|&delta| delta == 0) {
            return Ok(Approval {
                tracks: distinct_tracks(&self.targets),
                committed: false,
            });
        }
        let deltas = &self.selected.deltas;
        let approval = commit_trim(arrangement, editing, &self.targets, None, |arrangement, target| {
            let delta = deltas.get(&target.id).copied().unwrap_or(0);
            arrangement.modify_region(target.id, |region| {
                region.position += delta;
                region.duration -= delta;
                region.loop_offset = fold_loop_offset(region.loop_offset, delta, region.loop_duration);
            });
        })?;
        log::info!("trimmed start of {} region(s)", self.targets.len());
        Ok(approval)
    }

    pub fn cancel(&mut self) -> Vec<TrackId> {
        self.aligned = false;
        self.delta_start = 0;
        self.selected.deltas.clear();
        distinct_tracks(&self.targets)
    }
}

impl ModifyStrategies for RegionStartModifier {
    fn show_origin(&self) -> bool {
        false
    }

    fn selected_strategy(&self) -> &dyn ModifyStrategy {
        &self.selected
    }

    fn unselected_strategy(&self) -> &dyn ModifyStrategy {
        &IDENTITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::{Track, TrackKind};
    use crate::timeline::Snapping;

    // zoom 100 px/quarter: 1 px = 9.6 pulses, snapping off
    fn setup(spans: &[(Ppqn, Ppqn)]) -> (Arrangement, Vec<RegionId>, Snapping) {
        let mut arrangement = Arrangement::new();
        let track = arrangement.add_track(Track::new("Notes".to_string(), TrackKind::Notes));
        let ids = spans
            .iter()
            .map(|&(p, d)| {
                arrangement
                    .add_region(Region::new_note(track, p, d, String::new()).with_loop(0, 960))
                    .unwrap()
            })
            .collect();
        let mut snapping = Snapping::default();
        snapping.set_enabled(false);
        (arrangement, ids, snapping)
    }

    fn drag(modifier: &mut RegionStartModifier, arrangement: &Arrangement, snapping: &Snapping, x: f32) {
        let env = GestureEnv {
            arrangement,
            snapping,
            pointer_index: 0,
        };
        modifier.update(&PointerEvent::new(x, 0.0), &env);
    }

    #[test]
    fn start_trim_stops_at_previous_region() {
        let (mut arrangement, ids, snapping) = setup(&[(0, 960), (1920, 1920)]);
        arrangement.set_selected(ids[1], true);
        let context = PointerContext {
            pointer_pulse: 1920,
            pointer_index: 0,
            reference: ids[1],
        };
        let mut modifier = RegionStartModifier::create(&arrangement, &[ids[1]], context).unwrap();
        // 指针向左拖到 0
        drag(&mut modifier, &arrangement, &snapping, 0.0);
        let region = arrangement.region(ids[1]).unwrap();
        assert_eq!(modifier.selected_strategy().read_position(region), 960);
        assert_eq!(modifier.selected_strategy().read_complete(region), 3840);
        assert_eq!(modifier.selected_strategy().read_loop_offset(region), 0);
    }

    #[test]
    fn start_trim_commit_leaves_previous_region_untouched() {
        let (mut arrangement, ids, snapping) = setup(&[(0, 960), (1920, 1920)]);
        arrangement.set_selected(ids[1], true);
        let context = PointerContext {
            pointer_pulse: 1920,
            pointer_index: 0,
            reference: ids[1],
        };
        let mut modifier = RegionStartModifier::create(&arrangement, &[ids[1]], context).unwrap();
        // 指针停在 480，越过前一个区域的结束位置
        drag(&mut modifier, &arrangement, &snapping, 50.0);
        assert_eq!(modifier.delta_start(), -1440);

        let mut editing = Editing::default();
        assert!(modifier.approve(&mut arrangement, &mut editing).unwrap().committed);
        let trimmed = arrangement.region(ids[1]).unwrap();
        assert_eq!((trimmed.position, trimmed.duration, trimmed.loop_offset), (960, 2880, 0));
        let previous = arrangement.region(ids[0]).unwrap();
        assert_eq!((previous.position, previous.complete()), (0, 960));
        assert_eq!(arrangement.regions().count(), 2);
    }

    #[test]
    fn start_trim_cannot_invert_region() {
        let (arrangement, ids, mut snapping) = setup(&[(0, 960)]);
        snapping.set_enabled(true);
        snapping.set_index(3);
        let context = PointerContext {
            pointer_pulse: 0,
            pointer_index: 0,
            reference: ids[0],
        };
        let mut modifier = RegionStartModifier::create(&arrangement, &ids, context).unwrap();
        drag(&mut modifier, &arrangement, &snapping, 500.0);
        let region = arrangement.region(ids[0]).unwrap();
        // 最短保留 min(duration, snap) = 960，即不移动
        assert_eq!(modifier.selected_strategy().read_position(region), 0);
    }

    #[test]
    fn start_trim_preserves_loop_phase_on_commit() {
        let (mut arrangement, ids, snapping) = setup(&[(960, 1920)]);
        arrangement.set_selected(ids[0], true);
        let context = PointerContext {
            pointer_pulse: 960,
            pointer_index: 0,
            reference: ids[0],
        };
        let mut modifier = RegionStartModifier::create(&arrangement, &ids, context).unwrap();
        drag(&mut modifier, &arrangement, &snapping, 150.0);
        assert_eq!(modifier.delta_start(), 480);
        let mut editing = Editing::default();
        let approval = modifier.approve(&mut arrangement, &mut editing).unwrap();
        assert!(approval.committed);
        let region = arrangement.region(ids[0]).unwrap();
        assert_eq!((region.position, region.duration, region.loop_offset), (1440, 1440, 480));
        assert!(editing.can_undo());
    }
}
