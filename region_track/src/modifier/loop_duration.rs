use super::{commit_trim, distinct_tracks, trim_targets, Approval, GestureEnv, PointerContext, PointerEvent, TrimTarget};
use crate::arrangement::Arrangement;
use crate::editing::Editing;
use crate::error::EditError;
use crate::strategy::{ModifyStrategies, ModifyStrategy, IDENTITY};
use crate::structure::{Ppqn, Region, RegionId, TrackId};
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct LoopPreview {
    duration: Ppqn,
    loop_duration: Ppqn,
}

#[derive(Debug, Default)]
struct SelectedStrategy {
    previews: BTreeMap<RegionId, LoopPreview>,
}

impl ModifyStrategy for SelectedStrategy {
    fn read_position(&self, region: &Region) -> Ppqn {
        region.position
    }

    fn read_complete(&self, region: &Region) -> Ppqn {
        region.position + self.read_duration(region)
    }

    fn read_duration(&self, region: &Region) -> Ppqn {
        self.previews
            .get(&region.id)
            .map_or(region.duration, |preview| preview.duration)
    }

    fn read_loop_offset(&self, region: &Region) -> Ppqn {
        region.loop_offset
    }

    fn read_loop_duration(&self, region: &Region) -> Ppqn {
        self.previews
            .get(&region.id)
            .map_or(region.loop_duration, |preview| preview.loop_duration)
    }

    fn read_mirror(&self, region: &Region) -> bool {
        region.is_mirrored()
    }

    fn translate_track_index(&self, index: isize) -> isize {
        index
    }
}

/// 调整循环长度。区域长度至少延伸到第一轮循环结束；
/// `resize` 模式下指针锚定在区域右边缘而不是循环末尾。
pub struct RegionLoopDurationModifier {
    targets: Vec<TrimTarget>,
    reference: Region,
    pointer_pulse: Ppqn,
    resize: bool,
    delta_loop_duration: Ppqn,
    selected: SelectedStrategy,
}

impl RegionLoopDurationModifier {
    pub fn create(
        arrangement: &Arrangement,
        selection: &[RegionId],
        context: PointerContext,
        resize: bool,
    ) -> Option<Self> {
        let reference = arrangement.region(context.reference)?.clone();
        // 延长时只受同样被选中的下一个区域限制，其余区域交给求解器裁剪
        let targets = trim_targets(arrangement, selection, |track, region| {
            track
                .regions
                .greater_equal(region.complete(), |next| selection.contains(&next.id))
                .map(|next| next.position)
        });
        if targets.is_empty() {
            return None;
        }
        Some(Self {
            targets,
            reference,
            pointer_pulse: context.pointer_pulse,
            resize,
            delta_loop_duration: 0,
            selected: SelectedStrategy::default(),
        })
    }

    pub fn resize(&self) -> bool {
        self.resize
    }

    pub fn delta_loop_duration(&self) -> Ppqn {
        self.delta_loop_duration
    }

    pub fn update(&mut self, event: &PointerEvent, env: &GestureEnv<'_>) -> Vec<TrackId> {
        let reference = &self.reference;
        let anchor = if self.resize {
            reference.complete() - (reference.position + reference.loop_duration - reference.loop_offset)
        } else {
            0
        };
        let delta = env
            .snapping
            .compute_delta(self.pointer_pulse - anchor, event.position.x, reference.loop_duration);
        if self.delta_loop_duration == delta {
            return Vec::new();
        }
        self.delta_loop_duration = delta;
        let snap = env.snapping.value();
        self.selected.previews = self
            .targets
            .iter()
            .map(|target| (target.id, self.preview(target, snap)))
            .collect();
        distinct_tracks(&self.targets)
    }

    fn preview(&self, target: &TrimTarget, snap: Ppqn) -> LoopPreview {
        let loop_duration = snap
            .min(target.loop_duration)
            .max(target.loop_duration + self.delta_loop_duration);
        let mut duration = target.duration.max(loop_duration - target.loop_offset);
        if let Some(limit) = target.limiter {
            duration = duration.min(limit - target.position);
        }
        LoopPreview { duration, loop_duration }
    }

    pub fn approve(self, arrangement: &mut Arrangement, editing: &mut Editing) -> Result<Approval, EditError> {
        let unchanged = self.targets.iter().all(|t| {
            self.selected.previews.get(&t.id).map_or(true, |p| {
                p.duration == t.duration && p.loop_duration == t.loop_duration
            })
        });
        if unchanged {
            return Ok(Approval {
                tracks: distinct_tracks(&self.targets),
                committed: false,
            });
        }
        let previews = &self.selected.previews;
        let approval = commit_trim(arrangement, editing, &self.targets, Some(&self), |arrangement, target| {
            if let Some(&LoopPreview { duration, loop_duration }) = previews.get(&target.id) {
                arrangement.modify_region(target.id, |region| {
                    region.duration = duration;
                    region.loop_duration = loop_duration;
                });
            }
        })?;
        log::info!("changed loop duration of {} region(s)", self.targets.len());
        Ok(approval)
    }

    pub fn cancel(&mut self) -> Vec<TrackId> {
        self.delta_loop_duration = 0;
        self.selected.previews.clear();
        distinct_tracks(&self.targets)
    }
}

impl ModifyStrategies for RegionLoopDurationModifier {
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

    fn setup() -> (Arrangement, RegionId, RegionId, Snapping) {
        let mut arrangement = Arrangement::new();
        let track = arrangement.add_track(Track::new("Notes".to_string(), TrackKind::Notes));
        let looped = arrangement
            .add_region(Region::new_note(track, 0, 1920, String::new()).with_loop(0, 960))
            .unwrap();
        arrangement.set_selected(looped, true);
        let next = arrangement
            .add_region(Region::new_note(track, 3840, 960, String::new()))
            .unwrap();
        let mut snapping = Snapping::default();
        snapping.set_index(4);
        (arrangement, looped, next, snapping)
    }

    #[test]
    fn growing_loop_extends_region_and_clips_the_neighbour() {
        let (mut arrangement, looped, next, snapping) = setup();
        let context = PointerContext {
            pointer_pulse: 960,
            pointer_index: 0,
            reference: looped,
        };
        let mut modifier = RegionLoopDurationModifier::create(&arrangement, &[looped], context, false).unwrap();
        {
            let env = GestureEnv {
                arrangement: &arrangement,
                snapping: &snapping,
                pointer_index: 0,
            };
            // 循环末尾从 960 拖到 4320
            modifier.update(&PointerEvent::new(450.0, 0.0), &env);
        }
        let region = arrangement.region(looped).unwrap();
        assert_eq!(modifier.selected_strategy().read_loop_duration(region), 4320);
        assert_eq!(modifier.selected_strategy().read_complete(region), 4320);

        let mut editing = Editing::default();
        modifier.approve(&mut arrangement, &mut editing).unwrap();
        let region = arrangement.region(looped).unwrap();
        assert_eq!((region.duration, region.loop_duration), (4320, 4320));
        let next = arrangement.region(next).unwrap();
        assert_eq!((next.position, next.complete()), (4320, 4800));
    }

    #[test]
    fn shrinking_loop_keeps_region_duration() {
        let (arrangement, looped, _, snapping) = setup();
        let context = PointerContext {
            pointer_pulse: 1920,
            pointer_index: 0,
            reference: looped,
        };
        // resize 模式：指针从区域右边缘 1920 开始
        let mut modifier = RegionLoopDurationModifier::create(&arrangement, &[looped], context, true).unwrap();
        let env = GestureEnv {
            arrangement: &arrangement,
            snapping: &snapping,
            pointer_index: 0,
        };
        modifier.update(&PointerEvent::new(0.0, 0.0), &env);
        let region = arrangement.region(looped).unwrap();
        // 最短为一个吸附单位
        assert_eq!(modifier.selected_strategy().read_loop_duration(region), 480);
        assert_eq!(modifier.selected_strategy().read_duration(region), 1920);
    }
}
