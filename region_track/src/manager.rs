//! 音轨管理器模块
//!
//! `TracksManager` 拥有编排、撤销历史、时间轴与吸附设置，以及当前手势。
//! 宿主把指针事件与命令交给它；同一时刻最多只有一个修改器处于活动状态。

use crate::arrangement::Arrangement;
use crate::capturing::{capture, CaptureTarget, RegionPart, TrackLayout};
use crate::editing::Editing;
use crate::editor::{EditCommand, TrackEvent};
use crate::error::EditError;
use crate::modifier::{
    Approval, GestureEnv, PointerContext, PointerEvent, RegionDurationModifier, RegionLoopDurationModifier,
    RegionModifier, RegionMoveModifier, RegionStartModifier,
};
use crate::resolver::{validate_tracks, RegionClipResolver};
use crate::strategy::{ModifyStrategies, RegionPreview, IDENTITY_STRATEGIES};
use crate::structure::{ppqn, Ppqn, Region, RegionId, Track, TrackId};
use crate::timeline::{Snapping, TimelineState};
use egui::Pos2;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackManagerOptions {
    pub default_track_height: f32,
    pub pointer_radius: f32, // 命中检测半径（像素）
    pub snap_enabled: bool,
    pub snap_index: usize,
    pub smart_min_pixel: f32,
    pub history_depth: usize,
    pub timeline: TimelineState,
}

impl Default for TrackManagerOptions {
    fn default() -> Self {
        Self {
            default_track_height: 80.0,
            pointer_radius: 4.0,
            snap_enabled: true,
            snap_index: 0,
            smart_min_pixel: 16.0,
            history_depth: 100,
            timeline: TimelineState::default(),
        }
    }
}

impl TrackManagerOptions {
    /// 未给出的字段使用默认值
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

pub enum GestureState {
    Idle,
    Active(RegionModifier),
}

pub struct TracksManager {
    arrangement: Arrangement,
    editing: Editing,
    snapping: Snapping,
    gesture: GestureState,
    options: TrackManagerOptions,

    // Events
    pending_events: Vec<TrackEvent>,
    event_listener: Option<Box<dyn FnMut(&TrackEvent)>>,
}

impl TracksManager {
    pub fn new(options: TrackManagerOptions) -> Self {
        Self::with_arrangement(options, Arrangement::new())
    }

    pub fn with_arrangement(options: TrackManagerOptions, arrangement: Arrangement) -> Self {
        let mut snapping = Snapping::new(options.timeline.clone());
        snapping.set_enabled(options.snap_enabled);
        snapping.set_index(options.snap_index);
        snapping.set_smart_min_pixel(options.smart_min_pixel);
        Self {
            arrangement,
            editing: Editing::new(options.history_depth),
            snapping,
            gesture: GestureState::Idle,
            options,
            pending_events: Vec::new(),
            event_listener: None,
        }
    }

    pub fn set_event_listener(&mut self, listener: Box<dyn FnMut(&TrackEvent)>) {
        self.event_listener = Some(listener);
    }

    pub fn take_events(&mut self) -> Vec<TrackEvent> {
        std::mem::take(&mut self.pending_events)
    }

    pub fn arrangement(&self) -> &Arrangement {
        &self.arrangement
    }

    pub fn options(&self) -> &TrackManagerOptions {
        &self.options
    }

    pub fn snapping(&self) -> &Snapping {
        &self.snapping
    }

    pub fn snapping_mut(&mut self) -> &mut Snapping {
        &mut self.snapping
    }

    pub fn timeline(&self) -> &TimelineState {
        self.snapping.timeline()
    }

    pub fn timeline_mut(&mut self) -> &mut TimelineState {
        self.snapping.timeline_mut()
    }

    pub fn is_active(&self) -> bool {
        matches!(self.gesture, GestureState::Active(_))
    }

    pub fn active_modifier(&self) -> Option<&RegionModifier> {
        match &self.gesture {
            GestureState::Active(modifier) => Some(modifier),
            GestureState::Idle => None,
        }
    }

    pub fn can_undo(&self) -> bool {
        self.editing.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.editing.can_redo()
    }

    pub fn num_tracks(&self) -> usize {
        self.arrangement.num_tracks()
    }

    pub fn layout(&self) -> TrackLayout {
        TrackLayout::new(&self.arrangement)
    }

    /// 指针 y（视口坐标）所在的音轨索引，位于所有音轨下方时等于音轨数量
    pub fn global_to_index(&self, y: f32) -> usize {
        self.layout().local_to_index(y + self.timeline().scroll_y)
    }

    pub fn capture(&self, pointer: Pos2) -> Option<CaptureTarget> {
        capture(&self.arrangement, self.timeline(), pointer, self.options.pointer_radius)
    }

    // ------------------------------------------------------------------
    // Pointer interaction

    /// 指针按下：按命中的部位启动对应的修改器。按住 ctrl 时改为在指针处切开所选区域。
    pub fn pointer_down(&mut self, event: &PointerEvent) -> Result<Option<CaptureTarget>, EditError> {
        self.ensure_idle("pointer_down")?;
        let Some(target) = self.capture(event.position) else {
            return Ok(None);
        };
        let CaptureTarget::Region { part, region, .. } = target else {
            return Ok(Some(target));
        };
        self.select_for_gesture(region, event.modifiers.shift);
        if event.modifiers.ctrl {
            let at = self.snapping.x_to_unit_round(event.position.x);
            self.cut(at, !event.modifiers.shift);
            return Ok(Some(target));
        }
        let context = PointerContext {
            pointer_pulse: self.timeline().x_to_unit(event.position.x).round() as Ppqn,
            pointer_index: self.global_to_index(event.position.y),
            reference: region,
        };
        match part {
            RegionPart::Start => self.start_start_trim(context)?,
            RegionPart::Complete => self.start_duration_trim(context)?,
            RegionPart::Position => self.start_move(context)?,
            RegionPart::LoopDuration => self.start_loop_duration(context, false)?,
            RegionPart::ContentResize => self.start_loop_duration(context, true)?,
        }
        Ok(Some(target))
    }

    /// 双击音轨空白处创建区域，长度延伸到下一个区域，最长一小节
    pub fn double_click(&mut self, event: &PointerEvent) -> Result<Option<RegionId>, EditError> {
        self.ensure_idle("double_click")?;
        match self.capture(event.position) {
            Some(CaptureTarget::Track { index }) => {
                let track = self
                    .arrangement
                    .track_at(index)
                    .ok_or(EditError::UnknownTrackIndex(index))?
                    .id;
                let position = self.snapping.x_to_unit_floor(event.position.x).max(0);
                self.create_region(track, position, None).map(Some)
            }
            Some(CaptureTarget::Region { region, .. }) => {
                self.emit_event(TrackEvent::RegionDoubleClicked { region_id: region });
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn select_for_gesture(&mut self, region: RegionId, add: bool) {
        if self.arrangement.region(region).map_or(true, |r| r.selected) {
            return;
        }
        if !add {
            self.arrangement.deselect_all();
        }
        self.arrangement.set_selected(region, true);
        self.emit_event(TrackEvent::SelectionChanged);
    }

    // ------------------------------------------------------------------
    // Gestures

    pub fn start_move(&mut self, context: PointerContext) -> Result<(), EditError> {
        self.begin("RegionMoveModifier", |arrangement, selection| {
            RegionMoveModifier::create(arrangement, selection, context).map(RegionModifier::Move)
        })
    }

    pub fn start_start_trim(&mut self, context: PointerContext) -> Result<(), EditError> {
        self.begin("RegionStartModifier", |arrangement, selection| {
            RegionStartModifier::create(arrangement, selection, context).map(RegionModifier::Start)
        })
    }

    pub fn start_duration_trim(&mut self, context: PointerContext) -> Result<(), EditError> {
        self.begin("RegionDurationModifier", |arrangement, selection| {
            RegionDurationModifier::create(arrangement, selection, context).map(RegionModifier::Duration)
        })
    }

    pub fn start_loop_duration(&mut self, context: PointerContext, resize: bool) -> Result<(), EditError> {
        self.begin("RegionLoopDurationModifier", |arrangement, selection| {
            RegionLoopDurationModifier::create(arrangement, selection, context, resize).map(RegionModifier::LoopDuration)
        })
    }

    fn begin<F>(&mut self, name: &'static str, create: F) -> Result<(), EditError>
    where
        F: FnOnce(&Arrangement, &[RegionId]) -> Option<RegionModifier>,
    {
        self.ensure_idle(name)?;
        let selection = self.arrangement.selected_ids();
        let Some(modifier) = create(&self.arrangement, &selection) else {
            warn!("{} has no region to modify", name);
            return Err(EditError::EmptySelection { modifier: name });
        };
        debug!("start {} with {} region(s)", name, selection.len());
        self.gesture = GestureState::Active(modifier);
        Ok(())
    }

    fn ensure_idle(&self, action: &str) -> Result<(), EditError> {
        match &self.gesture {
            GestureState::Active(active) => {
                warn!("{} rejected while {} is active", action, active.name());
                Err(EditError::ModifierInUse { active: active.name() })
            }
            GestureState::Idle => Ok(()),
        }
    }

    pub fn update(&mut self, event: &PointerEvent) -> Result<(), EditError> {
        let pointer_index = self.global_to_index(event.position.y);
        let GestureState::Active(modifier) = &mut self.gesture else {
            return Err(EditError::NoActiveModifier);
        };
        let env = GestureEnv {
            arrangement: &self.arrangement,
            snapping: &self.snapping,
            pointer_index,
        };
        let track_ids = modifier.update(event, &env);
        if !track_ids.is_empty() {
            self.emit_event(TrackEvent::PreviewChanged { track_ids });
        }
        Ok(())
    }

    /// 提交手势。无论成功与否，结束后都回到空闲状态。
    /// 用户输入被拒绝时（如音轨类型不符）不写入任何数据，并发出 `UserMessage`。
    pub fn approve(&mut self) -> Result<Approval, EditError> {
        let GestureState::Active(modifier) = std::mem::replace(&mut self.gesture, GestureState::Idle) else {
            return Err(EditError::NoActiveModifier);
        };
        let name = modifier.name();
        debug!("approve {}", name);
        let result = modifier.approve(&mut self.arrangement, &mut self.editing);
        debug!("finally {}", name);
        match result {
            Ok(approval) => {
                self.emit_event(TrackEvent::RegionsChanged {
                    track_ids: approval.tracks.clone(),
                });
                if approval.committed {
                    self.emit_event(TrackEvent::HistoryChanged);
                }
                Ok(approval)
            }
            Err(err) => {
                let track_ids = self.track_ids();
                self.emit_event(TrackEvent::PreviewChanged { track_ids });
                if err.is_user_facing() {
                    warn!("{} cancelled: {}", name, err);
                    self.emit_event(TrackEvent::UserMessage {
                        message: err.to_string(),
                    });
                }
                Err(err)
            }
        }
    }

    pub fn cancel(&mut self) -> Result<(), EditError> {
        let GestureState::Active(mut modifier) = std::mem::replace(&mut self.gesture, GestureState::Idle) else {
            return Err(EditError::NoActiveModifier);
        };
        debug!("cancel {}", modifier.name());
        let track_ids = modifier.cancel(&self.arrangement);
        debug!("finally {}", modifier.name());
        self.emit_event(TrackEvent::PreviewChanged { track_ids });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Preview

    fn strategies(&self) -> &dyn ModifyStrategies {
        match &self.gesture {
            GestureState::Active(modifier) => modifier as &dyn ModifyStrategies,
            GestureState::Idle => &IDENTITY_STRATEGIES,
        }
    }

    /// 区域在当前手势下的实时预览；空闲时即区域本身
    pub fn preview(&self, id: RegionId) -> Option<RegionPreview> {
        let region = self.arrangement.region(id)?;
        let index = self.arrangement.region_track_index(id)?;
        let strategy = self.strategies().strategy_for(region);
        Some(RegionPreview::read(strategy, region, index))
    }

    /// 绘制一条音轨时看到的区域：先是未选区域（必要时含已选区域的原位），
    /// 再是从源音轨平移过来的已选区域。
    pub fn preview_track(&self, index: usize) -> Vec<RegionPreview> {
        let strategies = self.strategies();
        let mut previews = Vec::new();
        let Some(track) = self.arrangement.track_at(index) else {
            return previews;
        };
        let unselected = strategies.unselected_strategy();
        for region in track.regions.iter() {
            if region.selected && !strategies.show_origin() {
                continue;
            }
            previews.push(RegionPreview::read(unselected, region, index));
        }
        let selected = strategies.selected_strategy();
        let source = selected.translate_track_index(index as isize);
        let Ok(source) = usize::try_from(source) else {
            return previews;
        };
        if let Some(track) = self.arrangement.track_at(source) {
            for region in track.regions.iter().filter(|r| r.selected) {
                previews.push(RegionPreview::read(selected, region, source));
            }
        }
        previews
    }

    // ------------------------------------------------------------------
    // Commands

    pub fn execute_command(&mut self, command: EditCommand) -> Result<(), EditError> {
        self.ensure_idle("execute_command")?;
        match command {
            EditCommand::CreateTrack { name, kind } => {
                let track = Track::new(name, kind).with_height(self.options.default_track_height);
                let track_id = self.editing.modify(&mut self.arrangement, |a| a.add_track(track));
                info!("created {:?} track {:?}", kind, track_id);
                self.emit_event(TrackEvent::TrackCreated { track_id });
                self.emit_event(TrackEvent::HistoryChanged);
            }
            EditCommand::CreateRegion {
                track,
                position,
                duration,
            } => {
                self.create_region(track, position, duration)?;
            }
            EditCommand::DeleteSelected => {
                let selected = self.arrangement.selected_ids();
                if selected.is_empty() {
                    return Ok(());
                }
                let track_ids = self.tracks_of(&selected);
                self.editing.modify(&mut self.arrangement, |a| {
                    for &id in &selected {
                        a.delete_region(id);
                    }
                });
                info!("deleted {} region(s)", selected.len());
                self.regions_changed(track_ids);
            }
            EditCommand::SetMute { mute } => self.modify_selected(|region| region.mute = mute),
            EditCommand::SetHue { hue } => self.modify_selected(|region| region.hue = hue),
            EditCommand::Rename { label } => self.modify_selected(|region| region.label.clone_from(&label)),
            EditCommand::Consolidate => {
                let mirrored: Vec<RegionId> = self
                    .arrangement
                    .selected()
                    .into_iter()
                    .filter(|r| r.is_mirrored())
                    .map(|r| r.id)
                    .collect();
                if mirrored.is_empty() {
                    return Ok(());
                }
                let track_ids = self.tracks_of(&mirrored);
                self.editing.modify(&mut self.arrangement, |a| {
                    for &id in &mirrored {
                        a.consolidate(id);
                    }
                });
                self.regions_changed(track_ids);
            }
            EditCommand::Split { at } => self.cut(at, true),
            EditCommand::ClearRange {
                track,
                position,
                complete,
            } => {
                if complete <= position {
                    return Err(EditError::InvalidDuration(complete - position));
                }
                let index = self.arrangement.track_index(track).ok_or(EditError::UnknownTrack(track))?;
                let solver = RegionClipResolver::from_range(&self.arrangement.tracks()[index], position, complete);
                if solver.is_empty() {
                    return Ok(());
                }
                self.editing.modify(&mut self.arrangement, |a| solver.execute(a));
                validate_tracks(&self.arrangement, &[index]);
                self.regions_changed(vec![track]);
            }
            EditCommand::Select { region, add } => {
                if self.arrangement.region(region).is_none() {
                    return Err(EditError::UnknownRegion(region));
                }
                if !add {
                    self.arrangement.deselect_all();
                }
                self.arrangement.set_selected(region, true);
                self.emit_event(TrackEvent::SelectionChanged);
            }
            EditCommand::SelectAll => {
                self.arrangement.select_all();
                self.emit_event(TrackEvent::SelectionChanged);
            }
            EditCommand::DeselectAll => {
                self.arrangement.deselect_all();
                self.emit_event(TrackEvent::SelectionChanged);
            }
            EditCommand::Undo => {
                self.editing.undo(&mut self.arrangement)?;
                self.regions_changed(self.track_ids());
            }
            EditCommand::Redo => {
                self.editing.redo(&mut self.arrangement)?;
                self.regions_changed(self.track_ids());
            }
        }
        Ok(())
    }

    fn create_region(&mut self, track_id: TrackId, position: Ppqn, duration: Option<Ppqn>) -> Result<RegionId, EditError> {
        let index = self
            .arrangement
            .track_index(track_id)
            .ok_or(EditError::UnknownTrack(track_id))?;
        let track = &self.arrangement.tracks()[index];
        let position = position.max(0);
        let duration = duration.unwrap_or_else(|| {
            track
                .regions
                .greater_equal(position + 1, |_| true)
                .map_or(ppqn::BAR, |next| ppqn::BAR.min(next.position - position))
        });
        if duration <= 0 {
            return Err(EditError::InvalidDuration(duration));
        }
        let region = Region::new(track_id, track.kind.new_content(), position, duration, track.name.clone());
        let solver = RegionClipResolver::from_range(track, position, position + duration);
        let region_id = self.editing.try_modify(&mut self.arrangement, |a| {
            solver.execute(a);
            a.add_region(region)
        })?;
        validate_tracks(&self.arrangement, &[index]);
        info!("created region {:?} on track {:?}", region_id, track_id);
        self.emit_event(TrackEvent::RegionCreated { region_id });
        self.regions_changed(vec![track_id]);
        Ok(region_id)
    }

    /// 在 `at` 处切开所有包含该位置的已选区域。`consolidate` 时尾部获得独立内容。
    fn cut(&mut self, at: Ppqn, consolidate: bool) {
        let targets: Vec<RegionId> = self
            .arrangement
            .selected()
            .into_iter()
            .filter(|r| r.position < at && at < r.complete())
            .map(|r| r.id)
            .collect();
        if targets.is_empty() {
            return;
        }
        let track_ids = self.tracks_of(&targets);
        self.editing.modify(&mut self.arrangement, |a| {
            for &id in &targets {
                if let Some(tail) = a.split(id, at) {
                    if consolidate {
                        a.consolidate(tail);
                    }
                }
            }
        });
        info!("cut {} region(s) at {}", targets.len(), crate::utils::format_pulses(at));
        self.regions_changed(track_ids);
    }

    fn modify_selected<F>(&mut self, mut f: F)
    where
        F: FnMut(&mut Region),
    {
        let selected = self.arrangement.selected_ids();
        if selected.is_empty() {
            return;
        }
        let track_ids = self.tracks_of(&selected);
        self.editing.modify(&mut self.arrangement, |a| {
            for &id in &selected {
                a.modify_region(id, &mut f);
            }
        });
        self.regions_changed(track_ids);
    }

    fn tracks_of(&self, regions: &[RegionId]) -> Vec<TrackId> {
        let mut track_ids = Vec::new();
        for track_id in regions
            .iter()
            .filter_map(|&id| self.arrangement.region(id).map(|r| r.track_id))
        {
            if !track_ids.contains(&track_id) {
                track_ids.push(track_id);
            }
        }
        track_ids
    }

    fn track_ids(&self) -> Vec<TrackId> {
        self.arrangement.tracks().iter().map(|t| t.id).collect()
    }

    fn regions_changed(&mut self, track_ids: Vec<TrackId>) {
        self.emit_event(TrackEvent::RegionsChanged { track_ids });
        self.emit_event(TrackEvent::HistoryChanged);
    }

    fn emit_event(&mut self, event: TrackEvent) {
        if let Some(ref mut listener) = self.event_listener {
            listener(&event);
        }
        self.pending_events.push(event);
    }
}
