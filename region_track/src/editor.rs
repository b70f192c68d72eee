//! 编辑命令和事件模块
//!
//! 定义了音轨管理器的命令系统和事件系统，用于与宿主应用交互。
//! 命令作用于当前选择（右键菜单中的操作），每条命令对应一个撤销步骤。

use crate::structure::{Ppqn, RegionId, TrackId, TrackKind};

#[derive(Clone, Debug, PartialEq)]
pub enum EditCommand {
    CreateTrack {
        name: String,
        kind: TrackKind,
    },
    /// 先清空目标区间，再放入新区域。`duration` 缺省时延伸到下一个区域，最长一小节。
    CreateRegion {
        track: TrackId,
        position: Ppqn,
        duration: Option<Ppqn>,
    },
    DeleteSelected,
    SetMute {
        mute: bool,
    },
    SetHue {
        hue: u16,
    },
    Rename {
        label: String,
    },
    Consolidate,
    Split {
        at: Ppqn,
    },
    ClearRange {
        track: TrackId,
        position: Ppqn,
        complete: Ppqn,
    },
    Select {
        region: RegionId,
        add: bool,
    },
    SelectAll,
    DeselectAll,
    Undo,
    Redo,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TrackEvent {
    /// 手势的实时预览发生变化，需要重绘这些音轨
    PreviewChanged {
        track_ids: Vec<TrackId>,
    },
    RegionsChanged {
        track_ids: Vec<TrackId>,
    },
    TrackCreated {
        track_id: TrackId,
    },
    RegionCreated {
        region_id: RegionId,
    },
    RegionDoubleClicked {
        region_id: RegionId,
    },
    SelectionChanged,
    /// 需要提示给用户的信息
    UserMessage {
        message: String,
    },
    HistoryChanged,
}
