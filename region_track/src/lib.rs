//! # region_track
//!
//! DAW 风格编排视图中的区域编辑引擎：在多条音轨上移动、复制、裁剪区域，
//! 并在提交时自动解决区域之间的重叠。
//!
//! ## 功能特性
//!
//! - **手势修改器**：移动 / 复制 / 镜像复制、左边缘裁剪、右边缘裁剪、循环长度调整
//! - **实时预览**：修改器只暴露读取策略，提交前不改动任何数据
//! - **重叠解决**：被覆盖的区域会被删除、截断或一分为二，循环相位保持不变
//! - **撤销历史**：每个手势或命令对应一个撤销步骤
//! - **网格对齐**：Smart / 小节 / 音符时值吸附
//!
//! ## 基本使用
//!
//! ```rust
//! use region_track::{EditCommand, PointerEvent, TrackKind, TrackManagerOptions, TracksManager};
//!
//! let mut manager = TracksManager::new(TrackManagerOptions::default());
//! manager.execute_command(EditCommand::CreateTrack {
//!     name: "Drums".to_string(),
//!     kind: TrackKind::Notes,
//! }).unwrap();
//! let track = manager.arrangement().tracks()[0].id;
//! manager.execute_command(EditCommand::CreateRegion { track, position: 0, duration: Some(3840) }).unwrap();
//!
//! // 按下区域主体并拖动一拍
//! manager.pointer_down(&PointerEvent::new(50.0, 10.0)).unwrap();
//! manager.update(&PointerEvent::new(150.0, 10.0)).unwrap();
//! manager.approve().unwrap();
//! assert_eq!(manager.arrangement().regions().next().unwrap().position, 960);
//! ```
//!
//! ## 集成到宿主应用
//!
//! ```rust
//! use region_track::{TrackEvent, TrackManagerOptions, TracksManager};
//!
//! let mut manager = TracksManager::new(TrackManagerOptions::default());
//! manager.set_event_listener(Box::new(|event| {
//!     if let TrackEvent::UserMessage { message } = event {
//!         println!("{}", message);
//!     }
//! }));
//! ```

pub mod structure;
pub mod collection;
pub mod error;
pub mod arrangement;
pub mod utils;
pub mod editing;
pub mod timeline;
pub mod strategy;
pub mod resolver;
pub mod modifier;
pub mod capturing;
pub mod editor;
pub mod manager;

pub use structure::{ppqn, Ppqn, Region, RegionContent, RegionId, RegionKind, Track, TrackId, TrackKind};
pub use arrangement::{Arrangement, CopyParams};
pub use error::{EditError, InvariantViolation};
pub use editing::Editing;
pub use timeline::{Snapping, TimelineState};
pub use strategy::{ModifyStrategies, ModifyStrategy, RegionPreview};
pub use resolver::{ClipTask, RegionClipResolver, Solver};
pub use modifier::{Approval, PointerContext, PointerEvent, RegionModifier};
pub use capturing::{CaptureTarget, RegionPart};
pub use editor::{EditCommand, TrackEvent};
pub use manager::{GestureState, TrackManagerOptions, TracksManager};
