use egui::Modifiers;
use region_track::utils::format_pulses;
use region_track::{
    EditCommand, EditError, PointerEvent, TrackEvent, TrackKind, TrackManagerOptions, TracksManager,
};
use std::path::PathBuf;

// 以脚本方式回放几组指针手势，并打印每一步之后的音轨内容。
// 可选参数：TrackManagerOptions 的 JSON 文件路径。

fn main() {
    // 配置日志：设置默认级别为 info，确保日志输出到 stderr
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let options = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => match load_options(&path) {
            Ok(options) => options,
            Err(err) => {
                log::error!("Failed to load options from {:?}: {}", path, err);
                std::process::exit(1);
            }
        },
        None => TrackManagerOptions::default(),
    };

    let mut manager = TracksManager::new(options);
    manager.set_event_listener(Box::new(|event| match event {
        TrackEvent::UserMessage { message } => log::warn!("{}", message),
        TrackEvent::PreviewChanged { .. } => {}
        other => log::debug!("{:?}", other),
    }));

    if let Err(err) = run(&mut manager) {
        log::error!("Demo aborted: {}", err);
        std::process::exit(1);
    }
}

fn load_options(path: &PathBuf) -> Result<TrackManagerOptions, Box<dyn std::error::Error>> {
    let json = std::fs::read_to_string(path)?;
    Ok(TrackManagerOptions::from_json(&json)?)
}

fn run(manager: &mut TracksManager) -> Result<(), EditError> {
    for (name, kind) in [("Lead", TrackKind::Notes), ("Bass", TrackKind::Notes), ("Vocals", TrackKind::Audio)] {
        manager.execute_command(EditCommand::CreateTrack {
            name: name.to_string(),
            kind,
        })?;
    }
    let tracks: Vec<_> = manager.arrangement().tracks().iter().map(|t| t.id).collect();
    manager.execute_command(EditCommand::CreateRegion {
        track: tracks[0],
        position: 0,
        duration: Some(4 * 3840),
    })?;
    manager.execute_command(EditCommand::CreateRegion {
        track: tracks[1],
        position: 3840,
        duration: Some(1920),
    })?;
    manager.execute_command(EditCommand::CreateRegion {
        track: tracks[2],
        position: 0,
        duration: Some(3840),
    })?;
    dump(manager, "initial");

    let (height, step) = layout(manager);

    // 把 Bass 的区域拖进 Lead 的中间，Lead 的区域被一分为二
    gesture(manager, (450.0, height * 1.5), (850.0, height * 0.5), Modifiers::NONE)?;
    dump(manager, "move into lead");

    // 按住 alt 复制，再加 shift 得到镜像副本
    let copy = Modifiers {
        alt: true,
        ..Modifiers::NONE
    };
    let mirrored = Modifiers {
        alt: true,
        shift: true,
        ..Modifiers::NONE
    };
    gesture(manager, (850.0, height * 0.5), (850.0 + 4.0 * step, height * 1.5), copy)?;
    gesture(manager, (850.0 + 4.0 * step, height * 1.5), (850.0 + 8.0 * step, height * 1.5), mirrored)?;
    dump(manager, "copies");

    // 音符区域不能拖到音频音轨上
    match gesture(manager, (850.0 + 8.0 * step, height * 1.5), (850.0 + 8.0 * step, height * 2.5), Modifiers::NONE) {
        Err(EditError::TrackKindMismatch { .. }) => log::info!("move onto the audio track was rejected"),
        other => other?,
    }

    // 左边缘裁剪
    gesture(manager, (1.0, height * 0.5), (step, height * 0.5), Modifiers::NONE)?;
    dump(manager, "trim start");

    manager.execute_command(EditCommand::Undo)?;
    dump(manager, "undo");

    let events = manager.take_events();
    log::info!("{} event(s) emitted", events.len());
    Ok(())
}

/// 轨道高度与一拍的像素宽度
fn layout(manager: &TracksManager) -> (f32, f32) {
    let height = manager.options().default_track_height;
    let step = manager.timeline().zoom_x;
    (height, step)
}

fn gesture(manager: &mut TracksManager, from: (f32, f32), to: (f32, f32), modifiers: Modifiers) -> Result<(), EditError> {
    manager.execute_command(EditCommand::DeselectAll)?;
    manager.pointer_down(&PointerEvent::new(from.0, from.1))?;
    if !manager.is_active() {
        log::info!("nothing captured at {:?}", from);
        return Ok(());
    }
    manager.update(&PointerEvent::new(to.0, to.1).with_modifiers(modifiers))?;
    let approval = manager.approve()?;
    log::info!("gesture committed: {}", approval.committed);
    Ok(())
}

fn dump(manager: &TracksManager, title: &str) {
    log::info!("== {} ==", title);
    for track in manager.arrangement().tracks() {
        let regions: Vec<String> = track
            .regions
            .iter()
            .map(|r| {
                format!(
                    "[{} .. {}{}]",
                    format_pulses(r.position),
                    format_pulses(r.complete()),
                    if r.is_mirrored() { " mirrored" } else { "" }
                )
            })
            .collect();
        log::info!("{:<8} {}", track.name, regions.join(" "));
    }
    match serde_json::to_string(manager.arrangement()) {
        Ok(json) => log::debug!("{}", json),
        Err(err) => log::error!("Failed to serialize arrangement: {}", err),
    }
}
