// 截屏工具 - 即时模式GUI的多帧截屏、长窗口拼接与视频录制

// 声明模块
pub mod capture;
pub mod logger;
pub mod models;
pub mod scene;
pub mod settings;
pub mod utils;
pub mod video;

use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub use capture::{
    CaptureContext, CaptureStage, CaptureTool, GuiHost, ImageBuffer, InputOverride, ScreenReader,
};
pub use models::{CaptureArgs, CaptureFlags, CaptureStatus, Rect, Vec2, WindowId};
pub use scene::SoftwareScene;
pub use settings::SettingsManager;
pub use video::{FfmpegSink, FrameSink, MemorySink, VideoParams};

/// 演示视频时长（秒）
const DEMO_VIDEO_SECONDS: f64 = 2.0;

/// 演示程序入口
///
/// 在内存场景上依次完成：拼接截取长窗口、截取两个窗口、（ffmpeg 可用时）录制一段视频。
pub async fn run(config_path: PathBuf) -> Result<()> {
    let settings_manager = SettingsManager::new(config_path).await?;
    let mut settings = settings_manager.get().await;
    let _log_guard = logger::init(&utils::get_log_dir())?;

    // 每次运行输出到独立的子目录
    let session = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
    settings.output_dir = settings.output_dir.join(session);
    info!("输出目录: {:?}", settings.output_dir);

    let ffmpeg_available = video::ffmpeg_helper::check_ffmpeg_available(settings.ffmpeg_path.clone()).await;

    let mut scene = demo_scene();
    scene.render();

    let context = CaptureContext::new().with_screen_reader(scene.screen_reader());
    let mut tool = CaptureTool::new(context, settings.clone());

    // 长窗口拼接
    let log_window = find_window(&scene, "Log");
    if let Some(id) = log_window {
        tool.select_window(id, true);
        tool.gather_targets(&scene);
        tool.args_mut().flags |= CaptureFlags::STITCH_ALL;
        tool.start_capture()?;
        let status = run_until_done(&mut tool, &mut scene, 1.0 / 60.0);
        report("拼接截屏", status, tool.last_output());
        tool.args_mut().flags.remove(CaptureFlags::STITCH_ALL);
        tool.select_window(id, false);
    }

    // 多窗口截屏
    for name in ["Demo", "Inspector"] {
        if let Some(id) = find_window(&scene, name) {
            tool.select_window(id, true);
        }
    }
    tool.gather_targets(&scene);
    tool.start_capture()?;
    let status = run_until_done(&mut tool, &mut scene, 1.0 / 60.0);
    report("多窗口截屏", status, tool.last_output());

    if !ffmpeg_available {
        warn!("未找到FFmpeg，跳过视频录制");
        return Ok(());
    }

    // 视频录制：移动窗口制造画面变化
    let ffmpeg_path = video::ffmpeg_helper::get_ffmpeg_path(settings.ffmpeg_path.as_deref())?;
    tool.context_mut().set_frame_sink(FfmpegSink::new(ffmpeg_path));
    tool.start_video()?;

    let dt = 1.0 / settings.video_fps as f64;
    let mut elapsed = 0.0;
    let status = loop {
        if elapsed >= DEMO_VIDEO_SECONDS {
            tool.stop_video();
        }
        if let Some(window) = find_window(&scene, "Demo").and_then(|id| scene.scene_window_mut(id)) {
            window.pos.x = 40.0 + (elapsed * 60.0) as f32 % 200.0;
        }

        scene.begin_frame(dt);
        tool.post_new_frame(&mut scene);
        let status = tool.update(&mut scene);
        scene.render();
        elapsed += dt;
        match status {
            Some(status) if status.is_terminal() => break status,
            Some(_) => {}
            None => break CaptureStatus::Error,
        }
    };
    report("视频录制", status, tool.last_output());

    Ok(())
}

fn demo_scene() -> SoftwareScene {
    let mut scene = SoftwareScene::new(640, 360);
    scene.add_window("Demo", Vec2::new(40.0, 40.0), Vec2::new(240.0, 160.0));
    scene.add_window("Inspector", Vec2::new(320.0, 60.0), Vec2::new(200.0, 120.0));
    let log = scene.add_window("Log", Vec2::new(80.0, 220.0), Vec2::new(300.0, 120.0));
    if let Some(window) = scene.scene_window_mut(log) {
        window.content_full_height = 900.0;
    }
    scene
}

fn find_window(scene: &SoftwareScene, name: &str) -> Option<WindowId> {
    scene
        .windows()
        .into_iter()
        .find(|w| w.name == name)
        .map(|w| w.id)
}

fn run_until_done(tool: &mut CaptureTool, scene: &mut SoftwareScene, dt: f64) -> CaptureStatus {
    loop {
        scene.begin_frame(dt);
        tool.post_new_frame(scene);
        let status = tool.update(scene);
        scene.render();
        match status {
            Some(status) if status.is_terminal() => return status,
            Some(_) => {}
            None => return CaptureStatus::Error,
        }
    }
}

fn report(what: &str, status: CaptureStatus, output: Option<&Path>) {
    match status {
        CaptureStatus::Done => info!("{}完成: {:?}", what, output),
        _ => warn!("{}失败", what),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_demo_scene_stitch_capture() {
        let temp_dir = tempdir().unwrap();
        let mut scene = demo_scene();
        scene.render();

        let settings = models::CaptureToolSettings {
            output_dir: temp_dir.path().to_path_buf(),
            ..Default::default()
        };
        let context = CaptureContext::new().with_screen_reader(scene.screen_reader());
        let mut tool = CaptureTool::new(context, settings);

        let id = find_window(&scene, "Log").unwrap();
        tool.select_window(id, true);
        tool.gather_targets(&scene);
        tool.args_mut().flags |= CaptureFlags::STITCH_ALL;
        tool.start_capture().unwrap();

        assert_eq!(run_until_done(&mut tool, &mut scene, 1.0 / 60.0), CaptureStatus::Done);
        let image = ImageBuffer::load(tool.last_output().unwrap()).unwrap();
        assert_eq!((image.width, image.height), (320, 920));
        assert_eq!(scene.window(id).unwrap().pos, Vec2::new(80.0, 220.0));
    }
}
