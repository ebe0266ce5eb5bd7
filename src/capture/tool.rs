// 截屏工具 - 在截屏上下文之上管理目标窗口选择、输出文件命名和录制开关

use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use super::{CaptureContext, GuiHost};
use crate::models::{
    CaptureArgs, CaptureFlags, CaptureStatus, CaptureToolSettings, Rect, WindowFlags, WindowId,
};
use crate::utils::{create_parent_dirs, open_folder_in_explorer, open_in_shell};

/// 无界面的截屏工具
///
/// 宿主每帧调用 `post_new_frame` 和 `update`，其余方法对应用户操作。
pub struct CaptureTool {
    context: CaptureContext,
    settings: CaptureToolSettings,
    args: CaptureArgs,
    selected_windows: Vec<WindowId>,
    is_capturing: bool,
    cancel_requested: bool,
    file_counter: u32,
    last_output: Option<PathBuf>,
}

impl CaptureTool {
    pub fn new(context: CaptureContext, settings: CaptureToolSettings) -> Self {
        let args = CaptureArgs::from_settings(&settings);

        Self {
            context,
            settings,
            args,
            selected_windows: Vec::new(),
            is_capturing: false,
            cancel_requested: false,
            file_counter: 0,
            last_output: None,
        }
    }

    pub fn context(&self) -> &CaptureContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut CaptureContext {
        &mut self.context
    }

    pub fn settings(&self) -> &CaptureToolSettings {
        &self.settings
    }

    pub fn args(&self) -> &CaptureArgs {
        &self.args
    }

    pub fn args_mut(&mut self) -> &mut CaptureArgs {
        &mut self.args
    }

    pub fn is_capturing(&self) -> bool {
        self.is_capturing
    }

    pub fn selected_windows(&self) -> &[WindowId] {
        &self.selected_windows
    }

    pub fn select_window(&mut self, id: WindowId, selected: bool) {
        if selected {
            if !self.selected_windows.contains(&id) {
                self.selected_windows.push(id);
            }
        } else {
            self.selected_windows.retain(|w| *w != id);
        }
    }

    /// 根据已选窗口重新收集截取目标，返回目标数量
    ///
    /// 截屏进行中不修改目标。
    pub fn gather_targets(&mut self, host: &dyn GuiHost) -> usize {
        if self.is_capturing {
            return self.args.windows.len();
        }

        let include_popups = self.args.flags.contains(CaptureFlags::INCLUDE_TOOLTIPS_AND_POPUPS);
        self.args.windows = host
            .windows()
            .iter()
            .filter(|w| w.active && !w.flags.contains(WindowFlags::CHILD))
            .filter(|w| {
                if w.is_popup_or_tooltip() {
                    include_popups
                } else {
                    self.selected_windows.contains(&w.id)
                }
            })
            .map(|w| w.id)
            .collect();

        self.args.windows.len()
    }

    /// 截取目标在屏幕上的范围（含留白，裁剪到视口），用于宿主绘制预览框
    pub fn target_preview_rect(&self, host: &dyn GuiHost) -> Option<Rect> {
        let mut rect = Rect::INVERTED;
        for id in &self.args.windows {
            if let Some(window) = host.window(*id) {
                rect.add_rect(window.rect());
            }
        }
        if rect.is_inverted() {
            return None;
        }

        rect.expand(self.args.padding);
        rect.clip_with(host.viewport_rect());
        Some(rect)
    }

    /// 是否可以开始截屏
    pub fn can_capture(&self) -> bool {
        self.context.has_screen_reader()
            && (!self.args.windows.is_empty() || self.args.is_capturing_explicit_rect())
            && !self.settings.output_dir.as_os_str().is_empty()
    }

    /// 下一次截屏的输出文件
    pub fn next_output_path(&self) -> PathBuf {
        self.settings.output_dir.join(format!(
            "{}_{:04}.png",
            self.settings.file_prefix,
            self.file_counter + 1
        ))
    }

    /// 开始截取静态图片
    pub fn start_capture(&mut self) -> Result<PathBuf> {
        self.ensure_ready()?;

        let path = self.next_output_path();
        self.prepare_output(&path)?;

        info!("开始截屏: {} 个窗口 -> {:?}", self.args.windows.len(), path);
        self.args.output_buffer = None;
        self.args.output_file = Some(path.clone());
        self.is_capturing = true;
        Ok(path)
    }

    /// 开始录制视频，输出文件使用配置的视频扩展名
    pub fn start_video(&mut self) -> Result<PathBuf> {
        self.ensure_ready()?;

        let path = with_extension(&self.next_output_path(), &self.settings.video_ext);
        self.prepare_output(&path)?;

        self.args.output_buffer = None;
        self.args.output_file = Some(path.clone());
        self.args.flags.remove(CaptureFlags::STITCH_ALL);
        self.context.begin_video_capture(&self.args);
        self.is_capturing = true;
        Ok(path)
    }

    pub fn stop_video(&mut self) {
        if self.context.is_capturing_video() {
            self.context.end_video_capture();
        }
    }

    /// 取消请求（例如按下 Esc），下一次 `update` 时结束录制
    pub fn request_cancel(&mut self) {
        self.cancel_requested = true;
    }

    pub fn post_new_frame(&mut self, host: &mut dyn GuiHost) {
        self.context.post_new_frame(host);
    }

    /// 推进进行中的截屏，空闲时返回 None
    pub fn update(&mut self, host: &mut dyn GuiHost) -> Option<CaptureStatus> {
        if !self.is_capturing {
            self.cancel_requested = false;
            return None;
        }

        // 拼接只支持单窗口静态截图
        if self.context.is_capturing_video() || self.args.windows.len() > 1 {
            self.args.flags.remove(CaptureFlags::STITCH_ALL);
        }

        if std::mem::take(&mut self.cancel_requested) && self.context.is_capturing_video() {
            info!("取消录制");
            self.context.end_video_capture();
        }

        let status = self.context.capture_update(&mut self.args, host);
        if status.is_terminal() {
            if status == CaptureStatus::Done {
                self.last_output = self.args.output_file.clone();
            } else {
                warn!("截屏失败: {:?}", self.args.output_file);
            }
            self.is_capturing = false;
            self.file_counter += 1;
        }
        Some(status)
    }

    pub fn last_output(&self) -> Option<&Path> {
        self.last_output.as_deref()
    }

    /// 用系统默认程序打开最近一次的输出
    pub fn open_last_output(&self) -> Result<(), String> {
        match self.last_output() {
            Some(path) => open_in_shell(path),
            None => Err("还没有截屏输出".to_string()),
        }
    }

    pub fn open_output_dir(&self) -> Result<(), String> {
        open_folder_in_explorer(&self.settings.output_dir)
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.is_capturing {
            return Err(anyhow!("已有截屏在进行中"));
        }
        if !self.can_capture() {
            return Err(anyhow!("无法截屏：未设置截屏函数、没有目标或没有输出目录"));
        }
        Ok(())
    }

    fn prepare_output(&mut self, path: &Path) -> Result<()> {
        if let Err(e) = create_parent_dirs(path) {
            error!("{}", e);
            self.is_capturing = false;
            return Err(anyhow!(e));
        }
        Ok(())
    }
}

/// 替换扩展名，`ext` 可以带点也可以不带
fn with_extension(path: &Path, ext: &str) -> PathBuf {
    path.with_extension(ext.trim_start_matches('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::ImageBuffer;
    use crate::models::Vec2;
    use crate::scene::SoftwareScene;
    use crate::video::MemorySink;
    use std::cell::RefCell;
    use std::rc::Rc;
    use tempfile::tempdir;

    fn tool_for(scene: &SoftwareScene, output_dir: PathBuf) -> CaptureTool {
        let settings = CaptureToolSettings {
            output_dir,
            padding: 4.0,
            ..Default::default()
        };
        CaptureTool::new(CaptureContext::new().with_screen_reader(scene.screen_reader()), settings)
    }

    fn run(tool: &mut CaptureTool, scene: &mut SoftwareScene) -> CaptureStatus {
        for _ in 0..200 {
            scene.begin_frame(0.05);
            tool.post_new_frame(scene);
            let status = tool.update(scene);
            scene.render();
            if let Some(status) = status {
                if status.is_terminal() {
                    return status;
                }
            }
        }
        panic!("截屏没有结束");
    }

    #[test]
    fn test_new_takes_request_defaults_from_settings() {
        let scene = SoftwareScene::new(100, 100);
        let settings = CaptureToolSettings {
            padding: 6.0,
            video_fps: 50,
            video_quality: 28,
            default_flags: CaptureFlags::HIDE_MOUSE_CURSOR,
            ..Default::default()
        };
        let first = CaptureTool::new(CaptureContext::new(), settings.clone());
        let second = CaptureTool::new(
            CaptureContext::new().with_screen_reader(scene.screen_reader()),
            settings,
        );

        let args = first.args();
        assert_eq!(args.padding, 6.0);
        assert_eq!(args.record_fps_target, 50);
        assert_eq!(args.record_quality, 28);
        assert_eq!(args.flags, CaptureFlags::HIDE_MOUSE_CURSOR);
        assert!(args.windows.is_empty());
        assert!(args.output_file.is_none());
        assert_ne!(args.id(), second.args().id());
    }

    #[test]
    fn test_capture_selected_window_to_png() {
        let temp_dir = tempdir().unwrap();
        let mut scene = SoftwareScene::new(200, 150);
        let id = scene.add_window("A", Vec2::new(40.0, 30.0), Vec2::new(60.0, 50.0));
        scene.render();

        let mut tool = tool_for(&scene, temp_dir.path().join("captures"));
        assert!(!tool.can_capture());
        tool.select_window(id, true);
        assert_eq!(tool.gather_targets(&scene), 1);
        assert!(tool.can_capture());

        let path = tool.start_capture().unwrap();
        assert!(path.ends_with("capture_0001.png"));
        assert!(tool.start_capture().is_err());

        assert_eq!(run(&mut tool, &mut scene), CaptureStatus::Done);
        assert!(!tool.is_capturing());
        assert_eq!(tool.last_output(), Some(path.as_path()));
        assert!(tool.next_output_path().ends_with("capture_0002.png"));

        let image = ImageBuffer::load(&path).unwrap();
        assert_eq!((image.width, image.height), (68, 58));
        assert_eq!(tool.update(&mut scene), None);
    }

    #[test]
    fn test_directory_failure_aborts_start() {
        let temp_dir = tempdir().unwrap();
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();

        let mut scene = SoftwareScene::new(200, 150);
        let id = scene.add_window("A", Vec2::new(40.0, 30.0), Vec2::new(60.0, 50.0));
        let mut tool = tool_for(&scene, blocker.join("captures"));
        tool.select_window(id, true);
        tool.gather_targets(&scene);

        assert!(tool.start_capture().is_err());
        assert!(!tool.is_capturing());
        assert!(tool.start_video().is_err());
        assert!(!tool.context().is_capturing_video());
        assert!(!tool.context().is_capturing());
        assert_eq!(tool.update(&mut scene), None);
    }

    #[test]
    fn test_stitch_cleared_for_multiple_windows() {
        let temp_dir = tempdir().unwrap();
        let mut scene = SoftwareScene::new(200, 150);
        let a = scene.add_window("A", Vec2::new(10.0, 10.0), Vec2::new(50.0, 40.0));
        let b = scene.add_window("B", Vec2::new(80.0, 20.0), Vec2::new(50.0, 40.0));
        scene.render();

        let mut tool = tool_for(&scene, temp_dir.path().to_path_buf());
        tool.args_mut().flags = CaptureFlags::STITCH_ALL;
        tool.select_window(a, true);
        tool.select_window(b, true);
        tool.gather_targets(&scene);
        tool.start_capture().unwrap();

        assert_eq!(tool.update(&mut scene), Some(CaptureStatus::InProgress));
        assert!(!tool.args().flags.contains(CaptureFlags::STITCH_ALL));
        assert_eq!(run(&mut tool, &mut scene), CaptureStatus::Done);
    }

    #[test]
    fn test_video_uses_configured_extension_and_cancel() {
        let temp_dir = tempdir().unwrap();
        let mut scene = SoftwareScene::new(200, 150);
        let id = scene.add_window("A", Vec2::new(10.0, 10.0), Vec2::new(50.0, 40.0));
        scene.render();

        let sink = Rc::new(RefCell::new(MemorySink::new()));
        let mut tool = tool_for(&scene, temp_dir.path().to_path_buf());
        tool.context_mut().set_frame_sink(Rc::clone(&sink));
        tool.select_window(id, true);
        tool.gather_targets(&scene);

        let path = tool.start_video().unwrap();
        assert_eq!(path.extension().unwrap(), "mp4");
        assert!(tool.context().is_capturing_video());

        for _ in 0..8 {
            scene.begin_frame(0.05);
            assert_eq!(tool.update(&mut scene), Some(CaptureStatus::InProgress));
            scene.render();
        }
        assert_eq!(sink.borrow().frames().len(), 5);

        tool.request_cancel();
        assert_eq!(run(&mut tool, &mut scene), CaptureStatus::Done);
        assert_eq!(tool.last_output(), Some(path.as_path()));

        let sink = sink.borrow();
        assert_eq!(sink.finished_sessions().len(), 1);
        assert_eq!(sink.finished_sessions()[0].0.output_path, path);
    }

    #[test]
    fn test_gather_targets_filters_children_and_popups() {
        let mut scene = SoftwareScene::new(200, 150);
        let a = scene.add_window("A", Vec2::new(10.0, 10.0), Vec2::new(50.0, 40.0));
        let child = scene.add_window_with_flags(
            "Child",
            Vec2::new(12.0, 12.0),
            Vec2::new(10.0, 10.0),
            WindowFlags::CHILD,
            Some(a),
        );
        let tooltip = scene.add_window_with_flags(
            "Tooltip",
            Vec2::new(100.0, 100.0),
            Vec2::new(20.0, 10.0),
            WindowFlags::TOOLTIP,
            None,
        );

        let temp_dir = tempdir().unwrap();
        let mut tool = tool_for(&scene, temp_dir.path().to_path_buf());
        tool.select_window(a, true);
        tool.select_window(child, true);
        tool.gather_targets(&scene);
        assert_eq!(tool.args().windows, vec![a]);

        tool.args_mut().flags = CaptureFlags::INCLUDE_TOOLTIPS_AND_POPUPS;
        tool.gather_targets(&scene);
        assert_eq!(tool.args().windows, vec![a, tooltip]);

        let preview = tool.target_preview_rect(&scene).unwrap();
        assert_eq!(preview, Rect::new(Vec2::new(6.0, 6.0), Vec2::new(124.0, 114.0)));
    }

    #[test]
    fn test_with_extension() {
        assert_eq!(
            with_extension(Path::new("out/capture_0001.png"), ".gif"),
            PathBuf::from("out/capture_0001.gif")
        );
        assert_eq!(
            with_extension(Path::new("capture_0001.png"), "mp4"),
            PathBuf::from("capture_0001.mp4")
        );
    }
}
