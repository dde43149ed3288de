use std::{sync::Arc, time::Instant};

use gpui::{
    AnyElement, App, AppContext, Context, IntoElement, ObjectFit, ParentElement, Render,
    RenderImage, SharedString, Styled, StyledImage, TitlebarOptions, Window, WindowOptions, div,
    img, px,
};
use gpui_component::{
    ActiveTheme, Root, StyledExt,
    button::{Button, ButtonVariants},
    h_flex,
    tag::Tag,
    v_flex,
};
use image::{Frame as ImageFrame, ImageBuffer, Rgba};

use handpose_overlay::{
    ActivityState, AppConfig, CaptureController, FrameProcessor, TickOutcome,
    camera::NokhwaCamera,
};

mod main_view;
mod render_util;

const CAMERA_VIEW_WIDTH: f32 = 640.0;
const DEFAULT_CAMERA_RATIO: f32 = 4.0 / 3.0;

const FEATURES: &[&str] = &[
    "21 landmarks per hand with skeletal connections",
    "Up to two hands per frame",
    "Landmarks below 50% confidence are hidden",
    "Camera is released as soon as you press Stop",
];

pub fn launch_ui(
    app: &mut App,
    camera: NokhwaCamera,
    processor: Box<dyn FrameProcessor>,
    config: AppConfig,
) -> gpui::Result<()> {
    let window_options = WindowOptions {
        titlebar: Some(TitlebarOptions {
            title: Some("Hand Tracking".into()),
            ..Default::default()
        }),
        ..Default::default()
    };

    app.open_window(window_options, move |window, app| {
        let view = app.new(|_| AppView::new(CaptureController::new(camera, processor, &config)));
        app.new(|cx| Root::new(view, window, cx))
    })?;

    Ok(())
}

struct AppView {
    controller: CaptureController<NokhwaCamera>,
    latest_image: Option<Arc<RenderImage>>,
}

impl AppView {
    fn new(mut controller: CaptureController<NokhwaCamera>) -> Self {
        controller.set_state_listener(|from, to| {
            log::info!("camera {} -> {}", from.label(), to.label());
        });
        Self {
            controller,
            latest_image: None,
        }
    }

    fn toggle_capture(&mut self, window: &mut Window, cx: &mut Context<'_, Self>) {
        if self.controller.state() == ActivityState::Active {
            self.controller.stop();
            self.clear_latest_image(window, cx);
        } else {
            // Blocks until the camera opens or fails; the banner shows any failure.
            let _ = self.controller.start();
        }
    }

    /// Runs the pending render tick, if any, and refreshes the displayed image.
    fn pump_render_loop(&mut self, window: &mut Window, cx: &mut Context<'_, Self>) {
        match self.controller.on_display_frame(Instant::now()) {
            TickOutcome::Rendered { .. } | TickOutcome::DetectionFailed => {
                if let Some(image) = render_util::surface_to_image(self.controller.surface()) {
                    self.replace_latest_image(image, window, cx);
                }
            }
            TickOutcome::Terminated => self.clear_latest_image(window, cx),
            _ => {}
        }
    }

    fn replace_latest_image(
        &mut self,
        new_image: Arc<RenderImage>,
        window: &mut Window,
        cx: &mut Context<'_, Self>,
    ) {
        if let Some(old_image) = self.latest_image.replace(new_image) {
            // The sprite atlas keeps every frame unless old textures are dropped.
            cx.drop_image(old_image, Some(window));
        }
    }

    fn clear_latest_image(&mut self, window: &mut Window, cx: &mut Context<'_, Self>) {
        if let Some(old_image) = self.latest_image.take() {
            cx.drop_image(old_image, Some(window));
        }
    }
}

impl Render for AppView {
    fn render(&mut self, window: &mut Window, cx: &mut Context<'_, Self>) -> impl IntoElement {
        // Redraw every display frame; each redraw fires the controller's frame clock.
        cx.defer_in(window, |_, _, cx| {
            cx.notify();
        });

        self.pump_render_loop(window, cx);
        self.render_main(cx)
    }
}
