use super::{
    ActiveTheme, ActivityState, AnyElement, AppView, Button, ButtonVariants, CAMERA_VIEW_WIDTH,
    Context, DEFAULT_CAMERA_RATIO, FEATURES, IntoElement, ObjectFit, ParentElement, SharedString,
    Styled, StyledExt, StyledImage, Tag, div, h_flex, img, px, v_flex,
};

impl AppView {
    pub(super) fn render_main(&mut self, cx: &mut Context<'_, Self>) -> AnyElement {
        let theme = cx.theme();
        let state = self.controller.state();

        let camera_height = self
            .controller
            .native_resolution()
            .filter(|r| !r.is_empty())
            .map(|r| CAMERA_VIEW_WIDTH * r.height as f32 / r.width as f32)
            .unwrap_or(CAMERA_VIEW_WIDTH / DEFAULT_CAMERA_RATIO);

        let frame_view: AnyElement = match &self.latest_image {
            Some(image) if state == ActivityState::Active => img(image.clone())
                .size_full()
                .object_fit(ObjectFit::Contain)
                .rounded_t_lg()
                .into_any_element(),
            _ => div()
                .size_full()
                .flex()
                .items_center()
                .justify_center()
                .text_sm()
                .text_color(theme.muted_foreground)
                .rounded_t_lg()
                .child(if state == ActivityState::Error {
                    "Camera unavailable"
                } else {
                    "Press Start to open the camera"
                })
                .into_any_element(),
        };

        let camera_shell = div()
            .relative()
            .w(px(CAMERA_VIEW_WIDTH))
            .h(px(camera_height))
            .overflow_hidden()
            .rounded_t_lg()
            .bg(gpui::rgb(0x000000))
            .child(frame_view);

        // start() returns before the next frame is drawn, so Starting never renders.
        let (state_icon, state_color) = match state {
            ActivityState::Active => ("●", theme.success),
            ActivityState::Error => ("✗", theme.accent),
            ActivityState::Idle | ActivityState::Starting => ("○", theme.muted_foreground),
        };

        let toggle = if state == ActivityState::Active {
            Button::new(SharedString::from("capture-toggle"))
                .outline()
                .label("Stop")
        } else {
            Button::new(SharedString::from("capture-toggle"))
                .primary()
                .label("Start")
        };

        let controls = h_flex()
            .justify_between()
            .items_center()
            .gap_2()
            .child(toggle.on_click(cx.listener(|this, _, window, cx| {
                this.toggle_capture(window, cx);
                cx.notify();
            })))
            .child(
                div()
                    .text_sm()
                    .text_color(state_color)
                    .child(format!(
                        "{state_icon} {} ({})",
                        state.label(),
                        self.controller.processor_label()
                    )),
            )
            .child(
                div()
                    .text_sm()
                    .font_semibold()
                    .text_color(theme.foreground)
                    .child(format!("Hands: {}", self.controller.hand_count())),
            );

        let mut camera_card = v_flex()
            .w(px(CAMERA_VIEW_WIDTH))
            .rounded_lg()
            .overflow_hidden()
            .bg(gpui::rgb(0x0f1419))
            .child(camera_shell)
            .child(v_flex().gap_2().p_3().child(controls));

        if let Some(message) = self.controller.error_message() {
            camera_card = camera_card.child(
                div()
                    .p_3()
                    .child(Tag::danger().rounded_full().child(message.to_string())),
            );
        }

        let features = FEATURES.iter().fold(v_flex().gap_1(), |list, feature| {
            list.child(
                div()
                    .text_xs()
                    .text_color(gpui::rgb(0xa0aab8))
                    .child(format!("• {feature}")),
            )
        });

        v_flex()
            .size_full()
            .gap_3()
            .p_4()
            .items_center()
            .bg(gpui::rgb(0x1a2332))
            .child(
                div()
                    .text_lg()
                    .font_semibold()
                    .text_color(gpui::rgb(0xe2e8f0))
                    .child("Hand Tracking"),
            )
            .child(camera_card)
            .child(features)
            .into_any_element()
    }
}
