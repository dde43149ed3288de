#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod ui;

use anyhow::Result;
use gpui::Application;
use handpose_overlay::{AppConfig, build_processor, camera::NokhwaCamera};

fn main() -> Result<()> {
    env_logger::init();

    let config = AppConfig::from_env();
    log::info!(
        "starting with {:?} processor, model at {}",
        config.processor,
        config.model_path.display()
    );

    Application::new()
        .with_assets(gpui_component_assets::Assets)
        .run(move |app| {
            gpui_component::init(app);

            let camera = NokhwaCamera::new(config.camera_index);
            let processor = build_processor(&config);
            if let Err(err) = ui::launch_ui(app, camera, processor, config.clone()) {
                log::error!("failed to launch ui: {err:?}");
            }
        });

    Ok(())
}
