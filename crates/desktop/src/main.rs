//! ThinkChat Desktop: application entry.

mod app;
mod live;

use eframe::egui;

fn main() -> eframe::Result<()> {
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start async runtime: {}", e);
            std::process::exit(1);
        }
    };

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([960.0, 760.0])
            .with_min_inner_size([640.0, 480.0]),
        ..Default::default()
    };
    eframe::run_native(
        "ThinkChat",
        options,
        Box::new(move |cc| Box::new(app::ThinkChatApp::new(cc, runtime))),
    )
}
