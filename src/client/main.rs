//! Field client desktop shell
//!
//! Owns the tokio runtime the client runs on and draws it with egui.

use eframe::egui;
use fieldops::client::state::AppState;
use fieldops::client::{views, Config};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fieldops=info")))
        .init();

    let config = Config::load()?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("fieldops-worker")
        .build()?;

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1100.0, 720.0])
            .with_min_inner_size([720.0, 480.0]),
        ..Default::default()
    };
    let handle = runtime.handle().clone();
    eframe::run_native(
        "Field Ops",
        options,
        Box::new(move |_cc| Ok(Box::new(FieldApp::new(AppState::new(handle, config))))),
    )?;

    runtime.shutdown_timeout(std::time::Duration::from_secs(2));
    Ok(())
}

struct FieldApp {
    state: AppState,
}

impl FieldApp {
    fn new(state: AppState) -> Self {
        Self { state }
    }
}

impl eframe::App for FieldApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.state.poll();

        views::render_top_bar(ctx, &mut self.state);
        views::render_main_panel(ctx, &mut self.state);

        ctx.request_repaint_after(std::time::Duration::from_millis(250));
    }
}
