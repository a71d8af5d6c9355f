use eframe::egui;

use crate::client::state::AppState;
use crate::client::sync::NetworkStatus;
use crate::client::timer::TimerState;
use crate::shared::BreakKind;

pub mod colors {
    use eframe::egui::Color32;

    pub const TOP_BAR_BG: Color32 = Color32::from_rgb(32, 41, 56);
    pub const TEXT_LIGHT: Color32 = Color32::from_rgb(236, 240, 245);
    pub const ONLINE: Color32 = Color32::from_rgb(40, 167, 69);
    pub const LIMITED: Color32 = Color32::from_rgb(255, 193, 7);
    pub const OFFLINE: Color32 = Color32::from_rgb(220, 53, 69);
}

fn format_secs(secs: i64) -> String {
    let secs = secs.max(0);
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

pub fn render_top_bar(ctx: &egui::Context, state: &mut AppState) {
    let frame_style = egui::Frame::default()
        .fill(colors::TOP_BAR_BG)
        .inner_margin(egui::Margin::symmetric(12, 8));

    egui::TopBottomPanel::top("top_panel")
        .frame(frame_style)
        .show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.colored_label(colors::TEXT_LIGHT, egui::RichText::new("Field Ops").size(18.0).strong());

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    ui.add_space(16.0);

                    let (color, label) = match state.sync_state.network_status {
                        NetworkStatus::Online => (colors::ONLINE, "Online"),
                        NetworkStatus::Limited => (colors::LIMITED, "Server unreachable"),
                        NetworkStatus::Offline => (colors::OFFLINE, "Offline"),
                    };
                    ui.colored_label(color, label);

                    let online = state.sync_state.network_status != NetworkStatus::Offline;
                    if ui.button(if online { "Go offline" } else { "Go online" }).clicked() {
                        state.set_online(!online);
                    }

                    ui.add_space(16.0);
                    let pending = state.sync_state.counts.pending;
                    if pending > 0 {
                        ui.colored_label(colors::LIMITED, format!("{pending} pending"));
                    }
                    if ui.add_enabled(state.is_ready(), egui::Button::new("Sync now")).clicked() {
                        state.sync_now();
                    }

                    if !state.sync_state.durable {
                        ui.colored_label(colors::OFFLINE, "Storage unavailable: data is kept in memory only");
                    }
                });
            });
        });
}

pub fn render_main_panel(ctx: &egui::Context, state: &mut AppState) {
    egui::SidePanel::left("jobs_panel")
        .resizable(true)
        .default_width(260.0)
        .show(ctx, |ui| render_jobs(ui, state));

    egui::TopBottomPanel::bottom("problems_panel")
        .resizable(true)
        .show(ctx, |ui| render_problems(ui, state));

    egui::CentralPanel::default().show(ctx, |ui| {
        if !state.is_ready() {
            ui.vertical_centered(|ui| {
                ui.add_space(40.0);
                ui.spinner();
                ui.label("Opening local store...");
            });
        } else {
            render_timer(ui, state);
            ui.separator();
            render_parts(ui, state);
        }

        if let Some((is_error, message)) = &state.status_message {
            ui.separator();
            if *is_error {
                ui.colored_label(colors::OFFLINE, message);
            } else {
                ui.label(message);
            }
        }
    });
}

fn render_jobs(ui: &mut egui::Ui, state: &mut AppState) {
    ui.horizontal(|ui| {
        ui.heading("Jobs");
        if ui.small_button("Refresh").clicked() {
            state.load_jobs();
        }
    });
    ui.separator();

    egui::ScrollArea::vertical().show(ui, |ui| {
        if state.jobs.is_empty() {
            ui.label("No jobs assigned");
        }
        let mut selected = None;
        for job in &state.jobs {
            let is_selected = state.selected_job.as_deref() == Some(job.id.as_str());
            let mut text = format!("{}\n{}", job.id, job.title);
            if let Some(vehicle) = &job.vehicle {
                text.push_str(&format!(" ({vehicle})"));
            }
            if ui.selectable_label(is_selected, text).clicked() {
                selected = Some(job.id.clone());
            }
        }
        if selected.is_some() {
            state.selected_job = selected;
        }
    });
}

fn render_timer(ui: &mut egui::Ui, state: &mut AppState) {
    let timer = state.timer.clone();

    ui.heading("Time");
    ui.horizontal(|ui| {
        ui.label(format!("State: {}", timer.state));
        if let Some(job_id) = &timer.job_id {
            ui.label(format!("Job: {job_id}"));
        }
    });
    ui.horizontal(|ui| {
        ui.label(egui::RichText::new(format_secs(timer.work_secs)).size(28.0).strong());
        ui.label(format!("elapsed {}", format_secs(timer.elapsed_secs)));
        ui.label(format!("breaks {}", format_secs(timer.break_secs)));
    });
    if let Some(current) = &timer.current_break {
        ui.label(format!("On {:?} break since {}", current.kind, current.started_at.format("%H:%M")));
    }

    ui.horizontal(|ui| {
        let can_start = timer.state == TimerState::Stopped && state.selected_job.is_some();
        if ui.add_enabled(can_start, egui::Button::new("Start")).clicked() {
            state.start_timer();
        }
        if ui.add_enabled(timer.state == TimerState::Running, egui::Button::new("Pause")).clicked() {
            state.pause_timer();
        }
        if ui.add_enabled(timer.state == TimerState::Paused, egui::Button::new("Resume")).clicked() {
            state.resume_timer();
        }
        if ui.add_enabled(timer.state == TimerState::OnBreak, egui::Button::new("End break")).clicked() {
            state.end_break();
        }
        if ui.add_enabled(timer.state != TimerState::Stopped, egui::Button::new("Stop")).clicked() {
            state.stop_timer();
        }
    });

    if timer.state == TimerState::Running {
        ui.horizontal(|ui| {
            egui::ComboBox::from_id_salt("break_kind")
                .selected_text(format!("{:?}", state.break_kind))
                .show_ui(ui, |ui| {
                    for kind in [BreakKind::Rest, BreakKind::Lunch, BreakKind::Prayer, BreakKind::Other] {
                        ui.selectable_value(&mut state.break_kind, kind, format!("{kind:?}"));
                    }
                });
            ui.add(egui::TextEdit::singleline(&mut state.break_reason_input).hint_text("Reason (optional)"));
            if ui.button("Start break").clicked() {
                state.start_break();
            }
        });
    }

    ui.collapsing("Manual entry", |ui| {
        ui.horizontal(|ui| {
            ui.add(egui::TextEdit::singleline(&mut state.manual_minutes_input).hint_text("Minutes").desired_width(70.0));
            ui.add(egui::TextEdit::singleline(&mut state.manual_reason_input).hint_text("Reason"));
            if ui.button("Add").clicked() {
                state.manual_entry();
            }
        });
    });
}

fn render_parts(ui: &mut egui::Ui, state: &mut AppState) {
    ui.heading("Parts");
    ui.horizontal(|ui| {
        ui.add(egui::TextEdit::singleline(&mut state.part_code_input).hint_text("Part code or barcode"));
        ui.add(egui::TextEdit::singleline(&mut state.part_quantity_input).hint_text("Qty").desired_width(50.0));
        ui.add(egui::TextEdit::singleline(&mut state.part_notes_input).hint_text("Notes"));
        let enabled = state.selected_job.is_some() && !state.part_code_input.trim().is_empty();
        if ui.add_enabled(enabled, egui::Button::new("Record")).clicked() {
            state.record_part();
        }
    });
}

fn render_problems(ui: &mut egui::Ui, state: &mut AppState) {
    let counts = state.sync_state.counts;
    ui.horizontal(|ui| {
        ui.strong("Sync");
        ui.label(format!(
            "{} pending, {} failed, {} rejected",
            counts.pending, counts.exhausted, counts.rejected
        ));
        if let Some(last) = state.sync_state.last_sync {
            ui.label(format!("last sync {}", last.format("%Y-%m-%d %H:%M")));
        }
    });

    let problems = state.sync_state.problems.clone();
    egui::ScrollArea::vertical().max_height(160.0).show(ui, |ui| {
        for item in problems {
            ui.horizontal(|ui| {
                ui.colored_label(colors::OFFLINE, format!("{} {}", item.payload_type, item.state.as_str()));
                ui.label(item.last_error.as_deref().unwrap_or("unknown error"));
                if ui.small_button("Retry").clicked() {
                    state.retry_item(item.id);
                }
                if ui.small_button("Dismiss").clicked() {
                    state.acknowledge_item(item.id);
                }
            });
        }
    });
}
