// UI layer: the progress surface a workflow run draws on, its terminal
// rendering with `indicatif`, and the interactive menu built on `dialoguer`.

use crate::api::ApiClient;
use crate::controller::{Controller, Outcome};
use crate::selection::{upload_percent, FileSelection, UploadObserver};
use crate::workflow::Workflow;
use anyhow::{Context, Result};
use dialoguer::{Confirm, Input, Select};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// What a workflow run shows to the user: a status line, a progress bar
/// and a busy spinner.
pub trait ProgressView {
    /// Replace the status text. An empty string clears it.
    fn set_status(&mut self, text: &str);
    /// Move the bar to `pct` percent.
    fn set_bar(&mut self, pct: u8);
    fn show_bar(&mut self);
    fn hide_bar(&mut self);
    fn show_spinner(&mut self);
    fn hide_spinner(&mut self);
    /// Observer fed with upload byte counts while the selection is sent.
    fn upload_observer(&self) -> UploadObserver;
    /// The result was saved locally.
    fn downloaded(&mut self, _path: &Path) {}
}

/// Per-run knobs shared by the menu and the subcommands.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub poll_interval: Duration,
    pub inv_ratio: Option<f32>,
}

/// `ProgressView` drawn on the terminal.
pub struct TerminalView {
    prefix: &'static str,
    bar: Option<ProgressBar>,
    spinner: Option<ProgressBar>,
}

impl TerminalView {
    pub fn new(workflow: Workflow) -> Self {
        Self {
            prefix: workflow.name(),
            bar: None,
            spinner: None,
        }
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::with_template("{prefix:>8} [{bar:40.cyan/blue}] {pos:>3}%")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ")
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
    }
}

impl ProgressView for TerminalView {
    fn set_status(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        // Print above the bars so they are not torn.
        match self.bar.as_ref().or(self.spinner.as_ref()) {
            Some(bar) => bar.println(text),
            None => println!("{text}"),
        }
    }

    fn set_bar(&mut self, pct: u8) {
        if let Some(bar) = &self.bar {
            bar.set_position(u64::from(pct));
        }
    }

    fn show_bar(&mut self) {
        if self.bar.is_none() {
            let bar = ProgressBar::new(100);
            bar.set_style(Self::bar_style());
            bar.set_prefix(self.prefix);
            self.bar = Some(bar);
        }
    }

    fn hide_bar(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }

    fn show_spinner(&mut self) {
        if self.spinner.is_none() {
            let spinner = ProgressBar::new_spinner();
            spinner.set_style(Self::spinner_style());
            spinner.set_message("处理中…");
            spinner.enable_steady_tick(Duration::from_millis(100));
            self.spinner = Some(spinner);
        }
    }

    fn hide_spinner(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }

    fn upload_observer(&self) -> UploadObserver {
        let bar = self.bar.clone();
        Arc::new(move |sent: u64, total: u64| {
            if let (Some(bar), Some(pct)) = (&bar, upload_percent(sent, total)) {
                bar.set_position(u64::from(pct));
            }
        })
    }

    fn downloaded(&mut self, path: &Path) {
        self.set_status(&format!("已保存：{}", path.display()));
    }
}

impl Drop for TerminalView {
    fn drop(&mut self) {
        self.hide_spinner();
        if let Some(bar) = self.bar.take() {
            bar.finish();
        }
    }
}

/// Run one workflow against `folder`. With no folder given the native folder
/// dialog is opened; cancelling it counts as an empty selection.
pub fn run_workflow(
    api: &ApiClient,
    workflow: Workflow,
    folder: Option<&Path>,
    settings: &RunSettings,
) -> Result<Outcome> {
    let folder = match folder {
        Some(folder) => Some(folder.to_path_buf()),
        None => pick_folder(),
    };
    let selection = match &folder {
        Some(folder) => FileSelection::from_folder(folder)
            .with_context(|| format!("Failed to read folder {}", folder.display()))?,
        None => FileSelection::default(),
    };
    Ok(run_selection(api, workflow, &selection, settings))
}

fn run_selection(
    api: &ApiClient,
    workflow: Workflow,
    selection: &FileSelection,
    settings: &RunSettings,
) -> Outcome {
    debug!(%workflow, files = selection.len(), "selection ready");
    let mut controller = Controller::new(workflow, api, TerminalView::new(workflow))
        .with_poll_interval(settings.poll_interval)
        .with_inv_ratio(settings.inv_ratio);
    controller.run(selection)
}

fn pick_folder() -> Option<PathBuf> {
    rfd::FileDialog::new()
        .set_title("选择文件夹")
        .pick_folder()
}

/// Main interactive menu. Loops until the user chooses "Exit".
pub fn main_menu(api: &ApiClient, settings: &RunSettings) -> Result<()> {
    println!("服务地址：{}", api.base_url());
    loop {
        let mut items: Vec<String> = Workflow::ALL
            .iter()
            .map(|w| format!("{} ({})", w.label(), w.name()))
            .collect();
        items.push("退出 (exit)".into());
        let selection = Select::new().items(&items).default(0).interact()?;
        let Some(&workflow) = Workflow::ALL.get(selection) else {
            break;
        };

        let mut settings = settings.clone();
        if workflow == Workflow::Merge && settings.inv_ratio.is_none() {
            let ratio: f32 = Input::new()
                .with_prompt("发票占页面高度比例")
                .default(0.75)
                .validate_with(|r: &f32| {
                    if *r > 0.0 && *r < 1.0 {
                        Ok(())
                    } else {
                        Err("需在 0 与 1 之间")
                    }
                })
                .interact_text()?;
            settings.inv_ratio = Some(ratio);
        }

        let folder = pick_folder();
        if let Some(folder) = &folder {
            let go = Confirm::new()
                .with_prompt(format!("上传 {} ？", folder.display()))
                .default(true)
                .interact()?;
            if !go {
                continue;
            }
        }

        // A folder that cannot be read is reported and the menu carries on.
        let selection = match &folder {
            Some(folder) => match FileSelection::from_folder(folder) {
                Ok(selection) => selection,
                Err(e) => {
                    println!("{e}");
                    continue;
                }
            },
            None => FileSelection::default(),
        };
        run_selection(api, workflow, &selection, &settings);
    }
    Ok(())
}
