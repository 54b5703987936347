// Workflow controller: one run of submit -> upload -> poll -> result for a
// single workflow. Each controller owns its view and its poll timer, so two
// controllers never share state.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::api::{Submission, TaskApi};
use crate::progress::TaskId;
use crate::selection::FileSelection;
use crate::timer::PollTimer;
use crate::ui::ProgressView;
use crate::workflow::{self, Step, Workflow};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing selected; no request was made.
    Rejected,
    SubmitFailed(String),
    Completed { task_id: TaskId, saved_to: PathBuf },
    Partial {
        task_id: TaskId,
        unpaired: Vec<String>,
        saved_to: PathBuf,
    },
    /// The server reported a processing error.
    Failed { task_id: TaskId, error: String },
    /// A progress request failed; the view was left as it was.
    PollAborted { task_id: TaskId, reason: String },
    /// Processing finished but fetching the result did not.
    DownloadFailed { task_id: TaskId, reason: String },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Completed { .. } | Outcome::Partial { .. })
    }
}

pub struct Controller<A, V> {
    workflow: Workflow,
    api: A,
    view: V,
    poll_interval: Duration,
    inv_ratio: Option<f32>,
    timer: Option<PollTimer>,
}

impl<A: TaskApi, V: ProgressView> Controller<A, V> {
    pub fn new(workflow: Workflow, api: A, view: V) -> Self {
        Self {
            workflow,
            api,
            view,
            poll_interval: DEFAULT_POLL_INTERVAL,
            inv_ratio: None,
            timer: None,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_inv_ratio(mut self, inv_ratio: Option<f32>) -> Self {
        self.inv_ratio = inv_ratio;
        self
    }

    pub fn workflow(&self) -> Workflow {
        self.workflow
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn is_polling(&self) -> bool {
        self.timer.as_ref().is_some_and(PollTimer::is_running)
    }

    /// Cancel the poll timer if one is running. Idempotent.
    pub fn stop(&mut self) {
        if let Some(mut timer) = self.timer.take() {
            if timer.stop() {
                debug!(workflow = %self.workflow, "polling stopped");
            }
        }
    }

    pub fn run(&mut self, selection: &FileSelection) -> Outcome {
        let workflow = self.workflow;
        if selection.is_empty() {
            self.view.set_status(workflow.empty_selection_message());
            return Outcome::Rejected;
        }

        self.view.set_status("");
        self.view.set_bar(0);
        self.view.show_bar();
        self.view.hide_spinner();

        let submission = Submission {
            workflow,
            selection,
            inv_ratio: self.inv_ratio,
        };
        let task_id = match self.api.submit(&submission, self.view.upload_observer()) {
            Ok(task_id) => task_id,
            Err(err) => {
                warn!(workflow = %workflow, error = %err, "submission failed");
                self.view.hide_bar();
                let message = err.user_message();
                self.view.set_status(&message);
                return Outcome::SubmitFailed(message);
            }
        };
        info!(workflow = %workflow, task_id = %task_id, "task accepted");

        self.view.set_bar(0);
        self.view.show_spinner();
        self.poll(task_id)
    }

    fn poll(&mut self, task_id: TaskId) -> Outcome {
        let workflow = self.workflow;
        self.stop();
        self.timer = Some(PollTimer::start(self.poll_interval));

        while self.timer.as_ref().is_some_and(PollTimer::tick) {
            let info = match self.api.progress(&task_id) {
                Ok(info) => info,
                Err(err) => {
                    self.stop();
                    warn!(workflow = %workflow, task_id = %task_id, error = %err, "progress polling aborted");
                    return Outcome::PollAborted {
                        task_id,
                        reason: err.to_string(),
                    };
                }
            };
            debug!(workflow = %workflow, task_id = %task_id, ?info, "progress");

            match workflow.classify(&info) {
                Step::Advance(Some(pct)) => self.view.set_bar(pct),
                Step::Advance(None) | Step::Ignore => {}
                Step::Done => {
                    self.stop();
                    self.view.set_bar(100);
                    self.view.hide_spinner();
                    self.view.set_status(workflow.done_message());
                    return match self.fetch(&task_id) {
                        Ok(saved_to) => Outcome::Completed { task_id, saved_to },
                        Err(reason) => Outcome::DownloadFailed { task_id, reason },
                    };
                }
                Step::Partial(unpaired) => {
                    self.stop();
                    self.view.set_bar(100);
                    self.view.hide_spinner();
                    self.view.set_status(&workflow::partial_message(&unpaired));
                    return match self.fetch(&task_id) {
                        Ok(saved_to) => Outcome::Partial {
                            task_id,
                            unpaired,
                            saved_to,
                        },
                        Err(reason) => Outcome::DownloadFailed { task_id, reason },
                    };
                }
                Step::Failed(error) => {
                    self.stop();
                    self.view.hide_spinner();
                    self.view.set_status(&workflow.failed_message(&error));
                    return Outcome::Failed { task_id, error };
                }
            }
        }

        // Only reachable if the timer was stopped from elsewhere.
        Outcome::PollAborted {
            task_id,
            reason: "polling cancelled".into(),
        }
    }

    fn fetch(&mut self, task_id: &TaskId) -> Result<PathBuf, String> {
        match self.api.download(self.workflow, task_id) {
            Ok(path) => {
                self.view.downloaded(&path);
                Ok(path)
            }
            Err(err) => {
                warn!(workflow = %self.workflow, task_id = %task_id, error = %err, "download failed");
                let reason = err.to_string();
                self.view.set_status(&workflow::download_failed_message(&reason));
                Err(reason)
            }
        }
    }
}
