use crossterm::event::{KeyCode, KeyModifiers};
use tracing::debug;

use crate::error::{ErrorKind, JobError};
use crate::events::{AppEvent, JobId};
use crate::models::{resolution_size, Artifact, ChatJob, ImageJob, JobKind, ModelCategory, Settings};
use crate::session::Session;

/// Lifecycle of the most recent submission, as shown in the status bar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Ready,
    Sending,
    /// Image task accepted; carries the latest status the server reported.
    Generating(Option<String>),
    Success,
    Error,
}

impl Status {
    pub fn label(&self) -> String {
        match self {
            Self::Ready => "Ready".to_string(),
            Self::Sending => "Sending...".to_string(),
            Self::Generating(None) => "Generating...".to_string(),
            Self::Generating(Some(status)) => format!("Generating... ({status})"),
            Self::Success => "Success".to_string(),
            Self::Error => "Error".to_string(),
        }
    }

    pub const fn is_result(&self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    Warning,
    Error,
}

/// Blocking popup; input is ignored until it is dismissed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub level: AlertLevel,
    pub title: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Image(ImageJob),
    Chat(ChatJob),
}

/// What the run loop must do after a key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    Handled,
    Submit,
    SettingsChanged,
}

#[derive(Debug)]
pub struct App {
    pub settings: Settings,
    pub session: Session,
    pub should_quit: bool,
    pub exit_pending: bool,
    pub input_buffer: String,
    /// API key being edited; `Some` while the key editor owns the input line.
    pub key_editor: Option<String>,
    pub status: Status,
    pub alert: Option<Alert>,
    pub show_help: bool,
    pub show_detail: bool,
    pub selected: usize,
    pub scroll_offset: usize,
    pub stream_chat: bool,
    pub active_image: Option<JobId>,
    pub active_chat: Option<JobId>,
}

impl App {
    pub fn new(settings: Settings, session: Session) -> Self {
        let input_buffer = match settings.model_category {
            ModelCategory::Image => settings.prompt.clone(),
            ModelCategory::Chat => String::new(),
        };

        Self {
            settings,
            session,
            should_quit: false,
            exit_pending: false,
            input_buffer,
            key_editor: None,
            status: Status::Ready,
            alert: None,
            show_help: false,
            show_detail: false,
            selected: 0,
            scroll_offset: 0,
            stream_chat: true,
            active_image: None,
            active_chat: None,
        }
    }

    pub const fn quit(&mut self) {
        self.should_quit = true;
    }

    pub const fn mode(&self) -> ModelCategory {
        self.settings.model_category
    }

    pub const fn toggle_help(&mut self) {
        self.show_help = !self.show_help;
    }

    pub fn selected_artifact(&self) -> Option<&Artifact> {
        self.session.gallery().get(self.selected)
    }

    pub fn warn(&mut self, title: impl Into<String>, message: impl Into<String>) {
        self.alert = Some(Alert {
            level: AlertLevel::Warning,
            title: title.into(),
            message: message.into(),
        });
    }

    fn fail(&mut self, kind: ErrorKind, message: impl Into<String>) {
        self.status = Status::Error;
        self.alert = Some(Alert {
            level: AlertLevel::Error,
            title: kind.to_string(),
            message: message.into(),
        });
    }

    pub fn dismiss_alert(&mut self) {
        self.alert = None;
        self.acknowledge_result();
    }

    /// Return to `Ready` once the user has seen a success or error.
    pub fn acknowledge_result(&mut self) {
        if self.status.is_result() {
            self.status = Status::Ready;
        }
    }

    pub const fn scroll_up(&mut self, amount: usize) {
        self.scroll_offset = self.scroll_offset.saturating_sub(amount);
    }

    pub const fn scroll_down(&mut self, amount: usize) {
        self.scroll_offset = self.scroll_offset.saturating_add(amount);
    }

    pub const fn scroll_to_bottom(&mut self) {
        // Clamped to the real bottom when rendering
        self.scroll_offset = usize::MAX;
    }

    fn select_up(&mut self, amount: usize) {
        self.selected = self.selected.saturating_sub(amount);
    }

    fn select_down(&mut self, amount: usize) {
        let last = self.session.gallery().len().saturating_sub(1);
        self.selected = self.selected.saturating_add(amount).min(last);
    }

    fn navigate(&mut self, code: KeyCode) {
        match (self.mode(), code) {
            (ModelCategory::Image, KeyCode::Up) => self.select_up(1),
            (ModelCategory::Image, KeyCode::Down) => self.select_down(1),
            (ModelCategory::Image, KeyCode::PageUp) => self.select_up(10),
            (ModelCategory::Image, KeyCode::PageDown) => self.select_down(10),
            (ModelCategory::Image, KeyCode::Home) => self.selected = 0,
            (ModelCategory::Image, KeyCode::End) => self.select_down(usize::MAX),
            (ModelCategory::Chat, KeyCode::Up) => self.scroll_up(1),
            (ModelCategory::Chat, KeyCode::Down) => self.scroll_down(1),
            (ModelCategory::Chat, KeyCode::PageUp) => self.scroll_up(10),
            (ModelCategory::Chat, KeyCode::PageDown) => self.scroll_down(10),
            (ModelCategory::Chat, KeyCode::Home) => self.scroll_offset = 0,
            (ModelCategory::Chat, KeyCode::End) => self.scroll_to_bottom(),
            _ => {}
        }
    }

    /// Switch between image and chat mode. The image prompt survives a round
    /// trip through chat mode.
    pub fn toggle_category(&mut self) {
        if self.mode() == ModelCategory::Image {
            self.settings.prompt = std::mem::take(&mut self.input_buffer);
        }
        self.settings.toggle_category();
        if self.mode() == ModelCategory::Image {
            self.input_buffer = self.settings.prompt.clone();
        }
        self.show_detail = false;
    }

    /// Copy the image prompt being edited into `settings` so a save records
    /// it even if it was never submitted.
    pub fn sync_settings(&mut self) {
        if self.mode() == ModelCategory::Image {
            self.settings.prompt.clone_from(&self.input_buffer);
        }
    }

    pub fn on_key(&mut self, code: KeyCode, modifiers: KeyModifiers) -> KeyOutcome {
        let ctrl = modifiers.contains(KeyModifiers::CONTROL);

        match code {
            KeyCode::Char('q') if ctrl => {
                self.quit();
                return KeyOutcome::Handled;
            }
            KeyCode::Char('c') if ctrl => {
                if self.exit_pending {
                    self.quit();
                } else {
                    self.exit_pending = true;
                }
                return KeyOutcome::Handled;
            }
            KeyCode::Esc if self.exit_pending => {
                self.exit_pending = false;
                return KeyOutcome::Handled;
            }
            // Any other key cancels pending exit
            _ if self.exit_pending => self.exit_pending = false,
            _ => {}
        }

        if self.alert.is_some() {
            if matches!(code, KeyCode::Esc | KeyCode::Enter) {
                self.dismiss_alert();
            }
            return KeyOutcome::Handled;
        }

        if self.show_help {
            if code == KeyCode::Esc || (ctrl && code == KeyCode::Char('h')) {
                self.show_help = false;
            }
            return KeyOutcome::Handled;
        }

        if self.show_detail {
            if code == KeyCode::Esc || (ctrl && code == KeyCode::Char('d')) {
                self.show_detail = false;
            }
            return KeyOutcome::Handled;
        }

        self.acknowledge_result();

        if ctrl {
            return self.on_control_key(code);
        }

        if let Some(editor) = self.key_editor.as_mut() {
            match code {
                KeyCode::Esc => self.key_editor = None,
                KeyCode::Enter => {
                    self.settings.api_key = editor.trim().to_string();
                    self.key_editor = None;
                    return KeyOutcome::SettingsChanged;
                }
                KeyCode::Backspace => {
                    editor.pop();
                }
                KeyCode::Char(c) => editor.push(c),
                _ => {}
            }
            return KeyOutcome::Handled;
        }

        match code {
            KeyCode::Enter => return KeyOutcome::Submit,
            KeyCode::Backspace => {
                self.input_buffer.pop();
            }
            KeyCode::Char(c) => self.input_buffer.push(c),
            other => self.navigate(other),
        }
        KeyOutcome::Handled
    }

    fn on_control_key(&mut self, code: KeyCode) -> KeyOutcome {
        match code {
            KeyCode::Char('t') => {
                self.toggle_category();
                KeyOutcome::SettingsChanged
            }
            KeyCode::Char('n') => {
                self.settings.cycle_model();
                KeyOutcome::SettingsChanged
            }
            KeyCode::Char('r') if self.mode() == ModelCategory::Image => {
                self.settings.cycle_resolution();
                KeyOutcome::SettingsChanged
            }
            KeyCode::Char('k') => {
                self.key_editor = Some(self.settings.api_key.clone());
                KeyOutcome::Handled
            }
            KeyCode::Char('d') => {
                if self.mode() == ModelCategory::Image && self.selected_artifact().is_some() {
                    self.show_detail = true;
                }
                KeyOutcome::Handled
            }
            KeyCode::Char('h') => {
                self.toggle_help();
                KeyOutcome::Handled
            }
            _ => KeyOutcome::Handled,
        }
    }

    /// Validate the input line and build the job to run, or raise a warning
    /// alert and return `None`.
    ///
    /// A chat submission records the user turn and opens the pending reply.
    pub fn prepare_submission(&mut self) -> Option<Submission> {
        let text = self.input_buffer.trim().to_string();

        if self.settings.api_key.trim().is_empty() {
            self.warn(
                "Missing API key",
                "Set your ModelScope API key first (Ctrl+K).",
            );
            return None;
        }
        if text.is_empty() {
            self.warn("Empty prompt", "Please enter a prompt.");
            return None;
        }

        match self.mode() {
            ModelCategory::Image => {
                if self.active_image.is_some() {
                    self.warn("Busy", JobError::Busy(JobKind::Image).to_string());
                    return None;
                }
                let Some(size) = resolution_size(&self.settings.resolution) else {
                    let message = format!("Invalid resolution: {}", self.settings.resolution);
                    self.warn("Invalid resolution", message);
                    return None;
                };
                self.settings.prompt.clone_from(&text);

                Some(Submission::Image(ImageJob {
                    api_key: self.settings.api_key.trim().to_string(),
                    model: self.settings.model.clone(),
                    prompt: text,
                    resolution: size,
                }))
            }
            ModelCategory::Chat => {
                if self.active_chat.is_some() {
                    self.warn("Busy", JobError::Busy(JobKind::Chat).to_string());
                    return None;
                }
                let messages = self.session.begin_chat(text);
                self.input_buffer.clear();
                self.scroll_to_bottom();

                Some(Submission::Chat(ChatJob {
                    api_key: self.settings.api_key.trim().to_string(),
                    model: self.settings.model.clone(),
                    messages,
                    streaming: self.stream_chat,
                }))
            }
        }
    }

    pub fn job_started(&mut self, kind: JobKind, id: JobId) {
        match kind {
            JobKind::Image => {
                self.active_image = Some(id);
                self.status = Status::Generating(None);
            }
            JobKind::Chat => {
                self.active_chat = Some(id);
                self.status = Status::Sending;
            }
        }
    }

    /// The runner refused the submission.
    pub fn job_rejected(&mut self, kind: JobKind, error: &JobError) {
        if kind == JobKind::Chat {
            self.session.on_chat_failed();
        }
        self.fail(error.kind(), error.to_string());
    }

    const fn active_job(&self, kind: JobKind) -> Option<JobId> {
        match kind {
            JobKind::Image => self.active_image,
            JobKind::Chat => self.active_chat,
        }
    }

    pub fn apply_event(&mut self, event: AppEvent) {
        let kind = match &event {
            AppEvent::ImageProgress { .. } | AppEvent::ArtifactCreated { .. } => JobKind::Image,
            AppEvent::ChatDelta { .. } | AppEvent::ChatFinished { .. } => JobKind::Chat,
            AppEvent::JobFailed { kind, .. } => *kind,
        };
        if self.active_job(kind) != Some(event.job()) {
            debug!(job = %event.job(), "ignoring event from inactive job");
            return;
        }
        if event.is_terminal() {
            match kind {
                JobKind::Image => self.active_image = None,
                JobKind::Chat => self.active_chat = None,
            }
        }

        match event {
            AppEvent::ImageProgress { status, .. } => {
                self.status = Status::Generating(Some(status));
            }
            AppEvent::ArtifactCreated { artifact, .. } => {
                self.session.on_artifact_created(artifact);
                self.selected = 0;
                self.status = Status::Success;
            }
            AppEvent::ChatDelta { text, .. } => {
                self.session.on_chat_delta(&text);
                self.scroll_to_bottom();
            }
            AppEvent::ChatFinished { text, .. } => {
                self.session.on_chat_finalized(text);
                self.status = Status::Success;
                self.scroll_to_bottom();
            }
            AppEvent::JobFailed {
                kind,
                error,
                message,
                ..
            } => {
                if kind == JobKind::Chat {
                    self.session.on_chat_failed();
                }
                self.fail(error, message);
            }
        }
    }
}
