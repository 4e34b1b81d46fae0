pub mod widgets;

use crate::app::App;
use crate::models::ModelCategory;
use ratatui::{
    layout::{Constraint, Direction, Layout},
    Frame,
};

pub fn render(frame: &mut Frame, app: &mut App) {
    // Width available for text is total width - 2 (for borders)
    let available_width = (frame.area().width.saturating_sub(2) as usize).max(1);

    let input_chars = app
        .key_editor
        .as_ref()
        .map_or_else(|| app.input_buffer.chars().count(), |key| key.chars().count());
    let input_lines = input_chars.div_ceil(available_width).max(1);

    // At most half the screen
    let max_lines = (frame.area().height as usize / 2).saturating_sub(2).max(1);
    let actual_lines = input_lines.min(max_lines);

    #[allow(clippy::cast_possible_truncation)]
    let input_height = (actual_lines + 2) as u16;

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),            // Settings bar
            Constraint::Min(0),               // Gallery or chat history
            Constraint::Length(1),            // Status line
            Constraint::Length(input_height), // Input field (dynamic height)
            Constraint::Length(1),            // Bottom keymap bar
        ])
        .split(frame.area());

    widgets::render_settings_bar(frame, app, chunks[0]);
    match app.mode() {
        ModelCategory::Image => widgets::render_gallery(frame, app, chunks[1]),
        ModelCategory::Chat => widgets::render_chat_history(frame, app, chunks[1]),
    }
    widgets::render_status_bar(frame, app, chunks[2]);
    widgets::render_input_field(frame, app, chunks[3]);
    widgets::render_bottom_bar(frame, app, chunks[4]);

    if app.show_detail {
        widgets::render_detail_window(frame, app, frame.area());
    }

    if app.show_help {
        widgets::render_help_window(frame, frame.area());
    }

    // Alerts sit above everything else
    if app.alert.is_some() {
        widgets::render_alert_window(frame, app, frame.area());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::AppEvent;
    use crate::models::{Artifact, ArtifactMetadata, JobKind, Settings};
    use crate::session::Session;
    use ratatui::{backend::TestBackend, Terminal};
    use std::path::PathBuf;
    use uuid::Uuid;

    fn draw(app: &mut App) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();
        terminal.draw(|f| render(f, app)).unwrap();
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    fn app() -> App {
        let settings = Settings {
            api_key: "ms-key".to_string(),
            ..Settings::default()
        };
        App::new(settings, Session::new("sys"))
    }

    #[test]
    fn test_image_mode_shows_gallery_and_settings() {
        let mut app = app();
        app.session.seed(vec![Artifact {
            path: PathBuf::from("/out/img_20250101_120000.png"),
            metadata: ArtifactMetadata {
                filename: "img_20250101_120000.png".to_string(),
                file_path: "/out/img_20250101_120000.png".to_string(),
                prompt: "a red fox".to_string(),
                model: "Qwen/Qwen-Image".to_string(),
                resolution: "1024x1024".to_string(),
                timestamp: "20250101_120000".to_string(),
            },
        }]);

        let screen = draw(&mut app);
        assert!(screen.contains("Gallery (1)"));
        assert!(screen.contains("img_20250101_120000.png"));
        assert!(screen.contains("a red fox"));
        assert!(screen.contains("1024x1024 (1:1)"));
        assert!(screen.contains("API key set"));
        assert!(screen.contains("Ready"));
    }

    #[test]
    fn test_chat_mode_shows_pending_reply() {
        let mut app = app();
        app.toggle_category();
        app.input_buffer = "hi".to_string();
        app.prepare_submission().unwrap();
        let id = Uuid::new_v4();
        app.job_started(JobKind::Chat, id);
        app.apply_event(AppEvent::ChatDelta {
            job: id,
            text: "Hello there".to_string(),
        });

        let screen = draw(&mut app);
        assert!(screen.contains("## User"));
        assert!(screen.contains("Hello there"));
        assert!(screen.contains("Sending..."));
    }

    #[test]
    fn test_alert_is_drawn() {
        let mut app = app();
        app.warn("Empty prompt", "Please enter a prompt.");
        let screen = draw(&mut app);
        assert!(screen.contains("Empty prompt"));
        assert!(screen.contains("Please enter a prompt."));
    }

    #[test]
    fn test_api_key_is_masked_while_editing() {
        let mut app = app();
        app.key_editor = Some("secret".to_string());
        let screen = draw(&mut app);
        assert!(screen.contains("******"));
        assert!(!screen.contains("secret"));
    }
}
