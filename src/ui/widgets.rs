use ratatui::{
    layout::{Alignment, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Frame,
};

use crate::app::{AlertLevel, App, Status};
use crate::models::{ChatRole, ModelCategory};

/// Centered popup area, clamped to the frame.
fn popup_area(area: Rect, width: u16, height: u16) -> Rect {
    let x = (area.width.saturating_sub(width)) / 2;
    let y = (area.height.saturating_sub(height)) / 2;

    Rect {
        x: area.x + x,
        y: area.y + y,
        width: width.min(area.width),
        height: height.min(area.height),
    }
}

pub fn render_help_window(frame: &mut Frame, area: Rect) {
    let heading = Style::default().add_modifier(Modifier::BOLD);
    let help_text = vec![
        Line::from(Span::styled(
            "zimage - Keyboard Shortcuts",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(Span::styled("General:", heading)),
        Line::from("  Ctrl+H        - Show/hide this help"),
        Line::from("  Ctrl+Q        - Quit application"),
        Line::from("  Ctrl+C (x2)   - Quit application"),
        Line::from(""),
        Line::from(Span::styled("Generation:", heading)),
        Line::from("  Enter         - Generate image / send message"),
        Line::from("  Ctrl+T        - Switch image/chat mode"),
        Line::from("  Ctrl+N        - Next model"),
        Line::from("  Ctrl+R        - Next resolution (image mode)"),
        Line::from("  Ctrl+K        - Edit API key"),
        Line::from(""),
        Line::from(Span::styled("Navigation:", heading)),
        Line::from("  Up/Down       - Select image / scroll chat"),
        Line::from("  PgUp/PgDn     - Move by a page"),
        Line::from("  Home/End      - Jump to start/end"),
        Line::from("  Ctrl+D        - Details of the selected image"),
        Line::from(""),
        Line::from(Span::styled(
            "Press Ctrl+H or Esc to close",
            Style::default().fg(Color::DarkGray),
        )),
    ];

    let help_paragraph = Paragraph::new(help_text)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Help ")
                .border_style(Style::default().fg(Color::Cyan)),
        )
        .wrap(Wrap { trim: false });

    let popup = popup_area(area, 60, 24);
    frame.render_widget(Clear, popup);
    frame.render_widget(help_paragraph, popup);
}

pub fn render_detail_window(frame: &mut Frame, app: &App, area: Rect) {
    let Some(artifact) = app.selected_artifact() else {
        return;
    };
    let meta = &artifact.metadata;
    let label = Style::default().fg(Color::DarkGray);

    let field = |name: &'static str, value: &str| {
        Line::from(vec![
            Span::styled(format!("{name:<12}"), label),
            Span::styled(value.to_string(), Style::default().fg(Color::Yellow)),
        ])
    };

    let detail_text = vec![
        field("File", &meta.filename),
        field("Model", &meta.model),
        field("Resolution", &meta.resolution),
        field("Created", &meta.timestamp),
        field("Path", &artifact.path.display().to_string()),
        Line::from(""),
        Line::from(Span::styled("Prompt", label)),
        Line::from(meta.prompt.clone()),
        Line::from(""),
        Line::from(Span::styled(
            "Press Ctrl+D or Esc to close",
            Style::default().fg(Color::DarkGray),
        )),
    ];

    let detail = Paragraph::new(detail_text)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Image Details ")
                .border_style(Style::default().fg(Color::Cyan)),
        )
        .wrap(Wrap { trim: false });

    let popup = popup_area(area, 72, 16);
    frame.render_widget(Clear, popup);
    frame.render_widget(detail, popup);
}

pub fn render_alert_window(frame: &mut Frame, app: &App, area: Rect) {
    let Some(alert) = &app.alert else {
        return;
    };
    let color = match alert.level {
        AlertLevel::Warning => Color::Yellow,
        AlertLevel::Error => Color::Red,
    };

    let alert_text = vec![
        Line::from(alert.message.clone()),
        Line::from(""),
        Line::from(Span::styled(
            "Press Enter or Esc to close",
            Style::default().fg(Color::DarkGray),
        )),
    ];

    let paragraph = Paragraph::new(alert_text)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" {} ", alert.title))
                .border_style(Style::default().fg(color).add_modifier(Modifier::BOLD)),
        )
        .wrap(Wrap { trim: false });

    let popup = popup_area(area, 64, 9);
    frame.render_widget(Clear, popup);
    frame.render_widget(paragraph, popup);
}

/// One-line summary of the current settings.
pub fn render_settings_bar(frame: &mut Frame, app: &App, area: Rect) {
    let accent = Style::default().fg(Color::Yellow);
    let dim = Style::default().fg(Color::DarkGray);
    let mode = match app.mode() {
        ModelCategory::Image => "Image",
        ModelCategory::Chat => "Chat",
    };

    let mut spans = vec![
        Span::styled(
            format!(" {mode} "),
            Style::default()
                .fg(Color::Black)
                .bg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" "),
        Span::styled(app.settings.model.clone(), accent),
    ];
    if app.mode() == ModelCategory::Image {
        spans.push(Span::styled("  |  ", dim));
        spans.push(Span::styled(app.settings.resolution.clone(), accent));
    }
    spans.push(Span::styled("  |  ", dim));
    if app.settings.api_key.is_empty() {
        spans.push(Span::styled("API key not set", Style::default().fg(Color::Red)));
    } else {
        spans.push(Span::styled("API key set", Style::default().fg(Color::Green)));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

pub fn render_bottom_bar(frame: &mut Frame, app: &App, area: Rect) {
    let (text, style) = if app.exit_pending {
        (
            "Press Ctrl+C again to exit, Esc to cancel",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )
    } else if app.key_editor.is_some() {
        (
            "Enter: Save key | Esc: Cancel",
            Style::default().fg(Color::DarkGray),
        )
    } else {
        (
            "Ctrl+C: Quit | Ctrl+T: Mode | Ctrl+N: Model | Ctrl+R: Size | Ctrl+K: Key | Ctrl+H: Help",
            Style::default().fg(Color::DarkGray),
        )
    };

    let bar = Paragraph::new(text)
        .alignment(Alignment::Center)
        .style(style);

    frame.render_widget(bar, area);
}

pub fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let color = match app.status {
        Status::Ready => Color::DarkGray,
        Status::Sending | Status::Generating(_) => Color::Yellow,
        Status::Success => Color::Green,
        Status::Error => Color::Red,
    };

    let status = Paragraph::new(app.status.label())
        .alignment(Alignment::Right)
        .style(Style::default().fg(color).add_modifier(Modifier::BOLD));

    frame.render_widget(status, area);
}

pub fn render_gallery(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" Gallery ({}) ", app.session.gallery().len()))
        .border_style(Style::default().fg(Color::DarkGray));

    if app.session.gallery().is_empty() {
        let empty = Paragraph::new("No images yet. Type a prompt and press Enter.")
            .alignment(Alignment::Center)
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        frame.render_widget(empty, area);
        return;
    }

    let items: Vec<ListItem> = app
        .session
        .gallery()
        .iter()
        .map(|artifact| {
            let meta = &artifact.metadata;
            ListItem::new(Line::from(vec![
                Span::styled(
                    format!("{:<28}", meta.filename),
                    Style::default().fg(Color::Cyan),
                ),
                Span::styled(
                    format!("{:<11}", meta.resolution),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::raw(meta.prompt.clone()),
            ]))
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    let mut state = ListState::default().with_selected(Some(app.selected));
    frame.render_stateful_widget(list, area, &mut state);
}

pub fn render_chat_history(frame: &mut Frame, app: &mut App, area: Rect) {
    let transcript = app.session.transcript();

    if transcript.is_empty() {
        let welcome_text = vec![
            Line::from(Span::styled(
                "Chat with ModelScope",
                Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD),
            )),
            Line::from(Span::styled(
                format!("Model: {}", app.settings.model),
                Style::default().fg(Color::Cyan),
            )),
        ];

        let welcome_paragraph = Paragraph::new(welcome_text).alignment(Alignment::Center);

        // Bottom of the history area
        let welcome_height = 2;
        let welcome_area = Rect {
            x: area.x,
            y: area.y + area.height.saturating_sub(welcome_height),
            width: area.width,
            height: welcome_height.min(area.height),
        };

        frame.render_widget(welcome_paragraph, welcome_area);
        return;
    }

    // Reply requested but nothing streamed yet
    let waiting = app.session.pending().is_some_and(str::is_empty);
    let last = transcript.len() - 1;

    let mut lines = Vec::new();
    for (index, turn) in transcript.iter().enumerate() {
        let (role, color) = match turn.role {
            ChatRole::User => ("User", Color::Cyan),
            ChatRole::Assistant | ChatRole::System => ("Assistant", Color::Green),
        };

        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!("## {role}"),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        )));
        lines.push(Line::from(""));

        if waiting && index == last {
            lines.push(Line::from(Span::styled(
                "...",
                Style::default().fg(Color::DarkGray),
            )));
        } else {
            lines.extend(turn.content.lines().map(|line| Line::from(line.to_string())));
        }
    }

    // Count wrapped rows so a huge offset clamps to the real bottom
    let available_width = (area.width as usize).max(1);
    let total_visual_lines: usize = lines
        .iter()
        .map(|line| line.width().div_ceil(available_width).max(1))
        .sum();

    let visible_height = area.height as usize;
    let max_scroll = total_visual_lines.saturating_sub(visible_height);
    let actual_scroll = app.scroll_offset.min(max_scroll);
    app.scroll_offset = actual_scroll;

    let chat_history = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .scroll((u16::try_from(actual_scroll).unwrap_or(u16::MAX), 0));

    frame.render_widget(chat_history, area);
}

pub fn render_input_field(frame: &mut Frame, app: &App, area: Rect) {
    let (title, text, placeholder) = match (&app.key_editor, app.mode()) {
        (Some(key), _) => (" API key ", "*".repeat(key.chars().count()), "Paste your ModelScope API key..."),
        (None, ModelCategory::Image) => (" Prompt ", app.input_buffer.clone(), "Describe the image..."),
        (None, ModelCategory::Chat) => (" Message ", app.input_buffer.clone(), "Type your message..."),
    };

    let (shown, input_style) = if text.is_empty() {
        (placeholder.to_string(), Style::default().fg(Color::Gray))
    } else {
        (
            text,
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        )
    };

    let input = Paragraph::new(shown)
        .style(input_style)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(title)
                .border_style(Style::default().fg(Color::Cyan)),
        )
        .wrap(Wrap { trim: false });

    frame.render_widget(input, area);
}
