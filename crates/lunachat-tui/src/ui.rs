use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};
use lunachat_core::{models, ChatRole};
use crate::app::{App, InputMode, Popup, Status};
use crate::input::TextInput;

/// Parse a line of text and convert **bold** markdown to styled spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.chars().peekable();
    let mut current_text = String::new();

    while let Some(c) = chars.next() {
        if c == '*' && chars.peek() == Some(&'*') {
            // Consume the second *
            chars.next();

            // Push any accumulated plain text
            if !current_text.is_empty() {
                spans.push(Span::raw(std::mem::take(&mut current_text)));
            }

            // Find closing **
            let mut bold_text = String::new();
            let mut found_close = false;

            while let Some(c) = chars.next() {
                if c == '*' && chars.peek() == Some(&'*') {
                    chars.next();
                    found_close = true;
                    break;
                }
                bold_text.push(c);
            }

            if found_close && !bold_text.is_empty() {
                spans.push(Span::styled(
                    bold_text,
                    Style::default().add_modifier(Modifier::BOLD),
                ));
            } else {
                // No closing **, treat as literal
                current_text.push_str("**");
                current_text.push_str(&bold_text);
            }
        } else {
            current_text.push(c);
        }
    }

    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }

    Line::from(spans)
}

fn role_line(role: ChatRole) -> Line<'static> {
    let (label, color) = match role {
        ChatRole::User => ("You:", Color::Cyan),
        ChatRole::Assistant => ("AI:", Color::Yellow),
        ChatRole::System => ("System:", Color::Magenta),
    };
    Line::from(Span::styled(label, Style::default().fg(color).add_modifier(Modifier::BOLD)))
}

/// Centered popup of at most `width` x `height`
fn popup_area(area: Rect, width: u16, height: u16) -> Rect {
    let popup_width = width.min(area.width.saturating_sub(4));
    let popup_height = height.min(area.height.saturating_sub(4));

    let popup_x = area.x + (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = area.y + (area.height.saturating_sub(popup_height)) / 2;

    Rect::new(popup_x, popup_y, popup_width, popup_height)
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, status, footer
    let [header_area, body_area, status_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_chat_screen(app, frame, body_area);
    render_status(app, frame, status_area);
    render_footer(app, frame, footer_area);

    match app.popup {
        Some(Popup::SystemPrompt) => {
            let title = " System Prompt (Enter to set, Esc to cancel) ";
            render_text_popup(frame, area, title, &app.prompt_input)
        }
        Some(Popup::TokenBudget) => {
            let title = format!(" Max Tokens (1-{}) ", app.session.model().max_tokens);
            render_text_popup(frame, area, &title, &app.budget_input)
        }
        Some(Popup::SavePreset) => {
            render_text_popup(frame, area, " Save System Prompt As ", &app.preset_name_input)
        }
        Some(Popup::ModelPicker) => render_model_picker(app, frame, area),
        Some(Popup::PresetPicker) => render_preset_picker(app, frame, area),
        Some(Popup::Transcript) => render_transcript(app, frame, area),
        None => {}
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let model = app.session.model();
    let config = app.session.config();

    let title = Line::from(vec![
        Span::styled(" LunaChat ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            format!("{} ({}) ", model.name, model.developer),
            Style::default().fg(Color::White),
        ),
        Span::styled(
            format!("max {} tokens ", config.max_tokens),
            Style::default().fg(Color::Gray),
        ),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_chat_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let [chat_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(3),
    ])
    .areas(area);

    // Store chat area dimensions for scroll calculations (inner size minus borders)
    app.chat_height = chat_area.height.saturating_sub(2);
    app.chat_width = chat_area.width.saturating_sub(2);

    let prompt = &app.session.config().system_prompt;
    let prompt_preview: String = prompt.chars().take(40).collect();
    let chat_title = if prompt.is_empty() {
        " Chat ".to_string()
    } else if prompt.chars().count() > 40 {
        format!(" Chat | system: {}... ", prompt_preview)
    } else {
        format!(" Chat | system: {} ", prompt_preview)
    };

    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(chat_title);

    let streaming = app.is_streaming();
    let has_messages = app.session.transcript().visible().next().is_some();

    let chat_text = if !has_messages && !streaming {
        Text::from(Span::styled(
            "Enter your prompt here...",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        let mut lines: Vec<Line> = Vec::new();

        for msg in app.session.transcript().visible() {
            lines.push(role_line(msg.role));
            match msg.role {
                ChatRole::Assistant => {
                    for line in msg.content.lines() {
                        lines.push(parse_markdown_line(line));
                    }
                }
                _ => {
                    for line in msg.content.lines() {
                        lines.push(Line::from(line.to_string()));
                    }
                }
            }
            lines.push(Line::default());
        }

        if streaming {
            lines.push(role_line(ChatRole::Assistant));
            let pending = app.session.pending();
            if pending.is_empty() {
                // Animated ellipsis: cycles through ".", "..", "..."
                let dots = ".".repeat((app.animation_frame as usize) + 1);
                lines.push(Line::from(Span::styled(
                    format!("Thinking{}", dots),
                    Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
                )));
            } else {
                for line in pending.lines() {
                    lines.push(parse_markdown_line(line));
                }
            }
        }

        Text::from(lines)
    };

    let chat = Paragraph::new(chat_text)
        .block(chat_block)
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));

    frame.render_widget(chat, chat_area);

    let editing = app.input_mode == InputMode::Editing && app.popup.is_none();
    let input_border_color = if streaming {
        Color::DarkGray
    } else if editing {
        Color::Yellow
    } else {
        Color::Gray
    };
    let input_title = if streaming { " Waiting for response... " } else { " Message " };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(input_border_color))
        .title(input_title);

    let inner_width = input_area.width.saturating_sub(2) as usize;
    let (visible_text, cursor_x) = app.chat_input.visible(inner_width);

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(input_block);

    frame.render_widget(input, input_area);

    if editing {
        frame.set_cursor_position((
            input_area.x + cursor_x as u16 + 1,
            input_area.y + 1,
        ));
    }
}

fn render_status(app: &App, frame: &mut Frame, area: Rect) {
    let line = match &app.status {
        Some(Status::Error(msg)) => Line::from(Span::styled(
            format!(" ✗ {} ", msg),
            Style::default().fg(Color::White).bg(Color::Red),
        )),
        Some(Status::Info(msg)) => Line::from(Span::styled(
            format!(" {} ", msg),
            Style::default().fg(Color::Green),
        )),
        None => Line::default(),
    };
    frame.render_widget(Paragraph::new(line), area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let (mode_text, mode_style) = match (app.popup, app.input_mode) {
        (Some(_), _) => (" MENU ", Style::default().bg(Color::Magenta).fg(Color::White)),
        (None, InputMode::Normal) => {
            (" NORMAL ", Style::default().bg(Color::Blue).fg(Color::White))
        }
        (None, InputMode::Editing) => {
            (" INSERT ", Style::default().bg(Color::Yellow).fg(Color::Black))
        }
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let hints: &[(&str, &str)] = match (app.popup, app.input_mode) {
        (Some(Popup::ModelPicker), _) => &[("j/k", "move"), ("Enter", "select"), ("Esc", "close")],
        (Some(Popup::PresetPicker), _) => {
            &[("j/k", "move"), ("Enter", "apply"), ("d", "delete"), ("Esc", "close")]
        }
        (Some(Popup::Transcript), _) => &[("j/k", "scroll"), ("Esc", "close")],
        (Some(_), _) => &[("Enter", "confirm"), ("Esc", "cancel")],
        (None, InputMode::Editing) => {
            &[("Enter", "send"), ("PgUp/PgDn", "scroll"), ("Esc", "menu")]
        }
        (None, InputMode::Normal) => &[
            ("i", "type"),
            ("s", "system"),
            ("m", "model"),
            ("t", "tokens"),
            ("p", "presets"),
            ("S", "save preset"),
            ("c", "clear"),
            ("D", "raw"),
            ("q", "quit"),
        ],
    };

    let mut spans = vec![Span::styled(mode_text, mode_style), Span::raw(" ")];
    for (key, label) in hints {
        spans.push(Span::styled(format!(" {} ", key), key_style));
        spans.push(Span::styled(format!(" {} ", label), label_style));
        spans.push(Span::raw(" "));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_text_popup(frame: &mut Frame, area: Rect, title: &str, input: &TextInput) {
    let popup_area = popup_area(area, 70, 3);

    // Clear the area behind the popup
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(title.to_string());

    let inner_width = popup_area.width.saturating_sub(2) as usize;
    let (visible_text, cursor_x) = input.visible(inner_width);

    frame.render_widget(Paragraph::new(visible_text).block(block), popup_area);
    frame.set_cursor_position((popup_area.x + cursor_x as u16 + 1, popup_area.y + 1));
}

fn render_model_picker(app: &mut App, frame: &mut Frame, area: Rect) {
    let all = models::all();
    let popup_area = popup_area(area, 60, all.len() as u16 + 2);

    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Choose a model ");

    let current = app.session.config().model_id;
    let items: Vec<ListItem> = all
        .iter()
        .map(|model| {
            let style = if model.id == current {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(format!(
                " {} - {} ({} tokens) ",
                model.name, model.developer, model.max_tokens
            ))
            .style(style)
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, popup_area, &mut app.model_picker_state);
}

fn render_preset_picker(app: &mut App, frame: &mut Frame, area: Rect) {
    let names = app.preset_names();
    let popup_area = popup_area(area, 70, names.len() as u16 + 2);

    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" System Prompt Presets ");

    let items: Vec<ListItem> = names
        .iter()
        .map(|name| {
            let text = app.presets.get(name).unwrap_or_default();
            let preview: String = text.chars().take(40).collect();
            ListItem::new(Line::from(vec![
                Span::styled(format!(" {} ", name), Style::default().fg(Color::Yellow).bold()),
                Span::styled(preview, Style::default().fg(Color::Gray)),
            ]))
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, popup_area, &mut app.preset_picker_state);
}

fn render_transcript(app: &App, frame: &mut Frame, area: Rect) {
    let popup_area = popup_area(area, 90, area.height.saturating_sub(4));

    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Raw Transcript ");

    let lines: Vec<Line> = app
        .raw_transcript()
        .into_iter()
        .map(|line| Line::from(Span::styled(line, Style::default().fg(Color::Gray))))
        .collect();

    let paragraph = Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.transcript_scroll, 0));

    frame.render_widget(paragraph, popup_area);
}
