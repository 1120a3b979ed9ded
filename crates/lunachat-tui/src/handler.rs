use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use crate::app::{App, InputMode, Popup};
use crate::input::TextInput;
use crate::tui::AppEvent;

const MOUSE_SCROLL_LINES: u16 = 3;

pub fn handle_event(app: &mut App, event: AppEvent) {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Paste(text) => handle_paste(app, &text),
        AppEvent::Tick => app.tick_animation(),
    }
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    if let Some(popup) = app.popup {
        handle_popup(app, popup, key);
        return;
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_editing_mode(app, key),
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        // Start typing
        KeyCode::Char('i') | KeyCode::Enter => app.input_mode = InputMode::Editing,

        // Session settings
        KeyCode::Char('s') => app.open_system_prompt(),
        KeyCode::Char('m') => app.open_model_picker(),
        KeyCode::Char('t') => app.open_token_budget(),
        KeyCode::Char('p') => app.open_preset_picker(),
        KeyCode::Char('S') => app.open_save_preset(),
        KeyCode::Char('c') => app.clear_conversation(),
        KeyCode::Char('D') => app.open_transcript_view(),

        // Scrolling
        KeyCode::Char('j') | KeyCode::Down => app.scroll_down(1),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_up(1),
        KeyCode::PageDown => app.scroll_down(half_page(app)),
        KeyCode::PageUp => app.scroll_up(half_page(app)),
        KeyCode::Char('g') => app.scroll_up(u16::MAX),
        KeyCode::Char('G') => {
            app.follow_output = true;
            app.scroll_chat_to_bottom();
        }

        KeyCode::Esc => app.status = None,
        _ => {}
    }
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.input_mode = InputMode::Normal,
        KeyCode::Enter => app.submit_message(),
        KeyCode::PageDown => app.scroll_down(half_page(app)),
        KeyCode::PageUp => app.scroll_up(half_page(app)),
        _ => {
            edit_text(&mut app.chat_input, key);
        }
    }
}

fn handle_popup(app: &mut App, popup: Popup, key: KeyEvent) {
    match popup {
        Popup::SystemPrompt => match key.code {
            KeyCode::Esc => app.close_popup(),
            KeyCode::Enter => app.apply_system_prompt(),
            _ => {
                edit_text(&mut app.prompt_input, key);
            }
        },
        Popup::TokenBudget => match key.code {
            KeyCode::Esc => app.close_popup(),
            KeyCode::Enter => app.apply_token_budget(),
            KeyCode::Char(c) if !c.is_ascii_digit() => {}
            _ => {
                edit_text(&mut app.budget_input, key);
            }
        },
        Popup::SavePreset => match key.code {
            KeyCode::Esc => app.close_popup(),
            KeyCode::Enter => app.save_current_as_preset(),
            _ => {
                edit_text(&mut app.preset_name_input, key);
            }
        },
        Popup::ModelPicker => match key.code {
            KeyCode::Esc | KeyCode::Char('q') => app.close_popup(),
            KeyCode::Char('j') | KeyCode::Down => app.model_picker_nav_down(),
            KeyCode::Char('k') | KeyCode::Up => app.model_picker_nav_up(),
            KeyCode::Enter => app.select_model(),
            _ => {}
        },
        Popup::PresetPicker => match key.code {
            KeyCode::Esc | KeyCode::Char('q') => app.close_popup(),
            KeyCode::Char('j') | KeyCode::Down => app.preset_picker_nav_down(),
            KeyCode::Char('k') | KeyCode::Up => app.preset_picker_nav_up(),
            KeyCode::Char('d') | KeyCode::Delete => app.delete_selected_preset(),
            KeyCode::Enter => app.apply_selected_preset(),
            _ => {}
        },
        Popup::Transcript => match key.code {
            KeyCode::Esc | KeyCode::Char('q') | KeyCode::Enter => app.close_popup(),
            KeyCode::Char('j') | KeyCode::Down => app.transcript_scroll_down(1),
            KeyCode::Char('k') | KeyCode::Up => app.transcript_scroll_up(1),
            KeyCode::PageDown => app.transcript_scroll_down(half_page(app)),
            KeyCode::PageUp => app.transcript_scroll_up(half_page(app)),
            _ => {}
        },
    }
}

/// Apply a cursor/editing key to a text input. Returns false for keys it
/// does not handle.
fn edit_text(input: &mut TextInput, key: KeyEvent) -> bool {
    match key.code {
        KeyCode::Backspace => input.backspace(),
        KeyCode::Delete => input.delete(),
        KeyCode::Left => input.left(),
        KeyCode::Right => input.right(),
        KeyCode::Home => input.home(),
        KeyCode::End => input.end(),
        KeyCode::Char(c) => input.insert(c),
        _ => return false,
    }
    true
}

fn handle_paste(app: &mut App, text: &str) {
    let target = match app.popup {
        Some(Popup::SystemPrompt) => &mut app.prompt_input,
        Some(Popup::SavePreset) => &mut app.preset_name_input,
        Some(_) => return,
        None if app.input_mode == InputMode::Editing => &mut app.chat_input,
        None => return,
    };

    // Inputs are single-line
    for c in text.chars().filter(|c| *c != '\r') {
        target.insert(if c == '\n' { ' ' } else { c });
    }
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    if app.popup.is_some() {
        return;
    }
    match mouse.kind {
        MouseEventKind::ScrollDown => app.scroll_down(MOUSE_SCROLL_LINES),
        MouseEventKind::ScrollUp => app.scroll_up(MOUSE_SCROLL_LINES),
        _ => {}
    }
}

fn half_page(app: &App) -> u16 {
    (app.chat_height / 2).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_edit_text_keys() {
        let mut input = TextInput::new();
        assert!(edit_text(&mut input, key(KeyCode::Char('a'))));
        assert!(edit_text(&mut input, key(KeyCode::Char('b'))));
        assert!(edit_text(&mut input, key(KeyCode::Left)));
        assert!(edit_text(&mut input, key(KeyCode::Backspace)));
        assert!(!edit_text(&mut input, key(KeyCode::Tab)));
        assert_eq!(input.value(), "b");
    }
}
