//! Keyboard and mouse handling for the TUI.

use std::time::Duration;

use anyhow::Result;
use crossterm::event::{
    self, Event, KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};

use crate::app::{App, View};

/// Poll for events with a timeout
pub fn poll_event(timeout: Duration) -> Result<Option<Event>> {
    if event::poll(timeout)? {
        Ok(Some(event::read()?))
    } else {
        Ok(None)
    }
}

/// Handle a key event
pub fn handle_key_event(app: &mut App, key: KeyEvent) {
    // If help is shown, any key closes it
    if app.show_help {
        app.show_help = false;
        return;
    }

    match key.code {
        KeyCode::Char('q') => app.quit(),
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => app.quit(),

        KeyCode::Tab => {
            if key.modifiers.contains(KeyModifiers::SHIFT) {
                app.prev_view();
            } else {
                app.next_view();
            }
        }
        KeyCode::BackTab => app.prev_view(),
        KeyCode::Left | KeyCode::Char('h') => app.prev_view(),
        KeyCode::Right | KeyCode::Char('l') => app.next_view(),

        KeyCode::Char('1') => app.set_view(View::Live),
        KeyCode::Char('2') => app.set_view(View::History),

        // Only the history table scrolls
        KeyCode::Up | KeyCode::Char('k') => app.scroll_up(1),
        KeyCode::Down | KeyCode::Char('j') => app.scroll_down(1),
        KeyCode::PageUp => app.scroll_up(10),
        KeyCode::PageDown => app.scroll_down(10),
        KeyCode::Home => app.scroll_first(),
        KeyCode::End => app.scroll_last(),

        KeyCode::Char('r') => app.request_refresh(),

        KeyCode::Char('?') => app.toggle_help(),

        KeyCode::Char('e') => {
            let export_path = app.export_path.clone();
            match app.export_state(&export_path) {
                Ok(()) => {
                    app.set_status_message(format!("Exported to {}", export_path.display()));
                }
                Err(e) => {
                    app.set_status_message(format!("Export failed: {}", e));
                }
            }
        }

        _ => {}
    }
}

/// Handle mouse events
pub fn handle_mouse_event(app: &mut App, mouse: MouseEvent) {
    match mouse.kind {
        MouseEventKind::ScrollUp => app.scroll_up(1),
        MouseEventKind::ScrollDown => app.scroll_down(1),

        // Tab clicks (row 1, after header)
        MouseEventKind::Down(MouseButton::Left) if mouse.row == 1 => {
            // " 1:Live " spans 0..8, the divider sits at 8
            if mouse.column < 9 {
                app.set_view(View::Live);
            } else if mouse.column < 21 {
                app.set_view(View::History);
            }
        }

        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::DisplaySurface;
    use crate::data::{HistoryRecord, HistorySet, HistoryView, Provenance};
    use crate::ui::Theme;
    use crossterm::event::{KeyEventKind, KeyEventState};

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent {
            code,
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        }
    }

    fn click(column: u16, row: u16) -> MouseEvent {
        MouseEvent {
            kind: MouseEventKind::Down(MouseButton::Left),
            column,
            row,
            modifiers: KeyModifiers::NONE,
        }
    }

    #[test]
    fn test_view_switching() {
        let mut app = App::new("test", Theme::dark());
        handle_key_event(&mut app, key(KeyCode::Tab));
        assert_eq!(app.current_view, View::History);
        handle_key_event(&mut app, key(KeyCode::BackTab));
        assert_eq!(app.current_view, View::Live);
        handle_key_event(&mut app, key(KeyCode::Char('2')));
        assert_eq!(app.current_view, View::History);
        handle_mouse_event(&mut app, click(2, 1));
        assert_eq!(app.current_view, View::Live);
    }

    #[test]
    fn test_help_swallows_next_key() {
        let mut app = App::new("test", Theme::dark());
        handle_key_event(&mut app, key(KeyCode::Char('?')));
        assert!(app.show_help);

        handle_key_event(&mut app, key(KeyCode::Char('q')));
        assert!(!app.show_help);
        assert!(app.running);

        handle_key_event(&mut app, key(KeyCode::Char('q')));
        assert!(!app.running);
    }

    #[test]
    fn test_scrolling_history() {
        let mut app = App::new("test", Theme::dark());
        app.show_history(&HistoryView::Loaded(HistorySet::from_records(
            vec![HistoryRecord::default(); 15],
            Provenance::Sheets,
            20,
        )));

        handle_key_event(&mut app, key(KeyCode::Char('j')));
        handle_key_event(&mut app, key(KeyCode::Down));
        assert_eq!(app.history_scroll, 2);
        handle_key_event(&mut app, key(KeyCode::PageDown));
        assert_eq!(app.history_scroll, 12);
        handle_key_event(&mut app, key(KeyCode::End));
        assert_eq!(app.history_scroll, 14);
        handle_key_event(&mut app, key(KeyCode::Home));
        assert_eq!(app.history_scroll, 0);
    }

    #[test]
    fn test_export_without_data_reports_failure() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut app = App::new("test", Theme::dark());
        app.export_path = dir.path().join("out.json");

        handle_key_event(&mut app, key(KeyCode::Char('e')));
        assert!(app
            .get_status_message()
            .is_some_and(|m| m.starts_with("Export failed")));
        assert!(!app.export_path.exists());
    }
}
