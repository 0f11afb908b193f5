//! Keyboard shortcut table.
//!
//! Shortcuts are global: they resolve the same way whatever tool is active.

use kurbo::Vec2;

/// Editing command bound to a key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KeyCommand {
    Undo,
    Redo,
    Delete,
    Copy,
    Paste,
    Duplicate,
    SelectAll,
    Group,
    Ungroup,
    BringToFront,
    BringForward,
    SendBackward,
    SendToBack,
    /// Arrow-key move of the selection by a world-space delta.
    Nudge(Vec2),
    /// Leave text editing or abandon the current gesture.
    Cancel,
}

impl KeyCommand {
    /// Whether running the command can change the board.
    pub fn edits(&self) -> bool {
        !matches!(self, Self::Copy | Self::SelectAll | Self::Cancel)
    }
}

/// Nudge distance for a bare arrow key.
pub const NUDGE_STEP: f64 = 1.0;
/// Nudge distance with shift held.
pub const NUDGE_STEP_LARGE: f64 = 10.0;

/// A keyboard shortcut definition.
#[derive(Debug, Clone)]
pub struct Shortcut {
    pub key: &'static str,
    pub ctrl: bool,
    pub shift: bool,
    pub description: &'static str,
}

impl Shortcut {
    const fn new(key: &'static str, ctrl: bool, shift: bool, description: &'static str) -> Self {
        Self {
            key,
            ctrl,
            shift,
            description,
        }
    }

    /// Display form, e.g. "Ctrl+Shift+Z".
    pub fn format(&self) -> String {
        let mut parts = Vec::new();
        if self.ctrl {
            parts.push("Ctrl");
        }
        if self.shift {
            parts.push("Shift");
        }
        parts.push(self.key);
        parts.join("+")
    }
}

/// Shortcut list, for a help screen.
pub fn all() -> Vec<Shortcut> {
    vec![
        Shortcut::new("Z", true, false, "Undo"),
        Shortcut::new("Z", true, true, "Redo"),
        Shortcut::new("Y", true, false, "Redo"),
        Shortcut::new("C", true, false, "Copy selection"),
        Shortcut::new("V", true, false, "Paste"),
        Shortcut::new("D", true, false, "Duplicate selection"),
        Shortcut::new("A", true, false, "Select all"),
        Shortcut::new("G", true, false, "Group selection"),
        Shortcut::new("G", true, true, "Ungroup"),
        Shortcut::new("]", true, true, "Bring to front"),
        Shortcut::new("]", true, false, "Bring forward"),
        Shortcut::new("[", true, false, "Send backward"),
        Shortcut::new("[", true, true, "Send to back"),
        Shortcut::new("Delete", false, false, "Delete selection"),
        Shortcut::new("Backspace", false, false, "Delete selection"),
        Shortcut::new("Arrows", false, false, "Nudge selection 1px"),
        Shortcut::new("Arrows", false, true, "Nudge selection 10px"),
        Shortcut::new("Escape", false, false, "Cancel"),
    ]
}

/// Map a key press to a command. `key` uses DOM `KeyboardEvent.key` names.
/// `ctrl` covers Cmd on macOS.
pub fn resolve(key: &str, ctrl: bool, shift: bool) -> Option<KeyCommand> {
    let step = if shift { NUDGE_STEP_LARGE } else { NUDGE_STEP };
    let command = match (key.to_ascii_lowercase().as_str(), ctrl, shift) {
        ("z", true, false) => KeyCommand::Undo,
        ("z", true, true) | ("y", true, _) => KeyCommand::Redo,
        ("c", true, _) => KeyCommand::Copy,
        ("v", true, _) => KeyCommand::Paste,
        ("d", true, _) => KeyCommand::Duplicate,
        ("a", true, _) => KeyCommand::SelectAll,
        ("g", true, false) => KeyCommand::Group,
        ("g", true, true) => KeyCommand::Ungroup,
        ("]" | "}", true, true) => KeyCommand::BringToFront,
        ("]", true, false) => KeyCommand::BringForward,
        ("[", true, false) => KeyCommand::SendBackward,
        ("[" | "{", true, true) => KeyCommand::SendToBack,
        ("delete" | "backspace", false, _) => KeyCommand::Delete,
        ("escape", _, _) => KeyCommand::Cancel,
        ("arrowleft", false, _) => KeyCommand::Nudge(Vec2::new(-step, 0.0)),
        ("arrowright", false, _) => KeyCommand::Nudge(Vec2::new(step, 0.0)),
        ("arrowup", false, _) => KeyCommand::Nudge(Vec2::new(0.0, -step)),
        ("arrowdown", false, _) => KeyCommand::Nudge(Vec2::new(0.0, step)),
        _ => return None,
    };
    Some(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve() {
        assert_eq!(resolve("z", true, false), Some(KeyCommand::Undo));
        assert_eq!(resolve("Z", true, true), Some(KeyCommand::Redo));
        assert_eq!(resolve("G", true, true), Some(KeyCommand::Ungroup));
        assert_eq!(resolve("Backspace", false, false), Some(KeyCommand::Delete));
        assert_eq!(resolve("z", false, false), None);
    }

    #[test]
    fn test_nudge_steps() {
        assert_eq!(
            resolve("ArrowLeft", false, false),
            Some(KeyCommand::Nudge(Vec2::new(-1.0, 0.0)))
        );
        assert_eq!(
            resolve("ArrowDown", false, true),
            Some(KeyCommand::Nudge(Vec2::new(0.0, 10.0)))
        );
    }

    #[test]
    fn test_read_only_commands() {
        assert!(!KeyCommand::SelectAll.edits());
        assert!(!KeyCommand::Copy.edits());
        assert!(KeyCommand::Paste.edits());
        assert!(KeyCommand::Nudge(Vec2::new(1.0, 0.0)).edits());
    }

    #[test]
    fn test_format() {
        let redo = all().into_iter().find(|s| s.description == "Redo").unwrap();
        assert_eq!(redo.format(), "Ctrl+Shift+Z");
    }
}
