//! The input vocabulary the session controller accepts and forwards to
//! backends.

/// One of the three physical mouse buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MouseButton {
    /// Primary button.
    Left,
    /// Middle button or wheel click.
    Middle,
    /// Secondary button.
    Right,
}

impl MouseButton {
    /// All three buttons, in priority-table order.
    pub const ALL: [Self; 3] = [Self::Left, Self::Middle, Self::Right];

    pub(crate) fn index(self) -> usize {
        match self {
            Self::Left => 0,
            Self::Middle => 1,
            Self::Right => 2,
        }
    }
}

/// A logical input event, after the frontend has mapped its native event
/// stream onto this vocabulary. The session controller normalises these
/// further before a backend sees them (see
/// [`Midend::process_key`](crate::midend::Midend::process_key)).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    /// Mouse button pressed.
    Down(MouseButton),
    /// Mouse moved with a button held.
    Drag(MouseButton),
    /// Mouse button released.
    Release(MouseButton),
    /// Keyboard cursor movement.
    CursorUp,
    /// Keyboard cursor movement.
    CursorDown,
    /// Keyboard cursor movement.
    CursorLeft,
    /// Keyboard cursor movement.
    CursorRight,
    /// Primary keyboard selection (Return).
    CursorSelect,
    /// Secondary keyboard selection (Space).
    CursorSelect2,
    /// Any other key, as a character. Control characters arrive as their
    /// ASCII control codes.
    Char(char),
}

impl Button {
    /// Whether this is a mouse press, drag or release.
    #[must_use]
    pub fn is_mouse(self) -> bool {
        matches!(self, Self::Down(_) | Self::Drag(_) | Self::Release(_))
    }

    /// Whether this is one of the four cursor-movement keys.
    #[must_use]
    pub fn is_cursor_move(self) -> bool {
        matches!(
            self,
            Self::CursorUp | Self::CursorDown | Self::CursorLeft | Self::CursorRight
        )
    }

    /// Whether this is either of the keyboard selection buttons.
    #[must_use]
    pub fn is_cursor_select(self) -> bool {
        matches!(self, Self::CursorSelect | Self::CursorSelect2)
    }
}

/// Applies a cursor-movement key to a cell cursor in a `maxw` x `maxh`
/// rectangle, clamping at the edges or wrapping round them. Any other
/// button leaves the cursor alone.
pub fn move_cursor(button: Button, x: &mut i32, y: &mut i32, maxw: i32, maxh: i32, wrap: bool) {
    let (dx, dy) = match button {
        Button::CursorUp => (0, -1),
        Button::CursorDown => (0, 1),
        Button::CursorRight => (1, 0),
        Button::CursorLeft => (-1, 0),
        _ => return,
    };
    if wrap {
        *x = (*x + dx + maxw) % maxw;
        *y = (*y + dy + maxh) % maxh;
    } else {
        *x = (*x + dx).clamp(0, maxw - 1);
        *y = (*y + dy).clamp(0, maxh - 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_clamps_at_edges() {
        let (mut x, mut y) = (0, 0);
        move_cursor(Button::CursorLeft, &mut x, &mut y, 5, 5, false);
        assert_eq!((x, y), (0, 0));
        move_cursor(Button::CursorDown, &mut x, &mut y, 5, 5, false);
        assert_eq!((x, y), (0, 1));
    }

    #[test]
    fn cursor_wraps_when_asked() {
        let (mut x, mut y) = (0, 4);
        move_cursor(Button::CursorLeft, &mut x, &mut y, 5, 5, true);
        assert_eq!((x, y), (4, 4));
        move_cursor(Button::CursorDown, &mut x, &mut y, 5, 5, true);
        assert_eq!((x, y), (4, 0));
    }

    #[test]
    fn non_movement_buttons_are_ignored() {
        let (mut x, mut y) = (2, 3);
        move_cursor(Button::CursorSelect, &mut x, &mut y, 5, 5, false);
        move_cursor(Button::Char('z'), &mut x, &mut y, 5, 5, true);
        assert_eq!((x, y), (2, 3));
    }
}
