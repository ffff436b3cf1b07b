use super::commands::Command;

pub const DEFAULT_MAX_UNDO: usize = 1000;

/// Undo and redo stacks of one controller. Both hold inverse commands, never snapshots.
#[derive(Debug, Clone)]
pub struct History {
    undo_stack: Vec<Command>,
    redo_stack: Vec<Command>,
    max_undo: usize,
}

impl Default for History {
    fn default() -> Self {
        History::new(DEFAULT_MAX_UNDO)
    }
}

impl History {
    pub fn new(max_undo: usize) -> Self {
        History {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_undo: max_undo.max(1),
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    /// Record the inverse of a freshly executed command. New edits invalidate the redo stack.
    pub fn record(&mut self, inverse: Command) {
        self.redo_stack.clear();
        self.push_undo(inverse);
    }

    /// Push without touching the redo stack (used by redo).
    pub fn push_undo(&mut self, inverse: Command) {
        self.undo_stack.push(inverse);
        if self.undo_stack.len() > self.max_undo {
            let overflow = self.undo_stack.len() - self.max_undo;
            self.undo_stack.drain(..overflow);
        }
    }

    pub fn pop_undo(&mut self) -> Option<Command> {
        self.undo_stack.pop()
    }

    pub fn push_redo(&mut self, inverse: Command) {
        self.redo_stack.push(inverse);
    }

    pub fn pop_redo(&mut self) -> Option<Command> {
        self.redo_stack.pop()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(value: &str) -> Command {
        Command::SetCell {
            row: 0,
            col: 0,
            value: value.to_string(),
        }
    }

    #[test]
    fn record_clears_redo_and_caps_depth() {
        let mut history = History::new(2);
        history.record(cell("a"));
        history.record(cell("b"));
        history.record(cell("c"));
        assert_eq!(history.undo_depth(), 2);
        assert_eq!(history.pop_undo(), Some(cell("c")));
        history.push_redo(cell("c'"));
        assert!(history.can_redo());
        history.record(cell("d"));
        assert!(!history.can_redo());
        assert_eq!(history.pop_undo(), Some(cell("d")));
        assert_eq!(history.pop_undo(), Some(cell("b")));
        assert!(!history.can_undo());
    }
}
