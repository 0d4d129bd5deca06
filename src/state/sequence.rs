use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SequenceError {
    /// Caller and engine disagree about the list; never clamped
    #[error("Index {index} out of range for sequence of length {len}")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Ordered test files of the active folder
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequenceManager {
    names: Vec<String>,
}

impl SequenceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the sequence with freshly listed archive members
    pub fn reload(&mut self, names: Vec<String>) {
        self.names = names;
    }

    pub fn clear(&mut self) {
        self.names.clear();
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Base names without their extension, as shown in the editor
    pub fn display_names(&self) -> Vec<&str> {
        self.names
            .iter()
            .map(|name| match name.rfind('.') {
                Some(dot) if dot > 0 => &name[..dot],
                _ => name.as_str(),
            })
            .collect()
    }

    /// Move the entry at `from` to position `to`, shifting the entries between.
    pub fn reorder(&mut self, from: usize, to: usize) -> Result<(), SequenceError> {
        let len = self.names.len();
        for index in [from, to] {
            if index >= len {
                return Err(SequenceError::IndexOutOfRange { index, len });
            }
        }

        if from != to {
            let moved = self.names.remove(from);
            self.names.insert(to, moved);
        }
        Ok(())
    }
}
