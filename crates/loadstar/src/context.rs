//! Stack of modules currently being fetched.
//!
//! The top of the stack is the module whose execution is running, which is
//! how `symbol` and `require` calls made during a fetch learn their source.

use log::trace;

use crate::error::{LoaderError, Result};

/// Modules whose fetch is running, innermost last
#[derive(Debug, Default)]
pub struct ResolutionContext {
    stack: Vec<String>,
}

impl ResolutionContext {
    /// Create an empty stack
    pub fn new() -> Self {
        Self::default()
    }

    /// Push `id` as the active module
    pub fn enter(&mut self, id: &str) {
        trace!("Entering module context: {}", id);
        self.stack.push(id.to_owned());
    }

    /// Pop the active module, verifying it is `id`.
    ///
    /// The frame is popped even on mismatch, so a corrupted stack does not
    /// keep growing.
    pub fn exit(&mut self, id: &str) -> Result<()> {
        let found = self.stack.pop();
        trace!("Leaving module context: {:?}", found);
        match found {
            Some(top) if top == id => Ok(()),
            found => Err(LoaderError::ContextCorruption {
                expected: id.to_owned(),
                found,
            }),
        }
    }

    /// The module whose execution is currently running
    pub fn current(&self) -> Option<&str> {
        self.stack.last().map(String::as_str)
    }

    /// Number of modules on the stack
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Drop every frame
    pub fn clear(&mut self) {
        self.stack.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nesting() {
        let mut context = ResolutionContext::new();
        assert_eq!(context.current(), None);

        context.enter("a");
        context.enter("b");
        assert_eq!(context.current(), Some("b"));
        assert_eq!(context.depth(), 2);

        assert!(context.exit("b").is_ok());
        assert_eq!(context.current(), Some("a"));
        assert!(context.exit("a").is_ok());
        assert_eq!(context.depth(), 0);
    }

    #[test]
    fn test_out_of_order_exit() {
        let mut context = ResolutionContext::new();
        context.enter("a");
        context.enter("b");

        let error = context.exit("a").expect_err("exit should fail");
        assert_eq!(error.to_string(), "Invalid context detected: 'b', expecting: a");
        assert_eq!(context.current(), Some("a"));

        context.clear();
        let error = context.exit("a").expect_err("exit should fail");
        assert!(matches!(
            error,
            LoaderError::ContextCorruption { found: None, .. }
        ));
    }
}
