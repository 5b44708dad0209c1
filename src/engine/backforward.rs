//! Back/forward list shared by the bundled engines

/// Committed navigation stack of one engine
#[derive(Debug, Clone, Default)]
pub struct BackForwardList {
    back: Vec<String>,
    current: Option<String>,
    forward: Vec<String>,
}

impl BackForwardList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commit a new page; clears the forward stack
    pub fn commit(&mut self, url: impl Into<String>) {
        if let Some(previous) = self.current.take() {
            self.back.push(previous);
        }
        self.current = Some(url.into());
        self.forward.clear();
    }

    /// Step back, returning the new current URL
    pub fn go_back(&mut self) -> Option<&str> {
        let target = self.back.pop()?;
        if let Some(current) = self.current.take() {
            self.forward.push(current);
        }
        self.current = Some(target);
        self.current.as_deref()
    }

    /// Step forward, returning the new current URL
    pub fn go_forward(&mut self) -> Option<&str> {
        let target = self.forward.pop()?;
        if let Some(current) = self.current.take() {
            self.back.push(current);
        }
        self.current = Some(target);
        self.current.as_deref()
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn can_go_back(&self) -> bool {
        !self.back.is_empty()
    }

    pub fn can_go_forward(&self) -> bool {
        !self.forward.is_empty()
    }

    pub fn clear(&mut self) {
        self.back.clear();
        self.current = None;
        self.forward.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_back_and_forward() {
        let mut list = BackForwardList::new();
        assert!(!list.can_go_back());

        list.commit("a");
        list.commit("b");
        list.commit("c");

        assert_eq!(list.go_back(), Some("b"));
        assert_eq!(list.go_back(), Some("a"));
        assert_eq!(list.go_back(), None);
        assert!(list.can_go_forward());
        assert_eq!(list.go_forward(), Some("b"));

        // A fresh commit drops the forward entries
        list.commit("d");
        assert!(!list.can_go_forward());
        assert_eq!(list.current(), Some("d"));
    }

    #[test]
    fn test_clear() {
        let mut list = BackForwardList::new();
        list.commit("a");
        list.commit("b");
        list.clear();
        assert_eq!(list.current(), None);
        assert!(!list.can_go_back());
    }
}
