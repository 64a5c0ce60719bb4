use std::collections::VecDeque;

/// A rolling buffer that keeps the most recent elements up to a fixed
/// capacity, dropping the oldest on overflow.
///
/// Used to bound the error details a long session accumulates for its
/// digest.
#[derive(Debug, Clone)]
pub(crate) struct Window<T> {
    data: VecDeque<T>,
    capacity: usize,
}

impl<T> Window<T> {
    /// Create a new window with the given capacity
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            data: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push an element, removing the oldest if at capacity
    pub(crate) fn push(&mut self, item: T) {
        if self.data.len() >= self.capacity {
            self.data.pop_front();
        }
        self.data.push_back(item);
    }

    /// Number of elements currently held
    pub(crate) fn len(&self) -> usize {
        self.data.len()
    }

    /// Copy the window contents into a vector, oldest first
    pub(crate) fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.data.iter().cloned().collect()
    }
}

impl<T> Default for Window<T> {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_drops_oldest() {
        let mut window = Window::new(2);
        window.push("a");
        window.push("b");
        window.push("c");

        assert_eq!(window.len(), 2);
        assert_eq!(window.to_vec(), vec!["b", "c"]);
    }
}
