/// Navigation state over a finished recommendation list.
///
/// The presentation layer only reads the list; this cursor is the whole of
/// its contract with the pipeline. Movement is clamped to `[0, len - 1]`.
use crate::model::Recommendation;

#[derive(Debug)]
pub struct BrowseSession {
    recommendations: Vec<Recommendation>,
    index: usize,
}

impl BrowseSession {
    pub fn new(recommendations: Vec<Recommendation>) -> Self {
        Self {
            recommendations,
            index: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.recommendations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recommendations.is_empty()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn current(&self) -> Option<&Recommendation> {
        self.recommendations.get(self.index)
    }

    /// Advance the cursor, saturating at the last entry.
    pub fn forward(&mut self) -> Option<&Recommendation> {
        if self.index + 1 < self.recommendations.len() {
            self.index += 1;
        }
        self.current()
    }

    /// Move the cursor back, saturating at the first entry.
    pub fn back(&mut self) -> Option<&Recommendation> {
        self.index = self.index.saturating_sub(1);
        self.current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recs(n: usize) -> Vec<Recommendation> {
        (0..n)
            .map(|i| Recommendation {
                id: i.to_string(),
                title: format!("Book {i}"),
                author: "Author".to_string(),
                text: format!("text {i}"),
            })
            .collect()
    }

    #[test]
    fn cursor_is_bounded_both_ways() {
        let mut session = BrowseSession::new(recs(3));
        assert_eq!(session.index(), 0);
        assert_eq!(session.back().unwrap().id, "0");
        assert_eq!(session.forward().unwrap().id, "1");
        assert_eq!(session.forward().unwrap().id, "2");
        assert_eq!(session.forward().unwrap().id, "2");
        assert_eq!(session.back().unwrap().id, "1");
    }

    #[test]
    fn empty_session_has_no_current() {
        let mut session = BrowseSession::new(Vec::new());
        assert!(session.is_empty());
        assert!(session.current().is_none());
        assert!(session.forward().is_none());
        assert!(session.back().is_none());
    }
}
