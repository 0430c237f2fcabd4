use crate::model::Subscription;
use std::collections::HashSet;

/// Set of subscription ids chosen as targets for the next run.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionSelector {
    selected: HashSet<String>,
}

impl SubscriptionSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip membership of `id`. Returns whether it is selected afterwards.
    pub fn toggle(&mut self, id: &str) -> bool {
        if self.selected.remove(id) {
            false
        } else {
            self.selected.insert(id.to_string());
            true
        }
    }

    pub fn select_all(&mut self, subscriptions: &[Subscription]) {
        self.selected
            .extend(subscriptions.iter().map(|s| s.id.clone()));
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.selected.contains(id)
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    /// Selected ids, in no particular order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.selected.iter().map(String::as_str)
    }
}
